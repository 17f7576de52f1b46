//! Totals and per-device rows handed to report and export formatters.

use serde::Serialize;

use crate::circuit::CircuitManager;

/// One device line of a circuit report.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceRow {
    pub sequence_number: usize,
    pub identifier: String,
    pub name: String,
    pub abbreviation: String,
    /// Branch label for T-tap devices, `None` on the main circuit
    pub branch: Option<String>,
    pub distance_from_parent: f64,
    pub alarm_current: f64,
    pub accumulated_load: f64,
    pub voltage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitSummary {
    pub total_alarm_load: f64,
    pub total_standby_load: f64,
    pub usable_load: f64,
    pub total_wire_length: f64,
    pub estimated_cable_length: f64,
    /// Whole-circuit drop estimate from the totals
    pub system_voltage_drop: f64,
    pub supply_voltage: f64,
    pub end_of_line_voltage: Option<f64>,
    pub device_count: usize,
    pub branch_count: usize,
    pub devices: Vec<DeviceRow>,
}

impl CircuitSummary {
    pub fn from_manager(manager: &CircuitManager) -> Self {
        let state = manager.electrical_state();
        let tree = manager.tree();

        let devices = tree
            .preorder(tree.root())
            .into_iter()
            .filter_map(|ix| {
                let node = tree.node(ix)?;
                let identifier = node.identifier.clone()?;
                let record = manager.device(&identifier);
                let branch = if node.is_branch_device {
                    manager
                        .branch_of(&identifier)
                        .and_then(|tap| manager.branch_name(tap))
                        .map(str::to_string)
                } else {
                    None
                };
                Some(DeviceRow {
                    sequence_number: node.sequence_number,
                    name: record.map(|d| d.name.clone()).unwrap_or_default(),
                    abbreviation: record.map(|d| d.abbreviation()).unwrap_or_default(),
                    alarm_current: record.map(|d| d.alarm_current).unwrap_or(0.0),
                    branch,
                    distance_from_parent: node.distance_from_parent,
                    accumulated_load: state.load_at(ix),
                    voltage: state.voltage_at(ix),
                    identifier,
                })
            })
            .collect();

        let total_alarm_load = manager.total_system_load();
        let total_wire_length = manager.calculate_total_wire_length();

        Self {
            total_alarm_load,
            total_standby_load: manager.total_standby_load(),
            usable_load: manager.parameters().usable_load(),
            total_wire_length,
            estimated_cable_length: manager.estimated_cable_length(),
            system_voltage_drop: manager
                .calculate_voltage_drop(total_alarm_load, total_wire_length),
            supply_voltage: manager.parameters().system_voltage,
            end_of_line_voltage: manager.end_of_line_voltage(),
            device_count: manager.device_count(),
            branch_count: manager.branches().len(),
            devices,
        }
    }
}
