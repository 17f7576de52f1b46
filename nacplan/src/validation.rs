//! Circuit Validation
//!
//! Collects every rule violation instead of stopping at the first one, so a
//! user sees the full list before committing or exporting a design. A
//! failed validation never blocks further editing.
//!
//! Errors, in check order:
//! 1. device nodes without a device record
//! 2. alarm load above the usable load
//! 3. device voltage below the minimum
//! 4. T-taps without any branch device
//! 5. flattened sequences disagreeing with the tree

use petgraph::stable_graph::NodeIndex;
use serde::Serialize;

use crate::circuit::{CircuitManager, ElectricalState};

/// Knobs for the non-blocking warnings.
#[derive(Clone, Debug)]
pub struct ValidationOptions {
    /// Warn once load passes this fraction of the usable load
    pub load_warning_fraction: f64,
    /// Warn about devices whose cable length is still zero
    pub warn_on_unknown_distance: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            load_warning_fraction: 0.8,
            warn_on_unknown_distance: true,
        }
    }
}

/// Outcome of one validation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationStats {
    pub errors: usize,
    pub warnings: usize,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn stats(&self) -> ValidationStats {
        ValidationStats {
            errors: self.errors.len(),
            warnings: self.warnings.len(),
        }
    }
}

/// Validate with default options.
pub fn validate(manager: &CircuitManager) -> ValidationReport {
    Validator::default().validate(manager)
}

#[derive(Debug, Clone, Default)]
pub struct Validator {
    options: ValidationOptions,
}

impl Validator {
    pub fn new(options: ValidationOptions) -> Self {
        Self { options }
    }

    pub fn validate(&self, manager: &CircuitManager) -> ValidationReport {
        let mut report = ValidationReport::default();
        // stale attributes are never trusted
        let state = manager.electrical_state();

        check_device_records(manager, &mut report);
        check_load(manager, &self.options, &mut report);
        check_voltages(manager, &state, &mut report);
        check_empty_branches(manager, &mut report);
        check_structure(manager, &mut report);

        if self.options.warn_on_unknown_distance {
            check_distances(manager, &mut report);
        }

        tracing::debug!(
            "Validation finished: {} errors, {} warnings",
            report.errors.len(),
            report.warnings.len()
        );
        report
    }
}

fn check_device_records(manager: &CircuitManager, report: &mut ValidationReport) {
    for identifier in manager.member_identifiers() {
        if manager.device(identifier).is_none() {
            report
                .errors
                .push(format!("Device '{}' has no device record", identifier));
        }
    }
}

fn check_load(
    manager: &CircuitManager,
    options: &ValidationOptions,
    report: &mut ValidationReport,
) {
    let params = manager.parameters();
    let total = manager.total_system_load();
    let usable = params.usable_load();

    if !total.is_finite() {
        report
            .errors
            .push(format!("Total alarm load could not be computed ({})", total));
    } else if total > usable {
        report.errors.push(format!(
            "Total alarm load {:.3} A exceeds usable load {:.3} A ({:.3} A rated, {:.0}% reserve)",
            total,
            usable,
            params.max_load,
            params.safety_percent * 100.0
        ));
    } else if total > usable * options.load_warning_fraction {
        report.warnings.push(format!(
            "Total alarm load {:.3} A is above {:.0}% of usable load {:.3} A",
            total,
            options.load_warning_fraction * 100.0,
            usable
        ));
    }
}

fn check_voltages(
    manager: &CircuitManager,
    state: &ElectricalState,
    report: &mut ValidationReport,
) {
    let tree = manager.tree();
    let min = manager.parameters().min_voltage;

    for ix in tree.preorder(tree.root()) {
        let Some(identifier) = tree.node(ix).and_then(|n| n.id()) else {
            continue;
        };
        let voltage = state.voltage_at(ix);
        if !voltage.is_finite() {
            report.errors.push(format!(
                "Device '{}' voltage could not be computed ({})",
                identifier, voltage
            ));
        } else if voltage < min {
            report.errors.push(format!(
                "Device '{}' voltage {:.2} V is below minimum {:.2} V",
                identifier, voltage, min
            ));
        }
    }
}

fn check_empty_branches(manager: &CircuitManager, report: &mut ValidationReport) {
    for (tap, chain) in manager.branches() {
        if chain.is_empty() {
            let name = manager.branch_name(tap).unwrap_or("T-Tap");
            report
                .errors
                .push(format!("{} at '{}' has no branch devices", name, tap));
        }
    }
}

fn check_structure(manager: &CircuitManager, report: &mut ValidationReport) {
    let tree = manager.tree();

    let main_chain = chain_ids(manager, tree.chain_from(tree.root(), false));
    compare_sequences("Main circuit", manager.main_circuit(), &main_chain, report);

    for (tap, chain) in manager.branches() {
        let label = manager.branch_name(tap).unwrap_or(tap.as_str());
        match tree.find(tap) {
            Some(tap_ix) => {
                let in_tree = chain_ids(manager, tree.chain_from(tap_ix, true));
                compare_sequences(label, chain, &in_tree, report);
            }
            None => report
                .errors
                .push(format!("{} tap point '{}' is not in the circuit", label, tap)),
        }
    }

    for identifier in manager.member_identifiers() {
        let listed = manager.main_circuit().iter().any(|m| m == identifier)
            || manager.branches().values().any(|c| c.iter().any(|b| b == identifier));
        if !listed {
            report.errors.push(format!(
                "Device '{}' is in the tree but on no chain",
                identifier
            ));
        }
    }
}

fn chain_ids(manager: &CircuitManager, chain: Vec<NodeIndex>) -> Vec<String> {
    chain
        .into_iter()
        .filter_map(|ix| manager.tree().node(ix).and_then(|n| n.identifier.clone()))
        .collect()
}

fn compare_sequences(
    label: &str,
    listed: &[String],
    in_tree: &[String],
    report: &mut ValidationReport,
) {
    if listed.len() != in_tree.len() {
        report.errors.push(format!(
            "{} lists {} devices but the tree holds {}",
            label,
            listed.len(),
            in_tree.len()
        ));
    } else if listed != in_tree {
        report
            .errors
            .push(format!("{} order does not match the tree", label));
    }
}

fn check_distances(manager: &CircuitManager, report: &mut ValidationReport) {
    for identifier in manager.member_identifiers() {
        let zero = manager
            .node_for(identifier)
            .map(|n| n.distance_from_parent == 0.0)
            .unwrap_or(false);
        if zero {
            report.warnings.push(format!(
                "Device '{}' has no cable length; its voltage drop is not modelled",
                identifier
            ));
        }
    }
}
