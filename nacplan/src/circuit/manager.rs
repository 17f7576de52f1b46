//! Circuit Manager
//!
//! Owns the circuit tree together with its flattened views and applies every
//! structural edit. Edits never recompute electrical attributes on their
//! own; call [`CircuitManager::recalculate`] after a batch of edits.

use petgraph::stable_graph::NodeIndex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::device::{ConnectionRef, DeviceRecord};
use super::params::CircuitParameters;
use super::tree::{CircuitNode, CircuitTree, ElectricalState};
use super::CircuitError;
use crate::wire;

/// Which chain new devices are appended to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModeKind {
    Main,
    Branch,
}

/// Editing state machine.
///
/// `Main` remembers the last tap left via [`CircuitManager::end_branch`] so
/// it can be resumed; `Branch` always names the tap being extended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditMode {
    Main { resume_tap: Option<String> },
    Branch { tap_point: String },
}

impl EditMode {
    pub fn kind(&self) -> ModeKind {
        match self {
            EditMode::Main { .. } => ModeKind::Main,
            EditMode::Branch { .. } => ModeKind::Branch,
        }
    }
}

impl Default for EditMode {
    fn default() -> Self {
        EditMode::Main { resume_tap: None }
    }
}

/// Resolves identifiers against the live host model.
pub trait DeviceResolver {
    fn resolve(&self, identifier: &str) -> Option<ConnectionRef>;
}

impl<F> DeviceResolver for F
where
    F: Fn(&str) -> Option<ConnectionRef>,
{
    fn resolve(&self, identifier: &str) -> Option<ConnectionRef> {
        self(identifier)
    }
}

/// Where a removed subtree used to hang, so callers can restore visuals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemovedSubtree {
    pub identifier: String,
    /// Parent identifier, `None` when the node hung directly off the supply
    pub parent: Option<String>,
    /// Index among the parent's children
    pub sibling_position: usize,
    /// Index in the main circuit, for main-chain devices
    pub main_position: Option<usize>,
    /// Tap point and index within that branch, for branch devices
    pub branch_position: Option<(String, usize)>,
    /// Every removed identifier, parents before children
    pub removed: Vec<String>,
    /// Tap points whose branches were dropped
    pub removed_taps: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CircuitManager {
    pub(crate) tree: CircuitTree,
    pub(crate) mode: EditMode,
    pub(crate) main_circuit: Vec<String>,
    pub(crate) branches: BTreeMap<String, Vec<String>>,
    pub(crate) branch_names: BTreeMap<String, String>,
    pub(crate) device_data: BTreeMap<String, DeviceRecord>,
    pub(crate) parameters: CircuitParameters,
    pub(crate) stale: bool,
}

impl CircuitManager {
    /// Create an empty circuit (root only) for the given parameters.
    pub fn new(parameters: CircuitParameters) -> Result<Self, CircuitError> {
        parameters.validate()?;
        Ok(Self::with_parameters_unchecked(parameters))
    }

    pub(crate) fn with_parameters_unchecked(parameters: CircuitParameters) -> Self {
        Self {
            tree: CircuitTree::new(),
            mode: EditMode::default(),
            main_circuit: Vec::new(),
            branches: BTreeMap::new(),
            branch_names: BTreeMap::new(),
            device_data: BTreeMap::new(),
            parameters,
            stale: true,
        }
    }

    pub fn parameters(&self) -> &CircuitParameters {
        &self.parameters
    }

    pub fn set_parameters(&mut self, parameters: CircuitParameters) -> Result<(), CircuitError> {
        parameters.validate()?;
        self.parameters = parameters;
        self.stale = true;
        Ok(())
    }

    pub fn mode(&self) -> ModeKind {
        self.mode.kind()
    }

    pub fn edit_mode(&self) -> &EditMode {
        &self.mode
    }

    /// The tap being extended, or the one kept for resumption in Main mode.
    pub fn active_tap_point(&self) -> Option<&str> {
        match &self.mode {
            EditMode::Branch { tap_point } => Some(tap_point),
            EditMode::Main { resume_tap } => resume_tap.as_deref(),
        }
    }

    pub fn tree(&self) -> &CircuitTree {
        &self.tree
    }

    pub fn main_circuit(&self) -> &[String] {
        &self.main_circuit
    }

    pub fn branches(&self) -> &BTreeMap<String, Vec<String>> {
        &self.branches
    }

    pub fn branch(&self, tap_point: &str) -> Option<&[String]> {
        self.branches.get(tap_point).map(Vec::as_slice)
    }

    pub fn branch_names(&self) -> &BTreeMap<String, String> {
        &self.branch_names
    }

    pub fn branch_name(&self, tap_point: &str) -> Option<&str> {
        self.branch_names.get(tap_point).map(String::as_str)
    }

    pub fn is_tap_point(&self, identifier: &str) -> bool {
        self.branches.contains_key(identifier)
    }

    /// Tap point of the branch holding `identifier`, if it is a branch device.
    pub fn branch_of(&self, identifier: &str) -> Option<&str> {
        self.branches
            .iter()
            .find(|(_, chain)| chain.iter().any(|b| b == identifier))
            .map(|(tap, _)| tap.as_str())
    }

    pub fn devices(&self) -> &BTreeMap<String, DeviceRecord> {
        &self.device_data
    }

    pub fn device(&self, identifier: &str) -> Option<&DeviceRecord> {
        self.device_data.get(identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.tree.contains(identifier) || self.device_data.contains_key(identifier)
    }

    pub fn node_for(&self, identifier: &str) -> Option<&CircuitNode> {
        self.tree.find(identifier).and_then(|ix| self.tree.node(ix))
    }

    /// Identifiers of every device in the circuit, in wiring order.
    pub fn member_identifiers(&self) -> Vec<&str> {
        self.tree
            .preorder(self.tree.root())
            .into_iter()
            .filter_map(|ix| self.tree.node(ix).and_then(|n| n.id()))
            .collect()
    }

    pub fn device_count(&self) -> usize {
        self.tree.device_count()
    }

    /// Append a device to the end of the main circuit.
    pub fn add_device_to_main(
        &mut self,
        device: DeviceRecord,
        distance_from_parent: f64,
    ) -> Result<NodeIndex, CircuitError> {
        self.require_mode(ModeKind::Main)?;
        check_distance(distance_from_parent)?;
        device.validate()?;
        let identifier = device.identifier.clone();
        self.require_new(&identifier)?;

        let parent = match self.main_circuit.last() {
            Some(tail) => self.locate(tail)?,
            None => self.tree.root(),
        };
        let sequence = self.main_circuit.len() + 1;
        let ix = self.tree.attach(
            parent,
            CircuitNode::device(identifier.clone(), distance_from_parent).with_sequence(sequence),
        )?;

        self.main_circuit.push(identifier.clone());
        self.device_data.insert(identifier.clone(), device);
        self.stale = true;
        tracing::debug!("Added '{}' to main circuit at position {}", identifier, sequence);
        Ok(ix)
    }

    /// Append a device to the end of the active T-tap.
    pub fn add_device_to_branch(
        &mut self,
        device: DeviceRecord,
        distance_from_parent: f64,
    ) -> Result<NodeIndex, CircuitError> {
        let tap = match &self.mode {
            EditMode::Branch { tap_point } => tap_point.clone(),
            EditMode::Main { .. } => {
                tracing::warn!("Rejected branch device '{}' while in Main mode", device.identifier);
                return Err(CircuitError::ModeMismatch {
                    expected: ModeKind::Branch,
                    actual: ModeKind::Main,
                });
            }
        };
        check_distance(distance_from_parent)?;
        device.validate()?;
        let identifier = device.identifier.clone();
        self.require_new(&identifier)?;

        let chain = self.branches.get(&tap).ok_or_else(|| {
            CircuitError::Inconsistent(format!("active tap '{}' has no branch entry", tap))
        })?;
        let parent = self.locate(chain.last().unwrap_or(&tap))?;
        let sequence = chain.len() + 1;
        let ix = self.tree.attach(
            parent,
            CircuitNode::device(identifier.clone(), distance_from_parent)
                .as_branch()
                .with_sequence(sequence),
        )?;

        self.branches.entry(tap.clone()).or_default().push(identifier.clone());
        self.device_data.insert(identifier.clone(), device);
        self.stale = true;
        tracing::debug!("Added '{}' to branch at '{}' position {}", identifier, tap, sequence);
        Ok(ix)
    }

    /// Start (or resume) a T-tap at a main-circuit device and switch to
    /// Branch mode. Returns the branch label.
    pub fn start_branch_from_device(&mut self, identifier: &str) -> Result<String, CircuitError> {
        self.require_mode(ModeKind::Main)?;
        if !self.main_circuit.iter().any(|m| m == identifier) {
            tracing::warn!("Cannot tap '{}': not on the main circuit", identifier);
            return Err(if self.contains(identifier) {
                CircuitError::NotOnMainCircuit(identifier.to_string())
            } else {
                CircuitError::UnknownDevice(identifier.to_string())
            });
        }

        let name = match self.branch_names.get(identifier) {
            Some(existing) => {
                tracing::debug!("Resuming {} at '{}'", existing, identifier);
                existing.clone()
            }
            None => {
                let name = self.next_branch_name();
                self.branches.insert(identifier.to_string(), Vec::new());
                self.branch_names.insert(identifier.to_string(), name.clone());
                tracing::info!("Started {} at '{}'", name, identifier);
                name
            }
        };

        self.mode = EditMode::Branch {
            tap_point: identifier.to_string(),
        };
        Ok(name)
    }

    /// Return to Main mode, keeping the tap for [`Self::resume_branch`].
    pub fn end_branch(&mut self) {
        if let EditMode::Branch { tap_point } = &self.mode {
            let tap = tap_point.clone();
            tracing::debug!("Leaving branch at '{}'", tap);
            self.mode = EditMode::Main {
                resume_tap: Some(tap),
            };
        }
    }

    /// Re-enter Branch mode on the tap last left with [`Self::end_branch`].
    pub fn resume_branch(&mut self) -> Result<String, CircuitError> {
        self.require_mode(ModeKind::Main)?;
        let tap = match &self.mode {
            EditMode::Main {
                resume_tap: Some(tap),
            } if self.branches.contains_key(tap) => tap.clone(),
            _ => return Err(CircuitError::NoActiveTap),
        };
        self.mode = EditMode::Branch {
            tap_point: tap.clone(),
        };
        Ok(tap)
    }

    /// Remove a device and everything downstream of it.
    ///
    /// Chains are linear, so removing a mid-chain device drops the rest of
    /// that chain. Removing a tap point also drops its whole branch.
    pub fn remove_device(&mut self, identifier: &str) -> Result<RemovedSubtree, CircuitError> {
        let Some(ix) = self.tree.find(identifier) else {
            tracing::warn!("Cannot remove unknown device '{}'", identifier);
            return Err(CircuitError::UnknownDevice(identifier.to_string()));
        };

        let parent_ix = self.tree.parent(ix);
        let parent = parent_ix
            .and_then(|p| self.tree.node(p))
            .and_then(|n| n.identifier.clone());
        let sibling_position = parent_ix
            .and_then(|p| self.tree.children(p).iter().position(|&c| c == ix))
            .unwrap_or(0);
        let main_position = self.main_circuit.iter().position(|m| m == identifier);
        let branch_position = self.branches.iter().find_map(|(tap, chain)| {
            chain
                .iter()
                .position(|b| b == identifier)
                .map(|p| (tap.clone(), p))
        });

        let removed: Vec<String> = self
            .tree
            .remove_subtree(ix)
            .into_iter()
            .filter_map(|n| n.identifier)
            .collect();
        let doomed: HashSet<&str> = removed.iter().map(String::as_str).collect();

        self.main_circuit.retain(|m| !doomed.contains(m.as_str()));
        let removed_taps: Vec<String> = self
            .branches
            .keys()
            .filter(|tap| doomed.contains(tap.as_str()))
            .cloned()
            .collect();
        for tap in &removed_taps {
            self.branches.remove(tap);
            self.branch_names.remove(tap);
        }
        for chain in self.branches.values_mut() {
            chain.retain(|b| !doomed.contains(b.as_str()));
        }
        for id in &removed {
            self.device_data.remove(id);
        }

        let lost_tap = match &self.mode {
            EditMode::Branch { tap_point } => doomed.contains(tap_point.as_str()),
            EditMode::Main {
                resume_tap: Some(tap),
            } => doomed.contains(tap.as_str()),
            EditMode::Main { resume_tap: None } => false,
        };
        if lost_tap {
            self.mode = EditMode::default();
        }
        self.stale = true;

        tracing::info!(
            "Removed '{}' ({} devices, {} branches)",
            identifier,
            removed.len(),
            removed_taps.len()
        );

        Ok(RemovedSubtree {
            identifier: identifier.to_string(),
            parent,
            sibling_position,
            main_position,
            branch_position,
            removed,
            removed_taps,
        })
    }

    /// Update the cable length between a device and its parent.
    pub fn set_distance(&mut self, identifier: &str, feet: f64) -> Result<(), CircuitError> {
        check_distance(feet)?;
        let ix = self.locate(identifier)?;
        if let Some(node) = self.tree.node_mut(ix) {
            node.distance_from_parent = feet;
        }
        self.stale = true;
        Ok(())
    }

    /// Reset to an empty circuit, keeping the parameters.
    pub fn clear(&mut self) {
        self.tree = CircuitTree::new();
        self.mode = EditMode::default();
        self.main_circuit.clear();
        self.branches.clear();
        self.branch_names.clear();
        self.device_data.clear();
        self.stale = true;
        tracing::debug!("Circuit cleared");
    }

    /// Run the load (post-order) and voltage (pre-order) passes.
    pub fn recalculate(&mut self) {
        let state = self.tree.solve(&self.parameters, &self.device_data);
        self.tree.apply(&state);
        self.stale = false;
        tracing::debug!(
            "Recalculated {} devices, supply voltage {:.3} V",
            self.tree.device_count(),
            state.voltage_at(self.tree.root())
        );
    }

    /// True when an edit happened since the last [`Self::recalculate`].
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Current electrical values, solved fresh if the stored ones are stale.
    pub fn electrical_state(&self) -> ElectricalState {
        if self.stale {
            self.tree.solve(&self.parameters, &self.device_data)
        } else {
            self.tree.snapshot()
        }
    }

    /// Sum of alarm current over every device record.
    pub fn total_system_load(&self) -> f64 {
        self.device_data.values().map(|d| d.alarm_current).sum()
    }

    /// Sum of standby current over every device record.
    pub fn total_standby_load(&self) -> f64 {
        self.device_data.values().map(|d| d.standby_current).sum()
    }

    /// Feet of cable between devices (supply run excluded).
    pub fn calculate_total_wire_length(&self) -> f64 {
        self.tree
            .device_nodes()
            .map(|(_, n)| n.distance_from_parent)
            .sum()
    }

    /// Coarse whole-circuit drop for status displays.
    pub fn calculate_voltage_drop(&self, total_load: f64, total_length: f64) -> f64 {
        wire::loop_voltage_drop(total_load, self.parameters.resistance_per_1000ft, total_length)
    }

    /// Cable to order: device runs plus supply run, with routing overhead.
    pub fn estimated_cable_length(&self) -> f64 {
        (self.calculate_total_wire_length() + self.parameters.supply_distance)
            * (1.0 + self.parameters.routing_overhead)
    }

    /// Lowest voltage over all chain ends, `None` for an empty circuit.
    pub fn end_of_line_voltage(&self) -> Option<f64> {
        let state = self.electrical_state();
        self.tree
            .leaves()
            .into_iter()
            .map(|ix| state.voltage_at(ix))
            .reduce(f64::min)
    }

    /// Re-resolve connection references after a load.
    ///
    /// Returns the identifiers that no longer resolve; their records stay in
    /// the circuit with no connection.
    pub fn reattach_connections<R: DeviceResolver>(&mut self, resolver: &R) -> Vec<String> {
        let mut unresolved = Vec::new();
        for (identifier, device) in self.device_data.iter_mut() {
            device.connection = resolver.resolve(identifier);
            if device.connection.is_none() {
                unresolved.push(identifier.clone());
            }
        }
        if !unresolved.is_empty() {
            tracing::warn!("{} devices could not be resolved: {:?}", unresolved.len(), unresolved);
        }
        unresolved
    }

    fn require_mode(&self, expected: ModeKind) -> Result<(), CircuitError> {
        let actual = self.mode.kind();
        if actual != expected {
            tracing::warn!("Rejected edit: expected {:?} mode, in {:?} mode", expected, actual);
            return Err(CircuitError::ModeMismatch { expected, actual });
        }
        Ok(())
    }

    fn require_new(&self, identifier: &str) -> Result<(), CircuitError> {
        if self.contains(identifier) {
            tracing::warn!("Rejected duplicate device '{}'", identifier);
            return Err(CircuitError::DuplicateDevice(identifier.to_string()));
        }
        Ok(())
    }

    fn locate(&self, identifier: &str) -> Result<NodeIndex, CircuitError> {
        self.tree
            .find(identifier)
            .ok_or_else(|| CircuitError::UnknownDevice(identifier.to_string()))
    }

    pub(crate) fn next_branch_name(&self) -> String {
        let mut n = self.branches.len() + 1;
        loop {
            let name = format!("T-Tap {}", n);
            if !self.branch_names.values().any(|existing| *existing == name) {
                return name;
            }
            n += 1;
        }
    }
}

impl Default for CircuitManager {
    fn default() -> Self {
        Self::with_parameters_unchecked(CircuitParameters::default())
    }
}

fn check_distance(feet: f64) -> Result<(), CircuitError> {
    if !feet.is_finite() || feet < 0.0 {
        return Err(CircuitError::InvalidParameter(format!(
            "distance must be a non-negative number of feet, got {}",
            feet
        )));
    }
    Ok(())
}
