//! Circuit Tree
//!
//! Arena storage for the supply root and every device node. The arena is a
//! petgraph `StableDiGraph` so node handles survive removals elsewhere in
//! the tree. Edges always point parent -> child, which gives each node at
//! most one incoming edge (its parent) and an ordered set of outgoing edges
//! (its children, in wiring order).
//!
//! Electrical attributes are derived in two passes:
//! - loads bottom-up (`DfsPostOrder`), children before parents
//! - voltages top-down (`Dfs`), parents before children

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{Dfs, DfsPostOrder};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::device::DeviceRecord;
use super::params::CircuitParameters;
use super::CircuitError;
use crate::wire;

/// Kind of node in the circuit tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// The supply source (panel or power extender)
    Root,
    /// A device on the main circuit or on a T-tap
    Device,
}

/// A node of the circuit tree.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitNode {
    pub kind: NodeKind,
    /// Device identifier, `None` for the root
    pub identifier: Option<String>,
    pub is_branch_device: bool,
    /// Feet of cable back to the parent node
    pub distance_from_parent: f64,
    /// Amps through the segment between this node and its parent
    pub accumulated_load: f64,
    /// Volts at this node after drop
    pub voltage: f64,
    /// 1-based position within the node's chain
    pub sequence_number: usize,
}

impl CircuitNode {
    pub fn root() -> Self {
        Self {
            kind: NodeKind::Root,
            identifier: None,
            is_branch_device: false,
            distance_from_parent: 0.0,
            accumulated_load: 0.0,
            voltage: 0.0,
            sequence_number: 0,
        }
    }

    pub fn device(identifier: impl Into<String>, distance_from_parent: f64) -> Self {
        Self {
            kind: NodeKind::Device,
            identifier: Some(identifier.into()),
            is_branch_device: false,
            distance_from_parent,
            accumulated_load: 0.0,
            voltage: 0.0,
            sequence_number: 0,
        }
    }

    pub fn as_branch(mut self) -> Self {
        self.is_branch_device = true;
        self
    }

    pub fn with_sequence(mut self, sequence_number: usize) -> Self {
        self.sequence_number = sequence_number;
        self
    }

    pub fn is_root(&self) -> bool {
        matches!(self.kind, NodeKind::Root)
    }

    pub fn id(&self) -> Option<&str> {
        self.identifier.as_deref()
    }
}

/// Result of one propagation run, keyed by node handle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElectricalState {
    loads: HashMap<NodeIndex, f64>,
    voltages: HashMap<NodeIndex, f64>,
}

impl ElectricalState {
    pub fn load_at(&self, ix: NodeIndex) -> f64 {
        self.loads.get(&ix).copied().unwrap_or(0.0)
    }

    pub fn voltage_at(&self, ix: NodeIndex) -> f64 {
        self.voltages.get(&ix).copied().unwrap_or(0.0)
    }
}

/// Arena-backed rooted tree of circuit nodes.
#[derive(Debug, Clone)]
pub struct CircuitTree {
    graph: StableDiGraph<CircuitNode, ()>,
    root: NodeIndex,
    index: HashMap<String, NodeIndex>,
}

impl CircuitTree {
    /// Create a tree holding only the root
    pub fn new() -> Self {
        let mut graph = StableDiGraph::new();
        let root = graph.add_node(CircuitNode::root());
        Self {
            graph,
            root,
            index: HashMap::new(),
        }
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn node(&self, ix: NodeIndex) -> Option<&CircuitNode> {
        self.graph.node_weight(ix)
    }

    pub fn node_mut(&mut self, ix: NodeIndex) -> Option<&mut CircuitNode> {
        self.graph.node_weight_mut(ix)
    }

    /// Find a device node by identifier
    pub fn find(&self, identifier: &str) -> Option<NodeIndex> {
        self.index.get(identifier).copied()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.index.contains_key(identifier)
    }

    pub fn parent(&self, ix: NodeIndex) -> Option<NodeIndex> {
        self.graph.neighbors_directed(ix, Direction::Incoming).next()
    }

    /// Children in insertion (wiring) order.
    pub fn children(&self, ix: NodeIndex) -> Vec<NodeIndex> {
        // petgraph yields the most recently added edge first
        let mut children: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(ix, Direction::Outgoing)
            .collect();
        children.reverse();
        children
    }

    /// Attach a new device node as the last child of `parent`.
    pub fn attach(
        &mut self,
        parent: NodeIndex,
        node: CircuitNode,
    ) -> Result<NodeIndex, CircuitError> {
        if self.graph.node_weight(parent).is_none() {
            return Err(CircuitError::Inconsistent(format!(
                "parent node {} is not part of the tree",
                parent.index()
            )));
        }
        let identifier = node.identifier.clone().ok_or_else(|| {
            CircuitError::Inconsistent("device node without identifier".to_string())
        })?;
        if self.index.contains_key(&identifier) {
            return Err(CircuitError::DuplicateDevice(identifier));
        }

        let ix = self.graph.add_node(node);
        self.graph.add_edge(parent, ix, ());
        self.index.insert(identifier, ix);
        Ok(ix)
    }

    /// `start` and everything below it, parents before children, siblings
    /// in wiring order.
    pub fn preorder(&self, start: NodeIndex) -> Vec<NodeIndex> {
        let mut order = Vec::new();
        let mut stack = vec![start];
        while let Some(ix) = stack.pop() {
            if self.graph.node_weight(ix).is_none() {
                continue;
            }
            order.push(ix);
            let mut children = self.children(ix);
            children.reverse();
            stack.extend(children);
        }
        order
    }

    /// Detach and drop `ix` together with all of its descendants.
    ///
    /// Returns the removed nodes in pre-order. The root cannot be removed.
    pub fn remove_subtree(&mut self, ix: NodeIndex) -> Vec<CircuitNode> {
        if ix == self.root {
            return Vec::new();
        }
        let doomed = self.preorder(ix);
        let mut removed = Vec::with_capacity(doomed.len());
        for node_ix in doomed {
            if let Some(node) = self.graph.remove_node(node_ix) {
                if let Some(id) = node.identifier.as_deref() {
                    self.index.remove(id);
                }
                removed.push(node);
            }
        }
        removed
    }

    /// All device nodes (arena order).
    pub fn device_nodes(&self) -> impl Iterator<Item = (NodeIndex, &CircuitNode)> {
        self.graph
            .node_indices()
            .filter_map(move |ix| self.graph.node_weight(ix).map(|n| (ix, n)))
            .filter(|(_, n)| !n.is_root())
    }

    /// Device nodes with no children (chain ends).
    pub fn leaves(&self) -> Vec<NodeIndex> {
        self.device_nodes()
            .map(|(ix, _)| ix)
            .filter(|&ix| self.graph.neighbors_directed(ix, Direction::Outgoing).next().is_none())
            .collect()
    }

    /// Number of device nodes
    pub fn device_count(&self) -> usize {
        self.graph.node_count() - 1
    }

    /// Node count including the root
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.device_count() == 0
    }

    /// Walk from `from` along the chain whose nodes have the given branch flag.
    ///
    /// Chains are strictly linear, so at each step at most one child carries
    /// the flag.
    pub fn chain_from(&self, from: NodeIndex, branch: bool) -> Vec<NodeIndex> {
        let mut chain = Vec::new();
        let mut cursor = from;
        while let Some(next) = self
            .children(cursor)
            .into_iter()
            .find(|&c| self.graph.node_weight(c).map(|n| n.is_branch_device) == Some(branch))
        {
            chain.push(next);
            cursor = next;
        }
        chain
    }

    /// Compute loads and voltages without touching the stored attributes.
    pub fn solve(
        &self,
        params: &CircuitParameters,
        devices: &BTreeMap<String, DeviceRecord>,
    ) -> ElectricalState {
        let mut state = ElectricalState::default();

        let mut post = DfsPostOrder::new(&self.graph, self.root);
        while let Some(ix) = post.next(&self.graph) {
            let own = self
                .graph
                .node_weight(ix)
                .and_then(|n| n.id())
                .and_then(|id| devices.get(id))
                .map(|d| d.alarm_current)
                .unwrap_or(0.0);
            let downstream: f64 = self
                .graph
                .neighbors_directed(ix, Direction::Outgoing)
                .map(|c| state.load_at(c))
                .sum();
            state.loads.insert(ix, own + downstream);
        }

        let ohms = params.resistance_per_1000ft;
        let mut pre = Dfs::new(&self.graph, self.root);
        while let Some(ix) = pre.next(&self.graph) {
            let load = state.load_at(ix);
            let voltage = match self.parent(ix) {
                None => {
                    params.system_voltage
                        - wire::loop_voltage_drop(load, ohms, params.supply_distance)
                }
                Some(parent) => {
                    let distance = self
                        .graph
                        .node_weight(ix)
                        .map(|n| n.distance_from_parent)
                        .unwrap_or(0.0);
                    state.voltage_at(parent) - wire::loop_voltage_drop(load, ohms, distance)
                }
            };
            state.voltages.insert(ix, voltage);
        }

        state
    }

    /// Write a solved state back into the nodes.
    pub fn apply(&mut self, state: &ElectricalState) {
        let indices: Vec<NodeIndex> = self.graph.node_indices().collect();
        for ix in indices {
            if let Some(node) = self.graph.node_weight_mut(ix) {
                node.accumulated_load = state.load_at(ix);
                node.voltage = state.voltage_at(ix);
            }
        }
    }

    /// The attributes currently stored on the nodes.
    pub fn snapshot(&self) -> ElectricalState {
        let mut state = ElectricalState::default();
        for ix in self.graph.node_indices() {
            if let Some(node) = self.graph.node_weight(ix) {
                state.loads.insert(ix, node.accumulated_load);
                state.voltages.insert(ix, node.voltage);
            }
        }
        state
    }
}

impl Default for CircuitTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices(ids: &[(&str, f64)]) -> BTreeMap<String, DeviceRecord> {
        ids.iter()
            .map(|(id, amps)| (id.to_string(), DeviceRecord::new(*id, *id, *amps, 0.0)))
            .collect()
    }

    #[test]
    fn test_children_keep_wiring_order() {
        let mut tree = CircuitTree::new();
        let a = tree.attach(tree.root(), CircuitNode::device("A", 10.0)).unwrap();
        let b = tree.attach(a, CircuitNode::device("B", 10.0)).unwrap();
        let t = tree.attach(a, CircuitNode::device("T1", 5.0).as_branch()).unwrap();
        let c = tree.attach(a, CircuitNode::device("C", 5.0).as_branch()).unwrap();

        assert_eq!(tree.children(a), vec![b, t, c]);
        assert_eq!(tree.parent(t), Some(a));
        assert_eq!(tree.parent(tree.root()), None);
        assert_eq!(tree.preorder(tree.root()), vec![tree.root(), a, b, t, c]);
    }

    #[test]
    fn test_duplicate_identifier_rejected() {
        let mut tree = CircuitTree::new();
        tree.attach(tree.root(), CircuitNode::device("A", 0.0)).unwrap();
        let err = tree.attach(tree.root(), CircuitNode::device("A", 0.0)).unwrap_err();
        assert!(matches!(err, CircuitError::DuplicateDevice(id) if id == "A"));
    }

    #[test]
    fn test_remove_subtree_keeps_other_handles() {
        let mut tree = CircuitTree::new();
        let a = tree.attach(tree.root(), CircuitNode::device("A", 10.0)).unwrap();
        let b = tree.attach(a, CircuitNode::device("B", 10.0)).unwrap();
        let _c = tree.attach(b, CircuitNode::device("C", 10.0)).unwrap();
        let t = tree.attach(a, CircuitNode::device("T", 10.0).as_branch()).unwrap();

        let removed = tree.remove_subtree(b);
        let ids: Vec<_> = removed.iter().filter_map(|n| n.id()).collect();
        assert_eq!(ids, vec!["B", "C"]);
        assert_eq!(tree.find("T"), Some(t));
        assert!(tree.find("C").is_none());
        assert_eq!(tree.device_count(), 2);

        assert!(tree.remove_subtree(tree.root()).is_empty());
    }

    #[test]
    fn test_empty_tree_has_source_voltage() {
        let tree = CircuitTree::new();
        let params = CircuitParameters::default();
        let state = tree.solve(&params, &BTreeMap::new());
        assert_eq!(state.voltage_at(tree.root()), params.system_voltage);
        assert_eq!(state.load_at(tree.root()), 0.0);
    }

    #[test]
    fn test_solve_branch_loads_flow_through_tap() {
        let mut tree = CircuitTree::new();
        let a = tree.attach(tree.root(), CircuitNode::device("A", 100.0)).unwrap();
        let b = tree.attach(a, CircuitNode::device("B", 100.0)).unwrap();
        let t = tree.attach(a, CircuitNode::device("T", 100.0).as_branch()).unwrap();

        let params = CircuitParameters::default();
        let state = tree.solve(&params, &devices(&[("A", 0.1), ("B", 0.2), ("T", 0.3)]));

        assert!((state.load_at(a) - 0.6).abs() < 1e-12);
        assert!((state.load_at(b) - 0.2).abs() < 1e-12);
        assert!((state.load_at(t) - 0.3).abs() < 1e-12);
        assert!((state.load_at(tree.root()) - 0.6).abs() < 1e-12);

        let drop_t = wire::loop_voltage_drop(0.3, 4.016, 100.0);
        assert!((state.voltage_at(a) - state.voltage_at(t) - drop_t).abs() < 1e-12);
    }

    #[test]
    fn test_zero_distance_has_no_drop() {
        let mut tree = CircuitTree::new();
        let a = tree.attach(tree.root(), CircuitNode::device("A", 0.0)).unwrap();
        let params = CircuitParameters::default();
        let state = tree.solve(&params, &devices(&[("A", 1.0)]));
        assert_eq!(state.voltage_at(a), state.voltage_at(tree.root()));
    }

    #[test]
    fn test_apply_then_snapshot() {
        let mut tree = CircuitTree::new();
        tree.attach(tree.root(), CircuitNode::device("A", 20.0)).unwrap();
        let params = CircuitParameters::default();
        let state = tree.solve(&params, &devices(&[("A", 0.5)]));
        tree.apply(&state);
        assert_eq!(tree.snapshot(), state);
    }
}
