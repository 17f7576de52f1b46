//! Circuit Persistence
//!
//! [`CircuitConfiguration`] is the saved form of a [`CircuitManager`]: the
//! tree as a flat list of nodes in wiring order (each naming its parent), the
//! flattened sequences, the device registry, the parameters and some metadata
//! for listing. The flat list keeps the JSON nesting depth constant however
//! long the chains get. Connection references are host-session state and are
//! never written; after a load the host re-resolves them with
//! [`CircuitManager::reattach_connections`].

pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use uuid::Uuid;

use crate::circuit::{CircuitError, CircuitManager, CircuitNode, CircuitParameters, DeviceRecord};

pub use store::{ConfigurationStore, JsonDirectoryStore};

/// Format version written by this crate.
pub const SCHEMA_VERSION: u32 = 1;

/// Errors raised while reading or writing configurations
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported configuration version {found} (this build reads version {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Inconsistent configuration: {0}")]
    Inconsistent(String),
}

/// Saved device node.
///
/// Nodes are stored parents first; a node's children are the later entries
/// naming it as `parent`, in list order. No `parent` means the supply root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedNode {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub is_branch_device: bool,
    #[serde(default)]
    pub distance_from_parent: f64,
    #[serde(default)]
    pub sequence_number: usize,
}

/// Listing metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfigurationMetadata {
    pub total_devices: usize,
    pub main_circuit_devices: usize,
    pub total_branches: usize,
    pub project_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitConfiguration {
    pub id: Uuid,
    pub schema_version: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub parameters: CircuitParameters,
    #[serde(default)]
    pub nodes: Vec<SavedNode>,
    #[serde(default)]
    pub main_circuit: Vec<String>,
    #[serde(default)]
    pub branches: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub branch_names: BTreeMap<String, String>,
    #[serde(default)]
    pub device_data: BTreeMap<String, DeviceRecord>,
    pub metadata: ConfigurationMetadata,
}

impl CircuitConfiguration {
    pub fn to_json(&self) -> Result<String, ConfigurationError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a configuration, rejecting versions this build cannot read.
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let found = value
            .get("schema_version")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| inconsistent("missing schema_version".to_string()))?;
        if found != u64::from(SCHEMA_VERSION) {
            return Err(ConfigurationError::UnsupportedVersion {
                found: u32::try_from(found).unwrap_or(u32::MAX),
                expected: SCHEMA_VERSION,
            });
        }
        Ok(serde_json::from_value(value)?)
    }
}

impl CircuitManager {
    /// Snapshot the circuit as a new configuration.
    pub fn save(&self, name: &str, description: &str) -> CircuitConfiguration {
        let now = Utc::now();
        CircuitConfiguration {
            id: Uuid::new_v4(),
            schema_version: SCHEMA_VERSION,
            name: name.to_string(),
            description: description.to_string(),
            created_at: now,
            modified_at: now,
            parameters: self.parameters.clone(),
            nodes: self.saved_nodes(),
            main_circuit: self.main_circuit.clone(),
            branches: self.branches.clone(),
            branch_names: self.branch_names.clone(),
            device_data: self.device_data.clone(),
            metadata: ConfigurationMetadata {
                total_devices: self.device_data.len(),
                main_circuit_devices: self.main_circuit.len(),
                total_branches: self.branches.len(),
                project_name: name.to_string(),
            },
        }
    }

    /// Snapshot the circuit over an earlier save, keeping its identity.
    pub fn save_over(&self, previous: &CircuitConfiguration) -> CircuitConfiguration {
        let mut config = self.save(&previous.name, &previous.description);
        config.id = previous.id;
        config.created_at = previous.created_at;
        config.metadata.project_name = previous.metadata.project_name.clone();
        config
    }

    /// Build a manager from a configuration.
    pub fn from_configuration(config: &CircuitConfiguration) -> Result<Self, ConfigurationError> {
        if config.schema_version != SCHEMA_VERSION {
            return Err(ConfigurationError::UnsupportedVersion {
                found: config.schema_version,
                expected: SCHEMA_VERSION,
            });
        }
        config
            .parameters
            .validate()
            .map_err(|e| inconsistent(e.to_string()))?;

        let mut manager = CircuitManager::with_parameters_unchecked(config.parameters.clone());
        for saved in &config.nodes {
            manager.restore_node(saved)?;
        }

        let mut seen = HashSet::new();
        for id in &config.main_circuit {
            if !seen.insert(id.as_str()) {
                return Err(inconsistent(format!("'{}' listed twice on the main circuit", id)));
            }
            expect_node(&manager, id, false)?;
        }
        for (tap, chain) in &config.branches {
            if !config.main_circuit.contains(tap) {
                return Err(inconsistent(format!(
                    "tap point '{}' is not on the main circuit",
                    tap
                )));
            }
            for id in chain {
                if !seen.insert(id.as_str()) {
                    return Err(inconsistent(format!("'{}' listed on more than one chain", id)));
                }
                expect_node(&manager, id, true)?;
            }
        }
        if let Some(saved) = config.nodes.iter().find(|n| !seen.contains(n.identifier.as_str())) {
            return Err(inconsistent(format!(
                "'{}' is in the tree but on no chain",
                saved.identifier
            )));
        }
        if let Some(tap) = config
            .branch_names
            .keys()
            .find(|t| !config.branches.contains_key(*t))
        {
            return Err(inconsistent(format!(
                "branch name registered for unknown tap '{}'",
                tap
            )));
        }

        manager.main_circuit = config.main_circuit.clone();
        manager.branches = config.branches.clone();
        manager.branch_names = config.branch_names.clone();
        let unnamed: Vec<String> = manager
            .branches
            .keys()
            .filter(|tap| !manager.branch_names.contains_key(*tap))
            .cloned()
            .collect();
        for tap in unnamed {
            let name = manager.next_branch_name();
            tracing::warn!("Branch at '{}' had no name, using {}", tap, name);
            manager.branch_names.insert(tap, name);
        }

        for (key, record) in &config.device_data {
            if *key != record.identifier {
                return Err(inconsistent(format!(
                    "device record '{}' is stored under '{}'",
                    record.identifier, key
                )));
            }
            record.validate().map_err(|e| inconsistent(e.to_string()))?;
            if manager.tree.contains(key) {
                manager.device_data.insert(key.clone(), record.clone());
            } else {
                tracing::warn!("Dropping device record '{}' with no node in the circuit", key);
            }
        }
        let missing = manager
            .tree
            .device_nodes()
            .filter_map(|(_, n)| n.id())
            .filter(|id| !manager.device_data.contains_key(*id))
            .count();
        if missing > 0 {
            tracing::warn!("{} devices were loaded without a device record", missing);
        }

        manager.recalculate();
        tracing::info!(
            "Loaded configuration '{}' ({} devices, {} branches)",
            config.name,
            manager.device_count(),
            manager.branches.len()
        );
        Ok(manager)
    }

    /// Replace this circuit with a saved one. On error nothing changes.
    pub fn load(&mut self, config: &CircuitConfiguration) -> Result<(), ConfigurationError> {
        *self = Self::from_configuration(config)?;
        Ok(())
    }

    fn saved_nodes(&self) -> Vec<SavedNode> {
        let tree = &self.tree;
        tree.preorder(tree.root())
            .into_iter()
            .filter_map(|ix| {
                let node = tree.node(ix)?;
                let identifier = node.id()?.to_string();
                let parent = tree
                    .parent(ix)
                    .and_then(|p| tree.node(p))
                    .and_then(|p| p.id())
                    .map(str::to_string);
                Some(SavedNode {
                    identifier,
                    parent,
                    is_branch_device: node.is_branch_device,
                    distance_from_parent: node.distance_from_parent,
                    sequence_number: node.sequence_number,
                })
            })
            .collect()
    }

    fn restore_node(&mut self, saved: &SavedNode) -> Result<(), ConfigurationError> {
        let identifier = &saved.identifier;
        if !saved.distance_from_parent.is_finite() || saved.distance_from_parent < 0.0 {
            return Err(inconsistent(format!(
                "device '{}' has invalid distance {}",
                identifier, saved.distance_from_parent
            )));
        }
        let parent = match &saved.parent {
            Some(parent) => self.tree.find(parent).ok_or_else(|| {
                inconsistent(format!(
                    "parent '{}' of '{}' is not listed before it",
                    parent, identifier
                ))
            })?,
            None => self.tree.root(),
        };

        let mut node = CircuitNode::device(identifier.clone(), saved.distance_from_parent)
            .with_sequence(saved.sequence_number);
        node.is_branch_device = saved.is_branch_device;
        self.tree.attach(parent, node).map_err(|e| match e {
            CircuitError::DuplicateDevice(id) => {
                inconsistent(format!("device '{}' appears twice", id))
            }
            other => inconsistent(other.to_string()),
        })?;
        Ok(())
    }
}

fn expect_node(
    manager: &CircuitManager,
    identifier: &str,
    branch: bool,
) -> Result<(), ConfigurationError> {
    let node = manager
        .node_for(identifier)
        .ok_or_else(|| inconsistent(format!("'{}' is listed but not in the tree", identifier)))?;
    if node.is_branch_device != branch {
        return Err(inconsistent(format!(
            "'{}' is listed on the {} chain but flagged otherwise",
            identifier,
            if branch { "branch" } else { "main" }
        )));
    }
    Ok(())
}

fn inconsistent(message: String) -> ConfigurationError {
    ConfigurationError::Inconsistent(message)
}
