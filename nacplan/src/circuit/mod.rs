//! Circuit Topology Module
//!
//! A circuit is a supply root feeding a linear main chain of devices, with
//! optional linear T-tap chains tapped off main-chain devices:
//!
//! ```text
//! Root ── D1 ── D2 ── D3 ── D4        main circuit
//!               │
//!               └── B1 ── B2           T-Tap 1 (tap point D2)
//! ```
//!
//! [`CircuitManager`] owns the tree and keeps the flattened views (main
//! sequence, branch registry, device registry) consistent with it.

pub mod device;
pub mod manager;
pub mod params;
pub mod tree;

use thiserror::Error;

pub use device::{ConnectionRef, DeviceRecord};
pub use manager::{CircuitManager, DeviceResolver, EditMode, ModeKind, RemovedSubtree};
pub use params::CircuitParameters;
pub use tree::{CircuitNode, CircuitTree, ElectricalState, NodeKind};

/// Editing mistakes and bad inputs. None of these leave the circuit changed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CircuitError {
    #[error("Operation requires {expected:?} mode but the circuit is in {actual:?} mode")]
    ModeMismatch { expected: ModeKind, actual: ModeKind },

    #[error("Device '{0}' is already part of the circuit")]
    DuplicateDevice(String),

    #[error("Unknown device '{0}'")]
    UnknownDevice(String),

    #[error("Device '{0}' is not on the main circuit")]
    NotOnMainCircuit(String),

    #[error("No T-tap to resume")]
    NoActiveTap,

    #[error("Unknown wire gauge '{0}'")]
    UnknownGauge(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Inconsistent circuit: {0}")]
    Inconsistent(String),
}
