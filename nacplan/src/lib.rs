//! NacPlan - topology and voltage-drop engine for notification appliance
//! circuits
//!
//! A circuit is a supply feeding a main chain of devices, with optional
//! T-tap chains tapped off main-chain devices. After every edit the engine
//! re-derives the current through each cable segment and the voltage at
//! each device, and checks the result against the circuit's limits.
//!
//! # Quick Start
//!
//! ```
//! use nacplan::prelude::*;
//!
//! let mut circuit = CircuitManager::new(CircuitParameters::default()).unwrap();
//! circuit.add_device_to_main(DeviceRecord::new("E-1", "Horn Strobe", 0.12, 0.0), 60.0).unwrap();
//! circuit.add_device_to_main(DeviceRecord::new("E-2", "Horn Strobe", 0.12, 0.0), 45.0).unwrap();
//! circuit.start_branch_from_device("E-1").unwrap();
//! circuit.add_device_to_branch(DeviceRecord::new("E-3", "Strobe", 0.08, 0.0), 30.0).unwrap();
//! circuit.recalculate();
//!
//! let report = nacplan::validate(&circuit);
//! assert!(report.is_valid());
//! println!("EOL voltage: {:.2} V", circuit.end_of_line_voltage().unwrap());
//! ```

pub mod circuit;
pub mod core;
pub mod persistence;
pub mod report;
pub mod validation;
pub mod wire;

// Re-export main types
pub use circuit::{
    CircuitError, CircuitManager, CircuitNode, CircuitParameters, ConnectionRef, DeviceRecord,
    DeviceResolver, EditMode, ModeKind, NodeKind, RemovedSubtree,
};
pub use crate::core::{DesignCheck, NacPlanCore, NacPlanError};
pub use persistence::{
    CircuitConfiguration, ConfigurationError, ConfigurationStore, JsonDirectoryStore,
};
pub use report::{CircuitSummary, DeviceRow};
pub use validation::{validate, ValidationOptions, ValidationReport, Validator};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        CircuitConfiguration, CircuitError, CircuitManager, CircuitParameters, DeviceRecord,
        ModeKind, NacPlanError, ValidationReport,
    };
}
