//! File-level workflows shared by the CLI and any other front end.
//! A design lives in one JSON configuration file.

use std::fs;
use std::path::{Path, PathBuf};

use crate::circuit::{CircuitError, CircuitManager, CircuitParameters};
use crate::persistence::{CircuitConfiguration, ConfigurationError};
use crate::report::CircuitSummary;
use crate::validation::{ValidationOptions, ValidationReport, Validator};

#[derive(Debug, thiserror::Error)]
pub enum NacPlanError {
    #[error("Circuit error: {0}")]
    Circuit(#[from] CircuitError),
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

/// Validation outcome for one design file.
#[derive(Debug, Clone)]
pub struct DesignCheck {
    pub file: PathBuf,
    pub name: String,
    pub report: ValidationReport,
    pub summary: CircuitSummary,
}

impl DesignCheck {
    pub fn is_valid(&self) -> bool {
        self.report.is_valid()
    }
}

pub struct NacPlanCore;

impl NacPlanCore {
    /// Write a new, empty design. Refuses to overwrite an existing file.
    pub fn create_design(
        path: &Path,
        name: &str,
        description: &str,
        parameters: CircuitParameters,
    ) -> Result<CircuitConfiguration, NacPlanError> {
        if path.exists() {
            return Err(NacPlanError::Other(format!(
                "{} already exists",
                path.display()
            )));
        }
        let mut manager = CircuitManager::new(parameters)?;
        manager.recalculate();
        let config = manager.save(name, description);
        fs::write(path, config.to_json()?)?;
        tracing::info!("Created design '{}' at {}", name, path.display());
        Ok(config)
    }

    /// Read a design file and rebuild its circuit.
    pub fn open_design(
        path: &Path,
    ) -> Result<(CircuitConfiguration, CircuitManager), NacPlanError> {
        let json = fs::read_to_string(path)?;
        let config = CircuitConfiguration::from_json(&json)?;
        let manager = CircuitManager::from_configuration(&config)?;
        Ok((config, manager))
    }

    /// Recalculate and write `manager` back over `previous`.
    pub fn write_design(
        path: &Path,
        previous: &CircuitConfiguration,
        manager: &mut CircuitManager,
    ) -> Result<CircuitConfiguration, NacPlanError> {
        manager.recalculate();
        let config = manager.save_over(previous);
        fs::write(path, config.to_json()?)?;
        Ok(config)
    }

    /// Open, validate and summarise a design file.
    pub fn check_design(
        path: &Path,
        options: ValidationOptions,
    ) -> Result<DesignCheck, NacPlanError> {
        let (config, manager) = Self::open_design(path)?;
        let report = Validator::new(options).validate(&manager);
        Ok(DesignCheck {
            file: path.to_path_buf(),
            name: config.name,
            summary: CircuitSummary::from_manager(&manager),
            report,
        })
    }
}
