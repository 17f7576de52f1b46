//! Device records supplied by the host CAD layer.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::CircuitError;

const PLACEHOLDER_PREFIX: &str = "unresolved-";

/// Opaque handle into the host model (element id, connector id, ...).
///
/// The engine never interprets it; it is carried along so that wiring
/// collaborators can find the physical connector again.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionRef(String);

impl ConnectionRef {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One physical device on the circuit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub identifier: String,
    pub name: String,
    /// Alarm-mode current draw in amps
    pub alarm_current: f64,
    /// Standby-mode current draw in amps
    pub standby_current: f64,
    #[serde(default)]
    pub device_type: String,
    /// Only meaningful within a live host session, never persisted.
    #[serde(skip)]
    pub connection: Option<ConnectionRef>,
}

impl DeviceRecord {
    pub fn new(
        identifier: impl Into<String>,
        name: impl Into<String>,
        alarm_current: f64,
        standby_current: f64,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            alarm_current,
            standby_current,
            device_type: String::new(),
            connection: None,
        }
    }

    /// A record for a device the host could not resolve yet.
    pub fn placeholder(name: impl Into<String>) -> Self {
        Self::new(
            format!("{}{}", PLACEHOLDER_PREFIX, Uuid::new_v4()),
            name,
            0.0,
            0.0,
        )
    }

    pub fn with_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = device_type.into();
        self
    }

    pub fn with_connection(mut self, connection: ConnectionRef) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Reject currents the load and voltage passes cannot work with.
    pub fn validate(&self) -> Result<(), CircuitError> {
        for (label, amps) in [
            ("alarm current", self.alarm_current),
            ("standby current", self.standby_current),
        ] {
            if !amps.is_finite() || amps < 0.0 {
                return Err(CircuitError::InvalidParameter(format!(
                    "device '{}' {} must be a non-negative number of amps, got {}",
                    self.identifier, label, amps
                )));
            }
        }
        Ok(())
    }

    pub fn is_placeholder(&self) -> bool {
        self.identifier.starts_with(PLACEHOLDER_PREFIX)
    }

    /// Short tag used on schematic labels ("HS", "SPK", ...).
    pub fn abbreviation(&self) -> String {
        abbreviate(&self.device_type)
    }
}

fn abbreviate(device_type: &str) -> String {
    let normalized = device_type
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_' || c == '/')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>();

    let words: Vec<&str> = normalized.iter().map(String::as_str).collect();
    let known = match words.as_slice() {
        [] => Some("DEV"),
        ["horn", "strobe"] => Some("HS"),
        ["speaker", "strobe"] => Some("SS"),
        ["strobe"] => Some("S"),
        ["horn"] => Some("H"),
        ["speaker"] => Some("SPK"),
        ["smoke", "detector"] => Some("SD"),
        ["heat", "detector"] => Some("HD"),
        ["pull", "station"] => Some("PS"),
        ["module"] => Some("MOD"),
        _ => None,
    };

    match known {
        Some(tag) => tag.to_string(),
        None => words
            .iter()
            .filter_map(|w| w.chars().next())
            .flat_map(char::to_uppercase)
            .collect(),
    }
}
