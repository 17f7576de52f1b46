//! Circuit calculation parameters.

use serde::{Deserialize, Serialize};

use super::CircuitError;
use crate::wire;

/// Fixed inputs for one electrical calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitParameters {
    /// Source voltage at the panel/power supply terminals
    pub system_voltage: f64,
    /// Lowest voltage any device may see
    pub min_voltage: f64,
    /// Rated output of the circuit in amps
    pub max_load: f64,
    /// Fraction of `max_load` kept in reserve (0.20 = 20 %)
    pub safety_percent: f64,
    pub wire_gauge: String,
    pub resistance_per_1000ft: f64,
    /// Feet of cable between the supply and the first device
    pub supply_distance: f64,
    /// Extra cable for routing (0.10 = 10 %), used for cable estimates only
    pub routing_overhead: f64,
}

impl Default for CircuitParameters {
    fn default() -> Self {
        Self {
            system_voltage: 29.0,
            min_voltage: 16.0,
            max_load: 3.0,
            safety_percent: 0.20,
            wire_gauge: "16 AWG".to_string(),
            resistance_per_1000ft: 4.016,
            supply_distance: 50.0,
            routing_overhead: 0.10,
        }
    }
}

impl CircuitParameters {
    /// Select a gauge from the resistance table.
    pub fn with_gauge(mut self, label: &str) -> Result<Self, CircuitError> {
        let gauge =
            wire::lookup(label).ok_or_else(|| CircuitError::UnknownGauge(label.to_string()))?;
        self.wire_gauge = gauge.label.to_string();
        self.resistance_per_1000ft = gauge.ohms_per_1000ft;
        Ok(self)
    }

    /// Maximum load after the safety reserve is taken off.
    pub fn usable_load(&self) -> f64 {
        self.max_load * (1.0 - self.safety_percent)
    }

    pub fn validate(&self) -> Result<(), CircuitError> {
        let fields = [
            ("system_voltage", self.system_voltage),
            ("min_voltage", self.min_voltage),
            ("max_load", self.max_load),
            ("safety_percent", self.safety_percent),
            ("resistance_per_1000ft", self.resistance_per_1000ft),
            ("supply_distance", self.supply_distance),
            ("routing_overhead", self.routing_overhead),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(CircuitError::InvalidParameter(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if self.safety_percent >= 1.0 {
            return Err(CircuitError::InvalidParameter(format!(
                "safety_percent must be below 1.0, got {}",
                self.safety_percent
            )));
        }
        if self.min_voltage > self.system_voltage {
            return Err(CircuitError::InvalidParameter(format!(
                "min_voltage {:.2} V exceeds system_voltage {:.2} V",
                self.min_voltage, self.system_voltage
            )));
        }
        Ok(())
    }
}
