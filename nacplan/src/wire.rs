//! Wire Resistance Table
//!
//! Single-conductor resistance of solid copper wire at 20 °C, expressed in
//! ohms per 1000 feet. Notification circuits are two-wire runs, so every
//! drop computed from this table doubles the conductor length.

use serde::Serialize;

/// One row of the resistance table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WireGauge {
    pub label: &'static str,
    pub awg: u8,
    pub ohms_per_1000ft: f64,
}

const GAUGES: [WireGauge; 5] = [
    WireGauge {
        label: "18 AWG",
        awg: 18,
        ohms_per_1000ft: 6.385,
    },
    WireGauge {
        label: "16 AWG",
        awg: 16,
        ohms_per_1000ft: 4.016,
    },
    WireGauge {
        label: "14 AWG",
        awg: 14,
        ohms_per_1000ft: 2.525,
    },
    WireGauge {
        label: "12 AWG",
        awg: 12,
        ohms_per_1000ft: 1.588,
    },
    WireGauge {
        label: "10 AWG",
        awg: 10,
        ohms_per_1000ft: 0.999,
    },
];

/// All supported gauges, thinnest first.
pub fn gauges() -> &'static [WireGauge] {
    &GAUGES
}

/// Look up a gauge by label. Accepts `"16 AWG"`, `"16awg"`, `"16"` and so on.
pub fn lookup(label: &str) -> Option<&'static WireGauge> {
    let awg = parse_awg(label)?;
    GAUGES.iter().find(|g| g.awg == awg)
}

/// Ohms per 1000 ft for a gauge label.
pub fn resistance_per_1000ft(label: &str) -> Option<f64> {
    lookup(label).map(|g| g.ohms_per_1000ft)
}

/// Voltage lost over a two-wire run of `distance_ft` carrying `load_amps`.
pub fn loop_voltage_drop(load_amps: f64, ohms_per_1000ft: f64, distance_ft: f64) -> f64 {
    2.0 * load_amps * ohms_per_1000ft / 1000.0 * distance_ft
}

fn parse_awg(label: &str) -> Option<u8> {
    let upper = label.trim().to_uppercase();
    let digits = upper
        .strip_suffix("AWG")
        .unwrap_or(upper.as_str())
        .trim()
        .trim_start_matches('#');
    digits.parse::<u8>().ok()
}
