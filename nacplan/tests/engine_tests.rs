//! Propagation and topology properties of the circuit engine

use approx::assert_abs_diff_eq;
use nacplan::prelude::*;

fn params(system: f64, min: f64, ohms: f64, supply: f64) -> CircuitParameters {
    CircuitParameters {
        system_voltage: system,
        min_voltage: min,
        resistance_per_1000ft: ohms,
        supply_distance: supply,
        ..CircuitParameters::default()
    }
}

fn main_chain(n: usize, amps: f64, feet: f64) -> CircuitManager {
    let mut manager = CircuitManager::default();
    for i in 1..=n {
        manager
            .add_device_to_main(DeviceRecord::new(format!("D{}", i), "Strobe", amps, 0.0), feet)
            .expect("Should add main device");
    }
    manager.recalculate();
    manager
}

#[test]
fn test_accumulated_load_counts_downstream_devices() {
    let n = 6;
    let amps = 0.075;
    let manager = main_chain(n, amps, 25.0);

    for position in 1..=n {
        let node = manager.node_for(&format!("D{}", position)).unwrap();
        // position k from the far end is n - position + 1
        let expected = (n - position + 1) as f64 * amps;
        assert_abs_diff_eq!(node.accumulated_load, expected, epsilon = 1e-12);
    }

    let root = manager.tree().node(manager.tree().root()).unwrap();
    assert_abs_diff_eq!(root.accumulated_load, n as f64 * amps, epsilon = 1e-12);
}

#[test]
fn test_closed_form_three_devices() {
    let mut manager = CircuitManager::new(params(29.0, 16.0, 4.016, 50.0)).unwrap();
    for id in ["D1", "D2", "D3"] {
        manager
            .add_device_to_main(DeviceRecord::new(id, id, 0.030, 0.0), 50.0)
            .unwrap();
    }
    manager.recalculate();

    let drop = |load: f64| 2.0 * load * 4.016 / 1000.0 * 50.0;
    let root = 29.0 - drop(0.09);
    let v1 = root - drop(0.09);
    let v2 = v1 - drop(0.06);
    let v3 = v2 - drop(0.03);

    assert_abs_diff_eq!(manager.node_for("D1").unwrap().voltage, v1, epsilon = 1e-9);
    assert_abs_diff_eq!(manager.node_for("D2").unwrap().voltage, v2, epsilon = 1e-9);
    assert_abs_diff_eq!(manager.node_for("D3").unwrap().voltage, v3, epsilon = 1e-9);
    assert_abs_diff_eq!(v3, 28.891568, epsilon = 1e-9);
    assert_abs_diff_eq!(manager.end_of_line_voltage().unwrap(), v3, epsilon = 1e-9);
}

#[test]
fn test_voltage_never_rises_toward_the_leaves() {
    let mut manager = main_chain(5, 0.1, 40.0);
    manager.start_branch_from_device("D2").unwrap();
    for i in 1..=4 {
        let horn = DeviceRecord::new(format!("B{}", i), "Horn", 0.05, 0.0);
        manager.add_device_to_branch(horn, 15.0 * i as f64).unwrap();
    }
    manager.end_branch();
    manager.start_branch_from_device("D4").unwrap();
    manager
        .add_device_to_branch(DeviceRecord::new("C1", "Speaker", 0.2, 0.0), 0.0)
        .unwrap();
    manager.recalculate();

    let tree = manager.tree();
    for leaf in tree.leaves() {
        let mut cursor = leaf;
        while let Some(parent) = tree.parent(cursor) {
            let child_v = tree.node(cursor).unwrap().voltage;
            let parent_v = tree.node(parent).unwrap().voltage;
            assert!(child_v <= parent_v, "voltage rose from {} to {}", parent_v, child_v);
            cursor = parent;
        }
    }

    // zero-length run: no drop between tap and first branch device
    let d4 = manager.node_for("D4").unwrap().voltage;
    assert_abs_diff_eq!(manager.node_for("C1").unwrap().voltage, d4, epsilon = 1e-12);
}

#[test]
fn test_recalculate_is_idempotent() {
    let mut manager = main_chain(4, 0.11, 33.0);
    manager.start_branch_from_device("D1").unwrap();
    manager
        .add_device_to_branch(DeviceRecord::new("B1", "Strobe", 0.07, 0.0), 12.0)
        .unwrap();
    manager.recalculate();
    let first = manager.electrical_state();

    manager.recalculate();
    let second = manager.electrical_state();
    assert_eq!(first, second);
}

#[test]
fn test_tap_point_removal_cascades() {
    let mut manager = main_chain(4, 0.1, 20.0);
    manager.start_branch_from_device("D1").unwrap();
    manager
        .add_device_to_branch(DeviceRecord::new("A1", "Horn", 0.1, 0.0), 10.0)
        .unwrap();
    manager.end_branch();
    manager.start_branch_from_device("D4").unwrap();
    manager
        .add_device_to_branch(DeviceRecord::new("Z1", "Horn", 0.1, 0.0), 10.0)
        .unwrap();
    manager
        .add_device_to_branch(DeviceRecord::new("Z2", "Horn", 0.1, 0.0), 10.0)
        .unwrap();
    manager.end_branch();

    let removed = manager.remove_device("D4").expect("Should remove tap point");
    assert_eq!(removed.removed, vec!["D4", "Z1", "Z2"]);
    assert_eq!(removed.removed_taps, vec!["D4"]);

    for id in ["D4", "Z1", "Z2"] {
        assert!(!manager.contains(id), "{} should be gone", id);
        assert!(manager.device(id).is_none());
    }
    assert!(manager.branch("D4").is_none());
    assert!(manager.branch_name("D4").is_none());

    assert_eq!(manager.main_circuit(), ["D1", "D2", "D3"]);
    assert_eq!(manager.branch("D1").unwrap(), ["A1"]);
    assert_eq!(manager.branch_name("D1"), Some("T-Tap 1"));
    assert!(nacplan::validate(&manager).is_valid());
}

#[test]
fn test_edits_invalidate_until_recalculated() {
    let mut manager = main_chain(2, 0.1, 20.0);
    assert!(!manager.is_stale());
    let before = manager.node_for("D2").unwrap().voltage;

    manager
        .add_device_to_main(DeviceRecord::new("D3", "Strobe", 0.5, 0.0), 20.0)
        .unwrap();
    assert!(manager.is_stale());
    // stored value is untouched until the passes run again
    assert_eq!(manager.node_for("D2").unwrap().voltage, before);

    manager.recalculate();
    assert!(manager.node_for("D2").unwrap().voltage < before);
}
