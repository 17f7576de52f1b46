//! Save/load round trips and file workflows

use nacplan::prelude::*;
use nacplan::{
    ConfigurationError, ConfigurationStore, ConnectionRef, JsonDirectoryStore, NacPlanCore,
    ValidationOptions,
};
use tempfile::TempDir;

fn design() -> CircuitManager {
    let params = CircuitParameters::default().with_gauge("14 AWG").unwrap();
    let mut manager = CircuitManager::new(params).expect("Should accept parameters");
    for (id, feet) in [("E-101", 80.0), ("E-102", 45.5), ("E-103", 60.0), ("E-104", 35.0)] {
        let device = DeviceRecord::new(id, format!("HS {}", id), 0.094, 0.0)
            .with_type("Horn Strobe")
            .with_connection(ConnectionRef::new(format!("elem:{}", id)));
        manager.add_device_to_main(device, feet).unwrap();
    }
    manager.start_branch_from_device("E-102").unwrap();
    for (id, feet) in [("E-201", 22.0), ("E-202", 18.0)] {
        let strobe = DeviceRecord::new(id, "Strobe", 0.066, 0.0).with_type("Strobe");
        manager.add_device_to_branch(strobe, feet).unwrap();
    }
    manager.end_branch();
    manager.start_branch_from_device("E-104").unwrap();
    let speaker = DeviceRecord::new("E-301", "Speaker", 0.03, 0.0).with_type("Speaker");
    manager.add_device_to_branch(speaker, 40.0).unwrap();
    manager.end_branch();
    manager.recalculate();
    manager
}

#[test]
fn test_roundtrip_reproduces_tree() {
    let original = design();
    let config = original.save("Building A", "Level 3 east");
    let json = config.to_json().unwrap();

    let parsed = CircuitConfiguration::from_json(&json).unwrap();
    let loaded = CircuitManager::from_configuration(&parsed).expect("Should load configuration");

    assert_eq!(loaded.member_identifiers(), original.member_identifiers());
    assert_eq!(loaded.main_circuit(), original.main_circuit());
    assert_eq!(loaded.branches(), original.branches());
    assert_eq!(loaded.branch_names(), original.branch_names());
    for id in original.member_identifiers() {
        let a = original.node_for(id).unwrap();
        let b = loaded.node_for(id).unwrap();
        assert_eq!(a.distance_from_parent, b.distance_from_parent, "{}", id);
        assert_eq!(a.is_branch_device, b.is_branch_device, "{}", id);
        assert_eq!(a.sequence_number, b.sequence_number, "{}", id);
        assert!((a.voltage - b.voltage).abs() < 1e-9, "{}", id);
    }
    assert_eq!(loaded.parameters().wire_gauge, "14 AWG");
}

#[test]
fn test_load_drops_connections_and_allows_reattach() {
    let config = design().save("Building A", "");
    let mut loaded = CircuitManager::from_configuration(&config).unwrap();
    assert!(loaded.devices().values().all(|d| d.connection.is_none()));

    // E-103 was deleted from the host model since the save
    let unresolved = loaded.reattach_connections(&|id: &str| {
        (id != "E-103").then(|| ConnectionRef::new(format!("elem:{}", id)))
    });
    assert_eq!(unresolved, vec!["E-103"]);
    assert!(loaded.contains("E-103"));
}

#[test]
fn test_bad_load_keeps_live_circuit() {
    let mut live = design();
    let before = live.member_identifiers().join(",");

    let mut broken = live.save("broken", "");
    broken.branches.insert("E-999".to_string(), vec![]);
    let err = live.load(&broken).unwrap_err();
    assert!(matches!(err, ConfigurationError::Inconsistent(_)));
    assert_eq!(live.member_identifiers().join(","), before);

    let good = CircuitManager::default().save("empty", "");
    live.load(&good).expect("Should load empty design");
    assert_eq!(live.device_count(), 0);
}

/// 200 main devices, with a 10-device T-tap on every 20th one.
fn large_design() -> CircuitManager {
    let mut manager = CircuitManager::default();
    for i in 1..=200 {
        let device = DeviceRecord::new(format!("M{:03}", i), "Strobe", 0.005, 0.0);
        manager.add_device_to_main(device, 12.0).unwrap();
    }
    for tap in (20..=200).step_by(20) {
        manager.start_branch_from_device(&format!("M{:03}", tap)).unwrap();
        for j in 1..=10 {
            let device = DeviceRecord::new(format!("T{:03}-{}", tap, j), "Horn", 0.002, 0.0);
            manager.add_device_to_branch(device, 8.0).unwrap();
        }
        manager.end_branch();
    }
    manager.recalculate();
    manager
}

#[test]
fn test_large_design_roundtrip() {
    let original = large_design();
    assert_eq!(original.device_count(), 300);

    let json = original.save("Tower", "all floors").to_json().unwrap();
    let parsed = CircuitConfiguration::from_json(&json).expect("Should parse a long chain");
    let loaded = CircuitManager::from_configuration(&parsed).expect("Should load a long chain");

    assert_eq!(loaded.member_identifiers(), original.member_identifiers());
    assert_eq!(loaded.main_circuit(), original.main_circuit());
    assert_eq!(loaded.branches(), original.branches());
    assert_eq!(loaded.branch_names(), original.branch_names());
    let eol = loaded.end_of_line_voltage().unwrap();
    assert!((eol - original.end_of_line_voltage().unwrap()).abs() < 1e-9);
}

#[test]
fn test_large_design_through_store_and_files() {
    let dir = TempDir::new().unwrap();
    let mut store = JsonDirectoryStore::open(&dir.path().join("store")).unwrap();
    let config = large_design().save("Tower", "");
    store.put(&config).unwrap();

    let listed = store.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].metadata.total_devices, 300);
    assert!(store.get(config.id).unwrap().is_some());

    let path = dir.path().join("tower-design.json");
    NacPlanCore::create_design(&path, "Tower", "", CircuitParameters::default()).unwrap();
    let (created, _) = NacPlanCore::open_design(&path).unwrap();
    let mut manager = large_design();
    NacPlanCore::write_design(&path, &created, &mut manager).unwrap();

    let (_, reopened) = NacPlanCore::open_design(&path).expect("Should reopen a long chain");
    assert_eq!(reopened.device_count(), 300);
    assert_eq!(reopened.main_circuit().len(), 200);
}

#[test]
fn test_bad_currents_rejected_by_engine_and_loader() {
    let mut manager = design();
    for amps in [f64::NAN, -5.0] {
        let err = manager
            .add_device_to_main(DeviceRecord::new("E-105", "Strobe", amps, 0.0), 20.0)
            .unwrap_err();
        assert!(matches!(err, CircuitError::InvalidParameter(_)));
    }
    assert!(!manager.contains("E-105"));

    let mut config = manager.save("Building A", "");
    config.device_data.get_mut("E-201").unwrap().standby_current = -0.5;
    let parsed = CircuitConfiguration::from_json(&config.to_json().unwrap()).unwrap();
    let err = manager.load(&parsed).unwrap_err();
    assert!(matches!(err, ConfigurationError::Inconsistent(_)));
    assert_eq!(manager.device_count(), 7);
}

#[test]
fn test_directory_store_roundtrip() {
    let dir = TempDir::new().unwrap();
    let mut store = JsonDirectoryStore::open(dir.path()).unwrap();

    let config = design().save("Building A", "");
    store.put(&config).unwrap();

    let listed = store.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].metadata.total_devices, 7);
    assert_eq!(listed[0].metadata.total_branches, 2);

    let fetched = store.get(config.id).unwrap().expect("Should find configuration");
    let manager = CircuitManager::from_configuration(&fetched).unwrap();
    assert_eq!(manager.device_count(), 7);
}

#[test]
fn test_core_file_workflow() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nac1.json");

    NacPlanCore::create_design(&path, "NAC 1", "", CircuitParameters::default()).unwrap();
    assert!(NacPlanCore::create_design(&path, "NAC 1", "", CircuitParameters::default()).is_err());

    let (config, mut manager) = NacPlanCore::open_design(&path).unwrap();
    manager
        .add_device_to_main(DeviceRecord::new("D1", "Strobe", 0.1, 0.0), 30.0)
        .unwrap();
    let saved = NacPlanCore::write_design(&path, &config, &mut manager).unwrap();
    assert_eq!(saved.id, config.id);

    let check = NacPlanCore::check_design(&path, ValidationOptions::default()).unwrap();
    assert!(check.is_valid());
    assert_eq!(check.name, "NAC 1");
    assert_eq!(check.summary.device_count, 1);
}
