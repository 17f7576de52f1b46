//! Build a small circuit with one T-tap, print voltages and validation.

use nacplan::prelude::*;
use nacplan::CircuitSummary;

fn main() -> Result<(), NacPlanError> {
    let gauge = std::env::args().nth(1).unwrap_or_else(|| "16 AWG".to_string());
    let params = CircuitParameters::default().with_gauge(&gauge)?;
    let mut circuit = CircuitManager::new(params)?;

    for (id, feet) in [("HS-1", 75.0), ("HS-2", 60.0), ("HS-3", 60.0), ("HS-4", 90.0)] {
        let device = DeviceRecord::new(id, "Horn Strobe 75cd", 0.177, 0.0).with_type("Horn Strobe");
        circuit.add_device_to_main(device, feet)?;
    }

    let branch = circuit.start_branch_from_device("HS-2")?;
    for (id, feet) in [("S-1", 40.0), ("S-2", 35.0)] {
        let device = DeviceRecord::new(id, "Strobe 15cd", 0.066, 0.0).with_type("Strobe");
        circuit.add_device_to_branch(device, feet)?;
    }
    circuit.end_branch();
    circuit.recalculate();

    let summary = CircuitSummary::from_manager(&circuit);
    println!("Circuit on {} ({} at HS-2)", circuit.parameters().wire_gauge, branch);
    println!();
    for row in &summary.devices {
        println!(
            "  {:>2} {:<6} {:<4} {:>7.3} A {:>7.2} V {}",
            row.sequence_number,
            row.identifier,
            row.abbreviation,
            row.accumulated_load,
            row.voltage,
            row.branch.as_deref().unwrap_or("")
        );
    }
    println!();
    println!(
        "Total load: {:.3} A of {:.3} A usable",
        summary.total_alarm_load, summary.usable_load
    );
    println!("Cable to order: {:.0} ft", summary.estimated_cable_length);

    let report = nacplan::validate(&circuit);
    if report.is_valid() {
        println!("\nValidation passed.");
    } else {
        println!("\nValidation failed:");
        for error in &report.errors {
            println!("  - {}", error);
        }
        std::process::exit(1);
    }
    Ok(())
}
