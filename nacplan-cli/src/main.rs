//! NacPlan CLI - design and check notification appliance circuits from the
//! command line. Each design is one JSON file; every editing command loads
//! it, applies the edit, recalculates and writes it back.

use clap::{Parser, Subcommand, ValueEnum};
use nacplan::{
    wire, CircuitParameters, CircuitSummary, DesignCheck, DeviceRecord, NacPlanCore,
    NacPlanError, ValidationOptions,
};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "nacplan")]
#[command(about = "Notification appliance circuit design and voltage-drop tool", long_about = None)]
#[command(version)]
struct Cli {
    /// Log engine activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new, empty circuit design file
    Init {
        /// Path of the design file to create
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Design name
        #[arg(long, default_value = "NAC")]
        name: String,

        /// Free-text description
        #[arg(long, default_value = "")]
        description: String,

        /// Source voltage (V)
        #[arg(long)]
        voltage: Option<f64>,

        /// Minimum device voltage (V)
        #[arg(long)]
        min_voltage: Option<f64>,

        /// Rated circuit load (A)
        #[arg(long)]
        max_load: Option<f64>,

        /// Safety reserve as a fraction (0.20 = 20%)
        #[arg(long)]
        safety: Option<f64>,

        /// Wire gauge, e.g. "14 AWG"
        #[arg(long)]
        gauge: Option<String>,

        /// Feet of cable from the supply to the first device
        #[arg(long)]
        supply_distance: Option<f64>,

        /// Routing overhead as a fraction (0.10 = 10%)
        #[arg(long)]
        overhead: Option<f64>,
    },

    /// Append a device to the main circuit or to a T-tap
    Add {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Device identifier (a placeholder is generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Display name
        #[arg(long)]
        name: String,

        /// Alarm current (A)
        #[arg(long)]
        alarm: f64,

        /// Standby current (A)
        #[arg(long, default_value_t = 0.0)]
        standby: f64,

        /// Device type, e.g. "Horn Strobe"
        #[arg(long, default_value = "")]
        device_type: String,

        /// Feet of cable back to the previous device
        #[arg(long, default_value_t = 0.0)]
        distance: f64,

        /// Add to the T-tap at this main-circuit device (started if needed)
        #[arg(long, value_name = "TAP_ID")]
        tap: Option<String>,
    },

    /// Remove a device and everything downstream of it
    Remove {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(value_name = "ID")]
        id: String,
    },

    /// Set the cable length between a device and its parent
    Distance {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(value_name = "ID")]
        id: String,

        #[arg(value_name = "FEET")]
        feet: f64,
    },

    /// Show devices with their loads and voltages
    Show {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },

    /// Validate a design
    Check {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,

        /// Exit with error code if the design has validation errors
        #[arg(long)]
        fail_on_invalid: bool,
    },

    /// List supported wire gauges
    Gauges,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output for reports and CI
    Json,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .init();

    let result = match cli.command {
        Commands::Init {
            file,
            name,
            description,
            voltage,
            min_voltage,
            max_load,
            safety,
            gauge,
            supply_distance,
            overhead,
        } => {
            let overrides = ParameterOverrides {
                voltage,
                min_voltage,
                max_load,
                safety,
                gauge,
                supply_distance,
                overhead,
            };
            handle_init(&file, &name, &description, overrides)
        }
        Commands::Add {
            file,
            id,
            name,
            alarm,
            standby,
            device_type,
            distance,
            tap,
        } => {
            let device = match id {
                Some(id) => DeviceRecord::new(id, name, alarm, standby),
                None => {
                    let mut device = DeviceRecord::placeholder(name);
                    device.alarm_current = alarm;
                    device.standby_current = standby;
                    device
                }
            }
            .with_type(device_type);
            handle_add(&file, device, distance, tap.as_deref())
        }
        Commands::Remove { file, id } => handle_remove(&file, &id),
        Commands::Distance { file, id, feet } => handle_distance(&file, &id, feet),
        Commands::Show { file, format } => handle_show(&file, &format),
        Commands::Check {
            file,
            format,
            fail_on_invalid,
        } => handle_check(&file, &format, fail_on_invalid),
        Commands::Gauges => {
            handle_gauges();
            Ok(0)
        }
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    };
    process::exit(exit_code);
}

struct ParameterOverrides {
    voltage: Option<f64>,
    min_voltage: Option<f64>,
    max_load: Option<f64>,
    safety: Option<f64>,
    gauge: Option<String>,
    supply_distance: Option<f64>,
    overhead: Option<f64>,
}

impl ParameterOverrides {
    fn apply(self, defaults: CircuitParameters) -> Result<CircuitParameters, NacPlanError> {
        let mut params = match self.gauge {
            Some(ref gauge) => defaults.with_gauge(gauge)?,
            None => defaults,
        };
        if let Some(v) = self.voltage {
            params.system_voltage = v;
        }
        if let Some(v) = self.min_voltage {
            params.min_voltage = v;
        }
        if let Some(v) = self.max_load {
            params.max_load = v;
        }
        if let Some(v) = self.safety {
            params.safety_percent = v;
        }
        if let Some(v) = self.supply_distance {
            params.supply_distance = v;
        }
        if let Some(v) = self.overhead {
            params.routing_overhead = v;
        }
        params.validate()?;
        Ok(params)
    }
}

fn handle_init(
    file: &Path,
    name: &str,
    description: &str,
    overrides: ParameterOverrides,
) -> Result<i32, NacPlanError> {
    let params = overrides.apply(CircuitParameters::default())?;
    let config = NacPlanCore::create_design(file, name, description, params)?;
    println!("Created design '{}' ({})", config.name, file.display());
    println!(
        "  {:.1} V source, {:.1} V minimum, {} ({} ohm/1000ft)",
        config.parameters.system_voltage,
        config.parameters.min_voltage,
        config.parameters.wire_gauge,
        config.parameters.resistance_per_1000ft
    );
    Ok(0)
}

fn handle_add(
    file: &Path,
    device: DeviceRecord,
    distance: f64,
    tap: Option<&str>,
) -> Result<i32, NacPlanError> {
    let (config, mut manager) = NacPlanCore::open_design(file)?;
    let identifier = device.identifier.clone();

    let placement = match tap {
        Some(tap) => {
            let branch = manager.start_branch_from_device(tap)?;
            manager.add_device_to_branch(device, distance)?;
            manager.end_branch();
            branch
        }
        None => {
            manager.add_device_to_main(device, distance)?;
            "main circuit".to_string()
        }
    };

    NacPlanCore::write_design(file, &config, &mut manager)?;
    let voltage = manager.node_for(&identifier).map(|n| n.voltage).unwrap_or(0.0);
    println!("Added {} to {} ({:.2} V)", identifier, placement, voltage);
    Ok(0)
}

fn handle_remove(file: &Path, id: &str) -> Result<i32, NacPlanError> {
    let (config, mut manager) = NacPlanCore::open_design(file)?;
    let removed = manager.remove_device(id)?;
    NacPlanCore::write_design(file, &config, &mut manager)?;

    println!("Removed {} device(s): {}", removed.removed.len(), removed.removed.join(", "));
    for tap in &removed.removed_taps {
        println!("  Dropped T-tap at {}", tap);
    }
    Ok(0)
}

fn handle_distance(file: &Path, id: &str, feet: f64) -> Result<i32, NacPlanError> {
    let (config, mut manager) = NacPlanCore::open_design(file)?;
    manager.set_distance(id, feet)?;
    NacPlanCore::write_design(file, &config, &mut manager)?;
    println!("Set {} to {:.1} ft", id, feet);
    Ok(0)
}

fn handle_show(file: &Path, format: &OutputFormat) -> Result<i32, NacPlanError> {
    let (config, manager) = NacPlanCore::open_design(file)?;
    let summary = CircuitSummary::from_manager(&manager);

    match format {
        OutputFormat::Human => {
            println!("\nDesign: {}", config.name);
            println!("{}", "─".repeat(72));
            output_summary(&summary);
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "name": config.name,
                "id": config.id.to_string(),
                "parameters": config.parameters,
                "summary": summary,
            });
            print_json(&output)?;
        }
    }
    Ok(0)
}

fn handle_check(
    file: &Path,
    format: &OutputFormat,
    fail_on_invalid: bool,
) -> Result<i32, NacPlanError> {
    let check = NacPlanCore::check_design(file, ValidationOptions::default())?;

    match format {
        OutputFormat::Human => output_check_human(&check),
        OutputFormat::Json => {
            let output = serde_json::json!({
                "file": check.file.display().to_string(),
                "name": check.name,
                "valid": check.is_valid(),
                "errors": check.report.errors,
                "warnings": check.report.warnings,
                "stats": check.report.stats(),
                "summary": check.summary,
            });
            print_json(&output)?;
        }
    }

    if fail_on_invalid && !check.is_valid() {
        return Ok(1);
    }
    Ok(0)
}

fn output_summary(summary: &CircuitSummary) {
    if summary.devices.is_empty() {
        println!("  No devices");
    } else {
        println!(
            "  {:>3}  {:<14} {:<5} {:<8} {:>8} {:>9} {:>8}",
            "#", "Device", "Type", "Branch", "Feet", "Load (A)", "Volts"
        );
        for row in &summary.devices {
            println!(
                "  {:>3}  {:<14} {:<5} {:<8} {:>8.1} {:>9.3} {:>8.2}",
                row.sequence_number,
                row.identifier,
                row.abbreviation,
                row.branch.as_deref().unwrap_or("main"),
                row.distance_from_parent,
                row.accumulated_load,
                row.voltage
            );
        }
    }

    println!("\n  Summary:");
    println!("    Devices:        {} ({} T-taps)", summary.device_count, summary.branch_count);
    println!(
        "    Alarm load:     {:.3} A of {:.3} A usable",
        summary.total_alarm_load, summary.usable_load
    );
    println!("    Standby load:   {:.3} A", summary.total_standby_load);
    println!("    Wire length:    {:.1} ft", summary.total_wire_length);
    println!("    Cable estimate: {:.1} ft", summary.estimated_cable_length);
    match summary.end_of_line_voltage {
        Some(v) => println!("    EOL voltage:    {:.2} V", v),
        None => println!("    EOL voltage:    {:.2} V (no devices)", summary.supply_voltage),
    }
}

fn output_check_human(check: &DesignCheck) {
    println!("\nDesign: {} ({})", check.name, check.file.display());
    println!("{}", "─".repeat(72));

    if check.report.errors.is_empty() && check.report.warnings.is_empty() {
        println!("  No issues found");
    }
    if !check.report.errors.is_empty() {
        println!("\n  ERRORS:");
        for error in &check.report.errors {
            println!("    - {}", error);
        }
    }
    if !check.report.warnings.is_empty() {
        println!("\n  WARNINGS:");
        for warning in &check.report.warnings {
            println!("    - {}", warning);
        }
    }

    println!();
    output_summary(&check.summary);
    println!(
        "\n  Result: {}",
        if check.is_valid() { "PASS" } else { "FAIL" }
    );
}

fn print_json(value: &serde_json::Value) -> Result<(), NacPlanError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| NacPlanError::Other(format!("JSON output failed: {}", e)))?;
    println!("{}", text);
    Ok(())
}

fn handle_gauges() {
    println!("Supported wire gauges (solid copper, 20 °C):\n");
    for gauge in wire::gauges() {
        println!("  {:<8} {:>6.3} ohm/1000ft", gauge.label, gauge.ohms_per_1000ft);
    }
}
