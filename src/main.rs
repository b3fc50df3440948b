//! Flow Lenia CLI - Run simulations from JSON configuration.

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::num::ParseIntError;
use std::path::PathBuf;
use std::time::Instant;

use flow_lenia_engine::{
    compute::{BackendKind, Propagator},
    schema::{Seed, SimulationConfig},
};

fn main() {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--example") {
        print_example_config();
        return;
    }

    let parallel = args.iter().skip(1).any(|a| a == "--parallel");
    let positional: Vec<&String> = args.iter().skip(1).filter(|a| !a.starts_with("--")).collect();

    let Some(config_arg) = positional.first() else {
        eprintln!("Usage: {} <config.json> [steps] [--parallel]", args[0]);
        eprintln!();
        eprintln!("Run Flow Lenia simulation from JSON configuration.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  config.json  Path to simulation configuration file");
        eprintln!("  steps        Number of simulation steps (default: 100)");
        eprintln!("  --parallel   Run on all cores");
        eprintln!();
        eprintln!("Example configuration is generated with --example flag.");
        std::process::exit(1);
    };

    let config_path = PathBuf::from(config_arg.as_str());
    let steps = parse_steps(positional.get(1).map(|s| s.as_str())).unwrap_or_else(|e| {
        eprintln!("Invalid step count: {}", e);
        std::process::exit(1);
    });

    let config = SimulationConfig::from_file(&config_path).unwrap_or_else(|e| {
        eprintln!("Error loading config: {}", e);
        std::process::exit(1);
    });

    // Load or create seed
    let seed_path = config_path.with_extension("seed.json");
    let seed = if seed_path.exists() {
        Seed::from_file(&seed_path).unwrap_or_else(|e| {
            eprintln!("Error loading seed: {}", e);
            std::process::exit(1);
        })
    } else {
        Seed::default()
    };

    let backend = if parallel {
        BackendKind::Parallel { threads: None }
    } else {
        BackendKind::Sequential
    };

    println!("Flow Lenia Simulation");
    println!("=====================");
    println!(
        "Grid: {}x{}x{} ({} channels)",
        config.width, config.height, config.depth, config.channels
    );
    println!("Kernels: {}", config.kernels.len());
    println!("dt: {}", config.dt);
    println!("Steps: {}", steps);

    let mut propagator = Propagator::with_backend(config, backend).unwrap_or_else(|e| {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    });
    println!("Backend: {}", propagator.backend_name());
    println!();

    if let Err(e) = propagator.seed(&seed) {
        eprintln!("Invalid seed: {}", e);
        std::process::exit(1);
    }
    let initial_stats = propagator.stats();

    println!("Initial state:");
    println!("  Total mass: {:.6}", initial_stats.total_mass);
    println!("  Active cells: {}", initial_stats.active_cells);
    println!(
        "  Value range: [{:.6}, {:.6}]",
        initial_stats.min_value, initial_stats.max_value
    );
    println!();

    println!("Running simulation...");
    let start = Instant::now();
    let interval = (steps / 10).max(1);

    let executed = propagator.run_while(steps, |report| {
        // Print progress every 10%
        if report.step % interval == 0 {
            let elapsed = start.elapsed().as_secs_f64();
            println!(
                "  Step {}/{}: mass={:.6}, max flow={:.4}, {:.1} steps/s",
                report.step,
                steps,
                report.total_mass,
                report.flow.max_magnitude,
                report.step as f64 / elapsed
            );
        }
        if !report.total_mass.is_finite() {
            eprintln!("  State degenerated at step {}", report.step);
            return false;
        }
        true
    });

    let elapsed = start.elapsed();
    let final_stats = propagator.stats();

    println!();
    println!("Final state:");
    println!("  Total mass: {:.6}", final_stats.total_mass);
    println!("  Active cells: {}", final_stats.active_cells);
    println!(
        "  Value range: [{:.6}, {:.6}]",
        final_stats.min_value, final_stats.max_value
    );
    println!();
    println!(
        "Mass drift: {:.3e}",
        (final_stats.total_mass - initial_stats.total_mass).abs() / initial_stats.total_mass
    );
    println!(
        "Time: {:.2}s ({:.1} steps/s)",
        elapsed.as_secs_f64(),
        executed as f64 / elapsed.as_secs_f64()
    );
}

/// Step count argument; 100 when absent.
fn parse_steps(arg: Option<&str>) -> Result<u64, ParseIntError> {
    arg.map_or(Ok(100), str::parse)
}

fn print_example_config() {
    let config = SimulationConfig::default();
    let seed = Seed::default();

    println!("Example configuration (config.json):");
    println!("{}", serde_json::to_string_pretty(&config).unwrap());
    println!();
    println!("Example seed (config.seed.json):");
    println!("{}", serde_json::to_string_pretty(&seed).unwrap());
}
