use anyhow::Result;
use clap::Parser;
use log::info;

use brt_sim::simulation::{BusSchedule, Scenario, SimConfig, SimWorld, TrafficDensity};

#[derive(Parser)]
#[command(name = "brt_sim")]
#[command(about = "Bus rapid transit corridor simulation, run headless")]
struct Cli {
    /// Road layout to simulate
    #[arg(long, value_enum, default_value = "with-bus-lane")]
    scenario: Scenario,

    /// Car traffic density
    #[arg(long, value_enum, default_value = "low")]
    density: TrafficDensity,

    /// Bus headway
    #[arg(long, value_enum, default_value = "20mins")]
    schedule: BusSchedule,

    /// Simulated seconds to run
    #[arg(long, default_value = "60")]
    seconds: u32,

    /// Time delta per tick in milliseconds
    #[arg(long, default_value = "16")]
    delta: f32,

    /// Seed for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Draw the corridor after every summary
    #[arg(long)]
    map: bool,
}

/// Simulated seconds between progress summaries
const SUMMARY_INTERVAL_SECS: u32 = 10;

fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("warn,brt_sim=info"),
    )
    .init();

    let cli = Cli::parse();
    let mut config = SimConfig::new(cli.scenario, cli.density, cli.schedule);
    if let Some(seed) = cli.seed {
        config = config.with_seed(seed);
    }

    run_headless(config, cli.seconds, cli.delta, cli.map)
}

/// Run the simulation in headless mode (no graphics)
fn run_headless(config: SimConfig, seconds: u32, delta_ms: f32, map: bool) -> Result<()> {
    anyhow::ensure!(delta_ms > 0.0, "--delta must be positive, got {}", delta_ms);

    println!("Running BRT simulation in headless mode...");
    println!("Seconds: {}, Delta: {}ms", seconds, delta_ms);

    let mut world = SimWorld::new(config)?;

    let ticks_per_second = (1000.0 / delta_ms).ceil() as u32;
    println!("Running {} ticks per second (simulated time)", ticks_per_second);
    println!();

    println!("Initial state:");
    world.print_summary();
    if map {
        world.draw_map();
    }
    println!();

    for second in 1..=seconds {
        for _ in 0..ticks_per_second {
            world.tick(delta_ms);
        }

        if second % SUMMARY_INTERVAL_SECS == 0 || second == seconds {
            println!("--- After {}s simulated time ---", second);
            world.print_summary();
            if map {
                world.draw_map();
            }
            println!();
        }
    }

    world.shutdown();
    log_final_stats(&world);
    Ok(())
}

fn log_final_stats(world: &SimWorld) {
    let stats = world.stats();
    let throughput = world.throughput();

    info!("=== SIMULATION COMPLETE ===");
    info!("Simulated time: {:.1}s", stats.time_ms / 1000.0);
    info!("Total cars spawned: {}", stats.cars_spawned);
    info!("Total cars completed: {}", stats.cars_completed);
    info!("Active cars: {}", stats.cars_active);
    info!("Bus laps completed: {}", throughput.bus_laps());
    info!("Car passengers: {}", throughput.car_passengers());
    info!("Bus passengers: {}", throughput.bus_passengers());
    info!("Total passengers: {}", throughput.total_passengers());
    match throughput.average_car_travel_ms() {
        Some(avg) => info!("Average car travel time: {:.1}s", avg / 1000.0),
        None => info!("Average car travel time: n/a"),
    }
    match throughput.average_bus_travel_ms() {
        Some(avg) => info!("Average bus travel time: {:.1}s", avg / 1000.0),
        None => info!("Average bus travel time: n/a"),
    }
    for sample in throughput.history() {
        info!(
            "Throughput at {:.0}s: cars={} buses={} total={}",
            sample.time_ms / 1000.0,
            sample.car_passengers,
            sample.bus_passengers,
            sample.total()
        );
    }
}
