//! Tandem simulation runner
//!
//! Run a simulation and optionally export its event timeline.

use std::path::PathBuf;

use clap::Parser;
use tandem_grid::Team;
use tandem_sim::{Simulation, SimulationConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tandem-sim")]
#[command(about = "Simulate consensus-driven paired resource retrieval", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(long, help = "JSON configuration file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Number of ticks to run")]
    ticks: Option<u64>,

    #[arg(long, help = "Seed for world generation, exploration and delays")]
    seed: Option<u64>,

    #[arg(long, help = "Grid columns")]
    width: Option<i64>,

    #[arg(long, help = "Grid rows")]
    height: Option<i64>,

    #[arg(long, help = "Agents per team")]
    agents: Option<u32>,

    #[arg(long, help = "Shortest message delay in ticks")]
    min_delay: Option<u64>,

    #[arg(long, help = "Longest message delay in ticks")]
    max_delay: Option<u64>,

    #[arg(long, help = "Write the event timeline as JSON")]
    events: Option<PathBuf>,
}

impl Cli {
    fn config(&self) -> Result<SimulationConfig, tandem_sim::Error> {
        let mut config = match &self.config {
            Some(path) => SimulationConfig::from_json_file(path)?,
            None => SimulationConfig::default(),
        };
        if let Some(ticks) = self.ticks {
            config.ticks = ticks;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(agents) = self.agents {
            config.agents_per_team = agents;
        }
        if let Some(min) = self.min_delay {
            config.min_delay = min;
        }
        if let Some(max) = self.max_delay {
            config.max_delay = max;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tandem_sim=info,tandem_consensus=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = cli.config()?;

    println!("Tandem Simulation");
    println!("=================");
    println!();
    println!(
        "{}x{} grid, {} agents per team, {} ticks, seed {}",
        config.width, config.height, config.agents_per_team, config.ticks, config.seed
    );

    let mut sim = Simulation::new(config)?;
    let snapshot = sim.run()?;

    println!();
    println!("Simulation complete:");
    for team in Team::ALL {
        println!("  {:<5} {}", team.to_string(), sim.score(team));
    }
    println!("  Resources left: {}", snapshot.resources_remaining);
    println!("  Events: {}", snapshot.event_count);

    if let Some(path) = &cli.events {
        sim.write_events(path)?;
        tracing::info!(path = %path.display(), "wrote event timeline");
    }

    Ok(())
}
