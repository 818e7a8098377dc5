use clap::{Parser, Subcommand, ValueEnum};
use offload_common::config::{AppConfig, EngineKind};
use offload_telemetry::init_telemetry;

use crate::simulation::{run_simulation, run_training};

#[derive(Parser)]
#[command(version, name = "offload")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Engine {
    RuleBased,
    Dqn,
}

impl From<Engine> for EngineKind {
    fn from(engine: Engine) -> Self {
        match engine {
            Engine::RuleBased => EngineKind::RuleBased,
            Engine::Dqn => EngineKind::Dqn,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Sends one generated task from the first client through the network
    Run {
        #[arg(long, value_enum)]
        engine: Option<Engine>,
        #[arg(long, help = "The number of elements in the task")]
        tasks: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Trains the DQN engine on one generated task
    Train {
        #[arg(long)]
        episodes: Option<usize>,
        #[arg(long, help = "The number of elements in the task")]
        tasks: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
    },
}

pub fn main(args: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse_from(args);
    let mut config = AppConfig::load()?;
    init_telemetry()?;

    match cli.command {
        Command::Run {
            engine,
            tasks,
            seed,
        } => {
            if let Some(engine) = engine {
                config.engine.kind = engine.into();
            }
            override_workload(&mut config, tasks, seed);
            run_simulation(&config)
        }
        Command::Train {
            episodes,
            tasks,
            seed,
        } => {
            config.engine.kind = EngineKind::Dqn;
            if let Some(episodes) = episodes {
                config.dqn.episodes = episodes;
            }
            override_workload(&mut config, tasks, seed);
            run_training(&config)
        }
    }
}

fn override_workload(config: &mut AppConfig, tasks: Option<usize>, seed: Option<u64>) {
    if let Some(tasks) = tasks {
        config.workload.task_count = tasks;
    }
    if let Some(seed) = seed {
        config.simulation.seed = seed;
    }
}
