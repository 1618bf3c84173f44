use anyhow::{anyhow, Context};
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::strategy::Strategy;

#[derive(Parser, Debug)]
#[command(
    name = "Rust MAPD",
    about = "Online multi-agent pickup and delivery in Rust.",
    version = "1.0"
)]
pub struct Cli {
    #[arg(long, help = "Path to a YAML config file")]
    pub config: Option<String>,

    #[arg(long, help = "Path to the map file, the built-in warehouse when absent")]
    pub map_path: Option<String>,

    #[arg(long, help = "Path to a YAML scenario, generated randomly when absent")]
    pub scenario_path: Option<String>,

    #[arg(long, help = "Write one JSON snapshot per tick to this file")]
    pub snapshot_path: Option<String>,

    #[arg(long, value_enum, help = "Task assignment strategy")]
    pub strategy: Option<Strategy>,

    #[arg(long, help = "Number of agents")]
    pub num_agents: Option<usize>,

    #[arg(long, help = "Number of tasks")]
    pub num_tasks: Option<usize>,

    #[arg(long, help = "Tasks released per timestep, may be fractional")]
    pub tasks_per_timestep: Option<f64>,

    #[arg(long, help = "Seed for the random number generator")]
    pub seed: Option<u64>,

    #[arg(long, help = "Stop after this many ticks")]
    pub max_ticks: Option<usize>,

    #[arg(long, help = "Log filter used when RUST_LOG is unset")]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub map_path: Option<String>,
    pub scenario_path: Option<String>,
    pub snapshot_path: Option<String>,
    pub strategy: Strategy,
    pub num_agents: usize,
    pub num_tasks: usize,
    pub tasks_per_timestep: f64,
    pub seed: u64,
    pub max_ticks: usize,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            map_path: None,
            scenario_path: None,
            snapshot_path: None,
            strategy: Strategy::Tp,
            num_agents: 10,
            num_tasks: 50,
            tasks_per_timestep: 0.5,
            seed: 0,
            max_ticks: 1000,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(content).context("cannot parse config")
    }

    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("cannot read config {path}"))?;
        Self::from_yaml_str(&content).with_context(|| format!("error with config file: {path}"))
    }

    /// Command-line values win over the file.
    pub fn override_from_command_line(mut self, cli: &Cli) -> anyhow::Result<Self> {
        if cli.map_path.is_some() {
            self.map_path = cli.map_path.clone();
        }
        if cli.scenario_path.is_some() {
            self.scenario_path = cli.scenario_path.clone();
        }
        if cli.snapshot_path.is_some() {
            self.snapshot_path = cli.snapshot_path.clone();
        }
        if let Some(strategy) = cli.strategy {
            self.strategy = strategy;
        }
        if let Some(num_agents) = cli.num_agents {
            self.num_agents = num_agents;
        }
        if let Some(num_tasks) = cli.num_tasks {
            self.num_tasks = num_tasks;
        }
        if let Some(tasks_per_timestep) = cli.tasks_per_timestep {
            self.tasks_per_timestep = tasks_per_timestep;
        }
        if let Some(seed) = cli.seed {
            self.seed = seed;
        }
        if let Some(max_ticks) = cli.max_ticks {
            self.max_ticks = max_ticks;
        }
        if let Some(log_level) = &cli.log_level {
            self.log_level = log_level.clone();
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.scenario_path.is_none() {
            if self.num_agents == 0 {
                return Err(anyhow!("Number of agents must be positive"));
            }
            if self.tasks_per_timestep.is_nan() || self.tasks_per_timestep <= 0.0 {
                return Err(anyhow!(
                    "Tasks per timestep must be positive, got {}",
                    self.tasks_per_timestep
                ));
            }
        }
        if self.max_ticks == 0 {
            return Err(anyhow!("Max ticks must be positive"));
        }
        Ok(())
    }
}
