use mapd_rust::config::{Cli, Config};
use mapd_rust::map::Map;
use mapd_rust::scenario::{warehouse_map, Scenario};
use mapd_rust::system::System;

use anyhow::Context;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs::File;
use std::io::{BufWriter, Write};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = if let Some(config_file) = cli.config.as_ref() {
        Config::from_file(config_file)?
    } else {
        Config::default()
    }
    .override_from_command_line(&cli)?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();
    info!("{config:?}");

    let map = match &config.map_path {
        Some(path) => Map::from_file(path)?,
        None => warehouse_map().context("cannot build warehouse map")?,
    };
    let scenario = match &config.scenario_path {
        Some(path) => Scenario::load_from_file(path)?,
        None => {
            let mut rng = StdRng::seed_from_u64(config.seed);
            Scenario::generate(
                &map,
                config.num_agents,
                config.num_tasks,
                config.tasks_per_timestep,
                &mut rng,
            )
            .context("cannot generate scenario")?
        }
    };

    let agents = scenario.agent_specs(config.strategy);
    let mut system =
        System::new(map, scenario.tasks, agents).context("error building the system")?;

    let mut snapshots = match &config.snapshot_path {
        Some(path) => Some(BufWriter::new(
            File::create(path).with_context(|| format!("cannot create {path}"))?,
        )),
        None => None,
    };

    while system.time_step() < config.max_ticks && !system.is_finished() {
        system.iterate()?;
        if let Some(writer) = snapshots.as_mut() {
            serde_json::to_writer(&mut *writer, &system.snapshot())?;
            writeln!(writer)?;
        }
    }
    if let Some(mut writer) = snapshots {
        writer.flush()?;
    }

    if !system.is_finished() {
        info!(
            "stopped at tick {} with {} tasks left",
            system.time_step(),
            system.active_tasks().count()
        );
    }
    let conflicts = system.verify();
    if !conflicts.is_empty() {
        error!("conflicts in committed trajectories: {conflicts:?}");
    }
    system.stats().print();

    Ok(())
}
