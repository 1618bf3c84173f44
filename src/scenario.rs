use anyhow::Context;
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use tracing::info;

use crate::common::{AgentSpec, Cell, Orientation, Pose, TaskRequest};
use crate::error::{Error, Result};
use crate::map::{Category, Map};
use crate::strategy::Strategy;

const WAREHOUSE_WIDTH: i32 = 35;
const WAREHOUSE_HEIGHT: i32 = 21;

/// 35x21 warehouse: two shelf blocks of task endpoints in the middle, parking
/// columns on both sides and free aisles around everything.
pub fn warehouse_map() -> Result<Map> {
    let mut map = Map::new(WAREHOUSE_WIDTH, WAREHOUSE_HEIGHT);
    for y in 0..WAREHOUSE_HEIGHT {
        for x in 0..WAREHOUSE_WIDTH {
            map.create(Cell::new(x, y), warehouse_category(x, y))?;
        }
    }
    Ok(map)
}

fn warehouse_category(x: i32, y: i32) -> Category {
    if y == 0 || y == WAREHOUSE_HEIGHT - 1 {
        return Category::Free;
    }
    match x {
        // Two parking cells after every free lane.
        0..=5 if x % 3 != 0 => Category::NonTaskEndpoint,
        28..=33 if (x - 28) % 3 != 0 => Category::NonTaskEndpoint,
        7..=16 | 18..=27 => match y % 4 {
            1 | 3 => Category::TaskEndpoint,
            2 => Category::Obstacle,
            _ => Category::Free,
        },
        _ => Category::Free,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStart {
    pub start: Pose,
    /// Overrides the run's strategy for this agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub agents: Vec<AgentStart>,
    pub tasks: Vec<TaskRequest>,
}

impl Scenario {
    pub fn load_from_file(path: &str) -> anyhow::Result<Scenario> {
        let file = File::open(path).with_context(|| format!("cannot open scenario {path}"))?;
        serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("error parsing scenario file: {path}"))
    }

    pub fn write_to_file(&self, path: &str) -> anyhow::Result<()> {
        let file = File::create(path).with_context(|| format!("cannot create {path}"))?;
        serde_yaml::to_writer(BufWriter::new(file), self)
            .with_context(|| format!("cannot write scenario {path}"))
    }

    /// Agents on distinct random parking cells with random orientation, tasks
    /// between two distinct random task endpoints. Task `i` is released at the
    /// first timestep `t` with `i < (t + 1) * tasks_per_timestep`.
    pub fn generate<R: Rng + ?Sized>(
        map: &Map,
        num_agents: usize,
        num_tasks: usize,
        tasks_per_timestep: f64,
        rng: &mut R,
    ) -> Result<Scenario> {
        let mut spawn: Vec<Cell> = map.non_task_endpoints().collect();
        if spawn.len() < num_agents {
            return Err(Error::InvalidScenario(format!(
                "{num_agents} agents but only {} parking cells",
                spawn.len()
            )));
        }
        let endpoints: Vec<Cell> = map.task_endpoints().collect();
        if num_tasks > 0 && endpoints.len() < 2 {
            return Err(Error::InvalidScenario(
                "tasks need at least two task endpoints".to_string(),
            ));
        }
        if num_tasks > 0 && (tasks_per_timestep.is_nan() || tasks_per_timestep <= 0.0) {
            return Err(Error::InvalidScenario(format!(
                "tasks per timestep must be positive, got {tasks_per_timestep}"
            )));
        }

        let agents = (0..num_agents)
            .map(|_| {
                let cell = spawn.remove(rng.gen_range(0..spawn.len()));
                let orientation = Orientation::ALL[rng.gen_range(0..Orientation::ALL.len())];
                AgentStart {
                    start: Pose::new(cell, orientation),
                    strategy: None,
                }
            })
            .collect();

        let mut tasks = Vec::with_capacity(num_tasks);
        let mut time_step = 0;
        while tasks.len() < num_tasks {
            if tasks.len() as f64 >= (time_step + 1) as f64 * tasks_per_timestep {
                time_step += 1;
                continue;
            }
            let pickup = rng.gen_range(0..endpoints.len());
            let mut delivery = rng.gen_range(0..endpoints.len());
            while delivery == pickup {
                delivery = rng.gen_range(0..endpoints.len());
            }
            tasks.push(TaskRequest {
                pickup: endpoints[pickup],
                delivery: endpoints[delivery],
                add_time: time_step,
            });
        }

        info!("Generate scenario: {num_agents} agents, {num_tasks} tasks");
        Ok(Scenario { agents, tasks })
    }

    pub fn agent_specs(&self, strategy: Strategy) -> Vec<AgentSpec> {
        self.agents
            .iter()
            .map(|agent| AgentSpec {
                start: agent.start,
                strategy: agent.strategy.unwrap_or(strategy),
            })
            .collect()
    }
}
