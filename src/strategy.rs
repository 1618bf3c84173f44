mod central;
mod tp;
mod tpts;

pub(crate) use central::plan_batch;
pub(crate) use tpts::PreemptionGuard;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::algorithm::SearchResult;
use crate::common::{AgentId, Cell, TaskId, TimeStep, Trajectory};
use crate::error::Result;
use crate::system::System;

/// How an agent picks its next task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Greedy nearest pending task.
    Tp,
    /// Greedy with task stealing.
    Tpts,
    /// One optimal assignment per tick over all central agents.
    Central,
}

impl Strategy {
    /// Individual planning for an agent that has no pose for the current
    /// timestep. Central agents are handled by [`plan_batch`] before this runs.
    pub(crate) fn plan(
        self,
        system: &mut System,
        agent: AgentId,
        guard: &mut PreemptionGuard,
    ) -> Result<()> {
        match self {
            Strategy::Tp => tp::plan(system, agent),
            Strategy::Tpts => tpts::plan(system, agent, guard),
            Strategy::Central => Ok(()),
        }
    }
}

/// Pickup leg fused with the delivery leg.
#[derive(Debug, Clone)]
pub(crate) struct TaskRoute {
    pub trajectory: Trajectory,
    pub pickup_time: TimeStep,
    pub delivery_time: TimeStep,
}

/// Plans `task` for `agent` from its pose at `now - 1`. `None` when either leg
/// is exhausted.
pub(crate) fn plan_task_route(
    system: &mut System,
    agent: AgentId,
    task: TaskId,
) -> Result<Option<TaskRoute>> {
    let start_time = system.time_step() - 1;
    let start = system.planning_pose(agent)?;
    let (pickup, delivery) = {
        let task = system.task(task)?;
        (task.pickup, task.delivery)
    };

    let mut trajectory = match system.search(agent, start, start_time, pickup) {
        SearchResult::Found(path) => path,
        SearchResult::Exhausted { .. } => return Ok(None),
    };
    let (pickup_time, pickup_pose) = trajectory.last();

    let delivery_leg = match system.search(agent, pickup_pose, pickup_time, delivery) {
        SearchResult::Found(path) => path,
        SearchResult::Exhausted { .. } => return Ok(None),
    };
    trajectory.merge(delivery_leg)?;

    let delivery_time = trajectory.last_timestep();
    Ok(Some(TaskRoute {
        trajectory,
        pickup_time,
        delivery_time,
    }))
}

/// Assigns `task` to `agent` with the route's times and commits the route.
pub(crate) fn assign_route(
    system: &mut System,
    agent: AgentId,
    task: TaskId,
    route: TaskRoute,
) -> Result<()> {
    system
        .task_mut(task)?
        .assign(agent)?
        .pickup(route.pickup_time, agent)?
        .deliver(route.delivery_time, agent)?;
    debug!(
        "agent {agent} takes task {task}: pickup at {}, delivery at {}",
        route.pickup_time, route.delivery_time
    );
    system.commit(agent, route.trajectory)
}

/// Commits one step holding the pose at `now - 1`.
pub(crate) fn stay(system: &mut System, agent: AgentId) -> Result<()> {
    let pose = system.planning_pose(agent)?;
    let mut step = Trajectory::starting_at(system.time_step() - 1, pose);
    step.push(pose);
    system.commit(agent, step)
}

/// Closest candidate by Manhattan distance; the first one wins ties.
pub(crate) fn nearest<T>(from: Cell, candidates: impl IntoIterator<Item = (Cell, T)>) -> Option<T> {
    candidates
        .into_iter()
        .enumerate()
        .min_by_key(|(index, (cell, _))| (from.manhattan(cell), *index))
        .map(|(_, (_, item))| item)
}

/// Behaviour without a task: hold the current cell when nothing needs it,
/// otherwise head for the nearest free parking cell.
pub(crate) fn idle(system: &mut System, agent: AgentId) -> Result<()> {
    let start_time = system.time_step() - 1;
    let pose = system.planning_pose(agent)?;

    if !system.is_task_endpoint(pose.cell) && !system.in_other_agent_path(agent, pose.cell) {
        return stay(system, agent);
    }

    let parking = system
        .free_non_task_endpoints(agent)
        .into_iter()
        .filter(|cell| *cell != pose.cell)
        .map(|cell| (cell, cell));
    let Some(target) = nearest(pose.cell, parking) else {
        debug!("agent {agent} has no free parking cell");
        return Ok(());
    };

    match system.search(agent, pose, start_time, target) {
        SearchResult::Found(path) => system.commit(agent, path),
        SearchResult::Exhausted { .. } => Ok(()),
    }
}
