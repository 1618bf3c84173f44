use std::collections::{HashSet, VecDeque};

use tracing::debug;

use super::{assign_route, idle, plan_task_route, tp, Strategy};
use crate::common::{AgentId, TaskId};
use crate::error::Result;
use crate::system::System;

/// Tasks taken away from an agent during the current tick. The agent may not
/// take them back before the tick ends.
#[derive(Debug, Default)]
pub(crate) struct PreemptionGuard {
    lost: HashSet<(AgentId, TaskId)>,
}

impl PreemptionGuard {
    fn allows(&self, thief: AgentId, task: TaskId) -> bool {
        !self.lost.contains(&(thief, task))
    }

    fn record(&mut self, victim: AgentId, task: TaskId) {
        self.lost.insert((victim, task));
    }
}

/// Plans `agent` and, transitively, every agent it steals from.
pub(crate) fn plan(system: &mut System, agent: AgentId, guard: &mut PreemptionGuard) -> Result<()> {
    let mut work_list = VecDeque::from([agent]);

    while let Some(current) = work_list.pop_front() {
        let victim = get_task(system, current, guard)?;
        system.cover_now(current)?;
        let Some(victim) = victim else {
            continue;
        };
        match system.get_agent(victim)?.strategy {
            Strategy::Tpts => work_list.push_back(victim),
            Strategy::Tp => {
                tp::plan(system, victim)?;
                system.cover_now(victim)?;
            }
            // Holds for this tick, the next batch reassigns it.
            Strategy::Central => system.cover_now(victim)?,
        }
    }

    Ok(())
}

/// Returns the agent whose task was stolen, if any.
fn get_task(
    system: &mut System,
    agent: AgentId,
    guard: &mut PreemptionGuard,
) -> Result<Option<AgentId>> {
    let now = system.time_step();
    let cell = system.planning_pose(agent)?.cell;

    let mut candidates: Vec<_> = system
        .available_tasks()
        .filter(|task| task.assigned_agent() != Some(agent))
        .map(|task| (cell.manhattan(&task.pickup), task.id, task.assigned_agent()))
        .collect();
    candidates.sort();

    for (_, task, owner) in candidates {
        if let Some(owner) = owner {
            if !guard.allows(agent, task) {
                debug!("agent {agent} may not take back task {task} from agent {owner}");
                continue;
            }
        }

        let Some(route) = plan_task_route(system, agent, task)? else {
            continue;
        };

        let Some(victim) = owner else {
            assign_route(system, agent, task, route)?;
            return Ok(None);
        };

        let recorded = system.task(task)?.delivery_time();
        if recorded.is_some_and(|delivery_time| route.delivery_time < delivery_time) {
            debug!(
                "agent {agent} steals task {task} from agent {victim}: delivery {} instead of {:?}",
                route.delivery_time, recorded
            );
            system.clear_future(victim, now)?;
            system.task_mut(task)?.release(victim)?;
            guard.record(victim, task);
            assign_route(system, agent, task, route)?;
            system.stats_mut().preemptions += 1;
            return Ok(Some(victim));
        }
    }

    idle(system, agent)?;
    Ok(None)
}
