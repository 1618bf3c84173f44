use std::collections::HashSet;

use tracing::{debug, instrument};

use super::{assign_route, plan_task_route, stay, Strategy};
use crate::algorithm::{min_cost_assignment, SearchResult};
use crate::common::{AgentId, Cell, TaskId};
use crate::error::Result;
use crate::system::System;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Task { task: TaskId, pickup: Cell },
    Idle { cell: Cell },
}

impl Endpoint {
    fn cell(&self) -> Cell {
        match self {
            Endpoint::Task { pickup, .. } => *pickup,
            Endpoint::Idle { cell } => *cell,
        }
    }

    fn is_idle(&self) -> bool {
        matches!(self, Endpoint::Idle { .. })
    }
}

/// Reassigns every free central agent in one optimal matching. Runs once per
/// tick before any agent plans on its own.
#[instrument(skip_all, name = "central", fields(time_step = system.time_step()), level = "debug")]
pub(crate) fn plan_batch(system: &mut System) -> Result<()> {
    let now = system.time_step();

    let executing: Vec<(AgentId, Cell)> = system
        .executing_tasks()
        .filter_map(|task| task.assigned_agent().map(|agent| (agent, task.delivery)))
        .collect();
    let busy: HashSet<AgentId> = executing.iter().map(|(agent, _)| *agent).collect();
    let free: Vec<AgentId> = system
        .agents()
        .iter()
        .filter(|agent| agent.strategy == Strategy::Central && !busy.contains(&agent.id))
        .map(|agent| agent.id)
        .collect();
    if free.is_empty() {
        return Ok(());
    }

    let held: Vec<(TaskId, AgentId)> = system
        .assigned_unpicked_tasks()
        .filter_map(|task| {
            task.assigned_agent()
                .filter(|agent| free.contains(agent))
                .map(|agent| (task.id, agent))
        })
        .collect();
    for (task, agent) in held {
        system.task_mut(task)?.release(agent)?;
    }
    for &agent in &free {
        system.clear_future(agent, now)?;
    }

    let mut avoid: HashSet<Cell> = executing.iter().map(|(_, cell)| *cell).collect();
    let mut endpoints = Vec::new();
    let pending: Vec<_> = system
        .pending_tasks()
        .map(|task| (task.id, task.pickup, task.delivery))
        .collect();
    for (task, pickup, delivery) in pending {
        if avoid.contains(&pickup) || avoid.contains(&delivery) {
            continue;
        }
        avoid.insert(pickup);
        avoid.insert(delivery);
        endpoints.push(Endpoint::Task { task, pickup });
    }
    let num_task_endpoints = endpoints.len();

    let origins = free
        .iter()
        .map(|&agent| system.planning_pose(agent).map(|pose| pose.cell))
        .collect::<Result<Vec<_>>>()?;

    if endpoints.len() < free.len() {
        let parked: HashSet<Cell> = system
            .agents()
            .iter()
            .filter(|agent| !free.contains(&agent.id))
            .map(|agent| agent.final_pose().cell)
            .collect();
        let mut parking: Vec<Cell> = system
            .map()
            .non_task_endpoints()
            .filter(|cell| !avoid.contains(cell) && !parked.contains(cell))
            .collect();

        for origin in &origins {
            if endpoints.len() >= free.len() {
                break;
            }
            let Some(index) = parking
                .iter()
                .enumerate()
                .min_by_key(|(index, cell)| (origin.manhattan(cell), *index))
                .map(|(index, _)| index)
            else {
                break;
            };
            endpoints.push(Endpoint::Idle {
                cell: parking.remove(index),
            });
        }
    }

    if endpoints.is_empty() {
        for &agent in &free {
            system.cover_now(agent)?;
        }
        return Ok(());
    }

    let distances: Vec<Vec<usize>> = origins
        .iter()
        .map(|origin| {
            endpoints
                .iter()
                .map(|endpoint| origin.manhattan(&endpoint.cell()))
                .collect()
        })
        .collect();
    let costs = pad_square(
        weighted_costs(&distances, num_task_endpoints),
        endpoints.len(),
    );
    let assignment = min_cost_assignment(&costs);

    let mut plans = Vec::new();
    for (&agent, column) in free.iter().zip(assignment) {
        match endpoints.get(column) {
            Some(endpoint) => plans.push((agent, *endpoint)),
            // Matched to a dummy column.
            None => system.cover_now(agent)?,
        }
    }
    plans.sort_by_key(|(agent, endpoint)| (endpoint.is_idle(), *agent));

    for (agent, endpoint) in plans {
        match endpoint {
            Endpoint::Task { task, .. } => match plan_task_route(system, agent, task)? {
                Some(route) => assign_route(system, agent, task, route)?,
                None => debug!("agent {agent} cannot reach task {task}"),
            },
            Endpoint::Idle { cell } => {
                let start = system.planning_pose(agent)?;
                if start.cell == cell {
                    stay(system, agent)?;
                } else if let SearchResult::Found(path) =
                    system.search(agent, start, now - 1, cell)
                {
                    system.commit(agent, path)?;
                }
            }
        }
        system.cover_now(agent)?;
    }

    Ok(())
}

/// Scales raw distances so that any task endpoint is cheaper than any idle
/// endpoint: `n·C·h` for tasks, `n·C² + h` for idle cells, with `n` the
/// number of agents and `C = 1 + max h`.
pub(crate) fn weighted_costs(distances: &[Vec<usize>], num_task_endpoints: usize) -> Vec<Vec<i64>> {
    let n = distances.len() as i64;
    let c = 1 + distances.iter().flatten().copied().max().unwrap_or(0) as i64;

    distances
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(column, &h)| {
                    let h = h as i64;
                    if column < num_task_endpoints {
                        n * c * h
                    } else {
                        n * c * c + h
                    }
                })
                .collect()
        })
        .collect()
}

/// Zero-cost dummy rows and columns up to a square matrix.
fn pad_square(mut costs: Vec<Vec<i64>>, columns: usize) -> Vec<Vec<i64>> {
    let size = costs.len().max(columns);
    for row in costs.iter_mut() {
        row.resize(size, 0);
    }
    costs.resize(size, vec![0; size]);
    costs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{AgentSpec, Orientation, Pose, TaskRequest, TaskStatus};
    use crate::map::{Category, Map};

    fn agent(x: i32, y: i32) -> AgentSpec {
        AgentSpec {
            start: Pose::new(Cell::new(x, y), Orientation::Deg0),
            strategy: Strategy::Central,
        }
    }

    fn task(pickup: (i32, i32), delivery: (i32, i32)) -> TaskRequest {
        TaskRequest {
            pickup: Cell::new(pickup.0, pickup.1),
            delivery: Cell::new(delivery.0, delivery.1),
            add_time: 0,
        }
    }

    fn map_with_parking(width: i32, height: i32, parking: &[(i32, i32)]) -> Map {
        let mut map = Map::new(width, height);
        for x in 0..width {
            for y in 0..height {
                let category = if parking.contains(&(x, y)) {
                    Category::NonTaskEndpoint
                } else {
                    Category::Free
                };
                map.create(Cell::new(x, y), category).unwrap();
            }
        }
        map
    }

    #[test]
    fn test_task_endpoint_always_cheaper() {
        // One agent, one far task, one idle cell next door.
        let costs = weighted_costs(&[vec![4, 1]], 1);
        assert_eq!(costs, vec![vec![20, 26]]);
        let assignment = min_cost_assignment(&pad_square(costs, 2));
        assert_eq!(assignment[0], 0);
    }

    #[test]
    fn test_pad_square() {
        let padded = pad_square(vec![vec![3], vec![5]], 1);
        assert_eq!(padded, vec![vec![3, 0], vec![5, 0]]);
        let padded = pad_square(vec![vec![1, 2, 3]], 3);
        assert_eq!(padded.len(), 3);
        assert_eq!(padded[2], vec![0, 0, 0]);
    }

    #[test]
    fn test_optimal_two_by_two_assignment() {
        let mut system = System::new(
            Map::open(5, 5),
            vec![task((0, 2), (1, 4)), task((4, 2), (3, 4))],
            vec![agent(0, 0), agent(4, 0)],
        )
        .unwrap();

        system.iterate().unwrap();
        let first = system.task(0).unwrap();
        let second = system.task(1).unwrap();
        assert_eq!(first.assigned_agent(), Some(0));
        assert_eq!(second.assigned_agent(), Some(1));
        assert_eq!(first.pickup_time(), Some(2));
        assert_eq!(second.pickup_time(), Some(2));
        assert_eq!(first.delivery_time(), Some(6));
        assert_eq!(second.delivery_time(), Some(6));

        for _ in 0..6 {
            system.iterate().unwrap();
        }
        assert!(system
            .tasks()
            .iter()
            .all(|task| task.status() == TaskStatus::Delivered));
        assert!(system.verify().is_empty());
    }

    #[test]
    fn test_spare_agent_parks() {
        let mut system = System::new(
            map_with_parking(5, 5, &[(4, 1)]),
            vec![task((0, 2), (0, 4))],
            vec![agent(0, 0), agent(4, 0)],
        )
        .unwrap();

        system.iterate().unwrap();
        assert_eq!(system.task(0).unwrap().assigned_agent(), Some(0));
        let spare = system.get_agent(1).unwrap();
        assert_eq!(spare.pose_at(1).map(|pose| pose.cell), Some(Cell::new(4, 1)));

        // Already parked: it holds from now on.
        system.iterate().unwrap();
        let spare = system.get_agent(1).unwrap();
        assert_eq!(spare.pose_at(2).map(|pose| pose.cell), Some(Cell::new(4, 1)));
        assert_eq!(system.stats().recovery_steps, 0);
        assert!(system.verify().is_empty());
    }

    #[test]
    fn test_unexecuted_task_is_reassigned_each_tick() {
        let mut system = System::new(
            Map::open(5, 5),
            vec![task((2, 4), (4, 4))],
            vec![agent(2, 0)],
        )
        .unwrap();

        system.iterate().unwrap();
        assert_eq!(system.task(0).unwrap().pickup_time(), Some(4));
        system.iterate().unwrap();
        let task = system.task(0).unwrap();
        assert_eq!(task.assigned_agent(), Some(0));
        assert_eq!(task.pickup_time(), Some(4));
        assert_eq!(system.get_agent(0).unwrap().pose_at(2).map(|p| p.cell), Some(Cell::new(2, 2)));
    }
}
