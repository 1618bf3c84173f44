use tracing::debug;

use super::{assign_route, idle, nearest, plan_task_route};
use crate::common::AgentId;
use crate::error::Result;
use crate::system::System;

/// Takes the pending task with the closest pickup, or idles when none is left.
pub(crate) fn plan(system: &mut System, agent: AgentId) -> Result<()> {
    let cell = system.planning_pose(agent)?.cell;
    let candidates: Vec<_> = system
        .pending_tasks()
        .map(|task| (task.pickup, task.id))
        .collect();

    let Some(task) = nearest(cell, candidates) else {
        return idle(system, agent);
    };

    match plan_task_route(system, agent, task)? {
        Some(route) => assign_route(system, agent, task, route),
        None => {
            debug!("agent {agent} cannot reach task {task}, holding");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::common::{AgentSpec, Cell, Orientation, Pose, TaskRequest, TaskStatus};
    use crate::map::Map;
    use crate::strategy::Strategy;
    use crate::system::System;

    fn agent(x: i32, y: i32, orientation: Orientation) -> AgentSpec {
        AgentSpec {
            start: Pose::new(Cell::new(x, y), orientation),
            strategy: Strategy::Tp,
        }
    }

    fn task(pickup: (i32, i32), delivery: (i32, i32), add_time: usize) -> TaskRequest {
        TaskRequest {
            pickup: Cell::new(pickup.0, pickup.1),
            delivery: Cell::new(delivery.0, delivery.1),
            add_time,
        }
    }

    #[test]
    fn test_single_agent_pickup_and_delivery() {
        let mut system = System::new(
            Map::open(5, 5),
            vec![task((0, 4), (4, 4), 0)],
            vec![agent(0, 0, Orientation::Deg0)],
        )
        .unwrap();

        system.iterate().unwrap();
        let task = system.task(0).unwrap();
        assert_eq!(task.assigned_agent(), Some(0));
        assert_eq!(task.pickup_time(), Some(4));
        assert_eq!(task.delivery_time(), Some(9));

        let agent = system.get_agent(0).unwrap();
        assert_eq!(agent.pose_at(4).map(|p| p.cell), Some(Cell::new(0, 4)));
        assert_eq!(
            agent.pose_at(9),
            Some(Pose::new(Cell::new(4, 4), Orientation::Deg90))
        );

        for _ in 1..9 {
            system.iterate().unwrap();
        }
        assert_eq!(system.task(0).unwrap().status(), TaskStatus::Delivered);
        assert_eq!(system.active_tasks().count(), 0);
        assert_eq!(system.stats().delivered_tasks, 1);
        assert!(system.verify().is_empty());
    }

    #[test]
    fn test_agents_take_nearest_task() {
        let mut system = System::new(
            Map::open(5, 5),
            vec![task((4, 2), (4, 4), 0), task((0, 2), (0, 4), 0)],
            vec![
                agent(0, 0, Orientation::Deg0),
                agent(4, 0, Orientation::Deg0),
            ],
        )
        .unwrap();

        system.iterate().unwrap();
        assert_eq!(system.task(0).unwrap().assigned_agent(), Some(1));
        assert_eq!(system.task(1).unwrap().assigned_agent(), Some(0));

        for _ in 0..5 {
            system.iterate().unwrap();
        }
        assert!(system
            .tasks()
            .iter()
            .all(|task| task.status() == TaskStatus::Delivered));
        assert!(system.verify().is_empty());
    }

    #[test]
    fn test_idle_agent_stays_on_plain_cell() {
        let mut system = System::new(
            Map::open(3, 3),
            Vec::new(),
            vec![agent(1, 1, Orientation::Deg180)],
        )
        .unwrap();

        system.iterate().unwrap().iterate().unwrap();
        let agent = system.get_agent(0).unwrap();
        assert_eq!(agent.pose_at(2), Some(Pose::new(Cell::new(1, 1), Orientation::Deg180)));
        assert_eq!(system.stats().recovery_steps, 0);
    }

    #[test]
    fn test_crossing_agents_do_not_collide() {
        let mut system = System::new(
            Map::open(5, 5),
            vec![task((4, 2), (4, 4), 0), task((2, 4), (0, 4), 0)],
            vec![
                agent(0, 2, Orientation::Deg90),
                agent(2, 0, Orientation::Deg0),
            ],
        )
        .unwrap();

        for _ in 0..20 {
            system.iterate().unwrap();
        }
        assert_eq!(system.stats().delivered_tasks, 2);
        assert!(system.verify().is_empty());
    }
}
