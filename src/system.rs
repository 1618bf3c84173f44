use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::algorithm::{a_star_search, fallback_step, ReservationTable, SearchResult};
use crate::common::{
    Agent, AgentId, AgentSpec, Cell, IdSequence, Pose, Task, TaskId, TaskRequest, TaskStatus,
    TimeStep, Trajectory,
};
use crate::error::{Error, Result};
use crate::map::{Category, Map};
use crate::stat::Stats;
use crate::strategy::{plan_batch, PreemptionGuard, Strategy};

/// Read-only view of one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub time_step: TimeStep,
    pub agents: Vec<AgentView>,
    pub tasks: Vec<TaskView>,
    pub stats: Stats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentView {
    pub id: AgentId,
    pub strategy: Strategy,
    pub pose: Option<Pose>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskView {
    pub id: TaskId,
    pub pickup: Cell,
    pub delivery: Cell,
    pub assigned_agent: Option<AgentId>,
    pub picked_up: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    Vertex {
        agents: (AgentId, AgentId),
        cell: Cell,
        time_step: TimeStep,
    },
    Edge {
        agents: (AgentId, AgentId),
        from: Cell,
        to: Cell,
        time_step: TimeStep,
    },
}

/// Owns the map, the task roster, the agents and the reservation table, and
/// advances them one timestep at a time.
#[derive(Debug)]
pub struct System {
    map: Map,
    time_step: TimeStep,
    // Indexed by task id.
    tasks: Vec<Task>,
    active: BTreeSet<TaskId>,
    // Indexed by agent id.
    agents: Vec<Agent>,
    reservations: ReservationTable,
    task_ids: IdSequence,
    agent_ids: IdSequence,
    stats: Stats,
}

impl System {
    pub fn new(map: Map, tasks: Vec<TaskRequest>, agents: Vec<AgentSpec>) -> Result<Self> {
        for request in &tasks {
            check_endpoint(&map, request.pickup)?;
            check_endpoint(&map, request.delivery)?;
        }
        let mut starts: HashMap<Cell, usize> = HashMap::new();
        for (index, spec) in agents.iter().enumerate() {
            check_endpoint(&map, spec.start.cell)?;
            if let Some(other) = starts.insert(spec.start.cell, index) {
                return Err(Error::InvalidScenario(format!(
                    "agents {other} and {index} both start at {}",
                    spec.start.cell
                )));
            }
        }

        let mut system = System {
            map,
            time_step: 0,
            tasks: Vec::with_capacity(tasks.len()),
            active: BTreeSet::new(),
            agents: Vec::with_capacity(agents.len()),
            reservations: ReservationTable::new(),
            task_ids: IdSequence::new(),
            agent_ids: IdSequence::new(),
            stats: Stats::default(),
        };

        for request in tasks {
            let id = system.task_ids.issue();
            system.tasks.push(Task::new(id, request));
        }
        for spec in &agents {
            let id = system.agent_ids.issue();
            system.reservations.reserve(id, spec.start.cell, 0);
            system.agents.push(Agent::new(id, spec));
        }
        system.activate_due_tasks();

        info!(
            "system with {} agents and {} tasks on a {}x{} map",
            system.agents.len(),
            system.tasks.len(),
            system.map.width,
            system.map.height
        );
        Ok(system)
    }

    /// Advances one timestep: drops reservations older than `now - 1`,
    /// activates due tasks, plans every agent lacking a pose for the new
    /// timestep and settles pickups and deliveries.
    pub fn iterate(&mut self) -> Result<&mut Self> {
        let start_time = Instant::now();
        self.time_step += 1;
        let now = self.time_step;
        self.reservations.prune_before(now - 1);
        self.activate_due_tasks();

        if self.agents.iter().any(|agent| agent.strategy == Strategy::Central) {
            plan_batch(self)?;
        }

        let mut guard = PreemptionGuard::default();
        for agent in 0..self.agents.len() {
            if self.agents[agent].has_plan_for(now) {
                continue;
            }
            let strategy = self.agents[agent].strategy;
            strategy.plan(self, agent, &mut guard)?;
            self.cover_now(agent)?;
        }
        self.update_tasks()?;

        self.stats.ticks += 1;
        self.stats.time_us += start_time.elapsed().as_micros() as usize;
        Ok(self)
    }

    fn activate_due_tasks(&mut self) {
        let now = self.time_step;
        for task in self.tasks.iter().filter(|task| task.add_time == now) {
            debug!("activate task {} at {now}", task.id);
            self.active.insert(task.id);
        }
    }

    /// Recovery step for an agent its strategy left without a pose for now.
    /// Runs as soon as that strategy call returns, so agents planned later in
    /// the tick see the step.
    pub(crate) fn cover_now(&mut self, agent: AgentId) -> Result<()> {
        let now = self.time_step;
        if self.get_agent(agent)?.has_plan_for(now) {
            return Ok(());
        }
        let pose = self.planning_pose(agent)?;
        let next = fallback_step(&self.map, &self.reservations, agent, pose, now);
        if next == pose && self.reservations.is_vertex_conflict(agent, pose.cell, now) {
            warn!("agent {agent} is boxed in at {} on timestep {now}", pose.cell);
        }

        let mut step = Trajectory::starting_at(now - 1, pose);
        step.push(next);
        self.stats.recovery_steps += 1;
        self.commit(agent, step)
    }

    fn update_tasks(&mut self) -> Result<()> {
        let now = self.time_step;
        let mut delivered = Vec::new();

        for &id in &self.active {
            let task = &mut self.tasks[id];
            if task.assigned_agent().is_none() {
                continue;
            }
            if !task.is_picked_up() && task.pickup_time().is_some_and(|t| t <= now) {
                task.complete_pickup(now)?;
                debug!("task {id} picked up at {now}");
            }
            if task.is_picked_up() && task.delivery_time().is_some_and(|t| t <= now) {
                task.complete_delivery(now)?;
                debug!("task {id} delivered at {now}");
                delivered.push(id);
            }
        }

        for id in delivered {
            self.active.remove(&id);
            self.stats.delivered_tasks += 1;
            self.stats.service_time += now - self.tasks[id].add_time;
        }
        Ok(())
    }

    /// Merges `fragment` into the agent's trajectory and mirrors the change
    /// into the reservation table.
    pub(crate) fn commit(&mut self, agent: AgentId, fragment: Trajectory) -> Result<()> {
        let entries: Vec<(TimeStep, Cell)> =
            fragment.iter().map(|(t, pose)| (t, pose.cell)).collect();
        let replaced = self
            .agents
            .get_mut(agent)
            .ok_or(Error::UnknownAgent(agent))?
            .trajectory
            .merge(fragment)?;

        for (t, pose) in replaced {
            self.reservations.release(agent, pose.cell, t);
        }
        for (t, cell) in entries {
            self.reservations.reserve(agent, cell, t);
        }
        Ok(())
    }

    /// Drops the agent's plan at and after `from`.
    pub(crate) fn clear_future(&mut self, agent: AgentId, from: TimeStep) -> Result<()> {
        let removed = self
            .agents
            .get_mut(agent)
            .ok_or(Error::UnknownAgent(agent))?
            .trajectory
            .truncate_from(from);
        for (t, pose) in removed {
            self.reservations.release(agent, pose.cell, t);
        }
        Ok(())
    }

    pub(crate) fn search(
        &mut self,
        agent: AgentId,
        start: Pose,
        start_time: TimeStep,
        goal: Cell,
    ) -> SearchResult {
        a_star_search(
            &self.map,
            &self.reservations,
            agent,
            start,
            start_time,
            goal,
            &mut self.stats,
        )
    }

    /// The pose planning starts from: the entry at `now - 1`.
    pub(crate) fn planning_pose(&self, agent: AgentId) -> Result<Pose> {
        let time_step = self.time_step.saturating_sub(1);
        self.get_agent(agent)?
            .pose_at(time_step)
            .ok_or(Error::MissingPose { agent, time_step })
    }

    pub(crate) fn task_mut(&mut self, id: TaskId) -> Result<&mut Task> {
        self.tasks.get_mut(id).ok_or(Error::UnknownTask(id))
    }

    pub(crate) fn stats_mut(&mut self) -> &mut Stats {
        &mut self.stats
    }

    pub fn get_agent(&self, id: AgentId) -> Result<&Agent> {
        self.agents.get(id).ok_or(Error::UnknownAgent(id))
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn task(&self, id: TaskId) -> Result<&Task> {
        self.tasks.get(id).ok_or(Error::UnknownTask(id))
    }

    /// The full roster, delivered tasks included.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Released and not yet delivered, in roster order.
    pub fn active_tasks(&self) -> impl Iterator<Item = &Task> + '_ {
        self.active.iter().map(move |&id| &self.tasks[id])
    }

    pub fn pending_tasks(&self) -> impl Iterator<Item = &Task> + '_ {
        self.active_tasks()
            .filter(|task| task.assigned_agent().is_none())
    }

    pub fn assigned_unpicked_tasks(&self) -> impl Iterator<Item = &Task> + '_ {
        self.active_tasks()
            .filter(|task| task.assigned_agent().is_some() && !task.is_picked_up())
    }

    /// Pending or assigned with a pickup still in the future.
    pub fn available_tasks(&self) -> impl Iterator<Item = &Task> + '_ {
        let now = self.time_step;
        self.active_tasks()
            .filter(move |task| !task.is_picked_up() && !task.is_executing(now))
    }

    pub fn executing_tasks(&self) -> impl Iterator<Item = &Task> + '_ {
        let now = self.time_step;
        self.active_tasks()
            .filter(move |task| task.is_executing(now))
    }

    pub fn is_task_endpoint(&self, cell: Cell) -> bool {
        self.active_tasks()
            .any(|task| task.pickup == cell || task.delivery == cell)
    }

    /// Whether another agent plans to be on `cell` now or later.
    pub fn in_other_agent_path(&self, agent: AgentId, cell: Cell) -> bool {
        self.reservations
            .is_reserved_from(cell, self.time_step, agent)
    }

    /// Parking cells that are not another agent's final planned cell, in map
    /// order.
    pub fn free_non_task_endpoints(&self, agent: AgentId) -> Vec<Cell> {
        self.map
            .non_task_endpoints()
            .filter(|cell| {
                self.agents
                    .iter()
                    .all(|other| other.id == agent || other.final_pose().cell != *cell)
            })
            .collect()
    }

    pub fn time_step(&self) -> TimeStep {
        self.time_step
    }

    pub fn map(&self) -> &Map {
        &self.map
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(|task| task.status() == TaskStatus::Delivered)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            time_step: self.time_step,
            agents: self
                .agents
                .iter()
                .map(|agent| AgentView {
                    id: agent.id,
                    strategy: agent.strategy,
                    pose: agent.pose_at(self.time_step),
                })
                .collect(),
            tasks: self
                .active_tasks()
                .map(|task| TaskView {
                    id: task.id,
                    pickup: task.pickup,
                    delivery: task.delivery,
                    assigned_agent: task.assigned_agent(),
                    picked_up: task.is_picked_up(),
                })
                .collect(),
            stats: self.stats.clone(),
        }
    }

    /// Every vertex and swap conflict across the committed trajectories.
    pub fn verify(&self) -> Vec<Conflict> {
        let mut conflicts = Vec::new();
        let horizon = self
            .agents
            .iter()
            .map(|agent| agent.trajectory().last_timestep())
            .max()
            .unwrap_or(0);

        for t in 0..=horizon {
            let mut occupied: HashMap<Cell, AgentId> = HashMap::new();
            for agent in &self.agents {
                let Some(pose) = agent.pose_at(t) else {
                    continue;
                };
                if let Some(&other) = occupied.get(&pose.cell) {
                    conflicts.push(Conflict::Vertex {
                        agents: (other, agent.id),
                        cell: pose.cell,
                        time_step: t,
                    });
                } else {
                    occupied.insert(pose.cell, agent.id);
                }
            }

            if t == 0 {
                continue;
            }
            for (index, first) in self.agents.iter().enumerate() {
                let (Some(a_from), Some(a_to)) = (first.pose_at(t - 1), first.pose_at(t)) else {
                    continue;
                };
                if a_from.cell == a_to.cell {
                    continue;
                }
                for second in &self.agents[index + 1..] {
                    let (Some(b_from), Some(b_to)) = (second.pose_at(t - 1), second.pose_at(t))
                    else {
                        continue;
                    };
                    if a_from.cell == b_to.cell && a_to.cell == b_from.cell {
                        conflicts.push(Conflict::Edge {
                            agents: (first.id, second.id),
                            from: a_from.cell,
                            to: a_to.cell,
                            time_step: t,
                        });
                    }
                }
            }
        }

        if !conflicts.is_empty() {
            warn!("found {} conflicts", conflicts.len());
        }
        conflicts
    }
}

fn check_endpoint(map: &Map, cell: Cell) -> Result<()> {
    match map.category_of(cell)? {
        Category::Obstacle => Err(Error::InvalidScenario(format!("{cell} is an obstacle"))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Orientation;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .try_init();
    }

    fn spec(x: i32, y: i32, orientation: Orientation, strategy: Strategy) -> AgentSpec {
        AgentSpec {
            start: Pose::new(Cell::new(x, y), orientation),
            strategy,
        }
    }

    fn pose(x: i32, y: i32, orientation: Orientation) -> Pose {
        Pose::new(Cell::new(x, y), orientation)
    }

    fn fragment(origin: TimeStep, poses: &[Pose]) -> Trajectory {
        let mut fragment = Trajectory::starting_at(origin, poses[0]);
        poses[1..].iter().for_each(|pose| fragment.push(*pose));
        fragment
    }

    #[test]
    fn test_new_rejects_shared_start() {
        let result = System::new(
            Map::open(3, 3),
            Vec::new(),
            vec![
                spec(1, 1, Orientation::Deg0, Strategy::Tp),
                spec(1, 1, Orientation::Deg90, Strategy::Tp),
            ],
        );
        assert!(matches!(result, Err(Error::InvalidScenario(_))));
    }

    #[test]
    fn test_new_rejects_unknown_endpoint() {
        let result = System::new(
            Map::open(3, 3),
            vec![TaskRequest {
                pickup: Cell::new(1, 1),
                delivery: Cell::new(5, 5),
                add_time: 0,
            }],
            Vec::new(),
        );
        assert_eq!(
            result.err(),
            Some(Error::UnknownCell {
                cell: Cell::new(5, 5)
            })
        );
    }

    #[test]
    fn test_ids_are_issued_in_order() {
        let request = TaskRequest {
            pickup: Cell::new(0, 1),
            delivery: Cell::new(2, 1),
            add_time: 4,
        };
        let system = System::new(
            Map::open(3, 3),
            vec![request.clone(), request],
            vec![
                spec(0, 0, Orientation::Deg0, Strategy::Tp),
                spec(2, 2, Orientation::Deg0, Strategy::Tpts),
            ],
        )
        .unwrap();
        let task_ids: Vec<_> = system.tasks().iter().map(|task| task.id).collect();
        let agent_ids: Vec<_> = system.agents().iter().map(|agent| agent.id).collect();
        assert_eq!(task_ids, vec![0, 1]);
        assert_eq!(agent_ids, vec![0, 1]);
        assert_eq!(system.active_tasks().count(), 0);
    }

    #[test]
    fn test_tasks_activate_on_add_time() {
        init_tracing();
        let mut system = System::new(
            Map::open(5, 5),
            vec![TaskRequest {
                pickup: Cell::new(2, 2),
                delivery: Cell::new(4, 2),
                add_time: 3,
            }],
            vec![spec(0, 0, Orientation::Deg0, Strategy::Tp)],
        )
        .unwrap();

        system.iterate().unwrap().iterate().unwrap();
        assert_eq!(system.active_tasks().count(), 0);
        assert_eq!(system.task(0).unwrap().status(), TaskStatus::Pending);

        system.iterate().unwrap();
        assert_eq!(system.active_tasks().count(), 1);
        let task = system.task(0).unwrap();
        assert_eq!(task.assigned_agent(), Some(0));
        // Planned from the pose at t = 2.
        assert_eq!(task.pickup_time(), Some(7));
    }

    #[test]
    fn test_every_agent_has_pose_for_now() {
        let mut system = System::new(
            Map::open(4, 4),
            vec![TaskRequest {
                pickup: Cell::new(3, 3),
                delivery: Cell::new(0, 3),
                add_time: 1,
            }],
            vec![
                spec(0, 0, Orientation::Deg0, Strategy::Tp),
                spec(3, 0, Orientation::Deg0, Strategy::Tpts),
                spec(1, 1, Orientation::Deg90, Strategy::Central),
            ],
        )
        .unwrap();

        for _ in 0..12 {
            system.iterate().unwrap();
            let now = system.time_step();
            assert!(system.agents().iter().all(|agent| agent.has_plan_for(now)));
        }
        assert_eq!(system.stats().ticks, 12);
    }

    #[test]
    fn test_commit_keeps_reservations_in_sync() {
        let mut system = System::new(
            Map::open(3, 3),
            Vec::new(),
            vec![spec(0, 0, Orientation::Deg0, Strategy::Tp)],
        )
        .unwrap();

        let up = fragment(
            0,
            &[
                pose(0, 0, Orientation::Deg0),
                pose(0, 1, Orientation::Deg0),
                pose(0, 2, Orientation::Deg0),
            ],
        );
        system.commit(0, up).unwrap();
        assert_eq!(system.reservations.occupant(Cell::new(0, 2), 2), Some(0));

        let turn = fragment(
            1,
            &[pose(0, 1, Orientation::Deg0), pose(0, 1, Orientation::Deg90)],
        );
        system.commit(0, turn).unwrap();
        assert_eq!(system.reservations.occupant(Cell::new(0, 2), 2), None);
        assert_eq!(system.reservations.occupant(Cell::new(0, 1), 2), Some(0));

        system.clear_future(0, 1).unwrap();
        assert_eq!(system.reservations.len(), 1);
        assert_eq!(system.get_agent(0).unwrap().trajectory().last_timestep(), 0);
    }

    #[test]
    fn test_verify_reports_conflicts() {
        let mut system = System::new(
            Map::open(3, 3),
            Vec::new(),
            vec![
                spec(0, 0, Orientation::Deg90, Strategy::Tp),
                spec(1, 0, Orientation::Deg270, Strategy::Tp),
                spec(2, 1, Orientation::Deg270, Strategy::Tp),
            ],
        )
        .unwrap();

        // Agents 0 and 1 swap cells between t = 0 and t = 1.
        system
            .commit(0, fragment(0, &[pose(0, 0, Orientation::Deg90), pose(1, 0, Orientation::Deg90)]))
            .unwrap();
        system
            .commit(1, fragment(0, &[pose(1, 0, Orientation::Deg270), pose(0, 0, Orientation::Deg270)]))
            .unwrap();
        // Agent 2 follows onto (1, 0) at t = 2 with agent 0 still there.
        system
            .commit(0, fragment(1, &[pose(1, 0, Orientation::Deg90), pose(1, 0, Orientation::Deg90)]))
            .unwrap();
        system
            .commit(
                2,
                fragment(
                    0,
                    &[
                        pose(2, 1, Orientation::Deg270),
                        pose(1, 1, Orientation::Deg270),
                        pose(1, 0, Orientation::Deg270),
                    ],
                ),
            )
            .unwrap();

        let conflicts = system.verify();
        assert_eq!(
            conflicts,
            vec![
                Conflict::Edge {
                    agents: (0, 1),
                    from: Cell::new(0, 0),
                    to: Cell::new(1, 0),
                    time_step: 1,
                },
                Conflict::Vertex {
                    agents: (0, 2),
                    cell: Cell::new(1, 0),
                    time_step: 2,
                },
            ]
        );
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut system = System::new(
            Map::open(5, 5),
            vec![TaskRequest {
                pickup: Cell::new(0, 4),
                delivery: Cell::new(4, 4),
                add_time: 0,
            }],
            vec![spec(0, 0, Orientation::Deg0, Strategy::Tp)],
        )
        .unwrap();
        system.iterate().unwrap();

        let snapshot = system.snapshot();
        assert_eq!(snapshot.time_step, 1);
        assert_eq!(snapshot.agents[0].pose, Some(pose(0, 1, Orientation::Deg0)));
        assert_eq!(snapshot.tasks.len(), 1);
        assert!(!snapshot.tasks[0].picked_up);

        let line = serde_json::to_string(&snapshot).unwrap();
        assert!(line.contains("\"time_step\":1"));
        assert!(line.contains("\"strategy\":\"tp\""));
        assert!(line.contains("\"orientation\":0"));
        assert!(line.contains("\"ticks\":1"));
    }

    #[test]
    fn test_failed_agent_holds_before_others_plan() {
        init_tracing();
        // (4, 0) is walled off by (3, 0) and (4, 1).
        let mut map = Map::new(5, 3);
        for x in 0..5 {
            for y in 0..3 {
                let category = if [(3, 0), (4, 1)].contains(&(x, y)) {
                    Category::Obstacle
                } else {
                    Category::Free
                };
                map.create(Cell::new(x, y), category).unwrap();
            }
        }
        let mut system = System::new(
            map,
            vec![
                TaskRequest {
                    pickup: Cell::new(1, 1),
                    delivery: Cell::new(4, 0),
                    add_time: 0,
                },
                TaskRequest {
                    pickup: Cell::new(0, 1),
                    delivery: Cell::new(3, 1),
                    add_time: 0,
                },
            ],
            vec![
                spec(1, 1, Orientation::Deg270, Strategy::Central),
                spec(0, 1, Orientation::Deg90, Strategy::Tp),
            ],
        )
        .unwrap();

        system.iterate().unwrap();
        assert!(system.verify().is_empty());

        // The unreachable task stays pending while the other agent plans.
        assert_eq!(system.task(0).unwrap().status(), TaskStatus::Pending);
        assert_eq!(system.task(1).unwrap().assigned_agent(), Some(1));
        assert_eq!(
            system.get_agent(0).unwrap().pose_at(1),
            Some(pose(1, 1, Orientation::Deg270))
        );
        assert_ne!(
            system.get_agent(1).unwrap().pose_at(1).map(|p| p.cell),
            Some(Cell::new(1, 1))
        );
        assert_eq!(system.stats().recovery_steps, 1);
    }

    #[test]
    fn test_reservations_stay_bounded() {
        let mut system = System::new(
            Map::open(3, 3),
            Vec::new(),
            vec![
                spec(0, 0, Orientation::Deg0, Strategy::Tp),
                spec(2, 2, Orientation::Deg180, Strategy::Tp),
            ],
        )
        .unwrap();

        for _ in 0..500 {
            system.iterate().unwrap();
        }
        // One slot at `now - 1` and one at `now` per agent.
        assert_eq!(system.reservations.len(), 4);
        assert_eq!(system.get_agent(0).unwrap().trajectory().last_timestep(), 500);
        assert!(system.verify().is_empty());
    }
}
