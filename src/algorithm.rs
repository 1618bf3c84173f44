mod astar;
mod hungarian;
mod reservation;

pub use astar::{a_star_search, fallback_step, SearchResult};
pub use hungarian::min_cost_assignment;
pub use reservation::ReservationTable;

use std::collections::HashMap;

use crate::common::{Pose, TimeStep, Trajectory};

type Trace = HashMap<Pose, Pose>;

fn construct_path(trace: &Trace, goal: Pose, start_time: TimeStep) -> Trajectory {
    let mut poses = vec![goal];
    let mut current = goal;
    while let Some(&previous) = trace.get(&current) {
        poses.push(previous);
        current = previous;
    }

    let mut poses = poses.into_iter().rev();
    let mut path = Trajectory::starting_at(start_time, poses.next().unwrap_or(goal));
    poses.for_each(|pose| path.push(pose));
    path
}
