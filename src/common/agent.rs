use super::{AgentId, Pose, TimeStep, Trajectory};
use crate::strategy::Strategy;

/// Starting parameters for one robot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSpec {
    pub start: Pose,
    pub strategy: Strategy,
}

#[derive(Debug, Clone)]
pub struct Agent {
    pub id: AgentId,
    pub strategy: Strategy,
    // Mutated only through `System`, which mirrors it into the reservation table.
    pub(crate) trajectory: Trajectory,
}

impl Agent {
    pub(crate) fn new(id: AgentId, spec: &AgentSpec) -> Self {
        Agent {
            id,
            strategy: spec.strategy,
            trajectory: Trajectory::new(spec.start),
        }
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    pub fn pose_at(&self, time_step: TimeStep) -> Option<Pose> {
        self.trajectory.get(time_step).copied()
    }

    pub fn final_pose(&self) -> Pose {
        self.trajectory.last().1
    }

    pub fn has_plan_for(&self, time_step: TimeStep) -> bool {
        self.trajectory.contains(time_step)
    }
}
