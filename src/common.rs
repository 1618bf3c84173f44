mod agent;
mod spatial;
mod task;
mod trajectory;

pub use agent::{Agent, AgentSpec};
pub use spatial::{Action, Cell, Orientation, Pose};
pub use task::{Task, TaskRequest, TaskStatus};
pub use trajectory::Trajectory;

pub type AgentId = usize;
pub type TaskId = usize;
pub type TimeStep = usize;

/// Issues monotonically increasing ids. One sequence lives per simulation
/// run, so ids restart from zero only when a fresh `System` is built.
#[derive(Debug, Clone, Default)]
pub struct IdSequence {
    next: usize,
}

impl IdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&mut self) -> usize {
        let id = self.next;
        self.next += 1;
        id
    }
}
