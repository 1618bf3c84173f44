use serde::{Deserialize, Serialize};

use super::{AgentId, Cell, TaskId, TimeStep};
use crate::error::{Error, Result};

/// A pickup-delivery job as handed over by a task producer, before the
/// `System` issues it an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub pickup: Cell,
    pub delivery: Cell,
    pub add_time: TimeStep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskStatus {
    Pending,
    Assigned,
    PickedUp,
    Delivered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub pickup: Cell,
    pub delivery: Cell,
    pub add_time: TimeStep,
    assigned_agent: Option<AgentId>,
    pickup_time: Option<TimeStep>,
    delivery_time: Option<TimeStep>,
    picked_up: bool,
    delivered: bool,
}

impl Task {
    pub fn new(id: TaskId, request: TaskRequest) -> Self {
        Task {
            id,
            pickup: request.pickup,
            delivery: request.delivery,
            add_time: request.add_time,
            assigned_agent: None,
            pickup_time: None,
            delivery_time: None,
            picked_up: false,
            delivered: false,
        }
    }

    pub fn status(&self) -> TaskStatus {
        if self.delivered {
            TaskStatus::Delivered
        } else if self.picked_up {
            TaskStatus::PickedUp
        } else if self.assigned_agent.is_some() {
            TaskStatus::Assigned
        } else {
            TaskStatus::Pending
        }
    }

    pub fn assigned_agent(&self) -> Option<AgentId> {
        self.assigned_agent
    }

    /// Planned pickup timestep.
    pub fn pickup_time(&self) -> Option<TimeStep> {
        self.pickup_time
    }

    /// Planned delivery timestep.
    pub fn delivery_time(&self) -> Option<TimeStep> {
        self.delivery_time
    }

    pub fn is_picked_up(&self) -> bool {
        self.picked_up
    }

    /// Assigned and its planned pickup has been reached.
    pub fn is_executing(&self, now: TimeStep) -> bool {
        self.assigned_agent.is_some() && self.pickup_time.is_some_and(|t| t <= now)
    }

    pub fn assign(&mut self, agent: AgentId) -> Result<&mut Self> {
        if self.status() != TaskStatus::Pending {
            return Err(self.illegal(agent, "assign is only allowed while pending"));
        }
        self.assigned_agent = Some(agent);
        Ok(self)
    }

    /// Hands an assigned, not yet picked up task back to the pending pool.
    pub fn release(&mut self, agent: AgentId) -> Result<&mut Self> {
        self.check_assigned(agent)?;
        if self.picked_up {
            return Err(self.illegal(agent, "cannot release a task after pickup"));
        }
        self.assigned_agent = None;
        self.pickup_time = None;
        self.delivery_time = None;
        Ok(self)
    }

    pub fn pickup(&mut self, time_step: TimeStep, agent: AgentId) -> Result<&mut Self> {
        self.check_assigned(agent)?;
        if self.picked_up {
            return Err(self.illegal(agent, "pickup already completed"));
        }
        self.pickup_time = Some(time_step);
        Ok(self)
    }

    pub fn deliver(&mut self, time_step: TimeStep, agent: AgentId) -> Result<&mut Self> {
        self.check_assigned(agent)?;
        match self.pickup_time {
            Some(pickup_time) if pickup_time <= time_step => {
                self.delivery_time = Some(time_step);
                Ok(self)
            }
            Some(_) => Err(self.illegal(agent, "delivery planned before pickup")),
            None => Err(self.illegal(agent, "deliver requires a planned pickup")),
        }
    }

    pub(crate) fn complete_pickup(&mut self, now: TimeStep) -> Result<()> {
        let agent = self.assigned_agent.unwrap_or(usize::MAX);
        match self.pickup_time {
            Some(t) if t <= now && self.assigned_agent.is_some() => {
                self.picked_up = true;
                Ok(())
            }
            _ => Err(self.illegal(agent, "pickup time not reached")),
        }
    }

    pub(crate) fn complete_delivery(&mut self, now: TimeStep) -> Result<()> {
        let agent = self.assigned_agent.unwrap_or(usize::MAX);
        if !self.picked_up {
            return Err(self.illegal(agent, "delivery before pickup"));
        }
        match self.delivery_time {
            Some(t) if t <= now => {
                self.delivered = true;
                Ok(())
            }
            _ => Err(self.illegal(agent, "delivery time not reached")),
        }
    }

    fn check_assigned(&self, agent: AgentId) -> Result<()> {
        if self.assigned_agent != Some(agent) {
            return Err(self.illegal(agent, "agent is not the assigned agent"));
        }
        Ok(())
    }

    fn illegal(&self, agent: AgentId, reason: &'static str) -> Error {
        Error::IllegalTransition {
            task: self.id,
            agent,
            reason,
        }
    }
}
