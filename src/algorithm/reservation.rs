use std::collections::{BTreeSet, HashMap};
use std::ops::RangeInclusive;

use tracing::warn;

use crate::common::{AgentId, Cell, TimeStep};

/// Who occupies which cell at which timestep, mirrored from every agent's
/// committed trajectory from `now - 1` on.
#[derive(Debug, Clone, Default)]
pub struct ReservationTable {
    // A slot holds two agents only when a boxed-in agent had to stay on a
    // claimed cell.
    slots: HashMap<Cell, BTreeSet<(TimeStep, AgentId)>>,
}

fn slot(time_step: TimeStep) -> RangeInclusive<(TimeStep, AgentId)> {
    (time_step, AgentId::MIN)..=(time_step, AgentId::MAX)
}

impl ReservationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&mut self, agent: AgentId, cell: Cell, time_step: TimeStep) {
        let timeline = self.slots.entry(cell).or_default();
        if let Some(&(_, other)) = timeline
            .range(slot(time_step))
            .find(|(_, other)| *other != agent)
        {
            warn!("agent {agent} reserves {cell} on timestep {time_step} already held by agent {other}");
        }
        timeline.insert((time_step, agent));
    }

    /// Frees the slot only for `agent`; other holders keep it.
    pub fn release(&mut self, agent: AgentId, cell: Cell, time_step: TimeStep) {
        if let Some(timeline) = self.slots.get_mut(&cell) {
            timeline.remove(&(time_step, agent));
            if timeline.is_empty() {
                self.slots.remove(&cell);
            }
        }
    }

    fn occupants(&self, cell: Cell, time_step: TimeStep) -> impl Iterator<Item = AgentId> + '_ {
        self.slots
            .get(&cell)
            .into_iter()
            .flat_map(move |timeline| timeline.range(slot(time_step)).map(|&(_, agent)| agent))
    }

    /// Lowest agent id holding the slot.
    pub fn occupant(&self, cell: Cell, time_step: TimeStep) -> Option<AgentId> {
        self.occupants(cell, time_step).next()
    }

    pub fn is_vertex_conflict(&self, agent: AgentId, cell: Cell, time_step: TimeStep) -> bool {
        self.occupants(cell, time_step).any(|other| other != agent)
    }

    /// Moving `from` (at `time_step - 1`) `to` (at `time_step`) swaps places
    /// with another agent doing the opposite move.
    pub fn is_edge_conflict(
        &self,
        agent: AgentId,
        from: Cell,
        to: Cell,
        time_step: TimeStep,
    ) -> bool {
        if from == to || time_step == 0 {
            return false;
        }
        self.occupants(from, time_step)
            .filter(|&other| other != agent)
            .any(|other| self.occupants(to, time_step - 1).any(|held| held == other))
    }

    /// Whether an agent other than `except` holds `cell` at `time_step` or later.
    pub fn is_reserved_from(&self, cell: Cell, time_step: TimeStep, except: AgentId) -> bool {
        self.slots.get(&cell).is_some_and(|timeline| {
            timeline
                .range((time_step, AgentId::MIN)..)
                .any(|&(_, agent)| agent != except)
        })
    }

    /// Drops every slot before `time_step`.
    pub fn prune_before(&mut self, time_step: TimeStep) {
        self.slots.retain(|_, timeline| {
            *timeline = timeline.split_off(&(time_step, AgentId::MIN));
            !timeline.is_empty()
        });
    }

    pub fn len(&self) -> usize {
        self.slots.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
