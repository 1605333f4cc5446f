//! Victim bookkeeping. Victims live in an arena indexed by [`VictimId`];
//! agents and the allocator only ever hold ids.

use tracing::debug;

use crate::constants::victim_aging_rate;
use crate::error::{SimError, SimResult};
use crate::types::{AgentId, Cell, Severity, VictimId, VictimState, VictimView};
use crate::world::WorldGrid;

/// Per-victim traits drawn when the victim appears.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VictimProfile {
    pub severity: Severity,
    pub ttl: u32,
}

impl VictimProfile {
    pub const fn new(severity: Severity, ttl: u32) -> Self {
        Self { severity, ttl }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Victim {
    pub id: VictimId,
    pub cell: Cell,
    /// Last known location handed to rescuers; may differ from `cell` until discovery.
    pub reported_cell: Cell,
    pub state: VictimState,
    pub severity: Severity,
    /// Age at which the victim is lost.
    pub ttl: u32,
    pub spawned_at: u32,
    pub discovered_at: Option<u32>,
    pub rescued_at: Option<u32>,
    pub lost_at: Option<u32>,
    pub assigned_agent: Option<AgentId>,
    pub age: u32,
}

impl Victim {
    /// Cell rescuers should head for given what is currently known.
    pub fn target_cell(&self) -> Cell {
        if self.state == VictimState::Undiscovered {
            self.reported_cell
        } else {
            self.cell
        }
    }

    pub fn latency(&self) -> Option<u32> {
        let rescued_at = self.rescued_at?;
        let from = self.discovered_at.unwrap_or(self.spawned_at);
        Some(rescued_at.saturating_sub(from))
    }
}

#[derive(Clone, Debug, Default)]
pub struct VictimRegistry {
    victims: Vec<Victim>,
}

impl VictimRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(
        &mut self,
        cell: Cell,
        reported_cell: Cell,
        step: u32,
        profile: VictimProfile,
    ) -> VictimId {
        let id = VictimId(self.victims.len() as u32);
        self.victims.push(Victim {
            id,
            cell,
            reported_cell,
            state: VictimState::Undiscovered,
            severity: profile.severity,
            ttl: profile.ttl,
            spawned_at: step,
            discovered_at: None,
            rescued_at: None,
            lost_at: None,
            assigned_agent: None,
            age: 0,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.victims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.victims.is_empty()
    }

    pub fn get(&self, id: VictimId) -> Option<&Victim> {
        self.victims.get(id.0 as usize)
    }

    fn get_mut(&mut self, id: VictimId) -> SimResult<&mut Victim> {
        self.victims
            .get_mut(id.0 as usize)
            .ok_or(SimError::UnknownVictim(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Victim> {
        self.victims.iter()
    }

    pub fn occupies(&self, cell: Cell) -> bool {
        self.victims.iter().any(|victim| victim.cell == cell)
    }

    /// Undiscovered → Discovered. Returns `false` for a redundant discovery.
    pub fn discover(&mut self, id: VictimId, step: u32) -> SimResult<bool> {
        let victim = self.get_mut(id)?;
        if victim.state != VictimState::Undiscovered {
            debug!(victim = %id, state = ?victim.state, "redundant discovery ignored");
            return Ok(false);
        }
        victim.state = VictimState::Discovered;
        victim.discovered_at = Some(step);
        victim.reported_cell = victim.cell;
        Ok(true)
    }

    /// Reserves the victim for `agent`. A victim holds at most one agent.
    pub fn assign(&mut self, id: VictimId, agent: AgentId) -> SimResult<()> {
        let victim = self.get_mut(id)?;
        let assignable = matches!(
            victim.state,
            VictimState::Undiscovered | VictimState::Discovered
        );
        if !assignable || victim.assigned_agent.is_some() {
            return Err(SimError::AlreadyAssigned {
                victim: id,
                agent,
                holder: victim.assigned_agent,
            });
        }
        victim.assigned_agent = Some(agent);
        Ok(())
    }

    /// Drops `agent`'s claim. A victim mid-rescue falls back to Discovered.
    pub fn release(&mut self, id: VictimId, agent: AgentId) -> SimResult<()> {
        let victim = self.get_mut(id)?;
        if victim.assigned_agent != Some(agent) {
            return Ok(());
        }
        victim.assigned_agent = None;
        if victim.state == VictimState::BeingRescued {
            victim.state = VictimState::Discovered;
        }
        Ok(())
    }

    /// Discovered → BeingRescued. Fails if the victim is in any other state or
    /// is held by a different agent.
    pub fn begin_rescue(&mut self, id: VictimId, agent: AgentId) -> SimResult<()> {
        let victim = self.get_mut(id)?;
        let held_by_other = victim
            .assigned_agent
            .map(|holder| holder != agent)
            .unwrap_or(false);
        if victim.state != VictimState::Discovered || held_by_other {
            return Err(SimError::AlreadyAssigned {
                victim: id,
                agent,
                holder: victim.assigned_agent,
            });
        }
        victim.state = VictimState::BeingRescued;
        victim.assigned_agent = Some(agent);
        Ok(())
    }

    /// BeingRescued → Rescued (terminal). Returns the rescue latency.
    pub fn complete_rescue(&mut self, id: VictimId, step: u32) -> SimResult<u32> {
        let victim = self.get_mut(id)?;
        if victim.state != VictimState::BeingRescued {
            return Err(SimError::InvalidTransition {
                victim: id,
                from: victim.state,
                to: VictimState::Rescued,
            });
        }
        victim.state = VictimState::Rescued;
        victim.rescued_at = Some(step);
        victim.assigned_agent = None;
        Ok(victim.latency().unwrap_or(0))
    }

    /// Any non-terminal state → Lost (terminal). Returns the agent that held it.
    pub fn mark_lost(&mut self, id: VictimId, step: u32) -> SimResult<Option<AgentId>> {
        let victim = self.get_mut(id)?;
        if victim.state.is_terminal() {
            return Err(SimError::InvalidTransition {
                victim: id,
                from: victim.state,
                to: VictimState::Lost,
            });
        }
        victim.state = VictimState::Lost;
        victim.lost_at = Some(step);
        Ok(victim.assigned_agent.take())
    }

    /// Ages every active victim and marks those past their own TTL as Lost.
    /// Victims on a hazard age faster. Returns the newly lost victims with
    /// their former holder.
    pub fn expire(
        &mut self,
        step: u32,
        grid: &WorldGrid,
        hazard_ttl_penalty: u32,
    ) -> SimResult<Vec<(VictimId, Option<AgentId>)>> {
        let mut expired = Vec::new();
        for victim in self.victims.iter_mut() {
            if victim.state.is_terminal() {
                continue;
            }
            let rate = victim_aging_rate(grid.is_hazardous(victim.cell), hazard_ttl_penalty);
            victim.age = victim.age.saturating_add(rate);
            if victim.age > victim.ttl {
                expired.push(victim.id);
            }
        }

        let mut out = Vec::with_capacity(expired.len());
        for id in expired {
            let holder = self.mark_lost(id, step)?;
            out.push((id, holder));
        }
        Ok(out)
    }

    /// Marks every remaining active victim Lost (step budget exhausted).
    pub fn expire_all(&mut self, step: u32) -> SimResult<Vec<(VictimId, Option<AgentId>)>> {
        let active: Vec<VictimId> = self
            .victims
            .iter()
            .filter(|victim| !victim.state.is_terminal())
            .map(|victim| victim.id)
            .collect();
        let mut out = Vec::with_capacity(active.len());
        for id in active {
            let holder = self.mark_lost(id, step)?;
            out.push((id, holder));
        }
        Ok(out)
    }

    /// Victims the allocator may hand out, in id order.
    pub fn candidates(&self) -> Vec<&Victim> {
        self.victims
            .iter()
            .filter(|victim| {
                victim.assigned_agent.is_none()
                    && matches!(
                        victim.state,
                        VictimState::Undiscovered | VictimState::Discovered
                    )
            })
            .collect()
    }

    pub fn all_terminal(&self) -> bool {
        self.victims.iter().all(|victim| victim.state.is_terminal())
    }

    pub fn count(&self, state: VictimState) -> usize {
        self.victims
            .iter()
            .filter(|victim| victim.state == state)
            .count()
    }

    pub fn views(&self) -> Vec<VictimView> {
        self.victims
            .iter()
            .map(|victim| VictimView {
                id: victim.id,
                cell: victim.cell,
                state: victim.state,
                severity: victim.severity,
                assigned_agent: victim.assigned_agent,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEADY: VictimProfile = VictimProfile::new(Severity::Moderate, 1_000);

    fn registry_with(count: usize) -> VictimRegistry {
        let mut registry = VictimRegistry::new();
        for idx in 0..count {
            let cell = Cell::new(idx as i32, 0);
            registry.spawn(cell, cell, 0, STEADY);
        }
        registry
    }

    #[test]
    fn full_rescue_lifecycle() {
        let mut registry = registry_with(1);
        let id = VictimId(0);
        let agent = AgentId(0);

        registry.assign(id, agent).expect("free victim");
        assert!(registry.discover(id, 3).expect("known victim"));
        registry.begin_rescue(id, agent).expect("holder may start");
        let latency = registry.complete_rescue(id, 7).expect("in progress");

        assert_eq!(latency, 4);
        let victim = registry.get(id).expect("exists");
        assert_eq!(victim.state, VictimState::Rescued);
        assert_eq!(victim.assigned_agent, None);
        assert!(registry.all_terminal());
    }

    #[test]
    fn redundant_discovery_is_a_no_op() {
        let mut registry = registry_with(1);
        assert!(registry.discover(VictimId(0), 1).expect("exists"));
        assert!(!registry.discover(VictimId(0), 5).expect("exists"));
        assert_eq!(registry.get(VictimId(0)).and_then(|v| v.discovered_at), Some(1));
    }

    #[test]
    fn second_agent_cannot_claim_a_held_victim() {
        let mut registry = registry_with(1);
        registry.assign(VictimId(0), AgentId(1)).expect("free");
        let err = registry
            .assign(VictimId(0), AgentId(2))
            .expect_err("already held");
        assert!(matches!(
            err,
            SimError::AlreadyAssigned {
                holder: Some(AgentId(1)),
                ..
            }
        ));
    }

    #[test]
    fn begin_rescue_requires_discovery_and_matching_holder() {
        let mut registry = registry_with(1);
        let id = VictimId(0);
        assert!(registry.begin_rescue(id, AgentId(0)).is_err());

        registry.discover(id, 0).expect("exists");
        registry.assign(id, AgentId(0)).expect("free");
        assert!(registry.begin_rescue(id, AgentId(1)).is_err());
        registry.begin_rescue(id, AgentId(0)).expect("holder");
        assert!(registry.begin_rescue(id, AgentId(0)).is_err());
    }

    #[test]
    fn terminal_states_never_transition_again() {
        let mut registry = registry_with(2);
        registry.discover(VictimId(0), 0).expect("exists");
        registry.begin_rescue(VictimId(0), AgentId(0)).expect("free");
        registry.complete_rescue(VictimId(0), 2).expect("in progress");
        registry.mark_lost(VictimId(1), 2).expect("active");

        assert!(registry.mark_lost(VictimId(0), 3).is_err());
        assert!(registry.mark_lost(VictimId(1), 3).is_err());
        assert!(registry.complete_rescue(VictimId(1), 3).is_err());
        assert!(!registry.discover(VictimId(1), 3).expect("exists"));
        assert!(registry.assign(VictimId(0), AgentId(4)).is_err());
        assert_eq!(registry.count(VictimState::Rescued), 1);
        assert_eq!(registry.count(VictimState::Lost), 1);
    }

    #[test]
    fn release_reverts_rescue_in_progress() {
        let mut registry = registry_with(1);
        let id = VictimId(0);
        registry.discover(id, 0).expect("exists");
        registry.begin_rescue(id, AgentId(3)).expect("free");
        registry.release(id, AgentId(9)).expect("exists");
        assert_eq!(registry.get(id).map(|v| v.state), Some(VictimState::BeingRescued));

        registry.release(id, AgentId(3)).expect("exists");
        let victim = registry.get(id).expect("exists");
        assert_eq!(victim.state, VictimState::Discovered);
        assert_eq!(victim.assigned_agent, None);
        assert_eq!(registry.candidates().len(), 1);
    }

    #[test]
    fn expiry_reports_holder_and_respects_hazard_penalty() {
        let grid = WorldGrid::from_rows(&["E~."]).expect("valid layout");
        let mut registry = VictimRegistry::new();
        let short = VictimProfile::new(Severity::Critical, 3);
        let safe = registry.spawn(Cell::new(2, 0), Cell::new(2, 0), 0, short);
        let burning = registry.spawn(Cell::new(1, 0), Cell::new(1, 0), 0, short);
        registry.assign(burning, AgentId(5)).expect("free");

        let first = registry.expire(1, &grid, 1).expect("valid");
        assert!(first.is_empty());
        let second = registry.expire(2, &grid, 1).expect("valid");
        assert_eq!(second, vec![(burning, Some(AgentId(5)))]);
        assert_eq!(registry.get(safe).map(|v| v.age), Some(2));
        assert_eq!(registry.get(burning).and_then(|v| v.lost_at), Some(2));
    }

    #[test]
    fn each_victim_expires_on_its_own_ttl() {
        let grid = WorldGrid::from_rows(&["E.."]).expect("valid layout");
        let mut registry = VictimRegistry::new();
        let frail = registry.spawn(
            Cell::new(1, 0),
            Cell::new(1, 0),
            0,
            VictimProfile::new(Severity::Critical, 1),
        );
        let sturdy = registry.spawn(
            Cell::new(2, 0),
            Cell::new(2, 0),
            0,
            VictimProfile::new(Severity::Minor, 4),
        );

        let mut lost_at = Vec::new();
        for step in 1..=6 {
            for (id, _) in registry.expire(step, &grid, 0).expect("valid") {
                lost_at.push((id, step));
            }
        }
        assert_eq!(lost_at, vec![(frail, 2), (sturdy, 5)]);
        assert_eq!(registry.get(sturdy).map(|v| v.severity), Some(Severity::Minor));
    }

    #[test]
    fn unknown_victim_is_reported() {
        let mut registry = registry_with(1);
        assert!(matches!(
            registry.discover(VictimId(9), 0),
            Err(SimError::UnknownVictim(VictimId(9)))
        ));
    }
}
