use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use crate::agent::{Agent, AgentTask};
use crate::allocator;
use crate::config::SimConfig;
use crate::constants::SEVERITY_WEIGHTS;
use crate::error::{SimError, SimResult};
use crate::metrics::{MetricsCollector, RunMetrics, StepMetrics};
use crate::pathfinding::PlannedPath;
use crate::rng::{DrawKind, RandomStream};
use crate::types::{
    AgentId, Cell, ReleaseReason, Severity, SimEvent, StepReport, TerminationReason, VictimId,
    VictimState,
};
use crate::victims::{Victim, VictimProfile, VictimRegistry};
use crate::world::WorldGrid;

mod agent_system;
mod spawn_system;
mod utils;

use self::utils::reported_cell_near;

/// One seeded run: world, victims, agents and the clock that drives them.
#[derive(Clone, Debug)]
pub struct Simulation {
    config: SimConfig,
    rng: RandomStream,
    grid: WorldGrid,
    victims: VictimRegistry,
    agents: Vec<Agent>,

    step: u32,
    events: Vec<SimEvent>,
    metrics: MetricsCollector,
    finished: Option<TerminationReason>,
    trickle_spawned: usize,
}

impl Simulation {
    pub fn new(config: SimConfig, seed: u64) -> SimResult<Self> {
        config.validate()?;
        let mut rng = RandomStream::new(seed);
        let grid = WorldGrid::generate(&config, &mut rng)?;
        let mut sim = Self::assemble(config, grid, rng);
        sim.place_initial_victims()?;
        let reachable = sim.grid.reachable_from(sim.grid.extraction());
        let stranded = sim
            .victims
            .iter()
            .filter(|victim| !reachable.contains(&victim.cell))
            .count();
        info!(
            seed,
            width = sim.grid.width(),
            height = sim.grid.height(),
            agents = sim.agents.len(),
            victims = sim.victims.len(),
            hazards = sim.grid.hazard_count(),
            stranded,
            "simulation initialised"
        );
        Ok(sim)
    }

    /// Builds a run on a fixed layout with victims at known cells. The layout
    /// decides the grid size and victim count; reports are exact while
    /// severity and TTL are still drawn. The grid's extraction cell is the
    /// agents' start.
    pub fn with_layout(
        config: SimConfig,
        grid: WorldGrid,
        victim_cells: &[Cell],
        seed: u64,
    ) -> SimResult<Self> {
        let config = SimConfig {
            width: grid.width(),
            height: grid.height(),
            victim_count: victim_cells.len(),
            ..config
        };
        config.validate()?;
        for cell in victim_cells {
            if !grid.is_passable(*cell) {
                return Err(SimError::invalid_config(format!(
                    "victim cell {cell} is not passable"
                )));
            }
        }
        let mut sim = Self::assemble(config, grid, RandomStream::new(seed));
        for cell in victim_cells {
            let profile = sim.draw_victim_profile();
            sim.victims.spawn(*cell, *cell, 0, profile);
        }
        Ok(sim)
    }

    fn assemble(config: SimConfig, grid: WorldGrid, rng: RandomStream) -> Self {
        let extraction = grid.extraction();
        let agents = (0..config.agent_count)
            .map(|idx| Agent::new(AgentId(idx as u32), extraction, config.capacity))
            .collect();
        Self {
            config,
            rng,
            grid,
            victims: VictimRegistry::new(),
            agents,
            step: 0,
            events: Vec::new(),
            metrics: MetricsCollector::new(),
            finished: None,
            trickle_spawned: 0,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }

    pub fn grid(&self) -> &WorldGrid {
        &self.grid
    }

    pub fn victims(&self) -> &VictimRegistry {
        &self.victims
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn current_step(&self) -> u32 {
        self.step
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    pub fn termination_reason(&self) -> Option<TerminationReason> {
        self.finished
    }

    pub fn step_metrics(&self) -> &[StepMetrics] {
        self.metrics.rows()
    }

    /// Current map with agents and still-active victims drawn on top.
    pub fn render_ascii(&self) -> String {
        let agents: Vec<Cell> = self.agents.iter().map(|agent| agent.cell).collect();
        let victims: Vec<Cell> = self
            .victims
            .iter()
            .filter(|victim| !victim.state.is_terminal())
            .map(|victim| victim.cell)
            .collect();
        self.grid.render_ascii(&agents, &victims)
    }

    /// Advances one full step. Once the run has finished this is a no-op that
    /// reports the final state again.
    pub fn step(&mut self) -> SimResult<StepReport> {
        if self.finished.is_some() {
            return Ok(self.build_report());
        }
        self.step += 1;

        let hazard_events = self.grid.step_hazards(&self.config, &mut self.rng);
        self.events.extend(hazard_events);
        self.spawn_trickle_victim();
        self.allocate_tasks()?;
        for idx in 0..self.agents.len() {
            self.advance_agent(idx)?;
        }
        self.expire_victims()?;
        self.check_termination()?;
        self.record_metrics();

        Ok(self.build_report())
    }

    pub fn run(&mut self) -> SimResult<RunMetrics> {
        loop {
            let report = self.step()?;
            if let Some(reason) = report.finished {
                return Ok(self.finish(reason));
            }
        }
    }

    pub fn run_with_trace(&mut self) -> SimResult<(RunMetrics, Vec<StepReport>)> {
        let mut trace = Vec::new();
        loop {
            let report = self.step()?;
            let finished = report.finished;
            trace.push(report);
            if let Some(reason) = finished {
                return Ok((self.finish(reason), trace));
            }
        }
    }

    /// Runs to completion unless `cancel` is raised first. A cancelled run
    /// yields `None`, never partial metrics.
    pub fn run_until_cancelled(&mut self, cancel: &AtomicBool) -> SimResult<Option<RunMetrics>> {
        loop {
            if cancel.load(Ordering::Relaxed) {
                debug!(seed = self.seed(), step = self.step, "run cancelled");
                return Ok(None);
            }
            let report = self.step()?;
            if let Some(reason) = report.finished {
                return Ok(Some(self.finish(reason)));
            }
        }
    }

    /// Final metrics, available once the run has terminated.
    pub fn metrics(&self) -> Option<RunMetrics> {
        self.finished.map(|reason| {
            self.metrics
                .finish(self.seed(), self.step, &self.victims, reason)
        })
    }

    fn finish(&self, reason: TerminationReason) -> RunMetrics {
        let metrics = self
            .metrics
            .finish(self.seed(), self.step, &self.victims, reason);
        info!(
            seed = metrics.seed,
            steps = metrics.steps,
            rescued = metrics.rescued,
            lost = metrics.lost,
            discoveries = self.metrics.discoveries(),
            reason = reason.key(),
            "run finished"
        );
        metrics
    }

    fn allocate_tasks(&mut self) -> SimResult<()> {
        let assignments = {
            let idle: Vec<&Agent> = self.agents.iter().filter(|agent| agent.is_idle()).collect();
            if idle.is_empty() {
                return Ok(());
            }
            let candidates = self.victims.candidates();
            allocator::assign(&idle, &candidates, &self.grid)
        };

        for assignment in assignments {
            self.victims.assign(assignment.victim, assignment.agent)?;
            let distance = assignment.path.len();
            let agent = &mut self.agents[assignment.agent.0 as usize];
            agent.assign(assignment.victim, assignment.path);
            debug!(
                agent = %assignment.agent,
                victim = %assignment.victim,
                distance,
                "task assigned"
            );
            self.events.push(SimEvent::TaskAssigned {
                agent: assignment.agent,
                victim: assignment.victim,
                distance,
            });
        }
        Ok(())
    }

    fn expire_victims(&mut self) -> SimResult<()> {
        let expired = self.victims.expire(
            self.step,
            &self.grid,
            self.config.hazard_ttl_penalty,
        )?;
        self.handle_lost(expired);
        Ok(())
    }

    fn handle_lost(&mut self, lost: Vec<(VictimId, Option<AgentId>)>) {
        for (victim, holder) in lost {
            debug!(victim = %victim, step = self.step, "victim lost");
            self.events.push(SimEvent::VictimLost { victim });
            let Some(agent_id) = holder else {
                continue;
            };
            let Some(agent) = self.agents.get_mut(agent_id.0 as usize) else {
                continue;
            };
            if agent.target() == Some(victim) {
                agent.release();
                self.events.push(SimEvent::AssignmentReleased {
                    agent: agent_id,
                    victim,
                    reason: ReleaseReason::VictimLost,
                });
            }
        }
    }

    fn trickle_pending(&self) -> bool {
        self.config.victim_spawn_probability > 0.0
            && self.trickle_spawned < self.config.max_trickle_victims
    }

    fn check_termination(&mut self) -> SimResult<()> {
        if self.victims.all_terminal() && !self.trickle_pending() {
            self.finished = Some(TerminationReason::AllResolved);
            return Ok(());
        }
        if self.step >= self.config.max_steps {
            let remaining = self.victims.expire_all(self.step)?;
            self.handle_lost(remaining);
            self.finished = Some(TerminationReason::StepBudgetExhausted);
        }
        Ok(())
    }

    fn record_metrics(&mut self) {
        for event in &self.events {
            self.metrics.observe(event);
        }
        let rescued = self.victims.count(VictimState::Rescued);
        let lost = self.victims.count(VictimState::Lost);
        self.metrics.record_step(StepMetrics {
            step: self.step,
            rescued,
            lost,
            active: self.victims.len() - rescued - lost,
            hazard_cells: self.grid.hazard_count(),
            idle_agents: self.agents.iter().filter(|agent| agent.is_idle()).count(),
        });
    }

    fn build_report(&mut self) -> StepReport {
        StepReport {
            step: self.step,
            events: std::mem::take(&mut self.events),
            agents: self.agents.iter().map(Agent::view).collect(),
            victims: self.victims.views(),
            hazard_cells: self.grid.hazard_count(),
            finished: self.finished,
        }
    }
}
