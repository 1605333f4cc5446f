use tracing::warn;

use super::*;

impl Simulation {
    /// Runs one state-machine step for the agent at `idx`, then lets it sense
    /// its surroundings.
    pub(super) fn advance_agent(&mut self, idx: usize) -> SimResult<()> {
        let task = std::mem::replace(&mut self.agents[idx].task, AgentTask::Idle);
        match task {
            AgentTask::Idle => self.advance_idle(idx)?,
            AgentTask::Moving { victim, path } => self.advance_moving(idx, victim, path)?,
            AgentTask::Searching { victim } => self.advance_searching(idx, victim)?,
            AgentTask::Rescuing { victim, progress } => {
                self.advance_rescuing(idx, victim, progress)?
            }
            AgentTask::Returning { path } => self.advance_returning(idx, path)?,
        }
        self.sense(idx)
    }

    fn advance_idle(&mut self, idx: usize) -> SimResult<()> {
        if self.agents[idx].carrying > 0 {
            self.start_return(idx)?;
        }
        Ok(())
    }

    fn advance_moving(
        &mut self,
        idx: usize,
        victim: VictimId,
        mut path: PlannedPath,
    ) -> SimResult<()> {
        let goal = self.victim(victim)?.target_cell();
        if path.destination() != goal || path.is_compromised(&self.grid) {
            let from = self.agents[idx].cell;
            match PlannedPath::plan(from, goal, &self.grid) {
                Ok(fresh) => {
                    path = fresh;
                    debug!(agent = %self.agents[idx].id, goal = %goal, "path replanned");
                    self.events.push(SimEvent::PathReplanned {
                        agent: self.agents[idx].id,
                    });
                }
                Err(SimError::NoPathExists { .. }) => {
                    return self.release_assignment(idx, victim, ReleaseReason::NoPath);
                }
                Err(err) => return Err(err),
            }
        }

        if let Some(next) = path.next_step() {
            self.move_agent(idx, next);
        }
        if path.is_empty() {
            self.arrive(idx, victim)
        } else {
            self.agents[idx].task = AgentTask::Moving { victim, path };
            Ok(())
        }
    }

    fn arrive(&mut self, idx: usize, victim: VictimId) -> SimResult<()> {
        self.sense(idx)?;
        let (state, cell) = {
            let target = self.victim(victim)?;
            (target.state, target.cell)
        };
        let agent_id = self.agents[idx].id;
        match state {
            VictimState::Discovered => self.head_for(idx, victim, cell),
            VictimState::Undiscovered => {
                debug!(agent = %agent_id, victim = %victim, "search started");
                self.agents[idx].task = AgentTask::Searching { victim };
                self.events.push(SimEvent::SearchStarted {
                    agent: agent_id,
                    victim,
                });
                Ok(())
            }
            VictimState::BeingRescued | VictimState::Rescued | VictimState::Lost => {
                Err(SimError::InvalidTransition {
                    victim,
                    from: state,
                    to: VictimState::BeingRescued,
                })
            }
        }
    }

    /// Heads for a discovered victim at `cell`: starts the rescue if already
    /// there, otherwise plans a route and resumes Moving next step.
    fn head_for(&mut self, idx: usize, victim: VictimId, cell: Cell) -> SimResult<()> {
        let agent_id = self.agents[idx].id;
        if self.agents[idx].cell == cell {
            self.victims.begin_rescue(victim, agent_id)?;
            debug!(agent = %agent_id, victim = %victim, "rescue started");
            self.agents[idx].task = AgentTask::Rescuing {
                victim,
                progress: 0,
            };
            self.events.push(SimEvent::RescueStarted {
                agent: agent_id,
                victim,
            });
            return Ok(());
        }
        match PlannedPath::plan(self.agents[idx].cell, cell, &self.grid) {
            Ok(path) => {
                self.agents[idx].task = AgentTask::Moving { victim, path };
                Ok(())
            }
            Err(SimError::NoPathExists { .. }) => {
                self.release_assignment(idx, victim, ReleaseReason::NoPath)
            }
            Err(err) => Err(err),
        }
    }

    fn advance_searching(&mut self, idx: usize, victim: VictimId) -> SimResult<()> {
        let (state, cell) = {
            let target = self.victim(victim)?;
            (target.state, target.cell)
        };
        let agent_id = self.agents[idx].id;
        if state != VictimState::Undiscovered {
            return self.head_for(idx, victim, cell);
        }

        let within_range = self.agents[idx].cell.manhattan(cell) <= self.config.sensor_range;
        let detected = within_range
            || self
                .rng
                .chance(DrawKind::Detection, self.config.detection_probability);
        if detected {
            if self.victims.discover(victim, self.step)? {
                self.events.push(SimEvent::VictimDiscovered {
                    victim,
                    by: agent_id,
                });
            }
            return self.head_for(idx, victim, cell);
        }

        // Follow the clue one cell closer to the true location.
        match PlannedPath::plan(self.agents[idx].cell, cell, &self.grid) {
            Ok(mut path) => {
                if let Some(next) = path.next_step() {
                    self.move_agent(idx, next);
                }
                self.agents[idx].task = AgentTask::Searching { victim };
                Ok(())
            }
            Err(SimError::NoPathExists { .. }) => {
                self.release_assignment(idx, victim, ReleaseReason::NoPath)
            }
            Err(err) => Err(err),
        }
    }

    fn advance_rescuing(&mut self, idx: usize, victim: VictimId, progress: u32) -> SimResult<()> {
        let progress = progress + 1;
        if progress < self.config.rescue_duration {
            self.agents[idx].task = AgentTask::Rescuing { victim, progress };
            return Ok(());
        }

        let agent_id = self.agents[idx].id;
        let latency = self.victims.complete_rescue(victim, self.step)?;
        debug!(agent = %agent_id, victim = %victim, latency, "victim rescued");
        self.events.push(SimEvent::VictimRescued {
            victim,
            agent: agent_id,
            latency,
        });
        if self.agents[idx].load_victim() {
            self.start_return(idx)?;
        }
        Ok(())
    }

    fn start_return(&mut self, idx: usize) -> SimResult<()> {
        let extraction = self.grid.extraction();
        let agent_id = self.agents[idx].id;
        if self.agents[idx].cell == extraction {
            self.drop_off(idx);
            return Ok(());
        }
        match PlannedPath::plan(self.agents[idx].cell, extraction, &self.grid) {
            Ok(path) => {
                let carrying = self.agents[idx].carrying;
                debug!(agent = %agent_id, carrying, "returning to extraction");
                self.agents[idx].task = AgentTask::Returning { path };
                self.events.push(SimEvent::ReturnStarted {
                    agent: agent_id,
                    carrying,
                });
                Ok(())
            }
            Err(SimError::NoPathExists { .. }) => {
                warn!(agent = %agent_id, "extraction unreachable, holding position");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn advance_returning(&mut self, idx: usize, mut path: PlannedPath) -> SimResult<()> {
        let agent_id = self.agents[idx].id;
        if path.is_compromised(&self.grid) {
            match PlannedPath::plan(self.agents[idx].cell, path.destination(), &self.grid) {
                Ok(fresh) => {
                    path = fresh;
                    self.events.push(SimEvent::PathReplanned { agent: agent_id });
                }
                Err(SimError::NoPathExists { .. }) => {
                    warn!(agent = %agent_id, "return route lost, keeping previous route");
                }
                Err(err) => return Err(err),
            }
        }

        if let Some(next) = path.next_step() {
            self.move_agent(idx, next);
        }
        if self.agents[idx].cell == self.grid.extraction() {
            self.drop_off(idx);
        } else {
            self.agents[idx].task = AgentTask::Returning { path };
        }
        Ok(())
    }

    fn drop_off(&mut self, idx: usize) {
        let agent_id = self.agents[idx].id;
        let count = self.agents[idx].drop_off();
        debug!(agent = %agent_id, count, "dropped off at extraction");
        self.events.push(SimEvent::DroppedOff {
            agent: agent_id,
            count,
        });
    }

    fn move_agent(&mut self, idx: usize, to: Cell) {
        let hazardous = self.grid.is_hazardous(to);
        let agent = &mut self.agents[idx];
        let from = agent.cell;
        agent.cell = to;
        if hazardous {
            agent.hazard_exposures += 1;
        }
        self.events.push(SimEvent::AgentMoved {
            agent: agent.id,
            from,
            to,
            hazardous,
        });
    }

    /// Discovers every Undiscovered victim within sensor range of the agent.
    fn sense(&mut self, idx: usize) -> SimResult<()> {
        let agent_id = self.agents[idx].id;
        let position = self.agents[idx].cell;
        let range = self.config.sensor_range;
        let in_range: Vec<VictimId> = self
            .victims
            .iter()
            .filter(|victim| {
                victim.state == VictimState::Undiscovered && victim.cell.manhattan(position) <= range
            })
            .map(|victim| victim.id)
            .collect();
        for victim in in_range {
            if self.victims.discover(victim, self.step)? {
                debug!(agent = %agent_id, victim = %victim, "victim discovered");
                self.events.push(SimEvent::VictimDiscovered {
                    victim,
                    by: agent_id,
                });
            }
        }
        Ok(())
    }

    fn release_assignment(
        &mut self,
        idx: usize,
        victim: VictimId,
        reason: ReleaseReason,
    ) -> SimResult<()> {
        let agent_id = self.agents[idx].id;
        self.victims.release(victim, agent_id)?;
        self.agents[idx].task = AgentTask::Idle;
        warn!(agent = %agent_id, victim = %victim, ?reason, "assignment released");
        self.events.push(SimEvent::AssignmentReleased {
            agent: agent_id,
            victim,
            reason,
        });
        Ok(())
    }

    fn victim(&self, id: VictimId) -> SimResult<&Victim> {
        self.victims.get(id).ok_or(SimError::UnknownVictim(id))
    }
}
