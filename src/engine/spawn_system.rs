use super::*;

impl Simulation {
    pub(super) fn place_initial_victims(&mut self) -> SimResult<()> {
        let free_cells = self.grid.passable_count().saturating_sub(1);
        if self.config.victim_count > free_cells {
            return Err(SimError::invalid_config(format!(
                "{} victims do not fit on {} free passable cells",
                self.config.victim_count, free_cells
            )));
        }
        for _ in 0..self.config.victim_count {
            let Some(cell) = self.pick_victim_cell(DrawKind::Placement) else {
                return Err(SimError::invalid_config(
                    "no free passable cell left for victim placement",
                ));
            };
            let reported = reported_cell_near(
                cell,
                self.config.report_noise,
                &self.grid,
                &mut self.rng,
                DrawKind::Placement,
            );
            let profile = self.draw_victim_profile();
            self.victims.spawn(cell, reported, 0, profile);
        }
        Ok(())
    }

    /// Trickle-in arrivals after the run has started; at most one per step.
    pub(super) fn spawn_trickle_victim(&mut self) {
        if !self.trickle_pending() {
            return;
        }
        if !self
            .rng
            .chance(DrawKind::Spawn, self.config.victim_spawn_probability)
        {
            return;
        }
        let Some(cell) = self.pick_victim_cell(DrawKind::Spawn) else {
            debug!(step = self.step, "no free cell for trickle victim");
            return;
        };
        let reported = reported_cell_near(
            cell,
            self.config.report_noise,
            &self.grid,
            &mut self.rng,
            DrawKind::Spawn,
        );
        let profile = self.draw_victim_profile();
        let victim = self.victims.spawn(cell, reported, self.step, profile);
        self.trickle_spawned += 1;
        debug!(victim = %victim, cell = %cell, step = self.step, "victim spawned");
        self.events.push(SimEvent::VictimSpawned { victim, cell });
    }

    /// Severity and survival time for a new victim, both from placement draws.
    pub(super) fn draw_victim_profile(&mut self) -> VictimProfile {
        let severity = Severity::from_roll(self.rng.unit(DrawKind::Placement), &SEVERITY_WEIGHTS);
        let ttl = self.rng.int(
            DrawKind::Placement,
            i64::from(self.config.victim_ttl_min),
            i64::from(self.config.victim_ttl_max),
        ) as u32;
        VictimProfile::new(severity, ttl)
    }

    fn pick_victim_cell(&mut self, kind: DrawKind) -> Option<Cell> {
        let extraction = self.grid.extraction();
        let victims = &self.victims;
        self.grid.random_passable_cell(&mut self.rng, kind, |cell| {
            cell != extraction && !victims.occupies(cell)
        })
    }
}
