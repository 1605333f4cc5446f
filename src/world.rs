use std::collections::{BTreeSet, HashSet, VecDeque};

use crate::config::SimConfig;
use crate::constants::{hazard_cap, MAX_GRID_SIDE, PLACEMENT_RETRIES};
use crate::error::{SimError, SimResult};
use crate::rng::{DrawKind, RandomStream};
use crate::types::{Cell, SimEvent};

/// Spatial substrate of one run. The passable layout is fixed once generated;
/// only the hazard set changes afterwards.
#[derive(Clone, Debug)]
pub struct WorldGrid {
    width: i32,
    height: i32,
    passable: Vec<bool>,
    hazards: BTreeSet<Cell>,
    extraction: Cell,
}

impl WorldGrid {
    pub fn generate(config: &SimConfig, rng: &mut RandomStream) -> SimResult<Self> {
        if config.width <= 0 || config.height <= 0 {
            return Err(SimError::invalid_config(format!(
                "grid must be non-empty, got {}x{}",
                config.width, config.height
            )));
        }
        if config.width > MAX_GRID_SIDE || config.height > MAX_GRID_SIDE {
            return Err(SimError::invalid_config(format!(
                "grid sides are limited to {MAX_GRID_SIDE}, got {}x{}",
                config.width, config.height
            )));
        }
        let width = config.width;
        let height = config.height;
        let mut passable = vec![true; config.cell_count()];
        for slot in passable.iter_mut() {
            if rng.chance(DrawKind::Terrain, config.obstacle_density) {
                *slot = false;
            }
        }

        let mut grid = Self {
            width,
            height,
            passable,
            hazards: BTreeSet::new(),
            extraction: Cell::new(0, 0),
        };

        grid.extraction = match grid.random_passable_cell(rng, DrawKind::Placement, |_| true) {
            Some(cell) => cell,
            None => {
                let cell = Cell::new(
                    rng.int(DrawKind::Placement, 0, (width - 1) as i64) as i32,
                    rng.int(DrawKind::Placement, 0, (height - 1) as i64) as i32,
                );
                let idx = grid.index(cell);
                grid.passable[idx] = true;
                cell
            }
        };

        let cap = hazard_cap(grid.passable_count(), config.max_hazard_ratio);
        let extraction = grid.extraction;
        for _ in 0..config.initial_hazards {
            if grid.hazards.len() >= cap {
                break;
            }
            let Some(cell) = grid.random_passable_cell(rng, DrawKind::Hazard, |cell| {
                cell != extraction && !grid.hazards.contains(&cell)
            }) else {
                break;
            };
            grid.hazards.insert(cell);
        }

        Ok(grid)
    }

    /// Builds a grid from a text layout: `#` impassable, `.` open, `~` hazard,
    /// `E` extraction. Without an `E` the first open cell is the extraction point.
    pub fn from_rows(rows: &[&str]) -> SimResult<Self> {
        let height = rows.len() as i32;
        let width = rows.first().map(|row| row.chars().count()).unwrap_or(0) as i32;
        if width == 0 || height == 0 {
            return Err(SimError::invalid_config("grid layout is empty"));
        }

        let mut passable = Vec::with_capacity(width as usize * height as usize);
        let mut hazards = BTreeSet::new();
        let mut extraction = None;
        for (y, row) in rows.iter().enumerate() {
            if row.chars().count() as i32 != width {
                return Err(SimError::invalid_config(format!(
                    "grid row {y} has {} cells, expected {width}",
                    row.chars().count()
                )));
            }
            for (x, ch) in row.chars().enumerate() {
                let cell = Cell::new(x as i32, y as i32);
                match ch {
                    '#' => passable.push(false),
                    '.' => passable.push(true),
                    '~' => {
                        passable.push(true);
                        hazards.insert(cell);
                    }
                    'E' => {
                        passable.push(true);
                        extraction = Some(cell);
                    }
                    other => {
                        return Err(SimError::invalid_config(format!(
                            "unknown grid symbol {other:?} at {cell}"
                        )));
                    }
                }
            }
        }

        let mut grid = Self {
            width,
            height,
            passable,
            hazards,
            extraction: Cell::new(0, 0),
        };
        grid.extraction = match extraction.or_else(|| grid.passable_cells().first().copied()) {
            Some(cell) => cell,
            None => return Err(SimError::invalid_config("grid layout has no open cell")),
        };
        Ok(grid)
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn extraction(&self) -> Cell {
        self.extraction
    }

    pub fn in_bounds(&self, cell: Cell) -> bool {
        cell.x >= 0 && cell.y >= 0 && cell.x < self.width && cell.y < self.height
    }

    fn index(&self, cell: Cell) -> usize {
        cell.y as usize * self.width as usize + cell.x as usize
    }

    pub fn is_passable(&self, cell: Cell) -> bool {
        self.in_bounds(cell) && self.passable[self.index(cell)]
    }

    pub fn is_hazardous(&self, cell: Cell) -> bool {
        self.hazards.contains(&cell)
    }

    /// Returns whether the hazard set changed. Impassable cells never carry hazards.
    pub fn set_hazard(&mut self, cell: Cell, hazardous: bool) -> bool {
        if hazardous {
            self.is_passable(cell) && self.hazards.insert(cell)
        } else {
            self.hazards.remove(&cell)
        }
    }

    pub fn hazard_count(&self) -> usize {
        self.hazards.len()
    }

    pub fn hazard_cells(&self) -> impl Iterator<Item = Cell> + '_ {
        self.hazards.iter().copied()
    }

    pub fn passable_count(&self) -> usize {
        self.passable.iter().filter(|open| **open).count()
    }

    /// Passable cells in row-major order.
    pub fn passable_cells(&self) -> Vec<Cell> {
        let mut out = Vec::new();
        for y in 0..self.height {
            for x in 0..self.width {
                let cell = Cell::new(x, y);
                if self.is_passable(cell) {
                    out.push(cell);
                }
            }
        }
        out
    }

    /// Retries uniform draws until an accepted passable cell comes up, then
    /// falls back to the first accepted cell in row-major order.
    pub fn random_passable_cell<F>(
        &self,
        rng: &mut RandomStream,
        kind: DrawKind,
        accept: F,
    ) -> Option<Cell>
    where
        F: Fn(Cell) -> bool,
    {
        for _ in 0..PLACEMENT_RETRIES {
            let cell = Cell::new(
                rng.int(kind, 0, (self.width - 1) as i64) as i32,
                rng.int(kind, 0, (self.height - 1) as i64) as i32,
            );
            if self.is_passable(cell) && accept(cell) {
                return Some(cell);
            }
        }
        self.passable_cells().into_iter().find(|cell| accept(*cell))
    }

    /// Passable cells connected to `start`, ignoring hazards.
    pub fn reachable_from(&self, start: Cell) -> HashSet<Cell> {
        let mut out = HashSet::new();
        if !self.is_passable(start) {
            return out;
        }

        let mut queue = VecDeque::new();
        out.insert(start);
        queue.push_back(start);

        while let Some(cell) = queue.pop_front() {
            for next in cell.neighbors() {
                if !self.is_passable(next) {
                    continue;
                }
                if out.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        out
    }

    /// One step of hazard dynamics. Existing hazards are visited in row-major
    /// order; each may clear or spread to a neighbour, then one ignition may occur.
    pub fn step_hazards(&mut self, config: &SimConfig, rng: &mut RandomStream) -> Vec<SimEvent> {
        let cap = hazard_cap(self.passable_count(), config.max_hazard_ratio);
        let mut events = Vec::new();
        let current: Vec<Cell> = self.hazards.iter().copied().collect();

        for cell in current {
            if rng.chance(DrawKind::Hazard, config.hazard_clear_probability) {
                self.hazards.remove(&cell);
                events.push(SimEvent::HazardCleared { cell });
                continue;
            }
            if !rng.chance(DrawKind::Hazard, config.hazard_spread_probability) {
                continue;
            }
            let targets: Vec<Cell> = cell
                .neighbors()
                .into_iter()
                .filter(|next| {
                    self.is_passable(*next)
                        && !self.is_hazardous(*next)
                        && *next != self.extraction
                })
                .collect();
            if targets.is_empty() || self.hazards.len() >= cap {
                continue;
            }
            let target = targets[rng.pick_index(DrawKind::Hazard, targets.len())];
            self.hazards.insert(target);
            events.push(SimEvent::HazardSpawned { cell: target });
        }

        if self.hazards.len() < cap && rng.chance(DrawKind::Hazard, config.hazard_spawn_probability)
        {
            let extraction = self.extraction;
            let ignition = self.random_passable_cell(rng, DrawKind::Hazard, |cell| {
                cell != extraction && !self.hazards.contains(&cell)
            });
            if let Some(cell) = ignition {
                self.hazards.insert(cell);
                events.push(SimEvent::HazardSpawned { cell });
            }
        }

        events
    }

    /// ASCII map: `#` blocked, `.` open, `~` hazard, `E` extraction,
    /// `V` active victim, `A` agent (highest priority).
    pub fn render_ascii(&self, agents: &[Cell], victims: &[Cell]) -> String {
        let agents: HashSet<Cell> = agents.iter().copied().collect();
        let victims: HashSet<Cell> = victims.iter().copied().collect();
        let mut rows = Vec::with_capacity(self.height as usize);
        for y in 0..self.height {
            let mut row = String::with_capacity(self.width as usize);
            for x in 0..self.width {
                let cell = Cell::new(x, y);
                let ch = if agents.contains(&cell) {
                    'A'
                } else if victims.contains(&cell) {
                    'V'
                } else if cell == self.extraction {
                    'E'
                } else if self.is_hazardous(cell) {
                    '~'
                } else if self.is_passable(cell) {
                    '.'
                } else {
                    '#'
                };
                row.push(ch);
            }
            rows.push(row);
        }
        rows.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_world(seed: u64) -> WorldGrid {
        let mut rng = RandomStream::new(seed);
        WorldGrid::generate(&SimConfig::default(), &mut rng).expect("default config generates")
    }

    #[test]
    fn generation_is_deterministic_per_seed() {
        for seed in 0..50u64 {
            let a = default_world(seed);
            let b = default_world(seed);
            assert_eq!(a.passable, b.passable);
            assert_eq!(a.hazards, b.hazards);
            assert_eq!(a.extraction, b.extraction);
        }
    }

    #[test]
    fn extraction_and_hazards_sit_on_passable_cells() {
        for seed in 0..200u64 {
            let world = default_world(seed);
            assert!(world.is_passable(world.extraction()));
            assert!(!world.is_hazardous(world.extraction()));
            for cell in world.hazard_cells() {
                assert!(world.is_passable(cell), "seed={seed} hazard on wall {cell}");
            }
        }
    }

    #[test]
    fn fully_blocked_generation_still_opens_extraction() {
        let config = SimConfig {
            width: 4,
            height: 3,
            obstacle_density: 1.0,
            ..SimConfig::default()
        };
        let mut rng = RandomStream::new(11);
        let world = WorldGrid::generate(&config, &mut rng).expect("generates");
        assert_eq!(world.passable_count(), 1);
        assert!(world.is_passable(world.extraction()));
        assert_eq!(world.hazard_count(), 0);
    }

    #[test]
    fn oversized_generation_is_refused() {
        let config = SimConfig {
            width: 50_000,
            height: 50_000,
            ..SimConfig::default()
        };
        let mut rng = RandomStream::new(3);
        assert!(matches!(
            WorldGrid::generate(&config, &mut rng),
            Err(SimError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn hazard_steps_never_touch_the_passable_layout() {
        let config = SimConfig {
            hazard_spawn_probability: 0.5,
            hazard_spread_probability: 0.5,
            hazard_clear_probability: 0.1,
            ..SimConfig::default()
        };
        let mut rng = RandomStream::new(5);
        let mut world = WorldGrid::generate(&config, &mut rng).expect("generates");
        let layout = world.passable.clone();
        let cap = hazard_cap(world.passable_count(), config.max_hazard_ratio);
        for _ in 0..300 {
            world.step_hazards(&config, &mut rng);
            assert_eq!(world.passable, layout);
            assert!(world.hazard_count() <= cap);
            assert!(!world.is_hazardous(world.extraction()));
        }
    }

    #[test]
    fn hazard_events_match_hazard_set_changes() {
        let config = SimConfig {
            hazard_spawn_probability: 1.0,
            hazard_spread_probability: 0.3,
            hazard_clear_probability: 0.2,
            ..SimConfig::default()
        };
        let mut rng = RandomStream::new(21);
        let mut world = WorldGrid::generate(&config, &mut rng).expect("generates");
        for _ in 0..50 {
            let before: BTreeSet<Cell> = world.hazards.clone();
            let events = world.step_hazards(&config, &mut rng);
            let mut replay = before;
            for event in &events {
                match event {
                    SimEvent::HazardSpawned { cell } => assert!(replay.insert(*cell)),
                    SimEvent::HazardCleared { cell } => assert!(replay.remove(cell)),
                    other => panic!("unexpected event {other:?}"),
                }
            }
            assert_eq!(replay, world.hazards);
        }
    }

    #[test]
    fn layout_parsing_reads_symbols() {
        let world = WorldGrid::from_rows(&["E.#", ".~.", "##."]).expect("valid layout");
        assert_eq!(world.width(), 3);
        assert_eq!(world.height(), 3);
        assert_eq!(world.extraction(), Cell::new(0, 0));
        assert!(!world.is_passable(Cell::new(2, 0)));
        assert!(world.is_hazardous(Cell::new(1, 1)));
        assert!(!world.is_passable(Cell::new(-1, 0)));
        assert!(!world.is_passable(Cell::new(0, 3)));
    }

    #[test]
    fn ragged_layout_is_rejected() {
        assert!(WorldGrid::from_rows(&["...", ".."]).is_err());
        assert!(WorldGrid::from_rows(&[]).is_err());
        assert!(WorldGrid::from_rows(&["##", "##"]).is_err());
    }

    #[test]
    fn reachability_stops_at_walls() {
        let world = WorldGrid::from_rows(&["E.#.", "..#.", "###."]).expect("valid layout");
        let reachable = world.reachable_from(world.extraction());
        assert_eq!(reachable.len(), 4);
        assert!(!reachable.contains(&Cell::new(3, 0)));
        assert!(world.reachable_from(Cell::new(2, 0)).is_empty());
    }

    #[test]
    fn set_hazard_refuses_walls() {
        let mut world = WorldGrid::from_rows(&["E#"]).expect("valid layout");
        assert!(!world.set_hazard(Cell::new(1, 0), true));
        assert!(world.set_hazard(Cell::new(0, 0), true));
        assert!(!world.set_hazard(Cell::new(0, 0), true));
        assert!(world.set_hazard(Cell::new(0, 0), false));
    }

    #[test]
    fn ascii_render_layers_agents_over_victims() {
        let world = WorldGrid::from_rows(&["E.~", "..#"]).expect("valid layout");
        let map = world.render_ascii(&[Cell::new(1, 1)], &[Cell::new(1, 1), Cell::new(1, 0)]);
        assert_eq!(map, "EV~\n.A#");
    }
}
