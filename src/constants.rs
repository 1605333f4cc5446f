pub const DEFAULT_WIDTH: i32 = 20;
pub const DEFAULT_HEIGHT: i32 = 20;
pub const DEFAULT_AGENT_COUNT: usize = 7;
pub const DEFAULT_VICTIM_COUNT: usize = 18;
pub const DEFAULT_MAX_STEPS: u32 = 300;

pub const DEFAULT_RESCUE_DURATION: u32 = 3;
pub const DEFAULT_SENSOR_RANGE: i32 = 1;
pub const DEFAULT_DETECTION_PROBABILITY: f64 = 0.5;
/// Reports are exact unless a scenario opts into noisy last-known locations.
pub const DEFAULT_REPORT_NOISE: i32 = 0;
pub const DEFAULT_CAPACITY: u32 = 2;

pub const DEFAULT_VICTIM_TTL_MIN: u32 = 120;
pub const DEFAULT_VICTIM_TTL_MAX: u32 = 220;
pub const DEFAULT_HAZARD_TTL_PENALTY: u32 = 1;

pub const DEFAULT_OBSTACLE_DENSITY: f64 = 0.05;
pub const DEFAULT_INITIAL_HAZARDS: usize = 10;
pub const DEFAULT_HAZARD_SPAWN_PROBABILITY: f64 = 0.01;
pub const DEFAULT_HAZARD_SPREAD_PROBABILITY: f64 = 0.05;
pub const DEFAULT_HAZARD_CLEAR_PROBABILITY: f64 = 0.03;
pub const DEFAULT_MAX_HAZARD_RATIO: f64 = 0.2;

pub const DEFAULT_VICTIM_SPAWN_PROBABILITY: f64 = 0.0;
pub const DEFAULT_MAX_TRICKLE_VICTIMS: usize = 0;

/// Relative odds of critical, moderate and minor injuries.
pub const SEVERITY_WEIGHTS: [f64; 3] = [0.25, 0.45, 0.30];

/// Placement draws attempted before falling back to a row-major scan.
pub const PLACEMENT_RETRIES: usize = 5_000;

/// Largest accepted grid side; keeps cell indices well inside `i32`.
pub const MAX_GRID_SIDE: i32 = 4_096;

pub const DEFAULT_RUNS: usize = 20;
pub const DEFAULT_SEED: u64 = 42;

pub fn hazard_cap(passable_cells: usize, max_hazard_ratio: f64) -> usize {
    ((passable_cells as f64) * max_hazard_ratio).floor() as usize
}

/// Steps a victim ages in one tick depending on whether it sits on a hazard.
pub fn victim_aging_rate(on_hazard: bool, hazard_ttl_penalty: u32) -> u32 {
    if on_hazard {
        1 + hazard_ttl_penalty
    } else {
        1
    }
}
