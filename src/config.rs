use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{SimError, SimResult};

/// Run parameters supplied before the run starts. Every field has a default,
/// so partial JSON files are accepted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub width: i32,
    pub height: i32,
    pub agent_count: usize,
    pub victim_count: usize,
    pub max_steps: u32,

    pub rescue_duration: u32,
    pub sensor_range: i32,
    pub detection_probability: f64,
    pub report_noise: i32,
    pub capacity: u32,

    /// Each victim survives a TTL drawn uniformly from this inclusive range.
    pub victim_ttl_min: u32,
    pub victim_ttl_max: u32,
    pub hazard_ttl_penalty: u32,

    pub obstacle_density: f64,
    pub initial_hazards: usize,
    pub hazard_spawn_probability: f64,
    pub hazard_spread_probability: f64,
    pub hazard_clear_probability: f64,
    pub max_hazard_ratio: f64,

    pub victim_spawn_probability: f64,
    pub max_trickle_victims: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            agent_count: DEFAULT_AGENT_COUNT,
            victim_count: DEFAULT_VICTIM_COUNT,
            max_steps: DEFAULT_MAX_STEPS,
            rescue_duration: DEFAULT_RESCUE_DURATION,
            sensor_range: DEFAULT_SENSOR_RANGE,
            detection_probability: DEFAULT_DETECTION_PROBABILITY,
            report_noise: DEFAULT_REPORT_NOISE,
            capacity: DEFAULT_CAPACITY,
            victim_ttl_min: DEFAULT_VICTIM_TTL_MIN,
            victim_ttl_max: DEFAULT_VICTIM_TTL_MAX,
            hazard_ttl_penalty: DEFAULT_HAZARD_TTL_PENALTY,
            obstacle_density: DEFAULT_OBSTACLE_DENSITY,
            initial_hazards: DEFAULT_INITIAL_HAZARDS,
            hazard_spawn_probability: DEFAULT_HAZARD_SPAWN_PROBABILITY,
            hazard_spread_probability: DEFAULT_HAZARD_SPREAD_PROBABILITY,
            hazard_clear_probability: DEFAULT_HAZARD_CLEAR_PROBABILITY,
            max_hazard_ratio: DEFAULT_MAX_HAZARD_RATIO,
            victim_spawn_probability: DEFAULT_VICTIM_SPAWN_PROBABILITY,
            max_trickle_victims: DEFAULT_MAX_TRICKLE_VICTIMS,
        }
    }
}

impl SimConfig {
    pub fn load(path: &Path) -> SimResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: SimConfig = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Scenario without obstacles, hazard dynamics or trickle spawns.
    pub fn calm(width: i32, height: i32, agent_count: usize, victim_count: usize) -> Self {
        Self {
            width,
            height,
            agent_count,
            victim_count,
            obstacle_density: 0.0,
            initial_hazards: 0,
            hazard_spawn_probability: 0.0,
            hazard_spread_probability: 0.0,
            hazard_clear_probability: 0.0,
            victim_spawn_probability: 0.0,
            max_trickle_victims: 0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> SimResult<()> {
        if self.max_steps == 0 {
            return Err(SimError::invalid_config("step budget must be at least 1"));
        }
        if self.width <= 0 || self.height <= 0 {
            return Err(SimError::invalid_config(format!(
                "grid must be non-empty, got {}x{}",
                self.width, self.height
            )));
        }
        if self.width > MAX_GRID_SIDE || self.height > MAX_GRID_SIDE {
            return Err(SimError::invalid_config(format!(
                "grid sides are limited to {MAX_GRID_SIDE}, got {}x{}",
                self.width, self.height
            )));
        }
        if self.victim_count >= self.cell_count() {
            return Err(SimError::invalid_config(format!(
                "{} victims cannot fit on a {}x{} grid",
                self.victim_count, self.width, self.height
            )));
        }
        if self.agent_count == 0 && self.victim_count > 0 {
            return Err(SimError::invalid_config(
                "at least one agent is required when victims exist",
            ));
        }
        if self.capacity == 0 {
            return Err(SimError::invalid_config("agent capacity must be at least 1"));
        }
        if self.rescue_duration == 0 {
            return Err(SimError::invalid_config("rescue duration must be at least 1"));
        }
        if self.victim_ttl_min > self.victim_ttl_max {
            return Err(SimError::invalid_config(format!(
                "victim TTL range is empty: {}..={}",
                self.victim_ttl_min, self.victim_ttl_max
            )));
        }
        if self.sensor_range < 0 || self.report_noise < 0 {
            return Err(SimError::invalid_config(
                "sensor range and report noise must be non-negative",
            ));
        }
        for (name, value) in [
            ("detection_probability", self.detection_probability),
            ("obstacle_density", self.obstacle_density),
            ("hazard_spawn_probability", self.hazard_spawn_probability),
            ("hazard_spread_probability", self.hazard_spread_probability),
            ("hazard_clear_probability", self.hazard_clear_probability),
            ("max_hazard_ratio", self.max_hazard_ratio),
            ("victim_spawn_probability", self.victim_spawn_probability),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(SimError::invalid_config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }

    pub fn cell_count(&self) -> usize {
        (self.width.max(0) as usize) * (self.height.max(0) as usize)
    }
}
