//! Passive run accounting. The collector only ever reads events and registry
//! counts; nothing it records can fail a run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{Severity, SimEvent, TerminationReason, VictimState};
use crate::victims::VictimRegistry;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepMetrics {
    pub step: u32,
    pub rescued: usize,
    pub lost: usize,
    pub active: usize,
    pub hazard_cells: usize,
    pub idle_agents: usize,
}

/// Final record of one run. Produced once, never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub seed: u64,
    pub steps: u32,
    pub victims_total: usize,
    pub rescued: usize,
    pub lost: usize,
    /// Rescued victims per severity key; every severity is present.
    pub rescued_by_severity: BTreeMap<String, usize>,
    /// Discovery-to-rescue latency per rescued victim, in victim-id order.
    pub rescue_latencies: Vec<u32>,
    pub mean_latency: Option<f64>,
    pub rescue_rate: f64,
    pub hazard_exposures: u32,
    pub replans: u32,
    pub released_assignments: u32,
    pub termination_reason: TerminationReason,
}

#[derive(Clone, Debug, Default)]
pub struct MetricsCollector {
    rows: Vec<StepMetrics>,
    hazard_exposures: u32,
    replans: u32,
    released_assignments: u32,
    discoveries: u32,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, event: &SimEvent) {
        match event {
            SimEvent::AgentMoved {
                hazardous: true, ..
            } => self.hazard_exposures += 1,
            SimEvent::PathReplanned { .. } => self.replans += 1,
            SimEvent::AssignmentReleased { .. } => self.released_assignments += 1,
            SimEvent::VictimDiscovered { .. } => self.discoveries += 1,
            _ => {}
        }
    }

    pub fn record_step(&mut self, row: StepMetrics) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[StepMetrics] {
        &self.rows
    }

    pub fn discoveries(&self) -> u32 {
        self.discoveries
    }

    pub fn finish(
        &self,
        seed: u64,
        steps: u32,
        victims: &VictimRegistry,
        termination_reason: TerminationReason,
    ) -> RunMetrics {
        let rescued = victims.count(VictimState::Rescued);
        let lost = victims.count(VictimState::Lost);
        let mut rescued_by_severity: BTreeMap<String, usize> = Severity::ALL
            .iter()
            .map(|severity| (severity.key().to_string(), 0))
            .collect();
        for victim in victims.iter() {
            if victim.state == VictimState::Rescued {
                *rescued_by_severity
                    .entry(victim.severity.key().to_string())
                    .or_insert(0) += 1;
            }
        }
        let rescue_latencies: Vec<u32> = victims
            .iter()
            .filter(|victim| victim.state == VictimState::Rescued)
            .filter_map(|victim| victim.latency())
            .collect();
        let mean_latency = if rescue_latencies.is_empty() {
            None
        } else {
            let total: u64 = rescue_latencies.iter().map(|value| u64::from(*value)).sum();
            Some(total as f64 / rescue_latencies.len() as f64)
        };
        let rescue_rate = if victims.is_empty() {
            0.0
        } else {
            rescued as f64 / victims.len() as f64
        };

        RunMetrics {
            seed,
            steps,
            victims_total: victims.len(),
            rescued,
            lost,
            rescued_by_severity,
            rescue_latencies,
            mean_latency,
            rescue_rate,
            hazard_exposures: self.hazard_exposures,
            replans: self.replans,
            released_assignments: self.released_assignments,
            termination_reason,
        }
    }
}
