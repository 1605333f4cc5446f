//! Independent seeded runs executed in parallel, plus their aggregation.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicBool;

use chrono::{SecondsFormat, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::SimConfig;
use crate::engine::Simulation;
use crate::error::SimResult;
use crate::metrics::RunMetrics;
use crate::rng::derive_seed;
use crate::types::Severity;

/// Runs `runs` simulations seeded from `base_seed`. Results come back in run
/// index order; runs cancelled before completing are left out entirely.
pub fn run_batch(
    config: &SimConfig,
    base_seed: u64,
    runs: usize,
    cancel: &AtomicBool,
) -> SimResult<Vec<RunMetrics>> {
    config.validate()?;
    let outcomes: Vec<Option<RunMetrics>> = (0..runs)
        .into_par_iter()
        .map(|index| {
            let seed = derive_seed(base_seed, index as u64);
            let mut sim = Simulation::new(config.clone(), seed)?;
            sim.run_until_cancelled(cancel)
        })
        .collect::<SimResult<Vec<_>>>()?;

    let completed: Vec<RunMetrics> = outcomes.into_iter().flatten().collect();
    info!(
        base_seed,
        requested = runs,
        completed = completed.len(),
        "batch finished"
    );
    Ok(completed)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stat {
    pub mean: f64,
    pub std_dev: f64,
}

impl Stat {
    /// Mean and population standard deviation; zero for an empty sample.
    fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let count = values.len() as f64;
        let mean = values.iter().sum::<f64>() / count;
        let variance = values
            .iter()
            .map(|value| (value - mean).powi(2))
            .sum::<f64>()
            / count;
        Self {
            mean,
            std_dev: variance.sqrt(),
        }
    }
}

/// Stored summary of a batch. Keys are camelCase, like the other stored files.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub generated_at_iso: String,
    pub runs: usize,
    pub rescued: Stat,
    pub lost: Stat,
    pub steps: Stat,
    /// Over runs that rescued at least one victim.
    pub mean_latency: Stat,
    pub rescue_rate: Stat,
    pub rescued_by_severity: BTreeMap<String, Stat>,
    pub termination_reasons: BTreeMap<String, usize>,
}

impl BatchSummary {
    pub fn write(&self, path: &Path) -> SimResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }

    pub fn load(path: &Path) -> SimResult<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[derive(Clone, Debug, Default)]
pub struct BatchAggregator {
    runs: Vec<RunMetrics>,
}

impl BatchAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, metrics: RunMetrics) {
        self.runs.push(metrics);
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn runs(&self) -> &[RunMetrics] {
        &self.runs
    }

    pub fn summary(&self) -> BatchSummary {
        let collect =
            |pick: fn(&RunMetrics) -> f64| -> Vec<f64> { self.runs.iter().map(pick).collect() };
        let latencies: Vec<f64> = self
            .runs
            .iter()
            .filter_map(|run| run.mean_latency)
            .collect();

        let rescued_by_severity = Severity::ALL
            .iter()
            .map(|severity| {
                let counts: Vec<f64> = self
                    .runs
                    .iter()
                    .map(|run| {
                        run.rescued_by_severity
                            .get(severity.key())
                            .copied()
                            .unwrap_or(0) as f64
                    })
                    .collect();
                (severity.key().to_string(), Stat::from_values(&counts))
            })
            .collect();

        let mut termination_reasons = BTreeMap::new();
        for run in &self.runs {
            *termination_reasons
                .entry(run.termination_reason.key().to_string())
                .or_insert(0) += 1;
        }

        BatchSummary {
            generated_at_iso: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            runs: self.runs.len(),
            rescued: Stat::from_values(&collect(|run| run.rescued as f64)),
            lost: Stat::from_values(&collect(|run| run.lost as f64)),
            steps: Stat::from_values(&collect(|run| f64::from(run.steps))),
            mean_latency: Stat::from_values(&latencies),
            rescue_rate: Stat::from_values(&collect(|run| run.rescue_rate)),
            rescued_by_severity,
            termination_reasons,
        }
    }
}
