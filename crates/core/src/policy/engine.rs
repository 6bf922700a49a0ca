use std::collections::VecDeque;

use crate::config::KairoConfig;
use crate::types::{HealthLevel, HealthSnapshot, Policy};

/// Reduces health snapshots to policies.
///
/// The level transition table is asymmetric on purpose: the score needed to
/// climb back to a level is higher than the score that left it, so a device
/// hovering near a boundary does not flap between policies.
#[derive(Debug)]
pub struct PolicyEngine {
    base_concurrent: u32,
    /// Last published level; transitions are evaluated against it.
    level: HealthLevel,
    /// Rolling window of recent scores, observability only.
    trend: VecDeque<f64>,
    trend_window: usize,
}

impl PolicyEngine {
    pub fn new(cfg: &KairoConfig) -> Self {
        Self {
            base_concurrent: cfg.network_max_concurrent,
            level: HealthLevel::High,
            trend: VecDeque::with_capacity(cfg.trend_window + 1),
            trend_window: cfg.trend_window.max(1),
        }
    }

    /// Fold a snapshot into the current level and produce its policy.
    /// Deterministic given the snapshot and the previous level.
    pub fn evaluate(&mut self, snapshot: &HealthSnapshot) -> Policy {
        let score = snapshot.health_score();
        if self.trend.len() >= self.trend_window {
            self.trend.pop_front();
        }
        self.trend.push_back(score);

        let next = if snapshot.is_critical() {
            HealthLevel::Critical
        } else {
            Self::transition(self.level, score)
        };

        if next != self.level {
            tracing::info!(
                from = self.level.as_str(),
                to = next.as_str(),
                score,
                "health level transition"
            );
        }
        self.level = next;
        Policy::for_level(next, self.base_concurrent)
    }

    fn transition(prev: HealthLevel, score: f64) -> HealthLevel {
        match prev {
            HealthLevel::High if score < 0.7 => HealthLevel::Medium,
            HealthLevel::Medium if score < 0.4 => HealthLevel::Low,
            HealthLevel::Medium if score > 0.8 => HealthLevel::High,
            HealthLevel::Low if score < 0.2 => HealthLevel::Critical,
            HealthLevel::Low if score > 0.6 => HealthLevel::Medium,
            HealthLevel::Critical if score > 0.4 => HealthLevel::Low,
            _ => prev,
        }
    }

    /// Current level without re-evaluating.
    pub fn level(&self) -> HealthLevel {
        self.level
    }

    /// Recent scores, oldest first.
    pub fn trend(&self) -> impl Iterator<Item = f64> + '_ {
        self.trend.iter().copied()
    }

    /// Mean of the retained scores, or `None` before the first evaluation.
    pub fn trend_mean(&self) -> Option<f64> {
        if self.trend.is_empty() {
            return None;
        }
        Some(self.trend.iter().sum::<f64>() / self.trend.len() as f64)
    }
}
