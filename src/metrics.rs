//! Per-handler counters for generation attempts and render outcomes.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;

use crate::settings::QualityTier;

pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, Serialize)]
pub struct Metrics {
    #[serde(skip)]
    started: Instant,
    total_attempts: u64,
    successful_renders: u64,
    failed_renders: u64,
    render_times: Vec<f64>,
    error_counts: BTreeMap<String, u64>,
    quality_counts: BTreeMap<String, u64>,
    scene_type_counts: BTreeMap<String, u64>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            started: Instant::now(),
            total_attempts: 0,
            successful_renders: 0,
            failed_renders: 0,
            render_times: Vec::new(),
            error_counts: BTreeMap::new(),
            quality_counts: BTreeMap::new(),
            scene_type_counts: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub success_rate: f64,
    pub average_render_time: f64,
    pub most_popular_quality: String,
    pub total_attempts: u64,
    pub error_distribution: BTreeMap<String, u64>,
    pub quality_distribution: BTreeMap<String, u64>,
    pub scene_type_distribution: BTreeMap<String, u64>,
    pub uptime: String,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&mut self) {
        self.total_attempts += 1;
    }

    pub fn record_success(&mut self, render_time: Duration, scene_type: &str, quality: QualityTier) {
        self.successful_renders += 1;
        self.render_times.push(render_time.as_secs_f64());
        *self.quality_counts.entry(quality.as_str().to_owned()).or_default() += 1;
        *self.scene_type_counts.entry(scene_type.to_owned()).or_default() += 1;
    }

    pub fn record_failure(&mut self, error_kind: &str) {
        self.failed_renders += 1;
        *self.error_counts.entry(error_kind.to_owned()).or_default() += 1;
    }

    pub fn total_renders(&self) -> u64 {
        self.successful_renders + self.failed_renders
    }

    pub fn summary(&self) -> MetricsSummary {
        let total = self.total_renders();
        let success_rate = if total == 0 {
            0.0
        } else {
            self.successful_renders as f64 / total as f64 * 100.0
        };
        let average_render_time = if self.render_times.is_empty() {
            0.0
        } else {
            self.render_times.iter().sum::<f64>() / self.render_times.len() as f64
        };
        // Highest count wins; ties go to the first key in order.
        let most_popular_quality = self
            .quality_counts
            .iter()
            .fold(None::<(&String, u64)>, |best, (quality, count)| match best {
                Some((_, best_count)) if best_count >= *count => best,
                _ => Some((quality, *count)),
            })
            .map(|(quality, _)| quality.clone())
            .unwrap_or_else(|| NOT_AVAILABLE.to_owned());

        MetricsSummary {
            success_rate,
            average_render_time,
            most_popular_quality,
            total_attempts: self.total_attempts,
            error_distribution: self.error_counts.clone(),
            quality_distribution: self.quality_counts.clone(),
            scene_type_distribution: self.scene_type_counts.clone(),
            uptime: format_uptime(self.started.elapsed()),
        }
    }

    /// Clears every counter and restarts the uptime clock.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn export(&self, path: &Path) -> Result<()> {
        let document = json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "summary": self.summary(),
            "raw_data": self,
        });
        let encoded =
            serde_json::to_string_pretty(&document).context("failed to encode metrics export")?;
        fs::write(path, encoded)
            .with_context(|| format!("failed to write metrics export {}", path.display()))?;
        tracing::info!(path = %path.display(), "metrics exported");
        Ok(())
    }
}

pub fn format_uptime(uptime: Duration) -> String {
    let seconds = uptime.as_secs_f64();
    if seconds < 60.0 {
        format!("{seconds:.0} seconds")
    } else if seconds < 3600.0 {
        format!("{:.1} minutes", seconds / 60.0)
    } else if seconds < 86400.0 {
        format!("{:.1} hours", seconds / 3600.0)
    } else {
        format!("{:.1} days", seconds / 86400.0)
    }
}
