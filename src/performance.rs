//! Rough render cost estimates derived from scene source text.

use std::fmt;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Serialize;

use crate::settings::QualityTier;

const MAX_WAIT_SECONDS: u64 = 3;
const MAX_RUN_TIME_SECONDS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
    VeryComplex,
}

impl Complexity {
    const ALL: [Complexity; 4] = [Self::Simple, Self::Medium, Self::Complex, Self::VeryComplex];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Medium => "medium",
            Self::Complex => "complex",
            Self::VeryComplex => "very_complex",
        }
    }

    fn indicators(self) -> &'static [&'static str] {
        match self {
            Self::Simple => &["text", "write", "create"],
            Self::Medium => &["transform", "fadein", "fadeout", "moveto"],
            Self::Complex => &["axes", "plot", "functiongraph", "barchart"],
            Self::VeryComplex => &["threedscene", "rotate", "complex", "integral"],
        }
    }

    fn multiplier(self) -> f64 {
        match self {
            Self::Simple => 0.5,
            Self::Medium => 1.0,
            Self::Complex => 2.0,
            Self::VeryComplex => 3.0,
        }
    }

    pub fn is_heavy(self) -> bool {
        matches!(self, Self::Complex | Self::VeryComplex)
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counts indicator occurrences per level; the level with the most wins,
/// the simpler level on ties, simple when nothing matches.
pub fn analyze_complexity(code: &str) -> Complexity {
    let lower = code.to_lowercase();
    let mut best = (Complexity::Simple, 0usize);
    for level in Complexity::ALL {
        let score = level
            .indicators()
            .iter()
            .map(|indicator| lower.matches(indicator).count())
            .sum::<usize>();
        if score > best.1 {
            best = (level, score);
        }
    }
    best.0
}

fn base_render_seconds(tier: QualityTier) -> f64 {
    match tier {
        QualityTier::Low => 30.0,
        QualityTier::Medium => 60.0,
        QualityTier::High => 120.0,
        QualityTier::Production => 300.0,
    }
}

pub fn estimate_render_seconds(tier: QualityTier, complexity: Complexity) -> u64 {
    (base_render_seconds(tier) * complexity.multiplier()) as u64
}

/// Caps integer `self.wait(n)` at 3 seconds and any `run_time=n` at 5 seconds.
pub fn clamp_timing(code: &str) -> String {
    static WAIT_RE: OnceLock<Regex> = OnceLock::new();
    static RUN_TIME_RE: OnceLock<Regex> = OnceLock::new();
    let wait = WAIT_RE
        .get_or_init(|| Regex::new(r"self\.wait\((\d+)\)").expect("wait regex should compile"));
    let run_time = RUN_TIME_RE
        .get_or_init(|| Regex::new(r"run_time=(\d+(?:\.\d+)?)").expect("run_time regex should compile"));

    let clamped = wait.replace_all(code, |caps: &Captures| {
        format!("self.wait({})", capped(&caps[1], MAX_WAIT_SECONDS))
    });
    run_time
        .replace_all(&clamped, |caps: &Captures| {
            let value = &caps[1];
            match value.parse::<f64>() {
                Ok(seconds) if seconds <= MAX_RUN_TIME_SECONDS as f64 => format!("run_time={value}"),
                _ => format!("run_time={MAX_RUN_TIME_SECONDS}"),
            }
        })
        .into_owned()
}

fn capped(digits: &str, max: u64) -> u64 {
    // Digit runs too long for u64 are over any cap.
    digits.parse::<u64>().map_or(max, |value| value.min(max))
}

/// Playback length: one second per `self.play(` plus every literal `self.wait(n)`.
/// `self.wait()` with no argument counts as one second.
pub fn estimate_scene_seconds(code: &str) -> f64 {
    static WAIT_ARG_RE: OnceLock<Regex> = OnceLock::new();
    let wait = WAIT_ARG_RE.get_or_init(|| {
        Regex::new(r"self\.wait\(\s*(\d+(?:\.\d+)?)?\s*\)").expect("wait argument regex should compile")
    });
    let plays = code.matches("self.play(").count() as f64;
    let waits = wait
        .captures_iter(code)
        .map(|caps| {
            caps.get(1)
                .and_then(|value| value.as_str().parse::<f64>().ok())
                .unwrap_or(1.0)
        })
        .sum::<f64>();
    plays + waits
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SizeUnit {
    KB,
    MB,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FileSizeEstimate {
    pub value: f64,
    pub unit: SizeUnit,
}

impl fmt::Display for FileSizeEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.unit {
            SizeUnit::KB => "KB",
            SizeUnit::MB => "MB",
        };
        write!(f, "{:.1} {unit}", self.value)
    }
}

fn megabytes_per_minute(tier: QualityTier) -> f64 {
    match tier {
        QualityTier::Low => 1.0,
        QualityTier::Medium => 3.0,
        QualityTier::High => 8.0,
        QualityTier::Production => 25.0,
    }
}

pub fn estimated_file_size(tier: QualityTier, duration_seconds: f64) -> FileSizeEstimate {
    let megabytes = megabytes_per_minute(tier) * duration_seconds / 60.0;
    if megabytes < 1.0 {
        FileSizeEstimate {
            value: megabytes * 1024.0,
            unit: SizeUnit::KB,
        }
    } else {
        FileSizeEstimate {
            value: megabytes,
            unit: SizeUnit::MB,
        }
    }
}

pub fn optimization_tips(tier: QualityTier, complexity: Complexity) -> Vec<&'static str> {
    let mut tips = Vec::new();
    if matches!(tier, QualityTier::High | QualityTier::Production) {
        tips.push("Consider using medium quality for faster rendering during development");
    }
    if complexity.is_heavy() {
        tips.push("Break complex animations into smaller scenes for easier debugging");
        tips.push("Use preview mode (-p flag) to quickly test animations");
    }
    tips.push("Close other applications to free up system resources");
    tips.push("Ensure sufficient disk space for temporary files");
    tips
}

pub fn recommended_quality(prompt_length: usize, has_complex_math: bool) -> QualityTier {
    if (prompt_length < 50 && !has_complex_math) || prompt_length < 100 {
        QualityTier::Medium
    } else {
        QualityTier::Low
    }
}
