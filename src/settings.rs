use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error_codes::{CodedError, ErrorCode};

pub const CONFIG_ENV: &str = "MANIMATE_CONFIG";
pub const API_KEY_ENV: &str = "GROQ_API_KEY";
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_API_BASE_URL: &str = "https://api.groq.com/openai/v1";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum QualityTier {
    #[serde(rename = "low_quality")]
    #[value(name = "low_quality", alias = "low")]
    Low,
    #[serde(rename = "medium_quality")]
    #[value(name = "medium_quality", alias = "medium")]
    Medium,
    #[serde(rename = "high_quality")]
    #[value(name = "high_quality", alias = "high")]
    High,
    #[serde(rename = "production_quality")]
    #[value(name = "production_quality", alias = "production")]
    Production,
}

impl QualityTier {
    pub const ALL: [QualityTier; 4] = [Self::Low, Self::Medium, Self::High, Self::Production];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low_quality",
            Self::Medium => "medium_quality",
            Self::High => "high_quality",
            Self::Production => "production_quality",
        }
    }

    /// Built-in renderer profile for this tier.
    pub fn builtin_profile(self) -> QualityProfile {
        let (flag, description, resolution, estimated_seconds) = match self {
            Self::Low => ("-ql", "Low Quality (Fast)", "480p", 60),
            Self::Medium => ("-qm", "Medium Quality (Balanced)", "720p", 180),
            Self::High => ("-qh", "High Quality (Slow)", "1080p", 300),
            Self::Production => ("-qk", "Production Quality (Very Slow)", "2160p", 600),
        };
        QualityProfile {
            flag: flag.to_owned(),
            description: description.to_owned(),
            resolution: resolution.to_owned(),
            estimated_seconds,
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for QualityTier {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low_quality" | "low" => Ok(Self::Low),
            "medium_quality" | "medium" => Ok(Self::Medium),
            "high_quality" | "high" => Ok(Self::High),
            "production_quality" | "production" => Ok(Self::Production),
            other => bail!(
                "unknown quality tier '{other}' (expected one of low_quality, medium_quality, high_quality, production_quality)"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QualityProfile {
    pub flag: String,
    pub description: String,
    pub resolution: String,
    pub estimated_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelProfile {
    pub id: String,
    pub name: String,
    pub description: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ModelProfile {
    pub fn display_label(&self) -> String {
        format!("{} ({})", self.name, self.description)
    }
}

fn builtin_models() -> Vec<ModelProfile> {
    vec![
        ModelProfile {
            id: DEFAULT_MODEL.to_owned(),
            name: "Llama 3.3 70B".to_owned(),
            description: "Most capable model, best for complex animations".to_owned(),
            max_tokens: 4096,
            temperature: 0.7,
        },
        ModelProfile {
            id: "llama3-8b-8192".to_owned(),
            name: "Llama 3 8B".to_owned(),
            description: "Fast and efficient for simpler animations".to_owned(),
            max_tokens: 8192,
            temperature: 0.7,
        },
    ]
}

fn builtin_qualities() -> BTreeMap<QualityTier, QualityProfile> {
    QualityTier::ALL
        .into_iter()
        .map(|tier| (tier, tier.builtin_profile()))
        .collect()
}

/// Process-wide settings. Read-only once a request starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub max_render_seconds: u64,
    pub max_prompt_length: usize,
    pub min_prompt_length: usize,
    pub default_quality: QualityTier,
    pub default_model: String,
    pub log_level: String,
    pub temp_dir_prefix: String,
    pub temp_root: Option<PathBuf>,
    pub renderer_program: String,
    /// Arguments placed before the quality flag, e.g. `["-m", "manim"]` with `python`.
    pub renderer_args: Vec<String>,
    pub scene_file_name: String,
    pub output_file_name: String,
    pub video_extension: String,
    pub api_base_url: String,
    pub models: Vec<ModelProfile>,
    pub qualities: BTreeMap<QualityTier, QualityProfile>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_render_seconds: 300,
            max_prompt_length: 1000,
            min_prompt_length: 10,
            default_quality: QualityTier::Medium,
            default_model: DEFAULT_MODEL.to_owned(),
            log_level: "info".to_owned(),
            temp_dir_prefix: "manim_".to_owned(),
            temp_root: None,
            renderer_program: "manim".to_owned(),
            renderer_args: Vec::new(),
            scene_file_name: "scene.py".to_owned(),
            output_file_name: "output_video".to_owned(),
            video_extension: "mp4".to_owned(),
            api_base_url: DEFAULT_API_BASE_URL.to_owned(),
            models: builtin_models(),
            qualities: builtin_qualities(),
        }
    }
}

impl Settings {
    /// Loads defaults, then overlays the YAML file named by `path` or `MANIMATE_CONFIG`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from));
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("failed to decode config {}", path.display()))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Settings = serde_yaml::from_str(raw)?;
        Ok(settings)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.max_render_seconds)
    }

    /// Profile for `tier`; a tier missing from the config falls back to the built-in one.
    pub fn quality(&self, tier: QualityTier) -> QualityProfile {
        self.qualities
            .get(&tier)
            .cloned()
            .unwrap_or_else(|| tier.builtin_profile())
    }

    /// Resolves a model id against the catalog. Unknown ids fall back to the default model.
    pub fn model(&self, id: &str) -> ModelProfile {
        if let Some(profile) = self.models.iter().find(|model| model.id == id) {
            return profile.clone();
        }
        tracing::warn!(model = id, fallback = %self.default_model, "model not available, using default");
        self.models
            .iter()
            .find(|model| model.id == self.default_model)
            .or_else(|| self.models.first())
            .cloned()
            .unwrap_or_else(|| builtin_models().remove(0))
    }

    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.max_render_seconds < 60 {
            issues.push("max_render_seconds should be at least 60 seconds".to_owned());
        }
        if self.max_prompt_length < 10 {
            issues.push("max_prompt_length should be at least 10 characters".to_owned());
        }
        if self.min_prompt_length > self.max_prompt_length {
            issues.push(format!(
                "min_prompt_length ({}) exceeds max_prompt_length ({})",
                self.min_prompt_length, self.max_prompt_length
            ));
        }
        if !self.models.iter().any(|model| model.id == self.default_model) {
            issues.push(format!(
                "default_model '{}' is not in the model catalog",
                self.default_model
            ));
        }
        if self.renderer_program.trim().is_empty() {
            issues.push("renderer_program must not be empty".to_owned());
        }
        issues
    }

    /// Rejects prompts whose trimmed length falls outside the configured bounds.
    pub fn check_prompt(&self, prompt: &str) -> std::result::Result<(), CodedError> {
        let length = prompt.trim().chars().count();
        if length < self.min_prompt_length || length > self.max_prompt_length {
            return Err(CodedError::new(
                ErrorCode::PromptLength,
                format!(
                    "prompt must be between {} and {} characters (got {length})",
                    self.min_prompt_length, self.max_prompt_length
                ),
            )
            .with_details(json!({
                "length": length,
                "min": self.min_prompt_length,
                "max": self.max_prompt_length,
            })));
        }
        Ok(())
    }
}
