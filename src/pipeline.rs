//! One request end to end: enhance, generate, write, render, collect.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::generator::{CodeOrigin, SceneGenerator};
use crate::llm::ChatBackend;
use crate::metrics::Metrics;
use crate::performance::{clamp_timing, recommended_quality};
use crate::prompt::{detect_category, Category};
use crate::render::{RenderFailure, RenderResult, Renderer};
use crate::settings::{QualityProfile, QualityTier, Settings};
use crate::workspace::RequestWorkspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Enhancing,
    Generating,
    Rendering,
    Succeeded,
    Failed,
}

impl Stage {
    fn as_str(self) -> &'static str {
        match self {
            Self::Enhancing => "enhancing",
            Self::Generating => "generating",
            Self::Rendering => "rendering",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    fn enter(self) {
        tracing::info!(stage = self.as_str(), "pipeline stage");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: Option<String>,
    pub quality: Option<QualityTier>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: None,
            quality: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub output_dir: PathBuf,
    pub skip_enhance: bool,
    pub skip_render: bool,
    pub clamp_timing: bool,
}

impl RunOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            skip_enhance: false,
            skip_render: false,
            clamp_timing: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutcome {
    pub model: String,
    pub quality: QualityTier,
    pub recommended_quality: QualityTier,
    pub enhanced_prompt: String,
    pub code: String,
    pub origin: CodeOrigin,
    pub code_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render: Option<RenderResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
}

impl GenerationOutcome {
    /// True when a video was produced, or rendering was skipped.
    pub fn succeeded(&self) -> bool {
        self.render.as_ref().map_or(true, |render| render.success)
    }
}

pub struct Pipeline<B> {
    settings: Settings,
    generator: SceneGenerator<B>,
    renderer: Renderer,
}

impl<B: ChatBackend> Pipeline<B> {
    pub fn new(settings: Settings, backend: B) -> Self {
        let renderer = Renderer::from_settings(&settings);
        Self {
            settings,
            generator: SceneGenerator::new(backend),
            renderer,
        }
    }

    /// Fails only for a rejected prompt or an unwritable output directory.
    /// Generation and render failures are reported inside the outcome.
    pub async fn run(
        &self,
        request: &GenerationRequest,
        options: &RunOptions,
        metrics: &mut Metrics,
    ) -> Result<GenerationOutcome> {
        self.settings.check_prompt(&request.prompt)?;
        metrics.record_attempt();

        let model = self
            .settings
            .model(request.model.as_deref().unwrap_or(&self.settings.default_model));
        let quality = request.quality.unwrap_or(self.settings.default_quality);
        let recommended = recommended_quality(
            request.prompt.chars().count(),
            has_complex_math(&request.prompt),
        );
        tracing::info!(model = %model.id, %quality, %recommended, "accepted generation request");

        Stage::Enhancing.enter();
        let enhanced_prompt = if options.skip_enhance {
            request.prompt.clone()
        } else {
            self.generator.enhance_prompt(&request.prompt, &model).await
        };

        Stage::Generating.enter();
        let generated = self.generator.generate_code(&enhanced_prompt, &model).await;
        let code = if options.clamp_timing {
            clamp_timing(&generated.code)
        } else {
            generated.code
        };

        fs::create_dir_all(&options.output_dir).with_context(|| {
            format!(
                "failed to create output directory {}",
                options.output_dir.display()
            )
        })?;
        let code_path = options.output_dir.join(&self.settings.scene_file_name);
        fs::write(&code_path, &code)
            .with_context(|| format!("failed to write {}", code_path.display()))?;

        let mut outcome = GenerationOutcome {
            model: model.id,
            quality,
            recommended_quality: recommended,
            enhanced_prompt,
            code,
            origin: generated.origin,
            code_path,
            render: None,
            output_path: None,
        };
        if options.skip_render {
            tracing::info!(path = %outcome.code_path.display(), "render skipped");
            Stage::Succeeded.enter();
            return Ok(outcome);
        }

        Stage::Rendering.enter();
        let profile = self.settings.quality(quality);
        let (render, output_path) = self
            .render_to(&outcome.code, &profile, &options.output_dir)
            .await;
        render.record(quality, metrics);

        if render.success {
            Stage::Succeeded.enter();
        } else {
            Stage::Failed.enter();
        }
        outcome.render = Some(render);
        outcome.output_path = output_path;
        Ok(outcome)
    }

    async fn render_to(
        &self,
        code: &str,
        profile: &QualityProfile,
        output_dir: &Path,
    ) -> (RenderResult, Option<PathBuf>) {
        let workspace = match RequestWorkspace::create(&self.settings) {
            Ok(workspace) => workspace,
            Err(error) => return (rendering_error(&error), None),
        };
        let result = self.render_in(&workspace, code, profile, output_dir).await;
        workspace.close();
        result
    }

    async fn render_in(
        &self,
        workspace: &RequestWorkspace,
        code: &str,
        profile: &QualityProfile,
        output_dir: &Path,
    ) -> (RenderResult, Option<PathBuf>) {
        let scene_path = match workspace.write_scene(code) {
            Ok(path) => path,
            Err(error) => return (rendering_error(&error), None),
        };

        let renderer = self.renderer.clone();
        let workspace_path = workspace.path().to_path_buf();
        let profile = profile.clone();
        let joined = tokio::task::spawn_blocking(move || {
            renderer.render(&scene_path, &workspace_path, &profile)
        })
        .await;
        let render = match joined {
            Ok(render) => render,
            Err(error) => {
                return (
                    rendering_error(&anyhow::Error::new(error).context("render task failed")),
                    None,
                )
            }
        };

        let Some(video) = render.video_path.clone() else {
            return (render, None);
        };
        let destination = output_dir.join(format!(
            "{}.{}",
            self.settings.output_file_name, self.settings.video_extension
        ));
        match fs::copy(&video, &destination) {
            Ok(_) => {
                tracing::info!(path = %destination.display(), "video saved");
                (render, Some(destination))
            }
            Err(error) => {
                let error = anyhow::Error::new(error)
                    .context(format!("failed to copy video to {}", destination.display()));
                (rendering_error(&error), None)
            }
        }
    }
}

fn rendering_error(error: &anyhow::Error) -> RenderResult {
    tracing::error!(error = %format!("{error:#}"), "render setup failed");
    RenderResult {
        success: false,
        message: format!("Rendering error: {error:#}"),
        logs: String::new(),
        video_path: None,
        failure: Some(RenderFailure::RenderingError),
        elapsed_ms: 0,
    }
}

fn has_complex_math(prompt: &str) -> bool {
    matches!(
        detect_category(prompt),
        Category::Calculus | Category::LinearAlgebra | Category::ComplexAnalysis
    )
}
