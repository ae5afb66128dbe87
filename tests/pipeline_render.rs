#![cfg(unix)]

use std::fs;
use std::path::Path;

use manimate::generator::CodeOrigin;
use manimate::llm::{ChatBackend, ChatError, ChatRequest};
use manimate::metrics::Metrics;
use manimate::pipeline::{GenerationRequest, Pipeline, RunOptions};
use manimate::render::RenderFailure;
use manimate::settings::{QualityTier, Settings};
use tempfile::tempdir;

const MODEL_SCENE: &str = "```python
from manim import *

class GeneratedScene(Scene):
    def construct(self):
        title = Text(Pythagoras, font_size=36)
        self.play(Write(title))
        self.wait(5)
```";

/// Answers enhancement with a fixed sentence and code generation with `MODEL_SCENE`.
struct CannedModel;

impl ChatBackend for CannedModel {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ChatError> {
        if request.stop.is_empty() {
            Ok("Write the word Pythagoras in white at the center".to_owned())
        } else {
            Ok(MODEL_SCENE.to_owned())
        }
    }
}

struct Offline;

impl ChatBackend for Offline {
    async fn complete(&self, _request: &ChatRequest) -> Result<String, ChatError> {
        Err(ChatError::Unavailable("offline".to_owned()))
    }
}

fn settings_with_script(root: &Path, script_body: &str) -> Settings {
    let script = root.join("fake_manim.sh");
    fs::write(&script, script_body).expect("script should write");
    Settings {
        renderer_program: "sh".to_owned(),
        renderer_args: vec![script.display().to_string()],
        temp_root: Some(root.join("scratch")),
        ..Settings::default()
    }
}

fn scratch_is_empty(root: &Path) -> bool {
    fs::read_dir(root.join("scratch"))
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}

const RENDER_OK: &str = "dir=\"$7/videos/scene/480p15\"
mkdir -p \"$dir\"
cp \"$2\" \"$dir/$5.mp4\"
echo \"rendered $3 at $1\"
";

#[tokio::test]
async fn model_scene_is_repaired_rendered_and_copied() {
    let root = tempdir().expect("tempdir should create");
    let out = root.path().join("out");
    let pipeline = Pipeline::new(settings_with_script(root.path(), RENDER_OK), CannedModel);
    let mut metrics = Metrics::new();
    let request = GenerationRequest {
        prompt: "Write the word Pythagoras".to_owned(),
        model: None,
        quality: Some(QualityTier::Low),
    };
    let options = RunOptions {
        clamp_timing: true,
        ..RunOptions::new(&out)
    };

    let outcome = pipeline
        .run(&request, &options, &mut metrics)
        .await
        .expect("pipeline should run");

    assert!(outcome.succeeded(), "{outcome:?}");
    assert_eq!(outcome.origin, CodeOrigin::Model { attempt: 1 });
    assert_eq!(
        outcome.enhanced_prompt,
        "Write the word Pythagoras in white at the center"
    );
    assert!(outcome.code.contains("Text(\"Pythagoras\", font_size=36)"));
    assert!(outcome.code.contains("self.wait(3)"));

    let video = outcome.output_path.clone().expect("video copied");
    assert_eq!(video, out.join("output_video.mp4"));
    // The fake renderer copies the scene into the video, so the content is checkable.
    assert_eq!(fs::read_to_string(&video).expect("video"), outcome.code);
    assert_eq!(
        fs::read_to_string(out.join("scene.py")).expect("scene"),
        outcome.code
    );
    let render = outcome.render.as_ref().expect("render result");
    assert_eq!(render.logs.trim(), "rendered GeneratedScene at -ql");

    let summary = metrics.summary();
    assert_eq!(summary.total_attempts, 1);
    assert_eq!(summary.success_rate, 100.0);
    assert_eq!(summary.most_popular_quality, "low_quality");
    assert!(scratch_is_empty(root.path()));
}

#[tokio::test]
async fn offline_model_and_failing_renderer_still_return_an_outcome() {
    let root = tempdir().expect("tempdir should create");
    let settings = settings_with_script(
        root.path(),
        "echo \"AttributeError: 'Square' object has no attribute 'get_centre'\" >&2\nexit 1\n",
    );
    let pipeline = Pipeline::new(settings, Offline);
    let mut metrics = Metrics::new();

    let outcome = pipeline
        .run(
            &GenerationRequest::new("Draw a red square"),
            &RunOptions::new(root.path().join("out")),
            &mut metrics,
        )
        .await
        .expect("pipeline should run");

    assert!(!outcome.succeeded());
    assert!(matches!(outcome.origin, CodeOrigin::Fallback { .. }));
    assert!(outcome.code.contains("Square(color=RED, side_length=2)"));
    let render = outcome.render.as_ref().expect("render result");
    assert_eq!(render.failure, Some(RenderFailure::RenderingFailed));
    assert!(render.message.contains("has no attribute"));
    assert!(outcome.output_path.is_none());

    let summary = metrics.summary();
    assert_eq!(summary.error_distribution.get("RenderingFailed"), Some(&1));
    assert_eq!(summary.success_rate, 0.0);
    assert!(scratch_is_empty(root.path()));
}
