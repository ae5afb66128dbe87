use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::metrics::Metrics;
use crate::settings::{QualityProfile, QualityTier, Settings};
use crate::validator::SCENE_CLASS_NAME;

pub const NO_VIDEO_MESSAGE: &str = "No video file generated";
pub const TIMEOUT_MESSAGE: &str = "Rendering timeout exceeded";

const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Successful renders are not attributed to a scene type yet.
const UNKNOWN_SCENE_TYPE: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RenderFailure {
    NoVideoFile,
    RenderingFailed,
    TimeoutError,
    RenderingError,
}

impl RenderFailure {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoVideoFile => "NoVideoFile",
            Self::RenderingFailed => "RenderingFailed",
            Self::TimeoutError => "TimeoutError",
            Self::RenderingError => "RenderingError",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderResult {
    pub success: bool,
    pub message: String,
    pub logs: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<RenderFailure>,
    pub elapsed_ms: u64,
}

impl RenderResult {
    fn failed(failure: RenderFailure, message: impl Into<String>, logs: String, elapsed: Duration) -> Self {
        Self {
            success: false,
            message: message.into(),
            logs,
            video_path: None,
            failure: Some(failure),
            elapsed_ms: millis(elapsed),
        }
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }

    /// Adds this outcome to the accumulator.
    pub fn record(&self, tier: QualityTier, metrics: &mut Metrics) {
        match self.failure {
            None => metrics.record_success(self.elapsed(), UNKNOWN_SCENE_TYPE, tier),
            Some(failure) => metrics.record_failure(failure.as_str()),
        }
    }
}

/// Invokes the external renderer for one scene file.
#[derive(Debug, Clone)]
pub struct Renderer {
    program: String,
    leading_args: Vec<String>,
    timeout: Duration,
    scene_class: String,
    output_file_name: String,
    extension: String,
}

impl Renderer {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            program: settings.renderer_program.clone(),
            leading_args: settings.renderer_args.clone(),
            timeout: settings.render_timeout(),
            scene_class: SCENE_CLASS_NAME.to_owned(),
            output_file_name: settings.output_file_name.clone(),
            extension: settings.video_extension.clone(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn command_args(&self, quality: &QualityProfile, scene_file: &Path, media_dir: &Path) -> Vec<String> {
        let mut args = self.leading_args.clone();
        args.extend([
            quality.flag.clone(),
            scene_file.display().to_string(),
            self.scene_class.clone(),
            "--output_file".to_owned(),
            self.output_file_name.clone(),
            "--media_dir".to_owned(),
            media_dir.display().to_string(),
        ]);
        args
    }

    /// Runs the renderer inside `workspace` and looks for the produced video there.
    /// Every failure comes back as an unsuccessful result, never as an error.
    pub fn render(&self, scene_file: &Path, workspace: &Path, quality: &QualityProfile) -> RenderResult {
        let args = self.command_args(quality, scene_file, workspace);
        tracing::info!(program = %self.program, ?args, timeout_secs = self.timeout.as_secs(), "starting render");

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .current_dir(workspace)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let started = Instant::now();
        let outcome = run_with_timeout(command, self.timeout);
        let elapsed = started.elapsed();

        let result = match outcome {
            Err(error) => RenderResult::failed(
                RenderFailure::RenderingError,
                format!("Rendering error: {error}"),
                String::new(),
                elapsed,
            ),
            Ok(RunOutcome::TimedOut) => {
                RenderResult::failed(RenderFailure::TimeoutError, TIMEOUT_MESSAGE, String::new(), elapsed)
            }
            Ok(RunOutcome::Exited(output)) if !output.status.success() => RenderResult::failed(
                RenderFailure::RenderingFailed,
                output.stderr.trim().to_owned(),
                output.stdout,
                elapsed,
            ),
            Ok(RunOutcome::Exited(output)) => match find_video(workspace, &self.extension) {
                Some(video) => RenderResult {
                    success: true,
                    message: format!("Rendered {}", video.display()),
                    logs: output.stdout,
                    video_path: Some(video),
                    failure: None,
                    elapsed_ms: millis(elapsed),
                },
                None => RenderResult::failed(RenderFailure::NoVideoFile, NO_VIDEO_MESSAGE, output.stderr, elapsed),
            },
        };

        if result.success {
            tracing::info!(elapsed_ms = result.elapsed_ms, "render succeeded");
        } else {
            tracing::warn!(failure = ?result.failure, elapsed_ms = result.elapsed_ms, "render failed");
        }
        result
    }
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// First file with `extension` under `root`, searching subdirectories in name order.
pub fn find_video(root: &Path, extension: &str) -> Option<PathBuf> {
    let mut entries = fs::read_dir(root)
        .ok()?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .collect::<Vec<_>>();
    entries.sort();

    for path in &entries {
        if path.is_file() && path.extension().is_some_and(|ext| ext == extension) {
            return Some(path.clone());
        }
    }
    entries
        .iter()
        .filter(|path| path.is_dir())
        .find_map(|dir| find_video(dir, extension))
}

struct CommandOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

enum RunOutcome {
    Exited(CommandOutput),
    TimedOut,
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// The deadline covers both the child and the pipe reads after it exits.
fn run_with_timeout(mut command: Command, timeout: Duration) -> io::Result<RunOutcome> {
    let mut child = command.spawn()?;
    // Drain pipes while polling so a chatty renderer cannot block on a full pipe.
    let (sender, receiver) = mpsc::channel();
    drain(child.stdout.take(), Stream::Stdout, sender.clone());
    drain(child.stderr.take(), Stream::Stderr, sender);
    let started = Instant::now();

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }

        if started.elapsed() > timeout {
            child.kill()?;
            let _ = child.wait();
            // Grandchildren may still hold the pipes open; the drain threads are left to finish alone.
            return Ok(RunOutcome::TimedOut);
        }

        thread::sleep(POLL_INTERVAL);
    };

    let mut stdout = None;
    let mut stderr = None;
    while stdout.is_none() || stderr.is_none() {
        let remaining = timeout.saturating_sub(started.elapsed());
        match receiver.recv_timeout(remaining) {
            Ok((Stream::Stdout, text)) => stdout = Some(text),
            Ok((Stream::Stderr, text)) => stderr = Some(text),
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!("renderer exited but its output pipes stayed open past the timeout");
                return Ok(RunOutcome::TimedOut);
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok(RunOutcome::Exited(CommandOutput {
        status,
        stdout: stdout.unwrap_or_default(),
        stderr: stderr.unwrap_or_default(),
    }))
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>, stream: Stream, sender: Sender<(Stream, String)>) {
    thread::spawn(move || {
        let mut bytes = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut bytes);
        }
        let _ = sender.send((stream, String::from_utf8_lossy(&bytes).into_owned()));
    });
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    struct Fixture {
        _root: tempfile::TempDir,
        workspace: PathBuf,
        scene: PathBuf,
        renderer: Renderer,
    }

    /// A renderer that runs `body` through `sh`; positional args follow the manim layout.
    fn fixture(body: &str) -> Fixture {
        let root = tempfile::tempdir().expect("tempdir");
        let script = root.path().join("fake_manim.sh");
        fs::write(&script, body).expect("write script");
        let workspace = root.path().join("work");
        fs::create_dir_all(&workspace).expect("workspace");
        let scene = workspace.join("scene.py");
        fs::write(&scene, "from manim import *\n").expect("scene");

        let settings = Settings {
            renderer_program: "sh".to_owned(),
            renderer_args: vec![script.display().to_string()],
            ..Settings::default()
        };
        Fixture {
            workspace,
            scene,
            renderer: Renderer::from_settings(&settings),
            _root: root,
        }
    }

    fn medium() -> QualityProfile {
        QualityTier::Medium.builtin_profile()
    }

    #[test]
    fn command_line_follows_manim_layout() {
        let renderer = Renderer::from_settings(&Settings::default());
        let args = renderer.command_args(&medium(), Path::new("scene.py"), Path::new("/tmp/m"));
        assert_eq!(
            args,
            vec![
                "-qm",
                "scene.py",
                "GeneratedScene",
                "--output_file",
                "output_video",
                "--media_dir",
                "/tmp/m"
            ]
        );
    }

    #[test]
    fn successful_render_returns_nested_video() {
        let fx = fixture(
            "mkdir -p \"$7/videos/scene/720p30\"\n: > \"$7/videos/scene/720p30/$5.mp4\"\necho rendered $1 $3\n",
        );
        let result = fx.renderer.render(&fx.scene, &fx.workspace, &medium());
        assert!(result.success, "{result:?}");
        let video = result.video_path.expect("video path");
        assert!(video.ends_with("videos/scene/720p30/output_video.mp4"));
        assert_eq!(result.logs.trim(), "rendered -qm GeneratedScene");
    }

    #[test]
    fn nonzero_exit_reports_stderr() {
        let fx = fixture("echo partial output\necho 'NameError: name Foo is not defined' >&2\nexit 1\n");
        let result = fx.renderer.render(&fx.scene, &fx.workspace, &medium());
        assert!(!result.success);
        assert_eq!(result.failure, Some(RenderFailure::RenderingFailed));
        assert_eq!(result.message, "NameError: name Foo is not defined");
        assert_eq!(result.logs.trim(), "partial output");
    }

    #[test]
    fn clean_exit_without_video_is_a_failure() {
        let fx = fixture("echo no video here >&2\n");
        let result = fx.renderer.render(&fx.scene, &fx.workspace, &medium());
        assert_eq!(result.message, NO_VIDEO_MESSAGE);
        assert_eq!(result.failure, Some(RenderFailure::NoVideoFile));
        assert_eq!(result.logs.trim(), "no video here");
    }

    #[test]
    fn slow_renderer_is_killed_at_the_timeout() {
        let fx = fixture("exec sleep 5\n");
        let renderer = fx.renderer.clone().with_timeout(Duration::from_millis(300));
        let started = Instant::now();
        let result = renderer.render(&fx.scene, &fx.workspace, &medium());
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(result.message, TIMEOUT_MESSAGE);
        assert_eq!(result.failure, Some(RenderFailure::TimeoutError));
        assert!(result.logs.is_empty());
    }

    #[test]
    fn lingering_background_process_cannot_outlast_the_timeout() {
        let fx = fixture("sleep 4 &\necho started\nexit 0\n");
        let renderer = fx.renderer.clone().with_timeout(Duration::from_millis(500));
        let started = Instant::now();
        let result = renderer.render(&fx.scene, &fx.workspace, &medium());
        assert!(started.elapsed() < Duration::from_secs(3), "took {:?}", started.elapsed());
        assert_eq!(result.message, TIMEOUT_MESSAGE);
        assert_eq!(result.failure, Some(RenderFailure::TimeoutError));
    }

    #[test]
    fn missing_program_is_a_rendering_error() {
        let settings = Settings {
            renderer_program: "/nonexistent/manim-binary".to_owned(),
            ..Settings::default()
        };
        let root = tempfile::tempdir().expect("tempdir");
        let result = Renderer::from_settings(&settings).render(
            &root.path().join("scene.py"),
            root.path(),
            &medium(),
        );
        assert!(result.message.starts_with("Rendering error: "));
        assert_eq!(result.failure, Some(RenderFailure::RenderingError));
    }

    #[test]
    fn outcomes_are_recorded_in_metrics() {
        let mut metrics = Metrics::new();
        let fx = fixture("exit 2\n");
        fx.renderer
            .render(&fx.scene, &fx.workspace, &medium())
            .record(QualityTier::Medium, &mut metrics);
        let summary = metrics.summary();
        assert_eq!(summary.error_distribution.get("RenderingFailed"), Some(&1));
        assert_eq!(summary.success_rate, 0.0);
    }
}
