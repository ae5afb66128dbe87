use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// Failure domains a request can end in. Each has a fixed user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Rendering,
    CodeGeneration,
    Prompt,
    System,
    Validation,
    Timeout,
    Api,
}

impl ErrorKind {
    pub fn user_message(self) -> &'static str {
        match self {
            Self::Rendering => "Failed to render the animation. Please try again with a simpler scene or lower quality.",
            Self::CodeGeneration => "Failed to generate animation code. Please try rephrasing your prompt.",
            Self::Prompt => "Error processing your prompt. Please try again with a clearer description.",
            Self::System => "A system error occurred. Please try again or contact support.",
            Self::Validation => "The generated code has validation errors. Please try again.",
            Self::Timeout => "The operation took too long to complete. Please try again with simpler settings.",
            Self::Api => "Error communicating with the AI service. Please try again.",
        }
    }

    pub fn suggestions(self) -> [&'static str; 4] {
        match self {
            Self::Rendering => [
                "Try reducing the complexity of your animation",
                "Lower the video quality setting",
                "Check if Manim is properly installed",
                "Ensure you have enough system resources",
            ],
            Self::CodeGeneration => [
                "Make your prompt more specific and clear",
                "Try a different AI model",
                "Break down complex animations into simpler parts",
                "Check the example prompts for inspiration",
            ],
            Self::Prompt => [
                "Be more specific about what you want to animate",
                "Include mathematical concepts and visual elements",
                "Mention colors and timing preferences",
                "Keep the description focused and concise",
            ],
            Self::System => [
                "Retry the request",
                "Check your internet connection",
                "Ensure you have the latest version of the application",
                "Check that Manim and FFmpeg are on PATH",
            ],
            Self::Validation => [
                "Try a simpler animation",
                "Use a different AI model",
                "Check the example prompts for reference",
                "Make your prompt more specific",
            ],
            Self::Timeout => [
                "Lower the video quality setting",
                "Simplify your animation",
                "Try a faster AI model",
                "Break down complex animations into parts",
            ],
            Self::Api => [
                "Check your API key",
                "Verify your internet connection",
                "Try again in a few minutes",
                "Contact support if the issue persists",
            ],
        }
    }
}

const GENERIC_MESSAGE: &str = "An unexpected error occurred. Please try again.";
const GENERIC_SUGGESTIONS: [&str; 4] = [
    "Retry the request",
    "Try a different prompt",
    "Check your settings",
    "Contact support if the issue persists",
];
const DEFAULT_FIXES: [&str; 4] = [
    "Try again with different settings",
    "Simplify your animation",
    "Check the example prompts",
    "Contact support if the issue persists",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Class of a raw error text (renderer stderr, exception text) found by pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorClass {
    ImportError,
    SyntaxError,
    AttributeError,
    TimeoutError,
    FFmpegError,
    FileNotFoundError,
    MemoryError,
    PermissionError,
    UnknownError,
}

const CLASS_PATTERNS: [(&str, ErrorClass); 8] = [
    (r"no module named '(\w+)'", ErrorClass::ImportError),
    (r"invalid syntax", ErrorClass::SyntaxError),
    (r"'(\w+)' object has no attribute '(\w+)'", ErrorClass::AttributeError),
    (r"timed out", ErrorClass::TimeoutError),
    (r"ffmpeg.*not found", ErrorClass::FFmpegError),
    (r"no such file or directory", ErrorClass::FileNotFoundError),
    (r"memoryerror", ErrorClass::MemoryError),
    (r"permission denied", ErrorClass::PermissionError),
];

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ImportError => "ImportError",
            Self::SyntaxError => "SyntaxError",
            Self::AttributeError => "AttributeError",
            Self::TimeoutError => "TimeoutError",
            Self::FFmpegError => "FFmpegError",
            Self::FileNotFoundError => "FileNotFoundError",
            Self::MemoryError => "MemoryError",
            Self::PermissionError => "PermissionError",
            Self::UnknownError => "UnknownError",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::ImportError => "Missing required packages. Please ensure all dependencies are installed.",
            Self::SyntaxError => "The generated code has syntax errors.",
            Self::AttributeError => "Invalid Manim object or method used.",
            Self::TimeoutError => "Rendering took too long and was cancelled.",
            Self::FFmpegError => "Video encoding failed.",
            Self::FileNotFoundError => "Required system command not found.",
            Self::MemoryError => "Insufficient memory to complete rendering.",
            Self::PermissionError => "Insufficient permissions to write output files.",
            Self::UnknownError => GENERIC_MESSAGE,
        }
    }

    pub fn solution(self) -> &'static str {
        match self {
            Self::ImportError => "Install Manim and its Python dependencies in the renderer's environment.",
            Self::SyntaxError => "Try regenerating with a more specific prompt or different model.",
            Self::AttributeError => "The AI may have used outdated Manim syntax. Try a different model.",
            Self::TimeoutError => "Try using lower quality settings or simplify your prompt.",
            Self::FFmpegError => "Check if FFmpeg is properly installed and accessible.",
            Self::FileNotFoundError => "Ensure Manim and FFmpeg are properly installed and in PATH.",
            Self::MemoryError => "Try lower quality settings or free up memory.",
            Self::PermissionError => "Check file permissions and available disk space.",
            Self::UnknownError => "Try again with different settings.",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            Self::ImportError | Self::FFmpegError | Self::MemoryError => Severity::High,
            Self::FileNotFoundError | Self::PermissionError => Severity::Low,
            Self::SyntaxError | Self::AttributeError | Self::TimeoutError | Self::UnknownError => {
                Severity::Medium
            }
        }
    }

    /// Whether the user can plausibly fix this by changing their input or setup.
    pub fn is_recoverable(self) -> bool {
        matches!(
            self,
            Self::SyntaxError
                | Self::AttributeError
                | Self::TimeoutError
                | Self::ImportError
                | Self::FileNotFoundError
        )
    }

    /// The failure domain whose user message fits this class, if any.
    pub fn kind(self) -> Option<ErrorKind> {
        match self {
            Self::ImportError | Self::FileNotFoundError | Self::PermissionError => {
                Some(ErrorKind::System)
            }
            Self::SyntaxError => Some(ErrorKind::Validation),
            Self::AttributeError => Some(ErrorKind::CodeGeneration),
            Self::TimeoutError => Some(ErrorKind::Timeout),
            Self::FFmpegError | Self::MemoryError => Some(ErrorKind::Rendering),
            Self::UnknownError => None,
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn class_regexes() -> &'static [(Regex, ErrorClass)] {
    static CLASS_RE: OnceLock<Vec<(Regex, ErrorClass)>> = OnceLock::new();
    CLASS_RE.get_or_init(|| {
        CLASS_PATTERNS
            .iter()
            .map(|(pattern, class)| {
                let re = Regex::new(&format!("(?i){pattern}"))
                    .expect("error class regex should compile");
                (re, *class)
            })
            .collect()
    })
}

/// First matching class in pattern order, `UnknownError` when nothing matches.
pub fn classify_error(text: &str) -> ErrorClass {
    class_regexes()
        .iter()
        .find(|(re, _)| re.is_match(text))
        .map(|(_, class)| *class)
        .unwrap_or(ErrorClass::UnknownError)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserFacing {
    pub message: &'static str,
    pub suggestions: Vec<&'static str>,
}

pub fn user_facing(kind: Option<ErrorKind>) -> UserFacing {
    match kind {
        Some(kind) => UserFacing {
            message: kind.user_message(),
            suggestions: kind.suggestions().to_vec(),
        },
        None => UserFacing {
            message: GENERIC_MESSAGE,
            suggestions: GENERIC_SUGGESTIONS.to_vec(),
        },
    }
}

pub fn suggest_fixes(text: &str) -> Vec<&'static str> {
    match classify_error(text).kind() {
        Some(kind) => kind.suggestions().to_vec(),
        None => DEFAULT_FIXES.to_vec(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugInfo {
    pub error_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_imports: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_scene_class: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub error_class: ErrorClass,
    pub summary: &'static str,
    pub solution: &'static str,
    pub user_message: &'static str,
    pub suggestions: Vec<&'static str>,
    pub severity: Severity,
    pub recoverable: bool,
    pub debug: DebugInfo,
}

/// Builds a report for `text`. An explicit `kind` picks the user message;
/// otherwise it is inferred from the classified text.
pub fn build_error_report(kind: Option<ErrorKind>, text: &str, code: Option<&str>) -> ErrorReport {
    let class = classify_error(text);
    let facing = user_facing(kind.or_else(|| class.kind()));
    ErrorReport {
        error_class: class,
        summary: class.message(),
        solution: class.solution(),
        user_message: facing.message,
        suggestions: facing.suggestions,
        severity: class.severity(),
        recoverable: class.is_recoverable(),
        debug: DebugInfo {
            error_message: text.trim().to_owned(),
            code_length: code.map(|code| code.chars().count()),
            has_imports: code.map(|code| code.contains("from manim import")),
            has_scene_class: code.map(|code| code.contains("class") && code.contains("Scene")),
        },
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn classifies_renderer_output_in_pattern_order() {
        assert_eq!(
            classify_error("ModuleNotFoundError: No module named 'manim'"),
            ErrorClass::ImportError
        );
        assert_eq!(
            classify_error("SyntaxError: invalid syntax (scene.py, line 4)"),
            ErrorClass::SyntaxError
        );
        assert_eq!(
            classify_error("AttributeError: 'Circle' object has no attribute 'get_centre'"),
            ErrorClass::AttributeError
        );
        assert_eq!(classify_error("Request Timed Out"), ErrorClass::TimeoutError);
        assert_eq!(
            classify_error("ffmpeg: command not found"),
            ErrorClass::FFmpegError
        );
        assert_eq!(
            classify_error("[Errno 13] Permission denied: '/media'"),
            ErrorClass::PermissionError
        );
        assert_eq!(classify_error("segfault"), ErrorClass::UnknownError);
    }

    #[test]
    fn earlier_pattern_wins() {
        // Both an import failure and a missing file; import is checked first.
        let text = "No module named 'numpy'\nNo such file or directory";
        assert_eq!(classify_error(text), ErrorClass::ImportError);
    }

    #[test]
    fn severity_and_recoverability() {
        assert_eq!(ErrorClass::MemoryError.severity(), Severity::High);
        assert_eq!(ErrorClass::PermissionError.severity(), Severity::Low);
        assert_eq!(ErrorClass::UnknownError.severity(), Severity::Medium);
        assert!(ErrorClass::FileNotFoundError.is_recoverable());
        assert!(!ErrorClass::FFmpegError.is_recoverable());
    }

    #[test]
    fn unmatched_text_gets_generic_guidance() {
        assert_eq!(suggest_fixes("something odd"), DEFAULT_FIXES.to_vec());
        assert_eq!(user_facing(None).message, GENERIC_MESSAGE);
        assert_eq!(
            suggest_fixes("Rendering timed out")[0],
            "Lower the video quality setting"
        );
    }

    #[test]
    fn report_carries_debug_info_about_code() {
        let code = "from manim import *\nclass GeneratedScene(Scene):\n    pass";
        let report = build_error_report(
            Some(ErrorKind::Rendering),
            "invalid syntax",
            Some(code),
        );
        assert_eq!(report.error_class, ErrorClass::SyntaxError);
        assert_eq!(report.user_message, ErrorKind::Rendering.user_message());
        assert_eq!(report.debug.has_imports, Some(true));
        assert_eq!(report.debug.has_scene_class, Some(true));

        let value = serde_json::to_value(&report).expect("serialize");
        assert_eq!(value["error_class"], json!("SyntaxError"));
        assert_eq!(value["severity"], json!("medium"));
        assert_eq!(value["recoverable"], json!(true));
    }

    #[test]
    fn report_without_code_omits_code_fields() {
        let report = build_error_report(None, "out of ideas", None);
        let value = serde_json::to_value(&report).expect("serialize");
        assert!(value["debug"].get("code_length").is_none());
        assert_eq!(value["user_message"], json!(GENERIC_MESSAGE));
    }
}
