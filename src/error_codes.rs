//! Stable codes for failures the caller is expected to fix before retrying.
//! With `--json` they are printed as `{"ok": false, "error": {...}}`.

use std::fmt;

use anyhow::Error;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    PromptLength,
    MissingApiKey,
    InvalidConfig,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PromptLength => "E_PROMPT_LENGTH",
            Self::MissingApiKey => "E_API_KEY",
            Self::InvalidConfig => "E_CONFIG",
        }
    }

    /// Usage errors come from the command line input itself, the rest from the environment.
    pub fn is_usage(self) -> bool {
        matches!(self, Self::PromptLength)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct CodedError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<Value>,
}

impl CodedError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn envelope(&self) -> ErrorEnvelope<'_> {
        ErrorEnvelope {
            ok: false,
            error: EnvelopeBody {
                code: self.code.as_str(),
                message: &self.message,
                details: self.details.as_ref(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope<'a> {
    pub ok: bool,
    pub error: EnvelopeBody<'a>,
}

#[derive(Debug, Serialize)]
pub struct EnvelopeBody<'a> {
    pub code: &'static str,
    pub message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<&'a Value>,
}

/// Innermost-first search of the context chain.
pub fn find_coded_error(error: &Error) -> Option<&CodedError> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<CodedError>())
}
