//! Prompt-to-Manim animation generation: a language model writes the scene,
//! lexical repair and a structural validator gate it, and the external
//! `manim` renderer turns it into a video.

pub mod error_codes;
pub mod errors;
pub mod fallback;
pub mod generator;
pub mod llm;
pub mod metrics;
pub mod performance;
pub mod pipeline;
pub mod prompt;
pub mod render;
pub mod repair;
pub mod settings;
pub mod validator;
pub mod workspace;
