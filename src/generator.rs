//! Prompt enhancement and the bounded generate/repair/validate loop.

use serde::Serialize;

use crate::fallback::{fallback_scene, FallbackShape};
use crate::llm::{ChatBackend, ChatMessage, ChatRequest, CODE_STOP_SEQUENCES};
use crate::prompt::{enhancement_instruction, InstructionLevel, CODE_SYSTEM_MESSAGE};
use crate::repair::repair_code;
use crate::settings::ModelProfile;
use crate::validator::validate;

pub const MAX_ATTEMPTS: u32 = 3;

const ENHANCE_MAX_TOKENS: u32 = 500;
const CODE_TEMPERATURE: f32 = 0.1;
const CODE_MAX_TOKENS: u32 = 800;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CodeOrigin {
    Model { attempt: u32 },
    Fallback { shape: FallbackShape },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedCode {
    pub code: String,
    pub origin: CodeOrigin,
}

pub struct SceneGenerator<B> {
    backend: B,
}

impl<B: ChatBackend> SceneGenerator<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the enriched prompt, or the original prompt when the call fails.
    pub async fn enhance_prompt(&self, prompt: &str, model: &ModelProfile) -> String {
        let request = ChatRequest {
            messages: vec![ChatMessage::user(enhancement_instruction(prompt))],
            model: model.id.clone(),
            temperature: model.temperature,
            max_tokens: ENHANCE_MAX_TOKENS,
            stop: Vec::new(),
        };
        match self.backend.complete(&request).await {
            Ok(enhanced) => enhanced,
            Err(error) => {
                tracing::error!(%error, model = %model.id, "prompt enhancement failed, using original prompt");
                prompt.to_owned()
            }
        }
    }

    /// Up to [`MAX_ATTEMPTS`] model attempts, then a fallback template picked from `prompt`.
    ///
    /// A validation failure makes the next instruction simpler. A chat error
    /// keeps the current instruction and moves on to the next attempt.
    pub async fn generate_code(&self, prompt: &str, model: &ModelProfile) -> GeneratedCode {
        let mut level = InstructionLevel::Standard;
        for attempt in 1..=MAX_ATTEMPTS {
            let request = code_request(prompt, model, level);
            let raw = match self.backend.complete(&request).await {
                Ok(raw) => raw,
                Err(error) => {
                    tracing::error!(attempt, %error, "code generation call failed");
                    continue;
                }
            };

            let code = repair_code(&raw);
            match validate(&code) {
                Ok(()) => {
                    tracing::info!(attempt, ?level, "generated code passed validation");
                    return GeneratedCode {
                        code,
                        origin: CodeOrigin::Model { attempt },
                    };
                }
                Err(violation) => {
                    tracing::warn!(attempt, ?level, %violation, "generated code failed validation");
                    level = level.simpler();
                }
            }
        }

        let (shape, code) = fallback_scene(prompt);
        tracing::warn!(attempts = MAX_ATTEMPTS, %shape, "generation exhausted, using fallback template");
        GeneratedCode {
            code,
            origin: CodeOrigin::Fallback { shape },
        }
    }
}

fn code_request(prompt: &str, model: &ModelProfile, level: InstructionLevel) -> ChatRequest {
    ChatRequest {
        messages: vec![
            ChatMessage::system(CODE_SYSTEM_MESSAGE),
            ChatMessage::user(level.render(prompt)),
        ],
        model: model.id.clone(),
        temperature: CODE_TEMPERATURE,
        max_tokens: CODE_MAX_TOKENS,
        stop: CODE_STOP_SEQUENCES.iter().map(|stop| (*stop).to_owned()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::llm::ChatError;
    use crate::settings::Settings;

    const GOOD_SCENE: &str = "from manim import *\n\nclass GeneratedScene(Scene):\n    def construct(self):\n        dot = Dot(color=YELLOW)\n        self.play(FadeIn(dot))\n        self.wait(1)\n";

    #[derive(Default)]
    struct ScriptedBackend {
        replies: Mutex<VecDeque<Result<String, ChatError>>>,
        seen: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedBackend {
        fn with_replies(replies: Vec<Result<String, ChatError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::default(),
            }
        }

        fn calls(&self) -> Vec<ChatRequest> {
            self.seen.lock().expect("lock").clone()
        }
    }

    impl ChatBackend for ScriptedBackend {
        async fn complete(&self, request: &ChatRequest) -> Result<String, ChatError> {
            self.seen.lock().expect("lock").push(request.clone());
            self.replies
                .lock()
                .expect("lock")
                .pop_front()
                .unwrap_or_else(|| Err(ChatError::Unavailable("script exhausted".to_owned())))
        }
    }

    fn model() -> ModelProfile {
        Settings::default().model(crate::settings::DEFAULT_MODEL)
    }

    #[tokio::test]
    async fn failing_backend_falls_back_after_three_attempts() {
        let generator = SceneGenerator::new(ScriptedBackend::default());
        let generated = generator.generate_code("Draw a red square", &model()).await;

        assert_eq!(
            generated.origin,
            CodeOrigin::Fallback {
                shape: FallbackShape::Square
            }
        );
        assert!(generated.code.contains("Square(color=RED"));
        assert!(validate(&generated.code).is_ok());
        assert_eq!(generator.backend().calls().len(), MAX_ATTEMPTS as usize);
    }

    #[tokio::test]
    async fn invalid_output_is_retried_with_a_simpler_instruction() {
        let backend = ScriptedBackend::with_replies(vec![
            Ok("Sorry, I cannot help with that.".to_owned()),
            Ok(format!("```python\n{GOOD_SCENE}```")),
        ]);
        let generator = SceneGenerator::new(backend);
        let generated = generator.generate_code("a yellow dot", &model()).await;

        assert_eq!(generated.origin, CodeOrigin::Model { attempt: 2 });
        assert!(generated.code.starts_with("from manim import *"));

        let calls = generator.backend().calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].messages[1].content, InstructionLevel::Standard.render("a yellow dot"));
        assert_eq!(calls[1].messages[1].content, InstructionLevel::Simple.render("a yellow dot"));
        assert_eq!(calls[0].temperature, CODE_TEMPERATURE);
        assert_eq!(calls[0].max_tokens, CODE_MAX_TOKENS);
        assert_eq!(calls[0].stop, vec!["```", "Note:", "Example:"]);
    }

    #[tokio::test]
    async fn chat_error_keeps_the_current_instruction() {
        let backend = ScriptedBackend::with_replies(vec![
            Err(ChatError::EmptyResponse),
            Ok(GOOD_SCENE.to_owned()),
        ]);
        let generator = SceneGenerator::new(backend);
        let generated = generator.generate_code("a yellow dot", &model()).await;

        assert_eq!(generated.origin, CodeOrigin::Model { attempt: 2 });
        let calls = generator.backend().calls();
        assert_eq!(calls[0].messages[1].content, calls[1].messages[1].content);
    }

    #[tokio::test]
    async fn never_more_than_three_attempts() {
        let replies = (0..10).map(|_| Ok("not code".to_owned())).collect();
        let generator = SceneGenerator::new(ScriptedBackend::with_replies(replies));
        let generated = generator.generate_code("the golden ratio", &model()).await;

        assert_eq!(
            generated.origin,
            CodeOrigin::Fallback {
                shape: FallbackShape::Circle
            }
        );
        assert_eq!(generator.backend().calls().len(), 3);
    }

    #[tokio::test]
    async fn enhancement_failure_returns_original_prompt() {
        let generator = SceneGenerator::new(ScriptedBackend::default());
        let enhanced = generator.enhance_prompt("Draw a red square", &model()).await;
        assert_eq!(enhanced, "Draw a red square");
    }

    #[tokio::test]
    async fn enhancement_uses_profile_temperature() {
        let backend = ScriptedBackend::with_replies(vec![Ok("A bold red square".to_owned())]);
        let generator = SceneGenerator::new(backend);
        let model = model();
        let enhanced = generator.enhance_prompt("Draw a red square", &model).await;

        assert_eq!(enhanced, "A bold red square");
        let calls = generator.backend().calls();
        assert_eq!(calls[0].temperature, model.temperature);
        assert_eq!(calls[0].max_tokens, ENHANCE_MAX_TOKENS);
        assert!(calls[0].stop.is_empty());
    }
}
