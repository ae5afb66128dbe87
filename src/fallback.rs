//! Hand-written scenes used when generation is exhausted.
//!
//! Selection is a plain substring match on the lowercased prompt, checked in
//! a fixed order. The mapping is part of the contract and is asserted as-is.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

const PROMPT_COMMENT_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackShape {
    Circle,
    Square,
    Triangle,
    Text,
}

impl FallbackShape {
    pub const ALL: [FallbackShape; 4] = [Self::Circle, Self::Square, Self::Triangle, Self::Text];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Circle => "circle",
            Self::Square => "square",
            Self::Triangle => "triangle",
            Self::Text => "text",
        }
    }

    fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::Circle => &["circle", "round", "ball", "sphere"],
            Self::Square => &["square", "box", "cube"],
            Self::Triangle => &["triangle"],
            Self::Text => &["text", "word", "letter"],
        }
    }

    fn constructor(self) -> &'static str {
        match self {
            Self::Circle => "Circle(color=BLUE, radius=1.5)",
            Self::Square => "Square(color=RED, side_length=2)",
            Self::Triangle => "Triangle(color=GREEN)",
            Self::Text => "Text(\"Animation\", color=WHITE)",
        }
    }
}

impl fmt::Display for FallbackShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First shape whose keywords appear in the prompt; circle when none do.
pub fn select_shape(prompt: &str) -> FallbackShape {
    let lower = prompt.to_lowercase();
    FallbackShape::ALL
        .into_iter()
        .find(|shape| shape.keywords().iter().any(|word| lower.contains(word)))
        .unwrap_or(FallbackShape::Circle)
}

pub fn fallback_scene(prompt: &str) -> (FallbackShape, String) {
    let shape = select_shape(prompt);
    (shape, render_template(shape, &comment_safe(prompt)))
}

fn comment_safe(prompt: &str) -> String {
    static UNSAFE_RE: OnceLock<Regex> = OnceLock::new();
    let re = UNSAFE_RE.get_or_init(|| {
        Regex::new(r"[^\w\s]").expect("comment sanitizer regex should compile")
    });
    re.replace_all(prompt, "")
        .chars()
        .take(PROMPT_COMMENT_CHARS)
        .map(|ch| if ch.is_whitespace() { ' ' } else { ch })
        .collect::<String>()
        .trim_end()
        .to_owned()
}

fn render_template(shape: FallbackShape, safe_prompt: &str) -> String {
    let constructor = shape.constructor();
    format!(
        r#"from manim import *

class GeneratedScene(Scene):
    def construct(self):
        # Animation for: {safe_prompt}
        title = Text("Animation", color=WHITE, font_size=36)
        title.to_edge(UP)

        main_object = {constructor}
        main_object.move_to(ORIGIN)

        # Create animations
        self.play(Write(title))
        self.wait(0.5)

        self.play(Create(main_object))
        self.wait(1)

        # Simple movement
        self.play(main_object.animate.shift(RIGHT * 2))
        self.wait(0.5)

        self.play(main_object.animate.shift(LEFT * 4))
        self.wait(0.5)

        self.play(main_object.animate.shift(RIGHT * 2))
        self.wait(1)

        # Fade out
        self.play(FadeOut(main_object), FadeOut(title))
        self.wait(0.5)
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::validate;

    #[test]
    fn keyword_mapping_is_stable() {
        assert_eq!(select_shape("a bouncing BALL"), FallbackShape::Circle);
        assert_eq!(select_shape("stack a box on a cube"), FallbackShape::Square);
        assert_eq!(select_shape("Right triangle"), FallbackShape::Triangle);
        assert_eq!(select_shape("animate a word"), FallbackShape::Text);
        assert_eq!(select_shape("the golden ratio"), FallbackShape::Circle);
    }

    #[test]
    fn earlier_shapes_win_when_several_match() {
        assert_eq!(
            select_shape("a circle inside a square"),
            FallbackShape::Circle
        );
        assert_eq!(
            select_shape("label each triangle with text"),
            FallbackShape::Triangle
        );
    }

    #[test]
    fn every_template_passes_validation() {
        for shape in FallbackShape::ALL {
            let code = render_template(shape, "anything");
            assert_eq!(validate(&code), Ok(()), "{shape} template:\n{code}");
        }
    }

    #[test]
    fn red_square_prompt_gets_red_square_template() {
        let (shape, code) = fallback_scene("Draw a red square");
        assert_eq!(shape, FallbackShape::Square);
        assert!(code.contains("Square(color=RED, side_length=2)"));
        assert!(code.contains("# Animation for: Draw a red square\n"));
        assert!(validate(&code).is_ok());
    }

    #[test]
    fn prompt_comment_cannot_break_out_of_the_comment() {
        let (_, code) = fallback_scene("square\")\n    raise SystemExit(1) # and more text that runs long");
        assert!(validate(&code).is_ok());
        let comment = code
            .lines()
            .find(|line| line.contains("# Animation for:"))
            .expect("comment line");
        assert!(!comment.contains('"') && !comment.contains('('));
        assert!(comment.trim_start().len() <= "# Animation for: ".len() + PROMPT_COMMENT_CHARS);
        assert!(!code.lines().any(|line| line.trim_start().starts_with("raise")));
    }
}
