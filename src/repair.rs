//! Lexical repair of model output before it reaches the validator.
//!
//! Every step is a pattern substitution over lines of text. Nothing here
//! understands Python, so a repair can miss a defect or introduce one; the
//! validator decides whether the result is usable.

use std::sync::OnceLock;

use regex::Regex;

use crate::validator::{is_forbidden_line, MANIM_IMPORT_LINE};

const CODE_START_MARKERS: [&str; 3] = ["from manim", "import manim", "class GeneratedScene"];
const PROSE_PREFIXES: [&str; 4] = ["Here", "This code", "The animation", "Note:"];
const INDENT_STEP: usize = 4;

/// Runs every repair step in order: fences, prose, text literals, loop/splat lines, import.
pub fn repair_code(raw: &str) -> String {
    let code = strip_markdown_fences(raw);
    let code = extract_code_region(&code);
    let code = fix_text_literals(&code);
    let code = fix_loops_and_splats(&code);
    ensure_manim_import(&code)
}

pub fn strip_markdown_fences(raw: &str) -> String {
    static FENCE_RE: OnceLock<Regex> = OnceLock::new();
    let re = FENCE_RE.get_or_init(|| {
        Regex::new(r"```(?:python|py)?[ \t]*\n?").expect("fence regex should compile")
    });
    re.replace_all(raw, "").replace('`', "")
}

/// Drops chatter before the first code line and known prose lines after it.
/// Text with no recognizable code start is returned unchanged.
pub fn extract_code_region(code: &str) -> String {
    let lines = code.lines().collect::<Vec<_>>();
    let Some(start) = lines.iter().position(|line| {
        let trimmed = line.trim();
        CODE_START_MARKERS
            .iter()
            .any(|marker| trimmed.starts_with(marker))
    }) else {
        return code.to_owned();
    };

    lines[start..]
        .iter()
        .filter(|line| {
            let trimmed = line.trim();
            !PROSE_PREFIXES
                .iter()
                .any(|prefix| trimmed.starts_with(prefix))
        })
        .copied()
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn fix_text_literals(code: &str) -> String {
    code.lines()
        .map(fix_text_literal_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn fix_text_literal_line(line: &str) -> String {
    if !line.contains("Text(") {
        return line.to_owned();
    }

    static BARE_TEXT_RE: OnceLock<Regex> = OnceLock::new();
    static BARE_TEXT_SIZED_RE: OnceLock<Regex> = OnceLock::new();
    let bare = BARE_TEXT_RE.get_or_init(|| {
        Regex::new(r#"Text\(([^"'()\[\]]*?)\)"#).expect("bare text regex should compile")
    });
    let bare_sized = BARE_TEXT_SIZED_RE.get_or_init(|| {
        Regex::new(r#"Text\(([^"']*?), font_size"#).expect("sized text regex should compile")
    });

    let mut fixed = line.to_owned();
    if fixed.matches('\'').count() % 2 != 0 {
        fixed = fixed.replace('\'', "\"");
    }
    // Sized form first, otherwise the bare pattern swallows the keyword argument.
    fixed = bare_sized
        .replace_all(&fixed, r#"Text("${1}", font_size"#)
        .into_owned();
    fixed = bare.replace_all(&fixed, r#"Text("${1}")"#).into_owned();
    if fixed.matches('"').count() % 2 != 0 {
        fixed = close_unbalanced_quote(&fixed);
    }
    fixed
}

/// Inserts a closing `"` before the first `,` or `)` that follows the unmatched opening quote.
fn close_unbalanced_quote(line: &str) -> String {
    let mut open_at = None;
    for (index, ch) in line.char_indices() {
        if ch == '"' {
            open_at = match open_at {
                Some(_) => None,
                None => Some(index),
            };
        }
    }
    let Some(open_at) = open_at else {
        return line.to_owned();
    };

    let body_start = open_at + 1;
    let insert_at = line[body_start..]
        .find(|ch: char| ch == ',' || ch == ')')
        .map(|offset| body_start + offset)
        .unwrap_or_else(|| line.trim_end().len());

    let mut fixed = String::with_capacity(line.len() + 1);
    fixed.push_str(&line[..insert_at]);
    fixed.push('"');
    fixed.push_str(&line[insert_at..]);
    fixed
}

/// Removes splat lines and gives every empty `for` body a `pass`.
pub fn fix_loops_and_splats(code: &str) -> String {
    let lines = code
        .lines()
        .filter(|line| !is_forbidden_line(line))
        .collect::<Vec<_>>();

    let mut fixed = Vec::with_capacity(lines.len());
    for (index, line) in lines.iter().enumerate() {
        fixed.push((*line).to_owned());

        let trimmed = line.trim();
        if !(trimmed.starts_with("for ") && trimmed.ends_with(':')) {
            continue;
        }
        let indent = indent_width(line);
        let has_body = lines[index + 1..]
            .iter()
            .find(|next| !next.trim().is_empty())
            .is_some_and(|next| indent_width(next) > indent);
        if !has_body {
            fixed.push(format!("{}pass", " ".repeat(indent + INDENT_STEP)));
        }
    }
    fixed.join("\n")
}

fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|ch| ch.is_whitespace())
        .map(|ch| if ch == '\t' { INDENT_STEP } else { 1 })
        .sum()
}

pub fn ensure_manim_import(code: &str) -> String {
    static IMPORT_RE: OnceLock<Regex> = OnceLock::new();
    let re = IMPORT_RE
        .get_or_init(|| Regex::new(r"from manim import \*").expect("import regex should compile"));
    if re.is_match(code) {
        code.trim().to_owned()
    } else {
        format!("{MANIM_IMPORT_LINE}\n\n{}", code.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::{parse_check, validate};

    #[test]
    fn fences_and_prose_are_removed() {
        let raw = "Here is your scene:\n```python\nfrom manim import *\n\nclass GeneratedScene(Scene):\n    def construct(self):\n        self.play(Create(Circle()))\n        self.wait(1)\n```\nThis code draws a circle.";
        let fixed = repair_code(raw);
        assert!(fixed.starts_with("from manim import *"));
        assert!(!fixed.contains('`'));
        assert!(!fixed.contains("This code"));
        assert!(validate(&fixed).is_ok(), "repaired code:\n{fixed}");
    }

    #[test]
    fn bare_text_argument_is_quoted() {
        assert_eq!(
            fix_text_literals("        title = Text(Hello World)"),
            "        title = Text(\"Hello World\")"
        );
        assert_eq!(
            fix_text_literals("t = Text(Pythagoras, font_size=36)"),
            "t = Text(\"Pythagoras\", font_size=36)"
        );
    }

    #[test]
    fn quoted_text_is_left_alone() {
        let line = "t = Text(\"Hi, there\", font_size=24, color=RED)";
        assert_eq!(fix_text_literals(line), line);
    }

    #[test]
    fn unterminated_text_literal_is_closed_before_next_separator() {
        assert_eq!(
            fix_text_literals("t = Text(\"Hello, font_size=24)"),
            "t = Text(\"Hello\", font_size=24)"
        );
        assert_eq!(
            fix_text_literals("t = Text(\"Hello)"),
            "t = Text(\"Hello\")"
        );
    }

    #[test]
    fn odd_single_quotes_become_double_quotes() {
        assert_eq!(
            fix_text_literals("t = Text('Hello)"),
            "t = Text(\"Hello\")"
        );
    }

    #[test]
    fn splat_lines_are_dropped_and_empty_loops_get_pass() {
        let code = "class GeneratedScene(Scene):\n    def construct(self):\n        for i in range(3):\n            *dots = make()\n        self.wait(1)";
        let fixed = fix_loops_and_splats(code);
        assert!(!fixed.contains("*dots"));
        assert!(fixed.contains("        for i in range(3):\n            pass\n        self.wait(1)"));
    }

    #[test]
    fn loop_with_body_is_untouched() {
        let code = "for i in range(3):\n    self.wait(1)";
        assert_eq!(fix_loops_and_splats(code), code);
    }

    #[test]
    fn trailing_loop_header_gets_pass() {
        let fixed = fix_loops_and_splats("    for x in xs:");
        assert_eq!(fixed, "    for x in xs:\n        pass");
    }

    #[test]
    fn missing_import_is_prepended_exactly_once() {
        let code = "class GeneratedScene(Scene):\n    def construct(self):\n        self.play(FadeIn(Square()))\n        self.wait(1)\n";
        let fixed = repair_code(code);
        assert_eq!(fixed.matches("from manim import *").count(), 1);
        assert!(fixed.starts_with("from manim import *\n\nclass GeneratedScene"));
        assert!(parse_check(&fixed).is_ok());

        let again = repair_code(&fixed);
        assert_eq!(again.matches("from manim import *").count(), 1);
    }

    #[test]
    fn text_without_code_start_is_kept() {
        assert_eq!(extract_code_region("x = 1\ny = 2"), "x = 1\ny = 2");
    }
}
