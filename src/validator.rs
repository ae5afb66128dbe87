//! Structural acceptance gate for generated scenes.
//!
//! A scene passes when it contains every required pattern, contains no
//! forbidden splat pattern, and parses as a Python module. The first failed
//! rule is reported; there is no partial credit.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use rustpython_parser::{ast, Parse};
use serde::Serialize;

pub const MANIM_IMPORT_LINE: &str = "from manim import *";
pub const SCENE_CLASS_NAME: &str = "GeneratedScene";

struct RequiredPattern {
    pattern: &'static str,
    description: &'static str,
}

const REQUIRED_PATTERNS: [RequiredPattern; 5] = [
    RequiredPattern {
        pattern: r"from manim import \*",
        description: "the `from manim import *` line",
    },
    RequiredPattern {
        pattern: r"class GeneratedScene\(Scene\)",
        description: "a `class GeneratedScene(Scene)` declaration",
    },
    RequiredPattern {
        pattern: r"def construct\(self\)",
        description: "a `def construct(self)` method",
    },
    RequiredPattern {
        pattern: r"self\.play\(",
        description: "at least one `self.play(...)` call",
    },
    RequiredPattern {
        pattern: r"self\.wait\(",
        description: "at least one `self.wait(...)` call",
    },
];

const FORBIDDEN_PATTERNS: [&str; 3] = [r"for\s+\*", r"\*\s*=", r"^\s*\*"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Violation {
    MissingPattern {
        pattern: &'static str,
        description: &'static str,
    },
    ForbiddenPattern {
        pattern: &'static str,
        line: usize,
    },
    Syntax {
        message: String,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPattern { description, .. } => {
                write!(f, "code is missing {description}")
            }
            Self::ForbiddenPattern { pattern, line } => {
                write!(f, "line {line} contains forbidden pattern `{pattern}`")
            }
            Self::Syntax { message } => write!(f, "invalid syntax: {message}"),
        }
    }
}

impl std::error::Error for Violation {}

fn required_regexes() -> &'static [Regex] {
    static REQUIRED_RE: OnceLock<Vec<Regex>> = OnceLock::new();
    REQUIRED_RE.get_or_init(|| {
        REQUIRED_PATTERNS
            .iter()
            .map(|required| {
                Regex::new(required.pattern).expect("required pattern regex should compile")
            })
            .collect()
    })
}

fn forbidden_regexes() -> &'static [Regex] {
    static FORBIDDEN_RE: OnceLock<Vec<Regex>> = OnceLock::new();
    FORBIDDEN_RE.get_or_init(|| {
        FORBIDDEN_PATTERNS
            .iter()
            .map(|pattern| {
                Regex::new(&format!("(?m){pattern}"))
                    .expect("forbidden pattern regex should compile")
            })
            .collect()
    })
}

/// Checks required patterns, then forbidden patterns, then syntax.
pub fn validate(code: &str) -> Result<(), Violation> {
    for (required, re) in REQUIRED_PATTERNS.iter().zip(required_regexes()) {
        if !re.is_match(code) {
            return Err(Violation::MissingPattern {
                pattern: required.pattern,
                description: required.description,
            });
        }
    }

    for (pattern, re) in FORBIDDEN_PATTERNS.iter().zip(forbidden_regexes()) {
        if let Some(found) = re.find(code) {
            let line = code[..found.start()].matches('\n').count() + 1;
            return Err(Violation::ForbiddenPattern { pattern, line });
        }
    }

    parse_check(code)
}

/// True when a single line matches any forbidden splat pattern.
pub fn is_forbidden_line(line: &str) -> bool {
    forbidden_regexes().iter().any(|re| re.is_match(line))
}

pub fn parse_check(code: &str) -> Result<(), Violation> {
    parse_module(code).map(|_| ())
}

fn parse_module(code: &str) -> Result<ast::Suite, Violation> {
    ast::Suite::parse(code, "<generated scene>").map_err(|error| Violation::Syntax {
        message: error.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SceneClass {
    pub name: String,
    pub has_construct: bool,
}

/// Classes deriving from `Scene` (directly or as `module.Scene`), including nested ones.
pub fn scene_classes(code: &str) -> Result<Vec<SceneClass>, Violation> {
    let suite = parse_module(code)?;
    let mut found = Vec::new();
    collect_scene_classes(&suite, &mut found);
    Ok(found)
}

fn collect_scene_classes(body: &[ast::Stmt], found: &mut Vec<SceneClass>) {
    for stmt in body {
        let ast::Stmt::ClassDef(class) = stmt else {
            continue;
        };
        if class.bases.iter().any(is_scene_base) {
            let has_construct = class.body.iter().any(|item| {
                matches!(item, ast::Stmt::FunctionDef(def) if def.name.as_str() == "construct")
            });
            found.push(SceneClass {
                name: class.name.as_str().to_owned(),
                has_construct,
            });
        }
        collect_scene_classes(&class.body, found);
    }
}

fn is_scene_base(base: &ast::Expr) -> bool {
    match base {
        ast::Expr::Name(name) => name.id.as_str() == "Scene",
        ast::Expr::Attribute(attribute) => attribute.attr.as_str() == "Scene",
        _ => false,
    }
}
