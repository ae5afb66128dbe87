//! Topic categories and the instructions sent to the language model.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Algebra,
    Geometry,
    Calculus,
    Statistics,
    Physics,
    NumberTheory,
    Trigonometry,
    LinearAlgebra,
    ComplexAnalysis,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Algebra => "algebra",
            Self::Geometry => "geometry",
            Self::Calculus => "calculus",
            Self::Statistics => "statistics",
            Self::Physics => "physics",
            Self::NumberTheory => "number_theory",
            Self::Trigonometry => "trigonometry",
            Self::LinearAlgebra => "linear_algebra",
            Self::ComplexAnalysis => "complex_analysis",
        }
    }

    pub fn profile(self) -> &'static CategoryProfile {
        CATEGORIES
            .iter()
            .find(|profile| profile.category == self)
            .unwrap_or(&CATEGORIES[0])
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct CategoryProfile {
    pub category: Category,
    pub enhancement: &'static str,
    pub keywords: &'static [&'static str],
    pub example_objects: &'static [&'static str],
    pub colors: &'static [&'static str],
}

/// Ordered: earlier entries win score ties.
pub static CATEGORIES: [CategoryProfile; 9] = [
    CategoryProfile {
        category: Category::Algebra,
        enhancement: "Focus on algebraic concepts like equations, functions, and graphing. Include coordinate systems, variable animations, and step-by-step solving processes with clear mathematical notation.",
        keywords: &["equation", "function", "graph", "variable", "solve", "polynomial", "quadratic", "linear"],
        example_objects: &["Axes", "NumberLine", "MathTex", "DecimalNumber"],
        colors: &["BLUE", "RED", "GREEN", "YELLOW"],
    },
    CategoryProfile {
        category: Category::Geometry,
        enhancement: "Emphasize geometric shapes, transformations, and proofs. Include angles, lines, circles, and spatial relationships with clear visual representations and construction animations.",
        keywords: &["triangle", "circle", "angle", "polygon", "proof", "geometry", "shape", "construction"],
        example_objects: &["Circle", "Square", "Triangle", "Line", "Arc", "Polygon"],
        colors: &["PURPLE", "ORANGE", "PINK", "TEAL"],
    },
    CategoryProfile {
        category: Category::Calculus,
        enhancement: "Highlight calculus concepts like derivatives, integrals, and limits. Show function behavior, area under curves, and rate of change visualizations with smooth transformations.",
        keywords: &["derivative", "integral", "limit", "function", "calculus", "rate", "slope", "area"],
        example_objects: &["Axes", "FunctionGraph", "Area", "Dot", "Vector"],
        colors: &["MAROON", "DARK_BLUE", "GOLD", "LIGHT_BROWN"],
    },
    CategoryProfile {
        category: Category::Statistics,
        enhancement: "Focus on data visualization, probability distributions, and statistical concepts. Include charts, graphs, histograms, and probability animations with clear data representation.",
        keywords: &["probability", "distribution", "data", "statistics", "chart", "graph", "histogram", "mean"],
        example_objects: &["BarChart", "Axes", "Rectangle", "Text", "NumberLine"],
        colors: &["LIGHT_GREY", "DARK_GREY", "BLUE_E", "RED_E"],
    },
    CategoryProfile {
        category: Category::Physics,
        enhancement: "Emphasize physics concepts with mathematical foundations. Include motion, forces, waves, and physical phenomena with proper mathematical representations and vector animations.",
        keywords: &["motion", "force", "wave", "physics", "velocity", "acceleration", "vector", "field"],
        example_objects: &["Vector", "Dot", "Circle", "Line", "FunctionGraph"],
        colors: &["LIGHT_PINK", "LIGHT_BLUE", "WHITE", "GREY"],
    },
    CategoryProfile {
        category: Category::NumberTheory,
        enhancement: "Focus on number properties, sequences, patterns, and mathematical relationships. Include prime numbers, Fibonacci sequences, and number patterns with clear visual progression.",
        keywords: &["prime", "fibonacci", "sequence", "pattern", "number", "divisor", "factor", "modular"],
        example_objects: &["NumberLine", "Text", "Circle", "Rectangle", "MathTex"],
        colors: &["GOLD", "SILVER", "BRONZE", "COPPER"],
    },
    CategoryProfile {
        category: Category::Trigonometry,
        enhancement: "Emphasize trigonometric functions, unit circles, and wave patterns. Include sine, cosine, tangent functions with circular representations and periodic behavior.",
        keywords: &["sine", "cosine", "tangent", "angle", "circle", "radian", "periodic", "wave"],
        example_objects: &["Circle", "Axes", "FunctionGraph", "Arc", "Line"],
        colors: &["BLUE_A", "BLUE_B", "BLUE_C", "BLUE_D"],
    },
    CategoryProfile {
        category: Category::LinearAlgebra,
        enhancement: "Focus on vectors, matrices, transformations, and linear systems. Include vector spaces, eigenvalues, and geometric interpretations of linear operations.",
        keywords: &["vector", "matrix", "transformation", "eigenvalue", "linear", "basis", "determinant"],
        example_objects: &["Vector", "Matrix", "Axes", "Arrow", "Rectangle"],
        colors: &["RED_A", "RED_B", "RED_C", "RED_D"],
    },
    CategoryProfile {
        category: Category::ComplexAnalysis,
        enhancement: "Emphasize complex numbers, complex plane, and complex functions. Include Argand diagrams, complex transformations, and visualizations of complex operations.",
        keywords: &["complex", "imaginary", "real", "argand", "magnitude", "phase", "euler"],
        example_objects: &["ComplexPlane", "Axes", "Vector", "Circle", "FunctionGraph"],
        colors: &["PURPLE_A", "PURPLE_B", "PURPLE_C", "PURPLE_D"],
    },
];

/// Picks the category with the most keyword hits; algebra when nothing matches.
pub fn detect_category(prompt: &str) -> Category {
    let lower = prompt.to_lowercase();
    let mut best = (Category::Algebra, 0usize);
    for profile in &CATEGORIES {
        let score = profile
            .keywords
            .iter()
            .filter(|keyword| lower.contains(*keyword))
            .count();
        if score > best.1 {
            best = (profile.category, score);
        }
    }
    best.0
}

pub fn enhancement_instruction(user_prompt: &str) -> String {
    let context = detect_category(user_prompt).profile().enhancement;
    format!(
        "You are an expert at creating detailed prompts for Manim (Mathematical Animation Engine) video generation.\n\n\
         User's original prompt: \"{user_prompt}\"\n\n\
         Context: {context}\n\n\
         Please enhance this prompt by:\n\
         1. Adding specific mathematical or visual details\n\
         2. Suggesting appropriate Manim objects and animations\n\
         3. Specifying colors, positioning, and timing\n\
         4. Including educational context if applicable\n\
         5. Making it clear and comprehensive for code generation\n\n\
         Enhanced prompt should be detailed but concise, focusing on visual elements that can be animated with Manim.\n\n\
         Return only the enhanced prompt, nothing else.\n"
    )
}

pub const CODE_SYSTEM_MESSAGE: &str = "You are a Manim expert. Generate clean, working Python code for mathematical animations.

STRICT REQUIREMENTS:
1. Start with: from manim import *
2. Use: class GeneratedScene(Scene):
3. Use: def construct(self):
4. Include self.play() and self.wait()
5. Use simple objects: Circle, Square, Text, Line, Arrow, Dot
6. Use basic colors: BLUE, RED, GREEN, WHITE, YELLOW
7. Keep animations simple and working
8. NO complex loops or advanced features
9. Return ONLY the Python code
10. NO markdown formatting or code blocks
11. All strings must be properly quoted
12. No syntax errors allowed";

/// Code-generation instruction levels, each strictly simpler than the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InstructionLevel {
    Standard,
    Simple,
    Minimal,
}

impl InstructionLevel {
    pub fn simpler(self) -> Self {
        match self {
            Self::Standard => Self::Simple,
            Self::Simple | Self::Minimal => Self::Minimal,
        }
    }

    pub fn render(self, enhanced_prompt: &str) -> String {
        match self {
            Self::Standard => standard_code_instruction(enhanced_prompt),
            Self::Simple => simple_code_instruction(enhanced_prompt),
            Self::Minimal => minimal_code_instruction(enhanced_prompt),
        }
    }
}

fn standard_code_instruction(enhanced_prompt: &str) -> String {
    format!(
        "Create a simple Manim animation for: {enhanced_prompt}

Use this exact template structure:

from manim import *

class GeneratedScene(Scene):
    def construct(self):
        # Create simple objects
        obj = Circle(color=BLUE)

        # Simple animations
        self.play(Create(obj))
        self.wait(1)

        # One more animation
        self.play(obj.animate.shift(RIGHT))
        self.wait(1)

Replace the Circle with appropriate objects for: {enhanced_prompt}
Keep it simple and working. Available objects: Circle, Square, Rectangle, Text, MathTex, Line, Arrow, Dot
Available animations: Create, Write, FadeIn, FadeOut, GrowFromCenter
Available colors: BLUE, RED, GREEN, WHITE, YELLOW, BLACK, GRAY

IMPORTANT: Make sure all Text objects use double quotes like Text(\"hello\")
Return only the complete working Python code."
    )
}

fn simple_code_instruction(enhanced_prompt: &str) -> String {
    format!(
        "Generate the simplest possible Manim code for: {enhanced_prompt}

Use exactly this structure:

from manim import *

class GeneratedScene(Scene):
    def construct(self):
        shape = Circle(color=BLUE)
        self.play(Create(shape))
        self.wait(2)

Change only the shape and color to match the request.
Available: Circle, Square, Rectangle, Text(\"hello\")
Colors: BLUE, RED, GREEN, WHITE, YELLOW
Keep it extremely simple. Return only the code."
    )
}

fn minimal_code_instruction(enhanced_prompt: &str) -> String {
    format!(
        "Copy this Manim code exactly, changing only the shape class and the color to suit: {enhanced_prompt}

from manim import *

class GeneratedScene(Scene):
    def construct(self):
        shape = Circle(color=BLUE)
        self.play(Create(shape))
        self.wait(1)

Shapes: Circle, Square, Triangle
Colors: BLUE, RED, GREEN
Return only the code."
    )
}
