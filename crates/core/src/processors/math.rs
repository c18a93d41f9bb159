//! Transforms LaTeX math spans into renderer-ready inline/display elements.
//!
//! Scanning is line-local and escape-aware: display spans are claimed first,
//! then inline spans that do not overlap them. A delimiter preceded by an odd
//! number of backslashes is literal text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Diagnostic, ProcessingError};
use crate::jsx::escape_template_literal;
use crate::processor::{ProcessContext, Processor, ProcessorOutput};

/// LaTeX commands accepted without an "unknown command" warning.
pub const LATEX_COMMANDS: [&str; 43] = [
    "frac", "sqrt", "sum", "int", "lim", "sin", "cos", "tan", "log", "ln", "alpha", "beta",
    "gamma", "delta", "epsilon", "theta", "lambda", "mu", "pi", "sigma", "phi", "omega", "infty",
    "partial", "nabla", "cdot", "times", "div", "pm", "mp", "leq", "geq", "neq", "approx", "equiv",
    "left", "right", "begin", "end", "text", "mathrm", "mathbf", "mathit",
];

/// Options for [`MathProcessor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MathOptions {
    /// Whether the processor participates in the pipeline.
    pub enabled: bool,
    /// Execution priority.
    pub priority: i32,
    /// Opening/closing delimiters for inline math.
    pub inline_delimiters: (String, String),
    /// Opening/closing delimiters for display math.
    pub display_delimiters: (String, String),
    /// Run structural validation before emitting.
    pub validate_latex: bool,
}

impl Default for MathOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: 20,
            inline_delimiters: ("$".to_string(), "$".to_string()),
            display_delimiters: ("$$".to_string(), "$$".to_string()),
            validate_latex: true,
        }
    }
}

/// Inline vs display span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathKind {
    /// Span delimited by the inline pair.
    Inline,
    /// Span delimited by the display pair.
    Display,
}

/// One discovered math span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MathSpan {
    /// Byte offset of the opening delimiter.
    pub start: usize,
    /// Byte offset just past the closing delimiter.
    pub end: usize,
    /// 1-indexed line number.
    pub line: usize,
    /// Whether this is an inline or display span.
    pub kind: MathKind,
    /// Expression between the delimiters, trimmed.
    pub expression: String,
}

/// True when the character at `pos` is escaped by an odd run of backslashes.
fn is_escaped(line: &str, pos: usize) -> bool {
    let bytes = line.as_bytes();
    let mut count = 0usize;
    let mut i = pos;
    while i > 0 && bytes[i - 1] == b'\\' {
        count += 1;
        i -= 1;
    }
    count % 2 == 1
}

/// Scan one line for spans delimited by `open`/`close`.
///
/// The expression may contain backslash-escaped characters; an unescaped
/// occurrence of the closing delimiter's first character that does not start
/// the delimiter aborts the candidate (mirroring non-greedy matching that
/// forbids bare delimiter characters inside the span).
fn find_delimited(line: &str, open: &str, close: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    if open.is_empty() || close.is_empty() {
        return spans;
    }
    let bytes = line.as_bytes();
    let close_first = close.as_bytes()[0];
    let mut i = 0usize;

    while i + open.len() <= line.len() {
        if !line.is_char_boundary(i) || !line[i..].starts_with(open) || is_escaped(line, i) {
            i += 1;
            continue;
        }

        let mut j = i + open.len();
        let mut close_at = None;
        while j < line.len() {
            let b = bytes[j];
            if b == b'\\' {
                j += 2;
                continue;
            }
            if b == close_first {
                if line[j..].starts_with(close) {
                    close_at = Some(j);
                }
                break;
            }
            j += 1;
        }

        match close_at {
            Some(j) => {
                spans.push((i, j + close.len()));
                i = j + close.len();
            }
            None => i += open.len(),
        }
    }

    spans
}

/// Find every math span in `content`, display spans claiming overlapping
/// ranges before inline spans are considered.
pub fn find_math_spans(content: &str, options: &MathOptions) -> Vec<MathSpan> {
    let mut spans = Vec::new();
    let (display_open, display_close) = &options.display_delimiters;
    let (inline_open, inline_close) = &options.inline_delimiters;
    // Identical pairs would double-process every display span.
    let scan_inline = inline_open != display_open;

    let mut pos = 0usize;
    for (idx, line) in content.split('\n').enumerate() {
        let line_number = idx + 1;

        let display: Vec<(usize, usize)> = find_delimited(line, display_open, display_close);
        for &(start, end) in &display {
            spans.push(MathSpan {
                start: pos + start,
                end: pos + end,
                line: line_number,
                kind: MathKind::Display,
                expression: line[start + display_open.len()..end - display_close.len()]
                    .trim()
                    .to_string(),
            });
        }

        if scan_inline {
            for (start, end) in find_delimited(line, inline_open, inline_close) {
                let overlaps = display.iter().any(|&(d_start, d_end)| {
                    (start >= d_start && start < d_end) || (end > d_start && end <= d_end)
                });
                if overlaps {
                    continue;
                }
                spans.push(MathSpan {
                    start: pos + start,
                    end: pos + end,
                    line: line_number,
                    kind: MathKind::Inline,
                    expression: line[start + inline_open.len()..end - inline_close.len()]
                        .trim()
                        .to_string(),
                });
            }
        }

        pos += line.len() + 1;
    }

    spans.sort_by_key(|span| span.start);
    spans
}

static LATEX_COMMAND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\([a-zA-Z]+)").unwrap_or_else(|e| panic!("latex command pattern: {e}"))
});

/// Outcome of validating one expression.
#[derive(Debug, Default)]
struct LatexValidation {
    error: Option<String>,
    warnings: Vec<String>,
}

/// Structural validation: bracket balance per type (ignoring escaped
/// characters), empty `\frac{}`/`\sqrt{}`, unknown commands, and unescaped
/// special characters.
fn validate_latex(expression: &str) -> LatexValidation {
    let mut result = LatexValidation::default();

    let trimmed = expression.trim();
    if trimmed.is_empty() {
        result.error = Some("empty LaTeX expression".to_string());
        return result;
    }

    for (open, close, label) in [
        ('{', '}', "curly braces"),
        ('[', ']', "square brackets"),
        ('(', ')', "parentheses"),
    ] {
        let mut count = 0i32;
        let mut escaped = false;
        for c in trimmed.chars() {
            if escaped {
                escaped = false;
                continue;
            }
            if c == '\\' {
                escaped = true;
                continue;
            }
            if c == open {
                count += 1;
            } else if c == close {
                count -= 1;
                if count < 0 {
                    result.error = Some(format!("unmatched closing {label}"));
                    return result;
                }
            }
        }
        if count != 0 {
            result.error = Some(format!("unmatched {label}"));
            return result;
        }
    }

    if trimmed.contains("\\frac{}") {
        result
            .warnings
            .push("empty fraction numerator or denominator".to_string());
    }
    if trimmed.contains("\\sqrt{}") {
        result.warnings.push("empty square root".to_string());
    }

    for caps in LATEX_COMMAND.captures_iter(trimmed) {
        if let Some(command) = caps.get(1) {
            let name = command.as_str();
            if !LATEX_COMMANDS.contains(&name) {
                result
                    .warnings
                    .push(format!("unknown LaTeX command: \\{name}"));
            }
        }
    }

    for special in ['&', '%', '#'] {
        if trimmed.contains(special) && !trimmed.contains(&format!("\\{special}")) {
            result
                .warnings
                .push(format!("unescaped special character: {special}"));
        }
    }

    result
}

/// Rewrites accepted math spans into inline `<span>`/display `<div>` elements
/// carrying the escaped expression as a raw-string template value.
#[derive(Debug, Clone, Default)]
pub struct MathProcessor {
    options: MathOptions,
}

impl MathProcessor {
    /// Create the processor with the given options.
    pub fn new(options: MathOptions) -> Self {
        Self { options }
    }

    fn render(&self, span: &MathSpan) -> String {
        let escaped = escape_template_literal(&span.expression);
        match span.kind {
            MathKind::Display => format!(
                "\n\n<div className=\"math-display\">\n  {{String.raw`{escaped}`}}\n</div>\n\n"
            ),
            MathKind::Inline => {
                format!("<span className=\"math-inline\">{{String.raw`{escaped}`}}</span>")
            }
        }
    }
}

impl Processor for MathProcessor {
    fn name(&self) -> &'static str {
        "math"
    }

    fn priority(&self) -> i32 {
        self.options.priority
    }

    fn enabled(&self) -> bool {
        self.options.enabled
    }

    fn process(
        &self,
        content: &str,
        ctx: &ProcessContext<'_>,
    ) -> Result<ProcessorOutput, ProcessingError> {
        let spans = find_math_spans(content, &self.options);
        if spans.is_empty() {
            return Ok(ProcessorOutput::unchanged(content));
        }

        let mut output = ProcessorOutput::default();
        let mut rebuilt = String::with_capacity(content.len());
        let mut cursor = 0usize;

        for span in &spans {
            if span.start < cursor {
                continue;
            }

            if self.options.validate_latex {
                let validation = validate_latex(&span.expression);
                for message in validation.warnings {
                    output.warnings.push(
                        Diagnostic::new(message)
                            .with_processor(self.name())
                            .with_file(ctx.source_file)
                            .with_line(span.line),
                    );
                }
                if let Some(message) = validation.error {
                    // Invalid expressions stay as literal text; math failures
                    // never block the compile.
                    output.warnings.push(
                        Diagnostic::new(format!("failed to process math expression: {message}"))
                            .with_processor(self.name())
                            .with_file(ctx.source_file)
                            .with_line(span.line),
                    );
                    continue;
                }
            }

            rebuilt.push_str(&content[cursor..span.start]);
            rebuilt.push_str(&self.render(span));
            cursor = span.end;
        }

        rebuilt.push_str(&content[cursor..]);
        output.content = rebuilt;

        log::debug!(
            "math pass handled {} span(s) in {}",
            spans.len(),
            ctx.source_file.display()
        );
        Ok(output)
    }
}
