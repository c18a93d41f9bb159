//! Baseline markdown pass: hygiene validation and JSX-safety escaping.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Diagnostic, ProcessingError};
use crate::processor::{ProcessContext, Processor, ProcessorOutput};
use crate::segment::{SegmentKind, split_fenced_segments};

/// Options for [`StandardProcessor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StandardOptions {
    /// Whether the processor participates in the pipeline.
    pub enabled: bool,
    /// Execution priority (runs first by default).
    pub priority: i32,
    /// Emit markdown hygiene warnings.
    pub validate_syntax: bool,
    /// Escape braces that would read as JSX expressions downstream.
    pub escape_braces: bool,
    /// Normalize line endings and blank-line runs.
    pub normalize_whitespace: bool,
}

impl Default for StandardOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: 0,
            validate_syntax: true,
            escape_braces: true,
            normalize_whitespace: false,
        }
    }
}

/// Validates superficial markdown hygiene and escapes stray braces outside
/// fenced code so the output parses cleanly as MDX.
#[derive(Debug, Clone, Default)]
pub struct StandardProcessor {
    options: StandardOptions,
}

static HEADER_NO_SPACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#{1,6}[^#\s]").unwrap_or_else(|e| panic!("header pattern: {e}"))
});
static EMPTY_LIST_ITEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:[-*+]|\d+\.)\s*$").unwrap_or_else(|e| panic!("list pattern: {e}"))
});
static LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[([^\]]*)\]\(([^)]*)\)").unwrap_or_else(|e| panic!("link pattern: {e}"))
});
static TRAILING_WS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]+\n").unwrap_or_else(|e| panic!("trailing ws pattern: {e}")));
static BLANK_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{3,}").unwrap_or_else(|e| panic!("blank run pattern: {e}")));

impl StandardProcessor {
    /// Create the processor with the given options.
    pub fn new(options: StandardOptions) -> Self {
        Self { options }
    }

    fn validate(&self, content: &str, ctx: &ProcessContext<'_>) -> Vec<Diagnostic> {
        let mut warnings = Vec::new();
        let mut warn = |message: String, line: usize| {
            warnings.push(
                Diagnostic::new(message)
                    .with_processor(self.name())
                    .with_file(ctx.source_file)
                    .with_line(line),
            );
        };

        for (idx, line) in content.lines().enumerate() {
            let line_number = idx + 1;

            if HEADER_NO_SPACE.is_match(line) {
                warn(
                    "header should have a space after the # markers".to_string(),
                    line_number,
                );
            }

            if EMPTY_LIST_ITEM.is_match(line) {
                warn("empty list item detected".to_string(), line_number);
            }

            for caps in LINK.captures_iter(line) {
                let (Some(whole), Some(url)) = (caps.get(0), caps.get(2)) else {
                    continue;
                };
                if !url.as_str().trim().is_empty() {
                    continue;
                }
                let is_image = whole.start() > 0 && line.as_bytes()[whole.start() - 1] == b'!';
                if is_image {
                    warn("empty image URL detected".to_string(), line_number);
                } else {
                    warn("empty link URL detected".to_string(), line_number);
                }
            }
        }

        if content.matches("```").count() % 2 != 0 {
            warnings.push(
                Diagnostic::new("unclosed code block detected")
                    .with_processor(self.name())
                    .with_file(ctx.source_file),
            );
        }
        if content.matches("~~~").count() % 2 != 0 {
            warnings.push(
                Diagnostic::new("unclosed tilde code block detected")
                    .with_processor(self.name())
                    .with_file(ctx.source_file),
            );
        }

        warnings
    }
}

/// Normalize line endings, strip trailing whitespace, and collapse blank-line
/// runs down to one empty line, ending the content with a single newline.
pub fn normalize_whitespace(content: &str) -> String {
    let unified = content.replace("\r\n", "\n").replace('\r', "\n");
    let stripped = TRAILING_WS.replace_all(&unified, "\n");
    let collapsed = BLANK_RUN.replace_all(&stripped, "\n\n");
    let mut out = collapsed.trim_end_matches('\n').to_string();
    out.push('\n');
    out
}

/// Escape `{` and `}` that would be parsed as JSX expression delimiters.
///
/// A `{` immediately followed by an identifier-start character is assumed to
/// open an intentional expression and is left alone; likewise a `}`
/// immediately preceded by an identifier character. This heuristic is
/// best-effort by design.
pub fn escape_stray_braces(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev: Option<char> = None;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                let next_is_ident = chars
                    .peek()
                    .is_some_and(|n| n.is_ascii_alphabetic() || *n == '_' || *n == '$');
                if next_is_ident {
                    out.push('{');
                } else {
                    out.push_str("\\{");
                }
            }
            '}' => {
                let prev_is_ident =
                    prev.is_some_and(|p| p.is_ascii_alphanumeric() || p == '_' || p == '$');
                if prev_is_ident {
                    out.push('}');
                } else {
                    out.push_str("\\}");
                }
            }
            _ => out.push(c),
        }
        prev = Some(c);
    }

    out
}

impl Processor for StandardProcessor {
    fn name(&self) -> &'static str {
        "standard"
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
        let mut output = ProcessorOutput::unchanged(content);

        if self.options.validate_syntax {
            output.warnings = self.validate(content, ctx);
        }

        if self.options.normalize_whitespace {
            output.content = normalize_whitespace(&output.content);
        }

        if self.options.escape_braces {
            output.content = split_fenced_segments(&output.content)
                .into_iter()
                .map(|segment| match segment.kind {
                    SegmentKind::Code => segment.text,
                    SegmentKind::Text => escape_stray_braces(&segment.text),
                })
                .collect();
        }

        log::debug!(
            "standard pass finished for {} ({} warnings)",
            ctx.source_file.display(),
            output.warnings.len()
        );
        Ok(output)
    }
}
