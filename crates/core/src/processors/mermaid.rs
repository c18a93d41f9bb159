//! Transforms fenced `mermaid` code blocks into component invocations.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Diagnostic, ProcessingError};
use crate::jsx::escape_template_literal;
use crate::processor::{ProcessContext, Processor, ProcessorOutput};

/// Diagram-type keywords recognized during validation.
pub const MERMAID_KEYWORDS: [&str; 19] = [
    "graph",
    "flowchart",
    "sequenceDiagram",
    "classDiagram",
    "stateDiagram",
    "erDiagram",
    "journey",
    "gantt",
    "pie",
    "gitGraph",
    "mindmap",
    "timeline",
    "quadrantChart",
    "requirementDiagram",
    "c4Context",
    "c4Container",
    "c4Component",
    "c4Dynamic",
    "c4Deployment",
];

/// Options for [`MermaidProcessor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MermaidOptions {
    /// Whether the processor participates in the pipeline.
    pub enabled: bool,
    /// Execution priority.
    pub priority: i32,
    /// Component name emitted for valid diagrams.
    pub component_name: String,
    /// Run keyword and structural validation before emitting.
    pub validate_syntax: bool,
    /// Keep invalid blocks verbatim instead of emitting an error placeholder.
    pub preserve_code_block: bool,
    /// Carry trailing opening-fence text as a `title` prop.
    pub add_title: bool,
}

impl Default for MermaidOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: 10,
            component_name: "Mermaid".to_string(),
            validate_syntax: true,
            preserve_code_block: false,
            add_title: true,
        }
    }
}

/// One discovered mermaid block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MermaidBlock {
    /// Byte offset of the opening fence line.
    pub start: usize,
    /// Byte offset just past the closing fence line (or EOF).
    pub end: usize,
    /// 1-indexed line of the opening fence.
    pub line: usize,
    /// Fence marker used to open the block (``` or ~~~).
    pub fence: String,
    /// Optional title text trailing the `mermaid` keyword.
    pub title: Option<String>,
    /// Diagram source between the fences.
    pub code: String,
    /// False when EOF was reached before a closing fence.
    pub closed: bool,
}

static OPEN_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(\s*)(```|~~~)\s*mermaid\s*(.*)$")
        .unwrap_or_else(|e| panic!("mermaid open pattern: {e}"))
});
static CLOSE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(```|~~~)\s*$").unwrap_or_else(|e| panic!("mermaid close pattern: {e}"))
});
static SPACED_NODE_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*([A-Za-z0-9_-]+(?:[ \t]+[A-Za-z0-9_-]+)+)\[")
        .unwrap_or_else(|e| panic!("node id pattern: {e}"))
});

/// Find every fenced mermaid block in `content`.
///
/// A block whose closing fence is missing still yields an entry spanning the
/// remaining lines, with `closed == false`.
pub fn find_mermaid_blocks(content: &str) -> Vec<MermaidBlock> {
    struct Open {
        start: usize,
        line: usize,
        fence: String,
        title: Option<String>,
        code_lines: Vec<String>,
    }

    let mut blocks = Vec::new();
    let mut open: Option<Open> = None;
    let mut pos = 0usize;

    for (idx, line) in content.split('\n').enumerate() {
        let line_end = (pos + line.len() + 1).min(content.len());

        match open.take() {
            None => {
                if let Some(caps) = OPEN_FENCE.captures(line) {
                    let fence = caps.get(2).map(|m| m.as_str()).unwrap_or("```");
                    let title = caps
                        .get(3)
                        .map(|m| m.as_str().trim())
                        .filter(|t| !t.is_empty())
                        .map(|t| t.to_string());
                    open = Some(Open {
                        start: pos,
                        line: idx + 1,
                        fence: fence.to_string(),
                        title,
                        code_lines: Vec::new(),
                    });
                }
            }
            Some(mut block) => {
                let closes = CLOSE_FENCE
                    .captures(line)
                    .and_then(|caps| caps.get(1).map(|m| m.as_str() == block.fence))
                    .unwrap_or(false);
                if closes {
                    blocks.push(MermaidBlock {
                        start: block.start,
                        end: line_end,
                        line: block.line,
                        fence: block.fence,
                        title: block.title,
                        code: block.code_lines.join("\n"),
                        closed: true,
                    });
                } else {
                    block.code_lines.push(line.to_string());
                    open = Some(block);
                }
            }
        }

        pos += line.len() + 1;
    }

    if let Some(block) = open {
        blocks.push(MermaidBlock {
            start: block.start,
            end: content.len(),
            line: block.line,
            fence: block.fence,
            title: block.title,
            code: block.code_lines.join("\n"),
            closed: false,
        });
    }

    blocks
}

/// The first recognized diagram-type keyword in `code`, if any.
pub fn diagram_type(code: &str) -> Option<&'static str> {
    let lowered = code.to_lowercase();
    MERMAID_KEYWORDS
        .iter()
        .find(|keyword| lowered.contains(&keyword.to_lowercase()))
        .copied()
}

/// Summary statistics over the mermaid blocks in a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MermaidStats {
    /// Number of blocks found.
    pub total_blocks: usize,
    /// Block count per recognized diagram type (`unknown` otherwise).
    pub diagram_types: HashMap<String, usize>,
    /// Mean diagram source length in bytes.
    pub average_code_length: usize,
}

/// Collect [`MermaidStats`] for `content`.
pub fn mermaid_stats(content: &str) -> MermaidStats {
    let blocks = find_mermaid_blocks(content);
    let mut diagram_types: HashMap<String, usize> = HashMap::new();
    let mut total_len = 0usize;
    for block in &blocks {
        let kind = diagram_type(&block.code).unwrap_or("unknown");
        *diagram_types.entry(kind.to_string()).or_insert(0) += 1;
        total_len += block.code.len();
    }
    MermaidStats {
        total_blocks: blocks.len(),
        diagram_types,
        average_code_length: if blocks.is_empty() {
            0
        } else {
            total_len / blocks.len()
        },
    }
}

/// Structural validation failures for a diagram, empty when valid.
fn structural_errors(code: &str) -> Vec<String> {
    let mut errors = Vec::new();

    for (open, close, label) in [
        ('[', ']', "square brackets"),
        ('(', ')', "parentheses"),
        ('{', '}', "curly braces"),
    ] {
        let opens = code.chars().filter(|&c| c == open).count();
        let closes = code.chars().filter(|&c| c == close).count();
        if opens != closes {
            errors.push(format!("unmatched {label}"));
        }
    }

    for caps in SPACED_NODE_ID.captures_iter(code) {
        if let Some(id) = caps.get(1) {
            errors.push(format!("invalid node ID '{}' contains spaces", id.as_str()));
        }
    }

    errors
}

/// Replaces valid mermaid blocks with a component invocation embedding the
/// escaped diagram source; invalid blocks become an inline error placeholder
/// unless `preserve_code_block` keeps them verbatim.
#[derive(Debug, Clone, Default)]
pub struct MermaidProcessor {
    options: MermaidOptions,
}

impl MermaidProcessor {
    /// Create the processor with the given options.
    pub fn new(options: MermaidOptions) -> Self {
        Self { options }
    }

    fn component_syntax(&self, code: &str, title: Option<&str>) -> String {
        let escaped = escape_template_literal(code);
        let mut props = Vec::new();
        if self.options.add_title
            && let Some(title) = title
        {
            props.push(format!("title=\"{}\"", escape_template_literal(title)));
        }
        props.push(format!("code={{`{escaped}`}}"));
        format!("<{} {} />", self.options.component_name, props.join(" "))
    }

    fn error_syntax(&self, code: &str, message: &str) -> String {
        let escaped_code = escape_template_literal(code);
        let escaped_message = escape_template_literal(message);
        format!(
            "<div style={{{{color: '#ff6b6b', padding: '1rem', border: '1px solid #ff6b6b', borderRadius: '4px'}}}}>\n  <strong>Mermaid Error:</strong> {escaped_message}\n  <details style={{{{marginTop: '0.5rem'}}}}>\n    <summary>Show code</summary>\n    <pre style={{{{background: '#f5f5f5', padding: '0.5rem', marginTop: '0.5rem', overflowX: 'auto'}}}}>\n      <code>{{`{escaped_code}`}}</code>\n    </pre>\n  </details>\n</div>"
        )
    }

    /// Validation outcome: `Err` message for structural failures, warnings
    /// for a missing diagram-type keyword.
    fn validate(&self, code: &str) -> Result<Vec<String>, String> {
        let trimmed = code.trim();
        if trimmed.is_empty() {
            return Err("empty mermaid code block".to_string());
        }

        let mut warnings = Vec::new();
        if diagram_type(trimmed).is_none() {
            warnings
                .push("mermaid code does not contain a recognized diagram type".to_string());
        }

        let errors = structural_errors(trimmed);
        if !errors.is_empty() {
            return Err(format!("mermaid syntax errors: {}", errors.join(", ")));
        }

        Ok(warnings)
    }
}

impl Processor for MermaidProcessor {
    fn name(&self) -> &'static str {
        "mermaid"
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
        let blocks = find_mermaid_blocks(content);
        if blocks.is_empty() {
            return Ok(ProcessorOutput::unchanged(content));
        }

        let mut output = ProcessorOutput::default();
        let mut rebuilt = String::with_capacity(content.len());
        let mut cursor = 0usize;

        for block in &blocks {
            rebuilt.push_str(&content[cursor..block.start]);
            cursor = block.end;

            if !block.closed {
                log::warn!(
                    "unclosed mermaid code block in {} at line {}",
                    ctx.source_file.display(),
                    block.line
                );
                output.warnings.push(
                    Diagnostic::new("unclosed mermaid code block")
                        .with_processor(self.name())
                        .with_file(ctx.source_file)
                        .with_line(block.line),
                );
            }

            let validation = if self.options.validate_syntax {
                self.validate(&block.code)
            } else {
                Ok(Vec::new())
            };

            match validation {
                Ok(warnings) => {
                    for message in warnings {
                        output.warnings.push(
                            Diagnostic::new(message)
                                .with_processor(self.name())
                                .with_file(ctx.source_file)
                                .with_line(block.line),
                        );
                    }
                    rebuilt.push_str(&self.component_syntax(&block.code, block.title.as_deref()));
                }
                Err(message) => {
                    output.errors.push(
                        ProcessingError::mermaid(message.clone())
                            .with_processor(self.name())
                            .with_file(ctx.source_file)
                            .with_line(block.line),
                    );
                    if self.options.preserve_code_block {
                        rebuilt.push_str(&content[block.start..block.end]);
                    } else {
                        rebuilt.push_str(&self.error_syntax(&block.code, &message));
                    }
                }
            }
        }

        rebuilt.push_str(&content[cursor..]);
        output.content = rebuilt;

        log::debug!(
            "mermaid pass replaced {} block(s) in {}",
            blocks.len(),
            ctx.source_file.display()
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::frontmatter::Frontmatter;
    use crate::jsx::unescape_template_literal;

    fn run(content: &str) -> ProcessorOutput {
        let frontmatter = Frontmatter::new();
        let ctx = ProcessContext {
            source_file: Path::new("post.md"),
            project_root: Path::new("."),
            frontmatter: &frontmatter,
        };
        MermaidProcessor::default().process(content, &ctx).unwrap()
    }

    #[test]
    fn finds_block_with_title_and_positions() {
        let content = "intro\n```mermaid Flow Title\ngraph TD\nA-->B\n```\noutro\n";
        let blocks = find_mermaid_blocks(content);
        assert_eq!(blocks.len(), 1);
        let block = &blocks[0];
        assert_eq!(block.line, 2);
        assert_eq!(block.title.as_deref(), Some("Flow Title"));
        assert_eq!(block.code, "graph TD\nA-->B");
        assert!(block.closed);
        assert_eq!(&content[block.start..block.end], "```mermaid Flow Title\ngraph TD\nA-->B\n```\n");
    }

    #[test]
    fn fence_marker_must_match_to_close() {
        let content = "~~~mermaid\ngraph TD\n```\nA-->B\n~~~\n";
        let blocks = find_mermaid_blocks(content);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].code, "graph TD\n```\nA-->B");
    }

    #[test]
    fn info_string_is_case_insensitive() {
        let blocks = find_mermaid_blocks("```MERMAID\ngraph TD\n```\n");
        assert_eq!(blocks.len(), 1);
    }

    #[test]
    fn embedded_source_round_trips_through_escaping() {
        let output = run("```mermaid\ngraph TD\nA-->B\n```\n");
        let content = output.content;
        let start = content.find("code={`").map(|i| i + "code={`".len());
        let end = content.rfind("`}");
        let (Some(start), Some(end)) = (start, end) else {
            panic!("component invocation missing: {content}");
        };
        assert_eq!(unescape_template_literal(&content[start..end]), "graph TD\nA-->B");
    }

    #[test]
    fn unbalanced_brackets_produce_error_placeholder() {
        let output = run("```mermaid\ngraph TD\nA[Start-->B\n```\n");
        assert_eq!(output.errors.len(), 1);
        assert!(output.content.contains("Mermaid Error:"), "{}", output.content);
    }

    #[test]
    fn preserve_code_block_keeps_invalid_source() {
        let options = MermaidOptions {
            preserve_code_block: true,
            ..MermaidOptions::default()
        };
        let frontmatter = Frontmatter::new();
        let ctx = ProcessContext {
            source_file: Path::new("post.md"),
            project_root: Path::new("."),
            frontmatter: &frontmatter,
        };
        let content = "```mermaid\ngraph TD\nA[Start-->B\n```\n";
        let output = MermaidProcessor::new(options).process(content, &ctx).unwrap();
        assert_eq!(output.errors.len(), 1);
        assert_eq!(output.content, content);
    }

    #[test]
    fn missing_keyword_is_a_warning_not_an_error() {
        let output = run("```mermaid\nA-->B\n```\n");
        assert!(output.errors.is_empty());
        assert!(
            output
                .warnings
                .iter()
                .any(|w| w.message.contains("diagram type"))
        );
        assert!(output.content.contains("<Mermaid"));
    }

    #[test]
    fn unclosed_block_still_emits_component_with_warning() {
        let output = run("```mermaid\ngraph TD\nA-->B");
        assert!(
            output
                .warnings
                .iter()
                .any(|w| w.message.contains("unclosed mermaid"))
        );
        assert!(output.content.contains("<Mermaid"), "{}", output.content);
        assert!(output.content.contains("A--\\>B") || output.content.contains("A-->B"));
    }

    #[test]
    fn diagram_type_classification() {
        assert_eq!(diagram_type("graph TD\nA-->B"), Some("graph"));
        assert_eq!(diagram_type("sequencediagram\nAlice->>Bob: hi"), Some("sequenceDiagram"));
        assert_eq!(diagram_type("nothing here"), None);
    }

    #[test]
    fn stats_count_blocks_by_type() {
        let content = "```mermaid\ngraph TD\nA-->B\n```\n\n```mermaid\npie\n\"a\": 1\n```\n";
        let stats = mermaid_stats(content);
        assert_eq!(stats.total_blocks, 2);
        assert_eq!(stats.diagram_types.get("graph"), Some(&1));
        assert_eq!(stats.diagram_types.get("pie"), Some(&1));
    }
}
