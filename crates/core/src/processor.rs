//! The processor contract shared by all transformation passes.

use std::path::Path;

use crate::error::{Diagnostic, ProcessingError};
use crate::frontmatter::Frontmatter;

/// Read-only context handed to each processor invocation.
#[derive(Debug, Clone, Copy)]
pub struct ProcessContext<'a> {
    /// Path of the markdown file being transformed.
    pub source_file: &'a Path,
    /// Project root used for resolving root-relative asset URLs.
    pub project_root: &'a Path,
    /// Frontmatter decoded from the file, for processors that consult it.
    pub frontmatter: &'a Frontmatter,
}

/// The result of one processor pass.
///
/// Processors report domain-level findings through `warnings`/`errors`
/// rather than failing; the transformer concatenates the lists across the
/// chain.
#[derive(Debug, Default)]
pub struct ProcessorOutput {
    /// The (possibly rewritten) content to feed to the next processor.
    pub content: String,
    /// Non-fatal findings.
    pub warnings: Vec<Diagnostic>,
    /// Findings that mark the file's compile as failed.
    pub errors: Vec<ProcessingError>,
}

impl ProcessorOutput {
    /// Pass content through unchanged.
    pub fn unchanged(content: &str) -> Self {
        Self {
            content: content.to_string(),
            ..Self::default()
        }
    }

    /// Wrap rewritten content with no findings.
    pub fn rewritten(content: String) -> Self {
        Self {
            content,
            ..Self::default()
        }
    }
}

/// A single transformation pass over one file's body.
///
/// `process` must not fail for malformed domain syntax — that is recorded in
/// the output's warning/error lists. `Err` is reserved for unexpected
/// failures and is wrapped at the transformer boundary.
pub trait Processor: Send + Sync {
    /// Unique registry key for this processor.
    fn name(&self) -> &'static str;

    /// Execution order: ascending priority runs earlier, ties break by
    /// registration order.
    fn priority(&self) -> i32;

    /// Whether this processor participates in the pipeline.
    fn enabled(&self) -> bool;

    /// Run the pass over `content`.
    fn process(
        &self,
        content: &str,
        ctx: &ProcessContext<'_>,
    ) -> Result<ProcessorOutput, ProcessingError>;
}
