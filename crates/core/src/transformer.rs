//! Orchestrates the processor chain over one file's content.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::{Diagnostic, ProcessingError};
use crate::frontmatter::{self, Frontmatter};
use crate::jsx;
use crate::processor::{ProcessContext, Processor};

/// Options governing a [`ContentTransformer`].
#[derive(Debug, Clone)]
pub struct TransformOptions {
    /// Keep running remaining processors after one fails unexpectedly.
    pub continue_on_error: bool,
    /// Run the best-effort JSX output validation after the chain.
    pub validate_output: bool,
    /// Bodies larger than this many bytes are transformed in line-aligned
    /// chunks. Zero disables chunking.
    pub large_file_threshold: usize,
    /// Target chunk size for the chunked path.
    pub chunk_size: usize,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            continue_on_error: true,
            validate_output: true,
            large_file_threshold: 1024 * 1024,
            chunk_size: 512 * 1024,
        }
    }
}

/// Result of transforming one file.
#[derive(Debug)]
pub struct TransformOutcome {
    /// Re-assembled document: encoded frontmatter plus transformed body.
    pub content: String,
    /// The frontmatter carried through unchanged.
    pub frontmatter: Frontmatter,
    /// True iff no errors were recorded (warnings do not count).
    pub success: bool,
    /// Errors accumulated across the chain, in order.
    pub errors: Vec<ProcessingError>,
    /// Warnings accumulated across the chain, in order.
    pub warnings: Vec<Diagnostic>,
    /// Wall-clock time spent in each processor, in execution order.
    pub processor_timings: Vec<(String, Duration)>,
}

/// Snapshot of the transformer's registered processors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformerStats {
    /// All registered processor names.
    pub registered: Vec<String>,
    /// Enabled processors in execution order.
    pub enabled: Vec<String>,
}

/// Runs an ordered pipeline of processors over markdown content and
/// re-assembles frontmatter plus body.
pub struct ContentTransformer {
    processors: Vec<Box<dyn Processor>>,
    options: TransformOptions,
    project_root: PathBuf,
}

impl ContentTransformer {
    /// Create an empty transformer rooted at `project_root`.
    pub fn new(options: TransformOptions, project_root: impl Into<PathBuf>) -> Self {
        Self {
            processors: Vec::new(),
            options,
            project_root: project_root.into(),
        }
    }

    /// Register a processor. Execution order is ascending priority; ties run
    /// in registration order.
    pub fn add_processor(&mut self, processor: Box<dyn Processor>) {
        log::debug!(
            "registered processor {} (priority {})",
            processor.name(),
            processor.priority()
        );
        self.processors.push(processor);
    }

    /// Remove a processor by name. Returns whether one was removed.
    pub fn remove_processor(&mut self, name: &str) -> bool {
        let before = self.processors.len();
        self.processors.retain(|p| p.name() != name);
        before != self.processors.len()
    }

    /// Enabled processors sorted by (priority, registration order).
    fn ordered_processors(&self) -> Vec<&dyn Processor> {
        let mut enabled: Vec<&dyn Processor> = self
            .processors
            .iter()
            .filter(|p| p.enabled())
            .map(|p| p.as_ref())
            .collect();
        enabled.sort_by_key(|p| p.priority());
        enabled
    }

    /// Registered/enabled processor names.
    pub fn stats(&self) -> TransformerStats {
        TransformerStats {
            registered: self.processors.iter().map(|p| p.name().to_string()).collect(),
            enabled: self
                .ordered_processors()
                .iter()
                .map(|p| p.name().to_string())
                .collect(),
        }
    }

    /// Transform a full document: decode frontmatter, run the chain over the
    /// body, validate, and re-encode.
    pub fn transform(&self, file_path: &Path, raw: &str) -> TransformOutcome {
        let decoded = frontmatter::decode(raw);
        self.transform_parts(file_path, decoded.frontmatter, &decoded.body)
    }

    /// Transform an already-split document.
    pub fn transform_parts(
        &self,
        file_path: &Path,
        frontmatter: Frontmatter,
        body: &str,
    ) -> TransformOutcome {
        let chunked = self.options.large_file_threshold > 0
            && body.len() > self.options.large_file_threshold;

        let (content, errors, mut warnings, processor_timings) = if chunked {
            log::debug!(
                "transforming {} in chunks ({} bytes)",
                file_path.display(),
                body.len()
            );
            self.run_chain_chunked(file_path, &frontmatter, body)
        } else {
            self.run_chain(file_path, &frontmatter, body)
        };

        if self.options.validate_output {
            for warning in jsx::validate_output(&content) {
                warnings.push(warning.with_file(file_path));
            }
        }

        let assembled = frontmatter::encode(&frontmatter, &content);
        let success = errors.is_empty();

        if success {
            log::debug!(
                "transformed {} ({} warnings)",
                file_path.display(),
                warnings.len()
            );
        } else {
            log::warn!(
                "transformation of {} recorded {} error(s)",
                file_path.display(),
                errors.len()
            );
        }
        TransformOutcome {
            content: assembled,
            frontmatter,
            success,
            errors,
            warnings,
            processor_timings,
        }
    }

    /// Run the processor chain over one body, feeding each processor's
    /// output into the next.
    #[allow(clippy::type_complexity)]
    fn run_chain(
        &self,
        file_path: &Path,
        frontmatter: &Frontmatter,
        body: &str,
    ) -> (
        String,
        Vec<ProcessingError>,
        Vec<Diagnostic>,
        Vec<(String, Duration)>,
    ) {
        let ctx = ProcessContext {
            source_file: file_path,
            project_root: &self.project_root,
            frontmatter,
        };

        let mut content = body.to_string();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut timings = Vec::new();

        for processor in self.ordered_processors() {
            let started = Instant::now();
            match processor.process(&content, &ctx) {
                Ok(output) => {
                    content = output.content;
                    warnings.extend(output.warnings);
                    errors.extend(output.errors);
                }
                Err(err) => {
                    // Unexpected failure: wrap, record, and keep the
                    // pre-failure content for this stage.
                    let wrapped = err
                        .with_processor(processor.name())
                        .with_file(file_path.to_path_buf());
                    log::warn!("processor {} failed: {}", processor.name(), wrapped);
                    errors.push(wrapped);
                    if !self.options.continue_on_error {
                        timings.push((processor.name().to_string(), started.elapsed()));
                        break;
                    }
                }
            }
            timings.push((processor.name().to_string(), started.elapsed()));
        }

        (content, errors, warnings, timings)
    }

    /// Chunked variant for oversized bodies: each line-aligned chunk runs
    /// through the full chain, outputs are concatenated.
    #[allow(clippy::type_complexity)]
    fn run_chain_chunked(
        &self,
        file_path: &Path,
        frontmatter: &Frontmatter,
        body: &str,
    ) -> (
        String,
        Vec<ProcessingError>,
        Vec<Diagnostic>,
        Vec<(String, Duration)>,
    ) {
        let mut content = String::with_capacity(body.len());
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut timings = Vec::new();

        for chunk in split_line_chunks(body, self.options.chunk_size) {
            let (chunk_content, chunk_errors, chunk_warnings, chunk_timings) =
                self.run_chain(file_path, frontmatter, chunk);
            content.push_str(&chunk_content);
            errors.extend(chunk_errors);
            warnings.extend(chunk_warnings);
            timings.extend(chunk_timings);
        }

        (content, errors, warnings, timings)
    }
}

/// Split `body` into chunks of at least `chunk_size` bytes, never breaking
/// inside a line.
pub fn split_line_chunks(body: &str, chunk_size: usize) -> Vec<&str> {
    if chunk_size == 0 || body.len() <= chunk_size {
        return vec![body];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut current = 0usize;

    for line in body.split_inclusive('\n') {
        current += line.len();
        if current - start >= chunk_size {
            chunks.push(&body[start..current]);
            start = current;
        }
    }
    if start < body.len() {
        chunks.push(&body[start..]);
    }
    if chunks.is_empty() {
        chunks.push(body);
    }

    chunks
}
