//! The markdown-to-MDX compiler: scan, transform in parallel, write, report.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mdflow_core::transformer::{ContentTransformer, TransformOptions, TransformerStats};
use mdflow_core::{
    Diagnostic, ImageProcessor, MathProcessor, MermaidProcessor, ProcessingError,
    StandardProcessor, TableProcessor,
};
use rayon::prelude::*;

use crate::config::Config;
use crate::hot_reload::{ChangeKind, HotReloadManager};
use crate::scanner::{FileRecord, FileStatus, Scanner, output_path_for};
use crate::watch::{WatchEvent, WatchSubscription};

/// Terminal state of one file in a compile run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// Transformed and written without errors.
    Success,
    /// Transformed with errors, or the write failed.
    Error,
    /// Not reprocessed (unchanged input or up-to-date output).
    Skipped,
}

/// Per-file result of a compile run.
#[derive(Debug)]
pub struct FileOutcome {
    /// Source path.
    pub source: PathBuf,
    /// Output path.
    pub output: PathBuf,
    /// Terminal state.
    pub status: OutcomeStatus,
    /// Errors recorded for this file.
    pub errors: Vec<ProcessingError>,
    /// Warnings recorded for this file.
    pub warnings: Vec<Diagnostic>,
    /// Wall-clock time spent on this file.
    pub duration: Duration,
    /// Input body size in bytes.
    pub input_bytes: usize,
    /// Output document size in bytes.
    pub output_bytes: usize,
}

/// Aggregate result of one compile run.
///
/// `succeeded + failed + skipped == total` always holds.
#[derive(Debug)]
pub struct Summary {
    /// Number of files considered.
    pub total: usize,
    /// Files compiled without errors.
    pub succeeded: usize,
    /// Files that recorded errors.
    pub failed: usize,
    /// Files skipped as up-to-date.
    pub skipped: usize,
    /// Total warnings across all files.
    pub warnings: usize,
    /// Wall-clock time for the whole run.
    pub elapsed: Duration,
    /// Per-file outcomes.
    pub files: Vec<FileOutcome>,
}

impl Summary {
    fn from_outcomes(files: Vec<FileOutcome>, elapsed: Duration) -> Self {
        let mut succeeded = 0;
        let mut failed = 0;
        let mut skipped = 0;
        let mut warnings = 0;
        for outcome in &files {
            match outcome.status {
                OutcomeStatus::Success => succeeded += 1,
                OutcomeStatus::Error => failed += 1,
                OutcomeStatus::Skipped => skipped += 1,
            }
            warnings += outcome.warnings.len();
        }
        Self {
            total: files.len(),
            succeeded,
            failed,
            skipped,
            warnings,
            elapsed,
            files,
        }
    }

    /// True when no file recorded errors.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Mean per-file processing time in milliseconds, skipped files excluded.
    pub fn average_ms(&self) -> f64 {
        let processed: Vec<&FileOutcome> = self
            .files
            .iter()
            .filter(|f| f.status != OutcomeStatus::Skipped)
            .collect();
        if processed.is_empty() {
            return 0.0;
        }
        let total: f64 = processed
            .iter()
            .map(|f| f.duration.as_secs_f64() * 1000.0)
            .sum();
        total / processed.len() as f64
    }
}

/// Snapshot of compiler state for build-tool introspection.
#[derive(Debug, Clone)]
pub struct CompilerStats {
    /// Whether `initialize` has run.
    pub initialized: bool,
    /// Files tracked by the scanner cache.
    pub tracked_files: usize,
    /// Registered/enabled processors, when initialized.
    pub transformer: Option<TransformerStats>,
    /// Registered hot-reload listeners.
    pub hot_reload_listeners: usize,
    /// Whether a watch subscription is live.
    pub watching: bool,
}

/// Compiles a tree of markdown files to MDX with bounded parallelism.
///
/// Build-tool integrations drive the four lifecycle methods:
/// [`initialize`](Compiler::initialize), [`compile_all`](Compiler::compile_all),
/// [`start_watching`](Compiler::start_watching), and
/// [`destroy`](Compiler::destroy), plus [`get_stats`](Compiler::get_stats).
pub struct Compiler {
    config: Config,
    scanner: Option<Arc<Scanner>>,
    transformer: Option<Arc<ContentTransformer>>,
    hot_reload: Option<Arc<HotReloadManager>>,
    pool: Option<rayon::ThreadPool>,
    watch_subscription: Option<WatchSubscription>,
    initialized: bool,
}

impl Compiler {
    /// Create a compiler; nothing is built until [`initialize`](Self::initialize).
    pub fn new(config: Config) -> Self {
        Self {
            config,
            scanner: None,
            transformer: None,
            hot_reload: None,
            pool: None,
            watch_subscription: None,
            initialized: false,
        }
    }

    /// Validate the configuration and build the scanner, transformer chain,
    /// worker pool, and (optionally) the hot-reload manager. Idempotent.
    pub fn initialize(&mut self) -> Result<(), ProcessingError> {
        if self.initialized {
            return Ok(());
        }

        self.config.validate()?;

        self.scanner = Some(Arc::new(Scanner::from_config(&self.config)?));

        let options = TransformOptions {
            continue_on_error: self.config.continue_on_error,
            validate_output: true,
            large_file_threshold: self.config.large_file_threshold,
            ..TransformOptions::default()
        };
        let mut transformer = ContentTransformer::new(options, self.config.project_root.clone());
        let processors = &self.config.processors;
        transformer.add_processor(Box::new(StandardProcessor::new(processors.standard.clone())));
        transformer.add_processor(Box::new(MermaidProcessor::new(processors.mermaid.clone())));
        transformer.add_processor(Box::new(ImageProcessor::new(processors.image.clone())));
        transformer.add_processor(Box::new(MathProcessor::new(processors.math.clone())));
        transformer.add_processor(Box::new(TableProcessor::new(processors.tables.clone())));
        self.transformer = Some(Arc::new(transformer));

        self.pool = Some(
            rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.max_concurrency)
                .build()
                .map_err(|err| {
                    ProcessingError::configuration(format!("failed to build worker pool: {err}"))
                })?,
        );

        if self.config.hot_reload {
            self.hot_reload = Some(Arc::new(HotReloadManager::new(Duration::from_millis(
                self.config.debounce_ms,
            ))));
        }

        self.initialized = true;
        log::info!(
            "compiler initialized: {} -> {}",
            self.config.content_dir.display(),
            self.config.output_dir.display()
        );
        Ok(())
    }

    /// The hot-reload manager, when enabled and initialized.
    pub fn hot_reload_manager(&self) -> Option<&Arc<HotReloadManager>> {
        self.hot_reload.as_ref()
    }

    /// Scan, compile everything that needs it with bounded concurrency, and
    /// write outputs. One file's failure never aborts the batch.
    pub fn compile_all(&mut self) -> Result<Summary, ProcessingError> {
        self.initialize()?;
        let started = Instant::now();

        let scanner = self.require_scanner()?;
        let transformer = self.require_transformer()?;
        let pool = self.pool.as_ref().ok_or_else(|| {
            ProcessingError::configuration("compiler used before initialization".to_string())
        })?;

        let records = scanner.scan()?;
        let (pending, up_to_date): (Vec<FileRecord>, Vec<FileRecord>) = records
            .into_iter()
            .partition(|r| matches!(r.status, FileStatus::Pending | FileStatus::Error));

        log::info!(
            "compiling {} file(s), {} up-to-date",
            pending.len(),
            up_to_date.len()
        );

        let skip_up_to_date = self.config.skip_up_to_date_outputs;
        let mut outcomes: Vec<FileOutcome> = Vec::with_capacity(pending.len() + up_to_date.len());

        // Feed the pool in batches; within a batch, files compile in
        // parallel bounded by the pool size.
        for batch in pending.chunks(self.config.batch_size) {
            let batch_outcomes: Vec<FileOutcome> = pool.install(|| {
                batch
                    .par_iter()
                    .map(|record| {
                        compile_file(record, transformer.as_ref(), scanner.as_ref(), skip_up_to_date)
                    })
                    .collect()
            });
            outcomes.extend(batch_outcomes);
        }

        for record in up_to_date {
            scanner.update_status(&record.source_path, FileStatus::Skipped);
            outcomes.push(FileOutcome {
                source: record.source_path,
                output: record.output_path,
                status: OutcomeStatus::Skipped,
                errors: Vec::new(),
                warnings: Vec::new(),
                duration: Duration::ZERO,
                input_bytes: record.body.len(),
                output_bytes: 0,
            });
        }

        let summary = Summary::from_outcomes(outcomes, started.elapsed());
        log::info!(
            "compilation finished: {} ok, {} failed, {} skipped in {:.1?}",
            summary.succeeded,
            summary.failed,
            summary.skipped,
            summary.elapsed
        );
        Ok(summary)
    }

    /// Start recompiling on file changes, when `watch` is enabled.
    ///
    /// Change and add events recompile the single affected file; unlink
    /// events delete the corresponding output. Hot-reload listeners are
    /// notified after each event.
    pub fn start_watching(&mut self) -> Result<(), ProcessingError> {
        self.initialize()?;

        if !self.config.watch {
            log::info!("file watching is disabled");
            return Ok(());
        }
        if self.watch_subscription.is_some() {
            return Ok(());
        }

        let scanner = self.require_scanner()?;
        let transformer = self.require_transformer()?;
        let hot_reload = self.hot_reload.clone();
        let skip_up_to_date = self.config.skip_up_to_date_outputs;
        let content_dir = self.config.content_dir.clone();
        let output_dir = self.config.output_dir.clone();

        let callback_scanner = Arc::clone(&scanner);
        let subscription = Arc::clone(&scanner).watch(Box::new(move |event, path, record| {
            match event {
                WatchEvent::Unlink => {
                    let relative = path.strip_prefix(&content_dir).unwrap_or(path);
                    let output = output_path_for(relative, &output_dir);
                    match std::fs::remove_file(&output) {
                        Ok(()) => log::info!("removed output {}", output.display()),
                        Err(err) => {
                            log::debug!("no output to remove at {}: {err}", output.display());
                        }
                    }
                    if let Some(manager) = &hot_reload {
                        manager.trigger_reload(path, ChangeKind::Delete);
                    }
                }
                WatchEvent::Add | WatchEvent::Change => {
                    let Some(record) = record else {
                        return;
                    };
                    let outcome = compile_file(
                        record,
                        transformer.as_ref(),
                        callback_scanner.as_ref(),
                        skip_up_to_date,
                    );
                    match outcome.status {
                        OutcomeStatus::Error => {
                            log::error!("recompile failed for {}", path.display());
                            if let Some(manager) = &hot_reload {
                                manager.trigger_reload(path, ChangeKind::Error);
                            }
                        }
                        OutcomeStatus::Success | OutcomeStatus::Skipped => {
                            log::info!(
                                "recompiled {} -> {}",
                                path.display(),
                                outcome.output.display()
                            );
                            if let Some(manager) = &hot_reload {
                                manager.trigger_reload(&outcome.output, ChangeKind::Update);
                            }
                        }
                    }
                }
            }
        }))?;

        self.watch_subscription = Some(subscription);
        log::info!("watch mode active");
        Ok(())
    }

    /// Stop watching, drop the hot-reload manager, and clear all caches.
    ///
    /// An in-flight watch-mode compile gets a bounded grace period to finish
    /// before the watcher is abandoned.
    pub fn destroy(&mut self) {
        self.watch_subscription = None;
        if let Some(scanner) = &self.scanner {
            scanner.stop_watching(Duration::from_secs(2));
        }
        if let Some(manager) = self.hot_reload.take() {
            manager.destroy();
        }
        if let Some(scanner) = &self.scanner {
            scanner.clear();
        }
        self.scanner = None;
        self.transformer = None;
        self.pool = None;
        self.initialized = false;
        log::info!("compiler destroyed");
    }

    /// Current compiler state for build-tool introspection.
    pub fn get_stats(&self) -> CompilerStats {
        CompilerStats {
            initialized: self.initialized,
            tracked_files: self
                .scanner
                .as_ref()
                .map(|s| s.record_count())
                .unwrap_or(0),
            transformer: self.transformer.as_ref().map(|t| t.stats()),
            hot_reload_listeners: self
                .hot_reload
                .as_ref()
                .map(|m| m.listener_count())
                .unwrap_or(0),
            watching: self.watch_subscription.is_some(),
        }
    }

    fn require_scanner(&self) -> Result<Arc<Scanner>, ProcessingError> {
        self.scanner.clone().ok_or_else(|| {
            ProcessingError::configuration("compiler used before initialization".to_string())
        })
    }

    fn require_transformer(&self) -> Result<Arc<ContentTransformer>, ProcessingError> {
        self.transformer.clone().ok_or_else(|| {
            ProcessingError::configuration("compiler used before initialization".to_string())
        })
    }
}

impl Drop for Compiler {
    fn drop(&mut self) {
        self.watch_subscription = None;
    }
}

/// Compile one file: transform its body, write the output, and update the
/// scanner's record state.
fn compile_file(
    record: &FileRecord,
    transformer: &ContentTransformer,
    scanner: &Scanner,
    skip_up_to_date: bool,
) -> FileOutcome {
    let started = Instant::now();

    if skip_up_to_date && output_is_current(record) {
        log::debug!("skipping {} (output is newer)", record.source_path.display());
        scanner.update_status(&record.source_path, FileStatus::Skipped);
        return FileOutcome {
            source: record.source_path.clone(),
            output: record.output_path.clone(),
            status: OutcomeStatus::Skipped,
            errors: Vec::new(),
            warnings: Vec::new(),
            duration: started.elapsed(),
            input_bytes: record.body.len(),
            output_bytes: 0,
        };
    }

    scanner.update_status(&record.source_path, FileStatus::Processing);

    let outcome = transformer.transform_parts(
        &record.source_path,
        record.frontmatter.clone(),
        &record.body,
    );

    let mut errors = outcome.errors;
    let status = match write_output(&record.output_path, &outcome.content) {
        Ok(()) if outcome.success => OutcomeStatus::Success,
        Ok(()) => OutcomeStatus::Error,
        Err(err) => {
            errors.push(err);
            OutcomeStatus::Error
        }
    };

    scanner.update_status(
        &record.source_path,
        match status {
            OutcomeStatus::Success => FileStatus::Complete,
            _ => FileStatus::Error,
        },
    );

    FileOutcome {
        source: record.source_path.clone(),
        output: record.output_path.clone(),
        status,
        errors,
        warnings: outcome.warnings,
        duration: started.elapsed(),
        input_bytes: record.body.len(),
        output_bytes: outcome.content.len(),
    }
}

/// True when the output file exists and is at least as new as the source.
fn output_is_current(record: &FileRecord) -> bool {
    std::fs::metadata(&record.output_path)
        .and_then(|meta| meta.modified())
        .map(|mtime| mtime >= record.last_modified)
        .unwrap_or(false)
}

/// Write an output document, creating parent directories as needed.
fn write_output(path: &Path, content: &str) -> Result<(), ProcessingError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| {
            ProcessingError::io(
                format!("failed to create output directory {}", parent.display()),
                err,
            )
        })?;
    }
    std::fs::write(path, content).map_err(|err| {
        ProcessingError::io(format!("failed to write output {}", path.display()), err)
            .with_file(path.to_path_buf())
    })
}
