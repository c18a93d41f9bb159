//! Source discovery with incremental change detection.
//!
//! The scanner walks the content tree (include minus exclude globs), reads
//! files in fixed-size batches, and keeps instance-owned record and
//! content-hash caches so unchanged files are never reprocessed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use globset::{Glob, GlobSet, GlobSetBuilder};
use mdflow_core::frontmatter::{self, Frontmatter};
use mdflow_core::ProcessingError;

use crate::config::Config;
use crate::sync::lock_unpoisoned;
use crate::watch::{DebouncedWatcher, WatchEvent, WatchSubscription};

/// Processing state of one discovered file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// Needs (re)processing.
    Pending,
    /// Currently being compiled.
    Processing,
    /// Compiled successfully.
    Complete,
    /// Last compile attempt failed.
    Error,
    /// Unchanged since the last successful compile.
    Cached,
    /// Skipped this run (up-to-date output).
    Skipped,
}

/// One discovered markdown source file.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Absolute source path.
    pub source_path: PathBuf,
    /// Derived output path (source with the extension swapped).
    pub output_path: PathBuf,
    /// Source path relative to the content directory.
    pub relative_path: PathBuf,
    /// Source mtime at scan time.
    pub last_modified: SystemTime,
    /// Source size in bytes.
    pub size: u64,
    /// Digest over raw bytes plus mtime, for change detection.
    pub content_hash: String,
    /// Decoded frontmatter.
    pub frontmatter: Frontmatter,
    /// Body with the frontmatter header removed.
    pub body: String,
    /// Current processing state.
    pub status: FileStatus,
}

/// Compute the change-detection digest for a file's bytes and mtime.
pub fn content_hash(bytes: &[u8], mtime: SystemTime) -> String {
    let mut sha = sha1_smol::Sha1::new();
    sha.update(bytes);
    let millis = mtime
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    sha.update(millis.to_string().as_bytes());
    sha.digest().to_string()
}

/// Derive the output path for a source file: the path relative to
/// `content_dir`, re-rooted under `output_dir`, with an `.mdx` extension.
pub fn output_path_for(relative: &Path, output_dir: &Path) -> PathBuf {
    output_dir.join(relative).with_extension("mdx")
}

fn build_glob_set(patterns: &[String]) -> Result<GlobSet, ProcessingError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|err| {
            ProcessingError::configuration(format!("invalid glob pattern {pattern:?}: {err}"))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|err| ProcessingError::configuration(format!("failed to build glob set: {err}")))
}

/// Discovers candidate files and tracks what needs reprocessing.
pub struct Scanner {
    content_dir: PathBuf,
    output_dir: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
    batch_size: usize,
    debounce: Duration,
    records: Mutex<HashMap<PathBuf, FileRecord>>,
    hashes: Mutex<HashMap<PathBuf, String>>,
    watcher: Mutex<Option<Arc<DebouncedWatcher>>>,
}

/// Callback invoked for debounced watch events, with the freshly scanned
/// record for add/change events and `None` for unlink.
pub type ScanCallback = Box<dyn Fn(WatchEvent, &Path, Option<&FileRecord>) + Send + Sync>;

impl Scanner {
    /// Build a scanner from the pipeline configuration.
    pub fn from_config(config: &Config) -> Result<Self, ProcessingError> {
        Self::new(
            &config.content_dir,
            &config.output_dir,
            &config.include,
            &config.exclude,
            config.batch_size,
            Duration::from_millis(config.debounce_ms),
        )
    }

    /// Create a scanner over `content_dir`.
    pub fn new(
        content_dir: &Path,
        output_dir: &Path,
        include: &[String],
        exclude: &[String],
        batch_size: usize,
        debounce: Duration,
    ) -> Result<Self, ProcessingError> {
        Ok(Self {
            content_dir: content_dir.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            include: build_glob_set(include)?,
            exclude: build_glob_set(exclude)?,
            batch_size: batch_size.max(1),
            debounce,
            records: Mutex::new(HashMap::new()),
            hashes: Mutex::new(HashMap::new()),
            watcher: Mutex::new(None),
        })
    }

    /// The content directory this scanner walks.
    pub fn content_dir(&self) -> &Path {
        &self.content_dir
    }

    /// Enumerate matching files, compute metadata, and detect which need
    /// reprocessing. Unchanged files are returned with [`FileStatus::Cached`]
    /// without re-reading their content.
    pub fn scan(&self) -> Result<Vec<FileRecord>, ProcessingError> {
        if !self.content_dir.is_dir() {
            return Err(ProcessingError::file_system(format!(
                "content directory does not exist: {}",
                self.content_dir.display()
            )));
        }

        let mut files = Vec::new();
        self.collect_files(&self.content_dir, &mut files)?;
        files.sort();

        let mut records = Vec::with_capacity(files.len());
        // Fixed-size batches bound peak file-handle and memory use.
        for batch in files.chunks(self.batch_size) {
            for path in batch {
                match self.scan_one(path) {
                    Ok(record) => records.push(record),
                    Err(err) => {
                        log::warn!("failed to scan {}: {}", path.display(), err);
                    }
                }
            }
        }

        {
            let mut cache = lock_unpoisoned(&self.records);
            cache.clear();
            for record in &records {
                cache.insert(record.source_path.clone(), record.clone());
            }
        }

        let pending = records
            .iter()
            .filter(|r| r.status == FileStatus::Pending)
            .count();
        log::info!(
            "scanned {} file(s) under {} ({} pending, {} cached)",
            records.len(),
            self.content_dir.display(),
            pending,
            records.len() - pending
        );

        Ok(records)
    }

    fn collect_files(&self, dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), ProcessingError> {
        let entries = std::fs::read_dir(dir).map_err(|err| {
            ProcessingError::io(format!("failed to read directory {}", dir.display()), err)
        })?;
        for entry in entries {
            let entry = entry.map_err(|err| {
                ProcessingError::io(format!("failed to read entry in {}", dir.display()), err)
            })?;
            let path = entry.path();
            let Ok(relative) = path.strip_prefix(&self.content_dir) else {
                continue;
            };
            if self.exclude.is_match(relative) {
                continue;
            }
            let file_type = entry.file_type().map_err(|err| {
                ProcessingError::io(format!("failed to stat {}", path.display()), err)
            })?;
            if file_type.is_dir() {
                self.collect_files(&path, files)?;
            } else if file_type.is_file() && self.include.is_match(relative) {
                files.push(path);
            }
        }
        Ok(())
    }

    /// Scan a single file, consulting the record and hash caches.
    fn scan_one(&self, path: &Path) -> Result<FileRecord, ProcessingError> {
        let metadata = std::fs::metadata(path).map_err(|err| {
            ProcessingError::io(format!("failed to stat {}", path.display()), err)
                .with_file(path.to_path_buf())
        })?;
        let mtime = metadata.modified().map_err(|err| {
            ProcessingError::io(format!("failed to read mtime of {}", path.display()), err)
        })?;

        // Unchanged mtime: reuse the cached record without re-reading.
        if let Some(cached) = lock_unpoisoned(&self.records).get(path)
            && mtime <= cached.last_modified
        {
            let mut record = cached.clone();
            record.status = FileStatus::Cached;
            return Ok(record);
        }

        self.read_record(path, mtime, metadata.len())
    }

    /// Read and decode a file, comparing its digest against the hash cache.
    fn read_record(
        &self,
        path: &Path,
        mtime: SystemTime,
        size: u64,
    ) -> Result<FileRecord, ProcessingError> {
        let bytes = std::fs::read(path).map_err(|err| {
            ProcessingError::io(format!("failed to read {}", path.display()), err)
                .with_file(path.to_path_buf())
        })?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let hash = content_hash(&bytes, mtime);

        let changed = {
            let mut hashes = lock_unpoisoned(&self.hashes);
            match hashes.get(path) {
                Some(previous) if *previous == hash => false,
                _ => {
                    hashes.insert(path.to_path_buf(), hash.clone());
                    true
                }
            }
        };

        let decoded = frontmatter::decode(&text);
        let relative = path
            .strip_prefix(&self.content_dir)
            .unwrap_or(path)
            .to_path_buf();

        Ok(FileRecord {
            source_path: path.to_path_buf(),
            output_path: output_path_for(&relative, &self.output_dir),
            relative_path: relative,
            last_modified: mtime,
            size,
            content_hash: hash,
            frontmatter: decoded.frontmatter,
            body: decoded.body,
            status: if changed {
                FileStatus::Pending
            } else {
                FileStatus::Cached
            },
        })
    }

    /// Scan one file outside a full sweep (used by watch mode) and update
    /// the record cache.
    pub fn process_file(&self, path: &Path) -> Result<FileRecord, ProcessingError> {
        let metadata = std::fs::metadata(path).map_err(|err| {
            ProcessingError::io(format!("failed to stat {}", path.display()), err)
                .with_file(path.to_path_buf())
        })?;
        let mtime = metadata.modified().map_err(|err| {
            ProcessingError::io(format!("failed to read mtime of {}", path.display()), err)
        })?;
        let record = self.read_record(path, mtime, metadata.len())?;
        lock_unpoisoned(&self.records).insert(path.to_path_buf(), record.clone());
        Ok(record)
    }

    /// Look up the cached record for a path.
    pub fn record(&self, path: &Path) -> Option<FileRecord> {
        lock_unpoisoned(&self.records).get(path).cloned()
    }

    /// Number of cached records.
    pub fn record_count(&self) -> usize {
        lock_unpoisoned(&self.records).len()
    }

    /// Records currently needing processing.
    pub fn files_to_process(&self) -> Vec<FileRecord> {
        lock_unpoisoned(&self.records)
            .values()
            .filter(|r| matches!(r.status, FileStatus::Pending | FileStatus::Error))
            .cloned()
            .collect()
    }

    /// Update the cached status for a path.
    pub fn update_status(&self, path: &Path, status: FileStatus) {
        if let Some(record) = lock_unpoisoned(&self.records).get_mut(path) {
            record.status = status;
        }
    }

    /// Drop a record (and its hash cache entry), returning it if present.
    pub fn remove_record(&self, path: &Path) -> Option<FileRecord> {
        lock_unpoisoned(&self.hashes).remove(path);
        lock_unpoisoned(&self.records).remove(path)
    }

    /// Clear all cached state.
    pub fn clear(&self) {
        lock_unpoisoned(&self.records).clear();
        lock_unpoisoned(&self.hashes).clear();
    }

    /// Stop the underlying watcher, waiting up to `grace` for an in-flight
    /// event callback to finish.
    pub fn stop_watching(&self, grace: Duration) {
        if let Some(watcher) = lock_unpoisoned(&self.watcher).take() {
            watcher.shutdown(grace);
        }
    }

    /// Subscribe to debounced add/change/unlink events for matching files.
    ///
    /// The callback receives the freshly scanned record for add/change
    /// events; unlink events drop the cached record first. Dropping the last
    /// subscription stops the underlying watcher.
    pub fn watch(self: Arc<Self>, callback: ScanCallback) -> Result<WatchSubscription, ProcessingError> {
        let watcher = {
            let mut slot = lock_unpoisoned(&self.watcher);
            let reusable = slot.as_ref().filter(|w| w.is_active()).map(Arc::clone);
            match reusable {
                Some(existing) => existing,
                None => {
                    let include = self.include.clone();
                    let exclude = self.exclude.clone();
                    let content_dir = self.content_dir.clone();
                    let filter = move |path: &Path| {
                        let Ok(relative) = path.strip_prefix(&content_dir) else {
                            return false;
                        };
                        include.is_match(relative) && !exclude.is_match(relative)
                    };
                    let created = Arc::new(DebouncedWatcher::start(
                        &self.content_dir,
                        self.debounce,
                        filter,
                    )?);
                    *slot = Some(Arc::clone(&created));
                    created
                }
            }
        };

        let scanner = self;
        Ok(watcher.subscribe(Box::new(move |event, path| {
            match event {
                WatchEvent::Add | WatchEvent::Change => match scanner.process_file(path) {
                    Ok(record) => callback(event, path, Some(&record)),
                    Err(err) => {
                        log::warn!("failed to process watch event for {}: {}", path.display(), err);
                    }
                },
                WatchEvent::Unlink => {
                    scanner.remove_record(path);
                    callback(event, path, None);
                }
            }
        })))
    }
}
