#![deny(missing_docs)]
//! mdflow pipeline: configuration, source scanning with incremental caching,
//! parallel compilation, watch mode, and hot-reload notification.

/// The compiler lifecycle and summary types.
pub mod compiler;
/// Pipeline configuration surface.
pub mod config;
/// Hot-reload listener notification.
pub mod hot_reload;
/// Source discovery and change detection.
pub mod scanner;
/// Debounced file watching.
pub mod watch;

mod sync;

pub use compiler::{Compiler, CompilerStats, FileOutcome, OutcomeStatus, Summary};
pub use config::{Config, ProcessorsConfig};
pub use hot_reload::{ChangeKind, HotReloadManager, Listener, ListenerHandle, ReloadEvent};
pub use scanner::{FileRecord, FileStatus, ScanCallback, Scanner, content_hash, output_path_for};
pub use watch::{DebouncedWatcher, EventCallback, WatchEvent, WatchSubscription};
