//! Debounced file watching on top of `notify`.
//!
//! Raw watcher events are funneled through a channel into a worker thread
//! that keeps one pending entry per path. Repeated events cancel and reset
//! the path's debounce deadline (last event kind wins), so a burst of rapid
//! saves produces a single callback. Dropping the last subscription stops
//! the worker and the underlying OS watcher.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use mdflow_core::ProcessingError;
use notify::Watcher as _;

use crate::sync::lock_unpoisoned;

/// File event kinds surfaced to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    /// A matching file appeared.
    Add,
    /// A matching file's content changed.
    Change,
    /// A matching file was removed.
    Unlink,
}

/// Callback invoked with each debounced event.
pub type EventCallback = Box<dyn Fn(WatchEvent, &Path) + Send + Sync>;

struct Shared {
    callbacks: Mutex<Vec<(u64, EventCallback)>>,
    next_id: AtomicU64,
    active: AtomicBool,
    exited: AtomicBool,
}

/// Watches a directory tree and delivers debounced events to subscribers.
pub struct DebouncedWatcher {
    shared: Arc<Shared>,
}

/// Keeps a subscription alive; dropping the last one stops the watcher.
pub struct WatchSubscription {
    shared: Arc<Shared>,
    id: u64,
}

impl Drop for WatchSubscription {
    fn drop(&mut self) {
        let mut callbacks = lock_unpoisoned(&self.shared.callbacks);
        callbacks.retain(|(id, _)| *id != self.id);
        if callbacks.is_empty() {
            self.shared.active.store(false, Ordering::SeqCst);
            log::info!("last watch subscription dropped, stopping watcher");
        }
    }
}

impl DebouncedWatcher {
    /// Start watching `root` recursively. `filter` decides which paths are
    /// interesting (e.g. include/exclude glob matching).
    pub fn start(
        root: &Path,
        debounce: Duration,
        filter: impl Fn(&Path) -> bool + Send + 'static,
    ) -> Result<Self, ProcessingError> {
        let shared = Arc::new(Shared {
            callbacks: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            active: AtomicBool::new(true),
            exited: AtomicBool::new(false),
        });

        let (tx, rx) = mpsc::channel::<notify::Event>();
        let mut watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                match res {
                    Ok(event) => {
                        let _ = tx.send(event);
                    }
                    Err(err) => log::error!("file watcher error: {err}"),
                }
            })
            .map_err(|err| {
                ProcessingError::file_system(format!("failed to create file watcher: {err}"))
            })?;
        watcher
            .watch(root, notify::RecursiveMode::Recursive)
            .map_err(|err| {
                ProcessingError::file_system(format!(
                    "failed to watch {}: {err}",
                    root.display()
                ))
            })?;

        log::info!("file watcher started on {}", root.display());

        let worker_shared = Arc::clone(&shared);
        std::thread::spawn(move || {
            // Owning the watcher keeps the OS handles alive until shutdown.
            let _watcher = watcher;
            let mut pending: HashMap<PathBuf, (WatchEvent, Instant)> = HashMap::new();

            while worker_shared.active.load(Ordering::SeqCst) {
                match rx.recv_timeout(Duration::from_millis(25)) {
                    Ok(event) => {
                        if let Some(kind) = classify(&event.kind) {
                            for path in event.paths {
                                if filter(&path) {
                                    pending.insert(path, (kind, Instant::now()));
                                }
                            }
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }

                let now = Instant::now();
                let due: Vec<PathBuf> = pending
                    .iter()
                    .filter(|(_, (_, at))| now.duration_since(*at) >= debounce)
                    .map(|(path, _)| path.clone())
                    .collect();
                for path in due {
                    if let Some((kind, _)) = pending.remove(&path) {
                        let callbacks = lock_unpoisoned(&worker_shared.callbacks);
                        for (_, callback) in callbacks.iter() {
                            callback(kind, &path);
                        }
                    }
                }
            }

            worker_shared.exited.store(true, Ordering::SeqCst);
            log::debug!("watch worker exiting");
        });

        Ok(Self { shared })
    }

    /// Register a callback for debounced events.
    pub fn subscribe(&self, callback: EventCallback) -> WatchSubscription {
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        lock_unpoisoned(&self.shared.callbacks).push((id, callback));
        WatchSubscription {
            shared: Arc::clone(&self.shared),
            id,
        }
    }

    /// Whether the worker is still running.
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Stop the worker regardless of live subscriptions.
    pub fn stop(&self) {
        self.shared.active.store(false, Ordering::SeqCst);
    }

    /// Stop the worker and wait for any in-flight callback to finish, up to
    /// `grace`. Returns whether the worker exited within the grace period.
    pub fn shutdown(&self, grace: Duration) -> bool {
        self.stop();
        let deadline = Instant::now() + grace;
        while !self.shared.exited.load(Ordering::SeqCst) {
            if Instant::now() >= deadline {
                log::warn!("watch worker did not exit within the grace period");
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        true
    }
}

fn classify(kind: &notify::EventKind) -> Option<WatchEvent> {
    match kind {
        notify::EventKind::Create(_) => Some(WatchEvent::Add),
        notify::EventKind::Modify(_) => Some(WatchEvent::Change),
        notify::EventKind::Remove(_) => Some(WatchEvent::Unlink),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn classify_maps_event_kinds() {
        assert_eq!(
            classify(&notify::EventKind::Create(notify::event::CreateKind::File)),
            Some(WatchEvent::Add)
        );
        assert_eq!(
            classify(&notify::EventKind::Remove(notify::event::RemoveKind::File)),
            Some(WatchEvent::Unlink)
        );
        assert_eq!(classify(&notify::EventKind::Access(notify::event::AccessKind::Any)), None);
    }

    #[test]
    fn dropping_last_subscription_stops_the_watcher() {
        let temp = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let watcher =
            DebouncedWatcher::start(temp.path(), Duration::from_millis(10), |_| true)
                .unwrap_or_else(|e| panic!("{e}"));
        let first = watcher.subscribe(Box::new(|_, _| {}));
        let second = watcher.subscribe(Box::new(|_, _| {}));
        assert!(watcher.is_active());
        drop(first);
        assert!(watcher.is_active());
        drop(second);
        assert!(!watcher.is_active());
    }

    #[test]
    fn debounced_change_events_are_delivered_once() {
        let temp = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let root = temp.path().to_path_buf();
        std::fs::write(root.join("a.md"), "one").unwrap_or_else(|e| panic!("{e}"));

        let watcher = DebouncedWatcher::start(&root, Duration::from_millis(50), |path| {
            path.extension().is_some_and(|ext| ext == "md")
        })
        .unwrap_or_else(|e| panic!("{e}"));

        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let _subscription = watcher.subscribe(Box::new(move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        // A burst of writes within the debounce window collapses to one event.
        for body in ["two", "three", "four"] {
            std::fs::write(root.join("a.md"), body).unwrap_or_else(|e| panic!("{e}"));
            std::thread::sleep(Duration::from_millis(5));
        }
        std::thread::sleep(Duration::from_millis(400));

        assert!(hits.load(Ordering::SeqCst) >= 1);
        assert!(hits.load(Ordering::SeqCst) <= 2, "expected debounced delivery");
    }
}
