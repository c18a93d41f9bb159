//! Notifies listeners when compiled output changes.
//!
//! A thin per-path debouncer in front of a listener registry: rapid repeat
//! triggers for the same path collapse into one reload event, delivered from
//! a flusher thread after the debounce window.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::sync::lock_unpoisoned;

/// What happened to the file behind a reload event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Output was (re)written.
    Update,
    /// Output was deleted.
    Delete,
    /// Compilation failed; listeners may want to surface the error state.
    Error,
}

/// One reload notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadEvent {
    /// The output (or source, for deletes) path that changed.
    pub path: PathBuf,
    /// What happened.
    pub kind: ChangeKind,
}

/// Callback invoked with each delivered reload event.
pub type Listener = Box<dyn Fn(&ReloadEvent) + Send + Sync>;

struct Inner {
    listeners: Mutex<Vec<(u64, Listener)>>,
    pending: Mutex<HashMap<PathBuf, (ChangeKind, Instant)>>,
    next_id: AtomicU64,
    active: AtomicBool,
    debounce: Duration,
}

/// Debounced reload notifier.
pub struct HotReloadManager {
    inner: Arc<Inner>,
}

/// Keeps a listener registered; dropping it removes the listener.
pub struct ListenerHandle {
    inner: Arc<Inner>,
    id: u64,
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        let mut listeners = lock_unpoisoned(&self.inner.listeners);
        listeners.retain(|(id, _)| *id != self.id);
        log::debug!("hot reload listener removed ({} left)", listeners.len());
    }
}

impl HotReloadManager {
    /// Create a manager and start its flusher thread.
    pub fn new(debounce: Duration) -> Self {
        let inner = Arc::new(Inner {
            listeners: Mutex::new(Vec::new()),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            active: AtomicBool::new(true),
            debounce,
        });

        let worker = Arc::clone(&inner);
        std::thread::spawn(move || {
            while worker.active.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(25));

                let now = Instant::now();
                let due: Vec<(PathBuf, ChangeKind)> = {
                    let mut pending = lock_unpoisoned(&worker.pending);
                    let ready: Vec<PathBuf> = pending
                        .iter()
                        .filter(|(_, (_, at))| now.duration_since(*at) >= worker.debounce)
                        .map(|(path, _)| path.clone())
                        .collect();
                    ready
                        .into_iter()
                        .filter_map(|path| {
                            pending.remove(&path).map(|(kind, _)| (path, kind))
                        })
                        .collect()
                };

                for (path, kind) in due {
                    let event = ReloadEvent { path, kind };
                    log::debug!("hot reload: {:?} {}", event.kind, event.path.display());
                    let listeners = lock_unpoisoned(&worker.listeners);
                    for (_, listener) in listeners.iter() {
                        listener(&event);
                    }
                }
            }
        });

        Self { inner }
    }

    /// Register a listener for reload events.
    pub fn add_listener(&self, listener: Listener) -> ListenerHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let mut listeners = lock_unpoisoned(&self.inner.listeners);
        listeners.push((id, listener));
        log::debug!("hot reload listener added ({} total)", listeners.len());
        ListenerHandle {
            inner: Arc::clone(&self.inner),
            id,
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        lock_unpoisoned(&self.inner.listeners).len()
    }

    /// Schedule a reload for `path`. Repeated triggers within the debounce
    /// window reset the timer; the most recent kind wins.
    pub fn trigger_reload(&self, path: &Path, kind: ChangeKind) {
        lock_unpoisoned(&self.inner.pending)
            .insert(path.to_path_buf(), (kind, Instant::now()));
    }

    /// Stop the flusher and drop pending events and listeners.
    pub fn destroy(&self) {
        self.inner.active.store(false, Ordering::SeqCst);
        lock_unpoisoned(&self.inner.pending).clear();
        lock_unpoisoned(&self.inner.listeners).clear();
        log::info!("hot reload manager destroyed");
    }
}

impl Drop for HotReloadManager {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn debounced_trigger_notifies_listeners_once() {
        let manager = HotReloadManager::new(Duration::from_millis(40));
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let _handle = manager.add_listener(Box::new(move |event| {
            assert_eq!(event.kind, ChangeKind::Update);
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        let path = Path::new("out/post.mdx");
        manager.trigger_reload(path, ChangeKind::Update);
        manager.trigger_reload(path, ChangeKind::Update);
        manager.trigger_reload(path, ChangeKind::Update);

        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn latest_change_kind_wins() {
        let manager = HotReloadManager::new(Duration::from_millis(30));
        let kinds = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&kinds);
        let _handle = manager.add_listener(Box::new(move |event| {
            lock_unpoisoned(&seen).push(event.kind);
        }));

        let path = Path::new("out/post.mdx");
        manager.trigger_reload(path, ChangeKind::Update);
        manager.trigger_reload(path, ChangeKind::Delete);

        std::thread::sleep(Duration::from_millis(250));
        assert_eq!(*lock_unpoisoned(&kinds), vec![ChangeKind::Delete]);
    }

    #[test]
    fn dropping_handle_removes_listener() {
        let manager = HotReloadManager::new(Duration::from_millis(10));
        let handle = manager.add_listener(Box::new(|_| {}));
        assert_eq!(manager.listener_count(), 1);
        drop(handle);
        assert_eq!(manager.listener_count(), 0);
    }

    #[test]
    fn destroy_clears_pending_and_listeners() {
        let manager = HotReloadManager::new(Duration::from_millis(10));
        let _handle = manager.add_listener(Box::new(|_| {}));
        manager.trigger_reload(Path::new("x"), ChangeKind::Update);
        manager.destroy();
        assert_eq!(manager.listener_count(), 0);
    }
}
