//! Small synchronization helpers.

use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, recovering the guard if a holder panicked.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
