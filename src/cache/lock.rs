use std::sync::{Mutex, MutexGuard};

use tracing::warn;

/// Acquire `lock`, recovering the inner state if a previous holder panicked.
///
/// Critical sections only assign whole fields, so the state is consistent
/// even when the poisoning thread panicked mid-section.
pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        warn!(
            op,
            target_module = target,
            lock_kind = "mutex.lock",
            result = "poisoned_recovered",
            "Recovered from poisoned settings cache lock"
        );
        lock.clear_poison();
        poisoned.into_inner()
    })
}
