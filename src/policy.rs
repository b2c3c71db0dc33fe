use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::StoreError;
use crate::store::{ClipboardEntry, Store};

/// Bound on the recent list when none is configured (the original showed the
/// twenty most recent items).
pub const DEFAULT_RECENT_LIMIT: usize = 20;

/// Pure read projections over the store: the bounded recent list and the
/// unbounded favourites list. No side effects, no caching; every call
/// reflects the store's state at call time.
pub struct SelectionPolicy<S> {
    store: Arc<Mutex<S>>,
    recent_limit: usize,
}

impl<S: Store> SelectionPolicy<S> {
    pub fn new(store: Arc<Mutex<S>>, recent_limit: usize) -> Self {
        Self {
            store,
            recent_limit,
        }
    }

    /// The recent list, bounded to the configured limit.
    pub fn recent(&self) -> Result<Vec<ClipboardEntry>, StoreError> {
        self.recent_with_limit(self.recent_limit)
    }

    /// Entries ordered newest first, at most `limit` of them. Equal
    /// timestamps are broken by id (later insert first) so the order is
    /// stable across repeated calls.
    pub fn recent_with_limit(&self, limit: usize) -> Result<Vec<ClipboardEntry>, StoreError> {
        let mut entries = self.lock_store()?.list_all()?;
        sort_newest_first(&mut entries);
        entries.truncate(limit);
        Ok(entries)
    }

    /// Every favourite entry, newest first, unbounded. Independent of the
    /// recent list's cutoff.
    pub fn favourites(&self) -> Result<Vec<ClipboardEntry>, StoreError> {
        let mut entries = self.lock_store()?.list_all()?;
        entries.retain(|e| e.is_favourite);
        sort_newest_first(&mut entries);
        Ok(entries)
    }

    fn lock_store(&self) -> Result<MutexGuard<'_, S>, StoreError> {
        self.store
            .lock()
            .map_err(|_| StoreError::Backend("store mutex poisoned".to_string()))
    }
}

fn sort_newest_first(entries: &mut [ClipboardEntry]) {
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
}
