use std::sync::{Arc, Mutex, MutexGuard};

use crate::clipboard::ClipboardPort;
use crate::engine::{ChangeNotifier, HistoryEngine};
use crate::error::AppError;
use crate::store::Store;

/// Which list a selection came from. The same click means different things
/// in the two lists when the modifier is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceList {
    Recent,
    Favourites,
}

/// What the user asked for. The presentation layer resolves modifier state
/// into one of these up front instead of the handler inspecting ambient key
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Copy the entry's content back to the clipboard.
    Copy,
    /// Flip the favourite flag (Recent-list gesture, a true toggle).
    ToggleFavourite,
    /// Clear the favourite flag (Favourites-list gesture). Never re-adds;
    /// a stale click on an already-unfavourited entry is a no-op.
    RemoveFavourite,
}

impl Action {
    /// Map the original modifier-click gesture onto an action. Plain click
    /// copies; modifier-click toggles from Recent but only removes from
    /// Favourites.
    pub fn from_gesture(modifier_pressed: bool, source: SourceList) -> Self {
        match (modifier_pressed, source) {
            (false, _) => Action::Copy,
            (true, SourceList::Recent) => Action::ToggleFavourite,
            (true, SourceList::Favourites) => Action::RemoveFavourite,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Copied,
    FavouriteSet(bool),
    /// The action referenced an entry the store no longer knows (stale
    /// view). Logged, otherwise ignored.
    NotFound,
    NoOp,
    /// A store or clipboard failure. Logged; state is unchanged.
    Failed,
}

/// Executes user selections against the engine and store.
pub struct ActionDispatcher<P, S> {
    engine: Arc<Mutex<HistoryEngine<P, S>>>,
    store: Arc<Mutex<S>>,
    notifier: Option<ChangeNotifier>,
}

impl<P: ClipboardPort, S: Store> ActionDispatcher<P, S> {
    pub fn new(engine: Arc<Mutex<HistoryEngine<P, S>>>, store: Arc<Mutex<S>>) -> Self {
        Self {
            engine,
            store,
            notifier: None,
        }
    }

    pub fn set_notifier(&mut self, notifier: ChangeNotifier) {
        self.notifier = Some(notifier);
    }

    /// Perform `action` on the entry with `entry_id`. Never panics and never
    /// propagates an error to the caller; failures come back as outcomes.
    pub fn dispatch(&self, entry_id: i64, action: Action) -> DispatchOutcome {
        match self.try_dispatch(entry_id, action) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(entry_id, ?action, "dispatch failed: {e}");
                DispatchOutcome::Failed
            }
        }
    }

    fn try_dispatch(&self, entry_id: i64, action: Action) -> Result<DispatchOutcome, AppError> {
        let entry = self.lock_store()?.get(entry_id)?;
        let Some(mut entry) = entry else {
            tracing::warn!(entry_id, "action on unknown entry, view is stale");
            return Ok(DispatchOutcome::NotFound);
        };

        match action {
            Action::Copy => {
                self.lock_engine()?.write_to_clipboard(&entry.content)?;
                Ok(DispatchOutcome::Copied)
            }
            Action::ToggleFavourite => {
                entry.is_favourite = !entry.is_favourite;
                // Timestamp is deliberately untouched: favouriting is not a
                // recency event.
                let stored = self.lock_store()?.upsert(&entry)?;
                self.notify();
                Ok(DispatchOutcome::FavouriteSet(stored.is_favourite))
            }
            Action::RemoveFavourite => {
                if !entry.is_favourite {
                    return Ok(DispatchOutcome::NoOp);
                }
                entry.is_favourite = false;
                self.lock_store()?.upsert(&entry)?;
                self.notify();
                Ok(DispatchOutcome::FavouriteSet(false))
            }
        }
    }

    fn lock_store(&self) -> Result<MutexGuard<'_, S>, AppError> {
        self.store
            .lock()
            .map_err(|_| AppError::Other("store mutex poisoned".to_string()))
    }

    fn lock_engine(&self) -> Result<MutexGuard<'_, HistoryEngine<P, S>>, AppError> {
        self.engine
            .lock()
            .map_err(|_| AppError::Other("engine mutex poisoned".to_string()))
    }

    fn notify(&self) {
        if let Some(notifier) = &self.notifier {
            notifier();
        }
    }
}
