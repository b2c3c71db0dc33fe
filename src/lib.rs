//! Deduplicated, recency-ordered clipboard history with favourites.
//!
//! The engine polls a [`clipboard::ClipboardPort`] for changes and upserts
//! them into a [`store::Store`] keyed by content equality, so re-copying
//! known text bumps its timestamp instead of duplicating it. Favourited
//! entries stay listed however far they fall out of the bounded recent view.

pub mod clipboard;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod policy;
pub mod store;

pub use clipboard::{ClipboardPort, SystemClipboard};
pub use dispatch::{Action, ActionDispatcher, DispatchOutcome, SourceList};
pub use engine::{ChangeNotifier, ClipboardMonitor, HistoryEngine};
pub use error::{AppError, ClipboardError, StoreError};
pub use policy::{SelectionPolicy, DEFAULT_RECENT_LIMIT};
pub use store::{ClipboardEntry, MemoryStore, SqliteStore, Store};
