use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// A stored clipboard history entry.
///
/// `content` is the dedupe key: the store never holds two entries with equal
/// content. `timestamp` is last-touched time and only ever moves forward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipboardEntry {
    pub id: i64,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Favourite entries stay visible regardless of the recent-list bound.
    /// Only an explicit user toggle changes this flag.
    #[serde(default)]
    pub is_favourite: bool,
}

impl ClipboardEntry {
    /// Create a fresh, unfavourited entry. The store assigns the real id on
    /// first upsert.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: 0,
            content: content.into(),
            timestamp: Utc::now(),
            is_favourite: false,
        }
    }

    /// Refresh the last-touched time. Never moves the timestamp backwards.
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.timestamp {
            self.timestamp = now;
        }
    }
}

/// Durable keyed storage of history entries, deduplicated by content.
///
/// Sorting and filtering are the caller's concern (`SelectionPolicy` works
/// over `list_all`); backends only need exact-key lookups and upsert.
pub trait Store {
    fn find_by_content(&self, content: &str) -> Result<Option<ClipboardEntry>, StoreError>;

    fn get(&self, id: i64) -> Result<Option<ClipboardEntry>, StoreError>;

    /// Insert the entry, or update the existing entry with equal content.
    /// On conflict the stored timestamp never decreases, and the existing id
    /// is kept. Returns the entry as stored (with its assigned id).
    fn upsert(&mut self, entry: &ClipboardEntry) -> Result<ClipboardEntry, StoreError>;

    fn list_all(&self) -> Result<Vec<ClipboardEntry>, StoreError>;

    fn count(&self) -> Result<usize, StoreError>;
}

/// SQLite-backed clipboard history store.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory database, mostly useful for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS entries (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                content      TEXT NOT NULL,
                timestamp    TEXT NOT NULL,
                is_favourite INTEGER NOT NULL DEFAULT 0,
                UNIQUE(content)
            );
            CREATE INDEX IF NOT EXISTS idx_entries_timestamp ON entries(timestamp DESC);",
        )?;
        Ok(())
    }

    fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<ClipboardEntry> {
        Ok(ClipboardEntry {
            id: row.get(0)?,
            content: row.get(1)?,
            timestamp: parse_datetime(row.get::<_, String>(2)?),
            is_favourite: row.get::<_, i32>(3)? != 0,
        })
    }
}

impl Store for SqliteStore {
    fn find_by_content(&self, content: &str) -> Result<Option<ClipboardEntry>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, content, timestamp, is_favourite FROM entries WHERE content = ?1",
        )?;
        let mut rows = stmt.query_map(params![content], Self::row_to_entry)?;
        match rows.next() {
            Some(entry) => Ok(Some(entry?)),
            None => Ok(None),
        }
    }

    fn get(&self, id: i64) -> Result<Option<ClipboardEntry>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, content, timestamp, is_favourite FROM entries WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], Self::row_to_entry)?;
        match rows.next() {
            Some(entry) => Ok(Some(entry?)),
            None => Ok(None),
        }
    }

    fn upsert(&mut self, entry: &ClipboardEntry) -> Result<ClipboardEntry, StoreError> {
        // MAX works because timestamps are stored fixed-width RFC 3339, so
        // lexicographic order equals chronological order. A racing touch can
        // never move an entry backwards.
        self.conn.execute(
            "INSERT INTO entries (content, timestamp, is_favourite) VALUES (?1, ?2, ?3)
             ON CONFLICT(content) DO UPDATE SET
                 timestamp = MAX(entries.timestamp, excluded.timestamp),
                 is_favourite = excluded.is_favourite",
            params![
                entry.content,
                format_datetime(entry.timestamp),
                entry.is_favourite as i32,
            ],
        )?;
        match self.find_by_content(&entry.content)? {
            Some(stored) => Ok(stored),
            None => Err(StoreError::Backend(
                "upserted entry vanished before read-back".to_string(),
            )),
        }
    }

    fn list_all(&self) -> Result<Vec<ClipboardEntry>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, content, timestamp, is_favourite FROM entries")?;
        let rows = stmt.query_map([], Self::row_to_entry)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?)
    }
}

/// In-memory store with the same semantics as [`SqliteStore`]. Used in tests
/// and by embedders that do not want durability.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, ClipboardEntry>,
    next_id: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn find_by_content(&self, content: &str) -> Result<Option<ClipboardEntry>, StoreError> {
        Ok(self.entries.get(content).cloned())
    }

    fn get(&self, id: i64) -> Result<Option<ClipboardEntry>, StoreError> {
        Ok(self.entries.values().find(|e| e.id == id).cloned())
    }

    fn upsert(&mut self, entry: &ClipboardEntry) -> Result<ClipboardEntry, StoreError> {
        let stored = match self.entries.get_mut(&entry.content) {
            Some(existing) => {
                if entry.timestamp > existing.timestamp {
                    existing.timestamp = entry.timestamp;
                }
                existing.is_favourite = entry.is_favourite;
                existing.clone()
            }
            None => {
                self.next_id += 1;
                let mut stored = entry.clone();
                stored.id = self.next_id;
                self.entries.insert(entry.content.clone(), stored.clone());
                stored
            }
        };
        Ok(stored)
    }

    fn list_all(&self) -> Result<Vec<ClipboardEntry>, StoreError> {
        Ok(self.entries.values().cloned().collect())
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.entries.len())
    }
}

fn format_datetime(ts: DateTime<Utc>) -> String {
    // Fixed-width form so TEXT comparison in SQL matches chronological order.
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn memory_upsert_assigns_increasing_ids() {
        let mut store = MemoryStore::new();
        let a = store.upsert(&ClipboardEntry::new("A")).unwrap();
        let b = store.upsert(&ClipboardEntry::new("B")).unwrap();
        assert!(b.id > a.id);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn memory_upsert_same_content_keeps_one_entry_and_id() {
        let mut store = MemoryStore::new();
        let first = store.upsert(&ClipboardEntry::new("hello")).unwrap();
        let second = store.upsert(&ClipboardEntry::new("hello")).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn memory_upsert_never_moves_timestamp_backwards() {
        let mut store = MemoryStore::new();
        let stored = store.upsert(&ClipboardEntry::new("x")).unwrap();

        let mut stale = stored.clone();
        stale.timestamp = stored.timestamp - Duration::seconds(60);
        let after = store.upsert(&stale).unwrap();
        assert_eq!(after.timestamp, stored.timestamp);
    }

    #[test]
    fn memory_get_by_id_and_missing_id() {
        let mut store = MemoryStore::new();
        let stored = store.upsert(&ClipboardEntry::new("x")).unwrap();
        assert_eq!(store.get(stored.id).unwrap().unwrap().content, "x");
        assert!(store.get(9999).unwrap().is_none());
    }

    #[test]
    fn sqlite_round_trip_preserves_fields() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut entry = ClipboardEntry::new("some copied text");
        entry.is_favourite = true;
        let stored = store.upsert(&entry).unwrap();

        let fetched = store.get(stored.id).unwrap().unwrap();
        assert_eq!(fetched.content, "some copied text");
        assert!(fetched.is_favourite);
        assert_eq!(fetched.timestamp, stored.timestamp);
    }

    #[test]
    fn sqlite_conflict_bumps_timestamp_but_keeps_id() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let first = store.upsert(&ClipboardEntry::new("dup")).unwrap();

        let mut newer = ClipboardEntry::new("dup");
        newer.timestamp = first.timestamp + Duration::seconds(5);
        let second = store.upsert(&newer).unwrap();

        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(first.id, second.id);
        assert!(second.timestamp > first.timestamp);
    }

    #[test]
    fn sqlite_conflict_never_moves_timestamp_backwards() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let first = store.upsert(&ClipboardEntry::new("dup")).unwrap();

        let mut stale = first.clone();
        stale.timestamp = first.timestamp - Duration::seconds(5);
        let second = store.upsert(&stale).unwrap();
        assert_eq!(second.timestamp, first.timestamp);
    }

    #[test]
    fn sqlite_timestamp_text_sorts_chronologically() {
        // Sub-second precision must survive the TEXT round trip, otherwise
        // rapid touches would compare equal in the conflict clause.
        use chrono::TimeZone;
        let ts = Utc.timestamp_opt(1_700_000_000, 123_456_000).unwrap();
        let formatted = format_datetime(ts);
        let later = format_datetime(ts + Duration::microseconds(1));
        assert!(later > formatted);
        assert_eq!(parse_datetime(formatted), ts);
    }
}
