use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::clipboard::ClipboardPort;
use crate::error::{ClipboardError, StoreError};
use crate::store::{ClipboardEntry, Store};

/// Callback fired after any history mutation. The subscriber re-queries the
/// recent/favourites views itself; no payload is carried.
pub type ChangeNotifier = Arc<dyn Fn() + Send + Sync>;

/// The self-write suppression window as a multiple of the poll interval.
/// It must exceed one interval so the poll tick that observes our own write
/// is guaranteed to land inside the window.
const SUPPRESS_INTERVAL_FACTOR: u32 = 2;

/// Watches the clipboard for changes and maintains the deduplicated history.
///
/// All cross-call state (last observed text, the self-write suppression
/// deadline) lives on the instance, so independent engines never interfere.
pub struct HistoryEngine<P, S> {
    port: P,
    store: Arc<Mutex<S>>,
    poll_interval: Duration,
    /// Last clipboard text this engine observed or wrote. Process-local,
    /// never persisted.
    last_seen: Option<String>,
    /// While set and in the future, ticks are skipped. Expiry is a deadline
    /// rather than a deferred clear, so the flag cannot be left stuck.
    suppress_until: Option<Instant>,
    notifier: Option<ChangeNotifier>,
}

impl<P: ClipboardPort, S: Store> HistoryEngine<P, S> {
    pub fn new(port: P, store: Arc<Mutex<S>>, poll_interval: Duration) -> Self {
        Self {
            port,
            store,
            poll_interval,
            last_seen: None,
            suppress_until: None,
            notifier: None,
        }
    }

    pub fn set_notifier(&mut self, notifier: ChangeNotifier) {
        self.notifier = Some(notifier);
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn suppress_window(&self) -> Duration {
        self.poll_interval * SUPPRESS_INTERVAL_FACTOR
    }

    /// Whether a self-write suppression window is currently open.
    pub fn suppression_active(&self) -> bool {
        self.suppress_until.is_some_and(|until| Instant::now() < until)
    }

    /// One poll cycle: read the clipboard and record a change if there is
    /// one. All port/store failures are caught here and logged; a failed
    /// tick leaves the history unchanged and the next tick starts fresh.
    pub fn on_tick(&mut self) {
        if let Some(until) = self.suppress_until {
            if Instant::now() < until {
                tracing::trace!("tick skipped, self-write suppression active");
                return;
            }
            self.suppress_until = None;
        }

        let text = match self.port.read_text() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("clipboard read failed: {e}");
                return;
            }
        };
        let Some(content) = text else {
            return;
        };
        if content.is_empty() {
            return;
        }
        if self.last_seen.as_deref() == Some(content.as_str()) {
            return;
        }

        if let Err(e) = self.upsert_or_touch(&content) {
            tracing::warn!("failed to record clipboard change: {e}");
        }
    }

    /// Record observed clipboard content: bump the timestamp of the existing
    /// entry with equal content, or create a fresh one. Exactly one entry
    /// per content string exists afterwards.
    pub fn upsert_or_touch(&mut self, content: &str) -> Result<ClipboardEntry, StoreError> {
        let stored = {
            let mut store = self.lock_store()?;
            match store.find_by_content(content)? {
                Some(mut entry) => {
                    entry.touch();
                    store.upsert(&entry)?
                }
                None => store.upsert(&ClipboardEntry::new(content))?,
            }
        };
        tracing::debug!(id = stored.id, "clipboard change recorded");
        self.last_seen = Some(content.to_string());
        self.notify();
        Ok(stored)
    }

    /// Copy history content back to the clipboard without re-capturing it.
    ///
    /// The suppression deadline is armed before the write so a tick racing
    /// the write is already covered. `last_seen` is set too: even a tick
    /// landing after the window must not mistake the echo for a new copy.
    pub fn write_to_clipboard(&mut self, content: &str) -> Result<(), ClipboardError> {
        self.suppress_until = Some(Instant::now() + self.suppress_window());
        self.last_seen = Some(content.to_string());
        self.port.write_text(content)
    }

    fn lock_store(&self) -> Result<MutexGuard<'_, S>, StoreError> {
        self.store
            .lock()
            .map_err(|_| StoreError::Backend("store mutex poisoned".to_string()))
    }

    fn notify(&self) {
        if let Some(notifier) = &self.notifier {
            notifier();
        }
    }
}

/// Drives [`HistoryEngine::on_tick`] on a background thread at the engine's
/// poll interval.
pub struct ClipboardMonitor<P, S> {
    engine: Arc<Mutex<HistoryEngine<P, S>>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl<P, S> ClipboardMonitor<P, S>
where
    P: ClipboardPort + Send + 'static,
    S: Store + Send + 'static,
{
    pub fn new(engine: Arc<Mutex<HistoryEngine<P, S>>>) -> Self {
        Self {
            engine,
            stop: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Start polling. Calling this while already running is a no-op.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            tracing::debug!("clipboard monitor already running");
            return;
        }
        let interval = match self.engine.lock() {
            Ok(engine) => engine.poll_interval(),
            Err(_) => {
                tracing::error!("cannot start monitor, engine mutex poisoned");
                return;
            }
        };
        self.stop.store(false, Ordering::Release);

        let engine = Arc::clone(&self.engine);
        let stop = Arc::clone(&self.stop);
        let handle = std::thread::spawn(move || {
            tracing::info!(?interval, "clipboard monitor started");
            while !stop.load(Ordering::Acquire) {
                std::thread::sleep(interval);
                if stop.load(Ordering::Acquire) {
                    break;
                }
                if let Ok(mut engine) = engine.lock() {
                    engine.on_tick();
                }
            }
            tracing::info!("clipboard monitor stopped");
        });
        self.handle = Some(handle);
    }

    /// Stop polling and join the poll thread. After this returns, no further
    /// store writes can originate from this monitor.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl<P, S> Drop for ClipboardMonitor<P, S> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::FakeClipboard;
    use super::*;
    use crate::store::MemoryStore;

    fn engine_with(
        interval: Duration,
    ) -> (
        FakeClipboard,
        Arc<Mutex<MemoryStore>>,
        HistoryEngine<FakeClipboard, MemoryStore>,
    ) {
        let clipboard = FakeClipboard::new();
        let store = Arc::new(Mutex::new(MemoryStore::new()));
        let engine = HistoryEngine::new(clipboard.clone(), Arc::clone(&store), interval);
        (clipboard, store, engine)
    }

    fn count(store: &Arc<Mutex<MemoryStore>>) -> usize {
        store.lock().unwrap().count().unwrap()
    }

    #[test]
    fn tick_captures_new_content_once() {
        let (clipboard, store, mut engine) = engine_with(Duration::from_millis(10));
        clipboard.set("A");
        engine.on_tick();
        engine.on_tick();
        assert_eq!(count(&store), 1);

        clipboard.set("B");
        engine.on_tick();
        assert_eq!(count(&store), 2);
    }

    #[test]
    fn reobserving_touches_instead_of_duplicating() {
        let (clipboard, store, mut engine) = engine_with(Duration::from_millis(10));
        clipboard.set("A");
        engine.on_tick();
        let before = store
            .lock()
            .unwrap()
            .find_by_content("A")
            .unwrap()
            .unwrap();

        std::thread::sleep(Duration::from_millis(2));
        clipboard.set("B");
        engine.on_tick();
        std::thread::sleep(Duration::from_millis(2));
        clipboard.set("A");
        engine.on_tick();

        assert_eq!(count(&store), 2);
        let after = store
            .lock()
            .unwrap()
            .find_by_content("A")
            .unwrap()
            .unwrap();
        assert_eq!(after.id, before.id);
        assert!(after.timestamp > before.timestamp);
    }

    #[test]
    fn empty_clipboard_never_creates_an_entry() {
        let (clipboard, store, mut engine) = engine_with(Duration::from_millis(10));
        engine.on_tick();
        assert_eq!(count(&store), 0);

        clipboard.set("");
        engine.on_tick();
        assert_eq!(count(&store), 0);
    }

    #[test]
    fn self_write_is_suppressed_within_the_window() {
        let (clipboard, store, mut engine) = engine_with(Duration::from_millis(10));
        engine.write_to_clipboard("x").unwrap();
        assert!(engine.suppression_active());
        assert_eq!(clipboard.writes(), vec!["x".to_string()]);

        // The echo tick lands inside the window.
        engine.on_tick();
        assert_eq!(count(&store), 0);
    }

    #[test]
    fn suppression_expires_and_later_ticks_behave_normally() {
        let (clipboard, store, mut engine) = engine_with(Duration::from_millis(10));
        engine.write_to_clipboard("x").unwrap();

        // Window is 2x the interval; wait well past it.
        std::thread::sleep(Duration::from_millis(40));
        assert!(!engine.suppression_active());

        clipboard.set("y");
        engine.on_tick();
        assert_eq!(count(&store), 1);
        assert!(!engine.suppression_active());
    }

    #[test]
    fn echo_after_window_is_not_recaptured() {
        let (clipboard, store, mut engine) = engine_with(Duration::from_millis(10));
        engine.write_to_clipboard("x").unwrap();
        std::thread::sleep(Duration::from_millis(40));

        // Clipboard still holds our own write; last_seen covers it.
        engine.on_tick();
        assert_eq!(count(&store), 0);
        assert_eq!(clipboard.writes(), vec!["x".to_string()]);
    }

    #[test]
    fn notifier_fires_on_capture() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let (clipboard, _store, mut engine) = engine_with(Duration::from_millis(10));
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_in_notifier = Arc::clone(&fired);
        engine.set_notifier(Arc::new(move || {
            fired_in_notifier.fetch_add(1, Ordering::SeqCst);
        }));

        clipboard.set("A");
        engine.on_tick();
        engine.on_tick(); // unchanged, no notification
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn store_failure_is_contained() {
        struct FailingStore;
        impl Store for FailingStore {
            fn find_by_content(
                &self,
                _content: &str,
            ) -> Result<Option<ClipboardEntry>, StoreError> {
                Err(StoreError::Backend("down".to_string()))
            }
            fn get(&self, _id: i64) -> Result<Option<ClipboardEntry>, StoreError> {
                Err(StoreError::Backend("down".to_string()))
            }
            fn upsert(&mut self, _entry: &ClipboardEntry) -> Result<ClipboardEntry, StoreError> {
                Err(StoreError::Backend("down".to_string()))
            }
            fn list_all(&self) -> Result<Vec<ClipboardEntry>, StoreError> {
                Err(StoreError::Backend("down".to_string()))
            }
            fn count(&self) -> Result<usize, StoreError> {
                Err(StoreError::Backend("down".to_string()))
            }
        }

        let clipboard = FakeClipboard::new();
        let store = Arc::new(Mutex::new(FailingStore));
        let mut engine = HistoryEngine::new(clipboard.clone(), store, Duration::from_millis(10));
        clipboard.set("A");
        // Must not panic; the failure is logged and the tick dropped.
        engine.on_tick();
        // last_seen was not advanced, so the content is retried next tick.
        clipboard.set("A");
        engine.on_tick();
    }

    #[test]
    fn monitor_start_is_idempotent_and_stop_halts_writes() {
        let clipboard = FakeClipboard::new();
        let store = Arc::new(Mutex::new(MemoryStore::new()));
        let engine = Arc::new(Mutex::new(HistoryEngine::new(
            clipboard.clone(),
            Arc::clone(&store),
            Duration::from_millis(5),
        )));
        let mut monitor = ClipboardMonitor::new(engine);

        clipboard.set("A");
        monitor.start();
        monitor.start();
        assert!(monitor.is_running());

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(count(&store), 1);

        monitor.stop();
        assert!(!monitor.is_running());

        clipboard.set("B");
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(count(&store), 1);
    }
}
