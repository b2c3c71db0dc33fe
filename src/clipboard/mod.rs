pub mod system;

pub use system::SystemClipboard;

use crate::error::ClipboardError;

/// Abstraction over the OS clipboard. Only plain text is handled; richer
/// formats (images, file lists) are out of scope for the history core.
///
/// `read_text` returns `Ok(None)` when the clipboard is empty or holds no
/// text, which the engine treats as "no change".
pub trait ClipboardPort {
    fn read_text(&mut self) -> Result<Option<String>, ClipboardError>;

    fn write_text(&mut self, text: &str) -> Result<(), ClipboardError>;
}
