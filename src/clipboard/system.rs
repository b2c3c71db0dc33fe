use arboard::Clipboard;

use crate::clipboard::ClipboardPort;
use crate::error::ClipboardError;

/// System clipboard backed by `arboard`.
pub struct SystemClipboard {
    clipboard: Clipboard,
}

impl SystemClipboard {
    pub fn new() -> Result<Self, ClipboardError> {
        let clipboard = Clipboard::new().map_err(ClipboardError::Init)?;
        Ok(Self { clipboard })
    }
}

impl ClipboardPort for SystemClipboard {
    fn read_text(&mut self) -> Result<Option<String>, ClipboardError> {
        match self.clipboard.get_text() {
            Ok(text) => Ok(Some(text)),
            // Empty clipboard, or non-text content we do not handle.
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(e) => Err(ClipboardError::Read(e)),
        }
    }

    fn write_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        self.clipboard.set_text(text).map_err(ClipboardError::Write)
    }
}
