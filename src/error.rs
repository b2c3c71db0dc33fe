use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("failed to initialise clipboard backend: {0}")]
    Init(arboard::Error),

    #[error("clipboard read failed: {0}")]
    Read(arboard::Error),

    #[error("clipboard write failed: {0}")]
    Write(arboard::Error),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("store backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("clipboard error: {0}")]
    Clipboard(#[from] ClipboardError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}
