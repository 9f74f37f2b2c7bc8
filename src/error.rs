use std::path::PathBuf;
use thiserror::Error;

/// Structural problems with persisted data. These abort the load or run.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{path:?} is missing the 'id' column in its header")]
    MissingIdColumn { path: PathBuf },

    #[error("{path:?} has header {found:?}, expected {expected:?}")]
    HeaderMismatch {
        path: PathBuf,
        expected: Vec<String>,
        found: Vec<String>,
    },
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("a sync run is already in progress")]
    AlreadyRunning,
}
