/// Error type shared by the catalog store, the importer and the exporter.
///
/// Duplicate rows and unknown paths are not errors; they are reported through
/// return values (`Ok(false)`, `None`). Everything here is fatal to the
/// operation that raised it.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// Unreadable patch file or directory, failed copy during export
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Storage-engine failure (corruption, locked file, constraint we don't absorb)
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Tag list or partial update that isn't valid JSON
    #[error("Invalid JSON: {0}")]
    Tags(#[from] serde_json::Error),

    /// The blocking scan task panicked or was cancelled
    #[error("Import task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<walkdir::Error> for CatalogError {
    fn from(err: walkdir::Error) -> Self {
        CatalogError::Io(err.into())
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
