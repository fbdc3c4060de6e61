//! Patch catalog engine.
//!
//! Scans synthesizer patch banks on disk, fingerprints every patch file and
//! stores the de-duplicated result in a SQLite catalog of patches, banks and
//! their associations.

pub mod error;
pub mod patch;
pub mod state;

pub use error::{CatalogError, Result};
pub use patch::importer::{import_patches_from_directory, import_selected};
pub use state::data::{Bank, Patch, PatchFilter};
pub use state::edit::PatchUpdate;
pub use state::library::Library;
