/// State management module
///
/// This module handles all catalog state, including:
/// - Database connections and queries (library.rs)
/// - Shared data structures (data.rs)
/// - User metadata edits (edit.rs)

pub mod data;
pub mod edit;
pub mod library;
