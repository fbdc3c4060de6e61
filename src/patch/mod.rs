/// Patch file handling module
///
/// This module handles:
/// - Fingerprinting patch files for de-duplication
/// - Discovering banks and patches on disk and importing them
/// - Exporting selected patches to a fresh directory tree

pub mod checksum;
pub mod export;
pub mod importer;
