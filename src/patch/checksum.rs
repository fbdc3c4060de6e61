/// Patch fingerprinting
///
/// A fingerprint identifies "these bytes in this directory": two identical
/// files shipped in different banks get different fingerprints, while
/// re-reading the same file from the same place gives the same one.
use md5::{Digest, Md5};
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Compute the catalog checksum of a patch file.
///
/// MD5 over the parent directory path followed by the file contents,
/// as 32 lowercase hex characters. Fails if the file can't be read.
pub fn calculate_checksum(patch_path: &Path) -> Result<String> {
    let contents = fs::read(patch_path)?;
    let directory = patch_path
        .parent()
        .map(|dir| dir.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(checksum_of(&directory, &contents))
}

fn checksum_of(directory: &str, contents: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(directory.as_bytes());
    hasher.update(contents);
    format!("{:x}", hasher.finalize())
}
