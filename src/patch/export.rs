/// Export selected patches into a fresh bank-numbered tree.
///
/// The i-th patch lands at `<dest>/bankNN/patchNN.mmp` (NN = i, two digits).
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use super::importer::PATCH_EXTENSION;
use crate::error::Result;

/// Copy each patch file into the destination tree, creating directories as needed.
/// Returns the paths written, in input order.
pub fn export_patches(patch_paths: &[String], destination: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(destination)?;

    let mut written = Vec::with_capacity(patch_paths.len());
    for (index, source) in patch_paths.iter().enumerate() {
        let bank_dir = destination.join(format!("bank{index:02}"));
        fs::create_dir_all(&bank_dir)?;

        let target = bank_dir.join(format!("patch{index:02}{PATCH_EXTENSION}"));
        fs::copy(source, &target)?;
        written.push(target);
    }

    info!(
        "Exported {} patches to {}",
        written.len(),
        destination.display()
    );
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogError;
    use tempfile::TempDir;

    #[test]
    fn test_export_layout() {
        let dir = TempDir::new().unwrap();
        let vox = dir.path().join("vox humana.mmp");
        let moog = dir.path().join("moog 55 strings.mmp");
        fs::write(&vox, b"vox").unwrap();
        fs::write(&moog, b"moog").unwrap();

        let dest = dir.path().join("out").join("exported-patches");
        let sources = vec![
            vox.to_string_lossy().into_owned(),
            moog.to_string_lossy().into_owned(),
        ];
        let written = export_patches(&sources, &dest).unwrap();

        assert_eq!(
            written,
            vec![
                dest.join("bank00").join("patch00.mmp"),
                dest.join("bank01").join("patch01.mmp"),
            ]
        );
        assert_eq!(fs::read(&written[0]).unwrap(), b"vox");
        assert_eq!(fs::read(&written[1]).unwrap(), b"moog");
    }

    #[test]
    fn test_export_missing_source_fails() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.mmp").to_string_lossy().into_owned();

        let err = export_patches(&[missing], &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, CatalogError::Io(_)));
    }
}
