/// Directory importer
///
/// Discovers banks and patches under a root directory and commits the ones
/// the catalog doesn't have yet. Expected layout:
///
/// ```text
/// <root>/[library/]<bank dir>/<name>.bank
/// <root>/[library/]<bank dir>/patchNN/<patch name>.mmp
/// ```
///
/// The bank takes its name from the `.bank` marker file, not from its
/// directory. All name matching is case-sensitive except the `user`
/// prefix that marks a custom bank.
use std::collections::HashSet;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tokio::task;
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

use super::checksum::calculate_checksum;
use crate::error::Result;
use crate::state::data::{Bank, Patch};
use crate::state::library::Library;

/// Subdirectory that, when present, is used as the scan root
pub const LIBRARY_DIR: &str = "library";
/// Marker file extension that makes a directory a bank
pub const BANK_EXTENSION: &str = ".bank";
/// Prefix of patch directories inside a bank
pub const PATCH_DIR_PREFIX: &str = "patch";
/// Patch file extension
pub const PATCH_EXTENSION: &str = ".mmp";

/// A bank directory and the patch files found in it
#[derive(Debug)]
struct DiscoveredBank {
    bank: Bank,
    patches: Vec<Patch>,
}

/// Import every new patch found under `root`, labelling them with `library_name`.
///
/// Returns only the patches that were added; running it again over an
/// unchanged tree returns an empty list. The filesystem scan runs on the
/// blocking pool, catalog writes happen on the caller's store handle.
pub async fn import_patches_from_directory(
    root: impl AsRef<Path>,
    library_name: &str,
    library: &mut Library,
) -> Result<Vec<Patch>> {
    let root = root.as_ref().to_path_buf();
    let scan_label = library_name.to_string();

    info!("Scanning {} for patch banks", root.display());
    let discovered = task::spawn_blocking(move || scan_directory(&root, &scan_label)).await??;

    let mut patches: Vec<Patch> = Vec::new();
    let mut seen = HashSet::new();
    let mut skipped = 0;

    for found in discovered {
        // Banks are recorded even when every patch in them is already known
        library.save_bank(&found.bank)?;
        debug!(
            "Processing bank: {} (custom: {})",
            found.bank.name, found.bank.custom
        );

        for candidate in found.patches {
            if library.patch_exists(&candidate.checksum)? || !seen.insert(candidate.checksum.clone())
            {
                debug!("Skipping duplicate patch: {}", candidate.path);
                skipped += 1;
                continue;
            }
            patches.push(candidate);
        }
    }

    if !patches.is_empty() {
        library.save_patches(&patches)?;

        // Second pass: both endpoints exist now, so the links can be made
        for patch in &patches {
            let bank_id = match library.get_bank(&patch.bank, &patch.library)? {
                Some(Bank { id: Some(id), .. }) => id,
                _ => library.save_bank(&Bank {
                    id: None,
                    name: patch.bank.clone(),
                    library: patch.library.clone(),
                    custom: patch.custom,
                })?,
            };
            library.associate_patch_with_bank(&patch.path, bank_id)?;
        }
    }

    info!(
        "Import complete: {} new, {} skipped",
        patches.len(),
        skipped
    );
    Ok(patches)
}

/// Import from a directory picked by the user.
///
/// `None` means nothing was picked and imports nothing. The library label
/// is the picked directory's own name.
pub async fn import_selected(
    selection: Option<PathBuf>,
    library: &mut Library,
) -> Result<Vec<Patch>> {
    let Some(root) = selection else {
        info!("No directory selected, nothing to import");
        return Ok(Vec::new());
    };

    let library_name = root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.to_string_lossy().into_owned());

    import_patches_from_directory(&root, &library_name, library).await
}

/// Walk the bank structure under `root` and fingerprint every candidate.
/// Pure filesystem work; nothing is checked against the catalog here.
fn scan_directory(root: &Path, library_name: &str) -> Result<Vec<DiscoveredBank>> {
    let root = if root.is_absolute() {
        root.to_path_buf()
    } else {
        env::current_dir()?.join(root)
    };

    if !fs::metadata(&root)?.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("not a directory: {}", root.display()),
        )
        .into());
    }

    let mut entries = list_dir(&root)?;
    let library_dir = entries
        .iter()
        .find(|e| e.file_type().is_dir() && e.file_name() == LIBRARY_DIR)
        .map(|e| e.path().to_path_buf());
    if let Some(library_dir) = library_dir {
        info!("Using {} as root directory", library_dir.display());
        entries = list_dir(&library_dir)?;
    }

    let mut banks = Vec::new();
    for entry in entries.into_iter().filter(|e| e.file_type().is_dir()) {
        if let Some(found) = scan_bank(entry.path(), library_name)? {
            banks.push(found);
        } else {
            debug!("No {} file in {}, skipping", BANK_EXTENSION, entry.path().display());
        }
    }

    info!("Found {} bank directories", banks.len());
    Ok(banks)
}

/// Scan one directory; `None` if it holds no bank marker file
fn scan_bank(bank_dir: &Path, library_name: &str) -> Result<Option<DiscoveredBank>> {
    let entries = list_dir(bank_dir)?;

    // Listings are sorted, so the first marker is the lexicographically first
    let Some(bank_name) = entries
        .iter()
        .filter(|e| e.file_type().is_file())
        .find_map(|e| strip_extension(e, BANK_EXTENSION))
    else {
        return Ok(None);
    };

    let bank = Bank::new(bank_name, library_name);
    let mut patches = Vec::new();

    for patch_dir in entries.iter().filter(|e| {
        e.file_type().is_dir() && e.file_name().to_string_lossy().starts_with(PATCH_DIR_PREFIX)
    }) {
        for file in list_dir(patch_dir.path())? {
            if !file.file_type().is_file() {
                continue;
            }
            let Some(name) = strip_extension(&file, PATCH_EXTENSION) else {
                continue;
            };

            patches.push(Patch {
                path: file.path().to_string_lossy().into_owned(),
                name,
                loved: false,
                category: String::new(),
                tags: vec![bank.name.clone()],
                bank: bank.name.clone(),
                library: bank.library.clone(),
                checksum: calculate_checksum(file.path())?,
                custom: bank.custom,
            });
        }
    }

    debug!("Bank {}: {} candidate patches", bank.name, patches.len());
    Ok(Some(DiscoveredBank { bank, patches }))
}

/// Immediate children of `dir`, sorted by file name
fn list_dir(dir: &Path) -> Result<Vec<DirEntry>> {
    let entries = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .collect::<std::result::Result<Vec<_>, walkdir::Error>>()?;
    Ok(entries)
}

/// File name without `extension`, if it has it
fn strip_extension(entry: &DirEntry, extension: &str) -> Option<String> {
    entry
        .file_name()
        .to_string_lossy()
        .strip_suffix(extension)
        .map(str::to_string)
}
