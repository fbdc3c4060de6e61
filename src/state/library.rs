use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::data::{Bank, Patch};
use super::edit::PatchUpdate;
use crate::error::Result;

/// Column list shared by every query that builds a `Patch`
const PATCH_COLUMNS: &str = "path, name, loved, category, tags, bank, library, checksum, custom";

/// The Library manages the SQLite patch catalog.
/// It stores patches, the banks they were found in, and the links between them.
pub struct Library {
    conn: Connection,
    db_path: Option<PathBuf>,
}

impl Library {
    /// Open the catalog at its default location.
    ///
    /// The database file is created in the user's data directory:
    /// - Linux: ~/.local/share/patch-librarian/patches.db
    /// - macOS: ~/Library/Application Support/patch-librarian/patches.db
    /// - Windows: %APPDATA%\patch-librarian\patches.db
    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_db_path())
    }

    /// Get the path where the database is stored by default
    pub fn default_db_path() -> PathBuf {
        let mut path = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));

        path.push("patch-librarian");
        path.push("patches.db");
        path
    }

    /// Open or create a catalog file and initialize its schema
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&db_path)?;
        info!("Catalog opened at {}", db_path.display());

        Self::init(conn, Some(db_path))
    }

    /// Catalog that lives only as long as the handle, for tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, db_path: Option<PathBuf>) -> Result<Self> {
        // SQLite leaves foreign keys off unless asked, and the cascades depend on them
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let library = Library { conn, db_path };
        library.init_schema()?;
        Ok(library)
    }

    /// Create the patches, banks and patch_banks tables if they don't exist.
    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS patches (
                path        TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                loved       INTEGER NOT NULL DEFAULT 0,
                category    TEXT NOT NULL DEFAULT '',
                tags        TEXT NOT NULL DEFAULT '[]',
                bank        TEXT NOT NULL DEFAULT '',
                library     TEXT NOT NULL DEFAULT '',
                checksum    TEXT NOT NULL UNIQUE,
                custom      INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS banks (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL,
                library     TEXT NOT NULL,
                custom      INTEGER NOT NULL DEFAULT 0,
                UNIQUE(name, library)
            );

            CREATE TABLE IF NOT EXISTS patch_banks (
                patch_path  TEXT NOT NULL REFERENCES patches(path) ON DELETE CASCADE,
                bank_id     INTEGER NOT NULL REFERENCES banks(id) ON DELETE CASCADE,
                PRIMARY KEY (patch_path, bank_id)
            );

            CREATE INDEX IF NOT EXISTS idx_patch_banks_bank_id
             ON patch_banks(bank_id);",
        )?;

        debug!("Catalog schema initialized");
        Ok(())
    }

    /// Path of the database file, `None` for an in-memory catalog
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub fn patch_count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM patches", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn bank_count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM banks", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Insert a patch unless one with the same checksum is already cataloged.
    ///
    /// A new patch also gets its bank (created if needed) and the link
    /// between the two, all in one transaction. Returns whether the patch
    /// was inserted; a duplicate checksum is not an error.
    pub fn save_patch(&mut self, patch: &Patch) -> Result<bool> {
        let tx = self.conn.transaction()?;
        let inserted = save_patch_in(&tx, patch)?;
        tx.commit()?;

        if !inserted {
            debug!("Skipping duplicate patch: {}", patch.path);
        }
        Ok(inserted)
    }

    /// Save every patch as one unit: either all new patches land or none do.
    /// Returns how many were inserted.
    pub fn save_patches(&mut self, patches: &[Patch]) -> Result<usize> {
        let tx = self.conn.transaction()?;

        let mut inserted = 0;
        for patch in patches {
            if save_patch_in(&tx, patch)? {
                inserted += 1;
            }
        }

        tx.commit()?;
        debug!("Saved {} of {} patches", inserted, patches.len());
        Ok(inserted)
    }

    /// Get all patches. Row order is unspecified.
    pub fn load_patches(&self) -> Result<Vec<Patch>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {PATCH_COLUMNS} FROM patches"))?;

        let patches = stmt
            .query_map([], patch_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(patches)
    }

    /// Look up one patch by its path
    pub fn get_patch(&self, path: &str) -> Result<Option<Patch>> {
        get_patch_in(&self.conn, path)
    }

    pub fn patch_exists(&self, checksum: &str) -> Result<bool> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM patches WHERE checksum = ?1)",
            params![checksum],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Create the bank if (name, library) is new; return its id either way
    pub fn save_bank(&self, bank: &Bank) -> Result<i64> {
        upsert_bank(&self.conn, &bank.name, &bank.library, bank.custom)
    }

    pub fn load_banks(&self) -> Result<Vec<Bank>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, library, custom FROM banks ORDER BY id")?;

        let banks = stmt
            .query_map([], bank_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(banks)
    }

    pub fn get_bank(&self, name: &str, library: &str) -> Result<Option<Bank>> {
        let bank = self
            .conn
            .query_row(
                "SELECT id, name, library, custom FROM banks WHERE name = ?1 AND library = ?2",
                params![name, library],
                bank_from_row,
            )
            .optional()?;
        Ok(bank)
    }

    /// Link a patch to a bank; linking twice is a no-op
    pub fn associate_patch_with_bank(&self, patch_path: &str, bank_id: i64) -> Result<()> {
        link_patch(&self.conn, patch_path, bank_id)
    }

    /// All patches linked to the given bank
    pub fn get_patches_for_bank(&self, bank_id: i64) -> Result<Vec<Patch>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.path, p.name, p.loved, p.category, p.tags, p.bank, p.library, p.checksum, p.custom
             FROM patches p
             JOIN patch_banks pb ON p.path = pb.patch_path
             WHERE pb.bank_id = ?1",
        )?;

        let patches = stmt
            .query_map(params![bank_id], patch_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(patches)
    }

    /// Merge a partial update onto the patch stored at `path`.
    /// Returns `false` (and changes nothing) if no such patch exists.
    pub fn update_patch_metadata(&mut self, path: &str, update: &PatchUpdate) -> Result<bool> {
        let tx = self.conn.transaction()?;

        let Some(mut patch) = get_patch_in(&tx, path)? else {
            debug!("No patch at {}, update ignored", path);
            return Ok(false);
        };
        update.apply(&mut patch);

        tx.execute(
            "UPDATE patches
             SET name = ?1, loved = ?2, category = ?3, tags = ?4,
                 bank = ?5, library = ?6, custom = ?7
             WHERE path = ?8",
            params![
                patch.name,
                to_flag(patch.loved),
                patch.category,
                encode_tags(&patch.tags)?,
                patch.bank,
                patch.library,
                to_flag(patch.custom),
                path,
            ],
        )?;
        tx.commit()?;

        Ok(true)
    }

    /// Remove a patch; its bank links go with it
    pub fn delete_patch(&self, path: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM patches WHERE path = ?1", params![path])?;
        Ok(deleted > 0)
    }

    /// Remove a bank; its patch links go with it, the patches stay
    pub fn delete_bank(&self, bank_id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM banks WHERE id = ?1", params![bank_id])?;
        Ok(deleted > 0)
    }

    /// Release the database handle
    pub fn close(self) -> Result<()> {
        let db_path = self.db_path.clone();
        self.conn.close().map_err(|(_, err)| err)?;

        if let Some(path) = db_path {
            info!("Catalog closed: {}", path.display());
        }
        Ok(())
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("db_path", &self.db_path)
            .finish()
    }
}

// Booleans are stored as INTEGER 0/1. These two functions are the only
// place that encoding is written or read.
fn to_flag(value: bool) -> i64 {
    i64::from(value)
}

fn from_flag(value: i64) -> bool {
    value != 0
}

fn encode_tags(tags: &[String]) -> Result<String> {
    Ok(serde_json::to_string(tags)?)
}

fn decode_tags(raw: Option<String>, column: usize) -> rusqlite::Result<Vec<String>> {
    match raw.as_deref() {
        None | Some("") => Ok(Vec::new()),
        Some(json) => serde_json::from_str(json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e))),
    }
}

/// Map a row selected with `PATCH_COLUMNS` order
fn patch_from_row(row: &Row<'_>) -> rusqlite::Result<Patch> {
    Ok(Patch {
        path: row.get(0)?,
        name: row.get(1)?,
        loved: from_flag(row.get(2)?),
        category: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        tags: decode_tags(row.get(4)?, 4)?,
        bank: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        library: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        checksum: row.get(7)?,
        custom: from_flag(row.get(8)?),
    })
}

fn bank_from_row(row: &Row<'_>) -> rusqlite::Result<Bank> {
    Ok(Bank {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        library: row.get(2)?,
        custom: from_flag(row.get(3)?),
    })
}

// The helpers below take a plain `&Connection` so they run the same way on
// the main connection and inside a transaction.

fn get_patch_in(conn: &Connection, path: &str) -> Result<Option<Patch>> {
    let patch = conn
        .query_row(
            &format!("SELECT {PATCH_COLUMNS} FROM patches WHERE path = ?1"),
            params![path],
            patch_from_row,
        )
        .optional()?;
    Ok(patch)
}

/// Insert the patch row only; a checksum conflict leaves the existing row in place
fn insert_patch(conn: &Connection, patch: &Patch) -> Result<bool> {
    let inserted = conn.execute(
        &format!(
            "INSERT INTO patches ({PATCH_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(checksum) DO NOTHING"
        ),
        params![
            patch.path,
            patch.name,
            to_flag(patch.loved),
            patch.category,
            encode_tags(&patch.tags)?,
            patch.bank,
            patch.library,
            patch.checksum,
            to_flag(patch.custom),
        ],
    )?;
    Ok(inserted > 0)
}

fn upsert_bank(conn: &Connection, name: &str, library: &str, custom: bool) -> Result<i64> {
    conn.execute(
        "INSERT INTO banks (name, library, custom) VALUES (?1, ?2, ?3)
         ON CONFLICT(name, library) DO NOTHING",
        params![name, library, to_flag(custom)],
    )?;

    let id = conn.query_row(
        "SELECT id FROM banks WHERE name = ?1 AND library = ?2",
        params![name, library],
        |row| row.get(0),
    )?;
    Ok(id)
}

fn link_patch(conn: &Connection, patch_path: &str, bank_id: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO patch_banks (patch_path, bank_id) VALUES (?1, ?2)",
        params![patch_path, bank_id],
    )?;
    Ok(())
}

fn save_patch_in(conn: &Connection, patch: &Patch) -> Result<bool> {
    if !insert_patch(conn, patch)? {
        return Ok(false);
    }

    let bank_id = upsert_bank(conn, &patch.bank, &patch.library, patch.custom)?;
    link_patch(conn, &patch.path, bank_id)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogError;
    use tempfile::TempDir;

    fn patch(path: &str, checksum: &str, bank: &str) -> Patch {
        let name = Path::new(path)
            .file_stem()
            .unwrap()
            .to_string_lossy()
            .to_string();
        Patch {
            path: path.to_string(),
            name,
            loved: false,
            category: String::new(),
            tags: vec![bank.to_string()],
            bank: bank.to_string(),
            library: "Library".to_string(),
            checksum: checksum.to_string(),
            custom: false,
        }
    }

    #[test]
    fn test_save_patch_creates_bank_and_link() {
        let mut library = Library::open_in_memory().unwrap();
        let vox = patch("/lib/bank01/patch01/vox humana.mmp", "aaa", "muse");

        assert!(library.save_patch(&vox).unwrap());
        assert!(library.patch_exists("aaa").unwrap());

        let bank = library.get_bank("muse", "Library").unwrap().unwrap();
        let linked = library.get_patches_for_bank(bank.id.unwrap()).unwrap();
        assert_eq!(linked, vec![vox]);
    }

    #[test]
    fn test_duplicate_checksum_existing_row_wins() {
        let mut library = Library::open_in_memory().unwrap();
        let first = patch("/a/patch01/lead.mmp", "same", "muse");
        let second = patch("/b/patch01/other lead.mmp", "same", "muse");

        assert!(library.save_patch(&first).unwrap());
        assert!(!library.save_patch(&second).unwrap());

        let patches = library.load_patches().unwrap();
        assert_eq!(patches, vec![first]);
        assert!(library.patch_exists("same").unwrap());
        assert!(!library.patch_exists("other").unwrap());
    }

    #[test]
    fn test_save_patches_skips_duplicates_in_batch() {
        let mut library = Library::open_in_memory().unwrap();
        let patches = vec![
            patch("/a/patch01/one.mmp", "c1", "muse"),
            patch("/a/patch02/two.mmp", "c2", "muse"),
            patch("/a/patch03/two copy.mmp", "c2", "muse"),
        ];

        assert_eq!(library.save_patches(&patches).unwrap(), 2);
        assert_eq!(library.patch_count().unwrap(), 2);
        assert_eq!(library.save_patches(&patches).unwrap(), 0);
        assert_eq!(library.patch_count().unwrap(), 2);
    }

    #[test]
    fn test_save_patches_is_all_or_nothing() {
        let mut library = Library::open_in_memory().unwrap();
        library
            .save_patch(&patch("/a/patch01/taken.mmp", "old", "muse"))
            .unwrap();

        // Same path with a new checksum is a primary key conflict, not a duplicate
        let batch = vec![
            patch("/a/patch02/fresh.mmp", "new1", "muse"),
            patch("/a/patch01/taken.mmp", "new2", "muse"),
        ];
        let err = library.save_patches(&batch).unwrap_err();
        assert!(matches!(err, CatalogError::Database(_)));

        assert_eq!(library.patch_count().unwrap(), 1);
        assert!(!library.patch_exists("new1").unwrap());
    }

    #[test]
    fn test_save_bank_is_upsert_by_name_and_library() {
        let library = Library::open_in_memory().unwrap();

        let first = library.save_bank(&Bank::new("muse", "Library")).unwrap();
        let again = library.save_bank(&Bank::new("muse", "Library")).unwrap();
        let other = library.save_bank(&Bank::new("muse", "Factory")).unwrap();

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(library.bank_count().unwrap(), 2);

        let banks = library.load_banks().unwrap();
        assert_eq!(banks[0].id, Some(first));
        assert_eq!(banks[0].name, "muse");
        assert_eq!(banks[1].library, "Factory");
        assert!(library.get_bank("classic", "Library").unwrap().is_none());
    }

    #[test]
    fn test_bank_custom_flag_round_trips() {
        let library = Library::open_in_memory().unwrap();
        library.save_bank(&Bank::new("UserBank", "Library")).unwrap();
        library.save_bank(&Bank::new("factorybank", "Library")).unwrap();

        assert!(library.get_bank("UserBank", "Library").unwrap().unwrap().custom);
        assert!(!library.get_bank("factorybank", "Library").unwrap().unwrap().custom);
    }

    #[test]
    fn test_associate_is_idempotent() {
        let mut library = Library::open_in_memory().unwrap();
        let vox = patch("/lib/bank01/patch01/vox.mmp", "v", "muse");
        library.save_patch(&vox).unwrap();

        let other = library.save_bank(&Bank::new("favorites", "Library")).unwrap();
        library.associate_patch_with_bank(&vox.path, other).unwrap();
        library.associate_patch_with_bank(&vox.path, other).unwrap();

        assert_eq!(library.get_patches_for_bank(other).unwrap().len(), 1);
    }

    #[test]
    fn test_associate_unknown_patch_is_rejected() {
        let library = Library::open_in_memory().unwrap();
        let bank = library.save_bank(&Bank::new("muse", "Library")).unwrap();

        let err = library.associate_patch_with_bank("/nowhere.mmp", bank).unwrap_err();
        assert!(matches!(err, CatalogError::Database(_)));
    }

    #[test]
    fn test_deletes_cascade_to_links() {
        let mut library = Library::open_in_memory().unwrap();
        let one = patch("/lib/bank01/patch01/one.mmp", "1", "muse");
        let two = patch("/lib/bank01/patch02/two.mmp", "2", "muse");
        library.save_patches(&[one.clone(), two.clone()]).unwrap();
        let muse = library.get_bank("muse", "Library").unwrap().unwrap().id.unwrap();

        assert!(library.delete_patch(&one.path).unwrap());
        assert!(!library.delete_patch(&one.path).unwrap());
        assert_eq!(library.get_patches_for_bank(muse).unwrap(), vec![two.clone()]);

        assert!(library.delete_bank(muse).unwrap());
        let links: i64 = library
            .conn
            .query_row("SELECT COUNT(*) FROM patch_banks", [], |row| row.get(0))
            .unwrap();
        assert_eq!(links, 0);
        // The patch itself survives its bank
        assert_eq!(library.load_patches().unwrap(), vec![two]);
    }

    #[test]
    fn test_update_preserves_untouched_fields() {
        let mut library = Library::open_in_memory().unwrap();
        let mut vox = patch("/lib/bank01/patch01/vox humana.mmp", "v", "muse");
        vox.custom = true;
        library.save_patch(&vox).unwrap();

        let update = PatchUpdate {
            loved: Some(true),
            category: Some("Choir".to_string()),
            ..Default::default()
        };
        assert!(library.update_patch_metadata(&vox.path, &update).unwrap());

        let stored = library.get_patch(&vox.path).unwrap().unwrap();
        assert!(stored.loved);
        assert_eq!(stored.category, "Choir");
        assert_eq!(stored.name, vox.name);
        assert_eq!(stored.tags, vox.tags);
        assert_eq!(stored.bank, vox.bank);
        assert_eq!(stored.library, vox.library);
        assert_eq!(stored.checksum, vox.checksum);
        assert!(stored.custom);
    }

    #[test]
    fn test_update_unknown_path_is_noop() {
        let mut library = Library::open_in_memory().unwrap();
        let update = PatchUpdate {
            loved: Some(true),
            ..Default::default()
        };
        assert!(!library.update_patch_metadata("/missing.mmp", &update).unwrap());
        assert_eq!(library.patch_count().unwrap(), 0);
    }

    #[test]
    fn test_booleans_and_tags_are_encoded_as_integer_and_json() {
        let mut library = Library::open_in_memory().unwrap();
        let mut vox = patch("/lib/bank01/patch01/vox.mmp", "v", "muse");
        vox.loved = true;
        vox.tags = vec!["muse".to_string(), "choir".to_string()];
        library.save_patch(&vox).unwrap();

        let (loved, custom, tags): (i64, i64, String) = library
            .conn
            .query_row(
                "SELECT loved, custom, tags FROM patches WHERE path = ?1",
                params![vox.path],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!((loved, custom), (1, 0));
        assert_eq!(tags, r#"["muse","choir"]"#);
    }

    #[test]
    fn test_file_catalog_persists_across_close() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("nested").join("patches.db");

        let mut library = Library::open(&db_path).unwrap();
        assert_eq!(library.path(), Some(db_path.as_path()));
        library
            .save_patch(&patch("/lib/bank01/patch01/vox.mmp", "v", "muse"))
            .unwrap();
        library.close().unwrap();

        let reopened = Library::open(&db_path).unwrap();
        assert_eq!(reopened.patch_count().unwrap(), 1);
        assert_eq!(reopened.bank_count().unwrap(), 1);
        reopened.close().unwrap();
    }
}
