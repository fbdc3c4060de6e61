/// Shared data structures for the catalog state
///
/// These structs represent the data model that flows between
/// the database layer, the importer and the command-line shell.
use serde::{Deserialize, Serialize};

/// Bank names starting with this prefix (any case) are user-authored
pub const CUSTOM_BANK_PREFIX: &str = "user";

/// Represents a single imported patch file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    /// Absolute path to the patch file (primary key)
    pub path: String,
    /// File name without extension (e.g., "vox humana")
    pub name: String,
    /// User favorite flag
    pub loved: bool,
    /// User-assigned taxonomy label, empty when unset
    pub category: String,
    /// Labels; seeded with the owning bank's name on import
    pub tags: Vec<String>,
    /// Owning bank name at import time
    pub bank: String,
    /// Library label of the import run
    pub library: String,
    /// Hex MD5 of (directory, content), unique across the catalog
    pub checksum: String,
    /// True if the owning bank is user-authored
    pub custom: bool,
}

/// A named collection of patches found together under one marker file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bank {
    /// Store-assigned id; `None` until the bank has been saved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub library: String,
    pub custom: bool,
}

impl Bank {
    /// Build an unsaved bank, classifying it from its name
    pub fn new(name: impl Into<String>, library: impl Into<String>) -> Self {
        let name = name.into();
        let custom = is_custom_bank(&name);
        Self {
            id: None,
            name,
            library: library.into(),
            custom,
        }
    }
}

/// A bank is custom when its name, lower-cased, starts with "user"
pub fn is_custom_bank(name: &str) -> bool {
    name.to_lowercase().starts_with(CUSTOM_BANK_PREFIX)
}

/// List filter over already-loaded patches.
///
/// Criteria are ANDed. `loved` and `custom` only restrict when true,
/// string criteria must match exactly, `tag` matches any of a patch's tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchFilter {
    pub loved: bool,
    pub custom: bool,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub bank: Option<String>,
    pub library: Option<String>,
}

impl PatchFilter {
    pub fn matches(&self, patch: &Patch) -> bool {
        if self.loved && !patch.loved {
            return false;
        }
        if self.custom && !patch.custom {
            return false;
        }
        if let Some(category) = &self.category {
            if &patch.category != category {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !patch.tags.iter().any(|t| t == tag) {
                return false;
            }
        }
        if let Some(bank) = &self.bank {
            if &patch.bank != bank {
                return false;
            }
        }
        if let Some(library) = &self.library {
            if &patch.library != library {
                return false;
            }
        }
        true
    }

    /// Keep only the matching patches, preserving their order
    pub fn apply(&self, patches: Vec<Patch>) -> Vec<Patch> {
        patches.into_iter().filter(|p| self.matches(p)).collect()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
