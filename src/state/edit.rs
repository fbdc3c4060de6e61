/// User metadata edits for cataloged patches
///
/// An edit is a sparse set of fields: every field that is `None` keeps
/// the value already stored for the patch. Edits arrive as JSON from the
/// presentation layer and are merged onto the stored row by the library.
use serde::{Deserialize, Serialize};

use super::data::Patch;
use super::library::Library;
use crate::error::Result;

/// Partial update of a patch's user-editable fields.
///
/// The checksum is the de-duplication key and cannot be edited.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PatchUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loved: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom: Option<bool>,
}

impl PatchUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse from JSON string (from the editing surface)
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merge the set fields onto `patch`
    pub fn apply(&self, patch: &mut Patch) {
        // Destructure so a new field can't be silently ignored here
        let PatchUpdate {
            name,
            loved,
            category,
            tags,
            bank,
            library,
            custom,
        } = self;

        if let Some(name) = name {
            patch.name = name.clone();
        }
        if let Some(loved) = loved {
            patch.loved = *loved;
        }
        if let Some(category) = category {
            patch.category = category.clone();
        }
        if let Some(tags) = tags {
            patch.tags = tags.clone();
        }
        if let Some(bank) = bank {
            patch.bank = bank.clone();
        }
        if let Some(library) = library {
            patch.library = library.clone();
        }
        if let Some(custom) = custom {
            patch.custom = *custom;
        }
    }
}

/// Apply a user edit to the patch stored at `path`.
///
/// Returns `false` when no patch is cataloged at that path.
pub fn update_patch(library: &mut Library, path: &str, update: &PatchUpdate) -> Result<bool> {
    library.update_patch_metadata(path, update)
}
