use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{anyhow, Context, Result};

/// A changed file annotated with its CODEOWNERS handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub filename: String,
    /// Owner handles as written in CODEOWNERS (`@user`, `@org/team`), in rule
    /// order. Empty means nobody owns the file.
    pub owners: Vec<String>,
}

/// Resolves the ordered owner handles for a path.
pub trait OwnershipLookup: Send + Sync {
    fn owners_of(&self, path: &str) -> Vec<String>;
}

/// CODEOWNERS-backed lookup for a checked-out repository. Pattern matching
/// (longest-pattern-wins) is delegated to the `codeowners` crate.
pub struct CodeownersLookup {
    owners: codeowners::Owners,
}

impl CodeownersLookup {
    /// Locate and parse the CODEOWNERS file under its conventional locations
    /// (`.github/`, repository root, `docs/`).
    pub fn from_repo_root(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let path = codeowners::locate(root)
            .ok_or_else(|| anyhow!("No CODEOWNERS file found under {}", root.display()))?;
        let file =
            File::open(&path).with_context(|| format!("Failed to open {}", path.display()))?;
        Ok(Self::from_reader(file))
    }

    pub fn from_reader(read: impl Read) -> Self {
        Self {
            owners: codeowners::from_reader(read),
        }
    }
}

impl OwnershipLookup for CodeownersLookup {
    fn owners_of(&self, path: &str) -> Vec<String> {
        self.owners
            .of(path)
            .map(|owners| owners.iter().map(|owner| owner.to_string()).collect())
            .unwrap_or_default()
    }
}
