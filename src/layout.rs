// ABOUTME: Owns the on-disk layout below the deployments root.
// ABOUTME: Computes per-release directories, the clone cache and the current-release symlink path.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Directory below the root that holds the persistent working clone.
pub const CLONE_CACHE_DIR_NAME: &str = ".cache_clone";

/// Absolute paths of everything the agent touches on disk.
///
/// Immutable after construction. The root contains one directory per
/// deployed release (named by its decimal release id), the clone cache
/// and the symlink consumers follow to reach the active release.
#[derive(Debug, Clone)]
pub struct PathLayout {
    root: PathBuf,
    clone_cache: PathBuf,
    current_link: PathBuf,
}

impl PathLayout {
    /// Builds the layout below `root`, which must be an absolute path.
    pub fn new(root: impl Into<PathBuf>, link_name: &str) -> Result<Self> {
        let root = root.into();
        if !root.is_absolute() {
            return Err(Error::InvalidConfig(format!(
                "deploy base directory must be absolute, got {}",
                root.display()
            )));
        }

        let clone_cache = root.join(CLONE_CACHE_DIR_NAME);
        let current_link = root.join(link_name);
        Ok(Self {
            root,
            clone_cache,
            current_link,
        })
    }

    /// Creates the deployments root if it does not exist yet.
    ///
    /// The clone cache itself is intentionally not created here: its absence
    /// is how the repo-init stage distinguishes "never cloned" from "clone
    /// directory exists".
    pub fn create_if_missing(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|err| {
            Error::InvalidConfig(format!(
                "unable to create deploy base directory {}: {}",
                self.root.display(),
                err
            ))
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn clone_cache(&self) -> &Path {
        &self.clone_cache
    }

    pub fn current_link(&self) -> &Path {
        &self.current_link
    }

    /// The working-copy directory for the release with the given id.
    pub fn release_dir(&self, release_id: u64) -> PathBuf {
        self.root.join(release_id.to_string())
    }

    /// Resolves the id of the currently linked release by parsing the file
    /// name of the symlink target. `None` if the link is absent or does not
    /// point at a release directory.
    pub fn current_release_id(&self) -> Option<u64> {
        let target = fs::read_link(&self.current_link).ok()?;
        target.file_name()?.to_str()?.parse().ok()
    }
}
