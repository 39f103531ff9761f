// ABOUTME: Best-effort garbage collection of old release directories.
// ABOUTME: Keeps the newest N releases, never fails the deployment that triggered it.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::fsutil;
use crate::layout::PathLayout;
use crate::pipeline::{ChainValue, ExecutionContext, Stage, StageError, StageFlow};

/// Deletes release directories beyond the retention count.
///
/// Only immediate children of the root whose name parses as a release id are
/// considered, which naturally excludes the clone cache and the current
/// symlink. All failures are logged and swallowed.
pub struct RetentionCleanup {
    layout: Arc<PathLayout>,
    max_stored_releases: Option<usize>,
}

impl RetentionCleanup {
    pub fn new(layout: Arc<PathLayout>, max_stored_releases: Option<usize>) -> Self {
        Self {
            layout,
            max_stored_releases,
        }
    }

    fn discard_exceeding(&self, keep: usize) -> std::io::Result<()> {
        let mut release_dirs: Vec<(u64, PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(self.layout.root())? {
            let entry = entry?;
            let path = entry.path();
            let meta = std::fs::symlink_metadata(&path)?;
            if meta.file_type().is_symlink() || !meta.is_dir() {
                continue;
            }
            let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<u64>().ok())
            else {
                continue;
            };
            release_dirs.push((id, path));
        }

        release_dirs.sort_by(|(left, _), (right, _)| right.cmp(left));
        for (id, path) in release_dirs.into_iter().skip(keep) {
            tracing::info!("discarding stored release {id}");
            if let Err(err) = fsutil::remove_dir_all_force(&path) {
                tracing::warn!("unable to discard release directory {}: {err}", path.display());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Stage for RetentionCleanup {
    fn name(&self) -> &str {
        "Retention Cleanup"
    }

    async fn execute(
        &self,
        _ctx: &Arc<ExecutionContext>,
        input: ChainValue,
    ) -> Result<StageFlow, StageError> {
        if let Some(keep) = self.max_stored_releases {
            if let Err(err) = self.discard_exceeding(keep) {
                tracing::warn!("release retention cleanup failed: {err}");
            }
        }
        Ok(StageFlow::Next(input))
    }
}
