// ABOUTME: Activates a prepared release by re-pointing the current symlink at it.
// ABOUTME: Also creates the configured auxiliary symlinks inside the release directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::layout::PathLayout;
use crate::pipeline::{ChainValue, ExecutionContext, Stage, StageError, StageFlow};

/// Flips the current-release symlink to the staged directory.
///
/// Replacement is delete-then-create; no other deployment can race this
/// because the supervisor serializes chains.
pub struct SymlinkFlip {
    layout: Arc<PathLayout>,
    additional_symlinks: Vec<(String, PathBuf)>,
}

impl SymlinkFlip {
    pub fn new(layout: Arc<PathLayout>, additional_symlinks: Vec<(String, PathBuf)>) -> Self {
        Self {
            layout,
            additional_symlinks,
        }
    }
}

/// Removes an existing link and creates a fresh one pointing at `target`.
fn replace_symlink(link: &Path, target: &Path) -> std::io::Result<()> {
    if link.symlink_metadata().is_ok() {
        symlink::remove_symlink_auto(link)?;
    }
    symlink::symlink_auto(target, link)
}

#[async_trait]
impl Stage for SymlinkFlip {
    fn name(&self) -> &str {
        "Symlink Flip"
    }

    async fn execute(
        &self,
        _ctx: &Arc<ExecutionContext>,
        input: ChainValue,
    ) -> Result<StageFlow, StageError> {
        let (release, dir) = input.expect_staged()?;

        replace_symlink(self.layout.current_link(), &dir)?;
        tracing::info!(
            "current release now points at {} (release {})",
            dir.display(),
            release.id
        );

        for (name, target) in &self.additional_symlinks {
            let link = dir.join(name);
            if let Some(parent) = link.parent() {
                std::fs::create_dir_all(parent)?;
            }
            replace_symlink(&link, target)?;
        }

        Ok(StageFlow::Next(ChainValue::Release(release)))
    }
}
