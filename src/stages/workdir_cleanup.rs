// ABOUTME: Strips the repository metadata from a checked-out release directory.
// ABOUTME: Deploy scripts must not be able to run VCS commands by accident.

use std::sync::Arc;

use async_trait::async_trait;

use crate::fsutil;
use crate::pipeline::{ChainValue, ExecutionContext, Stage, StageError, StageFlow};

const GIT_DIR_NAME: &str = ".git";

/// Removes the `.git` directory from the release. Idempotent.
pub struct WorkdirCleanup;

#[async_trait]
impl Stage for WorkdirCleanup {
    fn name(&self) -> &str {
        "Workdir Cleanup"
    }

    async fn execute(
        &self,
        _ctx: &Arc<ExecutionContext>,
        input: ChainValue,
    ) -> Result<StageFlow, StageError> {
        let (release, dir) = input.expect_staged()?;

        fsutil::remove_dir_all_force(&dir.join(GIT_DIR_NAME))?;

        Ok(StageFlow::Next(ChainValue::Staged { release, dir }))
    }
}
