// ABOUTME: Brings the release directory's working tree onto the released tag.
// ABOUTME: Fetches tags, prunes deleted refs and hard-resets to the tag name.

use std::sync::Arc;

use async_trait::async_trait;

use crate::git;
use crate::pipeline::{ChainValue, ExecutionContext, Stage, StageError, StageFlow};

/// Materializes the tagged revision inside the copied repository.
pub struct Checkout;

#[async_trait]
impl Stage for Checkout {
    fn name(&self) -> &str {
        "Checkout"
    }

    async fn execute(
        &self,
        _ctx: &Arc<ExecutionContext>,
        input: ChainValue,
    ) -> Result<StageFlow, StageError> {
        let (release, dir) = input.expect_staged()?;

        git::fetch_tags_prune(&dir).await?;
        git::reset_hard(&dir, &release.tag_name).await?;

        Ok(StageFlow::Next(ChainValue::Staged { release, dir }))
    }
}
