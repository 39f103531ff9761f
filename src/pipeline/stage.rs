// ABOUTME: Stage abstraction for the deployment pipeline.
// ABOUTME: Stages form a linear chain passing a tagged value from one to the next.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::git::GitError;
use crate::pipeline::ExecutionContext;
use crate::release::Release;
use crate::script::ScriptError;
use crate::source::SourceError;

/// Value flowing between stages of a chain.
///
/// The chain starts with a bare [`Release`]; the repo-init stage upgrades it
/// to a staged value carrying the release directory, and the symlink stage
/// downgrades it again once the directory has been activated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainValue {
    Release(Release),
    Staged { release: Release, dir: PathBuf },
}

impl ChainValue {
    pub fn release(&self) -> &Release {
        match self {
            ChainValue::Release(release) => release,
            ChainValue::Staged { release, .. } => release,
        }
    }

    pub fn into_release(self) -> Release {
        match self {
            ChainValue::Release(release) => release,
            ChainValue::Staged { release, .. } => release,
        }
    }

    /// Unpacks a staged value, failing for stages that require a prepared
    /// release directory but received a bare release.
    pub fn expect_staged(self) -> Result<(Release, PathBuf), StageError> {
        match self {
            ChainValue::Staged { release, dir } => Ok((release, dir)),
            ChainValue::Release(release) => Err(StageError::Failed(format!(
                "release {} reached a directory-bound stage without a prepared directory",
                release.id
            ))),
        }
    }
}

/// How a stage hands control back to the runner.
pub enum StageFlow {
    /// Pass the value to the next stage.
    Next(ChainValue),
    /// The stage parked an async operation via
    /// [`ExecutionContext::await_async`]; the runner resumes when it
    /// completes.
    Awaiting,
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("await requested while the context is {0}")]
    IllegalAwait(&'static str),

    #[error("{0}")]
    Failed(String),
}

/// A named unit of work in the deployment pipeline.
///
/// The display name is stable across runs; lifecycle-event script names are
/// derived from it.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(
        &self,
        ctx: &Arc<ExecutionContext>,
        input: ChainValue,
    ) -> Result<StageFlow, StageError>;
}
