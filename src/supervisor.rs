// ABOUTME: Serializes incoming releases into at most one active deployment.
// ABOUTME: Newer releases cancel the in-flight chain, older ones roll the symlink back.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::layout::PathLayout;
use crate::pipeline::{ChainValue, CompletionHandle, ExecutionContext, Stage};
use crate::release::Release;

struct SupervisorState {
    /// Id of the most recently accepted release. Seeded from the current
    /// symlink on startup, `None` when the agent starts on a clean root.
    last_executed: Option<u64>,
    /// The chain currently owning the filesystem, if any.
    current: Option<(u64, Arc<ExecutionContext>)>,
}

/// Decides for every incoming release whether it starts a forward deploy, a
/// rollback, or nothing, and guarantees that at most one chain mutates the
/// filesystem at any instant.
pub struct ReleaseSupervisor {
    layout: Arc<PathLayout>,
    deploy_stages: Vec<Arc<dyn Stage>>,
    rollback_stages: Vec<Arc<dyn Stage>>,
    state: Mutex<SupervisorState>,
}

impl ReleaseSupervisor {
    pub fn new(
        layout: Arc<PathLayout>,
        deploy_stages: Vec<Arc<dyn Stage>>,
        rollback_stages: Vec<Arc<dyn Stage>>,
    ) -> Self {
        let last_executed = layout.current_release_id();
        match last_executed {
            Some(id) => tracing::info!("resolved last executed release id: {id}"),
            None => tracing::warn!("unable to resolve last executed deployment"),
        }

        Self {
            layout,
            deploy_stages,
            rollback_stages,
            state: Mutex::new(SupervisorState {
                last_executed,
                current: None,
            }),
        }
    }

    /// Hands a release to the deployment machinery. Returns the completion
    /// handle of the scheduled chain, or `None` when the release was already
    /// processed.
    pub fn enqueue(&self, release: Release) -> Option<CompletionHandle> {
        let mut state = self.state.lock();

        match state.last_executed {
            Some(last) if release.id == last => None,
            Some(last) if release.id < last => {
                state.last_executed = Some(release.id);
                Self::cancel_current(&mut state);
                self.rollback(&mut state, release)
            }
            _ => {
                state.last_executed = Some(release.id);
                Self::cancel_current(&mut state);
                tracing::info!("deploying new release {} ({})", release.id, release.tag_name);
                let release_id = release.id;
                let input = ChainValue::Release(release);
                Some(self.schedule(&mut state, &self.deploy_stages, release_id, input))
            }
        }
    }

    fn rollback(
        &self,
        state: &mut SupervisorState,
        release: Release,
    ) -> Option<CompletionHandle> {
        let release_id = release.id;
        let dir = self.layout.release_dir(release_id);
        if dir.exists() {
            tracing::info!("rolling back to stored release {release_id}");
            let input = ChainValue::Staged { release, dir };
            Some(self.schedule(state, &self.rollback_stages, release_id, input))
        } else {
            // the stored directory was discarded, deploy it like a new release
            tracing::info!("release {release_id} is no longer stored, deploying it from scratch");
            let input = ChainValue::Release(release);
            Some(self.schedule(state, &self.deploy_stages, release_id, input))
        }
    }

    fn cancel_current(state: &mut SupervisorState) {
        if let Some((id, ctx)) = state.current.take() {
            tracing::debug!("cancelling in-flight deployment of release {id}");
            ctx.cancel();
        }
    }

    fn schedule(
        &self,
        state: &mut SupervisorState,
        stages: &[Arc<dyn Stage>],
        release_id: u64,
        input: ChainValue,
    ) -> CompletionHandle {
        let ctx = ExecutionContext::new(stages.to_vec());
        state.current = Some((release_id, Arc::clone(&ctx)));
        ctx.schedule(input)
    }
}
