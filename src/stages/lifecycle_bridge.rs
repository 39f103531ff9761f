// ABOUTME: Bridges pipeline lifecycle events to user-supplied event scripts.
// ABOUTME: Scripts run detached and can never influence the pipeline outcome.

use std::sync::Arc;

use async_trait::async_trait;

use crate::event::LifecycleEvent;
use crate::pipeline::{ChainValue, ExecutionContext, Stage, StageError, StageFlow};
use crate::script;

const EVENT_SCRIPT_SCOPE: &str = "Lifecycle Event";

/// Subscribes at priority 0 so event scripts observe every later event
/// before other subscribers act on it.
pub struct LifecycleScriptBridge;

/// Script file stem for an event: the lifecycle name, and for stage-level
/// events the stage name lowercased with spaces replaced by underscores.
fn event_script_name(event: &LifecycleEvent) -> Option<String> {
    let stem = match event {
        LifecycleEvent::StageSucceeded { .. } => "stage_succeeded",
        LifecycleEvent::StageFailed { .. } => "stage_failed",
        LifecycleEvent::ChainFinished { .. } => "chain_finished",
        LifecycleEvent::ChainFailed { .. } => "chain_failed",
        LifecycleEvent::ChainStarted { .. } => return None,
    };

    match event {
        LifecycleEvent::StageSucceeded { stage, .. } | LifecycleEvent::StageFailed { stage, .. } => {
            Some(format!("{stem}.{}.sh", normalized_stage_name(stage)))
        }
        _ => Some(format!("{stem}.sh")),
    }
}

fn normalized_stage_name(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

#[async_trait]
impl Stage for LifecycleScriptBridge {
    fn name(&self) -> &str {
        "Event Scripts"
    }

    async fn execute(
        &self,
        ctx: &Arc<ExecutionContext>,
        input: ChainValue,
    ) -> Result<StageFlow, StageError> {
        let (release, dir) = input.expect_staged()?;

        let script_dir = dir.clone();
        ctx.events().subscribe_all(0, move |event| {
            if let Some(script_name) = event_script_name(event) {
                script::run_detached(&script_dir, &script_name, EVENT_SCRIPT_SCOPE.to_string());
            }
        });

        Ok(StageFlow::Next(ChainValue::Staged { release, dir }))
    }
}
