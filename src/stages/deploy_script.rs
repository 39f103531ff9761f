// ABOUTME: Runs the user's deploy script with captured output and kill supervision.
// ABOUTME: The pipeline suspends on the process exit so cancellation can reach the script.

use std::sync::Arc;

use async_trait::async_trait;

use crate::event::EventKind;
use crate::pipeline::{ChainValue, ExecutionContext, Stage, StageError, StageFlow};
use crate::script::{self, ProcessSupervisor, ScriptError};

const DEPLOY_SCRIPT_NAME: &str = "execute.sh";

/// Executes `.easydep/execute.sh` inside the release directory, if present.
///
/// The process is killed immediately when the chain is cancelled (via
/// compensation) or fails elsewhere (via a `ChainFailed` subscription). The
/// captured log is streamed to the agent log after the process exits and the
/// file is kept for post-mortem access, its path exposed through the info
/// map for the duration of this stage.
pub struct DeployScript;

#[async_trait]
impl Stage for DeployScript {
    fn name(&self) -> &str {
        "Deploy Script"
    }

    async fn execute(
        &self,
        ctx: &Arc<ExecutionContext>,
        input: ChainValue,
    ) -> Result<StageFlow, StageError> {
        let (release, dir) = input.expect_staged()?;

        let rel_path = script::script_rel_path(DEPLOY_SCRIPT_NAME);
        if !dir.join(&rel_path).is_file() {
            tracing::info!("release {} ships no deploy script, skipping", release.id);
            return Ok(StageFlow::Next(ChainValue::Staged { release, dir }));
        }

        let supervisor = ProcessSupervisor::spawn(&dir, &rel_path)?;
        let log_path = supervisor.log_path().to_path_buf();

        let kill = supervisor.kill_handle();
        {
            let kill = kill.clone();
            ctx.register_compensation(move || kill.kill());
        }
        ctx.events()
            .subscribe(EventKind::ChainFailed, move |_event| kill.kill());

        ctx.set_info(
            script::info_key(DEPLOY_SCRIPT_NAME),
            log_path.display().to_string(),
        );

        let scope = format!("Deployment {}", release.id);
        ctx.await_async(async move {
            let status = supervisor.wait().await.map_err(ScriptError::Io)?;
            script::stream_log(&log_path, &scope).await;

            match status.code() {
                Some(0) => Ok(ChainValue::Staged { release, dir }),
                Some(code) => Err(ScriptError::Exit(code).into()),
                // terminated by signal
                None => Err(ScriptError::Exit(-1).into()),
            }
        })?;

        Ok(StageFlow::Awaiting)
    }
}
