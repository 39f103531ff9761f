// ABOUTME: Single-worker executor advancing a context through its stage chain.
// ABOUTME: Routes cancellation, publishes lifecycle events and unwinds compensations.

use std::sync::Arc;

use crate::event::LifecycleEvent;
use crate::pipeline::{
    ChainError, ChainValue, ContextState, ExecutionContext, StageError, StageFlow,
};

/// Spawns the worker task driving the chain of the given context.
pub(crate) fn spawn(ctx: Arc<ExecutionContext>, input: ChainValue) {
    tokio::spawn(drive(ctx, input));
}

async fn drive(ctx: Arc<ExecutionContext>, mut input: ChainValue) {
    let stages: Vec<_> = ctx.stages().to_vec();
    if stages.is_empty() {
        ctx.transition(ContextState::Running, ContextState::Done);
        ctx.resolve(Ok(input));
        return;
    }

    ctx.events().publish(&LifecycleEvent::ChainStarted {
        stage: stages[0].name().to_string(),
    });

    let mut index = 0;
    loop {
        // cancellation takes effect at stage boundaries
        if ctx.is_cancelled() {
            let at = stages[index.min(stages.len() - 1)].name();
            return unwind_cancelled(&ctx, at);
        }

        if index > 0 {
            ctx.events().publish(&LifecycleEvent::StageSucceeded {
                stage: stages[index - 1].name().to_string(),
                output: input.clone(),
            });
            ctx.clear_info();
        }

        if index == stages.len() {
            let last = stages[stages.len() - 1].name();
            if !ctx.transition(ContextState::Running, ContextState::Done) {
                // cancelled in the same instant the chain completed
                return unwind_cancelled(&ctx, last);
            }
            ctx.events().publish(&LifecycleEvent::ChainFinished {
                stage: last.to_string(),
                output: input.clone(),
            });
            ctx.resolve(Ok(input));
            return;
        }

        let stage = &stages[index];
        tracing::debug!("executing stage {}", stage.name());
        match stage.execute(&ctx, input.clone()).await {
            Ok(StageFlow::Next(value)) => {
                input = value;
                index += 1;
            }
            Ok(StageFlow::Awaiting) => {
                let Some(pending) = ctx.take_pending() else {
                    if ctx.is_cancelled() {
                        return unwind_cancelled(&ctx, stage.name());
                    }
                    // awaiting without a parked operation means the stage
                    // handed nothing to the next stage
                    return unwind_empty(&ctx, stage.name());
                };

                tokio::select! {
                    biased;
                    _ = ctx.cancelled() => {
                        return unwind_cancelled(&ctx, stage.name());
                    }
                    result = pending => {
                        // transition back unless a cancel won the race, which
                        // the next loop iteration picks up
                        ctx.transition(ContextState::AwaitingAsync, ContextState::Running);
                        match result {
                            Ok(value) => {
                                input = value;
                                index += 1;
                            }
                            Err(err) => return unwind_failed(&ctx, stage.name(), err),
                        }
                    }
                }
            }
            Err(err) => return unwind_failed(&ctx, stage.name(), err),
        }
    }
}

fn unwind_cancelled(ctx: &ExecutionContext, stage: &str) {
    tracing::debug!("chain cancelled at stage {stage}");
    ctx.events().publish(&LifecycleEvent::ChainFailed {
        stage: stage.to_string(),
    });
    ctx.run_compensations();
    ctx.resolve(Err(ChainError::Cancelled));
}

fn unwind_failed(ctx: &ExecutionContext, stage: &str, err: StageError) {
    tracing::warn!("execution of stage {stage} failed: {err}");
    ctx.events().publish(&LifecycleEvent::StageFailed {
        stage: stage.to_string(),
        error: err.to_string(),
    });
    finish_failed(ctx, stage, ChainError::from_stage(stage, &err));
}

fn unwind_empty(ctx: &ExecutionContext, stage: &str) {
    let err = ChainError::EmptyStageOutput(stage.to_string());
    tracing::warn!("{err}");
    ctx.events().publish(&LifecycleEvent::StageFailed {
        stage: stage.to_string(),
        error: err.to_string(),
    });
    finish_failed(ctx, stage, err);
}

fn finish_failed(ctx: &ExecutionContext, stage: &str, err: ChainError) {
    ctx.events().publish(&LifecycleEvent::ChainFailed {
        stage: stage.to_string(),
    });
    ctx.run_compensations();
    if !ctx.is_cancelled() {
        ctx.transition(ContextState::Running, ContextState::Done);
    }
    ctx.resolve(Err(err));
}
