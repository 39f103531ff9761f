// ABOUTME: Cancellable linear pipeline engine driving a deployment through its stages.
// ABOUTME: Exports the execution context, the stage trait and the chain value types.

mod context;
mod runner;
mod stage;

pub use context::{
    ChainError, ChainResult, CompletionHandle, ContextState, ExecutionContext,
};
pub use stage::{ChainValue, Stage, StageError, StageFlow};
