// ABOUTME: Per-deployment execution state: status, compensations, info map and completion.
// ABOUTME: Cancellation is observable from any thread and unwinds side effects in LIFO order.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{watch, Notify};

use crate::event::EventBus;
use crate::pipeline::runner;
use crate::pipeline::{ChainValue, Stage, StageError};
use crate::script::ScriptError;

/// Final outcome of a deployment chain.
pub type ChainResult = Result<ChainValue, ChainError>;

/// Failure surfaced through the completion handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("deployment was cancelled")]
    Cancelled,

    #[error("stage {stage} failed: {message}")]
    Stage {
        stage: String,
        message: String,
        /// Exit code when the failure came from a script process.
        exit_code: Option<i32>,
    },

    #[error("stage {0} produced no output")]
    EmptyStageOutput(String),
}

impl ChainError {
    pub(crate) fn from_stage(stage: &str, err: &StageError) -> Self {
        let exit_code = match err {
            StageError::Script(ScriptError::Exit(code)) => Some(*code),
            _ => None,
        };
        ChainError::Stage {
            stage: stage.to_string(),
            message: err.to_string(),
            exit_code,
        }
    }
}

/// Lifecycle state of an [`ExecutionContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContextState {
    Ready = 0,
    Running = 1,
    AwaitingAsync = 2,
    Cancelled = 3,
    Done = 4,
}

impl ContextState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ContextState::Ready,
            1 => ContextState::Running,
            2 => ContextState::AwaitingAsync,
            3 => ContextState::Cancelled,
            _ => ContextState::Done,
        }
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            ContextState::Ready => "ready",
            ContextState::Running => "running",
            ContextState::AwaitingAsync => "awaiting-async",
            ContextState::Cancelled => "cancelled",
            ContextState::Done => "done",
        }
    }
}

pub(crate) type PendingAsync = BoxFuture<'static, Result<ChainValue, StageError>>;
type Compensation = Box<dyn FnOnce() + Send>;

/// State owned by exactly one chain execution.
///
/// The context is shared between the runner task driving the stages and the
/// supervisor, which may cancel it from another task at any time.
pub struct ExecutionContext {
    /// Self-reference handed to the runner task on schedule.
    me: Weak<ExecutionContext>,
    stages: Vec<Arc<dyn Stage>>,
    state: AtomicU8,
    events: EventBus,
    info: Mutex<HashMap<String, String>>,
    compensations: Mutex<Vec<Compensation>>,
    pending: Mutex<Option<PendingAsync>>,
    cancel_notify: Notify,
    completion: watch::Sender<Option<ChainResult>>,
}

impl ExecutionContext {
    pub fn new(stages: Vec<Arc<dyn Stage>>) -> Arc<Self> {
        let (completion, _) = watch::channel(None);
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            stages,
            state: AtomicU8::new(ContextState::Ready as u8),
            events: EventBus::new(),
            info: Mutex::new(HashMap::new()),
            compensations: Mutex::new(Vec::new()),
            pending: Mutex::new(None),
            cancel_notify: Notify::new(),
            completion,
        })
    }

    /// Starts the chain on a dedicated worker task. Repeated calls do not
    /// re-schedule; they hand out another handle to the same completion.
    pub fn schedule(&self, input: ChainValue) -> CompletionHandle {
        if self.transition(ContextState::Ready, ContextState::Running) {
            let ctx = self.me.upgrade().expect("context is alive while scheduling");
            runner::spawn(ctx, input);
        } else if self.state() == ContextState::Cancelled {
            // cancelled before it ever ran: nobody else will resolve this
            self.resolve(Err(ChainError::Cancelled));
        }
        self.completion_handle()
    }

    /// Parks an async operation for the runner to drive. Callable only from
    /// inside a stage's `execute`; the stage must return
    /// [`StageFlow::Awaiting`](crate::pipeline::StageFlow::Awaiting) afterwards.
    ///
    /// When the context was cancelled concurrently the operation is dropped
    /// on the spot and the runner unwinds at the next boundary.
    pub fn await_async<F>(&self, operation: F) -> Result<(), StageError>
    where
        F: std::future::Future<Output = Result<ChainValue, StageError>> + Send + 'static,
    {
        if self.transition(ContextState::Running, ContextState::AwaitingAsync) {
            *self.pending.lock() = Some(operation.boxed());
            return Ok(());
        }

        let state = self.state();
        if state == ContextState::Cancelled {
            tracing::debug!("dropping pending operation, the owning context was cancelled");
            drop(operation);
            return Ok(());
        }
        Err(StageError::IllegalAwait(state.name()))
    }

    /// Pushes an idempotent undo action. Compensations run in reverse
    /// registration order when the chain is cancelled or fails.
    pub fn register_compensation<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.compensations.lock().push(Box::new(hook));
    }

    /// Attaches a fact about the current stage, visible to event subscribers
    /// fired for this stage's completion. The runner clears the map after
    /// each stage.
    pub fn set_info(&self, key: impl Into<String>, value: impl Into<String>) {
        self.info.lock().insert(key.into(), value.into());
    }

    pub fn info(&self, key: &str) -> Option<String> {
        self.info.lock().get(key).cloned()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Cancels this context. Idempotent and safe from any thread; terminal
    /// states are left untouched. The runner observes the cancellation at
    /// its next boundary and unwinds the compensation stack.
    pub fn cancel(&self) {
        loop {
            let current = self.state();
            if matches!(current, ContextState::Cancelled | ContextState::Done) {
                return;
            }
            if self.transition(current, ContextState::Cancelled) {
                break;
            }
        }

        // abort a parked operation that the runner has not picked up yet
        drop(self.pending.lock().take());
        self.cancel_notify.notify_waiters();
    }

    pub fn state(&self) -> ContextState {
        ContextState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == ContextState::Cancelled
    }

    /// Waits until the context is cancelled.
    pub(crate) async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.cancel_notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    pub(crate) fn transition(&self, from: ContextState, to: ContextState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn stages(&self) -> &[Arc<dyn Stage>] {
        &self.stages
    }

    pub(crate) fn take_pending(&self) -> Option<PendingAsync> {
        self.pending.lock().take()
    }

    pub(crate) fn clear_info(&self) {
        self.info.lock().clear();
    }

    /// Runs the compensation stack in reverse registration order. Each hook
    /// runs exactly once; a panicking hook is logged and skipped.
    pub(crate) fn run_compensations(&self) {
        let hooks = std::mem::take(&mut *self.compensations.lock());
        for hook in hooks.into_iter().rev() {
            if catch_unwind(AssertUnwindSafe(hook)).is_err() {
                tracing::error!("compensation hook panicked during unwind");
            }
        }
    }

    /// Resolves the completion handle. Only the first resolution wins.
    pub(crate) fn resolve(&self, result: ChainResult) {
        self.completion.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(result);
                true
            } else {
                false
            }
        });
    }

    pub fn completion_handle(&self) -> CompletionHandle {
        CompletionHandle {
            rx: self.completion.subscribe(),
        }
    }
}

/// Single-shot view on a chain's final result. Cloneable; every handle
/// observes the same resolution.
#[derive(Clone)]
pub struct CompletionHandle {
    rx: watch::Receiver<Option<ChainResult>>,
}

impl CompletionHandle {
    /// Waits for the chain to finish and returns its outcome.
    pub async fn wait(mut self) -> ChainResult {
        loop {
            {
                let current = self.rx.borrow();
                if let Some(result) = current.as_ref() {
                    return result.clone();
                }
            }
            if self.rx.changed().await.is_err() {
                // context dropped without resolving, treat as cancelled
                return Err(ChainError::Cancelled);
            }
        }
    }

    /// The outcome, if the chain already finished.
    pub fn try_result(&self) -> Option<ChainResult> {
        self.rx.borrow().clone()
    }
}
