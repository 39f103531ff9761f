// ABOUTME: In-process publish/subscribe bus for deployment lifecycle events.
// ABOUTME: Subscribers fire synchronously in ascending priority order, panics are isolated.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::pipeline::ChainValue;

/// Priority used when a subscriber does not care about ordering. Leaves the
/// whole lower half of the range for subscribers that must run first.
pub const DEFAULT_PRIORITY: u32 = u32::MAX / 2;

/// Lifecycle notifications published while a deployment chain runs.
///
/// Every event names the stage it originated from; stage-level events
/// additionally carry the stage's output or failure.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    ChainStarted { stage: String },
    StageSucceeded { stage: String, output: ChainValue },
    StageFailed { stage: String, error: String },
    ChainFinished { stage: String, output: ChainValue },
    ChainFailed { stage: String },
}

/// Discriminant of [`LifecycleEvent`] used to key subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ChainStarted,
    StageSucceeded,
    StageFailed,
    ChainFinished,
    ChainFailed,
}

impl LifecycleEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            LifecycleEvent::ChainStarted { .. } => EventKind::ChainStarted,
            LifecycleEvent::StageSucceeded { .. } => EventKind::StageSucceeded,
            LifecycleEvent::StageFailed { .. } => EventKind::StageFailed,
            LifecycleEvent::ChainFinished { .. } => EventKind::ChainFinished,
            LifecycleEvent::ChainFailed { .. } => EventKind::ChainFailed,
        }
    }

    /// The stage this event originated from.
    pub fn stage(&self) -> &str {
        match self {
            LifecycleEvent::ChainStarted { stage }
            | LifecycleEvent::StageSucceeded { stage, .. }
            | LifecycleEvent::StageFailed { stage, .. }
            | LifecycleEvent::ChainFinished { stage, .. }
            | LifecycleEvent::ChainFailed { stage } => stage,
        }
    }
}

type Handler = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

struct Subscription {
    /// `None` subscribes to every event kind.
    kind: Option<EventKind>,
    priority: u32,
    handler: Handler,
}

/// Per-context event bus. Delivery is synchronous on the publisher's task.
#[derive(Default)]
pub struct EventBus {
    subscriptions: Mutex<Vec<Subscription>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to one event kind with [`DEFAULT_PRIORITY`].
    pub fn subscribe<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.insert(Some(kind), DEFAULT_PRIORITY, Arc::new(handler));
    }

    /// Subscribes to one event kind. Lower priorities fire first.
    pub fn subscribe_with_priority<F>(&self, kind: EventKind, priority: u32, handler: F)
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.insert(Some(kind), priority, Arc::new(handler));
    }

    /// Subscribes to every event kind. Lower priorities fire first.
    pub fn subscribe_all<F>(&self, priority: u32, handler: F)
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.insert(None, priority, Arc::new(handler));
    }

    fn insert(&self, kind: Option<EventKind>, priority: u32, handler: Handler) {
        tracing::debug!("registering event subscriber for {kind:?} with priority {priority}");
        let mut subscriptions = self.subscriptions.lock();
        subscriptions.push(Subscription {
            kind,
            priority,
            handler,
        });
        // stable sort keeps subscription order among equal priorities
        subscriptions.sort_by_key(|subscription| subscription.priority);
    }

    /// Dispatches the event to all matching subscribers. A panicking
    /// subscriber is logged and skipped, it never aborts dispatch.
    pub fn publish(&self, event: &LifecycleEvent) {
        let handlers: Vec<Handler> = {
            let subscriptions = self.subscriptions.lock();
            subscriptions
                .iter()
                .filter(|subscription| {
                    subscription.kind.is_none() || subscription.kind == Some(event.kind())
                })
                .map(|subscription| Arc::clone(&subscription.handler))
                .collect()
        };

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                tracing::error!(
                    "event subscriber panicked while handling {:?} event",
                    event.kind()
                );
            }
        }
    }
}
