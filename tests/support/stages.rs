// ABOUTME: Stub stages for exercising the pipeline engine without network access.
// ABOUTME: Record execution order, inject failures, block on async operations or stage fake releases.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use easydep::pipeline::{ChainValue, ExecutionContext, Stage, StageError, StageFlow};
use parking_lot::Mutex;

pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Subscribes a recorder that logs every published event as `Kind(stage)`.
pub fn record_events(ctx: &ExecutionContext, log: &EventLog) {
    let log = Arc::clone(log);
    ctx.events().subscribe_all(u32::MAX / 2, move |event| {
        log.lock().push(format!("{:?}({})", event.kind(), event.stage()));
    });
}

/// Passes its input through and records that it ran.
pub struct Recorder {
    pub name: &'static str,
    pub log: EventLog,
}

#[async_trait]
impl Stage for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(
        &self,
        _ctx: &Arc<ExecutionContext>,
        input: ChainValue,
    ) -> Result<StageFlow, StageError> {
        self.log.lock().push(format!("exec:{}", self.name));
        Ok(StageFlow::Next(input))
    }
}

/// Registers a compensation recording its own undo, then passes through.
pub struct Compensating {
    pub name: &'static str,
    pub log: EventLog,
}

#[async_trait]
impl Stage for Compensating {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(
        &self,
        ctx: &Arc<ExecutionContext>,
        input: ChainValue,
    ) -> Result<StageFlow, StageError> {
        self.log.lock().push(format!("exec:{}", self.name));
        let log = Arc::clone(&self.log);
        let name = self.name;
        ctx.register_compensation(move || log.lock().push(format!("undo:{name}")));
        Ok(StageFlow::Next(input))
    }
}

/// Always fails with an injected error.
pub struct Fail {
    pub name: &'static str,
}

#[async_trait]
impl Stage for Fail {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(
        &self,
        _ctx: &Arc<ExecutionContext>,
        _input: ChainValue,
    ) -> Result<StageFlow, StageError> {
        Err(StageError::Failed("injected failure".to_string()))
    }
}

/// Parks an async operation that never completes; the chain can only leave
/// this stage through cancellation.
pub struct Block {
    pub name: &'static str,
    pub log: EventLog,
}

#[async_trait]
impl Stage for Block {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(
        &self,
        ctx: &Arc<ExecutionContext>,
        _input: ChainValue,
    ) -> Result<StageFlow, StageError> {
        self.log.lock().push(format!("exec:{}", self.name));
        let log = Arc::clone(&self.log);
        let name = self.name;
        ctx.register_compensation(move || log.lock().push(format!("undo:{name}")));
        ctx.await_async(futures::future::pending())?;
        Ok(StageFlow::Awaiting)
    }
}

/// Claims to await without parking anything, violating the stage contract.
pub struct AwaitsNothing {
    pub name: &'static str,
}

#[async_trait]
impl Stage for AwaitsNothing {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(
        &self,
        _ctx: &Arc<ExecutionContext>,
        _input: ChainValue,
    ) -> Result<StageFlow, StageError> {
        Ok(StageFlow::Awaiting)
    }
}

/// Stands in for the repo-init stage: creates the release directory with the
/// given scripts, registers the directory-removal compensation and stages
/// the release.
pub struct StubFetch {
    pub layout: Arc<easydep::layout::PathLayout>,
    /// `(script name, script body)` pairs written below `.easydep/`.
    pub scripts: Vec<(String, String)>,
}

#[async_trait]
impl Stage for StubFetch {
    fn name(&self) -> &str {
        "Repo Init"
    }

    async fn execute(
        &self,
        ctx: &Arc<ExecutionContext>,
        input: ChainValue,
    ) -> Result<StageFlow, StageError> {
        let release = input.into_release();
        let dir = self.layout.release_dir(release.id);
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join("app.txt"), release.tag_name.as_bytes())?;
        for (name, body) in &self.scripts {
            super::write_script(&dir, name, body);
        }

        let undo_dir = dir.clone();
        ctx.register_compensation(move || {
            easydep::fsutil::remove_dir_all_force(&undo_dir).ok();
        });

        Ok(StageFlow::Next(ChainValue::Staged { release, dir }))
    }
}

/// Creates a marker file when executed; used to prove a chain ran.
pub struct Marker {
    pub name: &'static str,
    pub path: PathBuf,
}

#[async_trait]
impl Stage for Marker {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(
        &self,
        _ctx: &Arc<ExecutionContext>,
        input: ChainValue,
    ) -> Result<StageFlow, StageError> {
        std::fs::write(&self.path, b"ran")?;
        Ok(StageFlow::Next(input))
    }
}
