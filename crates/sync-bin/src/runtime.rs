//! Single-threaded event loop driving one `BlockEditor`.

use anyhow::{Result, anyhow};
use core_events::{
    CHANNEL_SEND_FAILURES, EVENT_CHANNEL_CAP, Event, EventHooks, EventSourceRegistry,
    NoopEventHooks, SCRIPT_COMMANDS, SCRIPT_PARSE_ERRORS, ScriptCommand, TICKS_EMITTED,
};
use core_model::{BlockId, BlockKind, PreviewDocument};
use core_state::DragEnd;
use core_sync::{BlockEditor, PreviewStore, SharedPreviewStore, StaticRecommendSource, SyncOptions};
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::Ordering::Relaxed;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, trace, warn};

const SOURCE_JOIN_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    ShutdownEvent,
    ChannelClosed,
}

impl ShutdownReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownReason::ShutdownEvent => "shutdown_event",
            ShutdownReason::ChannelClosed => "channel_closed",
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn log_shutdown_stage(reason: ShutdownReason, stage: &'static str) {
    info!(
        target: "runtime.shutdown",
        reason = reason.as_str(),
        stage = stage,
        "shutdown_stage"
    );
}

/// Per-run counters reported at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub commands: u64,
    pub command_errors: u64,
    pub store_resets: u64,
    pub ticks: u64,
}

pub struct SyncRuntime {
    editor: BlockEditor<SharedPreviewStore>,
    store: Arc<SharedPreviewStore>,
    catalog: StaticRecommendSource,
    hooks: Box<dyn EventHooks>,
    rx: mpsc::Receiver<Event>,
    tx: Option<mpsc::Sender<Event>>,
    source_handles: Vec<JoinHandle<()>>,
    stats: LoopStats,
}

impl SyncRuntime {
    pub fn new(
        store: Arc<SharedPreviewStore>,
        options: SyncOptions,
        catalog: StaticRecommendSource,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<Event>(EVENT_CHANNEL_CAP);
        Self {
            editor: BlockEditor::new(Arc::clone(&store), options),
            store,
            catalog,
            hooks: Box::new(NoopEventHooks),
            rx,
            tx: Some(tx),
            source_handles: Vec::new(),
            stats: LoopStats::default(),
        }
    }

    pub fn with_hooks(mut self, hooks: impl EventHooks) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    /// Spawn every source in `registry` onto the loop's channel.
    pub fn spawn_sources(&mut self, registry: &mut EventSourceRegistry) {
        if let Some(tx) = &self.tx {
            self.source_handles.extend(registry.spawn_all(tx));
        }
    }

    pub fn document(&self) -> PreviewDocument {
        self.store.current()
    }

    pub fn editor(&self) -> &BlockEditor<SharedPreviewStore> {
        &self.editor
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Consume events until a shutdown event arrives or every sender is gone,
    /// then flush the pending edit and stop the sources.
    pub async fn run(&mut self) -> ShutdownReason {
        let loop_span = tracing::debug_span!(target: "runtime", "event_loop");
        self.event_loop().instrument(loop_span).await
    }

    async fn event_loop(&mut self) -> ShutdownReason {
        let mut reason = ShutdownReason::ChannelClosed;
        while let Some(event) = self.rx.recv().await {
            self.hooks.pre_handle(&event);
            let control = self.handle_event(&event).await;
            self.hooks.post_handle(&event);
            if let ControlFlow::Break(r) = control {
                reason = r;
                break;
            }
        }

        self.finalize_shutdown(reason).await;
        reason
    }

    async fn handle_event(&mut self, event: &Event) -> ControlFlow<ShutdownReason> {
        match event {
            Event::Script(command) => {
                self.stats.commands += 1;
                if let Err(e) = self.apply_command(command).await {
                    self.stats.command_errors += 1;
                    warn!(target: "runtime", cmd = command.name(), error = %e, "command_failed");
                }
            }
            Event::StoreChanged => match self.editor.sync_from_store() {
                Ok(true) => self.stats.store_resets += 1,
                Ok(false) => {}
                Err(e) => warn!(target: "runtime", error = %e, "store_sync_failed"),
            },
            Event::Tick => {
                self.stats.ticks += 1;
                if let Some(m) = self.editor.metrics() {
                    trace!(
                        target: "runtime",
                        notifies = m.notifies,
                        dispatched = m.dispatched,
                        coalesced = m.coalesced,
                        "propagator_metrics"
                    );
                }
            }
            Event::Shutdown => return ControlFlow::Break(ShutdownReason::ShutdownEvent),
        }
        ControlFlow::Continue(())
    }

    async fn apply_command(&mut self, command: &ScriptCommand) -> Result<()> {
        match command {
            ScriptCommand::Open { id, kind } => {
                let parsed = BlockKind::parse(kind)
                    .filter(|k| *k != BlockKind::Opaque)
                    .ok_or_else(|| anyhow!("unknown block kind `{kind}`"))?;
                self.editor.open(BlockId::new(id.as_str()), parsed)?;
            }
            ScriptCommand::SetField { path, value } => {
                self.editor.set_field(path, value.clone())?;
            }
            ScriptCommand::AddEntry => {
                let id = self.editor.session_mut()?.add_entry()?;
                debug!(target: "runtime", entry = id.as_str(), "entry_added");
            }
            ScriptCommand::RemoveEntry { id } => {
                self.editor.session_mut()?.remove_entry(id)?;
            }
            ScriptCommand::Drag { active, over } => {
                let drag = DragEnd::new(active.as_str(), over.clone());
                if !self.editor.apply_drag(&drag)? {
                    trace!(target: "runtime", active = active.as_str(), "drag_ignored");
                }
            }
            ScriptCommand::Recommend { ids } => {
                self.editor
                    .apply_recommendations(&self.catalog, ids.clone())
                    .await?;
            }
            ScriptCommand::Flush => {
                let outcome = self.editor.flush();
                debug!(target: "runtime", ?outcome, "flush");
            }
            ScriptCommand::Close => {
                self.editor.close();
            }
            ScriptCommand::Wait { .. } => {
                trace!(target: "runtime", "wait_reached_loop_ignored");
            }
        }
        Ok(())
    }

    async fn finalize_shutdown(&mut self, reason: ShutdownReason) {
        log_shutdown_stage(reason, "begin");
        if let Some(outcome) = self.editor.flush() {
            info!(target: "runtime.shutdown", ?outcome, "pending_edit_flushed");
        }
        self.editor.close();

        if let Some(tx) = self.tx.take() {
            trace!(target: "runtime.shutdown", reason = reason.as_str(), "dropping_runtime_sender");
            drop(tx);
        }
        self.rx.close();

        while let Some(mut handle) = self.source_handles.pop() {
            match tokio::time::timeout(SOURCE_JOIN_TIMEOUT, &mut handle).await {
                Ok(Ok(())) => trace!(
                    target: "runtime.shutdown",
                    reason = reason.as_str(),
                    "event_source_task_stopped"
                ),
                Ok(Err(err)) if err.is_cancelled() => trace!(
                    target: "runtime.shutdown",
                    reason = reason.as_str(),
                    "event_source_task_cancelled"
                ),
                Ok(Err(err)) => error!(
                    target: "runtime.shutdown",
                    reason = reason.as_str(),
                    ?err,
                    "event_source_task_error"
                ),
                Err(_) => {
                    warn!(
                        target: "runtime.shutdown",
                        reason = reason.as_str(),
                        "event_source_task_timeout"
                    );
                    handle.abort();
                }
            }
        }

        info!(
            target: "runtime.shutdown",
            commands = self.stats.commands,
            command_errors = self.stats.command_errors,
            store_resets = self.stats.store_resets,
            dispatches = self.store.dispatch_count(),
            script_commands = SCRIPT_COMMANDS.load(Relaxed),
            script_parse_errors = SCRIPT_PARSE_ERRORS.load(Relaxed),
            ticks = TICKS_EMITTED.load(Relaxed),
            send_failures = CHANNEL_SEND_FAILURES.load(Relaxed),
            "loop_summary"
        );
        log_shutdown_stage(reason, "complete");
    }
}
