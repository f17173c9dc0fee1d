//! Runtime event types and async event sources for landing-sync.
//!
//! The binary drives one `BlockEditor` from a single event loop. Everything
//! that can wake that loop (script commands, periodic ticks, store changes,
//! shutdown) arrives as an [`Event`] on one bounded mpsc channel.

use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

// -------------------------------------------------------------------------------------------------
// Channel Policy
// -------------------------------------------------------------------------------------------------
// Bounded channel sized by `EVENT_CHANNEL_CAP`. Sources `send().await`, so a slow loop applies
// backpressure to the script reader instead of dropping edits. A send error means the loop is gone
// and the source must stop.
// -------------------------------------------------------------------------------------------------
pub const EVENT_CHANNEL_CAP: usize = 1024;

// -------------------------------------------------------------------------------------------------
// Telemetry
// -------------------------------------------------------------------------------------------------
// Relaxed atomic counters, logged by the binary at shutdown.
// -------------------------------------------------------------------------------------------------
pub static CHANNEL_SEND_FAILURES: AtomicU64 = AtomicU64::new(0);
pub static SCRIPT_COMMANDS: AtomicU64 = AtomicU64::new(0); // commands forwarded to the loop
pub static SCRIPT_PARSE_ERRORS: AtomicU64 = AtomicU64::new(0); // malformed lines skipped
pub static SCRIPT_WAITS: AtomicU64 = AtomicU64::new(0);
pub static TICKS_EMITTED: AtomicU64 = AtomicU64::new(0);

/// Top-level event enum consumed by the central event loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Script(ScriptCommand),
    /// The shared preview document was replaced.
    StoreChanged,
    /// Periodic tick used for metrics logging.
    Tick,
    Shutdown,
}

/// One line of an edit script (JSON object tagged by `cmd`).
///
/// ```text
/// {"cmd":"open","id":"1","kind":"case"}
/// {"cmd":"set_field","path":"title","value":"Launch"}
/// {"cmd":"wait","ms":400}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ScriptCommand {
    Open {
        id: String,
        kind: String,
    },
    SetField {
        path: String,
        value: Value,
    },
    AddEntry,
    RemoveEntry {
        id: String,
    },
    Drag {
        active: String,
        #[serde(default)]
        over: Option<String>,
    },
    Recommend {
        ids: Vec<String>,
    },
    Flush,
    Close,
    /// Pause the script. Handled by the script source itself; never forwarded.
    Wait {
        ms: u64,
    },
}

impl ScriptCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ScriptCommand::Open { .. } => "open",
            ScriptCommand::SetField { .. } => "set_field",
            ScriptCommand::AddEntry => "add_entry",
            ScriptCommand::RemoveEntry { .. } => "remove_entry",
            ScriptCommand::Drag { .. } => "drag",
            ScriptCommand::Recommend { .. } => "recommend",
            ScriptCommand::Flush => "flush",
            ScriptCommand::Close => "close",
            ScriptCommand::Wait { .. } => "wait",
        }
    }

    /// Parse one script line. Blank lines and `#` comments yield `Ok(None)`.
    pub fn parse_line(line: &str) -> Result<Option<Self>, serde_json::Error> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        serde_json::from_str(line).map(Some)
    }
}

// -------------------------------------------------------------------------------------------------
// Event Transform Hooks
// -------------------------------------------------------------------------------------------------
/// Optional hooks that observe events at the loop boundary. Hooks must not block.
pub trait EventHooks: Send + Sync + 'static {
    fn pre_handle(&self, _event: &Event) {}
    fn post_handle(&self, _event: &Event) {}
}

/// Default no-op hooks implementation.
pub struct NoopEventHooks;

impl EventHooks for NoopEventHooks {}

// -------------------------------------------------------------------------------------------------
// Async Event Sources
// -------------------------------------------------------------------------------------------------

/// Trait implemented by any async event producer. Implementors usually hold configuration and
/// spawn one background task that pushes `Event`s into the shared channel.
pub trait AsyncEventSource: Send + 'static {
    /// Stable identifier used in logs.
    fn name(&self) -> &'static str;
    /// Consume self and spawn the background task. Implementors stop when `tx.send(..).await`
    /// returns Err (channel closed) or on their own stop condition.
    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()>;
}

/// Registry of event sources, spawned together at startup.
pub struct EventSourceRegistry {
    sources: Vec<Box<dyn AsyncEventSource>>,
}

impl Default for EventSourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    pub fn register<S: AsyncEventSource>(&mut self, src: S) {
        self.sources.push(Box::new(src));
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Spawn all registered sources, returning their JoinHandles. Each source receives its own
    /// `Sender` clone; drop the caller's clone before awaiting the handles during shutdown so
    /// the sources observe the closed channel.
    pub fn spawn_all(&mut self, tx: &Sender<Event>) -> Vec<JoinHandle<()>> {
        // drain so a second call spawns nothing
        let mut out = Vec::with_capacity(self.sources.len());
        for src in self.sources.drain(..) {
            let name = src.name();
            info!(target: "runtime.events", source = name, "spawning event source");
            out.push(src.spawn(tx.clone()));
        }
        out
    }
}

async fn forward(tx: &Sender<Event>, event: Event, source: &'static str) -> bool {
    if tx.send(event).await.is_err() {
        CHANNEL_SEND_FAILURES.fetch_add(1, Relaxed);
        debug!(target: "runtime.events", source, "event_channel_closed");
        return false;
    }
    true
}

/// Emits `Event::Tick` every configured interval.
pub struct TickEventSource {
    interval: Duration,
}

impl TickEventSource {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl AsyncEventSource for TickEventSource {
    fn name(&self) -> &'static str {
        "tick"
    }

    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()> {
        let dur = self.interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(dur);
            loop {
                interval.tick().await;
                if !forward(&tx, Event::Tick, "tick").await {
                    break;
                }
                TICKS_EMITTED.fetch_add(1, Relaxed);
            }
        })
    }
}

/// Replays an edit script (JSON lines) into the loop, then sends `Event::Shutdown`.
///
/// `wait` lines sleep inside the source, which is what lets debounce timers
/// elapse between scripted edits. Malformed lines are logged and skipped.
pub struct ScriptEventSource<R> {
    reader: R,
}

impl<R> ScriptEventSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R> AsyncEventSource for ScriptEventSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    fn name(&self) -> &'static str {
        "script"
    }

    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()> {
        let mut lines = self.reader.lines();
        tokio::spawn(async move {
            let mut line_no = 0usize;
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(target: "runtime.events", line = line_no + 1, error = %e, "script_read_failed");
                        break;
                    }
                };
                line_no += 1;
                let command = match ScriptCommand::parse_line(&line) {
                    Ok(Some(command)) => command,
                    Ok(None) => continue,
                    Err(e) => {
                        SCRIPT_PARSE_ERRORS.fetch_add(1, Relaxed);
                        warn!(target: "runtime.events", line = line_no, error = %e, "script_line_skipped");
                        continue;
                    }
                };
                if let ScriptCommand::Wait { ms } = command {
                    SCRIPT_WAITS.fetch_add(1, Relaxed);
                    trace!(target: "runtime.events", line = line_no, ms, "script_wait");
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    continue;
                }
                trace!(target: "runtime.events", line = line_no, cmd = command.name(), "script_command");
                if !forward(&tx, Event::Script(command), "script").await {
                    return;
                }
                SCRIPT_COMMANDS.fetch_add(1, Relaxed);
            }
            debug!(target: "runtime.events", lines = line_no, "script_finished");
            let _ = forward(&tx, Event::Shutdown, "script").await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_each_command_shape() {
        let cases = [
            (
                r#"{"cmd":"open","id":"1","kind":"case"}"#,
                ScriptCommand::Open {
                    id: "1".into(),
                    kind: "case".into(),
                },
            ),
            (
                r#"{"cmd":"set_field","path":"list.0.name","value":"Acme"}"#,
                ScriptCommand::SetField {
                    path: "list.0.name".into(),
                    value: json!("Acme"),
                },
            ),
            (r#"{"cmd":"add_entry"}"#, ScriptCommand::AddEntry),
            (
                r#"{"cmd":"drag","active":"a"}"#,
                ScriptCommand::Drag {
                    active: "a".into(),
                    over: None,
                },
            ),
            (r#"{"cmd":"wait","ms":400}"#, ScriptCommand::Wait { ms: 400 }),
        ];
        for (line, expected) in cases {
            assert_eq!(ScriptCommand::parse_line(line).unwrap(), Some(expected));
        }
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        assert_eq!(ScriptCommand::parse_line("   ").unwrap(), None);
        assert_eq!(ScriptCommand::parse_line("# setup").unwrap(), None);
        assert!(ScriptCommand::parse_line(r#"{"cmd":"explode"}"#).is_err());
    }

    #[test]
    fn command_names_match_wire_tags() {
        let cmd = ScriptCommand::parse_line(r#"{"cmd":"remove_entry","id":"x"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(cmd.name(), "remove_entry");
    }
}
