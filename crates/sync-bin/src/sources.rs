use core_events::{AsyncEventSource, Event};
use core_model::PreviewDocument;
use tokio::sync::mpsc::Sender;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::trace;

/// Forwards every store replacement to the loop as `Event::StoreChanged`.
/// Bursts collapse: the watch channel only remembers that *something* changed.
pub struct StoreEventSource {
    rx: watch::Receiver<PreviewDocument>,
}

impl StoreEventSource {
    pub fn new(rx: watch::Receiver<PreviewDocument>) -> Self {
        Self { rx }
    }
}

impl AsyncEventSource for StoreEventSource {
    fn name(&self) -> &'static str {
        "store"
    }

    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()> {
        let mut rx = self.rx;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        trace!(target: "runtime.events", "store_changed");
                        if tx.send(Event::StoreChanged).await.is_err() {
                            break;
                        }
                    }
                }
            }
        })
    }
}
