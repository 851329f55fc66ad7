/*!
Progress reporting from the engines to an external observer.

The engines emit [`ProgressEvent`]s through a [`ProgressSink`]; a front end
owns the other side. All events are advisory: a sink that drops them, or no
sink at all, never affects engine correctness. [`ChannelSink`] carries events
over an unbounded channel so a UI or CLI task can consume them on its own
thread without the engine ever touching observer-owned state.
*/

use crate::manifest::BackupSummary;
use crate::restore::RestoreReport;
use std::sync::Arc;

/// Events emitted while a backup or restore run progresses
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Work on a collection has begun; `index` is 0-based within `total`
    CollectionStarted {
        collection: String,
        index: usize,
        total: usize,
    },
    /// A collection transferred completely
    CollectionCompleted { collection: String, documents: u64 },
    /// A collection was skipped because the source had no documents
    CollectionSkipped { collection: String },
    /// A collection failed; the run continues with the next one
    CollectionFailed { collection: String, reason: String },
    /// One bulk insert flushed during restore
    BatchInserted { collection: String, documents: usize },
    /// A backup run finished; carries the full summary
    BackupFinished { summary: BackupSummary },
    /// A restore run finished; carries the per-collection outcomes
    RestoreFinished { report: RestoreReport },
}

/// Observer interface the engines report into
pub trait ProgressSink: Send + Sync {
    /// Deliver one event. Implementations must not block the engine.
    fn emit(&self, event: ProgressEvent);
}

/// Sink that discards every event; the default when no observer is attached
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Sink that forwards events over an unbounded channel
///
/// Send failures (receiver dropped) are ignored: the engine outliving its
/// observer is normal during shutdown.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: tokio::sync::mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver a front end consumes events from
    pub fn channel() -> (Self, tokio::sync::mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

/// Shared handle the engines store
pub type SharedSink = Arc<dyn ProgressSink>;

/// Default shared sink discarding all events
pub fn null_sink() -> SharedSink {
    Arc::new(NullSink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelSink::channel();
        sink.emit(ProgressEvent::CollectionStarted {
            collection: "a".into(),
            index: 0,
            total: 2,
        });
        sink.emit(ProgressEvent::CollectionCompleted {
            collection: "a".into(),
            documents: 5,
        });

        match rx.try_recv().unwrap() {
            ProgressEvent::CollectionStarted { collection, .. } => assert_eq!(collection, "a"),
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.try_recv().unwrap() {
            ProgressEvent::CollectionCompleted { documents, .. } => assert_eq!(documents, 5),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let (sink, rx) = ChannelSink::channel();
        drop(rx);
        // Must not panic or error
        sink.emit(ProgressEvent::CollectionSkipped {
            collection: "a".into(),
        });
    }
}
