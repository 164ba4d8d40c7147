use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::error::SliceFailure;

/// Notifications emitted independently by every slice worker.
///
/// `Error` and `Complete` are separate signals: a failing slice first reports
/// `Error` and then still reports `Complete`, meaning "this worker is done".
#[derive(Debug, Clone)]
pub enum SliceEvent {
    Progress { slice_id: usize, estimate: f64 },
    Complete { slice_id: usize },
    Error { slice_id: usize, failure: SliceFailure },
}

impl SliceEvent {
    pub fn slice_id(&self) -> usize {
        match self {
            SliceEvent::Progress { slice_id, .. }
            | SliceEvent::Complete { slice_id }
            | SliceEvent::Error { slice_id, .. } => *slice_id,
        }
    }
}

/// Where workers publish their events. Unbounded so a slow subscriber never
/// stalls a network read.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<UnboundedSender<SliceEvent>>,
}

impl EventSink {
    pub fn channel() -> (Self, UnboundedReceiver<SliceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn none() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: SliceEvent) {
        if let Some(tx) = &self.tx {
            // A dropped receiver only means nobody is listening any more.
            let _ = tx.send(event);
        }
    }

    pub(crate) fn progress(&self, slice_id: usize, estimate: f64) {
        self.emit(SliceEvent::Progress { slice_id, estimate });
    }

    pub(crate) fn complete(&self, slice_id: usize) {
        self.emit(SliceEvent::Complete { slice_id });
    }

    pub(crate) fn error(&self, slice_id: usize, failure: SliceFailure) {
        self.emit(SliceEvent::Error { slice_id, failure });
    }
}
