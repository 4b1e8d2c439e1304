use std::sync::Arc;

use crate::{QueueError, QueuedRequest, RequestId, RequestTarget};

/// Event name of [`QueueEvent::Synced`].
pub const REQUEST_SYNCED: &str = "request-synced";
/// Event name of [`QueueEvent::Failed`].
pub const REQUEST_FAILED: &str = "request-failed";

/// Final outcome of a queued request, delivered to every subscriber.
///
/// `request` is the entry as it was when it left the queue.
#[derive(Clone, Debug)]
pub enum QueueEvent {
    /// Replay succeeded and the entry was removed.
    Synced { request: QueuedRequest },
    /// Retry budget exhausted; the entry was dropped.
    Failed {
        request: QueuedRequest,
        error: Arc<QueueError>,
    },
}

impl QueueEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Synced { .. } => REQUEST_SYNCED,
            Self::Failed { .. } => REQUEST_FAILED,
        }
    }

    pub fn request(&self) -> &QueuedRequest {
        match self {
            Self::Synced { request } | Self::Failed { request, .. } => request,
        }
    }

    pub fn id(&self) -> &RequestId {
        &self.request().id
    }

    pub fn target(&self) -> &RequestTarget {
        &self.request().target
    }

    pub fn error(&self) -> Option<&QueueError> {
        match self {
            Self::Synced { .. } => None,
            Self::Failed { error, .. } => Some(error),
        }
    }
}
