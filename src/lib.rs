//! `offline-queue-http` buffers failed HTTP requests in memory and replays
//! them once the client is back online.
//!
//! The crate is built around [`OfflineQueue`]:
//! - [`OfflineQueue::add`] queues a request that could not be delivered
//! - [`OfflineQueue::process_queue`] replays every queued request once
//! - [`OfflineQueue::subscribe`] reports each request's final outcome
//!
//! Replays happen automatically when the [`Connectivity`] signal goes from
//! offline to online. Each request is retried up to
//! [`QueueOptions::max_retries`] times before it is dropped.

mod connectivity;
mod error;
mod events;
mod options;
mod queue;
mod request;
mod types;

pub use connectivity::Connectivity;
pub use error::QueueError;
pub use events::{QueueEvent, REQUEST_FAILED, REQUEST_SYNCED};
pub use options::QueueOptions;
pub use queue::OfflineQueue;
pub use request::{QueuedRequest, RequestId, RequestOptions, RequestTarget};
pub use types::{PassOutcome, PassSummary, SkipReason};

pub type Result<T> = std::result::Result<T, QueueError>;
