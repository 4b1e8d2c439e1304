use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, SystemTime};

use futures::future::join_all;
use reqwest::Url;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::{
    Connectivity, PassOutcome, PassSummary, QueueError, QueueEvent, QueueOptions, QueuedRequest,
    RequestId, RequestOptions, RequestTarget, Result, SkipReason,
};

struct Entry {
    request: QueuedRequest,
    // Distinguishes this entry from any later one under the same id.
    epoch: u64,
}

enum RetryOutcome {
    Synced,
    Exhausted,
    Retained,
    Stale,
}

struct Inner {
    http: reqwest::Client,
    options: QueueOptions,
    connectivity: Connectivity,
    entries: Mutex<HashMap<RequestId, Entry>>,
    next_epoch: AtomicU64,
    processing: AtomicBool,
    shut_down: AtomicBool,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<QueueEvent>>>,
    size: watch::Sender<usize>,
    resync: mpsc::UnboundedSender<Duration>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let driver = self
            .driver
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(driver) = driver.take() {
            driver.abort();
        }
    }
}

/// In-memory queue of failed HTTP requests, replayed when connectivity
/// returns.
///
/// Handles are cheap to clone and share one queue. Each queue owns a
/// background task that runs a pass on every offline to online transition
/// of its [`Connectivity`] and after the resync delay when a pass leaves
/// entries behind, so it must be created inside a tokio runtime.
#[derive(Clone)]
pub struct OfflineQueue {
    inner: Arc<Inner>,
}

impl fmt::Debug for OfflineQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OfflineQueue")
            .field("size", &self.size())
            .field("online", &self.is_online())
            .field("options", &self.inner.options)
            .finish()
    }
}

impl OfflineQueue {
    /// Creates a queue with a default `reqwest` client.
    pub fn new(connectivity: Connectivity, options: QueueOptions) -> Self {
        Self::with_http_client(reqwest::Client::new(), connectivity, options)
    }

    /// Creates a queue that replays requests through `http`.
    pub fn with_http_client(
        http: reqwest::Client,
        connectivity: Connectivity,
        options: QueueOptions,
    ) -> Self {
        let (size, _) = watch::channel(0);
        let (resync, resync_rx) = mpsc::unbounded_channel();
        let online_rx = connectivity.subscribe();

        let inner = Arc::new(Inner {
            http,
            options,
            connectivity,
            entries: Mutex::new(HashMap::new()),
            next_epoch: AtomicU64::new(0),
            processing: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            subscribers: Mutex::new(Vec::new()),
            size,
            resync,
            driver: Mutex::new(None),
        });

        let driver = tokio::spawn(drive(Arc::downgrade(&inner), online_rx, resync_rx));
        *lock(&inner.driver) = Some(driver);

        Self { inner }
    }

    /// Enqueues a request for replay and returns its id.
    pub fn add(&self, url: impl Into<String>, options: RequestOptions) -> RequestId {
        let id = RequestId::generate();
        let request = QueuedRequest {
            id: id.clone(),
            target: RequestTarget {
                url: url.into(),
                options,
            },
            enqueued_at: SystemTime::now(),
            retry_count: 0,
        };
        let epoch = self.inner.next_epoch.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "tracing")]
        tracing::debug!(id = %id, url = %request.target.url, "queued request for replay");

        let size = {
            let mut entries = self.entries();
            entries.insert(id.clone(), Entry { request, epoch });
            entries.len()
        };
        self.publish_size(size);

        id
    }

    /// Drops an entry. Returns whether one was present.
    pub fn remove(&self, id: &RequestId) -> bool {
        let (removed, size) = {
            let mut entries = self.entries();
            let removed = entries.remove(id).is_some();
            (removed, entries.len())
        };
        if removed {
            self.publish_size(size);
        }
        removed
    }

    pub fn size(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn get(&self, id: &RequestId) -> Option<QueuedRequest> {
        self.entries().get(id).map(|entry| entry.request.clone())
    }

    /// Snapshot of the current entries in insertion order.
    pub fn get_all(&self) -> Vec<QueuedRequest> {
        let mut snapshot: Vec<(u64, QueuedRequest)> = self
            .entries()
            .values()
            .map(|entry| (entry.epoch, entry.request.clone()))
            .collect();
        snapshot.sort_by_key(|(epoch, _)| *epoch);
        snapshot.into_iter().map(|(_, request)| request).collect()
    }

    /// Empties the queue without emitting events.
    pub fn clear(&self) {
        self.entries().clear();
        self.publish_size(0);
    }

    pub fn is_online(&self) -> bool {
        self.inner.connectivity.is_online()
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.inner.connectivity
    }

    /// Subscribes to synced/failed notifications.
    ///
    /// Every subscriber receives every event published after it subscribed;
    /// nothing is dropped however many entries one pass settles. Dropping
    /// the receiver unsubscribes.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<QueueEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.inner.subscribers).push(tx);
        rx
    }

    /// Watches the number of pending entries.
    pub fn watch_size(&self) -> watch::Receiver<usize> {
        self.inner.size.subscribe()
    }

    /// Replays every queued request once.
    ///
    /// Skipped while another pass is in flight, when the queue is empty,
    /// while offline, and after [`OfflineQueue::shutdown`]. All entries are
    /// attempted concurrently and the pass waits for every attempt to
    /// settle; one failure never stops the others. When entries remain
    /// and the client is still online, another pass runs after
    /// [`QueueOptions::resync_delay_ms`].
    pub async fn process_queue(&self) -> PassOutcome {
        if let Some(reason) = self.skip_reason() {
            return PassOutcome::Skipped(reason);
        }
        let Some(_guard) = ProcessingGuard::acquire(&self.inner.processing) else {
            return PassOutcome::Skipped(SkipReason::AlreadyProcessing);
        };

        let batch: Vec<(QueuedRequest, u64)> = {
            let entries = self.entries();
            entries
                .values()
                .map(|entry| (entry.request.clone(), entry.epoch))
                .collect()
        };
        if batch.is_empty() {
            return PassOutcome::Skipped(SkipReason::Empty);
        }

        #[cfg(feature = "tracing")]
        tracing::info!("processing {} queued requests", batch.len());

        let outcomes = join_all(
            batch
                .into_iter()
                .map(|(request, epoch)| self.retry(request, epoch)),
        )
        .await;

        let mut summary = PassSummary {
            attempted: outcomes.len(),
            ..PassSummary::default()
        };
        for outcome in outcomes {
            match outcome {
                RetryOutcome::Synced => summary.synced += 1,
                RetryOutcome::Exhausted => summary.exhausted += 1,
                RetryOutcome::Retained => summary.retained += 1,
                RetryOutcome::Stale => summary.stale += 1,
            }
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            synced = summary.synced,
            exhausted = summary.exhausted,
            retained = summary.retained,
            stale = summary.stale,
            "processed offline queue"
        );

        if !self.is_empty() && self.is_online() && !self.inner.shut_down.load(Ordering::SeqCst) {
            self.schedule_resync();
        }

        PassOutcome::Completed(summary)
    }

    /// Checks reachability of `url` with a `HEAD` request and records the
    /// result in the connectivity signal. Any HTTP response counts as
    /// online.
    pub async fn probe(&self, url: &str) -> bool {
        let url = match self.resolve_url(url) {
            Ok(url) => url,
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("cannot probe connectivity: {}", _err);
                return self.is_online();
            }
        };

        let mut request = self.inner.http.head(url);
        if let Some(timeout_ms) = self.inner.options.timeout_ms {
            request = request.timeout(Duration::from_millis(timeout_ms));
        }
        let online = request.send().await.is_ok();
        self.inner.connectivity.set_online(online);
        online
    }

    /// Stops background processing and returns the entries still pending.
    ///
    /// Later passes are skipped. A retry already in flight still settles,
    /// but its result is discarded.
    pub fn shutdown(&self) -> Vec<QueuedRequest> {
        self.inner.shut_down.store(true, Ordering::SeqCst);
        if let Some(driver) = lock(&self.inner.driver).take() {
            driver.abort();
        }

        let mut drained: Vec<Entry> = self.entries().drain().map(|(_, entry)| entry).collect();
        drained.sort_by_key(|entry| entry.epoch);
        self.publish_size(0);

        #[cfg(feature = "tracing")]
        tracing::info!("offline queue shut down with {} pending requests", drained.len());

        drained.into_iter().map(|entry| entry.request).collect()
    }

    fn skip_reason(&self) -> Option<SkipReason> {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return Some(SkipReason::ShutDown);
        }
        if self.inner.processing.load(Ordering::Acquire) {
            return Some(SkipReason::AlreadyProcessing);
        }
        if self.is_empty() {
            return Some(SkipReason::Empty);
        }
        if !self.is_online() {
            #[cfg(feature = "tracing")]
            tracing::debug!("still offline, skipping queue processing");
            return Some(SkipReason::Offline);
        }
        None
    }

    async fn retry(&self, request: QueuedRequest, epoch: u64) -> RetryOutcome {
        let result = self.reissue(&request.target).await;
        self.settle(&request.id, epoch, result)
    }

    async fn reissue(&self, target: &RequestTarget) -> Result<()> {
        let url = self.resolve_url(&target.url)?;
        let options = &target.options;

        let mut request = self
            .inner
            .http
            .request(options.method.clone(), url)
            .headers(options.headers.clone());
        if let Some(body) = &options.body {
            request = request.body(body.clone());
        }
        if let Some(timeout_ms) = self.inner.options.timeout_ms {
            request = request.timeout(Duration::from_millis(timeout_ms));
        }

        let response = request.send().await.map_err(QueueError::Transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.map_err(QueueError::Transport)?;
        Err(QueueError::Http {
            status: status.as_u16(),
            body,
        })
    }

    /// Applies a retry result to the entry it was issued for.
    fn settle(&self, id: &RequestId, epoch: u64, result: Result<()>) -> RetryOutcome {
        let mut entries = self.entries();
        if !entries.get(id).is_some_and(|entry| entry.epoch == epoch) {
            #[cfg(feature = "tracing")]
            tracing::debug!(id = %id, "discarding result for request removed mid-flight");
            return RetryOutcome::Stale;
        }

        let (outcome, event) = match result {
            Ok(()) => {
                let Some(entry) = entries.remove(id) else {
                    return RetryOutcome::Stale;
                };

                #[cfg(feature = "tracing")]
                tracing::info!(id = %id, url = %entry.request.target.url, "replayed queued request");

                (
                    RetryOutcome::Synced,
                    Some(QueueEvent::Synced {
                        request: entry.request,
                    }),
                )
            }
            Err(error) => {
                let Some(entry) = entries.get_mut(id) else {
                    return RetryOutcome::Stale;
                };
                entry.request.retry_count += 1;
                let retry_count = entry.request.retry_count;
                let max_retries = self.inner.options.max_retries;

                if retry_count >= max_retries {
                    let Some(entry) = entries.remove(id) else {
                        return RetryOutcome::Stale;
                    };

                    #[cfg(feature = "tracing")]
                    tracing::error!(
                        id = %id,
                        url = %entry.request.target.url,
                        "max retries reached, dropping request: {}",
                        error
                    );

                    (
                        RetryOutcome::Exhausted,
                        Some(QueueEvent::Failed {
                            request: entry.request,
                            error: Arc::new(error),
                        }),
                    )
                } else {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        id = %id,
                        "retry {}/{} failed: {}",
                        retry_count,
                        max_retries,
                        error
                    );

                    (RetryOutcome::Retained, None)
                }
            }
        };

        let size = entries.len();
        drop(entries);

        if let Some(event) = event {
            self.publish_size(size);
            self.publish_event(event);
        }
        outcome
    }

    fn resolve_url(&self, raw: &str) -> Result<Url> {
        if let Ok(url) = Url::parse(raw) {
            return Ok(url);
        }
        let base = self.inner.options.base_url.as_deref().ok_or_else(|| {
            QueueError::InvalidUrl(format!("relative url '{raw}' needs a base url"))
        })?;
        Url::parse(base)
            .and_then(|base| base.join(raw))
            .map_err(|err| QueueError::InvalidUrl(format!("'{raw}' against '{base}': {err}")))
    }

    fn schedule_resync(&self) {
        let delay = Duration::from_millis(self.inner.options.resync_delay_ms);

        #[cfg(feature = "tracing")]
        tracing::debug!("scheduling queue resync in {} ms", delay.as_millis());

        let _ = self.inner.resync.send(delay);
    }

    fn publish_event(&self, event: QueueEvent) {
        lock(&self.inner.subscribers).retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn publish_size(&self, size: usize) {
        self.inner.size.send_replace(size);
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<RequestId, Entry>> {
        lock(&self.inner.entries)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Holds the processing flag for the duration of a pass.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl<'a> ProcessingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Background driver: runs a pass when connectivity comes back and when a
/// scheduled resync comes due. Exits once every queue handle is gone.
async fn drive(
    queue: Weak<Inner>,
    mut online: watch::Receiver<bool>,
    mut resync: mpsc::UnboundedReceiver<Duration>,
) {
    let mut was_online = *online.borrow_and_update();
    let mut resync_at: Option<Instant> = None;

    loop {
        tokio::select! {
            changed = online.changed() => {
                if changed.is_err() {
                    break;
                }
                let now_online = *online.borrow_and_update();
                let reconnected = now_online && !was_online;
                was_online = now_online;
                if !reconnected {
                    continue;
                }

                #[cfg(feature = "tracing")]
                tracing::debug!("connectivity restored, processing offline queue");
            }
            delay = resync.recv() => {
                let Some(delay) = delay else {
                    break;
                };
                resync_at = Some(Instant::now() + delay);
                continue;
            }
            _ = sleep_until(resync_at.unwrap_or_else(Instant::now)), if resync_at.is_some() => {
                resync_at = None;
            }
        }

        let Some(inner) = queue.upgrade() else {
            break;
        };
        OfflineQueue { inner }.process_queue().await;
    }
}
