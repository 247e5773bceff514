//! Level-triggered status polling
//!
//! A [`StatusPoller`] owns one background task that fetches a snapshot,
//! decides from that snapshot alone whether work is still pending, and if so
//! sleeps one interval and fetches again. There is no attempt counter: the
//! loop runs exactly as long as the server reports active work.
//!
//! Fetches are strictly sequential. Enabling the poller, calling
//! [`StatusPoller::refresh`] or receiving [`Event::JobsInvalidated`] for the
//! tracked content item triggers a fetch right away; the periodic timer is
//! then re-armed from that fetch.

use super::PublishOrchestrator;
use crate::api::ContentApi;
use crate::config::{Config, RetryConfig};
use crate::error::Result;
use crate::retry::with_retry;
use crate::types::{
    ContentItemId, Event, JobId, JobStatus, Platform, PlatformSet, PublishJob, RenderStatus,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::{Stream, StreamExt, wrappers::WatchStream};
use tokio_util::sync::CancellationToken;

/// Something a poller can fetch repeatedly
#[async_trait]
pub trait StatusSource: Send + Sync + 'static {
    /// What one fetch returns
    type Snapshot: Clone + Send + Sync + 'static;

    /// Content item the snapshots belong to
    fn content_item_id(&self) -> &ContentItemId;

    /// Fetch the current snapshot
    async fn fetch(&self) -> Result<Self::Snapshot>;

    /// Whether the snapshot reports pending work
    fn is_active(snapshot: &Self::Snapshot) -> bool;

    /// Whether the snapshot holds nothing to track
    fn is_empty(_snapshot: &Self::Snapshot) -> bool {
        false
    }

    /// Event announcing a fresh snapshot, if the source has one
    fn update_event(&self, _snapshot: &Self::Snapshot) -> Option<Event> {
        None
    }
}

/// Publish jobs of one content item
pub struct PublishJobsSource {
    api: Arc<dyn ContentApi>,
    content_id: ContentItemId,
}

impl PublishJobsSource {
    /// Track the jobs of `content_id`
    pub fn new(api: Arc<dyn ContentApi>, content_id: ContentItemId) -> Self {
        Self { api, content_id }
    }
}

#[async_trait]
impl StatusSource for PublishJobsSource {
    type Snapshot = Vec<PublishJob>;

    fn content_item_id(&self) -> &ContentItemId {
        &self.content_id
    }

    async fn fetch(&self) -> Result<Vec<PublishJob>> {
        self.api.publish_status(&self.content_id).await
    }

    fn is_active(jobs: &Vec<PublishJob>) -> bool {
        jobs.iter().any(PublishJob::is_active)
    }

    fn is_empty(jobs: &Vec<PublishJob>) -> bool {
        jobs.is_empty()
    }

    fn update_event(&self, jobs: &Vec<PublishJob>) -> Option<Event> {
        Some(Event::JobsUpdated {
            content_item_id: self.content_id.clone(),
            active: jobs.iter().filter(|j| j.is_active()).count(),
            failed: jobs
                .iter()
                .filter(|j| j.status == JobStatus::Failed)
                .count(),
        })
    }
}

/// Render status of one content item
pub struct RenderStatusSource {
    api: Arc<dyn ContentApi>,
    content_id: ContentItemId,
}

impl RenderStatusSource {
    /// Track the render status of `content_id`
    pub fn new(api: Arc<dyn ContentApi>, content_id: ContentItemId) -> Self {
        Self { api, content_id }
    }
}

#[async_trait]
impl StatusSource for RenderStatusSource {
    type Snapshot = RenderStatus;

    fn content_item_id(&self) -> &ContentItemId {
        &self.content_id
    }

    async fn fetch(&self) -> Result<RenderStatus> {
        self.api.render_status(&self.content_id).await
    }

    fn is_active(status: &RenderStatus) -> bool {
        status.status.is_active()
    }
}

/// Lifecycle of a poller
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollState {
    /// Disabled, never fetched, or the last fetch returned nothing to track
    Idle,
    /// Work is pending; another fetch is scheduled
    Polling,
    /// Nothing pending; no timer armed
    Settled,
}

/// Poller tracking the publish jobs of a content item
pub type JobStatusPoller = StatusPoller<PublishJobsSource>;

/// Poller tracking the render status of a content item
pub type RenderStatusPoller = StatusPoller<RenderStatusSource>;

/// Handle to a background polling task
///
/// Dropping the handle stops the task.
pub struct StatusPoller<S: StatusSource> {
    content_id: ContentItemId,
    enabled_tx: watch::Sender<bool>,
    refresh: Arc<Notify>,
    snapshot_rx: watch::Receiver<Option<S::Snapshot>>,
    state_rx: watch::Receiver<PollState>,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

struct PollLoop<S: StatusSource> {
    source: S,
    interval: Duration,
    retry: RetryConfig,
    enabled_rx: watch::Receiver<bool>,
    refresh: Arc<Notify>,
    events_rx: broadcast::Receiver<Event>,
    snapshot_tx: watch::Sender<Option<S::Snapshot>>,
    state_tx: watch::Sender<PollState>,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl<S: StatusSource> StatusPoller<S> {
    /// Start polling `source` in a background task
    ///
    /// The poller listens on `event_tx` for invalidations and reports its own
    /// events there. When `enabled` is true the first fetch happens at once.
    pub fn spawn(
        source: S,
        config: &Config,
        event_tx: &broadcast::Sender<Event>,
        enabled: bool,
    ) -> Self {
        let content_id = source.content_item_id().clone();
        let (enabled_tx, enabled_rx) = watch::channel(enabled);
        let (snapshot_tx, snapshot_rx) = watch::channel(None);
        let (state_tx, state_rx) = watch::channel(PollState::Idle);
        let refresh = Arc::new(Notify::new());
        let cancel = CancellationToken::new();

        let poll_loop = PollLoop {
            source,
            interval: config.polling.interval,
            retry: config.retry.clone(),
            enabled_rx,
            refresh: refresh.clone(),
            events_rx: event_tx.subscribe(),
            snapshot_tx,
            state_tx,
            event_tx: event_tx.clone(),
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(poll_loop.run());

        tracing::debug!(content_item_id = %content_id, enabled, "status poller started");

        Self {
            content_id,
            enabled_tx,
            refresh,
            snapshot_rx,
            state_rx,
            event_tx: event_tx.clone(),
            cancel,
            handle: Some(handle),
        }
    }

    /// Content item being tracked
    pub fn content_item_id(&self) -> &ContentItemId {
        &self.content_id
    }

    /// Turn fetching on or off; enabling fetches immediately
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled_tx.send_if_modified(|current| {
            let changed = *current != enabled;
            *current = enabled;
            changed
        });
    }

    /// Fetch now (no-op while disabled)
    pub fn refresh(&self) {
        self.refresh.notify_one();
    }

    /// Most recent successful snapshot
    pub fn latest(&self) -> Option<S::Snapshot> {
        self.snapshot_rx.borrow().clone()
    }

    /// Current lifecycle state
    pub fn state(&self) -> PollState {
        *self.state_rx.borrow()
    }

    /// Receiver that observes every new snapshot
    pub fn subscribe(&self) -> watch::Receiver<Option<S::Snapshot>> {
        self.snapshot_rx.clone()
    }

    /// Stream of snapshots, starting with the current one if any
    pub fn updates(&self) -> impl Stream<Item = S::Snapshot> + Send + 'static {
        WatchStream::new(self.snapshot_rx.clone()).filter_map(|snapshot| snapshot)
    }

    /// Stop the background task and wait for it to exit
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            tracing::warn!(content_item_id = %self.content_id, error = %e, "poller task failed");
        }
    }
}

impl<S: StatusSource> Drop for StatusPoller<S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl JobStatusPoller {
    /// Poll the publish jobs of `content_id`
    pub fn for_jobs(
        api: Arc<dyn ContentApi>,
        content_id: ContentItemId,
        config: &Config,
        event_tx: &broadcast::Sender<Event>,
        enabled: bool,
    ) -> Self {
        Self::spawn(
            PublishJobsSource::new(api, content_id),
            config,
            event_tx,
            enabled,
        )
    }

    /// Platforms whose job is currently failed
    pub fn failed_platforms(&self) -> Vec<Platform> {
        self.snapshot_rx
            .borrow()
            .iter()
            .flatten()
            .filter(|job| job.status == JobStatus::Failed)
            .map(|job| job.platform)
            .collect()
    }

    /// Publish again to the failed platforms only
    ///
    /// Returns an empty list without sending anything when no job failed.
    pub async fn retry_failed(&self, orchestrator: &PublishOrchestrator) -> Result<Vec<JobId>> {
        let failed = self.failed_platforms();
        if failed.is_empty() {
            return Ok(Vec::new());
        }
        let platforms = PlatformSet::new(failed)?;
        let job_ids = orchestrator
            .retry_platforms(&self.content_id, &platforms)
            .await?;

        // The invalidation event re-arms us when we share the orchestrator's channel.
        if !orchestrator.event_sender().same_channel(&self.event_tx) {
            self.refresh();
        }
        Ok(job_ids)
    }
}

impl RenderStatusPoller {
    /// Poll the render status of `content_id`
    pub fn for_render(
        api: Arc<dyn ContentApi>,
        content_id: ContentItemId,
        config: &Config,
        event_tx: &broadcast::Sender<Event>,
        enabled: bool,
    ) -> Self {
        Self::spawn(
            RenderStatusSource::new(api, content_id),
            config,
            event_tx,
            enabled,
        )
    }
}

impl<S: StatusSource> PollLoop<S> {
    async fn run(mut self) {
        let mut fetch_now = *self.enabled_rx.borrow();
        let mut next_fetch: Option<Instant> = None;
        let mut events_open = true;

        loop {
            if fetch_now {
                fetch_now = false;
                if *self.enabled_rx.borrow() {
                    let Some(keep_polling) = self.fetch_once().await else {
                        return;
                    };
                    next_fetch = keep_polling.then(|| Instant::now() + self.interval);
                }
            }

            let timer = async move {
                match next_fetch {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = timer => fetch_now = true,
                _ = self.refresh.notified() => fetch_now = true,
                changed = self.enabled_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    if *self.enabled_rx.borrow() {
                        fetch_now = true;
                    } else {
                        next_fetch = None;
                        self.state_tx.send_replace(PollState::Idle);
                        tracing::debug!(
                            content_item_id = %self.source.content_item_id(),
                            "polling disabled"
                        );
                    }
                }
                event = self.events_rx.recv(), if events_open => match event {
                    Ok(Event::JobsInvalidated { content_item_id })
                        if &content_item_id == self.source.content_item_id() =>
                    {
                        fetch_now = true;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => fetch_now = true,
                    Err(broadcast::error::RecvError::Closed) => events_open = false,
                },
            }
        }
    }

    /// One fetch (with retries); returns whether to keep polling, or `None` on cancel
    async fn fetch_once(&self) -> Option<bool> {
        let content_id = self.source.content_item_id().clone();
        let source = &self.source;
        let fetched = tokio::select! {
            _ = self.cancel.cancelled() => return None,
            result = with_retry(&self.retry, move || source.fetch()) => result,
        };

        let keep_polling = match fetched {
            Ok(snapshot) => {
                let active = S::is_active(&snapshot);
                let empty = S::is_empty(&snapshot);
                tracing::debug!(content_item_id = %content_id, active, empty, "status fetched");

                if let Some(event) = self.source.update_event(&snapshot) {
                    self.event_tx.send(event).ok();
                }
                self.snapshot_tx.send_replace(Some(snapshot));

                let state = if active {
                    PollState::Polling
                } else if empty {
                    PollState::Idle
                } else {
                    PollState::Settled
                };
                self.state_tx.send_replace(state);
                if state == PollState::Settled {
                    tracing::info!(content_item_id = %content_id, "polling settled");
                    self.event_tx
                        .send(Event::PollingSettled {
                            content_item_id: content_id.clone(),
                        })
                        .ok();
                }
                active
            }
            Err(e) => {
                let was_active = self.snapshot_tx.borrow().as_ref().is_some_and(S::is_active);
                tracing::warn!(
                    content_item_id = %content_id,
                    error = %e,
                    keep_polling = was_active,
                    "status fetch failed"
                );
                self.event_tx
                    .send(Event::PollFailed {
                        content_item_id: content_id.clone(),
                        error: e.to_string(),
                    })
                    .ok();
                if !was_active {
                    let state = if self.snapshot_tx.borrow().is_some() {
                        PollState::Settled
                    } else {
                        PollState::Idle
                    };
                    self.state_tx.send_replace(state);
                }
                was_active
            }
        };

        Some(keep_polling)
    }
}
