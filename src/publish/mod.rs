//! Publishing: immediate, scheduled and retried publishes plus job tracking
//!
//! [`PublishOrchestrator`] sends publish requests and announces every change
//! to a content item's job set with [`Event::JobsInvalidated`]. Pollers in
//! [`poller`] listen for that event and fetch fresh job state right away.

pub mod poller;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use crate::api::ScheduleResult;
pub use poller::{
    JobStatusPoller, PollState, PublishJobsSource, RenderStatusPoller, RenderStatusSource,
    StatusPoller, StatusSource,
};

use crate::api::ContentApi;
use crate::error::{Error, Result};
use crate::types::{
    ConnectedPlatforms, ContentItemId, Event, JobId, NotificationLevel, PlatformSet,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Shortest accepted lead time for a scheduled publish, in minutes
pub const MIN_SCHEDULE_LEAD_MINUTES: i64 = 5;

/// When and where to publish later
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduleRequest {
    /// Publish time
    pub scheduled_at: DateTime<Utc>,
    /// Target platforms
    pub platforms: PlatformSet,
}

/// Sends publish, schedule and retry requests for created content
#[derive(Clone)]
pub struct PublishOrchestrator {
    api: Arc<dyn ContentApi>,
    event_tx: broadcast::Sender<Event>,
}

impl PublishOrchestrator {
    /// Create an orchestrator that reports on `event_tx`
    pub fn new(api: Arc<dyn ContentApi>, event_tx: broadcast::Sender<Event>) -> Self {
        Self { api, event_tx }
    }

    /// Subscribe to notifications and invalidation events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Sender side of the event channel
    pub fn event_sender(&self) -> broadcast::Sender<Event> {
        self.event_tx.clone()
    }

    /// Publish to every platform in the set now
    pub async fn publish_now(
        &self,
        content_id: &ContentItemId,
        platforms: &PlatformSet,
        connected: &ConnectedPlatforms,
    ) -> Result<Vec<JobId>> {
        ensure_connected(platforms, connected)?;

        match self.api.publish(content_id, platforms).await {
            Ok(job_ids) => {
                tracing::info!(
                    content_item_id = %content_id,
                    platforms = ?platforms.to_wire(),
                    jobs = job_ids.len(),
                    "publish requested"
                );
                self.invalidate(content_id);
                self.notify(
                    NotificationLevel::Success,
                    format!("Publishing to {}...", platforms.summary()),
                );
                Ok(job_ids)
            }
            Err(e) => Err(self.report(content_id, e, "Failed to publish")),
        }
    }

    /// Schedule a publish at least five minutes ahead
    pub async fn schedule(
        &self,
        content_id: &ContentItemId,
        request: ScheduleRequest,
        connected: &ConnectedPlatforms,
    ) -> Result<ScheduleResult> {
        ensure_connected(&request.platforms, connected)?;
        let earliest = Utc::now() + chrono::Duration::minutes(MIN_SCHEDULE_LEAD_MINUTES);
        if request.scheduled_at < earliest {
            return Err(Error::Validation(format!(
                "scheduled time must be at least {MIN_SCHEDULE_LEAD_MINUTES} minutes in the future"
            )));
        }

        match self
            .api
            .schedule(content_id, request.scheduled_at, &request.platforms)
            .await
        {
            Ok(result) => {
                tracing::info!(
                    content_item_id = %content_id,
                    scheduled_at = %result.scheduled_at,
                    jobs = result.job_ids.len(),
                    "publish scheduled"
                );
                self.invalidate(content_id);
                self.notify(
                    NotificationLevel::Success,
                    format!("Scheduled for {}", format_schedule_time(&result.scheduled_at)),
                );
                Ok(result)
            }
            Err(e) => Err(self.report(content_id, e, "Failed to schedule content")),
        }
    }

    /// Cancel a pending schedule
    pub async fn cancel_schedule(&self, content_id: &ContentItemId) -> Result<()> {
        match self.api.cancel_schedule(content_id).await {
            Ok(()) => {
                tracing::info!(content_item_id = %content_id, "schedule cancelled");
                self.invalidate(content_id);
                self.notify(NotificationLevel::Success, "Schedule cancelled".into());
                Ok(())
            }
            Err(e) => Err(self.report(content_id, e, "Failed to cancel schedule")),
        }
    }

    /// Publish again to a subset of platforms, typically the failed ones
    pub async fn retry_platforms(
        &self,
        content_id: &ContentItemId,
        platforms: &PlatformSet,
    ) -> Result<Vec<JobId>> {
        match self.api.publish(content_id, platforms).await {
            Ok(job_ids) => {
                tracing::info!(
                    content_item_id = %content_id,
                    platforms = ?platforms.to_wire(),
                    "publish retry requested"
                );
                self.invalidate(content_id);
                self.notify(
                    NotificationLevel::Success,
                    format!("Retrying {}...", platforms.summary()),
                );
                Ok(job_ids)
            }
            Err(e) => Err(self.report(content_id, e, "Failed to retry publish")),
        }
    }

    fn invalidate(&self, content_id: &ContentItemId) {
        self.event_tx
            .send(Event::JobsInvalidated {
                content_item_id: content_id.clone(),
            })
            .ok();
    }

    fn notify(&self, level: NotificationLevel, message: String) {
        self.event_tx
            .send(Event::Notification { level, message })
            .ok();
    }

    /// Log a failed request and surface it as an error notification
    fn report(&self, content_id: &ContentItemId, error: Error, fallback: &str) -> Error {
        tracing::warn!(content_item_id = %content_id, error = %error, "{fallback}");
        let message = error.api_message().unwrap_or(fallback).to_string();
        self.notify(NotificationLevel::Error, message);
        error
    }
}

fn ensure_connected(platforms: &PlatformSet, connected: &ConnectedPlatforms) -> Result<()> {
    match platforms.first_unconnected(connected) {
        Some(platform) => Err(Error::PlatformNotConnected { platform }),
        None => Ok(()),
    }
}

/// Medium date plus short time, e.g. "Dec 1, 2026, 9:30 AM UTC"
pub fn format_schedule_time(at: &DateTime<Utc>) -> String {
    at.format("%b %-d, %Y, %-I:%M %p UTC").to_string()
}
