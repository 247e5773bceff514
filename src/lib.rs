//! # publista-client
//!
//! Async client library for building and publishing social media content.
//!
//! ## Overview
//!
//! - **Media pipeline** - collect slides or clips, upload or generate each one
//!   concurrently and assemble the ready items into a content submission
//! - **Publishing** - publish now, schedule, cancel and retry per platform
//! - **Status polling** - follow publish jobs and renders until they settle
//! - **Event-driven** - every component reports on one broadcast channel
//!
//! ## Quick Start
//!
//! ```no_run
//! use publista_client::{CollectionKind, CollectionSettings, Config, Publista};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.api.base_url = "https://app.example.com".to_string();
//!
//!     let client = Publista::new(config)?;
//!     let mut events = client.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let pipeline = client.pipeline(CollectionKind::Slides)?;
//!     // ... start uploads or generations, wait for ItemReady events ...
//!     let content_id = pipeline
//!         .submit(&CollectionSettings::for_kind(CollectionKind::Slides))
//!         .await?;
//!
//!     let poller = client.job_poller(content_id, true);
//!     println!("state: {:?}", poller.state());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Typed content API over the request client
pub mod api;
/// HTTP request client with CSRF handling
pub mod client;
/// Identity-keyed bounded item collection
pub mod collection;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Media metadata extraction
pub mod metadata;
/// Multi-item media pipeline
pub mod pipeline;
/// Publishing and status polling
pub mod publish;
/// Client facade
pub mod publista;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use api::{ContentApi, HttpContentApi};
pub use client::{ProgressFn, RequestClient};
pub use collection::ItemCollection;
pub use config::{Config, SubscriptionTier};
pub use error::{ApiErrorBody, Error, ErrorDetail, Result};
pub use metadata::{
    CliMetadataExtractor, MediaMetadata, MetadataExtractor, NoOpMetadataExtractor,
};
pub use pipeline::{MediaPipeline, Submission};
pub use publish::{
    JobStatusPoller, PollState, PublishOrchestrator, RenderStatusPoller, ScheduleRequest,
    StatusPoller, StatusSource,
};
pub use publista::Publista;
pub use retry::{IsRetryable, with_retry};
pub use types::{
    CollectionKind, CollectionSettings, ConnectedPlatforms, ContentItemId, Event, ItemId,
    ItemOrigin, ItemStatus, JobId, JobStatus, MediaSource, PipelineItem, Platform, PlatformSet,
    PublishJob,
};
