//! Client facade wiring the HTTP API, metadata tools and event channel together

use crate::api::{ContentApi, HttpContentApi};
use crate::client::RequestClient;
use crate::config::Config;
use crate::error::Result;
use crate::metadata::{MetadataExtractor, extractor_from_config};
use crate::pipeline::{EVENT_CHANNEL_CAPACITY, MediaPipeline};
use crate::publish::{JobStatusPoller, PublishOrchestrator, RenderStatusPoller};
use crate::types::{CollectionKind, ContentItemId, Event};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Entry point for applications embedding the client
///
/// Every component created here shares one event channel, so a single
/// subscriber sees pipeline progress, publish notifications and poller
/// updates in order.
#[derive(Clone)]
pub struct Publista {
    config: Arc<Config>,
    api: Arc<dyn ContentApi>,
    extractor: Arc<dyn MetadataExtractor>,
    event_tx: broadcast::Sender<Event>,
}

impl Publista {
    /// Build a client talking to `config.api.base_url`
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let client = RequestClient::new(&config.api)?;
        let api: Arc<dyn ContentApi> = Arc::new(HttpContentApi::new(client));
        let extractor = extractor_from_config(&config.tools);
        Ok(Self::with_parts(config, api, extractor))
    }

    /// Build a client from already constructed components
    pub fn with_parts(
        config: Config,
        api: Arc<dyn ContentApi>,
        extractor: Arc<dyn MetadataExtractor>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        tracing::info!(
            base_url = %config.api.base_url,
            extractor = extractor.name(),
            "publista client ready"
        );
        Self {
            config: Arc::new(config),
            api,
            extractor,
            event_tx,
        }
    }

    /// Subscribe to all events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Current configuration
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Start a new media collection
    pub fn pipeline(&self, kind: CollectionKind) -> Result<MediaPipeline> {
        MediaPipeline::with_events(
            kind,
            (*self.config).clone(),
            self.api.clone(),
            self.extractor.clone(),
            self.event_tx.clone(),
        )
    }

    /// Publishing actions for created content
    pub fn orchestrator(&self) -> PublishOrchestrator {
        PublishOrchestrator::new(self.api.clone(), self.event_tx.clone())
    }

    /// Track the publish jobs of `content_id`
    pub fn job_poller(&self, content_id: ContentItemId, enabled: bool) -> JobStatusPoller {
        JobStatusPoller::for_jobs(
            self.api.clone(),
            content_id,
            &self.config,
            &self.event_tx,
            enabled,
        )
    }

    /// Track rendering of `content_id`
    pub fn render_poller(&self, content_id: ContentItemId, enabled: bool) -> RenderStatusPoller {
        RenderStatusPoller::for_render(
            self.api.clone(),
            content_id,
            &self.config,
            &self.event_tx,
            enabled,
        )
    }
}
