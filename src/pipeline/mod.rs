//! Media acquisition pipeline
//!
//! [`MediaPipeline`] owns an [`ItemCollection`] and runs one acquisition task
//! per item. The code is split by concern:
//! - [`tasks`] - upload and generation tasks, retry of failed items
//! - [`submission`] - assembly of the create-content request
//!
//! Tasks are fire-and-forget. Each writes its result back through
//! [`ItemCollection::patch`], keyed by item id, so a result that arrives
//! after its item was removed is dropped instead of landing on whatever item
//! now sits at the old position.

mod submission;
mod tasks;


pub use submission::{Submission, assemble};

use crate::api::ContentApi;
use crate::collection::ItemCollection;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::metadata::MetadataExtractor;
use crate::types::{CollectionKind, CollectionSettings, ContentItemId, Event, ItemId, PipelineItem};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;

/// Capacity of the event channel created by [`MediaPipeline::new`]
pub const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Multi-item acquisition pipeline (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct MediaPipeline {
    /// Items in submission order
    pub(crate) collection: Arc<Mutex<ItemCollection>>,
    /// Requests to the content API
    pub(crate) api: Arc<dyn ContentApi>,
    /// Duration/thumbnail extraction for clips
    pub(crate) extractor: Arc<dyn MetadataExtractor>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Configuration (retry policy, upload tier)
    pub(crate) config: Arc<Config>,
    /// Running acquisition tasks, by item
    pub(crate) in_flight: Arc<Mutex<HashMap<ItemId, TaskHandle>>>,
    /// Source of task ids
    pub(crate) task_seq: Arc<AtomicU64>,
}

/// Ownership record of one running acquisition task
#[derive(Clone, Debug)]
pub(crate) struct TaskHandle {
    /// Distinguishes successive tasks for the same item
    pub(crate) task_id: u64,
    pub(crate) token: CancellationToken,
}

impl MediaPipeline {
    /// Create a pipeline with its own event channel
    pub fn new(
        kind: CollectionKind,
        config: Config,
        api: Arc<dyn ContentApi>,
        extractor: Arc<dyn MetadataExtractor>,
    ) -> Result<Self> {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self::with_events(kind, config, api, extractor, event_tx)
    }

    /// Create a pipeline publishing to an existing event channel
    pub fn with_events(
        kind: CollectionKind,
        config: Config,
        api: Arc<dyn ContentApi>,
        extractor: Arc<dyn MetadataExtractor>,
        event_tx: broadcast::Sender<Event>,
    ) -> Result<Self> {
        config.validate()?;
        tracing::info!(
            kind = ?kind,
            extractor = extractor.name(),
            "media pipeline created"
        );
        Ok(Self {
            collection: Arc::new(Mutex::new(ItemCollection::new(kind))),
            api,
            extractor,
            event_tx,
            config: Arc::new(config),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            task_seq: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Subscribe to pipeline events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Sender side of the event channel, for components that share it
    pub fn event_sender(&self) -> broadcast::Sender<Event> {
        self.event_tx.clone()
    }

    pub(crate) fn emit_event(&self, event: Event) {
        // No receivers is fine
        self.event_tx.send(event).ok();
    }

    /// Collection kind
    pub async fn kind(&self) -> CollectionKind {
        self.collection.lock().await.kind()
    }

    /// Copy of all items in order
    pub async fn items(&self) -> Vec<PipelineItem> {
        self.collection.lock().await.items().to_vec()
    }

    /// Copy of one item
    pub async fn get(&self, id: ItemId) -> Option<PipelineItem> {
        self.collection.lock().await.get(id).cloned()
    }

    /// Number of items
    pub async fn len(&self) -> usize {
        self.collection.lock().await.len()
    }

    /// Never true for a live pipeline; collections start at their minimum
    pub async fn is_empty(&self) -> bool {
        self.collection.lock().await.is_empty()
    }

    /// Items ready for submission
    pub async fn ready_count(&self) -> usize {
        self.collection.lock().await.ready_count()
    }

    /// Whether enough items are ready to submit
    pub async fn is_valid(&self) -> bool {
        self.collection.lock().await.is_valid()
    }

    /// Whether any item is still being acquired
    pub async fn has_active_work(&self) -> bool {
        self.collection.lock().await.has_active_work()
    }

    /// Whether another item can be added
    pub async fn can_add(&self) -> bool {
        self.collection.lock().await.can_add()
    }

    /// Whether an item can be removed
    pub async fn can_remove(&self) -> bool {
        self.collection.lock().await.can_remove()
    }

    /// Summed duration of ready clips, in seconds
    pub async fn total_ready_duration(&self) -> f64 {
        self.collection.lock().await.total_ready_duration()
    }

    /// Append an empty item
    pub async fn add(&self) -> Option<ItemId> {
        let id = self.collection.lock().await.add()?;
        tracing::debug!(item_id = %id, "item added");
        self.emit_event(Event::ItemAdded { id });
        Some(id)
    }

    /// Remove an item and cancel its running transfer, if any
    pub async fn remove(&self, id: ItemId) -> bool {
        if !self.collection.lock().await.remove(id) {
            return false;
        }
        if let Some(handle) = self.in_flight.lock().await.remove(&id) {
            tracing::debug!(item_id = %id, "cancelling transfer of removed item");
            handle.token.cancel();
        }
        self.emit_event(Event::ItemRemoved { id });
        true
    }

    /// Insert a copy of an item right after it
    pub async fn duplicate(&self, id: ItemId) -> Option<ItemId> {
        let copy = self.collection.lock().await.duplicate(id)?;
        tracing::debug!(item_id = %id, copy = %copy, "item duplicated");
        self.emit_event(Event::ItemAdded { id: copy });
        Some(copy)
    }

    /// Move `moved` to the position of `target`
    pub async fn reorder(&self, moved: ItemId, target: ItemId) -> bool {
        let position = {
            let mut collection = self.collection.lock().await;
            if !collection.reorder(moved, target) {
                return false;
            }
            collection.position(moved)
        };
        if let Some(position) = position {
            self.emit_event(Event::ItemReordered {
                id: moved,
                position,
            });
        }
        true
    }

    /// Assemble the ready items and create a content item
    ///
    /// Refused while any item is still uploading or generating, and when too
    /// few items are ready; in both cases no request is sent.
    pub async fn submit(&self, settings: &CollectionSettings) -> Result<ContentItemId> {
        let submission = {
            let collection = self.collection.lock().await;
            let active = collection.active_count();
            if active > 0 {
                return Err(Error::AcquisitionInProgress { active });
            }
            assemble(&collection, settings)?
        };

        let id = self.api.create_content(&submission).await?;
        tracing::info!(
            content_item_id = %id,
            items = submission.media_refs.len(),
            "content item created"
        );
        self.emit_event(Event::ContentCreated { id: id.clone() });
        Ok(id)
    }
}
