//! Acquisition tasks: upload, generation and retry

use super::{MediaPipeline, TaskHandle};
use crate::api::PresignRequest;
use crate::client::ProgressFn;
use crate::config::SubscriptionTier;
use crate::error::{Error, Result};
use crate::metadata::MediaMetadata;
use crate::retry::with_retry;
use crate::types::{
    CollectionKind, Event, ItemId, ItemOrigin, ItemPatch, ItemStatus, MediaSource,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio_util::sync::CancellationToken;

/// Shown when an upload fails without a server message
pub const UPLOAD_FAILED: &str = "Upload failed. Please try again.";
/// Shown when clip metadata cannot be extracted
pub const PROCESSING_FAILED: &str = "Failed to process video";
/// Shown when generation fails without a server message
pub const GENERATION_FAILED: &str = "Image generation failed";
/// Shown when generation is refused for lack of credits
pub const QUOTA_MESSAGE: &str = "Not enough credits. Upgrade your plan for more.";
/// Longest accepted generation prompt, in characters
pub const MAX_PROMPT_CHARS: usize = 1000;

/// Check a file against the kind's MIME types and the plan's size limit
fn validate_source(
    source: &MediaSource,
    kind: CollectionKind,
    tier: SubscriptionTier,
) -> Option<String> {
    if !kind.allowed_types().contains(&source.content_type.as_str()) {
        let allowed = match kind {
            CollectionKind::Clips => "MP4, MOV, WebM",
            CollectionKind::Slides => "JPG, PNG, WebP",
        };
        return Some(format!("Unsupported file type. Allowed: {allowed}"));
    }
    if source.size_bytes > tier.max_file_size_bytes() {
        return Some(format!(
            "File too large. Maximum size for your plan: {}MB",
            tier.max_file_size_mb()
        ));
    }
    None
}

impl MediaPipeline {
    /// Start uploading a file into an item
    ///
    /// The item moves to `processing` (clips) or `uploading` (slides) and a
    /// background task runs metadata extraction and the transfer
    /// concurrently. A file that fails the type or size check puts the item
    /// straight into `error` without sending anything. An item that is
    /// already being acquired is rejected with [`Error::InvalidTransition`].
    pub async fn start_upload(&self, id: ItemId, source: MediaSource) -> Result<()> {
        let kind = self.collection.lock().await.kind();
        self.claim(
            id,
            ItemPatch {
                status: Some(kind.upload_status()),
                origin: Some(ItemOrigin::Upload),
                source: Some(source.clone()),
                ..Default::default()
            },
        )
        .await?;

        if let Some(message) = validate_source(&source, kind, self.config.upload.tier) {
            tracing::warn!(item_id = %id, file = %source.file_name, reason = %message, "file rejected");
            self.finish(id, ItemPatch::failed(message)).await;
            return Ok(());
        }

        let handle = self.register_task(id).await;

        tracing::info!(
            item_id = %id,
            file = %source.file_name,
            size = source.size_bytes,
            "upload started"
        );

        let pipeline = self.clone();
        tokio::spawn(async move {
            pipeline.run_upload(id, kind, source, handle).await;
        });
        Ok(())
    }

    /// Move an idle item into an active status
    ///
    /// The check and the patch happen under one lock, so two starts racing
    /// for the same item cannot both succeed.
    async fn claim(&self, id: ItemId, patch: ItemPatch) -> Result<()> {
        let to = patch.status.unwrap_or(ItemStatus::Empty);
        {
            let mut collection = self.collection.lock().await;
            let from = collection
                .get(id)
                .map(|item| item.status)
                .ok_or(Error::ItemNotFound(id))?;
            if from.is_active() {
                return Err(Error::InvalidTransition { id, from, to });
            }
            collection.patch(id, patch)?;
        }
        self.emit_event(Event::ItemStatusChanged { id, status: to });
        Ok(())
    }

    async fn register_task(&self, id: ItemId) -> TaskHandle {
        let handle = TaskHandle {
            task_id: self.task_seq.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
        };
        self.in_flight.lock().await.insert(id, handle.clone());
        handle
    }

    /// Drop the in-flight entry of `id` if it still belongs to `task_id`
    async fn release(&self, id: ItemId, task_id: u64) {
        let mut in_flight = self.in_flight.lock().await;
        if in_flight.get(&id).is_some_and(|h| h.task_id == task_id) {
            in_flight.remove(&id);
        }
    }

    async fn run_upload(
        &self,
        id: ItemId,
        kind: CollectionKind,
        source: MediaSource,
        handle: TaskHandle,
    ) {
        let extract = async {
            match kind {
                CollectionKind::Clips => self.extractor.extract(&source).await,
                CollectionKind::Slides => Ok(MediaMetadata::default()),
            }
        };
        let transfer = self.transfer(id, &source);

        let (metadata, uploaded) = tokio::select! {
            _ = handle.token.cancelled() => {
                tracing::debug!(item_id = %id, "upload cancelled");
                self.emit_event(Event::StaleResultDiscarded { id });
                return;
            }
            results = async { tokio::join!(extract, transfer) } => results,
        };

        let patch = match (uploaded, metadata) {
            (Ok(file_key), Ok(metadata)) => {
                let preview = match kind {
                    CollectionKind::Clips => metadata
                        .thumbnail
                        .map(|p| p.to_string_lossy().into_owned()),
                    CollectionKind::Slides => Some(source.path.to_string_lossy().into_owned()),
                };
                ItemPatch {
                    status: Some(ItemStatus::Ready),
                    derived_ref: Some(file_key),
                    preview_ref: preview,
                    duration_secs: metadata.duration_secs,
                    ..Default::default()
                }
            }
            (Err(e), _) => {
                tracing::warn!(item_id = %id, error = %e, "upload failed");
                ItemPatch::failed(e.api_message().unwrap_or(UPLOAD_FAILED))
            }
            (Ok(_), Err(e)) => {
                tracing::warn!(item_id = %id, error = %e, "metadata extraction failed");
                ItemPatch::failed(PROCESSING_FAILED)
            }
        };

        self.release(id, handle.task_id).await;
        self.finish(id, patch).await;
    }

    /// Presign and PUT, retrying transient failures; returns the storage key
    async fn transfer(&self, id: ItemId, source: &MediaSource) -> Result<String> {
        let request = &PresignRequest::from(source);
        let api = &self.api;
        let progress = &self.progress_reporter(id, source.size_bytes);
        with_retry(&self.config.retry, || async move {
            let presigned = api.presign_upload(request).await?;
            api.upload_file(&presigned.presigned_url, source, progress.clone())
                .await?;
            Ok::<_, Error>(presigned.file_key)
        })
        .await
    }

    /// Turn byte counts into `ItemProgress` events, one per new whole percent
    ///
    /// Progress never goes backwards: a retried transfer reports again only
    /// once it passes the best percentage seen so far.
    fn progress_reporter(&self, id: ItemId, total: u64) -> ProgressFn {
        let event_tx = self.event_tx.clone();
        let reported = Arc::new(AtomicU8::new(0));
        Arc::new(move |sent| {
            let percent = upload_percent(sent, total);
            if reported.fetch_max(percent, Ordering::Relaxed) < percent {
                event_tx.send(Event::ItemProgress { id, percent }).ok();
            }
        })
    }

    /// Start generating an image into an item
    ///
    /// The prompt is trimmed and must be 1 to 1000 characters; an invalid
    /// prompt is rejected without touching the item.
    pub async fn start_generation(&self, id: ItemId, prompt: &str) -> Result<()> {
        let prompt = prompt.trim().to_string();
        let chars = prompt.chars().count();
        if chars == 0 || chars > MAX_PROMPT_CHARS {
            return Err(Error::Validation(format!(
                "prompt must be 1 to {MAX_PROMPT_CHARS} characters, got {chars}"
            )));
        }

        self.claim(
            id,
            ItemPatch {
                status: Some(ItemStatus::Generating),
                origin: Some(ItemOrigin::Generated),
                prompt: Some(prompt.clone()),
                ..Default::default()
            },
        )
        .await?;

        let handle = self.register_task(id).await;
        tracing::info!(item_id = %id, "generation started");

        let pipeline = self.clone();
        tokio::spawn(async move {
            pipeline.run_generation(id, prompt, handle).await;
        });
        Ok(())
    }

    async fn run_generation(&self, id: ItemId, prompt: String, handle: TaskHandle) {
        let result = tokio::select! {
            _ = handle.token.cancelled() => {
                tracing::debug!(item_id = %id, "generation cancelled");
                self.emit_event(Event::StaleResultDiscarded { id });
                return;
            }
            result = self.api.generate_image(&prompt) => result,
        };

        let patch = match result {
            Ok(asset) => ItemPatch {
                status: Some(ItemStatus::Ready),
                derived_ref: Some(asset.file_key),
                preview_ref: Some(asset.image_url),
                ..Default::default()
            },
            Err(e) if e.is_quota_exceeded() => {
                tracing::warn!(item_id = %id, "generation refused: quota exceeded");
                ItemPatch::failed(QUOTA_MESSAGE)
            }
            Err(e) => {
                tracing::warn!(item_id = %id, error = %e, "generation failed");
                ItemPatch::failed(e.api_message().unwrap_or(GENERATION_FAILED))
            }
        };

        self.release(id, handle.task_id).await;
        self.finish(id, patch).await;
    }

    /// Relaunch acquisition of a failed item from its stored file or prompt
    pub async fn retry(&self, id: ItemId) -> Result<()> {
        let item = self.get(id).await.ok_or(Error::ItemNotFound(id))?;
        if item.status != ItemStatus::Error {
            return Err(Error::Validation(format!(
                "item {id} is {}, only failed items can be retried",
                item.status
            )));
        }

        match (item.origin, item.source, item.prompt) {
            (ItemOrigin::Upload, Some(source), _) => self.start_upload(id, source).await,
            (ItemOrigin::Generated, _, Some(prompt)) => self.start_generation(id, &prompt).await,
            _ => Err(Error::Validation(format!(
                "item {id} has nothing to retry"
            ))),
        }
    }

    /// Write a task result back by id, dropping it if the item is gone
    async fn finish(&self, id: ItemId, patch: ItemPatch) {
        let status = patch.status;
        let derived_ref = patch.derived_ref.clone();
        let error = patch.error_message.clone();

        let applied = self.collection.lock().await.patch(id, patch);
        match applied {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(item_id = %id, "result for removed item discarded");
                self.emit_event(Event::StaleResultDiscarded { id });
                return;
            }
            Err(e) => {
                tracing::warn!(item_id = %id, error = %e, "task result rejected");
                return;
            }
        }

        if let Some(status) = status {
            self.emit_event(Event::ItemStatusChanged { id, status });
        }
        match (status, derived_ref, error) {
            (Some(ItemStatus::Ready), Some(derived_ref), _) => {
                tracing::info!(item_id = %id, derived_ref = %derived_ref, "item ready");
                self.emit_event(Event::ItemReady { id, derived_ref });
            }
            (Some(ItemStatus::Error), _, Some(error)) => {
                self.emit_event(Event::ItemFailed { id, error });
            }
            _ => {}
        }
    }
}

/// Whole percentage of `total` covered by `sent`; an empty file is complete
fn upload_percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    (sent.min(total) * 100 / total) as u8
}
