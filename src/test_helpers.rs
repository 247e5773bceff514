//! Shared test fixtures: an in-memory [`ContentApi`] with scriptable answers

use crate::api::{ContentApi, GeneratedAsset, PresignRequest, PresignedUpload, ScheduleResult};
use crate::client::ProgressFn;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::pipeline::Submission;
use crate::types::{
    ContentItemId, ContentStatus, JobId, JobStatus, MediaSource, Platform, PlatformSet,
    PublishJob, RenderStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

/// A recorded publish-side request
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Publish(ContentItemId, Vec<Platform>),
    Schedule(ContentItemId, DateTime<Utc>, Vec<Platform>),
    CancelSchedule(ContentItemId),
}

/// In-memory API double
///
/// Uploads and generations can be held at a gate until the test releases
/// them, which makes completion order deterministic.
#[derive(Default)]
pub struct FakeApi {
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    failing_uploads: Mutex<HashSet<String>>,
    transient_upload_failures: AtomicUsize,
    generation_errors: Mutex<VecDeque<Error>>,
    mutation_errors: Mutex<VecDeque<Error>>,
    status_script: Mutex<VecDeque<Result<Vec<PublishJob>>>>,
    last_status: Mutex<Vec<PublishJob>>,
    render_script: Mutex<VecDeque<Result<RenderStatus>>>,
    pub submissions: Mutex<Vec<Submission>>,
    pub calls: Mutex<Vec<Call>>,
    pub presign_count: AtomicUsize,
    pub upload_count: AtomicUsize,
    pub status_fetches: AtomicUsize,
    pub render_fetches: AtomicUsize,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Block the upload of `file_name` (or generation for `prompt`) until released
    pub async fn hold(&self, key: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().await.insert(key.to_string(), gate.clone());
        gate
    }

    async fn wait_gate(&self, key: &str) {
        let gate = self.gates.lock().await.get(key).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }

    pub async fn fail_upload(&self, file_name: &str) {
        self.failing_uploads
            .lock()
            .await
            .insert(file_name.to_string());
    }

    pub fn fail_uploads_transiently(&self, times: usize) {
        self.transient_upload_failures.store(times, Ordering::SeqCst);
    }

    pub async fn fail_next_generation(&self, error: Error) {
        self.generation_errors.lock().await.push_back(error);
    }

    pub async fn fail_next_mutation(&self, error: Error) {
        self.mutation_errors.lock().await.push_back(error);
    }

    /// Queue job snapshots; once exhausted the last one is served forever
    pub async fn script_status(&self, snapshots: Vec<Result<Vec<PublishJob>>>) {
        self.status_script.lock().await.extend(snapshots);
    }

    pub async fn script_render(&self, snapshots: Vec<Result<RenderStatus>>) {
        self.render_script.lock().await.extend(snapshots);
    }

    async fn take_mutation_error(&self) -> Result<()> {
        match self.mutation_errors.lock().await.pop_front() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ContentApi for FakeApi {
    async fn presign_upload(&self, request: &PresignRequest) -> Result<PresignedUpload> {
        self.presign_count.fetch_add(1, Ordering::SeqCst);
        Ok(PresignedUpload {
            presigned_url: format!("https://storage.test/{}", request.file_name),
            file_key: format!("uploads/{}", request.file_name),
        })
    }

    async fn upload_file(
        &self,
        _presigned_url: &str,
        source: &MediaSource,
        on_progress: ProgressFn,
    ) -> Result<()> {
        self.upload_count.fetch_add(1, Ordering::SeqCst);
        on_progress(source.size_bytes / 4);
        self.wait_gate(&source.file_name).await;

        let remaining = self.transient_upload_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_upload_failures
                .store(remaining - 1, Ordering::SeqCst);
            return Err(api_error(503, "UNAVAILABLE", "storage busy"));
        }
        if self.failing_uploads.lock().await.contains(&source.file_name) {
            return Err(api_error(400, "UPLOAD_REJECTED", ""));
        }
        on_progress(source.size_bytes / 2);
        on_progress(source.size_bytes);
        Ok(())
    }

    async fn generate_image(&self, prompt: &str) -> Result<GeneratedAsset> {
        self.wait_gate(prompt).await;
        if let Some(e) = self.generation_errors.lock().await.pop_front() {
            return Err(e);
        }
        let slug: String = prompt
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        Ok(GeneratedAsset {
            image_url: format!("https://cdn.test/{slug}.png"),
            file_key: format!("generated/{slug}.png"),
        })
    }

    async fn create_content(&self, submission: &Submission) -> Result<ContentItemId> {
        self.take_mutation_error().await?;
        let mut submissions = self.submissions.lock().await;
        submissions.push(submission.clone());
        Ok(ContentItemId::new(format!("content-{}", submissions.len())))
    }

    async fn publish(
        &self,
        content_id: &ContentItemId,
        platforms: &PlatformSet,
    ) -> Result<Vec<JobId>> {
        self.take_mutation_error().await?;
        let list: Vec<Platform> = platforms.iter().copied().collect();
        self.calls
            .lock()
            .await
            .push(Call::Publish(content_id.clone(), list.clone()));
        Ok(list
            .iter()
            .map(|p| JobId(format!("job-{}", p.as_str())))
            .collect())
    }

    async fn schedule(
        &self,
        content_id: &ContentItemId,
        scheduled_at: DateTime<Utc>,
        platforms: &PlatformSet,
    ) -> Result<ScheduleResult> {
        self.take_mutation_error().await?;
        let list: Vec<Platform> = platforms.iter().copied().collect();
        self.calls.lock().await.push(Call::Schedule(
            content_id.clone(),
            scheduled_at,
            list.clone(),
        ));
        Ok(ScheduleResult {
            job_ids: list
                .iter()
                .map(|p| JobId(format!("scheduled-{}", p.as_str())))
                .collect(),
            scheduled_at,
        })
    }

    async fn cancel_schedule(&self, content_id: &ContentItemId) -> Result<()> {
        self.take_mutation_error().await?;
        self.calls
            .lock()
            .await
            .push(Call::CancelSchedule(content_id.clone()));
        Ok(())
    }

    async fn publish_status(&self, _content_id: &ContentItemId) -> Result<Vec<PublishJob>> {
        self.status_fetches.fetch_add(1, Ordering::SeqCst);
        match self.status_script.lock().await.pop_front() {
            Some(Ok(jobs)) => {
                *self.last_status.lock().await = jobs.clone();
                Ok(jobs)
            }
            Some(Err(e)) => Err(e),
            None => Ok(self.last_status.lock().await.clone()),
        }
    }

    async fn render_status(&self, _content_id: &ContentItemId) -> Result<RenderStatus> {
        self.render_fetches.fetch_add(1, Ordering::SeqCst);
        match self.render_script.lock().await.pop_front() {
            Some(result) => result,
            None => Ok(RenderStatus {
                status: ContentStatus::Draft,
                generated_media_url: None,
            }),
        }
    }
}

pub fn api_error(status: u16, code: &str, message: &str) -> Error {
    Error::Api {
        status,
        code: code.into(),
        message: message.into(),
    }
}

pub fn job(platform: Platform, status: JobStatus) -> PublishJob {
    PublishJob {
        id: JobId(format!("job-{}", platform.as_str())),
        content_item_id: None,
        platform,
        status,
        published_url: (status == JobStatus::Published)
            .then(|| format!("https://{}.test/post", platform.as_str())),
        error_message: (status == JobStatus::Failed).then(|| "Token expired".to_string()),
        error_code: None,
        attempt_count: 1,
        created_at: Utc::now(),
        published_at: None,
        scheduled_at: None,
    }
}

/// Config with fast, deterministic retries
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.retry.max_attempts = 2;
    config.retry.initial_delay = Duration::from_millis(10);
    config.retry.max_delay = Duration::from_millis(20);
    config.retry.jitter = false;
    config.tools.search_path = false;
    config
}
