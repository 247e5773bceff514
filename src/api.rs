//! Typed API contracts
//!
//! [`ContentApi`] is the seam between the pipeline/publishing logic and the
//! network. [`HttpContentApi`] implements it over [`RequestClient`]; tests
//! substitute an in-memory implementation.

use crate::client::{ProgressFn, RequestClient};
use crate::error::Result;
use crate::pipeline::Submission;
use crate::types::{ContentItemId, JobId, MediaSource, PlatformSet, PublishJob, RenderStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of a presigned-upload request
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignRequest {
    /// File name as selected by the user
    pub file_name: String,
    /// MIME type of the file
    pub content_type: String,
    /// Size in bytes
    pub file_size: u64,
}

impl From<&MediaSource> for PresignRequest {
    fn from(source: &MediaSource) -> Self {
        Self {
            file_name: source.file_name.clone(),
            content_type: source.content_type.clone(),
            file_size: source.size_bytes,
        }
    }
}

/// Where to PUT the file and the storage key it will have
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUpload {
    /// Short-lived storage URL
    pub presigned_url: String,
    /// Storage key to reference in submissions
    pub file_key: String,
}

/// Result of an AI generation request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedAsset {
    /// Renderable URL of the generated image
    pub image_url: String,
    /// Storage key to reference in submissions
    pub file_key: String,
}

/// Result of scheduling a publish
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleResult {
    /// One job per platform
    #[serde(rename = "publishJobIds")]
    pub job_ids: Vec<JobId>,
    /// When the jobs are due, as confirmed by the server
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct Created {
    id: ContentItemId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishAccepted {
    publish_job_ids: Vec<JobId>,
}

#[derive(Serialize)]
struct PromptBody<'a> {
    prompt: &'a str,
}

#[derive(Serialize)]
struct PublishBody<'a> {
    platforms: &'a PlatformSet,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleBody<'a> {
    scheduled_at: DateTime<Utc>,
    platforms: &'a PlatformSet,
}

/// Requests the pipeline and the publishing components issue
#[async_trait]
pub trait ContentApi: Send + Sync {
    /// Ask for a presigned storage URL for one file
    async fn presign_upload(&self, request: &PresignRequest) -> Result<PresignedUpload>;

    /// Transfer the file bytes to a presigned URL
    async fn upload_file(
        &self,
        presigned_url: &str,
        source: &MediaSource,
        on_progress: ProgressFn,
    ) -> Result<()>;

    /// Generate an image from a text prompt
    async fn generate_image(&self, prompt: &str) -> Result<GeneratedAsset>;

    /// Create a content item from an assembled submission
    async fn create_content(&self, submission: &Submission) -> Result<ContentItemId>;

    /// Publish a content item now
    async fn publish(&self, content_id: &ContentItemId, platforms: &PlatformSet)
    -> Result<Vec<JobId>>;

    /// Schedule a content item for later publishing
    async fn schedule(
        &self,
        content_id: &ContentItemId,
        scheduled_at: DateTime<Utc>,
        platforms: &PlatformSet,
    ) -> Result<ScheduleResult>;

    /// Cancel a pending schedule
    async fn cancel_schedule(&self, content_id: &ContentItemId) -> Result<()>;

    /// Current publish jobs of a content item
    async fn publish_status(&self, content_id: &ContentItemId) -> Result<Vec<PublishJob>>;

    /// Current render status of a content item
    async fn render_status(&self, content_id: &ContentItemId) -> Result<RenderStatus>;
}

/// [`ContentApi`] over HTTP
#[derive(Clone, Debug)]
pub struct HttpContentApi {
    client: RequestClient,
}

impl HttpContentApi {
    /// Wrap a request client
    pub fn new(client: RequestClient) -> Self {
        Self { client }
    }

    /// Underlying request client
    pub fn client(&self) -> &RequestClient {
        &self.client
    }
}

fn content_path(id: &ContentItemId, suffix: &str) -> String {
    format!(
        "/api/content-items/{}{}",
        urlencoding::encode(id.as_str()),
        suffix
    )
}

#[async_trait]
impl ContentApi for HttpContentApi {
    async fn presign_upload(&self, request: &PresignRequest) -> Result<PresignedUpload> {
        self.client.post("/api/upload/presigned-url", request).await
    }

    async fn upload_file(
        &self,
        presigned_url: &str,
        source: &MediaSource,
        on_progress: ProgressFn,
    ) -> Result<()> {
        self.client
            .put_presigned(presigned_url, source, on_progress)
            .await
    }

    async fn generate_image(&self, prompt: &str) -> Result<GeneratedAsset> {
        self.client
            .post("/api/content-items/generate-image", &PromptBody { prompt })
            .await
    }

    async fn create_content(&self, submission: &Submission) -> Result<ContentItemId> {
        let created: Created = self.client.post("/api/content-items", submission).await?;
        Ok(created.id)
    }

    async fn publish(
        &self,
        content_id: &ContentItemId,
        platforms: &PlatformSet,
    ) -> Result<Vec<JobId>> {
        let accepted: PublishAccepted = self
            .client
            .post(&content_path(content_id, "/publish"), &PublishBody { platforms })
            .await?;
        Ok(accepted.publish_job_ids)
    }

    async fn schedule(
        &self,
        content_id: &ContentItemId,
        scheduled_at: DateTime<Utc>,
        platforms: &PlatformSet,
    ) -> Result<ScheduleResult> {
        self.client
            .post(
                &content_path(content_id, "/schedule"),
                &ScheduleBody {
                    scheduled_at,
                    platforms,
                },
            )
            .await
    }

    async fn cancel_schedule(&self, content_id: &ContentItemId) -> Result<()> {
        let _: serde::de::IgnoredAny = self
            .client
            .delete(&content_path(content_id, "/schedule"))
            .await?;
        Ok(())
    }

    async fn publish_status(&self, content_id: &ContentItemId) -> Result<Vec<PublishJob>> {
        self.client
            .get(&content_path(content_id, "/publish-status"))
            .await
    }

    async fn render_status(&self, content_id: &ContentItemId) -> Result<RenderStatus> {
        self.client.get(&content_path(content_id, "/status")).await
    }
}
