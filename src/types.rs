//! Core types for publista-client

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Identifier of a pipeline item, unique within its collection
///
/// Minted from a per-collection counter, so an id is never handed out twice,
/// not even after the item it named has been removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl ItemId {
    /// Create a new ItemId
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-assigned identifier of a content item
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentItemId(pub String);

impl ContentItemId {
    /// Create a new ContentItemId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-assigned identifier of a publish job
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a pipeline item gets its media
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemOrigin {
    /// A local file the user selected
    #[default]
    Upload,
    /// An asset produced by AI generation from a prompt
    Generated,
}

/// Acquisition status of a pipeline item
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Slot exists, nothing acquired yet
    #[default]
    Empty,
    /// File transfer in flight
    Uploading,
    /// Generation request in flight
    Generating,
    /// Upload plus metadata extraction in flight
    Processing,
    /// Acquired; eligible for submission
    Ready,
    /// Acquisition failed; see the item's error message
    Error,
}

impl ItemStatus {
    /// Whether an acquisition task currently owns the item
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ItemStatus::Uploading | ItemStatus::Generating | ItemStatus::Processing
        )
    }

    /// Whether moving from `self` to `next` is a legal status change
    ///
    /// Staying in the same status is always allowed.
    pub fn can_transition_to(&self, next: ItemStatus) -> bool {
        if *self == next {
            return true;
        }
        match self {
            ItemStatus::Empty | ItemStatus::Error => next.is_active(),
            ItemStatus::Uploading | ItemStatus::Generating | ItemStatus::Processing => {
                matches!(next, ItemStatus::Ready | ItemStatus::Error)
            }
            ItemStatus::Ready => false,
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ItemStatus::Empty => "empty",
            ItemStatus::Uploading => "uploading",
            ItemStatus::Generating => "generating",
            ItemStatus::Processing => "processing",
            ItemStatus::Ready => "ready",
            ItemStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Video MIME types accepted for clips
pub const ALLOWED_VIDEO_TYPES: &[&str] = &["video/mp4", "video/quicktime", "video/webm"];

/// Image MIME types accepted for slides
pub const ALLOWED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp"];

/// The two kinds of item collections and their bounds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    /// Carousel slides (images), 2..=20 items
    Slides,
    /// Montage clips (videos), 1..=10 items
    Clips,
}

impl CollectionKind {
    /// Minimum number of items (and of ready items for submission)
    pub fn min(&self) -> usize {
        match self {
            CollectionKind::Slides => 2,
            CollectionKind::Clips => 1,
        }
    }

    /// Maximum number of items
    pub fn max(&self) -> usize {
        match self {
            CollectionKind::Slides => 20,
            CollectionKind::Clips => 10,
        }
    }

    /// MIME types an uploaded file may have for this kind
    pub fn allowed_types(&self) -> &'static [&'static str] {
        match self {
            CollectionKind::Slides => ALLOWED_IMAGE_TYPES,
            CollectionKind::Clips => ALLOWED_VIDEO_TYPES,
        }
    }

    /// Status an item enters while its upload runs
    ///
    /// Clips also extract duration and thumbnail, which the UI shows as
    /// processing rather than a bare transfer.
    pub fn upload_status(&self) -> ItemStatus {
        match self {
            CollectionKind::Slides => ItemStatus::Uploading,
            CollectionKind::Clips => ItemStatus::Processing,
        }
    }

    /// Content type a submission of this collection creates
    pub fn content_type(&self) -> ContentType {
        match self {
            CollectionKind::Slides => ContentType::Carousel,
            CollectionKind::Clips => ContentType::Reel,
        }
    }
}

/// A local file selected for upload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSource {
    /// Location on disk
    pub path: PathBuf,
    /// File name sent to the server
    pub file_name: String,
    /// MIME type, guessed from the extension when not supplied
    pub content_type: String,
    /// Size in bytes
    pub size_bytes: u64,
}

impl MediaSource {
    /// Describe a file on disk, reading its size and guessing its MIME type
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(Error::Validation(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Validation(format!("invalid file name: {}", path.display())))?
            .to_string();
        let content_type = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string();

        Ok(Self {
            path: path.to_path_buf(),
            file_name,
            content_type,
            size_bytes: metadata.len(),
        })
    }

    /// Whether the source is a video file
    pub fn is_video(&self) -> bool {
        self.content_type.starts_with("video/")
    }
}

/// One media unit awaiting (or done with) acquisition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineItem {
    /// Stable identity
    pub id: ItemId,
    /// Upload or generation
    pub origin: ItemOrigin,
    /// Selected file, absent for pure-generation items
    pub source: Option<MediaSource>,
    /// Server storage key, empty until acquisition succeeds
    pub derived_ref: String,
    /// Locally renderable preview (thumbnail path or asset URL)
    pub preview_ref: Option<String>,
    /// Clip duration in seconds, when extracted
    pub duration_secs: Option<f64>,
    /// Generation prompt, kept so a failed generation can be retried
    pub prompt: Option<String>,
    /// Acquisition status
    pub status: ItemStatus,
    /// Present only when `status` is `Error`
    pub error_message: Option<String>,
}

impl PipelineItem {
    /// A fresh slot in `Empty` status
    pub fn empty(id: ItemId) -> Self {
        Self {
            id,
            origin: ItemOrigin::Upload,
            source: None,
            derived_ref: String::new(),
            preview_ref: None,
            duration_secs: None,
            prompt: None,
            status: ItemStatus::Empty,
            error_message: None,
        }
    }

    /// Ready with a server reference, i.e. usable in a submission
    pub fn is_submittable(&self) -> bool {
        self.status == ItemStatus::Ready && !self.derived_ref.is_empty()
    }
}

/// Partial update merged into a pipeline item by id
///
/// Unset fields leave the item untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ItemPatch {
    /// New origin
    pub origin: Option<ItemOrigin>,
    /// New source file
    pub source: Option<MediaSource>,
    /// New server reference
    pub derived_ref: Option<String>,
    /// New preview
    pub preview_ref: Option<String>,
    /// New duration
    pub duration_secs: Option<f64>,
    /// New prompt
    pub prompt: Option<String>,
    /// New status
    pub status: Option<ItemStatus>,
    /// New error message (only kept when the resulting status is `Error`)
    pub error_message: Option<String>,
}

impl ItemPatch {
    /// Patch that only changes the status
    pub fn status(status: ItemStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Patch moving the item to `Error` with a message
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(ItemStatus::Error),
            error_message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Publishing target
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Instagram
    Instagram,
    /// YouTube
    Youtube,
    /// TikTok
    Tiktok,
    /// Facebook
    Facebook,
    /// LinkedIn
    Linkedin,
    /// X (formerly Twitter)
    X,
}

impl Platform {
    /// Wire name of the platform
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::Youtube => "youtube",
            Platform::Tiktok => "tiktok",
            Platform::Facebook => "facebook",
            Platform::Linkedin => "linkedin",
            Platform::X => "x",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "instagram" => Ok(Platform::Instagram),
            "youtube" => Ok(Platform::Youtube),
            "tiktok" => Ok(Platform::Tiktok),
            "facebook" => Ok(Platform::Facebook),
            "linkedin" => Ok(Platform::Linkedin),
            "x" => Ok(Platform::X),
            other => Err(Error::Validation(format!("unknown platform: {other}"))),
        }
    }
}

/// Platforms the user has connected accounts for
pub type ConnectedPlatforms = BTreeSet<Platform>;

/// Non-empty set of target platforms
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PlatformSet(BTreeSet<Platform>);

impl PlatformSet {
    /// Build a set, rejecting an empty selection
    pub fn new(platforms: impl IntoIterator<Item = Platform>) -> Result<Self> {
        let set: BTreeSet<Platform> = platforms.into_iter().collect();
        if set.is_empty() {
            return Err(Error::NoPlatforms);
        }
        Ok(Self(set))
    }

    /// Number of platforms (at least one)
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with collections
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in stable order
    pub fn iter(&self) -> impl Iterator<Item = &Platform> {
        self.0.iter()
    }

    /// First platform not present in `connected`, if any
    pub fn first_unconnected(&self, connected: &ConnectedPlatforms) -> Option<Platform> {
        self.0.iter().copied().find(|p| !connected.contains(p))
    }

    /// Wire names in stable order
    pub fn to_wire(&self) -> Vec<String> {
        self.0.iter().map(|p| p.as_str().to_string()).collect()
    }

    /// Short human summary: the platform name for one, a count otherwise
    pub fn summary(&self) -> String {
        match self.0.iter().next() {
            Some(only) if self.0.len() == 1 => only.to_string(),
            _ => format!("{} platforms", self.0.len()),
        }
    }
}

/// Status of a server-side publish job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created, waiting for a worker or for its scheduled time
    Pending,
    /// Upload to the platform in progress
    Publishing,
    /// Live on the platform
    Published,
    /// Gave up; see the job's error message
    Failed,
    /// Failed once, another attempt is queued
    Retrying,
}

impl JobStatus {
    /// Whether the job still has pending work
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            JobStatus::Pending | JobStatus::Publishing | JobStatus::Retrying
        )
    }
}

/// One content item published to one platform, as tracked by the server
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishJob {
    /// Job id
    pub id: JobId,
    /// Owning content item (not always echoed by the status endpoint)
    #[serde(default)]
    pub content_item_id: Option<ContentItemId>,
    /// Target platform
    pub platform: Platform,
    /// Current status
    pub status: JobStatus,
    /// Public URL, only when published
    #[serde(default)]
    pub published_url: Option<String>,
    /// Failure reason, only when failed
    #[serde(default)]
    pub error_message: Option<String>,
    /// Machine-readable failure code
    #[serde(default)]
    pub error_code: Option<String>,
    /// Attempts made so far
    #[serde(default)]
    pub attempt_count: u32,
    /// When the job was created
    pub created_at: DateTime<Utc>,
    /// When the job went live
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    /// When a scheduled job is due
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl PublishJob {
    /// Whether the job still has pending work
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// True iff no job in the set is active
pub fn jobs_settled(jobs: &[PublishJob]) -> bool {
    !jobs.iter().any(PublishJob::is_active)
}

/// Kind of content item created from a submission
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// Auto-montage video built from clips
    Reel,
    /// Multi-image slide post
    Carousel,
    /// Single image post
    Post,
}

/// Montage editing style
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MontageStyle {
    /// Fast cuts (default)
    #[default]
    Dynamic,
    /// Slow, wide shots
    Cinematic,
    /// User-generated-content look
    Ugc,
    /// Step-by-step pacing
    Tutorial,
    /// Beat-synced energy
    Hype,
}

/// Output aspect ratio
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MontageFormat {
    /// Vertical 9:16 (default)
    #[default]
    #[serde(rename = "9:16")]
    Vertical,
    /// Horizontal 16:9
    #[serde(rename = "16:9")]
    Horizontal,
    /// Square 1:1
    #[serde(rename = "1:1")]
    Square,
}

/// Background music selection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MusicOption {
    /// Let the server pick a track matching the montage
    #[default]
    #[serde(rename = "auto-match")]
    AutoMatch,
}

/// Target montage lengths in seconds
pub const MONTAGE_DURATIONS: &[u32] = &[15, 30, 60];

/// Collection-level settings sent along with the ordered media references
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectionSettings {
    /// Content type to create
    pub content_type: ContentType,
    /// Montage style
    pub style: Option<MontageStyle>,
    /// Aspect ratio
    pub format: Option<MontageFormat>,
    /// Target duration in seconds (15, 30 or 60)
    pub duration: Option<u32>,
    /// Music selection
    pub music: Option<MusicOption>,
}

impl CollectionSettings {
    /// Defaults for a collection kind: montage settings for clips, none for slides
    pub fn for_kind(kind: CollectionKind) -> Self {
        match kind {
            CollectionKind::Clips => Self {
                content_type: ContentType::Reel,
                style: Some(MontageStyle::default()),
                format: Some(MontageFormat::default()),
                duration: Some(30),
                music: Some(MusicOption::default()),
            },
            CollectionKind::Slides => Self {
                content_type: ContentType::Carousel,
                style: None,
                format: None,
                duration: None,
                music: None,
            },
        }
    }
}

/// Render status of a created content item
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    /// Not yet rendered or published
    Draft,
    /// Server is rendering the media
    Generating,
    /// Waiting for a scheduled publish
    Scheduled,
    /// Published on at least one platform
    Published,
    /// Rendering or publishing failed
    Failed,
    /// A failed publish is being retried
    Retrying,
}

impl ContentStatus {
    /// Whether render polling should continue; only `draft` and `failed` end it
    pub fn is_active(&self) -> bool {
        !matches!(self, ContentStatus::Draft | ContentStatus::Failed)
    }
}

/// Snapshot returned by the render-status endpoint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderStatus {
    /// Current status
    pub status: ContentStatus,
    /// Rendered media, once available
    #[serde(default)]
    pub generated_media_url: Option<String>,
}

/// Severity of a user-facing notification
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    /// Action accepted
    Success,
    /// Action failed
    Error,
}

/// Event emitted by the pipeline and the publishing components
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Item appended (or inserted as a duplicate)
    ItemAdded {
        /// Item id
        id: ItemId,
    },

    /// Item removed from the collection
    ItemRemoved {
        /// Item id
        id: ItemId,
    },

    /// Item moved to a new position
    ItemReordered {
        /// Item id
        id: ItemId,
        /// New zero-based position
        position: usize,
    },

    /// Item changed status
    ItemStatusChanged {
        /// Item id
        id: ItemId,
        /// New status
        status: ItemStatus,
    },

    /// Item finished acquisition
    ItemReady {
        /// Item id
        id: ItemId,
        /// Server storage key
        derived_ref: String,
    },

    /// Upload transfer advanced to a new whole percentage
    ItemProgress {
        /// Item id
        id: ItemId,
        /// 0 to 100
        percent: u8,
    },

    /// Item acquisition failed
    ItemFailed {
        /// Item id
        id: ItemId,
        /// User-facing message
        error: String,
    },

    /// A task finished for an item that is no longer in the collection
    StaleResultDiscarded {
        /// Item id
        id: ItemId,
    },

    /// Submission accepted by the server
    ContentCreated {
        /// New content item
        id: ContentItemId,
    },

    /// Job set of a content item changed server-side; cached views are stale
    JobsInvalidated {
        /// Content item
        content_item_id: ContentItemId,
    },

    /// A poll fetched a fresh snapshot
    JobsUpdated {
        /// Content item
        content_item_id: ContentItemId,
        /// Jobs still active
        active: usize,
        /// Jobs that failed
        failed: usize,
    },

    /// A poller reached a state with no pending work
    PollingSettled {
        /// Content item
        content_item_id: ContentItemId,
    },

    /// A status fetch failed after retries
    PollFailed {
        /// Content item
        content_item_id: ContentItemId,
        /// Error message
        error: String,
    },

    /// User-facing status message
    Notification {
        /// Severity
        level: NotificationLevel,
        /// Message text
        message: String,
    },
}
