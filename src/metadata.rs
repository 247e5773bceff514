//! Media metadata extraction
//!
//! Clips need a duration (shown per clip and summed for the collection) and a
//! thumbnail for preview. [`CliMetadataExtractor`] shells out to `ffprobe`
//! and `ffmpeg`; [`NoOpMetadataExtractor`] is used when neither is available
//! and reports no metadata, so uploads still complete.

use crate::config::ToolsConfig;
use crate::error::{Error, Result};
use crate::types::MediaSource;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::process::Command;

/// Metadata derived from a local media file
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MediaMetadata {
    /// Duration in seconds (videos only)
    pub duration_secs: Option<f64>,
    /// Generated thumbnail image (videos only)
    pub thumbnail: Option<PathBuf>,
}

/// Trait for extracting metadata from a selected file
#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    /// Extract metadata; images yield an empty [`MediaMetadata`]
    async fn extract(&self, source: &MediaSource) -> Result<MediaMetadata>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Pick an extractor from configuration
///
/// An explicit ffprobe path wins; otherwise PATH is searched when allowed,
/// falling back to [`NoOpMetadataExtractor`].
pub fn extractor_from_config(tools: &ToolsConfig) -> Arc<dyn MetadataExtractor> {
    let thumbnail_dir = tools
        .thumbnail_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("publista-thumbnails"));

    let extractor: Arc<dyn MetadataExtractor> = if let Some(ref ffprobe) = tools.ffprobe_path {
        Arc::new(CliMetadataExtractor::new(
            ffprobe.clone(),
            tools.ffmpeg_path.clone(),
            thumbnail_dir,
        ))
    } else if tools.search_path {
        CliMetadataExtractor::from_path(thumbnail_dir)
            .map(|e| Arc::new(e) as Arc<dyn MetadataExtractor>)
            .unwrap_or_else(|| Arc::new(NoOpMetadataExtractor))
    } else {
        Arc::new(NoOpMetadataExtractor)
    };

    tracing::info!(extractor = extractor.name(), "metadata extractor selected");
    extractor
}

/// Extractor backed by the `ffprobe` and `ffmpeg` binaries
#[derive(Clone, Debug)]
pub struct CliMetadataExtractor {
    ffprobe: PathBuf,
    ffmpeg: Option<PathBuf>,
    thumbnail_dir: PathBuf,
}

static THUMBNAIL_SEQ: AtomicU64 = AtomicU64::new(0);

impl CliMetadataExtractor {
    /// Create an extractor with explicit binary paths
    ///
    /// Without `ffmpeg`, durations are still extracted but no thumbnails.
    pub fn new(ffprobe: PathBuf, ffmpeg: Option<PathBuf>, thumbnail_dir: PathBuf) -> Self {
        Self {
            ffprobe,
            ffmpeg,
            thumbnail_dir,
        }
    }

    /// Find `ffprobe` (required) and `ffmpeg` (optional) in PATH
    pub fn from_path(thumbnail_dir: PathBuf) -> Option<Self> {
        let ffprobe = which::which("ffprobe").ok()?;
        let ffmpeg = which::which("ffmpeg").ok();
        Some(Self::new(ffprobe, ffmpeg, thumbnail_dir))
    }

    async fn read_duration(&self, path: &Path) -> Result<f64> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "error", "-show_entries", "format=duration"])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(path)
            .output()
            .await
            .map_err(|e| Error::ExternalTool(format!("failed to execute ffprobe: {e}")))?;

        if !output.status.success() {
            return Err(Error::Metadata(format!(
                "ffprobe exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        parse_duration(&String::from_utf8_lossy(&output.stdout))
    }

    async fn render_thumbnail(&self, ffmpeg: &Path, source: &MediaSource, at: f64) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.thumbnail_dir).await?;
        let stem = source
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("clip");
        let seq = THUMBNAIL_SEQ.fetch_add(1, Ordering::Relaxed);
        let target = self.thumbnail_dir.join(format!("{stem}-{seq}.jpg"));

        let output = Command::new(ffmpeg)
            .args(["-y", "-v", "error", "-ss"])
            .arg(format!("{at:.3}"))
            .arg("-i")
            .arg(&source.path)
            .args(["-frames:v", "1", "-vf", "scale=320:-2"])
            .arg(&target)
            .output()
            .await
            .map_err(|e| Error::ExternalTool(format!("failed to execute ffmpeg: {e}")))?;

        if !output.status.success() {
            return Err(Error::ExternalTool(format!(
                "ffmpeg exited with {}",
                output.status
            )));
        }
        Ok(target)
    }
}

#[async_trait]
impl MetadataExtractor for CliMetadataExtractor {
    async fn extract(&self, source: &MediaSource) -> Result<MediaMetadata> {
        if !source.is_video() {
            return Ok(MediaMetadata::default());
        }

        let duration = self.read_duration(&source.path).await?;

        // Thumbnails are cosmetic; a failure leaves the preview empty.
        let thumbnail = match &self.ffmpeg {
            Some(ffmpeg) => match self
                .render_thumbnail(ffmpeg, source, thumbnail_offset(duration))
                .await
            {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::warn!(file = %source.file_name, error = %e, "thumbnail extraction failed");
                    None
                }
            },
            None => None,
        };

        Ok(MediaMetadata {
            duration_secs: Some(duration),
            thumbnail,
        })
    }

    fn name(&self) -> &'static str {
        "cli-ffprobe"
    }
}

/// Extractor used when no media tools are available
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpMetadataExtractor;

#[async_trait]
impl MetadataExtractor for NoOpMetadataExtractor {
    async fn extract(&self, _source: &MediaSource) -> Result<MediaMetadata> {
        Ok(MediaMetadata::default())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// Parse ffprobe's bare `format=duration` output
pub(crate) fn parse_duration(stdout: &str) -> Result<f64> {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty());
    let value = line
        .and_then(|l| l.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0);
    value.ok_or_else(|| Error::Metadata(format!("unexpected ffprobe output: {:?}", stdout.trim())))
}

/// Grab the frame at one second, or halfway through very short clips
fn thumbnail_offset(duration: f64) -> f64 {
    if duration > 2.0 { 1.0 } else { duration / 2.0 }
}

/// Format seconds as `m:ss`, flooring fractional seconds
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

/// Summary line for the combined length of all clips
pub fn format_total_duration(seconds: f64) -> String {
    format!("Total: {} of raw footage", format_duration(seconds))
}
