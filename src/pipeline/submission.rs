//! Submission assembly

use crate::collection::ItemCollection;
use crate::error::{Error, Result};
use crate::types::{
    CollectionSettings, ContentType, MONTAGE_DURATIONS, MontageFormat, MontageStyle, MusicOption,
};
use serde::Serialize;

/// Create-content request built from a collection
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    /// Content type to create
    #[serde(rename = "type")]
    pub content_type: ContentType,
    /// Storage keys of ready items, in collection order
    #[serde(rename = "mediaUrls")]
    pub media_refs: Vec<String>,
    /// Montage style
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<MontageStyle>,
    /// Aspect ratio
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<MontageFormat>,
    /// Target duration in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    /// Music selection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub music: Option<MusicOption>,
}

impl Submission {
    /// Combine settings with an ordered list of storage keys
    pub fn new(settings: &CollectionSettings, media_refs: Vec<String>) -> Self {
        Self {
            content_type: settings.content_type,
            media_refs,
            style: settings.style,
            format: settings.format,
            duration: settings.duration,
            music: settings.music,
        }
    }
}

/// Build a submission from the ready items of a collection
///
/// Items that are not ready (or have no storage key) are skipped; the rest
/// keep their collection order. Fails when fewer than the kind's minimum are
/// ready, or when the montage duration is not one of 15, 30 or 60 seconds.
pub fn assemble(collection: &ItemCollection, settings: &CollectionSettings) -> Result<Submission> {
    let media_refs: Vec<String> = collection
        .items()
        .iter()
        .filter(|item| item.is_submittable())
        .map(|item| item.derived_ref.clone())
        .collect();

    let required = collection.kind().min();
    if media_refs.len() < required {
        return Err(Error::NotEnoughReadyItems {
            ready: media_refs.len(),
            required,
        });
    }

    if let Some(duration) = settings.duration
        && !MONTAGE_DURATIONS.contains(&duration)
    {
        return Err(Error::Validation(format!(
            "duration must be 15, 30 or 60 seconds, got {duration}"
        )));
    }

    Ok(Submission::new(settings, media_refs))
}
