//! Canonical media record and the normalizer that produces it.
//!
//! Adapters hand over a loosely filled [`ProvisionalRecord`]; [`normalize`]
//! turns it into the stable [`ResolvedMedia`] shape every caller sees.

use serde::{Deserialize, Serialize};

use crate::error::{MediaError, Result};

/// Author identity attached to a post.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Author {
    pub uid: Option<String>,
    pub name: Option<String>,
    pub avatar: Option<String>,
}

impl Author {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.uid.is_none() && self.name.is_none() && self.avatar.is_none()
    }
}

/// Watermark-free media metadata for one post.
///
/// At least one of `video_url` or a non-empty `images` is always present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolvedMedia {
    pub title: String,
    pub video_url: Option<String>,
    pub music_url: Option<String>,
    pub cover_url: Option<String>,
    /// Gallery images in the author's display order.
    pub images: Vec<String>,
    pub author: Author,
}

impl ResolvedMedia {
    /// Gallery post: images without a video track.
    #[must_use]
    pub fn is_gallery(&self) -> bool {
        self.video_url.is_none() && !self.images.is_empty()
    }
}

/// Adapter output before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionalRecord {
    pub title: Option<String>,
    pub video_url: Option<String>,
    pub music_url: Option<String>,
    pub cover_url: Option<String>,
    pub images: Vec<String>,
    pub author_uid: Option<String>,
    pub author_name: Option<String>,
    pub author_avatar: Option<String>,
}

/// Map a provisional record into [`ResolvedMedia`].
///
/// Trims every text field, drops blank values, upgrades protocol-relative
/// URLs, swaps audio/video tracks a platform reported the wrong way round,
/// and keeps gallery order. Fails with `SchemaMismatch` when neither a video
/// nor any image survives.
pub fn normalize(record: ProvisionalRecord) -> Result<ResolvedMedia> {
    let mut video_url = clean_url(record.video_url);
    let mut music_url = clean_url(record.music_url);

    if video_url.as_deref().is_some_and(looks_like_audio)
        && !music_url.as_deref().is_some_and(looks_like_audio)
    {
        tracing::debug!("Swapping audio track reported as video");
        std::mem::swap(&mut video_url, &mut music_url);
    }

    let images: Vec<String> = record
        .images
        .into_iter()
        .filter_map(|image| clean_url(Some(image)))
        .collect();

    if video_url.is_none() && images.is_empty() {
        return Err(MediaError::SchemaMismatch(
            "post has neither a video nor gallery images".to_string(),
        ));
    }

    let cover_url = clean_url(record.cover_url).or_else(|| images.first().cloned());

    Ok(ResolvedMedia {
        title: clean(record.title).unwrap_or_default(),
        video_url,
        music_url,
        cover_url,
        images,
        author: Author {
            uid: clean(record.author_uid),
            name: clean(record.author_name),
            avatar: clean_url(record.author_avatar),
        },
    })
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn clean_url(value: Option<String>) -> Option<String> {
    clean(value).map(|url| match url.strip_prefix("//") {
        Some(rest) => format!("https://{rest}"),
        None => url,
    })
}

fn looks_like_audio(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
    [".mp3", ".m4a", ".aac", ".wav", ".ogg"]
        .iter()
        .any(|ext| path.ends_with(ext))
}
