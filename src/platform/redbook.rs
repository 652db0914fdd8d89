//! Xiaohongshu (Redbook) note extraction.
//!
//! Note pages embed `window.__INITIAL_STATE__`; the note lives under
//! `note.noteDetailMap[<id>].note`. Video notes carry an h264/h265 stream
//! list, image notes carry `imageList`.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use super::{capture_first, expect_html, script_json, text_at, Platform, PlatformAdapter, RawMetadata};
use crate::error::{MediaError, Result};
use crate::fingerprint::ios_safari_identity;
use crate::http_client::{CallContext, MediaClient};
use crate::media::ProvisionalRecord;

const WEB_BASE: &str = "https://www.xiaohongshu.com";
const STATE_MARKER: &str = "window.__INITIAL_STATE__";

static ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![Regex::new(r"/(?:explore|discovery/item)/([0-9a-fA-F]{24})").expect("redbook note pattern")]
});

/// Xiaohongshu adapter.
pub struct RedbookAdapter {
    base: String,
}

impl Default for RedbookAdapter {
    fn default() -> Self {
        Self::with_base(WEB_BASE)
    }
}

impl RedbookAdapter {
    #[must_use]
    pub fn with_base(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PlatformAdapter for RedbookAdapter {
    fn platform(&self) -> Platform {
        Platform::Redbook
    }

    fn extract_id(&self, canonical_url: &str) -> Result<String> {
        capture_first(&ID_PATTERNS, canonical_url).ok_or_else(|| {
            MediaError::MalformedUrl(format!("no xiaohongshu note id in {canonical_url}"))
        })
    }

    async fn fetch(&self, id: &str, client: &MediaClient, ctx: &CallContext) -> Result<RawMetadata> {
        let url = format!("{}/discovery/item/{id}", self.base);
        tracing::debug!("Fetching xiaohongshu note: {}", url);

        let identity = ios_safari_identity().with_referer("https://www.xiaohongshu.com/");
        let html = client
            .get_text(Platform::Redbook, &url, &identity, ctx)
            .await?;
        Ok(RawMetadata::Html(html))
    }

    fn parse(&self, id: &str, raw: RawMetadata) -> Result<ProvisionalRecord> {
        let html = expect_html(Platform::Redbook, raw)?;
        let state = script_json(Platform::Redbook, &html, STATE_MARKER)?;

        let details = state
            .pointer("/note/noteDetailMap")
            .and_then(Value::as_object)
            .ok_or_else(|| MediaError::missing("redbook", "note.noteDetailMap"))?;

        let note = details
            .get(id)
            .or_else(|| details.values().next())
            .and_then(|detail| detail.get("note"))
            .filter(|note| note.is_object())
            .ok_or_else(|| MediaError::missing("redbook", "noteDetailMap.*.note"))?;

        Ok(note_record(note))
    }
}

fn note_record(note: &Value) -> ProvisionalRecord {
    let image_urls: Vec<String> = note
        .get("imageList")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|image| {
                    text_at(image, "/urlDefault").or_else(|| text_at(image, "/url"))
                })
                .collect()
        })
        .unwrap_or_default();

    let is_video = note.get("type").and_then(Value::as_str) == Some("video");

    let (video_url, images, cover_url) = if is_video {
        let stream = text_at(note, "/video/media/stream/h264/0/masterUrl")
            .or_else(|| text_at(note, "/video/media/stream/h265/0/masterUrl"));
        (stream, Vec::new(), image_urls.into_iter().next())
    } else {
        (None, image_urls, None)
    };

    ProvisionalRecord {
        title: text_at(note, "/title").or_else(|| text_at(note, "/desc")),
        video_url,
        music_url: None,
        cover_url,
        images,
        author_uid: text_at(note, "/user/userId"),
        author_name: text_at(note, "/user/nickname"),
        author_avatar: text_at(note, "/user/avatar"),
    }
}
