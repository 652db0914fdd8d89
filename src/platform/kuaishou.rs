//! Kuaishou share-page extraction.
//!
//! The mobile share page embeds `window.INIT_STATE`, a map of opaque keys
//! to request results. The entry holding `photo` is the post. When the
//! platform suspects a bot it answers with a captcha config instead.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use super::{capture_first, expect_html, script_json, text_at, Platform, PlatformAdapter, RawMetadata};
use crate::error::{MediaError, Result};
use crate::fingerprint::ios_safari_identity;
use crate::http_client::{CallContext, MediaClient};
use crate::media::ProvisionalRecord;

const SHARE_BASE: &str = "https://v.m.chenzhongtech.com";
const STATE_MARKER: &str = "window.INIT_STATE";

static ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"/(?:short-video|fw/photo|photo|fw/long-video)/([A-Za-z0-9_-]+)")
            .expect("kuaishou path pattern"),
        Regex::new(r"[?&]photoId=([A-Za-z0-9_-]+)").expect("kuaishou query pattern"),
    ]
});

/// Kuaishou adapter.
pub struct KuaishouAdapter {
    base: String,
}

impl Default for KuaishouAdapter {
    fn default() -> Self {
        Self::with_base(SHARE_BASE)
    }
}

impl KuaishouAdapter {
    #[must_use]
    pub fn with_base(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PlatformAdapter for KuaishouAdapter {
    fn platform(&self) -> Platform {
        Platform::Kuaishou
    }

    fn extract_id(&self, canonical_url: &str) -> Result<String> {
        capture_first(&ID_PATTERNS, canonical_url).ok_or_else(|| {
            MediaError::MalformedUrl(format!("no kuaishou photo id in {canonical_url}"))
        })
    }

    async fn fetch(&self, id: &str, client: &MediaClient, ctx: &CallContext) -> Result<RawMetadata> {
        let url = format!("{}/fw/photo/{id}", self.base);
        tracing::debug!("Fetching kuaishou share page: {}", url);

        let identity = ios_safari_identity().with_referer("https://v.kuaishou.com/");
        let html = client
            .get_text(Platform::Kuaishou, &url, &identity, ctx)
            .await?;
        Ok(RawMetadata::Html(html))
    }

    fn parse(&self, _id: &str, raw: RawMetadata) -> Result<ProvisionalRecord> {
        let html = expect_html(Platform::Kuaishou, raw)?;
        let state = script_json(Platform::Kuaishou, &html, STATE_MARKER)?;

        let entries = state
            .as_object()
            .ok_or_else(|| MediaError::missing("kuaishou", STATE_MARKER))?;

        if entries.values().any(is_captcha) {
            return Err(MediaError::RateLimited(Platform::Kuaishou.to_string()));
        }

        let entry = entries
            .values()
            .find(|entry| entry.get("photo").is_some_and(Value::is_object))
            .ok_or_else(|| MediaError::missing("kuaishou", "INIT_STATE.*.photo"))?;

        Ok(photo_record(entry))
    }
}

fn is_captcha(entry: &Value) -> bool {
    entry.get("captchaConfig").is_some() || text_at(entry, "/captchaUrl").is_some()
}

fn photo_record(entry: &Value) -> ProvisionalRecord {
    let photo = &entry["photo"];

    ProvisionalRecord {
        title: text_at(photo, "/caption"),
        video_url: text_at(photo, "/mainMvUrls/0/url"),
        music_url: text_at(photo, "/soundTrack/audioUrls/0/url")
            .or_else(|| text_at(photo, "/music/audioUrls/0/url")),
        cover_url: text_at(photo, "/coverUrls/0/url"),
        images: atlas_images(entry).unwrap_or_default(),
        author_uid: text_at(photo, "/userEid").or_else(|| text_at(photo, "/userId")),
        author_name: text_at(photo, "/userName"),
        author_avatar: text_at(photo, "/headUrl"),
    }
}

/// Atlas (gallery) posts list image paths relative to a CDN host.
fn atlas_images(entry: &Value) -> Option<Vec<String>> {
    let atlas = entry
        .pointer("/atlas")
        .or_else(|| entry.pointer("/photo/ext_params/atlas"))?;
    let cdn = text_at(atlas, "/cdn/0")?;
    let list = atlas.get("list")?.as_array()?;

    Some(
        list.iter()
            .filter_map(Value::as_str)
            .map(|path| format!("https://{cdn}{path}"))
            .collect(),
    )
}
