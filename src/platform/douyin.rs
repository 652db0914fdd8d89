//! Douyin share-page extraction.
//!
//! The mobile share page (`iesdouyin.com/share/video/<id>/`) ships the full
//! post as `window._ROUTER_DATA`. Playback URLs there point at the
//! watermarked `playwm` endpoint; swapping it for `play` yields the clean
//! stream. Gallery ("slides") posts carry `images` instead of a video.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use super::{capture_first, expect_html, script_json, text_at, Platform, PlatformAdapter, RawMetadata};
use crate::error::{MediaError, Result};
use crate::fingerprint::ios_safari_identity;
use crate::http_client::{CallContext, MediaClient};
use crate::media::ProvisionalRecord;

const SHARE_BASE: &str = "https://www.iesdouyin.com";
const ROUTER_MARKER: &str = "window._ROUTER_DATA";

static ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"/(?:share/)?(?:video|note|slides)/(\d+)").expect("douyin path pattern"),
        Regex::new(r"[?&](?:modal_id|vid|item_id)=(\d+)").expect("douyin query pattern"),
    ]
});

/// Douyin adapter.
pub struct DouyinAdapter {
    base: String,
}

impl Default for DouyinAdapter {
    fn default() -> Self {
        Self::with_base(SHARE_BASE)
    }
}

impl DouyinAdapter {
    /// Point the adapter at another share host (used by tests).
    #[must_use]
    pub fn with_base(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PlatformAdapter for DouyinAdapter {
    fn platform(&self) -> Platform {
        Platform::Douyin
    }

    fn extract_id(&self, canonical_url: &str) -> Result<String> {
        capture_first(&ID_PATTERNS, canonical_url).ok_or_else(|| {
            MediaError::MalformedUrl(format!("no douyin item id in {canonical_url}"))
        })
    }

    async fn fetch(&self, id: &str, client: &MediaClient, ctx: &CallContext) -> Result<RawMetadata> {
        let url = format!("{}/share/video/{id}/", self.base);
        tracing::debug!("Fetching douyin share page: {}", url);

        let identity = ios_safari_identity().with_referer("https://www.douyin.com/");
        let html = client
            .get_text(Platform::Douyin, &url, &identity, ctx)
            .await?;
        Ok(RawMetadata::Html(html))
    }

    fn parse(&self, id: &str, raw: RawMetadata) -> Result<ProvisionalRecord> {
        let html = expect_html(Platform::Douyin, raw)?;
        let state = script_json(Platform::Douyin, &html, ROUTER_MARKER)?;
        let item = find_item(&state, id)?;
        Ok(item_record(item))
    }
}

/// Locate `item_list[0]` under whichever loader route carries `videoInfoRes`.
fn find_item<'a>(state: &'a Value, id: &str) -> Result<&'a Value> {
    let info = state
        .get("loaderData")
        .and_then(Value::as_object)
        .and_then(|routes| routes.values().find_map(|route| route.get("videoInfoRes")))
        .ok_or_else(|| MediaError::missing("douyin", "loaderData.*.videoInfoRes"))?;

    if let Some(item) = info.pointer("/item_list/0") {
        return Ok(item);
    }

    // Deleted or private posts come back as an empty list plus a filter entry
    if let Some(reason) = text_at(info, "/filter_list/0/filter_reason") {
        return Err(MediaError::Upstream(format!("douyin item {id} unavailable: {reason}")));
    }
    Err(MediaError::missing("douyin", "videoInfoRes.item_list[0]"))
}

fn item_record(item: &Value) -> ProvisionalRecord {
    let images: Vec<String> = item
        .get("images")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|image| text_at(image, "/url_list/0"))
                .collect()
        })
        .unwrap_or_default();

    // Gallery posts still carry a placeholder play address; ignore it
    let video_url = if images.is_empty() {
        text_at(item, "/video/play_addr/url_list/0").map(|url| url.replace("playwm", "play"))
    } else {
        None
    };

    let music_url = text_at(item, "/music/play_url/uri")
        .filter(|uri| uri.starts_with("http"))
        .or_else(|| text_at(item, "/music/play_url/url_list/0"));

    ProvisionalRecord {
        title: text_at(item, "/desc"),
        video_url,
        music_url,
        cover_url: text_at(item, "/video/cover/url_list/0"),
        images,
        author_uid: text_at(item, "/author/sec_uid").or_else(|| text_at(item, "/author/uid")),
        author_name: text_at(item, "/author/nickname"),
        author_avatar: text_at(item, "/author/avatar_thumb/url_list/0"),
    }
}
