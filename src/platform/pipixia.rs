//! Pipixia extraction through the app's cell-comment API.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use super::{capture_first, expect_json, text_at, Platform, PlatformAdapter, RawMetadata};
use crate::error::{MediaError, Result};
use crate::fingerprint::ios_safari_identity;
use crate::http_client::{CallContext, MediaClient};
use crate::media::ProvisionalRecord;

const API_BASE: &str = "https://api.pipix.com";

static ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"/item/(\d+)").expect("pipixia item pattern"),
        Regex::new(r"[?&](?:item_id|cell_id)=(\d+)").expect("pipixia query pattern"),
    ]
});

/// Pipixia adapter.
pub struct PipixiaAdapter {
    api_base: String,
}

impl Default for PipixiaAdapter {
    fn default() -> Self {
        Self::with_api_base(API_BASE)
    }
}

impl PipixiaAdapter {
    #[must_use]
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn api_url(&self, id: &str) -> String {
        format!(
            "{}/bds/cell/cell_comment/?offset=0&cell_type=1&api_version=1&cell_id={id}&ac=wifi&channel=huawei_1319_64&aid=1319&app_name=super",
            self.api_base
        )
    }
}

#[async_trait]
impl PlatformAdapter for PipixiaAdapter {
    fn platform(&self) -> Platform {
        Platform::Pipixia
    }

    fn extract_id(&self, canonical_url: &str) -> Result<String> {
        capture_first(&ID_PATTERNS, canonical_url).ok_or_else(|| {
            MediaError::MalformedUrl(format!("no pipixia item id in {canonical_url}"))
        })
    }

    async fn fetch(&self, id: &str, client: &MediaClient, ctx: &CallContext) -> Result<RawMetadata> {
        let url = self.api_url(id);
        tracing::debug!("Fetching pipixia cell: {}", url);

        let identity = ios_safari_identity()
            .accepting_json()
            .with_referer("https://h5.pipix.com/");
        let body = client
            .get_json(Platform::Pipixia, &url, &identity, ctx)
            .await?;

        // status_code is the API's own verdict; HTTP is 200 either way
        match body.get("status_code").and_then(Value::as_i64) {
            Some(0) => Ok(RawMetadata::Json(body)),
            Some(code) => {
                let message = text_at(&body, "/message").unwrap_or_else(|| "unknown".to_string());
                Err(MediaError::Upstream(format!(
                    "pipixia status {code}: {message}"
                )))
            }
            None => Err(MediaError::missing("pipixia", "status_code")),
        }
    }

    fn parse(&self, _id: &str, raw: RawMetadata) -> Result<ProvisionalRecord> {
        let body = expect_json(Platform::Pipixia, raw)?;
        let item = body
            .pointer("/data/cell_comments/0/comment_info/item")
            .ok_or_else(|| MediaError::missing("pipixia", "data.cell_comments[0].comment_info.item"))?;

        let images = item
            .pointer("/note/multi_image")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|image| text_at(image, "/url_list/0/url"))
                    .collect()
            })
            .unwrap_or_default();

        Ok(ProvisionalRecord {
            title: text_at(item, "/content"),
            video_url: text_at(item, "/video/video_high/url_list/0/url")
                .or_else(|| text_at(item, "/origin_video_download/url_list/0/url")),
            music_url: None,
            cover_url: text_at(item, "/cover/url_list/0/url"),
            images,
            author_uid: text_at(item, "/author/id"),
            author_name: text_at(item, "/author/name"),
            author_avatar: text_at(item, "/author/avatar/download_list/0/url"),
        })
    }
}
