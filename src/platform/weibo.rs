//! Weibo video extraction through the h5 component API.
//!
//! Video ids look like `1034:4914351942074379` and come either from a `fid`
//! query parameter or a `/show/<id>` path. The component endpoint wants a
//! form-encoded JSON request and answers with a map of quality → URL.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use super::{capture_first, expect_json, text_at, Platform, PlatformAdapter, RawMetadata};
use crate::error::{MediaError, Result};
use crate::fingerprint::ios_safari_identity;
use crate::http_client::{CallContext, MediaClient};
use crate::media::ProvisionalRecord;

const API_BASE: &str = "https://h5.video.weibo.com";
const SUCCESS_CODE: &str = "100000";

/// Highest quality first.
const QUALITY_PREFERENCE: &[&str] = &["高清 1080P", "高清 720P", "标清 480P", "流畅 360P"];

static ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"[?&]fid=(\d+(?::|%3A)\d+)").expect("weibo fid pattern"),
        Regex::new(r"/(?:tv/)?show/(\d+(?::|%3A)\d+)").expect("weibo show pattern"),
    ]
});

/// Weibo adapter.
pub struct WeiboAdapter {
    api_base: String,
}

impl Default for WeiboAdapter {
    fn default() -> Self {
        Self::with_api_base(API_BASE)
    }
}

impl WeiboAdapter {
    #[must_use]
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PlatformAdapter for WeiboAdapter {
    fn platform(&self) -> Platform {
        Platform::Weibo
    }

    fn extract_id(&self, canonical_url: &str) -> Result<String> {
        capture_first(&ID_PATTERNS, canonical_url)
            .map(|id| id.replace("%3A", ":"))
            .ok_or_else(|| MediaError::MalformedUrl(format!("no weibo video id in {canonical_url}")))
    }

    async fn fetch(&self, id: &str, client: &MediaClient, ctx: &CallContext) -> Result<RawMetadata> {
        let page = format!("/show/{id}");
        let url = format!(
            "{}/api/component?page={}",
            self.api_base,
            urlencoding::encode(&page)
        );
        let data = serde_json::json!({ "Component_Play_Playinfo": { "oid": id } }).to_string();

        let identity = ios_safari_identity()
            .accepting_json()
            .with_referer(format!("https://h5.video.weibo.com/show/{id}"))
            .with_origin("https://h5.video.weibo.com");
        let body = client
            .post_form_json(Platform::Weibo, &url, &[("data", data.as_str())], &identity, ctx)
            .await?;

        let code = text_at(&body, "/code").unwrap_or_default();
        if code != SUCCESS_CODE {
            let msg = text_at(&body, "/msg").unwrap_or_else(|| format!("code {code}"));
            return Err(MediaError::Upstream(format!("weibo: {msg}")));
        }
        Ok(RawMetadata::Json(body))
    }

    fn parse(&self, _id: &str, raw: RawMetadata) -> Result<ProvisionalRecord> {
        let body = expect_json(Platform::Weibo, raw)?;
        let info = body
            .pointer("/data/Component_Play_Playinfo")
            .filter(|v| v.is_object())
            .ok_or_else(|| MediaError::missing("weibo", "data.Component_Play_Playinfo"))?;

        Ok(ProvisionalRecord {
            title: text_at(info, "/title").or_else(|| text_at(info, "/text")),
            video_url: best_stream(info.get("urls")),
            music_url: None,
            cover_url: text_at(info, "/cover_image"),
            images: Vec::new(),
            author_uid: text_at(info, "/author_id"),
            author_name: text_at(info, "/author"),
            author_avatar: text_at(info, "/avatar"),
        })
    }
}

/// Pick the best quality the post offers, falling back to any entry.
fn best_stream(urls: Option<&Value>) -> Option<String> {
    let urls = urls?.as_object()?;
    QUALITY_PREFERENCE
        .iter()
        .find_map(|quality| urls.get(*quality).and_then(Value::as_str))
        .or_else(|| urls.values().find_map(Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_id_from_fid_and_path() {
        let adapter = WeiboAdapter::default();
        assert_eq!(
            adapter
                .extract_id("https://video.weibo.com/show?fid=1034:4914351942074379")
                .unwrap(),
            "1034:4914351942074379"
        );
        assert_eq!(
            adapter
                .extract_id("https://h5.video.weibo.com/show/1034%3A4914351942074379")
                .unwrap(),
            "1034:4914351942074379"
        );
        assert_eq!(
            adapter.extract_id("https://m.weibo.cn/tv/show/1034:49").unwrap(),
            "1034:49"
        );
        assert!(adapter.extract_id("https://weibo.com/u/123").is_err());
    }

    #[test]
    fn parse_prefers_highest_quality() {
        let body = json!({
            "code": "100000",
            "data": { "Component_Play_Playinfo": {
                "title": "落日",
                "urls": {
                    "标清 480P": "//f.video.weibocdn.com/480.mp4",
                    "高清 720P": "//f.video.weibocdn.com/720.mp4"
                },
                "cover_image": "//wx1.sinaimg.cn/cover.jpg",
                "author": "摄影师",
                "author_id": 5566,
                "avatar": "//tvax1.sinaimg.cn/a.jpg"
            }}
        });
        let record = WeiboAdapter::default()
            .parse("1034:1", RawMetadata::Json(body))
            .unwrap();

        assert_eq!(record.title.as_deref(), Some("落日"));
        assert_eq!(record.video_url.as_deref(), Some("//f.video.weibocdn.com/720.mp4"));
        assert_eq!(record.author_uid.as_deref(), Some("5566"));
    }

    #[test]
    fn unknown_quality_labels_fall_back_to_any_stream() {
        let urls = json!({ "超清 4K": "https://f.video.weibocdn.com/4k.mp4" });
        assert_eq!(
            best_stream(Some(&urls)).as_deref(),
            Some("https://f.video.weibocdn.com/4k.mp4")
        );
        assert_eq!(best_stream(None), None);
    }

    #[test]
    fn missing_playinfo_is_schema_mismatch() {
        let body = json!({ "code": "100000", "data": { "Component_Play_Playinfo": [] } });
        let err = WeiboAdapter::default()
            .parse("1", RawMetadata::Json(body))
            .unwrap_err();
        assert!(matches!(err, MediaError::SchemaMismatch(_)));
    }

    #[tokio::test]
    async fn fetch_posts_component_form() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/component")
            .match_query(mockito::Matcher::UrlEncoded("page".into(), "/show/1034:7".into()))
            .match_body(mockito::Matcher::Regex("^data=".into()))
            .with_status(200)
            .with_body(r#"{"code":"100000","data":{"Component_Play_Playinfo":{"urls":{"a":"x"}}}}"#)
            .create_async()
            .await;

        let adapter = WeiboAdapter::with_api_base(server.url());
        let client = MediaClient::new().unwrap();
        let raw = adapter
            .fetch("1034:7", &client, &CallContext::new())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(adapter.parse("1034:7", raw).unwrap().video_url.as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn non_success_code_is_upstream_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/component")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"code":"100010","msg":"视频不存在"}"#)
            .create_async()
            .await;

        let adapter = WeiboAdapter::with_api_base(server.url());
        let client = MediaClient::new().unwrap();
        let err = adapter
            .fetch("1034:7", &client, &CallContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Upstream(msg) if msg.contains("视频不存在")));
    }
}
