//! Bilibili extraction via the public web-interface API.
//!
//! Two calls per post: `view` gives metadata and the first part's `cid`,
//! `playurl` (html5 platform) gives a progressive MP4 without watermark.
//!
//! # Example
//!
//! ```rust,no_run
//! use vidparse::platform::{bilibili::BilibiliAdapter, PlatformAdapter};
//!
//! let adapter = BilibiliAdapter::default();
//! let id = adapter.extract_id("https://www.bilibili.com/video/BV1xx411c7mD")?;
//! assert_eq!(id, "BV1xx411c7mD");
//! # Ok::<(), vidparse::MediaError>(())
//! ```

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{capture_first, expect_json, Platform, PlatformAdapter, RawMetadata};
use crate::error::{MediaError, Result};
use crate::fingerprint::android_chrome_identity;
use crate::http_client::{CallContext, MediaClient};
use crate::media::ProvisionalRecord;

const API_BASE: &str = "https://api.bilibili.com";

/// API code for risk-control rejection.
const RISK_CONTROL_CODE: i64 = -412;

static ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(BV[0-9A-Za-z]{10})").expect("bilibili bvid pattern"),
        Regex::new(r"/video/(av\d+)").expect("bilibili aid pattern"),
    ]
});

/// Bilibili adapter.
pub struct BilibiliAdapter {
    api_base: String,
}

impl Default for BilibiliAdapter {
    fn default() -> Self {
        Self::with_api_base(API_BASE)
    }
}

impl BilibiliAdapter {
    #[must_use]
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn view_url(&self, id: &str) -> String {
        match id.strip_prefix("av") {
            Some(aid) => format!("{}/x/web-interface/view?aid={aid}", self.api_base),
            None => format!("{}/x/web-interface/view?bvid={id}", self.api_base),
        }
    }
}

/// `{code, message, data}` envelope shared by every endpoint.
#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Value,
}

impl Envelope {
    fn into_data(self) -> Result<Value> {
        match self.code {
            0 => Ok(self.data),
            RISK_CONTROL_CODE => Err(MediaError::RateLimited(Platform::Bilibili.to_string())),
            code => Err(MediaError::Upstream(format!(
                "bilibili code {code}: {}",
                self.message
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct View {
    title: String,
    #[serde(default)]
    pic: String,
    #[serde(default)]
    owner: Owner,
}

#[derive(Debug, Default, Deserialize)]
struct Owner {
    #[serde(default)]
    mid: u64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    face: String,
}

#[derive(Debug, Default, Deserialize)]
struct PlayUrl {
    #[serde(default)]
    durl: Vec<Segment>,
}

#[derive(Debug, Deserialize)]
struct Segment {
    url: String,
}

/// Just the keys the playurl request needs.
#[derive(Debug, Deserialize)]
struct ViewKey {
    bvid: String,
    cid: u64,
}

/// Decode a response the fetch step itself depends on. A body that cannot
/// drive the next request is an upstream failure, not payload drift.
fn decode_response<T: for<'de> Deserialize<'de>>(value: Value, what: &str) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| MediaError::Upstream(format!("bilibili {what} response unusable: {e}")))
}

fn decode<T: for<'de> Deserialize<'de>>(value: Value, what: &str) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| MediaError::SchemaMismatch(format!("bilibili {what}: {e}")))
}

#[async_trait]
impl PlatformAdapter for BilibiliAdapter {
    fn platform(&self) -> Platform {
        Platform::Bilibili
    }

    fn extract_id(&self, canonical_url: &str) -> Result<String> {
        capture_first(&ID_PATTERNS, canonical_url).ok_or_else(|| {
            MediaError::MalformedUrl(format!("no bilibili video id in {canonical_url}"))
        })
    }

    async fn fetch(&self, id: &str, client: &MediaClient, ctx: &CallContext) -> Result<RawMetadata> {
        let identity = android_chrome_identity()
            .accepting_json()
            .with_referer("https://www.bilibili.com/");

        let view_body = client
            .get_json(Platform::Bilibili, &self.view_url(id), &identity, ctx)
            .await?;
        let view_data = decode_response::<Envelope>(view_body, "view")?.into_data()?;
        let view: ViewKey = decode_response(view_data.clone(), "view")?;

        let play_url = format!(
            "{}/x/player/playurl?bvid={}&cid={}&qn=16&platform=html5&high_quality=1",
            self.api_base, view.bvid, view.cid
        );
        tracing::debug!("Fetching bilibili playurl: {}", play_url);

        let play_body = client
            .get_json(Platform::Bilibili, &play_url, &identity, ctx)
            .await?;
        let play_data = decode_response::<Envelope>(play_body, "playurl")?.into_data()?;

        Ok(RawMetadata::Json(json!({ "view": view_data, "play": play_data })))
    }

    fn parse(&self, _id: &str, raw: RawMetadata) -> Result<ProvisionalRecord> {
        let mut body = expect_json(Platform::Bilibili, raw)?;
        let mut part = |key: &str| body.get_mut(key).map(Value::take).unwrap_or_default();
        let view: View = decode(part("view"), "view data")?;
        let play: PlayUrl = decode(part("play"), "playurl data")?;

        let owner = view.owner;
        Ok(ProvisionalRecord {
            title: Some(view.title),
            video_url: play.durl.into_iter().next().map(|segment| segment.url),
            music_url: None,
            cover_url: Some(view.pic),
            images: Vec::new(),
            author_uid: (owner.mid != 0).then(|| owner.mid.to_string()),
            author_name: Some(owner.name),
            author_avatar: Some(owner.face),
        })
    }
}
