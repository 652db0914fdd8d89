//! Platform adapters.
//!
//! Each supported short-video platform has one adapter that knows how to pull
//! a native id out of a canonical URL, fetch the platform's raw payload, and
//! parse it into a [`ProvisionalRecord`].
//!
//! # Architecture
//!
//! - [`Platform`]: Closed set of supported sources with stable wire names
//! - [`PlatformAdapter`]: Async trait for platform-specific extraction
//! - [`Registry`]: Read-only lookup from [`Platform`] to its adapter
//!
//! # Example
//!
//! ```rust,no_run
//! use vidparse::platform::{Platform, Registry};
//! use vidparse::{CallContext, MediaClient};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = MediaClient::new()?;
//! let registry = Registry::builtin();
//! let adapter = registry.get(Platform::Bilibili).expect("builtin");
//!
//! let id = adapter.extract_id("https://www.bilibili.com/video/BV1xx411c7mD")?;
//! let raw = adapter.fetch(&id, &client, &CallContext::new()).await?;
//! let record = adapter.parse(&id, raw)?;
//! println!("{:?}", record.title);
//! # Ok(())
//! # }
//! ```

pub mod bilibili;
pub mod douyin;
pub mod kuaishou;
pub mod pipixia;
pub mod redbook;
pub mod weibo;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MediaError, Result};
use crate::http_client::{CallContext, MediaClient};
use crate::media::ProvisionalRecord;

/// Supported source platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Douyin,
    Kuaishou,
    Pipixia,
    Weibo,
    Redbook,
    Bilibili,
}

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::Douyin,
        Platform::Kuaishou,
        Platform::Pipixia,
        Platform::Weibo,
        Platform::Redbook,
        Platform::Bilibili,
    ];

    /// Wire name (`source` parameter, audit log column).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Douyin => "douyin",
            Self::Kuaishou => "kuaishou",
            Self::Pipixia => "pipixia",
            Self::Weibo => "weibo",
            Self::Redbook => "redbook",
            Self::Bilibili => "bilibili",
        }
    }

    /// Human-readable name.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Douyin => "Douyin",
            Self::Kuaishou => "Kuaishou",
            Self::Pipixia => "Pipixia",
            Self::Weibo => "Weibo",
            Self::Redbook => "Xiaohongshu",
            Self::Bilibili => "Bilibili",
        }
    }

    /// HTTP statuses this platform uses to signal throttling, besides 429.
    #[must_use]
    pub fn throttle_statuses(self) -> &'static [u16] {
        match self {
            Self::Redbook => &[461, 471],
            Self::Bilibili => &[412],
            _ => &[],
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "douyin" => Ok(Self::Douyin),
            "kuaishou" => Ok(Self::Kuaishou),
            "pipixia" | "pipix" => Ok(Self::Pipixia),
            "weibo" => Ok(Self::Weibo),
            "redbook" | "xiaohongshu" | "xhs" => Ok(Self::Redbook),
            "bilibili" => Ok(Self::Bilibili),
            other => Err(MediaError::UnsupportedSource(format!(
                "unknown platform `{other}`"
            ))),
        }
    }
}

/// Platform-shaped payload. Only the adapter that fetched it interprets it.
#[derive(Debug, Clone)]
pub enum RawMetadata {
    Html(String),
    Json(Value),
}

/// Adapter for one platform.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Platform this adapter serves.
    fn platform(&self) -> Platform;

    /// Pull the native id out of a canonical URL.
    fn extract_id(&self, canonical_url: &str) -> Result<String>;

    /// Fetch the raw payload for a native id.
    async fn fetch(&self, id: &str, client: &MediaClient, ctx: &CallContext)
        -> Result<RawMetadata>;

    /// Parse a payload produced by [`PlatformAdapter::fetch`].
    fn parse(&self, id: &str, raw: RawMetadata) -> Result<ProvisionalRecord>;
}

/// Read-only table of adapters keyed by platform.
///
/// Built once at startup and shared behind an `Arc`; lookups never lock.
#[derive(Clone, Default)]
pub struct Registry {
    adapters: HashMap<Platform, Arc<dyn PlatformAdapter>>,
}

impl Registry {
    /// Empty registry (tests register their own adapters).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with all built-in adapters.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new()
            .with(douyin::DouyinAdapter::default())
            .with(kuaishou::KuaishouAdapter::default())
            .with(pipixia::PipixiaAdapter::default())
            .with(weibo::WeiboAdapter::default())
            .with(redbook::RedbookAdapter::default())
            .with(bilibili::BilibiliAdapter::default())
    }

    /// Register an adapter, replacing any adapter for the same platform.
    #[must_use]
    pub fn with(mut self, adapter: impl PlatformAdapter + 'static) -> Self {
        self.adapters.insert(adapter.platform(), Arc::new(adapter));
        self
    }

    #[must_use]
    pub fn get(&self, platform: Platform) -> Option<&Arc<dyn PlatformAdapter>> {
        self.adapters.get(&platform)
    }

    /// Registered platforms in declaration order.
    #[must_use]
    pub fn platforms(&self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|p| self.adapters.contains_key(p))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

// ============================================================================
// Payload helpers shared by adapters
// ============================================================================

/// Pull the JSON object assigned to `marker` inside an inline `<script>`.
///
/// Share pages embed state as `window.X = {...}`; the object may be followed
/// by a semicolon or further statements. Only an assignment counts, so
/// scripts that merely read `window.X` are skipped. Bare JavaScript
/// `undefined` values are rewritten to `null` so the blob parses as JSON.
/// A blob that fails to parse does not stop the search; its error is
/// returned only when no later script yields a usable object.
pub(crate) fn script_json(platform: Platform, html: &str, marker: &str) -> Result<Value> {
    use scraper::{Html, Selector};

    let document = Html::parse_document(html);
    let selector = Selector::parse("script")
        .map_err(|e| MediaError::SchemaMismatch(format!("script selector: {e:?}")))?;

    let mut last_error = None;
    for script in document.select(&selector) {
        if script.value().attr("src").is_some() {
            continue;
        }
        let content = script.text().collect::<String>();
        for (pos, _) in content.match_indices(marker) {
            let Some(rhs) = content[pos + marker.len()..].trim_start().strip_prefix('=') else {
                continue;
            };
            // `==` and `===` are comparisons, not assignments.
            if rhs.starts_with('=') {
                continue;
            }
            let Some(blob) = json_object_prefix(rhs) else {
                continue;
            };
            match serde_json::from_str(&blob) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    last_error = Some(MediaError::SchemaMismatch(format!(
                        "{platform}: `{marker}` is not JSON: {e}"
                    )));
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| MediaError::missing(platform.as_str(), marker)))
}

/// Copy the first balanced `{...}` out of `text`, honoring string literals
/// and replacing bare `undefined` tokens with `null`.
fn json_object_prefix(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let body = &text[start..];
    let mut out = String::with_capacity(body.len());
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut word_start: Option<usize> = None;

    for (i, c) in body.char_indices() {
        if in_string {
            out.push(c);
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
            word_start.get_or_insert(i);
            continue;
        }
        if let Some(ws) = word_start.take() {
            push_token(&mut out, &body[ws..i]);
        }
        out.push(c);
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(out);
                }
            }
            _ => {}
        }
    }
    None
}

fn push_token(out: &mut String, token: &str) {
    out.push_str(if token == "undefined" { "null" } else { token });
}

/// Text at a JSON pointer. Numbers are rendered, empty strings are absent.
pub(crate) fn text_at(value: &Value, pointer: &str) -> Option<String> {
    match value.pointer(pointer)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First capture group of the first pattern that matches.
pub(crate) fn capture_first(patterns: &[Regex], text: &str) -> Option<String> {
    patterns
        .iter()
        .find_map(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Require a JSON payload from `raw`.
pub(crate) fn expect_json(platform: Platform, raw: RawMetadata) -> Result<Value> {
    match raw {
        RawMetadata::Json(value) => Ok(value),
        RawMetadata::Html(_) => Err(MediaError::SchemaMismatch(format!(
            "{platform}: expected a JSON payload, got HTML"
        ))),
    }
}

/// Require an HTML payload from `raw`.
pub(crate) fn expect_html(platform: Platform, raw: RawMetadata) -> Result<String> {
    match raw {
        RawMetadata::Html(html) => Ok(html),
        RawMetadata::Json(_) => Err(MediaError::SchemaMismatch(format!(
            "{platform}: expected an HTML page, got JSON"
        ))),
    }
}
