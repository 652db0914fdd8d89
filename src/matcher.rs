//! Share-text platform matching.
//!
//! Share text copied from an app looks like
//! `"8.92 复制打开抖音，看看… https://v.douyin.com/iRNBho6u/ 复制此链接"`.
//! The matcher cuts the URL out of the surrounding caption, then walks an
//! ordered signature list; the first signature that matches owns the URL.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{MediaError, Result};
use crate::platform::Platform;

/// One platform signature. Order in [`SIGNATURES`] is the tie-break.
pub struct Signature {
    pub platform: Platform,
    pub short_link: bool,
    pattern: Regex,
}

impl Signature {
    fn new(platform: Platform, short_link: bool, pattern: &str) -> Self {
        Self {
            platform,
            short_link,
            pattern: Regex::new(pattern).expect("platform signature is a valid pattern"),
        }
    }

    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        self.pattern.is_match(url)
    }
}

/// Host pattern anchored at the start of an `http(s)` URL.
macro_rules! host {
    ($h:literal) => {
        concat!(r"(?i)^https?://", $h, r"(?:[:/?#]|$)")
    };
}

/// Ordered signatures. A platform's short-link host comes before its
/// full domain so the more specific shape wins.
pub static SIGNATURES: LazyLock<Vec<Signature>> = LazyLock::new(|| {
    vec![
        Signature::new(Platform::Douyin, true, host!(r"v\.douyin\.com")),
        Signature::new(
            Platform::Douyin,
            false,
            host!(r"(?:[a-z0-9-]+\.)*(?:iesdouyin|douyin)\.com"),
        ),
        Signature::new(Platform::Kuaishou, true, host!(r"v\.kuaishou\.com")),
        Signature::new(
            Platform::Kuaishou,
            false,
            host!(r"(?:[a-z0-9-]+\.)*(?:kuaishou|chenzhongtech|gifshow)\.com"),
        ),
        Signature::new(Platform::Pipixia, true, r"(?i)^https?://h5\.pipix\.com/s/"),
        Signature::new(Platform::Pipixia, false, host!(r"(?:[a-z0-9-]+\.)*pipix\.com")),
        Signature::new(
            Platform::Weibo,
            false,
            host!(r"(?:[a-z0-9-]+\.)*(?:weibo\.com|weibo\.cn)"),
        ),
        Signature::new(Platform::Redbook, true, host!(r"xhslink\.com")),
        Signature::new(
            Platform::Redbook,
            false,
            host!(r"(?:[a-z0-9-]+\.)*xiaohongshu\.com"),
        ),
        Signature::new(Platform::Bilibili, true, host!(r"b23\.tv")),
        Signature::new(
            Platform::Bilibili,
            false,
            host!(r"(?:[a-z0-9-]+\.)*bilibili\.com"),
        ),
    ]
});

/// Short-link hosts that must be expanded before matching. `t.cn` is shared
/// by several services and only becomes matchable after expansion.
static SHORT_LINK_ONLY: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![Regex::new(host!(r"t\.cn")).expect("short-link pattern is valid")]
});

/// An `http(s)` URL inside free text. ASCII only, so CJK captions and
/// full-width punctuation end the match.
static URL_IN_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)https?://[a-z0-9.-]+(?::\d+)?(?:/[a-z0-9\-._~%!$&'()*+,;=:@/]*)?(?:\?[a-z0-9\-._~%!$&'()*+,;=:@/?]*)?(?:#[a-z0-9\-._~%!$&'()*+,;=:@/?]*)?")
        .expect("url pattern is valid")
});

/// A scheme-less `host/path` token, for text that is already a bare URL.
static BARE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:[a-z0-9-]+\.)+[a-z]{2,}/[!-~]*$").expect("bare url pattern is valid")
});

/// Result of matching share text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub platform: Platform,
    /// The URL cut out of the share text.
    pub url: String,
}

/// Cut the embeddable URL out of share text.
///
/// Fails with `InvalidInput` on blank text and `UnsupportedSource` when the
/// text carries no link at all.
pub fn extract_candidate(text: &str) -> Result<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(MediaError::InvalidInput("share text is empty".to_string()));
    }

    if let Some(found) = URL_IN_TEXT.find(text) {
        let url = found
            .as_str()
            .trim_end_matches(['.', ',', ';', ':', '!', '?', ')', '\'']);
        return Ok(url.to_string());
    }

    if BARE_URL.is_match(text) {
        return Ok(format!("https://{text}"));
    }

    Err(MediaError::UnsupportedSource(
        "no link found in share text".to_string(),
    ))
}

/// Whether `url` is a short link that needs redirect expansion.
#[must_use]
pub fn is_short_link(url: &str) -> bool {
    SIGNATURES
        .iter()
        .any(|sig| sig.short_link && sig.matches(url))
        || SHORT_LINK_ONLY.iter().any(|re| re.is_match(url))
}

/// Find the platform owning `url`. First matching signature wins.
pub fn match_url(url: &str) -> Result<Platform> {
    SIGNATURES
        .iter()
        .find(|sig| sig.matches(url))
        .map(|sig| {
            tracing::debug!("Matched platform signature: {}", sig.platform);
            sig.platform
        })
        .ok_or_else(|| MediaError::UnsupportedSource(format!("no platform recognizes {url}")))
}

/// Cut the URL out of share text and find its platform.
pub fn match_share_text(text: &str) -> Result<Match> {
    let url = extract_candidate(text)?;
    let platform = match_url(&url)?;
    Ok(Match { platform, url })
}

/// Platforms in signature order, without repeats.
#[must_use]
pub fn signature_order() -> Vec<Platform> {
    let mut order = Vec::new();
    for sig in SIGNATURES.iter() {
        if !order.contains(&sig.platform) {
            order.push(sig.platform);
        }
    }
    order
}
