//! Mobile Client Fingerprint Spoofing
//!
//! Share pages and private APIs of short-video platforms only answer clients
//! that look like the platform's own mobile web view. Each request carries a
//! realistic mobile user-agent plus the platform's referer and origin.

use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, ORIGIN, REFERER, USER_AGENT,
};

/// Real iOS versions paired with their Safari build
const IOS_VERSIONS: &[(&str, &str)] = &[
    ("17_5", "17.5"),
    ("17_4_1", "17.4.1"),
    ("16_6", "16.6"),
    ("16_5", "16.5"),
];

/// Real Android Chrome versions
const ANDROID_CHROME_VERSIONS: &[&str] = &["131.0.6778.104", "130.0.6723.103", "129.0.6668.100"];

/// Android device models seen in the wild
const ANDROID_DEVICES: &[&str] = &["Pixel 7", "SM-S918B", "M2012K11AC", "V2227A"];

/// Identity presented to an upstream platform
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
    pub referer: Option<String>,
    pub origin: Option<String>,
    pub extra: Vec<(&'static str, String)>,
}

/// Generate an iPhone Safari identity
#[must_use]
pub fn ios_safari_identity() -> ClientIdentity {
    let mut rng = rand::thread_rng();
    let (os, version) = IOS_VERSIONS.choose(&mut rng).copied().unwrap_or(("16_6", "16.6"));

    let user_agent = format!(
        "Mozilla/5.0 (iPhone; CPU iPhone OS {os} like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/{version} Mobile/15E148 Safari/604.1"
    );

    ClientIdentity {
        user_agent,
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
        accept_language: "zh-CN,zh;q=0.9".to_string(),
        referer: None,
        origin: None,
        extra: Vec::new(),
    }
}

/// Generate an Android Chrome identity
#[must_use]
pub fn android_chrome_identity() -> ClientIdentity {
    let mut rng = rand::thread_rng();
    let version = ANDROID_CHROME_VERSIONS
        .choose(&mut rng)
        .copied()
        .unwrap_or("131.0.6778.104");
    let device = ANDROID_DEVICES.choose(&mut rng).copied().unwrap_or("Pixel 7");
    let android = rng.gen_range(12..=14);

    let user_agent = format!(
        "Mozilla/5.0 (Linux; Android {android}; {device}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{version} Mobile Safari/537.36"
    );

    ClientIdentity {
        user_agent,
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"
            .to_string(),
        accept_language: "zh-CN,zh;q=0.9,en;q=0.8".to_string(),
        referer: None,
        origin: None,
        extra: Vec::new(),
    }
}

/// Generate a random mobile identity (iOS 60%, Android 40%)
#[must_use]
pub fn random_mobile_identity() -> ClientIdentity {
    let roll: f32 = rand::thread_rng().gen();
    if roll < 0.6 {
        ios_safari_identity()
    } else {
        android_chrome_identity()
    }
}

impl ClientIdentity {
    #[must_use]
    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Expect a JSON body instead of a page.
    #[must_use]
    pub fn accepting_json(mut self) -> Self {
        self.accept = "application/json, text/plain, */*".to_string();
        self
    }

    /// Add a platform-specific header (cookies, client hints).
    #[must_use]
    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.extra.push((name, value.into()));
        self
    }

    /// Convert identity to reqwest `HeaderMap`. Values that are not valid
    /// header text are dropped.
    pub fn to_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        insert(&mut headers, USER_AGENT, &self.user_agent);
        insert(&mut headers, ACCEPT, &self.accept);
        insert(&mut headers, ACCEPT_LANGUAGE, &self.accept_language);

        if let Some(referer) = &self.referer {
            insert(&mut headers, REFERER, referer);
        }
        if let Some(origin) = &self.origin {
            insert(&mut headers, ORIGIN, origin);
        }

        for (name, value) in &self.extra {
            match HeaderName::from_bytes(name.as_bytes()) {
                Ok(name) => insert(&mut headers, name, value),
                Err(_) => tracing::warn!("Dropping invalid header name {name}"),
            }
        }

        headers
    }
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => tracing::warn!("Dropping invalid value for header {name}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ios_identity() {
        let identity = ios_safari_identity();
        assert!(identity.user_agent.contains("iPhone"));
        assert!(identity.user_agent.contains("Mobile"));
    }

    #[test]
    fn test_android_identity() {
        let identity = android_chrome_identity();
        assert!(identity.user_agent.contains("Android"));
        assert!(identity.user_agent.contains("Chrome/"));
    }

    #[test]
    fn test_headers_include_referer_and_origin() {
        let headers = random_mobile_identity()
            .with_referer("https://www.douyin.com/")
            .with_origin("https://www.douyin.com")
            .to_headers();
        assert!(headers.contains_key(USER_AGENT));
        assert_eq!(headers[REFERER], "https://www.douyin.com/");
        assert_eq!(headers[ORIGIN], "https://www.douyin.com");
    }

    #[test]
    fn test_invalid_extra_header_is_dropped() {
        let headers = ios_safari_identity()
            .with_header("cookie", "a=1")
            .with_header("x-bad", "line\nbreak")
            .to_headers();
        assert_eq!(headers["cookie"], "a=1");
        assert!(!headers.contains_key("x-bad"));
    }

    #[test]
    fn test_accepting_json() {
        let identity = ios_safari_identity().accepting_json();
        assert!(identity.accept.starts_with("application/json"));
    }
}
