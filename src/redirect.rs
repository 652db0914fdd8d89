//! Short-link expansion.
//!
//! Short links (`v.douyin.com/…`, `b23.tv/…`) answer with a chain of 3xx
//! responses. The resolver walks the chain by hand so it can bound the hop
//! count and resolve relative `Location` headers against the current URL.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::StatusCode;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{MediaError, Result};
use crate::fingerprint::ios_safari_identity;
use crate::http_client::{CallContext, MediaClient};

/// Hops followed before giving up.
pub const MAX_REDIRECTS: usize = 10;

/// Expands a short link to the URL it finally points at.
#[async_trait]
pub trait LinkExpander: Send + Sync {
    async fn expand(&self, url: &str, ctx: &CallContext) -> Result<String>;
}

/// HTTP redirect follower.
pub struct RedirectResolver {
    client: Arc<MediaClient>,
    max_hops: usize,
}

impl RedirectResolver {
    #[must_use]
    pub fn new(client: Arc<MediaClient>) -> Self {
        Self {
            client,
            max_hops: MAX_REDIRECTS,
        }
    }

    #[must_use]
    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops;
        self
    }
}

#[async_trait]
impl LinkExpander for RedirectResolver {
    #[instrument(skip(self, ctx), fields(max_hops = self.max_hops))]
    async fn expand(&self, url: &str, ctx: &CallContext) -> Result<String> {
        let mut current =
            Url::parse(url).map_err(|e| MediaError::MalformedUrl(format!("{url}: {e}")))?;
        let identity = ios_safari_identity();
        let mut hops = 0usize;

        loop {
            let response = self
                .client
                .get_unfollowed(current.as_str(), &identity, ctx)
                .await?;
            let status = response.status();

            if status.is_redirection() {
                if let Some(location) = response.headers().get(LOCATION) {
                    if hops == self.max_hops {
                        return Err(MediaError::TooManyRedirects {
                            url: url.to_string(),
                            limit: self.max_hops,
                        });
                    }
                    let location = location.to_str().map_err(|_| {
                        MediaError::MalformedUrl(format!("non-text Location from {current}"))
                    })?;
                    // Relative targets resolve against the URL that sent them
                    current = current.join(location).map_err(|e| {
                        MediaError::MalformedUrl(format!("bad redirect target {location}: {e}"))
                    })?;
                    hops += 1;
                    debug!(hop = hops, to = %current, "Following redirect");
                    continue;
                }
            }

            if status.is_success() || status.is_redirection() {
                debug!(hops, "Expanded to {}", current);
                return Ok(current.into());
            }

            let host = current.host_str().unwrap_or("short link").to_string();
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(MediaError::RateLimited(host));
            }
            return Err(MediaError::Upstream(format!(
                "{host} answered {status} while expanding {url}"
            )));
        }
    }
}
