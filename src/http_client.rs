//! HTTP Client for upstream platforms
//!
//! Features:
//! - HTTP/2 with connection pooling and keep-alive
//! - Brotli, Zstd, Gzip compression (auto-negotiated)
//! - Per-request mobile identity (user-agent, referer, origin)
//! - Caller-driven cancellation and deadlines on every call
//! - Upstream status classification (throttling vs. generic failure)

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::error::{MediaError, Result};
use crate::fingerprint::ClientIdentity;
use crate::platform::Platform;

/// Cancellation and deadline signal for one resolution.
///
/// Cloning shares the same token, so cancelling any clone aborts every
/// network call made under it.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Context whose calls fail with `Timeout` after `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Attach a caller-owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Abort every call running under this context.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Drive `fut` to completion unless the caller cancels or the deadline
    /// passes first. The losing future is dropped, which aborts its request.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(MediaError::Cancelled);
        }

        let bounded = async {
            match self.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, fut)
                    .await
                    .map_err(|_| MediaError::Timeout)?,
                None => fut.await,
            }
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(MediaError::Cancelled),
            result = bounded => result,
        }
    }
}

/// HTTP client shared by the redirect resolver and every adapter
pub struct MediaClient {
    following: Client,
    direct: Client,
}

impl MediaClient {
    /// Create a client with default timeouts (30s total, 10s connect)
    pub fn new() -> anyhow::Result<Self> {
        Self::with_timeouts(Duration::from_secs(30), Duration::from_secs(10))
    }

    /// Create a client with specific timeouts
    pub fn with_timeouts(timeout: Duration, connect_timeout: Duration) -> anyhow::Result<Self> {
        let following = base_builder(timeout, connect_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        // Redirect resolution inspects every Location header itself
        let direct = base_builder(timeout, connect_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self { following, direct })
    }

    /// Send a prepared request under `ctx`.
    pub async fn send(&self, request: RequestBuilder, ctx: &CallContext) -> Result<Response> {
        ctx.run(async {
            request
                .send()
                .await
                .map_err(|e| MediaError::from_transport(&e))
        })
        .await
    }

    /// GET without following redirects
    #[instrument(skip(self, url, identity, ctx), fields(url = %url))]
    pub async fn get_unfollowed(
        &self,
        url: &str,
        identity: &ClientIdentity,
        ctx: &CallContext,
    ) -> Result<Response> {
        debug!("Probing without redirects");
        let request = self.direct.get(url).headers(identity.to_headers());
        let response = self.send(request, ctx).await?;
        debug!(status = %response.status(), "Probe answered");
        Ok(response)
    }

    /// GET a page on behalf of `platform` and return its body
    #[instrument(skip(self, platform, url, identity, ctx), fields(platform = %platform, url = %url))]
    pub async fn get_text(
        &self,
        platform: Platform,
        url: &str,
        identity: &ClientIdentity,
        ctx: &CallContext,
    ) -> Result<String> {
        let request = self.following.get(url).headers(identity.to_headers());
        let response = self.send(request, ctx).await?;
        let response = check_status(platform, response)?;
        read_text(platform, response, ctx).await
    }

    /// GET a JSON document on behalf of `platform`
    pub async fn get_json(
        &self,
        platform: Platform,
        url: &str,
        identity: &ClientIdentity,
        ctx: &CallContext,
    ) -> Result<Value> {
        let body = self.get_text(platform, url, identity, ctx).await?;
        parse_json(platform, &body)
    }

    /// POST an urlencoded form and decode the JSON answer
    #[instrument(skip(self, platform, url, form, identity, ctx), fields(platform = %platform, url = %url))]
    pub async fn post_form_json(
        &self,
        platform: Platform,
        url: &str,
        form: &[(&str, &str)],
        identity: &ClientIdentity,
        ctx: &CallContext,
    ) -> Result<Value> {
        let body = form
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let request = self
            .following
            .post(url)
            .headers(identity.to_headers())
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(body);
        let response = self.send(request, ctx).await?;
        let response = check_status(platform, response)?;
        let text = read_text(platform, response, ctx).await?;
        parse_json(platform, &text)
    }
}

fn base_builder(timeout: Duration, connect_timeout: Duration) -> reqwest::ClientBuilder {
    Client::builder()
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .tcp_nodelay(true)
        .use_rustls_tls()
        .brotli(true)
        .zstd(true)
        .gzip(true)
        .deflate(true)
        .connect_timeout(connect_timeout)
        .timeout(timeout)
}

/// Classify a response status for `platform`.
///
/// Throttling statuses become `RateLimited`; any other non-2xx is `Upstream`.
pub fn check_status(platform: Platform, response: Response) -> Result<Response> {
    let status = response.status();
    info!(
        platform = %platform,
        status = %status,
        version = ?response.version(),
        "Response received"
    );

    if is_throttled(platform, status) {
        return Err(MediaError::RateLimited(platform.to_string()));
    }
    if !status.is_success() {
        return Err(MediaError::Upstream(format!("{platform} returned {status}")));
    }
    Ok(response)
}

fn is_throttled(platform: Platform, status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || platform.throttle_statuses().contains(&status.as_u16())
}

async fn read_text(platform: Platform, response: Response, ctx: &CallContext) -> Result<String> {
    ctx.run(async {
        response
            .text()
            .await
            .map_err(|e| MediaError::Upstream(format!("{platform} body unreadable: {e}")))
    })
    .await
}

fn parse_json(platform: Platform, body: &str) -> Result<Value> {
    serde_json::from_str(body)
        .map_err(|e| MediaError::Upstream(format!("{platform} returned malformed JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::ios_safari_identity;

    #[tokio::test]
    async fn run_reports_cancellation() {
        let ctx = CallContext::new();
        ctx.cancel();
        let result: Result<()> = ctx.run(async { Ok(()) }).await;
        assert_eq!(result, Err(MediaError::Cancelled));
    }

    #[tokio::test]
    async fn run_reports_deadline() {
        let ctx = CallContext::with_timeout(Duration::from_millis(10));
        let result: Result<()> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert_eq!(result, Err(MediaError::Timeout));
    }

    #[tokio::test]
    async fn cancel_aborts_in_flight_call() {
        let ctx = CallContext::new();
        let token = ctx.token().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });
        let result: Result<()> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert_eq!(result, Err(MediaError::Cancelled));
    }

    #[tokio::test]
    async fn caller_token_cancels_deadline_context() {
        let token = CancellationToken::new();
        let ctx = CallContext::with_timeout(Duration::from_secs(30)).with_cancellation(token.clone());
        token.cancel();
        assert!(ctx.token().is_cancelled());

        let result: Result<()> = ctx.run(async { Ok(()) }).await;
        assert_eq!(result, Err(MediaError::Cancelled));
    }

    #[tokio::test]
    async fn too_many_requests_is_rate_limited() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api")
            .with_status(429)
            .create_async()
            .await;

        let client = MediaClient::new().unwrap();
        let url = format!("{}/api", server.url());
        let result = client
            .get_text(Platform::Douyin, &url, &ios_safari_identity(), &CallContext::new())
            .await;

        mock.assert_async().await;
        assert_eq!(result, Err(MediaError::RateLimited("douyin".into())));
    }

    #[tokio::test]
    async fn server_error_is_upstream_error() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/api").with_status(502).create_async().await;

        let client = MediaClient::new().unwrap();
        let url = format!("{}/api", server.url());
        let result = client
            .get_json(Platform::Weibo, &url, &ios_safari_identity(), &CallContext::new())
            .await;

        assert!(matches!(result, Err(MediaError::Upstream(_))));
    }

    #[tokio::test]
    async fn malformed_json_is_upstream_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api")
            .with_status(200)
            .with_body("<html>blocked</html>")
            .create_async()
            .await;

        let client = MediaClient::new().unwrap();
        let url = format!("{}/api", server.url());
        let result = client
            .get_json(Platform::Bilibili, &url, &ios_safari_identity(), &CallContext::new())
            .await;

        assert!(matches!(result, Err(MediaError::Upstream(msg)) if msg.contains("malformed JSON")));
    }

    #[tokio::test]
    async fn post_form_sends_urlencoded_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/component")
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body("data=%7B%22a%22%3A1%7D")
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let client = MediaClient::new().unwrap();
        let url = format!("{}/component", server.url());
        let value = client
            .post_form_json(
                Platform::Weibo,
                &url,
                &[("data", r#"{"a":1}"#)],
                &ios_safari_identity(),
                &CallContext::new(),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(value["ok"], true);
    }
}
