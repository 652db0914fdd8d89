//! Resolution facade.
//!
//! Two entry points share one pipeline:
//!
//! ```text
//! share text ─► candidate URL ─► (expand short link) ─► match ─► extract id ─┐
//!                                                                             ▼
//! (platform, id) ─────────────────────────────────────────────► fetch ─► parse ─► normalize
//! ```
//!
//! Each step's failure is tagged with its [`Stage`].

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::error::{AtStage, MediaError, ResolveError, Stage};
use crate::http_client::{CallContext, MediaClient};
use crate::matcher;
use crate::media::{normalize, ResolvedMedia};
use crate::platform::{Platform, PlatformAdapter, Registry};
use crate::redirect::{LinkExpander, RedirectResolver};

type Result<T> = std::result::Result<T, ResolveError>;

/// Successful resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub platform: Platform,
    pub native_id: String,
    /// URL the id was extracted from; absent for by-id lookups.
    pub canonical_url: Option<String>,
    pub media: ResolvedMedia,
}

/// Entry point for resolving share text or `(platform, id)` pairs.
///
/// Cheap to clone; clones share the registry, HTTP client and expander.
#[derive(Clone)]
pub struct Resolver {
    registry: Arc<Registry>,
    client: Arc<MediaClient>,
    expander: Arc<dyn LinkExpander>,
}

impl Resolver {
    /// Resolver with every built-in adapter and the HTTP redirect follower.
    #[must_use]
    pub fn new(client: MediaClient) -> Self {
        let client = Arc::new(client);
        Self {
            registry: Arc::new(Registry::builtin()),
            expander: Arc::new(RedirectResolver::new(Arc::clone(&client))),
            client,
        }
    }

    /// Resolver from explicit parts (custom adapters, stub expanders).
    #[must_use]
    pub fn with_parts(
        registry: Registry,
        client: Arc<MediaClient>,
        expander: Arc<dyn LinkExpander>,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            client,
            expander,
        }
    }

    /// Resolve pasted share text.
    pub async fn resolve_share_text(&self, text: &str, ctx: &CallContext) -> Result<Resolution> {
        self.share_text_pipeline(text, None, ctx).await
    }

    /// Resolve share text the caller claims belongs to `expected`.
    ///
    /// A link owned by another platform fails with `InvalidInput` at the
    /// match stage before any fetch.
    pub async fn resolve_share_text_as(
        &self,
        text: &str,
        expected: Platform,
        ctx: &CallContext,
    ) -> Result<Resolution> {
        self.share_text_pipeline(text, Some(expected), ctx).await
    }

    /// Resolve a platform wire name plus native id.
    pub async fn resolve_by_id(
        &self,
        platform: &str,
        id: &str,
        ctx: &CallContext,
    ) -> Result<Resolution> {
        let platform = platform.parse::<Platform>().at(Stage::Match)?;
        self.resolve_platform_id(platform, id, ctx).await
    }

    /// Resolve a native id on a known platform. No URL work is done.
    #[instrument(skip(self, platform, ctx), fields(platform = %platform))]
    pub async fn resolve_platform_id(
        &self,
        platform: Platform,
        id: &str,
        ctx: &CallContext,
    ) -> Result<Resolution> {
        let id = id.trim();
        if id.is_empty() {
            return Err(ResolveError::new(
                Stage::Input,
                MediaError::InvalidInput("video id is empty".to_string()),
            ));
        }

        let adapter = self.adapter(platform)?;
        let media = run_pipeline(adapter.as_ref(), id, &self.client, ctx)
            .await
            .inspect_err(|e| warn!(platform = %platform, id, "Resolution failed: {e}"))?;

        info!(platform = %platform, id, "Resolved by id");
        Ok(Resolution {
            platform,
            native_id: id.to_string(),
            canonical_url: None,
            media,
        })
    }

    #[instrument(skip(self, text, expected, ctx), fields(expected = ?expected))]
    async fn share_text_pipeline(
        &self,
        text: &str,
        expected: Option<Platform>,
        ctx: &CallContext,
    ) -> Result<Resolution> {
        let result = self.share_text_steps(text, expected, ctx).await;
        match &result {
            Ok(resolution) => info!(
                platform = %resolution.platform,
                id = %resolution.native_id,
                "Resolved share text"
            ),
            Err(e) => warn!(kind = %e.kind(), "Share text resolution failed: {e}"),
        }
        result
    }

    async fn share_text_steps(
        &self,
        text: &str,
        expected: Option<Platform>,
        ctx: &CallContext,
    ) -> Result<Resolution> {
        if text.trim().is_empty() {
            return Err(ResolveError::new(
                Stage::Input,
                MediaError::InvalidInput("share text is empty".to_string()),
            ));
        }

        let mut url = matcher::extract_candidate(text).at(Stage::Match)?;

        if matcher::is_short_link(&url) {
            url = self.expander.expand(&url, ctx).await.at(Stage::Redirect)?;
        }

        let platform = matcher::match_url(&url).at(Stage::Match)?;
        if let Some(expected) = expected {
            if expected != platform {
                return Err(ResolveError::new(
                    Stage::Match,
                    MediaError::InvalidInput(format!(
                        "link belongs to {platform}, not {expected}"
                    )),
                ));
            }
        }

        let adapter = self.adapter(platform)?;
        let id = adapter.extract_id(&url).at(Stage::Extract)?;
        let media = run_pipeline(adapter.as_ref(), &id, &self.client, ctx).await?;

        Ok(Resolution {
            platform,
            native_id: id,
            canonical_url: Some(url),
            media,
        })
    }

    fn adapter(&self, platform: Platform) -> Result<&Arc<dyn PlatformAdapter>> {
        self.registry.get(platform).ok_or_else(|| {
            ResolveError::new(
                Stage::Match,
                MediaError::UnsupportedSource(format!("no adapter registered for {platform}")),
            )
        })
    }
}

/// Fetch, parse and normalize one native id.
async fn run_pipeline(
    adapter: &dyn PlatformAdapter,
    id: &str,
    client: &MediaClient,
    ctx: &CallContext,
) -> Result<ResolvedMedia> {
    let raw = adapter.fetch(id, client, ctx).await.at(Stage::Fetch)?;
    let record = adapter.parse(id, raw).at(Stage::Parse)?;
    normalize(record).at(Stage::Normalize)
}
