//! `vidparse` - Watermark-free media metadata from short-video share links
//!
//! # Features
//!
//! - **Share-text matching**: Pull the link out of pasted app share text and
//!   pick the owning platform from an ordered signature list
//! - **Short-link expansion**: Bounded manual redirect following
//! - **Platform adapters**: Douyin, Kuaishou, Pipixia, Weibo, Xiaohongshu, Bilibili
//! - **Mobile fingerprints**: Per-platform spoofed client identity
//! - **Audit log**: Optional `SQLite` record of every resolution attempt
//!
//! # Example
//!
//! ```rust,no_run
//! use vidparse::{CallContext, MediaClient, Resolver};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let resolver = Resolver::new(MediaClient::new()?);
//!     let ctx = CallContext::with_timeout(std::time::Duration::from_secs(30));
//!
//!     let res = resolver
//!         .resolve_share_text("复制打开抖音 https://v.douyin.com/iRNBho6u/", &ctx)
//!         .await?;
//!     println!("{}: {:?}", res.platform, res.media.video_url);
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod http_client;
pub mod matcher;
pub mod media;
pub mod platform;
pub mod redirect;
pub mod resolver;
pub mod response;

pub use audit::{AuditEntry, AuditInput, AuditLog, AuditRecord, QueryOptions};
pub use config::Config;
pub use error::{ErrorKind, MediaError, ResolveError, Stage};
pub use fingerprint::{android_chrome_identity, ios_safari_identity, random_mobile_identity, ClientIdentity};
pub use http_client::{CallContext, MediaClient};
pub use matcher::{match_share_text, Match};
pub use media::{normalize, Author, ProvisionalRecord, ResolvedMedia};
pub use platform::{Platform, PlatformAdapter, RawMetadata, Registry};
pub use redirect::{LinkExpander, RedirectResolver, MAX_REDIRECTS};
pub use resolver::{Resolution, Resolver};
pub use response::ApiResponse;

/// Version of vidparse
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
