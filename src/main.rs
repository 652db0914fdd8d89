//! `vidparse` CLI - Resolve short-video share links from the terminal

mod cmd;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use vidparse::{AuditLog, CallContext, Config, MediaClient, Resolver};

use cmd::logs::LogFilters;
use cmd::App;

#[derive(Parser)]
#[command(name = "vidparse")]
#[command(about = "Resolve short-video share links into watermark-free media URLs")]
#[command(version)]
struct Cli {
    /// Deadline for the whole resolution, in seconds
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    /// Audit log database path
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Do not record this run in the audit log
    #[arg(long, global = true)]
    no_audit: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve pasted share text (or a bare link)
    Parse {
        /// Share text copied from the app
        text: String,

        /// Platform the link is expected to belong to
        #[arg(short, long)]
        source: Option<String>,
    },

    /// Resolve a native video id on a given platform
    Id {
        /// Platform wire name (douyin, kuaishou, pipixia, weibo, redbook, bilibili)
        source: String,

        /// Platform-native video id
        video_id: String,
    },

    /// Query the audit log, newest first
    Logs {
        /// Earliest timestamp (unix seconds or RFC 3339)
        #[arg(long, value_parser = parse_time)]
        start: Option<DateTime<Utc>>,

        /// Latest timestamp (unix seconds or RFC 3339)
        #[arg(long, value_parser = parse_time)]
        end: Option<DateTime<Utc>>,

        /// Platform wire name
        #[arg(long)]
        source: Option<String>,

        /// Endpoint name (/video/share/url/parse, /video/id/parse)
        #[arg(long)]
        endpoint: Option<String>,

        /// Substring of the share text or video id
        #[arg(long)]
        contains: Option<String>,

        /// Client IP
        #[arg(long)]
        client_ip: Option<String>,

        /// Page size (1-200, 0 for the default of 50)
        #[arg(long, default_value = "50", allow_hyphen_values = true)]
        limit: i64,

        /// Rows to skip
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        offset: i64,
    },

    /// List supported platforms in matching order
    Platforms,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(timeout) = cli.timeout {
        config.timeout_secs = timeout;
    }
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    if cli.no_audit {
        config.audit = false;
    }

    // Logs go to stderr so stdout stays machine-readable
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    match cli.command {
        Commands::Parse { text, source } => {
            let app = build_app(&config)?;
            cmd::parse::cmd_parse(&app, &text, source.as_deref()).await
        }
        Commands::Id { source, video_id } => {
            let app = build_app(&config)?;
            cmd::parse::cmd_id(&app, &source, &video_id).await
        }
        Commands::Logs {
            start,
            end,
            source,
            endpoint,
            contains,
            client_ip,
            limit,
            offset,
        } => {
            let filters = LogFilters {
                start,
                end,
                source,
                endpoint,
                contains,
                client_ip,
                limit,
                offset,
            };
            cmd::logs::cmd_logs(&config.db_path, filters)
        }
        Commands::Platforms => {
            cmd::platforms::cmd_platforms();
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_app(config: &Config) -> Result<App> {
    let client = MediaClient::with_timeouts(config.timeout(), config.connect_timeout())?;

    let audit = if config.audit {
        match AuditLog::open(&config.db_path) {
            Ok(log) => Some(log),
            Err(e) => {
                tracing::warn!("Audit log disabled: {e:#}");
                None
            }
        }
    } else {
        None
    };

    let interrupt = CancellationToken::new();
    let ctx = CallContext::with_timeout(config.timeout()).with_cancellation(interrupt.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling resolution");
            interrupt.cancel();
        }
    });

    Ok(App {
        resolver: Resolver::new(client),
        audit,
        ctx,
    })
}

/// Unix seconds or RFC 3339.
fn parse_time(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    let s = s.trim();
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
        let secs: i64 = s.parse().map_err(|e| format!("invalid unix time {s}: {e}"))?;
        return Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| format!("unix time out of range: {s}"));
    }
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected unix seconds or RFC 3339, got {s}: {e}"))
}
