//! Append-only audit log of resolution attempts, backed by SQLite.
//!
//! One row per attempt. The resolved media is flattened into columns so rows
//! stay greppable with the `sqlite3` shell; gallery images are stored as a
//! JSON array.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::Serialize;

use crate::media::{Author, ResolvedMedia};

/// Endpoint name for share-text resolutions.
pub const ENDPOINT_SHARE_URL: &str = "/video/share/url/parse";
/// Endpoint name for `(platform, id)` resolutions.
pub const ENDPOINT_VIDEO_ID: &str = "/video/id/parse";

pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 200;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ts TEXT NOT NULL,
    endpoint TEXT,
    source TEXT,
    share_url TEXT,
    video_id TEXT,
    client_ip TEXT,
    user_agent TEXT,
    title TEXT,
    video_url TEXT,
    music_url TEXT,
    cover_url TEXT,
    images_json TEXT,
    author_uid TEXT,
    author_name TEXT,
    author_avatar TEXT,
    error TEXT
);
CREATE INDEX IF NOT EXISTS idx_records_ts ON records(ts);
CREATE INDEX IF NOT EXISTS idx_records_source ON records(source);
CREATE INDEX IF NOT EXISTS idx_records_endpoint ON records(endpoint);
CREATE INDEX IF NOT EXISTS idx_records_client_ip ON records(client_ip);
";

const SELECT_COLUMNS: &str = "id, ts, endpoint, source, share_url, video_id, client_ip, user_agent, \
     title, video_url, music_url, cover_url, images_json, author_uid, author_name, author_avatar, error";

/// Original caller input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
}

/// Entry to append.
#[derive(Debug, Clone, Default)]
pub struct AuditEntry {
    pub endpoint: String,
    pub source: Option<String>,
    pub input: AuditInput,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub result: Option<ResolvedMedia>,
    pub error: Option<String>,
}

/// Stored row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    pub id: i64,
    pub ts: String,
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub input: AuditInput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResolvedMedia>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Filters for [`AuditLog::query`]. Unset filters match everything.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub source: Option<String>,
    pub endpoint: Option<String>,
    /// Substring of the share URL or video id.
    pub contains: Option<String>,
    pub client_ip: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl QueryOptions {
    /// Page size: non-positive means the default, anything above the cap is capped.
    #[must_use]
    pub fn effective_limit(&self) -> i64 {
        if self.limit <= 0 {
            DEFAULT_LIMIT
        } else {
            self.limit.min(MAX_LIMIT)
        }
    }

    #[must_use]
    pub fn effective_offset(&self) -> i64 {
        self.offset.max(0)
    }
}

/// SQLite audit log.
///
/// The connection sits behind a mutex; appends are short single-row inserts.
pub struct AuditLog {
    conn: Mutex<Connection>,
}

impl AuditLog {
    /// Open (or create) the log at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open audit log {}", path.display()))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(journal_mode = %mode, "Opened audit log {}", path.display());
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        Self::init(conn)
    }

    /// In-memory log (tests, `--no-audit` dry runs).
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("Failed to create audit schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Append an entry stamped with the current time.
    pub fn append(&self, entry: &AuditEntry) -> Result<i64> {
        self.append_at(entry, Utc::now())
    }

    /// Append an entry with an explicit timestamp.
    pub fn append_at(&self, entry: &AuditEntry, ts: DateTime<Utc>) -> Result<i64> {
        let media = entry.result.as_ref();
        let images_json = match media {
            Some(m) if !m.images.is_empty() => Some(serde_json::to_string(&m.images)?),
            _ => None,
        };
        let author = media.map(|m| &m.author);
        let error = entry
            .error
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty());

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO records (
                ts, endpoint, source, share_url, video_id, client_ip, user_agent,
                title, video_url, music_url, cover_url, images_json,
                author_uid, author_name, author_avatar, error
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                format_ts(ts),
                entry.endpoint,
                entry.source,
                entry.input.share_url,
                entry.input.video_id,
                entry.client_ip,
                entry.user_agent,
                media.map(|m| m.title.as_str()),
                media.and_then(|m| m.video_url.as_deref()),
                media.and_then(|m| m.music_url.as_deref()),
                media.and_then(|m| m.cover_url.as_deref()),
                images_json,
                author.and_then(|a| a.uid.as_deref()),
                author.and_then(|a| a.name.as_deref()),
                author.and_then(|a| a.avatar.as_deref()),
                error,
            ],
        )
        .context("Failed to append audit record")?;

        Ok(conn.last_insert_rowid())
    }

    /// Filtered page of records, newest first.
    pub fn query(&self, options: &QueryOptions) -> Result<Vec<AuditRecord>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<SqlValue> = Vec::new();

        if let Some(start) = options.start {
            clauses.push("ts >= ?");
            args.push(SqlValue::Text(format_ts(start)));
        }
        if let Some(end) = options.end {
            clauses.push("ts <= ?");
            args.push(SqlValue::Text(format_ts(end)));
        }
        let exact = [
            ("source = ?", &options.source),
            ("endpoint = ?", &options.endpoint),
            ("client_ip = ?", &options.client_ip),
        ];
        for (clause, value) in exact {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                clauses.push(clause);
                args.push(SqlValue::Text(value.to_string()));
            }
        }
        if let Some(needle) = options.contains.as_deref().filter(|v| !v.is_empty()) {
            clauses.push("(share_url LIKE ? OR video_id LIKE ?)");
            let pattern = format!("%{needle}%");
            args.push(SqlValue::Text(pattern.clone()));
            args.push(SqlValue::Text(pattern));
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM records {where_clause} ORDER BY id DESC LIMIT ? OFFSET ?"
        );
        args.push(SqlValue::Integer(options.effective_limit()));
        args.push(SqlValue::Integer(options.effective_offset()));

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql).context("Failed to prepare audit query")?;
        let rows = stmt.query_map(params_from_iter(args), record_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read audit records")
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("audit log connection poisoned"))
    }
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<AuditRecord> {
    let title: Option<String> = row.get("title")?;
    let video_url: Option<String> = row.get("video_url")?;
    let music_url: Option<String> = row.get("music_url")?;
    let cover_url: Option<String> = row.get("cover_url")?;
    let images_json: Option<String> = row.get("images_json")?;
    let author = Author {
        uid: row.get("author_uid")?,
        name: row.get("author_name")?,
        avatar: row.get("author_avatar")?,
    };

    let images: Vec<String> = images_json
        .as_deref()
        .and_then(|json| serde_json::from_str(json).ok())
        .unwrap_or_default();

    let has_result = title.is_some()
        || video_url.is_some()
        || cover_url.is_some()
        || !images.is_empty()
        || !author.is_empty();
    let result = has_result.then(|| ResolvedMedia {
        title: title.unwrap_or_default(),
        video_url,
        music_url,
        cover_url,
        images,
        author,
    });

    Ok(AuditRecord {
        id: row.get("id")?,
        ts: row.get("ts")?,
        endpoint: row.get::<_, Option<String>>("endpoint")?.unwrap_or_default(),
        source: row.get("source")?,
        input: AuditInput {
            share_url: row.get("share_url")?,
            video_id: row.get("video_id")?,
        },
        client_ip: row.get("client_ip")?,
        user_agent: row.get("user_agent")?,
        result,
        error: row.get("error")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn share_entry(share_url: &str) -> AuditEntry {
        AuditEntry {
            endpoint: ENDPOINT_SHARE_URL.to_string(),
            source: Some("douyin".to_string()),
            input: AuditInput {
                share_url: Some(share_url.to_string()),
                video_id: None,
            },
            user_agent: Some("vidparse-test".to_string()),
            ..AuditEntry::default()
        }
    }

    fn sample_media() -> ResolvedMedia {
        ResolvedMedia {
            title: "晚霞".to_string(),
            video_url: Some("https://cdn.example/v.mp4".to_string()),
            music_url: None,
            cover_url: Some("https://cdn.example/c.jpg".to_string()),
            images: vec!["https://cdn.example/1.jpg".into(), "https://cdn.example/2.jpg".into()],
            author: Author {
                uid: Some("u1".into()),
                name: Some("作者".into()),
                avatar: None,
            },
        }
    }

    #[test]
    fn success_entry_round_trips_media() {
        let log = AuditLog::open_in_memory().unwrap();
        let entry = AuditEntry {
            result: Some(sample_media()),
            ..share_entry("https://v.douyin.com/abc/")
        };
        log.append(&entry).unwrap();

        let records = log.query(&QueryOptions::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].result.as_ref(), Some(&sample_media()));
        assert_eq!(records[0].error, None);
        assert!(records[0].ts.ends_with('Z'));
    }

    #[test]
    fn gallery_record_found_by_share_url_substring() {
        let log = AuditLog::open_in_memory().unwrap();
        let ts = Utc.with_ymd_and_hms(2024, 5, 4, 3, 2, 1).unwrap();
        log.append_at(&share_entry("https://v.douyin.com/other/"), ts)
            .unwrap();
        let id = log
            .append_at(
                &AuditEntry {
                    client_ip: Some("192.168.1.20".into()),
                    result: Some(sample_media()),
                    ..share_entry("https://v.douyin.com/iRNBho6u/")
                },
                ts,
            )
            .unwrap();

        let found = log
            .query(&QueryOptions {
                contains: Some("iRNBho".into()),
                ..QueryOptions::default()
            })
            .unwrap();

        assert_eq!(
            found,
            vec![AuditRecord {
                id,
                ts: "2024-05-04T03:02:01Z".to_string(),
                endpoint: ENDPOINT_SHARE_URL.to_string(),
                source: Some("douyin".to_string()),
                input: AuditInput {
                    share_url: Some("https://v.douyin.com/iRNBho6u/".to_string()),
                    video_id: None,
                },
                client_ip: Some("192.168.1.20".to_string()),
                user_agent: Some("vidparse-test".to_string()),
                result: Some(sample_media()),
                error: None,
            }]
        );
        assert_eq!(found[0].result.as_ref().unwrap().images.len(), 2);
    }

    #[test]
    fn failure_entry_has_no_result() {
        let log = AuditLog::open_in_memory().unwrap();
        let entry = AuditEntry {
            error: Some("  fetch: rate limited by douyin \n".into()),
            ..share_entry("https://v.douyin.com/abc/")
        };
        log.append(&entry).unwrap();

        let record = &log.query(&QueryOptions::default()).unwrap()[0];
        assert_eq!(record.result, None);
        assert_eq!(record.error.as_deref(), Some("fetch: rate limited by douyin"));
    }

    #[test]
    fn pagination_clamps_limit_and_offset() {
        let log = AuditLog::open_in_memory().unwrap();
        for i in 0..250 {
            log.append(&share_entry(&format!("https://v.douyin.com/{i}/"))).unwrap();
        }

        let page = |limit, offset| {
            log.query(&QueryOptions {
                limit,
                offset,
                ..QueryOptions::default()
            })
            .unwrap()
        };
        assert_eq!(page(0, 0).len(), 50);
        assert_eq!(page(500, 0).len(), 200);
        assert_eq!(page(10, -5), page(10, 0));

        let newest = page(1, 0);
        assert_eq!(newest[0].input.share_url.as_deref(), Some("https://v.douyin.com/249/"));
    }

    #[test]
    fn filters_combine() {
        let log = AuditLog::open_in_memory().unwrap();
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        log.append_at(&share_entry("https://v.douyin.com/old/"), early).unwrap();
        log.append_at(&share_entry("https://v.douyin.com/new/"), late).unwrap();
        log.append_at(
            &AuditEntry {
                endpoint: ENDPOINT_VIDEO_ID.to_string(),
                source: Some("bilibili".into()),
                input: AuditInput {
                    share_url: None,
                    video_id: Some("BV1xx411c7mD".into()),
                },
                client_ip: Some("10.0.0.7".into()),
                ..AuditEntry::default()
            },
            late,
        )
        .unwrap();

        let since_march = log
            .query(&QueryOptions {
                start: Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()),
                ..QueryOptions::default()
            })
            .unwrap();
        assert_eq!(since_march.len(), 2);

        let by_source = log
            .query(&QueryOptions {
                source: Some("bilibili".into()),
                ..QueryOptions::default()
            })
            .unwrap();
        assert_eq!(by_source.len(), 1);
        assert_eq!(by_source[0].endpoint, ENDPOINT_VIDEO_ID);
        assert_eq!(by_source[0].client_ip.as_deref(), Some("10.0.0.7"));

        let contains_id = log
            .query(&QueryOptions {
                contains: Some("411c7".into()),
                ..QueryOptions::default()
            })
            .unwrap();
        assert_eq!(contains_id.len(), 1);

        let douyin_before_march = log
            .query(&QueryOptions {
                endpoint: Some(ENDPOINT_SHARE_URL.into()),
                end: Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()),
                ..QueryOptions::default()
            })
            .unwrap();
        assert_eq!(douyin_before_march.len(), 1);
        assert_eq!(
            douyin_before_march[0].input.share_url.as_deref(),
            Some("https://v.douyin.com/old/")
        );
    }

    #[test]
    fn file_backed_log_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("parse.db");

        {
            let log = AuditLog::open(&path).unwrap();
            log.append(&share_entry("https://b23.tv/x")).unwrap();
        }

        let log = AuditLog::open(&path).unwrap();
        let records = log.query(&QueryOptions::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].input.share_url.as_deref(), Some("https://b23.tv/x"));
    }
}
