use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use chrono::{DateTime, Utc};

use vidparse::{ApiResponse, AuditLog, AuditRecord, QueryOptions};

use super::output::print_json;

pub struct LogFilters {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub source: Option<String>,
    pub endpoint: Option<String>,
    pub contains: Option<String>,
    pub client_ip: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

/// Print a page of audit records as `{code, msg, data}`.
pub fn cmd_logs(db_path: &Path, filters: LogFilters) -> Result<ExitCode> {
    let options = QueryOptions {
        start: filters.start,
        end: filters.end,
        source: filters.source,
        endpoint: filters.endpoint,
        contains: filters.contains,
        client_ip: filters.client_ip,
        limit: filters.limit,
        offset: filters.offset,
    };

    let records = AuditLog::open(db_path).and_then(|log| log.query(&options));

    match records {
        Ok(records) => {
            print_json(&ApiResponse::<Vec<AuditRecord>>::success("ok", records))?;
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            print_json(&ApiResponse::<Vec<AuditRecord>>::message(format!("{e:#}")))?;
            Ok(ExitCode::FAILURE)
        }
    }
}
