use std::process::ExitCode;

use anyhow::Result;

use vidparse::audit::{ENDPOINT_SHARE_URL, ENDPOINT_VIDEO_ID};
use vidparse::response::MSG_RESOLVED;
use vidparse::{
    ApiResponse, AuditEntry, AuditInput, Platform, ResolveError, Resolution, Stage, VERSION,
};

use super::output::print_json;
use super::App;

/// Resolve share text, optionally checking it against a declared platform.
pub async fn cmd_parse(app: &App, text: &str, source: Option<&str>) -> Result<ExitCode> {
    let declared = source
        .map(|s| s.parse::<Platform>())
        .transpose()
        .map_err(|e| ResolveError::new(Stage::Match, e));

    let result = match declared {
        Ok(Some(platform)) => {
            app.resolver
                .resolve_share_text_as(text, platform, &app.ctx)
                .await
        }
        Ok(None) => app.resolver.resolve_share_text(text, &app.ctx).await,
        Err(e) => Err(e),
    };

    let entry = AuditEntry {
        endpoint: ENDPOINT_SHARE_URL.to_string(),
        source: recorded_source(&result, source),
        input: AuditInput {
            share_url: Some(text.to_string()),
            video_id: None,
        },
        ..AuditEntry::default()
    };
    finish(app, entry, result)
}

/// Resolve a native id on a named platform.
pub async fn cmd_id(app: &App, source: &str, video_id: &str) -> Result<ExitCode> {
    let result = app.resolver.resolve_by_id(source, video_id, &app.ctx).await;

    let entry = AuditEntry {
        endpoint: ENDPOINT_VIDEO_ID.to_string(),
        source: Some(source.to_string()),
        input: AuditInput {
            share_url: None,
            video_id: Some(video_id.to_string()),
        },
        ..AuditEntry::default()
    };
    finish(app, entry, result)
}

/// Platform for the audit row: the resolved one, else whatever the caller declared.
fn recorded_source(result: &Result<Resolution, ResolveError>, declared: Option<&str>) -> Option<String> {
    match result {
        Ok(resolution) => Some(resolution.platform.to_string()),
        Err(_) => declared.map(str::to_string),
    }
}

/// Record the attempt, print the envelope, and pick the exit code.
fn finish(
    app: &App,
    mut entry: AuditEntry,
    result: Result<Resolution, ResolveError>,
) -> Result<ExitCode> {
    entry.user_agent = Some(format!("vidparse/{VERSION}"));

    let (response, code) = match result {
        Ok(resolution) => {
            entry.result = Some(resolution.media.clone());
            (ApiResponse::success(MSG_RESOLVED, resolution.media), ExitCode::SUCCESS)
        }
        Err(e) => {
            entry.error = Some(e.to_string());
            (ApiResponse::failure(&e), ExitCode::FAILURE)
        }
    };

    if let Some(log) = &app.audit {
        if let Err(e) = log.append(&entry) {
            tracing::warn!("Failed to record audit entry: {e:#}");
        }
    }

    print_json(&response)?;
    Ok(code)
}
