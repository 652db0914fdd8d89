pub mod logs;
pub mod output;
pub mod parse;
pub mod platforms;

use vidparse::{AuditLog, CallContext, Resolver};

/// Everything a resolving subcommand needs for one run.
pub struct App {
    pub resolver: Resolver,
    /// `None` when auditing is disabled or the log could not be opened.
    pub audit: Option<AuditLog>,
    pub ctx: CallContext,
}
