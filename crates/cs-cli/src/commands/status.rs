//! Status command for showing rule counts and submission history.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use cs_core::store::{PatternRuleStore, RuleStore};
use cs_core::UserId;
use cs_db::{Database, ProcessingSummary};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Status {
    pub user_id: String,
    pub active_rules: usize,
    pub recurring_overrides: usize,
    pub pattern_rules: usize,
    pub total_processed: u64,
    pub failed: u64,
    pub last_processed_at: Option<DateTime<Utc>>,
}

pub fn collect(db: &Database, user: &UserId) -> Result<Status> {
    let ProcessingSummary {
        total_processed,
        failed,
        last_processed_at,
    } = db.processing_summary(user)?;
    Ok(Status {
        user_id: user.to_string(),
        active_rules: db.active_rules(user)?.len(),
        recurring_overrides: db.list_recurring_overrides(user)?.len(),
        pattern_rules: db
            .pattern_rules(user)?
            .iter()
            .filter(|rule| rule.active)
            .count(),
        total_processed,
        failed,
        last_processed_at,
    })
}

pub fn format_status(status: &Status, database_path: &Path) -> String {
    let last = status
        .last_processed_at
        .map_or_else(|| "never".to_string(), |at| at.format("%Y-%m-%d %H:%M UTC").to_string());
    format!(
        "Calendar sync status\n\
         Database: {}\n\
         User: {}\n\
         Label rules: {}\n\
         Recurring overrides: {}\n\
         Pattern rules: {}\n\
         Submitted events: {} ({} failed)\n\
         Last submission: {last}\n",
        database_path.display(),
        status.user_id,
        status.active_rules,
        status.recurring_overrides,
        status.pattern_rules,
        status.total_processed,
        status.failed,
    )
}

pub fn run<W: Write>(writer: &mut W, db: &Database, user: &UserId, database_path: &Path, json: bool) -> Result<()> {
    let status = collect(db, user)?;
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&status)?)?;
    } else {
        write!(writer, "{}", format_status(&status, database_path))?;
    }
    Ok(())
}
