//! History command for inspecting and resetting submission records.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use cs_core::UserId;
use cs_core::store::{ProcessingRecord, ProcessingStatus};
use cs_db::Database;

pub fn format_history(week_start: NaiveDate, records: &[ProcessingRecord]) -> String {
    let mut output = String::new();
    if records.is_empty() {
        let _ = writeln!(output, "Nothing submitted for the week of {week_start}.");
        return output;
    }
    let _ = writeln!(output, "SUBMISSIONS (week of {week_start})");
    for record in records {
        let entry = record
            .harvest_time_entry_id
            .map_or_else(|| "-".to_string(), |id| format!("#{id}"));
        let _ = writeln!(
            output,
            "{:<7}  {:>5.2}h  {:<8}  {}",
            record.status.as_str(),
            record.hours,
            entry,
            record.calendar_event_summary
        );
        if record.status == ProcessingStatus::Error {
            if let Some(message) = &record.error_message {
                let _ = writeln!(output, "         {message}");
            }
        }
    }
    output
}

pub fn list<W: Write>(
    writer: &mut W,
    db: &Database,
    user: &UserId,
    week_start: NaiveDate,
    json: bool,
) -> Result<()> {
    let records = db
        .processing_history(user, week_start)
        .context("failed to load processing history")?;
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&records)?)?;
    } else {
        write!(writer, "{}", format_history(week_start, &records))?;
    }
    Ok(())
}

/// Forgets the week's records so its events are drafted again.
pub fn clear<W: Write>(
    writer: &mut W,
    db: &mut Database,
    user: &UserId,
    week_start: NaiveDate,
) -> Result<()> {
    let removed = db
        .clear_week(user, week_start)
        .context("failed to clear processing history")?;
    tracing::info!(%week_start, removed, "cleared processing history");
    writeln!(
        writer,
        "Cleared {removed} records for the week of {week_start}"
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use cs_core::EventId;
    use cs_core::store::ProcessingLog;
    use insta::assert_snapshot;

    use super::*;

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()
    }

    fn record(
        event: &str,
        summary: &str,
        entry: Option<i64>,
        status: ProcessingStatus,
        error: Option<&str>,
    ) -> ProcessingRecord {
        ProcessingRecord {
            user_id: UserId::new("jana").unwrap(),
            week_start: monday(),
            calendar_event_id: EventId::new(event).unwrap(),
            calendar_event_summary: summary.to_string(),
            harvest_time_entry_id: entry,
            project_id: 1,
            task_id: 10,
            hours: 0.5,
            status,
            error_message: error.map(str::to_string),
            processed_at: Utc.with_ymd_and_hms(2025, 7, 4, 16, 0, 0).unwrap(),
        }
    }

    #[test]
    fn history_lists_outcomes() {
        let mut db = Database::open_in_memory().unwrap();
        let user = UserId::new("jana").unwrap();
        db.record(&record("e1", "DP standup", Some(501), ProcessingStatus::Success, None))
            .unwrap();
        db.record(&record(
            "e2",
            "Grada review",
            None,
            ProcessingStatus::Error,
            Some("Project is archived"),
        ))
        .unwrap();

        let mut output = Vec::new();
        list(&mut output, &db, &user, monday(), false).unwrap();
        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        SUBMISSIONS (week of 2025-06-30)
        success   0.50h  #501      DP standup
        error     0.50h  -         Grada review
                 Project is archived
        ");
    }

    #[test]
    fn clear_forgets_the_week() {
        let mut db = Database::open_in_memory().unwrap();
        let user = UserId::new("jana").unwrap();
        db.record(&record("e1", "DP standup", Some(501), ProcessingStatus::Success, None))
            .unwrap();

        let mut output = Vec::new();
        clear(&mut output, &mut db, &user, monday()).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "Cleared 1 records for the week of 2025-06-30\n"
        );
        assert!(db.processed_event_ids(&user, monday()).unwrap().is_empty());
    }
}
