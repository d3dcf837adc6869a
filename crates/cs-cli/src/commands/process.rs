//! Process command for drafting a week of time entries.

use std::fmt::Write as _;
use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use chrono::NaiveDate;
use cs_core::{CalendarEvent, LearnedAssociations, MappingEngine, UserId, WeekQuery, WeekReport};
use cs_db::Database;
use serde::Serialize;

use super::util::events_in_week;

#[derive(Debug, Serialize)]
pub struct WeekRun {
    pub week_start: NaiveDate,
    #[serde(flatten)]
    pub report: WeekReport,
    /// The week's events, kept for learning after submission.
    #[serde(skip)]
    pub events: Vec<CalendarEvent>,
}

/// Matches the week's events and drafts entries for the matched ones.
///
/// Learned associations are left untouched; they grow only when entries
/// are submitted.
pub fn process_week(
    db: &Database,
    user: &UserId,
    events: &[CalendarEvent],
    week_start: NaiveDate,
    show_all_events: bool,
    cache_ttl: Duration,
) -> WeekRun {
    let week_events = events_in_week(events, week_start);
    let mut scratch = LearnedAssociations::new();

    let mut engine = MappingEngine::with_cache_ttl(cache_ttl);
    let query = WeekQuery {
        user: user.clone(),
        week_start,
        show_all_events,
    };
    let report = engine.process_events_for_week(db, db, &mut scratch, &week_events, &query);

    WeekRun {
        week_start,
        report,
        events: week_events,
    }
}

pub fn format_week(run: &WeekRun) -> String {
    let report = &run.report;
    let mut output = String::new();
    let _ = writeln!(
        output,
        "Week of {}: {} events, {} mapped, {} unmapped",
        run.week_start, report.total_events, report.mapped_events, report.unmapped_events
    );

    if !report.timesheet_entries.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "TIMESHEET ENTRIES");
        for entry in &report.timesheet_entries {
            let _ = writeln!(
                output,
                "{}  {:>4.1}h  {} / {}  {}",
                entry.spent_date, entry.hours, entry.project_name, entry.task_name, entry.event_summary
            );
        }
        let _ = writeln!(output, "Total: {:.1}h", report.total_hours());
    }

    if !report.unmapped_events_details.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "UNMAPPED");
        for unmapped in &report.unmapped_events_details {
            let _ = write!(
                output,
                "- {} ({})",
                unmapped.event.summary,
                unmapped.event.start_date()
            );
            if let Some(company) = unmapped.analysis.best_company() {
                let _ = write!(output, " [company: {}]", company.name);
            }
            output.push('\n');
        }
    }

    write_list(&mut output, "Warnings", &report.warnings);
    write_list(&mut output, "Errors", &report.errors);
    output
}

pub(crate) fn write_list(output: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(output);
    let _ = writeln!(output, "{title}:");
    for item in items {
        let _ = writeln!(output, "- {item}");
    }
}

pub fn run<W: Write>(writer: &mut W, run: &WeekRun, json: bool) -> Result<()> {
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(run)?)?;
    } else {
        write!(writer, "{}", format_week(run))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use cs_core::TimesheetTarget;
    use cs_core::store::RuleStore;
    use insta::assert_snapshot;

    use super::*;

    fn events() -> Vec<CalendarEvent> {
        serde_json::from_str(
            r#"[
                {"id": "e1", "summary": "DP standup", "start": "2025-06-30T09:00:00+02:00",
                 "end": "2025-06-30T09:20:00+02:00", "duration": 0.3333333333,
                 "extracted_label": "DP", "attendance_status": "accepted"},
                {"id": "e2", "summary": "Finshape roadmap", "start": "2025-07-01T14:00:00+02:00",
                 "end": "2025-07-01T15:30:00+02:00", "duration": 1.5,
                 "attendance_status": "accepted"},
                {"id": "e3", "summary": "Lunch", "start": "2025-07-02T12:00:00+02:00",
                 "end": "2025-07-02T13:00:00+02:00", "duration": 1.0},
                {"id": "e4", "summary": "DP retro", "start": "2025-07-07T09:00:00+02:00",
                 "end": "2025-07-07T10:00:00+02:00", "duration": 1.0, "extracted_label": "DP"}
            ]"#,
        )
        .unwrap()
    }

    fn setup() -> (Database, UserId) {
        let mut db = Database::open_in_memory().unwrap();
        let user = UserId::new("jana").unwrap();
        db.upsert_rule(
            &user,
            "DP",
            &TimesheetTarget {
                project_id: 1,
                project_name: "Direct People".to_string(),
                task_id: 10,
                task_name: "Meetings".to_string(),
            },
        )
        .unwrap();
        (db, user)
    }

    #[test]
    fn process_drafts_matched_events_of_the_week() {
        let (db, user) = setup();
        let monday = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();

        let run = process_week(&db, &user, &events(), monday, false, Duration::ZERO);

        assert_snapshot!(format_week(&run), @r"
        Week of 2025-06-30: 3 events, 1 mapped, 2 unmapped

        TIMESHEET ENTRIES
        2025-06-30   0.5h  Direct People / Meetings  DP standup
        Total: 0.5h

        UNMAPPED
        - Finshape roadmap (2025-07-01) [company: finshape]
        - Lunch (2025-07-02)

        Warnings:
        - No mapping found for event: 'Finshape roadmap'
        - No mapping found for event: 'Lunch'
        ");
    }

    #[test]
    fn repeated_previews_learn_nothing() {
        let (db, user) = setup();
        let monday = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();

        for _ in 0..3 {
            let run = process_week(&db, &user, &events(), monday, false, Duration::ZERO);
            assert_eq!(run.report.mapped_events, 1);
        }

        assert!(db.learned_associations(&user).unwrap().is_empty());
    }

    #[test]
    fn json_output_flattens_report() {
        let (db, user) = setup();
        let monday = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        let run = process_week(&db, &user, &events(), monday, false, Duration::ZERO);

        let mut output = Vec::new();
        super::run(&mut output, &run, true).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(value["week_start"], "2025-06-30");
        assert_eq!(value["mapped_events"], 1);
        assert_eq!(value["timesheet_entries"][0]["hours"], 0.5);
        assert!(db.active_rules(&user).unwrap().len() == 1);
    }
}
