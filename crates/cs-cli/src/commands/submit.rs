//! Submit command for creating the week's drafts in Harvest.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result};
use cs_core::store::TimesheetClient;
use cs_core::{
    PatternEngine, SubmitOptions, SubmitReport, UserId, learn_from_submission, submit_entries,
};
use cs_db::Database;
use serde::Serialize;

use super::process::{WeekRun, write_list};

#[derive(Debug, Serialize)]
pub struct SubmitRun<'a> {
    pub week: &'a WeekRun,
    pub options: SubmitOptions,
    pub submission: SubmitReport,
}

pub fn format_submission(run: &SubmitRun<'_>) -> String {
    let report = &run.submission;
    let mut output = String::new();
    if run.options.dry_run {
        let _ = writeln!(
            output,
            "Dry run: {} of {} entries would be submitted for the week of {}",
            report.successful, report.total_entries, run.week.week_start
        );
        for entry in &run.week.report.timesheet_entries {
            let _ = writeln!(
                output,
                "- {}  {:.1}h  {} / {}  {}",
                entry.spent_date, entry.hours, entry.project_name, entry.task_name, entry.event_summary
            );
        }
        return output;
    }

    let _ = writeln!(
        output,
        "Submitted {} of {} entries for the week of {} ({} skipped, {} failed)",
        report.successful, report.total_entries, run.week.week_start, report.skipped, report.failed
    );
    for created in &report.created {
        let _ = writeln!(
            output,
            "- {}  {:.1}h  {} / {}  {}  (#{})",
            created.spent_date,
            created.hours,
            created.project_name,
            created.task_name,
            created.event_summary,
            created.harvest_id
        );
    }
    write_list(&mut output, "Errors", &report.errors);
    output
}

/// Submits the drafts of an already processed week.
pub fn run<W, C>(
    writer: &mut W,
    client: &C,
    db: &mut Database,
    user: &UserId,
    week: &WeekRun,
    options: SubmitOptions,
    json: bool,
) -> Result<()>
where
    W: Write,
    C: TimesheetClient + ?Sized,
{
    let submission = submit_entries(
        client,
        db,
        user,
        week.week_start,
        &week.report.timesheet_entries,
        options,
    );
    if !submission.created.is_empty() {
        let mut learned = db
            .learned_associations(user)
            .context("failed to load learned associations")?;
        let count = learn_from_submission(
            &PatternEngine::new(),
            &mut learned,
            &week.events,
            &week.report.timesheet_entries,
            &submission,
        );
        db.save_learned_associations(user, &learned)
            .context("failed to save learned associations")?;
        tracing::debug!(count, "learned from submitted entries");
    }
    let run = SubmitRun {
        week,
        options,
        submission,
    };
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&run)?)?;
    } else {
        write!(writer, "{}", format_submission(&run))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::time::Duration;

    use chrono::NaiveDate;
    use cs_core::store::{ClientError, NewTimeEntry, TimeEntry};
    use cs_core::{CalendarEvent, RuleStore, TimesheetTarget};
    use insta::assert_snapshot;

    use super::super::process::process_week;
    use super::*;

    /// Accepts every entry except those for the rejected project.
    #[derive(Default)]
    struct FakeHarvest {
        created: RefCell<Vec<NewTimeEntry>>,
        reject_project: Option<i64>,
    }

    impl TimesheetClient for FakeHarvest {
        fn create_entry(&self, entry: &NewTimeEntry) -> Result<TimeEntry, ClientError> {
            if self.reject_project == Some(entry.project_id) {
                return Err(ClientError::Service {
                    message: "Harvest API error 422: Project is archived".to_string(),
                });
            }
            let mut created = self.created.borrow_mut();
            created.push(entry.clone());
            Ok(TimeEntry {
                id: 500 + i64::try_from(created.len()).unwrap(),
                spent_date: entry.spent_date,
                hours: entry.hours,
                notes: entry.notes.clone(),
                project_id: entry.project_id,
                task_id: entry.task_id,
            })
        }

        fn delete_entry(&self, _entry_id: i64) -> Result<bool, ClientError> {
            Ok(true)
        }

        fn entries_on(&self, _date: NaiveDate) -> Result<Vec<TimeEntry>, ClientError> {
            Ok(Vec::new())
        }
    }

    fn target(project_id: i64, name: &str) -> TimesheetTarget {
        TimesheetTarget {
            project_id,
            project_name: name.to_string(),
            task_id: 10,
            task_name: "Meetings".to_string(),
        }
    }

    fn setup() -> (Database, UserId, Vec<CalendarEvent>, WeekRun) {
        let mut db = Database::open_in_memory().unwrap();
        let user = UserId::new("jana").unwrap();
        db.upsert_rule(&user, "DP", &target(1, "Direct People")).unwrap();
        db.upsert_rule(&user, "Grada", &target(2, "Grada")).unwrap();
        let events: Vec<CalendarEvent> = serde_json::from_str(
            r#"[
                {"id": "e1", "summary": "DP standup", "start": "2025-06-30T09:00:00+02:00",
                 "end": "2025-06-30T09:30:00+02:00", "duration": 0.5, "extracted_label": "DP"},
                {"id": "e2", "summary": "Grada review", "start": "2025-07-01T10:00:00+02:00",
                 "end": "2025-07-01T11:00:00+02:00", "duration": 1.0, "extracted_label": "Grada"}
            ]"#,
        )
        .unwrap();
        let monday = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        let week = process_week(&db, &user, &events, monday, false, Duration::ZERO);
        (db, user, events, week)
    }

    #[test]
    fn submit_reports_created_and_rejected_entries() {
        let (mut db, user, _, week) = setup();
        let harvest = FakeHarvest {
            reject_project: Some(2),
            ..FakeHarvest::default()
        };

        let mut output = Vec::new();
        run(&mut output, &harvest, &mut db, &user, &week, SubmitOptions::default(), false).unwrap();

        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        Submitted 1 of 2 entries for the week of 2025-06-30 (1 skipped, 0 failed)
        - 2025-06-30  0.5h  Direct People / Meetings  DP standup  (#501)

        Errors:
        - Failed to create entry for 'Grada review' (1h on 2025-07-01): service error: Harvest API error 422: Project is archived
        ");

        let monday = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        let history = db.processing_history(&user, monday).unwrap();
        assert_eq!(history.len(), 2);

        let learned = db.learned_associations(&user).unwrap();
        assert_eq!(learned.project("Direct People").unwrap().total_mappings, 1);
        assert!(learned.project("Grada").is_none());
    }

    #[test]
    fn processed_events_are_not_drafted_again() {
        let (mut db, user, events, week) = setup();
        let harvest = FakeHarvest::default();
        run(&mut Vec::new(), &harvest, &mut db, &user, &week, SubmitOptions::default(), false).unwrap();

        let monday = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        let again = process_week(&db, &user, &events, monday, false, Duration::ZERO);
        assert!(again.report.timesheet_entries.is_empty());
        assert_eq!(
            again.report.warnings,
            vec![
                "Event 'DP standup' already processed",
                "Event 'Grada review' already processed"
            ]
        );
        assert_eq!(harvest.created.borrow().len(), 2);
    }

    #[test]
    fn dry_run_lists_drafts_without_creating() {
        let (mut db, user, _, week) = setup();
        let harvest = FakeHarvest::default();
        let options = SubmitOptions {
            dry_run: true,
            force_overwrite: false,
        };

        let mut output = Vec::new();
        run(&mut output, &harvest, &mut db, &user, &week, options, false).unwrap();

        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        Dry run: 2 of 2 entries would be submitted for the week of 2025-06-30
        - 2025-06-30  0.5h  Direct People / Meetings  DP standup
        - 2025-07-01  1.0h  Grada / Meetings  Grada review
        ");
        assert!(harvest.created.borrow().is_empty());
        assert!(db.learned_associations(&user).unwrap().is_empty());
    }
}
