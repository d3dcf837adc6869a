//! Submission of weekly drafts to the timesheet service.
//!
//! Every attempted draft leaves a [`ProcessingRecord`] so later runs skip
//! it. With `force_overwrite`, an existing entry for the same
//! project/task/date is deleted before the new one is created; the two
//! calls are not atomic, so a failure in between leaves no entry at all.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::event::CalendarEvent;
use crate::learning::LearnedAssociations;
use crate::mapping::TimesheetEntryDraft;
use crate::pattern::PatternEngine;
use crate::rule::TimesheetTarget;
use crate::store::{
    ClientError, NewTimeEntry, ProcessingLog, ProcessingRecord, ProcessingStatus, TimesheetClient,
};
use crate::types::{EventId, UserId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubmitOptions {
    /// Count what would be created without calling the service.
    pub dry_run: bool,
    /// Replace an existing entry with the same project, task and date.
    pub force_overwrite: bool,
}

/// A time entry created from a draft.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedEntry {
    pub event_id: EventId,
    pub event_summary: String,
    pub hours: f64,
    pub project_name: String,
    pub task_name: String,
    pub spent_date: NaiveDate,
    pub notes: String,
    pub harvest_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubmitReport {
    pub total_entries: usize,
    pub successful: usize,
    /// Drafts the service rejected.
    pub skipped: usize,
    /// Drafts that could not be attempted.
    pub failed: usize,
    pub errors: Vec<String>,
    pub created: Vec<CreatedEntry>,
}

enum Attempt {
    Created(i64),
    Rejected(String),
}

fn attempt<C>(client: &C, draft: &TimesheetEntryDraft, force_overwrite: bool) -> Result<Attempt, ClientError>
where
    C: TimesheetClient + ?Sized,
{
    if force_overwrite {
        let existing = client.entries_on(draft.spent_date)?;
        let duplicate = existing.iter().find(|entry| {
            entry.project_id == draft.project_id
                && entry.task_id == draft.task_id
                && entry.spent_date == draft.spent_date
        });
        if let Some(duplicate) = duplicate {
            debug!(entry = duplicate.id, "deleting existing entry before overwrite");
            let deleted = client.delete_entry(duplicate.id).unwrap_or_else(|err| {
                warn!(entry = duplicate.id, error = %err, "delete failed");
                false
            });
            if !deleted {
                return Ok(Attempt::Rejected(format!(
                    "Failed to delete existing entry {}",
                    duplicate.id
                )));
            }
        }
    }

    let request = NewTimeEntry {
        project_id: draft.project_id,
        task_id: draft.task_id,
        spent_date: draft.spent_date,
        hours: draft.hours,
        notes: draft.notes.clone(),
    };
    Ok(match client.create_entry(&request) {
        Ok(entry) => Attempt::Created(entry.id),
        Err(err) => Attempt::Rejected(err.to_string()),
    })
}

/// Creates a timesheet entry for each draft and records the outcome.
///
/// Per-draft problems are collected in the report; the loop never stops
/// early.
pub fn submit_entries<C, L>(
    client: &C,
    log: &mut L,
    user: &UserId,
    week_start: NaiveDate,
    drafts: &[TimesheetEntryDraft],
    options: SubmitOptions,
) -> SubmitReport
where
    C: TimesheetClient + ?Sized,
    L: ProcessingLog + ?Sized,
{
    let mut report = SubmitReport::default();

    for draft in drafts {
        if options.dry_run {
            report.successful += 1;
            continue;
        }

        let outcome = match attempt(client, draft, options.force_overwrite) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(event = %draft.event_id, error = %err, "could not attempt entry");
                report.failed += 1;
                report.errors.push(format!(
                    "Error processing entry '{}': {err}",
                    draft.event_summary
                ));
                continue;
            }
        };

        let mut record = ProcessingRecord {
            user_id: user.clone(),
            week_start,
            calendar_event_id: draft.event_id.clone(),
            calendar_event_summary: draft.event_summary.clone(),
            harvest_time_entry_id: None,
            project_id: draft.project_id,
            task_id: draft.task_id,
            hours: draft.hours,
            status: ProcessingStatus::Success,
            error_message: None,
            processed_at: Utc::now(),
        };
        match outcome {
            Attempt::Created(id) => {
                report.successful += 1;
                record.harvest_time_entry_id = Some(id);
                report.created.push(CreatedEntry {
                    event_id: draft.event_id.clone(),
                    event_summary: draft.event_summary.clone(),
                    hours: draft.hours,
                    project_name: draft.project_name.clone(),
                    task_name: draft.task_name.clone(),
                    spent_date: draft.spent_date,
                    notes: draft.notes.clone(),
                    harvest_id: id,
                });
            }
            Attempt::Rejected(message) => {
                report.skipped += 1;
                report.errors.push(format!(
                    "Failed to create entry for '{}' ({}h on {}): {message}",
                    draft.event_summary, draft.hours, draft.spent_date
                ));
                record.status = ProcessingStatus::Error;
                record.error_message = Some(message);
            }
        }

        if let Err(err) = log.record(&record) {
            warn!(event = %draft.event_id, error = %err, "could not record submission");
            report.errors.push(format!(
                "Failed to record history for '{}': {err}",
                draft.event_summary
            ));
        }
    }

    report.total_entries = report.successful + report.skipped + report.failed;
    info!(
        total = report.total_entries,
        successful = report.successful,
        skipped = report.skipped,
        failed = report.failed,
        dry_run = options.dry_run,
        "submitted timesheet entries"
    );
    report
}

/// Records the mappings behind created entries in `learned`.
///
/// Drafts that were only previewed or that the service rejected teach
/// nothing. Returns the number of mappings learned.
pub fn learn_from_submission(
    patterns: &PatternEngine,
    learned: &mut LearnedAssociations,
    events: &[CalendarEvent],
    drafts: &[TimesheetEntryDraft],
    report: &SubmitReport,
) -> usize {
    let mut count = 0;
    for created in &report.created {
        let draft = drafts.iter().find(|draft| draft.event_id == created.event_id);
        let event = events.iter().find(|event| event.id == created.event_id);
        let (Some(draft), Some(event)) = (draft, event) else {
            debug!(event = %created.event_id, "no event for created entry");
            continue;
        };
        let target = TimesheetTarget {
            project_id: draft.project_id,
            project_name: draft.project_name.clone(),
            task_id: draft.task_id,
            task_name: draft.task_name.clone(),
        };
        patterns.learn_from_mapping(learned, event, &target);
        count += 1;
    }
    count
}
