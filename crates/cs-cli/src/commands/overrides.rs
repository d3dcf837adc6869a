//! Overrides command for pinning recurring series to a project and task.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result, bail};
use cs_core::store::{RuleStore, Upsert};
use cs_core::{
    CalendarEvent, MappingEngine, RecurringEventId, RecurringOverride, TimesheetTarget, UserId,
};
use cs_db::Database;

pub fn format_overrides(overrides: &[RecurringOverride]) -> String {
    let mut output = String::new();
    if overrides.is_empty() {
        output.push_str("No recurring overrides.\n");
        return output;
    }
    let _ = writeln!(output, "RECURRING OVERRIDES");
    for item in overrides {
        let _ = writeln!(
            output,
            "{}  {} ({}) → {} / {}",
            item.recurring_event_id,
            item.event_summary,
            item.recurrence_description.as_deref().unwrap_or("recurring"),
            item.target.project_name,
            item.target.task_name
        );
    }
    output
}

pub fn list<W: Write>(writer: &mut W, db: &Database, user: &UserId, json: bool) -> Result<()> {
    let overrides = db
        .list_recurring_overrides(user)
        .context("failed to load overrides")?;
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&overrides)?)?;
    } else {
        write!(writer, "{}", format_overrides(&overrides))?;
    }
    Ok(())
}

/// Pins the series of the event with `event_id` to `target`.
pub fn set<W: Write>(
    writer: &mut W,
    db: &mut Database,
    user: &UserId,
    events: &[CalendarEvent],
    event_id: &str,
    target: &TimesheetTarget,
) -> Result<()> {
    let Some(event) = events.iter().find(|event| event.id.as_str() == event_id) else {
        bail!("event {event_id} not found in calendar export");
    };
    let engine = MappingEngine::new();
    let outcome = engine.set_recurring_override(db, user, event, target)?;
    let verb = match outcome {
        Upsert::Created => "Pinned",
        Upsert::Updated => "Re-pinned",
    };
    writeln!(
        writer,
        "{verb} '{}' ({}) → {} / {}",
        event.summary,
        event.recurrence_pattern.as_deref().unwrap_or("recurring"),
        target.project_name,
        target.task_name
    )?;
    Ok(())
}

pub fn remove<W: Write>(
    writer: &mut W,
    db: &mut Database,
    user: &UserId,
    recurring_event_id: &str,
) -> Result<()> {
    let series = RecurringEventId::new(recurring_event_id)?;
    let engine = MappingEngine::new();
    if !engine.remove_recurring_override(db, user, &series)? {
        bail!("no active override for series {series}");
    }
    writeln!(writer, "Removed override for series {series}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;

    fn events() -> Vec<CalendarEvent> {
        serde_json::from_str(
            r#"[
                {"id": "standup_20250630", "summary": "Team standup",
                 "start": "2025-06-30T09:00:00+02:00", "end": "2025-06-30T09:15:00+02:00",
                 "duration": 0.25, "is_recurring": true, "recurring_event_id": "standup",
                 "recurrence_pattern": "Weekly on Monday"},
                {"id": "lunch", "summary": "Lunch",
                 "start": "2025-06-30T12:00:00+02:00", "end": "2025-06-30T13:00:00+02:00",
                 "duration": 1.0}
            ]"#,
        )
        .unwrap()
    }

    fn target() -> TimesheetTarget {
        TimesheetTarget {
            project_id: 1,
            project_name: "Direct People".to_string(),
            task_id: 10,
            task_name: "Meetings".to_string(),
        }
    }

    #[test]
    fn overrides_set_list_and_remove() {
        let mut db = Database::open_in_memory().unwrap();
        let user = UserId::new("jana").unwrap();
        let events = events();

        let mut output = Vec::new();
        set(&mut output, &mut db, &user, &events, "standup_20250630", &target()).unwrap();
        set(&mut output, &mut db, &user, &events, "standup_20250630", &target()).unwrap();
        list(&mut output, &db, &user, false).unwrap();
        remove(&mut output, &mut db, &user, "standup").unwrap();
        list(&mut output, &db, &user, false).unwrap();

        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        Pinned 'Team standup' (Weekly on Monday) → Direct People / Meetings
        Re-pinned 'Team standup' (Weekly on Monday) → Direct People / Meetings
        RECURRING OVERRIDES
        standup  Team standup (Weekly on Monday) → Direct People / Meetings
        Removed override for series standup
        No recurring overrides.
        ");
    }

    #[test]
    fn non_recurring_event_cannot_be_pinned() {
        let mut db = Database::open_in_memory().unwrap();
        let user = UserId::new("jana").unwrap();
        let err = set(&mut Vec::new(), &mut db, &user, &events(), "lunch", &target()).unwrap_err();
        assert_eq!(err.to_string(), "event lunch is not part of a recurring series");
    }

    #[test]
    fn unknown_event_is_reported() {
        let mut db = Database::open_in_memory().unwrap();
        let user = UserId::new("jana").unwrap();
        let err = set(&mut Vec::new(), &mut db, &user, &events(), "missing", &target()).unwrap_err();
        assert_eq!(err.to_string(), "event missing not found in calendar export");
    }
}
