//! Rules command for managing label mapping rules.

use std::fmt::Write as _;
use std::io::Write;

use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use cs_core::store::{RuleStore, Upsert};
use cs_core::{
    Assignment, BulkAssignReport, CalendarEvent, ImportReport, MappingEngine, MappingRule,
    MergeStrategy, RuleAction, RuleExport, TimesheetTarget, UserId, assign_events, export_rules,
    import_rules,
};
use cs_db::Database;

pub fn format_rules(rules: &[MappingRule]) -> String {
    let mut output = String::new();
    if rules.is_empty() {
        output.push_str("No label rules. Add one with `cs rules add <label> --project <id> --task <id>`.\n");
        return output;
    }
    let _ = writeln!(output, "LABEL RULES");
    for rule in rules {
        let _ = writeln!(
            output,
            "{:>4}  {:<20} → {} / {}",
            rule.id, rule.calendar_label, rule.target.project_name, rule.target.task_name
        );
    }
    output
}

pub fn list<W: Write>(writer: &mut W, db: &Database, user: &UserId, json: bool) -> Result<()> {
    let rules = db.active_rules(user).context("failed to load rules")?;
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&rules)?)?;
    } else {
        write!(writer, "{}", format_rules(&rules))?;
    }
    Ok(())
}

pub fn add<W: Write>(
    writer: &mut W,
    db: &mut Database,
    user: &UserId,
    label: &str,
    target: &TimesheetTarget,
) -> Result<()> {
    let mut engine = MappingEngine::new();
    let outcome = engine.create_mapping(db, user, label, target)?;
    let verb = match outcome {
        Upsert::Created => "Created",
        Upsert::Updated => "Reactivated",
    };
    writeln!(
        writer,
        "{verb} rule '{}' → {} / {}",
        label.trim(),
        target.project_name,
        target.task_name
    )?;
    Ok(())
}

pub fn remove<W: Write>(writer: &mut W, db: &mut Database, user: &UserId, id: i64) -> Result<()> {
    let mut engine = MappingEngine::new();
    if !engine.remove_mapping(db, user, id)? {
        bail!("no active rule with ID {id}");
    }
    writeln!(writer, "Removed rule {id}")?;
    Ok(())
}

pub fn format_assigned(report: &BulkAssignReport) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "Assigned {} of {} events",
        report.successful, report.total_assignments
    );
    for rule in &report.assigned {
        let verb = match rule.action {
            RuleAction::Created => "created",
            RuleAction::Updated => "updated",
        };
        let _ = writeln!(
            output,
            "  {verb:<7}  {} → {} / {}",
            rule.calendar_label, rule.project_name, rule.task_name
        );
    }
    for error in &report.errors {
        let _ = writeln!(output, "  ! {error}");
    }
    output
}

/// Maps the summary of each listed event to `target`.
pub fn assign<W: Write>(
    writer: &mut W,
    db: &mut Database,
    user: &UserId,
    events: &[CalendarEvent],
    event_ids: &[String],
    target: &TimesheetTarget,
    json: bool,
) -> Result<()> {
    let mut assignments = Vec::with_capacity(event_ids.len());
    for id in event_ids {
        let Some(event) = events.iter().find(|e| e.id.as_str() == id) else {
            bail!("event {id} not found in calendar export");
        };
        assignments.push(Assignment {
            event: event.clone(),
            target: target.clone(),
        });
    }
    let report = assign_events(db, user, &assignments);
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&report)?)?;
    } else {
        write!(writer, "{}", format_assigned(&report))?;
    }
    Ok(())
}

/// Writes the active rules as JSON to `output`, or to `writer` when absent.
pub fn export<W: Write>(
    writer: &mut W,
    db: &Database,
    user: &UserId,
    output: Option<&Path>,
) -> Result<()> {
    let export = export_rules(db, user, Utc::now()).context("failed to load rules")?;
    let body = serde_json::to_string_pretty(&export)?;
    match output {
        Some(path) => {
            std::fs::write(path, format!("{body}\n"))
                .with_context(|| format!("failed to write {}", path.display()))?;
            writeln!(
                writer,
                "Exported {} rules to {}",
                export.mappings.len(),
                path.display()
            )?;
        }
        None => writeln!(writer, "{body}")?,
    }
    Ok(())
}

pub fn format_imported(report: &ImportReport) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "Imported {} new, updated {}, skipped {}, replaced {} (of {})",
        report.imported, report.updated, report.skipped, report.replaced, report.total_mappings
    );
    for error in &report.errors {
        let _ = writeln!(output, "  ! {error}");
    }
    output
}

/// Loads rules from an export file written by [`export`].
pub fn import<W: Write>(
    writer: &mut W,
    db: &mut Database,
    user: &UserId,
    path: &Path,
    strategy: MergeStrategy,
    json: bool,
) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let export: RuleExport = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse rule export in {}", path.display()))?;
    let report = import_rules(db, user, &export.mappings, strategy);
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&report)?)?;
    } else {
        write!(writer, "{}", format_imported(&report))?;
    }
    Ok(())
}
