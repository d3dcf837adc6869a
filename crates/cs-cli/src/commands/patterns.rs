//! Patterns command for bulk pattern rules.
//!
//! Pattern rules turn every event whose text matches into a label rule named
//! after the event summary.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use cs_core::store::PatternRuleStore;
use cs_core::{
    BulkApplyReport, CalendarEvent, MatchPolicy, NewPatternRule, PatternRule, UserId, apply_rules,
};
use cs_db::Database;

pub fn format_patterns(rules: &[PatternRule]) -> String {
    let mut output = String::new();
    if rules.is_empty() {
        output.push_str("No pattern rules.\n");
        return output;
    }
    let _ = writeln!(output, "PATTERN RULES");
    for rule in rules {
        let _ = write!(
            output,
            "{}  {}: {} \"{}\" in {}",
            rule.id, rule.name, rule.pattern_type, rule.pattern_value, rule.apply_to
        );
        if rule.case_sensitive {
            output.push_str(" (case-sensitive)");
        }
        let _ = write!(
            output,
            " → {} / {}, applied {}×",
            rule.target.project_name, rule.target.task_name, rule.applied_count
        );
        if !rule.active {
            output.push_str(" [inactive]");
        }
        output.push('\n');
    }
    output
}

pub fn format_apply_report(report: &BulkApplyReport) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "Checked {} events: {} rule applications ({} rules created, {} updated)",
        report.total_events, report.rules_applied, report.mappings_created, report.mappings_updated
    );
    for applied in &report.applied_rules {
        let _ = writeln!(output, "- {}: {}", applied.rule_name, applied.applications);
    }
    if !report.errors.is_empty() {
        let _ = writeln!(output, "Errors:");
        for error in &report.errors {
            let _ = writeln!(output, "- {error}");
        }
    }
    output
}

pub fn list<W: Write>(writer: &mut W, db: &Database, user: &UserId, json: bool) -> Result<()> {
    let rules = db.pattern_rules(user).context("failed to load pattern rules")?;
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&rules)?)?;
    } else {
        write!(writer, "{}", format_patterns(&rules))?;
    }
    Ok(())
}

pub fn add<W: Write>(
    writer: &mut W,
    db: &mut Database,
    user: &UserId,
    new: NewPatternRule,
) -> Result<PatternRule> {
    let rule = PatternRule::new(user, new, Utc::now())?;
    db.insert_pattern_rule(&rule)
        .context("failed to save pattern rule")?;
    writeln!(writer, "Created pattern rule {} ({})", rule.id, rule.name)?;
    Ok(rule)
}

pub fn remove<W: Write>(writer: &mut W, db: &mut Database, user: &UserId, id: &str) -> Result<()> {
    if !db.deactivate_pattern_rule(user, id)? {
        bail!("no active pattern rule with ID {id}");
    }
    writeln!(writer, "Removed pattern rule {id}")?;
    Ok(())
}

/// Applies the user's active pattern rules and persists their counters.
pub fn apply<W: Write>(
    writer: &mut W,
    db: &mut Database,
    user: &UserId,
    events: &[CalendarEvent],
    policy: MatchPolicy,
    json: bool,
) -> Result<()> {
    let mut rules = db.pattern_rules(user).context("failed to load pattern rules")?;
    let counts: Vec<u32> = rules.iter().map(|rule| rule.applied_count).collect();

    let report = apply_rules(db, user, events, &mut rules, policy);

    for (rule, before) in rules.iter().zip(counts) {
        if rule.applied_count != before {
            db.save_pattern_rule(rule)
                .with_context(|| format!("failed to update pattern rule {}", rule.id))?;
        }
    }

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&report)?)?;
    } else {
        write!(writer, "{}", format_apply_report(&report))?;
    }
    Ok(())
}
