//! Suggest command for proposing label rules.

use std::fmt::Write as _;
use std::io::Write;

use std::collections::HashSet;

use anyhow::{Context, Result, bail};
use cs_core::store::{CalendarSource, ProjectCatalog, RuleStore};
use cs_core::{
    AppliedSuggestions, CalendarEvent, LearnedSuggestion, MappingEngine, MappingSuggestion,
    SuggestionEngine, UserId, apply_suggestions,
};
use cs_db::Database;

pub fn format_suggestions(suggestions: &[MappingSuggestion], weeks: u32) -> String {
    let mut output = String::new();
    if suggestions.is_empty() {
        let _ = writeln!(
            output,
            "No suggestions: every label from the last {weeks} weeks is already mapped or matches no project."
        );
        return output;
    }
    let _ = writeln!(output, "SUGGESTED RULES (last {weeks} weeks)");
    for suggestion in suggestions {
        let _ = writeln!(
            output,
            "{:>3.0}%  {} → {} / {}  ({} events, {:.1}h)",
            suggestion.confidence.value() * 100.0,
            suggestion.calendar_label,
            suggestion.project_name,
            suggestion.task_name,
            suggestion.frequency,
            suggestion.total_hours
        );
        let _ = writeln!(output, "      {}", suggestion.reasoning);
    }
    output
}

/// Builds label rule suggestions for the last `weeks` weeks.
pub fn generate<C, P, S>(
    calendar: &C,
    catalog: &P,
    store: &S,
    user: &UserId,
    weeks: u32,
    enhanced: bool,
) -> Vec<MappingSuggestion>
where
    C: CalendarSource + ?Sized,
    P: ProjectCatalog + ?Sized,
    S: RuleStore + ?Sized,
{
    let engine = SuggestionEngine::new(weeks);
    if enhanced {
        engine.enhanced_for_user(calendar, catalog, store, user)
    } else {
        engine.suggest_for_user(calendar, catalog, store, user)
    }
}

#[expect(
    clippy::too_many_arguments,
    reason = "collaborators and output flags are passed through from main"
)]
pub fn run<W, C, P, S>(
    writer: &mut W,
    calendar: &C,
    catalog: &P,
    store: &S,
    user: &UserId,
    weeks: u32,
    enhanced: bool,
    json: bool,
) -> Result<()>
where
    W: Write,
    C: CalendarSource + ?Sized,
    P: ProjectCatalog + ?Sized,
    S: RuleStore + ?Sized,
{
    let suggestions = generate(calendar, catalog, store, user, weeks, enhanced);
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&suggestions)?)?;
    } else {
        write!(writer, "{}", format_suggestions(&suggestions, weeks))?;
    }
    Ok(())
}

/// Keeps the most confident suggestion for each label.
///
/// A non-empty `labels` limits the result to those labels.
pub fn best_per_label(
    mut suggestions: Vec<MappingSuggestion>,
    labels: &[String],
) -> Vec<MappingSuggestion> {
    suggestions.sort_by(|a, b| b.confidence.value().total_cmp(&a.confidence.value()));
    let mut seen = HashSet::new();
    suggestions.retain(|suggestion| {
        let wanted = labels.is_empty() || labels.contains(&suggestion.calendar_label);
        wanted && seen.insert(suggestion.calendar_label.clone())
    });
    suggestions
}

pub fn format_applied(applied: &AppliedSuggestions) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Created {} rules", applied.created_count);
    for label in &applied.created {
        let _ = writeln!(output, "  + {label}");
    }
    for error in &applied.errors {
        let _ = writeln!(output, "  ! {error}");
    }
    output
}

/// Turns the best suggestion per label into a label rule.
pub fn apply<W: Write>(
    writer: &mut W,
    db: &mut Database,
    user: &UserId,
    suggestions: Vec<MappingSuggestion>,
    labels: &[String],
    json: bool,
) -> Result<()> {
    let picked = best_per_label(suggestions, labels);
    let applied = apply_suggestions(&mut MappingEngine::new(), db, user, &picked);
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&applied)?)?;
    } else {
        write!(writer, "{}", format_applied(&applied))?;
    }
    Ok(())
}

pub fn format_learned(event: &CalendarEvent, suggestions: &[LearnedSuggestion]) -> String {
    let mut output = String::new();
    if suggestions.is_empty() {
        let _ = writeln!(output, "No learned suggestions for '{}' yet.", event.summary);
        return output;
    }
    let _ = writeln!(output, "LEARNED PROJECTS for '{}'", event.summary);
    for suggestion in suggestions {
        let _ = writeln!(
            output,
            "{:>3.0}%  {}",
            suggestion.score.value() * 100.0,
            suggestion.project.name
        );
        for reason in &suggestion.reasons {
            let _ = writeln!(output, "      {reason}");
        }
    }
    output
}

/// Ranks projects for one event by what earlier submissions taught.
pub fn for_event<W, P>(
    writer: &mut W,
    events: &[CalendarEvent],
    catalog: &P,
    db: &Database,
    user: &UserId,
    event_id: &str,
    json: bool,
) -> Result<()>
where
    W: Write,
    P: ProjectCatalog + ?Sized,
{
    let Some(event) = events.iter().find(|e| e.id.as_str() == event_id) else {
        bail!("event {event_id} not found in calendar export");
    };
    let learned = db
        .learned_associations(user)
        .context("failed to load learned associations")?;
    let projects = catalog.projects().context("failed to load projects")?;
    let suggestions = MappingEngine::new().pattern_suggestions(&learned, event, &projects);
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&suggestions)?)?;
    } else {
        write!(writer, "{}", format_learned(event, &suggestions))?;
    }
    Ok(())
}
