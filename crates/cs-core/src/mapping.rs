//! Rule resolution and weekly draft synthesis.
//!
//! [`MappingEngine::find_mapping`] resolves one event against the user's
//! rules in strict priority order:
//!
//! 1. an active recurring override for the event's series
//! 2. the colour-derived label, compared case-insensitively
//! 3. a detected company name contained in a rule label
//! 4. free-text scoring of rule labels against the event text
//!
//! [`MappingEngine::process_events_for_week`] turns matched events into
//! [`TimesheetEntryDraft`]s, skipping events already submitted for the week.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::ExpiringCache;
use crate::event::{AttendanceStatus, CalendarEvent};
use crate::learning::{LearnedAssociations, LearnedSuggestion};
use crate::pattern::{PatternAnalysis, PatternEngine};
use crate::rule::{LabelMatch, MappingRule, MatchedRule, TimesheetTarget};
use crate::store::{ProcessingLog, Project, RuleStore, StoreError, Upsert};
use crate::types::{EventId, RecurringEventId, UserId, ValidationError};

/// How long loaded rules are reused before the store is asked again.
pub const DEFAULT_RULE_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

const MIN_LABEL_LEN: usize = 2;
const MAX_DESCRIPTION_CHARS: usize = 200;
const MAX_LISTED_ATTENDEES: usize = 3;

/// Errors from mapping management operations.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A proposed timesheet entry for one event. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimesheetEntryDraft {
    pub event_id: EventId,
    pub event_summary: String,
    pub spent_date: NaiveDate,
    pub project_id: i64,
    pub project_name: String,
    pub task_id: i64,
    pub task_name: String,
    pub hours: f64,
    pub notes: String,
    pub mapping_label: String,
    pub event_start: DateTime<FixedOffset>,
    pub event_end: DateTime<FixedOffset>,
}

/// An event no rule matched, with the signals found in it.
#[derive(Debug, Clone, Serialize)]
pub struct UnmappedEvent {
    pub event: CalendarEvent,
    pub analysis: PatternAnalysis,
}

/// Result of processing one week of events.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WeekReport {
    pub total_events: usize,
    pub mapped_events: usize,
    pub unmapped_events: usize,
    pub unmapped_events_details: Vec<UnmappedEvent>,
    pub timesheet_entries: Vec<TimesheetEntryDraft>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl WeekReport {
    pub fn total_hours(&self) -> f64 {
        self.timesheet_entries.iter().map(|entry| entry.hours).sum()
    }
}

/// Parameters of a weekly processing run.
#[derive(Debug, Clone)]
pub struct WeekQuery {
    pub user: UserId,
    pub week_start: NaiveDate,
    /// Include events that were already submitted for this week.
    pub show_all_events: bool,
}

/// Resolves events to timesheet targets.
#[derive(Debug)]
pub struct MappingEngine {
    patterns: PatternEngine,
    rules: ExpiringCache<UserId, Vec<MappingRule>>,
}

impl Default for MappingEngine {
    fn default() -> Self {
        Self::with_cache_ttl(DEFAULT_RULE_CACHE_TTL)
    }
}

impl MappingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_ttl(ttl: Duration) -> Self {
        Self {
            patterns: PatternEngine::new(),
            rules: ExpiringCache::new(ttl),
        }
    }

    pub const fn patterns(&self) -> &PatternEngine {
        &self.patterns
    }

    /// Drops cached rules so the next lookup reads the store.
    pub fn invalidate(&mut self, user: &UserId) {
        self.rules.invalidate(user);
    }

    /// Finds the rule that applies to `event`, if any.
    ///
    /// A miss is `Ok(None)`; only store failures are errors.
    pub fn find_mapping<S>(
        &mut self,
        store: &S,
        event: &CalendarEvent,
        user: &UserId,
    ) -> Result<Option<MatchedRule>, StoreError>
    where
        S: RuleStore + ?Sized,
    {
        if let Some(series) = event.series_id() {
            if let Some(found) = store
                .recurring_override(user, series)?
                .filter(|found| found.active)
            {
                debug!(event = %event.id, series = %series, "matched recurring override");
                return Ok(Some(MatchedRule::from_override(&found)));
            }
        }

        let rules = self
            .rules
            .get_or_try_insert_with(user.clone(), || store.active_rules(user))?;
        if rules.is_empty() {
            return Ok(None);
        }

        if let Some(label) = event.extracted_label.as_deref() {
            let label = label.to_lowercase();
            if let Some(rule) = rules
                .iter()
                .find(|rule| rule.calendar_label.to_lowercase() == label)
            {
                debug!(event = %event.id, label = %rule.calendar_label, "matched extracted label");
                return Ok(Some(MatchedRule::from_rule(rule, LabelMatch::ExtractedLabel)));
            }
        }

        let analysis = self.patterns.analyze(event);
        for company in &analysis.company {
            if let Some(rule) = rules
                .iter()
                .find(|rule| rule.calendar_label.to_lowercase().contains(&company.name))
            {
                debug!(event = %event.id, company = %company.name, label = %rule.calendar_label, "matched company");
                return Ok(Some(MatchedRule::from_rule(
                    rule,
                    LabelMatch::Company(company.name.clone()),
                )));
            }
        }

        let text = event.searchable_text();
        let best = best_free_text_match(rules, &text);
        if let Some(rule) = best {
            debug!(event = %event.id, label = %rule.calendar_label, "matched free text");
        }
        Ok(best.map(|rule| MatchedRule::from_rule(rule, LabelMatch::FreeText)))
    }

    /// Matches a week of events and synthesizes drafts for the matched ones.
    ///
    /// Per-event failures end up in `errors`/`warnings`; the batch always
    /// completes.
    pub fn process_events_for_week<S, L>(
        &mut self,
        store: &S,
        log: &L,
        learned: &mut LearnedAssociations,
        events: &[CalendarEvent],
        query: &WeekQuery,
    ) -> WeekReport
    where
        S: RuleStore + ?Sized,
        L: ProcessingLog + ?Sized,
    {
        let mut report = WeekReport {
            total_events: events.len(),
            ..WeekReport::default()
        };

        let processed: HashSet<EventId> = if query.show_all_events {
            HashSet::new()
        } else {
            log.processed_event_ids(&query.user, query.week_start)
                .unwrap_or_else(|err| {
                    warn!(error = %err, "failed to load processing history");
                    report
                        .warnings
                        .push(format!("Could not load processing history: {err}"));
                    HashSet::new()
                })
        };

        for event in events {
            if processed.contains(&event.id) {
                report
                    .warnings
                    .push(format!("Event '{}' already processed", event.summary));
                continue;
            }

            let matched = match self.find_mapping(store, event, &query.user) {
                Ok(matched) => matched,
                Err(err) => {
                    warn!(event = %event.id, error = %err, "rule lookup failed");
                    report
                        .errors
                        .push(format!("Failed to match event '{}': {err}", event.summary));
                    continue;
                }
            };

            match matched {
                Some(matched) => {
                    report.mapped_events += 1;
                    // Multi-day events are dropped without a warning.
                    if let Some(draft) = draft_entry(event, &matched) {
                        report.timesheet_entries.push(draft);
                        self.patterns
                            .learn_from_mapping(learned, event, &matched.target);
                    }
                }
                None => {
                    report.unmapped_events += 1;
                    report.unmapped_events_details.push(UnmappedEvent {
                        event: event.clone(),
                        analysis: self.patterns.analyze(event),
                    });
                    report
                        .warnings
                        .push(format!("No mapping found for event: '{}'", event.summary));
                }
            }
        }

        drop_declined(&mut report, events);

        info!(
            user = %query.user,
            week_start = %query.week_start,
            total = report.total_events,
            mapped = report.mapped_events,
            unmapped = report.unmapped_events,
            drafts = report.timesheet_entries.len(),
            "processed week"
        );
        report
    }

    /// Ranks catalog projects for `event` by what past submissions taught.
    pub fn pattern_suggestions(
        &self,
        learned: &LearnedAssociations,
        event: &CalendarEvent,
        projects: &[Project],
    ) -> Vec<LearnedSuggestion> {
        learned.suggest(&self.patterns.analyze(event), projects)
    }

    /// Checks a prospective label rule.
    ///
    /// IDs of zero or below count as "not selected".
    pub fn validate_mapping<S>(
        &self,
        store: &S,
        user: &UserId,
        label: &str,
        project_id: i64,
        task_id: i64,
    ) -> Result<(), MappingError>
    where
        S: RuleStore + ?Sized,
    {
        let label = label.trim();
        if label.is_empty() {
            return Err(ValidationError::Empty {
                field: "calendar label",
            }
            .into());
        }
        if label.chars().count() < MIN_LABEL_LEN {
            return Err(ValidationError::TooShort {
                field: "calendar label",
                min: MIN_LABEL_LEN,
            }
            .into());
        }
        if store.active_rule_by_label(user, label)?.is_some() {
            return Err(ValidationError::DuplicateLabel {
                label: label.to_string(),
            }
            .into());
        }
        if project_id <= 0 || task_id <= 0 {
            return Err(ValidationError::MissingProjectOrTask.into());
        }
        Ok(())
    }

    /// Validates and stores a new label rule.
    pub fn create_mapping<S>(
        &mut self,
        store: &mut S,
        user: &UserId,
        label: &str,
        target: &TimesheetTarget,
    ) -> Result<Upsert, MappingError>
    where
        S: RuleStore + ?Sized,
    {
        self.validate_mapping(store, user, label, target.project_id, target.task_id)?;
        let outcome = store.upsert_rule(user, label.trim(), target)?;
        self.invalidate(user);
        info!(user = %user, label = label.trim(), project = %target.project_name, "created mapping");
        Ok(outcome)
    }

    /// Deactivates a label rule. Returns false if it was not active.
    pub fn remove_mapping<S>(
        &mut self,
        store: &mut S,
        user: &UserId,
        rule_id: i64,
    ) -> Result<bool, StoreError>
    where
        S: RuleStore + ?Sized,
    {
        let removed = store.deactivate_rule(user, rule_id)?;
        self.invalidate(user);
        Ok(removed)
    }

    /// Pins every occurrence of `event`'s series to `target`.
    pub fn set_recurring_override<S>(
        &self,
        store: &mut S,
        user: &UserId,
        event: &CalendarEvent,
        target: &TimesheetTarget,
    ) -> Result<Upsert, MappingError>
    where
        S: RuleStore + ?Sized,
    {
        let Some(series) = event.series_id() else {
            return Err(ValidationError::NotRecurring {
                event_id: event.id.to_string(),
            }
            .into());
        };
        if target.project_id <= 0 || target.task_id <= 0 {
            return Err(ValidationError::MissingProjectOrTask.into());
        }
        let outcome = store.upsert_recurring_override(
            user,
            series,
            &event.summary,
            event.recurrence_pattern.as_deref(),
            target,
        )?;
        info!(user = %user, series = %series, project = %target.project_name, "set recurring override");
        Ok(outcome)
    }

    pub fn remove_recurring_override<S>(
        &self,
        store: &mut S,
        user: &UserId,
        series: &RecurringEventId,
    ) -> Result<bool, StoreError>
    where
        S: RuleStore + ?Sized,
    {
        store.deactivate_recurring_override(user, series)
    }
}

/// Picks the rule whose label scores highest against `text`.
///
/// Only rules whose label occurs in the text are scored. Ties keep the
/// earlier rule.
fn best_free_text_match<'a>(rules: &'a [MappingRule], text: &str) -> Option<&'a MappingRule> {
    if text.is_empty() {
        return None;
    }
    let words: Vec<&str> = text.split_whitespace().collect();

    let mut best: Option<(&MappingRule, f64)> = None;
    for rule in rules {
        let label = rule.calendar_label.to_lowercase();
        if label.trim().is_empty() || !text.contains(&label) {
            continue;
        }
        let score = free_text_score(text, &words, &label);
        if best.is_none_or(|(_, best_score)| score > best_score) {
            best = Some((rule, score));
        }
    }
    best.map(|(rule, _)| rule)
}

fn free_text_score(text: &str, words: &[&str], label: &str) -> f64 {
    let hits = label
        .split_whitespace()
        .filter(|word| words.contains(word))
        .count();

    #[expect(clippy::cast_precision_loss, reason = "label lengths are small")]
    let mut score = 1.0 + 0.5 * hits as f64 + 0.01 * label.chars().count() as f64;
    if text.starts_with(label) {
        score += 0.3;
    }
    if hits == 0 {
        score -= 0.2;
    }
    score
}

/// Rounds up to the next half hour.
pub fn round_hours(hours: f64) -> f64 {
    (hours * 2.0).ceil() / 2.0
}

/// Builds the draft for a matched event. Multi-day events yield `None`.
pub fn draft_entry(event: &CalendarEvent, matched: &MatchedRule) -> Option<TimesheetEntryDraft> {
    if event.is_multi_day() {
        debug!(event = %event.id, "skipping multi-day event");
        return None;
    }
    let target = &matched.target;
    Some(TimesheetEntryDraft {
        event_id: event.id.clone(),
        event_summary: event.summary.clone(),
        spent_date: event.start_date(),
        project_id: target.project_id,
        project_name: target.project_name.clone(),
        task_id: target.task_id,
        task_name: target.task_name.clone(),
        hours: round_hours(event.duration),
        notes: build_notes(event),
        mapping_label: matched.label().to_string(),
        event_start: event.start,
        event_end: event.end,
    })
}

/// Pipe-joined description of an event for the timesheet entry.
pub fn build_notes(event: &CalendarEvent) -> String {
    let mut parts: Vec<String> = Vec::new();

    let summary = event.summary.as_str();
    if !summary.is_empty() {
        parts.push(summary.to_string());
    }

    let description = event.description.trim();
    if !description.is_empty() && description.to_lowercase() != summary.to_lowercase() {
        if description.chars().count() > MAX_DESCRIPTION_CHARS {
            let head: String = description.chars().take(MAX_DESCRIPTION_CHARS - 3).collect();
            parts.push(format!("{head}..."));
        } else {
            parts.push(description.to_string());
        }
    }

    let location = event.location.trim();
    if !location.is_empty() {
        parts.push(format!("Location: {location}"));
    }

    match event.attendees.len() {
        0 => {}
        n if n <= MAX_LISTED_ATTENDEES => {
            parts.push(format!("Attendees: {}", event.attendees.join(", ")));
        }
        n => parts.push(format!("Meeting with {n} attendees")),
    }

    parts.push(format!(
        "Time: {}-{}",
        event.start.format("%H:%M"),
        event.end.format("%H:%M")
    ));

    parts.join(" | ")
}

fn drop_declined(report: &mut WeekReport, events: &[CalendarEvent]) {
    let declined: Vec<&CalendarEvent> = events
        .iter()
        .filter(|event| event.attendance_status == AttendanceStatus::Declined)
        .collect();
    if declined.is_empty() {
        return;
    }

    let warnings = &mut report.warnings;
    report.timesheet_entries.retain(|draft| {
        match declined.iter().find(|event| event.id == draft.event_id) {
            Some(event) => {
                warnings.push(format!("Skipped declined meeting: '{}'", event.summary));
                false
            }
            None => true,
        }
    });
}
