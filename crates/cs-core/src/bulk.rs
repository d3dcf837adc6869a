//! Bulk rule maintenance.
//!
//! A pattern rule matches event text (contains, prefix or regex) and, for
//! every matching event, upserts a label rule keyed by the event summary.
//! Events can also be assigned to a target directly, and a user's label
//! rules can be exported to JSON and merged back in.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::event::CalendarEvent;
use crate::rule::TimesheetTarget;
use crate::store::{RuleStore, StoreError, Upsert};
use crate::types::{UserId, ValidationError};

/// Longest regex pattern accepted, in characters.
pub const MAX_REGEX_LEN: usize = 200;
const REGEX_SIZE_LIMIT: usize = 1 << 20;
const REGEX_NEST_LIMIT: u32 = 16;

/// How a rule's pattern is compared with the event text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternType {
    Contains,
    StartsWith,
    Regex,
}

impl PatternType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::Regex => "regex",
        }
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PatternType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contains" => Ok(Self::Contains),
            "starts_with" => Ok(Self::StartsWith),
            "regex" => Ok(Self::Regex),
            _ => Err(ValidationError::InvalidPatternType {
                value: s.to_string(),
            }),
        }
    }
}

/// Which event field a rule looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ApplyTo {
    #[default]
    Summary,
    Description,
    Location,
    /// Summary, description and location joined by single spaces.
    All,
}

impl ApplyTo {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Description => "description",
            Self::Location => "location",
            Self::All => "all",
        }
    }

    fn text(self, event: &CalendarEvent) -> String {
        match self {
            Self::Summary => event.summary.clone(),
            Self::Description => event.description.clone(),
            Self::Location => event.location.clone(),
            Self::All => format!("{} {} {}", event.summary, event.description, event.location),
        }
    }
}

impl fmt::Display for ApplyTo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ApplyTo {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "summary" => Ok(Self::Summary),
            "description" => Ok(Self::Description),
            "location" => Ok(Self::Location),
            "all" => Ok(Self::All),
            _ => Err(ValidationError::InvalidApplyTo {
                value: s.to_string(),
            }),
        }
    }
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

string_serde!(PatternType);
string_serde!(ApplyTo);

/// What happens when several rules match the same event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Every matching rule is applied in order; the last write wins.
    #[default]
    AllMatchesLastWins,
    /// Only the first matching rule is applied.
    FirstMatch,
}

/// User input for a new pattern rule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewPatternRule {
    pub name: String,
    pub pattern_type: PatternType,
    pub pattern_value: String,
    #[serde(default)]
    pub apply_to: ApplyTo,
    #[serde(default)]
    pub case_sensitive: bool,
    pub target: TimesheetTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRule {
    pub id: String,
    pub user_id: UserId,
    pub name: String,
    pub pattern_type: PatternType,
    pub pattern_value: String,
    pub apply_to: ApplyTo,
    pub case_sensitive: bool,
    pub target: TimesheetTarget,
    pub active: bool,
    pub applied_count: u32,
    pub created_at: DateTime<Utc>,
}

impl PatternRule {
    /// Validates `new` and assigns a fresh ID.
    ///
    /// Regex patterns must compile within the size and nesting limits.
    pub fn new(user: &UserId, new: NewPatternRule, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        if new.name.trim().is_empty() {
            return Err(ValidationError::Empty { field: "rule name" });
        }
        if new.pattern_value.is_empty() {
            return Err(ValidationError::Empty {
                field: "pattern value",
            });
        }
        if new.target.project_id <= 0 || new.target.task_id <= 0 {
            return Err(ValidationError::MissingProjectOrTask);
        }
        if new.pattern_type == PatternType::Regex {
            compile_regex(&new.pattern_value, new.case_sensitive)?;
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            user_id: user.clone(),
            name: new.name.trim().to_string(),
            pattern_type: new.pattern_type,
            pattern_value: new.pattern_value,
            apply_to: new.apply_to,
            case_sensitive: new.case_sensitive,
            target: new.target,
            active: true,
            applied_count: 0,
            created_at: now,
        })
    }

    fn matcher(&self) -> Result<Matcher, ValidationError> {
        Ok(match self.pattern_type {
            PatternType::Contains | PatternType::StartsWith => Matcher::Literal {
                needle: if self.case_sensitive {
                    self.pattern_value.clone()
                } else {
                    self.pattern_value.to_lowercase()
                },
                prefix: self.pattern_type == PatternType::StartsWith,
            },
            PatternType::Regex => {
                Matcher::Regex(compile_regex(&self.pattern_value, self.case_sensitive)?)
            }
        })
    }
}

fn compile_regex(pattern: &str, case_sensitive: bool) -> Result<Regex, ValidationError> {
    if pattern.chars().count() > MAX_REGEX_LEN {
        return Err(ValidationError::TooLong {
            field: "regex pattern",
            max: MAX_REGEX_LEN,
        });
    }
    RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .size_limit(REGEX_SIZE_LIMIT)
        .dfa_size_limit(REGEX_SIZE_LIMIT)
        .nest_limit(REGEX_NEST_LIMIT)
        .build()
        .map_err(|err| ValidationError::InvalidRegex {
            pattern: pattern.to_string(),
            reason: err.to_string(),
        })
}

enum Matcher {
    Literal { needle: String, prefix: bool },
    Regex(Regex),
}

impl Matcher {
    fn matches(&self, text: &str, case_sensitive: bool) -> bool {
        match self {
            Self::Literal { needle, prefix } => {
                let text = if case_sensitive {
                    text.to_string()
                } else {
                    text.to_lowercase()
                };
                if *prefix {
                    text.starts_with(needle.as_str())
                } else {
                    text.contains(needle.as_str())
                }
            }
            Self::Regex(re) => re.is_match(text),
        }
    }
}

/// Per-rule tally within one bulk run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedRule {
    pub rule_id: String,
    pub rule_name: String,
    pub applications: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkApplyReport {
    pub total_events: usize,
    pub rules_applied: u32,
    pub mappings_created: u32,
    pub mappings_updated: u32,
    pub errors: Vec<String>,
    pub applied_rules: Vec<AppliedRule>,
}

impl BulkApplyReport {
    fn count_application(&mut self, rule: &PatternRule) {
        self.rules_applied += 1;
        match self.applied_rules.iter_mut().find(|r| r.rule_id == rule.id) {
            Some(applied) => applied.applications += 1,
            None => self.applied_rules.push(AppliedRule {
                rule_id: rule.id.clone(),
                rule_name: rule.name.clone(),
                applications: 1,
            }),
        }
    }
}

/// Evaluates active `rules` against `events` and upserts label rules.
///
/// `applied_count` is incremented on each rule that produced a mapping; the
/// caller persists the updated rules. Per-event failures are collected and
/// the run continues.
pub fn apply_rules<S>(
    store: &mut S,
    user: &UserId,
    events: &[CalendarEvent],
    rules: &mut [PatternRule],
    policy: MatchPolicy,
) -> BulkApplyReport
where
    S: RuleStore + ?Sized,
{
    let mut report = BulkApplyReport {
        total_events: events.len(),
        ..BulkApplyReport::default()
    };

    let mut compiled = Vec::new();
    for (index, rule) in rules.iter().enumerate() {
        if !rule.active {
            continue;
        }
        match rule.matcher() {
            Ok(matcher) => compiled.push((index, matcher)),
            Err(err) => {
                warn!(rule = %rule.id, error = %err, "skipping pattern rule");
                report.errors.push(format!("Rule '{}' skipped: {err}", rule.name));
            }
        }
    }

    for event in events {
        for (index, matcher) in &compiled {
            let rule = &mut rules[*index];
            if !matcher.matches(&rule.apply_to.text(event), rule.case_sensitive) {
                continue;
            }
            debug!(rule = %rule.name, event = %event.id, "pattern rule matched");

            let label = event.summary.trim();
            if label.is_empty() {
                report
                    .errors
                    .push("Event has no summary for label".to_string());
            } else {
                match store.upsert_rule(user, label, &rule.target) {
                    Ok(outcome) => {
                        match outcome {
                            Upsert::Created => report.mappings_created += 1,
                            Upsert::Updated => report.mappings_updated += 1,
                        }
                        rule.applied_count += 1;
                        report.count_application(rule);
                    }
                    Err(err) => {
                        warn!(label, error = %err, "failed to save mapping from pattern rule");
                        report
                            .errors
                            .push(format!("Failed to save mapping for '{label}': {err}"));
                    }
                }
            }

            if policy == MatchPolicy::FirstMatch {
                break;
            }
        }
    }

    info!(
        user = %user,
        events = report.total_events,
        applied = report.rules_applied,
        created = report.mappings_created,
        updated = report.mappings_updated,
        "applied pattern rules"
    );
    report
}

/// Bills one event to a target; the event summary becomes the label.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub event: CalendarEvent,
    pub target: TimesheetTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Created,
    Updated,
}

impl From<Upsert> for RuleAction {
    fn from(outcome: Upsert) -> Self {
        match outcome {
            Upsert::Created => Self::Created,
            Upsert::Updated => Self::Updated,
        }
    }
}

/// A label rule written by a bulk assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignedRule {
    pub calendar_label: String,
    pub project_name: String,
    pub task_name: String,
    pub action: RuleAction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkAssignReport {
    pub total_assignments: usize,
    pub successful: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    pub assigned: Vec<AssignedRule>,
}

/// Upserts a label rule for every assignment.
///
/// Invalid assignments and store failures are counted as failed and the
/// run continues.
pub fn assign_events<S>(store: &mut S, user: &UserId, assignments: &[Assignment]) -> BulkAssignReport
where
    S: RuleStore + ?Sized,
{
    let mut report = BulkAssignReport {
        total_assignments: assignments.len(),
        ..BulkAssignReport::default()
    };

    for Assignment { event, target } in assignments {
        let label = event.summary.trim();
        if target.project_id <= 0 || target.task_id <= 0 {
            report.failed += 1;
            report
                .errors
                .push(format!("Missing project or task for event {}", event.id));
            continue;
        }
        if label.is_empty() {
            report.failed += 1;
            report
                .errors
                .push(format!("Event has no summary: {}", event.id));
            continue;
        }

        match store.upsert_rule(user, label, target) {
            Ok(outcome) => {
                report.successful += 1;
                report.assigned.push(AssignedRule {
                    calendar_label: label.to_string(),
                    project_name: target.project_name.clone(),
                    task_name: target.task_name.clone(),
                    action: outcome.into(),
                });
            }
            Err(err) => {
                warn!(label, error = %err, "failed to save assigned mapping");
                report.failed += 1;
                report
                    .errors
                    .push(format!("Failed to save mapping for '{label}': {err}"));
            }
        }
    }

    info!(
        user = %user,
        total = report.total_assignments,
        successful = report.successful,
        failed = report.failed,
        "assigned events"
    );
    report
}

/// A label rule in export form.
///
/// Field aliases accept the `harvest_*` keys of older exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedRule {
    #[serde(default)]
    pub calendar_label: String,
    #[serde(alias = "harvest_project_id", default)]
    pub project_id: i64,
    #[serde(alias = "harvest_project_name", default)]
    pub project_name: String,
    #[serde(alias = "harvest_task_id", default)]
    pub task_id: i64,
    #[serde(alias = "harvest_task_name", default)]
    pub task_name: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ExportedRule {
    fn target(&self) -> TimesheetTarget {
        TimesheetTarget {
            project_id: self.project_id,
            project_name: self.project_name.clone(),
            task_id: self.task_id,
            task_name: self.task_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleExport {
    pub export_date: DateTime<Utc>,
    pub user_id: UserId,
    pub mappings: Vec<ExportedRule>,
}

/// Snapshot of the user's active label rules.
pub fn export_rules<S>(store: &S, user: &UserId, now: DateTime<Utc>) -> Result<RuleExport, StoreError>
where
    S: RuleStore + ?Sized,
{
    let mappings = store
        .active_rules(user)?
        .into_iter()
        .map(|rule| ExportedRule {
            calendar_label: rule.calendar_label,
            project_id: rule.target.project_id,
            project_name: rule.target.project_name,
            task_id: rule.target.task_id,
            task_name: rule.target.task_name,
            created_at: Some(rule.created_at),
            updated_at: Some(rule.updated_at),
        })
        .collect();
    Ok(RuleExport {
        export_date: now,
        user_id: user.clone(),
        mappings,
    })
}

/// How imported rules are merged with existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Repoint existing labels at the imported target.
    #[default]
    Update,
    /// Keep existing labels as they are.
    Skip,
    /// Deactivate every active rule first, then import all.
    Replace,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub total_mappings: usize,
    pub imported: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Rules deactivated by [`MergeStrategy::Replace`].
    pub replaced: usize,
    pub errors: Vec<String>,
}

/// Merges `mappings` into the user's label rules.
///
/// Invalid entries and store failures are reported and the import
/// continues. A failure while clearing rules for `Replace` aborts before
/// anything is imported.
pub fn import_rules<S>(
    store: &mut S,
    user: &UserId,
    mappings: &[ExportedRule],
    strategy: MergeStrategy,
) -> ImportReport
where
    S: RuleStore + ?Sized,
{
    let mut report = ImportReport {
        total_mappings: mappings.len(),
        ..ImportReport::default()
    };

    if strategy == MergeStrategy::Replace {
        match clear_rules(store, user) {
            Ok(count) => report.replaced = count,
            Err(err) => {
                warn!(error = %err, "could not clear rules before import");
                report
                    .errors
                    .push(format!("Could not clear existing rules: {err}"));
                return report;
            }
        }
    }

    for mapping in mappings {
        let label = mapping.calendar_label.trim();
        if label.is_empty() {
            report
                .errors
                .push("Missing calendar_label in mapping data".to_string());
            continue;
        }
        if mapping.project_id <= 0 || mapping.task_id <= 0 {
            report
                .errors
                .push(format!("Mapping for '{label}' has no project or task"));
            continue;
        }

        let existing = match store.active_rule_by_label(user, label) {
            Ok(existing) => existing,
            Err(err) => {
                report
                    .errors
                    .push(format!("Failed to look up '{label}': {err}"));
                continue;
            }
        };
        if existing.is_some() && strategy == MergeStrategy::Skip {
            debug!(label, "keeping existing rule");
            report.skipped += 1;
            continue;
        }

        match store.upsert_rule(user, label, &mapping.target()) {
            Ok(_) if existing.is_some() => report.updated += 1,
            Ok(_) => report.imported += 1,
            Err(err) => {
                warn!(label, error = %err, "failed to import mapping");
                report
                    .errors
                    .push(format!("Failed to import mapping for '{label}': {err}"));
            }
        }
    }

    info!(
        user = %user,
        total = report.total_mappings,
        imported = report.imported,
        updated = report.updated,
        skipped = report.skipped,
        replaced = report.replaced,
        "imported mappings"
    );
    report
}

fn clear_rules<S>(store: &mut S, user: &UserId) -> Result<usize, StoreError>
where
    S: RuleStore + ?Sized,
{
    let mut count = 0;
    for rule in store.active_rules(user)? {
        if store.deactivate_rule(user, rule.id)? {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::fixtures::event;
    use crate::store::memory::MemoryStore;

    fn user() -> UserId {
        UserId::new("u1").unwrap()
    }

    fn target(project_id: i64) -> TimesheetTarget {
        TimesheetTarget {
            project_id,
            project_name: format!("Project {project_id}"),
            task_id: 1,
            task_name: "Meetings".to_string(),
        }
    }

    fn rule(name: &str, pattern_type: PatternType, value: &str, project_id: i64) -> PatternRule {
        PatternRule::new(
            &user(),
            NewPatternRule {
                name: name.to_string(),
                pattern_type,
                pattern_value: value.to_string(),
                apply_to: ApplyTo::Summary,
                case_sensitive: false,
                target: target(project_id),
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn sample_events() -> Vec<CalendarEvent> {
        vec![
            event(
                "e1",
                "Grada weekly sync",
                "2025-06-30T09:00:00Z",
                "2025-06-30T10:00:00Z",
            ),
            event(
                "e2",
                "Lunch",
                "2025-06-30T12:00:00Z",
                "2025-06-30T13:00:00Z",
            ),
        ]
    }

    #[test]
    fn all_matches_policy_lets_last_rule_win() {
        let mut store = MemoryStore::default();
        let mut rules = vec![
            rule("grada", PatternType::Contains, "GRADA", 1),
            rule("sync", PatternType::Regex, r"\bsync$", 2),
        ];

        let report = apply_rules(
            &mut store,
            &user(),
            &sample_events(),
            &mut rules,
            MatchPolicy::AllMatchesLastWins,
        );

        assert_eq!(report.rules_applied, 2);
        assert_eq!(report.mappings_created, 1);
        assert_eq!(report.mappings_updated, 1);
        assert_eq!(rules[0].applied_count, 1);
        assert_eq!(rules[1].applied_count, 1);
        let saved = store
            .active_rule_by_label(&user(), "Grada weekly sync")
            .unwrap()
            .unwrap();
        assert_eq!(saved.target.project_id, 2);
    }

    #[test]
    fn first_match_policy_stops_at_first_rule() {
        let mut store = MemoryStore::default();
        let mut rules = vec![
            rule("grada", PatternType::Contains, "grada", 1),
            rule("sync", PatternType::Regex, r"sync", 2),
        ];

        let report = apply_rules(
            &mut store,
            &user(),
            &sample_events(),
            &mut rules,
            MatchPolicy::FirstMatch,
        );

        assert_eq!(report.rules_applied, 1);
        assert_eq!(rules[1].applied_count, 0);
        let saved = store
            .active_rule_by_label(&user(), "Grada weekly sync")
            .unwrap()
            .unwrap();
        assert_eq!(saved.target.project_id, 1);
    }

    #[test]
    fn applied_rules_tally_per_rule() {
        let mut store = MemoryStore::default();
        let events = vec![
            event("e1", "Grada A", "2025-06-30T09:00:00Z", "2025-06-30T10:00:00Z"),
            event("e2", "Grada B", "2025-06-30T11:00:00Z", "2025-06-30T12:00:00Z"),
        ];
        let mut rules = vec![rule("grada", PatternType::StartsWith, "grada", 1)];

        let report = apply_rules(
            &mut store,
            &user(),
            &events,
            &mut rules,
            MatchPolicy::default(),
        );
        assert_eq!(report.applied_rules.len(), 1);
        assert_eq!(report.applied_rules[0].applications, 2);
        assert_eq!(report.applied_rules[0].rule_name, "grada");
    }

    #[test]
    fn case_sensitive_rules_respect_case() {
        let mut sensitive = rule("dp", PatternType::Contains, "DP", 1);
        sensitive.case_sensitive = true;
        let matcher = sensitive.matcher().unwrap();
        assert!(matcher.matches("DP sync", true));
        assert!(!matcher.matches("dp sync", true));

        let insensitive = rule("dp", PatternType::StartsWith, "DP", 1);
        let matcher = insensitive.matcher().unwrap();
        assert!(matcher.matches("dp sync", false));
        assert!(!matcher.matches("sync dp", false));
    }

    #[test]
    fn regex_keeps_escapes_when_case_insensitive() {
        let r = rule("ticket", PatternType::Regex, r"^\D+-\d+", 1);
        let matcher = r.matcher().unwrap();
        assert!(matcher.matches("ABC-123 review", false));
        assert!(matcher.matches("abc-9", false));
        assert!(!matcher.matches("123", false));
    }

    #[test]
    fn apply_to_all_joins_fields() {
        let mut e = event(
            "e1",
            "Weekly",
            "2025-06-30T09:00:00Z",
            "2025-06-30T10:00:00Z",
        );
        e.location = "Zoom".to_string();
        assert_eq!(ApplyTo::All.text(&e), "Weekly  Zoom");
        assert_eq!(ApplyTo::Location.text(&e), "Zoom");
    }

    #[test]
    fn empty_summary_is_an_item_error() {
        let mut store = MemoryStore::default();
        let mut e = event("e1", "   ", "2025-06-30T09:00:00Z", "2025-06-30T10:00:00Z");
        e.location = "Office".to_string();
        let mut r = rule("office", PatternType::Contains, "office", 1);
        r.apply_to = ApplyTo::Location;
        let mut rules = vec![r];

        let report = apply_rules(&mut store, &user(), &[e], &mut rules, MatchPolicy::default());
        assert_eq!(report.errors, vec!["Event has no summary for label"]);
        assert_eq!(report.rules_applied, 0);
        assert_eq!(rules[0].applied_count, 0);
    }

    #[test]
    fn inactive_rules_are_ignored() {
        let mut store = MemoryStore::default();
        let mut r = rule("grada", PatternType::Contains, "grada", 1);
        r.active = false;
        let mut rules = vec![r];
        let report = apply_rules(
            &mut store,
            &user(),
            &sample_events(),
            &mut rules,
            MatchPolicy::default(),
        );
        assert_eq!(report.rules_applied, 0);
        assert!(report.applied_rules.is_empty());
    }

    #[test]
    fn invalid_regex_rejected_at_creation() {
        let result = PatternRule::new(
            &user(),
            NewPatternRule {
                name: "broken".to_string(),
                pattern_type: PatternType::Regex,
                pattern_value: "(unclosed".to_string(),
                apply_to: ApplyTo::Summary,
                case_sensitive: false,
                target: target(1),
            },
            Utc::now(),
        );
        assert!(matches!(result, Err(ValidationError::InvalidRegex { .. })));
    }

    #[test]
    fn oversized_regex_rejected_at_creation() {
        let too_long = "a".repeat(MAX_REGEX_LEN + 1);
        assert_eq!(
            compile_regex(&too_long, false).err(),
            Some(ValidationError::TooLong {
                field: "regex pattern",
                max: MAX_REGEX_LEN,
            })
        );

        let too_deep = format!("{}a{}", "(".repeat(40), ")".repeat(40));
        assert!(compile_regex(&too_deep, false).is_err());

        let too_big = r"(?:\w{1000}){50}";
        assert!(compile_regex(too_big, false).is_err());
    }

    #[test]
    fn pattern_enums_use_wire_strings() {
        assert_eq!("starts_with".parse::<PatternType>().unwrap(), PatternType::StartsWith);
        assert_eq!(serde_json::to_string(&ApplyTo::All).unwrap(), "\"all\"");
        assert!("everywhere".parse::<ApplyTo>().is_err());
    }

    #[test]
    fn assignment_creates_then_updates_and_reports_invalid_items() {
        let mut store = MemoryStore::default();
        let events = sample_events();
        let mut untitled = events[1].clone();
        untitled.summary = "   ".to_string();
        let assignments = vec![
            Assignment {
                event: events[0].clone(),
                target: target(1),
            },
            Assignment {
                event: events[0].clone(),
                target: target(2),
            },
            Assignment {
                event: untitled,
                target: target(1),
            },
            Assignment {
                event: events[1].clone(),
                target: target(0),
            },
        ];

        let report = assign_events(&mut store, &user(), &assignments);

        assert_eq!(report.total_assignments, 4);
        assert_eq!(report.successful, 2);
        assert_eq!(report.failed, 2);
        assert_eq!(
            report.errors,
            vec!["Event has no summary: e2", "Missing project or task for event e2"]
        );
        let actions: Vec<RuleAction> = report.assigned.iter().map(|a| a.action).collect();
        assert_eq!(actions, vec![RuleAction::Created, RuleAction::Updated]);
        let saved = store
            .active_rule_by_label(&user(), "Grada weekly sync")
            .unwrap()
            .unwrap();
        assert_eq!(saved.target.project_id, 2);
    }

    #[test]
    fn export_lists_active_rules_only() {
        let mut store = MemoryStore::default();
        store.upsert_rule(&user(), "DP", &target(1)).unwrap();
        store.upsert_rule(&user(), "Grada", &target(2)).unwrap();
        let grada = store.active_rule_by_label(&user(), "Grada").unwrap().unwrap();
        store.deactivate_rule(&user(), grada.id).unwrap();

        let now = Utc::now();
        let export = export_rules(&store, &user(), now).unwrap();

        assert_eq!(export.export_date, now);
        assert_eq!(export.mappings.len(), 1);
        assert_eq!(export.mappings[0].calendar_label, "DP");
        assert_eq!(export.mappings[0].project_name, "Project 1");
    }

    fn exported(label: &str, project_id: i64) -> ExportedRule {
        let target = target(project_id);
        ExportedRule {
            calendar_label: label.to_string(),
            project_id: target.project_id,
            project_name: target.project_name,
            task_id: target.task_id,
            task_name: target.task_name,
            created_at: None,
            updated_at: None,
        }
    }

    fn store_with_dp_and_ai() -> MemoryStore {
        let mut store = MemoryStore::default();
        store.upsert_rule(&user(), "DP", &target(1)).unwrap();
        store.upsert_rule(&user(), "AI", &target(3)).unwrap();
        store
    }

    #[test]
    fn import_merge_strategies() {
        let incoming = [exported("DP", 5), exported("Sales", 6), exported("", 7)];

        let mut store = store_with_dp_and_ai();
        let report = import_rules(&mut store, &user(), &incoming, MergeStrategy::Update);
        assert_eq!(
            (report.total_mappings, report.imported, report.updated, report.skipped),
            (3, 1, 1, 0)
        );
        assert_eq!(report.errors, vec!["Missing calendar_label in mapping data"]);
        let dp = store.active_rule_by_label(&user(), "DP").unwrap().unwrap();
        assert_eq!(dp.target.project_id, 5);

        let mut store = store_with_dp_and_ai();
        let report = import_rules(&mut store, &user(), &incoming, MergeStrategy::Skip);
        assert_eq!((report.imported, report.updated, report.skipped), (1, 0, 1));
        let dp = store.active_rule_by_label(&user(), "DP").unwrap().unwrap();
        assert_eq!(dp.target.project_id, 1);

        let mut store = store_with_dp_and_ai();
        let report = import_rules(&mut store, &user(), &incoming, MergeStrategy::Replace);
        assert_eq!((report.replaced, report.imported, report.updated), (2, 2, 0));
        let labels: Vec<String> = store
            .active_rules(&user())
            .unwrap()
            .into_iter()
            .map(|rule| rule.calendar_label)
            .collect();
        assert_eq!(labels, vec!["DP", "Sales"]);
    }

    #[test]
    fn import_accepts_harvest_prefixed_keys() {
        let json = r#"{
            "export_date": "2025-07-01T08:00:00Z",
            "user_id": "u1",
            "mappings": [{
                "calendar_label": "Grada",
                "harvest_project_id": 2,
                "harvest_project_name": "Grada",
                "harvest_task_id": 20,
                "harvest_task_name": "Meetings",
                "created_at": null
            }]
        }"#;
        let export: RuleExport = serde_json::from_str(json).unwrap();
        assert_eq!(export.mappings[0].project_id, 2);
        assert_eq!(export.mappings[0].task_id, 20);

        let mut store = MemoryStore::default();
        let report = import_rules(&mut store, &user(), &export.mappings, MergeStrategy::default());
        assert_eq!(report.imported, 1);
    }
}
