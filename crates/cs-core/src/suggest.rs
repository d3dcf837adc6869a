//! Label-to-project mapping suggestions and calendar insights.
//!
//! Suggestions are generated for labels the user actually used but has no
//! active rule for. Each label expands to a set of alias keywords that are
//! searched for in project names, client names and project codes.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::event::CalendarEvent;
use crate::labels::{LabelUsage, label_usage};
use crate::mapping::{MappingEngine, MappingError};
use crate::rule::{MappingRule, TimesheetTarget};
use crate::store::{CalendarSource, Project, ProjectCatalog, RuleStore};
use crate::types::{Confidence, UserId, ValidationError};

/// Default trailing window for suggestions.
pub const DEFAULT_SUGGESTION_WEEKS: u32 = 4;
/// Default trailing window for calendar insights.
pub const DEFAULT_INSIGHT_WEEKS: u32 = 8;

const NAME_WEIGHT: f64 = 1.0;
const CLIENT_WEIGHT: f64 = 0.8;
const CODE_WEIGHT: f64 = 0.6;
const AI_BOOST: f64 = 0.5;
const CSAS_CLIENT_BOOST: f64 = 0.7;
const MIN_CONFIDENCE: f64 = 0.2;
const MATCHES_PER_LABEL: usize = 3;
const MAX_SUGGESTIONS: usize = 10;
const OBVIOUS_CONFIDENCE: f64 = 0.95;
const MAX_SAMPLE_EVENTS: usize = 3;
const LONG_EVENT_HOURS: f64 = 2.0;
const TOP_KEYWORDS: usize = 5;
const TOP_PROJECTS: usize = 3;

/// Alias keywords searched for each known label (lower-case).
pub const LABEL_KEYWORDS: &[(&str, &[&str])] = &[
    ("dp", &["direct people", "dp", "people"]),
    ("čsas promise", &["čsas", "promise", "česká spořitelna"]),
    ("finshape", &["finshape", "fin shape"]),
    (
        "čsas kalendář",
        &["čsas", "kalendář", "calendar", "česká spořitelna"],
    ),
    (
        "čsas ai research",
        &["čsas", "ai research", "research", "česká spořitelna"],
    ),
    (
        "ai",
        &["ai", "artificial intelligence", "machine learning", "ml"],
    ),
    ("elena", &["elena"]),
    ("sales", &["sales", "prodej", "obchod"]),
    ("osobní", &["personal", "osobní", "private"]),
    ("linet", &["linet"]),
    ("grada", &["grada", "medica", "grada medica"]),
];

/// Labels that map straight onto a project of the same name.
const OBVIOUS_MATCHES: &[(&str, &str)] = &[
    ("ai", "ai"),
    ("elena", "elena"),
    ("sales", "sales"),
    ("finshape", "finshape"),
];

const AI_TERMS: &[&str] = &["ai", "artificial", "intelligence", "machine", "learning"];
const CSAS_LABELS: &[&str] = &["čsas promise", "čsas kalendář", "čsas ai research"];

static PUNCTUATION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").unwrap());

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "is",
    "are", "was", "were", "be", "been", "have", "has", "had", "do", "does", "did", "will",
    "would", "could", "should", "may", "might", "can", "this", "that", "these", "those", "i",
    "you", "he", "she", "it", "we", "they", "me", "him", "her", "us", "them",
];

/// A proposed `label -> project/task` rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingSuggestion {
    pub calendar_label: String,
    pub project_id: i64,
    pub project_name: String,
    pub task_id: Option<i64>,
    pub task_name: String,
    pub client_name: String,
    pub confidence: Confidence,
    pub reasoning: String,
    pub frequency: u32,
    pub total_hours: f64,
    pub avg_duration: f64,
    pub sample_events: Vec<String>,
    pub label_color: Option<String>,
    pub label_description: Option<String>,
}

impl MappingSuggestion {
    fn new(usage: &LabelUsage, project: &Project, confidence: f64, reasoning: String) -> Self {
        let task = project.default_task();
        Self {
            calendar_label: usage.label.clone(),
            project_id: project.id,
            project_name: project.name.clone(),
            task_id: task.map(|t| t.id),
            task_name: task.map_or_else(|| "General".to_string(), |t| t.name.clone()),
            client_name: project
                .client_name
                .clone()
                .unwrap_or_else(|| "No Client".to_string()),
            confidence: Confidence::clamped(confidence),
            reasoning,
            frequency: usage.frequency,
            total_hours: usage.total_hours,
            avg_duration: usage.avg_duration,
            sample_events: usage
                .sample_events
                .iter()
                .take(MAX_SAMPLE_EVENTS)
                .cloned()
                .collect(),
            label_color: usage.color.clone(),
            label_description: usage.description.clone(),
        }
    }
}

fn sort_by_confidence(suggestions: &mut [MappingSuggestion]) {
    suggestions.sort_by(|a, b| {
        b.confidence
            .value()
            .total_cmp(&a.confidence.value())
            .then(b.frequency.cmp(&a.frequency))
    });
}

/// Alias keywords for a lower-cased label. Unknown labels search for
/// themselves.
fn label_keywords(label: &str) -> Vec<&str> {
    LABEL_KEYWORDS
        .iter()
        .find(|(known, _)| *known == label)
        .map_or_else(|| vec![label], |(_, keywords)| keywords.to_vec())
}

struct ScoredProject<'a> {
    project: &'a Project,
    confidence: f64,
    reasoning: String,
}

fn score_project<'a>(label: &str, keywords: &[&str], project: &'a Project) -> ScoredProject<'a> {
    let name = project.name.to_lowercase();
    let client = project
        .client_name
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();
    let code = project.code.as_deref().unwrap_or_default().to_lowercase();

    let mut score = 0.0;
    let mut reasons = Vec::new();
    for keyword in keywords {
        if name.contains(keyword) {
            score += NAME_WEIGHT;
            reasons.push(format!("'{keyword}' found in project name"));
        } else if client.contains(keyword) {
            score += CLIENT_WEIGHT;
            reasons.push(format!("'{keyword}' found in client name"));
        } else if code.contains(keyword) {
            score += CODE_WEIGHT;
            reasons.push(format!("'{keyword}' found in project code"));
        }
    }

    if label == "ai" && AI_TERMS.iter().any(|term| name.contains(term)) {
        score += AI_BOOST;
        reasons.push("AI-related project detected".to_string());
    }
    if CSAS_LABELS.contains(&label) && client.contains("čsas") {
        score += CSAS_CLIENT_BOOST;
        reasons.push("ČSAS client match".to_string());
    }

    #[expect(clippy::cast_precision_loss, reason = "keyword lists are tiny")]
    let confidence = (score / keywords.len() as f64).min(1.0);
    ScoredProject {
        project,
        confidence,
        reasoning: reasons.join("; "),
    }
}

fn best_matches<'a>(usage: &LabelUsage, projects: &'a [Project]) -> Vec<ScoredProject<'a>> {
    let label = usage.label.to_lowercase();
    let keywords = label_keywords(&label);
    let mut matches: Vec<ScoredProject<'a>> = projects
        .iter()
        .map(|project| score_project(&label, &keywords, project))
        .filter(|m| m.confidence > MIN_CONFIDENCE)
        .map(|mut m| {
            if m.reasoning.is_empty() {
                m.reasoning = format!("Partial match with '{label}'");
            }
            m
        })
        .collect();
    matches.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    matches.truncate(MATCHES_PER_LABEL);
    matches
}

fn obvious_match<'a>(usage: &LabelUsage, projects: &'a [Project]) -> Option<&'a Project> {
    let label = usage.label.to_lowercase();
    let (_, project_name) = OBVIOUS_MATCHES.iter().find(|(known, _)| *known == label)?;
    // Later projects win on duplicate names.
    projects
        .iter()
        .rev()
        .find(|project| project.name.to_lowercase() == *project_name)
}

/// Ranks projects for every used label the user has not mapped yet.
///
/// Obvious label/project name pairs are always proposed at 0.95 and replace
/// a scored suggestion for the same pair. At most ten suggestions are
/// returned, best first.
pub fn generate_suggestions(
    usage: &[LabelUsage],
    projects: &[Project],
    user_rules: &[MappingRule],
) -> Vec<MappingSuggestion> {
    if projects.is_empty() {
        return Vec::new();
    }
    let mapped: Vec<String> = user_rules
        .iter()
        .filter(|rule| rule.active)
        .map(|rule| rule.calendar_label.to_lowercase())
        .collect();
    let unmapped: Vec<&LabelUsage> = usage
        .iter()
        .filter(|u| u.frequency > 0 && !mapped.contains(&u.label.to_lowercase()))
        .collect();

    let mut suggestions: Vec<MappingSuggestion> = unmapped
        .iter()
        .flat_map(|u| {
            best_matches(u, projects).into_iter().map(move |m| {
                MappingSuggestion::new(u, m.project, m.confidence, m.reasoning)
            })
        })
        .collect();

    for u in &unmapped {
        let Some(project) = obvious_match(u, projects) else {
            continue;
        };
        suggestions.retain(|s| !(s.calendar_label == u.label && s.project_id == project.id));
        suggestions.push(MappingSuggestion::new(
            u,
            project,
            OBVIOUS_CONFIDENCE,
            format!("Exact match: '{}' → '{}'", u.label, project.name),
        ));
    }

    sort_by_confidence(&mut suggestions);
    suggestions.truncate(MAX_SUGGESTIONS);
    debug!(count = suggestions.len(), "generated mapping suggestions");
    suggestions
}

/// A mapping rule reduced to the signals used for learning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelPattern {
    pub label: String,
    pub keywords: Vec<String>,
    pub project_id: i64,
    pub project_name: String,
}

/// What the user's existing rules say about their preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MappingInsights {
    pub insights: Vec<String>,
    pub patterns: Vec<LabelPattern>,
    /// keyword -> project id -> number of rules.
    pub keyword_associations: BTreeMap<String, BTreeMap<i64, u32>>,
    /// project id -> number of rules.
    pub project_preferences: BTreeMap<i64, u32>,
}

impl MappingInsights {
    fn project_frequency(&self, project_id: i64) -> u32 {
        self.project_preferences
            .get(&project_id)
            .copied()
            .unwrap_or_default()
    }
}

/// Summarises the user's active rules.
pub fn learn_from_user_mappings(rules: &[MappingRule]) -> MappingInsights {
    let rules: Vec<&MappingRule> = rules.iter().filter(|rule| rule.active).collect();
    if rules.is_empty() {
        return MappingInsights::default();
    }

    let mut insights = MappingInsights::default();
    let mut project_order = Counter::default();
    for rule in &rules {
        let keywords = keywords_of(&rule.calendar_label);
        let project_id = rule.target.project_id;
        *insights.project_preferences.entry(project_id).or_default() += 1;
        project_order.add(project_id);
        for keyword in &keywords {
            *insights
                .keyword_associations
                .entry(keyword.clone())
                .or_default()
                .entry(project_id)
                .or_default() += 1;
        }
        insights.patterns.push(LabelPattern {
            label: rule.calendar_label.clone(),
            keywords,
            project_id,
            project_name: rule.target.project_name.clone(),
        });
    }

    let top: Vec<String> = project_order
        .most_common(TOP_PROJECTS)
        .into_iter()
        .map(|(id, _)| id.to_string())
        .collect();
    insights.insights.push(format!(
        "Most frequently mapped projects: {}",
        top.join(", ")
    ));

    let strong = insights
        .keyword_associations
        .values()
        .filter(|projects| projects.len() == 1 && projects.values().all(|&n| n > 1))
        .count();
    if strong > 0 {
        insights.insights.push(format!(
            "Strong keyword-project associations found for {strong} keywords"
        ));
    }
    insights
}

/// Re-ranks suggestions with what the user's rules reveal.
///
/// Projects already used by several rules gain up to 0.2, a prior rule
/// with the same label and project gains 0.3, and prior labels sharing a
/// word gain 0.1 each.
pub fn get_enhanced_suggestions(
    base: Vec<MappingSuggestion>,
    learned: &MappingInsights,
) -> Vec<MappingSuggestion> {
    let mut enhanced: Vec<MappingSuggestion> = base
        .into_iter()
        .map(|mut suggestion| {
            let label = suggestion.calendar_label.to_lowercase();
            let project_frequency = learned.project_frequency(suggestion.project_id);
            let mut boost = 0.0;
            if project_frequency > 0 {
                boost += (f64::from(project_frequency) * 0.1).min(0.2);
            }
            for pattern in &learned.patterns {
                let prior = pattern.label.to_lowercase();
                if prior == label && pattern.project_id == suggestion.project_id {
                    boost += 0.3;
                    break;
                } else if label.split_whitespace().any(|word| prior.contains(word)) {
                    boost += 0.1;
                }
            }

            suggestion.confidence = Confidence::clamped(suggestion.confidence.value() + boost);
            if boost > 0.0 && project_frequency > 0 {
                suggestion.reasoning.push_str(&format!(
                    "; frequently used project ({project_frequency} existing mappings)"
                ));
            }
            suggestion
        })
        .collect();
    sort_by_confidence(&mut enhanced);
    enhanced
}

/// Counts occurrences, keeping first-seen order for ties.
#[derive(Debug)]
struct Counter<K> {
    counts: Vec<(K, u32)>,
}

impl<K> Default for Counter<K> {
    fn default() -> Self {
        Self { counts: Vec::new() }
    }
}

impl<K: PartialEq + Clone> Counter<K> {
    fn add(&mut self, key: K) {
        match self.counts.iter_mut().find(|(k, _)| *k == key) {
            Some((_, n)) => *n += 1,
            None => self.counts.push((key, 1)),
        }
    }

    fn max(&self) -> Option<(K, u32)> {
        self.counts
            .iter()
            .fold(None::<&(K, u32)>, |best, item| match best {
                Some(b) if b.1 >= item.1 => Some(b),
                _ => Some(item),
            })
            .cloned()
    }

    fn most_common(&self, n: usize) -> Vec<(K, u32)> {
        let mut sorted = self.counts.clone();
        sorted.sort_by(|a, b| b.1.cmp(&a.1));
        sorted.truncate(n);
        sorted
    }
}

/// Lower-cased words of more than two characters, punctuation and common
/// English stop words removed.
fn keywords_of(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    PUNCTUATION_RE
        .replace_all(&lowered, " ")
        .split_whitespace()
        .filter(|word| word.chars().count() > 2 && !STOP_WORDS.contains(word))
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LongEvent {
    pub summary: String,
    pub duration: f64,
}

/// Descriptive statistics over a window of calendar events.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CalendarInsights {
    pub total_events: usize,
    pub total_hours: f64,
    pub avg_event_duration: f64,
    /// (weekday, events) in first-seen order.
    pub events_by_day: Vec<(String, u32)>,
    /// (hour, events) in first-seen order.
    pub events_by_hour: Vec<(u32, u32)>,
    pub top_keywords: Vec<(String, u32)>,
    pub long_events: Vec<LongEvent>,
    pub insights: Vec<String>,
    pub weeks_analyzed: u32,
}

/// Aggregates when and how long the user meets.
///
/// Weekday and hour are taken in each event's own offset.
pub fn analyze_calendar_patterns(events: &[CalendarEvent], weeks: u32) -> CalendarInsights {
    use chrono::Timelike;

    if events.is_empty() {
        return CalendarInsights {
            weeks_analyzed: weeks,
            ..CalendarInsights::default()
        };
    }

    let mut by_day = Counter::default();
    let mut by_hour = Counter::default();
    let mut keywords = Counter::default();
    let mut long_events = Vec::new();
    for event in events {
        by_day.add(event.start.format("%A").to_string());
        by_hour.add(event.start.hour());
        for keyword in keywords_of(&event.summary) {
            keywords.add(keyword);
        }
        if event.duration > LONG_EVENT_HOURS {
            long_events.push(LongEvent {
                summary: event.summary.clone(),
                duration: event.duration,
            });
        }
    }

    let total_hours: f64 = events.iter().map(|e| e.duration).sum();
    #[expect(clippy::cast_precision_loss, reason = "event counts are small")]
    let avg_event_duration = total_hours / events.len() as f64;
    let top_keywords = keywords.most_common(TOP_KEYWORDS);

    let mut insights = Vec::new();
    if let Some((day, n)) = by_day.max() {
        insights.push(format!("Busiest day: {day} ({n} events)"));
    }
    if let Some((hour, n)) = by_hour.max() {
        insights.push(format!("Peak meeting hour: {hour}:00 ({n} events)"));
    }
    if !top_keywords.is_empty() {
        let listed: Vec<String> = top_keywords
            .iter()
            .map(|(keyword, n)| format!("{keyword} ({n})"))
            .collect();
        insights.push(format!("Most common keywords: {}", listed.join(", ")));
    }
    if weeks > 0 {
        let per_week = total_hours / f64::from(weeks);
        insights.push(format!("Average meeting time: {per_week:.1} hours/week"));
    }

    CalendarInsights {
        total_events: events.len(),
        total_hours,
        avg_event_duration,
        events_by_day: by_day.counts,
        events_by_hour: by_hour.counts,
        top_keywords,
        long_events,
        insights,
        weeks_analyzed: weeks,
    }
}

/// Outcome of turning suggestions into label rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppliedSuggestions {
    pub created_count: usize,
    /// Labels that received a rule, in input order.
    pub created: Vec<String>,
    pub errors: Vec<String>,
}

/// Creates a label rule for each suggestion.
///
/// Rules go through [`MappingEngine::create_mapping`], so an already mapped
/// label or a project without tasks is reported and the batch continues.
pub fn apply_suggestions<S>(
    engine: &mut MappingEngine,
    store: &mut S,
    user: &UserId,
    suggestions: &[MappingSuggestion],
) -> AppliedSuggestions
where
    S: RuleStore + ?Sized,
{
    let mut applied = AppliedSuggestions::default();
    for suggestion in suggestions {
        let label = suggestion.calendar_label.as_str();
        let target = TimesheetTarget {
            project_id: suggestion.project_id,
            project_name: suggestion.project_name.clone(),
            task_id: suggestion.task_id.unwrap_or_default(),
            task_name: suggestion.task_name.clone(),
        };
        match engine.create_mapping(store, user, label, &target) {
            Ok(_) => {
                applied.created_count += 1;
                applied.created.push(label.to_string());
            }
            Err(MappingError::Invalid(ValidationError::DuplicateLabel { .. })) => {
                applied
                    .errors
                    .push(format!("Mapping for '{label}' already exists"));
            }
            Err(err) => {
                warn!(label, error = %err, "could not apply suggestion");
                applied
                    .errors
                    .push(format!("Error creating mapping for '{label}': {err}"));
            }
        }
    }
    info!(
        user = %user,
        created = applied.created_count,
        errors = applied.errors.len(),
        "applied suggestions"
    );
    applied
}

/// Drives suggestion generation through the collaborators.
///
/// Collaborator failures are logged and yield an empty result.
#[derive(Debug, Clone, Copy)]
pub struct SuggestionEngine {
    weeks: u32,
}

impl Default for SuggestionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_SUGGESTION_WEEKS)
    }
}

impl SuggestionEngine {
    pub const fn new(weeks: u32) -> Self {
        Self { weeks }
    }

    pub const fn weeks(&self) -> u32 {
        self.weeks
    }

    fn inputs<C, P, S>(
        &self,
        calendar: &C,
        catalog: &P,
        store: &S,
        user: &UserId,
    ) -> Option<(Vec<LabelUsage>, Vec<Project>, Vec<MappingRule>)>
    where
        C: CalendarSource + ?Sized,
        P: ProjectCatalog + ?Sized,
        S: RuleStore + ?Sized,
    {
        let events = calendar
            .events_for_weeks(user, self.weeks)
            .inspect_err(|err| warn!(%user, error = %err, "could not load calendar events"))
            .ok()?;
        let usage = label_usage(&events, 1);
        if usage.iter().all(|u| u.frequency == 0) {
            return None;
        }
        let projects = catalog
            .projects()
            .inspect_err(|err| warn!(error = %err, "could not load projects"))
            .ok()?;
        let rules = store
            .active_rules(user)
            .inspect_err(|err| warn!(%user, error = %err, "could not load mapping rules"))
            .ok()?;
        Some((usage, projects, rules))
    }

    /// Suggestions for the user's recent labels.
    pub fn suggest_for_user<C, P, S>(
        &self,
        calendar: &C,
        catalog: &P,
        store: &S,
        user: &UserId,
    ) -> Vec<MappingSuggestion>
    where
        C: CalendarSource + ?Sized,
        P: ProjectCatalog + ?Sized,
        S: RuleStore + ?Sized,
    {
        self.inputs(calendar, catalog, store, user)
            .map(|(usage, projects, rules)| generate_suggestions(&usage, &projects, &rules))
            .unwrap_or_default()
    }

    /// Suggestions re-ranked by the user's existing rules.
    pub fn enhanced_for_user<C, P, S>(
        &self,
        calendar: &C,
        catalog: &P,
        store: &S,
        user: &UserId,
    ) -> Vec<MappingSuggestion>
    where
        C: CalendarSource + ?Sized,
        P: ProjectCatalog + ?Sized,
        S: RuleStore + ?Sized,
    {
        self.inputs(calendar, catalog, store, user)
            .map(|(usage, projects, rules)| {
                let base = generate_suggestions(&usage, &projects, &rules);
                get_enhanced_suggestions(base, &learn_from_user_mappings(&rules))
            })
            .unwrap_or_default()
    }

    /// Calendar statistics over the trailing `weeks` weeks.
    pub fn insights_for_user<C>(&self, calendar: &C, user: &UserId, weeks: u32) -> CalendarInsights
    where
        C: CalendarSource + ?Sized,
    {
        match calendar.events_for_weeks(user, weeks) {
            Ok(events) => analyze_calendar_patterns(&events, weeks),
            Err(err) => {
                warn!(%user, error = %err, "could not load calendar events");
                CalendarInsights {
                    weeks_analyzed: weeks,
                    ..CalendarInsights::default()
                }
            }
        }
    }
}
