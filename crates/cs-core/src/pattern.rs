//! Signal extraction from a single calendar event.
//!
//! The engine scans the event's searchable text against static alias tables
//! (companies, meeting types, project types), and summarises attendee,
//! time-of-day and location shape plus a handful of keywords. Analysis is
//! infallible; the worst case is [`PatternAnalysis::empty`].

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use chrono::Timelike;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::event::CalendarEvent;
use crate::learning::LearnedAssociations;
use crate::rule::TimesheetTarget;
use crate::types::Confidence;

static KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\w{3,}\b").unwrap());

const MAX_KEYWORDS: usize = 5;

const STOP_WORDS: &[&str] = &[
    "meeting", "call", "with", "and", "the", "for", "in", "on", "at", "to", "schůze", "hovor", "s",
    "a", "v", "na", "do", "ze", "pro",
];

/// A canonical name and the lower-case aliases that signal it.
pub type AliasGroup = (&'static str, &'static [&'static str]);

pub const COMPANIES: &[AliasGroup] = &[
    (
        "čsas",
        &["čsas", "csas", "česká spořitelna", "ceska sporitelna"],
    ),
    ("finshape", &["finshape", "fin shape"]),
    ("dp", &["dp", "direct people", "directpeople"]),
    ("grada", &["grada", "grada medica"]),
    ("osobní", &["osobní", "osobni", "personal", "private"]),
];

pub const MEETING_TYPES: &[AliasGroup] = &[
    ("standup", &["standup", "stand-up", "daily", "scrum"]),
    ("review", &["review", "retrospective", "retro", "demo"]),
    ("planning", &["planning", "plan", "sprint planning"]),
    ("meeting", &["meeting", "call", "discussion", "sync"]),
    ("workshop", &["workshop", "training", "session"]),
    ("interview", &["interview", "pohovor", "recruitment"]),
    ("lunch", &["lunch", "oběd", "obed", "jídlo"]),
    ("break", &["break", "pauza", "coffee", "káva"]),
];

pub const PROJECT_TYPES: &[AliasGroup] = &[
    ("development", &["dev", "development", "coding", "programming"]),
    ("research", &["research", "analysis", "study", "investigation"]),
    ("management", &["management", "admin", "coordination"]),
    ("sales", &["sales", "business", "commercial", "client"]),
    ("marketing", &["marketing", "promotion", "campaign"]),
];

const ONLINE_HINTS: &[&str] = &["zoom", "teams", "meet", "webex", "skype"];
const OFFICE_HINTS: &[&str] = &["office", "kancelář", "workplace"];
const REMOTE_HINTS: &[&str] = &["home", "doma", "remote"];

/// One alias hit in the event text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Canonical name of the company or type.
    pub name: String,
    /// The alias that matched.
    pub alias: String,
    pub confidence: Confidence,
    /// Byte offset of the first occurrence in the searchable text.
    pub position: usize,
}

/// Shape of the attendee list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendeeKind {
    /// All attendees share one email domain.
    Internal,
    Mixed,
    NoAttendees,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendeesPattern {
    pub count: usize,
    /// Distinct domains in first-seen order.
    pub domains: Vec<String>,
    pub primary_domain: Option<String>,
    pub kind: AttendeeKind,
}

/// Part of the day an event starts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBucket {
    EarlyMorning,
    Morning,
    LunchTime,
    Afternoon,
    Evening,
    Unknown,
}

impl TimeBucket {
    pub const fn from_hour(hour: u32) -> Self {
        match hour {
            0..=8 => Self::EarlyMorning,
            9..=11 => Self::Morning,
            12..=13 => Self::LunchTime,
            14..=16 => Self::Afternoon,
            _ => Self::Evening,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::EarlyMorning => "early_morning",
            Self::Morning => "morning",
            Self::LunchTime => "lunch_time",
            Self::Afternoon => "afternoon",
            Self::Evening => "evening",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimePattern {
    pub bucket: TimeBucket,
    /// Hours between start and end.
    pub duration: Option<f64>,
    pub start_hour: Option<u32>,
    pub is_long: bool,
    pub is_short: bool,
}

impl TimePattern {
    const fn unknown() -> Self {
        Self {
            bucket: TimeBucket::Unknown,
            duration: None,
            start_hour: None,
            is_long: false,
            is_short: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    Online,
    Office,
    Remote,
    Physical,
    NoLocation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationPattern {
    pub kind: LocationKind,
    /// Lower-cased location text (platform for online meetings).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Everything the engine could say about one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternAnalysis {
    /// Company hits, best first.
    pub company: Vec<Detection>,
    pub meeting_type: Vec<Detection>,
    pub project_type: Vec<Detection>,
    pub attendees: AttendeesPattern,
    pub time: TimePattern,
    pub location: LocationPattern,
    pub keywords: Vec<String>,
    pub confidence: Confidence,
}

impl PatternAnalysis {
    /// An analysis with no signals and zero confidence.
    pub const fn empty() -> Self {
        Self {
            company: Vec::new(),
            meeting_type: Vec::new(),
            project_type: Vec::new(),
            attendees: AttendeesPattern {
                count: 0,
                domains: Vec::new(),
                primary_domain: None,
                kind: AttendeeKind::NoAttendees,
            },
            time: TimePattern::unknown(),
            location: LocationPattern {
                kind: LocationKind::NoLocation,
                detail: None,
            },
            keywords: Vec::new(),
            confidence: Confidence::MIN,
        }
    }

    pub fn best_company(&self) -> Option<&Detection> {
        self.company.first()
    }
}

/// Extracts [`PatternAnalysis`] from events using fixed alias tables.
#[derive(Debug, Clone, Copy)]
pub struct PatternEngine {
    companies: &'static [AliasGroup],
    meeting_types: &'static [AliasGroup],
    project_types: &'static [AliasGroup],
}

impl Default for PatternEngine {
    fn default() -> Self {
        Self {
            companies: COMPANIES,
            meeting_types: MEETING_TYPES,
            project_types: PROJECT_TYPES,
        }
    }
}

impl PatternEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn analyze(&self, event: &CalendarEvent) -> PatternAnalysis {
        let text = event.searchable_text();

        let mut analysis = PatternAnalysis {
            company: detect_companies(self.companies, &text),
            meeting_type: detect(self.meeting_types, &text, |alias| {
                if text.starts_with(alias) { 0.8 } else { 0.6 }
            }),
            project_type: detect(self.project_types, &text, |_| 0.7),
            attendees: analyze_attendees(&event.attendees),
            time: analyze_time(event),
            location: analyze_location(&event.location),
            keywords: extract_keywords(&text),
            confidence: Confidence::MIN,
        };
        analysis.confidence = overall_confidence(&analysis);
        analysis
    }

    /// Records that `event` was billed to `target`.
    ///
    /// This is the only way learned associations grow.
    pub fn learn_from_mapping(
        &self,
        learned: &mut LearnedAssociations,
        event: &CalendarEvent,
        target: &TimesheetTarget,
    ) {
        let analysis = self.analyze(event);
        learned.record(&target.project_name, &analysis);
    }
}

fn detect_companies(groups: &[AliasGroup], text: &str) -> Vec<Detection> {
    let text_len = text.chars().count();
    detect(groups, text, |alias| {
        #[expect(clippy::cast_precision_loss, reason = "text lengths are small")]
        let ratio = alias.chars().count() as f64 / text_len as f64;
        ratio * 2.0
    })
}

fn detect(groups: &[AliasGroup], text: &str, score: impl Fn(&str) -> f64) -> Vec<Detection> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut detected: Vec<Detection> = groups
        .iter()
        .flat_map(|(name, aliases)| aliases.iter().map(move |alias| (*name, *alias)))
        .filter_map(|(name, alias)| {
            let position = text.find(alias)?;
            Some(Detection {
                name: name.to_string(),
                alias: alias.to_string(),
                confidence: Confidence::clamped(score(alias)),
                position,
            })
        })
        .collect();
    // Stable: equal scores keep table order.
    detected.sort_by(|a, b| b.confidence.value().total_cmp(&a.confidence.value()));
    detected
}

fn analyze_attendees(attendees: &[String]) -> AttendeesPattern {
    if attendees.is_empty() {
        return PatternAnalysis::empty().attendees;
    }

    let mut domains: Vec<String> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();
    for email in attendees {
        let Some((_, domain)) = email.split_once('@') else {
            continue;
        };
        let domain = domain.to_lowercase();
        match domains.iter().position(|d| *d == domain) {
            Some(i) => counts[i] += 1,
            None => {
                domains.push(domain);
                counts.push(1);
            }
        }
    }

    // First-seen wins ties.
    let primary_domain = counts
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, usize)>, (i, &n)| match best {
            Some((_, best_n)) if best_n >= n => best,
            _ => Some((i, n)),
        })
        .map(|(i, _)| domains[i].clone());

    let kind = if domains.len() == 1 {
        AttendeeKind::Internal
    } else {
        AttendeeKind::Mixed
    };

    AttendeesPattern {
        count: attendees.len(),
        domains,
        primary_domain,
        kind,
    }
}

fn analyze_time(event: &CalendarEvent) -> TimePattern {
    let elapsed = event.end - event.start;
    if elapsed < chrono::TimeDelta::zero() {
        return TimePattern::unknown();
    }
    #[expect(clippy::cast_precision_loss, reason = "event lengths fit in f64")]
    let duration = elapsed.num_seconds() as f64 / 3600.0;
    let hour = event.start.hour();

    TimePattern {
        bucket: TimeBucket::from_hour(hour),
        duration: Some(duration),
        start_hour: Some(hour),
        is_long: duration > 2.0,
        is_short: duration < 0.5,
    }
}

fn analyze_location(location: &str) -> LocationPattern {
    let location = location.to_lowercase();
    if location.is_empty() {
        return LocationPattern {
            kind: LocationKind::NoLocation,
            detail: None,
        };
    }

    let has_any = |hints: &[&str]| hints.iter().any(|hint| location.contains(hint));
    let kind = if has_any(ONLINE_HINTS) {
        LocationKind::Online
    } else if has_any(OFFICE_HINTS) {
        LocationKind::Office
    } else if has_any(REMOTE_HINTS) {
        LocationKind::Remote
    } else {
        LocationKind::Physical
    };

    LocationPattern {
        kind,
        detail: Some(location),
    }
}

/// Up to five distinct non-stop-word tokens, in the order they first appear.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let text = text.to_lowercase();
    let mut seen = HashSet::new();
    KEYWORD_RE
        .find_iter(&text)
        .map(|m| m.as_str())
        .filter(|word| !STOP_WORDS.contains(word))
        .filter(|word| seen.insert(*word))
        .take(MAX_KEYWORDS)
        .map(str::to_string)
        .collect()
}

fn overall_confidence(analysis: &PatternAnalysis) -> Confidence {
    let mut score = 0.0;
    if let Some(company) = analysis.company.first() {
        score += company.confidence.value() * 0.4;
    }
    if let Some(meeting) = analysis.meeting_type.first() {
        score += meeting.confidence.value() * 0.3;
    }
    if analysis.attendees.count > 1 {
        score += 0.2;
    }
    if analysis.time.bucket != TimeBucket::Unknown {
        score += 0.1;
    }
    Confidence::clamped(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::fixtures::event;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn company_confidence_scales_with_alias_share_of_text() {
        let e = event(
            "e1",
            "DP standup with team",
            "2025-06-30T09:00:00+02:00",
            "2025-06-30T09:30:00+02:00",
        );
        let analysis = PatternEngine::new().analyze(&e);

        let best = analysis.best_company().unwrap();
        assert_eq!(best.name, "dp");
        assert_eq!(best.alias, "dp");
        // "dp standup with team" is 20 chars
        assert!(approx(best.confidence.value(), 2.0 / 20.0 * 2.0));
    }

    #[test]
    fn company_confidence_caps_at_one() {
        let e = event(
            "e1",
            "ČSAS",
            "2025-06-30T09:00:00Z",
            "2025-06-30T10:00:00Z",
        );
        let analysis = PatternEngine::new().analyze(&e);
        assert_eq!(analysis.company[0].name, "čsas");
        assert_eq!(analysis.company[0].confidence, Confidence::MAX);
    }

    #[test]
    fn meeting_type_prefers_leading_alias() {
        let e = event(
            "e1",
            "Standup and sprint review",
            "2025-06-30T09:00:00Z",
            "2025-06-30T09:15:00Z",
        );
        let analysis = PatternEngine::new().analyze(&e);
        let names: Vec<_> = analysis
            .meeting_type
            .iter()
            .map(|d| (d.name.as_str(), d.confidence.value()))
            .collect();
        assert_eq!(names, vec![("standup", 0.8), ("review", 0.6)]);
    }

    #[test]
    fn equal_scores_keep_table_order() {
        let e = event(
            "e1",
            "client research",
            "2025-06-30T09:00:00Z",
            "2025-06-30T10:00:00Z",
        );
        let analysis = PatternEngine::new().analyze(&e);
        let names: Vec<_> = analysis
            .project_type
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, vec!["research", "sales"]);
    }

    #[test]
    fn attendees_classified_by_domain() {
        let mut e = event(
            "e1",
            "Sync",
            "2025-06-30T09:00:00Z",
            "2025-06-30T10:00:00Z",
        );
        let engine = PatternEngine::new();

        assert_eq!(engine.analyze(&e).attendees.kind, AttendeeKind::NoAttendees);

        e.attendees = vec!["a@dp.cz".into(), "b@DP.cz".into()];
        let attendees = engine.analyze(&e).attendees;
        assert_eq!(attendees.kind, AttendeeKind::Internal);
        assert_eq!(attendees.domains, vec!["dp.cz"]);

        e.attendees = vec![
            "a@csas.cz".into(),
            "b@dp.cz".into(),
            "c@dp.cz".into(),
            "d@csas.cz".into(),
        ];
        let attendees = engine.analyze(&e).attendees;
        assert_eq!(attendees.kind, AttendeeKind::Mixed);
        assert_eq!(attendees.count, 4);
        assert_eq!(attendees.primary_domain.as_deref(), Some("csas.cz"));
    }

    #[test]
    fn time_buckets_follow_start_hour() {
        let cases = [
            (8, TimeBucket::EarlyMorning),
            (9, TimeBucket::Morning),
            (12, TimeBucket::LunchTime),
            (14, TimeBucket::Afternoon),
            (17, TimeBucket::Evening),
        ];
        for (hour, expected) in cases {
            assert_eq!(TimeBucket::from_hour(hour), expected, "hour {hour}");
        }
    }

    #[test]
    fn time_pattern_flags_long_and_short() {
        let engine = PatternEngine::new();
        let long = event(
            "e1",
            "Workshop",
            "2025-06-30T13:00:00+02:00",
            "2025-06-30T15:30:00+02:00",
        );
        let time = engine.analyze(&long).time;
        assert_eq!(time.bucket, TimeBucket::LunchTime);
        assert_eq!(time.start_hour, Some(13));
        assert!(time.is_long);
        assert!(!time.is_short);

        let short = event(
            "e2",
            "Coffee",
            "2025-06-30T16:00:00Z",
            "2025-06-30T16:15:00Z",
        );
        assert!(engine.analyze(&short).time.is_short);
    }

    #[test]
    fn malformed_event_has_unknown_time() {
        let e = event(
            "e1",
            "Backwards",
            "2025-06-30T10:00:00Z",
            "2025-06-30T09:00:00Z",
        );
        let analysis = PatternEngine::new().analyze(&e);
        assert_eq!(analysis.time.bucket, TimeBucket::Unknown);
    }

    #[test]
    fn location_classes() {
        let cases = [
            ("Zoom https://zoom.us/j/1", LocationKind::Online),
            ("Kancelář Praha", LocationKind::Office),
            ("Home", LocationKind::Remote),
            ("Café Louvre", LocationKind::Physical),
            ("", LocationKind::NoLocation),
        ];
        for (location, expected) in cases {
            assert_eq!(analyze_location(location).kind, expected, "{location}");
        }
    }

    #[test]
    fn keywords_keep_discovery_order_and_drop_stop_words() {
        let keywords = extract_keywords("Meeting with Grada about grada budget and roadmap for 2025 q3 plans");
        assert_eq!(keywords, vec!["grada", "about", "budget", "roadmap", "2025"]);
    }

    #[test]
    fn keywords_drop_czech_stop_words() {
        assert_eq!(extract_keywords("schůze pro tým na obědě"), vec!["tým", "obědě"]);
    }

    #[test]
    fn overall_confidence_combines_signals() {
        let mut e = event(
            "e1",
            "DP standup",
            "2025-06-30T09:00:00Z",
            "2025-06-30T09:15:00Z",
        );
        e.attendees = vec!["a@dp.cz".into(), "b@dp.cz".into()];
        let analysis = PatternEngine::new().analyze(&e);

        // company: 2/10*2 = 0.4; meeting: standup not leading -> 0.6
        let expected = 0.4 * 0.4 + 0.6 * 0.3 + 0.2 + 0.1;
        assert!(approx(analysis.confidence.value(), expected));
    }

    #[test]
    fn empty_event_yields_empty_signals() {
        let e = event(
            "e1",
            "",
            "2025-06-30T10:00:00Z",
            "2025-06-30T09:00:00Z",
        );
        let analysis = PatternEngine::new().analyze(&e);
        assert_eq!(analysis, PatternAnalysis::empty());
    }
}
