//! Calendar labels: colour-coded tags and their usage statistics.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::Serialize;

use crate::event::CalendarEvent;

/// Colour shown for labels that have no colour of their own.
pub const DEFAULT_LABEL_COLOR: &str = "#9fc6e7";

const MAX_SAMPLE_EVENTS: usize = 3;

/// A label the user has set up in their calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredefinedLabel {
    pub text: &'static str,
    /// Calendar provider colour ID the label is bound to.
    pub color_id: &'static str,
    pub color: &'static str,
    pub description: &'static str,
}

pub const PREDEFINED_LABELS: &[PredefinedLabel] = &[
    PredefinedLabel {
        text: "DP",
        color_id: "8",
        color: "#e1e1e1",
        description: "Direct People related events",
    },
    PredefinedLabel {
        text: "ČSAS Promise",
        color_id: "5",
        color: "#fbd75b",
        description: "ČSAS Promise project",
    },
    PredefinedLabel {
        text: "Finshape",
        color_id: "2",
        color: "#7ae7bf",
        description: "Finshape related events",
    },
    PredefinedLabel {
        text: "ČSAS Kalendář",
        color_id: "9",
        color: "#5484ed",
        description: "ČSAS Calendar events",
    },
    PredefinedLabel {
        text: "AI",
        color_id: "6",
        color: "#ffb878",
        description: "AI related events",
    },
    PredefinedLabel {
        text: "Sales",
        color_id: "10",
        color: "#51b749",
        description: "Sales activities",
    },
    PredefinedLabel {
        text: "Osobní",
        color_id: "3",
        color: "#dbadff",
        description: "Personal events",
    },
    PredefinedLabel {
        text: "Buřinka",
        color_id: "11",
        color: "#dc2127",
        description: "Buřinka project events",
    },
    PredefinedLabel {
        text: "Grada",
        color_id: "4",
        color: "#ff887c",
        description: "Grada Medica project",
    },
];

pub fn predefined(text: &str) -> Option<&'static PredefinedLabel> {
    PREDEFINED_LABELS.iter().find(|label| label.text == text)
}

/// The label bound to a provider colour ID.
pub fn label_for_color(color_id: &str) -> Option<&'static str> {
    PREDEFINED_LABELS
        .iter()
        .find(|label| label.color_id == color_id)
        .map(|label| label.text)
}

/// Display colour for a label; unknown labels get the default colour.
pub fn color_for_label(label: &str) -> &'static str {
    predefined(label).map_or(DEFAULT_LABEL_COLOR, |label| label.color)
}

/// Fills in the label, label colour and recurrence text when the calendar
/// export left them out.
pub fn enrich(event: &mut CalendarEvent) {
    if event.extracted_label.is_none() {
        event.extracted_label = event
            .color_id
            .as_deref()
            .and_then(label_for_color)
            .map(str::to_string);
    }
    if event.label_color.is_none() {
        event.label_color = event
            .extracted_label
            .as_deref()
            .map(|label| color_for_label(label).to_string());
    }
    if event.recurrence_pattern.is_none() && !event.recurrence.is_empty() {
        event.recurrence_pattern = Some(describe_recurrence(&event.recurrence));
    }
}

/// Turns `RRULE:` lines into text such as "Weekly on Monday and Thursday".
pub fn describe_recurrence(rules: &[String]) -> String {
    let Some(rule) = rules.first() else {
        return "Unknown pattern".to_string();
    };
    let Some(body) = rule.strip_prefix("RRULE:") else {
        return "Custom pattern".to_string();
    };

    let parts: HashMap<&str, &str> = body
        .split(';')
        .filter_map(|part| part.split_once('='))
        .collect();
    let Ok(interval) = parts.get("INTERVAL").map_or(Ok(1), |v| v.parse::<u32>()) else {
        return "Custom pattern".to_string();
    };
    let byday = parts.get("BYDAY").copied().unwrap_or_default();

    match (parts.get("FREQ").map(|f| f.to_lowercase()).as_deref(), interval) {
        (Some("daily"), 1) => "Daily".to_string(),
        (Some("daily"), n) => format!("Every {n} days"),
        (Some("weekly"), 1) if byday.is_empty() => "Weekly".to_string(),
        (Some("weekly"), 1) => format!("Weekly on {}", format_weekdays(byday)),
        (Some("weekly"), n) => format!("Every {n} weeks"),
        (Some("monthly"), 1) => "Monthly".to_string(),
        (Some("monthly"), n) => format!("Every {n} months"),
        (Some("yearly"), _) => "Yearly".to_string(),
        _ => "Custom pattern".to_string(),
    }
}

fn format_weekdays(byday: &str) -> String {
    let days: Vec<&str> = byday
        .split(',')
        .filter_map(|day| {
            // Drop ordinal prefixes such as "1MO".
            let code: String = day.chars().filter(char::is_ascii_alphabetic).collect();
            match code.as_str() {
                "MO" => Some("Monday"),
                "TU" => Some("Tuesday"),
                "WE" => Some("Wednesday"),
                "TH" => Some("Thursday"),
                "FR" => Some("Friday"),
                "SA" => Some("Saturday"),
                "SU" => Some("Sunday"),
                _ => None,
            }
        })
        .collect();

    match days.as_slice() {
        [] => String::new(),
        [one] => (*one).to_string(),
        [first, second] => format!("{first} and {second}"),
        [init @ .., last] => format!("{}, and {last}", init.join(", ")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelKind {
    Predefined,
    Extracted,
}

/// How much a label was used over a window of events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelUsage {
    pub label: String,
    pub kind: LabelKind,
    pub frequency: u32,
    /// Frequency over ten, capped at 1. Unused predefined labels get 1.
    pub confidence: f64,
    pub total_hours: f64,
    pub avg_duration: f64,
    pub sample_events: Vec<String>,
    pub color: Option<String>,
    pub description: Option<String>,
    pub color_id: Option<String>,
}

/// Aggregates label statistics over `events`.
///
/// Predefined labels come first in table order, including unused ones.
/// Other labels follow in first-seen order when used at least
/// `min_frequency` times.
pub fn label_usage(events: &[CalendarEvent], min_frequency: u32) -> Vec<LabelUsage> {
    let mut usage: Vec<LabelUsage> = PREDEFINED_LABELS
        .iter()
        .map(|label| LabelUsage {
            label: label.text.to_string(),
            kind: LabelKind::Predefined,
            frequency: 0,
            confidence: 0.0,
            total_hours: 0.0,
            avg_duration: 0.0,
            sample_events: Vec::new(),
            color: Some(label.color.to_string()),
            description: Some(label.description.to_string()),
            color_id: None,
        })
        .collect();

    for event in events {
        let Some(label) = event.extracted_label.as_deref() else {
            continue;
        };
        let index = match usage.iter().position(|u| u.label == label) {
            Some(index) => index,
            None => {
                usage.push(LabelUsage {
                    label: label.to_string(),
                    kind: LabelKind::Extracted,
                    frequency: 0,
                    confidence: 0.0,
                    total_hours: 0.0,
                    avg_duration: 0.0,
                    sample_events: Vec::new(),
                    color: None,
                    description: None,
                    color_id: None,
                });
                usage.len() - 1
            }
        };
        let entry = &mut usage[index];
        entry.frequency += 1;
        entry.total_hours += event.duration;
        if entry.sample_events.len() < MAX_SAMPLE_EVENTS {
            entry.sample_events.push(event.summary.clone());
        }
        entry.color_id.clone_from(&event.color_id);
    }

    usage.retain(|u| u.kind == LabelKind::Predefined || u.frequency >= min_frequency);
    for entry in &mut usage {
        let frequency = f64::from(entry.frequency);
        entry.confidence = if entry.frequency == 0 {
            1.0
        } else {
            (frequency / 10.0).min(1.0)
        };
        if entry.frequency > 0 {
            entry.avg_duration = entry.total_hours / frequency;
        }
    }
    usage
}

/// Events starting between midnight UTC on the Monday `weeks` weeks before
/// `now` and 24 hours after `now`.
pub fn trailing_window(events: &[CalendarEvent], weeks: u32, now: DateTime<Utc>) -> Vec<CalendarEvent> {
    let today = now.date_naive();
    let days_back = i64::from(weeks) * 7 + i64::from(today.weekday().num_days_from_monday());
    let start = (today - Duration::days(days_back)).and_time(chrono::NaiveTime::MIN).and_utc();
    let end = now + Duration::days(1);
    events
        .iter()
        .filter(|event| {
            let start_utc = event.start.with_timezone(&Utc);
            start_utc >= start && start_utc < end
        })
        .cloned()
        .collect()
}
