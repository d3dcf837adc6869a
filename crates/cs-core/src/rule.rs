//! Mapping rules, recurring overrides and the result of a rule match.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{RecurringEventId, UserId};

/// The timesheet project/task an event is billed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimesheetTarget {
    pub project_id: i64,
    pub project_name: String,
    pub task_id: i64,
    pub task_name: String,
}

/// A user-configured `calendar label -> project/task` association.
///
/// At most one active rule exists per (user, label). Rules are deactivated
/// rather than deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRule {
    pub id: i64,
    pub user_id: UserId,
    pub calendar_label: String,
    pub target: TimesheetTarget,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A permanent mapping for every occurrence of a recurring event series.
///
/// Takes precedence over all label and text matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringOverride {
    pub id: i64,
    pub user_id: UserId,
    pub recurring_event_id: RecurringEventId,
    /// Event title, for display.
    pub event_summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_description: Option<String>,
    pub target: TimesheetTarget,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// How a label rule was selected for an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", content = "detail", rename_all = "snake_case")]
pub enum LabelMatch {
    /// The event's colour-derived label equals the rule label.
    ExtractedLabel,
    /// A detected company name occurs inside the rule label.
    Company(String),
    /// The rule label won free-text scoring.
    FreeText,
}

/// Where a match came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum MatchSource {
    Label {
        rule_id: i64,
        calendar_label: String,
        via: LabelMatch,
    },
    Recurring {
        override_id: i64,
        recurring_event_id: RecurringEventId,
        event_summary: String,
    },
}

/// The outcome of rule resolution for one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedRule {
    pub source: MatchSource,
    pub target: TimesheetTarget,
}

impl MatchedRule {
    pub(crate) fn from_rule(rule: &MappingRule, via: LabelMatch) -> Self {
        Self {
            source: MatchSource::Label {
                rule_id: rule.id,
                calendar_label: rule.calendar_label.clone(),
                via,
            },
            target: rule.target.clone(),
        }
    }

    pub(crate) fn from_override(rule: &RecurringOverride) -> Self {
        Self {
            source: MatchSource::Recurring {
                override_id: rule.id,
                recurring_event_id: rule.recurring_event_id.clone(),
                event_summary: rule.event_summary.clone(),
            },
            target: rule.target.clone(),
        }
    }

    /// Label shown on drafts: the rule label, or the series title for overrides.
    pub fn label(&self) -> &str {
        match &self.source {
            MatchSource::Label { calendar_label, .. } => calendar_label,
            MatchSource::Recurring { event_summary, .. } => event_summary,
        }
    }

    pub const fn is_recurring(&self) -> bool {
        matches!(self.source, MatchSource::Recurring { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> TimesheetTarget {
        TimesheetTarget {
            project_id: 100,
            project_name: "Direct People".to_string(),
            task_id: 1,
            task_name: "Meetings".to_string(),
        }
    }

    #[test]
    fn matched_rule_label_depends_on_source() {
        let now = Utc::now();
        let rule = MappingRule {
            id: 7,
            user_id: UserId::new("u1").unwrap(),
            calendar_label: "DP".to_string(),
            target: target(),
            active: true,
            created_at: now,
            updated_at: now,
        };
        let matched = MatchedRule::from_rule(&rule, LabelMatch::FreeText);
        assert_eq!(matched.label(), "DP");
        assert!(!matched.is_recurring());

        let series = RecurringOverride {
            id: 3,
            user_id: UserId::new("u1").unwrap(),
            recurring_event_id: RecurringEventId::new("series-1").unwrap(),
            event_summary: "Weekly planning".to_string(),
            recurrence_description: None,
            target: target(),
            active: true,
            created_at: now,
            updated_at: now,
        };
        let matched = MatchedRule::from_override(&series);
        assert_eq!(matched.label(), "Weekly planning");
        assert!(matched.is_recurring());
    }

    #[test]
    fn match_source_serializes_with_tag() {
        let matched = MatchedRule {
            source: MatchSource::Label {
                rule_id: 1,
                calendar_label: "AI".to_string(),
                via: LabelMatch::Company("dp".to_string()),
            },
            target: target(),
        };
        let json = serde_json::to_value(&matched).unwrap();
        assert_eq!(json["source"]["source"], "label");
        assert_eq!(json["source"]["via"]["step"], "company");
        assert_eq!(json["source"]["via"]["detail"], "dp");
    }
}
