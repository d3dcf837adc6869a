//! Calendar events as delivered by the calendar collaborator.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::types::{EventId, RecurringEventId, ValidationError};

/// A single calendar event.
///
/// Timestamps keep the offset the calendar reported so that the spent date
/// and the `HH:MM` times in notes match what the user sees in their calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Provider event ID (one occurrence of a series has its own ID).
    pub id: EventId,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    /// Duration in hours.
    pub duration: f64,
    /// Attendee email addresses.
    #[serde(default)]
    pub attendees: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizer: Option<String>,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring_event_id: Option<RecurringEventId>,
    /// Human readable recurrence description (e.g. "Weekly on Monday").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_pattern: Option<String>,
    /// Raw recurrence lines (`RRULE:...`) when the provider sent them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recurrence: Vec<String>,
    #[serde(default)]
    pub attendance_status: AttendanceStatus,
    /// Label derived from the event colour, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_color: Option<String>,
    /// Raw provider colour ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_id: Option<String>,
}

impl CalendarEvent {
    /// Summary, description and location joined with spaces, lower-cased.
    ///
    /// Empty parts are skipped.
    pub fn searchable_text(&self) -> String {
        [
            self.summary.as_str(),
            self.description.as_str(),
            self.location.as_str(),
        ]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
    }

    /// Date the event starts on, in the event's own offset.
    pub fn start_date(&self) -> NaiveDate {
        self.start.date_naive()
    }

    /// True when the event starts and ends on different calendar days.
    pub fn is_multi_day(&self) -> bool {
        self.start.date_naive() != self.end.date_naive()
    }

    /// The series ID when this occurrence belongs to a recurring event.
    pub fn series_id(&self) -> Option<&RecurringEventId> {
        if self.is_recurring {
            self.recurring_event_id.as_ref()
        } else {
            None
        }
    }
}

/// The user's response status for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttendanceStatus {
    Organizer,
    Accepted,
    Declined,
    Tentative,
    NeedsAction,
    #[default]
    Unknown,
}

impl AttendanceStatus {
    /// Wire representation used by the calendar provider.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Organizer => "organizer",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Tentative => "tentative",
            Self::NeedsAction => "needsAction",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "organizer" => Ok(Self::Organizer),
            "accepted" => Ok(Self::Accepted),
            "declined" => Ok(Self::Declined),
            "tentative" => Ok(Self::Tentative),
            "needsAction" => Ok(Self::NeedsAction),
            "unknown" => Ok(Self::Unknown),
            _ => Err(ValidationError::InvalidAttendanceStatus {
                value: s.to_string(),
            }),
        }
    }
}

impl Serialize for AttendanceStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AttendanceStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
