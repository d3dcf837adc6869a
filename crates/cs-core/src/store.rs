//! Collaborator interfaces consumed by the classification pipeline.
//!
//! Storage, the project catalog, the timesheet API and the calendar are all
//! owned outside this crate. Implementations live in `cs-db` and
//! `cs-harvest`; tests use in-memory fakes.

use std::collections::HashSet;
use std::error::Error as StdError;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bulk::PatternRule;
use crate::event::CalendarEvent;
use crate::rule::{MappingRule, RecurringOverride, TimesheetTarget};
use crate::types::{EventId, RecurringEventId, UserId, ValidationError};

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Failure reported by a storage collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend failed (I/O, SQL, serialization).
    #[error("storage backend error: {0}")]
    Backend(#[source] BoxError),
    /// The referenced record does not exist for this user.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
}

impl StoreError {
    pub fn backend(err: impl Into<BoxError>) -> Self {
        Self::Backend(err.into())
    }
}

/// Failure reported by a remote collaborator (calendar, timesheet API).
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request could not be completed.
    #[error("request failed: {0}")]
    Request(#[source] BoxError),
    /// The service answered with an error.
    #[error("service error: {message}")]
    Service { message: String },
}

impl ClientError {
    pub fn request(err: impl Into<BoxError>) -> Self {
        Self::Request(err.into())
    }
}

/// Whether an upsert created a new row or updated an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Updated,
}

/// Mapping rules and recurring overrides for a user.
pub trait RuleStore {
    /// All active mapping rules for the user, in creation order.
    fn active_rules(&self, user: &UserId) -> Result<Vec<MappingRule>, StoreError>;

    /// The active rule whose label equals `label` exactly.
    fn active_rule_by_label(
        &self,
        user: &UserId,
        label: &str,
    ) -> Result<Option<MappingRule>, StoreError>;

    /// Creates a rule for `label` or repoints the existing (active or not)
    /// rule with that label at `target`, reactivating it.
    fn upsert_rule(
        &mut self,
        user: &UserId,
        label: &str,
        target: &TimesheetTarget,
    ) -> Result<Upsert, StoreError>;

    /// Soft-deletes a rule. Returns false when no active rule had that ID.
    fn deactivate_rule(&mut self, user: &UserId, rule_id: i64) -> Result<bool, StoreError>;

    /// The active override for a recurring series, if any.
    fn recurring_override(
        &self,
        user: &UserId,
        series: &RecurringEventId,
    ) -> Result<Option<RecurringOverride>, StoreError>;

    fn list_recurring_overrides(&self, user: &UserId)
    -> Result<Vec<RecurringOverride>, StoreError>;

    /// Creates or replaces the override for a series (unique per user).
    fn upsert_recurring_override(
        &mut self,
        user: &UserId,
        series: &RecurringEventId,
        event_summary: &str,
        recurrence_description: Option<&str>,
        target: &TimesheetTarget,
    ) -> Result<Upsert, StoreError>;

    fn deactivate_recurring_override(
        &mut self,
        user: &UserId,
        series: &RecurringEventId,
    ) -> Result<bool, StoreError>;
}

/// Outcome of one submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Success,
    Error,
    Skipped,
}

impl ProcessingStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }
}

impl std::str::FromStr for ProcessingStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            "skipped" => Ok(Self::Skipped),
            _ => Err(ValidationError::InvalidProcessingStatus {
                value: s.to_string(),
            }),
        }
    }
}

/// Idempotency marker: one per attempted event per (user, week).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingRecord {
    pub user_id: UserId,
    pub week_start: NaiveDate,
    pub calendar_event_id: EventId,
    pub calendar_event_summary: String,
    pub harvest_time_entry_id: Option<i64>,
    pub project_id: i64,
    pub task_id: i64,
    pub hours: f64,
    pub status: ProcessingStatus,
    pub error_message: Option<String>,
    pub processed_at: DateTime<Utc>,
}

/// Persistent record of which events were already submitted.
pub trait ProcessingLog {
    fn processed_event_ids(
        &self,
        user: &UserId,
        week_start: NaiveDate,
    ) -> Result<HashSet<EventId>, StoreError>;

    fn record(&mut self, record: &ProcessingRecord) -> Result<(), StoreError>;
}

/// Storage for bulk pattern rules.
pub trait PatternRuleStore {
    /// Active and inactive rules for the user, oldest first.
    fn pattern_rules(&self, user: &UserId) -> Result<Vec<PatternRule>, StoreError>;

    fn insert_pattern_rule(&mut self, rule: &PatternRule) -> Result<(), StoreError>;

    /// Persists mutable fields (`active`, `applied_count`).
    fn save_pattern_rule(&mut self, rule: &PatternRule) -> Result<(), StoreError>;

    fn deactivate_pattern_rule(&mut self, user: &UserId, rule_id: &str)
    -> Result<bool, StoreError>;
}

/// A task that can be booked against a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub name: String,
}

/// A project from the timesheet catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(default)]
    pub is_billable: bool,
    /// Task assignments, default task first.
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Project {
    pub fn default_task(&self) -> Option<&Task> {
        self.tasks.first()
    }
}

/// Source of the user's projects and tasks.
pub trait ProjectCatalog {
    fn projects(&self) -> Result<Vec<Project>, ClientError>;
}

/// A time entry as stored by the timesheet service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: i64,
    pub spent_date: NaiveDate,
    pub hours: f64,
    #[serde(default)]
    pub notes: String,
    pub project_id: i64,
    pub task_id: i64,
}

/// A time entry to be created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTimeEntry {
    pub project_id: i64,
    pub task_id: i64,
    pub spent_date: NaiveDate,
    pub hours: f64,
    pub notes: String,
}

/// Write access to the timesheet service.
pub trait TimesheetClient {
    fn create_entry(&self, entry: &NewTimeEntry) -> Result<TimeEntry, ClientError>;

    /// Returns false when the service refused the deletion.
    fn delete_entry(&self, entry_id: i64) -> Result<bool, ClientError>;

    fn entries_on(&self, date: NaiveDate) -> Result<Vec<TimeEntry>, ClientError>;
}

/// Read access to the user's calendar.
pub trait CalendarSource {
    /// Events from the trailing `weeks` weeks.
    fn events_for_weeks(
        &self,
        user: &UserId,
        weeks: u32,
    ) -> Result<Vec<CalendarEvent>, ClientError>;
}
