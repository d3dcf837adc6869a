//! Storage layer for calendar sync.
//!
//! Persists mapping rules, recurring overrides, bulk pattern rules,
//! processing history and learned associations using `rusqlite`, and
//! implements the `cs-core` storage traits on top of them.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! A `Database` instance can be moved between threads but cannot be shared
//! across threads without external synchronization.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in RFC 3339 format with millisecond precision
//! (e.g., `2025-06-30T09:30:00.000Z`), always UTC. Week start dates are stored
//! as `YYYY-MM-DD`.
//!
//! ## Uniqueness
//!
//! - at most one *active* mapping rule per (user, label), via a partial index
//! - one recurring override per (user, series)
//! - one processing record per (user, week, event); re-recording replaces it
//!
//! ## Learned associations
//!
//! Stored as one JSON document per user in `learned_associations.data`.

use std::collections::HashSet;
use std::error::Error as StdError;
use std::path::Path;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use cs_core::bulk::{ApplyTo, PatternRule, PatternType};
use cs_core::learning::LearnedAssociations;
use cs_core::rule::{MappingRule, RecurringOverride, TimesheetTarget};
use cs_core::store::{
    PatternRuleStore, ProcessingLog, ProcessingRecord, ProcessingStatus, RuleStore, StoreError,
    Upsert,
};
use cs_core::types::{EventId, RecurringEventId, UserId};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored JSON document could not be read or written.
    #[error("invalid learned associations for user {user_id}: {source}")]
    Json {
        user_id: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        Self::backend(err)
    }
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// Submission history totals for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingSummary {
    pub total_processed: u64,
    pub failed: u64,
    pub last_processed_at: Option<DateTime<Utc>>,
}

const RULE_COLUMNS: &str = "id, user_id, calendar_label, project_id, project_name, task_id, \
                            task_name, active, created_at, updated_at";

const OVERRIDE_COLUMNS: &str = "id, user_id, recurring_event_id, event_summary, \
                                recurrence_description, project_id, project_name, task_id, \
                                task_name, active, created_at, updated_at";

const PATTERN_COLUMNS: &str = "id, user_id, name, pattern_type, pattern_value, apply_to, \
                               case_sensitive, project_id, project_name, task_id, task_name, \
                               active, applied_count, created_at";

const HISTORY_COLUMNS: &str = "user_id, week_start, calendar_event_id, calendar_event_summary, \
                               harvest_time_entry_id, project_id, task_id, hours, status, \
                               error_message, processed_at";

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS mapping_rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                calendar_label TEXT NOT NULL,
                project_id INTEGER NOT NULL,
                project_name TEXT NOT NULL,
                task_id INTEGER NOT NULL,
                task_name TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_mapping_rules_active_label
                ON mapping_rules(user_id, calendar_label) WHERE active = 1;

            CREATE TABLE IF NOT EXISTS recurring_overrides (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                recurring_event_id TEXT NOT NULL,
                event_summary TEXT NOT NULL,
                recurrence_description TEXT,
                project_id INTEGER NOT NULL,
                project_name TEXT NOT NULL,
                task_id INTEGER NOT NULL,
                task_name TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (user_id, recurring_event_id)
            );

            -- pattern_type: contains | starts_with | regex
            -- apply_to: summary | description | location | all
            CREATE TABLE IF NOT EXISTS pattern_rules (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                pattern_type TEXT NOT NULL,
                pattern_value TEXT NOT NULL,
                apply_to TEXT NOT NULL DEFAULT 'summary',
                case_sensitive INTEGER NOT NULL DEFAULT 0,
                project_id INTEGER NOT NULL,
                project_name TEXT NOT NULL,
                task_id INTEGER NOT NULL,
                task_name TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                applied_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_pattern_rules_user ON pattern_rules(user_id);

            -- status: success | error | skipped
            CREATE TABLE IF NOT EXISTS processing_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                week_start TEXT NOT NULL,
                calendar_event_id TEXT NOT NULL,
                calendar_event_summary TEXT NOT NULL,
                harvest_time_entry_id INTEGER,
                project_id INTEGER NOT NULL,
                task_id INTEGER NOT NULL,
                hours REAL NOT NULL,
                status TEXT NOT NULL,
                error_message TEXT,
                processed_at TEXT NOT NULL,
                UNIQUE (user_id, week_start, calendar_event_id)
            );

            CREATE INDEX IF NOT EXISTS idx_processing_history_processed
                ON processing_history(user_id, processed_at);

            CREATE TABLE IF NOT EXISTS learned_associations (
                user_id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    fn active_rules_for(&self, user: &UserId) -> Result<Vec<MappingRule>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {RULE_COLUMNS}
            FROM mapping_rules
            WHERE user_id = ? AND active = 1
            ORDER BY id ASC
            "
        ))?;
        let rows = stmt.query_map([user.as_str()], rule_from_row)?;
        let mut rules = Vec::new();
        for row in rows {
            rules.push(row?);
        }
        Ok(rules)
    }

    fn upsert_rule_for(
        &mut self,
        user: &UserId,
        label: &str,
        target: &TimesheetTarget,
    ) -> Result<Upsert, DbError> {
        let now = format_timestamp(Utc::now());
        let tx = self.conn.transaction()?;
        let existing: Option<i64> = tx
            .query_row(
                "
                SELECT id FROM mapping_rules
                WHERE user_id = ? AND calendar_label = ?
                ORDER BY active DESC, id DESC
                LIMIT 1
                ",
                params![user.as_str(), label],
                |row| row.get(0),
            )
            .optional()?;
        let outcome = if let Some(id) = existing {
            tx.execute(
                "
                UPDATE mapping_rules
                SET project_id = ?, project_name = ?, task_id = ?, task_name = ?,
                    active = 1, updated_at = ?
                WHERE id = ?
                ",
                params![
                    target.project_id,
                    target.project_name,
                    target.task_id,
                    target.task_name,
                    now,
                    id,
                ],
            )?;
            Upsert::Updated
        } else {
            tx.execute(
                "
                INSERT INTO mapping_rules
                (user_id, calendar_label, project_id, project_name, task_id, task_name, active, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)
                ",
                params![
                    user.as_str(),
                    label,
                    target.project_id,
                    target.project_name,
                    target.task_id,
                    target.task_name,
                    now,
                    now,
                ],
            )?;
            Upsert::Created
        };
        tx.commit()?;
        debug!(%user, label, ?outcome, "saved mapping rule");
        Ok(outcome)
    }

    fn recurring_override_for(
        &self,
        user: &UserId,
        series: &RecurringEventId,
        active_only: bool,
    ) -> Result<Option<RecurringOverride>, DbError> {
        let found = self
            .conn
            .query_row(
                &format!(
                    "
                    SELECT {OVERRIDE_COLUMNS}
                    FROM recurring_overrides
                    WHERE user_id = ? AND recurring_event_id = ? AND (active = 1 OR ? = 0)
                    "
                ),
                params![user.as_str(), series.as_str(), active_only],
                override_from_row,
            )
            .optional()?;
        Ok(found)
    }

    fn list_overrides_for(&self, user: &UserId) -> Result<Vec<RecurringOverride>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {OVERRIDE_COLUMNS}
            FROM recurring_overrides
            WHERE user_id = ? AND active = 1
            ORDER BY id ASC
            "
        ))?;
        let rows = stmt.query_map([user.as_str()], override_from_row)?;
        let mut overrides = Vec::new();
        for row in rows {
            overrides.push(row?);
        }
        Ok(overrides)
    }

    fn upsert_override_for(
        &mut self,
        user: &UserId,
        series: &RecurringEventId,
        event_summary: &str,
        recurrence_description: Option<&str>,
        target: &TimesheetTarget,
    ) -> Result<Upsert, DbError> {
        let existed = self.recurring_override_for(user, series, false)?.is_some();
        let now = format_timestamp(Utc::now());
        self.conn.execute(
            "
            INSERT INTO recurring_overrides
            (user_id, recurring_event_id, event_summary, recurrence_description,
             project_id, project_name, task_id, task_name, active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            ON CONFLICT(user_id, recurring_event_id) DO UPDATE SET
                event_summary = excluded.event_summary,
                recurrence_description = excluded.recurrence_description,
                project_id = excluded.project_id,
                project_name = excluded.project_name,
                task_id = excluded.task_id,
                task_name = excluded.task_name,
                active = 1,
                updated_at = excluded.updated_at
            ",
            params![
                user.as_str(),
                series.as_str(),
                event_summary,
                recurrence_description,
                target.project_id,
                target.project_name,
                target.task_id,
                target.task_name,
                now,
                now,
            ],
        )?;
        Ok(if existed {
            Upsert::Updated
        } else {
            Upsert::Created
        })
    }

    fn processed_ids_for(
        &self,
        user: &UserId,
        week_start: NaiveDate,
    ) -> Result<HashSet<EventId>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT calendar_event_id
            FROM processing_history
            WHERE user_id = ? AND week_start = ?
            ",
        )?;
        let rows = stmt.query_map(params![user.as_str(), format_date(week_start)], |row| {
            parse_column(row, 0, EventId::try_from)
        })?;
        let mut ids = HashSet::new();
        for row in rows {
            ids.insert(row?);
        }
        Ok(ids)
    }

    fn record_for(&mut self, record: &ProcessingRecord) -> Result<(), DbError> {
        self.conn.execute(
            &format!(
                "
                INSERT INTO processing_history ({HISTORY_COLUMNS})
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(user_id, week_start, calendar_event_id) DO UPDATE SET
                    calendar_event_summary = excluded.calendar_event_summary,
                    harvest_time_entry_id = excluded.harvest_time_entry_id,
                    project_id = excluded.project_id,
                    task_id = excluded.task_id,
                    hours = excluded.hours,
                    status = excluded.status,
                    error_message = excluded.error_message,
                    processed_at = excluded.processed_at
                "
            ),
            params![
                record.user_id.as_str(),
                format_date(record.week_start),
                record.calendar_event_id.as_str(),
                record.calendar_event_summary,
                record.harvest_time_entry_id,
                record.project_id,
                record.task_id,
                record.hours,
                record.status.as_str(),
                record.error_message,
                format_timestamp(record.processed_at),
            ],
        )?;
        Ok(())
    }

    /// Processing records for a week, oldest first.
    pub fn processing_history(
        &self,
        user: &UserId,
        week_start: NaiveDate,
    ) -> Result<Vec<ProcessingRecord>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {HISTORY_COLUMNS}
            FROM processing_history
            WHERE user_id = ? AND week_start = ?
            ORDER BY processed_at ASC, id ASC
            "
        ))?;
        let rows = stmt.query_map(
            params![user.as_str(), format_date(week_start)],
            record_from_row,
        )?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Totals across all of the user's processing history.
    pub fn processing_summary(&self, user: &UserId) -> Result<ProcessingSummary, DbError> {
        let (total, failed, last): (i64, i64, Option<String>) = self.conn.query_row(
            "
            SELECT COUNT(*),
                   COALESCE(SUM(CASE WHEN status = 'error' THEN 1 ELSE 0 END), 0),
                   MAX(processed_at)
            FROM processing_history
            WHERE user_id = ?
            ",
            [user.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        let last_processed_at = last
            .map(|value| {
                parse_timestamp(&value).map_err(|source| {
                    rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(source))
                })
            })
            .transpose()?;
        Ok(ProcessingSummary {
            total_processed: u64::try_from(total).unwrap_or_default(),
            failed: u64::try_from(failed).unwrap_or_default(),
            last_processed_at,
        })
    }

    /// Forgets which events of a week were processed so they can be
    /// submitted again. Returns the number of records removed.
    pub fn clear_week(&mut self, user: &UserId, week_start: NaiveDate) -> Result<usize, DbError> {
        let removed = self.conn.execute(
            "DELETE FROM processing_history WHERE user_id = ? AND week_start = ?",
            params![user.as_str(), format_date(week_start)],
        )?;
        Ok(removed)
    }

    fn pattern_rules_for(&self, user: &UserId) -> Result<Vec<PatternRule>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {PATTERN_COLUMNS}
            FROM pattern_rules
            WHERE user_id = ?
            ORDER BY created_at ASC, rowid ASC
            "
        ))?;
        let rows = stmt.query_map([user.as_str()], pattern_from_row)?;
        let mut rules = Vec::new();
        for row in rows {
            rules.push(row?);
        }
        Ok(rules)
    }

    fn insert_pattern_for(&mut self, rule: &PatternRule) -> Result<(), DbError> {
        self.conn.execute(
            &format!(
                "
                INSERT INTO pattern_rules ({PATTERN_COLUMNS})
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "
            ),
            params![
                rule.id,
                rule.user_id.as_str(),
                rule.name,
                rule.pattern_type.as_str(),
                rule.pattern_value,
                rule.apply_to.as_str(),
                rule.case_sensitive,
                rule.target.project_id,
                rule.target.project_name,
                rule.target.task_id,
                rule.target.task_name,
                rule.active,
                rule.applied_count,
                format_timestamp(rule.created_at),
            ],
        )?;
        Ok(())
    }

    fn save_pattern_for(&mut self, rule: &PatternRule) -> Result<usize, DbError> {
        let updated = self.conn.execute(
            "UPDATE pattern_rules SET active = ?, applied_count = ? WHERE id = ? AND user_id = ?",
            params![
                rule.active,
                rule.applied_count,
                rule.id,
                rule.user_id.as_str()
            ],
        )?;
        Ok(updated)
    }

    /// The user's learned associations, empty when none were saved yet.
    pub fn learned_associations(&self, user: &UserId) -> Result<LearnedAssociations, DbError> {
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM learned_associations WHERE user_id = ?",
                [user.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(data) = data else {
            return Ok(LearnedAssociations::new());
        };
        serde_json::from_str(&data).map_err(|source| DbError::Json {
            user_id: user.to_string(),
            source,
        })
    }

    /// Replaces the user's learned associations.
    pub fn save_learned_associations(
        &mut self,
        user: &UserId,
        learned: &LearnedAssociations,
    ) -> Result<(), DbError> {
        let data = serde_json::to_string(learned).map_err(|source| DbError::Json {
            user_id: user.to_string(),
            source,
        })?;
        self.conn.execute(
            "
            INSERT INTO learned_associations (user_id, data, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at
            ",
            params![user.as_str(), data, format_timestamp(Utc::now())],
        )?;
        Ok(())
    }
}

impl RuleStore for Database {
    fn active_rules(&self, user: &UserId) -> Result<Vec<MappingRule>, StoreError> {
        Ok(self.active_rules_for(user)?)
    }

    fn active_rule_by_label(
        &self,
        user: &UserId,
        label: &str,
    ) -> Result<Option<MappingRule>, StoreError> {
        let found = self
            .conn
            .query_row(
                &format!(
                    "
                    SELECT {RULE_COLUMNS}
                    FROM mapping_rules
                    WHERE user_id = ? AND calendar_label = ? AND active = 1
                    "
                ),
                params![user.as_str(), label],
                rule_from_row,
            )
            .optional()
            .map_err(DbError::from)?;
        Ok(found)
    }

    fn upsert_rule(
        &mut self,
        user: &UserId,
        label: &str,
        target: &TimesheetTarget,
    ) -> Result<Upsert, StoreError> {
        Ok(self.upsert_rule_for(user, label, target)?)
    }

    fn deactivate_rule(&mut self, user: &UserId, rule_id: i64) -> Result<bool, StoreError> {
        let updated = self
            .conn
            .execute(
                "
                UPDATE mapping_rules
                SET active = 0, updated_at = ?
                WHERE id = ? AND user_id = ? AND active = 1
                ",
                params![format_timestamp(Utc::now()), rule_id, user.as_str()],
            )
            .map_err(DbError::from)?;
        Ok(updated > 0)
    }

    fn recurring_override(
        &self,
        user: &UserId,
        series: &RecurringEventId,
    ) -> Result<Option<RecurringOverride>, StoreError> {
        Ok(self.recurring_override_for(user, series, true)?)
    }

    fn list_recurring_overrides(
        &self,
        user: &UserId,
    ) -> Result<Vec<RecurringOverride>, StoreError> {
        Ok(self.list_overrides_for(user)?)
    }

    fn upsert_recurring_override(
        &mut self,
        user: &UserId,
        series: &RecurringEventId,
        event_summary: &str,
        recurrence_description: Option<&str>,
        target: &TimesheetTarget,
    ) -> Result<Upsert, StoreError> {
        Ok(self.upsert_override_for(user, series, event_summary, recurrence_description, target)?)
    }

    fn deactivate_recurring_override(
        &mut self,
        user: &UserId,
        series: &RecurringEventId,
    ) -> Result<bool, StoreError> {
        let updated = self
            .conn
            .execute(
                "
                UPDATE recurring_overrides
                SET active = 0, updated_at = ?
                WHERE user_id = ? AND recurring_event_id = ? AND active = 1
                ",
                params![format_timestamp(Utc::now()), user.as_str(), series.as_str()],
            )
            .map_err(DbError::from)?;
        Ok(updated > 0)
    }
}

impl ProcessingLog for Database {
    fn processed_event_ids(
        &self,
        user: &UserId,
        week_start: NaiveDate,
    ) -> Result<HashSet<EventId>, StoreError> {
        Ok(self.processed_ids_for(user, week_start)?)
    }

    fn record(&mut self, record: &ProcessingRecord) -> Result<(), StoreError> {
        Ok(self.record_for(record)?)
    }
}

impl PatternRuleStore for Database {
    fn pattern_rules(&self, user: &UserId) -> Result<Vec<PatternRule>, StoreError> {
        Ok(self.pattern_rules_for(user)?)
    }

    fn insert_pattern_rule(&mut self, rule: &PatternRule) -> Result<(), StoreError> {
        Ok(self.insert_pattern_for(rule)?)
    }

    fn save_pattern_rule(&mut self, rule: &PatternRule) -> Result<(), StoreError> {
        if self.save_pattern_for(rule)? == 0 {
            return Err(StoreError::NotFound {
                kind: "pattern rule",
                id: rule.id.clone(),
            });
        }
        Ok(())
    }

    fn deactivate_pattern_rule(
        &mut self,
        user: &UserId,
        rule_id: &str,
    ) -> Result<bool, StoreError> {
        let updated = self
            .conn
            .execute(
                "UPDATE pattern_rules SET active = 0 WHERE id = ? AND user_id = ? AND active = 1",
                params![rule_id, user.as_str()],
            )
            .map_err(DbError::from)?;
        Ok(updated > 0)
    }
}

/// Reads a TEXT column and converts it, reporting failures as a column
/// conversion error.
fn parse_column<T, E>(
    row: &Row<'_>,
    idx: usize,
    parse: impl FnOnce(String) -> Result<T, E>,
) -> rusqlite::Result<T>
where
    E: StdError + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    parse(raw)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    parse_column(row, idx, |raw| parse_timestamp(&raw))
}

fn target_columns(row: &Row<'_>, first: usize) -> rusqlite::Result<TimesheetTarget> {
    Ok(TimesheetTarget {
        project_id: row.get(first)?,
        project_name: row.get(first + 1)?,
        task_id: row.get(first + 2)?,
        task_name: row.get(first + 3)?,
    })
}

fn rule_from_row(row: &Row<'_>) -> rusqlite::Result<MappingRule> {
    Ok(MappingRule {
        id: row.get(0)?,
        user_id: parse_column(row, 1, UserId::try_from)?,
        calendar_label: row.get(2)?,
        target: target_columns(row, 3)?,
        active: row.get(7)?,
        created_at: timestamp_column(row, 8)?,
        updated_at: timestamp_column(row, 9)?,
    })
}

fn override_from_row(row: &Row<'_>) -> rusqlite::Result<RecurringOverride> {
    Ok(RecurringOverride {
        id: row.get(0)?,
        user_id: parse_column(row, 1, UserId::try_from)?,
        recurring_event_id: parse_column(row, 2, RecurringEventId::try_from)?,
        event_summary: row.get(3)?,
        recurrence_description: row.get(4)?,
        target: target_columns(row, 5)?,
        active: row.get(9)?,
        created_at: timestamp_column(row, 10)?,
        updated_at: timestamp_column(row, 11)?,
    })
}

fn pattern_from_row(row: &Row<'_>) -> rusqlite::Result<PatternRule> {
    Ok(PatternRule {
        id: row.get(0)?,
        user_id: parse_column(row, 1, UserId::try_from)?,
        name: row.get(2)?,
        pattern_type: parse_column(row, 3, |raw| raw.parse::<PatternType>())?,
        pattern_value: row.get(4)?,
        apply_to: parse_column(row, 5, |raw| raw.parse::<ApplyTo>())?,
        case_sensitive: row.get(6)?,
        target: target_columns(row, 7)?,
        active: row.get(11)?,
        applied_count: row.get(12)?,
        created_at: timestamp_column(row, 13)?,
    })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ProcessingRecord> {
    Ok(ProcessingRecord {
        user_id: parse_column(row, 0, UserId::try_from)?,
        week_start: parse_column(row, 1, |raw| raw.parse::<NaiveDate>())?,
        calendar_event_id: parse_column(row, 2, EventId::try_from)?,
        calendar_event_summary: row.get(3)?,
        harvest_time_entry_id: row.get(4)?,
        project_id: row.get(5)?,
        task_id: row.get(6)?,
        hours: row.get(7)?,
        status: parse_column(row, 8, |raw| raw.parse::<ProcessingStatus>())?,
        error_message: row.get(9)?,
        processed_at: timestamp_column(row, 10)?,
    })
}

fn parse_timestamp(timestamp: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(timestamp).map(|parsed| parsed.with_timezone(&Utc))
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
