//! Core domain logic for calendar-to-timesheet sync.
//!
//! This crate contains:
//! - Pattern recognition: company, meeting type and context signals of an event
//! - Rule resolution: overrides, labels and free text to a timesheet target
//! - Weekly processing: idempotent draft synthesis per user and week
//! - Bulk pattern rules and label/project suggestions
//! - Submission of drafts to a timesheet service
//!
//! Storage and remote services are reached through the traits in [`store`].

pub mod bulk;
pub mod cache;
pub mod event;
pub mod labels;
pub mod learning;
pub mod mapping;
pub mod pattern;
pub mod rule;
pub mod store;
pub mod submit;
pub mod suggest;
pub mod types;

pub use bulk::{
    AppliedRule, ApplyTo, AssignedRule, Assignment, BulkApplyReport, BulkAssignReport,
    ExportedRule, ImportReport, MatchPolicy, MergeStrategy, NewPatternRule, PatternRule,
    PatternType, RuleAction, RuleExport, apply_rules, assign_events, export_rules, import_rules,
};
pub use cache::ExpiringCache;
pub use event::{AttendanceStatus, CalendarEvent};
pub use labels::{LabelKind, LabelUsage, label_usage};
pub use learning::{LearnedAssociations, LearnedSuggestion};
pub use mapping::{
    MappingEngine, MappingError, TimesheetEntryDraft, UnmappedEvent, WeekQuery, WeekReport,
};
pub use pattern::{PatternAnalysis, PatternEngine};
pub use rule::{LabelMatch, MappingRule, MatchSource, MatchedRule, RecurringOverride, TimesheetTarget};
pub use store::{
    CalendarSource, ClientError, NewTimeEntry, PatternRuleStore, ProcessingLog, ProcessingRecord,
    ProcessingStatus, Project, ProjectCatalog, RuleStore, StoreError, Task, TimeEntry,
    TimesheetClient, Upsert,
};
pub use submit::{
    CreatedEntry, SubmitOptions, SubmitReport, learn_from_submission, submit_entries,
};
pub use suggest::{
    AppliedSuggestions, CalendarInsights, MappingInsights, MappingSuggestion, SuggestionEngine,
    analyze_calendar_patterns, apply_suggestions, generate_suggestions, get_enhanced_suggestions,
    learn_from_user_mappings,
};
pub use types::{Confidence, EventId, RecurringEventId, UserId, ValidationError};
