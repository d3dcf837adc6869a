//! Calendar sync CLI library.
//!
//! This crate provides the CLI interface for calendar to timesheet sync.

mod cli;
pub mod commands;
mod config;

pub use cli::{
    Cli, Commands, MergeKind, OverridesAction, PatternField, PatternKind, PatternsAction, RulesAction,
    SourceArgs, TargetArgs, WeekArgs,
};
pub use config::Config;
