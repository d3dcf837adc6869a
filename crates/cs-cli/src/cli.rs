//! Command-line argument definitions.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

/// Calendar to timesheet sync.
///
/// Classifies calendar events into Harvest projects and tasks using label
/// rules, recurring overrides and pattern rules, then drafts and submits the
/// week's time entries.
#[derive(Debug, Parser)]
#[command(name = "cs", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show rule counts and submission history.
    Status,

    /// Manage label mapping rules.
    #[command(subcommand)]
    Rules(RulesAction),

    /// Manage recurring series overrides.
    #[command(subcommand)]
    Overrides(OverridesAction),

    /// Manage and apply bulk pattern rules.
    #[command(subcommand)]
    Patterns(PatternsAction),

    /// Match a week of events and draft time entries.
    Process {
        #[command(flatten)]
        week: WeekArgs,
    },

    /// Draft a week of time entries and create them in Harvest.
    Submit {
        #[command(flatten)]
        week: WeekArgs,

        /// Count entries without creating them.
        #[arg(long)]
        dry_run: bool,

        /// Replace an existing entry with the same project, task and date.
        #[arg(long)]
        force: bool,
    },

    /// Show or reset which events of a week were submitted.
    History {
        /// Any date in the week (defaults to the current week).
        #[arg(long)]
        week: Option<NaiveDate>,

        /// Forget the week's records so its events can be submitted again.
        #[arg(long)]
        clear: bool,
    },

    /// Suggest label rules from recent calendar labels.
    Suggest {
        #[command(flatten)]
        source: SourceArgs,

        /// Weeks of history to consider.
        #[arg(long)]
        weeks: Option<u32>,

        /// Re-rank suggestions using existing rules.
        #[arg(long)]
        enhanced: bool,

        /// Rank projects for one event by learned associations instead.
        #[arg(long, value_name = "ID", conflicts_with_all = ["apply", "enhanced", "weeks"])]
        event: Option<String>,

        /// Create a rule from the best suggestion for each label.
        #[arg(long)]
        apply: bool,

        /// Only apply suggestions for these labels.
        #[arg(long = "label", requires = "apply")]
        labels: Vec<String>,
    },

    /// Summarize when and how long you meet.
    Insights {
        /// Calendar export (JSON array of events).
        #[arg(long)]
        events: Option<PathBuf>,

        /// Weeks of history to analyze.
        #[arg(long)]
        weeks: Option<u32>,
    },
}

/// Where events and projects come from.
#[derive(Debug, Clone, Default, Args)]
pub struct SourceArgs {
    /// Calendar export (JSON array of events).
    #[arg(long)]
    pub events: Option<PathBuf>,

    /// Project catalog file to use instead of Harvest.
    #[arg(long)]
    pub catalog: Option<PathBuf>,
}

/// The week to process.
#[derive(Debug, Clone, Args)]
pub struct WeekArgs {
    /// Calendar export (JSON array of events).
    #[arg(long)]
    pub events: Option<PathBuf>,

    /// Any date in the week (defaults to the current week).
    #[arg(long)]
    pub week: Option<NaiveDate>,

    /// Include events already submitted for this week.
    #[arg(long)]
    pub all: bool,
}

/// The project and task an event should be billed to.
#[derive(Debug, Clone, Args)]
pub struct TargetArgs {
    /// Harvest project ID.
    #[arg(long)]
    pub project: i64,

    /// Harvest task ID.
    #[arg(long)]
    pub task: i64,

    /// Project catalog file to use instead of Harvest.
    #[arg(long)]
    pub catalog: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum RulesAction {
    /// List active label rules.
    List,
    /// Map a calendar label to a project and task.
    Add {
        label: String,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Deactivate a label rule.
    Remove { id: i64 },
    /// Map the labels of several events to one project and task.
    Assign {
        /// IDs of events in the calendar export.
        #[arg(required = true)]
        event_ids: Vec<String>,
        /// Calendar export containing the events.
        #[arg(long)]
        events: Option<PathBuf>,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Write active label rules as JSON.
    Export {
        /// File to write (defaults to stdout).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Load label rules from an export.
    Import {
        file: PathBuf,
        /// How to treat labels that already have a rule.
        #[arg(long, value_enum, default_value = "update")]
        strategy: MergeKind,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MergeKind {
    Update,
    Skip,
    Replace,
}

#[derive(Debug, Subcommand)]
pub enum OverridesAction {
    /// List active recurring overrides.
    List,
    /// Pin every occurrence of an event's series to a project and task.
    Set {
        /// ID of any occurrence of the series.
        event_id: String,
        /// Calendar export containing the event.
        #[arg(long)]
        events: Option<PathBuf>,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Remove the override for a series.
    Remove { recurring_event_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PatternKind {
    Contains,
    StartsWith,
    Regex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PatternField {
    Summary,
    Description,
    Location,
    All,
}

#[derive(Debug, Subcommand)]
pub enum PatternsAction {
    /// List pattern rules.
    List,
    /// Add a pattern rule.
    Add {
        name: String,
        /// Text or regular expression to look for.
        #[arg(long)]
        value: String,
        #[arg(long = "type", value_enum, default_value = "contains")]
        kind: PatternKind,
        #[arg(long, value_enum, default_value = "summary")]
        apply_to: PatternField,
        #[arg(long)]
        case_sensitive: bool,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Deactivate a pattern rule.
    Remove { id: String },
    /// Turn pattern rule matches into label rules.
    Apply {
        /// Calendar export (JSON array of events).
        #[arg(long)]
        events: Option<PathBuf>,
        /// Apply only the first matching rule per event.
        #[arg(long)]
        first_match: bool,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn submit_parses_week_and_flags() {
        let cli = Cli::try_parse_from([
            "cs", "submit", "--week", "2025-07-02", "--dry-run", "--json",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Some(Commands::Submit {
                week,
                dry_run,
                force,
            }) => {
                assert_eq!(week.week, NaiveDate::from_ymd_opt(2025, 7, 2));
                assert!(dry_run);
                assert!(!force);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn pattern_add_defaults_to_summary_contains() {
        let cli = Cli::try_parse_from([
            "cs", "patterns", "add", "Standups", "--value", "standup", "--project", "1", "--task",
            "2",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Patterns(PatternsAction::Add {
                kind, apply_to, ..
            })) => {
                assert_eq!(kind, PatternKind::Contains);
                assert_eq!(apply_to, PatternField::Summary);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rules_import_defaults_to_update() {
        let cli = Cli::try_parse_from(["cs", "rules", "import", "rules.json"]).unwrap();
        match cli.command {
            Some(Commands::Rules(RulesAction::Import { file, strategy })) => {
                assert_eq!(file, PathBuf::from("rules.json"));
                assert_eq!(strategy, MergeKind::Update);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn suggest_event_excludes_apply() {
        let err = Cli::try_parse_from(["cs", "suggest", "--event", "e1", "--apply"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
        let err = Cli::try_parse_from(["cs", "suggest", "--label", "AI"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }
}
