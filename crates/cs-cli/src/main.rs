use std::io::Write;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cs_cli::commands::util::{
    self, FileCalendar, connect_harvest, events_path, load_events, open_catalog, open_database,
    resolve_target, user_id,
};
use cs_cli::commands::{history, insights, overrides, patterns, process, rules, status, submit, suggest};
use cs_cli::{
    Cli, Commands, Config, MergeKind, OverridesAction, PatternField, PatternKind, PatternsAction,
    RulesAction, TargetArgs, WeekArgs,
};
use cs_core::{ApplyTo, MatchPolicy, MergeStrategy, NewPatternRule, PatternType, SubmitOptions, TimesheetTarget};

fn target(args: &TargetArgs, config: &Config) -> Result<TimesheetTarget> {
    let catalog = open_catalog(args.catalog.as_deref(), config)?;
    resolve_target(&catalog, args.project, args.task)
}

fn run_week(
    db: &cs_db::Database,
    config: &Config,
    args: &WeekArgs,
) -> Result<process::WeekRun> {
    let user = user_id(config)?;
    let events = load_events(&events_path(args.events.as_deref(), config)?)?;
    let week_start = util::week_start(args.week.unwrap_or_else(|| Local::now().date_naive()));
    Ok(process::process_week(
        db,
        &user,
        &events,
        week_start,
        args.all,
        config.rule_cache_ttl(),
    ))
}

const fn pattern_type(kind: PatternKind) -> PatternType {
    match kind {
        PatternKind::Contains => PatternType::Contains,
        PatternKind::StartsWith => PatternType::StartsWith,
        PatternKind::Regex => PatternType::Regex,
    }
}

const fn merge_strategy(kind: MergeKind) -> MergeStrategy {
    match kind {
        MergeKind::Update => MergeStrategy::Update,
        MergeKind::Skip => MergeStrategy::Skip,
        MergeKind::Replace => MergeStrategy::Replace,
    }
}

const fn apply_to(field: PatternField) -> ApplyTo {
    match field {
        PatternField::Summary => ApplyTo::Summary,
        PatternField::Description => ApplyTo::Description,
        PatternField::Location => ApplyTo::Location,
        PatternField::All => ApplyTo::All,
    }
}

#[expect(
    clippy::too_many_lines,
    reason = "CLI command dispatch is inherently verbose"
)]
fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        // No subcommand, show help
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    let user = user_id(&config)?;
    let mut db = open_database(&config)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let json = cli.json;

    match command {
        Commands::Status => status::run(&mut out, &db, &user, &config.database_path, json)?,
        Commands::Rules(action) => match action {
            RulesAction::List => rules::list(&mut out, &db, &user, json)?,
            RulesAction::Add { label, target: args } => {
                let target = target(args, &config)?;
                rules::add(&mut out, &mut db, &user, label, &target)?;
            }
            RulesAction::Remove { id } => rules::remove(&mut out, &mut db, &user, *id)?,
            RulesAction::Assign {
                event_ids,
                events,
                target: args,
            } => {
                let events = load_events(&events_path(events.as_deref(), &config)?)?;
                let target = target(args, &config)?;
                rules::assign(&mut out, &mut db, &user, &events, event_ids, &target, json)?;
            }
            RulesAction::Export { output } => {
                rules::export(&mut out, &db, &user, output.as_deref())?;
            }
            RulesAction::Import { file, strategy } => {
                rules::import(&mut out, &mut db, &user, file, merge_strategy(*strategy), json)?;
            }
        },
        Commands::Overrides(action) => match action {
            OverridesAction::List => overrides::list(&mut out, &db, &user, json)?,
            OverridesAction::Set {
                event_id,
                events,
                target: args,
            } => {
                let events = load_events(&events_path(events.as_deref(), &config)?)?;
                let target = target(args, &config)?;
                overrides::set(&mut out, &mut db, &user, &events, event_id, &target)?;
            }
            OverridesAction::Remove { recurring_event_id } => {
                overrides::remove(&mut out, &mut db, &user, recurring_event_id)?;
            }
        },
        Commands::Patterns(action) => match action {
            PatternsAction::List => patterns::list(&mut out, &db, &user, json)?,
            PatternsAction::Add {
                name,
                value,
                kind,
                apply_to: field,
                case_sensitive,
                target: args,
            } => {
                let new = NewPatternRule {
                    name: name.clone(),
                    pattern_type: pattern_type(*kind),
                    pattern_value: value.clone(),
                    apply_to: apply_to(*field),
                    case_sensitive: *case_sensitive,
                    target: target(args, &config)?,
                };
                patterns::add(&mut out, &mut db, &user, new)?;
            }
            PatternsAction::Remove { id } => patterns::remove(&mut out, &mut db, &user, id)?,
            PatternsAction::Apply {
                events,
                first_match,
            } => {
                let events = load_events(&events_path(events.as_deref(), &config)?)?;
                let policy = if *first_match {
                    MatchPolicy::FirstMatch
                } else {
                    MatchPolicy::AllMatchesLastWins
                };
                patterns::apply(&mut out, &mut db, &user, &events, policy, json)?;
            }
        },
        Commands::Process { week } => {
            let run = run_week(&db, &config, week)?;
            process::run(&mut out, &run, json)?;
        }
        Commands::Submit {
            week,
            dry_run,
            force,
        } => {
            let harvest = connect_harvest(&config)?;
            let run = run_week(&db, &config, week)?;
            let options = SubmitOptions {
                dry_run: *dry_run,
                force_overwrite: *force,
            };
            submit::run(&mut out, &harvest, &mut db, &user, &run, options, json)?;
        }
        Commands::History { week, clear } => {
            let week_start = util::week_start(week.unwrap_or_else(|| Local::now().date_naive()));
            if *clear {
                history::clear(&mut out, &mut db, &user, week_start)?;
            } else {
                history::list(&mut out, &db, &user, week_start, json)?;
            }
        }
        Commands::Suggest {
            source,
            weeks,
            enhanced,
            event,
            apply,
            labels,
        } => {
            let path = events_path(source.events.as_deref(), &config)?;
            let catalog = open_catalog(source.catalog.as_deref(), &config)?;
            if let Some(event_id) = event {
                let events = load_events(&path)?;
                suggest::for_event(&mut out, &events, &catalog, &db, &user, event_id, json)?;
            } else {
                let calendar = FileCalendar::open(&path)?;
                let weeks = weeks.unwrap_or(config.suggestion_weeks);
                if *apply {
                    let suggestions =
                        suggest::generate(&calendar, &catalog, &db, &user, weeks, *enhanced);
                    suggest::apply(&mut out, &mut db, &user, suggestions, labels, json)?;
                } else {
                    suggest::run(&mut out, &calendar, &catalog, &db, &user, weeks, *enhanced, json)?;
                }
            }
        }
        Commands::Insights { events, weeks } => {
            let calendar = FileCalendar::open(&events_path(events.as_deref(), &config)?)?;
            let weeks = weeks.unwrap_or(config.insight_weeks);
            insights::run(&mut out, &calendar, &user, weeks, json)?;
        }
    }

    out.flush()?;
    Ok(())
}
