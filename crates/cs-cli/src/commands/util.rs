//! Shared utilities for CLI commands.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use cs_core::labels::{enrich, trailing_window};
use cs_core::store::{CalendarSource, ClientError, Project, ProjectCatalog};
use cs_core::{CalendarEvent, TimesheetTarget, UserId};
use cs_db::Database;
use cs_harvest::{BlockingHarvest, Client};

use crate::Config;

/// Opens the configured database, creating its directory if needed.
pub fn open_database(config: &Config) -> Result<Database> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))
}

pub fn user_id(config: &Config) -> Result<UserId> {
    UserId::new(config.user_id.clone()).context("invalid user_id in configuration")
}

/// Picks the `--events` flag, falling back to `events_path`.
pub fn events_path(flag: Option<&Path>, config: &Config) -> Result<PathBuf> {
    flag.map(Path::to_path_buf)
        .or_else(|| config.events_path.clone())
        .context("no calendar export given: pass --events or set events_path")
}

/// Reads a calendar export and fills in colour labels and recurrence text.
pub fn load_events(path: &Path) -> Result<Vec<CalendarEvent>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut events: Vec<CalendarEvent> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse events in {}", path.display()))?;
    for event in &mut events {
        enrich(event);
    }
    tracing::debug!(count = events.len(), path = %path.display(), "loaded calendar events");
    Ok(events)
}

/// A calendar export served as the user's calendar.
#[derive(Debug)]
pub struct FileCalendar {
    events: Vec<CalendarEvent>,
    now: DateTime<Utc>,
}

impl FileCalendar {
    pub const fn new(events: Vec<CalendarEvent>, now: DateTime<Utc>) -> Self {
        Self { events, now }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(load_events(path)?, Utc::now()))
    }
}

impl CalendarSource for FileCalendar {
    fn events_for_weeks(
        &self,
        _user: &UserId,
        weeks: u32,
    ) -> Result<Vec<CalendarEvent>, ClientError> {
        Ok(trailing_window(&self.events, weeks, self.now))
    }
}

/// Where projects and tasks come from.
#[derive(Debug)]
pub enum Catalog {
    File(Vec<Project>),
    Harvest(Box<BlockingHarvest>),
}

impl ProjectCatalog for Catalog {
    fn projects(&self) -> Result<Vec<Project>, ClientError> {
        match self {
            Self::File(projects) => Ok(projects.clone()),
            Self::Harvest(harvest) => harvest.projects(),
        }
    }
}

/// Opens the catalog file from the flag or `catalog_path`, else Harvest.
pub fn open_catalog(flag: Option<&Path>, config: &Config) -> Result<Catalog> {
    let path = flag.map(Path::to_path_buf).or_else(|| config.catalog_path.clone());
    if let Some(path) = path {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let projects = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse projects in {}", path.display()))?;
        return Ok(Catalog::File(projects));
    }
    Ok(Catalog::Harvest(Box::new(connect_harvest(config)?)))
}

pub fn connect_harvest(config: &Config) -> Result<BlockingHarvest> {
    let (Some(account_id), Some(token)) = (
        config.harvest_account_id.as_deref(),
        config.harvest_access_token.as_deref(),
    ) else {
        bail!("Harvest is not configured: set harvest_account_id and harvest_access_token");
    };
    let client = Client::new(account_id, token).context("failed to create Harvest client")?;
    BlockingHarvest::connect(client).context("failed to connect to Harvest")
}

/// Looks up project and task names for a target.
pub fn resolve_target(catalog: &dyn ProjectCatalog, project_id: i64, task_id: i64) -> Result<TimesheetTarget> {
    let projects = catalog.projects().context("failed to load projects")?;
    let Some(project) = projects.iter().find(|p| p.id == project_id) else {
        bail!("project {project_id} not found");
    };
    let Some(task) = project.tasks.iter().find(|t| t.id == task_id) else {
        bail!("task {task_id} is not assigned to project '{}'", project.name);
    };
    Ok(TimesheetTarget {
        project_id,
        project_name: project.name.clone(),
        task_id,
        task_name: task.name.clone(),
    })
}

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Events whose start date falls in the seven days from `week_start`.
pub fn events_in_week(events: &[CalendarEvent], week_start: NaiveDate) -> Vec<CalendarEvent> {
    let week_end = week_start + Duration::days(7);
    events
        .iter()
        .filter(|event| {
            let date = event.start_date();
            date >= week_start && date < week_end
        })
        .cloned()
        .collect()
}
