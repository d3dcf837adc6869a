//! Harvest v2 API integration for calendar sync.
//!
//! Provides:
//! - [`Client`]: async access to projects, task assignments and time entries
//! - [`BlockingHarvest`]: a synchronous adapter implementing the `cs-core`
//!   catalog and timesheet traits

use std::fmt;
use std::time::Duration;

use chrono::NaiveDate;
use cs_core::store::{NewTimeEntry, Project, Task, TimeEntry};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

mod blocking;

pub use blocking::BlockingHarvest;

/// Default request timeout for API calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const HARVEST_API_URL: &str = "https://api.harvestapp.com/v2";
const USER_AGENT: &str = concat!("cs/", env!("CARGO_PKG_VERSION"));
const PER_PAGE: u32 = 100;

/// Harvest client errors.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// The account ID or access token is unusable.
    #[error("invalid Harvest credentials: {reason}")]
    InvalidCredentials { reason: &'static str },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// Failed to start the runtime driving blocking calls.
    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// API returned an error response.
    #[error("Harvest API error {status}: {message}")]
    Api { status: u16, message: String },
    /// Failed to parse response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Harvest API client.
///
/// # Thread Safety
///
/// The client is safe to clone and share across threads. Each clone shares
/// the underlying HTTP connection pool.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    account_id: String,
    access_token: String,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url)
            .field("account_id", &self.account_id)
            .field("access_token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// The user the access token belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HarvestUser {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
}

impl Client {
    /// Creates a client for the production API.
    ///
    /// # Errors
    ///
    /// Returns an error if either credential is empty or whitespace-only,
    /// or if the HTTP client fails to build.
    pub fn new(
        account_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self, HarvestError> {
        Self::with_base_url(HARVEST_API_URL, account_id, access_token)
    }

    /// Creates a client against a different API root (used by tests).
    pub fn with_base_url(
        base_url: impl Into<String>,
        account_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self, HarvestError> {
        let account_id = account_id.into();
        let access_token = access_token.into();

        if account_id.trim().is_empty() {
            return Err(HarvestError::InvalidCredentials {
                reason: "account ID cannot be empty",
            });
        }
        if access_token.trim().is_empty() {
            return Err(HarvestError::InvalidCredentials {
                reason: "access token cannot be empty",
            });
        }

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(HarvestError::ClientBuild)?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            account_id,
            access_token,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(&self.access_token)
            .header("Harvest-Account-Id", &self.account_id)
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, HarvestError> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(api_error(status.as_u16(), &body));
        }
        serde_json::from_str(&body).map_err(|err| HarvestError::InvalidResponse(err.to_string()))
    }

    /// The user the access token belongs to.
    pub async fn current_user(&self) -> Result<HarvestUser, HarvestError> {
        self.send(self.request(reqwest::Method::GET, "/users/me"))
            .await
    }

    /// Active projects with their active task assignments.
    pub async fn projects(&self) -> Result<Vec<Project>, HarvestError> {
        let mut projects = Vec::new();
        let mut page = Some(1);
        while let Some(current) = page {
            let response: ProjectsPage = self
                .send(
                    self.request(reqwest::Method::GET, "/projects")
                        .query(&[("is_active", "true")])
                        .query(&[("page", current), ("per_page", PER_PAGE)]),
                )
                .await?;
            projects.extend(response.projects.into_iter().filter(|p| p.is_active));
            page = response.next_page;
        }

        let mut catalog = Vec::with_capacity(projects.len());
        for project in projects {
            let tasks = self.project_tasks(project.id).await?;
            catalog.push(project.into_project(tasks));
        }
        debug!(count = catalog.len(), "loaded Harvest projects");
        Ok(catalog)
    }

    /// Active tasks assigned to a project.
    pub async fn project_tasks(&self, project_id: i64) -> Result<Vec<Task>, HarvestError> {
        let mut tasks = Vec::new();
        let mut page = Some(1);
        while let Some(current) = page {
            let response: TaskAssignmentsPage = self
                .send(
                    self.request(
                        reqwest::Method::GET,
                        &format!("/projects/{project_id}/task_assignments"),
                    )
                    .query(&[("page", current), ("per_page", PER_PAGE)]),
                )
                .await?;
            tasks.extend(
                response
                    .task_assignments
                    .into_iter()
                    .filter(|a| a.is_active)
                    .map(|a| Task {
                        id: a.task.id,
                        name: a.task.name,
                    }),
            );
            page = response.next_page;
        }
        Ok(tasks)
    }

    /// Time entries between `from` and `to` inclusive, optionally limited to
    /// one Harvest user.
    pub async fn time_entries(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        user_id: Option<i64>,
    ) -> Result<Vec<TimeEntry>, HarvestError> {
        let mut entries = Vec::new();
        let mut page = Some(1);
        while let Some(current) = page {
            let mut builder = self
                .request(reqwest::Method::GET, "/time_entries")
                .query(&[("from", from.to_string()), ("to", to.to_string())])
                .query(&[("page", current), ("per_page", PER_PAGE)]);
            if let Some(user_id) = user_id {
                builder = builder.query(&[("user_id", user_id)]);
            }
            let response: TimeEntriesPage = self.send(builder).await?;
            entries.extend(response.time_entries.into_iter().map(TimeEntry::from));
            page = response.next_page;
        }
        Ok(entries)
    }

    /// Creates a time entry. Harvest answers `201 Created`.
    pub async fn create_time_entry(&self, entry: &NewTimeEntry) -> Result<TimeEntry, HarvestError> {
        let body = CreateTimeEntry {
            project_id: entry.project_id,
            task_id: entry.task_id,
            spent_date: entry.spent_date,
            hours: entry.hours,
            notes: &entry.notes,
        };
        let created: HarvestTimeEntry = self
            .send(self.request(reqwest::Method::POST, "/time_entries").json(&body))
            .await?;
        debug!(entry = created.id, "created Harvest time entry");
        Ok(created.into())
    }

    /// Deletes a time entry. Returns false when Harvest refused.
    pub async fn delete_time_entry(&self, entry_id: i64) -> Result<bool, HarvestError> {
        let response = self
            .request(
                reqwest::Method::DELETE,
                &format!("/time_entries/{entry_id}"),
            )
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(entry = entry_id, %status, body = %body, "Harvest refused deletion");
        }
        Ok(status.is_success())
    }
}

fn api_error(status: u16, body: &str) -> HarvestError {
    #[derive(Deserialize)]
    struct ErrorPayload {
        #[serde(alias = "error_description")]
        message: String,
    }

    let message = serde_json::from_str::<ErrorPayload>(body)
        .map_or_else(|_| body.to_string(), |payload| payload.message);
    HarvestError::Api { status, message }
}

#[derive(Debug, Deserialize)]
struct NamedRef {
    id: i64,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct HarvestProject {
    id: i64,
    name: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    is_active: bool,
    #[serde(default)]
    is_billable: bool,
    #[serde(default)]
    client: Option<NamedRef>,
}

impl HarvestProject {
    fn into_project(self, tasks: Vec<Task>) -> Project {
        Project {
            id: self.id,
            name: self.name,
            code: self.code.filter(|code| !code.is_empty()),
            client_id: self.client.as_ref().map(|c| c.id),
            client_name: self.client.map(|c| c.name),
            is_billable: self.is_billable,
            tasks,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProjectsPage {
    projects: Vec<HarvestProject>,
    next_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TaskAssignment {
    #[serde(default)]
    is_active: bool,
    task: NamedRef,
}

#[derive(Debug, Deserialize)]
struct TaskAssignmentsPage {
    task_assignments: Vec<TaskAssignment>,
    next_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct HarvestTimeEntry {
    id: i64,
    spent_date: NaiveDate,
    hours: f64,
    #[serde(default)]
    notes: Option<String>,
    project: NamedRef,
    task: NamedRef,
}

impl From<HarvestTimeEntry> for TimeEntry {
    fn from(entry: HarvestTimeEntry) -> Self {
        Self {
            id: entry.id,
            spent_date: entry.spent_date,
            hours: entry.hours,
            notes: entry.notes.unwrap_or_default(),
            project_id: entry.project.id,
            task_id: entry.task.id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TimeEntriesPage {
    time_entries: Vec<HarvestTimeEntry>,
    next_page: Option<u32>,
}

#[derive(Debug, Serialize)]
struct CreateTimeEntry<'a> {
    project_id: i64,
    task_id: i64,
    spent_date: NaiveDate,
    hours: f64,
    notes: &'a str,
}
