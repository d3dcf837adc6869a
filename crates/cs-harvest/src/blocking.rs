//! Synchronous adapter over [`Client`] for the `cs-core` collaborator traits.

use chrono::NaiveDate;
use cs_core::store::{ClientError, NewTimeEntry, Project, ProjectCatalog, TimeEntry, TimesheetClient};
use tokio::runtime::{Builder, Runtime};
use tracing::info;

use crate::{Client, HarvestError, HarvestUser};

/// Drives a [`Client`] on a private current-thread runtime.
///
/// Time entry lookups are scoped to the user the access token belongs to,
/// resolved once by [`BlockingHarvest::connect`].
#[derive(Debug)]
pub struct BlockingHarvest {
    runtime: Runtime,
    client: Client,
    user: HarvestUser,
}

impl BlockingHarvest {
    /// Starts the runtime and resolves the token's user.
    ///
    /// Must not be called from within an async context.
    pub fn connect(client: Client) -> Result<Self, HarvestError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(HarvestError::Runtime)?;
        let user = runtime.block_on(client.current_user())?;
        info!(user = user.id, email = %user.email, "connected to Harvest");
        Ok(Self {
            runtime,
            client,
            user,
        })
    }

    pub const fn user(&self) -> &HarvestUser {
        &self.user
    }
}

impl From<HarvestError> for ClientError {
    fn from(err: HarvestError) -> Self {
        match err {
            HarvestError::Api { .. } => Self::Service {
                message: err.to_string(),
            },
            other => Self::request(other),
        }
    }
}

impl ProjectCatalog for BlockingHarvest {
    fn projects(&self) -> Result<Vec<Project>, ClientError> {
        Ok(self.runtime.block_on(self.client.projects())?)
    }
}

impl TimesheetClient for BlockingHarvest {
    fn create_entry(&self, entry: &NewTimeEntry) -> Result<TimeEntry, ClientError> {
        Ok(self.runtime.block_on(self.client.create_time_entry(entry))?)
    }

    fn delete_entry(&self, entry_id: i64) -> Result<bool, ClientError> {
        Ok(self
            .runtime
            .block_on(self.client.delete_time_entry(entry_id))?)
    }

    fn entries_on(&self, date: NaiveDate) -> Result<Vec<TimeEntry>, ClientError> {
        Ok(self
            .runtime
            .block_on(self.client.time_entries(date, date, Some(self.user.id)))?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    /// The mock server runs on its own multi-thread runtime so the adapter's
    /// runtime can block on requests to it.
    fn serve(mocks: Vec<Mock>) -> (Runtime, MockServer) {
        let runtime = Runtime::new().unwrap();
        let server = runtime.block_on(async {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/users/me"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "id": 42, "first_name": "Jana", "last_name": "Novak",
                    "email": "jana@example.com"
                })))
                .mount(&server)
                .await;
            for mock in mocks {
                mock.mount(&server).await;
            }
            server
        });
        (runtime, server)
    }

    fn connect(server: &MockServer) -> BlockingHarvest {
        let client = Client::with_base_url(server.uri(), "12345", "token").unwrap();
        BlockingHarvest::connect(client).unwrap()
    }

    #[test]
    fn connect_resolves_token_user() {
        let (_runtime, server) = serve(Vec::new());
        let harvest = connect(&server);
        assert_eq!(harvest.user().id, 42);
        assert_eq!(harvest.user().email, "jana@example.com");
    }

    #[test]
    fn entries_on_scopes_to_token_user() {
        let (_runtime, server) = serve(vec![
            Mock::given(method("GET"))
                .and(path("/time_entries"))
                .and(query_param("user_id", "42"))
                .and(query_param("from", "2025-07-01"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "time_entries": [{
                        "id": 9, "spent_date": "2025-07-01", "hours": 0.5, "notes": "sync",
                        "project": {"id": 1, "name": "DP"}, "task": {"id": 2, "name": "Meetings"}
                    }],
                    "next_page": null
                }))),
        ]);

        let harvest = connect(&server);
        let entries = harvest
            .entries_on(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap())
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].notes, "sync");
    }

    #[test]
    fn api_failures_become_service_errors() {
        let (_runtime, server) = serve(vec![
            Mock::given(method("GET"))
                .and(path("/projects"))
                .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                    "error": "invalid_token",
                    "error_description": "The access token provided is expired"
                }))),
        ]);

        let harvest = connect(&server);
        let err = harvest.projects().unwrap_err();
        match err {
            ClientError::Service { message } => assert_eq!(
                message,
                "Harvest API error 401: The access token provided is expired"
            ),
            other => panic!("expected service error, got {other:?}"),
        }
    }

    #[test]
    fn non_api_failures_become_request_errors() {
        let err = ClientError::from(HarvestError::InvalidResponse("truncated".to_string()));
        assert!(matches!(err, ClientError::Request(_)));
        assert_eq!(err.to_string(), "request failed: invalid response: truncated");
    }
}
