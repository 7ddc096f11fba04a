//! REST client for the hosted backend.
//!
//! Rows are read and written through the PostgREST-style endpoints under
//! `/rest/v1/<table>`; realtime goes through [`super::realtime`].

use super::{realtime, Backend, Subscription};
use crate::error::{ClientError, Result};
use crate::models::{GroupRow, MemberRequest, MessageRow, RequestStatus};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Serialize;
use std::time::Duration;
use url::Url;

const GROUPS: &str = "groups";
const MESSAGES: &str = "messages";
const MEMBER_REQUESTS: &str = "member_requests";

/// Backend client speaking the hosted service's REST dialect
pub struct RestBackend {
    client: Client,
    base_url: String,
    api_key: String,
    realtime_url: Url,
}

impl RestBackend {
    /// Create a client for the project at `base_url`, authenticating every
    /// request with the anonymous `api_key`
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ClientError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = base_url.trim_end_matches('/').to_string();
        let realtime_url = realtime::endpoint(&base_url, api_key)?;

        Ok(Self {
            client,
            base_url,
            api_key: api_key.to_string(),
            realtime_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn realtime_url(&self) -> &Url {
        &self.realtime_url
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, self.table_url(table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn select<T>(&self, table: &str, query: &[(&str, String)]) -> Result<Vec<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self
            .request(Method::GET, table)
            .query(&[("select", "*")])
            .query(query)
            .send()
            .await?;

        let response = check(response, table, "select").await?;
        Ok(response.json::<Vec<T>>().await?)
    }

    async fn insert<T: Serialize>(&self, table: &str, row: &T) -> Result<()> {
        let response = self
            .request(Method::POST, table)
            .header("Prefer", "return=minimal")
            .json(row)
            .send()
            .await?;

        check(response, table, "insert").await?;
        Ok(())
    }

    async fn update<T: Serialize>(&self, table: &str, filter: (&str, String), patch: &T) -> Result<()> {
        let response = self
            .request(Method::PATCH, table)
            .header("Prefer", "return=minimal")
            .query(&[filter])
            .json(patch)
            .send()
            .await?;

        check(response, table, "update").await?;
        Ok(())
    }
}

/// PostgREST equality filter value
fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

async fn check(response: Response, table: &str, operation: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    log::debug!("{} on {} failed with {}: {}", operation, table, status, body);

    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(ClientError::NotFound(format!("table {}", table)));
    }

    Err(ClientError::ServerError(format!(
        "{} on {} failed: {} {}",
        operation, table, status, body
    )))
}

impl Backend for RestBackend {
    async fn list_groups(&self) -> Result<Vec<GroupRow>> {
        self.select(GROUPS, &[("order", "created_at.desc".to_string())])
            .await
    }

    async fn insert_group(&self, group: GroupRow) -> Result<()> {
        self.insert(GROUPS, &group).await?;
        log::info!("Created group {} ({})", group.name, group.id);
        Ok(())
    }

    async fn update_member_count(&self, group_id: &str, member_count: i64) -> Result<()> {
        #[derive(Serialize)]
        struct MemberCountPatch {
            member_count: i64,
        }

        self.update(GROUPS, ("id", eq(group_id)), &MemberCountPatch { member_count })
            .await
    }

    async fn recent_messages(&self, group_id: &str, limit: usize) -> Result<Vec<MessageRow>> {
        let mut rows: Vec<MessageRow> = self
            .select(
                MESSAGES,
                &[
                    ("group_id", eq(group_id)),
                    ("order", "created_at.desc".to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        // Fetched newest first so the limit keeps the tail of the history.
        rows.reverse();
        Ok(rows)
    }

    async fn insert_message(&self, message: MessageRow) -> Result<()> {
        self.insert(MESSAGES, &message).await
    }

    async fn member_requests(
        &self,
        group_id: &str,
        status: RequestStatus,
    ) -> Result<Vec<MemberRequest>> {
        self.select(
            MEMBER_REQUESTS,
            &[("group_id", eq(group_id)), ("status", eq(status.as_str()))],
        )
        .await
    }

    async fn find_member_request(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Result<Option<MemberRequest>> {
        let rows: Vec<MemberRequest> = self
            .select(
                MEMBER_REQUESTS,
                &[
                    ("group_id", eq(group_id)),
                    ("user_id", eq(user_id)),
                    ("order", "id.desc".to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;

        Ok(rows.into_iter().next())
    }

    async fn insert_member_request(&self, request: MemberRequest) -> Result<()> {
        self.insert(MEMBER_REQUESTS, &request).await
    }

    async fn update_member_request_status(
        &self,
        request_id: &str,
        status: RequestStatus,
    ) -> Result<()> {
        #[derive(Serialize)]
        struct StatusPatch {
            status: RequestStatus,
        }

        self.update(MEMBER_REQUESTS, ("id", eq(request_id)), &StatusPatch { status })
            .await
    }

    async fn subscribe(&self, group_id: &str) -> Result<Subscription> {
        realtime::subscribe(&self.realtime_url, &self.api_key, group_id).await
    }
}
