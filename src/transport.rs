// Copyright (c) 2026 Lakegate Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Lakegate - Transport Client
 * Authenticated GraphQL exchange with the data lake platform
 *
 * @copyright 2026 Lakegate Oy
 * @license Proprietary
 */

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::errors::{QueryError, QueryResult};
use crate::governor::{QueryGovernor, Urgency};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::types::{QueryStatus, Row};

const SUBMIT_QUERY: &str = r#"mutation ExecuteQuery($input: ExecuteQueryInput!) {
  executeQuery(input: $input) {
    id
  }
}"#;

const QUERY_STATUS: &str = r#"query QueryStatus($id: ID!) {
  queryStatus(id: $id) {
    status
    message
  }
}"#;

const QUERY_RESULTS: &str = r#"query QueryResults($id: ID!, $cursor: String) {
  queryResults(id: $id, cursor: $cursor) {
    rows
    cursor
  }
}"#;

const CANCEL_QUERY: &str = r#"mutation CancelQuery($id: ID!) {
  cancelQuery(id: $id) {
    id
  }
}"#;

#[derive(Debug, Deserialize)]
struct GraphQlEnvelope {
    data: Option<serde_json::Value>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct SubmitPayload {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StatusPayload {
    status: String,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResultsPayload {
    rows: Vec<Row>,
    cursor: Option<String>,
}

/// Stateless GraphQL client for the four wire operations. All lifecycle state
/// lives in the orchestrator; this type only knows how to perform one named
/// operation with retry and classification.
pub struct TransportClient {
    client: Client,
    endpoint: Url,
    token: String,
    governor: Arc<QueryGovernor>,
    retry: RetryConfig,
}

impl TransportClient {
    pub fn new(
        endpoint: &str,
        token: impl Into<String>,
        governor: Arc<QueryGovernor>,
        retry: RetryConfig,
        request_timeout: Duration,
    ) -> QueryResult<Self> {
        let endpoint = Url::parse(endpoint).map_err(|err| QueryError::TransportPermanent {
            status: None,
            message: format!("invalid endpoint URL: {}", err),
        })?;

        let client = Client::builder()
            .timeout(request_timeout)
            .pool_max_idle_per_host(8)
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
            .build()
            .map_err(|err| QueryError::TransportPermanent {
                status: None,
                message: format!("failed to build HTTP client: {}", err),
            })?;

        Ok(Self {
            client,
            endpoint,
            token: token.into(),
            governor,
            retry,
        })
    }

    /// Submit a query for execution, returning the platform-assigned ID.
    pub async fn submit_query(&self, sql: &str) -> QueryResult<String> {
        let variables = json!({ "input": { "sql": sql } });
        let data = self.execute("executeQuery", SUBMIT_QUERY, variables).await?;
        let payload: SubmitPayload = extract(data, "executeQuery")?;
        debug!(query_id = %payload.id, "Query submitted");
        Ok(payload.id)
    }

    /// Fetch the current remote status of a query.
    pub async fn query_status(&self, query_id: &str) -> QueryResult<QueryStatus> {
        let variables = json!({ "id": query_id });
        let data = self.execute("queryStatus", QUERY_STATUS, variables).await?;
        let payload: StatusPayload = extract(data, "queryStatus")?;
        parse_status(&payload.status, payload.message)
    }

    /// Fetch one page of results. `cursor` is the continuation cursor from the
    /// previous page, absent for the first page.
    pub async fn query_results(
        &self,
        query_id: &str,
        cursor: Option<&str>,
    ) -> QueryResult<(Vec<Row>, Option<String>)> {
        let variables = json!({ "id": query_id, "cursor": cursor });
        let data = self
            .execute("queryResults", QUERY_RESULTS, variables)
            .await?;
        let payload: ResultsPayload = extract(data, "queryResults")?;
        Ok((payload.rows, payload.cursor))
    }

    /// Best-effort cancel. The platform may have already finished the query;
    /// callers decide how to treat that race.
    pub async fn cancel_query(&self, query_id: &str) -> QueryResult<()> {
        let variables = json!({ "id": query_id });
        self.execute("cancelQuery", CANCEL_QUERY, variables).await?;
        debug!(query_id = %query_id, "Cancel requested");
        Ok(())
    }

    /// Run one named operation with retry. Each attempt takes a rate token
    /// first, so retries are throttled like any other request.
    async fn execute(
        &self,
        operation: &str,
        document: &str,
        variables: serde_json::Value,
    ) -> QueryResult<serde_json::Value> {
        retry_with_backoff(&self.retry, operation, || {
            self.attempt(document, variables.clone())
        })
        .await
    }

    async fn attempt(
        &self,
        document: &str,
        variables: serde_json::Value,
    ) -> QueryResult<serde_json::Value> {
        self.governor.acquire_token(Urgency::Wait).await?;

        let body = json!({ "query": document, "variables": variables });
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let retry_after = parse_retry_after(&response);
        let text = response.text().await?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("Platform signalled rate limiting");
            return Err(QueryError::TransportTransient {
                message: "platform rate limit (HTTP 429)".to_string(),
                retry_after: retry_after.or(Some(Duration::from_secs(1))),
            });
        }
        if status.is_server_error() {
            return Err(QueryError::TransportTransient {
                message: format!("server error (HTTP {})", status.as_u16()),
                retry_after: None,
            });
        }
        if !status.is_success() {
            return Err(QueryError::TransportPermanent {
                status: Some(status.as_u16()),
                message: truncate(&text, 512),
            });
        }

        let envelope: GraphQlEnvelope =
            serde_json::from_str(&text).map_err(|err| QueryError::TransportPermanent {
                status: None,
                message: format!("malformed response body: {}", err),
            })?;

        if let Some(errors) = envelope.errors {
            if !errors.is_empty() {
                let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
                return Err(QueryError::TransportPermanent {
                    status: None,
                    message: format!("GraphQL error: {}", messages.join("; ")),
                });
            }
        }

        envelope.data.ok_or_else(|| QueryError::TransportPermanent {
            status: None,
            message: "response carried neither data nor errors".to_string(),
        })
    }
}

fn extract<T: serde::de::DeserializeOwned>(
    data: serde_json::Value,
    field: &str,
) -> QueryResult<T> {
    let value = data
        .get(field)
        .cloned()
        .ok_or_else(|| QueryError::TransportPermanent {
            status: None,
            message: format!("response missing field '{}'", field),
        })?;
    serde_json::from_value(value).map_err(|err| QueryError::TransportPermanent {
        status: None,
        message: format!("unexpected shape for '{}': {}", field, err),
    })
}

fn parse_status(status: &str, message: Option<String>) -> QueryResult<QueryStatus> {
    match status.to_lowercase().as_str() {
        "pending" | "queued" => Ok(QueryStatus::Pending),
        "running" => Ok(QueryStatus::Running),
        "succeeded" => Ok(QueryStatus::Succeeded),
        "failed" => Ok(QueryStatus::Failed {
            reason: message.unwrap_or_else(|| "query failed".to_string()),
        }),
        "cancelled" => Ok(QueryStatus::Cancelled),
        "timed_out" | "expired" => Ok(QueryStatus::TimedOut),
        other => Err(QueryError::TransportPermanent {
            status: None,
            message: format!("unknown query status '{}'", other),
        }),
    }
}

fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }
}
