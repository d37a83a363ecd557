// Copyright (c) 2026 Lakegate Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Lakegate - Core Data Types
 * Query, status, and result page records shared across the lifecycle
 *
 * @copyright 2026 Lakegate Oy
 * @license Proprietary
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single row returned by the data lake, keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// A read-only analytic query. Immutable once submitted: the platform-assigned
/// identifier is the only field written after construction, and exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    /// Query text as the caller supplied it
    pub raw_sql: String,

    /// Guard-approved, normalized text actually sent to the platform
    pub sql: String,

    /// Platform-assigned identifier; absent until submission succeeds
    pub id: Option<String>,

    /// When this query record was created locally
    pub created_at: DateTime<Utc>,

    /// Optional cap on the number of rows returned to the caller
    pub row_limit: Option<usize>,
}

impl Query {
    pub fn new(
        raw_sql: impl Into<String>,
        sql: impl Into<String>,
        row_limit: Option<usize>,
    ) -> Self {
        Self {
            raw_sql: raw_sql.into(),
            sql: sql.into(),
            id: None,
            created_at: Utc::now(),
            row_limit,
        }
    }
}

/// Remote status of a query. Terminal variants are monotonic: once reached,
/// no further transition occurs for that query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Pending,
    Running,
    Succeeded,
    Failed { reason: String },
    Cancelled,
    TimedOut,
}

impl QueryStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, QueryStatus::Pending | QueryStatus::Running)
    }
}

impl std::fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryStatus::Pending => write!(f, "pending"),
            QueryStatus::Running => write!(f, "running"),
            QueryStatus::Succeeded => write!(f, "succeeded"),
            QueryStatus::Failed { reason } => write!(f, "failed: {}", reason),
            QueryStatus::Cancelled => write!(f, "cancelled"),
            QueryStatus::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// One page of results. Pages carry an ascending sequence number assigned by
/// the assembler and an opaque continuation cursor, absent on the final page.
#[derive(Debug, Clone)]
pub struct ResultPage {
    /// 1-based position of this page within the result stream
    pub sequence: u64,

    pub rows: Vec<Row>,

    /// Continuation cursor for the next page; `None` marks the final page
    pub cursor: Option<String>,
}

impl ResultPage {
    pub fn is_last(&self) -> bool {
        self.cursor.is_none()
    }
}
