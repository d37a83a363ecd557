// Copyright (c) 2026 Lakegate Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Lakegate - Result Assembler
 * Drives cursor pagination into one ordered, finite sequence of pages
 *
 * @copyright 2026 Lakegate Oy
 * @license Proprietary
 */

use tracing::debug;

use crate::errors::{QueryError, QueryResult};
use crate::transport::TransportClient;
use crate::types::ResultPage;

/// Pulls pages for a succeeded query in order. The platform cursor is
/// single-use per query ID, so the sequence is restartable only by running the
/// whole lifecycle again. A transient fetch failure mid-stream surfaces as an
/// error after the rows already delivered; rows are never duplicated, skipped,
/// or silently dropped.
pub struct ResultAssembler<'a> {
    transport: &'a TransportClient,
    query_id: &'a str,
    cursor: Option<String>,
    next_sequence: u64,
    finished: bool,
}

impl<'a> ResultAssembler<'a> {
    pub fn new(transport: &'a TransportClient, query_id: &'a str) -> Self {
        Self {
            transport,
            query_id,
            cursor: None,
            next_sequence: 1,
            finished: false,
        }
    }

    /// Fetch the next page, or `None` once the final page has been delivered.
    pub async fn next_page(&mut self) -> QueryResult<Option<ResultPage>> {
        if self.finished {
            return Ok(None);
        }

        let (rows, next_cursor) = self
            .transport
            .query_results(self.query_id, self.cursor.as_deref())
            .await?;

        // A cursor that does not advance would replay the same page forever;
        // treat it as a platform contract violation rather than looping.
        if next_cursor.is_some() && next_cursor == self.cursor {
            return Err(QueryError::TransportPermanent {
                status: None,
                message: "continuation cursor did not advance".to_string(),
            });
        }

        let page = ResultPage {
            sequence: self.next_sequence,
            rows,
            cursor: next_cursor.clone(),
        };
        self.next_sequence += 1;
        self.finished = next_cursor.is_none();
        self.cursor = next_cursor;

        debug!(
            query_id = %self.query_id,
            sequence = page.sequence,
            rows = page.rows.len(),
            last = page.is_last(),
            "Fetched result page"
        );

        Ok(Some(page))
    }

    /// Number of pages delivered so far
    pub fn pages_delivered(&self) -> u64 {
        self.next_sequence - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governor::{GovernorConfig, QueryGovernor};
    use crate::retry::RetryConfig;
    use std::sync::Arc;
    use std::time::Duration;

    fn client_for(endpoint: &str) -> TransportClient {
        let governor = Arc::new(QueryGovernor::new(GovernorConfig {
            max_concurrent_queries: 2,
            requests_per_second: 1000,
        }));
        TransportClient::new(
            endpoint,
            "test-token",
            governor,
            RetryConfig::default().with_max_attempts(1),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_assembler_starts_at_sequence_one() {
        let transport = client_for("http://localhost:1/graphql");
        let assembler = ResultAssembler::new(&transport, "q-1");
        assert_eq!(assembler.pages_delivered(), 0);
        assert!(!assembler.finished);
    }

    #[tokio::test]
    async fn test_assembler_stops_permanently_after_finish() {
        let transport = client_for("http://localhost:1/graphql");
        let mut assembler = ResultAssembler::new(&transport, "q-1");
        assembler.finished = true;
        // Once finished, no further transport calls are made
        assert!(assembler.next_page().await.unwrap().is_none());
        assert!(assembler.next_page().await.unwrap().is_none());
    }
}
