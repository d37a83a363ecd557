// Copyright (c) 2026 Lakegate Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Lakegate - Query Lifecycle Orchestrator
 * Drives one query through validate -> submit -> poll -> fetch -> terminal
 *
 * @copyright 2026 Lakegate Oy
 * @license Proprietary
 */

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::{QueryError, QueryResult};
use crate::governor::{QueryGovernor, QuerySlot};
use crate::results::ResultAssembler;
use crate::sql_guard::SqlGuard;
use crate::transport::TransportClient;
use crate::types::{Query, QueryStatus, Row};

/// Orchestrator-side state of one run, used for logging and assertions.
/// Remote terminal verdicts are reported through `QueryStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Validated,
    Submitted,
    Polling,
    Fetching,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecycleState::Created => "created",
            LifecycleState::Validated => "validated",
            LifecycleState::Submitted => "submitted",
            LifecycleState::Polling => "polling",
            LifecycleState::Fetching => "fetching",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// First poll interval; doubles after every poll
    pub poll_initial: Duration,

    /// Cap on the poll interval
    pub poll_max: Duration,

    /// Wall-clock deadline applied when the caller does not supply one
    pub default_deadline: Duration,

    /// How long to wait for a concurrency slot before giving up
    pub slot_acquire_timeout: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            poll_initial: Duration::from_millis(500),
            poll_max: Duration::from_secs(10),
            default_deadline: Duration::from_secs(300),
            slot_acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// Per-run knobs supplied by the caller
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Truncate the assembled rows at this count and stop fetching
    pub row_limit: Option<usize>,

    /// Total wall-clock budget for submit + poll + fetch
    pub deadline: Option<Duration>,
}

/// Outcome of a successful run: the (now ID-bearing) query record plus every
/// row, in page order.
#[derive(Debug)]
pub struct QueryOutcome {
    pub query: Query,
    pub status: QueryStatus,
    pub rows: Vec<Row>,
    pub pages: u64,
}

/// Signals cancellation into a running lifecycle. Dropping the handle without
/// calling `cancel` leaves the run untouched.
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Receiving side of a cancellation signal
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when cancellation is signalled; pends forever if the handle
    /// was dropped without cancelling.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

pub fn cancellation_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

/// Runs queries through their full lifecycle. One instance serves many
/// concurrent runs; shared throttling state lives in the governor, which is
/// passed in at construction rather than reached through globals.
pub struct QueryLifecycle {
    guard: SqlGuard,
    transport: Arc<TransportClient>,
    governor: Arc<QueryGovernor>,
    config: LifecycleConfig,
}

impl QueryLifecycle {
    pub fn new(
        guard: SqlGuard,
        transport: Arc<TransportClient>,
        governor: Arc<QueryGovernor>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            guard,
            transport,
            governor,
            config,
        }
    }

    /// Run a query to completion without external cancellation.
    pub async fn execute(&self, raw_sql: &str, options: QueryOptions) -> QueryResult<QueryOutcome> {
        let (_handle, token) = cancellation_pair();
        self.execute_with_cancel(raw_sql, options, token).await
    }

    /// Run a query to completion. Returns the assembled rows on success; any
    /// non-success terminal condition is surfaced as a `QueryError`, whose
    /// `terminal_status()` gives the status to report upstream. If a
    /// page fetch fails mid-stream the run errors out and collected rows are
    /// discarded; callers that need partial delivery drive `ResultAssembler`
    /// themselves.
    pub async fn execute_with_cancel(
        &self,
        raw_sql: &str,
        options: QueryOptions,
        mut cancel: CancelToken,
    ) -> QueryResult<QueryOutcome> {
        let started = Instant::now();
        let deadline = options.deadline.unwrap_or(self.config.default_deadline);

        debug!(state = %LifecycleState::Created, "Lifecycle run starting");

        // Created -> Validated. No remote call is ever made for a rejected query.
        let sql = self.guard.check(raw_sql)?;
        let mut query = Query::new(raw_sql, sql, options.row_limit);
        debug!(state = %LifecycleState::Validated, "Query approved");

        if cancel.is_cancelled() {
            return Err(QueryError::Cancelled);
        }

        // Validated -> Submitted. The slot is held until the run terminates;
        // QuerySlot releases on drop, so no error path below can leak it.
        // Nothing has been submitted yet, so cancellation here needs no
        // remote cancel.
        let mut slot = tokio::select! {
            slot = self.governor.acquire_slot(self.config.slot_acquire_timeout) => slot?,
            _ = cancel.cancelled() => return Err(QueryError::Cancelled),
        };
        if cancel.is_cancelled() {
            return Err(QueryError::Cancelled);
        }

        let query_id = self.transport.submit_query(&query.sql).await?;
        query.id = Some(query_id.clone());
        info!(query_id = %query_id, state = %LifecycleState::Submitted, "Query submitted");

        // Submitted -> Polling
        let mut interval = self.config.poll_initial;
        loop {
            if cancel.is_cancelled() {
                return self.finish_cancelled(&query_id, slot).await;
            }

            let status = self.transport.query_status(&query_id).await?;
            debug!(query_id = %query_id, status = %status, state = %LifecycleState::Polling, "Polled status");

            match status {
                QueryStatus::Succeeded => break,
                QueryStatus::Failed { reason } => {
                    slot.release();
                    return Err(QueryError::PlatformFailure(reason));
                }
                QueryStatus::Cancelled => {
                    slot.release();
                    return Err(QueryError::Cancelled);
                }
                QueryStatus::TimedOut => {
                    slot.release();
                    return Err(QueryError::PlatformFailure(
                        "query timed out at source".to_string(),
                    ));
                }
                QueryStatus::Pending | QueryStatus::Running => {}
            }

            let elapsed = started.elapsed();
            if elapsed >= deadline {
                return self.finish_timed_out(&query_id, slot, deadline);
            }

            let wait = interval.min(deadline - elapsed);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancel.cancelled() => {
                    return self.finish_cancelled(&query_id, slot).await;
                }
            }
            interval = (interval * 2).min(self.config.poll_max);
        }

        // Polling -> Fetching. The slot is released only after the last page.
        debug!(query_id = %query_id, state = %LifecycleState::Fetching, "Fetching result pages");
        let mut assembler = ResultAssembler::new(&self.transport, &query_id);
        let mut rows: Vec<Row> = Vec::new();

        'pages: loop {
            if cancel.is_cancelled() {
                return self.finish_cancelled(&query_id, slot).await;
            }
            if started.elapsed() >= deadline {
                return self.finish_timed_out(&query_id, slot, deadline);
            }

            match assembler.next_page().await? {
                Some(page) => {
                    let last = page.is_last();
                    for row in page.rows {
                        if let Some(limit) = query.row_limit {
                            if rows.len() >= limit {
                                break 'pages;
                            }
                        }
                        rows.push(row);
                    }
                    if last {
                        break;
                    }
                }
                None => break,
            }
        }

        let pages = assembler.pages_delivered();
        slot.release();
        info!(
            query_id = %query_id,
            rows = rows.len(),
            pages = pages,
            "Query lifecycle succeeded"
        );

        Ok(QueryOutcome {
            query,
            status: QueryStatus::Succeeded,
            rows,
            pages,
        })
    }

    /// Caller cancellation: request a remote cancel, release the slot, report
    /// `Cancelled`. If the remote query already succeeded, results are
    /// discarded; the caller asked for no rows and gets none.
    async fn finish_cancelled(
        &self,
        query_id: &str,
        mut slot: QuerySlot,
    ) -> QueryResult<QueryOutcome> {
        if let Err(err) = self.transport.cancel_query(query_id).await {
            warn!(query_id = %query_id, error = %err, "Best-effort cancel failed");
        }
        slot.release();
        info!(query_id = %query_id, "Query cancelled by caller");
        Err(QueryError::Cancelled)
    }

    /// Deadline expiry: fire a cancel toward the platform without waiting for
    /// the acknowledgement, release the slot, report `TimedOut`.
    fn finish_timed_out(
        &self,
        query_id: &str,
        mut slot: QuerySlot,
        deadline: Duration,
    ) -> QueryResult<QueryOutcome> {
        let transport = Arc::clone(&self.transport);
        let query_id_owned = query_id.to_string();
        tokio::spawn(async move {
            if let Err(err) = transport.cancel_query(&query_id_owned).await {
                warn!(query_id = %query_id_owned, error = %err, "Best-effort cancel failed");
            }
        });
        slot.release();
        warn!(query_id = %query_id, deadline = ?deadline, "Query lifecycle timed out");
        Err(QueryError::LifecycleTimeout(deadline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_pair_signals() {
        let (handle, token) = cancellation_pair();
        assert!(!token.is_cancelled());
        handle.cancel();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_future_resolves_after_signal() {
        let (handle, mut token) = cancellation_pair();
        handle.cancel();
        // Must resolve immediately rather than waiting for a change event
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .expect("cancelled() should resolve once signalled");
    }

    #[test]
    fn test_poll_interval_doubles_up_to_cap() {
        let config = LifecycleConfig::default();
        let mut interval = config.poll_initial;
        let mut seen = Vec::new();
        for _ in 0..8 {
            seen.push(interval);
            interval = (interval * 2).min(config.poll_max);
        }
        assert_eq!(seen[0], Duration::from_millis(500));
        assert_eq!(seen[1], Duration::from_secs(1));
        assert!(seen.iter().all(|d| *d <= config.poll_max));
        assert_eq!(*seen.last().unwrap(), config.poll_max);
    }
}
