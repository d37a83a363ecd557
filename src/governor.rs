// Copyright (c) 2026 Lakegate Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Lakegate - Rate/Concurrency Governor
 * Token bucket for request rate plus a counting semaphore for in-flight queries
 *
 * @copyright 2026 Lakegate Oy
 * @license Proprietary
 */

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use nonzero_ext::*;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

use crate::errors::{QueryError, QueryResult};

/// How a caller wants to wait for a rate token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    /// Block until a token refills
    Wait,
    /// Fail immediately if no token is available
    FailFast,
}

#[derive(Debug, Clone)]
pub struct GovernorConfig {
    /// Maximum queries in flight at once
    pub max_concurrent_queries: usize,

    /// Outstanding request budget per second (token bucket refill rate)
    pub requests_per_second: u32,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_queries: 4,
            requests_per_second: 10,
        }
    }
}

/// Process-wide throttling state. Constructed once at startup and passed by
/// reference to every lifecycle run; never a module-level singleton.
pub struct QueryGovernor {
    bucket: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    slots: Arc<Semaphore>,
    max_slots: usize,
}

impl QueryGovernor {
    pub fn new(config: GovernorConfig) -> Self {
        let quota = Quota::per_second(
            NonZeroU32::new(config.requests_per_second).unwrap_or(nonzero!(1u32)),
        );
        let max_slots = config.max_concurrent_queries.max(1);

        info!(
            requests_per_second = config.requests_per_second,
            max_concurrent_queries = max_slots,
            "Initialized query governor"
        );

        Self {
            bucket: RateLimiter::direct(quota),
            slots: Arc::new(Semaphore::new(max_slots)),
            max_slots,
        }
    }

    /// Take one request-rate token. Every remote attempt, including retries,
    /// must pass through here so retries never bypass global throttling.
    pub async fn acquire_token(&self, urgency: Urgency) -> QueryResult<()> {
        match urgency {
            Urgency::Wait => {
                self.bucket.until_ready().await;
                Ok(())
            }
            Urgency::FailFast => self
                .bucket
                .check()
                .map_err(|_| QueryError::GovernorTimeout(Duration::ZERO)),
        }
    }

    /// Lease one in-flight query slot, waiting up to `timeout` for capacity.
    pub async fn acquire_slot(&self, timeout: Duration) -> QueryResult<QuerySlot> {
        let permit = tokio::time::timeout(timeout, Arc::clone(&self.slots).acquire_owned())
            .await
            .map_err(|_| QueryError::GovernorTimeout(timeout))?
            .map_err(|_| QueryError::TransportPermanent {
                status: None,
                message: "governor semaphore closed".to_string(),
            })?;

        debug!(
            available = self.slots.available_permits(),
            max = self.max_slots,
            "Acquired concurrency slot"
        );

        Ok(QuerySlot {
            permit: Some(permit),
        })
    }

    /// Slots currently free; the held count never exceeds the configured maximum
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn max_slots(&self) -> usize {
        self.max_slots
    }
}

/// Lease representing permission to keep one query in flight. Released at most
/// once: explicit release and drop are both safe, in any order, so duplicate
/// cleanup calls from error paths are no-ops.
#[derive(Debug)]
pub struct QuerySlot {
    permit: Option<OwnedSemaphorePermit>,
}

impl QuerySlot {
    pub fn release(&mut self) {
        if let Some(permit) = self.permit.take() {
            drop(permit);
            debug!("Released concurrency slot");
        }
    }

    pub fn is_released(&self) -> bool {
        self.permit.is_none()
    }
}

impl Drop for QuerySlot {
    fn drop(&mut self) {
        self.release();
    }
}
