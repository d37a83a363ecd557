// Copyright (c) 2026 Lakegate Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Lakegate - Query Gateway Library
 * Read-only analytic query lifecycle against a remote security data lake
 *
 * @copyright 2026 Lakegate Oy
 * @license Proprietary
 */

pub mod config;
pub mod types;

// Validation
pub mod sql_guard;

// Throttling and resilience
pub mod errors;
pub mod governor;
pub mod retry;

// Remote exchange and lifecycle
pub mod lifecycle;
pub mod results;
pub mod transport;

pub use config::AppConfig;
pub use errors::{QueryError, QueryResult};
pub use governor::{GovernorConfig, QueryGovernor, QuerySlot, Urgency};
pub use lifecycle::{
    cancellation_pair, CancelHandle, CancelToken, LifecycleConfig, QueryLifecycle, QueryOptions,
    QueryOutcome,
};
pub use results::ResultAssembler;
pub use retry::RetryConfig;
pub use sql_guard::SqlGuard;
pub use transport::TransportClient;
pub use types::{Query, QueryStatus, ResultPage, Row};
