//! Primary database layer - connection cache, connector, and notes tier
//!
//! # Design Principles
//!
//! - One process-scoped pool, established once and shared
//! - Concurrent first callers join a single establishment attempt
//! - Every statement is bounded by the socket timeout

pub mod cache;
pub mod notes;
pub mod pool;

pub use cache::{ConnectionCache, Connector, RetryPolicy};
pub use notes::DatabaseTier;
pub use pool::{redact_url, PgConnector};
