//! Harvester - incremental paginated API harvesting.
//!
//! Walks cursor-paginated collections with a shared OAuth credential,
//! normalizes each record into a flat row and merges the rows into durable
//! tables keyed by a natural key, so re-running a harvest never duplicates
//! data.

pub mod cli;
pub mod config;
pub mod credentials;
pub mod error;
pub mod harvest;
pub mod http_client;
pub mod jobs;
pub mod normalize;
pub mod rate_limit;
pub mod sink;
pub mod utils;

pub use error::{HarvestError, Result};
