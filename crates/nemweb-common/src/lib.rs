//! NEMWEB Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the NEMWEB ingestion workspace.
//!
//! - **Error Handling**: [`NemwebError`] and the crate-wide [`Result`] alias
//! - **Logging**: tracing subscriber setup driven by environment variables
//! - **Networks**: market networks with their timezone and raw interval
//! - **Buckets**: the publication granularity grid crawlers are indexed on
//!
//! # Example
//!
//! ```no_run
//! use nemweb_common::{BucketSize, Network};
//!
//! let now = Network::Nem.now();
//! let interval = BucketSize::Interval.floor(now, Network::Nem);
//! assert!(BucketSize::Interval.is_aligned(interval, Network::Nem));
//! ```

pub mod bucket;
pub mod error;
pub mod logging;
pub mod network;

// Re-export commonly used types
pub use bucket::BucketSize;
pub use error::{NemwebError, Result};
pub use network::Network;
