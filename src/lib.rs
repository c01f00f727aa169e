//! Spacetime Features - grouped space-time aggregate features over tabular data
//!
//! This library computes aggregate features along "space" dimensions
//! (index columns) crossed with "time" dimensions (an end date and a
//! lookback delta), and joins them back into a target table:
//! - Cartesian enumeration of the argument space (index × date × delta × custom)
//! - One memoized aggregator per distinct set of aggregator arguments
//! - Optional partitioning into independently runnable sub-engines
//! - Concat-key grouping and stacking of partial results
//! - Left joins that preserve the target's rows and order

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod table;
pub mod types;

/// Configuration management with TOML support
pub mod config;

/// Aggregate functions, windowing and censoring
pub mod aggregation;

/// Argument-space enumeration, assembly, fan-out and joins
pub mod engine;

/// Top-N selection of scored rows
pub mod selection;

// Re-export main types
pub use config::EngineConfig;
pub use engine::{AggregationEngine, AggregationResult, PartitionKey, Specializer};
pub use error::{Error, Result};
pub use table::{Column, Table};
pub use types::{Delta, Value};
