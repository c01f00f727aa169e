//! Aggregation collaborators
//!
//! The orchestration engine treats these as opaque building blocks:
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │           Source Table              │
//! └─────────────────────────────────────┘
//!                  ↓  window::select (date, delta)
//! ┌─────────────────────────────────────┐
//! │        Windowed Rows                │
//! └─────────────────────────────────────┘
//!                  ↓  window::censor (date)
//! ┌─────────────────────────────────────┐
//! │   Aggregator(table, aggregates)     │
//! └─────────────────────────────────────┘
//!                  ↓  aggregate(index)
//! ┌─────────────────────────────────────┐
//! │   Table indexed by the index keys   │
//! └─────────────────────────────────────┘
//! ```

pub mod functions;
pub mod window;

pub use functions::{Aggregate, AggregateFunction, Aggregator, RowPredicate};
pub use window::{censor, select, CensorColumns};
