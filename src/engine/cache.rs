//! Per-run aggregator memoization
//!
//! Units that agree on every aggregator argument share one aggregator.
//! The cache lives for exactly one non-partitioned execution and has no
//! eviction; partitions each get their own.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::argument::AggregationUnit;
use crate::aggregation::Aggregator;
use crate::error::Result;

/// Aggregators keyed by the projection of a unit onto `aggregator_args`
#[derive(Debug)]
pub struct AggregatorCache {
    fields: Vec<String>,
    entries: HashMap<AggregationUnit, Arc<Aggregator>>,
    constructed: u64,
}

impl AggregatorCache {
    /// Create an empty cache keyed on `fields`
    pub fn new(fields: &[String]) -> Self {
        Self {
            fields: fields.to_vec(),
            entries: HashMap::new(),
            constructed: 0,
        }
    }

    /// Fetch the aggregator for `unit`, building it on first use
    ///
    /// `build` receives the projected unit. A build failure is returned
    /// as-is and nothing is cached for that key.
    pub fn get<F>(&mut self, unit: &AggregationUnit, build: F) -> Result<Arc<Aggregator>>
    where
        F: FnOnce(&AggregationUnit) -> Result<Aggregator>,
    {
        let key = unit.project(&self.fields)?;
        if let Some(aggregator) = self.entries.get(&key) {
            return Ok(Arc::clone(aggregator));
        }

        debug!(key = %key, "Aggregator cache miss");
        let aggregator = Arc::new(build(&key)?);
        self.constructed += 1;
        self.entries.insert(key, Arc::clone(&aggregator));
        Ok(aggregator)
    }

    /// Number of aggregators built so far
    pub fn constructed(&self) -> u64 {
        self.constructed
    }

    /// Number of cached aggregators
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
