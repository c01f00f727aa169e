//! Aggregation orchestration engine
//!
//! Enumerates the argument space of a specializer, builds one aggregator
//! per distinct set of aggregator arguments, assembles the partial results
//! into concat-key groups, and joins the groups into a caller table.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     AggregationEngine                         │
//! │   (Specializer + inputs + EngineConfig + EngineStats)         │
//! └──────────────────────────────────────────────────────────────┘
//!          │ partition = None               │ partition = Some(key)
//!          ↓                                ↓
//! ┌──────────────────────┐     ┌──────────────────────────────────┐
//! │   ResultAssembler    │     │  Specializer::partition(key)     │
//! │  units → cache →     │     │  one sub-engine per key value    │
//! │  aggregate → stack   │     │  → PartitionRuntime → fan_in     │
//! └──────────────────────┘     └──────────────────────────────────┘
//!          │                                │
//!          └──────────────┬─────────────────┘
//!                         ↓
//!              AggregationResult ──► join(left) ──► Table
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use spacetime_features::aggregation::Aggregate;
//! use spacetime_features::engine::{
//!     AggregationEngine, IndexRegistry, InMemoryInput, SimpleSpecializer,
//! };
//! use spacetime_features::table::{Column, Table};
//! use spacetime_features::EngineConfig;
//!
//! let crimes = Table::new(vec![
//!     Column::new("District", [1, 1, 2]),
//!     Column::new("Arrest", [true, false, true]),
//! ])?;
//!
//! let specializer = SimpleSpecializer::new(
//!     IndexRegistry::from_names(["District"])?,
//!     vec![Aggregate::count(), Aggregate::count_of("Arrest")],
//! );
//! let engine = AggregationEngine::new(
//!     specializer.into(),
//!     vec![Arc::new(InMemoryInput::new("crimes", crimes))],
//!     EngineConfig::default(),
//! )?;
//!
//! let result = engine.execute()?;
//! let districts = Table::new(vec![Column::new("District", [2, 3])])?;
//! let joined = engine.join(&districts, result)?;
//! assert_eq!(joined.num_rows(), 2);
//! assert!(joined.column("District_Arrest_count").is_ok());
//! # Ok::<(), spacetime_features::Error>(())
//! ```

pub mod argument;
pub mod assemble;
pub mod cache;
pub mod fanout;
pub mod join;
pub mod specializer;

pub use argument::{
    AggregationUnit, ArgumentSpace, ArgumentValue, ConcatKey, Dimension, DATE, DELTA, INDEX,
};
pub use assemble::{AggregationResult, PartialResult, ResultAssembler, ResultGroup, ResultGroups};
pub use cache::AggregatorCache;
pub use fanout::{fan_in, PartitionKey};
pub use join::join;
pub use specializer::{
    AggregateProvider, FixedAggregates, IndexRegistry, IndexSpec, SimpleSpecializer, SpaceDelta,
    SpacetimeSpecializer, Specializer,
};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::table::Table;

// ============================================================================
// Inputs
// ============================================================================

/// Upstream step supplying the source table
pub trait DataProvider: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// The materialized table
    fn get_result(&self) -> Result<Arc<Table>>;
}

/// A table already held in memory
#[derive(Debug, Clone)]
pub struct InMemoryInput {
    name: String,
    table: Arc<Table>,
}

impl InMemoryInput {
    /// Wrap `table` as a named input
    pub fn new(name: &str, table: Table) -> Self {
        Self {
            name: name.to_string(),
            table: Arc::new(table),
        }
    }
}

impl DataProvider for InMemoryInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_result(&self) -> Result<Arc<Table>> {
        Ok(Arc::clone(&self.table))
    }
}

// ============================================================================
// Partition Runtime
// ============================================================================

/// Executes the sub-engines of a partitioned run
///
/// Implementations may run partitions concurrently but must return one
/// result per partition, in partition order.
pub trait PartitionRuntime {
    /// Execute every partition
    fn run_partitions(&self, partitions: &[AggregationEngine]) -> Result<Vec<AggregationResult>>;
}

/// Runs partitions one after another on the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineRuntime;

impl PartitionRuntime for InlineRuntime {
    fn run_partitions(&self, partitions: &[AggregationEngine]) -> Result<Vec<AggregationResult>> {
        partitions.iter().map(AggregationEngine::execute).collect()
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Engine statistics
#[derive(Debug, Default)]
pub struct EngineStats {
    /// Units aggregated
    pub units_processed: AtomicU64,

    /// Aggregators constructed across all caches
    pub aggregators_built: AtomicU64,

    /// Result groups stacked
    pub groups_stacked: AtomicU64,

    /// Partitions handed to a runtime
    pub partitions_emitted: AtomicU64,
}

impl EngineStats {
    /// Get a snapshot of current statistics
    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            units_processed: self.units_processed.load(Ordering::Relaxed),
            aggregators_built: self.aggregators_built.load(Ordering::Relaxed),
            groups_stacked: self.groups_stacked.load(Ordering::Relaxed),
            partitions_emitted: self.partitions_emitted.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of engine statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineStatsSnapshot {
    /// Units aggregated
    pub units_processed: u64,
    /// Aggregators constructed
    pub aggregators_built: u64,
    /// Result groups stacked
    pub groups_stacked: u64,
    /// Partitions emitted
    pub partitions_emitted: u64,
}

// ============================================================================
// Aggregation Engine
// ============================================================================

/// A configured aggregation over one or more inputs
///
/// Only the first input is read. Sub-engines produced by `partitions`
/// share the inputs and the statistics of their parent.
#[derive(Clone)]
pub struct AggregationEngine {
    specializer: Specializer,
    inputs: Vec<Arc<dyn DataProvider>>,
    config: EngineConfig,
    stats: Arc<EngineStats>,
}

impl fmt::Debug for AggregationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregationEngine")
            .field("specializer", &self.specializer)
            .field(
                "inputs",
                &self.inputs.iter().map(|i| i.name()).collect::<Vec<_>>(),
            )
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AggregationEngine {
    /// Create an engine, validating the declarations up front
    pub fn new(
        specializer: Specializer,
        inputs: Vec<Arc<dyn DataProvider>>,
        config: EngineConfig,
    ) -> Result<Self> {
        if inputs.is_empty() {
            return Err(Error::config("aggregation engine needs at least one input"));
        }
        config.validate()?;
        specializer.validate()?;

        if let (Specializer::Simple(_), Some(PartitionKey::Date)) = (&specializer, config.partition)
        {
            return Err(Error::config(
                "simple aggregation can only be partitioned by index",
            ));
        }

        Ok(Self {
            specializer,
            inputs,
            config,
            stats: Arc::new(EngineStats::default()),
        })
    }

    /// The specializer
    pub fn specializer(&self) -> &Specializer {
        &self.specializer
    }

    /// The configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Every unit of the full argument space
    pub fn units(&self) -> Result<Vec<AggregationUnit>> {
        self.specializer.units()
    }

    /// One sequential sub-engine per value of the configured partition key
    pub fn partitions(&self) -> Result<Vec<AggregationEngine>> {
        let key = self.config.partition.ok_or_else(|| {
            Error::config("partitions requested but no partition key is configured")
        })?;

        let config = EngineConfig {
            partition: None,
            ..self.config.clone()
        };
        Ok(self
            .specializer
            .partition(key)?
            .into_iter()
            .map(|specializer| AggregationEngine {
                specializer,
                inputs: self.inputs.clone(),
                config: config.clone(),
                stats: Arc::clone(&self.stats),
            })
            .collect())
    }

    /// Run every unit sequentially on this thread, ignoring the partition key
    pub fn execute(&self) -> Result<AggregationResult> {
        let input = self
            .inputs
            .first()
            .ok_or_else(|| Error::config("aggregation engine needs at least one input"))?;
        let source = input.get_result()?;

        ResultAssembler::new(&self.specializer, self.config.concat, &self.stats).assemble(&source)
    }

    /// Run the aggregation, fanning out through `runtime` when partitioned
    pub fn run(&self, runtime: &dyn PartitionRuntime) -> Result<AggregationResult> {
        let Some(key) = self.config.partition else {
            info!(inputs = self.inputs.len(), "Running aggregation");
            let result = self.execute()?;
            info!(outputs = result.len(), "Aggregation complete");
            return Ok(result);
        };

        let partitions = self.partitions()?;
        info!(key = %key, partitions = partitions.len(), "Fanning out aggregation");
        self.stats
            .partitions_emitted
            .fetch_add(partitions.len() as u64, Ordering::Relaxed);

        let results = runtime.run_partitions(&partitions)?;
        if results.len() != partitions.len() {
            return Err(Error::config(format!(
                "runtime returned {} results for {} partitions",
                results.len(),
                partitions.len()
            )));
        }
        fan_in(results, self.config.concat)
    }

    /// Join a grouped result into `left`
    pub fn join(&self, left: &Table, result: AggregationResult) -> Result<Table> {
        let groups = result.into_groups()?;
        info!(groups = groups.len(), rows = left.num_rows(), "Joining results");
        join(left, &groups, &self.config.prefix)
    }

    /// Get a snapshot of engine statistics
    pub fn stats(&self) -> EngineStatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::Aggregate;
    use crate::table::Column;

    fn input() -> Vec<Arc<dyn DataProvider>> {
        let table = Table::new(vec![Column::new("District", [1, 2, 2])]).unwrap();
        vec![Arc::new(InMemoryInput::new("crimes", table))]
    }

    fn simple() -> Specializer {
        SimpleSpecializer::new(
            IndexRegistry::from_names(["District"]).unwrap(),
            vec![Aggregate::count()],
        )
        .into()
    }

    #[test]
    fn test_requires_input() {
        let err =
            AggregationEngine::new(simple(), Vec::new(), EngineConfig::default()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_simple_rejects_date_partition() {
        let config = EngineConfig {
            partition: Some(PartitionKey::Date),
            ..Default::default()
        };
        assert!(AggregationEngine::new(simple(), input(), config).is_err());
    }

    #[test]
    fn test_partitions_need_key() {
        let engine = AggregationEngine::new(simple(), input(), EngineConfig::default()).unwrap();
        assert!(engine.partitions().is_err());
    }

    #[test]
    fn test_partitioned_run_matches_sequential() {
        let config = EngineConfig {
            partition: Some(PartitionKey::Index),
            ..Default::default()
        };
        let engine = AggregationEngine::new(simple(), input(), config).unwrap();
        let fanned = engine.run(&InlineRuntime).unwrap();
        let sequential = engine.execute().unwrap();
        assert_eq!(fanned, sequential);
        assert_eq!(engine.stats().partitions_emitted, 1);
    }

    #[test]
    fn test_join_requires_grouping() {
        let config = EngineConfig {
            concat: false,
            ..Default::default()
        };
        let engine = AggregationEngine::new(simple(), input(), config).unwrap();
        let result = engine.run(&InlineRuntime).unwrap();
        let left = Table::new(vec![Column::new("District", [1])]).unwrap();
        assert!(engine.join(&left, result).unwrap_err().is_configuration());
    }
}
