//! Sequential result assembly
//!
//! ```text
//! unit ──► cache.get(aggregator_args) ──► aggregate(index)
//!                                              │
//!                              append insert_args as index levels
//!                                              │
//!                          bucket by ConcatKey (string form)
//!                                              │
//!                           vstack each bucket ──► ResultGroup
//! ```

use std::collections::HashMap;
use std::sync::atomic::Ordering;

use tracing::debug;

use super::argument::{AggregationUnit, ConcatKey};
use super::cache::AggregatorCache;
use super::specializer::Specializer;
use super::EngineStats;
use crate::error::{Error, Result};
use crate::table::Table;
use crate::types::Value;

// ============================================================================
// Results
// ============================================================================

/// Output of one unit: the aggregated table plus the unit it came from
#[derive(Debug, Clone, PartialEq)]
pub struct PartialResult {
    /// Unit that produced the table
    pub unit: AggregationUnit,
    /// Aggregated table, indexed by the index columns and insert levels
    pub table: Table,
}

/// Stacked partial results sharing one concat key
#[derive(Debug, Clone, PartialEq)]
pub struct ResultGroup {
    key: ConcatKey,
    name: String,
    table: Table,
}

impl ResultGroup {
    /// Create a group from its key and stacked table
    pub fn new(key: ConcatKey, table: Table) -> Self {
        let name = key.to_string();
        Self { key, name, table }
    }

    /// Typed key of the first unit in the group
    pub fn key(&self) -> &ConcatKey {
        &self.key
    }

    /// String form of the key
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The stacked table
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Consume the group, returning its table
    pub fn into_table(self) -> Table {
        self.table
    }

    /// Split the stacked table back apart by the given insert levels
    ///
    /// Each piece keeps its rows in stacked order and all of its index
    /// levels.
    pub fn unstack(&self, levels: &[&str]) -> Result<Vec<(Vec<Value>, Table)>> {
        self.table.split_by(levels)
    }
}

/// Result groups in order of first appearance, unique by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultGroups {
    groups: Vec<ResultGroup>,
}

impl ResultGroups {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group, rejecting a name that is already present
    pub fn insert(&mut self, group: ResultGroup) -> Result<()> {
        if self.get(group.name()).is_some() {
            return Err(Error::config(format!(
                "duplicate result key '{}'",
                group.name()
            )));
        }
        self.groups.push(group);
        Ok(())
    }

    /// Group by key name
    pub fn get(&self, name: &str) -> Option<&ResultGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Key names in order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|g| g.name.as_str())
    }

    /// Iterate over the groups
    pub fn iter(&self) -> std::slice::Iter<'_, ResultGroup> {
        self.groups.iter()
    }

    /// Number of groups
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether there are no groups
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl IntoIterator for ResultGroups {
    type Item = ResultGroup;
    type IntoIter = std::vec::IntoIter<ResultGroup>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultGroups {
    type Item = &'a ResultGroup;
    type IntoIter = std::slice::Iter<'a, ResultGroup>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.iter()
    }
}

/// What an engine run hands back
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationResult {
    /// Concat-key groups, when grouping is enabled
    Grouped(ResultGroups),
    /// Raw partial results in unit order, when grouping is disabled
    Ungrouped(Vec<PartialResult>),
}

impl AggregationResult {
    /// Number of groups or partial results
    pub fn len(&self) -> usize {
        match self {
            AggregationResult::Grouped(groups) => groups.len(),
            AggregationResult::Ungrouped(partials) => partials.len(),
        }
    }

    /// Whether the result holds nothing
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The groups of a grouped result
    pub fn into_groups(self) -> Result<ResultGroups> {
        match self {
            AggregationResult::Grouped(groups) => Ok(groups),
            AggregationResult::Ungrouped(_) => Err(Error::config(
                "result is not grouped; enable concat to obtain result groups",
            )),
        }
    }
}

// ============================================================================
// Assembler
// ============================================================================

/// Runs every unit of a specializer in declared order
pub struct ResultAssembler<'a> {
    specializer: &'a Specializer,
    grouped: bool,
    stats: &'a EngineStats,
}

impl<'a> ResultAssembler<'a> {
    /// Create an assembler over `specializer`
    pub fn new(specializer: &'a Specializer, grouped: bool, stats: &'a EngineStats) -> Self {
        Self {
            specializer,
            grouped,
            stats,
        }
    }

    /// Aggregate a single unit
    pub fn partial(
        &self,
        cache: &mut AggregatorCache,
        source: &Table,
        unit: &AggregationUnit,
    ) -> Result<Table> {
        debug!(unit = %unit, "Aggregating unit");

        let aggregator = cache.get(unit, |args| self.specializer.build_aggregator(source, args))?;
        let index = self.specializer.index_spec(unit.index()?)?;
        let mut table = aggregator.aggregate(&index)?;

        for field in self.specializer.insert_args() {
            table.append_index_level(field, unit.require(field)?.to_value())?;
        }

        self.stats.units_processed.fetch_add(1, Ordering::Relaxed);
        Ok(table)
    }

    /// Aggregate every unit and group or collect the results
    pub fn assemble(&self, source: &Table) -> Result<AggregationResult> {
        let units = self.specializer.units()?;
        let mut cache = AggregatorCache::new(self.specializer.aggregator_args());

        let result = if self.grouped {
            let concat_args = self.specializer.concat_args();
            let mut order: Vec<ConcatKey> = Vec::new();
            let mut buckets: HashMap<String, Vec<Table>> = HashMap::new();

            for unit in &units {
                let table = self.partial(&mut cache, source, unit)?;
                let key = ConcatKey::from_unit(unit, concat_args)?;
                buckets
                    .entry(key.to_string())
                    .or_insert_with(|| {
                        order.push(key);
                        Vec::new()
                    })
                    .push(table);
            }

            let mut groups = ResultGroups::new();
            for key in order {
                let tables = buckets.remove(&key.to_string()).unwrap_or_default();
                let table = Table::vstack(tables).map_err(|e| match e {
                    Error::Configuration(msg) => {
                        Error::Configuration(format!("result group '{}': {}", key, msg))
                    }
                    other => other,
                })?;
                groups.insert(ResultGroup::new(key, table))?;
                self.stats.groups_stacked.fetch_add(1, Ordering::Relaxed);
            }
            AggregationResult::Grouped(groups)
        } else {
            let partials = units
                .iter()
                .map(|unit| {
                    Ok(PartialResult {
                        unit: unit.clone(),
                        table: self.partial(&mut cache, source, unit)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            AggregationResult::Ungrouped(partials)
        };

        self.stats
            .aggregators_built
            .fetch_add(cache.constructed(), Ordering::Relaxed);
        debug!(
            units = units.len(),
            aggregators = cache.constructed(),
            outputs = result.len(),
            "Assembled results"
        );
        Ok(result)
    }
}
