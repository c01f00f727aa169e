//! Partitioning and fan-in
//!
//! A partitioned run splits the argument space on one key, executes each
//! slice as an independent engine with its own aggregator cache, and
//! merges the slices back together here.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::argument::ConcatKey;
use super::assemble::{AggregationResult, ResultGroup, ResultGroups};
use crate::error::{Error, Result};
use crate::table::Table;
use crate::types::Value;

/// Dimension the argument space is split on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionKey {
    /// One partition per end date
    Date,
    /// One partition per index name
    Index,
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionKey::Date => write!(f, "date"),
            PartitionKey::Index => write!(f, "index"),
        }
    }
}

impl FromStr for PartitionKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "date" => Ok(PartitionKey::Date),
            "index" => Ok(PartitionKey::Index),
            other => Err(Error::config(format!(
                "unknown partition key '{}' (expected 'date' or 'index')",
                other
            ))),
        }
    }
}

/// Merge the results of independently executed partitions
///
/// Grouped results are merged by key. Groups that share a key across
/// partitions (one date partition per date, say) are stacked in partition
/// order; if two partitions contribute the same index row to one key, the
/// key overlaps and the merge is a configuration error. Ungrouped results
/// are concatenated in partition order. Mixing the two shapes is rejected.
pub fn fan_in(results: Vec<AggregationResult>, grouped: bool) -> Result<AggregationResult> {
    let partitions = results.len();

    let merged = if grouped {
        let mut order: Vec<(ConcatKey, Vec<Table>)> = Vec::new();
        for result in results {
            for group in result.into_groups()? {
                let name = group.name().to_string();
                let key = group.key().clone();
                let table = group.into_table();
                match order.iter_mut().find(|(k, _)| k.to_string() == name) {
                    Some((_, tables)) => tables.push(table),
                    None => order.push((key, vec![table])),
                }
            }
        }

        let mut groups = ResultGroups::new();
        for (key, tables) in order {
            check_disjoint(&key, &tables)?;
            let table = Table::vstack(tables).map_err(|e| match e {
                Error::Configuration(msg) => {
                    Error::Configuration(format!("result group '{}': {}", key, msg))
                }
                other => other,
            })?;
            groups.insert(ResultGroup::new(key, table))?;
        }
        AggregationResult::Grouped(groups)
    } else {
        let mut partials = Vec::new();
        for result in results {
            match result {
                AggregationResult::Ungrouped(p) => partials.extend(p),
                AggregationResult::Grouped(_) => {
                    return Err(Error::config(
                        "cannot fan in a grouped partition result into an ungrouped run",
                    ))
                }
            }
        }
        AggregationResult::Ungrouped(partials)
    };

    info!(partitions, outputs = merged.len(), "Fanned in partition results");
    Ok(merged)
}

/// Reject index rows of one key produced by more than one partition
fn check_disjoint(key: &ConcatKey, tables: &[Table]) -> Result<()> {
    if tables.len() < 2 {
        return Ok(());
    }

    let mut owner: HashMap<Vec<Value>, usize> = HashMap::new();
    for (partition, table) in tables.iter().enumerate() {
        let levels = table.index()?;
        for row in 0..table.num_rows() {
            let index: Vec<Value> = levels.iter().map(|c| c.values()[row].clone()).collect();
            if let Some(previous) = owner.insert(index, partition) {
                if previous != partition {
                    return Err(Error::config(format!(
                        "result key '{}' overlaps across partitions",
                        key
                    )));
                }
            }
        }
    }
    Ok(())
}
