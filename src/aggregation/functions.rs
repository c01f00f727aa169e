//! Aggregate Functions
//!
//! This module provides the aggregation collaborator the engine builds
//! and applies per unit:
//! - Aggregate specifications (count, sum, avg, min, max, stddev, variance)
//! - `Aggregator`, which groups a table by an index and evaluates every
//!   specification per group with a polars `group_by().agg()`
//!
//! # Example
//!
//! ```rust
//! use spacetime_features::aggregation::{Aggregate, Aggregator};
//! use spacetime_features::engine::IndexSpec;
//! use spacetime_features::table::{Column, Table};
//!
//! let crimes = Table::new(vec![
//!     Column::new("District", [1, 1, 2]),
//!     Column::new("Arrest", [true, false, true]),
//! ])
//! .unwrap();
//!
//! let aggregates = vec![Aggregate::count(), Aggregate::count_of("Arrest")];
//! let aggregator = Aggregator::new(crimes, aggregates);
//! let result = aggregator.aggregate(&IndexSpec::column("District")).unwrap();
//!
//! assert_eq!(result.index_names(), vec!["District"]);
//! assert_eq!(result.column_names(), vec!["count", "Arrest_count"]);
//! ```

use std::fmt;
use std::sync::Arc;

use polars::prelude::{col, DataType, Expr, IntoLazy, NamedFrom, Series, SortMultipleOptions};
use tracing::debug;

use crate::engine::IndexSpec;
use crate::error::{Error, Result};
use crate::table::{Row, Rows, Table};
use crate::types::Value;

// ============================================================================
// Aggregate Specifications
// ============================================================================

/// Aggregation function applied to a group of rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    /// Count of rows (or of truthy values / matching rows)
    Count,

    /// Sum of values
    Sum,

    /// Average (mean) of values
    Avg,

    /// Minimum value
    Min,

    /// Maximum value
    Max,

    /// Sample standard deviation
    StdDev,

    /// Sample variance
    Variance,
}

impl AggregateFunction {
    /// Suffix used in output column names
    pub fn suffix(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::StdDev => "stddev",
            AggregateFunction::Variance => "variance",
        }
    }
}

/// Row predicate used by `Aggregate::count_where`
pub type RowPredicate = Arc<dyn Fn(&Row<'_>) -> bool + Send + Sync>;

/// What an aggregate reads from each row
#[derive(Clone)]
enum Source {
    /// Every row counts
    Rows,
    /// Values of a column
    Column(String),
    /// Rows matching a predicate
    Predicate(RowPredicate),
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Rows => write!(f, "Rows"),
            Source::Column(name) => write!(f, "Column({:?})", name),
            Source::Predicate(_) => write!(f, "Predicate(..)"),
        }
    }
}

/// A single aggregate specification
///
/// Output columns are named `<name>_<function>`, or plain `count` for a
/// row count. Counts created `with_prop` also emit `<name>_prop`, the
/// share of the group's rows that were counted.
#[derive(Debug, Clone)]
pub struct Aggregate {
    name: Option<String>,
    function: AggregateFunction,
    source: Source,
    prop: bool,
}

impl Aggregate {
    fn over(column: &str, function: AggregateFunction) -> Self {
        Self {
            name: Some(column.to_string()),
            function,
            source: Source::Column(column.to_string()),
            prop: false,
        }
    }

    /// Count rows in each group
    pub fn count() -> Self {
        Self {
            name: None,
            function: AggregateFunction::Count,
            source: Source::Rows,
            prop: false,
        }
    }

    /// Count truthy values of a column
    pub fn count_of(column: &str) -> Self {
        Self::over(column, AggregateFunction::Count)
    }

    /// Count rows matching a predicate
    pub fn count_where<F>(name: &str, predicate: F) -> Self
    where
        F: Fn(&Row<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            name: Some(name.to_string()),
            function: AggregateFunction::Count,
            source: Source::Predicate(Arc::new(predicate)),
            prop: false,
        }
    }

    /// Sum of a numeric column
    pub fn sum(column: &str) -> Self {
        Self::over(column, AggregateFunction::Sum)
    }

    /// Mean of a numeric column
    pub fn avg(column: &str) -> Self {
        Self::over(column, AggregateFunction::Avg)
    }

    /// Minimum of a numeric column
    pub fn min(column: &str) -> Self {
        Self::over(column, AggregateFunction::Min)
    }

    /// Maximum of a numeric column
    pub fn max(column: &str) -> Self {
        Self::over(column, AggregateFunction::Max)
    }

    /// Sample standard deviation of a numeric column
    pub fn stddev(column: &str) -> Self {
        Self::over(column, AggregateFunction::StdDev)
    }

    /// Sample variance of a numeric column
    pub fn variance(column: &str) -> Self {
        Self::over(column, AggregateFunction::Variance)
    }

    /// Override the name used in output columns
    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Also emit the counted share of rows (counts only)
    pub fn with_prop(mut self) -> Self {
        self.prop = true;
        self
    }

    /// The aggregation function
    pub fn function(&self) -> AggregateFunction {
        self.function
    }

    /// Names of the columns this aggregate produces
    pub fn output_names(&self) -> Vec<String> {
        let base = match &self.name {
            Some(name) => format!("{}_{}", name, self.function.suffix()),
            None => self.function.suffix().to_string(),
        };

        let mut names = vec![base];
        if self.prop {
            let stem = self.name.as_deref().unwrap_or("row");
            names.push(format!("{}_prop", stem));
        }
        names
    }

    fn validate(&self, table: &Table) -> Result<()> {
        if self.prop && self.function != AggregateFunction::Count {
            return Err(Error::config(format!(
                "proportions are only defined for counts, not {}",
                self.function.suffix()
            )));
        }
        if let Source::Column(column) = &self.source {
            let dtype = table
                .frame()
                .column(column)
                .map_err(|_| Error::Lookup(format!("aggregate column '{}' not found", column)))?
                .dtype();
            let numeric = dtype.is_integer()
                || dtype.is_float()
                || matches!(dtype, DataType::Boolean | DataType::Null);
            if self.function != AggregateFunction::Count && !numeric {
                return Err(Error::config(format!(
                    "cannot take {} of column '{}' of type {}",
                    self.function.suffix(),
                    column,
                    dtype
                )));
            }
        }
        Ok(())
    }

    /// Aggregation expressions for this specification
    ///
    /// Counts read a boolean flag column named `flag`, returned alongside
    /// the expressions for the caller to attach to the frame. Sums of a
    /// group without values are zero; the other statistics are null.
    fn plan(&self, table: &Table, rows: Option<&Rows>, flag: &str) -> Result<Plan> {
        let names = self.output_names();

        if self.function == AggregateFunction::Count {
            let flags: Vec<bool> = match &self.source {
                Source::Rows => vec![true; table.num_rows()],
                Source::Column(column) => {
                    table.field(column)?.iter().map(Value::is_truthy).collect()
                }
                Source::Predicate(predicate) => match rows {
                    Some(rows) => rows.iter().map(|row| predicate(&row)).collect(),
                    None => return Err(Error::config("row predicate evaluated without rows")),
                },
            };

            let mut exprs = vec![col(flag).sum().cast(DataType::Float64).alias(names[0].as_str())];
            if let Some(prop) = names.get(1) {
                exprs.push(col(flag).cast(DataType::Float64).mean().alias(prop.as_str()));
            }
            return Ok(Plan {
                flag: Some(Series::new(flag.into(), flags)),
                exprs,
            });
        }

        let Source::Column(column) = &self.source else {
            return Err(Error::config(format!(
                "{} needs a source column",
                self.function.suffix()
            )));
        };
        let values = col(column.as_str()).cast(DataType::Float64);
        let expr = match self.function {
            AggregateFunction::Count => values.count().cast(DataType::Float64),
            AggregateFunction::Sum => values.sum(),
            AggregateFunction::Avg => values.mean(),
            AggregateFunction::Min => values.min(),
            AggregateFunction::Max => values.max(),
            AggregateFunction::StdDev => values.std(1),
            AggregateFunction::Variance => values.var(1),
        };

        Ok(Plan {
            flag: None,
            exprs: vec![expr.alias(names[0].as_str())],
        })
    }
}

/// Expressions of one aggregate plus the flag column they read, if any
struct Plan {
    flag: Option<Series>,
    exprs: Vec<Expr>,
}

// ============================================================================
// Aggregator
// ============================================================================

/// Applies a fixed list of aggregates to a fixed table
///
/// Built once per distinct set of aggregator arguments and reused for
/// every index that shares them.
#[derive(Debug)]
pub struct Aggregator {
    table: Table,
    aggregates: Vec<Aggregate>,
}

impl Aggregator {
    /// Create an aggregator over `table`
    pub fn new(table: Table, aggregates: Vec<Aggregate>) -> Self {
        Self { table, aggregates }
    }

    /// The table being aggregated
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// The aggregate specifications
    pub fn aggregates(&self) -> &[Aggregate] {
        &self.aggregates
    }

    /// Names of all output columns, in order
    pub fn output_names(&self) -> Vec<String> {
        self.aggregates
            .iter()
            .flat_map(Aggregate::output_names)
            .collect()
    }

    /// Group the table by `index` and evaluate every aggregate per group
    ///
    /// The result is indexed by the index columns, one row per distinct
    /// key without nulls, keys in ascending order.
    pub fn aggregate(&self, index: &IndexSpec) -> Result<Table> {
        let keys = index.columns();
        if keys.is_empty() {
            return Err(Error::config("cannot aggregate over an index without columns"));
        }
        for name in keys {
            if !self.table.has_field(name) {
                return Err(Error::Lookup(format!("index column '{}' not found", name)));
            }
        }
        for aggregate in &self.aggregates {
            aggregate.validate(&self.table)?;
        }

        let rows = if self
            .aggregates
            .iter()
            .any(|a| matches!(a.source, Source::Predicate(_)))
        {
            Some(self.table.rows()?)
        } else {
            None
        };

        let mut frame = self.table.frame().clone();
        let mut exprs = Vec::new();
        for (slot, aggregate) in self.aggregates.iter().enumerate() {
            let plan = aggregate.plan(&self.table, rows.as_ref(), &format!("__flag_{}", slot))?;
            if let Some(flag) = plan.flag {
                frame.with_column(flag)?;
            }
            exprs.extend(plan.exprs);
        }

        let by: Vec<Expr> = keys.iter().map(|k| col(k.as_str())).collect();
        let present = by
            .iter()
            .cloned()
            .map(|k| k.is_not_null())
            .reduce(|a, b| a.and(b));

        let mut lazy = frame.lazy();
        if let Some(present) = present {
            lazy = lazy.filter(present);
        }
        let grouped = lazy
            .group_by(by)
            .agg(exprs)
            .sort(keys.to_vec(), SortMultipleOptions::default())
            .collect()?;

        debug!(
            index = ?keys,
            groups = grouped.height(),
            rows = self.table.num_rows(),
            "Aggregated table"
        );
        Table::from_frame(grouped, keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    fn crimes() -> Table {
        Table::new(vec![
            Column::new("District", [1, 1, 2, 2, 2]),
            Column::new("Arrest", [true, false, true, true, false]),
            Column::new("Primary Type", ["THEFT", "BATTERY", "THEFT", "THEFT", "ASSAULT"]),
            Column::new("Loss", [10.0, 20.0, 5.0, 7.0, 9.0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_output_names() {
        assert_eq!(Aggregate::count().output_names(), vec!["count"]);
        assert_eq!(Aggregate::count_of("Arrest").output_names(), vec!["Arrest_count"]);
        assert_eq!(
            Aggregate::count_where("theft", |_| true).with_prop().output_names(),
            vec!["theft_count", "theft_prop"]
        );
        assert_eq!(Aggregate::avg("Loss").named("loss").output_names(), vec!["loss_avg"]);
    }

    #[test]
    fn test_aggregator_groups_by_index() {
        let aggregator = Aggregator::new(
            crimes(),
            vec![
                Aggregate::count(),
                Aggregate::count_of("Arrest"),
                Aggregate::count_where("theft", |row| {
                    row.get("Primary Type").and_then(Value::as_str) == Some("THEFT")
                })
                .with_prop(),
                Aggregate::sum("Loss"),
            ],
        );

        let result = aggregator.aggregate(&IndexSpec::column("District")).unwrap();

        assert_eq!(result.num_rows(), 2);
        assert_eq!(
            result.column_names(),
            vec!["count", "Arrest_count", "theft_count", "theft_prop", "Loss_sum"]
        );
        assert_eq!(result.field("District").unwrap(), vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(
            result.column("count").unwrap().values(),
            &[Value::Float(2.0), Value::Float(3.0)]
        );
        assert_eq!(
            result.column("Arrest_count").unwrap().values(),
            &[Value::Float(1.0), Value::Float(2.0)]
        );
        assert_eq!(
            result.column("theft_prop").unwrap().values(),
            &[Value::Float(0.5), Value::Float(2.0 / 3.0)]
        );
        assert_eq!(
            result.column("Loss_sum").unwrap().values(),
            &[Value::Float(30.0), Value::Float(21.0)]
        );
    }

    #[test]
    fn test_aggregator_spread_statistics() {
        let aggregator = Aggregator::new(
            crimes(),
            vec![
                Aggregate::avg("Loss"),
                Aggregate::min("Loss"),
                Aggregate::max("Loss"),
                Aggregate::stddev("Loss"),
                Aggregate::variance("Loss"),
            ],
        );
        let result = aggregator.aggregate(&IndexSpec::column("District")).unwrap();

        // District 2 lost 5, 7 and 9
        let second = |name: &str| result.column(name).unwrap().values()[1].clone();
        assert_eq!(second("Loss_avg"), Value::Float(7.0));
        assert_eq!(second("Loss_min"), Value::Float(5.0));
        assert_eq!(second("Loss_max"), Value::Float(9.0));
        assert_eq!(second("Loss_stddev"), Value::Float(2.0));
        assert_eq!(second("Loss_variance"), Value::Float(4.0));
    }

    #[test]
    fn test_aggregator_on_empty_window() {
        let empty = crimes().filter(&[false; 5]).unwrap();
        let result = Aggregator::new(empty, vec![Aggregate::count(), Aggregate::sum("Loss")])
            .aggregate(&IndexSpec::column("District"))
            .unwrap();
        assert!(result.is_empty());
        assert_eq!(result.index_names(), vec!["District"]);
        assert_eq!(result.column_names(), vec!["count", "Loss_sum"]);
    }

    #[test]
    fn test_aggregator_drops_null_keys() {
        let table = Table::new(vec![
            Column::new("District", [Some(1), None, Some(1)]),
            Column::new("x", [1, 2, 3]),
        ])
        .unwrap();
        let result = Aggregator::new(table, vec![Aggregate::count()])
            .aggregate(&IndexSpec::column("District"))
            .unwrap();
        assert_eq!(result.num_rows(), 1);
        assert_eq!(result.column("count").unwrap().values()[0], Value::Float(2.0));
    }

    #[test]
    fn test_aggregator_lookup_errors() {
        let aggregator = Aggregator::new(crimes(), vec![Aggregate::count()]);
        assert!(matches!(
            aggregator.aggregate(&IndexSpec::column("Beat")),
            Err(Error::Lookup(_))
        ));

        let aggregator = Aggregator::new(crimes(), vec![Aggregate::sum("Missing")]);
        assert!(matches!(
            aggregator.aggregate(&IndexSpec::column("District")),
            Err(Error::Lookup(_))
        ));

        let aggregator = Aggregator::new(crimes(), vec![Aggregate::sum("Loss").with_prop()]);
        assert!(aggregator
            .aggregate(&IndexSpec::column("District"))
            .unwrap_err()
            .is_configuration());

        let aggregator = Aggregator::new(crimes(), vec![Aggregate::sum("Primary Type")]);
        assert!(aggregator
            .aggregate(&IndexSpec::column("District"))
            .unwrap_err()
            .is_configuration());
    }
}
