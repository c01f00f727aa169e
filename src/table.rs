//! Indexed tables backed by a polars `DataFrame`
//!
//! A `Table` wraps a frame whose leading columns are index levels and
//! whose remaining columns carry data:
//!
//! ```text
//! ┌──────────── frame ────────────┐
//! │ District │ date ║ count │ ... │
//! └─── index levels ─╨── columns ─┘
//! ```
//!
//! Index levels identify rows for stacking and joining. Cells cross the
//! boundary as `Value`s; filtering, stacking, grouping and joining run on
//! the frame itself.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::DateTime;
use polars::prelude::{
    col, BooleanChunked, Column as FrameColumn, DataFrame, DataType, Expr, IdxCa, IdxSize,
    IntoLazy, JoinArgs, JoinType, NamedFrom, NewChunkedArray, PlSmallStr, Series,
    SortMultipleOptions, TimeUnit,
};

use crate::error::{Error, Result};
use crate::types::{timestamp_millis, Value};

/// Row-number column added while joining, dropped before returning
const JOIN_ORDER: &str = "__join_order";

// ============================================================================
// Columns
// ============================================================================

/// A named column of values
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    values: Vec<Value>,
}

impl Column {
    /// Create a column from anything convertible to values
    pub fn new<I, V>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Column name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column values
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Number of values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the column has no values
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn from_frame_column(column: &FrameColumn) -> Result<Self> {
        Ok(Self {
            name: column.name().to_string(),
            values: series_values(column.as_materialized_series())?,
        })
    }

    /// Build a typed series; the dtype follows the non-null values
    fn to_series(&self) -> Result<Series> {
        let name = PlSmallStr::from(self.name.as_str());
        let series = match value_kind(&self.name, &self.values)? {
            None => Series::full_null(name, self.values.len(), &DataType::Null),
            Some(Kind::Bool) => {
                let values: Vec<Option<bool>> = self
                    .values
                    .iter()
                    .map(|v| match v {
                        Value::Bool(b) => Some(*b),
                        _ => None,
                    })
                    .collect();
                Series::new(name, values)
            }
            Some(Kind::Int) => {
                let values: Vec<Option<i64>> = self
                    .values
                    .iter()
                    .map(|v| match v {
                        Value::Int(i) => Some(*i),
                        _ => None,
                    })
                    .collect();
                Series::new(name, values)
            }
            Some(Kind::Float) => {
                let values: Vec<Option<f64>> = self
                    .values
                    .iter()
                    .map(|v| match v {
                        Value::Int(i) => Some(*i as f64),
                        Value::Float(f) => Some(*f),
                        _ => None,
                    })
                    .collect();
                Series::new(name, values)
            }
            Some(Kind::Str) => {
                let values: Vec<Option<&str>> = self.values.iter().map(Value::as_str).collect();
                Series::new(name, values)
            }
            Some(Kind::Timestamp) => {
                let millis: Vec<Option<i64>> = self
                    .values
                    .iter()
                    .map(|v| v.as_timestamp().map(|ts| timestamp_millis(&ts)))
                    .collect();
                Series::new(name, millis)
                    .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?
            }
        };
        Ok(series)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Bool,
    Int,
    Float,
    Str,
    Timestamp,
}

impl Kind {
    fn of(value: &Value) -> Option<Kind> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(Kind::Bool),
            Value::Int(_) => Some(Kind::Int),
            Value::Float(_) => Some(Kind::Float),
            Value::Str(_) => Some(Kind::Str),
            Value::Timestamp(_) => Some(Kind::Timestamp),
        }
    }
}

/// Common kind of the non-null values; integers widen to floats
fn value_kind(name: &str, values: &[Value]) -> Result<Option<Kind>> {
    let mut kind = None;
    for value in values {
        let Some(next) = Kind::of(value) else {
            continue;
        };
        kind = match (kind, next) {
            (None, next) => Some(next),
            (Some(current), next) if current == next => Some(current),
            (Some(Kind::Int), Kind::Float) | (Some(Kind::Float), Kind::Int) => Some(Kind::Float),
            (Some(current), next) => {
                return Err(Error::config(format!(
                    "column '{}' mixes {:?} and {:?} values",
                    name, current, next
                )))
            }
        };
    }
    Ok(kind)
}

fn series_values(series: &Series) -> Result<Vec<Value>> {
    let values = match series.dtype() {
        DataType::Null => vec![Value::Null; series.len()],
        DataType::Boolean => series.bool()?.into_iter().map(Value::from).collect(),
        DataType::String => series.str()?.into_iter().map(Value::from).collect(),
        DataType::Float32 | DataType::Float64 => series
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(Value::from)
            .collect(),
        DataType::Date | DataType::Datetime(_, _) => series
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .map(|ms| {
                Value::from(
                    ms.and_then(DateTime::from_timestamp_millis)
                        .map(|dt| dt.naive_utc()),
                )
            })
            .collect(),
        dtype if dtype.is_integer() => series
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .map(Value::from)
            .collect(),
        other => {
            return Err(Error::config(format!(
                "column '{}' has unsupported type {}",
                series.name(),
                other
            )))
        }
    };
    Ok(values)
}

// ============================================================================
// Rows
// ============================================================================

/// Materialized row-major view of a table
#[derive(Debug, Clone)]
pub struct Rows {
    columns: Vec<Column>,
    len: usize,
}

impl Rows {
    /// Number of rows
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether there are no rows
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Borrow a row
    pub fn get(&self, row: usize) -> Option<Row<'_>> {
        (row < self.len).then_some(Row { rows: self, row })
    }

    /// Iterate over rows in order
    pub fn iter(&self) -> impl Iterator<Item = Row<'_>> {
        (0..self.len).map(move |row| Row { rows: self, row })
    }
}

/// Borrowed view of a single table row
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    rows: &'a Rows,
    row: usize,
}

impl<'a> Row<'a> {
    /// Value of an index level or data column in this row
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.rows
            .columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.values[self.row])
    }

    /// Position of the row in its table
    pub fn position(&self) -> usize {
        self.row
    }
}

// ============================================================================
// Table
// ============================================================================

/// Frame-backed table with index levels
#[derive(Debug, Clone)]
pub struct Table {
    frame: DataFrame,
    /// Number of leading frame columns that are index levels
    levels: usize,
}

impl Default for Table {
    fn default() -> Self {
        Self {
            frame: DataFrame::empty(),
            levels: 0,
        }
    }
}

impl Table {
    /// Create a table without index levels
    ///
    /// All columns must have the same length and distinct names.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        Self::from_parts(Vec::new(), columns)
    }

    /// Create a table from index levels and data columns
    pub fn from_parts(index: Vec<Column>, columns: Vec<Column>) -> Result<Self> {
        let rows = index
            .first()
            .or_else(|| columns.first())
            .map(Column::len)
            .unwrap_or(0);

        let mut seen = Vec::with_capacity(index.len() + columns.len());
        for column in index.iter().chain(columns.iter()) {
            if column.len() != rows {
                return Err(Error::config(format!(
                    "column '{}' has {} rows, expected {}",
                    column.name,
                    column.len(),
                    rows
                )));
            }
            if seen.contains(&column.name.as_str()) {
                return Err(Error::config(format!(
                    "duplicate column name '{}'",
                    column.name
                )));
            }
            seen.push(column.name.as_str());
        }

        let series = index
            .iter()
            .chain(columns.iter())
            .map(|c| c.to_series().map(FrameColumn::from))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            frame: DataFrame::new(series)?,
            levels: index.len(),
        })
    }

    /// Wrap a frame whose first `levels` columns are index levels
    pub fn from_frame(frame: DataFrame, levels: usize) -> Result<Self> {
        if levels > frame.width() {
            return Err(Error::config(format!(
                "{} index levels requested for a frame of {} columns",
                levels,
                frame.width()
            )));
        }
        Ok(Self { frame, levels })
    }

    /// The underlying frame, index levels first
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Consume the table, returning its frame
    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    /// Move the named data columns to the end of the index levels
    pub fn set_index(self, names: &[&str]) -> Result<Self> {
        let mut order: Vec<String> = self.index_names().iter().map(|n| n.to_string()).collect();
        let mut data: Vec<String> = self.column_names().iter().map(|n| n.to_string()).collect();

        for name in names {
            let pos = data
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| Error::Lookup(format!("column '{}' not found", name)))?;
            order.push(data.remove(pos));
        }

        let levels = order.len();
        order.extend(data);
        Ok(Self {
            frame: self.frame.select(order)?,
            levels,
        })
    }

    /// Number of rows
    pub fn num_rows(&self) -> usize {
        self.frame.height()
    }

    /// Whether the table has no rows
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Number of index levels
    pub fn num_levels(&self) -> usize {
        self.levels
    }

    fn names(&self) -> Vec<&str> {
        self.frame
            .get_column_names()
            .into_iter()
            .map(|n| n.as_str())
            .collect()
    }

    /// Names of the index levels, outermost first
    pub fn index_names(&self) -> Vec<&str> {
        let mut names = self.names();
        names.truncate(self.levels);
        names
    }

    /// Names of the data columns in order
    pub fn column_names(&self) -> Vec<&str> {
        self.names().split_off(self.levels)
    }

    /// Whether an index level or data column has this name
    pub fn has_field(&self, name: &str) -> bool {
        self.frame.get_column_index(name).is_some()
    }

    /// Index levels, materialized
    pub fn index(&self) -> Result<Vec<Column>> {
        self.frame.get_columns()[..self.levels]
            .iter()
            .map(Column::from_frame_column)
            .collect()
    }

    /// Data columns, materialized
    pub fn columns(&self) -> Result<Vec<Column>> {
        self.frame.get_columns()[self.levels..]
            .iter()
            .map(Column::from_frame_column)
            .collect()
    }

    /// Data column by name
    pub fn column(&self, name: &str) -> Result<Column> {
        match self.frame.get_column_index(name) {
            Some(pos) if pos >= self.levels => {
                Column::from_frame_column(&self.frame.get_columns()[pos])
            }
            _ => Err(Error::Lookup(format!("data column '{}' not found", name))),
        }
    }

    /// Values of an index level or data column
    pub fn field(&self, name: &str) -> Result<Vec<Value>> {
        let column = self
            .frame
            .column(name)
            .map_err(|_| Error::Lookup(format!("column '{}' not found", name)))?;
        series_values(column.as_materialized_series())
    }

    /// Materialize every level and column for row-wise access
    pub fn rows(&self) -> Result<Rows> {
        let columns = self
            .frame
            .get_columns()
            .iter()
            .map(Column::from_frame_column)
            .collect::<Result<Vec<_>>>()?;
        Ok(Rows {
            columns,
            len: self.num_rows(),
        })
    }

    /// Keep rows whose mask entry is true
    pub fn filter(&self, mask: &[bool]) -> Result<Table> {
        if mask.len() != self.num_rows() {
            return Err(Error::config(format!(
                "mask has {} entries, table has {} rows",
                mask.len(),
                self.num_rows()
            )));
        }
        let mask = BooleanChunked::from_slice(PlSmallStr::from_static("mask"), mask);
        Ok(Self {
            frame: self.frame.filter(&mask)?,
            levels: self.levels,
        })
    }

    /// Keep rows where `predicate` holds, evaluated on the frame
    pub fn filter_expr(&self, predicate: Expr) -> Result<Table> {
        let frame = self.frame.clone().lazy().filter(predicate).collect()?;
        Ok(Self {
            frame,
            levels: self.levels,
        })
    }

    /// Select rows by position, in the given order
    pub fn take(&self, rows: &[usize]) -> Result<Table> {
        let rows = IdxCa::from_vec(
            PlSmallStr::from_static("rows"),
            rows.iter().map(|&r| r as IdxSize).collect(),
        );
        Ok(Self {
            frame: self.frame.take(&rows)?,
            levels: self.levels,
        })
    }

    /// Null out the values of `name` where `keep` is false
    ///
    /// The column keeps its type even if every value ends up null.
    pub fn mask_values(&mut self, name: &str, keep: &[bool]) -> Result<()> {
        let dtype = self
            .frame
            .column(name)
            .map_err(|_| Error::Lookup(format!("column '{}' not found", name)))?
            .dtype()
            .clone();

        let mut values = self.field(name)?;
        for (value, keep) in values.iter_mut().zip(keep) {
            if !keep {
                *value = Value::Null;
            }
        }

        let series = Column::new(name, values).to_series()?.cast(&dtype)?;
        self.frame.with_column(series)?;
        Ok(())
    }

    /// Append a constant index level after the existing ones
    pub fn append_index_level(&mut self, name: &str, value: Value) -> Result<()> {
        if self.has_field(name) {
            return Err(Error::config(format!(
                "cannot insert index level '{}': name already in use",
                name
            )));
        }
        let level = Column::new(name, [value])
            .to_series()?
            .new_from_index(0, self.num_rows());
        self.frame.insert_column(self.levels, level)?;
        self.levels += 1;
        Ok(())
    }

    /// Whether two tables share index level names and column names in order
    pub fn same_schema(&self, other: &Table) -> bool {
        self.index_names() == other.index_names() && self.column_names() == other.column_names()
    }

    /// Stack tables row-wise
    ///
    /// Every table must have the schema of the first one. Rows keep their
    /// multiplicity; no deduplication happens. An all-null column takes
    /// the type of its counterpart.
    pub fn vstack(tables: Vec<Table>) -> Result<Table> {
        let mut tables = tables.into_iter();
        let Some(mut stacked) = tables.next() else {
            return Ok(Table::default());
        };

        for mut table in tables {
            if !stacked.same_schema(&table) {
                return Err(Error::config(format!(
                    "schema mismatch while stacking: {:?}/{:?} vs {:?}/{:?}",
                    stacked.index_names(),
                    stacked.column_names(),
                    table.index_names(),
                    table.column_names()
                )));
            }
            unify_types(&mut stacked.frame, &mut table.frame)?;
            stacked.frame = stacked.frame.vstack(&table.frame)?;
        }

        Ok(stacked)
    }

    /// Split rows into sub-tables by the values of the given index levels
    ///
    /// Groups come out in order of first appearance and keep their rows in
    /// table order, so stacking them back yields the original rows.
    pub fn split_by(&self, levels: &[&str]) -> Result<Vec<(Vec<Value>, Table)>> {
        let index_names = self.index_names();
        let keys = levels
            .iter()
            .map(|name| {
                if index_names.contains(name) {
                    self.field(name)
                } else {
                    Err(Error::Lookup(format!("index level '{}' not found", name)))
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let mut order: Vec<Vec<Value>> = Vec::new();
        let mut groups: HashMap<Vec<Value>, Vec<usize>> = HashMap::new();
        for row in 0..self.num_rows() {
            let key: Vec<Value> = keys.iter().map(|values| values[row].clone()).collect();
            groups
                .entry(key.clone())
                .or_insert_with(|| {
                    order.push(key);
                    Vec::new()
                })
                .push(row);
        }

        order
            .into_iter()
            .map(|key| {
                let rows = groups.get(&key).map(Vec::as_slice).unwrap_or_default();
                let table = self.take(rows)?;
                Ok((key, table))
            })
            .collect()
    }

    /// Prefix every data column name
    pub fn prefix_columns(&mut self, prefix: &str) -> Result<()> {
        let names: Vec<String> = self.column_names().iter().map(|n| n.to_string()).collect();
        for name in names {
            self.frame
                .rename(&name, PlSmallStr::from(format!("{}{}", prefix, name)))?;
        }
        Ok(())
    }

    /// Left-join `right` into this table on `right`'s index levels
    ///
    /// Each index level of `right` is matched against the identically
    /// named index level or column of `self`. The result keeps every row
    /// of `self` in order; rows without a match, or with a null key, get
    /// nulls in the new columns. Duplicate keys in `right` are rejected
    /// since they would change the row count.
    pub fn left_join(&self, right: &Table) -> Result<Table> {
        let levels = right.index_names();
        if levels.is_empty() {
            return Err(Error::JoinKey(
                "right table has no index levels to join on".to_string(),
            ));
        }

        for name in &levels {
            if !self.has_field(name) {
                return Err(Error::JoinKey(format!(
                    "left table has no level or column '{}'",
                    name
                )));
            }
        }

        for name in right.column_names() {
            if self.has_field(name) {
                return Err(Error::config(format!(
                    "join would duplicate column '{}'",
                    name
                )));
            }
        }

        let keys = right.index()?;
        let mut seen: HashSet<Vec<&Value>> = HashSet::with_capacity(right.num_rows());
        for row in 0..right.num_rows() {
            let key: Vec<&Value> = keys.iter().map(|c| &c.values[row]).collect();
            if !seen.insert(key) {
                return Err(Error::config(format!(
                    "duplicate key in joined table at row {}",
                    row
                )));
            }
        }

        let on: Vec<Expr> = levels.iter().map(|name| col(*name)).collect();
        let frame = self
            .frame
            .clone()
            .lazy()
            .with_row_index(JOIN_ORDER, None)
            .join(
                right.frame.clone().lazy(),
                on.clone(),
                on,
                JoinArgs::new(JoinType::Left),
            )
            .sort(vec![JOIN_ORDER], SortMultipleOptions::default())
            .collect()?
            .drop(JOIN_ORDER)?;

        Ok(Self {
            frame,
            levels: self.levels,
        })
    }
}

/// Cast all-null or mismatched columns of `other` (or `stacked`) so both
/// frames agree on every column type
fn unify_types(stacked: &mut DataFrame, other: &mut DataFrame) -> Result<()> {
    let names: Vec<String> = stacked
        .get_column_names()
        .iter()
        .map(|n| n.to_string())
        .collect();

    for name in names {
        let left = stacked.column(&name)?.dtype().clone();
        let right = other.column(&name)?.dtype().clone();
        if left == right {
            continue;
        }
        if left == DataType::Null {
            let cast = stacked
                .column(&name)?
                .as_materialized_series()
                .cast(&right)?;
            stacked.with_column(cast)?;
        } else {
            let cast = other
                .column(&name)?
                .as_materialized_series()
                .cast(&left)?;
            other.with_column(cast)?;
        }
    }
    Ok(())
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        if self.levels != other.levels || self.names() != other.names() {
            return false;
        }
        match (self.rows(), other.rows()) {
            (Ok(a), Ok(b)) => a.columns == b.columns,
            _ => false,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.names().join("\t"))?;
        let rows = self.rows().map_err(|_| fmt::Error)?;
        for row in 0..rows.len() {
            let cells: Vec<String> = rows
                .columns
                .iter()
                .map(|c| c.values[row].to_string())
                .collect();
            writeln!(f, "{}", cells.join("\t"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use polars::prelude::lit;

    use crate::types::midnight;

    fn sample() -> Table {
        Table::new(vec![
            Column::new("District", [1, 2, 1]),
            Column::new("count", [3, 4, 5]),
        ])
        .unwrap()
    }

    #[test]
    fn test_new_rejects_ragged_columns() {
        let err = Table::new(vec![Column::new("a", [1, 2]), Column::new("b", [1])]);
        assert!(err.is_err());

        let err = Table::new(vec![Column::new("a", [1]), Column::new("a", [1])]);
        assert!(err.is_err());

        let err = Table::new(vec![Column::new(
            "mixed",
            [Value::Int(1), Value::Str("x".into())],
        )]);
        assert!(err.unwrap_err().is_configuration());
    }

    #[test]
    fn test_values_survive_the_frame() {
        let ts = midnight(NaiveDate::from_ymd_opt(2015, 12, 30).unwrap());
        let table = Table::new(vec![
            Column::new("flag", [Some(true), None]),
            Column::new("n", [Some(3), None]),
            Column::new("x", [Value::Int(1), Value::Float(2.5)]),
            Column::new("s", [Some("THEFT"), None]),
            Column::new("at", [Some(ts), None]),
            Column::new("gone", [Value::Null, Value::Null]),
        ])
        .unwrap();

        assert_eq!(
            table.frame().column("at").unwrap().dtype(),
            &DataType::Datetime(TimeUnit::Milliseconds, None)
        );
        assert_eq!(table.field("flag").unwrap(), vec![Value::Bool(true), Value::Null]);
        assert_eq!(table.field("n").unwrap(), vec![Value::Int(3), Value::Null]);
        assert_eq!(table.field("x").unwrap(), vec![Value::Float(1.0), Value::Float(2.5)]);
        assert_eq!(table.field("s").unwrap(), vec![Value::from("THEFT"), Value::Null]);
        assert_eq!(table.field("at").unwrap(), vec![Value::Timestamp(ts), Value::Null]);
        assert_eq!(table.field("gone").unwrap(), vec![Value::Null, Value::Null]);
    }

    #[test]
    fn test_set_index_and_field_lookup() {
        let table = sample().set_index(&["District"]).unwrap();
        assert_eq!(table.index_names(), vec!["District"]);
        assert_eq!(table.column_names(), vec!["count"]);
        assert_eq!(table.field("District").unwrap()[1], Value::Int(2));
        assert!(table.column("District").is_err());
        assert!(matches!(table.field("Beat"), Err(Error::Lookup(_))));
        assert!(sample().set_index(&["missing"]).is_err());
    }

    #[test]
    fn test_filter_and_take() {
        let table = sample().set_index(&["District"]).unwrap();
        let kept = table.filter(&[true, false, true]).unwrap();
        assert_eq!(kept.index_names(), vec!["District"]);
        assert_eq!(kept.field("count").unwrap(), vec![Value::Int(3), Value::Int(5)]);
        assert!(table.filter(&[true]).is_err());

        let kept = table.filter_expr(col("count").gt(lit(3))).unwrap();
        assert_eq!(kept.num_rows(), 2);

        let taken = table.take(&[2, 0]).unwrap();
        assert_eq!(taken.field("count").unwrap(), vec![Value::Int(5), Value::Int(3)]);
    }

    #[test]
    fn test_mask_values_keeps_type() {
        let mut table = sample();
        table.mask_values("count", &[false, false, false]).unwrap();
        assert_eq!(table.frame().column("count").unwrap().dtype(), &DataType::Int64);
        assert!(table.field("count").unwrap().iter().all(Value::is_null));
    }

    #[test]
    fn test_append_index_level() {
        let mut table = sample().set_index(&["District"]).unwrap();
        table.append_index_level("date", Value::Int(7)).unwrap();
        assert_eq!(table.index_names(), vec!["District", "date"]);
        assert!(table.field("date").unwrap().iter().all(|v| *v == Value::Int(7)));
        assert!(table.append_index_level("count", Value::Null).is_err());
    }

    #[test]
    fn test_vstack_requires_same_schema() {
        let a = sample().set_index(&["District"]).unwrap();
        let b = sample().set_index(&["District"]).unwrap();
        let stacked = Table::vstack(vec![a.clone(), b]).unwrap();
        assert_eq!(stacked.num_rows(), 6);
        assert_eq!(stacked.column("count").unwrap().values()[3], Value::Int(3));

        let other = sample();
        let err = Table::vstack(vec![a, other]).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_vstack_adopts_type_of_all_null_column() {
        let empty = Table::new(vec![
            Column::new("District", [Value::Null]),
            Column::new("count", [Value::Null]),
        ])
        .unwrap();
        let stacked = Table::vstack(vec![empty, sample()]).unwrap();
        assert_eq!(stacked.num_rows(), 4);
        assert_eq!(stacked.field("District").unwrap()[1], Value::Int(1));
    }

    #[test]
    fn test_split_by_preserves_rows() {
        let table = sample().set_index(&["District"]).unwrap();
        let parts = table.split_by(&["District"]).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].0, vec![Value::Int(1)]);
        assert_eq!(parts[0].1.num_rows(), 2);
        assert_eq!(parts[1].1.num_rows(), 1);
        assert!(table.split_by(&["count"]).is_err());
    }

    #[test]
    fn test_left_join_preserves_left_rows() {
        let left = Table::new(vec![Column::new(
            "District",
            [Some(2), Some(9), None, Some(1), Some(2)],
        )])
        .unwrap();
        let mut right = Table::new(vec![
            Column::new("District", [1, 2]),
            Column::new("count", [10, 20]),
        ])
        .unwrap()
        .set_index(&["District"])
        .unwrap();
        right.prefix_columns("district_").unwrap();

        let joined = left.left_join(&right).unwrap();
        assert_eq!(joined.num_rows(), 5);
        assert_eq!(joined.column_names(), vec!["District", "district_count"]);
        assert_eq!(joined.field("District").unwrap(), left.field("District").unwrap());
        assert_eq!(
            joined.column("district_count").unwrap().values(),
            &[Value::Int(20), Value::Null, Value::Null, Value::Int(10), Value::Int(20)]
        );
    }

    #[test]
    fn test_left_join_errors() {
        let left = Table::new(vec![Column::new("Beat", [1])]).unwrap();
        let right = sample().set_index(&["District"]).unwrap();
        assert!(matches!(left.left_join(&right), Err(Error::JoinKey(_))));

        // District 1 appears twice in the right table
        let left = Table::new(vec![Column::new("District", [1])]).unwrap();
        assert!(left.left_join(&right).unwrap_err().is_configuration());

        let left =
            Table::new(vec![Column::new("District", [1]), Column::new("count", [0])]).unwrap();
        let right = Table::new(vec![Column::new("District", [1]), Column::new("count", [2])])
            .unwrap()
            .set_index(&["District"])
            .unwrap();
        assert!(left.left_join(&right).unwrap_err().is_configuration());
    }

    #[test]
    fn test_rows_view() {
        let rows = sample().rows().unwrap();
        assert_eq!(rows.len(), 3);
        let row = rows.get(1).unwrap();
        assert_eq!(row.get("count"), Some(&Value::Int(4)));
        assert_eq!(row.get("Beat"), None);
        assert_eq!(rows.iter().map(|r| r.position()).collect::<Vec<_>>(), vec![0, 1, 2]);
    }
}
