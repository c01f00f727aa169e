//! Date-window selection and right-censoring
//!
//! `select` keeps the source rows that fall inside the lookback window of
//! a unit; `censor` nulls values that were not yet known at the unit's
//! reference date so aggregates cannot look ahead.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use polars::prelude::{col, lit, DataType, TimeUnit};

use crate::error::{Error, Result};
use crate::table::Table;
use crate::types::{timestamp_millis, Delta, TimeWindow, Value};

/// Columns to censor, each mapped to the date columns that gate it
///
/// A value of a censored column survives only if every one of its gating
/// date columns holds a timestamp strictly before the reference date.
pub type CensorColumns = BTreeMap<String, Vec<String>>;

fn timestamp_column(table: &Table, column: &str) -> Result<Vec<Value>> {
    if !table.has_field(column) {
        return Err(Error::Lookup(format!("date column '{}' not found", column)));
    }
    table.field(column)
}

/// Rows whose `column` lies in `[date - delta, date)`
///
/// Rows with a null timestamp are dropped. A column that does not hold
/// timestamps is a configuration error.
pub fn select(table: &Table, column: &str, date: NaiveDateTime, delta: &Delta) -> Result<Table> {
    let dtype = table
        .frame()
        .column(column)
        .map_err(|_| Error::Lookup(format!("date column '{}' not found", column)))?
        .dtype()
        .clone();
    match dtype {
        DataType::Date | DataType::Datetime(_, _) => {}
        DataType::Null => return table.filter(&vec![false; table.num_rows()]),
        other => {
            return Err(Error::config(format!(
                "column '{}' holds {} values, not timestamps",
                column, other
            )))
        }
    }

    let window = TimeWindow::ending_at(date, delta);
    let millis = col(column)
        .cast(DataType::Datetime(TimeUnit::Milliseconds, None))
        .cast(DataType::Int64);

    let mut inside = millis.clone().lt(lit(timestamp_millis(&window.end)));
    if let Some(start) = window.start {
        inside = inside.and(millis.gt_eq(lit(timestamp_millis(&start))));
    }
    table.filter_expr(inside)
}

/// Null out censored values that were unknown as of `date`
pub fn censor(
    mut table: Table,
    censor_columns: &CensorColumns,
    date: NaiveDateTime,
) -> Result<Table> {
    for (column, gates) in censor_columns {
        if !table.has_field(column) {
            return Err(Error::Lookup(format!("censor column '{}' not found", column)));
        }

        let mut known = vec![true; table.num_rows()];
        for gate in gates {
            let values = timestamp_column(&table, gate)?;
            for (flag, value) in known.iter_mut().zip(&values) {
                *flag &= matches!(value.as_timestamp(), Some(ts) if ts < date);
            }
        }

        table.mask_values(column, &known)?;
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;
    use crate::types::midnight;
    use chrono::{Duration, NaiveDate};

    fn day(d: u32) -> NaiveDateTime {
        midnight(NaiveDate::from_ymd_opt(2015, 12, d).unwrap())
    }

    fn events() -> Table {
        Table::new(vec![
            Column::new(
                "Date",
                [
                    Some(day(28)),
                    Some(day(29) + Duration::hours(6)),
                    Some(day(30) + Duration::hours(18)),
                    Some(day(31)),
                    None,
                ],
            ),
            Column::new(
                "Closed",
                [Some(day(29)), Some(day(31)), None, Some(day(30)), Some(day(1))],
            ),
            Column::new("Arrest", [true, true, false, true, true]),
        ])
        .unwrap()
    }

    #[test]
    fn test_select_half_open_window() {
        let selected = select(&events(), "Date", day(31), &"2d".parse().unwrap()).unwrap();
        // [Dec 29 00:00, Dec 31 00:00): the 29th 06:00 and 30th 18:00 rows
        assert_eq!(selected.num_rows(), 2);

        let selected = select(&events(), "Date", day(31), &"12h".parse().unwrap()).unwrap();
        assert_eq!(selected.num_rows(), 1);

        let selected = select(&events(), "Date", day(31), &Delta::All).unwrap();
        assert_eq!(selected.num_rows(), 3);
    }

    #[test]
    fn test_select_errors() {
        assert!(matches!(
            select(&events(), "Missing", day(31), &Delta::All),
            Err(Error::Lookup(_))
        ));
        assert!(select(&events(), "Arrest", day(31), &Delta::All)
            .unwrap_err()
            .is_configuration());
    }

    #[test]
    fn test_select_keeps_index_levels() {
        let table = events().set_index(&["Arrest"]).unwrap();
        let selected = select(&table, "Date", day(31), &"2d".parse().unwrap()).unwrap();
        assert_eq!(selected.index_names(), vec!["Arrest"]);
        assert_eq!(
            selected.field("Date").unwrap(),
            vec![
                Value::Timestamp(day(29) + Duration::hours(6)),
                Value::Timestamp(day(30) + Duration::hours(18)),
            ]
        );
    }

    #[test]
    fn test_censor_nulls_unknown_values() {
        let mut columns = CensorColumns::new();
        columns.insert("Arrest".to_string(), vec!["Closed".to_string()]);

        let censored = censor(events(), &columns, day(30)).unwrap();
        assert_eq!(censored.num_rows(), 5);
        assert_eq!(
            censored.column("Arrest").unwrap().values(),
            &[
                Value::Bool(true),
                Value::Null,
                Value::Null,
                Value::Null,
                Value::Bool(true),
            ]
        );

        columns.insert("Missing".to_string(), Vec::new());
        assert!(matches!(
            censor(events(), &columns, day(30)),
            Err(Error::Lookup(_))
        ));
    }
}
