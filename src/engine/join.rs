//! Joining result groups back into a caller table

use tracing::debug;

use super::assemble::ResultGroups;
use crate::error::Result;
use crate::table::Table;

/// Column prefix for a group: `<key>_`, or `<prefix>_<key>_` when a prefix is set
pub fn column_prefix(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        format!("{}_", key)
    } else {
        format!("{}_{}_", prefix, key)
    }
}

/// Left-join every result group into `left`
///
/// Each group's columns are prefixed with its key and merged on the
/// group's index levels. `left` keeps its row count and order; rows
/// without a match get nulls in that group's columns.
pub fn join(left: &Table, groups: &ResultGroups, prefix: &str) -> Result<Table> {
    let mut joined = left.clone();
    for group in groups {
        let mut right = group.table().clone();
        right.prefix_columns(&column_prefix(prefix, group.name()))?;
        joined = joined.left_join(&right)?;
        debug!(
            key = group.name(),
            levels = ?right.index_names(),
            columns = right.column_names().len(),
            "Joined result group"
        );
    }
    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::argument::{ArgumentValue, ConcatKey};
    use crate::engine::assemble::ResultGroup;
    use crate::error::Error;
    use crate::table::Column;
    use crate::types::Value;

    fn groups() -> ResultGroups {
        let district = Table::new(vec![
            Column::new("District", [1, 2]),
            Column::new("count", [10, 20]),
        ])
        .unwrap()
        .set_index(&["District"])
        .unwrap();

        let mut groups = ResultGroups::new();
        groups
            .insert(ResultGroup::new(
                ConcatKey::from(vec![ArgumentValue::index("district")]),
                district,
            ))
            .unwrap();
        groups
    }

    #[test]
    fn test_join_preserves_rows() {
        let left = Table::new(vec![
            Column::new("id", [1, 2, 3]),
            Column::new("District", [2, 9, 1]),
        ])
        .unwrap();

        let joined = join(&left, &groups(), "").unwrap();
        assert_eq!(joined.num_rows(), 3);
        assert_eq!(joined.column("id").unwrap().values(), left.column("id").unwrap().values());
        assert_eq!(
            joined.column("district_count").unwrap().values(),
            &[Value::Int(20), Value::Null, Value::Int(10)]
        );
    }

    #[test]
    fn test_join_with_prefix() {
        let left = Table::new(vec![Column::new("District", [1])]).unwrap();
        let joined = join(&left, &groups(), "crime").unwrap();
        assert!(joined.column("crime_district_count").is_ok());
    }

    #[test]
    fn test_missing_key_column() {
        let left = Table::new(vec![Column::new("Beat", [1])]).unwrap();
        assert!(matches!(
            join(&left, &groups(), ""),
            Err(Error::JoinKey(_))
        ));
    }
}
