//! Argument space enumeration
//!
//! An `ArgumentSpace` is an ordered list of dimensions. Each dimension
//! contributes one or more fields to every unit; the units are the
//! cartesian product of the dimensions, outermost dimension first.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;

use crate::error::{Error, Result};
use crate::types::{format_timestamp, Delta, Value};

/// Field naming the index of a unit
pub const INDEX: &str = "index";

/// Field holding the end date of a unit's window
pub const DATE: &str = "date";

/// Field holding the lookback length of a unit's window
pub const DELTA: &str = "delta";

// ============================================================================
// Argument Values
// ============================================================================

/// Value of a single unit field
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArgumentValue {
    /// Name of an index in the index registry
    Index(String),
    /// Window end date
    Date(NaiveDateTime),
    /// Window length
    Delta(Delta),
    /// Any other value of a custom dimension
    Value(Value),
}

impl ArgumentValue {
    /// Index name argument
    pub fn index(name: impl Into<String>) -> Self {
        ArgumentValue::Index(name.into())
    }

    /// Custom dimension argument
    pub fn value(value: impl Into<Value>) -> Self {
        ArgumentValue::Value(value.into())
    }

    /// Value used when the field is inserted as an index level
    pub fn to_value(&self) -> Value {
        match self {
            ArgumentValue::Index(name) => Value::Str(name.clone()),
            ArgumentValue::Date(date) => Value::Timestamp(*date),
            ArgumentValue::Delta(delta) => Value::Str(delta.to_string()),
            ArgumentValue::Value(value) => value.clone(),
        }
    }
}

impl fmt::Display for ArgumentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgumentValue::Index(name) => write!(f, "{}", name),
            ArgumentValue::Date(date) => write!(f, "{}", format_timestamp(date)),
            ArgumentValue::Delta(delta) => write!(f, "{}", delta),
            ArgumentValue::Value(value) => write!(f, "{}", value),
        }
    }
}

impl From<Value> for ArgumentValue {
    fn from(value: Value) -> Self {
        ArgumentValue::Value(value)
    }
}

// ============================================================================
// Aggregation Unit
// ============================================================================

/// One combination of argument values to aggregate
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AggregationUnit {
    fields: BTreeMap<String, ArgumentValue>,
}

impl AggregationUnit {
    /// Create an empty unit
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field assignment
    pub fn with(mut self, field: &str, value: ArgumentValue) -> Self {
        self.fields.insert(field.to_string(), value);
        self
    }

    /// Value of a field
    pub fn get(&self, field: &str) -> Option<&ArgumentValue> {
        self.fields.get(field)
    }

    /// Value of a field that must be present
    pub fn require(&self, field: &str) -> Result<&ArgumentValue> {
        self.get(field)
            .ok_or_else(|| Error::config(format!("unit {} has no field '{}'", self, field)))
    }

    /// Name of the unit's index
    pub fn index(&self) -> Result<&str> {
        match self.require(INDEX)? {
            ArgumentValue::Index(name) => Ok(name),
            other => Err(Error::config(format!("'{}' is not an index name", other))),
        }
    }

    /// End date of the unit's window
    pub fn date(&self) -> Result<NaiveDateTime> {
        match self.require(DATE)? {
            ArgumentValue::Date(date) => Ok(*date),
            other => Err(Error::config(format!("'{}' is not a date", other))),
        }
    }

    /// Lookback length of the unit's window
    pub fn delta(&self) -> Result<Delta> {
        match self.require(DELTA)? {
            ArgumentValue::Delta(delta) => Ok(*delta),
            other => Err(Error::config(format!("'{}' is not a delta", other))),
        }
    }

    /// Field names in sorted order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Restrict the unit to the given fields, in the given order
    pub fn project(&self, fields: &[String]) -> Result<AggregationUnit> {
        let mut projected = AggregationUnit::new();
        for field in fields {
            projected
                .fields
                .insert(field.clone(), self.require(field)?.clone());
        }
        Ok(projected)
    }

    /// Values of the given fields, in the given order
    pub fn values_of(&self, fields: &[String]) -> Result<Vec<ArgumentValue>> {
        fields
            .iter()
            .map(|field| self.require(field).cloned())
            .collect()
    }
}

impl fmt::Display for AggregationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (field, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", field, value)?;
        }
        write!(f, "}}")
    }
}

// ============================================================================
// Concat Key
// ============================================================================

/// Ordered tuple of typed values identifying a result group
///
/// Stringifies as the values joined with `_`. Grouping compares the
/// string form, so two keys that render the same share a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConcatKey(Vec<ArgumentValue>);

impl ConcatKey {
    /// Key of `unit` under the given concat fields
    pub fn from_unit(unit: &AggregationUnit, concat_args: &[String]) -> Result<Self> {
        Ok(Self(unit.values_of(concat_args)?))
    }

    /// The typed values of the key
    pub fn values(&self) -> &[ArgumentValue] {
        &self.0
    }
}

impl From<Vec<ArgumentValue>> for ConcatKey {
    fn from(values: Vec<ArgumentValue>) -> Self {
        Self(values)
    }
}

impl fmt::Display for ConcatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "_")?;
            }
            write!(f, "{}", value)?;
        }
        Ok(())
    }
}

// ============================================================================
// Dimensions
// ============================================================================

/// One axis of the argument space
///
/// A single-field dimension ranges over plain values. A joint dimension
/// ranges over tuples, which is how dependent fields (an index together
/// with the deltas declared for it) are expressed.
#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    fields: Vec<String>,
    values: Vec<Vec<ArgumentValue>>,
}

impl Dimension {
    /// Dimension over a single field
    pub fn single<I>(field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = ArgumentValue>,
    {
        Self {
            fields: vec![field.to_string()],
            values: values.into_iter().map(|v| vec![v]).collect(),
        }
    }

    /// Dimension over several fields that vary together
    pub fn joint(fields: &[&str], tuples: Vec<Vec<ArgumentValue>>) -> Result<Self> {
        if fields.is_empty() {
            return Err(Error::config("a dimension needs at least one field"));
        }
        if let Some(bad) = tuples.iter().find(|t| t.len() != fields.len()) {
            return Err(Error::config(format!(
                "tuple of {} values for dimension {:?}",
                bad.len(),
                fields
            )));
        }
        Ok(Self {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            values: tuples,
        })
    }

    /// Fields this dimension assigns
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Number of values (or tuples) in the dimension
    pub fn cardinality(&self) -> usize {
        self.values.len()
    }
}

/// The declared dimensions of an aggregation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArgumentSpace {
    dimensions: Vec<Dimension>,
}

impl ArgumentSpace {
    /// Create a space, rejecting fields declared by more than one dimension
    pub fn new(dimensions: Vec<Dimension>) -> Result<Self> {
        let mut seen: Vec<&str> = Vec::new();
        for field in dimensions.iter().flat_map(|d| d.fields.iter()) {
            if seen.contains(&field.as_str()) {
                return Err(Error::config(format!(
                    "field '{}' is declared by more than one dimension",
                    field
                )));
            }
            seen.push(field);
        }
        Ok(Self { dimensions })
    }

    /// The dimensions, outermost first
    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    /// All field names, in dimension order
    pub fn fields(&self) -> Vec<&str> {
        self.dimensions
            .iter()
            .flat_map(|d| d.fields.iter().map(String::as_str))
            .collect()
    }

    /// Whether a field is declared
    pub fn has_field(&self, field: &str) -> bool {
        self.fields().contains(&field)
    }

    /// Number of units: the product of the dimension cardinalities
    pub fn cardinality(&self) -> usize {
        self.dimensions.iter().map(Dimension::cardinality).product()
    }

    /// Enumerate every unit, outermost dimension varying slowest
    pub fn units(&self) -> Vec<AggregationUnit> {
        let mut units = vec![AggregationUnit::new()];
        for dimension in &self.dimensions {
            let mut next = Vec::with_capacity(units.len() * dimension.cardinality());
            for unit in &units {
                for tuple in &dimension.values {
                    let mut extended = unit.clone();
                    for (field, value) in dimension.fields.iter().zip(tuple) {
                        extended.fields.insert(field.clone(), value.clone());
                    }
                    next.push(extended);
                }
            }
            units = next;
        }
        units
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(name: &str) -> ArgumentValue {
        ArgumentValue::index(name)
    }

    #[test]
    fn test_units_are_outer_to_inner_product() {
        let space = ArgumentSpace::new(vec![
            Dimension::single("shift", [ArgumentValue::value(1), ArgumentValue::value(2)]),
            Dimension::single(INDEX, [index("A"), index("B"), index("C")]),
        ])
        .unwrap();

        let units = space.units();
        assert_eq!(units.len(), 6);
        assert_eq!(space.cardinality(), 6);
        assert_eq!(units[0].to_string(), "{index=A, shift=1}");
        assert_eq!(units[1].to_string(), "{index=B, shift=1}");
        assert_eq!(units[3].to_string(), "{index=A, shift=2}");
    }

    #[test]
    fn test_joint_dimension() {
        let delta: Delta = "1d".parse().unwrap();
        let dim = Dimension::joint(
            &[INDEX, DELTA],
            vec![vec![index("district"), ArgumentValue::Delta(delta)]],
        )
        .unwrap();
        let space = ArgumentSpace::new(vec![dim]).unwrap();
        let unit = &space.units()[0];
        assert_eq!(unit.index().unwrap(), "district");
        assert_eq!(unit.delta().unwrap(), delta);
        assert!(unit.date().is_err());

        assert!(Dimension::joint(&[INDEX, DELTA], vec![vec![index("x")]]).is_err());
    }

    #[test]
    fn test_duplicate_fields_rejected() {
        let err = ArgumentSpace::new(vec![
            Dimension::single(INDEX, [index("A")]),
            Dimension::single(INDEX, [index("B")]),
        ])
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_empty_dimension_yields_no_units() {
        let space = ArgumentSpace::new(vec![
            Dimension::single(INDEX, [index("A")]),
            Dimension::single("shift", Vec::new()),
        ])
        .unwrap();
        assert!(space.units().is_empty());
    }

    #[test]
    fn test_concat_key_display() {
        let unit = AggregationUnit::new()
            .with(INDEX, index("district"))
            .with(DELTA, ArgumentValue::Delta("12h".parse().unwrap()));
        let key = ConcatKey::from_unit(&unit, &[INDEX.to_string(), DELTA.to_string()]).unwrap();
        assert_eq!(key.to_string(), "district_12h");
        assert!(ConcatKey::from_unit(&unit, &[DATE.to_string()]).is_err());
    }
}
