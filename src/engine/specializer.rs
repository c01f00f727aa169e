//! Specializers
//!
//! A specializer decides what the argument space looks like and how the
//! aggregator for a unit is built. Two variants exist:
//!
//! - **Simple**: one dimension (`index`); a single aggregator over the
//!   whole input table serves every index.
//! - **Spacetime**: `date` crossed with `(index, delta)` pairs; the
//!   aggregator for a `(date, delta)` pair runs over the rows inside that
//!   window, censored as of `date`.

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::debug;

use super::argument::{
    AggregationUnit, ArgumentSpace, ArgumentValue, Dimension, DATE, DELTA, INDEX,
};
use super::fanout::PartitionKey;
use crate::aggregation::{censor, select, Aggregate, Aggregator, CensorColumns};
use crate::error::{Error, Result};
use crate::table::Table;
use crate::types::Delta;

// ============================================================================
// Index Registry
// ============================================================================

/// Physical specification of an index: the columns to group by
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    columns: Vec<String>,
}

impl IndexSpec {
    /// Index over a single column
    pub fn column(name: &str) -> Self {
        Self {
            columns: vec![name.to_string()],
        }
    }

    /// Index over several columns
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Grouping columns
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

/// Ordered mapping from index names to index specifications
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexRegistry {
    entries: Vec<(String, IndexSpec)>,
}

impl IndexRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry where every name indexes the column of the same name
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut registry = Self::new();
        for name in names {
            let name = name.as_ref();
            registry.insert(name, IndexSpec::column(name))?;
        }
        Ok(registry)
    }

    /// Register an index, rejecting duplicate names
    pub fn insert(&mut self, name: &str, spec: IndexSpec) -> Result<()> {
        if self.entries.iter().any(|(n, _)| n == name) {
            return Err(Error::config(format!("index '{}' declared twice", name)));
        }
        self.entries.push((name.to_string(), spec));
        Ok(())
    }

    /// Look up an index by name
    pub fn get(&self, name: &str) -> Result<&IndexSpec> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, spec)| spec)
            .ok_or_else(|| Error::Lookup(format!("index '{}' is not registered", name)))
    }

    /// Index names in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Number of registered indexes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn only(&self, name: &str) -> Result<Self> {
        let spec = self.get(name)?.clone();
        Ok(Self {
            entries: vec![(name.to_string(), spec)],
        })
    }
}

// ============================================================================
// Aggregate Provider
// ============================================================================

/// Hooks a spacetime aggregation supplies
///
/// Both hooks default to `Error::UnimplementedHook`, so a provider that
/// omits a hook the configuration needs fails loudly on first use.
pub trait AggregateProvider: Send + Sync {
    /// Aggregates to compute for the window ending at `date` of length `delta`
    fn aggregates(&self, date: NaiveDateTime, delta: &Delta) -> Result<Vec<Aggregate>> {
        let _ = (date, delta);
        Err(Error::UnimplementedHook("aggregates"))
    }

    /// Narrow the windowed rows for a specific index
    ///
    /// Only called when `index` is one of the aggregator arguments.
    fn restrict(&self, table: Table, index: &str) -> Result<Table> {
        let _ = (table, index);
        Err(Error::UnimplementedHook("restrict"))
    }
}

/// Provider returning the same aggregates for every window
#[derive(Debug, Clone)]
pub struct FixedAggregates(pub Vec<Aggregate>);

impl AggregateProvider for FixedAggregates {
    fn aggregates(&self, _date: NaiveDateTime, _delta: &Delta) -> Result<Vec<Aggregate>> {
        Ok(self.0.clone())
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

fn check_declared(space: &ArgumentSpace, kind: &str, args: &[String]) -> Result<()> {
    for arg in args {
        if !space.has_field(arg) {
            return Err(Error::config(format!(
                "{} argument '{}' is not a declared dimension (declared: {:?})",
                kind,
                arg,
                space.fields()
            )));
        }
    }
    Ok(())
}

// ============================================================================
// Simple Specializer
// ============================================================================

/// Aggregation over a set of indexes with one shared aggregator
#[derive(Debug, Clone)]
pub struct SimpleSpecializer {
    indexes: IndexRegistry,
    aggregates: Vec<Aggregate>,
    extra: Vec<Dimension>,
    concat_args: Vec<String>,
    insert_args: Vec<String>,
}

impl SimpleSpecializer {
    /// Aggregate `aggregates` over every index in `indexes`
    pub fn new(indexes: IndexRegistry, aggregates: Vec<Aggregate>) -> Self {
        Self {
            indexes,
            aggregates,
            extra: Vec::new(),
            concat_args: strings(&[INDEX]),
            insert_args: Vec::new(),
        }
    }

    /// Add a custom dimension, innermost
    pub fn with_dimension(mut self, dimension: Dimension) -> Self {
        self.extra.push(dimension);
        self
    }

    /// Override the concat arguments
    pub fn with_concat_args(mut self, args: &[&str]) -> Self {
        self.concat_args = strings(args);
        self
    }

    /// Override the insert arguments
    pub fn with_insert_args(mut self, args: &[&str]) -> Self {
        self.insert_args = strings(args);
        self
    }

    /// The index registry
    pub fn indexes(&self) -> &IndexRegistry {
        &self.indexes
    }

    fn argument_space(&self) -> Result<ArgumentSpace> {
        let mut dimensions = vec![Dimension::single(
            INDEX,
            self.indexes.names().map(ArgumentValue::index),
        )];
        dimensions.extend(self.extra.iter().cloned());
        ArgumentSpace::new(dimensions)
    }

    fn validate(&self) -> Result<()> {
        if self.aggregates.is_empty() {
            return Err(Error::config("simple aggregation declares no aggregates"));
        }
        Ok(())
    }
}

// ============================================================================
// Spacetime Specializer
// ============================================================================

/// A named index with the deltas to evaluate against it
#[derive(Debug, Clone, PartialEq)]
pub struct SpaceDelta {
    /// Name used in units and result keys
    pub name: String,
    /// Physical index
    pub index: IndexSpec,
    /// Window lengths
    pub deltas: Vec<Delta>,
}

impl SpaceDelta {
    /// Create a spacedelta from delta strings such as `"12h"`
    pub fn new(name: &str, index: IndexSpec, deltas: &[&str]) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            index,
            deltas: deltas.iter().map(|d| d.parse()).collect::<Result<_>>()?,
        })
    }
}

/// Aggregation over space (indexes) and time (date, delta windows)
#[derive(Clone)]
pub struct SpacetimeSpecializer {
    spacedeltas: Vec<SpaceDelta>,
    dates: Vec<NaiveDateTime>,
    date_column: String,
    censor_columns: CensorColumns,
    provider: Arc<dyn AggregateProvider>,
    extra: Vec<Dimension>,
    aggregator_args: Vec<String>,
    concat_args: Vec<String>,
    insert_args: Vec<String>,
}

impl fmt::Debug for SpacetimeSpecializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpacetimeSpecializer")
            .field("spacedeltas", &self.spacedeltas)
            .field("dates", &self.dates)
            .field("date_column", &self.date_column)
            .field("censor_columns", &self.censor_columns)
            .field("aggregator_args", &self.aggregator_args)
            .field("concat_args", &self.concat_args)
            .field("insert_args", &self.insert_args)
            .finish_non_exhaustive()
    }
}

impl SpacetimeSpecializer {
    /// Aggregate every spacedelta at every date
    ///
    /// Defaults: aggregator arguments `[date, delta]`, concat arguments
    /// `[index, delta]`, insert arguments `[date]`.
    pub fn new(
        spacedeltas: Vec<SpaceDelta>,
        dates: Vec<NaiveDateTime>,
        date_column: &str,
        provider: Arc<dyn AggregateProvider>,
    ) -> Self {
        Self {
            spacedeltas,
            dates,
            date_column: date_column.to_string(),
            censor_columns: CensorColumns::new(),
            provider,
            extra: Vec::new(),
            aggregator_args: strings(&[DATE, DELTA]),
            concat_args: strings(&[INDEX, DELTA]),
            insert_args: strings(&[DATE]),
        }
    }

    /// Censor columns applied to every window
    pub fn with_censor_columns(mut self, censor_columns: CensorColumns) -> Self {
        self.censor_columns = censor_columns;
        self
    }

    /// Override the aggregator arguments
    ///
    /// Adding `index` makes the provider's `restrict` hook run per index.
    pub fn with_aggregator_args(mut self, args: &[&str]) -> Self {
        self.aggregator_args = strings(args);
        self
    }

    /// Override the concat arguments
    pub fn with_concat_args(mut self, args: &[&str]) -> Self {
        self.concat_args = strings(args);
        self
    }

    /// Override the insert arguments
    pub fn with_insert_args(mut self, args: &[&str]) -> Self {
        self.insert_args = strings(args);
        self
    }

    /// Add a custom dimension, innermost
    pub fn with_dimension(mut self, dimension: Dimension) -> Self {
        self.extra.push(dimension);
        self
    }

    /// The end dates
    pub fn dates(&self) -> &[NaiveDateTime] {
        &self.dates
    }

    /// The spacedeltas
    pub fn spacedeltas(&self) -> &[SpaceDelta] {
        &self.spacedeltas
    }

    /// Registry of the spacedelta indexes
    pub fn indexes(&self) -> Result<IndexRegistry> {
        let mut registry = IndexRegistry::new();
        for sd in &self.spacedeltas {
            registry.insert(&sd.name, sd.index.clone())?;
        }
        Ok(registry)
    }

    /// Source rows for the window ending at `date`, censored as of `date`
    pub fn get_data(&self, source: &Table, date: NaiveDateTime, delta: &Delta) -> Result<Table> {
        let windowed = select(source, &self.date_column, date, delta)?;
        censor(windowed, &self.censor_columns, date)
    }

    fn argument_space(&self) -> Result<ArgumentSpace> {
        let pairs = self
            .spacedeltas
            .iter()
            .flat_map(|sd| {
                sd.deltas.iter().map(move |delta| {
                    vec![
                        ArgumentValue::index(sd.name.as_str()),
                        ArgumentValue::Delta(*delta),
                    ]
                })
            })
            .collect();

        let mut dimensions = vec![
            Dimension::single(DATE, self.dates.iter().copied().map(ArgumentValue::Date)),
            Dimension::joint(&[INDEX, DELTA], pairs)?,
        ];
        dimensions.extend(self.extra.iter().cloned());
        ArgumentSpace::new(dimensions)
    }

    fn build_aggregator(&self, source: &Table, args: &AggregationUnit) -> Result<Aggregator> {
        let date = args.date()?;
        let delta = args.delta()?;

        let mut data = self.get_data(source, date, &delta)?;
        if args.get(INDEX).is_some() {
            data = self.provider.restrict(data, args.index()?)?;
        }

        let aggregates = self.provider.aggregates(date, &delta)?;
        Ok(Aggregator::new(data, aggregates))
    }

    fn validate(&self) -> Result<()> {
        self.indexes()?;
        if self.date_column.is_empty() {
            return Err(Error::config("spacetime aggregation needs a date column"));
        }
        for required in [DATE, DELTA] {
            if !self.aggregator_args.iter().any(|a| a == required) {
                return Err(Error::config(format!(
                    "spacetime aggregator arguments must include '{}'",
                    required
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Specializer
// ============================================================================

/// The closed set of aggregation policies
#[derive(Debug, Clone)]
pub enum Specializer {
    /// Index-only aggregation
    Simple(SimpleSpecializer),
    /// Index crossed with date windows
    Spacetime(SpacetimeSpecializer),
}

impl Specializer {
    /// The declared argument space
    pub fn argument_space(&self) -> Result<ArgumentSpace> {
        match self {
            Specializer::Simple(s) => s.argument_space(),
            Specializer::Spacetime(s) => s.argument_space(),
        }
    }

    /// Names of the fields that vary across units
    pub fn dimensions(&self) -> Result<Vec<String>> {
        Ok(self
            .argument_space()?
            .fields()
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    /// Every unit, in declared order
    pub fn units(&self) -> Result<Vec<AggregationUnit>> {
        Ok(self.argument_space()?.units())
    }

    /// Fields the aggregator depends on
    pub fn aggregator_args(&self) -> &[String] {
        match self {
            Specializer::Simple(_) => &[],
            Specializer::Spacetime(s) => &s.aggregator_args,
        }
    }

    /// Fields whose values form the concat key
    pub fn concat_args(&self) -> &[String] {
        match self {
            Specializer::Simple(s) => &s.concat_args,
            Specializer::Spacetime(s) => &s.concat_args,
        }
    }

    /// Fields inserted as extra index levels
    pub fn insert_args(&self) -> &[String] {
        match self {
            Specializer::Simple(s) => &s.insert_args,
            Specializer::Spacetime(s) => &s.insert_args,
        }
    }

    /// Physical index for an index name
    pub fn index_spec(&self, name: &str) -> Result<IndexSpec> {
        match self {
            Specializer::Simple(s) => s.indexes.get(name).cloned(),
            Specializer::Spacetime(s) => s
                .spacedeltas
                .iter()
                .find(|sd| sd.name == name)
                .map(|sd| sd.index.clone())
                .ok_or_else(|| Error::Lookup(format!("index '{}' is not registered", name))),
        }
    }

    /// Build the aggregator for a projection of a unit onto `aggregator_args`
    pub fn build_aggregator(&self, source: &Table, args: &AggregationUnit) -> Result<Aggregator> {
        debug!(args = %args, "Building aggregator");
        match self {
            Specializer::Simple(s) => Ok(Aggregator::new(source.clone(), s.aggregates.clone())),
            Specializer::Spacetime(s) => s.build_aggregator(source, args),
        }
    }

    /// Split into one narrowed specializer per value of `key`
    pub fn partition(&self, key: PartitionKey) -> Result<Vec<Specializer>> {
        match (self, key) {
            (Specializer::Simple(s), PartitionKey::Index) => s
                .indexes
                .names()
                .map(|name| {
                    let mut part = s.clone();
                    part.indexes = s.indexes.only(name)?;
                    Ok(Specializer::Simple(part))
                })
                .collect(),
            (Specializer::Simple(_), PartitionKey::Date) => Err(Error::config(
                "simple aggregation has no date dimension to partition on",
            )),
            (Specializer::Spacetime(s), PartitionKey::Date) => Ok(s
                .dates
                .iter()
                .map(|date| {
                    let mut part = s.clone();
                    part.dates = vec![*date];
                    Specializer::Spacetime(part)
                })
                .collect()),
            (Specializer::Spacetime(s), PartitionKey::Index) => Ok(s
                .spacedeltas
                .iter()
                .map(|sd| {
                    let mut part = s.clone();
                    part.spacedeltas = vec![sd.clone()];
                    Specializer::Spacetime(part)
                })
                .collect()),
        }
    }

    /// Check the declarations for conflicts and missing pieces
    pub fn validate(&self) -> Result<()> {
        let space = self.argument_space()?;
        check_declared(&space, "aggregator", self.aggregator_args())?;
        check_declared(&space, "concat", self.concat_args())?;
        check_declared(&space, "insert", self.insert_args())?;

        match self {
            Specializer::Simple(s) => s.validate(),
            Specializer::Spacetime(s) => s.validate(),
        }
    }
}

impl From<SimpleSpecializer> for Specializer {
    fn from(s: SimpleSpecializer) -> Self {
        Specializer::Simple(s)
    }
}

impl From<SpacetimeSpecializer> for Specializer {
    fn from(s: SpacetimeSpecializer) -> Self {
        Specializer::Spacetime(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;
    use crate::types::midnight;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDateTime {
        midnight(NaiveDate::from_ymd_opt(2015, 12, d).unwrap())
    }

    fn spacetime() -> SpacetimeSpecializer {
        SpacetimeSpecializer::new(
            vec![
                SpaceDelta::new("district", IndexSpec::column("District"), &["12h", "24h"])
                    .unwrap(),
                SpaceDelta::new("community", IndexSpec::column("Community Area"), &["1d", "2d"])
                    .unwrap(),
            ],
            vec![day(30), day(31)],
            "Date",
            Arc::new(FixedAggregates(vec![Aggregate::count()])),
        )
    }

    struct NoHooks;

    impl AggregateProvider for NoHooks {}

    #[test]
    fn test_simple_units() {
        let simple = Specializer::from(SimpleSpecializer::new(
            IndexRegistry::from_names(["A", "B"]).unwrap(),
            vec![Aggregate::count()],
        ));
        simple.validate().unwrap();

        let units = simple.units().unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].index().unwrap(), "A");
        assert_eq!(simple.dimensions().unwrap(), vec![INDEX]);
        assert!(simple.aggregator_args().is_empty());
        assert_eq!(simple.concat_args(), &[INDEX.to_string()]);
    }

    #[test]
    fn test_spacetime_units_order() {
        let st = Specializer::from(spacetime());
        st.validate().unwrap();

        let units = st.units().unwrap();
        assert_eq!(units.len(), 2 * (2 + 2));
        assert_eq!(units[0].to_string(), "{date=2015-12-30, delta=12h, index=district}");
        assert_eq!(units[2].to_string(), "{date=2015-12-30, delta=1d, index=community}");
        assert_eq!(units[4].to_string(), "{date=2015-12-31, delta=12h, index=district}");
        assert_eq!(st.dimensions().unwrap(), vec![DATE, INDEX, DELTA]);
    }

    #[test]
    fn test_validation_errors() {
        let st = Specializer::from(spacetime().with_aggregator_args(&[DATE]));
        assert!(st.validate().unwrap_err().is_configuration());

        let st = Specializer::from(spacetime().with_concat_args(&[INDEX, "shift"]));
        assert!(st.validate().unwrap_err().is_configuration());

        let st = Specializer::from(
            spacetime().with_dimension(Dimension::single(DATE, [ArgumentValue::Date(day(1))])),
        );
        assert!(st.validate().unwrap_err().is_configuration());

        let simple = Specializer::from(SimpleSpecializer::new(
            IndexRegistry::from_names(["A"]).unwrap(),
            Vec::new(),
        ));
        assert!(simple.validate().unwrap_err().is_configuration());

        assert!(IndexRegistry::from_names(["A", "A"]).is_err());
    }

    #[test]
    fn test_partitions() {
        let st = Specializer::from(spacetime());
        let by_date = st.partition(PartitionKey::Date).unwrap();
        assert_eq!(by_date.len(), 2);
        assert!(by_date.iter().all(|p| p.units().unwrap().len() == 4));

        let by_index = st.partition(PartitionKey::Index).unwrap();
        assert_eq!(by_index.len(), 2);

        let simple = Specializer::from(SimpleSpecializer::new(
            IndexRegistry::from_names(["A", "B", "C"]).unwrap(),
            vec![Aggregate::count()],
        ));
        assert_eq!(simple.partition(PartitionKey::Index).unwrap().len(), 3);
        assert!(simple.partition(PartitionKey::Date).is_err());
    }

    #[test]
    fn test_missing_hooks_are_fatal() {
        let source = Table::new(vec![
            Column::new("Date", [day(30)]),
            Column::new("District", [1]),
        ])
        .unwrap();
        let unit = AggregationUnit::new()
            .with(DATE, ArgumentValue::Date(day(31)))
            .with(DELTA, ArgumentValue::Delta("1d".parse().unwrap()))
            .with(INDEX, ArgumentValue::index("district"));

        let st = SpacetimeSpecializer::new(
            spacetime().spacedeltas().to_vec(),
            vec![day(31)],
            "Date",
            Arc::new(NoHooks),
        );
        let args = unit.project(&[DATE.to_string(), DELTA.to_string()]).unwrap();
        let err = Specializer::from(st.clone()).build_aggregator(&source, &args).unwrap_err();
        assert!(matches!(err, Error::UnimplementedHook("aggregates")));

        let wide = st.with_aggregator_args(&[DATE, DELTA, INDEX]);
        let args = unit
            .project(&[DATE.to_string(), DELTA.to_string(), INDEX.to_string()])
            .unwrap();
        let err = Specializer::from(wide).build_aggregator(&source, &args).unwrap_err();
        assert!(matches!(err, Error::UnimplementedHook("restrict")));
    }

    #[test]
    fn test_index_lookup() {
        let st = Specializer::from(spacetime());
        assert_eq!(
            st.index_spec("community").unwrap(),
            IndexSpec::column("Community Area")
        );
        assert!(matches!(st.index_spec("beat"), Err(Error::Lookup(_))));
    }
}
