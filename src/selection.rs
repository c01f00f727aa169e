//! Top-N row selection over scored tables
//!
//! Consumers of aggregate features often evaluate only the best-scored
//! rows: either a fixed count `k` or a proportion `p` of some base count.
//! Asking for both at once is rejected.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::table::Table;
use crate::types::Value;

/// What a proportion `p` is taken of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProportionOf {
    /// Rows with a non-null outcome
    #[default]
    NotNull,
    /// Rows with a true outcome
    True,
    /// All rows
    All,
}

impl fmt::Display for ProportionOf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProportionOf::NotNull => write!(f, "not_null"),
            ProportionOf::True => write!(f, "true"),
            ProportionOf::All => write!(f, "all"),
        }
    }
}

impl FromStr for ProportionOf {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "not_null" | "notnull" => Ok(ProportionOf::NotNull),
            "true" => Ok(ProportionOf::True),
            "all" => Ok(ProportionOf::All),
            other => Err(Error::config(format!("invalid proportion base '{}'", other))),
        }
    }
}

/// Parameters of a top-N selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopSelection {
    /// Keep this many rows
    #[serde(default)]
    pub k: Option<usize>,

    /// Keep this proportion of the base count
    #[serde(default)]
    pub p: Option<f64>,

    /// Base count for `p`
    #[serde(default)]
    pub p_of: ProportionOf,

    /// Rank lowest scores first
    #[serde(default)]
    pub ascending: bool,

    /// Drop rows with a null outcome before selecting
    #[serde(default)]
    pub drop_null: bool,

    /// Score column
    #[serde(default = "default_score")]
    pub score: String,

    /// Outcome column
    #[serde(default = "default_outcome")]
    pub outcome: String,
}

fn default_score() -> String {
    "score".to_string()
}

fn default_outcome() -> String {
    "true".to_string()
}

impl Default for TopSelection {
    fn default() -> Self {
        Self {
            k: None,
            p: None,
            p_of: ProportionOf::default(),
            ascending: false,
            drop_null: false,
            score: default_score(),
            outcome: default_outcome(),
        }
    }
}

impl TopSelection {
    /// Select the top `k` rows
    pub fn top_k(k: usize) -> Self {
        Self {
            k: Some(k),
            ..Default::default()
        }
    }

    /// Select the top proportion `p` of the base count
    pub fn top_p(p: f64, p_of: ProportionOf) -> Self {
        Self {
            p: Some(p),
            p_of,
            ..Default::default()
        }
    }

    /// Check that at most one of `k` and `p` is set and `p` is in `[0, 1]`
    pub fn validate(&self) -> Result<()> {
        if self.k.is_some() && self.p.is_some() {
            return Err(Error::config("cannot specify both k and p"));
        }
        if let Some(p) = self.p {
            if !(0.0..=1.0).contains(&p) {
                return Err(Error::config(format!("p must be in [0, 1], got {}", p)));
            }
        }
        Ok(())
    }

    /// Number of rows to keep from `table`, or `None` for all of them
    pub fn limit(&self, table: &Table) -> Result<Option<usize>> {
        self.validate()?;
        if let Some(k) = self.k {
            return Ok(Some(k));
        }
        let Some(p) = self.p else {
            return Ok(None);
        };

        let base = match self.p_of {
            ProportionOf::All => table.num_rows() as f64,
            ProportionOf::NotNull => outcome(table, &self.outcome)?
                .iter()
                .filter(|v| !v.is_null())
                .count() as f64,
            ProportionOf::True => outcome(table, &self.outcome)?
                .iter()
                .filter_map(|v| v.as_f64())
                .sum(),
        };
        Ok(Some((p * base).floor() as usize))
    }
}

fn outcome(table: &Table, column: &str) -> Result<Vec<Value>> {
    if !table.has_field(column) {
        return Err(Error::Lookup(format!("outcome column '{}' not found", column)));
    }
    table.field(column)
}

/// Rows of `table` ranked by score and cut to the requested size
///
/// Rows are ordered by descending score (ascending if requested), null or
/// non-numeric scores last, ties in table order. Without `k` or `p` the
/// table is only ranked.
pub fn select_top(table: &Table, selection: &TopSelection) -> Result<Table> {
    selection.validate()?;

    let table = if selection.drop_null {
        let mask: Vec<bool> = outcome(table, &selection.outcome)?
            .iter()
            .map(|v| !v.is_null())
            .collect();
        table.filter(&mask)?
    } else {
        table.clone()
    };

    if !table.has_field(&selection.score) {
        return Err(Error::Lookup(format!(
            "score column '{}' not found",
            selection.score
        )));
    }
    let scores: Vec<Option<f64>> = table
        .field(&selection.score)?
        .iter()
        .map(Value::as_f64)
        .collect();

    let mut rows: Vec<usize> = (0..table.num_rows()).collect();
    rows.sort_by(|&a, &b| match (scores[a], scores[b]) {
        (Some(x), Some(y)) if selection.ascending => x.total_cmp(&y),
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    if let Some(limit) = selection.limit(&table)? {
        rows.truncate(limit);
    }
    table.take(&rows)
}
