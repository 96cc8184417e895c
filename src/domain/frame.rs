//! Row-level containers flowing through the feature pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single record as a name-keyed row.
///
/// A column can be absent (never existed or dropped) or present with a
/// missing value (`None`). The distinction matters: fallbacks only apply to
/// columns that exist, and the aligner zero-fills only absent columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFrame {
    cells: BTreeMap<String, Option<f64>>,
}

impl RecordFrame {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Whether the column exists, regardless of its value.
    #[must_use]
    pub fn contains(&self, column: &str) -> bool {
        self.cells.contains_key(column)
    }

    /// The value of a column; `None` when absent or missing.
    #[must_use]
    pub fn value(&self, column: &str) -> Option<f64> {
        self.cells.get(column).copied().flatten()
    }

    /// Raw cell lookup: `None` when absent, `Some(None)` when missing.
    #[must_use]
    pub fn cell(&self, column: &str) -> Option<Option<f64>> {
        self.cells.get(column).copied()
    }

    /// Insert or overwrite a column.
    pub fn set(&mut self, column: impl Into<String>, value: Option<f64>) {
        self.cells.insert(column.into(), value);
    }

    /// Fill a present-but-missing column. Absent columns stay absent.
    ///
    /// Returns `true` if a value was written.
    pub fn fill_missing(&mut self, column: &str, value: f64) -> bool {
        match self.cells.get_mut(column) {
            Some(cell @ None) => {
                *cell = Some(value);
                true
            }
            _ => false,
        }
    }

    /// Mark a column as missing if it exists.
    pub fn clear(&mut self, column: &str) {
        if let Some(cell) = self.cells.get_mut(column) {
            *cell = None;
        }
    }

    pub fn remove(&mut self, column: &str) -> Option<Option<f64>> {
        self.cells.remove(column)
    }

    /// Apply every rename in `table` at once, keeping values.
    ///
    /// Each column is looked up in the table exactly once, so a name that is
    /// both a target and a source is never renamed twice. A renamed column
    /// replaces an untouched column that already had the target name.
    pub fn rename_columns(&mut self, table: &BTreeMap<String, String>) {
        let cells = std::mem::take(&mut self.cells);
        let (renamed, kept): (Vec<_>, Vec<_>) = cells
            .into_iter()
            .partition(|(column, _)| table.contains_key(column));

        self.cells.extend(kept);
        for (column, value) in renamed {
            let target = table.get(&column).cloned().unwrap_or(column);
            self.cells.insert(target, value);
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<f64>)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<S: Into<String>> FromIterator<(S, Option<f64>)> for RecordFrame {
    fn from_iter<I: IntoIterator<Item = (S, Option<f64>)>>(iter: I) -> Self {
        Self {
            cells: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// The numeric row the classifier consumes.
///
/// Positionally aligned with the bundle's final feature order; every entry is
/// a defined, finite value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    names: Vec<String>,
    values: Vec<f64>,
}

impl FeatureVector {
    /// Build a vector from parallel name/value lists.
    ///
    /// # Errors
    /// Returns an error if the lengths differ.
    pub fn new(names: Vec<String>, values: Vec<f64>) -> Result<Self, String> {
        if names.len() != values.len() {
            return Err(format!(
                "Expected {} feature values, got {}",
                names.len(),
                values.len()
            ));
        }
        Ok(Self { names, values })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Look a value up by feature name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i])
    }
}
