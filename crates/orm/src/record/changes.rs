//! Dirty tracking
//!
//! A column counts as changed when its current value differs from the
//! `initial` snapshot. Comparison is numeric-aware: store round-trips
//! coerce types, so an integer column loaded as `5` and set to `"5"` is
//! not a change. A transition to or from null always is.

use serde_json::Value;

use crate::store::loose_eq;

use super::Record;

impl Record {
    /// Without a column: true when any tracked column changed. With one:
    /// whether that column changed since the last persisted snapshot.
    /// Columns the table does not back never count as changed.
    pub fn is_changed(&self, col: Option<&str>) -> bool {
        match col {
            Some(col) => self.col_changed(col),
            None => self
                .tracked_cols()
                .iter()
                .any(|col| self.col_changed(col)),
        }
    }

    fn col_changed(&self, col: &str) -> bool {
        if !self.is_tracked(col) {
            return false;
        }
        let initial = self.initial.get(col).cloned().unwrap_or(Value::Null);
        let current = self.data.get(col).cloned().unwrap_or(Value::Null);
        !loose_eq(&initial, &current)
    }

    fn is_tracked(&self, col: &str) -> bool {
        match self.model() {
            Ok(model) => model.spec().has_table_col(col),
            Err(_) => self.initial.contains_key(col),
        }
    }

    pub(crate) fn tracked_cols(&self) -> Vec<String> {
        match self.model() {
            Ok(model) => model.spec().table_cols().map(String::from).collect(),
            Err(_) => self.initial.keys().cloned().collect(),
        }
    }
}
