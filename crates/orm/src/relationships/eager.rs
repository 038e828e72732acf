//! Eager relationship resolution
//!
//! Resolves a relationship for a whole page of already-fetched native rows
//! with exactly one additional query. The foreign rows come back in one
//! sweep, get collated by the binding column, and every native row is
//! handed either its matched subset or an explicit empty default, so no
//! caller ever observes a missing relation key.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::debug;

use crate::error::OrmResult;
use crate::fetch::EagerParams;
use crate::store::{collate_key, row_to_value, Condition, Join, JoinTarget, JoinType, Row, Select};

use super::loader::Relationship;
use super::metadata::{Cardinality, NativeBy};

impl Relationship {
    /// Resolve this relationship for every row in `rows`, in place.
    ///
    /// The native-by strategy scopes the foreign query to only the fetched
    /// native page: `wherein` turns the distinct native ids into an IN
    /// list, `select` re-derives them with an inner join against a
    /// sub-select built from the native query itself. `select` is used when
    /// explicitly configured or when the page outgrows `wherein_max`.
    pub(crate) fn eager_fetch_into(
        &self,
        rows: &mut Vec<Row>,
        eager: &EagerParams,
        native_select: &Select,
    ) -> OrmResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let foreign = self.foreign_model()?;
        let strategy = self.choose_native_by(rows.len(), eager);
        debug!(
            relation = %self.name(),
            strategy = ?strategy,
            natives = rows.len(),
            "eager fetch"
        );

        let params = self.fetch_params(Some(eager));
        let foreign_rows = match strategy {
            NativeBy::Wherein => {
                let ids = self.native_ids(rows);
                if ids.is_empty() {
                    self.attach(rows, Vec::new());
                    return Ok(());
                }
                let mut params = params;
                params
                    .conds
                    .push(Condition::is_in(self.foreign_col().to_string(), ids));
                foreign.fetch_rows(&params, Vec::new())?
            }
            NativeBy::Select => {
                let mut sub = native_select.clone();
                sub.cols = vec![self.native_col().to_string()];
                sub.count_only = false;
                let join = Join {
                    join_type: JoinType::Inner,
                    target: JoinTarget::Subquery(Box::new(sub)),
                    alias: format!("{}_scope", self.name()),
                    on: (
                        self.foreign_col().to_string(),
                        self.native_col().to_string(),
                    ),
                    conds: Vec::new(),
                    cols: Vec::new(),
                };
                foreign.fetch_rows(&params, vec![join])?
            }
        };

        self.attach(rows, foreign_rows);
        Ok(())
    }

    /// Strategy resolution: an explicit setting (eager params first, then
    /// the relationship) is honored as-is; otherwise the page size decides,
    /// escalating to `select` above `wherein_max`.
    pub(crate) fn choose_native_by(&self, natives: usize, eager: &EagerParams) -> NativeBy {
        let wherein_max = eager.wherein_max.unwrap_or(self.wherein_max());
        eager
            .native_by
            .or(self.native_by_strategy())
            .unwrap_or(if natives > wherein_max {
                NativeBy::Select
            } else {
                NativeBy::Wherein
            })
    }

    /// Distinct non-null native binding values, fetch order preserved.
    fn native_ids(&self, rows: &[Row]) -> Vec<Value> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for row in rows {
            let val = row.get(self.native_col()).cloned().unwrap_or(Value::Null);
            if val.is_null() {
                continue;
            }
            if seen.insert(collate_key(&val)) {
                ids.push(val);
            }
        }
        ids
    }

    /// Collate foreign rows by the binding column and attach a value to
    /// every native row.
    fn attach(&self, rows: &mut [Row], foreign_rows: Vec<Row>) {
        let mut collated: HashMap<String, Vec<Value>> = HashMap::new();
        for frow in &foreign_rows {
            let key = collate_key(frow.get(self.foreign_col()).unwrap_or(&Value::Null));
            collated.entry(key).or_default().push(row_to_value(frow));
        }

        for row in rows.iter_mut() {
            let native_val = row.get(self.native_col()).cloned().unwrap_or(Value::Null);
            let matched = if native_val.is_null() {
                None
            } else {
                collated.get(&collate_key(&native_val))
            };
            let value = match self.cardinality() {
                Cardinality::Many => {
                    Value::Array(matched.cloned().unwrap_or_default())
                }
                Cardinality::One => matched
                    .and_then(|items| items.first().cloned())
                    .unwrap_or(Value::Null),
            };
            row.insert(self.name().to_string(), value);
        }
    }
}
