//! Record persistence
//!
//! Save runs the native row first (insert or update, each bracketed by
//! observer hooks and the filter chain), then every already-materialized
//! relationship value. Validation failure is a return value, never a
//! fault; store failure marks the record invalid under the synthetic `*`
//! key and propagates.

use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use crate::error::{OrmError, OrmResult};
use crate::filter::FilterChain;
use crate::model::Model;
use crate::store::{Assign, Condition, Row, Select};

use super::{Record, SqlStatus};
use std::rc::Rc;

/// Discriminated outcome of a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Native row and every materialized relation ended valid.
    Saved,
    /// One or more columns failed validation; messages are on the record.
    Invalid,
    /// A store fault inside `save_in_transaction`; the error is retained
    /// on the record.
    Failed,
}

fn now_stamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

impl Record {
    /// Merge `data` into the row, persist the native columns, then save
    /// every already-materialized relationship value. Lazy, unmaterialized
    /// relations are never touched.
    ///
    /// Without a transaction there is no atomicity across the native and
    /// related writes; wrap with [`Record::save_in_transaction`] for an
    /// all-or-nothing boundary.
    pub fn save(&mut self, data: Option<Row>) -> OrmResult<SaveOutcome> {
        self.assert_not_deleted("save")?;
        if let Some(data) = data {
            self.set_many(data)?;
        }
        if !self.save_native()? {
            return Ok(SaveOutcome::Invalid);
        }

        let model = self.model()?;
        let mut ok = true;
        for name in self.related_names() {
            let rel = model.relationship(&name)?;
            let native_val = self.get_raw(rel.native_col());
            if let Some(mut value) = self.take_related(&name) {
                let result = rel.save_related(&native_val, &mut value);
                self.put_related(name, value);
                let valid = result?;
                ok = ok && valid;
            }
        }
        Ok(if ok { SaveOutcome::Saved } else { SaveOutcome::Invalid })
    }

    /// `save` wrapped in a store transaction. Validation failure rolls
    /// back and reports `Invalid`; a store fault rolls back, retains the
    /// error on the record, marks it invalid under `*`, and reports
    /// `Failed`. Both leave the status at `Rollback`.
    pub fn save_in_transaction(&mut self, data: Option<Row>) -> OrmResult<SaveOutcome> {
        let model = self.model()?;
        let store = model.store();
        store.begin()?;
        match self.save(data) {
            Ok(SaveOutcome::Saved) => {
                store.commit()?;
                Ok(SaveOutcome::Saved)
            }
            Ok(outcome) => {
                store.rollback()?;
                self.set_status(SqlStatus::Rollback);
                Ok(outcome)
            }
            Err(err) => {
                store.rollback()?;
                self.set_invalid("*", err.to_string());
                self.retain_save_error(err);
                self.set_status(SqlStatus::Rollback);
                Ok(SaveOutcome::Failed)
            }
        }
    }

    /// Persist the native row only, when the record is new or dirty.
    /// Returns whether everything it touched ended valid.
    pub(crate) fn save_native(&mut self) -> OrmResult<bool> {
        let model = self.model()?;
        if !self.is_new() && !self.is_changed(None) {
            self.set_status(SqlStatus::Unchanged);
            return Ok(true);
        }
        if let Some(observer) = model.spec().observer().cloned() {
            observer.before_save(self)?;
        }
        if !self.relationship_presave(&model)? {
            return Ok(false);
        }
        let ok = if self.is_new() {
            self.insert_row(&model)?
        } else {
            self.update_row(&model)?
        };
        if ok {
            if let Some(observer) = model.spec().observer().cloned() {
                observer.after_save(self)?;
            }
        }
        Ok(ok)
    }

    /// Relationship-specific pre-save hooks. Belongs-to relations persist
    /// a new foreign record and copy its key into the native row so the
    /// native write carries the fresh id.
    fn relationship_presave(&mut self, model: &Rc<Model>) -> OrmResult<bool> {
        let mut ok = true;
        for name in self.related_names() {
            let rel = model.relationship(&name)?;
            if let Some(mut value) = self.take_related(&name) {
                let result = rel.presave_native(&mut self.data, &mut value);
                self.put_related(name, value);
                let valid = result?;
                ok = ok && valid;
            }
        }
        Ok(ok)
    }

    fn insert_row(&mut self, model: &Rc<Model>) -> OrmResult<bool> {
        if let Some(observer) = model.spec().observer().cloned() {
            observer.before_insert(self)?;
        }

        let now = now_stamp();
        if let Some(col) = model.spec().created() {
            if self.get_raw(col).is_null() {
                self.set_raw(col, Value::String(now.clone()));
            }
        }
        if let Some(col) = model.spec().updated() {
            self.set_raw(col, Value::String(now));
        }
        if let (Some(col), Some(val)) = (model.spec().inherit(), model.spec().inherit_value()) {
            let (col, val) = (col.to_string(), val.to_string());
            self.set_raw(&col, Value::String(val));
        }
        for (col, sequence) in model.spec().sequences().clone() {
            if self.get_raw(&col).is_null() {
                let value = model.store().next_sequence(&sequence)?;
                self.set_raw(&col, value);
            }
        }

        if !self.filter(None)? {
            return Ok(false);
        }

        let mut row = self.table_data(model);
        if let Some(col) = model.spec().autoinc_col() {
            if row.get(col).map_or(false, Value::is_null) {
                row.remove(col);
            }
        }
        debug!(model = %model.name(), "insert");
        if let Err(err) = model.store().insert(model.table_name(), &row) {
            self.set_invalid("*", err.to_string());
            return Err(err.into());
        }

        if let Some(col) = model.spec().autoinc_col() {
            if self.get_raw(col).is_null() {
                let id = model.store().last_insert_id(model.table_name(), col)?;
                self.set_raw(col, id);
            }
        }

        self.rebase_initial(model);
        self.clear_invalid();
        self.mark_persisted();
        self.set_status(SqlStatus::Inserted);
        if let Some(observer) = model.spec().observer().cloned() {
            observer.after_insert(self)?;
        }
        Ok(true)
    }

    fn update_row(&mut self, model: &Rc<Model>) -> OrmResult<bool> {
        if let Some(observer) = model.spec().observer().cloned() {
            observer.before_update(self)?;
        }
        if let Some(col) = model.spec().updated() {
            let col = col.to_string();
            self.set_raw(&col, Value::String(now_stamp()));
        }

        if !self.filter(None)? {
            return Ok(false);
        }

        let assigns: Vec<Assign> = self
            .tracked_cols()
            .into_iter()
            .filter(|col| self.is_changed(Some(col.as_str())))
            .map(|col| {
                let value = self.get_raw(&col);
                Assign::Set(col, value)
            })
            .collect();
        if assigns.is_empty() {
            self.set_status(SqlStatus::Unchanged);
            return Ok(true);
        }

        let pk = self.primary_value().ok_or(OrmError::MissingPrimaryKey)?;
        let conds = [Condition::eq(model.primary_col(), pk)];
        debug!(model = %model.name(), cols = assigns.len(), "update");
        if let Err(err) = model.store().update(model.table_name(), &assigns, &conds) {
            self.set_invalid("*", err.to_string());
            return Err(err.into());
        }

        self.rebase_initial(model);
        self.clear_invalid();
        self.set_status(SqlStatus::Updated);
        if let Some(observer) = model.spec().observer().cloned() {
            observer.after_update(self)?;
        }
        Ok(true)
    }

    /// Run the filter chain over the row. Returns whether the row passed;
    /// failure messages land on the record, mapped through the model's
    /// column-specific overrides when available. Columns outside the fetch
    /// projection are exempted from requiredness.
    pub fn filter(&mut self, chain_override: Option<Box<dyn FilterChain>>) -> OrmResult<bool> {
        let model = self.model()?;
        if let Some(observer) = model.spec().observer().cloned() {
            observer.before_filter(self)?;
        }

        let mut chain = match chain_override {
            Some(chain) => chain,
            None => match model.spec().filter_factory() {
                Some(factory) => (**factory)(),
                None => {
                    if let Some(observer) = model.spec().observer().cloned() {
                        observer.after_filter(self)?;
                    }
                    return Ok(true);
                }
            },
        };

        for col in model.spec().table_cols() {
            if !self.fetch_cols().contains(col) {
                chain.set_require(col, false);
            }
        }

        let passed = chain.apply(&mut self.data);
        if !passed {
            for (col, messages) in chain.invalid() {
                let messages = match model.spec().message_for(&col) {
                    Some(message) => vec![message.to_string()],
                    None => messages,
                };
                self.set_invalid_many(col, messages);
            }
            return Ok(false);
        }

        if let Some(observer) = model.spec().observer().cloned() {
            observer.after_filter(self)?;
        }
        Ok(true)
    }

    /// Issue a keyed DELETE and mark the record terminally deleted.
    pub fn delete(&mut self) -> OrmResult<()> {
        if self.is_new() {
            return Err(OrmError::NotPersisted("delete"));
        }
        self.assert_not_deleted("delete")?;
        let model = self.model()?;
        let pk = self.primary_value().ok_or(OrmError::MissingPrimaryKey)?;
        if let Some(observer) = model.spec().observer().cloned() {
            observer.before_delete(self)?;
        }
        model
            .store()
            .delete(model.table_name(), &[Condition::eq(model.primary_col(), pk)])?;
        self.set_status(SqlStatus::Deleted);
        if let Some(observer) = model.spec().observer().cloned() {
            observer.after_delete(self)?;
        }
        Ok(())
    }

    /// Re-read the table columns (not related or calculated values) and
    /// clear dirty and invalid state.
    pub fn refresh(&mut self) -> OrmResult<()> {
        if self.is_new() {
            return Err(OrmError::NotPersisted("refresh"));
        }
        self.assert_not_deleted("refresh")?;
        let model = self.model()?;
        let pk = self.primary_value().ok_or(OrmError::MissingPrimaryKey)?;

        let mut select = Select::from_table(model.table_name());
        select.cols = model.spec().table_cols().map(String::from).collect();
        select.conds = vec![Condition::eq(model.primary_col(), pk)];
        select.limit = Some(1);
        let row = model
            .store()
            .query(&select)?
            .into_iter()
            .next()
            .ok_or_else(|| OrmError::NotFound(model.table_name().to_string()))?;

        let cols: std::collections::HashSet<String> = row.keys().cloned().collect();
        for (col, value) in row {
            self.set_raw(&col, value);
        }
        self.set_fetch_cols(cols);
        self.rebase_initial(&model);
        self.clear_invalid();
        self.set_status(SqlStatus::Refreshed);
        Ok(())
    }

    /// Atomic in-place arithmetic against the store, bypassing dirty
    /// tracking. The freshly re-read value re-bases `initial`, so the
    /// record is never reported dirty because of this out-of-band change.
    pub fn increment(&mut self, col: &str, amount: i64) -> OrmResult<Value> {
        if self.is_new() {
            return Err(OrmError::NotPersisted("increment"));
        }
        self.assert_not_deleted("increment")?;
        let model = self.model()?;
        let pk = self.primary_value().ok_or(OrmError::MissingPrimaryKey)?;

        model.store().update(
            model.table_name(),
            &[Assign::Add(col.to_string(), Value::from(amount))],
            &[Condition::eq(model.primary_col(), pk.clone())],
        )?;

        let mut select = Select::from_table(model.table_name());
        select.cols = vec![col.to_string()];
        select.conds = vec![Condition::eq(model.primary_col(), pk)];
        select.limit = Some(1);
        let fresh = model.store().fetch_value(&select)?;

        self.set_raw(col, fresh.clone());
        self.initial.insert(col.to_string(), fresh.clone());
        Ok(fresh)
    }
}
