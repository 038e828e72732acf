//! Record - one persisted row plus its dirty and validation state
//!
//! A record maps column names to values and keeps an `initial` snapshot of
//! the table-backed columns as of the last successful load or persist.
//! Mutating a column never touches `initial`; the diff between the two is
//! what drives minimal-payload updates. Materialized relationship values
//! hang off the record under their relation names and ride along on save.

mod changes;
mod persist;

pub use persist::SaveOutcome;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::collection::Collection;
use crate::error::{OrmError, OrmResult};
use crate::model::Model;
use crate::relationships::RelationKind;
use crate::store::{row_to_value, Row};

/// SQL status after the most recent persistence operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlStatus {
    Inserted,
    Updated,
    Unchanged,
    Deleted,
    Refreshed,
    Rollback,
}

/// A materialized relationship value held by a record.
#[derive(Debug)]
pub enum Related {
    One(Box<Record>),
    Many(Collection),
}

impl Related {
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Related::One(record) => Some(record),
            Related::Many(_) => None,
        }
    }

    pub fn as_record_mut(&mut self) -> Option<&mut Record> {
        match self {
            Related::One(record) => Some(record),
            Related::Many(_) => None,
        }
    }

    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            Related::Many(collection) => Some(collection),
            Related::One(_) => None,
        }
    }

    pub fn as_collection_mut(&mut self) -> Option<&mut Collection> {
        match self {
            Related::Many(collection) => Some(collection),
            Related::One(_) => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Related::One(record) => row_to_value(&record.to_array()),
            Related::Many(collection) => Value::Array(
                collection
                    .to_array()
                    .iter()
                    .map(row_to_value)
                    .collect(),
            ),
        }
    }
}

#[derive(Debug)]
pub struct Record {
    model: Weak<Model>,
    model_class: String,
    data: Row,
    initial: Row,
    related: HashMap<String, Related>,
    status: Option<SqlStatus>,
    is_new: bool,
    invalid: BTreeMap<String, Vec<String>>,
    save_error: Option<OrmError>,
    fetch_cols: HashSet<String>,
}

impl Record {
    /// Hydrate from a row the store returned. Eager-attached relation
    /// values and server-join prefixed columns are split off into the
    /// related map before the table-column snapshot is taken.
    pub(crate) fn from_row(model: &Rc<Model>, mut row: Row) -> OrmResult<Self> {
        let mut related = HashMap::new();
        for name in model.relation_names() {
            if let Some(value) = row.remove(&name) {
                let rel = model.relationship(&name)?;
                related.insert(name.clone(), rel.materialize(value)?);
                continue;
            }
            let prefix = format!("{}__", name);
            let prefixed: Vec<String> = row
                .keys()
                .filter(|key| key.starts_with(&prefix))
                .cloned()
                .collect();
            if prefixed.is_empty() {
                continue;
            }
            let mut sub = Row::new();
            for key in prefixed {
                if let Some(value) = row.remove(&key) {
                    sub.insert(key[prefix.len()..].to_string(), value);
                }
            }
            let rel = model.relationship(&name)?;
            let value = if sub
                .get(rel.foreign_primary_col())
                .map_or(true, Value::is_null)
            {
                Value::Null
            } else {
                row_to_value(&sub)
            };
            related.insert(name.clone(), rel.materialize(value)?);
        }

        let mut initial = Row::new();
        let mut fetch_cols = HashSet::new();
        for col in model.spec().table_cols() {
            if let Some(value) = row.get(col) {
                initial.insert(col.to_string(), value.clone());
                fetch_cols.insert(col.to_string());
            }
        }

        Ok(Self {
            model: Rc::downgrade(model),
            model_class: model.class().to_string(),
            data: row,
            initial,
            related,
            status: None,
            is_new: false,
            invalid: BTreeMap::new(),
            save_error: None,
            fetch_cols,
        })
    }

    /// Seed a fresh unsaved record from caller data. Nested values under
    /// relation names become new related records/collections.
    pub(crate) fn new_record(model: &Rc<Model>, mut data: Row) -> OrmResult<Self> {
        let mut related = HashMap::new();
        for name in model.relation_names() {
            if let Some(value) = data.remove(&name) {
                let rel = model.relationship(&name)?;
                related.insert(name.clone(), rel.materialize_new(value)?);
            }
        }

        let mut initial = Row::new();
        let mut fetch_cols = HashSet::new();
        for col in model.spec().table_cols() {
            if let Some(value) = data.get(col) {
                initial.insert(col.to_string(), value.clone());
            }
            fetch_cols.insert(col.to_string());
        }

        Ok(Self {
            model: Rc::downgrade(model),
            model_class: model.class().to_string(),
            data,
            initial,
            related,
            status: None,
            is_new: true,
            invalid: BTreeMap::new(),
            save_error: None,
            fetch_cols,
        })
    }

    pub fn model(&self) -> OrmResult<Rc<Model>> {
        self.model.upgrade().ok_or(OrmError::CatalogGone)
    }

    /// Class of the concrete model that materialized this record.
    pub fn model_class(&self) -> &str {
        &self.model_class
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn is_deleted(&self) -> bool {
        self.status == Some(SqlStatus::Deleted)
    }

    pub fn status(&self) -> Option<SqlStatus> {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: SqlStatus) {
        self.status = Some(status);
    }

    /// Column value through the accessor table; raw value otherwise.
    pub fn get(&self, col: &str) -> Value {
        if let Ok(model) = self.model() {
            if let Some(accessor) = model.spec().accessor_for(col) {
                if let Some(getter) = &accessor.get {
                    return getter(self);
                }
            }
        }
        self.get_raw(col)
    }

    /// Raw column value, bypassing accessors. Null when unset.
    pub fn get_raw(&self, col: &str) -> Value {
        self.data.get(col).cloned().unwrap_or(Value::Null)
    }

    pub(crate) fn set_raw(&mut self, col: &str, value: Value) {
        self.data.insert(col.to_string(), value);
    }

    /// Set a column through the accessor table. Fails on a deleted record.
    pub fn set(&mut self, col: &str, value: Value) -> OrmResult<()> {
        self.assert_not_deleted("modify")?;
        let model = self.model()?;
        if let Some(accessor) = model.spec().accessor_for(col) {
            if let Some(setter) = &accessor.set {
                setter(self, value);
                return Ok(());
            }
        }
        self.set_raw(col, value);
        Ok(())
    }

    /// Merge caller data into the row, column by column.
    pub fn set_many(&mut self, data: Row) -> OrmResult<()> {
        for (col, value) in data {
            self.set(&col, value)?;
        }
        Ok(())
    }

    /// Load a row into the record, re-basing `initial` for the table
    /// columns it carries. Values under relation names are materialized.
    pub fn load(&mut self, row: Row) -> OrmResult<()> {
        let model = self.model()?;
        for (col, value) in row {
            if model.is_relation(&col) {
                let rel = model.relationship(&col)?;
                self.related.insert(col, rel.materialize(value)?);
            } else if model.spec().has_table_col(&col) {
                self.initial.insert(col.clone(), value.clone());
                self.fetch_cols.insert(col.clone());
                self.data.insert(col, value);
            } else {
                self.data.insert(col, value);
            }
        }
        Ok(())
    }

    /// Snapshot of all column values plus materialized related values.
    pub fn to_array(&self) -> Row {
        let mut out = self.data.clone();
        for (name, value) in &self.related {
            out.insert(name.clone(), value.to_value());
        }
        out
    }

    /// Current table-column values, the writable subset of the row.
    pub(crate) fn table_data(&self, model: &Model) -> Row {
        let mut out = Row::new();
        for col in model.spec().table_cols() {
            if let Some(value) = self.data.get(col) {
                out.insert(col.to_string(), value.clone());
            }
        }
        out
    }

    pub fn primary_value(&self) -> Option<Value> {
        let model = self.model().ok()?;
        let value = self.get_raw(model.primary_col());
        if value.is_null() {
            None
        } else {
            Some(value)
        }
    }

    /// True when every column is unset or null; blank new records are
    /// never persisted.
    pub fn is_blank(&self) -> bool {
        self.data.values().all(Value::is_null)
    }

    /// Materialized relationship value, fetched lazily on first access.
    pub fn related(&mut self, name: &str) -> OrmResult<&mut Related> {
        if !self.related.contains_key(name) {
            let model = self.model()?;
            let rel = model.relationship(name)?;
            let value = rel.fetch(self)?;
            self.related.insert(name.to_string(), value);
        }
        Ok(self
            .related
            .get_mut(name)
            .expect("relationship value just inserted"))
    }

    /// Already-materialized relationship value, without fetching.
    pub fn related_loaded(&self, name: &str) -> Option<&Related> {
        self.related.get(name)
    }

    pub(crate) fn related_names(&self) -> Vec<String> {
        self.related.keys().cloned().collect()
    }

    pub(crate) fn take_related(&mut self, name: &str) -> Option<Related> {
        self.related.remove(name)
    }

    pub(crate) fn put_related(&mut self, name: String, value: Related) {
        self.related.insert(name, value);
    }

    /// Attach a relationship value explicitly. The name must be declared.
    pub fn set_related(&mut self, name: &str, value: Related) -> OrmResult<()> {
        let model = self.model()?;
        if !model.is_relation(name) {
            return Err(OrmError::UnknownRelationship(name.to_string()));
        }
        self.related.insert(name.to_string(), value);
        Ok(())
    }

    /// Own per-column invalid messages, without related records.
    pub fn invalid_messages(&self) -> &BTreeMap<String, Vec<String>> {
        &self.invalid
    }

    /// Merged invalid map: own messages plus, recursively, those of every
    /// materialized relationship value. Belongs-to relations are excluded
    /// to keep the recursion from cycling back toward the native record.
    pub fn invalid(&self) -> Map<String, Value> {
        let mut out = Map::new();
        for (col, msgs) in &self.invalid {
            out.insert(
                col.clone(),
                Value::Array(msgs.iter().map(|m| Value::String(m.clone())).collect()),
            );
        }
        let Ok(model) = self.model() else {
            return out;
        };
        for (name, value) in &self.related {
            let Ok(rel) = model.relationship(name) else {
                continue;
            };
            if rel.kind() == RelationKind::BelongsTo {
                continue;
            }
            let nested = match value {
                Related::One(record) => record.invalid(),
                Related::Many(collection) => collection.invalid(),
            };
            if !nested.is_empty() {
                out.insert(name.clone(), Value::Object(nested));
            }
        }
        out
    }

    pub fn is_invalid(&self) -> bool {
        !self.invalid().is_empty()
    }

    pub(crate) fn set_invalid(&mut self, col: &str, message: String) {
        self.invalid.entry(col.to_string()).or_default().push(message);
    }

    pub(crate) fn set_invalid_many(&mut self, col: String, messages: Vec<String>) {
        self.invalid.entry(col).or_default().extend(messages);
    }

    pub(crate) fn clear_invalid(&mut self) {
        self.invalid.clear();
    }

    /// The store error retained by the last failed `save_in_transaction`.
    pub fn last_save_error(&self) -> Option<&OrmError> {
        self.save_error.as_ref()
    }

    pub(crate) fn retain_save_error(&mut self, err: OrmError) {
        self.save_error = Some(err);
    }

    pub(crate) fn fetch_cols(&self) -> &HashSet<String> {
        &self.fetch_cols
    }

    pub(crate) fn set_fetch_cols(&mut self, cols: HashSet<String>) {
        self.fetch_cols = cols;
    }

    /// Re-base `initial` to the current table-column values; the record
    /// reads as clean afterwards.
    pub(crate) fn rebase_initial(&mut self, model: &Model) {
        self.initial = self.table_data(model);
    }

    pub(crate) fn mark_persisted(&mut self) {
        self.is_new = false;
    }

    pub(crate) fn assert_not_deleted(&self, op: &'static str) -> OrmResult<()> {
        if self.is_deleted() {
            Err(OrmError::DeletedRecord(op))
        } else {
            Ok(())
        }
    }
}
