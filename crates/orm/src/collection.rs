//! Collection - ordered, lazily-materializing container of rows
//!
//! A collection holds the rows one fetch produced, in fetch order. Reading
//! an offset promotes the raw row to a full record, permanently; the
//! promotion honors single-table inheritance, so one collection can hold
//! records of different concrete types. Batch save attempts every element
//! and aggregates the offsets that failed.

use std::rc::{Rc, Weak};

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{OrmError, OrmResult};
use crate::fetch::PagerInfo;
use crate::model::Model;
use crate::record::{Record, SaveOutcome};
use crate::store::{loose_eq, Row};

#[derive(Debug)]
enum Slot {
    Row(Row),
    Record(Record),
}

#[derive(Debug)]
pub struct Collection {
    model: Weak<Model>,
    slots: Vec<Slot>,
    pager: Option<PagerInfo>,
    invalid_offsets: Vec<usize>,
}

impl Collection {
    pub(crate) fn from_rows(model: &Rc<Model>, rows: Vec<Row>, pager: Option<PagerInfo>) -> Self {
        Self {
            model: Rc::downgrade(model),
            slots: rows.into_iter().map(Slot::Row).collect(),
            pager,
            invalid_offsets: Vec::new(),
        }
    }

    pub(crate) fn empty(model: &Rc<Model>) -> Self {
        Self::from_rows(model, Vec::new(), None)
    }

    pub fn model(&self) -> OrmResult<Rc<Model>> {
        self.model.upgrade().ok_or(OrmError::CatalogGone)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn pager(&self) -> Option<&PagerInfo> {
        self.pager.as_ref()
    }

    /// Record at `offset`. An unset offset is first filled with fresh
    /// empty records; a raw row is promoted to a record of the concrete
    /// type its inheritance-column value selects. Promotion is permanent.
    pub fn get(&mut self, offset: usize) -> OrmResult<&mut Record> {
        let model = self.model()?;
        while self.slots.len() <= offset {
            let record = model.fetch_new(Row::new())?;
            self.slots.push(Slot::Record(record));
        }
        if matches!(self.slots[offset], Slot::Row(_)) {
            let Slot::Row(row) = std::mem::replace(&mut self.slots[offset], Slot::Row(Row::new()))
            else {
                unreachable!("slot matched as raw row above");
            };
            let concrete = model.model_for_row(&row)?;
            let record = Record::from_row(&concrete, row)?;
            self.slots[offset] = Slot::Record(record);
        }
        match &mut self.slots[offset] {
            Slot::Record(record) => Ok(record),
            Slot::Row(_) => unreachable!("offset was just promoted"),
        }
    }

    /// Append a fresh unsaved record seeded from `data`; returns its offset.
    pub fn append_new(&mut self, data: Row) -> OrmResult<usize> {
        let model = self.model()?;
        let record = model.fetch_new(data)?;
        self.slots.push(Slot::Record(record));
        Ok(self.slots.len() - 1)
    }

    /// Save every non-deleted element, forcing materialization. Every
    /// element is attempted regardless of earlier failures; offsets whose
    /// save did not end `Saved` are aggregated. True only when none failed.
    ///
    /// There is no batch atomicity here; callers wanting all-or-nothing
    /// bracket the call with the store's own transaction.
    pub fn save(&mut self) -> OrmResult<bool> {
        self.invalid_offsets.clear();
        for offset in 0..self.slots.len() {
            let record = self.get(offset)?;
            if record.is_deleted() {
                continue;
            }
            // blank new records only exist as synthesized placeholders
            if record.is_new() && record.is_blank() {
                continue;
            }
            match record.save(None) {
                Ok(SaveOutcome::Saved) => {}
                Ok(_) => self.invalid_offsets.push(offset),
                Err(err) => {
                    warn!(offset, error = %err, "collection element save failed");
                    self.invalid_offsets.push(offset);
                }
            }
        }
        Ok(self.invalid_offsets.is_empty())
    }

    /// Offsets whose element failed the last `save`.
    pub fn invalid_offsets(&self) -> &[usize] {
        &self.invalid_offsets
    }

    /// Issue a store DELETE for every persisted element, then drop all
    /// elements from the collection.
    pub fn delete_all(&mut self) -> OrmResult<()> {
        for offset in 0..self.slots.len() {
            let record = self.get(offset)?;
            if record.is_deleted() || record.is_new() {
                continue;
            }
            record.delete()?;
        }
        self.slots.clear();
        Ok(())
    }

    /// Detach every element from the collection without touching the store.
    pub fn remove_all(&mut self) {
        self.slots.clear();
    }

    /// Offset of the materialized element whose primary key and concrete
    /// type match `record`. `None` when nothing matches; zero is a legal
    /// offset, so callers must not truthiness-test the result.
    pub fn record_offset(&self, record: &Record) -> Option<usize> {
        let model = self.model().ok()?;
        let primary = model.primary_col();
        let target = record.primary_value()?;
        self.slots.iter().position(|slot| match slot {
            Slot::Record(candidate) => {
                candidate.model_class() == record.model_class()
                    && loose_eq(&candidate.get_raw(primary), &target)
            }
            Slot::Row(_) => false,
        })
    }

    /// Primary key value of every element, without forcing materialization.
    pub fn primary_vals(&self) -> OrmResult<Vec<Value>> {
        let model = self.model()?;
        Ok(self.col_vals(model.primary_col()))
    }

    /// One column across all elements, reading raw rows in place.
    pub fn col_vals(&self, col: &str) -> Vec<Value> {
        self.slots
            .iter()
            .map(|slot| match slot {
                Slot::Row(row) => row.get(col).cloned().unwrap_or(Value::Null),
                Slot::Record(record) => record.get_raw(col),
            })
            .collect()
    }

    /// Row snapshots for every element, materialized or not.
    pub fn to_array(&self) -> Vec<Row> {
        self.slots
            .iter()
            .map(|slot| match slot {
                Slot::Row(row) => row.clone(),
                Slot::Record(record) => record.to_array(),
            })
            .collect()
    }

    /// Invalid maps of materialized elements, keyed by offset.
    pub(crate) fn invalid(&self) -> Map<String, Value> {
        let mut out = Map::new();
        for (offset, slot) in self.slots.iter().enumerate() {
            if let Slot::Record(record) = slot {
                let nested = record.invalid();
                if !nested.is_empty() {
                    out.insert(offset.to_string(), Value::Object(nested));
                }
            }
        }
        out
    }

    /// Whether the element at `offset` is already a record.
    pub fn is_materialized(&self, offset: usize) -> bool {
        matches!(self.slots.get(offset), Some(Slot::Record(_)))
    }
}
