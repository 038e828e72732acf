//! Relationship loading and lazy fetching

use std::rc::{Rc, Weak};

use serde_json::Value;
use tracing::debug;

use crate::catalog::Catalog;
use crate::collection::Collection;
use crate::error::{OrmError, OrmResult};
use crate::fetch::{EagerParams, FetchParams};
use crate::model::Model;
use crate::record::{Record, Related, SaveOutcome};
use crate::store::{Condition, JoinType, OrderBy, Row};

use super::metadata::{Cardinality, Merge, NativeBy, RelationKind, RelationshipDef, WHEREIN_MAX};

/// A loaded relationship descriptor. Immutable after load.
#[derive(Debug)]
pub struct Relationship {
    name: String,
    kind: RelationKind,
    native_col: String,
    foreign_class: String,
    foreign_alias: String,
    foreign_table: String,
    foreign_col: String,
    foreign_primary: String,
    cols: Vec<String>,
    conds: Vec<Condition>,
    foreign_conds: Vec<Condition>,
    order: Vec<OrderBy>,
    merge: Merge,
    native_by: Option<NativeBy>,
    wherein_max: usize,
    join_type: JoinType,
    join_only: bool,
    catalog: Weak<Catalog>,
}

impl Relationship {
    /// Resolve a declaration against the native model and the catalog.
    ///
    /// The `foreign_key` shorthand expands by cardinality into exactly one
    /// of the two binding columns; declaring it alongside that column is a
    /// configuration fault.
    pub fn load(native: &Model, name: &str, def: RelationshipDef) -> OrmResult<Self> {
        let catalog = native.catalog()?;
        let foreign_name = def.foreign_model.clone().unwrap_or_else(|| name.to_string());
        let foreign = catalog.model(&foreign_name)?;

        let mut cols = if def.cols.is_empty() {
            foreign.spec().table_cols().map(String::from).collect::<Vec<_>>()
        } else {
            def.cols.clone()
        };
        let primary = foreign.primary_col().to_string();
        if !cols.contains(&primary) {
            cols.push(primary.clone());
        }
        if let Some(inherit) = foreign.spec().inherit() {
            if !cols.iter().any(|c| c == inherit) {
                cols.push(inherit.to_string());
            }
        }

        let shorthand_slot_taken = match def.kind {
            RelationKind::BelongsTo => def.native_col.is_some(),
            RelationKind::HasOne | RelationKind::HasMany => def.foreign_col.is_some(),
        };
        if def.foreign_key.is_some() && shorthand_slot_taken {
            return Err(OrmError::Configuration(format!(
                "relationship '{}': foreign_key shorthand conflicts with an explicit binding column",
                name
            )));
        }

        let (native_col, foreign_col) = match def.kind {
            RelationKind::BelongsTo => {
                let native_col = def
                    .native_col
                    .clone()
                    .or_else(|| def.foreign_key.clone())
                    .unwrap_or_else(|| format!("{}_id", foreign.name()));
                let foreign_col = def.foreign_col.clone().unwrap_or_else(|| primary.clone());
                (native_col, foreign_col)
            }
            RelationKind::HasOne | RelationKind::HasMany => {
                let foreign_col = def
                    .foreign_col
                    .clone()
                    .or_else(|| def.foreign_key.clone())
                    .unwrap_or_else(|| format!("{}_id", native.name()));
                let native_col = def
                    .native_col
                    .clone()
                    .unwrap_or_else(|| native.primary_col().to_string());
                (native_col, foreign_col)
            }
        };
        if !cols.contains(&foreign_col) {
            cols.push(foreign_col.clone());
        }

        // Extra conditions mimic WHERE semantics, so they force an inner join.
        let join_type = def
            .join_type
            .unwrap_or(if def.conds.is_empty() { JoinType::Left } else { JoinType::Inner });

        debug!(
            relation = name,
            kind = ?def.kind,
            native_col = %native_col,
            foreign_col = %foreign_col,
            "relationship loaded"
        );

        Ok(Self {
            name: name.to_string(),
            kind: def.kind,
            native_col,
            foreign_class: foreign.class().to_string(),
            foreign_alias: def
                .foreign_alias
                .clone()
                .unwrap_or_else(|| foreign.table_name().to_string()),
            foreign_table: foreign.table_name().to_string(),
            foreign_col,
            foreign_primary: primary,
            cols,
            conds: def.conds,
            foreign_conds: foreign.spec().base_conditions().to_vec(),
            order: def.order,
            merge: def.merge.unwrap_or(Merge::Client),
            native_by: def.native_by,
            wherein_max: def.wherein_max.unwrap_or(WHEREIN_MAX),
            join_type,
            join_only: def.join_only,
            catalog: Rc::downgrade(&catalog),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    pub fn cardinality(&self) -> Cardinality {
        self.kind.cardinality()
    }

    pub fn native_col(&self) -> &str {
        &self.native_col
    }

    pub fn foreign_col(&self) -> &str {
        &self.foreign_col
    }

    pub fn foreign_primary_col(&self) -> &str {
        &self.foreign_primary
    }

    pub fn foreign_table(&self) -> &str {
        &self.foreign_table
    }

    pub fn foreign_alias(&self) -> &str {
        &self.foreign_alias
    }

    pub fn cols(&self) -> &[String] {
        &self.cols
    }

    pub fn merge(&self) -> Merge {
        self.merge
    }

    pub fn native_by_strategy(&self) -> Option<NativeBy> {
        self.native_by
    }

    pub fn wherein_max(&self) -> usize {
        self.wherein_max
    }

    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    pub fn is_join_only(&self) -> bool {
        self.join_only
    }

    pub(crate) fn catalog(&self) -> OrmResult<Rc<Catalog>> {
        self.catalog.upgrade().ok_or(OrmError::CatalogGone)
    }

    pub fn foreign_model(&self) -> OrmResult<Rc<Model>> {
        self.catalog()?.model_by_class(&self.foreign_class)
    }

    /// Fetch parameters for a relationship query, optionally overlaid with
    /// eager options.
    pub(crate) fn fetch_params(&self, eager: Option<&EagerParams>) -> FetchParams {
        let mut params = FetchParams::new().cache(false).cols(self.cols.clone());
        params.conds.extend(self.conds.iter().cloned());
        params.conds.extend(self.foreign_conds.iter().cloned());
        params.order = self.order.clone();
        if let Some(ep) = eager {
            params = params.cols(ep.cols.iter().cloned());
            params.conds.extend(ep.conds.iter().cloned());
            if !ep.order.is_empty() {
                params.order = ep.order.clone();
            }
            params.eager = ep.eager.clone();
        }
        if !params.cols.contains(&self.foreign_col) {
            params.cols.push(self.foreign_col.clone());
        }
        params
    }

    /// Lazy fetch for one native record. Returns an empty default (never
    /// null) when nothing matches.
    pub fn fetch(&self, native: &Record) -> OrmResult<Related> {
        let foreign = self.foreign_model()?;
        let val = native.get_raw(&self.native_col);
        if val.is_null() {
            return self.empty_default();
        }
        let mut params = self.fetch_params(None);
        params.conds.push(Condition::eq(self.foreign_col.clone(), val));
        match self.kind.cardinality() {
            Cardinality::One => match foreign.fetch_one(&params)? {
                Some(record) => Ok(Related::One(Box::new(record))),
                None => self.empty_default(),
            },
            Cardinality::Many => Ok(Related::Many(foreign.fetch_all(&params)?)),
        }
    }

    /// The value a native row gets when no foreign rows match: a fresh
    /// empty record or an empty collection.
    pub fn empty_default(&self) -> OrmResult<Related> {
        let foreign = self.foreign_model()?;
        Ok(match self.kind.cardinality() {
            Cardinality::One => Related::One(Box::new(foreign.fetch_new(Row::new())?)),
            Cardinality::Many => Related::Many(Collection::empty(&foreign)),
        })
    }

    /// Promote a raw attached value (from eager fetching or a server-merge
    /// join) into a materialized related value.
    pub(crate) fn materialize(&self, value: Value) -> OrmResult<Related> {
        let foreign = self.foreign_model()?;
        match (self.kind.cardinality(), value) {
            (Cardinality::Many, Value::Array(items)) => {
                let rows: Vec<Row> = items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::Object(map) => Some(map.into_iter().collect()),
                        _ => None,
                    })
                    .collect();
                Ok(Related::Many(Collection::from_rows(&foreign, rows, None)))
            }
            (Cardinality::Many, _) => Ok(Related::Many(Collection::empty(&foreign))),
            (Cardinality::One, Value::Object(map)) => {
                let row: Row = map.into_iter().collect();
                let concrete = foreign.model_for_row(&row)?;
                Ok(Related::One(Box::new(Record::from_row(&concrete, row)?)))
            }
            (Cardinality::One, _) => self.empty_default(),
        }
    }

    /// Promote caller-supplied seed data into new (unsaved) related values.
    pub(crate) fn materialize_new(&self, value: Value) -> OrmResult<Related> {
        let foreign = self.foreign_model()?;
        match (self.kind.cardinality(), value) {
            (Cardinality::Many, Value::Array(items)) => {
                let mut collection = Collection::empty(&foreign);
                for item in items {
                    if let Value::Object(map) = item {
                        collection.append_new(map.into_iter().collect())?;
                    }
                }
                Ok(Related::Many(collection))
            }
            (Cardinality::One, Value::Object(map)) => Ok(Related::One(Box::new(
                foreign.fetch_new(map.into_iter().collect())?,
            ))),
            _ => self.empty_default(),
        }
    }

    /// Pre-save hook on the native row. Belongs-to saves a new or dirty
    /// foreign record first, then copies its key into the native row so the
    /// insert/update carries the fresh id.
    pub(crate) fn presave_native(&self, native_data: &mut Row, value: &mut Related) -> OrmResult<bool> {
        if self.kind != RelationKind::BelongsTo {
            return Ok(true);
        }
        let Related::One(foreign) = value else {
            return Ok(true);
        };
        let mut ok = true;
        if foreign.is_new() && foreign.is_blank() {
            return Ok(true);
        }
        if foreign.is_new() || foreign.is_changed(None) {
            ok = matches!(foreign.save(None)?, SaveOutcome::Saved);
        }
        let key = foreign.get_raw(&self.foreign_col);
        if !key.is_null() {
            native_data.insert(self.native_col.clone(), key);
        }
        Ok(ok)
    }

    /// Post-save of a materialized related value, after the native row has
    /// been persisted. Has-side relations stamp the native key onto the
    /// foreign rows first.
    pub(crate) fn save_related(&self, native_val: &Value, value: &mut Related) -> OrmResult<bool> {
        match (self.kind, value) {
            (RelationKind::BelongsTo, Related::One(record)) => {
                if record.is_new() && record.is_blank() {
                    return Ok(true);
                }
                if record.is_new() || record.is_changed(None) {
                    Ok(matches!(record.save(None)?, SaveOutcome::Saved))
                } else {
                    Ok(true)
                }
            }
            (RelationKind::HasOne, Related::One(record)) => {
                if record.is_new() && record.is_blank() {
                    return Ok(true);
                }
                record.set_raw(&self.foreign_col, native_val.clone());
                Ok(matches!(record.save(None)?, SaveOutcome::Saved))
            }
            (RelationKind::HasMany, Related::Many(collection)) => {
                for offset in 0..collection.len() {
                    let record = collection.get(offset)?;
                    if record.is_deleted() || (record.is_new() && record.is_blank()) {
                        continue;
                    }
                    record.set_raw(&self.foreign_col, native_val.clone());
                }
                collection.save()
            }
            // kind/value shape mismatch: nothing sensible to persist
            _ => Ok(true),
        }
    }

    /// Relationship-level plus foreign-model-level conditions, the set a
    /// participating join narrows its target rows with.
    pub(crate) fn extra_conds(&self) -> Vec<Condition> {
        self.conds
            .iter()
            .chain(self.foreign_conds.iter())
            .cloned()
            .collect()
    }

    /// `(column, alias)` projection list for a server-merge join.
    pub(crate) fn join_cols(&self, eager: &EagerParams) -> Vec<(String, String)> {
        let mut cols = self.cols.clone();
        for col in &eager.cols {
            if !cols.contains(col) {
                cols.push(col.clone());
            }
        }
        cols.into_iter()
            .map(|col| {
                let alias = format!("{}__{}", self.name, col);
                (col, alias)
            })
            .collect()
    }
}
