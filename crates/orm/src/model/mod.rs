//! Model - the per-type hub the core entities hang off
//!
//! A model owns its metadata, a store handle, a versioned cache, and the
//! lazily-loaded relationship descriptors. Exactly one model instance
//! exists per class within a catalog; records and collections reach it
//! through non-owning weak handles.

mod fetch;
mod spec;

pub use spec::{Accessor, ColumnSpec, ColumnType, ModelSpec};

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::Value;

use crate::cache::ModelCache;
use crate::catalog::Catalog;
use crate::error::{OrmError, OrmResult};
use crate::record::Record;
use crate::relationships::Relationship;
use crate::store::{Row, Store};

pub struct Model {
    me: Weak<Model>,
    class: String,
    spec: Rc<ModelSpec>,
    store: Rc<dyn Store>,
    cache: ModelCache,
    catalog: Weak<Catalog>,
    relationships: RefCell<HashMap<String, Rc<Relationship>>>,
}

impl Model {
    pub(crate) fn new(class: String, spec: Rc<ModelSpec>, catalog: &Rc<Catalog>) -> Rc<Self> {
        let cache = ModelCache::new(
            catalog.cache_backend(),
            catalog.cache_prefix(),
            spec.name().to_string(),
        );
        Rc::new_cyclic(|me| Self {
            me: me.clone(),
            class,
            spec,
            store: catalog.store(),
            cache,
            catalog: Rc::downgrade(catalog),
            relationships: RefCell::new(HashMap::new()),
        })
    }

    /// Owning handle to this model, for constructing records and
    /// collections that hold weak back-references.
    pub(crate) fn handle(&self) -> OrmResult<Rc<Model>> {
        self.me.upgrade().ok_or(OrmError::CatalogGone)
    }

    /// Resolved class this model was registered under.
    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn name(&self) -> &str {
        self.spec.name()
    }

    pub fn table_name(&self) -> &str {
        self.spec.table_name()
    }

    pub fn primary_col(&self) -> &str {
        self.spec.primary_col()
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    pub fn store(&self) -> Rc<dyn Store> {
        Rc::clone(&self.store)
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    pub fn catalog(&self) -> OrmResult<Rc<Catalog>> {
        self.catalog.upgrade().ok_or(OrmError::CatalogGone)
    }

    /// Loaded relationship descriptor, resolved from its declaration on
    /// first access.
    pub fn relationship(&self, name: &str) -> OrmResult<Rc<Relationship>> {
        if let Some(rel) = self.relationships.borrow().get(name) {
            return Ok(Rc::clone(rel));
        }
        let def = self
            .spec
            .relationship_defs()
            .get(name)
            .cloned()
            .ok_or_else(|| OrmError::UnknownRelationship(name.to_string()))?;
        let rel = Rc::new(Relationship::load(self, name, def)?);
        self.relationships
            .borrow_mut()
            .insert(name.to_string(), Rc::clone(&rel));
        Ok(rel)
    }

    pub fn relation_names(&self) -> Vec<String> {
        self.spec.relationship_defs().keys().cloned().collect()
    }

    pub fn is_relation(&self, name: &str) -> bool {
        self.spec.relationship_defs().contains_key(name)
    }

    /// Concrete model for a row, honoring single-table inheritance: the
    /// row's inheritance-column value `v` selects model `<name>_<v>` when
    /// one is registered, this model otherwise.
    pub fn model_for_row(&self, row: &Row) -> OrmResult<Rc<Model>> {
        let Some(col) = self.spec.inherit() else {
            return self.handle();
        };
        let Some(Value::String(val)) = row.get(col) else {
            return self.handle();
        };
        if val.is_empty() {
            return self.handle();
        }
        let catalog = self.catalog()?;
        match catalog.load_model(&format!("{}_{}", self.spec.name(), val))? {
            Some(model) => Ok(model),
            None => self.handle(),
        }
    }

    /// A fresh unsaved record seeded from `data`. Values under relation
    /// names become new related records/collections.
    pub fn fetch_new(&self, data: Row) -> OrmResult<Record> {
        Record::new_record(&self.handle()?, data)
    }

    /// Invalidate this model's cache and every directly related model's.
    pub fn cache_delete_all(&self) -> OrmResult<()> {
        self.cache.delete_all(&self.handle()?)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("class", &self.class)
            .field("table", &self.spec.table_name())
            .finish()
    }
}
