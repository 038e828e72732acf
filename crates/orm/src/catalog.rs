//! Model catalog - per-scope registry of model singletons
//!
//! A catalog is constructed once per logical request/session and passed by
//! handle; there is no process-wide registry. Model specs are registered
//! under class names, names are resolved by probing an ordered prefix
//! stack (first match wins), and each resolved class is instantiated at
//! most once per catalog.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use tracing::debug;

use crate::cache::{CacheBackend, MemoryCache};
use crate::error::{OrmError, OrmResult};
use crate::inflect;
use crate::model::{Model, ModelSpec};
use crate::store::Store;

pub struct Catalog {
    me: Weak<Catalog>,
    store: Rc<dyn Store>,
    cache_backend: Arc<dyn CacheBackend>,
    cache_prefix: String,
    stack: RefCell<Vec<String>>,
    registry: RefCell<HashMap<String, Rc<ModelSpec>>>,
    classes: RefCell<HashMap<String, String>>,
    models: RefCell<HashMap<String, Rc<Model>>>,
}

impl Catalog {
    /// Catalog over `store` with an in-memory cache backend.
    pub fn new(store: Rc<dyn Store>) -> Rc<Self> {
        Self::with_cache(store, Arc::new(MemoryCache::new()), "helios")
    }

    pub fn with_cache(
        store: Rc<dyn Store>,
        cache_backend: Arc<dyn CacheBackend>,
        cache_prefix: impl Into<String>,
    ) -> Rc<Self> {
        let cache_prefix = cache_prefix.into();
        Rc::new_cyclic(|me| Self {
            me: me.clone(),
            store,
            cache_backend,
            cache_prefix,
            stack: RefCell::new(Vec::new()),
            registry: RefCell::new(HashMap::new()),
            classes: RefCell::new(HashMap::new()),
            models: RefCell::new(HashMap::new()),
        })
    }

    fn handle(&self) -> OrmResult<Rc<Catalog>> {
        self.me.upgrade().ok_or(OrmError::CatalogGone)
    }

    /// Append a vendor/namespace prefix to the resolution stack. Earlier
    /// prefixes win.
    pub fn push_stack(&self, prefix: impl Into<String>) {
        self.stack.borrow_mut().push(prefix.into());
    }

    /// Register a model spec under a class name (`<Prefix>_<Canonical>`).
    pub fn register(&self, class: impl Into<String>, spec: ModelSpec) {
        self.registry.borrow_mut().insert(class.into(), Rc::new(spec));
    }

    /// Bind a name directly to a spec, bypassing the class-stack search.
    /// Fails when the name is already bound.
    pub fn set_model(&self, name: &str, spec: ModelSpec) -> OrmResult<()> {
        let canonical = inflect::canonical(name);
        if self.classes.borrow().contains_key(&canonical) {
            return Err(OrmError::NameBound(canonical));
        }
        self.registry
            .borrow_mut()
            .insert(canonical.clone(), Rc::new(spec));
        self.classes
            .borrow_mut()
            .insert(canonical.clone(), canonical);
        Ok(())
    }

    /// Resolve a model name to its concrete class, caching the mapping.
    pub fn class_for(&self, name: &str) -> OrmResult<String> {
        let canonical = inflect::canonical(name);
        if let Some(class) = self.classes.borrow().get(&canonical) {
            return Ok(class.clone());
        }
        let registry = self.registry.borrow();
        let found = self
            .stack
            .borrow()
            .iter()
            .map(|prefix| format!("{}_{}", prefix, canonical))
            .find(|candidate| registry.contains_key(candidate));
        drop(registry);
        match found {
            Some(class) => {
                debug!(name, class = %class, "model class resolved");
                self.classes.borrow_mut().insert(canonical, class.clone());
                Ok(class)
            }
            None => Err(OrmError::ModelNotFound(name.to_string())),
        }
    }

    /// Singleton model instance for a name.
    pub fn model(&self, name: &str) -> OrmResult<Rc<Model>> {
        let class = self.class_for(name)?;
        self.model_by_class(&class)
    }

    /// Like [`Catalog::model`] but converts the not-found case into `None`.
    pub fn load_model(&self, name: &str) -> OrmResult<Option<Rc<Model>>> {
        match self.model(name) {
            Ok(model) => Ok(Some(model)),
            Err(OrmError::ModelNotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Singleton model instance for a resolved class, constructing it on
    /// first access.
    pub fn model_by_class(&self, class: &str) -> OrmResult<Rc<Model>> {
        if let Some(model) = self.models.borrow().get(class) {
            return Ok(Rc::clone(model));
        }
        let spec = self
            .registry
            .borrow()
            .get(class)
            .cloned()
            .ok_or_else(|| OrmError::ModelNotFound(class.to_string()))?;
        let model = Model::new(class.to_string(), spec, &self.handle()?);
        self.models
            .borrow_mut()
            .insert(class.to_string(), Rc::clone(&model));
        Ok(model)
    }

    pub(crate) fn store(&self) -> Rc<dyn Store> {
        Rc::clone(&self.store)
    }

    pub(crate) fn cache_backend(&self) -> Arc<dyn CacheBackend> {
        Arc::clone(&self.cache_backend)
    }

    pub(crate) fn cache_prefix(&self) -> &str {
        &self.cache_prefix
    }
}
