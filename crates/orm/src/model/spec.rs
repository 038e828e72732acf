//! Model metadata
//!
//! A [`ModelSpec`] is everything the catalog needs to stand up a model:
//! table shape, key columns, timestamp and sequence columns, single-table
//! inheritance, base conditions, relationship declarations, the filter
//! chain factory, the observer, and the per-column accessor table.

use std::collections::HashMap;

use serde_json::Value;

use crate::filter::FilterChainFactory;
use crate::inflect;
use crate::observers::ObserverHandle;
use crate::record::Record;
use crate::relationships::RelationshipDef;
use crate::store::Condition;

/// Column value types the core distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Bool,
    Int,
    Float,
    Str,
    Timestamp,
}

/// One table-backed column.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub ty: ColumnType,
    pub autoinc: bool,
    pub require: bool,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            autoinc: false,
            require: false,
        }
    }

    /// Conventional autoincrementing integer primary key column.
    pub fn pk(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ColumnType::Int,
            autoinc: true,
            require: false,
        }
    }

    pub fn require(mut self) -> Self {
        self.require = true;
        self
    }

    pub fn autoinc(mut self) -> Self {
        self.autoinc = true;
        self
    }
}

/// Explicit getter/setter pair for one column.
///
/// Replaces runtime method-name scanning: the table is built once at spec
/// time and probed as a plain map on every `Record::get`/`set`.
pub struct Accessor {
    pub get: Option<Box<dyn Fn(&Record) -> Value>>,
    pub set: Option<Box<dyn Fn(&mut Record, Value)>>,
}

/// Declarative description of one model.
pub struct ModelSpec {
    name: String,
    table: String,
    primary: String,
    cols: Vec<ColumnSpec>,
    created_col: Option<String>,
    updated_col: Option<String>,
    sequence_cols: HashMap<String, String>,
    inherit_col: Option<String>,
    inherit_val: Option<String>,
    calculate_cols: Vec<String>,
    base_conds: Vec<Condition>,
    relationships: HashMap<String, RelationshipDef>,
    cache_enabled: bool,
    filter: Option<FilterChainFactory>,
    observer: Option<ObserverHandle>,
    accessors: HashMap<String, Accessor>,
    invalid_messages: HashMap<String, String>,
}

impl ModelSpec {
    /// New spec for `name` (singular underscore form). The table name
    /// defaults to the plural, the primary key to `id`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let table = inflect::pluralize(&name);
        Self {
            name,
            table,
            primary: "id".to_string(),
            cols: Vec::new(),
            created_col: None,
            updated_col: None,
            sequence_cols: HashMap::new(),
            inherit_col: None,
            inherit_val: None,
            calculate_cols: Vec::new(),
            base_conds: Vec::new(),
            relationships: HashMap::new(),
            cache_enabled: false,
            filter: None,
            observer: None,
            accessors: HashMap::new(),
            invalid_messages: HashMap::new(),
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn primary(mut self, col: impl Into<String>) -> Self {
        self.primary = col.into();
        self
    }

    pub fn col(mut self, col: ColumnSpec) -> Self {
        self.cols.push(col);
        self
    }

    /// Declare conventional `created_at`/`updated_at` timestamp columns.
    pub fn timestamps(mut self) -> Self {
        self.created_col = Some("created_at".to_string());
        self.updated_col = Some("updated_at".to_string());
        self.cols.push(ColumnSpec::new("created_at", ColumnType::Timestamp));
        self.cols.push(ColumnSpec::new("updated_at", ColumnType::Timestamp));
        self
    }

    pub fn created_col(mut self, col: impl Into<String>) -> Self {
        self.created_col = Some(col.into());
        self
    }

    pub fn updated_col(mut self, col: impl Into<String>) -> Self {
        self.updated_col = Some(col.into());
        self
    }

    /// Bind a column to a named store sequence; empty values are populated
    /// from the sequence at insert time.
    pub fn sequence_col(mut self, col: impl Into<String>, sequence: impl Into<String>) -> Self {
        self.sequence_cols.insert(col.into(), sequence.into());
        self
    }

    /// Single-table inheritance column for a base model.
    pub fn inherit_col(mut self, col: impl Into<String>) -> Self {
        self.inherit_col = Some(col.into());
        self
    }

    /// Inheritance value identifying this concrete model's rows.
    pub fn inherit_val(mut self, val: impl Into<String>) -> Self {
        self.inherit_val = Some(val.into());
        self
    }

    /// Declare a computed column that is never written back to the table.
    pub fn calculate_col(mut self, col: impl Into<String>) -> Self {
        self.calculate_cols.push(col.into());
        self
    }

    /// Base condition merged into every fetch against this model.
    pub fn cond(mut self, cond: Condition) -> Self {
        self.base_conds.push(cond);
        self
    }

    pub fn relate(mut self, name: impl Into<String>, def: RelationshipDef) -> Self {
        self.relationships.insert(name.into(), def);
        self
    }

    pub fn cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn filter(mut self, factory: FilterChainFactory) -> Self {
        self.filter = Some(factory);
        self
    }

    pub fn observe(mut self, observer: ObserverHandle) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn accessor(mut self, col: impl Into<String>, accessor: Accessor) -> Self {
        self.accessors.insert(col.into(), accessor);
        self
    }

    /// Column-specific message overriding the chain's generic one.
    pub fn invalid_message(mut self, col: impl Into<String>, message: impl Into<String>) -> Self {
        self.invalid_messages.insert(col.into(), message.into());
        self
    }

    // read side

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn primary_col(&self) -> &str {
        &self.primary
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.cols
    }

    pub fn table_cols(&self) -> impl Iterator<Item = &str> {
        self.cols.iter().map(|c| c.name.as_str())
    }

    pub fn has_table_col(&self, col: &str) -> bool {
        self.cols.iter().any(|c| c.name == col)
    }

    pub fn autoinc_col(&self) -> Option<&str> {
        self.cols.iter().find(|c| c.autoinc).map(|c| c.name.as_str())
    }

    pub fn created(&self) -> Option<&str> {
        self.created_col.as_deref()
    }

    pub fn updated(&self) -> Option<&str> {
        self.updated_col.as_deref()
    }

    pub fn sequences(&self) -> &HashMap<String, String> {
        &self.sequence_cols
    }

    pub fn inherit(&self) -> Option<&str> {
        self.inherit_col.as_deref()
    }

    pub fn inherit_value(&self) -> Option<&str> {
        self.inherit_val.as_deref()
    }

    pub fn calculated(&self) -> &[String] {
        &self.calculate_cols
    }

    pub fn base_conditions(&self) -> &[Condition] {
        &self.base_conds
    }

    pub fn relationship_defs(&self) -> &HashMap<String, RelationshipDef> {
        &self.relationships
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache_enabled
    }

    pub fn filter_factory(&self) -> Option<&FilterChainFactory> {
        self.filter.as_ref()
    }

    pub fn observer(&self) -> Option<&ObserverHandle> {
        self.observer.as_ref()
    }

    pub fn accessor_for(&self, col: &str) -> Option<&Accessor> {
        self.accessors.get(col)
    }

    pub fn message_for(&self, col: &str) -> Option<&str> {
        self.invalid_messages.get(col).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_defaults_follow_convention() {
        let spec = ModelSpec::new("author");
        assert_eq!(spec.table_name(), "authors");
        assert_eq!(spec.primary_col(), "id");
    }

    #[test]
    fn timestamps_declare_both_columns() {
        let spec = ModelSpec::new("post").timestamps();
        assert_eq!(spec.created(), Some("created_at"));
        assert_eq!(spec.updated(), Some("updated_at"));
        assert!(spec.has_table_col("created_at"));
        assert!(spec.has_table_col("updated_at"));
    }

    #[test]
    fn autoinc_col_comes_from_column_flags() {
        let spec = ModelSpec::new("author")
            .col(ColumnSpec::pk("id"))
            .col(ColumnSpec::new("name", ColumnType::Str));
        assert_eq!(spec.autoinc_col(), Some("id"));
    }
}
