//! Relationship metadata - declaration options and strategy types

use serde::{Deserialize, Serialize};

use crate::store::{Condition, JoinType, OrderBy};

/// The kind of relationship between a native and a foreign model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    /// The native row points at one foreign row via a local foreign key.
    BelongsTo,
    /// One foreign row points back at the native row.
    HasOne,
    /// Many foreign rows point back at the native row.
    HasMany,
}

/// Result cardinality of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    One,
    Many,
}

impl RelationKind {
    pub fn cardinality(self) -> Cardinality {
        match self {
            RelationKind::BelongsTo | RelationKind::HasOne => Cardinality::One,
            RelationKind::HasMany => Cardinality::Many,
        }
    }

    /// Returns true if the foreign key lives on the native row.
    pub fn key_is_native(self) -> bool {
        matches!(self, RelationKind::BelongsTo)
    }
}

/// Where relation data gets merged into the native result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Merge {
    /// Fold the relation into the native select as a join; no second query.
    Server,
    /// Fetch separately and stitch in-process.
    Client,
}

/// How an eager query is scoped to only the fetched native rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NativeBy {
    /// `foreign_col IN (<native ids>)`.
    Wherein,
    /// Inner join against a derived sub-select of the native id column.
    Select,
}

/// Default row-count threshold above which eager loading abandons the
/// `wherein` id list for the `select` sub-join.
pub const WHEREIN_MAX: usize = 100;

/// Declaration of one relationship as written on a model spec.
///
/// Everything is optional except the kind; `Relationship::load` resolves
/// the blanks against the native and foreign models.
#[derive(Debug, Clone)]
pub struct RelationshipDef {
    pub kind: RelationKind,
    /// Foreign model name; defaults to the relation name itself, which the
    /// catalog then normalizes.
    pub foreign_model: Option<String>,
    /// Shorthand: the one conventional key column. Expanded by cardinality
    /// into exactly one of `native_col`/`foreign_col`.
    pub foreign_key: Option<String>,
    pub native_col: Option<String>,
    pub foreign_col: Option<String>,
    pub foreign_alias: Option<String>,
    pub cols: Vec<String>,
    pub conds: Vec<Condition>,
    pub order: Vec<OrderBy>,
    pub merge: Option<Merge>,
    pub native_by: Option<NativeBy>,
    pub wherein_max: Option<usize>,
    pub join_type: Option<JoinType>,
    pub join_only: bool,
}

impl RelationshipDef {
    pub fn new(kind: RelationKind) -> Self {
        Self {
            kind,
            foreign_model: None,
            foreign_key: None,
            native_col: None,
            foreign_col: None,
            foreign_alias: None,
            cols: Vec::new(),
            conds: Vec::new(),
            order: Vec::new(),
            merge: None,
            native_by: None,
            wherein_max: None,
            join_type: None,
            join_only: false,
        }
    }

    pub fn belongs_to() -> Self {
        Self::new(RelationKind::BelongsTo)
    }

    pub fn has_one() -> Self {
        Self::new(RelationKind::HasOne)
    }

    pub fn has_many() -> Self {
        Self::new(RelationKind::HasMany)
    }

    pub fn foreign_model(mut self, name: impl Into<String>) -> Self {
        self.foreign_model = Some(name.into());
        self
    }

    pub fn foreign_key(mut self, col: impl Into<String>) -> Self {
        self.foreign_key = Some(col.into());
        self
    }

    pub fn native_col(mut self, col: impl Into<String>) -> Self {
        self.native_col = Some(col.into());
        self
    }

    pub fn foreign_col(mut self, col: impl Into<String>) -> Self {
        self.foreign_col = Some(col.into());
        self
    }

    pub fn cols<I, S>(mut self, cols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cols.extend(cols.into_iter().map(Into::into));
        self
    }

    pub fn cond(mut self, cond: Condition) -> Self {
        self.conds.push(cond);
        self
    }

    pub fn order(mut self, order: OrderBy) -> Self {
        self.order.push(order);
        self
    }

    pub fn merge(mut self, merge: Merge) -> Self {
        self.merge = Some(merge);
        self
    }

    pub fn native_by(mut self, native_by: NativeBy) -> Self {
        self.native_by = Some(native_by);
        self
    }

    pub fn wherein_max(mut self, max: usize) -> Self {
        self.wherein_max = Some(max);
        self
    }

    pub fn join_type(mut self, join_type: JoinType) -> Self {
        self.join_type = Some(join_type);
        self
    }

    pub fn join_only(mut self) -> Self {
        self.join_only = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cardinality_follows_kind() {
        assert_eq!(RelationKind::BelongsTo.cardinality(), Cardinality::One);
        assert_eq!(RelationKind::HasOne.cardinality(), Cardinality::One);
        assert_eq!(RelationKind::HasMany.cardinality(), Cardinality::Many);
        assert!(RelationKind::BelongsTo.key_is_native());
        assert!(!RelationKind::HasMany.key_is_native());
    }

    #[test]
    fn strategies_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&NativeBy::Wherein).unwrap(), "\"wherein\"");
        assert_eq!(serde_json::to_string(&Merge::Server).unwrap(), "\"server\"");
    }
}
