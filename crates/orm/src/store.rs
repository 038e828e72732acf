//! Store boundary - the narrow interface the core consumes from the SQL layer
//!
//! The core never renders SQL text. It describes selects, conditions, joins,
//! and assignments as plain data and hands them to a [`Store`] implementation,
//! which owns dialect generation, escaping, and connection handling.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreResult;

/// A raw row as the store returns it: column name to value.
pub type Row = HashMap<String, Value>;

/// Comparison operators a condition can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Like,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOperator::Equal => write!(f, "="),
            QueryOperator::NotEqual => write!(f, "!="),
            QueryOperator::GreaterThan => write!(f, ">"),
            QueryOperator::GreaterThanOrEqual => write!(f, ">="),
            QueryOperator::LessThan => write!(f, "<"),
            QueryOperator::LessThanOrEqual => write!(f, "<="),
            QueryOperator::Like => write!(f, "LIKE"),
            QueryOperator::In => write!(f, "IN"),
            QueryOperator::NotIn => write!(f, "NOT IN"),
            QueryOperator::IsNull => write!(f, "IS NULL"),
            QueryOperator::IsNotNull => write!(f, "IS NOT NULL"),
        }
    }
}

/// One WHERE condition.
///
/// `value` carries the operand for scalar operators, `values` the list for
/// `In`/`NotIn`. Null-test operators carry neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub column: String,
    pub operator: QueryOperator,
    pub value: Option<Value>,
    pub values: Vec<Value>,
}

impl Condition {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            operator: QueryOperator::Equal,
            value: Some(value.into()),
            values: Vec::new(),
        }
    }

    pub fn cmp(column: impl Into<String>, operator: QueryOperator, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            operator,
            value: Some(value.into()),
            values: Vec::new(),
        }
    }

    pub fn is_in(column: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            column: column.into(),
            operator: QueryOperator::In,
            value: None,
            values,
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            operator: QueryOperator::IsNull,
            value: None,
            values: Vec::new(),
        }
    }
}

/// Join types the core emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER JOIN"),
            JoinType::Left => write!(f, "LEFT JOIN"),
        }
    }
}

/// What a join targets: a table or a derived sub-select.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JoinTarget {
    Table(String),
    Subquery(Box<Select>),
}

/// A join clause.
///
/// `on` pairs a base-select column with a target column. `conds` narrows
/// the target rows before matching (extra ON conditions). `cols` lists
/// `(column, alias)` projections pulled from the target; an empty list makes
/// the join a pure participant (filtering only, nothing projected).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    pub join_type: JoinType,
    pub target: JoinTarget,
    pub alias: String,
    pub on: (String, String),
    pub conds: Vec<Condition>,
    pub cols: Vec<(String, String)>,
}

/// Ordering direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    Asc,
    Desc,
}

/// One ORDER BY term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    pub direction: OrderDirection,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Desc,
        }
    }
}

/// A complete select description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Select {
    pub cols: Vec<String>,
    pub from: String,
    pub alias: String,
    pub joins: Vec<Join>,
    pub conds: Vec<Condition>,
    pub order: Vec<OrderBy>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    /// Ask the store for a row count instead of rows.
    pub count_only: bool,
}

impl Select {
    pub fn from_table(table: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            alias: table.clone(),
            from: table,
            ..Self::default()
        }
    }
}

/// One SET term of an update statement.
///
/// `Add` is the atomic in-place arithmetic used by `Record::increment`; it
/// must reach the store as an expression, not a read-modify-write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Assign {
    Set(String, Value),
    Add(String, Value),
}

/// The store handle a model holds.
///
/// Implementations execute against a real connection; the in-crate
/// [`MemoryStore`](crate::fake::MemoryStore) interprets the same data
/// structures for tests. Transactions are flat: one `begin` per scope.
pub trait Store {
    fn begin(&self) -> StoreResult<()>;
    fn commit(&self) -> StoreResult<()>;
    fn rollback(&self) -> StoreResult<()>;

    fn insert(&self, table: &str, row: &Row) -> StoreResult<u64>;
    fn update(&self, table: &str, assigns: &[Assign], conds: &[Condition]) -> StoreResult<u64>;
    fn delete(&self, table: &str, conds: &[Condition]) -> StoreResult<u64>;

    fn query(&self, select: &Select) -> StoreResult<Vec<Row>>;
    fn fetch_value(&self, select: &Select) -> StoreResult<Value>;

    fn last_insert_id(&self, table: &str, col: &str) -> StoreResult<Value>;
    fn next_sequence(&self, name: &str) -> StoreResult<Value>;
}

/// Numeric interpretation of a value, when it has one.
///
/// Store round-trips coerce types (integer columns come back as numeric
/// strings on some drivers), so equality over store values must treat
/// `5` and `"5"` as the same thing.
pub fn numeric_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let first = s.chars().next()?;
            if first.is_ascii_digit() || first == '-' || first == '+' || first == '.' {
                s.parse::<f64>().ok()
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Loose equality over store values: numeric by value, otherwise strict.
/// Null only ever equals null.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    if a.is_null() || b.is_null() {
        return a.is_null() && b.is_null();
    }
    match (numeric_of(a), numeric_of(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// A row as a JSON object value, for attaching eager results to native
/// rows and for caching fetch results.
pub fn row_to_value(row: &Row) -> Value {
    Value::Object(row.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

/// A map key for collating rows by a column value, consistent with
/// [`loose_eq`]: `1` and `"1"` collate together.
pub fn collate_key(value: &Value) -> String {
    if value.is_null() {
        return "\u{0}null".to_string();
    }
    match numeric_of(value) {
        Some(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => format!("{}", n as i64),
        Some(n) => format!("{}", n),
        None => match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn loose_eq_is_numeric_aware() {
        assert!(loose_eq(&json!(5), &json!("5")));
        assert!(loose_eq(&json!("1.50"), &json!(1.5)));
        assert!(!loose_eq(&json!(5), &json!("5a")));
        assert!(!loose_eq(&json!(null), &json!("")));
        assert!(loose_eq(&json!(null), &json!(null)));
    }

    #[test]
    fn numeric_of_rejects_non_literal_strings() {
        assert_eq!(numeric_of(&json!("nan")), None);
        assert_eq!(numeric_of(&json!("inf")), None);
        assert_eq!(numeric_of(&json!("")), None);
        assert_eq!(numeric_of(&json!("-3")), Some(-3.0));
    }

    #[test]
    fn collate_keys_fold_coerced_numbers() {
        assert_eq!(collate_key(&json!(1)), collate_key(&json!("1")));
        assert_ne!(collate_key(&json!(null)), collate_key(&json!("null")));
    }

    #[test]
    fn select_defaults_alias_to_table() {
        let sel = Select::from_table("authors");
        assert_eq!(sel.alias, "authors");
        assert!(sel.cols.is_empty());
    }
}
