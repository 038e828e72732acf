//! In-memory store fake
//!
//! Interprets the same select/condition/join structures a real store
//! adapter would render as SQL, against plain in-memory tables. Used by
//! the crate's own tests and available to downstream test suites. Counts
//! top-level queries and logs update payloads so tests can assert on
//! query mechanics, and can be told to fail the next write to exercise
//! store-fault paths.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::store::{
    loose_eq, numeric_of, Assign, Condition, Join, JoinTarget, JoinType, OrderDirection,
    QueryOperator, Row, Select, Store,
};

#[derive(Default)]
pub struct MemoryStore {
    tables: RefCell<HashMap<String, Vec<Row>>>,
    autoinc_cols: RefCell<HashMap<String, String>>,
    autoinc_next: RefCell<HashMap<String, i64>>,
    last_ids: RefCell<HashMap<String, Value>>,
    sequences: RefCell<HashMap<String, i64>>,
    snapshot: RefCell<Option<HashMap<String, Vec<Row>>>>,
    query_count: Cell<usize>,
    update_log: RefCell<Vec<Vec<String>>>,
    fail_next_write: Cell<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a table, optionally with an autoincrementing column that is
    /// filled in when an insert leaves it unset.
    pub fn create_table(&self, name: &str, autoinc_col: Option<&str>) {
        self.tables.borrow_mut().entry(name.to_string()).or_default();
        if let Some(col) = autoinc_col {
            self.autoinc_cols
                .borrow_mut()
                .insert(name.to_string(), col.to_string());
        }
    }

    /// Seed rows directly, keeping the autoincrement counter ahead of any
    /// seeded ids.
    pub fn seed(&self, table: &str, rows: Vec<Row>) {
        if let Some(col) = self.autoinc_cols.borrow().get(table) {
            let mut next = self.autoinc_next.borrow_mut();
            let counter = next.entry(table.to_string()).or_insert(1);
            for row in &rows {
                if let Some(id) = row.get(col).and_then(Value::as_i64) {
                    if id >= *counter {
                        *counter = id + 1;
                    }
                }
            }
        }
        self.tables
            .borrow_mut()
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables.borrow().get(table).cloned().unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables.borrow().get(table).map_or(0, Vec::len)
    }

    /// Number of top-level queries issued so far. Sub-selects evaluated
    /// inside a join do not count; they ride along in the same statement.
    pub fn query_count(&self) -> usize {
        self.query_count.get()
    }

    /// Column names of every UPDATE issued, in order.
    pub fn update_log(&self) -> Vec<Vec<String>> {
        self.update_log.borrow().clone()
    }

    /// Make the next insert/update/delete fail with an execution error.
    pub fn fail_next_write(&self) {
        self.fail_next_write.set(true);
    }

    pub fn in_transaction(&self) -> bool {
        self.snapshot.borrow().is_some()
    }

    fn check_write(&self) -> StoreResult<()> {
        if self.fail_next_write.take() {
            Err(StoreError::Execution("forced write failure".into()))
        } else {
            Ok(())
        }
    }

    fn matches(row: &Row, conds: &[Condition]) -> bool {
        conds.iter().all(|cond| {
            let actual = row.get(&cond.column).cloned().unwrap_or(Value::Null);
            let operand = cond.value.clone().unwrap_or(Value::Null);
            match cond.operator {
                QueryOperator::Equal => loose_eq(&actual, &operand),
                QueryOperator::NotEqual => !loose_eq(&actual, &operand),
                QueryOperator::In => cond.values.iter().any(|v| loose_eq(&actual, v)),
                QueryOperator::NotIn => !cond.values.iter().any(|v| loose_eq(&actual, v)),
                QueryOperator::IsNull => actual.is_null(),
                QueryOperator::IsNotNull => !actual.is_null(),
                QueryOperator::GreaterThan => {
                    cmp_values(&actual, &operand) == Ordering::Greater
                }
                QueryOperator::GreaterThanOrEqual => {
                    cmp_values(&actual, &operand) != Ordering::Less
                }
                QueryOperator::LessThan => cmp_values(&actual, &operand) == Ordering::Less,
                QueryOperator::LessThanOrEqual => {
                    cmp_values(&actual, &operand) != Ordering::Greater
                }
                QueryOperator::Like => like_match(&actual, &operand),
            }
        })
    }

    fn run_select(&self, select: &Select) -> StoreResult<Vec<Row>> {
        let base = self
            .tables
            .borrow()
            .get(&select.from)
            .cloned()
            .unwrap_or_default();

        let mut rows: Vec<Row> = Vec::new();
        'base: for mut row in base {
            for join in &select.joins {
                let mut target_rows = match &join.target {
                    JoinTarget::Table(name) => {
                        self.tables.borrow().get(name).cloned().unwrap_or_default()
                    }
                    JoinTarget::Subquery(sub) => self.run_select(sub)?,
                };
                target_rows.retain(|t| Self::matches(t, &join.conds));
                let left = row.get(&join.on.0).cloned().unwrap_or(Value::Null);
                let matched = if left.is_null() {
                    None
                } else {
                    target_rows
                        .into_iter()
                        .find(|t| loose_eq(t.get(&join.on.1).unwrap_or(&Value::Null), &left))
                };
                match matched {
                    Some(target) => {
                        for (col, alias) in &join.cols {
                            row.insert(
                                alias.clone(),
                                target.get(col).cloned().unwrap_or(Value::Null),
                            );
                        }
                    }
                    None => match join.join_type {
                        JoinType::Inner => continue 'base,
                        JoinType::Left => {
                            for (_, alias) in &join.cols {
                                row.insert(alias.clone(), Value::Null);
                            }
                        }
                    },
                }
            }
            if Self::matches(&row, &select.conds) {
                rows.push(row);
            }
        }

        if !select.order.is_empty() {
            rows.sort_by(|a, b| {
                for term in &select.order {
                    let left = a.get(&term.column).cloned().unwrap_or(Value::Null);
                    let right = b.get(&term.column).cloned().unwrap_or(Value::Null);
                    let ord = match term.direction {
                        OrderDirection::Asc => cmp_values(&left, &right),
                        OrderDirection::Desc => cmp_values(&right, &left),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let offset = select.offset.unwrap_or(0);
        let limit = select.limit.unwrap_or(usize::MAX);
        let rows: Vec<Row> = rows.into_iter().skip(offset).take(limit).collect();

        if select.cols.is_empty() {
            return Ok(rows);
        }
        Ok(rows
            .into_iter()
            .map(|row| {
                let mut out = Row::new();
                for col in &select.cols {
                    out.insert(col.clone(), row.get(col).cloned().unwrap_or(Value::Null));
                }
                for join in &select.joins {
                    for (_, alias) in &join.cols {
                        out.insert(alias.clone(), row.get(alias).cloned().unwrap_or(Value::Null));
                    }
                }
                out
            })
            .collect())
    }
}

impl Store for MemoryStore {
    fn begin(&self) -> StoreResult<()> {
        *self.snapshot.borrow_mut() = Some(self.tables.borrow().clone());
        Ok(())
    }

    fn commit(&self) -> StoreResult<()> {
        self.snapshot
            .borrow_mut()
            .take()
            .map(|_| ())
            .ok_or(StoreError::NoTransaction)
    }

    fn rollback(&self) -> StoreResult<()> {
        let snapshot = self
            .snapshot
            .borrow_mut()
            .take()
            .ok_or(StoreError::NoTransaction)?;
        *self.tables.borrow_mut() = snapshot;
        Ok(())
    }

    fn insert(&self, table: &str, row: &Row) -> StoreResult<u64> {
        self.check_write()?;
        let mut row = row.clone();
        if let Some(col) = self.autoinc_cols.borrow().get(table).cloned() {
            let explicit = row.get(&col).and_then(Value::as_i64);
            let mut next = self.autoinc_next.borrow_mut();
            let counter = next.entry(table.to_string()).or_insert(1);
            match explicit {
                Some(id) => {
                    if id >= *counter {
                        *counter = id + 1;
                    }
                    self.last_ids
                        .borrow_mut()
                        .insert(table.to_string(), Value::from(id));
                }
                None => {
                    let id = *counter;
                    *counter += 1;
                    row.insert(col, Value::from(id));
                    self.last_ids
                        .borrow_mut()
                        .insert(table.to_string(), Value::from(id));
                }
            }
        }
        self.tables
            .borrow_mut()
            .entry(table.to_string())
            .or_default()
            .push(row);
        Ok(1)
    }

    fn update(&self, table: &str, assigns: &[Assign], conds: &[Condition]) -> StoreResult<u64> {
        self.check_write()?;
        self.update_log.borrow_mut().push(
            assigns
                .iter()
                .map(|a| match a {
                    Assign::Set(col, _) | Assign::Add(col, _) => col.clone(),
                })
                .collect(),
        );
        let mut tables = self.tables.borrow_mut();
        let rows = tables.entry(table.to_string()).or_default();
        let mut affected = 0;
        for row in rows.iter_mut() {
            if !Self::matches(row, conds) {
                continue;
            }
            for assign in assigns {
                match assign {
                    Assign::Set(col, value) => {
                        row.insert(col.clone(), value.clone());
                    }
                    Assign::Add(col, amount) => {
                        let current = row.get(col).and_then(|v| numeric_of(v)).unwrap_or(0.0);
                        let delta = numeric_of(amount).unwrap_or(0.0);
                        let sum = current + delta;
                        let value = if sum.fract() == 0.0 {
                            Value::from(sum as i64)
                        } else {
                            Value::from(sum)
                        };
                        row.insert(col.clone(), value);
                    }
                }
            }
            affected += 1;
        }
        Ok(affected)
    }

    fn delete(&self, table: &str, conds: &[Condition]) -> StoreResult<u64> {
        self.check_write()?;
        let mut tables = self.tables.borrow_mut();
        let rows = tables.entry(table.to_string()).or_default();
        let before = rows.len();
        rows.retain(|row| !Self::matches(row, conds));
        Ok((before - rows.len()) as u64)
    }

    fn query(&self, select: &Select) -> StoreResult<Vec<Row>> {
        self.query_count.set(self.query_count.get() + 1);
        self.run_select(select)
    }

    fn fetch_value(&self, select: &Select) -> StoreResult<Value> {
        self.query_count.set(self.query_count.get() + 1);
        let rows = self.run_select(select)?;
        if select.count_only {
            return Ok(Value::from(rows.len() as u64));
        }
        let Some(row) = rows.into_iter().next() else {
            return Ok(Value::Null);
        };
        let col = select.cols.first().cloned().unwrap_or_default();
        Ok(row.get(&col).cloned().unwrap_or(Value::Null))
    }

    fn last_insert_id(&self, table: &str, _col: &str) -> StoreResult<Value> {
        self.last_ids
            .borrow()
            .get(table)
            .cloned()
            .ok_or_else(|| StoreError::Execution(format!("no insert id for table '{}'", table)))
    }

    fn next_sequence(&self, name: &str) -> StoreResult<Value> {
        let mut sequences = self.sequences.borrow_mut();
        let counter = sequences.entry(name.to_string()).or_insert(0);
        *counter += 1;
        Ok(Value::from(*counter))
    }
}

fn cmp_values(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        (false, false) => {}
    }
    match (numeric_of(a), numeric_of(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => value_text(a).cmp(&value_text(b)),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Minimal `%`-wildcard matcher: the pattern's literal chunks must appear
/// in order, anchored at the ends unless `%` frees them.
fn like_match(actual: &Value, pattern: &Value) -> bool {
    let text = value_text(actual);
    let pattern = value_text(pattern);
    let chunks: Vec<&str> = pattern.split('%').collect();
    let mut pos = 0;
    for (i, chunk) in chunks.iter().enumerate() {
        if chunk.is_empty() {
            continue;
        }
        match text[pos..].find(chunk) {
            Some(found) => {
                if i == 0 && found != 0 {
                    return false;
                }
                pos += found + chunk.len();
            }
            None => return false,
        }
    }
    if !pattern.ends_with('%') {
        if let Some(last) = chunks.last() {
            if !last.is_empty() && !text.ends_with(last) {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn insert_fills_autoincrement_and_remembers_it() {
        let store = MemoryStore::new();
        store.create_table("authors", Some("id"));
        store.insert("authors", &row(&[("name", json!("Pat"))])).unwrap();
        assert_eq!(store.last_insert_id("authors", "id").unwrap(), json!(1));
        store
            .insert("authors", &row(&[("id", json!(9)), ("name", json!("Sam"))]))
            .unwrap();
        store.insert("authors", &row(&[("name", json!("Kim"))])).unwrap();
        assert_eq!(store.last_insert_id("authors", "id").unwrap(), json!(10));
    }

    #[test]
    fn query_filters_orders_and_pages() {
        let store = MemoryStore::new();
        store.create_table("posts", Some("id"));
        store.seed(
            "posts",
            vec![
                row(&[("id", json!(1)), ("score", json!(5))]),
                row(&[("id", json!(2)), ("score", json!(9))]),
                row(&[("id", json!(3)), ("score", json!(7))]),
            ],
        );
        let mut select = Select::from_table("posts");
        select.conds = vec![Condition::cmp("score", QueryOperator::GreaterThan, json!(5))];
        select.order = vec![crate::store::OrderBy::desc("score")];
        select.limit = Some(1);
        let rows = store.query(&select).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], json!(2));
    }

    #[test]
    fn inner_join_against_subquery_filters_base_rows() {
        let store = MemoryStore::new();
        store.create_table("posts", Some("id"));
        store.create_table("authors", Some("id"));
        store.seed(
            "authors",
            vec![row(&[("id", json!(1))]), row(&[("id", json!(2))])],
        );
        store.seed(
            "posts",
            vec![
                row(&[("id", json!(10)), ("author_id", json!(1))]),
                row(&[("id", json!(11)), ("author_id", json!(3))]),
            ],
        );
        let mut sub = Select::from_table("authors");
        sub.cols = vec!["id".to_string()];
        let mut select = Select::from_table("posts");
        select.joins = vec![Join {
            join_type: JoinType::Inner,
            target: JoinTarget::Subquery(Box::new(sub)),
            alias: "scope".to_string(),
            on: ("author_id".to_string(), "id".to_string()),
            conds: Vec::new(),
            cols: Vec::new(),
        }];
        let rows = store.query(&select).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], json!(10));
        // the subquery rode along inside one statement
        assert_eq!(store.query_count(), 1);
    }

    #[test]
    fn rollback_restores_the_snapshot() {
        let store = MemoryStore::new();
        store.create_table("authors", Some("id"));
        store.seed("authors", vec![row(&[("id", json!(1))])]);
        store.begin().unwrap();
        store.insert("authors", &row(&[("name", json!("gone"))])).unwrap();
        store.rollback().unwrap();
        assert_eq!(store.row_count("authors"), 1);
        assert!(matches!(store.commit(), Err(StoreError::NoTransaction)));
    }

    #[test]
    fn add_assign_is_arithmetic() {
        let store = MemoryStore::new();
        store.create_table("posts", Some("id"));
        store.seed("posts", vec![row(&[("id", json!(1)), ("hits", json!(4))])]);
        store
            .update(
                "posts",
                &[Assign::Add("hits".to_string(), json!(3))],
                &[Condition::eq("id", json!(1))],
            )
            .unwrap();
        assert_eq!(store.rows("posts")[0]["hits"], json!(7));
    }

    #[test]
    fn like_matching_handles_wildcards() {
        assert!(like_match(&json!("hello world"), &json!("hello%")));
        assert!(like_match(&json!("hello world"), &json!("%world")));
        assert!(like_match(&json!("hello world"), &json!("%lo wo%")));
        assert!(!like_match(&json!("hello world"), &json!("world%")));
    }
}
