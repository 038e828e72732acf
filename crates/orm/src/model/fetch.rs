//! Model fetch surface
//!
//! Builds select descriptions from fetch params, consults the versioned
//! cache, folds server-merge relations into the native select as joins,
//! and stitches client-merge relations in with the eager engine.

use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::collection::Collection;
use crate::error::OrmResult;
use crate::fetch::{EagerParams, FetchParams, Page, PagerInfo};
use crate::record::Record;
use crate::relationships::{Cardinality, Merge, Relationship};
use crate::store::{numeric_of, row_to_value, Join, JoinTarget, JoinType, Row, Select};

use super::Model;

impl Model {
    /// Translate fetch params into a select plus the list of client-merge
    /// eager relations to resolve after the native query runs.
    pub(crate) fn build_select(
        &self,
        params: &FetchParams,
    ) -> OrmResult<(Select, Vec<(Rc<Relationship>, EagerParams)>)> {
        let spec = self.spec();
        let mut select = Select::from_table(spec.table_name());

        let mut cols: Vec<String> = if params.cols.is_empty() {
            spec.table_cols().map(String::from).collect()
        } else {
            params.cols.clone()
        };
        if !cols.iter().any(|c| c == spec.primary_col()) {
            cols.insert(0, spec.primary_col().to_string());
        }
        if let Some(inherit) = spec.inherit() {
            if !cols.iter().any(|c| c == inherit) {
                cols.push(inherit.to_string());
            }
        }

        select.conds = spec.base_conditions().to_vec();
        select.conds.extend(params.conds.iter().cloned());
        select.order = params.order.clone();
        if let Some(page) = params.page {
            let size = page.size.max(1);
            select.limit = Some(size);
            select.offset = Some(size * (page.number.max(1) - 1));
        }

        let mut client = Vec::new();
        let mut names: Vec<&String> = params.eager.keys().collect();
        names.sort();
        for name in names {
            let ep = &params.eager[name.as_str()];
            let rel = self.relationship(name)?;
            let mut merge = ep.merge.unwrap_or(rel.merge());
            if merge == Merge::Server && rel.cardinality() == Cardinality::Many {
                warn!(
                    relation = %name,
                    "server merge is only defined for to-one relations; using client merge"
                );
                merge = Merge::Client;
            }
            let join_type = ep.join_type.unwrap_or(rel.join_type());
            let server = merge == Merge::Server;
            let join_only = ep.join_only || rel.is_join_only();
            // inner joins always participate, even when nothing of theirs
            // is projected; they carry WHERE semantics
            let participates = server || join_only || join_type == JoinType::Inner;
            if participates {
                let join_cols = if server && !join_only {
                    rel.join_cols(ep)
                } else {
                    Vec::new()
                };
                select.joins.push(Join {
                    join_type,
                    target: JoinTarget::Table(rel.foreign_table().to_string()),
                    alias: rel.foreign_alias().to_string(),
                    on: (
                        rel.native_col().to_string(),
                        rel.foreign_col().to_string(),
                    ),
                    conds: rel.extra_conds(),
                    cols: join_cols,
                });
            }
            if !server {
                if !cols.iter().any(|c| c == rel.native_col()) {
                    cols.push(rel.native_col().to_string());
                }
                client.push((rel, ep.clone()));
            }
        }

        select.cols = cols;
        Ok((select, client))
    }

    /// Raw rows for a fetch plan, with client-merge eager relations
    /// already stitched in.
    pub(crate) fn fetch_rows(
        &self,
        params: &FetchParams,
        extra_joins: Vec<Join>,
    ) -> OrmResult<Vec<Row>> {
        let (mut select, client) = self.build_select(params)?;
        select.joins.extend(extra_joins);
        let mut rows = self.store().query(&select)?;
        debug!(model = %self.name(), rows = rows.len(), "fetched");
        for (rel, ep) in &client {
            rel.eager_fetch_into(&mut rows, ep, &select)?;
        }
        Ok(rows)
    }

    /// Fetch a collection of rows, consulting the versioned cache when the
    /// model has caching enabled and the params allow it.
    pub fn fetch_all(&self, params: &FetchParams) -> OrmResult<Collection> {
        let use_cache = self.spec().cache_enabled() && params.cache;
        let cache_key = if use_cache {
            Some(self.cache().entry(params))
        } else {
            None
        };

        if let Some(key) = &cache_key {
            if let Some(hit) = self.cache().fetch(key) {
                if let Some((rows, total)) = decode_cached(hit) {
                    let pager = pager_for(total, params);
                    return Ok(Collection::from_rows(&self.handle()?, rows, pager));
                }
            }
        }

        let rows = self.fetch_rows(params, Vec::new())?;
        let total = if params.count_pages {
            Some(self.fetch_count(params)?)
        } else {
            None
        };
        if let Some(key) = &cache_key {
            self.cache().add(key, encode_cached(&rows, total));
        }
        let pager = pager_for(total, params);
        Ok(Collection::from_rows(&self.handle()?, rows, pager))
    }

    /// Fetch a single record, or `None`. The row's inheritance value
    /// selects the concrete record type.
    pub fn fetch_one(&self, params: &FetchParams) -> OrmResult<Option<Record>> {
        let mut params = params.clone();
        params.page = Some(Page { size: 1, number: 1 });
        params.count_pages = false;
        let rows = self.fetch_rows(&params, Vec::new())?;
        match rows.into_iter().next() {
            Some(row) => {
                let concrete = self.model_for_row(&row)?;
                Ok(Some(Record::from_row(&concrete, row)?))
            }
            None => Ok(None),
        }
    }

    /// Row count for a fetch plan, ignoring paging and ordering. Joins are
    /// kept: an inner-joined relation restricts the count.
    pub fn fetch_count(&self, params: &FetchParams) -> OrmResult<u64> {
        let mut params = params.clone();
        params.page = None;
        let (mut select, _client) = self.build_select(&params)?;
        select.limit = None;
        select.offset = None;
        select.order.clear();
        select.count_only = true;
        for join in &mut select.joins {
            join.cols.clear();
        }
        let value = self.store().fetch_value(&select)?;
        Ok(numeric_of(&value).map(|n| n as u64).unwrap_or(0))
    }
}

fn pager_for(total: Option<u64>, params: &FetchParams) -> Option<PagerInfo> {
    match (total, params.page) {
        (Some(count), Some(page)) => Some(PagerInfo::compute(count, page)),
        (Some(count), None) => Some(PagerInfo::compute(
            count,
            Page {
                size: count.max(1) as usize,
                number: 1,
            },
        )),
        _ => None,
    }
}

fn encode_cached(rows: &[Row], total: Option<u64>) -> Value {
    let mut map = serde_json::Map::new();
    map.insert(
        "rows".to_string(),
        Value::Array(rows.iter().map(row_to_value).collect()),
    );
    map.insert(
        "total".to_string(),
        total.map(Value::from).unwrap_or(Value::Null),
    );
    Value::Object(map)
}

fn decode_cached(value: Value) -> Option<(Vec<Row>, Option<u64>)> {
    let Value::Object(mut map) = value else {
        return None;
    };
    let Some(Value::Array(items)) = map.remove("rows") else {
        return None;
    };
    let rows: Vec<Row> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(obj) => Some(obj.into_iter().collect()),
            _ => None,
        })
        .collect();
    let total = map.remove("total").and_then(|v| v.as_u64());
    Some((rows, total))
}
