//! Fetch and eager-fetch parameter trees
//!
//! A [`FetchParams`] describes one fetch plan: projection, conditions,
//! ordering, paging, caching, and a map of relation name to nested
//! [`EagerParams`]. The tree is fully owned, so `Clone` is a recursive deep
//! copy and two plans never share mutable sub-objects.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::relationships::{Merge, NativeBy};
use crate::store::{Condition, JoinType, OrderBy};

/// Page selection: 1-based page number over a fixed page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub size: usize,
    pub number: usize,
}

/// Pager metadata attached to a paged fetch result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PagerInfo {
    /// Total rows across all pages.
    pub count: u64,
    /// Total page count.
    pub pages: u64,
    /// Rows per page.
    pub paging: usize,
    /// Current 1-based page.
    pub page: usize,
    /// 1-based row number of the first row on this page, 0 when empty.
    pub begin: u64,
    /// 1-based row number of the last row on this page.
    pub end: u64,
}

impl PagerInfo {
    pub fn compute(count: u64, page: Page) -> Self {
        let paging = page.size.max(1);
        let pages = count.div_ceil(paging as u64);
        let number = page.number.max(1);
        let begin = if count == 0 {
            0
        } else {
            ((number as u64 - 1) * paging as u64 + 1).min(count)
        };
        let end = (number as u64 * paging as u64).min(count);
        Self {
            count,
            pages,
            paging,
            page: number,
            begin,
            end,
        }
    }
}

/// Configuration for one fetch.
#[derive(Debug, Clone, Serialize)]
pub struct FetchParams {
    pub cols: Vec<String>,
    pub conds: Vec<Condition>,
    pub order: Vec<OrderBy>,
    pub page: Option<Page>,
    pub eager: HashMap<String, EagerParams>,
    pub cache: bool,
    pub cache_key: Option<String>,
    pub count_pages: bool,
}

impl Default for FetchParams {
    fn default() -> Self {
        Self {
            cols: Vec::new(),
            conds: Vec::new(),
            order: Vec::new(),
            page: None,
            eager: HashMap::new(),
            cache: true,
            cache_key: None,
            count_pages: false,
        }
    }
}

impl FetchParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union new columns into the projection, deduplicated, order preserved.
    pub fn cols<I, S>(mut self, cols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for col in cols {
            let col = col.into();
            if !self.cols.contains(&col) {
                self.cols.push(col);
            }
        }
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

    pub fn page(mut self, size: usize, number: usize) -> Self {
        self.page = Some(Page { size, number });
        self
    }

    pub fn count_pages(mut self, count: bool) -> Self {
        self.count_pages = count;
        self
    }

    pub fn cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    /// Nested eager params for `name`, created empty on first reference.
    pub fn eager(&mut self, name: &str) -> &mut EagerParams {
        self.eager.entry(name.to_string()).or_default()
    }

    /// Accumulate `opts` into the eager entry for `name`. Repeated calls
    /// merge rather than replace.
    pub fn eager_with(mut self, name: &str, opts: EagerParams) -> Self {
        self.eager.entry(name.to_string()).or_default().merge(opts);
        self
    }

    /// Cache fingerprint: hash of the canonicalized plan with the
    /// cache-irrelevant fields stripped. Key order and projection order do
    /// not affect the result.
    pub fn fingerprint(&self) -> String {
        let mut plan = self.clone();
        plan.cols.sort();
        sort_eager_cols(&mut plan.eager);
        let mut value = serde_json::to_value(&plan).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.remove("cache");
            map.remove("cache_key");
            map.remove("count_pages");
        }
        let bytes = serde_json::to_vec(&value).unwrap_or_default();
        hex::encode(blake3::hash(&bytes).as_bytes())
    }
}

fn sort_eager_cols(eager: &mut HashMap<String, EagerParams>) {
    for params in eager.values_mut() {
        params.cols.sort();
        sort_eager_cols(&mut params.eager);
    }
}

/// Configuration for one eagerly-fetched relation, nested under a
/// [`FetchParams`] (or another `EagerParams`).
#[derive(Debug, Clone, Default, Serialize)]
pub struct EagerParams {
    pub cols: Vec<String>,
    pub conds: Vec<Condition>,
    pub order: Vec<OrderBy>,
    pub eager: HashMap<String, EagerParams>,
    pub merge: Option<Merge>,
    pub native_by: Option<NativeBy>,
    pub wherein_max: Option<usize>,
    pub join_type: Option<JoinType>,
    pub join_only: bool,
}

impl EagerParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union new columns into the projection, deduplicated.
    ///
    /// Eager params are usually reached through [`FetchParams::eager`], so
    /// the builder methods here chain on `&mut self` rather than by value.
    pub fn cols<I, S>(&mut self, cols: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for col in cols {
            let col = col.into();
            if !self.cols.contains(&col) {
                self.cols.push(col);
            }
        }
        self
    }

    pub fn cond(&mut self, cond: Condition) -> &mut Self {
        self.conds.push(cond);
        self
    }

    pub fn order(&mut self, order: OrderBy) -> &mut Self {
        self.order.push(order);
        self
    }

    pub fn merge_strategy(&mut self, merge: Merge) -> &mut Self {
        self.merge = Some(merge);
        self
    }

    pub fn native_by(&mut self, native_by: NativeBy) -> &mut Self {
        self.native_by = Some(native_by);
        self
    }

    pub fn wherein_max(&mut self, max: usize) -> &mut Self {
        self.wherein_max = Some(max);
        self
    }

    pub fn join_only(&mut self, join_only: bool) -> &mut Self {
        self.join_only = join_only;
        self
    }

    pub fn eager(&mut self, name: &str) -> &mut EagerParams {
        self.eager.entry(name.to_string()).or_default()
    }

    /// Fold `other` into self: columns union, conditions and order append,
    /// nested eager entries merge recursively, options fill in when unset.
    pub fn merge(&mut self, other: EagerParams) {
        for col in other.cols {
            if !self.cols.contains(&col) {
                self.cols.push(col);
            }
        }
        self.conds.extend(other.conds);
        self.order.extend(other.order);
        for (name, nested) in other.eager {
            self.eager.entry(name).or_default().merge(nested);
        }
        self.merge = self.merge.or(other.merge);
        self.native_by = self.native_by.or(other.native_by);
        self.wherein_max = self.wherein_max.or(other.wherein_max);
        self.join_type = self.join_type.or(other.join_type);
        self.join_only = self.join_only || other.join_only;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cols_union_deduplicates() {
        let params = FetchParams::new()
            .cols(["id", "name"])
            .cols(["name", "email"]);
        assert_eq!(params.cols, vec!["id", "name", "email"]);
    }

    #[test]
    fn eager_accumulates_instead_of_replacing() {
        let mut params = FetchParams::new();
        params.eager("posts").cols(["title"]);
        let mut opts = EagerParams::new();
        opts.cols(["body"]).wherein_max(5);
        let params = params.eager_with("posts", opts);
        let posts = &params.eager["posts"];
        assert_eq!(posts.cols, vec!["title", "body"]);
        assert_eq!(posts.wherein_max, Some(5));
    }

    #[test]
    fn clone_is_a_deep_copy() {
        let mut original = FetchParams::new();
        original.eager("posts").eager("comments");

        let mut copy = original.clone();
        copy.eager("posts")
            .cols(["body"])
            .cond(Condition::eq("live", json!(1)));
        copy.eager("posts").eager("comments").cols(["text"]);

        let posts = &original.eager["posts"];
        assert!(posts.cols.is_empty());
        assert!(posts.conds.is_empty());
        assert!(posts.eager["comments"].cols.is_empty());
    }

    #[test]
    fn fingerprint_ignores_projection_order_and_cache_fields() {
        let a = FetchParams::new().cols(["id", "name"]).cache(false);
        let b = FetchParams::new()
            .cols(["name", "id"])
            .cache(true)
            .cache_key("explicit")
            .count_pages(true);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_tracks_material_differences() {
        let a = FetchParams::new().cond(Condition::eq("id", json!(1)));
        let b = FetchParams::new().cond(Condition::eq("id", json!(2)));
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn pager_math_covers_edges() {
        let info = PagerInfo::compute(
            7,
            Page {
                size: 3,
                number: 3,
            },
        );
        assert_eq!(info.pages, 3);
        assert_eq!(info.begin, 7);
        assert_eq!(info.end, 7);

        let empty = PagerInfo::compute(
            0,
            Page {
                size: 10,
                number: 1,
            },
        );
        assert_eq!(empty.pages, 0);
        assert_eq!(empty.begin, 0);
        assert_eq!(empty.end, 0);
    }
}
