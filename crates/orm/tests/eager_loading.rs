//! End-to-end eager loading over the in-memory store fake
//!
//! Three authors, three posts, a `many` relationship with a wherein_max of
//! two: resolving the relation for the whole page must cost exactly one
//! extra query and leave no author without a posts value.

use std::rc::Rc;

use serde_json::{json, Value};

use helios_orm::fake::MemoryStore;
use helios_orm::{
    Catalog, ColumnSpec, ColumnType, Condition, FetchParams, ModelSpec, OrderBy, RelationshipDef,
    Row, SaveOutcome,
};

fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn build_catalog() -> (Rc<Catalog>, Rc<MemoryStore>) {
    let store = Rc::new(MemoryStore::new());
    store.create_table("authors", Some("id"));
    store.create_table("posts", Some("id"));

    let catalog = Catalog::new(store.clone());
    catalog.push_stack("App");
    catalog.register(
        "App_Author",
        ModelSpec::new("author")
            .col(ColumnSpec::pk("id"))
            .col(ColumnSpec::new("name", ColumnType::Str))
            .relate(
                "posts",
                RelationshipDef::has_many()
                    .foreign_model("post")
                    .wherein_max(2),
            ),
    );
    catalog.register(
        "App_Post",
        ModelSpec::new("post")
            .col(ColumnSpec::pk("id"))
            .col(ColumnSpec::new("author_id", ColumnType::Int))
            .col(ColumnSpec::new("title", ColumnType::Str))
            .relate("author", RelationshipDef::belongs_to().foreign_model("author")),
    );

    store.seed(
        "authors",
        vec![
            row(&[("id", json!(1)), ("name", json!("Pat"))]),
            row(&[("id", json!(2)), ("name", json!("Sam"))]),
            row(&[("id", json!(3)), ("name", json!("Kim"))]),
        ],
    );
    store.seed(
        "posts",
        vec![
            row(&[("id", json!(1)), ("author_id", json!(1)), ("title", json!("A"))]),
            row(&[("id", json!(2)), ("author_id", json!(1)), ("title", json!("B"))]),
            row(&[("id", json!(3)), ("author_id", json!(3)), ("title", json!("C"))]),
        ],
    );

    (catalog, store)
}

#[test]
fn three_authors_cost_one_relationship_query() {
    let (catalog, store) = build_catalog();
    let authors = catalog.model("author").unwrap();

    let mut params = FetchParams::new().order(OrderBy::asc("id"));
    params.eager("posts").order(OrderBy::asc("id"));

    let before = store.query_count();
    let mut collection = authors.fetch_all(&params).unwrap();
    // one native query plus exactly one relationship query, despite the
    // page size being over the wherein threshold
    assert_eq!(store.query_count(), before + 2);

    assert_eq!(collection.len(), 3);
    let expected: Vec<Vec<Value>> = vec![
        vec![json!("A"), json!("B")],
        Vec::new(),
        vec![json!("C")],
    ];
    for (offset, titles) in expected.iter().enumerate() {
        let record = collection.get(offset).unwrap();
        // every author got a posts value, matched or explicitly empty
        let posts = record
            .related_loaded("posts")
            .expect("posts must be attached for every author")
            .as_collection()
            .unwrap();
        assert_eq!(&posts.col_vals("title"), titles);
    }
}

#[test]
fn eager_loading_respects_paging() {
    let (catalog, _store) = build_catalog();
    let authors = catalog.model("author").unwrap();

    let mut params = FetchParams::new()
        .order(OrderBy::asc("id"))
        .page(2, 1)
        .count_pages(true);
    params.eager("posts").order(OrderBy::asc("id"));

    let mut collection = authors.fetch_all(&params).unwrap();
    assert_eq!(collection.len(), 2);

    let pager = collection.pager().copied().unwrap();
    assert_eq!(pager.count, 3);
    assert_eq!(pager.pages, 2);
    assert_eq!(pager.begin, 1);
    assert_eq!(pager.end, 2);

    let first = collection.get(0).unwrap();
    let posts = first.related_loaded("posts").unwrap().as_collection().unwrap();
    assert_eq!(posts.len(), 2);
}

#[test]
fn saving_an_author_cascades_to_materialized_posts() {
    let (catalog, store) = build_catalog();
    let authors = catalog.model("author").unwrap();

    let mut author = authors
        .fetch_one(&FetchParams::new().cond(Condition::eq("id", json!(1))))
        .unwrap()
        .unwrap();

    {
        let posts = author
            .related("posts")
            .unwrap()
            .as_collection_mut()
            .unwrap();
        posts.append_new(row(&[("title", json!("New post"))])).unwrap();
    }

    assert_eq!(author.save(None).unwrap(), SaveOutcome::Saved);
    assert_eq!(store.row_count("posts"), 4);
    let added = store
        .rows("posts")
        .into_iter()
        .find(|r| r.get("title") == Some(&json!("New post")))
        .unwrap();
    // the has-many save stamped the native key onto the new row
    assert_eq!(added["author_id"], json!(1));
}

#[test]
fn lazy_and_eager_resolution_agree() {
    let (catalog, _store) = build_catalog();
    let authors = catalog.model("author").unwrap();

    let mut params = FetchParams::new().order(OrderBy::asc("id"));
    params.eager("posts").order(OrderBy::asc("id"));
    let mut eager = authors.fetch_all(&params).unwrap();

    let mut lazy = authors
        .fetch_all(&FetchParams::new().order(OrderBy::asc("id")))
        .unwrap();

    for offset in 0..eager.len() {
        let eager_titles = eager
            .get(offset)
            .unwrap()
            .related_loaded("posts")
            .unwrap()
            .as_collection()
            .unwrap()
            .col_vals("title");
        let record = lazy.get(offset).unwrap();
        let lazy_titles = record
            .related("posts")
            .unwrap()
            .as_collection()
            .unwrap()
            .col_vals("title");
        assert_eq!(eager_titles, lazy_titles);
    }
}
