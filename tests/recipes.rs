//! End-to-end recipe behaviour against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use cassa::prelude::*;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    id: String,
    email: String,
    age: Option<i64>,
}

impl Record for User {
    fn columns() -> Vec<Column> {
        vec![
            Column::new("id", CqlType::Text),
            Column::new("email", CqlType::Text),
            Column::new("age", CqlType::Int),
        ]
    }
}

fn row(cells: &[(&str, Value)]) -> Row {
    cells.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, h, m, 0).unwrap()
}

fn ids(rows: &[Row]) -> Vec<String> {
    rows.iter()
        .map(|r| r["id"].as_str().unwrap_or_default().to_string())
        .collect()
}

async fn users(store: Arc<MemoryStore>) -> MapTable {
    let table = KeySpace::new("shop", store).map_table("users", "id", User::columns()).unwrap();
    table.create().await.unwrap();
    table
}

async fn posts(store: Arc<MemoryStore>) -> MultimapTable {
    let table = KeySpace::new("app", store)
        .multimap_table(
            "posts",
            "author",
            "id",
            vec![
                Column::new("id", CqlType::Text),
                Column::new("author", CqlType::Text),
                Column::new("title", CqlType::Text),
            ],
        )
        .unwrap();
    table.create().await.unwrap();
    table
}

fn post(id: &str, author: &str) -> Row {
    row(&[
        ("id", id.into()),
        ("author", author.into()),
        ("title", format!("title of {}", id).into()),
    ])
}

async fn trips(store: Arc<MemoryStore>) -> TimeSeriesTable {
    let table = KeySpace::new("app", store)
        .timeseries_table(
            "trips",
            "at",
            "id",
            Duration::from_secs(3600),
            vec![
                Column::new("id", CqlType::Text),
                Column::new("at", CqlType::Timestamp),
                Column::new("km", CqlType::Int),
            ],
        )
        .unwrap();
    table.create().await.unwrap();
    table
}

fn trip(id: &str, t: DateTime<Utc>) -> Row {
    row(&[("id", id.into()), ("at", t.into()), ("km", Value::from(3))])
}

#[tokio::test]
async fn test_map_round_trip() {
    let store = Arc::new(MemoryStore::new());
    let users = users(store.clone()).await;
    let ann = User {
        id: "u1".into(),
        email: "ann@example.com".into(),
        age: Some(31),
    };

    users.set(&ann).run().await.unwrap();
    let back: User = users.read("u1").run().await.unwrap().one().unwrap();
    assert_eq!(back, ann);

    // Same key twice leaves the stored row unchanged.
    let before = store.rows("shop", "users_map_id");
    users.set(&ann).run().await.unwrap();
    assert_eq!(store.rows("shop", "users_map_id"), before);
    assert_eq!(before.len(), 1);

    users.delete("u1").run().await.unwrap();
    let err = users.read("u1").run().await.unwrap().one::<User>().unwrap_err();
    assert!(matches!(err, CassaError::RowNotFound { .. }));
}

#[tokio::test]
async fn test_map_update_and_multi_read() {
    let store = Arc::new(MemoryStore::new());
    let users = users(store).await;
    for (id, email) in [("u1", "a@x"), ("u2", "b@x"), ("u3", "c@x")] {
        users
            .set_row(row(&[("id", id.into()), ("email", email.into())]))
            .run()
            .await
            .unwrap();
    }
    users
        .update("u2", Changes::new().set("age", 40i64))
        .run()
        .await
        .unwrap();

    let found: Vec<User> = users.multi_read(["u2", "u3"]).run().await.unwrap().all().unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].age, Some(40));
    assert_eq!(found[1].age, None);
}

#[tokio::test]
async fn test_multimap_list_and_delete() {
    let store = Arc::new(MemoryStore::new());
    let posts = posts(store.clone()).await;
    for p in [post("p1", "ann"), post("p2", "ann"), post("p3", "bob")] {
        posts.set_row(p).run().await.unwrap();
    }

    let listed = posts.list("ann", None, None).run().await.unwrap();
    assert_eq!(ids(&listed.rows()), vec!["p1", "p2"]);

    posts.delete("ann", "p1").run().await.unwrap();
    let listed = posts.list("ann", None, None).run().await.unwrap();
    assert_eq!(ids(&listed.rows()), vec!["p2"]);
    assert_eq!(ids(&store.rows("app", "posts_map_id")), vec!["p2", "p3"]);
}

#[tokio::test]
async fn test_multimap_delete_all_keeps_main_rows() {
    let store = Arc::new(MemoryStore::new());
    let posts = posts(store.clone()).await;
    posts.set_row(post("p3", "bob")).run().await.unwrap();
    posts.set_row(post("p4", "bob")).run().await.unwrap();

    posts.delete_all("bob").run().await.unwrap();
    assert!(posts.list("bob", None, None).run().await.unwrap().is_empty());
    assert_eq!(store.rows("app", "posts_map_id").len(), 2);
}

#[tokio::test]
async fn test_multimap_pagination() {
    let store = Arc::new(MemoryStore::new());
    let posts = posts(store).await;
    for id in ["p1", "p2", "p3", "p4", "p5"] {
        posts.set_row(post(id, "ann")).run().await.unwrap();
    }

    let mut seen = Vec::new();
    let mut after: Option<Value> = None;
    loop {
        let page = posts.list("ann", after.clone(), Some(2)).run().await.unwrap().rows();
        if page.is_empty() {
            break;
        }
        assert!(page.len() <= 2);
        after = page.last().map(|r| r["id"].clone());
        seen.extend(ids(&page));
    }
    assert_eq!(seen, vec!["p1", "p2", "p3", "p4", "p5"]);
}

#[tokio::test]
async fn test_timeseries_limit_spans_buckets() {
    let store = Arc::new(MemoryStore::new());
    let trips = trips(store).await;
    for (id, t) in [("a", at(0, 10)), ("b", at(0, 50)), ("c", at(1, 5))] {
        trips.set_row(trip(id, t)).run().await.unwrap();
    }

    let one = trips.with_options(&Options::new().limit(1)).list(at(0, 0), at(2, 0));
    let outcome = one.run().await.unwrap();
    assert_eq!(ids(&outcome.rows()), vec!["a"]);
    assert_eq!(outcome.len(), 1);

    let two = trips.list(at(0, 0), at(2, 0)).with_options(&Options::new().limit(2));
    assert_eq!(ids(&two.run().await.unwrap().rows()), vec!["a", "b"]);

    let wide = trips.with_options(&Options::new().limit(10)).list(at(0, 0), at(2, 0));
    assert_eq!(ids(&wide.run().await.unwrap().rows()), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_timeseries_windows() {
    let store = Arc::new(MemoryStore::new());
    let trips = trips(store).await;
    for (id, t) in [("a", at(0, 10)), ("b", at(0, 50)), ("c", at(1, 5))] {
        trips.set_row(trip(id, t)).run().await.unwrap();
    }

    let first_hour = trips.list(at(0, 0), at(1, 0)).run().await.unwrap();
    assert_eq!(first_hour.results().len(), 1);
    assert_eq!(ids(&first_hour.rows()), vec!["a", "b"]);

    let both = trips.list(at(0, 0), at(2, 0)).run().await.unwrap();
    assert_eq!(ids(&both.rows()), vec!["a", "b", "c"]);

    let straddling = trips.list(at(0, 30), at(1, 30)).run().await.unwrap();
    assert_eq!(straddling.results().len(), 2);
    assert_eq!(ids(&straddling.rows()), vec!["b", "c"]);

    let one = trips.read(at(1, 5), "c").run().await.unwrap();
    assert_eq!(one.rows()[0]["bucket"], Value::from(at(1, 0)));
}

#[tokio::test]
async fn test_timeseries_list_matches_sorted_scan() {
    let store = Arc::new(MemoryStore::new());
    let trips = trips(store).await;
    let base = at(0, 0);
    let events: Vec<(String, DateTime<Utc>)> = (0..20i64)
        .map(|i| (format!("e{:02}", i), base + TimeDelta::minutes((i * 37) % 300)))
        .collect();
    for (id, t) in &events {
        trips.set_row(trip(id, *t)).run().await.unwrap();
    }

    let (start, end) = (at(0, 45), at(4, 10));
    let mut expected: Vec<&(String, DateTime<Utc>)> =
        events.iter().filter(|(_, t)| *t >= start && *t < end).collect();
    expected.sort_by_key(|(_, t)| *t);
    let expected: Vec<String> = expected.into_iter().map(|(id, _)| id.clone()).collect();

    let listed = trips.list(start, end).run().await.unwrap();
    assert_eq!(listed.results().len(), 5);
    assert_eq!(ids(&listed.rows()), expected);
}

#[tokio::test]
async fn test_multi_timeseries_isolates_index_values() {
    let store = Arc::new(MemoryStore::new());
    let sales = KeySpace::new("app", store)
        .multi_timeseries_table(
            "sales",
            "seller",
            "at",
            "id",
            Duration::from_secs(86_400),
            vec![
                Column::new("id", CqlType::Text),
                Column::new("seller", CqlType::Text),
                Column::new("at", CqlType::Timestamp),
            ],
        )
        .unwrap();
    sales.create().await.unwrap();
    for (id, seller, t) in [("s1", "ann", at(9, 0)), ("s2", "bob", at(10, 0)), ("s3", "ann", at(23, 0))] {
        sales
            .set_row(row(&[("id", id.into()), ("seller", seller.into()), ("at", t.into())]))
            .run()
            .await
            .unwrap();
    }

    let end = at(0, 0) + TimeDelta::days(2);
    let anns = sales.list("ann", at(0, 0), end).run().await.unwrap();
    assert_eq!(ids(&anns.rows()), vec!["s1", "s3"]);

    sales.delete("ann", at(9, 0), "s1").run().await.unwrap();
    let anns = sales.list("ann", at(0, 0), end).run().await.unwrap();
    assert_eq!(ids(&anns.rows()), vec!["s3"]);
}

#[tokio::test]
async fn test_flex_reads_by_either_field() {
    let store = Arc::new(MemoryStore::new());
    let rides = KeySpace::new("app", store)
        .flex_multi_timeseries_table(
            "rides",
            &["rider", "driver"],
            "at",
            "id",
            Arc::new(FixedBucketer::new(Duration::from_secs(3600)).unwrap()),
            vec![
                Column::new("id", CqlType::Text),
                Column::new("rider", CqlType::Text),
                Column::new("driver", CqlType::Text),
                Column::new("at", CqlType::Timestamp),
            ],
        )
        .unwrap();
    rides.create().await.unwrap();
    for (id, rider, driver, t) in [("r1", "ann", "dan", at(0, 5)), ("r2", "ann", "eve", at(1, 15))] {
        rides
            .set_row(row(&[
                ("id", id.into()),
                ("rider", rider.into()),
                ("driver", driver.into()),
                ("at", t.into()),
            ]))
            .run()
            .await
            .unwrap();
    }

    let by_rider = rides.list("rider", "ann", at(0, 0), at(2, 0)).run().await.unwrap();
    assert_eq!(ids(&by_rider.rows()), vec!["r1", "r2"]);
    let by_driver = rides.list("driver", "eve", at(0, 0), at(2, 0)).run().await.unwrap();
    assert_eq!(ids(&by_driver.rows()), vec!["r2"]);

    let keys = row(&[("rider", "ann".into()), ("driver", "dan".into())]);
    rides.delete(&keys, at(0, 5), "r1").run().await.unwrap();
    let by_driver = rides.list("driver", "dan", at(0, 0), at(2, 0)).run().await.unwrap();
    assert!(by_driver.is_empty());
}

#[tokio::test]
async fn test_composed_ops_run_in_order() {
    let store = Arc::new(MemoryStore::new());
    let users = users(store.clone()).await;
    let before = store.dispatched();

    let op = users
        .with_options(&Options::new().ttl(Duration::from_secs(5)))
        .set_row(row(&[("id", "u1".into()), ("email", "a@x".into())]))
        .add(users.set_row(row(&[("id", "u2".into()), ("email", "b@x".into())])));
    let stmts = op.generate_statements().unwrap();
    assert!(stmts[0].cql.ends_with("USING TTL 5"));
    assert!(!stmts[1].cql.contains("USING"));

    let composite = op.with_options(&Options::new().ttl(Duration::from_secs(10)));
    for stmt in composite.generate_statements().unwrap() {
        assert!(stmt.cql.ends_with("USING TTL 10"));
    }

    composite.run().await.unwrap();
    let sent = &store.statements()[before..];
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].params[0], Value::from("u1"));
    assert_eq!(sent[1].params[0], Value::from("u2"));
}

#[tokio::test]
async fn test_preflight_failure_dispatches_nothing() {
    let store = Arc::new(MemoryStore::new());
    let events = KeySpace::new("app", store.clone())
        .table(
            "events",
            vec![
                Column::new("tenant", CqlType::Text),
                Column::new("region", CqlType::Text),
                Column::new("id", CqlType::Text),
            ],
            Keys::new(&["tenant", "region"], &["id"]),
        )
        .unwrap();
    events.create().await.unwrap();
    let before = store.dispatched();

    let err = events
        .filter(vec![Relation::eq("tenant", "t1")])
        .delete()
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, CassaError::Validation(_)));
    assert_eq!(err.effect(), Effect::None);
    assert_eq!(store.dispatched(), before);
}

#[tokio::test]
async fn test_failure_mid_op_reports_partial_application() {
    let store = Arc::new(MemoryStore::new());
    let posts = posts(store.clone()).await;

    store.fail_on(2);
    let err = posts.set_row(post("p1", "ann")).run().await.unwrap_err();
    assert!(matches!(err, CassaError::Execution { applied: 1, .. }));
    assert_eq!(err.effect(), Effect::Partial);
    assert_eq!(store.rows("app", "posts_map_id").len(), 1);
    assert!(store.rows("app", "posts_multimap_author_id").is_empty());
}

#[tokio::test]
async fn test_atomic_failure_applies_nothing() {
    let store = Arc::new(MemoryStore::new());
    let posts = posts(store.clone()).await;

    store.fail_on(2);
    let err = posts
        .set_row(post("p1", "ann"))
        .run_atomically()
        .await
        .unwrap_err();
    assert!(matches!(err, CassaError::Batch { statements: 2, .. }));
    assert_eq!(err.effect(), Effect::AllOrNothing);
    assert!(store.rows("app", "posts_map_id").is_empty());
    assert!(store.rows("app", "posts_multimap_author_id").is_empty());

    posts.set_row(post("p1", "ann")).run_atomically().await.unwrap();
    assert_eq!(store.rows("app", "posts_multimap_author_id").len(), 1);
}

#[tokio::test]
async fn test_cancelled_before_dispatch() {
    let store = Arc::new(MemoryStore::new());
    let posts = posts(store.clone()).await;
    let before = store.dispatched();

    let token = CancelToken::new();
    let ctx = ExecContext::new().with_cancel(token.clone());
    token.cancel();

    let err = posts.set_row(post("p1", "ann")).run_with(&ctx).await.unwrap_err();
    assert!(matches!(err, CassaError::Cancelled { applied: 0 }));
    assert_eq!(err.effect(), Effect::None);
    assert_eq!(store.dispatched(), before);
}

#[tokio::test]
async fn test_keyspace_from_config() {
    let config = Config::builder()
        .keyspace("cfg")
        .debug(true)
        .ttl_secs(60)
        .build();
    let store = Arc::new(MemoryStore::new());
    let ks = KeySpace::from_config(&config, store);
    assert_eq!(ks.name(), "cfg");

    let users = ks.map_table("users", "id", User::columns()).unwrap();
    assert!(!ks.exists("users_map_id").await.unwrap());
    users.create_if_not_exist().await.unwrap();
    users.create_if_not_exist().await.unwrap();
    assert_eq!(ks.tables().await.unwrap(), vec!["users_map_id"]);

    let stmt = users
        .set_row(row(&[("id", "u1".into()), ("email", "a@x".into())]))
        .generate_statement()
        .unwrap();
    assert!(stmt.cql.ends_with("USING TTL 60"));

    users.recreate().await.unwrap();
    assert!(ks.exists("users_map_id").await.unwrap());
}
