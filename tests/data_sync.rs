//! Data diff, row reconciliation and dump & restore over real SQLite
//! databases.

mod common;

use common::Env;
use dbsync::core::testing::MockConnector;
use dbsync::core::{ConnectionRecord, ErrorKind};
use dbsync::data::{ConnectionPair, DumpOptions, SyncOptions, SyncOutcome, dump_and_restore};
use dbsync::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::json;

const SHOP: &[&str] = &[
    "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
    "CREATE TABLE orders (id INTEGER PRIMARY KEY, \
     customer_id INTEGER NOT NULL REFERENCES customers (id), total REAL)",
];

#[tokio::test]
async fn test_row_reconciliation() {
    let env = Env::new(&["a", "b"]);
    env.exec(
        "a",
        &[
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)",
            "INSERT INTO users VALUES (1, 'a'), (2, 'b')",
        ],
    )
    .await;
    env.exec(
        "b",
        &[
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)",
            "INSERT INTO users VALUES (1, 'a'), (3, 'c')",
        ],
    )
    .await;

    let result = env
        .service
        .sync_table_data(&Endpoints::new("a", "b"), "users", Some(&SyncOptions::all()))
        .await;
    assert_eq!(
        (result.inserted, result.updated, result.deleted, result.errors.len()),
        (1, 0, 1, 0)
    );
    assert_eq!(
        env.rows("b", "SELECT id, name FROM users ORDER BY id").await,
        vec![json!({"id": 1, "name": "a"}), json!({"id": 2, "name": "b"})]
    );
}

#[tokio::test]
async fn test_sync_converges() {
    let env = Env::new(&["a", "b"]);
    env.exec("a", SHOP).await;
    env.exec(
        "a",
        &[
            "INSERT INTO customers VALUES (1, 'ada'), (2, 'bob'), (3, 'cy')",
            "INSERT INTO orders VALUES (10, 1, 9.5), (11, 3, 20)",
        ],
    )
    .await;
    env.exec("b", SHOP).await;
    env.exec(
        "b",
        &[
            "INSERT INTO customers VALUES (1, 'ADA'), (4, 'dee')",
            "INSERT INTO orders VALUES (12, 4, 1)",
        ],
    )
    .await;
    let endpoints = Endpoints::new("a", "b");

    let before = env.service.get_table_row_counts(&endpoints).await.unwrap();
    assert!(before.iter().any(|d| !d.is_in_sync()));

    let report = env
        .service
        .sync_tables_data(&endpoints, &[], Some(&SyncOptions::all()))
        .await;
    assert_eq!(report.outcome(), SyncOutcome::Success, "{report:#?}");
    let customers = report.result("customers").unwrap();
    assert_eq!((customers.inserted, customers.updated, customers.deleted), (2, 1, 1));

    let after = env.service.get_table_row_counts(&endpoints).await.unwrap();
    for diff in &after {
        assert_eq!(diff.source_count, diff.target_count, "{}", diff.table);
        assert_eq!(diff.missing_in_target, Some(0), "{}", diff.table);
        assert_eq!(diff.missing_in_source, Some(0), "{}", diff.table);
    }
}

#[tokio::test]
async fn test_batch_failure_is_isolated_per_table() {
    let env = Env::new(&["a", "b"]);
    let tables = [
        "CREATE TABLE alpha (id INTEGER PRIMARY KEY, v TEXT)",
        "CREATE TABLE beta (v TEXT)",
        "CREATE TABLE gamma (id INTEGER PRIMARY KEY, v TEXT)",
    ];
    env.exec("a", &tables).await;
    env.exec(
        "a",
        &[
            "INSERT INTO alpha VALUES (1, 'x')",
            "INSERT INTO beta VALUES ('y')",
            "INSERT INTO gamma VALUES (1, 'z')",
        ],
    )
    .await;
    env.exec("b", &tables).await;

    let names: Vec<String> = ["alpha", "beta", "gamma"].map(String::from).to_vec();
    let report = env
        .service
        .sync_tables_data(&Endpoints::new("a", "b"), &names, None)
        .await;

    assert_eq!(report.outcome(), SyncOutcome::Partial);
    assert_eq!((report.succeeded, report.failed), (2, 1));
    assert_eq!(report.result("alpha").unwrap().inserted, 1);
    assert_eq!(report.result("gamma").unwrap().inserted, 1);
    let beta = report.result("beta").unwrap();
    assert_eq!(beta.error_kind, Some(ErrorKind::Validation));
    assert_eq!(beta.errors.len(), 1);
}

#[tokio::test]
async fn test_dump_and_restore_replaces_target_rows() {
    let env = Env::new(&["a", "b"]);
    env.exec("a", SHOP).await;
    env.exec(
        "a",
        &[
            "INSERT INTO customers VALUES (1, 'ada'), (2, 'bob')",
            "INSERT INTO orders VALUES (10, 1, 9.5), (11, 2, 3), (12, 2, 4)",
        ],
    )
    .await;
    env.exec("b", SHOP).await;
    env.exec(
        "b",
        &[
            "INSERT INTO customers VALUES (7, 'old')",
            "INSERT INTO orders VALUES (70, 7, 1)",
        ],
    )
    .await;

    let options = DumpOptions {
        batch_size: 2,
        ..DumpOptions::default()
    };
    let result = env
        .service
        .dump_and_restore(&Endpoints::new("a", "b"), Some(&options))
        .await
        .unwrap();
    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.rows_copied, 5);
    let order: Vec<&str> = result.table_results.iter().map(|r| r.table.as_str()).collect();
    assert_eq!(order, vec!["customers", "orders"]);

    assert_eq!(
        env.rows("b", "SELECT id FROM orders ORDER BY id").await,
        vec![json!({"id": 10}), json!({"id": 11}), json!({"id": 12})]
    );
    assert_eq!(
        env.rows("b", "PRAGMA foreign_keys").await,
        vec![json!({"foreign_keys": 1})]
    );
}

#[tokio::test]
async fn test_dump_order_on_postgres_target() {
    let env = Env::new(&["a"]);
    env.exec("a", SHOP).await;
    env.exec(
        "a",
        &[
            "INSERT INTO customers VALUES (1, 'ada')",
            "INSERT INTO orders VALUES (10, 1, 2.5)",
        ],
    )
    .await;

    let target = MockConnector::new(Engine::Postgres);
    let log = target.log();
    let record = ConnectionRecord::new("pg", "warehouse", Engine::Postgres);
    let pg = env.pool.register(&record, Box::new(target));

    let source_schema = env.service.introspect("a", None).await.unwrap();
    let mut target_schema = source_schema.clone();
    target_schema.engine = Engine::Postgres;
    target_schema.schema_name = "public".to_string();

    let pair = ConnectionPair::new(env.pool.acquire("a").await.unwrap(), pg, "main", "public");
    let result = dump_and_restore(&pair, &source_schema, &target_schema, &DumpOptions::default())
        .await
        .unwrap();
    assert!(result.success, "{:?}", result.errors);

    let position = |needle: &str| log.position(needle).unwrap_or_else(|| panic!("missing {needle}"));
    let truncate = position("TRUNCATE TABLE \"public\".\"orders\", \"public\".\"customers\"");
    assert_eq!(log.count("TRUNCATE"), 1);
    assert!(
        position("INSERT INTO \"public\".\"customers\"")
            < position("INSERT INTO \"public\".\"orders\"")
    );
    assert!(truncate < position("INSERT INTO"));
}

#[tokio::test]
async fn test_binary_columns_round_trip() {
    const FILES: &str = "CREATE TABLE files (id INTEGER PRIMARY KEY, data BLOB)";
    const BYTES: &str = "SELECT id, typeof(data) AS kind, hex(data) AS bytes FROM files ORDER BY id";
    let env = Env::new(&["a", "b"]);
    env.exec("a", &[FILES, "INSERT INTO files VALUES (1, x'00ff10'), (2, x'6869')"])
        .await;
    env.exec("b", &[FILES]).await;
    let endpoints = Endpoints::new("a", "b");

    let result = env.service.dump_and_restore(&endpoints, None).await.unwrap();
    assert!(result.success, "{:?}", result.errors);
    assert_eq!(
        env.rows("b", BYTES).await,
        vec![
            json!({"id": 1, "kind": "blob", "bytes": "00FF10"}),
            json!({"id": 2, "kind": "blob", "bytes": "6869"}),
        ]
    );

    // Same hex digits stored as text must not pass for the blob.
    env.exec("b", &["UPDATE files SET data = '00ff10' WHERE id = 1"]).await;
    let report = env
        .service
        .sync_tables_data(&endpoints, &["files".to_string()], None)
        .await;
    assert_eq!(report.result("files").map(|r| r.updated), Some(1));
    assert_eq!(env.rows("b", BYTES).await, env.rows("a", BYTES).await);
}
