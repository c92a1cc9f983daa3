//! Live MySQL tests.
//!
//! Run only when `MYORM_TEST_MYSQL_HOST` is set (a `.env` file is honoured):
//!
//! ```text
//! MYORM_TEST_MYSQL_HOST=127.0.0.1
//! MYORM_TEST_MYSQL_PORT=3306
//! MYORM_TEST_MYSQL_USER=root
//! MYORM_TEST_MYSQL_PASSWORD=secret
//! MYORM_TEST_MYSQL_DATABASE=myorm_test
//! ```

#![cfg(all(feature = "mysql", feature = "cache"))]

use myorm::prelude::*;
use myorm::{ConnectionConfig, QueryCollector, TableConfig};
use std::sync::Arc;
use std::time::Duration;

fn env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn setup(table: &str) -> Option<MysqlDb> {
    dotenvy::dotenv().ok();
    let host = std::env::var("MYORM_TEST_MYSQL_HOST").ok()?;
    let database = env("MYORM_TEST_MYSQL_DATABASE", "myorm_test");

    let connection = ConnectionConfig::new(
        host,
        env("MYORM_TEST_MYSQL_USER", "root"),
        env("MYORM_TEST_MYSQL_PASSWORD", ""),
    )
    .port(env("MYORM_TEST_MYSQL_PORT", "3306").parse().unwrap())
    .database(database.clone())
    .timezone("+00:00");

    let config = DbConfig::new()
        .with_default_database(database)
        .with_connection("default", connection)
        .with_table("items", TableConfig::new(table));

    Some(MysqlDb::new(MysqlDriver::new(), config).unwrap())
}

async fn create_items(db: &MysqlDb, table: &str) {
    let conn = db.get_connection(None).unwrap();
    conn.query(&format!("DROP TABLE IF EXISTS `{table}`"))
        .await
        .unwrap();
    conn.query(&format!(
        "CREATE TABLE `{table}` (
            id INT AUTO_INCREMENT PRIMARY KEY,
            name VARCHAR(64) NOT NULL,
            size INT NULL,
            created_at DATETIME NULL
        )"
    ))
    .await
    .unwrap();
}

#[tokio::test]
async fn insert_select_and_found_rows() {
    let table = "myorm_e2e_items";
    let Some(db) = setup(table) else {
        eprintln!("MYORM_TEST_MYSQL_HOST not set; skipping");
        return;
    };
    create_items(&db, table).await;

    let mut q = db.table("items").unwrap();
    q.insert(
        vec![
            params! { "name" => "a", "size" => 1 },
            params! { "name" => "b", "size" => 2 },
            params! { "name" => "c", "size" => None::<i64> },
        ],
        None,
    );
    assert_eq!(q.get_row_count().await.unwrap(), 3);

    let mut q = db.table("items").unwrap();
    q.select(["id", "name"], None)
        .where_(params! { "id" => between(2, 3) })
        .order_by(["id"]);
    let names = q.column_by("id", "name").await.unwrap();
    assert_eq!(names.len(), 2);
    assert_eq!(names["2"], Value::from("b"));

    let mut q = db.table("items").unwrap();
    q.select(Fields::All, Some(CALC_FOUND_ROWS)).limit(Some(1));
    assert_eq!(q.rows().await.unwrap().len(), 1);
    assert_eq!(q.get_row_count().await.unwrap(), 3);
    assert_eq!(q.get_page_count().await.unwrap(), 3);

    let mut q = db.table("items").unwrap();
    q.select(["size"], None).where_(params! { "name" => "c" });
    assert_eq!(q.value("size").await.unwrap(), Some(Value::Null));

    db.close_all().await;
}

#[tokio::test]
async fn insert_id_update_and_transactions() {
    let table = "myorm_e2e_tx";
    let Some(db) = setup(table) else {
        eprintln!("MYORM_TEST_MYSQL_HOST not set; skipping");
        return;
    };
    create_items(&db, table).await;

    let mut q = db.table("items").unwrap();
    q.insert(params! { "name" => "first" }, None);
    let id = q.get_insert_id().await.unwrap();
    assert!(id > 0);

    let conn = db.get_connection(None).unwrap();
    let result: DbResult<()> = myorm::transaction!(&conn, {
        let mut q = db.table("items").unwrap();
        q.update(params! { "name" => "renamed" }, None)
            .where_(params! { "id" => id });
        q.exec().await?;
        Err(DbError::invalid_operation("default", "abort"))
    });
    assert!(result.is_err());

    let mut q = db.table("items").unwrap();
    q.select(["name"], None).where_(params! { "id" => id });
    assert_eq!(q.value("name").await.unwrap(), Some(Value::from("first")));

    db.close_all().await;
}

#[tokio::test]
async fn cached_select_and_reconnect() {
    let table = "myorm_e2e_cache";
    let Some(db) = setup(table) else {
        eprintln!("MYORM_TEST_MYSQL_HOST not set; skipping");
        return;
    };
    create_items(&db, table).await;

    let collector = Arc::new(QueryCollector::new());
    db.set_logger(Some(collector.clone()));
    db.set_cache(Some(Arc::new(MokaResultCache::new(100))));

    for _ in 0..2 {
        let mut q = db.table("items").unwrap();
        q.select("COUNT(*)", None)
            .set_caching("items:count", Duration::from_secs(60), false);
        assert_eq!(q.value("COUNT(*)").await.unwrap().and_then(|v| v.as_i64()), Some(0));
    }
    assert_eq!(collector.cache_hits(), 1);

    let conn = db.get_connection(None).unwrap();
    conn.reconnect().await.unwrap();
    assert!(conn.is_connected().await);
    assert_eq!(conn.escape("it's"), "it\\'s");

    db.close_all().await;
}
