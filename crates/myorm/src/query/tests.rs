use super::*;
use crate::catalog::TableEntry;
use crate::config::ConnectionConfig;
use crate::driver::{DriverError, QueryOutput};
use crate::params;
use crate::testing::{ScriptedDriver, rows_of};
use crate::value::{DISTINCT, IGNORE, LEFT, RIGHT, between, escape_like, field, like, more, value};
use chrono::NaiveDate;

const TABLE: &str = "`app`.`test`";

fn catalog() -> Arc<TableCatalog> {
    let mut catalog = TableCatalog::new();
    for (alias, table) in [("test", "test"), ("table1", "table_one"), ("table2", "table_two")] {
        catalog.insert(TableEntry {
            alias: alias.to_string(),
            table: table.to_string(),
            database: Some("app".to_string()),
            connection: None,
        });
    }
    Arc::new(catalog)
}

fn setup() -> (ScriptedDriver, Arc<TableCatalog>, Arc<Connection<ScriptedDriver>>) {
    let driver = ScriptedDriver::new();
    let connection = Arc::new(Connection::new(
        "default",
        ConnectionConfig::new("127.0.0.1", "root", ""),
        Arc::new(driver.clone()),
    ));
    (driver, catalog(), connection)
}

fn db() -> DbQuery<ScriptedDriver> {
    let (_, catalog, connection) = setup();
    DbQuery::new("test", catalog, connection).unwrap()
}

fn expect(q: &DbQuery<ScriptedDriver>, lines: &[&str]) {
    assert_eq!(q.get_query().unwrap(), lines.join("\n"));
}

fn select_from(extra: &[&str]) -> Vec<String> {
    let mut lines = vec!["SELECT *".to_string(), format!("FROM {TABLE} AS self")];
    lines.extend(extra.iter().map(|s| s.to_string()));
    lines
}

fn expect_select(q: &DbQuery<ScriptedDriver>, extra: &[&str]) {
    assert_eq!(q.get_query().unwrap(), select_from(extra).join("\n"));
}

#[test]
fn test_simple() {
    let mut q = db();
    assert_eq!(q.alias(), "test");
    assert_eq!(q.table(), TABLE);
    assert_eq!(q.kind(), None);
    assert!(matches!(q.get_query(), Err(DbError::InvalidOperation { .. })));

    q.select(Fields::All, None);
    assert_eq!(q.kind(), Some(QueryKind::Select));
    q.where_raw(None)
        .order_by(OrderSpec::None)
        .group_by(OrderSpec::None)
        .having_raw(None);
    expect_select(&q, &[]);
}

#[test]
fn test_unknown_table() {
    let (_, catalog, connection) = setup();
    assert!(matches!(
        DbQuery::new("nope", catalog, connection),
        Err(DbError::UnknownTable(_))
    ));
}

#[test]
fn test_select_fields() {
    let cases: Vec<(&str, Fields, Option<&str>)> = vec![
        ("*", Fields::All, None),
        ("*", "*".into(), None),
        ("DISTINCT *", Fields::All, Some(DISTINCT)),
        (
            "SQL_CALC_FOUND_ROWS DISTINCT *",
            Fields::All,
            Some("SQL_CALC_FOUND_ROWS DISTINCT"),
        ),
        ("self.*", "self.*".into(), None),
        ("`test_field`", "test_field".into(), None),
        ("self.test_field", "self.test_field".into(), None),
        ("field_one, field_two", "field_one, field_two".into(), None),
        ("`field_one`, `field_two`", ["field_one", "field_two"].into(), None),
        (
            "self.field_one, self.field_two",
            ["self.field_one", "self.field_two"].into(),
            None,
        ),
        ("`field_one`, `field_two`", "`field_one`, `field_two`".into(), None),
        (
            "`field_one` AS `one`, `field_two`",
            Fields::list().aliased("field_one", "one").field("field_two"),
            None,
        ),
        ("COUNT(*)", "COUNT(*)".into(), None),
        ("COUNT(*) AS `c`", [("COUNT(*)", "c")].into(), None),
        ("COUNT(*) AS c", "COUNT(*) AS c".into(), None),
        ("*, COUNT(*)", "*, COUNT(*)".into(), None),
        ("*, COUNT(*)", ["*", "COUNT(*)"].into(), None),
        ("*, COUNT(*) AS `c`", Fields::All.aliased("COUNT(*)", "c"), None),
        ("*, `id`", Fields::All.field("id"), None),
        ("COUNT(*), `id`", Fields::Expr("COUNT(*)".to_string()).field("id"), None),
        ("`id`", Fields::list().field("id"), None),
        ("`a`, `*`", ["a", "*"].into(), None),
    ];

    for (expected, fields, options) in cases {
        let mut q = db();
        q.select(fields, options);
        assert_eq!(
            q.get_query().unwrap(),
            format!("SELECT {expected}\nFROM {TABLE} AS self")
        );
    }
}

#[test]
fn test_join() {
    let mut q = db();
    q.select(Fields::All, None);
    let mut lines = select_from(&[]);

    q.join("table1", "t1", "self.id = t1.test_id", "INNER");
    lines.push("INNER JOIN `app`.`table_one` AS `t1` ON (self.id = t1.test_id)".to_string());
    assert_eq!(q.get_query().unwrap(), lines.join("\n"));

    q.join(
        "table2",
        "t2",
        params! { "self.id" => field("t2.test_id", "="), "t2.type" => 3 },
        LEFT,
    );
    lines.push(
        "LEFT JOIN `app`.`table_two` AS `t2` ON (self.id = t2.test_id AND t2.type = 3)".to_string(),
    );
    assert_eq!(q.get_query().unwrap(), lines.join("\n"));

    q.join("test", "self2", params! { "self.id" => field("self2.id", "<") }, RIGHT);
    lines.push(format!("RIGHT JOIN {TABLE} AS `self2` ON (self.id < self2.id)"));
    assert_eq!(q.get_query().unwrap(), lines.join("\n"));
}

#[test]
fn test_join_errors() {
    let mut q = db();
    q.select(Fields::All, None).join("table1", "t1", "1", "OUTER");
    assert!(matches!(q.get_query(), Err(DbError::InvalidArgument { .. })));

    let mut q = db();
    q.select(Fields::All, None).join("missing", "m", "1", "INNER");
    assert!(matches!(q.get_query(), Err(DbError::UnknownTable(_))));
}

#[test]
fn test_index() {
    let mut q = db();
    q.select(Fields::All, None).index(&["i1", "i2"], "USE", None);
    expect_select(&q, &["USE INDEX (`i1`, `i2`)"]);

    let mut q = db();
    q.select(Fields::All, None)
        .index(&["main"], "FORCE", Some("GROUP BY"))
        .join("table1", "t1", "self.id = t1.id", "INNER");
    expect_select(
        &q,
        &[
            "FORCE INDEX FOR GROUP BY (`main`)",
            "INNER JOIN `app`.`table_one` AS `t1` ON (self.id = t1.id)",
        ],
    );
}

#[test]
fn test_index_errors() {
    let mut q = db();
    q.select(Fields::All, None).index(&["main"], "CAT", None);
    assert!(matches!(q.get_query(), Err(DbError::InvalidArgument { .. })));

    let mut q = db();
    q.select(Fields::All, None).index(&["main"], "USE", Some("CAT"));
    assert!(matches!(q.get_query(), Err(DbError::InvalidArgument { .. })));
}

#[test]
fn test_where() {
    let dt = |d: u32, h: u32| {
        NaiveDate::from_ymd_opt(2017, 7, d)
            .unwrap()
            .and_hms_opt(h, 55, 43)
            .unwrap()
    };

    let cases: Vec<(&str, Params)> = vec![
        // types
        ("`field` = 1", params! { "field" => 1 }),
        ("`field` = \"a\"", params! { "field" => "a" }),
        ("`field` = 1.1", params! { "field" => 1.1 }),
        ("`field` IS NULL", params! { "field" => None::<i64> }),
        ("`field` = \"2017-07-12 18:55:43\"", params! { "field" => dt(12, 18) }),
        ("`field` = 0", params! { "field" => false }),
        ("`field` = 1", params! { "field" => true }),
        // IN()
        ("`field` IN (1)", params! { "field" => vec![1] }),
        ("`field` IN (1,2)", params! { "field" => [1, 2] }),
        (
            "`field` IN (\"a\",2,NULL)",
            params! { "field" => vec![Value::from("a"), Value::from(2), Value::Null] },
        ),
        // AND
        (
            "`field_one` = 1 AND `field_two` = 2",
            params! { "field_one" => 1, "field_two" => 2 },
        ),
        (
            "`field_one` = 1 AND `field_two` = 2 AND `field_three` = 3",
            params! { "field_one" => 1, "field_two" => 2, "field_three" => 3 },
        ),
        // value()
        ("`field` = 1", params! { "field" => value("=", 1) }),
        ("`field` > 1", params! { "field" => value(">", 1) }),
        ("`field` <= 1", params! { "field" => value("<=", 1) }),
        ("`field` IN (1,2)", params! { "field" => value("=", [1, 2]) }),
        ("`field` IN (1,2)", params! { "field" => value("IN", [1, 2]) }),
        ("`field` != 1", params! { "field" => value("!=", 1) }),
        ("`field` NOT IN (1,2)", params! { "field" => value("!=", [1, 2]) }),
        ("`field` NOT IN (1,2)", params! { "field" => value("NOT IN", [1, 2]) }),
        ("`field` IS NOT NULL", params! { "field" => value("!=", Value::Null) }),
        ("`field` BETWEEN 1 AND 2", params! { "field" => between(1, 2) }),
        (
            "`field` BETWEEN \"2017-07-11 18:55:43\" AND \"2017-07-12 18:55:43\"",
            params! { "field" => between(dt(11, 18), dt(12, 18)) },
        ),
        // LIKE
        ("`field` LIKE \"abc\"", params! { "field" => like("abc") }),
        ("`field` LIKE \"%a_c%\"", params! { "field" => like("%a_c%") }),
        (
            r#"`field` LIKE "%a\\_c\\%""#,
            params! { "field" => like(format!("%{}", escape_like("a_c%"))) },
        ),
        // escaping
        (
            r#"`field` = "a\" AND `b` = \"0""#,
            params! { "field" => "a\" AND `b` = \"0" },
        ),
        // fields
        ("self.a = \"a\"", params! { "self.a" => "a" }),
        ("self.a = `b`", params! { "self.a" => field("b", "=") }),
        ("self.a = self.b", params! { "self.a" => field("self.b", "=") }),
    ];

    for (expected, params) in cases {
        let mut q = db();
        q.select(Fields::All, None).where_(params);
        expect_select(&q, &[&format!("WHERE {expected}")]);
    }
}

#[test]
fn test_where_raw_and_replace() {
    let mut q = db();
    q.select(Fields::All, None)
        .where_(params! { "id" => 1 })
        .where_raw(Some("id > 5 OR id < 2"));
    expect_select(&q, &["WHERE id > 5 OR id < 2"]);

    q.where_(params! {});
    expect_select(&q, &[]);
}

#[test]
fn test_where_errors() {
    let invalid = [
        params! { "field" => value("LIKE", Value::Null) },
        params! { "field" => value("LIKE", [1, 2]) },
        params! { "field" => value("IN", 1) },
        params! { "field" => field("other", "LIKE") },
        params! { "field" => value("BETWEEN", [1]) },
        params! { "field" => f64::NAN },
    ];
    for params in invalid {
        let mut q = db();
        q.select(Fields::All, None).where_(params);
        let err = q.get_query().unwrap_err();
        assert!(matches!(err, DbError::InvalidArgument { ref alias, .. } if alias == "default"));
    }
}

#[test]
fn test_first_error_is_kept() {
    let mut q = db();
    q.select(Fields::All, None)
        .index(&["i"], "CAT", None)
        .join("missing", "m", "1", "INNER");
    let err = q.get_query().unwrap_err();
    assert!(err.to_string().contains("CAT"));
}

#[test]
fn test_order_by() {
    let cases: Vec<(&str, OrderSpec)> = vec![
        ("`field` DESC", OrderSpec::terms().desc("field")),
        ("field", "field".into()),
        ("`field`", ["field"].into()),
        ("`field1`, `field2`", ["field1", "field2"].into()),
        (
            "`field1` ASC, `field2` DESC",
            [("field1", "ASC"), ("field2", "DESC")].into(),
        ),
        ("COUNT(*) DESC", [("COUNT(*)", "DESC")].into()),
        ("self.field ASC", OrderSpec::terms().asc("self.field")),
        ("field ASC", "field ASC".into()),
        (
            "table1.field, table2.field DESC",
            OrderSpec::terms()
                .field("table1.field")
                .desc("table2.field"),
        ),
    ];

    for (expected, spec) in cases {
        let mut q = db();
        q.select(Fields::All, None).order_by(spec);
        expect_select(&q, &[&format!("ORDER BY {expected}")]);
    }
}

#[test]
fn test_group_by_and_having() {
    for (expected, spec) in [
        ("field", OrderSpec::from("field")),
        ("`field`", OrderSpec::from(["field"])),
        ("`field1`, `field2`", OrderSpec::from(["field1", "field2"])),
    ] {
        let mut q = db();
        q.select(Fields::All, None).group_by(spec);
        expect_select(&q, &[&format!("GROUP BY {expected}")]);
    }

    let mut q = db();
    q.select(Fields::All, None)
        .group_by(["field"])
        .having(params! { "COUNT(*)" => more(2) });
    expect_select(&q, &["GROUP BY `field`", "HAVING COUNT(*) > 2"]);
}

#[test]
fn test_limit_and_offset() {
    let mut q = db();
    q.select(Fields::All, None).offset(Some(2));
    expect_select(&q, &["OFFSET 2"]);

    let mut q = db();
    q.select(Fields::All, None).limit(Some(1));
    expect_select(&q, &["LIMIT 1"]);
    q.limit(Some(100)).offset(Some(200));
    expect_select(&q, &["LIMIT 100", "OFFSET 200"]);
    q.limit(None).offset(Some(0));
    expect_select(&q, &[]);

    #[allow(deprecated)]
    q.limit_offset(20, 10);
    expect_select(&q, &["LIMIT 10", "OFFSET 20"]);
}

#[test]
fn test_set_page() {
    let mut q = db();
    q.select(Fields::All, None).set_page(3, 10);
    expect_select(&q, &["LIMIT 10", "OFFSET 20"]);

    q.set_page(1, 10);
    expect_select(&q, &["LIMIT 10"]);
}

#[test]
fn test_truncate_and_optimize() {
    let mut q = db();
    q.truncate();
    assert!(q.get_query().unwrap_err().is_security());
    q.disable_security();
    expect(&q, &[&format!("TRUNCATE TABLE {TABLE}")]);

    let mut q = db();
    q.optimize();
    expect(&q, &[&format!("OPTIMIZE TABLE {TABLE}")]);
}

fn scalar_row() -> Params {
    params! {
        "int" => 1,
        "float" => 1.2,
        "str" => "string",
        "bool" => false,
        "null" => None::<i64>,
    }
}

#[test]
fn test_insert() {
    let mut q = db();
    q.insert(scalar_row(), None);
    assert_eq!(q.kind(), Some(QueryKind::Insert));
    expect(
        &q,
        &[
            &format!("INSERT INTO {TABLE}"),
            "SET `int` = 1, `float` = 1.2, `str` = \"string\", `bool` = 0, `null` = NULL",
        ],
    );

    let mut q = db();
    q.insert(params! { "field" => 1 }, Some(IGNORE));
    expect(&q, &[&format!("INSERT IGNORE INTO {TABLE}"), "SET `field` = 1"]);
}

fn items() -> Vec<Params> {
    vec![
        params! { "name" => "a", "size" => 1 },
        params! { "name" => "b", "size" => 2 },
        params! { "name" => "c", "size" => 3 },
    ]
}

#[test]
fn test_multi_insert() {
    let mut q = db();
    q.insert(items(), None);
    assert_eq!(q.kind(), Some(QueryKind::MultiInsert));
    expect(
        &q,
        &[
            &format!("INSERT INTO {TABLE}"),
            "(`name`,`size`) VALUES",
            "(\"a\",1),",
            "(\"b\",2),",
            "(\"c\",3)",
        ],
    );

    // Later rows follow the first row's column order.
    let mut q = db();
    q.insert(
        [
            params! { "name" => "a", "size" => 1 },
            params! { "size" => 2, "name" => "b" },
        ],
        None,
    );
    expect(
        &q,
        &[
            &format!("INSERT INTO {TABLE}"),
            "(`name`,`size`) VALUES",
            "(\"a\",1),",
            "(\"b\",2)",
        ],
    );
}

#[test]
fn test_multi_insert_errors() {
    let mut q = db();
    q.insert(Vec::<Params>::new(), None);
    assert!(matches!(q.get_query(), Err(DbError::InvalidArgument { .. })));

    let mut q = db();
    q.insert(
        [params! { "name" => "a", "size" => 1 }, params! { "name" => "b" }],
        None,
    );
    let err = q.get_query().unwrap_err();
    assert!(err.to_string().contains("size"));
}

#[test]
fn test_update() {
    let mut row = scalar_row();
    row.push("field", field("id", "="));

    let mut q = db();
    q.update(row, None).where_(params! { "id" => 123 });
    expect(
        &q,
        &[
            &format!("UPDATE {TABLE}"),
            "SET `int` = 1, `float` = 1.2, `str` = \"string\", `bool` = 0, `null` = NULL, `field` = `id`",
            "WHERE `id` = 123",
        ],
    );

    let mut q = db();
    q.update(params! { "field" => 1 }, Some(IGNORE))
        .where_(params! { "id" => 123 })
        .order_by(OrderSpec::terms().desc("id"))
        .limit(Some(5));
    expect(
        &q,
        &[
            &format!("UPDATE IGNORE {TABLE}"),
            "SET `field` = 1",
            "WHERE `id` = 123",
            "ORDER BY `id` DESC",
            "LIMIT 5",
        ],
    );
}

#[test]
fn test_update_requires_where() {
    let mut q = db();
    q.update(params! { "x" => 1 }, None);
    assert!(q.get_query().unwrap_err().is_security());

    q.disable_security();
    expect(&q, &[&format!("UPDATE {TABLE}"), "SET `x` = 1"]);
}

#[test]
fn test_update_rejects_list_values() {
    let mut q = db();
    q.update(params! { "x" => [1, 2] }, None)
        .where_(params! { "id" => 1 });
    assert!(matches!(q.get_query(), Err(DbError::InvalidArgument { .. })));
}

#[test]
fn test_delete() {
    let mut q = db();
    q.delete(None).where_(params! { "id" => 123 });
    expect(&q, &[&format!("DELETE FROM {TABLE}"), "WHERE `id` = 123"]);

    let mut q = db();
    q.delete(Some(IGNORE)).where_(params! { "id" => 123 });
    expect(&q, &[&format!("DELETE IGNORE FROM {TABLE}"), "WHERE `id` = 123"]);

    let mut q = db();
    q.delete(None);
    assert!(q.get_query().unwrap_err().is_security());
    q.disable_security();
    expect(&q, &[&format!("DELETE FROM {TABLE}")]);
}

#[test]
fn test_replace() {
    let mut q = db();
    q.replace(scalar_row(), None);
    expect(
        &q,
        &[
            &format!("REPLACE INTO {TABLE}"),
            "SET `int` = 1, `float` = 1.2, `str` = \"string\", `bool` = 0, `null` = NULL",
        ],
    );
}

#[test]
fn test_sub_query() {
    let (_, catalog, connection) = setup();
    let mut inner = DbQuery::new("test", catalog.clone(), connection.clone()).unwrap();
    inner.select(Fields::All, None).where_(params! { "id" => 1 });

    let mut q = DbQuery::from_subquery(inner, catalog, connection);
    q.select(Fields::All, None).limit(Some(1));
    assert_eq!(q.alias(), "test");
    expect(
        &q,
        &[
            "SELECT *",
            "FROM (",
            "SELECT *",
            &format!("FROM {TABLE} AS self"),
            "WHERE `id` = 1",
            ") AS self",
            "LIMIT 1",
        ],
    );
}

#[test]
fn test_sub_query_requires_select() {
    let (_, catalog, connection) = setup();
    let mut inner = DbQuery::new("test", catalog.clone(), connection.clone()).unwrap();
    inner.select(Fields::All, None);
    let mut q = DbQuery::from_subquery(inner, catalog.clone(), connection.clone());
    q.insert(params! { "a" => "b" }, None);
    assert!(matches!(q.get_query(), Err(DbError::InvalidOperation { .. })));

    let mut inner = DbQuery::new("test", catalog.clone(), connection.clone()).unwrap();
    inner.delete(None).where_(params! { "id" => 1 });
    let mut q = DbQuery::from_subquery(inner, catalog, connection);
    q.select(Fields::All, None);
    assert!(matches!(q.get_query(), Err(DbError::InvalidOperation { .. })));
}

#[test]
fn test_on_duplicate_key() {
    let mut q = db();
    q.insert(params! { "field" => 1 }, None)
        .on_duplicate_key(params! { "field" => 2 });
    expect(
        &q,
        &[
            &format!("INSERT INTO {TABLE}"),
            "SET `field` = 1",
            "ON DUPLICATE KEY UPDATE `field` = 2",
        ],
    );

    let mut q = db();
    q.insert(params! { "field" => 1 }, None).on_duplicate_key(params! {
        "field2" => field("field3", "="),
        "field3" => field("`field3` + `field2`", "="),
    });
    expect(
        &q,
        &[
            &format!("INSERT INTO {TABLE}"),
            "SET `field` = 1",
            "ON DUPLICATE KEY UPDATE `field2` = `field3`, `field3` = `field3` + `field2`",
        ],
    );

    let mut q = db();
    q.insert(items(), None)
        .on_duplicate_key(params! { "field" => field("VALUE(`name`)", "=") });
    expect(
        &q,
        &[
            &format!("INSERT INTO {TABLE}"),
            "(`name`,`size`) VALUES",
            "(\"a\",1),",
            "(\"b\",2),",
            "(\"c\",3)",
            "ON DUPLICATE KEY UPDATE `field` = VALUE(`name`)",
        ],
    );
}

#[test]
fn test_set_caching() {
    let mut q = db();
    q.select(Fields::All, None)
        .set_caching("key", Duration::from_secs(60), true);
    let options = q.cache_options().unwrap();
    assert_eq!(options.key, "key");
    assert_eq!(options.ttl, Duration::from_secs(60));
    assert!(options.force_rebuild);
}

#[test]
fn test_set_caching_requires_select() {
    let mut q = db();
    q.delete(None)
        .where_(params! { "id" => 1 })
        .set_caching("key", Duration::from_secs(60), true);
    assert!(q.cache_options().is_none());
    assert!(matches!(q.get_query(), Err(DbError::InvalidOperation { .. })));
}

#[test]
fn test_get_query_is_idempotent() {
    let mut q = db();
    q.select(["id", "name"], Some(DISTINCT))
        .where_(params! { "id" => between(1, 9) })
        .order_by(OrderSpec::terms().desc("id"))
        .set_page(2, 5);
    let first = q.get_query().unwrap();
    assert_eq!(q.get_query().unwrap(), first);
    assert_eq!(q.to_string(), first);
}

#[test]
fn test_display_reports_errors() {
    let mut q = db();
    q.delete(None);
    assert!(q.to_string().starts_with("<invalid query: "));
}

// ==================== Execution ====================

fn people() -> Vec<Row> {
    [(1, "Ippolit"), (2, "Matwey"), (3, "Ibragim"), (4, "Matwey")]
        .into_iter()
        .map(|(id, name)| Row::from_pairs([("id", Value::from(id)), ("name", Value::from(name))]))
        .collect()
}

#[tokio::test]
async fn test_exec_memoizes_rows() {
    let (driver, catalog, connection) = setup();
    driver.respond_rows("SELECT", people());

    let mut q = DbQuery::new("test", catalog, connection).unwrap();
    q.select(Fields::All, None);

    assert_eq!(q.row().await.unwrap().unwrap().get("name"), Some(&Value::from("Ippolit")));
    assert_eq!(q.value("name").await.unwrap(), Some(Value::from("Ippolit")));
    assert_eq!(q.rows().await.unwrap().len(), 4);
    assert_eq!(q.column("name").await.unwrap().len(), 4);
    assert_eq!(q.rows_by("id").await.unwrap().len(), 4);
    assert_eq!(
        q.rows_by("name").await.unwrap().keys().collect::<Vec<_>>(),
        vec!["Ippolit", "Matwey", "Ibragim"]
    );
    assert_eq!(q.column_by("id", "name").await.unwrap()["4"], Value::from("Matwey"));
    assert_eq!(
        q.column_grouped("name", "id").await.unwrap()["Matwey"],
        vec![Value::Int(2), Value::Int(4)]
    );
    assert_eq!(q.rows_grouped("name").await.unwrap()["Ibragim"].len(), 1);

    assert_eq!(driver.count_matching("SELECT *"), 1);
}

#[tokio::test]
async fn test_empty_result() {
    let (_, catalog, connection) = setup();
    let mut q = DbQuery::new("test", catalog, connection).unwrap();
    q.select(Fields::All, None);
    assert_eq!(q.row().await.unwrap(), None);
    assert_eq!(q.value("id").await.unwrap(), None);
    assert!(q.rows().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_row_count_uses_found_rows() {
    let (driver, catalog, connection) = setup();
    driver
        .respond_rows("FOUND_ROWS()", rows_of("FOUND_ROWS()", &[57]))
        .respond_rows("SELECT SQL_CALC_FOUND_ROWS", rows_of("id", &[1, 2, 3, 4, 5]));

    let mut q = DbQuery::new("test", catalog, connection).unwrap();
    q.select(Fields::All, Some(CALC_FOUND_ROWS)).limit(Some(5));
    assert_eq!(q.get_row_count().await.unwrap(), 57);
    assert_eq!(q.get_page_count().await.unwrap(), 12);
    assert_eq!(driver.count_matching("FOUND_ROWS()"), 1);
}

#[tokio::test]
async fn test_row_count_uses_affected_rows() {
    let (driver, catalog, connection) = setup();
    driver.respond("UPDATE", QueryOutput::affected(3, 0));

    let mut q = DbQuery::new("test", catalog, connection).unwrap();
    q.update(params! { "x" => 1 }, None).where_(params! { "y" => 2 });
    assert_eq!(q.get_row_count().await.unwrap(), 3);
    assert!(matches!(
        q.get_page_count().await,
        Err(DbError::InvalidOperation { .. })
    ));
    assert_eq!(driver.count_matching("FOUND_ROWS()"), 0);
}

#[tokio::test]
async fn test_insert_id() {
    let (driver, catalog, connection) = setup();
    driver.respond("INSERT", QueryOutput::affected(1, 77));

    let mut q = DbQuery::new("test", catalog, connection).unwrap();
    q.insert(params! { "name" => "x" }, None);
    assert_eq!(q.get_insert_id().await.unwrap(), 77);
}

#[tokio::test]
async fn test_build_errors_never_reach_the_server() {
    let (driver, catalog, connection) = setup();
    let mut q = DbQuery::new("test", catalog, connection).unwrap();
    q.delete(None);
    assert!(q.exec().await.unwrap_err().is_security());
    assert!(driver.statements().is_empty());
}

#[tokio::test]
async fn test_execution_error_carries_sql() {
    let (driver, catalog, connection) = setup();
    driver.fail_next("SELECT", DriverError::new(1054, "Unknown column 'nope'"));

    let mut q = DbQuery::new("test", catalog, connection).unwrap();
    q.select("nope", None);
    let err = q.rows().await.unwrap_err();
    assert_eq!(err.code(), Some(1054));
    assert_eq!(err.sql(), Some(format!("SELECT `nope`\nFROM {TABLE} AS self").as_str()));
}

#[tokio::test]
async fn test_transaction_forwarding() {
    let (driver, catalog, connection) = setup();
    let q = DbQuery::new("test", catalog, connection).unwrap();
    q.begin_transaction().await.unwrap();
    q.rollback().await.unwrap();
    assert_eq!(
        driver.statements(),
        vec!["SET autocommit = 0", "START TRANSACTION", "ROLLBACK", "SET autocommit = 1"]
    );
}

#[cfg(feature = "cache")]
mod cached {
    use super::*;
    use crate::cache::MokaResultCache;

    fn cached_setup() -> (ScriptedDriver, Arc<TableCatalog>, Arc<Connection<ScriptedDriver>>) {
        let (driver, catalog, connection) = setup();
        connection.set_cache(Some(Arc::new(MokaResultCache::default())));
        (driver, catalog, connection)
    }

    fn cached_select(
        catalog: &Arc<TableCatalog>,
        connection: &Arc<Connection<ScriptedDriver>>,
        force_rebuild: bool,
    ) -> DbQuery<ScriptedDriver> {
        let mut q = DbQuery::new("test", catalog.clone(), connection.clone()).unwrap();
        q.select(Fields::All, None)
            .where_(params! { "name" => "Matwey" })
            .set_caching("people:matwey", Duration::from_secs(60), force_rebuild);
        q
    }

    #[tokio::test]
    async fn test_cached_select_is_shared_between_builders() {
        let (driver, catalog, connection) = cached_setup();
        driver.respond_rows("SELECT", people());

        let mut first = cached_select(&catalog, &connection, false);
        assert_eq!(first.rows().await.unwrap().len(), 4);
        let mut second = cached_select(&catalog, &connection, false);
        assert_eq!(second.rows().await.unwrap().len(), 4);
        assert_eq!(driver.count_matching("SELECT"), 1);

        let mut rebuilt = cached_select(&catalog, &connection, true);
        assert_eq!(rebuilt.rows().await.unwrap().len(), 4);
        assert_eq!(driver.count_matching("SELECT"), 2);
    }

    #[tokio::test]
    async fn test_cached_page_keeps_its_row_count() {
        let (driver, catalog, connection) = cached_setup();
        driver
            .respond_rows("FOUND_ROWS()", rows_of("FOUND_ROWS()", &[57]))
            .respond_rows("SQL_CALC_FOUND_ROWS", rows_of("id", &[1, 2]));

        let page = |connection: &Arc<Connection<ScriptedDriver>>| {
            let mut q = DbQuery::new("test", catalog.clone(), connection.clone()).unwrap();
            q.select(Fields::All, Some(CALC_FOUND_ROWS))
                .limit(Some(2))
                .set_caching("test:page:1", Duration::from_secs(60), false);
            q
        };

        let mut q = page(&connection);
        assert_eq!(q.get_row_count().await.unwrap(), 57);

        connection
            .query("UPDATE other SET x = 1 WHERE id = 9")
            .await
            .unwrap();

        let mut q = page(&connection);
        assert_eq!(q.get_row_count().await.unwrap(), 57);
        assert_eq!(q.get_page_count().await.unwrap(), 29);
        assert_eq!(
            driver.statements(),
            vec![
                format!("SELECT SQL_CALC_FOUND_ROWS *\nFROM {TABLE} AS self\nLIMIT 2"),
                "SELECT FOUND_ROWS()".to_string(),
                "UPDATE other SET x = 1 WHERE id = 9".to_string(),
            ]
        );
    }
}
