/// Configuration and session tests
///
/// Sessions opened from JSON files and environment-style lookups against
/// named in-memory databases.
/// Run with: cargo test --test config_session_tests
use procdb::memory::MemoryDatabase;
use procdb::{
    BackendKind, Column, ConnectionConfig, DataType, DbError, DialectKind, EntityShape,
    QueryResult, Session, SessionState, Value,
};
use std::collections::HashMap;
use std::io::Write;
use tempfile::NamedTempFile;

fn register_numbers(name: &str) -> MemoryDatabase {
    let db = MemoryDatabase::named(name);
    db.register_function("list_numbers", |args| {
        let count = args.first().and_then(Value::as_i64).unwrap_or(0);
        Ok((1..=count).fold(QueryResult::with_columns(["n"]), |result, n| {
            result.row([Value::Integer(n)])
        }))
    });
    db
}

#[test]
fn test_session_from_json_file() {
    let db = register_numbers("config_json_file");

    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"url": "memory://config_json_file", "dialect": "postgres", "fetch_size": 7, "auto_commit": false}}"#
    )
    .unwrap();

    let config = ConnectionConfig::from_json_file(file.path()).unwrap();
    assert_eq!(config.dialect, DialectKind::PostgreSql);
    assert_eq!(
        config.backend().unwrap(),
        BackendKind::Memory("config_json_file".into())
    );

    let mut session = Session::open(&config).unwrap();
    assert_eq!(session.default_fetch_size(), 7);
    assert!(!session.is_auto_commit());

    let numbers = session
        .get_list::<i64>("SELECT * FROM list_numbers(?)", &[Value::Integer(20)])
        .unwrap();
    assert_eq!(numbers, (1..=20).collect::<Vec<_>>());
    // 7 + 7 + 6, then the empty batch that ends the result
    assert_eq!(db.stats().fetches, 4);

    session.commit().unwrap();
    assert_eq!(db.stats().commits, 1);
}

#[test]
fn test_missing_config_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.json");

    assert!(matches!(
        ConnectionConfig::from_json_file(&missing),
        Err(DbError::ConfigError(_))
    ));
}

#[test]
fn test_session_from_lookup() {
    register_numbers("config_lookup");
    let vars: HashMap<&str, &str> = [
        ("ORDERS_URL", "memory://config_lookup"),
        ("ORDERS_DIALECT", "mysql"),
        ("ORDERS_FETCH_SIZE", "3"),
    ]
    .into_iter()
    .collect();

    let config =
        ConnectionConfig::from_lookup("orders", |key| vars.get(key).map(|v| v.to_string())).unwrap();
    let mut session = Session::open(&config).unwrap();

    assert_eq!(session.dialect().name(), "mysql");
    let mut cursor = session
        .get_cursor::<i64>("CALL list_numbers(?)", &[Value::Integer(5)])
        .unwrap();
    assert_eq!(cursor.fetch_size(), 3);
    assert_eq!(cursor.fetch_list().unwrap(), vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_unsupported_scheme_is_rejected() {
    assert!(matches!(
        ConnectionConfig::from_url("mysql://localhost/orders"),
        Err(DbError::ConfigError(_))
    ));
    assert!(matches!(
        Session::open(&ConnectionConfig::new("redis://localhost")),
        Err(DbError::ConfigError(_))
    ));
    assert!(matches!(
        Session::open(&ConnectionConfig::new("memory://zero").fetch_size(0)),
        Err(DbError::ConfigError(_))
    ));
}

#[test]
fn test_records_follow_runtime_shape() {
    let db = MemoryDatabase::new();
    db.register_function("find_customers", |_| {
        Ok(QueryResult::with_columns(["ID", "FULL_NAME", "score"])
            .row([Value::Integer(1), Value::Text("Ada".into()), Value::Float(0.5)])
            .row([Value::Integer(2), Value::Text("Alan".into()), Value::Null]))
    });
    let mut session = Session::new(Box::new(db.connect()), DialectKind::PostgreSql.create());
    let shape = EntityShape::record(
        "Customer",
        vec![
            Column::new("id", DataType::Integer),
            Column::new("fullName", DataType::Text),
            Column::new("score", DataType::Float).nullable(true),
        ],
    );

    let records = session.get_records("SELECT * FROM find_customers()", &shape, &[]).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get("fullName"), Some(&Value::Text("Ada".into())));
    assert_eq!(records[1].get("score"), Some(&Value::Null));
    assert_eq!(records[1].to_string(), "{id: 2, fullName: Alan, score: NULL}");
}

#[test]
fn test_one_shot_fetches() {
    let db = register_numbers("one_shot_fetches");
    let mut session = Session::new(Box::new(db.connect()), DialectKind::PostgreSql.create());
    let sql = "SELECT * FROM list_numbers(?)";

    assert!(matches!(
        session.get_single::<i64>(sql, &[Value::Integer(0)]),
        Err(DbError::NotFound)
    ));
    assert!(matches!(
        session.get_single::<i64>(sql, &[Value::Integer(2)]),
        Err(DbError::TooManyRows)
    ));
    assert!(matches!(
        session.get_single_or_null::<i64>(sql, &[Value::Integer(2)]),
        Err(DbError::TooManyRows)
    ));
    assert_eq!(session.get_single::<i64>(sql, &[Value::Integer(1)]).unwrap(), 1);
    assert_eq!(session.get_single_or_null::<i64>(sql, &[Value::Integer(0)]).unwrap(), None);
    assert!(session.get_list::<i64>(sql, &[Value::Integer(0)]).unwrap().is_empty());

    let mut cursor = session.get_cursor::<i64>(sql, &[Value::Integer(1)]).unwrap();
    assert_eq!(cursor.fetch_single().unwrap(), 1);
    assert!(cursor.is_closed());
    assert!(matches!(cursor.next_row(), Err(DbError::CursorClosed)));
}

#[test]
fn test_broken_session_stays_broken() {
    let db = register_numbers("broken_session");
    let mut session = Session::new(Box::new(db.connect()), DialectKind::PostgreSql.create());

    assert!(matches!(
        session.execute("SELECT * FROM missing_function()", &[]),
        Err(DbError::ExecutionError(_))
    ));
    assert_eq!(session.state(), SessionState::Active);

    db.set_offline(true);
    assert!(matches!(
        session.get_list::<i64>("SELECT * FROM list_numbers(?)", &[Value::Integer(1)]),
        Err(DbError::ConnectivityError(_))
    ));
    assert!(session.is_broken());

    db.set_offline(false);
    let statements = db.stats().statements;
    assert!(matches!(
        session.get_list::<i64>("SELECT * FROM list_numbers(?)", &[Value::Integer(1)]),
        Err(DbError::ConnectivityError(_))
    ));
    assert_eq!(db.stats().statements, statements);

    session.close().unwrap();
    assert!(matches!(session.execute("COMMIT", &[]), Err(DbError::SessionClosed)));
}
