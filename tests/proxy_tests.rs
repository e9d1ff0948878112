/// Typed proxy tests
///
/// End-to-end calls through `#[stored_procedures]` proxies backed by the
/// in-memory database.
/// Run with: cargo test --test proxy_tests
use chrono::{DateTime, Utc};
use procdb::memory::MemoryDatabase;
use procdb::{
    Cursor, DbError, Entity, PostgreSqlDialect, ProxyFactory, QueryResult, Result, ReturnShape,
    Session, Value, stored_procedures,
};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Entity)]
struct Order {
    id: i64,
    customer_name: String,
    note: Option<String>,
}

#[derive(Debug, Entity)]
#[entity(name = "OrderTotal")]
struct Total {
    #[entity(rename = "amount")]
    sum: f64,
}

#[stored_procedures]
trait OrderRepository {
    fn get_order(&mut self, id: i32) -> Result<Option<Order>>;

    fn find_orders(&mut self, #[like_prefix] customer: &str) -> Result<Vec<Order>>;

    fn stream_orders(&mut self) -> Result<Cursor<'_, Order>>;

    fn orders_by_status(&mut self, #[bit_mask] statuses: Vec<i32>) -> Result<Vec<Order>>;

    fn orders_since(&mut self, #[timestamp] since: i64) -> Result<Vec<Order>>;

    fn order_total(&mut self, #[upper_case] currency: &str) -> Result<Option<Total>>;

    fn count_orders(&mut self) -> Result<Option<i64>>;

    fn archive_orders(&mut self, days: i32) -> Result<()>;
}

fn order_row(id: i64, customer: &str) -> [Value; 4] {
    [
        Value::Integer(id),
        Value::Text(customer.to_string()),
        Value::Null,
        Value::Text("ignored".into()),
    ]
}

fn orders(count: i64) -> QueryResult {
    (1..=count).fold(
        QueryResult::with_columns(["id", "customer_name", "note", "internal_flag"]),
        |result, id| result.row(order_row(id, "Ada")),
    )
}

fn database() -> MemoryDatabase {
    let db = MemoryDatabase::new();
    db.register_function("get_order", |args| {
        let result = QueryResult::with_columns(["id", "customer_name", "note", "internal_flag"]);
        match args.first() {
            Some(Value::Integer(7)) => Ok(result.row(order_row(7, "Ada Lovelace"))),
            _ => Ok(result),
        }
    });
    db.register_function("find_orders", |_| Ok(orders(2)));
    db.register_function("stream_orders", |_| Ok(orders(45)));
    db.register_function("orders_by_status", |_| Ok(orders(1)));
    db.register_function("orders_since", |_| Ok(orders(3)));
    db.register_function("order_total", |_| {
        Ok(QueryResult::with_columns(["AMOUNT"]).row([Value::Float(99.5)]))
    });
    db.register_function("count_orders", |_| Ok(QueryResult::scalar("count", 12i64)));
    db.register_function("archive_orders", |_| Ok(QueryResult::empty()));
    db
}

fn session(db: &MemoryDatabase) -> Session {
    Session::new(Box::new(db.connect()), Arc::new(PostgreSqlDialect))
}

#[test]
fn test_get_order_maps_single_row() {
    let db = database();
    let mut session = session(&db);
    let factory = ProxyFactory::new(Arc::new(PostgreSqlDialect));
    let mut repo = factory.get_proxy::<dyn OrderRepository>(&mut session).unwrap();

    let order = repo.get_order(7).unwrap().unwrap();
    assert_eq!(
        order,
        Order {
            id: 7,
            customer_name: "Ada Lovelace".into(),
            note: None,
        }
    );

    let call = db.last_statement().unwrap();
    assert_eq!(call.sql, "SELECT * FROM get_order(?)");
    assert_eq!(call.params, vec![Value::Integer(7)]);
}

#[test]
fn test_get_order_zero_rows_is_none() {
    let db = database();
    let mut session = session(&db);
    let factory = ProxyFactory::new(Arc::new(PostgreSqlDialect));
    let mut repo = factory.get_proxy::<dyn OrderRepository>(&mut session).unwrap();

    assert_eq!(repo.get_order(8).unwrap(), None);
}

#[test]
fn test_preprocessors_run_before_binding() {
    let db = database();
    let mut session = session(&db);
    let factory = ProxyFactory::new(Arc::new(PostgreSqlDialect));
    let mut repo = factory.get_proxy::<dyn OrderRepository>(&mut session).unwrap();

    assert_eq!(repo.find_orders("Ada_100%").unwrap().len(), 2);
    assert_eq!(db.last_statement().unwrap().params, vec![Value::Text("ada\\_100\\%%".into())]);

    repo.orders_by_status(vec![0, 2, 5]).unwrap();
    assert_eq!(db.last_statement().unwrap().params, vec![Value::Integer(0b100101)]);

    repo.orders_by_status(Vec::new()).unwrap();
    assert_eq!(db.last_statement().unwrap().params, vec![Value::Null]);

    repo.orders_since(1_700_000_000_000).unwrap();
    let expected = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000).unwrap();
    assert_eq!(db.last_statement().unwrap().params, vec![Value::Timestamp(expected)]);

    let total = repo.order_total("eur").unwrap().unwrap();
    assert_eq!(total.sum, 99.5);
    assert_eq!(db.last_statement().unwrap().params, vec![Value::Text("EUR".into())]);
}

#[test]
fn test_scalar_and_void_procedures() {
    let db = database();
    let mut session = session(&db);
    let factory = ProxyFactory::new(Arc::new(PostgreSqlDialect));
    let mut repo = factory.get_proxy::<dyn OrderRepository>(&mut session).unwrap();

    assert_eq!(repo.count_orders().unwrap(), Some(12));

    repo.archive_orders(30).unwrap();
    let call = db.last_statement().unwrap();
    assert_eq!(call.sql, "SELECT * FROM archive_orders(?)");
    assert_eq!(call.params, vec![Value::Integer(30)]);
}

#[test]
fn test_cursor_streams_in_batches() {
    let db = database();
    let mut session = session(&db);
    let factory = ProxyFactory::new(Arc::new(PostgreSqlDialect));
    let mut repo = factory.get_proxy::<dyn OrderRepository>(&mut session).unwrap();

    let mut cursor = repo.stream_orders().unwrap();
    assert_eq!(cursor.fetch_size(), 20);

    let first = cursor.next_row().unwrap().unwrap();
    assert_eq!(first.id, 1);
    assert_eq!(db.stats().fetches, 1);

    let rest: Vec<Order> = cursor.by_ref().collect::<Result<_>>().unwrap();
    assert_eq!(rest.len(), 44);
    assert!(cursor.is_closed());
    assert_eq!(db.stats().fetches, 4);
}

#[test]
fn test_declaration_reflects_trait() {
    let factory = ProxyFactory::new(Arc::new(PostgreSqlDialect));
    let implementation = factory.implementation::<dyn OrderRepository>().unwrap();

    assert_eq!(implementation.interface_name(), "OrderRepository");
    assert_eq!(implementation.procedures().len(), 8);

    let find = implementation.procedure("findOrders").unwrap();
    assert_eq!(find.sql(), "SELECT * FROM find_orders(?)");
    assert_eq!(find.declaration().params[0].name, "customer");

    let total = implementation.procedure("orderTotal").unwrap();
    match total.returns() {
        ReturnShape::Single(shape) => {
            assert_eq!(shape.name, "OrderTotal");
            assert_eq!(shape.columns()[0].name, "amount");
        }
        other => panic!("unexpected return shape {other:?}"),
    }

    let order = Order::shape();
    let names: Vec<&str> = order.columns().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "customerName", "note"]);
    assert!(order.columns()[2].nullable);
    assert!(!order.columns()[1].nullable);
}

#[test]
fn test_missing_column_is_mapping_error() {
    let db = database();
    db.register_function("get_order", |_| {
        Ok(QueryResult::with_columns(["id"]).row([Value::Integer(7)]))
    });
    let mut session = session(&db);
    let factory = ProxyFactory::new(Arc::new(PostgreSqlDialect));
    let mut repo = factory.get_proxy::<dyn OrderRepository>(&mut session).unwrap();

    match repo.get_order(7) {
        Err(DbError::MappingError(msg)) => assert!(msg.contains("customer_name")),
        other => panic!("expected a mapping error, got {other:?}"),
    }
}

#[test]
fn test_null_into_required_field_is_mapping_error() {
    let db = database();
    db.register_function("get_order", |_| {
        Ok(QueryResult::with_columns(["id", "customer_name", "note"])
            .row([Value::Integer(7), Value::Null, Value::Null]))
    });
    let mut session = session(&db);
    let factory = ProxyFactory::new(Arc::new(PostgreSqlDialect));
    let mut repo = factory.get_proxy::<dyn OrderRepository>(&mut session).unwrap();

    assert!(matches!(repo.get_order(7), Err(DbError::MappingError(_))));
}

#[derive(Debug, Entity)]
struct Empty {}

#[stored_procedures(name = "Broken")]
trait BrokenRepository {
    fn load_empty(&mut self) -> Result<Vec<Empty>>;
}

#[test]
fn test_unrepresentable_interface_fails_before_any_call() {
    let db = database();
    let mut session = session(&db);
    let factory = ProxyFactory::new(Arc::new(PostgreSqlDialect));

    assert!(matches!(
        factory.get_proxy::<dyn BrokenRepository>(&mut session),
        Err(DbError::GenerationError(_))
    ));
    assert!(db.statements().is_empty());
    assert!(!factory.is_interface_cached::<dyn BrokenRepository>().unwrap());
}

#[test]
fn test_global_factory_reuses_implementation() {
    let db = database();
    let mut first = session(&db);
    let mut second = session(&db);

    let a = ProxyFactory::global()
        .get_proxy::<dyn OrderRepository>(&mut first)
        .unwrap()
        .implementation()
        .id();
    let b = ProxyFactory::global()
        .get_proxy::<dyn OrderRepository>(&mut second)
        .unwrap()
        .implementation()
        .id();

    assert_eq!(a, b);
    assert!(ProxyFactory::global().is_interface_cached::<dyn OrderRepository>().unwrap());
}

#[derive(Debug, PartialEq, Entity)]
struct Sample {
    id: i64,
    x_1: f64,
    reading_2b: Option<i64>,
}

#[stored_procedures]
trait SampleRepository {
    fn load_sample_v_2(&mut self, series_1: i32) -> Result<Option<Sample>>;
}

#[test]
fn test_digit_segments_keep_their_names() {
    let db = MemoryDatabase::new();
    db.register_function("load_sample_v_2", |_| {
        Ok(QueryResult::with_columns(["id", "x_1", "reading_2b"])
            .row([Value::Integer(3), Value::Float(0.25), Value::Integer(9)]))
    });
    let mut session = session(&db);
    let factory = ProxyFactory::new(Arc::new(PostgreSqlDialect));
    let mut repo = factory.get_proxy::<dyn SampleRepository>(&mut session).unwrap();

    let sample = repo.load_sample_v_2(1).unwrap().unwrap();
    assert_eq!(
        sample,
        Sample {
            id: 3,
            x_1: 0.25,
            reading_2b: Some(9),
        }
    );
    assert_eq!(db.last_statement().unwrap().sql, "SELECT * FROM load_sample_v_2(?)");

    let names: Vec<String> = Sample::shape().columns().iter().map(|c| c.name.clone()).collect();
    assert_eq!(names, vec!["id", "x_1", "reading_2b"]);
}
