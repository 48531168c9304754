#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use sql_mapper::{
    Entity, MappedEnum, MapperConfig, MapperError, SqlMapper, SqlValue, StorageDatetime, Value,
};
use sql_mapper_sqlite::SqliteConnection;

#[derive(MappedEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ProductType {
    #[default]
    #[mapped(rename = "BOOK")]
    Book,
    #[mapped(rename = "MUSIC")]
    Music,
    #[mapped(rename = "SOFTWARE")]
    Software,
}

#[derive(Entity, Debug, Clone, PartialEq, Default)]
#[table(name = "products")]
struct Product {
    #[id]
    #[generated]
    id: i64,
    #[enumerated(name)]
    product_type: ProductType,
    product_code: String,
    rank: i32,
    unit_price: Option<Decimal>,
    introduced: Option<NaiveDateTime>,
    last_modified: Option<StorageDatetime>,
}

#[derive(Entity, Debug, Clone, PartialEq, Default)]
#[table(name = "customers")]
struct Customer {
    #[id]
    #[generated]
    id: i64,
    #[version]
    version: i64,
    name: String,
}

#[derive(Entity, Debug, Clone, PartialEq, Default)]
#[table(name = "ledger")]
struct Ledger {
    #[id]
    #[generated]
    id: i64,
    amount: Option<Decimal>,
    big: Option<i128>,
    posted_at: Option<NaiveDateTime>,
    value_date: Option<NaiveDate>,
    cutoff: Option<NaiveTime>,
    settled: bool,
    memo: Option<String>,
}

#[derive(Entity, Debug, Clone, PartialEq, Default)]
#[table(name = "legacy_prices")]
struct LegacyPrice {
    #[id]
    id: i64,
    amount: Option<Decimal>,
}

const SCHEMA: &str = "
    CREATE TABLE products (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        product_type TEXT NOT NULL,
        product_code TEXT NOT NULL,
        rank INTEGER NOT NULL,
        unit_price DECIMAL_TEXT(10,2),
        introduced TIMESTAMP,
        last_modified TIMESTAMP
    );
    CREATE TABLE ledger (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        amount DECIMAL_TEXT(30,10),
        big DECIMAL_TEXT(38,0),
        posted_at TIMESTAMP,
        value_date DATE,
        cutoff TIME,
        settled BOOLEAN NOT NULL,
        memo TEXT
    );
    CREATE TABLE legacy_prices (
        id INTEGER PRIMARY KEY,
        amount DECIMAL(30,10)
    );
    CREATE TABLE customers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        version INTEGER NOT NULL,
        name TEXT NOT NULL
    );
    INSERT INTO products (product_type, product_code, rank, unit_price, introduced)
    VALUES ('BOOK', 'A1', 1, '10.5', '2017-05-04 13:14:15'),
           ('MUSIC', 'B2', 2, NULL, NULL),
           ('SOFTWARE', 'C3', 3, '99.25', '2019-11-30 08:00:00');
";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn setup() -> (SqlMapper, SqliteConnection) {
    init_tracing();
    let conn = SqliteConnection::open_in_memory().expect("open in-memory database");
    conn.execute_batch(SCHEMA).expect("create schema");
    (SqlMapper::new(MapperConfig::default()), conn)
}

fn timestamp(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, s)
        .unwrap()
}

#[test]
fn object_from_clause_hydrates_every_column() {
    let (mapper, mut conn) = setup();

    let product: Product = mapper
        .object_from_clause(&mut conn, "product_code = ?", &["A1".into()])
        .unwrap()
        .expect("A1 exists");

    assert_eq!(
        product,
        Product {
            id: 1,
            product_type: ProductType::Book,
            product_code: "A1".into(),
            rank: 1,
            unit_price: Some(Decimal::new(105, 1)),
            introduced: Some(timestamp(2017, 5, 4, 13, 14, 15)),
            last_modified: None,
        }
    );
}

#[test]
fn null_columns_leave_defaults() {
    let (mapper, mut conn) = setup();

    let product: Product = mapper
        .object_from_clause(&mut conn, "product_code = ?", &["B2".into()])
        .unwrap()
        .unwrap();
    assert_eq!(product.product_type, ProductType::Music);
    assert_eq!(product.unit_price, None);
    assert_eq!(product.introduced, None);
}

#[test]
fn missing_row_is_none() {
    let (mapper, mut conn) = setup();

    let product: Option<Product> = mapper
        .object_from_clause(&mut conn, "product_code = ?", &["Z9".into()])
        .unwrap();
    assert_eq!(product, None);
    let by_id: Option<Product> = mapper.object_by_id(&mut conn, &[Value::from(42i64)]).unwrap();
    assert_eq!(by_id, None);
}

#[test]
fn insert_assigns_generated_id_and_round_trips() {
    let (mapper, mut conn) = setup();
    let modified = StorageDatetime::from_naive_utc(timestamp(2024, 2, 29, 23, 59, 58));
    let mut product = Product {
        product_type: ProductType::Software,
        product_code: "D4".into(),
        rank: 4,
        unit_price: Some(Decimal::new(725, 2)),
        last_modified: Some(modified),
        ..Default::default()
    };

    let rows = mapper.insert_object(&mut conn, &mut product).unwrap();
    assert_eq!(rows, 1);
    assert_eq!(product.id, 4);

    let stored: Product = mapper
        .object_by_id(&mut conn, &[Value::from(product.id)])
        .unwrap()
        .unwrap();
    assert_eq!(stored, product);

    let by_code: Vec<Product> = mapper
        .list_from_clause(&mut conn, "product_code = ?", &["D4".into()])
        .unwrap();
    assert_eq!(by_code, vec![product]);
}

#[test]
fn every_coercion_pair_round_trips() {
    let (mapper, mut conn) = setup();
    let posted = NaiveDate::from_ymd_opt(2023, 12, 31)
        .unwrap()
        .and_hms_micro_opt(23, 59, 59, 123_456)
        .unwrap();
    let mut full = Ledger {
        amount: Some("1234567890.123456789".parse().unwrap()),
        big: Some(170_141_183_460_469_231_731),
        posted_at: Some(posted),
        value_date: Some(posted.date()),
        cutoff: Some(NaiveTime::from_hms_milli_opt(8, 30, 15, 250).unwrap()),
        settled: true,
        memo: Some("opening balance".into()),
        ..Default::default()
    };
    let mut empty = Ledger::default();

    mapper.insert_object(&mut conn, &mut full).unwrap();
    mapper.insert_object(&mut conn, &mut empty).unwrap();

    for expected in [full, empty] {
        let stored: Ledger = mapper
            .object_by_id(&mut conn, &[Value::from(expected.id)])
            .unwrap()
            .unwrap();
        assert_eq!(stored, expected);
    }
}

#[test]
fn lossy_decimal_storage_is_an_error() {
    let (mapper, mut conn) = setup();
    let amount: Decimal = "1234567890.123456789".parse().unwrap();
    mapper
        .execute_update(
            &mut conn,
            "INSERT INTO legacy_prices (id, amount) VALUES (?, ?)",
            &[Value::from(1i64), Value::from(amount)],
        )
        .unwrap();

    let err = mapper
        .object_by_id::<LegacyPrice, _>(&mut conn, &[Value::from(1i64)])
        .unwrap_err();
    assert!(matches!(err, MapperError::Store(_)), "{err:?}");
    assert!(err.to_string().contains("amount"), "{err}");
}

#[test]
fn count_objects_from_clause() {
    let (mapper, mut conn) = setup();

    let one = mapper
        .count_objects_from_clause::<Product, _>(&mut conn, "product_code = ?", &["A1".into()])
        .unwrap();
    let none = mapper
        .count_objects_from_clause::<Product, _>(&mut conn, "product_code = ?", &["Z9".into()])
        .unwrap();
    assert_eq!((one, none), (1, 0));
}

#[test]
fn list_from_clause_respects_order() {
    let (mapper, mut conn) = setup();

    let products: Vec<Product> = mapper
        .list_from_clause(&mut conn, "rank > ? ORDER BY rank DESC", &[Value::from(1i32)])
        .unwrap();
    let codes: Vec<&str> = products.iter().map(|p| p.product_code.as_str()).collect();
    assert_eq!(codes, vec!["C3", "B2"]);

    let all: Vec<Product> = mapper.list(&mut conn).unwrap();
    assert_eq!(all.len(), 3);
}

#[test]
fn list_from_query_hydrates_selected_columns() {
    let (mapper, mut conn) = setup();

    let products: Vec<Product> = mapper
        .list_from_query(
            &mut conn,
            "SELECT id, product_code FROM products WHERE rank <= ? ORDER BY id",
            &[Value::from(2i32)],
        )
        .unwrap();
    assert_eq!(products.len(), 2);
    assert_eq!(products[1].id, 2);
    assert_eq!(products[1].product_code, "B2");
    assert_eq!(products[1].rank, 0);
}

#[test]
fn list_from_query_rejects_unmapped_column() {
    let (mapper, mut conn) = setup();

    let err = mapper
        .list_from_query::<Product, _>(&mut conn, "SELECT id, 7 AS lucky FROM products", &[])
        .unwrap_err();
    assert!(matches!(err, MapperError::UnknownColumn { ref column, .. } if column == "lucky"));
}

#[test]
fn batched_insert_leaves_ids_unassigned() {
    let (mapper, mut conn) = setup();
    let batch = vec![
        Product {
            product_code: "E5".into(),
            rank: 5,
            ..Default::default()
        },
        Product {
            product_code: "F6".into(),
            rank: 6,
            ..Default::default()
        },
    ];

    let counts = mapper.insert_list_batched(&mut conn, &batch).unwrap();
    assert_eq!(counts, vec![1, 1]);
    assert!(batch.iter().all(|p| p.id == 0));
    let total = mapper
        .count_objects_from_clause::<Product, _>(&mut conn, "rank > ?", &[Value::from(0i32)])
        .unwrap();
    assert_eq!(total, 5);
}

#[test]
fn unbatched_insert_assigns_each_id() {
    let (mapper, mut conn) = setup();
    let mut list = vec![
        Product {
            product_code: "E5".into(),
            ..Default::default()
        },
        Product {
            product_code: "F6".into(),
            ..Default::default()
        },
    ];

    let rows = mapper.insert_list_not_batched(&mut conn, &mut list).unwrap();
    assert_eq!(rows, 2);
    assert_eq!(list.iter().map(|p| p.id).collect::<Vec<_>>(), vec![4, 5]);
}

#[test]
fn versioned_update_advances_and_detects_stale_copies() {
    let (mapper, mut conn) = setup();
    let mut customer = Customer {
        version: 5,
        name: "Ada".into(),
        ..Default::default()
    };
    mapper.insert_object(&mut conn, &mut customer).unwrap();
    let mut stale = customer.clone();

    customer.name = "Ada L.".into();
    assert_eq!(mapper.update_object(&mut conn, &mut customer).unwrap(), 1);
    assert_eq!(customer.version, 6);

    let stored: Customer = mapper
        .object_by_id(&mut conn, &[Value::from(customer.id)])
        .unwrap()
        .unwrap();
    assert_eq!(stored, customer);

    stale.name = "Grace".into();
    let err = mapper.update_object(&mut conn, &mut stale).unwrap_err();
    assert!(err.is_version_conflict());
    assert_eq!(stale.version, 5);
}

#[test]
fn versioned_delete_checks_version() {
    let (mapper, mut conn) = setup();
    let mut customer = Customer {
        version: 1,
        name: "Linus".into(),
        ..Default::default()
    };
    mapper.insert_object(&mut conn, &mut customer).unwrap();

    let stale = Customer {
        version: 0,
        ..customer.clone()
    };
    assert!(mapper.delete_object(&mut conn, &stale).unwrap_err().is_version_conflict());

    assert_eq!(mapper.delete_object(&mut conn, &customer).unwrap(), 1);
    let gone: Option<Customer> = mapper
        .object_by_id(&mut conn, &[Value::from(customer.id)])
        .unwrap();
    assert_eq!(gone, None);
}

#[test]
fn delete_by_id_with_version_argument() {
    let (mapper, mut conn) = setup();
    let mut customer = Customer {
        version: 3,
        name: "Barbara".into(),
        ..Default::default()
    };
    mapper.insert_object(&mut conn, &mut customer).unwrap();

    let rows = mapper
        .delete_object_by_id::<Customer, _>(
            &mut conn,
            &[Value::from(customer.id), Value::from(3i64)],
        )
        .unwrap();
    assert_eq!(rows, 1);
}

#[test]
fn number_from_sql_and_execute_update() {
    let (mapper, mut conn) = setup();

    let max = mapper
        .number_from_sql(&mut conn, "SELECT MAX(rank) FROM products", &[])
        .unwrap();
    assert_eq!(max, Some(SqlValue::BigInt(3)));

    let changed = mapper
        .execute_update(
            &mut conn,
            "UPDATE products SET rank = rank + ? WHERE product_code = ?",
            &[Value::from(10i32), "A1".into()],
        )
        .unwrap();
    assert_eq!(changed, 1);

    let max = mapper
        .number_from_sql(&mut conn, "SELECT MAX(rank) FROM products", &[])
        .unwrap();
    assert_eq!(max, Some(SqlValue::BigInt(11)));

    let empty = mapper
        .number_from_sql(&mut conn, "SELECT MAX(id) FROM customers", &[])
        .unwrap();
    assert_eq!(empty, None);
}

#[test]
fn statements_are_cached_across_operations() {
    let (mapper, mut conn) = setup();

    for code in ["A1", "B2", "C3"] {
        let _: Option<Product> = mapper
            .object_from_clause(&mut conn, "product_code = ?", &[code.into()])
            .unwrap();
    }
    assert_eq!(mapper.cache().clause_entries(), 1);
    assert_eq!(mapper.registry().build_count(), 1);
}
