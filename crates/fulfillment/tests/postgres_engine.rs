//! Fulfillment engine tests against a real PostgreSQL store.
//!
//! These tests use a shared PostgreSQL container for efficiency and are
//! serialized because each one truncates the shared tables.

use std::sync::Arc;

use common::Money;
use fulfillment::{FulfillmentEngine, FulfillmentError, LineRequest, OrderRequest};
use serial_test::serial;
use sqlx::PgPool;
use store::{NewProduct, PostgresStore, Store};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_shop_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE order_lines, orders, products RESTART IDENTITY")
        .execute(&pool)
        .await
        .unwrap();

    PostgresStore::new(pool)
}

async fn seed(store: &PostgresStore, sku: &str, quantity: u32, price_cents: i64) -> common::ProductId {
    store
        .create_product(
            NewProduct::new(sku, format!("{sku} widget"))
                .price(Money::from_cents(price_cents))
                .quantity(quantity),
        )
        .await
        .unwrap()
        .id
}

#[tokio::test]
#[serial]
async fn place_order_commits_atomically() {
    let store = get_test_store().await;
    let product = seed(&store, "SKU-PG-1", 5, 1000).await;
    let engine = FulfillmentEngine::new(store.clone());

    let receipt = engine
        .place_order(OrderRequest::new(None, vec![LineRequest::new(product, 3)]))
        .await
        .unwrap();

    assert_eq!(receipt.total.cents(), 3000);
    assert_eq!(
        store.get_product(product).await.unwrap().unwrap().quantity,
        2
    );

    let read = store.get_order(receipt.order_id).await.unwrap().unwrap();
    assert_eq!(read.lines.len(), 1);
    assert_eq!(read.lines[0].unit_price.cents(), 1000);
    assert_eq!(read.lines[0].product_name, "SKU-PG-1 widget");
}

#[tokio::test]
#[serial]
async fn failed_order_rolls_back_everything() {
    let store = get_test_store().await;
    let good = seed(&store, "SKU-PG-2", 5, 1000).await;
    let low = seed(&store, "SKU-PG-3", 1, 500).await;
    let engine = FulfillmentEngine::new(store.clone());

    let result = engine
        .place_order(OrderRequest::new(
            None,
            vec![LineRequest::new(good, 2), LineRequest::new(low, 2)],
        ))
        .await;

    assert!(matches!(
        result,
        Err(FulfillmentError::InsufficientStock(id)) if id == low
    ));
    assert_eq!(store.get_product(good).await.unwrap().unwrap().quantity, 5);
    assert_eq!(store.get_product(low).await.unwrap().unwrap().quantity, 1);
    assert!(store.list_orders().await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn duplicate_lines_cannot_jointly_overdraw() {
    let store = get_test_store().await;
    let product = seed(&store, "SKU-PG-4", 5, 1000).await;
    let engine = FulfillmentEngine::new(store.clone());

    let result = engine
        .place_order(OrderRequest::new(
            None,
            vec![LineRequest::new(product, 3), LineRequest::new(product, 3)],
        ))
        .await;

    assert!(matches!(
        result,
        Err(FulfillmentError::InsufficientStock(_))
    ));
    assert_eq!(
        store.get_product(product).await.unwrap().unwrap().quantity,
        5
    );
}

#[tokio::test]
#[serial]
async fn concurrent_engines_cannot_oversell() {
    let store = get_test_store().await;
    let product = seed(&store, "SKU-PG-5", 5, 1000).await;

    // Two engines over independent clones of the store handle, racing on
    // the same product row.
    let mut handles = Vec::new();
    for _ in 0..2 {
        let engine = FulfillmentEngine::new(store.clone());
        handles.push(tokio::spawn(async move {
            engine
                .place_order(OrderRequest::new(None, vec![LineRequest::new(product, 3)]))
                .await
        }));
    }

    let mut successes = 0;
    let mut stock_failures = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(FulfillmentError::InsufficientStock(_)) => stock_failures += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(stock_failures, 1);
    assert_eq!(
        store.get_product(product).await.unwrap().unwrap().quantity,
        2
    );
}

#[tokio::test]
#[serial]
async fn opposing_multi_product_orders_both_commit() {
    let store = get_test_store().await;
    let a = seed(&store, "SKU-PG-7", 50, 100).await;
    let b = seed(&store, "SKU-PG-8", 50, 100).await;

    // Two engines racing on the same pair of products, each naming them in
    // the opposite order. Locks are taken in sorted id order, so neither
    // side can hold one row while waiting on the other.
    let mut handles = Vec::new();
    for lines in [
        vec![LineRequest::new(a, 1), LineRequest::new(b, 1)],
        vec![LineRequest::new(b, 1), LineRequest::new(a, 1)],
    ] {
        let engine = FulfillmentEngine::new(store.clone());
        handles.push(tokio::spawn(async move {
            let mut results = Vec::new();
            for _ in 0..10 {
                results.push(
                    engine
                        .place_order(OrderRequest::new(None, lines.clone()))
                        .await,
                );
            }
            results
        }));
    }

    for handle in handles {
        for result in handle.await.unwrap() {
            result.unwrap();
        }
    }

    assert_eq!(store.get_product(a).await.unwrap().unwrap().quantity, 30);
    assert_eq!(store.get_product(b).await.unwrap().unwrap().quantity, 30);
}

#[tokio::test]
#[serial]
async fn price_snapshot_survives_catalog_change() {
    let store = get_test_store().await;
    let product = seed(&store, "SKU-PG-6", 5, 1000).await;
    let engine = FulfillmentEngine::new(store.clone());

    let receipt = engine
        .place_order(OrderRequest::new(None, vec![LineRequest::new(product, 2)]))
        .await
        .unwrap();

    store
        .update_product(
            product,
            NewProduct::new("SKU-PG-6", "SKU-PG-6 widget")
                .price(Money::from_cents(9999))
                .quantity(3),
        )
        .await
        .unwrap();

    let read = store.get_order(receipt.order_id).await.unwrap().unwrap();
    assert_eq!(read.lines[0].unit_price.cents(), 1000);
    assert_eq!(read.order.total.cents(), 2000);
}
