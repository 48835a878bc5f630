//! SQLite integration tests
//!
//! Each test runs against its own database file in the system temp directory.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test sqlite_integration
//! ```

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use store::{
    Money, NewOrder, OrderStatus, ProductDraft, ProductId, SessionRecord, ShopStore, ShopStoreExt,
    SqliteShopStore, StoreError, UserId,
};

const ALICE: UserId = UserId::new(1001);
const BOB: UserId = UserId::new(1002);

fn db_path(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("shop-test-{}-{name}.db", std::process::id()));
    for suffix in ["", "-wal", "-shm"] {
        let mut file = path.clone().into_os_string();
        file.push(suffix);
        let _ = std::fs::remove_file(file);
    }
    path
}

/// Get a fresh store backed by a new database file with migrations applied
async fn get_test_store(name: &str) -> SqliteShopStore {
    let url = format!("sqlite://{}", db_path(name).display());
    let store = SqliteShopStore::connect(&url, 8).await.unwrap();
    store.run_migrations().await.unwrap();
    store
}

async fn add_product(store: &SqliteShopStore, name: &str, price: i64, stock: u32) -> ProductId {
    store
        .upsert_product(ProductDraft::new(name, Money::from_major(price)).with_stock(stock))
        .await
        .unwrap()
        .id
}

async fn order_from_cart(store: &SqliteShopStore, user_id: UserId) -> NewOrder {
    let items = store.cart_items(user_id).await.unwrap();
    NewOrder::from_cart(user_id, "+7 900 123 45 67", &items, Utc::now()).unwrap()
}

#[tokio::test]
async fn product_crud() {
    let store = get_test_store("product_crud").await;

    let product = store
        .upsert_product(
            ProductDraft::new("Green tea", Money::from_minor(45_050))
                .with_description("Loose leaf, 100 g")
                .with_discount(Money::from_minor(39_900))
                .with_stock(12)
                .with_image("https://img.example/tea.png"),
        )
        .await
        .unwrap();

    let loaded = store.require_product(product.id).await.unwrap();
    assert_eq!(loaded, product);
    assert_eq!(loaded.effective_price(), Money::from_minor(39_900));

    let mut draft = ProductDraft::from_product(&loaded);
    draft.name = "Black tea".to_string();
    draft.discount_price = None;
    store.upsert_product(draft).await.unwrap();

    let reloaded = store.require_product(product.id).await.unwrap();
    assert_eq!(reloaded.name, "Black tea");
    assert_eq!(reloaded.discount_price, None);
    assert_eq!(store.list_products().await.unwrap().len(), 1);

    store.delete_product(product.id).await.unwrap();
    assert!(store.get_product(product.id).await.unwrap().is_none());
    assert!(matches!(
        store.delete_product(product.id).await,
        Err(StoreError::ProductNotFound(_))
    ));
}

#[tokio::test]
async fn upsert_unknown_product_fails() {
    let store = get_test_store("upsert_unknown").await;
    let mut draft = ProductDraft::new("Ghost", Money::from_major(1));
    draft.id = Some(ProductId::new(404));

    assert!(matches!(
        store.upsert_product(draft).await,
        Err(StoreError::ProductNotFound(id)) if id == ProductId::new(404)
    ));
}

#[tokio::test]
async fn adjust_stock_is_conditional() {
    let store = get_test_store("adjust_stock").await;
    let id = add_product(&store, "Mug", 300, 2).await;

    assert!(matches!(
        store.adjust_stock(id, -5).await,
        Err(StoreError::InsufficientStock { requested: 5, available: 2, .. })
    ));
    assert_eq!(store.adjust_stock(id, 3).await.unwrap().stock, 5);
    assert_eq!(store.adjust_stock(id, -5).await.unwrap().stock, 0);
    assert!(matches!(
        store.adjust_stock(ProductId::new(999), 1).await,
        Err(StoreError::ProductNotFound(_))
    ));
}

#[tokio::test]
async fn cart_lines_keep_order_and_respect_stock() {
    let store = get_test_store("cart_lines").await;
    let mug = add_product(&store, "Mug", 300, 3).await;
    let tea = add_product(&store, "Tea", 100, 10).await;

    store.add_to_cart(ALICE, tea, 1).await.unwrap();
    store.add_to_cart(ALICE, mug, 2).await.unwrap();
    store.add_to_cart(ALICE, tea, 4).await.unwrap();

    let items = store.cart_items(ALICE).await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].name, "Tea");
    assert_eq!(items[0].quantity, 5);
    assert_eq!(items[1].name, "Mug");
    assert_eq!(
        store.cart_total(ALICE).await.unwrap(),
        Money::from_major(1100)
    );

    assert!(matches!(
        store.add_to_cart(ALICE, mug, 2).await,
        Err(StoreError::InsufficientStock { requested: 4, available: 3, .. })
    ));
    assert!(matches!(
        store.set_cart_quantity(ALICE, mug, 4).await,
        Err(StoreError::InsufficientStock { .. })
    ));

    assert!(store.remove_from_cart(ALICE, mug).await.unwrap());
    assert!(!store.remove_from_cart(ALICE, mug).await.unwrap());
    assert_eq!(store.clear_cart(ALICE).await.unwrap(), 1);
    assert!(store.cart_items(ALICE).await.unwrap().is_empty());
}

#[tokio::test]
async fn commit_order_persists_snapshot() {
    let store = get_test_store("commit_order").await;
    let mug = add_product(&store, "Mug", 300, 3).await;
    let tea = add_product(&store, "Tea", 100, 10).await;
    store.add_to_cart(ALICE, mug, 1).await.unwrap();
    store.add_to_cart(ALICE, tea, 2).await.unwrap();

    let order = store
        .commit_order(order_from_cart(&store, ALICE).await)
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.total, Money::from_major(500));
    assert_eq!(store.require_product(mug).await.unwrap().stock, 2);
    assert_eq!(store.require_product(tea).await.unwrap().stock, 8);
    assert!(store.cart_items(ALICE).await.unwrap().is_empty());

    // Price changes after checkout do not touch the order.
    let mut draft = ProductDraft::from_product(&store.require_product(mug).await.unwrap());
    draft.price = Money::from_major(999);
    store.upsert_product(draft).await.unwrap();

    let stored = store.require_order(order.id).await.unwrap();
    assert_eq!(stored.lines.len(), 2);
    assert_eq!(stored.lines[0].product_name, "Mug");
    assert_eq!(stored.lines[0].unit_price, Money::from_major(300));
    assert_eq!(stored.total, Money::from_major(500));
    assert_eq!(stored.contact, "+7 900 123 45 67");
}

#[tokio::test]
async fn commit_order_rolls_back_on_shortage() {
    let store = get_test_store("commit_rollback").await;
    let plenty = add_product(&store, "Plenty", 10, 10).await;
    let scarce = add_product(&store, "Scarce", 10, 1).await;
    store.add_to_cart(ALICE, plenty, 3).await.unwrap();
    store.add_to_cart(ALICE, scarce, 1).await.unwrap();
    let order = order_from_cart(&store, ALICE).await;

    store.adjust_stock(scarce, -1).await.unwrap();

    let result = store.commit_order(order).await;
    assert!(matches!(
        result,
        Err(StoreError::InsufficientStock { product_id, available: 0, .. }) if product_id == scarce
    ));
    assert_eq!(store.require_product(plenty).await.unwrap().stock, 10);
    assert_eq!(store.cart_items(ALICE).await.unwrap().len(), 2);
    assert!(store.list_orders(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn commit_order_rejects_stale_cart() {
    let store = get_test_store("commit_stale").await;
    let tea = add_product(&store, "Tea", 10, 10).await;
    store.add_to_cart(ALICE, tea, 1).await.unwrap();
    let order = order_from_cart(&store, ALICE).await;

    store.set_cart_quantity(ALICE, tea, 3).await.unwrap();

    assert!(matches!(
        store.commit_order(order).await,
        Err(StoreError::StaleCart(_))
    ));
    assert_eq!(store.require_product(tea).await.unwrap().stock, 10);
}

#[tokio::test]
async fn commit_order_rejects_repriced_snapshot() {
    let store = get_test_store("commit_repriced").await;
    let tea = add_product(&store, "Tea", 100, 5).await;
    store.add_to_cart(ALICE, tea, 1).await.unwrap();
    let order = order_from_cart(&store, ALICE).await;

    let mut draft = ProductDraft::from_product(&store.require_product(tea).await.unwrap());
    draft.name = "Tea v2".to_string();
    draft.price = Money::from_major(500);
    store.upsert_product(draft).await.unwrap();

    assert!(matches!(
        store.commit_order(order).await,
        Err(StoreError::StaleCart(user)) if user == ALICE
    ));
    assert_eq!(store.require_product(tea).await.unwrap().stock, 5);
    assert!(store.list_orders(None).await.unwrap().is_empty());

    // A snapshot taken after the change commits at the new price.
    let order = store
        .commit_order(order_from_cart(&store, ALICE).await)
        .await
        .unwrap();
    let stored = store.require_order(order.id).await.unwrap();
    assert_eq!(stored.lines[0].product_name, "Tea v2");
    assert_eq!(stored.lines[0].unit_price, Money::from_major(500));
    assert_eq!(stored.total, Money::from_major(500));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_checkouts_never_oversell() {
    let store = get_test_store("concurrent_checkout").await;
    let last = add_product(&store, "Last unit", 50, 1).await;

    let users: Vec<UserId> = (0..8).map(|i| UserId::new(5000 + i)).collect();
    let mut orders = Vec::new();
    for user in &users {
        store.add_to_cart(*user, last, 1).await.unwrap();
        orders.push(order_from_cart(&store, *user).await);
    }

    let handles: Vec<_> = orders
        .into_iter()
        .map(|order| {
            let store = store.clone();
            tokio::spawn(async move { store.commit_order(order).await })
        })
        .collect();

    let mut committed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => committed += 1,
            Err(StoreError::InsufficientStock { available: 0, .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(committed, 1);
    assert_eq!(store.require_product(last).await.unwrap().stock, 0);
    assert_eq!(store.list_orders(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn status_compare_and_set() {
    let store = get_test_store("status_cas").await;
    let tea = add_product(&store, "Tea", 10, 10).await;
    store.add_to_cart(ALICE, tea, 1).await.unwrap();
    let order = store
        .commit_order(order_from_cart(&store, ALICE).await)
        .await
        .unwrap();

    let processing = store
        .update_order_status(order.id, OrderStatus::Pending, OrderStatus::Processing)
        .await
        .unwrap();
    assert_eq!(processing.status, OrderStatus::Processing);
    assert_eq!(processing.lines.len(), 1);

    assert!(matches!(
        store
            .update_order_status(order.id, OrderStatus::Pending, OrderStatus::Canceled)
            .await,
        Err(StoreError::StatusConflict {
            actual: OrderStatus::Processing,
            ..
        })
    ));

    store
        .set_notification_handle(order.id, store::MessageHandle::new(77))
        .await
        .unwrap();
    let stored = store.require_order(order.id).await.unwrap();
    assert_eq!(stored.notification_handle, Some(store::MessageHandle::new(77)));
    assert_eq!(
        store
            .list_orders(Some(OrderStatus::Processing))
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn orders_for_user_newest_first() {
    let store = get_test_store("orders_for_user").await;
    let tea = add_product(&store, "Tea", 10, 10).await;

    for user in [ALICE, BOB, ALICE] {
        store.add_to_cart(user, tea, 1).await.unwrap();
        store
            .commit_order(order_from_cart(&store, user).await)
            .await
            .unwrap();
    }

    let alice_orders = store.orders_for_user(ALICE).await.unwrap();
    assert_eq!(alice_orders.len(), 2);
    assert!(alice_orders[0].id > alice_orders[1].id);
    assert_eq!(store.orders_for_user(BOB).await.unwrap().len(), 1);
}

#[tokio::test]
async fn favorites_and_sessions() {
    let store = get_test_store("favorites_sessions").await;
    let tea = add_product(&store, "Tea", 10, 10).await;

    assert!(store.add_favorite(ALICE, tea).await.unwrap());
    assert!(!store.add_favorite(ALICE, tea).await.unwrap());
    assert_eq!(store.favorites(ALICE).await.unwrap()[0].id, tea);
    assert!(matches!(
        store.add_favorite(ALICE, ProductId::new(999)).await,
        Err(StoreError::ProductNotFound(_))
    ));

    let record = SessionRecord {
        state: serde_json::json!({"flow": "add_product", "step": "price"}),
        updated_at: Utc::now(),
    };
    store.save_session(ALICE, record.clone()).await.unwrap();
    let loaded = store.load_session(ALICE).await.unwrap().unwrap();
    assert_eq!(loaded.state, record.state);

    store.clear_session(ALICE).await.unwrap();
    assert!(store.load_session(ALICE).await.unwrap().is_none());

    store.delete_product(tea).await.unwrap();
    assert!(store.favorites(ALICE).await.unwrap().is_empty());
}

#[tokio::test]
async fn in_memory_database_runs_migrations() {
    let store = SqliteShopStore::in_memory()
        .await
        .unwrap()
        .with_timeout(Duration::from_secs(2));
    store.run_migrations().await.unwrap();

    let tea = add_product(&store, "Tea", 10, 1).await;
    store.add_to_cart(ALICE, tea, 1).await.unwrap();
    let order = store
        .commit_order(order_from_cart(&store, ALICE).await)
        .await
        .unwrap();
    assert_eq!(store.require_order(order.id).await.unwrap().total, Money::from_major(10));
}
