//! Stock never goes negative: conditional decrements under contention.

mod common;

use common::TestApp;
use rust_decimal_macros::dec;
use storefront_api::services::inventory::InventoryService;

#[tokio::test]
#[ignore = "requires database integration environment"]
async fn concurrent_decrements_never_oversell() {
    let app = TestApp::new().await;
    let product = app.seed_product("Walnut desk", dec!(20.00), 10).await;

    let inventory = InventoryService::new(app.state.db.clone(), app.state.event_sender.clone());

    // 20 concurrent claims of 1 unit against a stock of 10
    let mut tasks = Vec::new();
    for _ in 0..20 {
        let inventory = inventory.clone();
        let product_id = product.id;
        tasks.push(tokio::spawn(async move {
            inventory.decrement_stock(product_id, 1).await.unwrap_or(false)
        }));
    }

    let mut succeeded = 0;
    for task in tasks {
        if task.await.unwrap_or(false) {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 10, "exactly the available stock is claimed");
    let remaining = inventory.stock_level(product.id).await.unwrap().unwrap();
    assert_eq!(remaining, 0, "stock bottoms out at zero, never below");
}

#[tokio::test]
#[ignore = "requires database integration environment"]
async fn oversized_single_decrement_is_rejected_whole() {
    let app = TestApp::new().await;
    let product = app.seed_product("Oak shelf", dec!(15.00), 3).await;

    let inventory = InventoryService::new(app.state.db.clone(), app.state.event_sender.clone());

    // Asking for more than remains affects zero rows and changes nothing.
    assert!(!inventory.decrement_stock(product.id, 5).await.unwrap());
    assert_eq!(inventory.stock_level(product.id).await.unwrap().unwrap(), 3);

    assert!(inventory.decrement_stock(product.id, 3).await.unwrap());
    assert_eq!(inventory.stock_level(product.id).await.unwrap().unwrap(), 0);
}
