use bounty_commerce::config::toml_config::EventBusMode;
use bounty_commerce::core::payment::PaymentService;
use bounty_commerce::domain::model::{BountyPurchaseData, OrderStatus};
use bounty_commerce::domain::ports::PaymentDetails;
use bounty_commerce::{CheckoutEngine, CommerceConfig, EventBus, FileStore};
use std::sync::Arc;
use tempfile::TempDir;

async fn engine(dir: &TempDir) -> CheckoutEngine<FileStore> {
    let store = Arc::new(FileStore::open(dir.path()).await.unwrap());
    CheckoutEngine::new(
        store,
        &CommerceConfig::default(),
        PaymentService::new(),
        EventBus::new(EventBusMode::Sync, true),
    )
}

#[tokio::test]
async fn test_checkout_persists_across_processes() {
    let dir = TempDir::new().unwrap();

    // 每個 CLI 指令都是一個新的行程，這裡用重新開啟 FileStore 模擬
    let org_id = {
        let engine = engine(&dir).await;
        let org = engine.create_organisation("Acme", "JP", Some("JP-123".to_string())).await.unwrap();
        engine
            .wallets()
            .add_funds(org.id, 50_000, "Manual deposit", None, None)
            .await
            .unwrap();
        org.id
    };

    let cart_id = {
        let engine = engine(&dir).await;
        let cart = engine.carts().create_cart(org_id).await.unwrap();
        engine
            .carts()
            .add_bounty(cart.id, BountyPurchaseData::usd("product-9", "Port parser", 20_000), 1)
            .await
            .unwrap();
        cart.id
    };

    let receipt = {
        let engine = engine(&dir).await;
        engine
            .checkout(cart_id, None, &PaymentDetails::new())
            .await
            .unwrap()
    };

    let engine = engine(&dir).await;
    let order = engine.orders().get_order(receipt.sales_order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.funded_bounty_ids(), receipt.funded_bounty_ids);
    // 20_000 + 1_000 手續費 + 2_000 日本稅
    assert_eq!(engine.wallets().get_balance(org_id).await.unwrap(), 27_000);
    assert!(dir.path().join("commerce_state.json").exists());
}
