use bounty_commerce::domain::model::PaymentMethod;
use bounty_commerce::domain::ports::{PaymentDetails, PaymentGateway, PaymentStatus};
use bounty_commerce::{CommerceError, HttpGateway};
use httpmock::prelude::*;
use std::time::Duration;

fn gateway(server: &MockServer) -> HttpGateway {
    HttpGateway::new(
        PaymentMethod::PayPal,
        &server.base_url(),
        Some("test_api_key".to_string()),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn details() -> PaymentDetails {
    PaymentDetails::from([("paypal_email".to_string(), "finance@acme.test".to_string())])
}

#[tokio::test]
async fn test_charge_posts_json_with_bearer_token() {
    let server = MockServer::start();

    let charge_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/charges")
            .header("authorization", "Bearer test_api_key")
            .json_body_partial(r#"{"method": "PayPal", "amount_cents": 12500}"#);
        then.status(200).json_body(serde_json::json!({
            "transaction_id": "txn_001",
            "amount_cents": 12500
        }));
    });

    let receipt = gateway(&server).charge(12_500, &details()).await.unwrap();

    charge_mock.assert();
    assert_eq!(receipt.transaction_id, "txn_001");
    assert_eq!(receipt.amount_cents, 12_500);
    assert_eq!(receipt.method, PaymentMethod::PayPal);
}

#[tokio::test]
async fn test_declined_charge_is_payment_error() {
    let server = MockServer::start();

    let charge_mock = server.mock(|when, then| {
        when.method(POST).path("/charges");
        then.status(402).json_body(serde_json::json!({
            "error": "card_declined"
        }));
    });

    let result = gateway(&server).charge(1_000, &details()).await;

    charge_mock.assert();
    match result {
        Err(CommerceError::PaymentError { method, message }) => {
            assert_eq!(method, "PayPal");
            assert!(message.contains("402"));
            assert!(message.contains("card_declined"));
        }
        other => panic!("expected payment error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_details_never_reach_provider() {
    let server = MockServer::start();

    let charge_mock = server.mock(|when, then| {
        when.method(POST).path("/charges");
        then.status(200);
    });

    let result = gateway(&server).charge(1_000, &PaymentDetails::new()).await;

    assert!(matches!(result, Err(CommerceError::ValidationError { .. })));
    charge_mock.assert_hits(0);
}

#[tokio::test]
async fn test_refund_status_and_payout() {
    let server = MockServer::start();

    let refund_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/refunds")
            .json_body_partial(r#"{"transaction_id": "txn_001", "reason": "duplicate"}"#);
        then.status(200).json_body(serde_json::json!({ "ok": true }));
    });
    let status_mock = server.mock(|when, then| {
        when.method(GET).path("/transactions/txn_001");
        then.status(200).json_body(serde_json::json!({ "status": "refunded" }));
    });
    let payout_mock = server.mock(|when, then| {
        when.method(POST).path("/payouts");
        then.status(200).json_body(serde_json::json!({ "transaction_id": "payout_9" }));
    });

    let gateway = gateway(&server);
    gateway.refund("txn_001", 12_500, "duplicate").await.unwrap();
    assert_eq!(gateway.status("txn_001").await.unwrap(), PaymentStatus::Refunded);
    let payout = gateway.payout(3_000, &details()).await.unwrap();

    refund_mock.assert();
    status_mock.assert();
    payout_mock.assert();
    assert_eq!(payout.transaction_id, "payout_9");
    // 回應沒有金額時沿用請求金額
    assert_eq!(payout.amount_cents, 3_000);
}
