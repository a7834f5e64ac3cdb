use crate::domain::model::PaymentMethod;
use crate::domain::ports::{PaymentDetails, PaymentGateway, PaymentReceipt, PaymentStatus};
use crate::utils::error::{CommerceError, Result};
use crate::utils::validation::{validate_positive_amount, validate_url};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use uuid::Uuid;

/// 每種付款方式必須提供的欄位
pub fn required_detail(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::PayPal => "paypal_email",
        PaymentMethod::Usdt => "usdt_address",
        PaymentMethod::CreditCard => "card_token",
    }
}

fn check_details(method: PaymentMethod, details: &PaymentDetails) -> Result<()> {
    let field = required_detail(method);
    match details.get(field) {
        Some(value) if !value.trim().is_empty() => Ok(()),
        _ => Err(CommerceError::validation(format!(
            "{} is required for {} payments",
            field, method
        ))),
    }
}

/// 不連外的付款閘道，用於本機執行與測試
pub struct SimulatedGateway {
    method: PaymentMethod,
    decline_charges: bool,
    decline_payouts: bool,
    transactions: Mutex<HashMap<String, PaymentStatus>>,
}

impl SimulatedGateway {
    pub fn new(method: PaymentMethod) -> Self {
        Self {
            method,
            decline_charges: false,
            decline_payouts: false,
            transactions: Mutex::new(HashMap::new()),
        }
    }

    pub fn paypal() -> Self {
        Self::new(PaymentMethod::PayPal)
    }

    pub fn usdt() -> Self {
        Self::new(PaymentMethod::Usdt)
    }

    pub fn credit_card() -> Self {
        Self::new(PaymentMethod::CreditCard)
    }

    pub fn declining_charges(mut self) -> Self {
        self.decline_charges = true;
        self
    }

    pub fn declining_payouts(mut self) -> Self {
        self.decline_payouts = true;
        self
    }

    fn declined(&self, what: &str) -> CommerceError {
        CommerceError::PaymentError {
            method: self.method.to_string(),
            message: format!("{} declined", what),
        }
    }

    fn record(&self, amount_cents: u64) -> PaymentReceipt {
        let transaction_id = format!("{}-{}", self.method.as_str().to_lowercase(), Uuid::new_v4());
        self.transactions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(transaction_id.clone(), PaymentStatus::Completed);

        PaymentReceipt {
            transaction_id,
            amount_cents,
            method: self.method,
        }
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    fn method(&self) -> PaymentMethod {
        self.method
    }

    fn validate_details(&self, details: &PaymentDetails) -> Result<()> {
        check_details(self.method, details)
    }

    async fn charge(&self, amount_cents: u64, details: &PaymentDetails) -> Result<PaymentReceipt> {
        validate_positive_amount("amount_cents", amount_cents)?;
        self.validate_details(details)?;
        if self.decline_charges {
            return Err(self.declined("Charge"));
        }
        Ok(self.record(amount_cents))
    }

    async fn refund(&self, transaction_id: &str, _amount_cents: u64, _reason: &str) -> Result<()> {
        let mut transactions = self
            .transactions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match transactions.get_mut(transaction_id) {
            Some(status) if *status == PaymentStatus::Completed => {
                *status = PaymentStatus::Refunded;
                Ok(())
            }
            Some(status) => Err(CommerceError::PaymentError {
                method: self.method.to_string(),
                message: format!("Transaction {} cannot be refunded ({:?})", transaction_id, status),
            }),
            None => Err(CommerceError::not_found("PaymentTransaction", transaction_id)),
        }
    }

    async fn status(&self, transaction_id: &str) -> Result<PaymentStatus> {
        self.transactions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(transaction_id)
            .copied()
            .ok_or_else(|| CommerceError::not_found("PaymentTransaction", transaction_id))
    }

    async fn payout(&self, amount_cents: u64, details: &PaymentDetails) -> Result<PaymentReceipt> {
        validate_positive_amount("amount_cents", amount_cents)?;
        self.validate_details(details)?;
        if self.decline_payouts {
            return Err(self.declined("Payout"));
        }
        Ok(self.record(amount_cents))
    }
}

#[derive(Debug, Deserialize)]
struct TransactionResponse {
    transaction_id: String,
    #[serde(default)]
    amount_cents: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: PaymentStatus,
}

/// 透過 HTTP JSON API 付款的閘道
///
/// - `POST {endpoint}/charges`、`POST {endpoint}/payouts` 回傳 `{"transaction_id": ...}`
/// - `POST {endpoint}/refunds`
/// - `GET {endpoint}/transactions/{id}` 回傳 `{"status": "completed"}`
pub struct HttpGateway {
    method: PaymentMethod,
    endpoint: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpGateway {
    pub fn new(
        method: PaymentMethod,
        endpoint: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        validate_url("payment.endpoint", endpoint)?;
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            method,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = self.authorize(request).send().await?;
        tracing::debug!("Payment provider response status: {}", response.status());

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(CommerceError::PaymentError {
            method: self.method.to_string(),
            message: format!("HTTP {}: {}", status, body),
        })
    }

    async fn post_transaction(
        &self,
        path: &str,
        amount_cents: u64,
        details: &PaymentDetails,
    ) -> Result<PaymentReceipt> {
        validate_positive_amount("amount_cents", amount_cents)?;
        self.validate_details(details)?;

        let body = json!({
            "method": self.method,
            "amount_cents": amount_cents,
            "details": details,
        });
        tracing::debug!("Making payment request to: {}", self.url(path));
        let response = self.send(self.client.post(self.url(path)).json(&body)).await?;
        let parsed: TransactionResponse = response.json().await?;

        Ok(PaymentReceipt {
            transaction_id: parsed.transaction_id,
            amount_cents: parsed.amount_cents.unwrap_or(amount_cents),
            method: self.method,
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    fn method(&self) -> PaymentMethod {
        self.method
    }

    fn validate_details(&self, details: &PaymentDetails) -> Result<()> {
        check_details(self.method, details)
    }

    async fn charge(&self, amount_cents: u64, details: &PaymentDetails) -> Result<PaymentReceipt> {
        self.post_transaction("charges", amount_cents, details).await
    }

    async fn refund(&self, transaction_id: &str, amount_cents: u64, reason: &str) -> Result<()> {
        let body = json!({
            "transaction_id": transaction_id,
            "amount_cents": amount_cents,
            "reason": reason,
        });
        self.send(self.client.post(self.url("refunds")).json(&body))
            .await?;
        Ok(())
    }

    async fn status(&self, transaction_id: &str) -> Result<PaymentStatus> {
        let url = self.url(&format!("transactions/{}", transaction_id));
        let response = self.send(self.client.get(url)).await?;
        let parsed: StatusResponse = response.json().await?;
        Ok(parsed.status)
    }

    async fn payout(&self, amount_cents: u64, details: &PaymentDetails) -> Result<PaymentReceipt> {
        self.post_transaction("payouts", amount_cents, details).await
    }
}
