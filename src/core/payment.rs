use crate::domain::model::PaymentMethod;
use crate::domain::ports::{PaymentDetails, PaymentGateway, PaymentReceipt, PaymentStatus};
use crate::utils::error::{CommerceError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// 依付款方式選擇外部付款閘道
#[derive(Default, Clone)]
pub struct PaymentService {
    gateways: HashMap<PaymentMethod, Arc<dyn PaymentGateway>>,
}

impl std::fmt::Debug for PaymentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentService")
            .field("gateways", &self.gateways.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PaymentService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, gateway: Arc<dyn PaymentGateway>) {
        tracing::debug!("💳 Payment gateway registered: {}", gateway.method());
        self.gateways.insert(gateway.method(), gateway);
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.register(gateway);
        self
    }

    pub fn supported_methods(&self) -> Vec<PaymentMethod> {
        let mut methods: Vec<_> = self.gateways.keys().copied().collect();
        methods.sort_by_key(|method| method.as_str());
        methods
    }

    pub fn gateway(&self, method: PaymentMethod) -> Result<Arc<dyn PaymentGateway>> {
        self.gateways
            .get(&method)
            .cloned()
            .ok_or_else(|| CommerceError::UnsupportedPaymentMethod {
                method: method.to_string(),
            })
    }

    pub async fn charge(
        &self,
        method: PaymentMethod,
        amount_cents: u64,
        details: &PaymentDetails,
    ) -> Result<PaymentReceipt> {
        let gateway = self.gateway(method)?;
        gateway.validate_details(details)?;

        tracing::info!("💳 Charging {} cents via {}", amount_cents, method);
        let receipt = gateway.charge(amount_cents, details).await?;
        tracing::info!("✅ Charge accepted: {}", receipt.transaction_id);
        Ok(receipt)
    }

    pub async fn refund(
        &self,
        method: PaymentMethod,
        transaction_id: &str,
        amount_cents: u64,
        reason: &str,
    ) -> Result<()> {
        tracing::info!("↩️ Refunding {} cents of {} via {}", amount_cents, transaction_id, method);
        self.gateway(method)?
            .refund(transaction_id, amount_cents, reason)
            .await
    }

    pub async fn status(&self, method: PaymentMethod, transaction_id: &str) -> Result<PaymentStatus> {
        self.gateway(method)?.status(transaction_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::payment_gateways::SimulatedGateway;

    #[tokio::test]
    async fn test_unsupported_method_is_rejected() {
        let payments = PaymentService::new().with_gateway(Arc::new(SimulatedGateway::paypal()));

        assert_eq!(payments.supported_methods(), vec![PaymentMethod::PayPal]);
        let result = payments
            .charge(PaymentMethod::CreditCard, 1_000, &PaymentDetails::new())
            .await;
        assert!(matches!(result, Err(CommerceError::UnsupportedPaymentMethod { .. })));
    }

    #[tokio::test]
    async fn test_charge_validates_details_first() {
        let payments = PaymentService::new().with_gateway(Arc::new(SimulatedGateway::usdt()));

        let missing = payments
            .charge(PaymentMethod::Usdt, 1_000, &PaymentDetails::new())
            .await;
        assert!(matches!(missing, Err(CommerceError::ValidationError { .. })));

        let details = PaymentDetails::from([("usdt_address".to_string(), "0xabc".to_string())]);
        let receipt = payments.charge(PaymentMethod::Usdt, 1_000, &details).await.unwrap();
        assert_eq!(receipt.amount_cents, 1_000);
        assert_eq!(
            payments.status(PaymentMethod::Usdt, &receipt.transaction_id).await.unwrap(),
            PaymentStatus::Completed
        );
    }
}
