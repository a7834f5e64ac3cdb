// 外部系統的實作：資料儲存與付款閘道

pub mod file_store;
pub mod memory_store;
pub mod payment_gateways;

pub use file_store::FileStore;
pub use memory_store::MemoryStore;
pub use payment_gateways::{HttpGateway, SimulatedGateway};

use crate::config::toml_config::{CommerceConfig, GatewayKind};
use crate::core::payment::PaymentService;
use crate::domain::model::PaymentMethod;
use crate::utils::error::{CommerceError, Result};
use std::sync::Arc;
use std::time::Duration;

/// 依 [payment] 設定建立所有付款方式的閘道
pub fn build_payment_service(config: &CommerceConfig) -> Result<PaymentService> {
    let methods = [PaymentMethod::PayPal, PaymentMethod::Usdt, PaymentMethod::CreditCard];
    let mut payments = PaymentService::new();

    match config.payment.gateway {
        GatewayKind::Simulated => {
            for method in methods {
                payments.register(Arc::new(SimulatedGateway::new(method)));
            }
        }
        GatewayKind::Http => {
            let endpoint = config
                .payment
                .endpoint
                .as_deref()
                .ok_or_else(|| CommerceError::MissingConfigError {
                    field: "payment.endpoint".to_string(),
                })?;
            let timeout = Duration::from_secs(config.payment.timeout_seconds);
            for method in methods {
                payments.register(Arc::new(HttpGateway::new(
                    method,
                    endpoint,
                    config.payment.api_key.clone(),
                    timeout,
                )?));
            }
        }
    }

    Ok(payments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_gateways_cover_all_methods() {
        let payments = build_payment_service(&CommerceConfig::default()).unwrap();
        assert_eq!(payments.supported_methods().len(), 3);
        assert!(payments.gateway(PaymentMethod::Usdt).is_ok());
    }

    #[test]
    fn test_http_gateway_requires_endpoint() {
        let config = CommerceConfig::from_toml_str("[payment]\ngateway = \"http\"\n").unwrap();
        let err = build_payment_service(&config).unwrap_err();
        assert!(matches!(err, CommerceError::MissingConfigError { .. }));
    }
}
