pub mod bounty;
pub mod cart;
pub mod checkout;
pub mod event_bus;
pub mod payment;
pub mod points;
pub mod pricing;
pub mod sales_order;
pub mod wallet;

pub use crate::domain::model::{CommerceState, Id};
pub use crate::domain::ports::{ConfigProvider, EventListener, PaymentGateway, Store};
pub use crate::utils::error::Result;
pub use checkout::{CheckoutEngine, CheckoutReceipt};
pub use event_bus::EventBus;
