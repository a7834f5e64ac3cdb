pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::{build_payment_service, FileStore, HttpGateway, MemoryStore, SimulatedGateway};
pub use config::CommerceConfig;
pub use core::{checkout::CheckoutEngine, checkout::CheckoutReceipt, event_bus::EventBus};
pub use domain::events::CommerceEvent;
pub use utils::error::{CommerceError, Result};
