pub mod order_listeners;

pub use order_listeners::OrderPaidListener;
