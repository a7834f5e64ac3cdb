// Domain layer: core models, events and ports (interfaces). No I/O here.

pub mod events;
pub mod model;
pub mod ports;
