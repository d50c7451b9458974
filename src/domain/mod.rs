//! Domain layer: value objects, events and the ports the application talks through.

pub mod amount;
pub mod event;
pub mod payment;
pub mod ports;
pub mod session;
