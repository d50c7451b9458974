//! Application layer: the bus protocol state machine and the payment reconciliation loop.
//!
//! The machine is the single producer of domain events and the reconciler their single
//! consumer; `events` is the ordered channel between the two. Commands flow back through
//! the `VendController` port.

pub mod events;
pub mod machine;
pub mod reconciler;
