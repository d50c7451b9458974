//! Line grammar of the cashless bus: sender framing and message decoding.

pub mod frame;
pub mod message;
