use super::amount::Amount;
use super::payment::PaymentLinkPayment;
use crate::error::{BridgeError, Result};
use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// The vend request currently being paid for on a link.
#[derive(Debug, Clone, PartialEq)]
pub struct VendSession {
    pub product_id: u32,
    pub price: Amount,
    pub payment_id: u64,
    pub created_at: DateTime<Utc>,
}

impl VendSession {
    pub fn new(product_id: u32, price: Amount, payment_id: u64) -> Self {
        Self {
            product_id,
            price,
            payment_id,
            created_at: Utc::now(),
        }
    }

    /// Whether `payment` is the one this session opened. Anything else is stale.
    pub fn owns(&self, payment: &PaymentLinkPayment) -> bool {
        payment.id == self.payment_id
    }
}

/// Identifier sent along with a new payment, unique per product and point in time.
pub fn external_id(link_id: &str, product_id: u32, at: DateTime<Utc>) -> String {
    format!("{link_id}-{product_id}-{}", at.timestamp_millis())
}

/// Point in time at which a payment opened at `now` expires.
///
/// Fails when `timeout` does not fit the calendar instead of wrapping or panicking.
pub fn payment_expiry(now: DateTime<Utc>, timeout: Duration) -> Result<DateTime<Utc>> {
    TimeDelta::from_std(timeout)
        .ok()
        .and_then(|timeout| now.checked_add_signed(timeout))
        .ok_or_else(|| {
            BridgeError::ConfigError(format!(
                "payment timeout of {}s is out of range",
                timeout.as_secs()
            ))
        })
}
