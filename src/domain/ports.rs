use super::amount::Amount;
use super::payment::{PaymentLink, PaymentLinkStatus, PaymentRequest};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Line-oriented access to the cashless bus.
///
/// Framing lives behind this trait: `read` yields the tokens of one inbound line with the
/// sender marker already stripped, `write` takes a command payload without prefix or newline.
#[async_trait]
pub trait BusAdapter: Send + Sync {
    /// Returns `Ok(None)` once the line is closed for good.
    async fn read(&self) -> Result<Option<Vec<String>>>;
    async fn write(&self, payload: &str) -> Result<()>;
}

/// The commands a vending machine accepts.
#[async_trait]
pub trait VendController: Send + Sync {
    async fn enable(&self) -> Result<()>;
    async fn disable(&self) -> Result<()>;
    async fn refresh_credit(&self) -> Result<()>;
    async fn accept_vend(&self, price: Amount) -> Result<()>;
    async fn stop_vend(&self) -> Result<()>;
}

/// The remote payment-link service, keyed by the link's external identifier.
#[async_trait]
pub trait PaymentApi: Send + Sync {
    async fn get_payment_link(&self, link_id: &str) -> Result<PaymentLink>;
    async fn create_payment_link(&self, link_id: &str) -> Result<PaymentLink>;
    async fn update_payment_link(
        &self,
        link_id: &str,
        status: PaymentLinkStatus,
    ) -> Result<PaymentLink>;
    async fn create_payment(&self, link_id: &str, request: PaymentRequest) -> Result<PaymentLink>;
    async fn cancel_payment(&self, link_id: &str) -> Result<PaymentLink>;
    /// Blocks while payment `payment_id` is the link's current payment and still pending.
    ///
    /// Returns the link as soon as that no longer holds, including on the first look, so a
    /// payment replaced by another one is never waited on.
    async fn wait_for_payment(&self, link_id: &str, payment_id: u64) -> Result<PaymentLink>;
}

pub type BusAdapterRef = Arc<dyn BusAdapter>;
pub type VendControllerRef = Arc<dyn VendController>;
pub type PaymentApiRef = Arc<dyn PaymentApi>;
