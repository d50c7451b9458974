//! Adapters behind the domain ports: bus transports and payment API clients, chosen by
//! configuration at startup.

pub mod dummy;
pub mod http;
pub mod in_memory;
pub mod line;

use crate::config::{AdapterKind, BusSettings, PaymentSettings};
use crate::domain::ports::{BusAdapterRef, PaymentApiRef};
use crate::error::{BridgeError, Result};
use dummy::DummyAdapter;
use http::HttpPaymentApi;
use in_memory::InMemoryPaymentApi;
use line::LineAdapter;
use std::sync::Arc;

/// Opens the bus transport selected by `settings`.
pub async fn create_adapter(settings: &BusSettings) -> Result<BusAdapterRef> {
    match settings.adapter {
        AdapterKind::Dummy => Ok(Arc::new(DummyAdapter::default())),
        AdapterKind::QibixxUsb => {
            let path = settings.path.as_deref().ok_or_else(|| {
                BridgeError::ConfigError("no device path for qibixx-usb adapter".to_string())
            })?;
            Ok(Arc::new(LineAdapter::open(path, settings.baud_rate).await?))
        }
    }
}

/// Builds the payment API client selected by `settings`.
pub fn create_payment_api(settings: &PaymentSettings) -> PaymentApiRef {
    match settings {
        PaymentSettings::Http(api) => Arc::new(HttpPaymentApi::new(api.clone())),
        PaymentSettings::Dummy { settle_after } => {
            Arc::new(InMemoryPaymentApi::with_auto_settle(*settle_after))
        }
    }
}
