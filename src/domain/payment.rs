use super::amount::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub enum PaymentLinkStatus {
    Active,
    Inactive,
}

/// Lifecycle of the payment currently attached to a link.
///
/// `Pending` is the only non-terminal status.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub enum PaymentStatus {
    Pending,
    Completed,
    Cancelled,
    Expired,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
pub enum PaymentMode {
    #[default]
    Single,
    Multiple,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PaymentLinkPayment {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub status: PaymentStatus,
    pub amount: Amount,
    pub currency: String,
    #[serde(default)]
    pub mode: PaymentMode,
    pub expiry_date: DateTime<Utc>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub lnurl: String,
}

/// A remote, identifier-keyed resource that collects payments.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PaymentLink {
    pub id: u64,
    #[serde(default)]
    pub route_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub status: PaymentLinkStatus,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub lnurl: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentLinkPayment>,
}

/// A fiat currency known to the payment service.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Fiat {
    pub id: u64,
    pub name: String,
}

/// Parameters of a payment to open on a link.
#[derive(Debug, PartialEq, Clone)]
pub struct PaymentRequest {
    pub amount: Amount,
    pub currency: String,
    pub external_id: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
    pub mode: PaymentMode,
}

impl PaymentRequest {
    pub fn single(amount: Amount, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
            external_id: None,
            expiry: None,
            mode: PaymentMode::Single,
        }
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn expiring_at(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }
}
