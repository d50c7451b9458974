use crate::domain::amount::Amount;
use crate::error::{BridgeError, Result};

pub const STATUS: &str = "STATUS";
pub const ERR: &str = "ERR";
pub const SALE: &str = "SALE";
pub const SUCCESS: &str = "SUCCESS";
/// Some firmware prefixes its generic status line with the disable/enable toggle value.
pub const TOGGLE: &str = "0";

const ENABLED: &str = "ENABLED";
const VEND: &str = "VEND";

/// Faults reported by the peripheral on an `ERR` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusFault {
    /// Enable raced with an enable already in effect.
    CashlessOn,
    /// Setting the credit clashed with the peripheral's session state.
    CreditConflict,
    /// A transient vend-authorization clash.
    VendClash,
    Other(String),
}

impl BusFault {
    /// Classifies the free-text payload of an `ERR` line.
    pub fn classify(detail: &str) -> Self {
        if detail.contains("cashless is on") {
            BusFault::CashlessOn
        } else if detail.contains("START") || detail.contains("VEND 5") {
            BusFault::CreditConflict
        } else if detail.contains("VEND 1") || detail.contains("VEND 3") {
            BusFault::VendClash
        } else {
            BusFault::Other(detail.to_string())
        }
    }
}

/// An inbound bus line, decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusMessage {
    Enabled,
    VendRequest { price: Amount, product_id: u32 },
    Fault(BusFault),
    /// A sale settled by another payment device, e.g. the coin mechanism.
    Sale,
    /// The machine dispensed the product.
    VendSuccess,
}

impl BusMessage {
    /// Decodes the tokens of one frame.
    ///
    /// Returns `Ok(None)` for messages this bridge does not model; malformed payloads of
    /// modeled messages are a `ProtocolError`.
    pub fn parse(tokens: &[String]) -> Result<Option<Self>> {
        let Some((head, payload)) = tokens.split_first() else {
            return Ok(None);
        };
        match head.as_str() {
            STATUS => Self::parse_status(payload),
            ERR => Ok(Some(Self::parse_error(payload))),
            SALE => Ok(Some(BusMessage::Sale)),
            SUCCESS => Ok(Some(BusMessage::VendSuccess)),
            _ => Ok(None),
        }
    }

    /// Decodes the payload of a `STATUS` line.
    pub fn parse_status(payload: &[String]) -> Result<Option<Self>> {
        match payload.first().map(String::as_str) {
            Some(ENABLED) => Ok(Some(BusMessage::Enabled)),
            Some(VEND) => {
                let [_, amount, product] = payload else {
                    return Err(BridgeError::ProtocolError(format!(
                        "expected VEND,<amount>,<product>, got {}",
                        payload.join(",")
                    )));
                };
                let price = amount
                    .parse::<Amount>()
                    .map_err(|e| BridgeError::ProtocolError(e.to_string()))?;
                let product_id = product.trim().parse::<u32>().map_err(|_| {
                    BridgeError::ProtocolError(format!("invalid product number {product}"))
                })?;
                Ok(Some(BusMessage::VendRequest { price, product_id }))
            }
            _ => Ok(None),
        }
    }

    /// Decodes the payload of an `ERR` line. The free text may itself contain commas.
    pub fn parse_error(payload: &[String]) -> Self {
        BusMessage::Fault(BusFault::classify(&payload.join(",")))
    }
}
