use crate::error::BridgeError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A non-negative monetary amount as it travels over the bus and to the payment API.
///
/// Bus tokens always use `.` as decimal separator, whatever the host locale. On the way out
/// the value is normalized, so `1.50` is written as `1.5` and `10.00` as `10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Amount(#[serde(with = "rust_decimal::serde::float")] Decimal);

impl Amount {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Result<Self, BridgeError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(BridgeError::InvalidAmount(format!(
                "amount must not be negative: {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Renders the amount the way the bus expects it in outbound commands.
    pub fn to_bus_token(&self) -> String {
        self.0.normalize().to_string()
    }
}

impl FromStr for Amount {
    type Err = BridgeError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let token = token.trim();
        // `Decimal::from_str` also accepts `_` digit separators and scientific notation; the bus
        // only ever sends plain digits with an optional fractional part.
        let well_formed = !token.is_empty()
            && token.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-')
            && token.matches('.').count() <= 1;
        if !well_formed {
            return Err(BridgeError::InvalidAmount(token.to_string()));
        }
        let value =
            Decimal::from_str(token).map_err(|_| BridgeError::InvalidAmount(token.to_string()))?;
        Self::new(value)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = BridgeError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_bus_token())
    }
}
