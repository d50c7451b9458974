use super::amount::Amount;

/// Customer-relevant events produced by the protocol state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    /// The cashless peripheral reported readiness.
    Enabled,
    /// The machine asks to dispense `product_id` for `price`.
    Product { product_id: u32, price: Amount },
    /// A bus fault that no internal recovery covers.
    Error { detail: String },
}

/// Commands sent to the machine, one outbound bus line each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Enable,
    Disable,
    SetCredit(Amount),
    AcceptVend(Amount),
    StopVend,
}

impl Command {
    /// The command payload without the sender prefix.
    pub fn to_payload(&self) -> String {
        match self {
            Command::Enable => "1".to_string(),
            Command::Disable => "0".to_string(),
            Command::SetCredit(credit) => format!("START,{}", credit.to_bus_token()),
            Command::AcceptVend(price) => format!("VEND,{}", price.to_bus_token()),
            Command::StopVend => "STOP".to_string(),
        }
    }
}
