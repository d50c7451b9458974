//! Process configuration: command line flags with environment fallbacks, validated into the
//! settings each component is constructed with.

use crate::application::machine::MachineSettings;
use crate::application::reconciler::ReconcilerSettings;
use crate::domain::amount::Amount;
use crate::domain::session::payment_expiry;
use crate::error::{BridgeError, Result};
use crate::infrastructure::http::ApiSettings;
use chrono::Utc;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BusKind {
    #[value(name = "mdb-level2")]
    MdbLevel2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AdapterKind {
    Dummy,
    QibixxUsb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PaymentBackend {
    Http,
    Dummy,
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// External id of the payment link this machine collects on
    #[arg(long, env = "LINK_ID")]
    pub link_id: String,

    /// Currency payments are requested in
    #[arg(long, env = "CURRENCY", default_value = "CHF")]
    pub currency: String,

    /// Seconds a customer has to pay before the vend is refunded
    #[arg(long, env = "PAYMENT_TIMEOUT", default_value_t = 45)]
    pub payment_timeout: u64,

    /// Stored credit granted to the machine while it is ready
    #[arg(long, env = "CREDIT", default_value = "10")]
    pub credit: Amount,

    /// Settling pause after enable and refund commands, in milliseconds
    #[arg(long, env = "SETTLE_DELAY_MS", default_value_t = 2000)]
    pub settle_delay_ms: u64,

    #[arg(long, env = "BUS_TYPE", value_enum, default_value_t = BusKind::MdbLevel2)]
    pub bus_type: BusKind,

    #[arg(long, env = "ADAPTER", value_enum, default_value_t = AdapterKind::Dummy)]
    pub adapter: AdapterKind,

    /// Serial device of the bus interface, required for hardware adapters
    #[arg(long, env = "MDB_PATH")]
    pub mdb_path: Option<PathBuf>,

    #[arg(long, env = "MDB_BAUD_RATE", default_value_t = 115200)]
    pub mdb_baud_rate: u32,

    #[arg(long, env = "PAYMENT_BACKEND", value_enum, default_value_t = PaymentBackend::Http)]
    pub payment_backend: PaymentBackend,

    /// Seconds after which the dummy backend marks a payment as paid
    #[arg(long, env = "DUMMY_SETTLE_SECS", default_value_t = 3)]
    pub dummy_settle_secs: u64,

    #[arg(long, env = "API_URL")]
    pub api_url: Option<String>,

    #[arg(long, env = "API_VERSION", default_value = "v1")]
    pub api_version: String,

    #[arg(long, env = "API_ADDRESS")]
    pub api_address: Option<String>,

    #[arg(long, env = "API_SIGNATURE", hide_env_values = true)]
    pub api_signature: Option<String>,

    /// Tries per payment API call
    #[arg(long, env = "API_RETRIES", default_value_t = 3)]
    pub api_retries: u32,

    /// Sent as Device-Id to the payment API; defaults to the link id
    #[arg(long, env = "DEVICE_ID")]
    pub device_id: Option<String>,

    /// Default log filter, overridden by RUST_LOG
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Also write logs to this file
    #[arg(long, env = "LOG_FILE_PATH")]
    pub log_file_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct BusSettings {
    pub kind: BusKind,
    pub adapter: AdapterKind,
    pub path: Option<PathBuf>,
    pub baud_rate: u32,
}

#[derive(Debug, Clone)]
pub enum PaymentSettings {
    Http(ApiSettings),
    Dummy { settle_after: Duration },
}

#[derive(Debug, Clone)]
pub struct LogSettings {
    pub level: String,
    pub file: Option<PathBuf>,
}

/// Everything the process needs, validated.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bus: BusSettings,
    pub machine: MachineSettings,
    pub reconciler: ReconcilerSettings,
    pub payment: PaymentSettings,
    pub log: LogSettings,
}

impl TryFrom<Cli> for Settings {
    type Error = BridgeError;

    fn try_from(cli: Cli) -> Result<Self> {
        if cli.link_id.trim().is_empty() {
            return Err(BridgeError::ConfigError("LINK_ID must not be empty".to_string()));
        }
        if cli.adapter == AdapterKind::QibixxUsb && cli.mdb_path.is_none() {
            return Err(BridgeError::ConfigError(
                "MDB_PATH is required for the qibixx-usb adapter".to_string(),
            ));
        }
        let payment_timeout = Duration::from_secs(cli.payment_timeout);
        payment_expiry(Utc::now(), payment_timeout)?;

        let payment = match cli.payment_backend {
            PaymentBackend::Dummy => PaymentSettings::Dummy {
                settle_after: Duration::from_secs(cli.dummy_settle_secs),
            },
            PaymentBackend::Http => {
                let (Some(url), Some(address), Some(signature)) =
                    (cli.api_url, cli.api_address, cli.api_signature)
                else {
                    return Err(BridgeError::ConfigError(
                        "API_URL, API_ADDRESS and API_SIGNATURE are required for the http backend"
                            .to_string(),
                    ));
                };
                PaymentSettings::Http(ApiSettings {
                    url,
                    version: cli.api_version,
                    address,
                    signature,
                    device_id: cli.device_id.unwrap_or_else(|| cli.link_id.clone()),
                    attempts: cli.api_retries.max(1),
                    retry_delay: Duration::from_millis(300),
                    poll_interval: Duration::from_secs(1),
                })
            }
        };

        Ok(Self {
            bus: BusSettings {
                kind: cli.bus_type,
                adapter: cli.adapter,
                path: cli.mdb_path,
                baud_rate: cli.mdb_baud_rate,
            },
            machine: MachineSettings {
                credit: cli.credit,
                settle_delay: Duration::from_millis(cli.settle_delay_ms),
            },
            reconciler: ReconcilerSettings {
                link_id: cli.link_id,
                currency: cli.currency,
                payment_timeout,
            },
            payment,
            log: LogSettings {
                level: cli.log_level,
                file: cli.log_file_path,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn parse(args: &[&str]) -> Result<Settings> {
        let cli = Cli::try_parse_from(std::iter::once("vendbridge").chain(args.iter().copied()))
            .map_err(|e| BridgeError::ConfigError(e.to_string()))?;
        Settings::try_from(cli)
    }

    #[test]
    fn test_dummy_defaults() {
        let settings = parse(&["--link-id", "vm-1", "--payment-backend", "dummy"]).unwrap();

        assert_eq!(settings.reconciler.link_id, "vm-1");
        assert_eq!(settings.reconciler.currency, "CHF");
        assert_eq!(settings.reconciler.payment_timeout, Duration::from_secs(45));
        assert_eq!(settings.machine.credit.value(), dec!(10));
        assert_eq!(settings.machine.settle_delay, Duration::from_secs(2));
        assert_eq!(settings.bus.adapter, AdapterKind::Dummy);
        assert_eq!(settings.bus.kind, BusKind::MdbLevel2);
        assert!(matches!(
            settings.payment,
            PaymentSettings::Dummy { settle_after } if settle_after == Duration::from_secs(3)
        ));
    }

    #[test]
    fn test_http_backend_requires_credentials() {
        let result = parse(&["--link-id", "vm-1", "--api-url", "https://api.example.com"]);
        assert!(matches!(result, Err(BridgeError::ConfigError(_))));
    }

    #[test]
    fn test_http_backend_settings() {
        let settings = parse(&[
            "--link-id",
            "vm-1",
            "--api-url",
            "https://api.example.com",
            "--api-address",
            "addr",
            "--api-signature",
            "sig",
            "--api-retries",
            "0",
        ])
        .unwrap();

        let PaymentSettings::Http(api) = settings.payment else {
            panic!("expected http backend");
        };
        assert_eq!(api.device_id, "vm-1");
        assert_eq!(api.version, "v1");
        assert_eq!(api.attempts, 1);
    }

    #[test]
    fn test_usb_adapter_requires_path() {
        let result = parse(&[
            "--link-id",
            "vm-1",
            "--payment-backend",
            "dummy",
            "--adapter",
            "qibixx-usb",
        ]);
        assert!(matches!(result, Err(BridgeError::ConfigError(_))));

        let settings = parse(&[
            "--link-id",
            "vm-1",
            "--payment-backend",
            "dummy",
            "--adapter",
            "qibixx-usb",
            "--mdb-path",
            "/dev/ttyACM0",
        ])
        .unwrap();
        assert_eq!(settings.bus.baud_rate, 115200);
    }

    #[test]
    fn test_invalid_credit_is_rejected() {
        let result = parse(&[
            "--link-id",
            "vm-1",
            "--payment-backend",
            "dummy",
            "--credit",
            "1,5",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_out_of_range_payment_timeout_is_rejected() {
        let result = parse(&[
            "--link-id",
            "vm-1",
            "--payment-backend",
            "dummy",
            "--payment-timeout",
            "100000000000000",
        ]);
        assert!(matches!(result, Err(BridgeError::ConfigError(m)) if m.contains("out of range")));
    }
}
