use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

const BRIDGE_ENV: [&str; 6] = [
    "LINK_ID",
    "API_URL",
    "API_ADDRESS",
    "API_SIGNATURE",
    "PAYMENT_BACKEND",
    "ADAPTER",
];

fn bridge() -> Command {
    let mut cmd = Command::new(cargo_bin!());
    for var in BRIDGE_ENV {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_cli_help() -> Result<(), Box<dyn std::error::Error>> {
    bridge()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--link-id"))
        .stdout(predicate::str::contains("--payment-backend"));

    Ok(())
}

#[test]
fn test_cli_requires_link_id() -> Result<(), Box<dyn std::error::Error>> {
    bridge()
        .assert()
        .failure()
        .stderr(predicate::str::contains("--link-id"));

    Ok(())
}

#[test]
fn test_cli_rejects_http_backend_without_credentials() -> Result<(), Box<dyn std::error::Error>> {
    bridge()
        .args(["--link-id", "vm-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("API_URL"));

    Ok(())
}

#[test]
fn test_cli_rejects_usb_adapter_without_device() -> Result<(), Box<dyn std::error::Error>> {
    bridge()
        .args(["--link-id", "vm-1", "--adapter", "qibixx-usb"])
        .env_remove("MDB_PATH")
        .assert()
        .failure()
        .stderr(predicate::str::contains("MDB_PATH"));

    Ok(())
}
