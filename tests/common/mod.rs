#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use vendbridge::application::reconciler::ReconcilerSettings;
use vendbridge::domain::amount::Amount;
use vendbridge::domain::ports::{BusAdapter, VendController};
use vendbridge::error::Result;
use vendbridge::infrastructure::in_memory::InMemoryPaymentApi;

pub const LINK_ID: &str = "vm-1";

pub fn tokens(line: &str) -> Vec<String> {
    line.split(',').map(str::to_string).collect()
}

pub fn amount(value: &str) -> Amount {
    value.parse().unwrap()
}

pub fn reconciler_settings(payment_timeout: Duration) -> ReconcilerSettings {
    ReconcilerSettings {
        link_id: LINK_ID.to_string(),
        currency: "CHF".to_string(),
        payment_timeout,
    }
}

/// A bus fed by the test, recording every command written to it.
pub struct ScriptedAdapter {
    tx: Mutex<Option<mpsc::UnboundedSender<Vec<String>>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<String>>>,
    written: Mutex<Vec<String>>,
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Mutex::new(Some(tx)),
            rx: tokio::sync::Mutex::new(rx),
            written: Mutex::new(Vec::new()),
        }
    }

    /// Queues an inbound line, given without its sender marker.
    pub fn push(&self, line: &str) {
        if let Some(tx) = self.tx.lock().unwrap().as_ref() {
            tx.send(tokens(line)).unwrap();
        }
    }

    /// Ends the inbound stream once queued lines are read.
    pub fn close(&self) {
        self.tx.lock().unwrap().take();
    }

    pub fn written(&self) -> Vec<String> {
        self.written.lock().unwrap().clone()
    }
}

#[async_trait]
impl BusAdapter for ScriptedAdapter {
    async fn read(&self) -> Result<Option<Vec<String>>> {
        Ok(self.rx.lock().await.recv().await)
    }

    async fn write(&self, payload: &str) -> Result<()> {
        self.written.lock().unwrap().push(payload.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VendCall {
    Enable,
    Disable,
    RefreshCredit,
    Accept(Amount),
    Stop,
}

/// A machine that only records what it was told to do.
#[derive(Default)]
pub struct RecordingController {
    calls: Mutex<Vec<VendCall>>,
}

impl RecordingController {
    pub fn calls(&self) -> Vec<VendCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: VendCall) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

#[async_trait]
impl VendController for RecordingController {
    async fn enable(&self) -> Result<()> {
        self.record(VendCall::Enable)
    }

    async fn disable(&self) -> Result<()> {
        self.record(VendCall::Disable)
    }

    async fn refresh_credit(&self) -> Result<()> {
        self.record(VendCall::RefreshCredit)
    }

    async fn accept_vend(&self, price: Amount) -> Result<()> {
        self.record(VendCall::Accept(price))
    }

    async fn stop_vend(&self) -> Result<()> {
        self.record(VendCall::Stop)
    }
}

/// Polls `condition` until it holds, failing the test after five seconds.
pub async fn wait_until<F: Fn() -> bool>(what: &str, condition: F) {
    let polled = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(polled.is_ok(), "timed out waiting for {what}");
}

/// Waits until `count` payments were opened and the latest one is still pending.
pub async fn wait_for_pending_payment(api: &InMemoryPaymentApi, count: u64) {
    let polled = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let pending = api
                .current_payment(LINK_ID)
                .await
                .is_some_and(|p| !p.status.is_terminal());
            if pending && api.payments_created().await == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(polled.is_ok(), "timed out waiting for payment #{count}");
}
