use crate::domain::ports::BusAdapter;
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::info;

/// A simulated peripheral for running without hardware.
///
/// Every enable or disable is answered with a readiness report and every credit line with a
/// vend request for product 13 at 1.5, each after `reply_delay`.
pub struct DummyAdapter {
    tx: mpsc::UnboundedSender<Vec<String>>,
    rx: Mutex<mpsc::UnboundedReceiver<Vec<String>>>,
    reply_delay: Duration,
}

impl Default for DummyAdapter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl DummyAdapter {
    pub fn new(reply_delay: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            reply_delay,
        }
    }

    fn reply_later(&self, frame: &[&str]) {
        let tx = self.tx.clone();
        let frame: Vec<String> = frame.iter().map(|t| t.to_string()).collect();
        let delay = self.reply_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(frame);
        });
    }
}

#[async_trait]
impl BusAdapter for DummyAdapter {
    async fn read(&self) -> Result<Option<Vec<String>>> {
        // the adapter keeps a sender itself, so the channel never closes
        Ok(self.rx.lock().await.recv().await)
    }

    async fn write(&self, payload: &str) -> Result<()> {
        info!(%payload, "dummy write");
        if payload == "1" || payload == "0" {
            self.reply_later(&["STATUS", "ENABLED"]);
        } else if payload.starts_with("START") {
            self.reply_later(&["STATUS", "VEND", "1.5", "13"]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enable_is_answered_with_readiness() {
        let adapter = DummyAdapter::new(Duration::from_millis(1));
        adapter.write("1").await.unwrap();
        assert_eq!(
            adapter.read().await.unwrap(),
            Some(vec!["STATUS".to_string(), "ENABLED".to_string()])
        );
    }

    #[tokio::test]
    async fn test_credit_is_answered_with_vend_request() {
        let adapter = DummyAdapter::new(Duration::from_millis(1));
        adapter.write("START,10").await.unwrap();
        assert_eq!(
            adapter.read().await.unwrap(),
            Some(vec![
                "STATUS".to_string(),
                "VEND".to_string(),
                "1.5".to_string(),
                "13".to_string()
            ])
        );
    }
}
