use crate::domain::payment::{
    PaymentLink, PaymentLinkPayment, PaymentLinkStatus, PaymentRequest, PaymentStatus,
};
use crate::domain::ports::PaymentApi;
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, watch};
use tracing::{debug, info};

/// Lifetime given to payments created without an explicit expiry.
const DEFAULT_EXPIRY: Duration = Duration::from_secs(3600);

/// An in-process payment-link service.
///
/// Uses `Arc<RwLock<HashMap<String, PaymentLink>>>` keyed by the link's external id, so clones
/// share state. Pending payments expire on their expiry date while someone waits on them.
/// Drives the dummy mode and the tests.
#[derive(Clone)]
pub struct InMemoryPaymentApi {
    inner: Arc<Inner>,
}

struct Inner {
    links: RwLock<HashMap<String, PaymentLink>>,
    next_id: AtomicU64,
    created: AtomicU64,
    changes: watch::Sender<u64>,
    auto_settle: Option<Duration>,
}

impl Default for InMemoryPaymentApi {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPaymentApi {
    /// Creates an empty service where payments only move when told to.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Creates an empty service that completes every payment `delay` after it was opened.
    pub fn with_auto_settle(delay: Duration) -> Self {
        Self::build(Some(delay))
    }

    fn build(auto_settle: Option<Duration>) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                links: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                created: AtomicU64::new(0),
                changes,
                auto_settle,
            }),
        }
    }

    /// The payment currently attached to `link_id`, if any.
    pub async fn current_payment(&self, link_id: &str) -> Option<PaymentLinkPayment> {
        let links = self.inner.links.read().await;
        links.get(link_id).and_then(|link| link.payment.clone())
    }

    /// Number of payments opened since creation, over all links.
    pub async fn payments_created(&self) -> u64 {
        self.inner.created.load(Ordering::SeqCst)
    }

    /// Marks the pending payment on `link_id` as paid.
    pub async fn complete(&self, link_id: &str) -> Result<()> {
        self.settle_pending(link_id, PaymentStatus::Completed).await
    }

    /// Marks the pending payment on `link_id` as expired.
    pub async fn expire(&self, link_id: &str) -> Result<()> {
        self.settle_pending(link_id, PaymentStatus::Expired).await
    }

    async fn settle_pending(&self, link_id: &str, status: PaymentStatus) -> Result<()> {
        let id = self
            .current_payment(link_id)
            .await
            .filter(|p| p.status == PaymentStatus::Pending)
            .map(|p| p.id)
            .ok_or_else(|| BridgeError::PaymentNotFound(link_id.to_string()))?;
        self.settle(link_id, id, status).await;
        Ok(())
    }

    /// Moves payment `id` to `status` if it is still the pending payment of the link.
    async fn settle(&self, link_id: &str, id: u64, status: PaymentStatus) -> bool {
        let mut links = self.inner.links.write().await;
        let Some(payment) = links.get_mut(link_id).and_then(|link| link.payment.as_mut()) else {
            return false;
        };
        if payment.id != id || payment.status != PaymentStatus::Pending {
            return false;
        }
        payment.status = status;
        drop(links);

        debug!(%link_id, payment_id = id, ?status, "payment settled");
        self.notify();
        true
    }

    fn notify(&self) {
        self.inner.changes.send_modify(|version| *version += 1);
    }

    async fn link(&self, link_id: &str) -> Result<PaymentLink> {
        let links = self.inner.links.read().await;
        links
            .get(link_id)
            .cloned()
            .ok_or_else(|| BridgeError::LinkNotFound(link_id.to_string()))
    }
}

fn marker(link: &PaymentLink) -> Option<(u64, PaymentStatus)> {
    link.payment.as_ref().map(|p| (p.id, p.status))
}

fn remaining(until: DateTime<Utc>) -> Duration {
    (until - Utc::now()).to_std().unwrap_or(Duration::ZERO)
}

#[async_trait]
impl PaymentApi for InMemoryPaymentApi {
    async fn get_payment_link(&self, link_id: &str) -> Result<PaymentLink> {
        self.link(link_id).await
    }

    async fn create_payment_link(&self, link_id: &str) -> Result<PaymentLink> {
        let mut links = self.inner.links.write().await;
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let link = links
            .entry(link_id.to_string())
            .or_insert_with(|| PaymentLink {
                id,
                route_id: 0,
                external_id: Some(link_id.to_string()),
                status: PaymentLinkStatus::Active,
                url: format!("memory://paymentLink/{link_id}"),
                lnurl: String::new(),
                payment: None,
            })
            .clone();
        Ok(link)
    }

    async fn update_payment_link(
        &self,
        link_id: &str,
        status: PaymentLinkStatus,
    ) -> Result<PaymentLink> {
        let mut links = self.inner.links.write().await;
        let link = links
            .get_mut(link_id)
            .ok_or_else(|| BridgeError::LinkNotFound(link_id.to_string()))?;
        link.status = status;
        Ok(link.clone())
    }

    async fn create_payment(&self, link_id: &str, request: PaymentRequest) -> Result<PaymentLink> {
        let mut links = self.inner.links.write().await;
        let link = links
            .get_mut(link_id)
            .ok_or_else(|| BridgeError::LinkNotFound(link_id.to_string()))?;

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let expiry_date = request.expiry.unwrap_or_else(|| {
            Utc::now() + chrono::Duration::seconds(DEFAULT_EXPIRY.as_secs() as i64)
        });
        link.payment = Some(PaymentLinkPayment {
            id,
            external_id: request.external_id,
            status: PaymentStatus::Pending,
            amount: request.amount,
            currency: request.currency,
            mode: request.mode,
            expiry_date,
            url: format!("memory://paymentLink/{link_id}/payment/{id}"),
            lnurl: String::new(),
        });
        let link = link.clone();
        drop(links);

        self.inner.created.fetch_add(1, Ordering::SeqCst);
        self.notify();
        info!(%link_id, payment_id = id, amount = %request.amount, "payment created");

        if let Some(delay) = self.inner.auto_settle {
            let api = self.clone();
            let link_id = link_id.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                api.settle(&link_id, id, PaymentStatus::Completed).await;
            });
        }
        Ok(link)
    }

    async fn cancel_payment(&self, link_id: &str) -> Result<PaymentLink> {
        let id = self
            .current_payment(link_id)
            .await
            .filter(|p| p.status == PaymentStatus::Pending)
            .map(|p| p.id)
            .ok_or_else(|| BridgeError::PaymentNotFound(link_id.to_string()))?;
        self.settle(link_id, id, PaymentStatus::Cancelled).await;
        self.link(link_id).await
    }

    async fn wait_for_payment(&self, link_id: &str, payment_id: u64) -> Result<PaymentLink> {
        // subscribe before taking the snapshot so no change slips in between
        let mut changes = self.inner.changes.subscribe();
        let snapshot = self.link(link_id).await?;
        let Some(expiry) = snapshot
            .payment
            .as_ref()
            .filter(|p| p.id == payment_id && p.status == PaymentStatus::Pending)
            .map(|p| p.expiry_date)
        else {
            return Ok(snapshot);
        };

        loop {
            tokio::select! {
                changed = changes.changed() => {
                    changed.map_err(|_| BridgeError::ChannelClosed)?;
                }
                _ = tokio::time::sleep(remaining(expiry)) => {
                    self.settle(link_id, payment_id, PaymentStatus::Expired).await;
                }
            }

            let link = self.link(link_id).await?;
            if marker(&link) != Some((payment_id, PaymentStatus::Pending)) {
                return Ok(link);
            }
        }
    }
}
