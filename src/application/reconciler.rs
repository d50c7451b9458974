use crate::application::events::EventStream;
use crate::domain::amount::Amount;
use crate::domain::event::DomainEvent;
use crate::domain::payment::{PaymentLink, PaymentLinkStatus, PaymentRequest, PaymentStatus};
use crate::domain::ports::{PaymentApiRef, VendControllerRef};
use crate::domain::session::{VendSession, external_id, payment_expiry};
use crate::error::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    /// External identifier of the payment link this machine collects on.
    pub link_id: String,
    pub currency: String,
    /// How long a customer has to pay before the payment expires.
    pub payment_timeout: Duration,
}

/// How a reconciliation cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Payment completed, the vend was accepted.
    Accepted,
    /// Payment expired, the vend was stopped and credit refunded.
    Refunded,
    /// Payment was cancelled; the machine was left alone.
    Cancelled,
    /// Another payment replaced ours on the link; the machine was left alone.
    Superseded,
    /// The service opened no payment.
    NotCreated,
}

/// Correlates vend requests with payments on the configured link and drives the machine's
/// accept or refund.
///
/// `run` consumes events one at a time: a vend request is reconciled completely before the
/// next event is taken, so there is never more than one payment cycle active per link.
#[derive(Clone)]
pub struct PaymentReconciler {
    api: PaymentApiRef,
    machine: VendControllerRef,
    settings: Arc<ReconcilerSettings>,
}

impl PaymentReconciler {
    pub fn new(
        api: PaymentApiRef,
        machine: VendControllerRef,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            api,
            machine,
            settings: Arc::new(settings),
        }
    }

    /// Makes sure the configured link exists and is active.
    pub async fn ensure_link(&self) -> Result<PaymentLink> {
        let link_id = &self.settings.link_id;
        let link = match self.api.get_payment_link(link_id).await {
            Ok(link) => link,
            Err(e) => {
                info!(%link_id, reason = %e, "creating payment link");
                self.api.create_payment_link(link_id).await?
            }
        };

        if link.status == PaymentLinkStatus::Inactive {
            info!(%link_id, "activating payment link");
            return self
                .api
                .update_payment_link(link_id, PaymentLinkStatus::Active)
                .await;
        }
        Ok(link)
    }

    /// Handles events until the stream closes.
    ///
    /// A failing or panicking event handler is logged and the loop moves on. Each handler runs
    /// in its own task that is awaited before the next event is taken, so ordering holds.
    pub async fn run(&self, mut events: EventStream) {
        while let Some(event) = events.next().await {
            let reconciler = self.clone();
            let handled = tokio::spawn(async move { reconciler.handle(event).await }).await;
            match handled {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "failed to handle machine event"),
                Err(e) => error!(error = %e, "machine event handler panicked"),
            }
        }
        info!("event stream closed");
    }

    pub async fn handle(&self, event: DomainEvent) -> Result<()> {
        match event {
            DomainEvent::Enabled => {
                debug!("machine enabled");
                Ok(())
            }
            DomainEvent::Product { product_id, price } => {
                let outcome = self.reconcile(product_id, price).await?;
                info!(product_id, %price, ?outcome, "reconciliation finished");
                Ok(())
            }
            DomainEvent::Error { detail } => {
                error!(%detail, "received error from machine");
                Ok(())
            }
        }
    }

    /// Runs one payment cycle for a vend request and issues the resulting machine command.
    pub async fn reconcile(&self, product_id: u32, price: Amount) -> Result<CycleOutcome> {
        let link_id = &self.settings.link_id;

        // there may be nothing to cancel
        if let Err(e) = self.api.cancel_payment(link_id).await {
            debug!(%link_id, reason = %e, "no payment cancelled");
        }

        let now = Utc::now();
        let expiry = payment_expiry(now, self.settings.payment_timeout)?;
        let request = PaymentRequest::single(price, &self.settings.currency)
            .with_external_id(external_id(link_id, product_id, now))
            .expiring_at(expiry);

        let link = self.api.create_payment(link_id, request).await?;
        let Some(payment) = link.payment else {
            info!(%link_id, product_id, "no payment opened, abandoning vend");
            return Ok(CycleOutcome::NotCreated);
        };

        let session = VendSession::new(product_id, price, payment.id);
        info!(
            payment_id = session.payment_id,
            product_id,
            %price,
            url = %payment.url,
            "waiting for payment"
        );

        let mut current = Some(payment);
        while let Some(payment) = &current
            && session.owns(payment)
            && payment.status == PaymentStatus::Pending
        {
            current = self
                .api
                .wait_for_payment(link_id, session.payment_id)
                .await?
                .payment;
        }

        let outcome = match current {
            Some(payment) if session.owns(&payment) => match payment.status {
                PaymentStatus::Completed => {
                    self.machine.accept_vend(session.price).await?;
                    CycleOutcome::Accepted
                }
                PaymentStatus::Expired => {
                    self.machine.stop_vend().await?;
                    CycleOutcome::Refunded
                }
                PaymentStatus::Cancelled | PaymentStatus::Pending => CycleOutcome::Cancelled,
            },
            _ => {
                warn!(payment_id = session.payment_id, "payment replaced on link");
                CycleOutcome::Superseded
            }
        };
        Ok(outcome)
    }
}
