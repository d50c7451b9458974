use crate::application::events::EventSender;
use crate::domain::amount::Amount;
use crate::domain::event::{Command, DomainEvent};
use crate::domain::ports::{BusAdapterRef, VendController};
use crate::error::Result;
use crate::interfaces::bus::message::{BusFault, BusMessage, TOGGLE};
use async_trait::async_trait;
use rust_decimal_macros::dec;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct MachineSettings {
    /// Stored credit applied whenever the peripheral becomes ready.
    pub credit: Amount,
    /// Pause the peripheral needs after enable or refund before it takes a new credit line.
    pub settle_delay: Duration,
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self {
            credit: Amount::new(dec!(10)).unwrap_or_default(),
            settle_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    Disabled,
    Enabling,
    Enabled,
    Vending,
    ErrorRecovering,
}

/// Protocol state machine for an MDB level-2 cashless peripheral.
///
/// Decodes inbound bus lines into domain events and turns commands into bus lines. It runs for
/// the lifetime of the process; the state it tracks is informational and never blocks a
/// command.
pub struct MdbLevel2 {
    adapter: BusAdapterRef,
    settings: MachineSettings,
    state: watch::Sender<MachineState>,
    events: EventSender,
}

impl MdbLevel2 {
    /// Creates a machine in the `Disabled` state.
    ///
    /// # Arguments
    ///
    /// * `adapter` - The bus the peripheral is attached to.
    /// * `settings` - Credit ceiling and settling delay.
    /// * `events` - The only producer of domain events for this machine.
    pub fn new(adapter: BusAdapterRef, settings: MachineSettings, events: EventSender) -> Self {
        let (state, _) = watch::channel(MachineState::Disabled);
        Self {
            adapter,
            settings,
            state,
            events,
        }
    }

    pub fn state(&self) -> MachineState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<MachineState> {
        self.state.subscribe()
    }

    /// Drains the bus, one line at a time and in arrival order, until it closes.
    ///
    /// Faults carried by individual lines are handled in place; only a failing read is
    /// returned.
    pub async fn run(&self) -> Result<()> {
        while let Some(frame) = self.adapter.read().await? {
            self.handle_frame(&frame).await;
        }
        info!("bus closed");
        Ok(())
    }

    /// Interprets the tokens of one inbound line.
    pub async fn handle_frame(&self, frame: &[String]) {
        let decoded = match frame.split_first() {
            Some((head, status)) if head == TOGGLE => {
                if let Err(e) = self.enable().await {
                    warn!(error = %e, "enable on toggle report failed");
                }
                BusMessage::parse_status(status)
            }
            _ => BusMessage::parse(frame),
        };

        match decoded {
            Ok(Some(message)) => {
                if let Err(e) = self.dispatch(message).await {
                    warn!(error = %e, frame = %frame.join(","), "failed to handle bus message");
                }
            }
            Ok(None) => debug!(frame = %frame.join(","), "ignoring unmodeled bus message"),
            Err(e) => warn!(error = %e, frame = %frame.join(","), "dropping malformed bus message"),
        }
    }

    async fn dispatch(&self, message: BusMessage) -> Result<()> {
        match message {
            BusMessage::Enabled => self.become_ready().await,
            BusMessage::VendRequest { price, product_id } => {
                self.set_state(MachineState::Vending);
                info!(product_id, %price, "vend requested");
                self.events
                    .emit(DomainEvent::Product { product_id, price })
                    .await
            }
            BusMessage::Fault(fault) => self.recover(fault).await,
            BusMessage::Sale => {
                info!("sale settled by another payment device");
                Ok(())
            }
            BusMessage::VendSuccess => {
                info!("vend completed");
                Ok(())
            }
        }
    }

    async fn recover(&self, fault: BusFault) -> Result<()> {
        self.set_state(MachineState::ErrorRecovering);
        match fault {
            BusFault::CashlessOn => {
                debug!("cashless already on");
                self.become_ready().await
            }
            BusFault::CreditConflict => {
                // the disable is answered with a fresh status report, which re-enables
                warn!("credit conflict, restarting peripheral");
                self.disable().await
            }
            BusFault::VendClash => {
                warn!("vend authorization clash, re-applying credit");
                self.become_ready().await
            }
            BusFault::Other(detail) => {
                error!(%detail, "bus fault");
                self.events.emit(DomainEvent::Error { detail }).await
            }
        }
    }

    async fn become_ready(&self) -> Result<()> {
        tokio::time::sleep(self.settings.settle_delay).await;
        self.refresh_credit().await?;
        self.set_state(MachineState::Enabled);
        Ok(())
    }

    async fn send(&self, command: Command) -> Result<()> {
        let payload = command.to_payload();
        debug!(%payload, "write");
        self.adapter.write(&payload).await
    }

    fn set_state(&self, next: MachineState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(?previous, ?next, "machine state");
        }
    }
}

#[async_trait]
impl VendController for MdbLevel2 {
    async fn enable(&self) -> Result<()> {
        self.send(Command::Enable).await?;
        self.set_state(MachineState::Enabling);
        Ok(())
    }

    async fn disable(&self) -> Result<()> {
        self.send(Command::Disable).await?;
        self.set_state(MachineState::Disabled);
        Ok(())
    }

    async fn refresh_credit(&self) -> Result<()> {
        self.send(Command::SetCredit(self.settings.credit)).await
    }

    async fn accept_vend(&self, price: Amount) -> Result<()> {
        self.send(Command::AcceptVend(price)).await?;
        info!(%price, "vend accepted");
        self.set_state(MachineState::Enabled);
        Ok(())
    }

    async fn stop_vend(&self) -> Result<()> {
        self.send(Command::StopVend).await?;
        info!("vend stopped, credit refunded");
        self.set_state(MachineState::Enabling);
        tokio::time::sleep(self.settings.settle_delay).await;
        self.enable().await?;
        self.refresh_credit().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::{EventStream, event_channel};
    use crate::domain::ports::BusAdapter;
    use crate::error::BridgeError;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    #[derive(Default)]
    struct RecordingAdapter {
        written: Mutex<Vec<String>>,
        fail_writes: bool,
    }

    impl RecordingAdapter {
        fn written(&self) -> Vec<String> {
            self.written.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BusAdapter for RecordingAdapter {
        async fn read(&self) -> Result<Option<Vec<String>>> {
            Ok(None)
        }

        async fn write(&self, payload: &str) -> Result<()> {
            if self.fail_writes {
                return Err(BridgeError::TransportError("port closed".to_string()));
            }
            self.written.lock().unwrap().push(payload.to_string());
            Ok(())
        }
    }

    fn machine(adapter: Arc<RecordingAdapter>) -> (MdbLevel2, EventStream) {
        let (sender, stream) = event_channel(8);
        let settings = MachineSettings {
            settle_delay: Duration::from_millis(1),
            ..Default::default()
        };
        (MdbLevel2::new(adapter, settings, sender), stream)
    }

    fn frame(line: &str) -> Vec<String> {
        line.split(',').map(str::to_string).collect()
    }

    async fn drain(machine: MdbLevel2, mut stream: EventStream) -> Vec<DomainEvent> {
        drop(machine);
        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_status_enabled_applies_credit_without_event() {
        let adapter = Arc::new(RecordingAdapter::default());
        let (machine, stream) = machine(adapter.clone());

        machine.handle_frame(&frame("STATUS,ENABLED")).await;

        assert_eq!(adapter.written(), vec!["START,10"]);
        assert_eq!(machine.state(), MachineState::Enabled);
        assert!(drain(machine, stream).await.is_empty());
    }

    #[tokio::test]
    async fn test_ready_sequence_waits_for_settling() {
        let adapter = Arc::new(RecordingAdapter::default());
        let (sender, _stream) = event_channel(8);
        let settings = MachineSettings {
            settle_delay: Duration::from_millis(40),
            ..Default::default()
        };
        let machine = MdbLevel2::new(adapter.clone(), settings, sender);

        let started = Instant::now();
        machine.handle_frame(&frame("STATUS,ENABLED")).await;

        assert!(started.elapsed() >= Duration::from_millis(40));
        assert_eq!(adapter.written(), vec!["START,10"]);
    }

    #[tokio::test]
    async fn test_vend_request_emits_product() {
        let adapter = Arc::new(RecordingAdapter::default());
        let (machine, stream) = machine(adapter.clone());

        machine.handle_frame(&frame("STATUS,VEND,1.50,13")).await;

        assert_eq!(machine.state(), MachineState::Vending);
        assert!(adapter.written().is_empty());
        assert_eq!(
            drain(machine, stream).await,
            vec![DomainEvent::Product {
                product_id: 13,
                price: Amount::new(dec!(1.50)).unwrap()
            }]
        );
    }

    #[tokio::test]
    async fn test_malformed_vend_is_dropped() {
        let adapter = Arc::new(RecordingAdapter::default());
        let (machine, stream) = machine(adapter.clone());

        machine.handle_frame(&frame("STATUS,VEND,1;50,13")).await;

        assert!(adapter.written().is_empty());
        assert!(drain(machine, stream).await.is_empty());
    }

    #[tokio::test]
    async fn test_cashless_on_runs_ready_sequence() {
        let adapter = Arc::new(RecordingAdapter::default());
        let (machine, stream) = machine(adapter.clone());

        machine.handle_frame(&frame("ERR,cashless is on")).await;

        assert_eq!(adapter.written(), vec!["START,10"]);
        assert_eq!(machine.state(), MachineState::Enabled);
        assert!(drain(machine, stream).await.is_empty());
    }

    #[tokio::test]
    async fn test_credit_conflict_disables() {
        let adapter = Arc::new(RecordingAdapter::default());
        let (machine, stream) = machine(adapter.clone());

        machine.handle_frame(&frame("ERR,START not allowed")).await;

        assert_eq!(adapter.written(), vec!["0"]);
        assert_eq!(machine.state(), MachineState::Disabled);
        assert!(drain(machine, stream).await.is_empty());
    }

    #[tokio::test]
    async fn test_vend_clash_reapplies_credit_without_disabling() {
        let adapter = Arc::new(RecordingAdapter::default());
        let (machine, stream) = machine(adapter.clone());

        machine.handle_frame(&frame("ERR,VEND 3")).await;

        assert_eq!(adapter.written(), vec!["START,10"]);
        assert!(drain(machine, stream).await.is_empty());
    }

    #[tokio::test]
    async fn test_unclassified_fault_surfaces_error() {
        let adapter = Arc::new(RecordingAdapter::default());
        let (machine, stream) = machine(adapter.clone());

        machine.handle_frame(&frame("ERR,unexpected fault")).await;

        assert!(adapter.written().is_empty());
        assert_eq!(machine.state(), MachineState::ErrorRecovering);
        assert_eq!(
            drain(machine, stream).await,
            vec![DomainEvent::Error {
                detail: "unexpected fault".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_toggle_prefix_enables_before_dispatch() {
        let adapter = Arc::new(RecordingAdapter::default());
        let (machine, _stream) = machine(adapter.clone());

        machine.handle_frame(&frame("0,ENABLED")).await;

        assert_eq!(adapter.written(), vec!["1", "START,10"]);
    }

    #[tokio::test]
    async fn test_unknown_messages_are_ignored() {
        let adapter = Arc::new(RecordingAdapter::default());
        let (machine, stream) = machine(adapter.clone());

        machine.handle_frame(&frame("VERSION,4.2")).await;
        machine.handle_frame(&frame("SALE,2.00,4")).await;
        machine.handle_frame(&[]).await;

        assert!(adapter.written().is_empty());
        assert_eq!(machine.state(), MachineState::Disabled);
        assert!(drain(machine, stream).await.is_empty());
    }

    #[tokio::test]
    async fn test_stop_vend_refunds_then_reenables() {
        let adapter = Arc::new(RecordingAdapter::default());
        let (machine, _stream) = machine(adapter.clone());

        machine.stop_vend().await.unwrap();

        assert_eq!(adapter.written(), vec!["STOP", "1", "START,10"]);
        assert_eq!(machine.state(), MachineState::Enabling);
    }

    #[tokio::test]
    async fn test_accept_vend_writes_normalized_price() {
        let adapter = Arc::new(RecordingAdapter::default());
        let (machine, _stream) = machine(adapter.clone());

        machine.handle_frame(&frame("STATUS,VEND,1.50,13")).await;
        machine
            .accept_vend(Amount::new(dec!(1.50)).unwrap())
            .await
            .unwrap();

        assert_eq!(adapter.written(), vec!["VEND,1.5"]);
        assert_eq!(machine.state(), MachineState::Enabled);
    }

    #[tokio::test]
    async fn test_transport_fault_is_signaled() {
        let adapter = Arc::new(RecordingAdapter {
            fail_writes: true,
            ..Default::default()
        });
        let (machine, _stream) = machine(adapter);

        let result = machine.enable().await;
        assert!(matches!(result, Err(BridgeError::TransportError(_))));
        assert_eq!(machine.state(), MachineState::Disabled);
    }
}
