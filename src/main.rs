use clap::Parser;
use miette::{IntoDiagnostic, Result, miette};
use std::sync::Arc;
use tracing::{error, info, warn};
use vendbridge::application::events::{DEFAULT_CAPACITY, event_channel};
use vendbridge::application::machine::MdbLevel2;
use vendbridge::application::reconciler::PaymentReconciler;
use vendbridge::config::{BusKind, Cli, Settings};
use vendbridge::domain::ports::{VendController, VendControllerRef};
use vendbridge::infrastructure::{create_adapter, create_payment_api};
use vendbridge::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let settings = Settings::try_from(cli).into_diagnostic()?;
    init_tracing(&settings.log).into_diagnostic()?;

    info!(
        link_id = %settings.reconciler.link_id,
        adapter = ?settings.bus.adapter,
        "starting vending bridge"
    );

    let adapter = create_adapter(&settings.bus).await.into_diagnostic()?;
    let api = create_payment_api(&settings.payment);

    let (events, stream) = event_channel(DEFAULT_CAPACITY);
    let machine = match settings.bus.kind {
        BusKind::MdbLevel2 => Arc::new(MdbLevel2::new(adapter, settings.machine.clone(), events)),
    };
    let controller: VendControllerRef = machine.clone();
    let reconciler = PaymentReconciler::new(api, controller, settings.reconciler.clone());

    let link = reconciler.ensure_link().await.into_diagnostic()?;
    info!(link_id = %settings.reconciler.link_id, url = %link.url, "payment link ready");

    let bus = {
        let machine = machine.clone();
        tokio::spawn(async move { machine.run().await })
    };

    // readiness is confirmed asynchronously by the peripheral
    if let Err(e) = machine.enable().await {
        error!(error = %e, "failed to enable machine");
    }

    tokio::select! {
        _ = reconciler.run(stream) => Err(miette!("event stream closed")),
        finished = bus => match finished.into_diagnostic()? {
            Ok(()) => Err(miette!("bus closed")),
            Err(e) => Err(miette!("bus failed: {e}")),
        },
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            if let Err(e) = machine.disable().await {
                warn!(error = %e, "failed to disable machine");
            }
            Ok(())
        }
    }
}
