//! Issue one invoice through the background queue.
//!
//! ```text
//! cargo run --example issue_invoice -- sifen.toml stage-41 1500000
//! ```
//!
//! A default configuration is written to the given path when none exists;
//! fill in the emitter, certificate paths and CSC before running again.

use std::path::PathBuf;
use std::sync::Arc;

use rust_decimal::Decimal;
use sifen::config::SifenConfig;
use sifen::pipeline::{IssuanceQueue, Issuer, PaymentApproved, ReceiverConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sifen=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut args = std::env::args().skip(1);
    let config_path = PathBuf::from(args.next().unwrap_or_else(|| "sifen.toml".into()));
    let business_ref = args.next().unwrap_or_else(|| "demo-payment-1".into());
    let amount: Decimal = args
        .next()
        .and_then(|a| a.parse().ok())
        .unwrap_or(Decimal::from(110_000));

    let config = match SifenConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    let issuer = match Issuer::from_config(&config) {
        Ok(issuer) => Arc::new(issuer),
        Err(e) => {
            eprintln!("Configuration in {} is not usable yet:", config_path.display());
            for problem in e.to_string().split("; ") {
                eprintln!("  - {problem}");
            }
            std::process::exit(1);
        }
    };

    let (queue, worker) =
        IssuanceQueue::start(Arc::clone(&issuer), config.queue_capacity, config.max_concurrent);

    let event = PaymentApproved {
        business_ref: business_ref.clone(),
        amount,
        currency: "PYG".into(),
        exchange_rate: None,
        receiver: ReceiverConfig {
            name: "Juan Pérez".into(),
            document_type: Some("Cédula".into()),
            document_number: Some("4567890".into()),
            ..ReceiverConfig::default()
        },
        description: "Desarrollo de sitio web".into(),
        tax_affectation: "gravado".into(),
        tax_rate: Decimal::from(10),
        taxed_proportion: None,
        payment_method: Some("transferencia".into()),
    };

    if let Err(e) = queue.on_payment_approved(event).await {
        eprintln!("Could not enqueue: {e}");
        std::process::exit(1);
    }
    drop(queue);
    if let Err(e) = worker.await {
        eprintln!("Queue worker stopped: {e}");
        std::process::exit(1);
    }

    match issuer.store().history(&business_ref) {
        Ok(history) => {
            for record in history {
                println!(
                    "attempt {}: {:?} {:?} cdc={} protocol={} {}",
                    record.attempt,
                    record.status,
                    record.stage,
                    record.control_code.map(|c| c.to_string()).unwrap_or_default(),
                    record.protocol_number.unwrap_or_default(),
                    record.last_error.unwrap_or_default(),
                );
                if let Some(url) = record.verification_url {
                    println!("  {url}");
                }
            }
        }
        Err(e) => eprintln!("Cannot read records: {e}"),
    }
}
