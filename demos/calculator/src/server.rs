//! Calculator server
//!
//! Run with: cargo run --bin calculator-server -- --port 5000

use std::sync::Arc;

use clap::Parser;
use remoteref::{ExportOptions, ObjectIdentity, RemoteRuntime};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use calculator::{stub_template, CalculatorImpl, CALCULATOR_OBJECT, INTERFACE};

#[derive(Parser)]
#[command(name = "calculator-server")]
#[command(about = "Remote Calculator Server")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5000")]
    port: u16,

    /// Host to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Serve the calculator through a static stub using operation indices
    #[arg(long)]
    legacy: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let runtime = RemoteRuntime::builder()
        .host(args.host.clone())
        .listen_host(args.host.clone())
        .build();

    if args.legacy {
        let template = stub_template();
        info!("Registering static stub {}", template.name);
        runtime.stub_registry().register(template);
    }

    info!("Starting Calculator Server");
    info!("Interface: {}", INTERFACE);

    let stub = runtime
        .export(
            Arc::new(CalculatorImpl),
            ExportOptions::new()
                .port(args.port)
                .identity(ObjectIdentity::well_known(CALCULATOR_OBJECT)),
        )
        .await?;

    info!("Exported {} ({:?})", stub.reference(), stub.kind());
    info!("Server ready, waiting for calls...");

    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    runtime.shutdown();
    let stats = runtime.stats();
    info!(
        "Served {} calls over {} connections",
        stats.calls_completed, stats.connections_accepted
    );

    Ok(())
}
