//! Calculator client
//!
//! Run with: cargo run --bin calculator-client -- --host 127.0.0.1 --port 5000

use clap::Parser;
use remoteref::{Endpoint, RemoteRuntime};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use calculator::{CalcError, CalculatorClient};

#[derive(Parser)]
#[command(name = "calculator-client")]
#[command(about = "Remote Calculator Client")]
struct Args {
    /// Server host
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value = "5000")]
    port: u16,

    /// Call by operation index instead of method hash
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
    let endpoint = Endpoint::new(args.host, args.port);

    info!("Connecting to Calculator server at {}", endpoint);

    let runtime = RemoteRuntime::default();
    let client = CalculatorClient::connect(&runtime, endpoint, args.legacy);

    let result = client.add(10, 5).await?;
    info!("Add(10, 5) = {}", result);
    assert_eq!(result, 15);

    let result = client.subtract(10, 5).await?;
    info!("Subtract(10, 5) = {}", result);
    assert_eq!(result, 5);

    let result = client.multiply(10, 5).await?;
    info!("Multiply(10, 5) = {}", result);
    assert_eq!(result, 50);

    let (quotient, remainder) = client.divide(17, 5).await?;
    info!("Divide(17, 5) = {} remainder {}", quotient, remainder);
    assert_eq!((quotient, remainder), (3, 2));

    let err = match client.divide(1, 0).await {
        Ok(result) => return Err(format!("Divide(1, 0) returned {:?}", result).into()),
        Err(err) => err,
    };
    info!("Divide(1, 0) failed: {}", err);
    assert_eq!(
        err.as_application().and_then(|a| a.downcast::<CalcError>()),
        Some(CalcError::DivisionByZero)
    );

    info!("All tests passed!");

    Ok(())
}
