//! C-ECHO (verification) against a remote AE
//!
//! # Usage
//!
//! ```bash
//! cargo run --example echo -- 127.0.0.1 11112 ORTHANC
//!
//! # with library logs
//! RUST_LOG=dicomtools_rust=debug cargo run --example echo -- pacs.local 104
//! ```

use dicomtools_rust::{ClientConfig, DicomClient};
use std::env;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let host = args.first().cloned().unwrap_or_else(|| "127.0.0.1".to_string());
    let port = match args.get(1).map(|p| p.parse::<u16>()) {
        Some(Ok(port)) => port,
        Some(Err(e)) => {
            eprintln!("Invalid port: {}", e);
            return ExitCode::FAILURE;
        }
        None => 104,
    };

    let mut config = ClientConfig::new(host, port);
    if let Some(called_ae) = args.get(2) {
        config.called_ae = called_ae.clone();
    }

    let client = match DicomClient::new(config) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = client.echo_report().await;
    println!(
        "{}:{}  {}  ({} ms)",
        result.host,
        result.port,
        result.status,
        result.elapsed.as_millis()
    );
    if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
