//! Modality Worklist query for one scheduled station
//!
//! # Usage
//!
//! ```bash
//! cargo run --example worklist -- ris.toml CT01
//! cargo run --example worklist -- ris.toml CT01 20211012
//! ```

use chrono::NaiveDate;
use dicomtools_rust::query::{DateRange, WorklistQuery};
use dicomtools_rust::{ClientConfig, DicomClient, Result};
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let config = match args.first() {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    };

    let mut query = WorklistQuery::new();
    if let Some(station) = args.get(1) {
        query = query.station_ae_title(station.as_str());
    }
    if let Some(date) = args
        .get(2)
        .and_then(|text| NaiveDate::parse_from_str(text, "%Y%m%d").ok())
    {
        query = query.scheduled_date(DateRange::on(date));
    }

    let client = DicomClient::new(config)?;
    info!(host = %client.config().host, "Querying worklist");
    let outcome = client.worklist(&query).await?;

    for entry in &outcome.records {
        println!(
            "{} ({}) {} step(s) {} {}",
            entry.patient_name,
            entry.patient_id,
            entry.step_count,
            entry.modality,
            entry.requested_procedure_description
        );
        for step in &entry.steps {
            let start = step.start.as_ref().map(|dt| dt.to_string()).unwrap_or_default();
            println!("    {:<10} {:<4} {:<19} {}", step.step_id, step.modality, start, step.description);
        }
    }
    for warning in &outcome.warnings {
        eprintln!("warning: {}", warning);
    }
    Ok(())
}
