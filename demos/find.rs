//! Study level C-FIND
//!
//! Reads the connection settings from a TOML file (see `ClientConfig`) and
//! queries studies by patient name, optionally limited to a date range.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example find -- pacs.toml "DOE^*"
//! cargo run --example find -- pacs.toml "*" 20210101 20211231
//! ```

use chrono::NaiveDate;
use dicomtools_rust::query::{DateRange, StudyQuery};
use dicomtools_rust::{ClientConfig, DicomClient, Result};
use std::env;
use tracing_subscriber::EnvFilter;

fn parse_date(arg: Option<&String>) -> Option<NaiveDate> {
    arg.and_then(|text| NaiveDate::parse_from_str(text, "%Y%m%d").ok())
}

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
    let patient_name = args.get(1).cloned().unwrap_or_else(|| "*".to_string());
    let range = DateRange::new(parse_date(args.get(2)), parse_date(args.get(3)));

    let client = DicomClient::new(config)?;
    let query = StudyQuery::new().patient_name(patient_name).study_date(range);
    let outcome = client.find(&query).await?;

    for study in &outcome.records {
        let when = study
            .study_datetime
            .as_ref()
            .map(|dt| dt.to_string())
            .unwrap_or_default();
        println!(
            "{:<24} {:<12} {:<19} {:<8} {}",
            study.patient_name, study.patient_id, when, study.modalities, study.study_description
        );
    }
    for warning in &outcome.warnings {
        eprintln!("warning: {}", warning);
    }
    println!(
        "{} studies in {} ms",
        outcome.records.len(),
        outcome.elapsed.as_millis()
    );
    Ok(())
}
