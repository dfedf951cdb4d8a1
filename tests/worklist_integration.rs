//! Integration tests for Modality Worklist C-FIND

mod common;

use chrono::NaiveDate;
use common::{MockScp, Script};
use dicomtools_rust::dimse::{tags, DataSet};
use dicomtools_rust::protocol::uid::{self, TransferSyntax};
use dicomtools_rust::query::{DateRange, WorklistQuery};
use dicomtools_rust::DicomClient;

fn step(id: &str, modality: &str, date: &str, time: &str) -> DataSet {
    let mut item = DataSet::new();
    item.put_str(tags::SCHEDULED_STATION_AE_TITLE, "CT01");
    item.put_str(tags::SCHEDULED_PROCEDURE_STEP_ID, id);
    item.put_str(tags::MODALITY, modality);
    item.put_str(tags::SCHEDULED_PERFORMING_PHYSICIAN_NAME, "WHO^DOCTOR");
    item.put_str(tags::SCHEDULED_PROCEDURE_STEP_START_DATE, date);
    item.put_str(tags::SCHEDULED_PROCEDURE_STEP_START_TIME, time);
    item.put_str(tags::SCHEDULED_PROCEDURE_STEP_DESCRIPTION, "HEAD WITHOUT CONTRAST");
    item
}

fn entry(patient_id: &str, steps: Vec<DataSet>) -> DataSet {
    let mut ds = DataSet::new();
    ds.put_str(tags::SPECIFIC_CHARACTER_SET, "ISO_IR 100");
    ds.put_str(tags::ACCESSION_NUMBER, "ACC-77");
    ds.put_str(tags::PATIENT_NAME, "MÜLLER^ANNA");
    ds.put_str(tags::PATIENT_ID, patient_id);
    ds.put_str(tags::PATIENT_BIRTH_DATE, "19850312");
    ds.put_str(tags::PATIENT_SEX, "F");
    ds.put_str(tags::REQUESTED_PROCEDURE_DESCRIPTION, "CT HEAD");
    ds.put_sequence(tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE, steps);
    ds
}

#[tokio::test]
async fn test_worklist_records() {
    let scp = MockScp::spawn(Script {
        matches: vec![
            entry(
                "W1",
                vec![
                    step("SPS1", "CT", "20211012", "0830"),
                    step("SPS2", "MR", "20211012", "093000.5"),
                ],
            ),
            entry("W2", Vec::new()),
        ],
        ..Default::default()
    })
    .await;
    let client = DicomClient::new(scp.config()).unwrap();

    let query = WorklistQuery::new()
        .station_ae_title("CT01")
        .modality("CT")
        .scheduled_date(DateRange::on(NaiveDate::from_ymd_opt(2021, 10, 12).unwrap()));
    let outcome = client.worklist(&query).await.unwrap();

    assert!(outcome.warnings.is_empty());
    assert_eq!(outcome.records.len(), 2);

    let first = &outcome.records[0];
    assert_eq!(first.patient_name, "MÜLLER^ANNA");
    assert_eq!(first.patient_id, "W1");
    assert_eq!(first.birth_date, "19850312");
    assert_eq!(first.sex, "F");
    assert_eq!(first.accession_number, "ACC-77");
    assert_eq!(first.requested_procedure_description, "CT HEAD");
    assert_eq!(first.step_count, 2);
    assert_eq!(first.modality, "CT,MR");
    assert_eq!(first.steps[0].step_id, "SPS1");
    assert_eq!(first.steps[0].performing_physician, "WHO^DOCTOR");
    assert_eq!(first.steps[0].description, "HEAD WITHOUT CONTRAST");
    assert_eq!(
        first.steps[0].start.as_ref().unwrap().to_string(),
        "2021-10-12 08:30:00"
    );
    assert_eq!(
        first.steps[1].start.as_ref().unwrap().to_string(),
        "2021-10-12 09:30:00"
    );

    let second = &outcome.records[1];
    assert_eq!(second.step_count, 0);
    assert!(second.steps.is_empty());
    assert_eq!(second.modality, "");
}

#[tokio::test]
async fn test_worklist_identifier_sent() {
    let scp = MockScp::spawn(Script {
        transfer_syntax: TransferSyntax::ImplicitVrLittleEndian,
        ..Default::default()
    })
    .await;
    let client = DicomClient::new(scp.config()).unwrap();

    let query = WorklistQuery::new()
        .station_ae_title("CT01")
        .station_name("SCANNER-1")
        .patient_name("MÜLLER*");
    let outcome = client.worklist(&query).await.unwrap();
    assert!(outcome.records.is_empty());

    let identifiers = scp.identifiers();
    let identifier = &identifiers[0];
    assert_eq!(
        identifier.get_str(tags::PATIENT_NAME).as_deref(),
        Some("MÜLLER*")
    );
    assert!(identifier.contains(tags::REQUESTED_PROCEDURE_ID));

    let steps = identifier
        .get_sequence(tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE)
        .unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(
        steps[0].get_str(tags::SCHEDULED_STATION_AE_TITLE).as_deref(),
        Some("CT01")
    );
    assert_eq!(
        steps[0].get_str(tags::SCHEDULED_STATION_NAME).as_deref(),
        Some("SCANNER-1")
    );
    assert_eq!(
        steps[0]
            .get_str(tags::SCHEDULED_PROCEDURE_STEP_START_DATE)
            .as_deref(),
        Some("")
    );

    match &scp.events()[1] {
        common::Event::Find { sop_class, .. } => {
            assert_eq!(sop_class, uid::MODALITY_WORKLIST_FIND)
        }
        other => panic!("expected C-FIND, got {:?}", other),
    }
}
