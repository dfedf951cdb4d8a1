//! Typed records extracted from C-FIND responses
//!
//! Missing attributes read as empty strings; date/times that do not parse
//! are `None`.

use crate::dimse::dataset::DataSet;
use crate::dimse::tag::{tags, Tag};
use crate::query::datetime::{parse_date_time, DicomDateTime};
use serde::Serialize;

fn text(identifier: &DataSet, tag: Tag) -> String {
    identifier.get_str(tag).unwrap_or_default()
}

/// One study matched by a study level query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudyRecord {
    pub patient_name: String,
    pub patient_id: String,
    pub birth_date: String,
    pub sex: String,
    /// ModalitiesInStudy joined with ","
    pub modalities: String,
    pub study_datetime: Option<DicomDateTime>,
    pub study_instance_uid: String,
    pub accession_number: String,
    pub study_description: String,
}

impl StudyRecord {
    pub fn from_identifier(identifier: &DataSet) -> Self {
        StudyRecord {
            patient_name: text(identifier, tags::PATIENT_NAME),
            patient_id: text(identifier, tags::PATIENT_ID),
            birth_date: text(identifier, tags::PATIENT_BIRTH_DATE),
            sex: text(identifier, tags::PATIENT_SEX),
            modalities: identifier.get_strs(tags::MODALITIES_IN_STUDY).join(","),
            study_datetime: parse_date_time(
                &text(identifier, tags::STUDY_DATE),
                &text(identifier, tags::STUDY_TIME),
            ),
            study_instance_uid: text(identifier, tags::STUDY_INSTANCE_UID),
            accession_number: text(identifier, tags::ACCESSION_NUMBER),
            study_description: text(identifier, tags::STUDY_DESCRIPTION),
        }
    }
}

/// One scheduled procedure step of a worklist entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledStep {
    pub step_id: String,
    pub modality: String,
    pub performing_physician: String,
    pub start: Option<DicomDateTime>,
    pub description: String,
}

impl ScheduledStep {
    pub fn from_item(item: &DataSet) -> Self {
        ScheduledStep {
            step_id: text(item, tags::SCHEDULED_PROCEDURE_STEP_ID),
            modality: text(item, tags::MODALITY),
            performing_physician: text(item, tags::SCHEDULED_PERFORMING_PHYSICIAN_NAME),
            start: parse_date_time(
                &text(item, tags::SCHEDULED_PROCEDURE_STEP_START_DATE),
                &text(item, tags::SCHEDULED_PROCEDURE_STEP_START_TIME),
            ),
            description: text(item, tags::SCHEDULED_PROCEDURE_STEP_DESCRIPTION),
        }
    }
}

/// One Modality Worklist entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorklistRecord {
    pub patient_name: String,
    pub patient_id: String,
    pub birth_date: String,
    pub sex: String,
    pub step_count: usize,
    /// Modalities of the scheduled steps joined with ","
    pub modality: String,
    pub accession_number: String,
    pub requested_procedure_description: String,
    pub steps: Vec<ScheduledStep>,
}

impl WorklistRecord {
    pub fn from_identifier(identifier: &DataSet) -> Self {
        let steps: Vec<ScheduledStep> = identifier
            .get_sequence(tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE)
            .unwrap_or_default()
            .iter()
            .map(ScheduledStep::from_item)
            .collect();
        let modality = steps
            .iter()
            .map(|step| step.modality.as_str())
            .collect::<Vec<_>>()
            .join(",");

        WorklistRecord {
            patient_name: text(identifier, tags::PATIENT_NAME),
            patient_id: text(identifier, tags::PATIENT_ID),
            birth_date: text(identifier, tags::PATIENT_BIRTH_DATE),
            sex: text(identifier, tags::PATIENT_SEX),
            step_count: steps.len(),
            modality,
            accession_number: text(identifier, tags::ACCESSION_NUMBER),
            requested_procedure_description: text(
                identifier,
                tags::REQUESTED_PROCEDURE_DESCRIPTION,
            ),
            steps,
        }
    }
}
