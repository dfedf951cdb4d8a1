//! Query identifier construction
//!
//! A C-FIND identifier lists the attributes to match and the attributes to
//! return. A return key is an attribute sent with an empty value; a filter
//! carries its match value (wildcards and ranges are interpreted by the peer).

use crate::dimse::dataset::DataSet;
use crate::dimse::tag::{tags, Tag};
use crate::protocol::uid;
use crate::query::datetime::format_date;
use chrono::NaiveDate;

/// Character set term announced in every identifier
pub const DEFAULT_CHARACTER_SET: &str = "ISO_IR 100";

/// Query/Retrieve information model of a C-FIND
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryModel {
    PatientRoot,
    StudyRoot,
    ModalityWorklist,
}

impl QueryModel {
    /// SOP class UID of the FIND service for this model
    pub fn sop_class_uid(self) -> &'static str {
        match self {
            QueryModel::PatientRoot => uid::PATIENT_ROOT_QR_FIND,
            QueryModel::StudyRoot => uid::STUDY_ROOT_QR_FIND,
            QueryModel::ModalityWorklist => uid::MODALITY_WORKLIST_FIND,
        }
    }
}

/// Inclusive date range matching (DA range matching)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        DateRange { start, end }
    }

    /// Single day
    pub fn on(date: NaiveDate) -> Self {
        Self::new(Some(date), Some(date))
    }

    pub fn from(start: NaiveDate) -> Self {
        Self::new(Some(start), None)
    }

    pub fn until(end: NaiveDate) -> Self {
        Self::new(None, Some(end))
    }

    /// No bound at all (the attribute becomes a return key)
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Encode as `start-end`, `start-`, `-end`, or empty
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::NaiveDate;
    /// use dicomtools_rust::query::DateRange;
    ///
    /// let start = NaiveDate::from_ymd_opt(2021, 8, 1).unwrap();
    /// assert_eq!(DateRange::from(start).encode(), "20210801-");
    /// assert_eq!(DateRange::default().encode(), "");
    /// ```
    pub fn encode(&self) -> String {
        match (self.start, self.end) {
            (None, None) => String::new(),
            (start, end) => format!(
                "{}-{}",
                start.map(format_date).unwrap_or_default(),
                end.map(format_date).unwrap_or_default()
            ),
        }
    }
}

/// Builder for C-FIND identifiers
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    identifier: DataSet,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryBuilder {
    /// Start an identifier announcing ISO_IR 100
    pub fn new() -> Self {
        let mut identifier = DataSet::new();
        identifier.put_str(tags::SPECIFIC_CHARACTER_SET, DEFAULT_CHARACTER_SET);
        QueryBuilder { identifier }
    }

    /// Start an item of a sequence (no character set of its own)
    pub fn item() -> Self {
        QueryBuilder {
            identifier: DataSet::new(),
        }
    }

    /// Request `tag` in the responses
    pub fn return_key(mut self, tag: Tag) -> Self {
        self.identifier.put_str(tag, "");
        self
    }

    /// Match `tag` against `value`; an empty value is a return key
    pub fn filter(mut self, tag: Tag, value: &str) -> Self {
        self.identifier.put_str(tag, value);
        self
    }

    pub fn date_range(self, tag: Tag, range: &DateRange) -> Self {
        let encoded = range.encode();
        self.filter(tag, &encoded)
    }

    /// Sequence matching with a single item
    pub fn sequence(mut self, tag: Tag, item: QueryBuilder) -> Self {
        let mut item = item.identifier;
        if item.charset() != self.identifier.charset() {
            item = reencode(item, &self.identifier);
        }
        self.identifier.put_sequence(tag, vec![item]);
        self
    }

    pub fn build(self) -> DataSet {
        self.identifier
    }
}

/// Items inherit the character set of their parent
fn reencode(item: DataSet, parent: &DataSet) -> DataSet {
    let mut out = DataSet::with_charset(parent.charset());
    for element in item.iter() {
        match item.get_str(element.tag) {
            Some(text) => out.put_str(element.tag, &text),
            None => out.insert(element.clone()),
        }
    }
    out
}

/// Study level query against the Study Root information model
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudyQuery {
    pub patient_name: String,
    pub patient_id: String,
    /// Matched against StudyInstanceUID
    pub study_id: String,
    pub accession_number: String,
    /// Matched against ModalitiesInStudy
    pub modality: String,
    pub study_date: DateRange,
}

impl StudyQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn patient_name(mut self, value: impl Into<String>) -> Self {
        self.patient_name = value.into();
        self
    }

    pub fn patient_id(mut self, value: impl Into<String>) -> Self {
        self.patient_id = value.into();
        self
    }

    pub fn study_id(mut self, value: impl Into<String>) -> Self {
        self.study_id = value.into();
        self
    }

    pub fn accession_number(mut self, value: impl Into<String>) -> Self {
        self.accession_number = value.into();
        self
    }

    pub fn modality(mut self, value: impl Into<String>) -> Self {
        self.modality = value.into();
        self
    }

    pub fn study_date(mut self, range: DateRange) -> Self {
        self.study_date = range;
        self
    }

    /// Identifier with every returned attribute present
    pub fn identifier(&self) -> DataSet {
        QueryBuilder::new()
            .filter(tags::QUERY_RETRIEVE_LEVEL, "STUDY")
            .filter(tags::PATIENT_NAME, &self.patient_name)
            .filter(tags::PATIENT_ID, &self.patient_id)
            .return_key(tags::PATIENT_BIRTH_DATE)
            .return_key(tags::PATIENT_SEX)
            .filter(tags::MODALITIES_IN_STUDY, &self.modality)
            .filter(tags::STUDY_INSTANCE_UID, &self.study_id)
            .filter(tags::ACCESSION_NUMBER, &self.accession_number)
            .return_key(tags::STUDY_DESCRIPTION)
            .return_key(tags::STUDY_TIME)
            .date_range(tags::STUDY_DATE, &self.study_date)
            .build()
    }
}

/// Modality Worklist query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorklistQuery {
    pub station_ae_title: String,
    pub station_name: String,
    pub patient_name: String,
    pub patient_id: String,
    pub modality: String,
    pub scheduled_date: DateRange,
}

impl WorklistQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn station_ae_title(mut self, value: impl Into<String>) -> Self {
        self.station_ae_title = value.into();
        self
    }

    pub fn station_name(mut self, value: impl Into<String>) -> Self {
        self.station_name = value.into();
        self
    }

    pub fn patient_name(mut self, value: impl Into<String>) -> Self {
        self.patient_name = value.into();
        self
    }

    pub fn patient_id(mut self, value: impl Into<String>) -> Self {
        self.patient_id = value.into();
        self
    }

    pub fn modality(mut self, value: impl Into<String>) -> Self {
        self.modality = value.into();
        self
    }

    pub fn scheduled_date(mut self, range: DateRange) -> Self {
        self.scheduled_date = range;
        self
    }

    pub fn identifier(&self) -> DataSet {
        let step = QueryBuilder::item()
            .filter(tags::SCHEDULED_STATION_AE_TITLE, &self.station_ae_title)
            .filter(tags::SCHEDULED_STATION_NAME, &self.station_name)
            .date_range(tags::SCHEDULED_PROCEDURE_STEP_START_DATE, &self.scheduled_date)
            .return_key(tags::SCHEDULED_PROCEDURE_STEP_START_TIME)
            .filter(tags::MODALITY, &self.modality)
            .return_key(tags::SCHEDULED_PERFORMING_PHYSICIAN_NAME)
            .return_key(tags::SCHEDULED_PROCEDURE_STEP_DESCRIPTION)
            .return_key(tags::SCHEDULED_PROCEDURE_STEP_ID);

        QueryBuilder::new()
            .return_key(tags::ACCESSION_NUMBER)
            .filter(tags::PATIENT_NAME, &self.patient_name)
            .filter(tags::PATIENT_ID, &self.patient_id)
            .return_key(tags::PATIENT_BIRTH_DATE)
            .return_key(tags::PATIENT_SEX)
            .return_key(tags::STUDY_INSTANCE_UID)
            .return_key(tags::REQUESTED_PROCEDURE_DESCRIPTION)
            .return_key(tags::REQUESTED_PROCEDURE_ID)
            .sequence(tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE, step)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::uid::TransferSyntax;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_date_range_encoding() {
        assert_eq!(
            DateRange::new(Some(date(2021, 8, 1)), Some(date(2021, 8, 31))).encode(),
            "20210801-20210831"
        );
        assert_eq!(DateRange::from(date(2021, 8, 1)).encode(), "20210801-");
        assert_eq!(DateRange::until(date(2021, 8, 31)).encode(), "-20210831");
        assert_eq!(DateRange::default().encode(), "");
        assert!(DateRange::default().is_unbounded());
    }

    #[test]
    fn test_study_identifier_return_keys() {
        let identifier = StudyQuery::new().patient_id("12345").identifier();

        assert_eq!(identifier.get_str(tags::PATIENT_ID).as_deref(), Some("12345"));
        assert_eq!(
            identifier.get_str(tags::QUERY_RETRIEVE_LEVEL).as_deref(),
            Some("STUDY")
        );
        assert_eq!(
            identifier.get_str(tags::SPECIFIC_CHARACTER_SET).as_deref(),
            Some(DEFAULT_CHARACTER_SET)
        );
        for tag in [
            tags::PATIENT_NAME,
            tags::PATIENT_BIRTH_DATE,
            tags::PATIENT_SEX,
            tags::MODALITIES_IN_STUDY,
            tags::STUDY_INSTANCE_UID,
            tags::ACCESSION_NUMBER,
            tags::STUDY_DESCRIPTION,
            tags::STUDY_DATE,
            tags::STUDY_TIME,
        ] {
            assert_eq!(identifier.get_str(tag).as_deref(), Some(""), "{}", tag);
        }
    }

    #[test]
    fn test_study_identifier_date_filter() {
        let identifier = StudyQuery::new()
            .patient_name("SMITH^*")
            .study_date(DateRange::from(date(2021, 1, 1)))
            .identifier();
        assert_eq!(
            identifier.get_str(tags::STUDY_DATE).as_deref(),
            Some("20210101-")
        );
        assert_eq!(
            identifier.get_str(tags::PATIENT_NAME).as_deref(),
            Some("SMITH^*")
        );
    }

    #[test]
    fn test_worklist_identifier_sequence() {
        let identifier = WorklistQuery::new()
            .station_ae_title("CT01")
            .modality("CT")
            .scheduled_date(DateRange::on(date(2021, 8, 16)))
            .identifier();

        let steps = identifier
            .get_sequence(tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE)
            .unwrap();
        assert_eq!(steps.len(), 1);
        let step = &steps[0];
        assert_eq!(
            step.get_str(tags::SCHEDULED_STATION_AE_TITLE).as_deref(),
            Some("CT01")
        );
        assert_eq!(step.get_str(tags::MODALITY).as_deref(), Some("CT"));
        assert_eq!(
            step.get_str(tags::SCHEDULED_PROCEDURE_STEP_START_DATE)
                .as_deref(),
            Some("20210816-20210816")
        );
        assert_eq!(
            step.get_str(tags::SCHEDULED_PROCEDURE_STEP_ID).as_deref(),
            Some("")
        );
        assert!(identifier.contains(tags::REQUESTED_PROCEDURE_DESCRIPTION));
    }

    #[test]
    fn test_identifier_encodes_in_both_syntaxes() {
        let identifier = WorklistQuery::new().patient_name("MÜLLER").identifier();
        for ts in [
            TransferSyntax::ImplicitVrLittleEndian,
            TransferSyntax::ExplicitVrLittleEndian,
        ] {
            let bytes = identifier.encode(ts).unwrap();
            let decoded = DataSet::decode(&bytes, ts).unwrap();
            assert_eq!(
                decoded.get_str(tags::PATIENT_NAME).as_deref(),
                Some("MÜLLER")
            );
        }
    }

    #[test]
    fn test_query_model_sop_classes() {
        assert_eq!(
            QueryModel::StudyRoot.sop_class_uid(),
            "1.2.840.10008.5.1.4.1.2.2.1"
        );
        assert_eq!(
            QueryModel::PatientRoot.sop_class_uid(),
            "1.2.840.10008.5.1.4.1.2.1.1"
        );
        assert_eq!(
            QueryModel::ModalityWorklist.sop_class_uid(),
            "1.2.840.10008.5.1.4.31"
        );
    }
}
