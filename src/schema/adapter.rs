//! Parsing of pulse.roi_sample.v1 streams

use crate::error::PulseError;
use crate::schema::sample_record::*;

/// Reads sample records from JSON arrays and NDJSON streams
pub struct SampleRecordAdapter;

impl SampleRecordAdapter {
    /// Parse a JSON string containing an array of SampleRecords
    pub fn parse_array(json: &str) -> Result<Vec<SampleRecord>, PulseError> {
        let records: Vec<SampleRecord> = serde_json::from_str(json)?;
        Self::ensure_valid(&records)?;
        Ok(records)
    }

    /// Parse NDJSON (newline-delimited JSON) containing SampleRecords
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<SampleRecord>, PulseError> {
        let mut records = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            if let Some(record) = Self::parse_line(line, line_num + 1)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Parse and validate one NDJSON line; blank lines yield `None`
    pub fn parse_line(line: &str, line_num: usize) -> Result<Option<SampleRecord>, PulseError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let record: SampleRecord = serde_json::from_str(trimmed).map_err(|e| {
            PulseError::InvalidRecord(format!("Failed to parse line {line_num}: {e}"))
        })?;
        record
            .validate()
            .map_err(|e| PulseError::InvalidRecord(format!("line {line_num}: {e}")))?;
        Ok(Some(record))
    }

    /// Indices and errors of every invalid record
    pub fn validate_records(records: &[SampleRecord]) -> Vec<(usize, ValidationError)> {
        records
            .iter()
            .enumerate()
            .filter_map(|(idx, record)| record.validate().err().map(|e| (idx, e)))
            .collect()
    }

    fn ensure_valid(records: &[SampleRecord]) -> Result<(), PulseError> {
        match Self::validate_records(records).into_iter().next() {
            Some((idx, err)) => Err(PulseError::InvalidRecord(format!("record {idx}: {err}"))),
            None => Ok(()),
        }
    }
}
