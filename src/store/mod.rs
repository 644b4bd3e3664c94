use crate::error::ValidationError;
use crate::models::{DedupKey, Report, ResultRecord};
use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertKind {
    Created,
    Updated,
}

/// Canonical in-memory result list, at most one record per dedup key.
///
/// Records keep insertion order. Two side indexes answer key lookups
/// without scanning: division code to position, and sequence number to
/// the first position carrying it.
#[derive(Debug, Default)]
pub struct ResultStore {
    records: Vec<ResultRecord>,
    by_division: HashMap<String, usize>,
    by_sequence: HashMap<String, usize>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> &[ResultRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn get_by_key(&self, key: &DedupKey) -> Option<&ResultRecord> {
        self.position(key).map(|idx| &self.records[idx])
    }

    pub fn upsert(
        &mut self,
        payload: Value,
    ) -> Result<(ResultRecord, UpsertKind), ValidationError> {
        self.upsert_at(payload, Utc::now())
    }

    /// Same as [`ResultStore::upsert`] with an explicit clock reading.
    pub fn upsert_at(
        &mut self,
        payload: Value,
        now: DateTime<Utc>,
    ) -> Result<(ResultRecord, UpsertKind), ValidationError> {
        let report = validate(payload)?;
        Ok(self.upsert_report(report, now))
    }

    pub fn upsert_report(
        &mut self,
        mut report: Report,
        now: DateTime<Utc>,
    ) -> (ResultRecord, UpsertKind) {
        report.strip_store_owned_keys();

        let key = report.dedup_key();
        if let Some(prior) = key.as_ref().and_then(|key| self.get_by_key(key)) {
            debug!(
                "Merging into record {} (created {}, last updated {:?})",
                prior.id, prior.created_at, prior.updated_at
            );
        }
        let existing = key.and_then(|key| self.position(&key));
        match existing {
            Some(idx) => {
                let record = &mut self.records[idx];
                let old_division = record.report.division_code().map(str::to_string);
                let old_sequence = record.report.sequence().map(str::to_string);

                record.report.overlay(report);
                record.updated_at = Some(now);

                let keys_changed = record.report.division_code() != old_division.as_deref()
                    || record.report.sequence() != old_sequence.as_deref();
                let merged = record.clone();
                if keys_changed {
                    self.reindex();
                }
                (merged, UpsertKind::Updated)
            }
            None => {
                let record = ResultRecord {
                    id: Uuid::new_v4().to_string(),
                    created_at: now,
                    updated_at: None,
                    report,
                };
                let idx = self.records.len();
                self.index(idx, &record);
                self.records.push(record.clone());
                (record, UpsertKind::Created)
            }
        }
    }

    fn position(&self, key: &DedupKey) -> Option<usize> {
        match key {
            DedupKey::Division(code) => self.by_division.get(code).copied(),
            DedupKey::Sequence(seq) => self.by_sequence.get(seq).copied(),
        }
    }

    fn index(&mut self, idx: usize, record: &ResultRecord) {
        if let Some(code) = record.report.division_code() {
            self.by_division.entry(code.to_string()).or_insert(idx);
        }
        if let Some(seq) = record.report.sequence() {
            self.by_sequence.entry(seq.to_string()).or_insert(idx);
        }
    }

    fn reindex(&mut self) {
        let mut by_division = HashMap::new();
        let mut by_sequence = HashMap::new();
        for (idx, record) in self.records.iter().enumerate() {
            if let Some(code) = record.report.division_code() {
                by_division.entry(code.to_string()).or_insert(idx);
            }
            if let Some(seq) = record.report.sequence() {
                by_sequence.entry(seq.to_string()).or_insert(idx);
            }
        }
        self.by_division = by_division;
        self.by_sequence = by_sequence;
    }
}

/// Shape check for a submitted payload: it needs a `summary` object and a
/// `by_party` list before it is decoded.
pub fn validate(payload: Value) -> Result<Report, ValidationError> {
    let object = payload.as_object().ok_or(ValidationError::NotAnObject)?;

    if !object.get("summary").is_some_and(Value::is_object) {
        return Err(ValidationError::MissingSummary);
    }
    let parties = object.get("by_party").or_else(|| object.get("parties"));
    if !parties.is_some_and(Value::is_array) {
        return Err(ValidationError::MissingParties);
    }

    Ok(serde_json::from_value(payload)?)
}
