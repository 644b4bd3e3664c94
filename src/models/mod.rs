use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Keys the store owns. Submitters cannot set them.
const STORE_OWNED_KEYS: [&str; 3] = ["id", "createdAt", "updatedAt"];

// --- Reference data ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct District {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<DistrictName>,
    #[serde(default)]
    pub divisions: Vec<Division>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Either a plain name or a map of language code to name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DistrictName {
    Plain(String),
    Localized(BTreeMap<String, String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Division {
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl District {
    pub fn display_name(&self) -> &str {
        let name = match &self.name {
            Some(DistrictName::Localized(names)) => names
                .get("en")
                .or_else(|| names.values().next())
                .map(String::as_str),
            Some(DistrictName::Plain(name)) => Some(name.as_str()),
            None => None,
        };
        match name {
            Some(name) if !name.is_empty() => name,
            _ => &self.id,
        }
    }
}

// --- Reports ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(default, deserialize_with = "count_or_null")]
    pub valid: u64,
    #[serde(default, deserialize_with = "count_or_null")]
    pub rejected: u64,
    #[serde(default, deserialize_with = "count_or_null")]
    pub polled: u64,
    #[serde(default, deserialize_with = "count_or_null")]
    pub electors: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyTally {
    #[serde(alias = "partyCode", deserialize_with = "code")]
    pub party_code: String,
    #[serde(default, alias = "partyName", skip_serializing_if = "Option::is_none")]
    pub party_name: Option<String>,
    #[serde(default, deserialize_with = "count_or_null")]
    pub votes: u64,
    /// Filled in by the submitter from `votes / total votes`.
    #[serde(default, deserialize_with = "ratio_or_null")]
    pub percentage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<String>,
}

/// The fields a correspondent submits for one district or division.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    #[serde(
        default,
        alias = "districtCode",
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub ed_code: Option<String>,
    #[serde(default, alias = "districtName", skip_serializing_if = "Option::is_none")]
    pub ed_name: Option<String>,
    #[serde(
        default,
        alias = "divisionCode",
        alias = "pdCode",
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub pd_code: Option<String>,
    #[serde(default, alias = "divisionName", skip_serializing_if = "Option::is_none")]
    pub pd_name: Option<String>,
    #[serde(
        default,
        alias = "sequenceNumber",
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub sequence_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(
        rename = "type",
        alias = "reportType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub report_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub summary: Summary,
    #[serde(alias = "parties")]
    pub by_party: Vec<PartyTally>,
    /// Fields this model does not name, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    Division(String),
    Sequence(String),
}

impl Report {
    pub fn division_code(&self) -> Option<&str> {
        non_empty(self.pd_code.as_deref())
    }

    pub fn sequence(&self) -> Option<&str> {
        non_empty(self.sequence_number.as_deref())
    }

    /// Division code when present, else sequence number. `None` means the
    /// report can never match an existing record.
    pub fn dedup_key(&self) -> Option<DedupKey> {
        if let Some(code) = self.division_code() {
            return Some(DedupKey::Division(code.to_string()));
        }
        self.sequence()
            .map(|seq| DedupKey::Sequence(seq.to_string()))
    }

    /// Replaces every field `incoming` carries. Absent optional fields
    /// leave the current value alone.
    pub fn overlay(&mut self, incoming: Report) {
        overlay(&mut self.ed_code, incoming.ed_code);
        overlay(&mut self.ed_name, incoming.ed_name);
        overlay(&mut self.pd_code, incoming.pd_code);
        overlay(&mut self.pd_name, incoming.pd_name);
        overlay(&mut self.sequence_number, incoming.sequence_number);
        overlay(&mut self.reference, incoming.reference);
        overlay(&mut self.report_type, incoming.report_type);
        overlay(&mut self.level, incoming.level);
        overlay(&mut self.timestamp, incoming.timestamp);
        self.summary = incoming.summary;
        self.by_party = incoming.by_party;
        self.extra.extend(incoming.extra);
    }

    pub fn strip_store_owned_keys(&mut self) {
        for key in STORE_OWNED_KEYS {
            self.extra.remove(key);
        }
    }
}

/// A report as held by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub report: Report,
}

fn overlay<T>(slot: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *slot = incoming;
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

// Correspondents send sequence numbers both as "0012" and as 12.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "expected a string or number, got {}",
            other
        ))),
    }
}

fn code<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(string_or_number(deserializer)?.unwrap_or_default())
}

// The entry form turns blank or non-numeric inputs into NaN, which arrives
// as null. Those count as 0.
fn count_or_null<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.unwrap_or(0))
}

fn ratio_or_null<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn report_accepts_form_and_camel_case_names() {
        let form: Report = serde_json::from_value(json!({
            "pd_code": "01A",
            "sequence_number": "0007",
            "type": "PRESIDENTIAL-FIRST",
            "summary": {"valid": 10},
            "by_party": [{"party_code": "A", "party_name": "Alpha", "votes": 10}]
        }))
        .unwrap();
        let camel: Report = serde_json::from_value(json!({
            "divisionCode": "01A",
            "sequenceNumber": 7,
            "reportType": "PRESIDENTIAL-FIRST",
            "summary": {"valid": 10},
            "parties": [{"partyCode": "A", "partyName": "Alpha", "votes": 10}]
        }))
        .unwrap();

        assert_eq!(form.division_code(), Some("01A"));
        assert_eq!(camel.division_code(), Some("01A"));
        assert_eq!(camel.sequence(), Some("7"));
        assert_eq!(form.report_type, camel.report_type);
        assert_eq!(form.by_party, camel.by_party);
        assert_eq!(form.summary.rejected, 0);
    }

    #[test]
    fn dedup_key_falls_back_to_sequence() {
        let mut report = Report {
            pd_code: Some(String::new()),
            sequence_number: Some("12".into()),
            ..Report::default()
        };
        assert_eq!(report.dedup_key(), Some(DedupKey::Sequence("12".into())));

        report.pd_code = Some("P1".into());
        assert_eq!(report.dedup_key(), Some(DedupKey::Division("P1".into())));

        report.pd_code = None;
        report.sequence_number = None;
        assert_eq!(report.dedup_key(), None);
    }

    #[test]
    fn overlay_keeps_fields_the_update_omits() {
        let mut base: Report = serde_json::from_value(json!({
            "ed_code": "01",
            "pd_code": "01A",
            "reference": "R-1",
            "note": "first",
            "summary": {"valid": 1},
            "by_party": [{"party_code": "A", "votes": 1}]
        }))
        .unwrap();
        let update: Report = serde_json::from_value(json!({
            "pd_code": "01A",
            "channel": "sms",
            "summary": {"valid": 2},
            "by_party": [{"party_code": "A", "votes": 2}]
        }))
        .unwrap();

        base.overlay(update);

        assert_eq!(base.ed_code.as_deref(), Some("01"));
        assert_eq!(base.reference.as_deref(), Some("R-1"));
        assert_eq!(base.summary.valid, 2);
        assert_eq!(base.by_party[0].votes, 2);
        assert_eq!(base.extra.get("note"), Some(&json!("first")));
        assert_eq!(base.extra.get("channel"), Some(&json!("sms")));
    }

    #[test]
    fn district_display_name_prefers_english() {
        let district: District = serde_json::from_value(json!({
            "id": "01",
            "name": {"si": "කොළඹ", "en": "Colombo"},
            "divisions": [{"id": "01A"}]
        }))
        .unwrap();
        assert_eq!(district.display_name(), "Colombo");

        let plain: District =
            serde_json::from_value(json!({"id": "02", "name": "Gampaha"})).unwrap();
        assert_eq!(plain.display_name(), "Gampaha");
        assert!(plain.divisions.is_empty());

        let unnamed: District = serde_json::from_value(json!({"id": "03"})).unwrap();
        assert_eq!(unnamed.display_name(), "03");
    }

    #[test]
    fn record_serializes_timestamps_in_camel_case() {
        let record = ResultRecord {
            id: "abc".into(),
            created_at: Utc::now(),
            updated_at: None,
            report: Report {
                pd_code: Some("P1".into()),
                ..Report::default()
            },
        };
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("createdAt").is_some());
        assert!(value.get("updatedAt").is_none());
        assert_eq!(value["pd_code"], json!("P1"));
        assert_eq!(value["by_party"], json!([]));
    }
}
