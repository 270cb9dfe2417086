//! Core domain types shared by every Refinery service.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Delimiter used when flattening list fields into a single string column.
pub const LIST_DELIMITER: &str = " >>> ";

/// A flat, ordered JSON object: one payload or one analytics-store row.
pub type Record = serde_json::Map<String, Value>;

/// Join string items with [`LIST_DELIMITER`].
pub fn join_list<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(LIST_DELIMITER)
}

// ---------------------------------------------------------------------------
// RefineryRequest
// ---------------------------------------------------------------------------

/// Producers send `null` for unset flags and lists.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The message passed between services over the bus.
///
/// Known fields are typed; anything else a publisher or an upstream service
/// attached (e.g. `company`, `person`, `wp_plugins`) is kept in `extra` and
/// survives re-publishing untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefineryRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refinery_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refinery_company_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refinery_person_id: Option<String>,
    /// RFC 3339 timestamp of the refinement run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refined_at: Option<String>,
    /// `YYYY-MM-DD` date of the refinement run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refined_date: Option<String>,
    #[serde(default)]
    pub sfdc_lead_id: Option<String>,
    #[serde(default)]
    pub sfdc_contact_id: Option<String>,
    #[serde(default)]
    pub sfdc_asset_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ip_revealed: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fuzzy_match: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub services_requested: Vec<String>,
    /// Every other key of the message.
    #[serde(flatten)]
    pub extra: Record,
}

impl RefineryRequest {
    /// Fill in any missing identity fields (id, timestamp, date).
    ///
    /// Values already present are never replaced, so re-stamping a message
    /// that travelled through several services is a no-op.
    pub fn stamp(&mut self) {
        self.stamp_at(Utc::now());
    }

    /// [`stamp`](Self::stamp) with an explicit clock.
    pub fn stamp_at(&mut self, now: DateTime<Utc>) {
        if self.refinery_id.is_none() {
            self.refinery_id = Some(Uuid::now_v7().to_string());
        }
        if self.refined_at.is_none() {
            self.refined_at = Some(now.to_rfc3339_opts(SecondsFormat::Secs, true));
        }
        if self.refined_date.is_none() {
            self.refined_date = Some(now.format("%Y-%m-%d").to_string());
        }
    }

    /// The id rows are keyed by; company/person ids fall back to `refinery_id`.
    pub fn row_id(&self) -> Option<&str> {
        self.refinery_id
            .as_deref()
            .or(self.refinery_company_id.as_deref())
            .or(self.refinery_person_id.as_deref())
    }

    /// Serialize the whole request (known fields + `extra`) to a JSON object.
    pub fn to_record(&self) -> Record {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Record::new(),
        }
    }

    /// Look up a key among the extra (untyped) fields.
    pub fn extra_field(&self, key: &str) -> Option<&Value> {
        self.extra.get(key).filter(|v| !v.is_null())
    }

    /// Read a string array from the extra fields (e.g. `wp_plugins`).
    pub fn extra_strings(&self, key: &str) -> Vec<String> {
        self.extra_field(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Identity columns present at the head of every analytics-store row.
pub fn identity_record(request: &RefineryRequest) -> Record {
    let mut record = Record::new();
    record.insert("refinery_id".into(), opt(request.row_id()));
    record.insert("refined_at".into(), opt(request.refined_at.as_deref()));
    record.insert("refined_date".into(), opt(request.refined_date.as_deref()));
    record.insert("domain".into(), opt(request.domain.as_deref()));
    record.insert("url".into(), opt(request.url.as_deref()));
    record
}

fn opt(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |s| Value::String(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn join_list_uses_delimiter() {
        assert_eq!(join_list(["a", "b", "c"]), "a >>> b >>> c");
        assert_eq!(join_list(Vec::<String>::new()), "");
    }

    #[test]
    fn null_flags_read_as_false() {
        let request: RefineryRequest = serde_json::from_value(json!({
            "domain": "example.com",
            "ip_revealed": null,
            "fuzzy_match": null,
            "services_requested": null
        }))
        .unwrap();
        assert!(!request.ip_revealed);
        assert!(!request.fuzzy_match);
        assert!(request.services_requested.is_empty());
        assert!(!request.extra.contains_key("ip_revealed"));

        let request: RefineryRequest =
            serde_json::from_value(json!({"ip_revealed": true})).unwrap();
        assert!(request.ip_revealed);
    }

    #[test]
    fn request_keeps_unknown_fields() {
        let raw = json!({
            "refinery_id": "abc",
            "domain": "example.com",
            "company": {"name": "Example"},
            "wp_plugins": ["akismet", "jetpack"]
        });
        let request: RefineryRequest = serde_json::from_value(raw).expect("deserialize");
        assert_eq!(request.refinery_id.as_deref(), Some("abc"));
        assert_eq!(request.extra_strings("wp_plugins"), vec!["akismet", "jetpack"]);

        let back = request.to_record();
        assert_eq!(back["company"]["name"], "Example");
        assert_eq!(back["domain"], "example.com");
    }

    #[test]
    fn stamp_fills_only_missing_fields() {
        let now = Utc.with_ymd_and_hms(2018, 11, 2, 13, 45, 0).unwrap();
        let mut request = RefineryRequest {
            refinery_id: Some("keep-me".into()),
            ..Default::default()
        };
        request.stamp_at(now);

        assert_eq!(request.refinery_id.as_deref(), Some("keep-me"));
        assert_eq!(request.refined_at.as_deref(), Some("2018-11-02T13:45:00Z"));
        assert_eq!(request.refined_date.as_deref(), Some("2018-11-02"));

        let later = Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap();
        request.stamp_at(later);
        assert_eq!(request.refined_date.as_deref(), Some("2018-11-02"));
    }

    #[test]
    fn identity_record_prefers_refinery_id() {
        let request = RefineryRequest {
            refinery_id: None,
            refinery_company_id: Some("company-1".into()),
            domain: Some("example.com".into()),
            ..Default::default()
        };
        let record = identity_record(&request);
        assert_eq!(record["refinery_id"], "company-1");
        assert_eq!(record["url"], Value::Null);
        assert_eq!(
            record.keys().collect::<Vec<_>>(),
            vec!["refinery_id", "refined_at", "refined_date", "domain", "url"]
        );
    }
}
