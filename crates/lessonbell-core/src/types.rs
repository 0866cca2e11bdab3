//! Lesson record — the typed document shared by the store, the batch and the trigger path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// The ten register columns, in the order every message renders them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LessonField {
    Customer,
    Platform,
    Issue,
    DetailedDescription,
    ImpactLevel,
    LiableStakeholder,
    PreventiveAction,
    LessonsLearned,
    Status,
    Timeline,
}

impl LessonField {
    pub const ALL: [LessonField; 10] = [
        LessonField::Customer,
        LessonField::Platform,
        LessonField::Issue,
        LessonField::DetailedDescription,
        LessonField::ImpactLevel,
        LessonField::LiableStakeholder,
        LessonField::PreventiveAction,
        LessonField::LessonsLearned,
        LessonField::Status,
        LessonField::Timeline,
    ];

    /// Column name, as used in documents and in rendered messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::Customer => "Customer",
            Self::Platform => "Platform",
            Self::Issue => "Issue",
            Self::DetailedDescription => "Detailed Description",
            Self::ImpactLevel => "Impact Level",
            Self::LiableStakeholder => "Liable Stakeholder",
            Self::PreventiveAction => "Preventive Action",
            Self::LessonsLearned => "Lessons Learned",
            Self::Status => "Status",
            Self::Timeline => "Timeline",
        }
    }
}

/// Field values of a lesson. Every field is optional at this level; the
/// batch and the trigger path each enforce what they require.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LessonFields {
    #[serde(rename = "Customer", default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub customer: Option<String>,
    #[serde(rename = "Platform", default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(rename = "Issue", default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
    #[serde(rename = "Detailed Description", default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub detailed_description: Option<String>,
    #[serde(rename = "Impact Level", default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub impact_level: Option<String>,
    #[serde(rename = "Liable Stakeholder", default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub liable_stakeholder: Option<String>,
    #[serde(rename = "Preventive Action", default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub preventive_action: Option<String>,
    #[serde(rename = "Lessons Learned", default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub lessons_learned: Option<String>,
    #[serde(rename = "Status", default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "Timeline", default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub timeline: Option<String>,
}

impl LessonFields {
    /// Value of a field; empty strings count as missing.
    pub fn get(&self, field: LessonField) -> Option<&str> {
        self.slot(field).as_deref().filter(|s| !s.is_empty())
    }

    /// Stored value of a field, exactly as decoded.
    pub fn slot(&self, field: LessonField) -> &Option<String> {
        match field {
            LessonField::Customer => &self.customer,
            LessonField::Platform => &self.platform,
            LessonField::Issue => &self.issue,
            LessonField::DetailedDescription => &self.detailed_description,
            LessonField::ImpactLevel => &self.impact_level,
            LessonField::LiableStakeholder => &self.liable_stakeholder,
            LessonField::PreventiveAction => &self.preventive_action,
            LessonField::LessonsLearned => &self.lessons_learned,
            LessonField::Status => &self.status,
            LessonField::Timeline => &self.timeline,
        }
    }

    /// Mutable slot for a field (used by the store decoders).
    pub fn slot_mut(&mut self, field: LessonField) -> &mut Option<String> {
        match field {
            LessonField::Customer => &mut self.customer,
            LessonField::Platform => &mut self.platform,
            LessonField::Issue => &mut self.issue,
            LessonField::DetailedDescription => &mut self.detailed_description,
            LessonField::ImpactLevel => &mut self.impact_level,
            LessonField::LiableStakeholder => &mut self.liable_stakeholder,
            LessonField::PreventiveAction => &mut self.preventive_action,
            LessonField::LessonsLearned => &mut self.lessons_learned,
            LessonField::Status => &mut self.status,
            LessonField::Timeline => &mut self.timeline,
        }
    }

    pub fn customer(&self) -> Option<&str> {
        self.get(LessonField::Customer)
    }

    pub fn issue(&self) -> Option<&str> {
        self.get(LessonField::Issue)
    }

    pub fn timeline(&self) -> Option<&str> {
        self.get(LessonField::Timeline)
    }
}

/// A tracked lesson as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    /// Opaque, stable identifier. Strings, numbers and `{"$oid": ".."}` are accepted.
    #[serde(rename = "_id", alias = "id", deserialize_with = "lenient_id")]
    pub id: String,
    #[serde(flatten)]
    pub fields: LessonFields,
    /// Set once, after the first confirmed reminder.
    #[serde(default)]
    pub notified: bool,
    #[serde(rename = "notifiedAt", default, deserialize_with = "lenient_instant", skip_serializing_if = "Option::is_none")]
    pub notified_at: Option<DateTime<Utc>>,
}

impl Lesson {
    /// New, not-yet-notified lesson.
    pub fn with_id(id: &str, fields: LessonFields) -> Self {
        Self {
            id: id.to_string(),
            fields,
            notified: false,
            notified_at: None,
        }
    }

    pub fn timeline(&self) -> Option<&str> {
        self.fields.timeline()
    }
}

/// A rendered email, ready for any transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub subject: String,
    pub text_body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_body: Option<String>,
}

/// Text form of a document id: a string, a number, or an extended-JSON
/// `{"$oid": ".."}` object.
pub fn id_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Object(map) => map.get("$oid").and_then(|v| v.as_str()).map(String::from),
        _ => None,
    }
}

fn lenient_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    id_text(&value).ok_or_else(|| serde::de::Error::custom(format!("unsupported _id: {value}")))
}

/// RFC 3339 text, or extended-JSON `{"$date": ..}` with text or epoch millis.
fn lenient_instant<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let raw = match &value {
        Some(serde_json::Value::Object(map)) => map.get("$date"),
        other => other.as_ref(),
    };
    Ok(match raw {
        Some(serde_json::Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Some(serde_json::Value::Number(n)) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    })
}

/// Accept strings, numbers and booleans for a text field; anything else is missing.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_field_names() {
        let doc = serde_json::json!({
            "_id": "L-1",
            "Customer": "Acme",
            "Impact Level": "High",
            "Timeline": "2024-03-10",
        });
        let lesson: Lesson = serde_json::from_value(doc).unwrap();
        assert_eq!(lesson.id, "L-1");
        assert_eq!(lesson.fields.customer(), Some("Acme"));
        assert_eq!(lesson.fields.get(LessonField::ImpactLevel), Some("High"));
        assert_eq!(lesson.timeline(), Some("2024-03-10"));
        assert!(!lesson.notified);
        assert!(lesson.notified_at.is_none());
    }

    #[test]
    fn test_lenient_values() {
        let fields: LessonFields = serde_json::from_value(serde_json::json!({
            "Customer": 42,
            "Platform": null,
            "Issue": "",
            "Status": {"nested": true},
        }))
        .unwrap();
        assert_eq!(fields.customer(), Some("42"));
        assert_eq!(fields.get(LessonField::Platform), None);
        // empty string is kept but reads as missing
        assert_eq!(fields.issue, Some(String::new()));
        assert_eq!(fields.issue(), None);
        assert_eq!(fields.get(LessonField::Status), None);
    }

    #[test]
    fn test_notified_marker_serialization() {
        let mut lesson = Lesson::with_id("x", LessonFields::default());
        let plain = serde_json::to_value(&lesson).unwrap();
        assert!(plain.get("notifiedAt").is_none());

        lesson.notified = true;
        lesson.notified_at = Some(Utc::now());
        let marked = serde_json::to_value(&lesson).unwrap();
        assert_eq!(marked["notified"], true);
        assert!(marked["notifiedAt"].is_string());
    }

    #[test]
    fn test_id_forms() {
        let oid: Lesson = serde_json::from_value(serde_json::json!({
            "_id": {"$oid": "65f1c0ffee0000000000beef"},
            "Customer": "Acme",
        }))
        .unwrap();
        assert_eq!(oid.id, "65f1c0ffee0000000000beef");

        let numeric: Lesson = serde_json::from_value(serde_json::json!({"id": 17})).unwrap();
        assert_eq!(numeric.id, "17");

        let exported: Lesson = serde_json::from_value(serde_json::json!({
            "_id": {"$oid": "65f1c0ffee0000000000beef"},
            "notified": true,
            "notifiedAt": {"$date": "2024-03-07T05:00:00.000Z"},
        }))
        .unwrap();
        assert_eq!(
            exported.notified_at.map(|t| t.to_rfc3339()),
            Some("2024-03-07T05:00:00+00:00".to_string())
        );

        assert!(serde_json::from_value::<Lesson>(serde_json::json!({"_id": [1]})).is_err());
        assert!(serde_json::from_value::<Lesson>(serde_json::json!({"_id": {"x": 1}})).is_err());
    }

    #[test]
    fn test_labels_in_render_order() {
        let labels: Vec<_> = LessonField::ALL.iter().map(|f| f.label()).collect();
        assert_eq!(labels.first(), Some(&"Customer"));
        assert_eq!(labels.last(), Some(&"Timeline"));
        assert_eq!(labels.len(), 10);
    }
}
