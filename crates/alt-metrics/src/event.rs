// event.rs - Metric event data model.
//
// Every reportable occurrence (a request, a generated alt text, a consent
// decision) becomes one MetricEvent. Events are immutable once appended
// to the recorder's buffer and are persisted in insertion order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hasher;

/// Flat map of named detail fields attached to an event.
pub type Details = serde_json::Map<String, serde_json::Value>;

/// The kinds of event the recorder knows how to log.
///
/// Records store the string form (see [`EventKind::as_str`]) so a file
/// written by a newer build with extra kinds still loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Request,
    Follow,
    SuccessfulGeneration,
    RateLimitHit,
    NewAccountActivity,
    ShadowBan,
    UnBan,
    WeeklySummary,
    MissingAltText,
    AltTextReminderSent,
    ConsentRequest,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Request => "request",
            EventKind::Follow => "follow",
            EventKind::SuccessfulGeneration => "successful_generation",
            EventKind::RateLimitHit => "rate_limit_hit",
            EventKind::NewAccountActivity => "new_account_activity",
            EventKind::ShadowBan => "shadow_ban",
            EventKind::UnBan => "un_ban",
            EventKind::WeeklySummary => "weekly_summary",
            EventKind::MissingAltText => "missing_alt_text",
            EventKind::AltTextReminderSent => "alt_text_reminder_sent",
            EventKind::ConsentRequest => "consent_request",
        }
    }
}

/// A single recorded event - one element of the persisted JSON array.
///
/// Field names on disk are `Timestamp`, `UserID`, `EventType`, `Details`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEvent {
    /// When the event was logged (UTC).
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<Utc>,

    /// SHA-256 digest of the user identifier. Never the raw identifier.
    #[serde(rename = "UserID")]
    pub user_id: String,

    /// Snake-case event kind, e.g. `"request"`.
    #[serde(rename = "EventType")]
    pub event_type: String,

    /// Optional per-kind fields. Written as `null` when absent.
    #[serde(rename = "Details", default)]
    pub details: Option<Details>,
}

impl MetricEvent {
    /// Create an event stamped with the current time.
    ///
    /// `raw_user_id` is anonymized here, so a raw identifier never
    /// exists inside a `MetricEvent` built through this constructor.
    pub fn new(raw_user_id: &str, kind: EventKind, details: Option<Details>) -> Self {
        Self {
            timestamp: Utc::now(),
            user_id: hasher::anonymize(raw_user_id),
            event_type: kind.as_str().to_string(),
            details,
        }
    }

    /// The event kind, if it is one this build knows about.
    pub fn kind(&self) -> Option<EventKind> {
        serde_json::from_value(serde_json::Value::String(self.event_type.clone())).ok()
    }

    /// Look up a single detail field.
    pub fn detail(&self, key: &str) -> Option<&serde_json::Value> {
        self.details.as_ref().and_then(|d| d.get(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_event_anonymizes_user_id() {
        let event = MetricEvent::new("alice", EventKind::Request, None);
        assert_eq!(event.user_id, hasher::anonymize("alice"));
        assert_ne!(event.user_id, "alice");
        assert_eq!(event.event_type, "request");
        assert!(event.details.is_none());
    }

    #[test]
    fn serializes_with_persisted_field_names() {
        let mut details = Details::new();
        details.insert("granted".into(), true.into());
        let event = MetricEvent::new("bob", EventKind::ConsentRequest, Some(details));

        let value = serde_json::to_value(&event).unwrap();
        let obj = value.as_object().unwrap();
        assert!(obj.contains_key("Timestamp"));
        assert_eq!(obj["UserID"], event.user_id.as_str());
        assert_eq!(obj["EventType"], "consent_request");
        assert_eq!(obj["Details"]["granted"], true);
    }

    #[test]
    fn absent_details_serialize_as_null() {
        let event = MetricEvent::new("bob", EventKind::Follow, None);
        let value = serde_json::to_value(&event).unwrap();
        assert!(value["Details"].is_null());
    }

    #[test]
    fn deserializes_missing_details_and_foreign_offsets() {
        let json = r#"{
            "Timestamp": "2024-03-01T10:15:30.123456789+02:00",
            "UserID": "plainuser123",
            "EventType": "weekly_summary"
        }"#;
        let event: MetricEvent = serde_json::from_str(json).unwrap();
        assert!(event.details.is_none());
        assert_eq!(event.timestamp.to_rfc3339(), "2024-03-01T08:15:30.123456789+00:00");
        assert_eq!(event.kind(), Some(EventKind::WeeklySummary));
    }

    #[test]
    fn unknown_event_type_still_loads() {
        let json = r#"{"Timestamp":"2024-03-01T10:15:30Z","UserID":"x","EventType":"boost","Details":null}"#;
        let event: MetricEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type, "boost");
        assert_eq!(event.kind(), None);
    }

    #[test]
    fn kind_strings_match_serde_names() {
        let kinds = [
            EventKind::Request,
            EventKind::Follow,
            EventKind::SuccessfulGeneration,
            EventKind::RateLimitHit,
            EventKind::NewAccountActivity,
            EventKind::ShadowBan,
            EventKind::UnBan,
            EventKind::WeeklySummary,
            EventKind::MissingAltText,
            EventKind::AltTextReminderSent,
            EventKind::ConsentRequest,
        ];
        for kind in kinds {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }
}
