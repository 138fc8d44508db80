//! Experience records supplied by the remote content source.
//!
//! The content API hands back loosely shaped JSON. [`parse_payload`] is the
//! only place that inspects that shape: it validates each record into an
//! [`Experience`] and reports the records it had to skip, so nothing
//! downstream ever touches raw JSON.

use crate::error::{Result, TracksideError};
use crate::notify::LeadTime;
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use tracing::warn;

/// Maximum body length (characters) derived from a rich-text description.
const MAX_BODY_CHARS: usize = 178;

/// Naive wall-clock layouts accepted for venue-local start times.
const NAIVE_LAYOUTS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Stable experience identifier.
///
/// The content API uses integer ids, but strings are accepted too; both are
/// normalised to their decimal/string form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExperienceId(String);

impl ExperienceId {
    /// Wrap a raw identifier.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExperienceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for ExperienceId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for ExperienceId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// One block of a rich-text description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichTextBlock {
    /// Block type as reported by the content API (`paragraph`, `heading`, ...).
    pub kind: String,
    /// Concatenated text of the block's children.
    pub text: String,
}

impl RichTextBlock {
    /// Plain paragraph block.
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self {
            kind: "paragraph".to_owned(),
            text: text.into(),
        }
    }
}

/// A schedulable session with a start time and reminder eligibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experience {
    pub id: ExperienceId,
    pub title: String,
    pub description: Vec<RichTextBlock>,
    /// Whether this experience is eligible for an automatic reminder.
    pub auto_notify: bool,
    pub start_at: DateTime<Utc>,
}

impl Experience {
    /// Create an experience with an empty description.
    pub fn new(
        id: impl Into<ExperienceId>,
        title: impl Into<String>,
        auto_notify: bool,
        start_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: Vec::new(),
            auto_notify,
            start_at,
        }
    }

    /// Attach a description.
    pub fn with_description(mut self, description: Vec<RichTextBlock>) -> Self {
        self.description = description;
        self
    }

    /// Body text for the reminder.
    ///
    /// Paragraph text from the description, truncated; falls back to a
    /// "starts in N minutes" line when the description has no paragraphs.
    pub fn notification_body(&self, lead_time: LeadTime) -> String {
        let joined = self
            .description
            .iter()
            .filter(|block| block.kind == "paragraph")
            .map(|block| block.text.trim())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if joined.is_empty() {
            let minutes = lead_time.as_duration().num_minutes().max(1);
            let unit = if minutes == 1 { "minute" } else { "minutes" };
            return format!("{} starts in {minutes} {unit}", self.title);
        }

        if joined.chars().count() <= MAX_BODY_CHARS {
            return joined;
        }
        let mut truncated: String = joined.chars().take(MAX_BODY_CHARS - 1).collect();
        truncated.push('…');
        truncated
    }
}

/// A payload record that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRecord {
    /// Position in `scheduleExperiences`.
    pub index: usize,
    /// Id of the record, when it carried a usable one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience_id: Option<ExperienceId>,
    pub reason: String,
}

/// Result of validating a content payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedPayload {
    pub experiences: Vec<Experience>,
    pub rejected: Vec<RejectedRecord>,
}

/// Build the venue offset from minutes east of UTC.
///
/// # Errors
///
/// Returns [`TracksideError::Config`] when the offset is out of range.
pub fn venue_offset(minutes: i32) -> Result<FixedOffset> {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| TracksideError::Config(format!("invalid venue UTC offset: {minutes} min")))
}

/// Validate a content payload into experiences.
///
/// Accepts `{"scheduleExperiences": [{"experience": {...}}]}`, optionally
/// wrapped in a top-level `"data"` object. Malformed records are skipped and
/// reported; only a wrong top-level shape is an error.
///
/// # Errors
///
/// Returns [`TracksideError::Payload`] when `scheduleExperiences` is missing
/// or not an array.
pub fn parse_payload(payload: &Value, venue: FixedOffset) -> Result<ParsedPayload> {
    let root = payload.get("data").unwrap_or(payload);
    let records = root
        .get("scheduleExperiences")
        .ok_or_else(|| TracksideError::Payload("missing scheduleExperiences".to_owned()))?
        .as_array()
        .ok_or_else(|| TracksideError::Payload("scheduleExperiences is not an array".to_owned()))?;

    let mut parsed = ParsedPayload::default();
    let mut seen = HashSet::new();

    for (index, record) in records.iter().enumerate() {
        match parse_record(record, venue) {
            Ok(experience) => {
                if !seen.insert(experience.id.clone()) {
                    warn!(index, id = %experience.id, "duplicate experience id in payload");
                    parsed.rejected.push(RejectedRecord {
                        index,
                        experience_id: None,
                        reason: format!("duplicate experience id {}", experience.id),
                    });
                    continue;
                }
                parsed.experiences.push(experience);
            }
            Err(reason) => {
                warn!(index, %reason, "skipping malformed experience record");
                parsed.rejected.push(RejectedRecord {
                    index,
                    experience_id: record_id(record),
                    reason,
                });
            }
        }
    }

    Ok(parsed)
}

fn parse_record(record: &Value, venue: FixedOffset) -> std::result::Result<Experience, String> {
    let experience = record
        .get("experience")
        .filter(|value| value.is_object())
        .ok_or("record has no experience object")?;

    let id = parse_id(experience)?;

    let title = experience
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .ok_or_else(|| format!("experience {id} has no title"))?
        .to_owned();

    let auto_notify = match experience.get("autoNotify") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(other) => return Err(format!("experience {id} has non-boolean autoNotify: {other}")),
    };

    let start_at = experience
        .get("startAt")
        .and_then(Value::as_str)
        .ok_or_else(|| format!("experience {id} has no startAt"))
        .and_then(|raw| {
            parse_start_at(raw, venue).ok_or_else(|| format!("experience {id} has bad startAt {raw:?}"))
        })?;

    let description = match experience.get("description") {
        Some(Value::Array(blocks)) => blocks.iter().filter_map(parse_block).collect(),
        _ => Vec::new(),
    };

    Ok(Experience {
        id,
        title,
        description,
        auto_notify,
        start_at,
    })
}

fn parse_id(experience: &Value) -> std::result::Result<ExperienceId, String> {
    match experience.get("id") {
        Some(Value::Number(n)) => n
            .as_u64()
            .map(ExperienceId::from)
            .ok_or_else(|| format!("id {n} is not a non-negative integer")),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(ExperienceId::new(s.trim())),
        _ => Err("missing or invalid id".to_owned()),
    }
}

/// Id of a record that failed validation, if it has one.
fn record_id(record: &Value) -> Option<ExperienceId> {
    record
        .get("experience")
        .and_then(|experience| parse_id(experience).ok())
}

fn parse_block(block: &Value) -> Option<RichTextBlock> {
    let kind = block.get("type").and_then(Value::as_str)?.to_owned();
    let text = block
        .get("children")
        .and_then(Value::as_array)
        .map(|children| {
            children
                .iter()
                .filter_map(|child| child.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default();
    Some(RichTextBlock { kind, text })
}

/// Parse an RFC 3339 instant, or a naive venue wall-clock time.
pub(crate) fn parse_start_at(raw: &str, venue: FixedOffset) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Some(instant.with_timezone(&Utc));
    }
    NAIVE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(raw, layout).ok())
        .and_then(|naive| naive.and_local_timezone(venue).single())
        .map(|local| local.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn utc() -> FixedOffset {
        venue_offset(0).unwrap()
    }

    #[test]
    fn parses_well_formed_payload() {
        let payload = json!({
            "scheduleExperiences": [
                {"experience": {
                    "id": 7,
                    "title": "Pit Lane Walk",
                    "autoNotify": true,
                    "startAt": "2026-05-24T14:00:00Z",
                    "description": [
                        {"type": "paragraph", "children": [{"text": "Meet at "}, {"text": "Gate 4."}]}
                    ]
                }}
            ]
        });

        let parsed = parse_payload(&payload, utc()).expect("parse");
        assert!(parsed.rejected.is_empty());
        assert_eq!(parsed.experiences.len(), 1);
        let exp = &parsed.experiences[0];
        assert_eq!(exp.id, ExperienceId::from(7));
        assert!(exp.auto_notify);
        assert_eq!(
            exp.start_at,
            Utc.with_ymd_and_hms(2026, 5, 24, 14, 0, 0).unwrap()
        );
        assert_eq!(exp.description[0].text, "Meet at Gate 4.");
    }

    #[test]
    fn accepts_data_envelope() {
        let payload = json!({"data": {"scheduleExperiences": []}});
        let parsed = parse_payload(&payload, utc()).expect("parse");
        assert!(parsed.experiences.is_empty());
    }

    #[test]
    fn wrong_top_level_shape_is_an_error() {
        let err = parse_payload(&json!({"scheduleExperiences": {}}), utc()).unwrap_err();
        assert!(matches!(err, TracksideError::Payload(_)));
        let err = parse_payload(&json!([]), utc()).unwrap_err();
        assert!(matches!(err, TracksideError::Payload(_)));
    }

    #[test]
    fn malformed_records_are_skipped_not_fatal() {
        let payload = json!({
            "scheduleExperiences": [
                {"experience": {"id": 1, "title": "Ok", "startAt": "2026-05-24T14:00:00Z"}},
                {"experience": {"title": "No id", "startAt": "2026-05-24T14:00:00Z"}},
                {"experience": {"id": 3, "title": "Bad time", "startAt": "tomorrow"}},
                {"experience": {"id": 4, "title": "Bad flag", "autoNotify": "yes", "startAt": "2026-05-24T14:00:00Z"}},
                {"notAnExperience": true},
                {"experience": {"id": 1, "title": "Dup", "startAt": "2026-05-24T15:00:00Z"}}
            ]
        });

        let parsed = parse_payload(&payload, utc()).expect("parse");
        assert_eq!(parsed.experiences.len(), 1);
        assert!(!parsed.experiences[0].auto_notify, "missing autoNotify means false");
        let indexes: Vec<usize> = parsed.rejected.iter().map(|r| r.index).collect();
        assert_eq!(indexes, vec![1, 2, 3, 4, 5]);
        assert!(parsed.rejected[4].reason.contains("duplicate"));
        let ids: Vec<Option<ExperienceId>> =
            parsed.rejected.iter().map(|r| r.experience_id.clone()).collect();
        assert_eq!(
            ids,
            vec![None, Some(ExperienceId::from(3)), Some(ExperienceId::from(4)), None, None],
            "only malformed records with a usable id carry it"
        );
    }

    #[test]
    fn naive_start_time_uses_venue_offset() {
        let venue = venue_offset(-4 * 60).unwrap();
        let parsed = parse_start_at("2026-05-24T10:00:00", venue).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 5, 24, 14, 0, 0).unwrap());

        let short = parse_start_at("2026-05-24T10:00", venue).unwrap();
        assert_eq!(short, parsed);
    }

    #[test]
    fn string_ids_are_trimmed() {
        let payload = json!({"scheduleExperiences": [
            {"experience": {"id": " vip-9 ", "title": "Garage tour", "startAt": "2026-05-24T14:00:00+02:00"}}
        ]});
        let parsed = parse_payload(&payload, utc()).unwrap();
        assert_eq!(parsed.experiences[0].id.as_str(), "vip-9");
        assert_eq!(
            parsed.experiences[0].start_at,
            Utc.with_ymd_and_hms(2026, 5, 24, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn body_falls_back_to_lead_time_line() {
        let exp = Experience::new(1, "Grid Walk", true, Utc::now());
        assert_eq!(
            exp.notification_body(LeadTime::from_minutes(15)),
            "Grid Walk starts in 15 minutes"
        );
        assert_eq!(
            exp.notification_body(LeadTime::from_secs(30)),
            "Grid Walk starts in 1 minute"
        );
    }

    #[test]
    fn body_is_truncated() {
        let long = "x".repeat(400);
        let exp = Experience::new(1, "Long", true, Utc::now())
            .with_description(vec![RichTextBlock::paragraph(long)]);
        let body = exp.notification_body(LeadTime::from_minutes(1));
        assert_eq!(body.chars().count(), MAX_BODY_CHARS);
        assert!(body.ends_with('…'));
    }

    #[test]
    fn invalid_venue_offset_rejected() {
        assert!(venue_offset(48 * 60).is_err());
    }
}
