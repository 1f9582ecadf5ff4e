//! Raw record translation into the canonical message shape
//!
//! Translates heterogeneous wire records from either data source into
//! [`Message`]. Legacy flat records pass through with a subject default;
//! relationship-backed records are resolved against their activity parties
//! with hard required-field contracts. Bodies are sanitized with `ammonia`
//! down to a links-only HTML subset.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::InboxConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{
    Direction, Message, MessageCategory, PARTY_ROLE_RECIPIENT, SUBJECT_PLACEHOLDER,
};

/// Wire field carrying the relationship-record identifier
const ACTIVITY_ID_FIELD: &str = "activityid";

/// Annotation suffix carrying the display text of a lookup value
const FORMATTED_VALUE: &str = "@OData.Community.Display.V1.FormattedValue";

/// Translate a raw record into a canonical [`Message`]
///
/// Records already matching the legacy flat shape (`from` and `body`
/// present, no relationship identifier) pass through unchanged except for
/// defaulting an absent subject. Everything else is treated as a
/// relationship-backed record and must satisfy the required-field contract;
/// each missing piece fails with `Mapping` naming the field and the query
/// parameter that supplies it. No required field is ever defaulted.
///
/// # Errors
///
/// Returns `Mapping` when a required field is missing or malformed.
pub fn map_record(record: &Value, config: &InboxConfig) -> AppResult<Message> {
    if is_legacy_record(record) {
        map_legacy_record(record)
    } else {
        map_relationship_record(record, config)
    }
}

/// Legacy-shape detection
///
/// A record is legacy when it carries flat `from` and `body` fields and
/// lacks the relationship-record identifier.
fn is_legacy_record(record: &Value) -> bool {
    record.get("from").is_some()
        && record.get("body").is_some()
        && record.get(ACTIVITY_ID_FIELD).is_none()
}

fn map_legacy_record(record: &Value) -> AppResult<Message> {
    let id = required_str(record, "id", "include an 'id' on every snapshot record")?;
    let from = required_str(record, "from", "include a 'from' on every snapshot record")?;
    let date = required_date(record, "date", "include an ISO 8601 'date' on every snapshot record")?;

    Ok(Message {
        id: id.to_owned(),
        from: from.to_owned(),
        subject: optional_str(record, "subject")
            .unwrap_or(SUBJECT_PLACEHOLDER)
            .to_owned(),
        body: sanitize_body(optional_str(record, "body").unwrap_or_default()),
        date,
        read: false,
        category: MessageCategory::General,
        regarding_object_id: None,
        to_contact: None,
        to_contact_id: None,
        from_staff_id: None,
        direction: None,
        statecode: None,
        statuscode: None,
        has_read_value: record.get("read").and_then(Value::as_bool),
    })
}

fn map_relationship_record(record: &Value, config: &InboxConfig) -> AppResult<Message> {
    let id = required_str(
        record,
        ACTIVITY_ID_FIELD,
        "add 'activityid' to the read operation's field selection",
    )?;
    let date = required_date(
        record,
        "createdon",
        "add 'createdon' to the read operation's field selection",
    )?;
    let from_staff_id = required_str(
        record,
        "_createdby_value",
        "add '_createdby_value' to the read operation's field selection",
    )?;
    let from = required_str(
        record,
        &format!("_createdby_value{FORMATTED_VALUE}"),
        "request formatted values (include-annotations preference) on the read operation",
    )?;

    let parties_property = config.relationship.parties_property.as_str();
    let parties = record
        .get(parties_property)
        .and_then(Value::as_array)
        .filter(|parties| !parties.is_empty())
        .ok_or_else(|| {
            AppError::mapping(
                parties_property,
                "add the activity-parties navigation to the read operation's expansion",
            )
        })?;

    // First recipient-role party wins when several are present.
    let recipient = parties
        .iter()
        .find(|party| {
            party.get("participationtypemask").and_then(Value::as_u64)
                == Some(PARTY_ROLE_RECIPIENT)
        })
        .ok_or_else(|| {
            AppError::mapping(
                "participationtypemask",
                "expand the activity parties with 'participationtypemask' selected; \
                 no recipient-role party was present",
            )
        })?;
    let to_contact_id = required_str(
        recipient,
        "_partyid_value",
        "select '_partyid_value' on the activity-parties expansion",
    )?;
    let to_contact = required_str(
        recipient,
        &format!("_partyid_value{FORMATTED_VALUE}"),
        "request formatted values (include-annotations preference) on the read operation",
    )?;

    Ok(Message {
        id: id.to_owned(),
        from: from.to_owned(),
        subject: optional_str(record, "subject")
            .unwrap_or(SUBJECT_PLACEHOLDER)
            .to_owned(),
        body: sanitize_body(optional_str(record, "description").unwrap_or_default()),
        date,
        read: false,
        category: MessageCategory::Regarding,
        regarding_object_id: optional_str(record, "_regardingobjectid_value").map(str::to_owned),
        to_contact: Some(to_contact.to_owned()),
        to_contact_id: Some(to_contact_id.to_owned()),
        from_staff_id: Some(from_staff_id.to_owned()),
        direction: record
            .get("directioncode")
            .and_then(Value::as_u64)
            .and_then(Direction::from_code),
        statecode: record.get("statecode").and_then(Value::as_i64),
        statuscode: record.get("statuscode").and_then(Value::as_i64),
        has_read_value: record
            .get(config.resolved_field("hasread").as_str())
            .and_then(Value::as_bool),
    })
}

/// Sanitize a body to the restricted HTML subset (links only)
///
/// Everything but anchor tags is stripped; anchor attributes and URL schemes
/// follow ammonia's defaults.
pub fn sanitize_body(raw: &str) -> String {
    let mut tags = HashSet::new();
    tags.insert("a");
    ammonia::Builder::new().tags(tags).clean(raw).to_string()
}

fn optional_str<'a>(record: &'a Value, field: &str) -> Option<&'a str> {
    record.get(field).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn required_str<'a>(record: &'a Value, field: &str, remedy: &str) -> AppResult<&'a str> {
    optional_str(record, field).ok_or_else(|| AppError::mapping(field, remedy))
}

fn required_date(record: &Value, field: &str, remedy: &str) -> AppResult<DateTime<Utc>> {
    let raw = required_str(record, field, remedy)?;
    DateTime::parse_from_rfc3339(raw)
        .map(|date| date.with_timezone(&Utc))
        .map_err(|e| {
            AppError::Mapping(format!(
                "field '{field}' is not a valid ISO 8601 timestamp ('{raw}'): {e}"
            ))
        })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{map_record, sanitize_body};
    use crate::config::tests::test_config;
    use crate::models::{MessageCategory, SUBJECT_PLACEHOLDER};

    fn relationship_record() -> serde_json::Value {
        json!({
            "activityid": "a1",
            "subject": "Billing question",
            "description": "See <a href=\"https://example.com/invoice\">invoice</a>",
            "createdon": "2026-03-01T10:00:00Z",
            "directioncode": 2,
            "statecode": 0,
            "statuscode": 1,
            "_createdby_value": "staff-1",
            "_createdby_value@OData.Community.Display.V1.FormattedValue": "Sam Staff",
            "_regardingobjectid_value": "case-9",
            "adx_hasread": false,
            "adx_portalcomment_activity_parties": [
                {
                    "participationtypemask": 1,
                    "_partyid_value": "staff-1",
                    "_partyid_value@OData.Community.Display.V1.FormattedValue": "Sam Staff"
                },
                {
                    "participationtypemask": 2,
                    "_partyid_value": "contact-7",
                    "_partyid_value@OData.Community.Display.V1.FormattedValue": "Casey Contact"
                }
            ]
        })
    }

    #[test]
    fn legacy_record_passes_through_with_subject_default() {
        let record = json!({
            "id": "m1",
            "from": "Support",
            "body": "hi",
            "date": "2026-01-05T08:30:00Z",
            "read": false
        });
        let message = map_record(&record, &test_config()).expect("maps");
        assert_eq!(message.id, "m1");
        assert_eq!(message.from, "Support");
        assert_eq!(message.subject, SUBJECT_PLACEHOLDER);
        assert_eq!(message.category, MessageCategory::General);
        assert_eq!(message.has_read_value, Some(false));
        assert!(message.to_contact_id.is_none());
    }

    #[test]
    fn relationship_record_resolves_parties_and_identities() {
        let message = map_record(&relationship_record(), &test_config()).expect("maps");
        assert_eq!(message.id, "a1");
        assert_eq!(message.from, "Sam Staff");
        assert_eq!(message.from_staff_id.as_deref(), Some("staff-1"));
        assert_eq!(message.to_contact_id.as_deref(), Some("contact-7"));
        assert_eq!(message.to_contact.as_deref(), Some("Casey Contact"));
        assert_eq!(message.regarding_object_id.as_deref(), Some("case-9"));
        assert_eq!(message.category, MessageCategory::Regarding);
        assert_eq!(message.has_read_value, Some(false));
        assert!(message.body.contains("<a"));
    }

    #[test]
    fn first_recipient_party_wins_when_several_match() {
        let mut record = relationship_record();
        record["adx_portalcomment_activity_parties"]
            .as_array_mut()
            .expect("parties")
            .push(json!({
                "participationtypemask": 2,
                "_partyid_value": "contact-8",
                "_partyid_value@OData.Community.Display.V1.FormattedValue": "Other Contact"
            }));
        let message = map_record(&record, &test_config()).expect("maps");
        assert_eq!(message.to_contact_id.as_deref(), Some("contact-7"));
    }

    #[test]
    fn zero_recipient_parties_is_a_mapping_error() {
        let mut record = relationship_record();
        record["adx_portalcomment_activity_parties"] = json!([
            { "participationtypemask": 1, "_partyid_value": "staff-1" }
        ]);
        let err = map_record(&record, &test_config()).expect_err("must fail");
        assert!(err.to_string().contains("participationtypemask"));
    }

    #[test]
    fn missing_creator_names_the_field_and_remedy() {
        let mut record = relationship_record();
        record.as_object_mut()
            .expect("object")
            .remove("_createdby_value");
        let err = map_record(&record, &test_config()).expect_err("must fail");
        let text = err.to_string();
        assert!(text.contains("_createdby_value"));
        assert!(text.contains("field selection"));
    }

    #[test]
    fn read_flag_field_honors_override() {
        let config = test_config().with_field_override("hasread", "custom_seen");
        let mut record = relationship_record();
        record["custom_seen"] = json!(true);
        let message = map_record(&record, &config).expect("maps");
        assert_eq!(message.has_read_value, Some(true));
    }

    #[test]
    fn sanitizer_keeps_links_and_strips_everything_else() {
        let cleaned = sanitize_body(
            "<script>alert(1)</script><b>bold</b> <a href=\"https://example.com\">ok</a>",
        );
        assert!(!cleaned.contains("<script"));
        assert!(!cleaned.contains("<b>"));
        assert!(cleaned.contains("<a"));
        assert!(cleaned.contains("bold"));
    }
}
