//! Outgoing reply construction
//!
//! Builds a reply record that reverses the sender/recipient roles of an
//! existing message: the original recipient (the portal contact) becomes the
//! new sender, the original sending staff member becomes the new recipient.
//! Identity requirements fail loudly; a partial payload is never produced.

use crate::config::InboxConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{
    Direction, Message, PARTY_ROLE_RECIPIENT, PARTY_ROLE_SENDER, PartyEntry, ReplyPayload,
};

/// Binding property for a contact party entry
const CONTACT_PARTY_BINDING: &str = "partyid_contact@odata.bind";
/// Binding property for a staff party entry
const STAFF_PARTY_BINDING: &str = "partyid_systemuser@odata.bind";

/// Compose a reply payload for an existing message
///
/// The payload carries the prefixed subject, the caller's text verbatim, the
/// outbound-from-end-user direction, a binding to the original's parent
/// business record, and exactly two party entries with reversed roles. The
/// composer performs no network call; the payload is handed to the data
/// source adapter's create operation.
///
/// # Errors
///
/// Returns `Compose` naming the missing identity and the query configuration
/// responsible for supplying it when the original message lacks
/// `to_contact_id`, `from_staff_id`, or its parent record reference.
pub fn compose_reply(
    original: &Message,
    reply_text: &str,
    config: &InboxConfig,
) -> AppResult<ReplyPayload> {
    let to_contact_id = original.to_contact_id.as_deref().ok_or_else(|| {
        AppError::compose(
            "toContactId",
            "select '_partyid_value' on the read operation's activity-parties expansion",
        )
    })?;
    let from_staff_id = original.from_staff_id.as_deref().ok_or_else(|| {
        AppError::compose(
            "fromStaffId",
            "add '_createdby_value' to the read operation's field selection",
        )
    })?;
    let regarding_id = original.regarding_object_id.as_deref().ok_or_else(|| {
        AppError::compose(
            "regardingObjectId",
            "add '_regardingobjectid_value' to the read operation's field selection",
        )
    })?;

    let relationship = &config.relationship;
    Ok(ReplyPayload {
        subject: reply_subject(&original.subject),
        body: reply_text.to_owned(),
        direction: Direction::FromContact,
        regarding_property: format!("{}@odata.bind", relationship.navigation_property),
        regarding_path: format!("/{}({regarding_id})", relationship.regarding_collection),
        parties_property: relationship.parties_property.clone(),
        parties: vec![
            // Original recipient becomes the new sender.
            PartyEntry {
                binding_property: CONTACT_PARTY_BINDING.to_owned(),
                binding_path: format!("/{}({to_contact_id})", relationship.contact_collection),
                participation_role: PARTY_ROLE_SENDER,
            },
            // Original sender becomes the new recipient.
            PartyEntry {
                binding_property: STAFF_PARTY_BINDING.to_owned(),
                binding_path: format!("/{}({from_staff_id})", relationship.staff_collection),
                participation_role: PARTY_ROLE_RECIPIENT,
            },
        ],
    })
}

/// Prefix a subject for a reply without stacking prefixes
fn reply_subject(original: &str) -> String {
    if original.starts_with("Re: ") {
        original.to_owned()
    } else {
        format!("Re: {original}")
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::compose_reply;
    use crate::config::tests::test_config;
    use crate::errors::AppError;
    use crate::models::{Direction, Message, MessageCategory};

    fn original() -> Message {
        Message {
            id: "a1".to_owned(),
            from: "Sam Staff".to_owned(),
            subject: "Billing question".to_owned(),
            body: "hello".to_owned(),
            date: Utc::now(),
            read: false,
            category: MessageCategory::Regarding,
            regarding_object_id: Some("case-9".to_owned()),
            to_contact: Some("Casey Contact".to_owned()),
            to_contact_id: Some("contact-7".to_owned()),
            from_staff_id: Some("staff-1".to_owned()),
            direction: Some(Direction::ToContact),
            statecode: Some(0),
            statuscode: Some(1),
            has_read_value: None,
        }
    }

    #[test]
    fn reverses_sender_and_recipient_roles() {
        let payload = compose_reply(&original(), "Thanks!", &test_config()).expect("composes");

        assert_eq!(payload.subject, "Re: Billing question");
        assert_eq!(payload.body, "Thanks!");
        assert_eq!(payload.direction, Direction::FromContact);
        assert_eq!(payload.regarding_path, "/incidents(case-9)");
        assert_eq!(payload.parties.len(), 2);

        let sender = &payload.parties[0];
        assert_eq!(sender.participation_role, 1);
        assert_eq!(sender.binding_path, "/contacts(contact-7)");

        let recipient = &payload.parties[1];
        assert_eq!(recipient.participation_role, 2);
        assert_eq!(recipient.binding_path, "/systemusers(staff-1)");
    }

    #[test]
    fn missing_staff_identity_fails_without_partial_payload() {
        let mut message = original();
        message.from_staff_id = None;
        let err = compose_reply(&message, "Thanks!", &test_config()).expect_err("must fail");
        assert!(matches!(err, AppError::Compose(_)));
        assert!(err.to_string().contains("fromStaffId"));
        assert!(err.to_string().contains("_createdby_value"));
    }

    #[test]
    fn missing_contact_identity_fails_without_partial_payload() {
        let mut message = original();
        message.to_contact_id = None;
        let err = compose_reply(&message, "Thanks!", &test_config()).expect_err("must fail");
        assert!(err.to_string().contains("toContactId"));
    }

    #[test]
    fn reply_prefix_is_not_stacked() {
        let mut message = original();
        message.subject = "Re: Billing question".to_owned();
        let payload = compose_reply(&message, "again", &test_config()).expect("composes");
        assert_eq!(payload.subject, "Re: Billing question");
    }
}
