//! Canonical message entity and operation result types
//!
//! Defines the canonical `Message` shape both data sources converge on, the
//! direction/participation codes used by the tabular wire format, and the
//! outcome types returned by session operations.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Subject used when a record carries none
pub const SUBJECT_PLACEHOLDER: &str = "(no subject)";

/// Participation role marking a party as the record's sender
pub const PARTY_ROLE_SENDER: u64 = 1;
/// Participation role marking a party as the record's recipient
pub const PARTY_ROLE_RECIPIENT: u64 = 2;

/// Message direction on the wire
///
/// Indicates whether a record flows from the end-user or to the end-user.
/// The inbox only loads `ToContact` records; replies are created as
/// `FromContact`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    /// Outbound from the end-user (wire code 1)
    FromContact,
    /// Inbound to the end-user (wire code 2)
    ToContact,
}

impl Direction {
    /// Wire code for this direction
    pub fn code(self) -> u64 {
        match self {
            Self::FromContact => 1,
            Self::ToContact => 2,
        }
    }

    /// Parse a wire code; unknown codes yield `None`
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(Self::FromContact),
            2 => Some(Self::ToContact),
            _ => None,
        }
    }
}

/// Provenance tag for a canonical message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageCategory {
    /// Flat legacy record (snapshot `messages` shape)
    General,
    /// Relationship-backed record from the tabular entity
    Regarding,
}

/// Canonical message entity
///
/// Produced by the field mapper from either source; immutable except for
/// `read`, which only the read-state reconciler flips.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    /// Opaque unique identifier
    pub id: String,
    /// Display name of the sender
    pub from: String,
    /// Subject, defaulted to [`SUBJECT_PLACEHOLDER`] when absent
    pub subject: String,
    /// Body, sanitized to a links-only HTML subset (may be empty)
    pub body: String,
    /// Record timestamp
    pub date: DateTime<Utc>,
    /// Derived read state (server flag wins over the local fallback)
    pub read: bool,
    /// Provenance tag
    pub category: MessageCategory,
    /// Parent business record id, when relationship-backed
    pub regarding_object_id: Option<String>,
    /// Recipient display name
    pub to_contact: Option<String>,
    /// Recipient contact id (needed to compose a reply)
    pub to_contact_id: Option<String>,
    /// Sender staff id (needed to compose a reply)
    pub from_staff_id: Option<String>,
    /// Wire direction, when relationship-backed
    pub direction: Option<Direction>,
    /// Lifecycle state code, when present on the wire
    pub statecode: Option<i64>,
    /// Lifecycle status code, when present on the wire
    pub statuscode: Option<i64>,
    /// Raw server read flag; `None` means the field was absent
    pub has_read_value: Option<bool>,
}

/// Single party entry on an outgoing reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartyEntry {
    /// Binding property for this party type
    /// (e.g. `partyid_contact@odata.bind`)
    pub binding_property: String,
    /// Binding path to the party record (e.g. `/contacts(<id>)`)
    pub binding_path: String,
    /// Participation role on the new record
    pub participation_role: u64,
}

/// Outgoing reply record
///
/// Built by the reply composer; owned by it until handed to the data source
/// adapter's create operation. `to_wire` produces the tabular write shape.
#[derive(Debug, Clone)]
pub struct ReplyPayload {
    /// Reply subject (`Re: ` + original, never stacked)
    pub subject: String,
    /// Reply body, verbatim caller text
    pub body: String,
    /// Always [`Direction::FromContact`]
    pub direction: Direction,
    /// Binding property for the parent business record
    pub regarding_property: String,
    /// Binding path to the parent business record
    pub regarding_path: String,
    /// Navigation property holding the party entries
    pub parties_property: String,
    /// Exactly two entries: new sender (original recipient) and new
    /// recipient (original sender)
    pub parties: Vec<PartyEntry>,
}

impl ReplyPayload {
    /// Serialize to the tabular write shape
    ///
    /// Binding properties are dynamic (they carry configured navigation
    /// names), so the wire form is assembled as a JSON value rather than a
    /// static serde struct.
    pub fn to_wire(&self) -> serde_json::Value {
        let parties: Vec<serde_json::Value> = self
            .parties
            .iter()
            .map(|party| {
                let mut entry = serde_json::Map::new();
                entry.insert(
                    party.binding_property.clone(),
                    serde_json::Value::from(party.binding_path.clone()),
                );
                entry.insert(
                    "participationtypemask".to_owned(),
                    serde_json::Value::from(party.participation_role),
                );
                serde_json::Value::Object(entry)
            })
            .collect();

        let mut wire = serde_json::Map::new();
        wire.insert("subject".to_owned(), serde_json::Value::from(self.subject.clone()));
        wire.insert("description".to_owned(), serde_json::Value::from(self.body.clone()));
        wire.insert(
            "directioncode".to_owned(),
            serde_json::Value::from(self.direction.code()),
        );
        wire.insert(
            self.regarding_property.clone(),
            serde_json::Value::from(self.regarding_path.clone()),
        );
        wire.insert(
            self.parties_property.clone(),
            serde_json::Value::Array(parties),
        );
        serde_json::Value::Object(wire)
    }
}

/// Terminal outcome of a load cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Messages fetched, mapped, and reconciled
    Loaded {
        /// Total messages loaded
        total: usize,
        /// Messages deriving `read == false`
        unread: usize,
    },
    /// A newer load started while this one was in flight; its results were
    /// discarded
    Stale,
}

/// Structured result of a reply creation attempt
///
/// Remote failures surface here (`success: false`) so the host UI can prompt
/// the user to retry manually; there is no automatic retry.
#[derive(Debug, Clone, Serialize)]
pub struct ReplyOutcome {
    /// Whether the remote create succeeded
    pub success: bool,
    /// Human-readable outcome description
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::{Direction, PartyEntry, ReplyPayload};

    #[test]
    fn direction_codes_round_trip() {
        assert_eq!(Direction::from_code(1), Some(Direction::FromContact));
        assert_eq!(Direction::from_code(2), Some(Direction::ToContact));
        assert_eq!(Direction::from_code(7), None);
        assert_eq!(Direction::ToContact.code(), 2);
    }

    #[test]
    fn reply_payload_wire_shape_uses_configured_properties() {
        let payload = ReplyPayload {
            subject: "Re: Billing".to_owned(),
            body: "Thanks!".to_owned(),
            direction: Direction::FromContact,
            regarding_property: "regardingobjectid_incident@odata.bind".to_owned(),
            regarding_path: "/incidents(abc)".to_owned(),
            parties_property: "adx_portalcomment_activity_parties".to_owned(),
            parties: vec![PartyEntry {
                binding_property: "partyid_contact@odata.bind".to_owned(),
                binding_path: "/contacts(c1)".to_owned(),
                participation_role: 1,
            }],
        };

        let wire = payload.to_wire();
        assert_eq!(wire["subject"], "Re: Billing");
        assert_eq!(wire["directioncode"], 1);
        assert_eq!(wire["regardingobjectid_incident@odata.bind"], "/incidents(abc)");
        let parties = wire["adx_portalcomment_activity_parties"]
            .as_array()
            .expect("parties array");
        assert_eq!(parties[0]["partyid_contact@odata.bind"], "/contacts(c1)");
        assert_eq!(parties[0]["participationtypemask"], 1);
    }
}
