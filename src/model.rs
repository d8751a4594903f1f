//! Type definitions for the Signal Desktop message store and the resolved values
//! built from it.
//!
//! Storage format: one JSON document per row in the `json` column of the
//! `messages` and `conversations` tables. Field names follow the client's
//! schema, which mixes `snake_case` (`sent_at`) and `camelCase` (`conversationId`).
//!
//! Table schema (relevant columns only):
//! ```sql
//! CREATE TABLE messages (
//!     id             TEXT PRIMARY KEY,
//!     json           TEXT,
//!     conversationId TEXT,
//!     sent_at        INTEGER,
//!     received_at    INTEGER,
//!     type           TEXT
//! );
//! CREATE TABLE conversations (
//!     id        TEXT PRIMARY KEY,
//!     json      TEXT,
//!     type      TEXT,
//!     e164      TEXT,
//!     serviceId TEXT   -- `uuid` before database version 88
//! );
//! CREATE TABLE items (id TEXT PRIMARY KEY, json TEXT);
//! ```

use serde::{Deserialize, Deserializer};

/// Content type of the attachment that carries the full text of a long message.
pub const LONG_TEXT_TYPE: &str = "text/x-signal-plain";

/// Timestamp recorded for a quote whose referenced message was not found.
pub const QUOTE_NOT_FOUND: i64 = -1;

/// The client writes `null` for empty lists in older rows.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Raw JSON payloads
// ---------------------------------------------------------------------------

/// The `quote` object embedded in a message or edit revision.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawQuote {
    #[serde(default, deserialize_with = "null_as_default")]
    pub attachments: Vec<RawQuoteAttachment>,

    /// Phone number of the author. Only set by old clients.
    #[serde(default)]
    pub author: Option<String>,

    /// Author ACI, written before database version 88.
    #[serde(default)]
    pub author_uuid: Option<String>,

    /// Author ACI.
    #[serde(default)]
    pub author_aci: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub body_ranges: Vec<RawBodyRange>,

    /// Sent timestamp of the quoted message. A JSON number in current rows, a
    /// numeric string in old ones, `null` when the client could not find the
    /// referenced message.
    #[serde(default)]
    pub id: Option<serde_json::Value>,

    #[serde(default)]
    pub text: Option<String>,
}

/// Which identifier a quote uses for its author.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorKey<'a> {
    Aci(&'a str),
    Phone(&'a str),
}

impl RawQuote {
    /// The first non-empty author field, in order of preference.
    pub fn author_key(&self) -> Option<AuthorKey<'_>> {
        [&self.author_aci, &self.author_uuid]
            .into_iter()
            .find_map(|field| field.as_deref().filter(|v| !v.is_empty()))
            .map(AuthorKey::Aci)
            .or_else(|| {
                self.author
                    .as_deref()
                    .filter(|v| !v.is_empty())
                    .map(AuthorKey::Phone)
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawQuoteAttachment {
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

/// A body range is either a mention or a style span. Only mentions carry an ACI.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBodyRange {
    #[serde(default, deserialize_with = "null_as_default")]
    pub start: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub length: u32,
    #[serde(default)]
    pub mention_aci: Option<String>,
    #[serde(default)]
    pub mention_uuid: Option<String>,
}

impl RawBodyRange {
    pub fn mention_key(&self) -> Option<&str> {
        self.mention_aci
            .as_deref()
            .or(self.mention_uuid.as_deref())
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAttachment {
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub size: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReaction {
    #[serde(default)]
    pub emoji: Option<String>,
    /// Conversation ID of the reacting recipient.
    #[serde(default)]
    pub from_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEdit {
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub body_ranges: Vec<RawBodyRange>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attachments: Vec<RawAttachment>,
    #[serde(default)]
    pub quote: Option<RawQuote>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawGroupChange {
    #[serde(default, deserialize_with = "null_as_default")]
    pub details: Vec<RawGroupChangeDetail>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawGroupChangeDetail {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub aci: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub inviter: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub count: u32,
    #[serde(default)]
    pub new_title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A full row of the `messages` table, as stored in its `json` column.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawMessage {
    #[serde(rename = "conversationId", default)]
    pub conversation_id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub sent_at: i64,
    /// Receive time in milliseconds. Older rows only have `received_at`.
    #[serde(default)]
    pub received_at_ms: Option<i64>,
    #[serde(default)]
    pub received_at: i64,
    /// Sender phone number (legacy).
    #[serde(default)]
    pub source: Option<String>,
    #[serde(rename = "sourceServiceId", default)]
    pub source_service_id: Option<String>,
    #[serde(rename = "sourceUuid", default)]
    pub source_uuid: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(rename = "bodyRanges", default, deserialize_with = "null_as_default")]
    pub body_ranges: Vec<RawBodyRange>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attachments: Vec<RawAttachment>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reactions: Vec<RawReaction>,
    #[serde(rename = "editHistory", default, deserialize_with = "null_as_default")]
    pub edit_history: Vec<RawEdit>,
    #[serde(rename = "groupV2Change", default)]
    pub group_v2_change: Option<RawGroupChange>,
    #[serde(default)]
    pub quote: Option<RawQuote>,
}

/// Only the quote of a message, for chain lookups that need nothing else.
#[derive(Debug, Default, Deserialize)]
pub struct QuoteEnvelope {
    #[serde(default)]
    pub quote: Option<RawQuote>,
}

/// A row of the `conversations` table.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawConversation {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub profile_name: Option<String>,
    #[serde(default)]
    pub profile_family_name: Option<String>,
    #[serde(default)]
    pub e164: Option<String>,
    #[serde(default)]
    pub service_id: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
}

// ---------------------------------------------------------------------------
// Recipients
// ---------------------------------------------------------------------------

/// A contact or group, as far as this crate needs to know it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipient {
    pub aci: Option<String>,
    pub phone: Option<String>,
    pub name: Option<String>,
    pub profile_name: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl Recipient {
    /// Placeholder for an ACI that has no conversation row.
    pub fn from_aci(aci: impl Into<String>) -> Self {
        Self {
            aci: Some(aci.into()),
            ..Self::default()
        }
    }

    /// Placeholder for a phone number that has no conversation row.
    pub fn from_phone(phone: impl Into<String>) -> Self {
        Self {
            phone: Some(phone.into()),
            ..Self::default()
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Human-readable name: contact name, profile name, phone number, ACI.
    /// A name is followed by the phone number when both are known.
    pub fn display_name(&self) -> String {
        let name = non_empty(&self.name).or(non_empty(&self.profile_name));
        match (name, non_empty(&self.phone)) {
            (Some(name), Some(phone)) => format!("{name} ({phone})"),
            (Some(name), None) => name.to_string(),
            (None, Some(phone)) => phone.to_string(),
            (None, None) => non_empty(&self.aci).unwrap_or("Unknown").to_string(),
        }
    }
}

impl From<RawConversation> for Recipient {
    fn from(conv: RawConversation) -> Self {
        let profile_name = match (
            non_empty(&conv.profile_name),
            non_empty(&conv.profile_family_name),
        ) {
            (Some(given), Some(family)) => Some(format!("{given} {family}")),
            (Some(given), None) => Some(given.to_string()),
            (None, Some(family)) => Some(family.to_string()),
            (None, None) => None,
        };
        Self {
            aci: conv.service_id.or(conv.uuid),
            phone: conv.e164,
            name: conv.name,
            profile_name,
        }
    }
}

// ---------------------------------------------------------------------------
// Resolved messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    pub start: u32,
    pub length: u32,
    pub recipient: Recipient,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageBody {
    pub text: String,
    pub mentions: Vec<Mention>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub size: i64,
}

impl From<&RawAttachment> for Attachment {
    fn from(raw: &RawAttachment) -> Self {
        Self {
            file_name: raw.file_name.clone().unwrap_or_default(),
            content_type: raw.content_type.clone().unwrap_or_default(),
            size: raw.size,
        }
    }
}

/// Attachment preview carried by a quote. Quotes never record a size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuoteAttachment {
    pub file_name: String,
    pub content_type: String,
}

/// A resolved quote, including one link of its chain: `quoted_quote` is the
/// quote held by the quoted message itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub recipient: Recipient,
    /// Sent timestamp of the quoted message, or [`QUOTE_NOT_FOUND`].
    pub time_sent: i64,
    pub body: MessageBody,
    pub attachments: Vec<QuoteAttachment>,
    pub quoted_quote: Option<Box<Quote>>,
}

impl Quote {
    /// Number of quotes in the chain starting at (and including) this one.
    pub fn chain_len(&self) -> usize {
        let mut len = 1;
        let mut link = self.quoted_quote.as_deref();
        while let Some(next) = link {
            len += 1;
            link = next.quoted_quote.as_deref();
        }
        len
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub emoji: String,
    pub recipient: Recipient,
}

/// A revision of an edited message. Its quote is kept raw and resolved at
/// export time, like the message's own quote.
#[derive(Debug, Clone, PartialEq)]
pub struct Edit {
    pub time_edit: i64,
    pub body: MessageBody,
    pub attachments: Vec<Attachment>,
    pub quote: Option<RawQuote>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupChange {
    /// Machine action code, e.g. `member-add`.
    pub kind: String,
    pub who: Option<Recipient>,
    pub inviter: Option<Recipient>,
    pub count: u32,
    pub new_title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub conversation: Recipient,
    /// `incoming`, `outgoing`, `group-v2-change`, ...
    pub kind: String,
    pub source: Option<Recipient>,
    pub time_sent: i64,
    pub time_recv: i64,
    pub body: MessageBody,
    pub attachments: Vec<Attachment>,
    pub reactions: Vec<Reaction>,
    pub edits: Vec<Edit>,
    pub group_changes: Vec<GroupChange>,
    pub quote: Option<RawQuote>,
}

impl Message {
    pub fn is_outgoing(&self) -> bool {
        self.kind == "outgoing"
    }
}
