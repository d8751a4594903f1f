use crate::error::{ExportError, Result};
use crate::model::{
    Attachment, Edit, GroupChange, Mention, Message, MessageBody, RawBodyRange, RawConversation,
    RawMessage, Reaction, Recipient,
};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

/// Point lookups into the message table.
pub trait MessageStore {
    /// The raw JSON of the first message sent at exactly `sent_at`.
    fn message_json_by_sent_at(&self, sent_at: i64) -> Result<Option<String>>;
}

/// Maps the identifiers found in message payloads to recipients.
///
/// Identifier lookups never fail on an unknown identifier; they return a
/// placeholder recipient named after the identifier instead.
pub trait RecipientDirectory {
    fn recipient_from_aci(&self, aci: &str) -> Result<Recipient>;
    fn recipient_from_phone(&self, phone: &str) -> Result<Recipient>;
    fn recipient_from_conversation_id(&self, id: &str) -> Result<Option<Recipient>>;
    /// The account owner, if the store records one.
    fn self_recipient(&self) -> Result<Option<Recipient>>;
}

/// Resolve the mention ranges of a body. Style ranges are dropped.
pub fn resolve_mentions(
    recipients: &dyn RecipientDirectory,
    ranges: &[RawBodyRange],
) -> Result<Vec<Mention>> {
    ranges
        .iter()
        .filter_map(|range| range.mention_key().map(|aci| (range, aci)))
        .map(|(range, aci)| {
            Ok(Mention {
                start: range.start,
                length: range.length,
                recipient: recipients.recipient_from_aci(aci)?,
            })
        })
        .collect()
}

/// A decrypted Signal Desktop database.
pub struct SqliteStore {
    conn: Connection,
    /// `serviceId` since database version 88, `uuid` before.
    aci_column: &'static str,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch("PRAGMA cache_size = -16384;")?;
        Self::from_connection(conn)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        let has_service_id = {
            let mut stmt = conn.prepare("SELECT name FROM pragma_table_info('conversations')")?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            names.iter().any(|n| n == "serviceId")
        };
        Ok(Self {
            conn,
            aci_column: if has_service_id { "serviceId" } else { "uuid" },
        })
    }

    fn conversation_where(&self, column: &str, value: &str) -> Result<Option<Recipient>> {
        let sql = format!("SELECT json FROM conversations WHERE {column} = ? LIMIT 1");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let json: Option<Option<String>> = stmt.query_row([value], |row| row.get(0)).optional()?;
        match json.flatten() {
            Some(json) => {
                let conv: RawConversation = serde_json::from_str(&json)?;
                Ok(Some(conv.into()))
            }
            None => Ok(None),
        }
    }

    /// Conversations that hold at least one message, most recently active first.
    pub fn conversations(&self) -> Result<Vec<(String, Recipient)>> {
        let mut stmt = self.conn.prepare(
            "SELECT json FROM conversations \
             WHERE id IN (SELECT DISTINCT conversationId FROM messages) \
             ORDER BY active_at DESC",
        )?;
        let rows = stmt
            .query_map([], |row| row.get::<_, Option<String>>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for json in rows.into_iter().flatten() {
            match serde_json::from_str::<RawConversation>(&json) {
                Ok(conv) => {
                    let id = conv.id.clone();
                    out.push((id, conv.into()));
                }
                Err(e) => warn!("Skipping unreadable conversation row: {e}"),
            }
        }
        Ok(out)
    }

    /// Load every message of a conversation in display order.
    pub fn load_conversation(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let conversation = self
            .recipient_from_conversation_id(conversation_id)?
            .ok_or_else(|| ExportError::UnknownConversation(conversation_id.to_string()))?;

        let mut stmt = self.conn.prepare(
            "SELECT json FROM messages WHERE conversationId = ? \
             ORDER BY received_at, sent_at",
        )?;
        let rows = stmt
            .query_map([conversation_id], |row| row.get::<_, Option<String>>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut messages = Vec::with_capacity(rows.len());
        for json in rows.into_iter().flatten() {
            let raw: RawMessage = match serde_json::from_str(&json) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Skipping unreadable message in {conversation_id}: {e}");
                    continue;
                }
            };
            messages.push(self.message_from_raw(raw, &conversation)?);
        }
        debug!("Loaded {} messages from {conversation_id}", messages.len());
        Ok(messages)
    }

    fn message_from_raw(&self, raw: RawMessage, conversation: &Recipient) -> Result<Message> {
        let kind = raw.kind.unwrap_or_default();

        let source = if kind == "outgoing" {
            None
        } else if let Some(aci) = raw
            .source_service_id
            .as_deref()
            .or(raw.source_uuid.as_deref())
            .filter(|v| !v.is_empty())
        {
            Some(self.recipient_from_aci(aci)?)
        } else if let Some(phone) = raw.source.as_deref().filter(|v| !v.is_empty()) {
            Some(self.recipient_from_phone(phone)?)
        } else {
            None
        };

        let body = MessageBody {
            text: raw.body.unwrap_or_default(),
            mentions: resolve_mentions(self, &raw.body_ranges)?,
        };

        let mut reactions = Vec::with_capacity(raw.reactions.len());
        for rct in &raw.reactions {
            let recipient = match rct.from_id.as_deref() {
                Some(id) => self.recipient_from_conversation_id(id)?.unwrap_or_default(),
                None => Recipient::default(),
            };
            reactions.push(Reaction {
                emoji: rct.emoji.clone().unwrap_or_default(),
                recipient,
            });
        }

        let mut edits = Vec::with_capacity(raw.edit_history.len());
        for edit in raw.edit_history {
            edits.push(Edit {
                time_edit: edit.timestamp,
                body: MessageBody {
                    text: edit.body.unwrap_or_default(),
                    mentions: resolve_mentions(self, &edit.body_ranges)?,
                },
                attachments: edit.attachments.iter().map(Attachment::from).collect(),
                quote: edit.quote,
            });
        }

        let mut group_changes = Vec::new();
        for detail in raw.group_v2_change.map(|c| c.details).unwrap_or_default() {
            let who = match detail.aci.as_deref().or(detail.uuid.as_deref()) {
                Some(aci) if !aci.is_empty() => Some(self.recipient_from_aci(aci)?),
                _ => None,
            };
            let inviter = match detail.inviter.as_deref() {
                Some(aci) if !aci.is_empty() => Some(self.recipient_from_aci(aci)?),
                _ => None,
            };
            group_changes.push(GroupChange {
                kind: detail.kind,
                who,
                inviter,
                count: detail.count,
                new_title: detail.new_title.unwrap_or_default(),
                description: detail.description.unwrap_or_default(),
            });
        }

        Ok(Message {
            conversation: conversation.clone(),
            kind,
            source,
            time_sent: raw.sent_at,
            time_recv: raw.received_at_ms.unwrap_or(raw.received_at),
            body,
            attachments: raw.attachments.iter().map(Attachment::from).collect(),
            reactions,
            edits,
            group_changes,
            quote: raw.quote,
        })
    }
}

impl MessageStore for SqliteStore {
    fn message_json_by_sent_at(&self, sent_at: i64) -> Result<Option<String>> {
        // The statement is finalized when it drops, on every path out of here.
        let mut stmt = self
            .conn
            .prepare("SELECT json FROM messages WHERE sent_at = ? LIMIT 1")?;
        let json: Option<Option<String>> =
            stmt.query_row([sent_at], |row| row.get(0)).optional()?;
        Ok(json.flatten().filter(|j| !j.is_empty()))
    }
}

impl RecipientDirectory for SqliteStore {
    fn recipient_from_aci(&self, aci: &str) -> Result<Recipient> {
        Ok(self
            .conversation_where(self.aci_column, aci)?
            .unwrap_or_else(|| Recipient::from_aci(aci)))
    }

    fn recipient_from_phone(&self, phone: &str) -> Result<Recipient> {
        Ok(self
            .conversation_where("e164", phone)?
            .unwrap_or_else(|| Recipient::from_phone(phone)))
    }

    fn recipient_from_conversation_id(&self, id: &str) -> Result<Option<Recipient>> {
        self.conversation_where("id", id)
    }

    fn self_recipient(&self) -> Result<Option<Recipient>> {
        #[derive(Deserialize)]
        struct Item {
            value: String,
        }

        let json: Option<Option<String>> = self
            .conn
            .query_row("SELECT json FROM items WHERE id = 'uuid_id'", [], |row| {
                row.get(0)
            })
            .optional()?;
        let Some(json) = json.flatten() else {
            return Ok(None);
        };
        let item: Item = serde_json::from_str(&json)?;
        // Stored as "<aci>.<device id>"
        let aci = item.value.split('.').next().unwrap_or_default();
        if aci.is_empty() {
            return Ok(None);
        }
        self.conversation_where(self.aci_column, aci)
    }
}
