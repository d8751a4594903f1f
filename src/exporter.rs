use crate::error::{ExportError, Result};
use crate::model::{Attachment, Message, Quote};
use crate::quote::QuoteResolver;
use crate::store::{MessageStore, RecipientDirectory};
use crate::utils::{DEFAULT_SELF_LABEL, format_time};
use serde::Serialize;
use tracing::warn;

// ---------------------------------------------------------------------------
// Export model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportModel {
    pub conversation: String,
    pub messages: Vec<MessageRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MessageRecord {
    pub from: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub sent: String,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub sent_unix: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub received: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub body: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<AttachmentRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reactions: Vec<ReactionRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<QuoteRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub edits: Vec<EditRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub group_changes: Vec<GroupChangeRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttachmentRecord {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub filename: String,
    pub content_type: String,
    pub size: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteAttachmentRecord {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub filename: String,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReactionRecord {
    pub emoji: String,
    pub from: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteRecord {
    pub from: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub sent: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub body: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<QuoteAttachmentRecord>,
    /// The quote held by the quoted message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<Box<QuoteRecord>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditRecord {
    pub version: usize,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub sent: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub body: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<AttachmentRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<QuoteRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupChangeRecord {
    pub action: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub who: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub invited_by: String,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub count: u32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub new_title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

fn is_zero_i64(v: &i64) -> bool {
    *v == 0
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Used for outgoing messages when the store does not name its owner.
    pub self_label: String,
    pub utc: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            self_label: DEFAULT_SELF_LABEL.to_string(),
            utc: false,
        }
    }
}

pub struct Exporter<'a> {
    resolver: QuoteResolver<'a>,
    recipients: &'a dyn RecipientDirectory,
    options: ExportOptions,
}

impl<'a> Exporter<'a> {
    pub fn new(
        store: &'a dyn MessageStore,
        recipients: &'a dyn RecipientDirectory,
        options: ExportOptions,
    ) -> Self {
        Self {
            resolver: QuoteResolver::new(store, recipients),
            recipients,
            options,
        }
    }

    /// Build the export model for one conversation. All messages must belong to
    /// the same conversation.
    pub fn export(&self, messages: &[Message]) -> Result<ExportModel> {
        let first = messages.first().ok_or(ExportError::EmptyConversation)?;

        let self_name = match self.recipients.self_recipient() {
            Ok(Some(me)) => me.display_name(),
            Ok(None) => self.options.self_label.clone(),
            Err(e) => {
                warn!("Cannot look up own recipient, using {:?}: {e}", self.options.self_label);
                self.options.self_label.clone()
            }
        };

        let records = messages
            .iter()
            .map(|msg| self.message_record(msg, &self_name))
            .collect::<Result<Vec<_>>>()?;

        Ok(ExportModel {
            conversation: first.conversation.display_name(),
            messages: records,
        })
    }

    fn message_record(&self, msg: &Message, self_name: &str) -> Result<MessageRecord> {
        let utc = self.options.utc;
        let mut rec = MessageRecord {
            kind: msg.kind.clone(),
            ..MessageRecord::default()
        };

        if msg.is_outgoing() {
            rec.from = self_name.to_string();
        } else if let Some(source) = &msg.source {
            rec.from = source.display_name();
        }

        if msg.time_sent != 0 {
            rec.sent = format_time(msg.time_sent, utc);
            rec.sent_unix = msg.time_sent;
        }
        if !msg.is_outgoing() && msg.time_recv != 0 {
            rec.received = format_time(msg.time_recv, utc);
        }

        // An edited message lives entirely in its edit history.
        if msg.edits.is_empty() {
            rec.body = msg.body.text.clone();
            rec.quote = self
                .resolver
                .resolve(msg.quote.as_ref())?
                .map(|q| quote_record(&q, utc));
        }

        rec.attachments = attachment_records(&msg.attachments);

        rec.reactions = msg
            .reactions
            .iter()
            .map(|rct| ReactionRecord {
                emoji: rct.emoji.clone(),
                from: rct.recipient.display_name(),
            })
            .collect();

        let n = msg.edits.len();
        rec.edits = msg
            .edits
            .iter()
            .enumerate()
            .map(|(i, edit)| -> Result<EditRecord> {
                Ok(EditRecord {
                    version: n - i,
                    sent: format_time(edit.time_edit, utc),
                    body: edit.body.text.clone(),
                    attachments: attachment_records(&edit.attachments),
                    quote: self
                        .resolver
                        .resolve(edit.quote.as_ref())?
                        .map(|q| quote_record(&q, utc)),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        rec.group_changes = msg
            .group_changes
            .iter()
            .map(|gc| GroupChangeRecord {
                action: group_change_action(&gc.kind).to_string(),
                who: gc.who.as_ref().map(|r| r.display_name()).unwrap_or_default(),
                invited_by: gc
                    .inviter
                    .as_ref()
                    .map(|r| r.display_name())
                    .unwrap_or_default(),
                count: gc.count,
                new_title: gc.new_title.clone(),
                description: gc.description.clone(),
            })
            .collect();

        Ok(rec)
    }
}

fn attachment_records(atts: &[Attachment]) -> Vec<AttachmentRecord> {
    atts.iter()
        .map(|att| AttachmentRecord {
            filename: att.file_name.clone(),
            content_type: att.content_type.clone(),
            size: att.size,
        })
        .collect()
}

fn quote_record(qte: &Quote, utc: bool) -> QuoteRecord {
    QuoteRecord {
        from: qte.recipient.display_name(),
        sent: format_time(qte.time_sent, utc),
        body: qte.body.text.clone(),
        attachments: qte
            .attachments
            .iter()
            .map(|att| QuoteAttachmentRecord {
                filename: att.file_name.clone(),
                content_type: att.content_type.clone(),
            })
            .collect(),
        quote: qte
            .quoted_quote
            .as_deref()
            .map(|q| Box::new(quote_record(q, utc))),
    }
}

/// Display label for a group change action code. Unknown codes pass through.
pub fn group_change_action(kind: &str) -> &str {
    match kind {
        "member-add" => "Member added",
        "member-remove" => "Member removed",
        "member-add-from-invite" => "Member joined from invite",
        "member-add-from-link" => "Member joined via link",
        "pending-add-many" => "Invitations sent",
        "admin-approval-add-one" => "Requested to join",
        "title" => "Title changed",
        "description" => "Description changed",
        "avatar" => "Avatar changed",
        "access-attributes" => "Group settings changed",
        "announcements-only" => "Announcements only mode changed",
        "access-members" => "Member access changed",
        "member-privilege" => "Member privilege changed",
        other => other,
    }
}
