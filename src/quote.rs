use crate::error::{ExportError, Result};
use crate::model::{
    AuthorKey, LONG_TEXT_TYPE, MessageBody, QUOTE_NOT_FOUND, Quote, QuoteAttachment, QuoteEnvelope,
    RawQuote,
};
use crate::store::{MessageStore, RecipientDirectory, resolve_mentions};
use serde_json::Value;
use tracing::debug;

/// Maximum number of quotes followed along one chain. Stored chains may be
/// cyclic (A quotes B, B quotes A), so this is what terminates the walk.
pub const MAX_QUOTE_DEPTH: usize = 10;

/// Turns raw quote payloads into [`Quote`]s, following each quote chain back
/// through the message store.
pub struct QuoteResolver<'a> {
    store: &'a dyn MessageStore,
    recipients: &'a dyn RecipientDirectory,
}

impl<'a> QuoteResolver<'a> {
    pub fn new(store: &'a dyn MessageStore, recipients: &'a dyn RecipientDirectory) -> Self {
        Self { store, recipients }
    }

    pub fn resolve(&self, raw: Option<&RawQuote>) -> Result<Option<Quote>> {
        self.resolve_at_depth(raw, 0)
    }

    /// Fails only when the quote has no author or a malformed `id`. Anything
    /// that goes wrong while following the chain just cuts the chain short.
    pub fn resolve_at_depth(&self, raw: Option<&RawQuote>, depth: usize) -> Result<Option<Quote>> {
        let Some(raw) = raw else {
            return Ok(None);
        };
        if depth >= MAX_QUOTE_DEPTH {
            debug!("Quote chain cut at depth {depth}");
            return Ok(None);
        }

        // A quote without an author is invalid whatever its other fields hold.
        let recipient = match raw.author_key() {
            Some(AuthorKey::Aci(aci)) => self.recipients.recipient_from_aci(aci)?,
            Some(AuthorKey::Phone(phone)) => self.recipients.recipient_from_phone(phone)?,
            None => return Err(ExportError::QuoteWithoutAuthor),
        };

        let time_sent = parse_quote_id(raw.id.as_ref())?;

        let body = MessageBody {
            text: raw.text.clone().unwrap_or_default(),
            mentions: resolve_mentions(self.recipients, &raw.body_ranges)?,
        };

        let attachments = raw
            .attachments
            .iter()
            .filter(|att| att.content_type.as_deref() != Some(LONG_TEXT_TYPE))
            .map(|att| QuoteAttachment {
                file_name: att.file_name.clone().unwrap_or_default(),
                content_type: att.content_type.clone().unwrap_or_default(),
            })
            .collect();

        let quoted_quote = if time_sent > 0 {
            match self.quote_of_message(time_sent, depth + 1) {
                Ok(q) => q.map(Box::new),
                Err(e) => {
                    debug!("Dropping quote chain at {time_sent}: {e}");
                    None
                }
            }
        } else {
            None
        };

        Ok(Some(Quote {
            recipient,
            time_sent,
            body,
            attachments,
            quoted_quote,
        }))
    }

    /// The resolved quote held by the message sent at `sent_at`, if any.
    fn quote_of_message(&self, sent_at: i64, depth: usize) -> Result<Option<Quote>> {
        let Some(json) = self.store.message_json_by_sent_at(sent_at)? else {
            return Ok(None);
        };
        let envelope: QuoteEnvelope = match serde_json::from_str(&json) {
            Ok(env) => env,
            Err(e) => {
                debug!("Ignoring unreadable message at {sent_at}: {e}");
                return Ok(None);
            }
        };
        self.resolve_at_depth(envelope.quote.as_ref(), depth)
    }
}

/// The quote `id` is the quoted message's sent timestamp. It is `null` when the
/// client could not find that message.
fn parse_quote_id(id: Option<&Value>) -> Result<i64> {
    match id {
        None | Some(Value::Null) => Ok(QUOTE_NOT_FOUND),
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| ExportError::InvalidQuoteId(n.to_string())),
        Some(Value::String(s)) => s
            .parse()
            .map_err(|_| ExportError::InvalidQuoteId(s.clone())),
        Some(other) => Err(ExportError::InvalidQuoteId(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quote_id_forms() {
        assert_eq!(parse_quote_id(None).unwrap(), QUOTE_NOT_FOUND);
        assert_eq!(parse_quote_id(Some(&Value::Null)).unwrap(), QUOTE_NOT_FOUND);
        assert_eq!(parse_quote_id(Some(&json!(1234))).unwrap(), 1234);
        assert_eq!(parse_quote_id(Some(&json!("1234"))).unwrap(), 1234);
    }

    #[test]
    fn malformed_quote_id_is_an_error() {
        for bad in [
            json!("12ab"),
            json!(" 123 "),
            json!(""),
            json!(1.5),
            json!(true),
            json!([1]),
        ] {
            assert!(matches!(
                parse_quote_id(Some(&bad)),
                Err(ExportError::InvalidQuoteId(_))
            ));
        }
    }
}
