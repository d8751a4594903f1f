#![allow(dead_code)]

use signal_chat_export::error::{ExportError, Result};
use signal_chat_export::model::{Message, MessageBody, RawQuote, Recipient};
use signal_chat_export::store::{MessageStore, RecipientDirectory};
use std::cell::Cell;
use std::collections::HashMap;

/// Message store backed by a map of sent timestamp to message JSON.
#[derive(Default)]
pub struct FakeStore {
    pub by_sent_at: HashMap<i64, String>,
    pub failing: Vec<i64>,
    pub lookups: Cell<usize>,
}

impl FakeStore {
    pub fn with(mut self, sent_at: i64, json: &str) -> Self {
        self.by_sent_at.insert(sent_at, json.to_string());
        self
    }
}

impl MessageStore for FakeStore {
    fn message_json_by_sent_at(&self, sent_at: i64) -> Result<Option<String>> {
        self.lookups.set(self.lookups.get() + 1);
        if self.failing.contains(&sent_at) {
            return Err(ExportError::Io(std::io::Error::other("cursor failed")));
        }
        Ok(self.by_sent_at.get(&sent_at).cloned())
    }
}

#[derive(Default)]
pub struct FakeDirectory {
    pub by_aci: HashMap<String, Recipient>,
    pub by_phone: HashMap<String, Recipient>,
    pub me: Option<Recipient>,
    pub self_lookup_fails: bool,
}

impl FakeDirectory {
    pub fn new() -> Self {
        let mut dir = Self::default();
        dir.add("aci-alice", "+1555", "Alice");
        dir.add("aci-bob", "+1666", "Bob");
        dir
    }

    pub fn add(&mut self, aci: &str, phone: &str, name: &str) {
        let rcp = Recipient {
            aci: Some(aci.into()),
            phone: Some(phone.into()),
            name: Some(name.into()),
            profile_name: None,
        };
        self.by_aci.insert(aci.into(), rcp.clone());
        self.by_phone.insert(phone.into(), rcp);
    }
}

impl RecipientDirectory for FakeDirectory {
    fn recipient_from_aci(&self, aci: &str) -> Result<Recipient> {
        Ok(self
            .by_aci
            .get(aci)
            .cloned()
            .unwrap_or_else(|| Recipient::from_aci(aci)))
    }

    fn recipient_from_phone(&self, phone: &str) -> Result<Recipient> {
        Ok(self
            .by_phone
            .get(phone)
            .cloned()
            .unwrap_or_else(|| Recipient::from_phone(phone)))
    }

    fn recipient_from_conversation_id(&self, _id: &str) -> Result<Option<Recipient>> {
        Ok(None)
    }

    fn self_recipient(&self) -> Result<Option<Recipient>> {
        if self.self_lookup_fails {
            return Err(ExportError::Io(std::io::Error::other("no items table")));
        }
        Ok(self.me.clone())
    }
}

pub fn raw_quote(json: &str) -> RawQuote {
    serde_json::from_str(json).unwrap()
}

pub fn message(kind: &str, body: &str, sent_at: i64) -> Message {
    Message {
        conversation: Recipient::named("Family"),
        kind: kind.into(),
        source: None,
        time_sent: sent_at,
        time_recv: 0,
        body: MessageBody {
            text: body.into(),
            mentions: vec![],
        },
        attachments: vec![],
        reactions: vec![],
        edits: vec![],
        group_changes: vec![],
        quote: None,
    }
}
