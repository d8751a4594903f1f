//! # signal-chat-export
//!
//! Exports Signal Desktop conversations to structured JSON.
//!
//! ## What it does
//!
//! Signal Desktop keeps every message as a JSON document in an (encrypted)
//! SQLite database. Given a decrypted copy of that database, this crate loads
//! the messages of a conversation, resolves the people behind every identifier,
//! and writes one JSON document per conversation.
//!
//! The interesting part is quotes. A reply records a small preview of the
//! message it quotes, and that message may itself be a reply. The exporter
//! follows these quote chains back through the store (see [`quote`]), up to a
//! fixed depth, so cyclic or corrupt chains cannot stall an export.
//!
//! Edited messages are exported as their edit history: the live body and quote
//! appear only on messages that were never edited.
//!
//! The database is opened **read-only** and snapshotted first; your data is
//! never modified.
//!
//! ## Usage
//!
//! ```sh
//! # List conversations
//! signal-chat-export --db ~/signal-plain.sqlite --list
//!
//! # Export one conversation to a file
//! signal-chat-export --db ~/signal-plain.sqlite --conversation <ID> chat.json
//!
//! # Export every conversation into a directory
//! signal-chat-export --db ~/signal-plain.sqlite --all ~/signal-export
//! ```
//!
//! Preferences can be persisted in `~/.config/signal-chat-export/config.toml`.
pub mod error;
pub mod exporter;
pub mod model;
pub mod parallel;
pub mod quote;
pub mod renderer;
pub mod store;
pub mod utils;

use crate::error::Result;
use crate::exporter::{ExportOptions, Exporter};
use crate::store::SqliteStore;
use std::io::Write;

/// Export one conversation from `store` to `writer`. Returns the number of
/// messages written.
pub fn export_conversation<W: Write>(
    store: &SqliteStore,
    conversation_id: &str,
    options: ExportOptions,
    writer: &mut W,
) -> Result<usize> {
    let messages = store.load_conversation(conversation_id)?;
    let model = Exporter::new(store, store, options).export(&messages)?;
    renderer::write_json(writer, &model)?;
    Ok(model.messages.len())
}
