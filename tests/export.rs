mod common;

use common::{FakeDirectory, FakeStore, message, raw_quote};
use pretty_assertions::assert_eq;
use rusqlite::Connection;
use serde_json::json;
use signal_chat_export::error::ExportError;
use signal_chat_export::export_conversation;
use signal_chat_export::exporter::{ExportOptions, Exporter};
use signal_chat_export::model::{
    Attachment, Edit, GroupChange, MessageBody, Reaction, Recipient,
};
use signal_chat_export::store::SqliteStore;

fn utc_options() -> ExportOptions {
    ExportOptions {
        utc: true,
        ..ExportOptions::default()
    }
}

fn edit(text: &str, at: i64) -> Edit {
    Edit {
        time_edit: at,
        body: MessageBody {
            text: text.into(),
            mentions: vec![],
        },
        attachments: vec![],
        quote: None,
    }
}

#[test]
fn outgoing_message_uses_self_label() {
    let store = FakeStore::default();
    let dir = FakeDirectory::new();
    let exporter = Exporter::new(&store, &dir, utc_options());

    let model = exporter.export(&[message("outgoing", "hi", 1000)]).unwrap();
    assert_eq!(
        serde_json::to_value(&model).unwrap(),
        json!({
            "conversation": "Family",
            "messages": [{
                "from": "You",
                "type": "outgoing",
                "sent": "1970-01-01 00:00:01",
                "sent_unix": 1000,
                "body": "hi"
            }]
        })
    );
}

#[test]
fn self_label_comes_from_store_when_known() {
    let store = FakeStore::default();
    let mut dir = FakeDirectory::new();
    dir.me = Some(Recipient::named("Carol"));
    let exporter = Exporter::new(&store, &dir, utc_options());

    let model = exporter.export(&[message("outgoing", "hi", 1000)]).unwrap();
    assert_eq!(model.messages[0].from, "Carol");
}

#[test]
fn self_lookup_failure_falls_back_to_configured_label() {
    let store = FakeStore::default();
    let mut dir = FakeDirectory::new();
    dir.self_lookup_fails = true;
    let options = ExportOptions {
        self_label: "Me".into(),
        utc: true,
    };
    let exporter = Exporter::new(&store, &dir, options);

    let model = exporter.export(&[message("outgoing", "hi", 1000)]).unwrap();
    assert_eq!(model.messages[0].from, "Me");
}

#[test]
fn incoming_sender_and_received_time() {
    let store = FakeStore::default();
    let dir = FakeDirectory::new();
    let exporter = Exporter::new(&store, &dir, utc_options());

    let mut incoming = message("incoming", "yo", 1000);
    incoming.source = dir.by_aci.get("aci-alice").cloned();
    incoming.time_recv = 2000;
    let mut outgoing = message("outgoing", "back", 3000);
    outgoing.time_recv = 3500;
    let mut unknown = message("incoming", "?", 0);
    unknown.time_recv = 0;

    let model = exporter.export(&[incoming, outgoing, unknown]).unwrap();
    assert_eq!(model.messages[0].from, "Alice (+1555)");
    assert_eq!(model.messages[0].received, "1970-01-01 00:00:02");
    assert_eq!(model.messages[1].received, "");
    assert_eq!(model.messages[2].from, "");
    assert_eq!(model.messages[2].sent, "");
    assert_eq!(model.messages[2].sent_unix, 0);
}

#[test]
fn unedited_message_carries_body_and_quote() {
    let store = FakeStore::default();
    let dir = FakeDirectory::new();
    let exporter = Exporter::new(&store, &dir, utc_options());

    let mut msg = message("incoming", "reply", 1000);
    msg.quote = Some(raw_quote(r#"{"authorAci": "aci-bob", "id": 500, "text": "orig"}"#));

    let model = exporter.export(&[msg]).unwrap();
    let value = serde_json::to_value(&model.messages[0]).unwrap();
    assert_eq!(value["body"], json!("reply"));
    assert_eq!(
        value["quote"],
        json!({"from": "Bob (+1666)", "sent": "1970-01-01 00:00:00", "body": "orig"})
    );
}

#[test]
fn edited_message_lives_in_its_edits() {
    let store = FakeStore::default();
    let dir = FakeDirectory::new();
    let exporter = Exporter::new(&store, &dir, utc_options());

    let mut msg = message("outgoing", "third", 1000);
    msg.quote = Some(raw_quote(r#"{"authorAci": "aci-bob", "id": null, "text": "q"}"#));
    let mut newest = edit("third", 3000);
    newest.quote = msg.quote.clone();
    newest.attachments = vec![Attachment {
        file_name: "a.png".into(),
        content_type: "image/png".into(),
        size: 42,
    }];
    msg.edits = vec![newest, edit("second", 2000), edit("first", 1000)];

    let model = exporter.export(&[msg]).unwrap();
    let rec = &model.messages[0];
    assert_eq!(rec.body, "");
    assert!(rec.quote.is_none());

    let versions: Vec<_> = rec.edits.iter().map(|e| (e.version, e.body.as_str())).collect();
    assert_eq!(versions, vec![(3, "third"), (2, "second"), (1, "first")]);

    let value = serde_json::to_value(&rec.edits[0]).unwrap();
    assert_eq!(
        value,
        json!({
            "version": 3,
            "sent": "1970-01-01 00:00:03",
            "body": "third",
            "attachments": [{"filename": "a.png", "content_type": "image/png", "size": 42}],
            "quote": {"from": "Bob (+1666)", "body": "q"}
        })
    );
}

#[test]
fn reactions_keep_their_order() {
    let store = FakeStore::default();
    let dir = FakeDirectory::new();
    let exporter = Exporter::new(&store, &dir, utc_options());

    let mut msg = message("incoming", "nice", 1000);
    msg.reactions = vec![
        Reaction {
            emoji: "❤️".into(),
            recipient: Recipient::named("Bob"),
        },
        Reaction {
            emoji: "👍".into(),
            recipient: Recipient::from_phone("+1777"),
        },
    ];

    let model = exporter.export(&[msg]).unwrap();
    let value = serde_json::to_value(&model.messages[0].reactions).unwrap();
    assert_eq!(
        value,
        json!([{"emoji": "❤️", "from": "Bob"}, {"emoji": "👍", "from": "+1777"}])
    );
}

#[test]
fn group_changes_map_actions_and_omit_zero_count() {
    let store = FakeStore::default();
    let dir = FakeDirectory::new();
    let exporter = Exporter::new(&store, &dir, utc_options());

    let mut msg = message("group-v2-change", "", 1000);
    msg.group_changes = vec![
        GroupChange {
            kind: "member-add".into(),
            who: Some(Recipient::named("Bob")),
            inviter: Some(Recipient::named("Alice")),
            ..GroupChange::default()
        },
        GroupChange {
            kind: "pending-add-many".into(),
            count: 4,
            ..GroupChange::default()
        },
        GroupChange {
            kind: "title".into(),
            new_title: "Book club".into(),
            ..GroupChange::default()
        },
        GroupChange {
            kind: "brand-new-action".into(),
            ..GroupChange::default()
        },
    ];

    let model = exporter.export(&[msg]).unwrap();
    let value = serde_json::to_value(&model.messages[0].group_changes).unwrap();
    assert_eq!(
        value,
        json!([
            {"action": "Member added", "who": "Bob", "invited_by": "Alice"},
            {"action": "Invitations sent", "count": 4},
            {"action": "Title changed", "new_title": "Book club"},
            {"action": "brand-new-action"}
        ])
    );
}

#[test]
fn quote_without_author_fails_the_export() {
    let store = FakeStore::default();
    let dir = FakeDirectory::new();
    let exporter = Exporter::new(&store, &dir, utc_options());

    let mut msg = message("incoming", "reply", 1000);
    msg.quote = Some(raw_quote(r#"{"id": 500, "text": "orig"}"#));
    assert!(matches!(
        exporter.export(&[msg]),
        Err(ExportError::QuoteWithoutAuthor)
    ));

    let mut edited = message("incoming", "reply", 1000);
    let mut rev = edit("reply", 1000);
    rev.quote = Some(raw_quote(r#"{"id": 500}"#));
    edited.edits = vec![rev];
    assert!(matches!(
        exporter.export(&[edited]),
        Err(ExportError::QuoteWithoutAuthor)
    ));
}

#[test]
fn empty_conversation_is_rejected() {
    let store = FakeStore::default();
    let dir = FakeDirectory::new();
    let exporter = Exporter::new(&store, &dir, utc_options());
    assert!(matches!(
        exporter.export(&[]),
        Err(ExportError::EmptyConversation)
    ));
}

#[test]
fn exports_from_sqlite_end_to_end() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        r#"
        CREATE TABLE conversations (
            id TEXT PRIMARY KEY, json TEXT, active_at INTEGER, type TEXT,
            e164 TEXT, serviceId TEXT
        );
        CREATE TABLE messages (
            id TEXT PRIMARY KEY, json TEXT, conversationId TEXT,
            sent_at INTEGER, received_at INTEGER, type TEXT
        );
        CREATE TABLE items (id TEXT PRIMARY KEY, json TEXT);
        INSERT INTO conversations VALUES
          ('c-bob', '{"id":"c-bob","type":"private","name":"Bob","serviceId":"aci-bob"}', 1, 'private', NULL, 'aci-bob');
        INSERT INTO messages VALUES
          ('m1', '{"conversationId":"c-bob","type":"incoming","sent_at":1000,"received_at_ms":1500,"sourceServiceId":"aci-bob","body":"first","attachments":[{"contentType":"image/jpeg","fileName":"x.jpg","size":10}]}', 'c-bob', 1000, 1, 'incoming'),
          ('m2', '{"conversationId":"c-bob","type":"outgoing","sent_at":2000,"body":"second","quote":{"id":1000,"authorAci":"aci-bob","text":"first"}}', 'c-bob', 2000, 2, 'outgoing'),
          ('m3', '{"conversationId":"c-bob","type":"incoming","sent_at":3000,"sourceServiceId":"aci-bob","body":"third","quote":{"id":"2000","authorUuid":"aci-me","text":"second"}}', 'c-bob', 3000, 3, 'incoming');
        "#,
    )
    .unwrap();
    let store = SqliteStore::from_connection(conn).unwrap();

    let mut out = Vec::new();
    let n = export_conversation(&store, "c-bob", utc_options(), &mut out).unwrap();
    assert_eq!(n, 3);

    let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(
        value,
        json!({
            "conversation": "Bob",
            "messages": [
                {
                    "from": "Bob",
                    "type": "incoming",
                    "sent": "1970-01-01 00:00:01",
                    "sent_unix": 1000,
                    "received": "1970-01-01 00:00:01",
                    "body": "first",
                    "attachments": [{"filename": "x.jpg", "content_type": "image/jpeg", "size": 10}]
                },
                {
                    "from": "You",
                    "type": "outgoing",
                    "sent": "1970-01-01 00:00:02",
                    "sent_unix": 2000,
                    "body": "second",
                    "quote": {"from": "Bob", "sent": "1970-01-01 00:00:01", "body": "first"}
                },
                {
                    "from": "Bob",
                    "type": "incoming",
                    "sent": "1970-01-01 00:00:03",
                    "sent_unix": 3000,
                    "body": "third",
                    "quote": {
                        "from": "aci-me",
                        "sent": "1970-01-01 00:00:02",
                        "body": "second",
                        "quote": {"from": "Bob", "sent": "1970-01-01 00:00:01", "body": "first"}
                    }
                }
            ]
        })
    );
    assert!(out.ends_with(b"}\n"));
}
