//! Fixture databases laid out like a real WeChat profile:
//! `Msg/Multi/MSG.db` and `Msg/MicroMsg.db`.
#![allow(dead_code)]

use std::path::PathBuf;

use rusqlite::{Connection, params};
use tempfile::TempDir;

pub const GROUP: &str = "12345678@chatroom";
pub const FRIEND: &str = "wxid_friend";

/// 2024-10-01 09:00:00 UTC
pub const T0: i64 = 1_727_773_200;

pub struct Fixture {
    pub dir: TempDir,
    pub msg_db: PathBuf,
    pub contacts_db: PathBuf,
}

pub const QUOTE_XML: &str = r#"<?xml version="1.0"?>
<msg>
    <appmsg appid="" sdkver="0">
        <title>ok!</title>
        <type>57</type>
        <refermsg>
            <type>1</type>
            <fromusr>12345678@chatroom</fromusr>
            <chatusr>wxid_bob</chatusr>
            <displayname></displayname>
            <content>hello</content>
        </refermsg>
    </appmsg>
</msg>"#;

/// `BytesExtra` with a header entry, a message-source attribute and the sender.
pub fn bytes_extra(sender: &str) -> Vec<u8> {
    let mut blob = vec![0x0a, 0x04, 0x08, 0x10, 0x10, 0x00];
    for (kind, value) in [(7u8, "<msgsource />".as_bytes()), (1u8, sender.as_bytes())] {
        let mut inner = vec![0x08, kind, 0x12, value.len() as u8];
        inner.extend_from_slice(value);
        blob.push(0x1a);
        blob.push(inner.len() as u8);
        blob.extend(inner);
    }
    blob
}

struct Row {
    time: i64,
    talker: &'static str,
    kind: i64,
    sub_type: i64,
    is_sender: bool,
    content: Option<&'static str>,
    extra: Option<Vec<u8>>,
    compressed: Option<Vec<u8>>,
}

fn text(time: i64, talker: &'static str, sender: Option<&str>, content: &'static str) -> Row {
    Row {
        time,
        talker,
        kind: 1,
        sub_type: 0,
        is_sender: false,
        content: Some(content),
        extra: sender.map(bytes_extra),
        compressed: None,
    }
}

pub fn build() -> Fixture {
    let dir = TempDir::new().unwrap();
    let multi = dir.path().join("Msg").join("Multi");
    std::fs::create_dir_all(&multi).unwrap();
    let msg_db = multi.join("MSG.db");
    let contacts_db = dir.path().join("Msg").join("MicroMsg.db");

    let conn = Connection::open(&msg_db).unwrap();
    conn.execute_batch(
        "CREATE TABLE MSG (
            localId INTEGER PRIMARY KEY AUTOINCREMENT,
            TalkerId INT DEFAULT 0,
            MsgSvrID INT,
            Type INT,
            SubType INT,
            IsSender INT,
            CreateTime INT,
            Sequence INT DEFAULT 0,
            StrTalker TEXT,
            StrContent TEXT,
            DisplayContent TEXT,
            CompressContent BLOB,
            BytesExtra BLOB
        );",
    )
    .unwrap();

    let rows = vec![
        text(T0, GROUP, Some("alice_id"), "good morning"),
        text(T0 + 30, FRIEND, None, "hi friend"),
        Row {
            is_sender: true,
            ..text(T0 + 60, GROUP, None, "morning!")
        },
        Row {
            is_sender: true,
            ..text(T0 + 90, FRIEND, None, "hey")
        },
        Row {
            kind: 3,
            content: Some("<msg><img length=\"1024\" /></msg>"),
            ..text(T0 + 100, GROUP, Some("wxid_bob"), "")
        },
        Row {
            kind: 49,
            sub_type: 57,
            content: None,
            compressed: Some(lz4_flex::block::compress(QUOTE_XML.as_bytes())),
            ..text(T0 + 180, GROUP, Some("alice_id"), "")
        },
        Row {
            kind: 10000,
            content: Some("\"Alice\" invited \"Carol\" to the group chat"),
            ..text(T0 + 200, GROUP, None, "")
        },
        text(T0 + 2 * 86_400, GROUP, Some("wxid_stranger"), "later"),
    ];

    for row in rows {
        conn.execute(
            "INSERT INTO MSG (Type, SubType, IsSender, CreateTime, StrTalker, StrContent, CompressContent, BytesExtra)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                row.kind,
                row.sub_type,
                row.is_sender as i64,
                row.time,
                row.talker,
                row.content,
                row.compressed,
                row.extra
            ],
        )
        .unwrap();
    }

    let contacts = Connection::open(&contacts_db).unwrap();
    contacts
        .execute_batch(
            "CREATE TABLE Contact (UserName TEXT PRIMARY KEY, Alias TEXT, Remark TEXT, NickName TEXT);
             INSERT INTO Contact VALUES ('alice_id', '', 'Alice', 'ally');
             INSERT INTO Contact VALUES ('wxid_bob', 'bobby88', '', 'Bob');
             INSERT INTO Contact VALUES ('wxid_friend', '', 'Friend', 'f');
             INSERT INTO Contact VALUES ('12345678@chatroom', '', '', 'Book club');",
        )
        .unwrap();

    Fixture {
        dir,
        msg_db,
        contacts_db,
    }
}

pub const GROUP_TRANSCRIPT: &str = "\
Alice  (2024-10-01 09:00:00)
good morning

Me  (2024-10-01 09:01:00)
morning!

Alice  (2024-10-01 09:03:00)
┌─────────────────────────────
│ Bob: hello
└─────────────────────────────
ok!

wxid_stranger  (2024-10-03 09:00:00)
later

";
