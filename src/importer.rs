/// Row types and readers for the WeChat desktop databases.
///
/// Messages live in `Msg/Multi/MSG*.db`, contacts in `Msg/MicroMsg.db`.
/// Both are SQLite files and are opened read-only.
///
/// Table schema (columns this crate reads):
/// ```sql
/// CREATE TABLE MSG (
///     localId         INTEGER PRIMARY KEY AUTOINCREMENT,
///     Type            INT,
///     SubType         INT,
///     IsSender        INT,
///     CreateTime      INT,     -- unix seconds
///     StrTalker       TEXT,    -- conversation key: wxid_… or …@chatroom
///     StrContent      TEXT,
///     CompressContent BLOB,
///     BytesExtra      BLOB,
///     ...
/// );
///
/// CREATE TABLE Contact (
///     UserName TEXT PRIMARY KEY,
///     Alias    TEXT,
///     Remark   TEXT,
///     NickName TEXT,
///     ...
/// );
/// ```
use std::collections::HashMap;
use std::path::Path;

use eyre::{Context, Result};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Statement, params};

use crate::normalizer::NameLookup;

/// Suffix shared by every group conversation key.
pub const CHATROOM_SUFFIX: &str = "@chatroom";

pub fn is_group_key(key: &str) -> bool {
    key.ends_with(CHATROOM_SUFFIX)
}

/// Message category, from the `Type` / `SubType` columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Image,
    Voice,
    ContactCard,
    Video,
    Sticker,
    Location,
    /// Rich "app" message; sub type 57 is a quoted reply.
    App { sub_type: i64 },
    VoipCall,
    System,
    Recalled,
    Other(i64),
}

impl MessageKind {
    pub fn from_tags(kind: i64, sub_type: i64) -> Self {
        match kind {
            1 => Self::Text,
            3 => Self::Image,
            34 => Self::Voice,
            42 => Self::ContactCard,
            43 => Self::Video,
            47 => Self::Sticker,
            48 => Self::Location,
            49 => Self::App { sub_type },
            50 => Self::VoipCall,
            10000 => Self::System,
            10002 => Self::Recalled,
            other => Self::Other(other),
        }
    }

    pub fn is_quote(self) -> bool {
        matches!(self, Self::App { sub_type: 57 })
    }
}

/// One row of `MSG`, as stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    pub create_time: i64,
    pub is_sender: bool,
    pub kind_tag: i64,
    pub sub_type: i64,
    pub content: Option<String>,
    pub talker: Option<String>,
    pub bytes_extra: Option<Vec<u8>>,
    pub compress_content: Option<Vec<u8>>,
}

impl RawRow {
    pub fn kind(&self) -> MessageKind {
        MessageKind::from_tags(self.kind_tag, self.sub_type)
    }

    fn from_sql(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            create_time: row.get::<_, Option<i64>>(0)?.unwrap_or_default(),
            is_sender: row.get::<_, Option<i64>>(1)?.unwrap_or_default() == 1,
            kind_tag: row.get::<_, Option<i64>>(2)?.unwrap_or_default(),
            sub_type: row.get::<_, Option<i64>>(3)?.unwrap_or_default(),
            content: opt_text(row, 4)?,
            talker: opt_text(row, 5)?,
            bytes_extra: opt_bytes(row, 6)?,
            compress_content: opt_bytes(row, 7)?,
        })
    }
}

// Column affinity is not enforced by SQLite; old clients wrote some blobs as TEXT.
fn opt_bytes(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<Vec<u8>>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Blob(b) | ValueRef::Text(b) if !b.is_empty() => Some(b.to_vec()),
        _ => None,
    })
}

fn opt_text(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Text(b) | ValueRef::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
        _ => None,
    })
}

pub fn open_db(path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .wrap_err_with(|| format!("Failed to open database: {}", path.display()))?;
    conn.execute_batch("PRAGMA cache_size = -16384;")
        .wrap_err("Failed to set cache_size")?;
    Ok(conn)
}

/// Read-only source of `MSG` rows in chronological order.
pub struct RowSource {
    conn: Connection,
}

const SELECT_ROWS: &str = "SELECT CreateTime, IsSender, Type, SubType, StrContent, StrTalker, \
     BytesExtra, CompressContent FROM MSG";
const ORDER_ROWS: &str = "ORDER BY CreateTime ASC, rowid ASC";

impl RowSource {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            conn: open_db(path)?,
        })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// Prepare a query over one conversation, or over every row when `talker` is `None`.
    pub fn query(&self, talker: Option<&str>) -> Result<RowQuery<'_>> {
        let sql = match talker {
            Some(_) => format!("{SELECT_ROWS} WHERE StrTalker = ?1 {ORDER_ROWS}"),
            None => format!("{SELECT_ROWS} {ORDER_ROWS}"),
        };
        let stmt = self
            .conn
            .prepare(&sql)
            .wrap_err("Failed to prepare message query")?;
        Ok(RowQuery {
            stmt,
            talker: talker.map(str::to_owned),
        })
    }

    pub fn count(&self, talker: Option<&str>) -> Result<u64> {
        let count: i64 = match talker {
            Some(t) => self.conn.query_row(
                "SELECT COUNT(*) FROM MSG WHERE StrTalker = ?1",
                [t],
                |row| row.get(0),
            ),
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM MSG", [], |row| row.get(0)),
        }
        .wrap_err("Failed to count messages")?;
        Ok(count.max(0) as u64)
    }
}

/// A prepared message query; `rows` streams it.
pub struct RowQuery<'conn> {
    stmt: Statement<'conn>,
    talker: Option<String>,
}

impl RowQuery<'_> {
    pub fn rows(&mut self) -> Result<impl Iterator<Item = rusqlite::Result<RawRow>> + '_> {
        let rows = match &self.talker {
            Some(t) => self.stmt.query_map(params![t], RawRow::from_sql),
            None => self.stmt.query_map(params![], RawRow::from_sql),
        }
        .wrap_err("Failed to execute message query")?;
        Ok(rows)
    }
}

/// Account id to display name, loaded once from `MicroMsg.db`.
///
/// A remark (the name the user gave the contact) wins over the nickname,
/// which wins over the alias.
#[derive(Debug, Clone, Default)]
pub struct ContactBook {
    names: HashMap<String, String>,
}

impl ContactBook {
    pub fn load(path: &Path) -> Result<Self> {
        let conn = open_db(path)?;
        Ok(Self::from_connection(&conn))
    }

    /// Build from an open connection. Missing tables leave the book empty.
    pub fn from_connection(conn: &Connection) -> Self {
        let mut book = Self::default();

        match book.read_contacts(conn) {
            Ok(n) => tracing::debug!(contacts = n, "read Contact table"),
            Err(e) => tracing::warn!("Failed to read Contact table: {e}"),
        }

        if book.names.is_empty()
            && let Err(e) = book.read_head_images(conn)
        {
            tracing::debug!("ContactHeadImgUrl fallback unavailable: {e}");
        }

        book
    }

    fn read_contacts(&mut self, conn: &Connection) -> rusqlite::Result<usize> {
        let mut stmt = conn.prepare("SELECT UserName, Remark, NickName, Alias FROM Contact")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;

        for row in rows {
            let (user, remark, nick, alias) = row?;
            let Some(user) = user.filter(|u| !u.is_empty()) else {
                continue;
            };
            if let Some(name) = [remark, nick, alias]
                .into_iter()
                .flatten()
                .map(|n| n.trim().to_owned())
                .find(|n| !n.is_empty())
            {
                self.names.insert(user, name);
            }
        }
        Ok(self.names.len())
    }

    fn read_head_images(&mut self, conn: &Connection) -> rusqlite::Result<()> {
        let mut stmt = conn.prepare("SELECT UserName, NickName FROM ContactHeadImgUrl")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, Option<String>>(1)?,
            ))
        })?;
        for row in rows {
            if let (Some(user), Some(nick)) = row?
                && !nick.trim().is_empty()
            {
                self.names.entry(user).or_insert_with(|| nick.trim().to_owned());
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl NameLookup for ContactBook {
    fn display_name(&self, id: &str) -> Option<String> {
        self.names.get(id).cloned()
    }
}
