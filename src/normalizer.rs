use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::decoder::{QuotedReply, SenderIdentity};
use crate::importer::{MessageKind, RawRow};

pub const DEFAULT_SELF_LABEL: &str = "Me";
pub const DEFAULT_FALLBACK_LABEL: &str = "Unknown";

/// Read-only account id to display name resolution.
///
/// A miss is `None`; callers decide the fallback.
pub trait NameLookup {
    fn display_name(&self, id: &str) -> Option<String>;
}

impl NameLookup for HashMap<String, String> {
    fn display_name(&self, id: &str) -> Option<String> {
        self.get(id).cloned()
    }
}

impl<T: NameLookup + ?Sized> NameLookup for &T {
    fn display_name(&self, id: &str) -> Option<String> {
        (**self).display_name(id)
    }
}

/// A transcript entry, ready to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub timestamp: DateTime<Utc>,
    /// Never empty.
    pub display_sender: String,
    pub body: String,
    pub quoted: Option<QuotedReply>,
}

/// How senders are labelled for one export.
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    pub is_group: bool,
    /// Label for outgoing messages.
    pub self_label: String,
    /// Label when the sender cannot be resolved.
    pub fallback_label: String,
    /// The exporting user's own account id; group rows from it get `self_label`.
    pub self_id: Option<String>,
    /// Replace unresolved group member ids with stable made-up names.
    pub pseudonymize: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            is_group: false,
            self_label: DEFAULT_SELF_LABEL.to_owned(),
            fallback_label: DEFAULT_FALLBACK_LABEL.to_owned(),
            self_id: None,
            pseudonymize: false,
        }
    }
}

impl NormalizeOptions {
    fn self_label(&self) -> String {
        non_empty(&self.self_label, DEFAULT_SELF_LABEL)
    }

    fn fallback_label(&self) -> String {
        non_empty(&self.fallback_label, DEFAULT_FALLBACK_LABEL)
    }
}

fn non_empty(label: &str, default: &str) -> String {
    single_line(label).unwrap_or_else(|| default.to_owned())
}

/// Names go into a one-line header: runs of whitespace and control
/// characters collapse to a single space.
fn single_line(name: &str) -> Option<String> {
    let words: Vec<&str> = name
        .split(|c: char| c.is_whitespace() || c.is_control())
        .filter(|w| !w.is_empty())
        .collect();
    (!words.is_empty()).then(|| words.join(" "))
}

/// Assemble a [`Message`] from a row and its decoded blobs.
///
/// Returns `None` for rows that do not belong in a text transcript: media,
/// system notices, recalled messages, and text rows with nothing left after
/// cleaning.
pub fn normalize<L: NameLookup + ?Sized>(
    row: &RawRow,
    sender: &SenderIdentity,
    quote: QuotedReply,
    lookup: &L,
    opts: &NormalizeOptions,
) -> Option<Message> {
    let body = derive_body(row, &quote)?;

    let Some(timestamp) = DateTime::<Utc>::from_timestamp(row.create_time, 0) else {
        tracing::debug!(create_time = row.create_time, "dropping row with out-of-range timestamp");
        return None;
    };

    let display_sender = resolve_sender(row, sender, lookup, opts);

    let quoted = (!quote.is_empty()).then(|| QuotedReply {
        quoted_sender: quote.quoted_sender.and_then(|who| {
            let name = lookup.display_name(&who).unwrap_or(who);
            single_line(&name)
        }),
        ..quote
    });

    Some(Message {
        timestamp,
        display_sender,
        body,
        quoted,
    })
}

fn resolve_sender<L: NameLookup + ?Sized>(
    row: &RawRow,
    sender: &SenderIdentity,
    lookup: &L,
    opts: &NormalizeOptions,
) -> String {
    if opts.is_group
        && let Some(id) = sender.sender.as_deref()
    {
        if opts.self_id.as_deref() == Some(id) {
            return opts.self_label();
        }
        if let Some(name) = lookup.display_name(id).as_deref().and_then(single_line) {
            return name;
        }
        tracing::trace!(id, "group member not in contacts");
        return if opts.pseudonymize {
            pseudonym(id)
        } else {
            id.to_owned()
        };
    }

    if row.is_sender {
        return opts.self_label();
    }

    if !opts.is_group
        && let Some(name) = row
            .talker
            .as_deref()
            .and_then(|talker| lookup.display_name(talker))
            .as_deref()
            .and_then(single_line)
    {
        return name;
    }

    opts.fallback_label()
}

/// Notices the client writes into `StrContent` in place of media.
const MEDIA_NOTICES: &[&str] = &["[图片]", "[视频]", "[语音]", "[动画表情]", "收到一条图片", "收到一条视频"];

fn derive_body(row: &RawRow, quote: &QuotedReply) -> Option<String> {
    let content = row.content.as_deref().unwrap_or_default();
    match row.kind() {
        MessageKind::Text => {
            let trimmed = content.trim();
            if trimmed.starts_with('<') || MEDIA_NOTICES.iter().any(|n| trimmed.starts_with(n)) {
                return None;
            }
            clean_body(content)
        }
        MessageKind::App { .. } if quote.is_reply() => quote
            .own_text
            .as_deref()
            .and_then(clean_body)
            .or_else(|| clean_body(content))
            .or_else(|| Some(String::new())),
        _ => None,
    }
}

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid tag pattern"));
static SECRET_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bsk-[A-Za-z0-9_-]{20,}").expect("valid key pattern"));

/// Drop markup and redact pasted API keys.
fn clean_body(text: &str) -> Option<String> {
    let text = TAG.replace_all(text, "");
    let text = SECRET_KEY.replace_all(&text, "[redacted]");
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_owned())
}

const SURNAMES: &[&str] = &[
    "李", "王", "张", "刘", "陈", "杨", "赵", "黄", "周", "吴", "徐", "孙", "胡", "朱", "高", "林",
    "何", "郭", "马", "罗", "梁", "宋", "郑", "谢", "韩", "唐", "冯", "于", "董", "萧",
];

/// A made-up but stable name for an account id: the same id always maps to
/// the same name, across runs.
pub fn pseudonym(id: &str) -> String {
    let digest = Sha256::digest(id.as_bytes());
    let surname = SURNAMES[usize::from(digest[0]) % SURNAMES.len()];
    let title = if digest[1] % 2 == 0 { "先生" } else { "女士" };
    let tag = u16::from_be_bytes([digest[2], digest[3]]) % 100;
    format!("{surname}{title}{tag:02}")
}
