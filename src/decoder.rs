//! Decoders for the two opaque blob columns of the WeChat `MSG` table.
//!
//! Neither format is published. Both decoders are best-effort scanners over
//! observed samples: every failure path degrades to an empty result instead of
//! an error, so a single odd row never stops an export.
//!
//! - `BytesExtra`: protobuf wire format. Top-level field 3 repeats
//!   `{ 1: varint attribute type, 2: bytes value }` entries; attribute type 1
//!   holds the sender's account id in group chats.
//! - `CompressContent`: an LZ4 block (older clients: zstd frame, or no
//!   compression at all) holding an `<msg><appmsg>…</appmsg></msg>` document.
//!   Quoted replies carry a `<refermsg>` element inside `<appmsg>`.
use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use regex::bytes::Regex as BytesRegex;

/// Attribute type of the sender entry inside `BytesExtra`.
const SENDER_ATTRIBUTE: u64 = 1;

/// Upper bound on any decompressed `CompressContent` payload.
const MAX_DECOMPRESSED: usize = 1 << 20;

/// LZ4 cannot expand input by more than this factor.
const LZ4_MAX_RATIO: usize = 255;

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];
const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Outcome of a tolerant decode step.
///
/// `Unrecognized` is an expected outcome, not an error: the caller picks a
/// fallback strategy or collapses it to "nothing found".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<T> {
    Decoded(T),
    Unrecognized,
}

impl<T> Decoded<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Decoded::Decoded(value) => Some(value),
            Decoded::Unrecognized => None,
        }
    }
}

/// The real author of a message, as recorded in `BytesExtra`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderIdentity {
    pub sender: Option<String>,
}

/// Quoted-reply segments recovered from `CompressContent`.
///
/// Any subset may be present. All `None` means the row quotes nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuotedReply {
    /// Display name (or account id, when no name was recorded) of the quoted author.
    pub quoted_sender: Option<String>,
    /// The text being quoted.
    pub quoted_text: Option<String>,
    /// The new text that accompanies the quote.
    pub own_text: Option<String>,
}

impl QuotedReply {
    pub fn is_empty(&self) -> bool {
        self.quoted_sender.is_none() && self.quoted_text.is_none() && self.own_text.is_none()
    }

    /// True when there is something to show as a quote block.
    pub fn is_reply(&self) -> bool {
        self.quoted_sender.is_some() || self.quoted_text.is_some()
    }
}

/// Extract the sender account id from a `BytesExtra` blob.
pub fn decode_sender(blob: Option<&[u8]>) -> SenderIdentity {
    let Some(blob) = blob.filter(|b| !b.is_empty()) else {
        return SenderIdentity::default();
    };

    let sender = walk_attributes(blob).ok().unwrap_or_else(|| {
        let scanned = scan_sender_patterns(blob);
        tracing::debug!(
            len = blob.len(),
            found = scanned.is_some(),
            "BytesExtra is not well-formed protobuf, fell back to pattern scan"
        );
        scanned
    });

    SenderIdentity { sender }
}

/// Both sender strategies, run independently of each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderTrace {
    /// Result of the protobuf walk.
    pub walked: Decoded<Option<String>>,
    /// Result of the byte-pattern scan, whether or not the walk succeeded.
    pub scanned: Option<String>,
}

/// Run the protobuf walk and the pattern scan side by side, for `--inspect`.
pub fn trace_sender(blob: &[u8]) -> SenderTrace {
    SenderTrace {
        walked: walk_attributes(blob),
        scanned: scan_sender_patterns(blob),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WireValue<'a> {
    Varint(u64),
    Bytes(&'a [u8]),
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Malformed;

/// Minimal protobuf field iterator. Stops after the first malformed field.
struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn read_varint(&mut self) -> Option<u64> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = *self.buf.get(self.pos)?;
            self.pos += 1;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Some(value);
            }
        }
        None
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let slice = self.buf.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn read_field(&mut self) -> Option<(u64, WireValue<'a>)> {
        let key = self.read_varint()?;
        let field = key >> 3;
        if field == 0 {
            return None;
        }
        let value = match key & 0x07 {
            0 => WireValue::Varint(self.read_varint()?),
            1 => {
                self.take(8)?;
                WireValue::Fixed
            }
            2 => {
                let len = usize::try_from(self.read_varint()?).ok()?;
                WireValue::Bytes(self.take(len)?)
            }
            5 => {
                self.take(4)?;
                WireValue::Fixed
            }
            // Groups (3, 4) are deprecated and never observed; 6 and 7 are invalid.
            _ => return None,
        };
        Some((field, value))
    }
}

impl<'a> Iterator for WireReader<'a> {
    type Item = Result<(u64, WireValue<'a>), Malformed>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.buf.len() {
            return None;
        }
        match self.read_field() {
            Some(field) => Some(Ok(field)),
            None => {
                self.pos = self.buf.len();
                Some(Err(Malformed))
            }
        }
    }
}

/// Walk `BytesExtra` as protobuf.
///
/// `Decoded(None)` means the blob parsed cleanly but carries no sender entry.
fn walk_attributes(blob: &[u8]) -> Decoded<Option<String>> {
    for field in WireReader::new(blob) {
        let Ok((number, value)) = field else {
            return Decoded::Unrecognized;
        };
        if let (3, WireValue::Bytes(entry)) = (number, value)
            && let Some(id) = sender_from_entry(entry)
        {
            return Decoded::Decoded(Some(id));
        }
    }
    Decoded::Decoded(None)
}

fn sender_from_entry(entry: &[u8]) -> Option<String> {
    let mut kind = None;
    let mut value = None;
    for field in WireReader::new(entry) {
        match field.ok()? {
            (1, WireValue::Varint(k)) => kind = Some(k),
            (2, WireValue::Bytes(v)) => value = Some(v),
            _ => {}
        }
    }
    if kind? != SENDER_ATTRIBUTE {
        return None;
    }
    plausible_id(value?)
}

/// Byte patterns seen in blobs that do not parse as protobuf (truncated rows,
/// some system-generated group messages). The capture starts with the id length.
static SENDER_PATTERNS: LazyLock<[BytesRegex; 2]> = LazyLock::new(|| {
    [
        BytesRegex::new(r"(?s-u)\x1a.{1,2}\x08\x01\x12(.{1,30})").expect("valid sender pattern"),
        BytesRegex::new(r"(?s-u)\x0a\x04\x08\x05\x10\x01\x1a\x0e\x08\x01\x12(.{1,30})")
            .expect("valid sender pattern"),
    ]
});

fn scan_sender_patterns(blob: &[u8]) -> Option<String> {
    SENDER_PATTERNS
        .iter()
        .flat_map(|pattern| pattern.captures_iter(blob))
        .filter_map(|caps| caps.get(1))
        .find_map(|m| {
            let (&len, rest) = m.as_bytes().split_first()?;
            let len = usize::from(len);
            if len == 0 || len > rest.len() {
                return None;
            }
            plausible_id(&rest[..len])
        })
}

fn plausible_id(bytes: &[u8]) -> Option<String> {
    let id = std::str::from_utf8(bytes).ok()?.trim();
    if id.is_empty() || id.chars().any(char::is_control) {
        return None;
    }
    Some(id.to_owned())
}

/// Extract quoted-reply segments from a `CompressContent` blob.
pub fn decode_quote(blob: Option<&[u8]>) -> QuotedReply {
    let Some(blob) = blob.filter(|b| !b.is_empty()) else {
        return QuotedReply::default();
    };

    match decompress_content(blob) {
        Decoded::Decoded(text) => extract_quote(&text),
        Decoded::Unrecognized => {
            tracing::debug!(len = blob.len(), "CompressContent could not be decompressed");
            QuotedReply::default()
        }
    }
}

/// Turn a `CompressContent` blob into markup text.
///
/// Uncompressed markup is a valid input, not an error. Besides a clean
/// document, that covers a `<msg>` element with bytes around it (an id
/// prefix, trailing padding), which is only used when decompression does not
/// yield a `<msg>` document itself.
pub fn decompress_content(blob: &[u8]) -> Decoded<String> {
    if let Some(text) = as_markup(blob) {
        return Decoded::Decoded(text.to_owned());
    }

    match (decompress(blob), embedded_markup(blob)) {
        (Some(text), _) if text.contains("<msg") => Decoded::Decoded(text),
        (_, Some(text)) => Decoded::Decoded(text),
        (Some(text), None) => Decoded::Decoded(text),
        (None, None) => Decoded::Unrecognized,
    }
}

fn decompress(blob: &[u8]) -> Option<String> {
    let bytes = if blob.starts_with(&ZSTD_MAGIC) {
        zstd::bulk::decompress(blob, MAX_DECOMPRESSED).ok()?
    } else {
        let capacity = blob.len().saturating_mul(LZ4_MAX_RATIO).min(MAX_DECOMPRESSED);
        lz4_flex::block::decompress(blob, capacity).ok()?
    };
    let text = String::from_utf8_lossy(&bytes);
    let text = text.trim_end_matches('\0');
    text.contains('<').then(|| text.to_owned())
}

static MSG_ELEMENT: LazyLock<BytesRegex> =
    LazyLock::new(|| BytesRegex::new(r"(?s-u)<msg[\s>].*</msg>").expect("valid msg pattern"));

/// The outermost `<msg>...</msg>` span found anywhere in the raw bytes.
fn embedded_markup(blob: &[u8]) -> Option<String> {
    let found = MSG_ELEMENT.find(blob)?;
    Some(String::from_utf8_lossy(found.as_bytes()).into_owned())
}

/// Valid UTF-8 that starts with a tag, ignoring a BOM and leading whitespace.
fn as_markup(blob: &[u8]) -> Option<&str> {
    let blob = blob.strip_prefix(UTF8_BOM).unwrap_or(blob);
    let text = std::str::from_utf8(blob).ok()?;
    let text = text.trim_start().trim_end_matches('\0');
    text.starts_with('<').then_some(text)
}

fn extract_quote(markup: &str) -> QuotedReply {
    let (outer, refer) = split_refermsg(markup);

    let own_text = segment(&outer, "title").and_then(clean_segment);

    let Some(refer) = refer else {
        return QuotedReply {
            own_text,
            ..QuotedReply::default()
        };
    };

    let quoted_sender = ["displayname", "chatusr", "fromusr"]
        .into_iter()
        .find_map(|tag| segment(refer, tag).and_then(clean_segment));

    let kind = segment(refer, "type").and_then(|t| t.trim().parse::<i64>().ok());
    let quoted_text = match kind.and_then(media_placeholder) {
        Some(placeholder) => Some(placeholder.to_owned()),
        None => segment(refer, "content").and_then(quoted_content),
    };

    QuotedReply {
        quoted_sender,
        quoted_text,
        own_text,
    }
}

/// Split the document into everything outside `<refermsg>` and its inner text.
fn split_refermsg(markup: &str) -> (Cow<'_, str>, Option<&str>) {
    let Some(inner) = segment(markup, "refermsg") else {
        return (Cow::Borrowed(markup), None);
    };
    let Some(open) = markup.find("<refermsg") else {
        return (Cow::Borrowed(markup), Some(inner));
    };
    let close = markup[open..]
        .find("</refermsg>")
        .map(|rel| open + rel + "</refermsg>".len())
        .unwrap_or(markup.len());
    let outer = format!("{}{}", &markup[..open], &markup[close..]);
    (Cow::Owned(outer), Some(inner))
}

/// Quoted media is shown as a short label rather than its raw markup.
fn media_placeholder(kind: i64) -> Option<&'static str> {
    match kind {
        3 => Some("[image]"),
        34 => Some("[voice]"),
        43 => Some("[video]"),
        47 => Some("[sticker]"),
        48 => Some("[location]"),
        _ => None,
    }
}

/// The quoted `<content>` is escaped markup when the quoted message was itself
/// an app message; in that case its title is the readable part. Group messages
/// may prefix it with `sender_id:\n`.
fn quoted_content(raw: &str) -> Option<String> {
    let text = unwrap_cdata(raw)
        .map(Cow::Borrowed)
        .unwrap_or_else(|| unescape_entities(raw));
    match text.find("<msg") {
        Some(start) => segment(&text[start..], "title").and_then(clean_segment),
        None => clean_text(&text),
    }
}

/// Inner text of the first `<tag>…</tag>` element.
///
/// Attributes on the opening tag are allowed; a self-closing tag yields `""`.
fn segment<'a>(haystack: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let mut from = 0;

    while let Some(rel) = haystack[from..].find(&open) {
        let after_name = from + rel + open.len();
        let rest = &haystack[after_name..];
        match rest.chars().next() {
            Some('>') => {
                let body = &rest[1..];
                return body.find(&close).map(|end| &body[..end]);
            }
            Some(c) if c.is_whitespace() || c == '/' => {
                let gt = rest.find('>')?;
                if rest[..gt].ends_with('/') {
                    return Some("");
                }
                let body = &rest[gt + 1..];
                return body.find(&close).map(|end| &body[..end]);
            }
            // A longer tag name sharing the prefix, e.g. <titlebar>.
            _ => from = after_name,
        }
    }
    None
}

fn clean_segment(raw: &str) -> Option<String> {
    match unwrap_cdata(raw) {
        Some(inner) => clean_text(inner),
        None => clean_text(&unescape_entities(raw)),
    }
}

fn unwrap_cdata(raw: &str) -> Option<&str> {
    raw.trim()
        .strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
}

/// Strip control characters (newlines and tabs survive) and trim.
fn clean_text(text: &str) -> Option<String> {
    let cleaned: String = text
        .chars()
        .filter(|&c| c == '\n' || c == '\t' || !c.is_control())
        .collect();
    let cleaned = cleaned.trim();
    (!cleaned.is_empty()).then(|| cleaned.to_owned())
}

static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").expect("valid entity pattern"));

/// Single-pass XML entity unescape. Unknown entities are left as written.
pub(crate) fn unescape_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    ENTITY.replace_all(text, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        let decoded = match name {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => name
                .strip_prefix("#x")
                .or_else(|| name.strip_prefix("#X"))
                .map(|hex| u32::from_str_radix(hex, 16))
                .or_else(|| name.strip_prefix('#').map(str::parse::<u32>))
                .and_then(Result::ok)
                .and_then(char::from_u32),
        };
        decoded.map_or_else(|| caps[0].to_owned(), String::from)
    })
}
