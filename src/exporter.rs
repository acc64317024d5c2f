use std::fmt::Display;
use std::io::Write;

use chrono::TimeZone;

use crate::decoder::QuotedReply;
use crate::normalizer::Message;
use crate::utils::DateWindow;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Quoted text longer than this (in characters) is cut with an ellipsis.
const MAX_QUOTE_CHARS: usize = 100;

const QUOTE_TOP: &str = "┌─────────────────────────────";
const QUOTE_BOTTOM: &str = "└─────────────────────────────";
const QUOTE_RULE: &str = "│ ";

/// Which messages make it into the transcript.
#[derive(Debug, Clone, Copy, Default)]
pub struct TranscriptFilter {
    pub window: DateWindow,
    pub limit: Option<usize>,
}

/// Format messages lazily, one block per message, in the order given.
///
/// Messages outside the date window are skipped; at most `limit` blocks are
/// produced. Input order is kept as is.
pub fn render_blocks<'a, I, Tz>(
    messages: I,
    filter: &'a TranscriptFilter,
    tz: &'a Tz,
) -> impl Iterator<Item = String> + 'a
where
    I: IntoIterator<Item = Message>,
    I::IntoIter: 'a,
    Tz: TimeZone,
    Tz::Offset: Display,
{
    messages
        .into_iter()
        .filter(move |m| filter.window.contains(&m.timestamp, tz))
        .take(filter.limit.unwrap_or(usize::MAX))
        .map(move |m| format_block(&m, tz))
}

/// The whole transcript as one string.
pub fn render<I, Tz>(messages: I, filter: &TranscriptFilter, tz: &Tz) -> String
where
    I: IntoIterator<Item = Message>,
    Tz: TimeZone,
    Tz::Offset: Display,
{
    render_blocks(messages, filter, tz).collect()
}

/// Stream the transcript into `writer`. Returns the number of messages written.
pub fn write_transcript<W, I, Tz>(
    writer: &mut W,
    messages: I,
    filter: &TranscriptFilter,
    tz: &Tz,
) -> std::io::Result<usize>
where
    W: Write,
    I: IntoIterator<Item = Message>,
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut written = 0;
    for block in render_blocks(messages, filter, tz) {
        writer.write_all(block.as_bytes())?;
        written += 1;
    }
    Ok(written)
}

/// ```text
/// <sender>  (<YYYY-MM-DD HH:MM:SS>)
/// [quote block]
/// <body>
///
/// ```
pub fn format_block<Tz>(message: &Message, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let time = message.timestamp.with_timezone(tz).format(TIMESTAMP_FORMAT);
    let mut block = format!("{}  ({})\n", message.display_sender, time);

    if let Some(quote) = message.quoted.as_ref().filter(|q| q.is_reply()) {
        push_quote(&mut block, quote);
    }

    if !message.body.is_empty() {
        block.push_str(&message.body);
        block.push('\n');
    }
    block.push('\n');
    block
}

fn push_quote(block: &mut String, quote: &QuotedReply) {
    block.push_str(QUOTE_TOP);
    block.push('\n');

    let text = quote.quoted_text.as_deref().map(truncate_quote);
    let mut lines = text.as_deref().unwrap_or_default().lines();
    let first = lines.next().unwrap_or_default();

    block.push_str(QUOTE_RULE);
    match (&quote.quoted_sender, first.is_empty()) {
        (Some(who), false) => block.push_str(&format!("{who}: {first}")),
        (Some(who), true) => block.push_str(who),
        (None, _) => block.push_str(first),
    }
    block.push('\n');

    for line in lines {
        block.push_str(QUOTE_RULE);
        block.push_str(line);
        block.push('\n');
    }

    block.push_str(QUOTE_BOTTOM);
    block.push('\n');
}

fn truncate_quote(text: &str) -> String {
    if text.chars().count() <= MAX_QUOTE_CHARS {
        return text.to_owned();
    }
    let kept: String = text.chars().take(MAX_QUOTE_CHARS - 3).collect();
    format!("{kept}...")
}
