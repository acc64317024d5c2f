//! Row-level diagnostics behind `--inspect`.
//!
//! Prints what each decoder makes of the raw blobs of the first rows, so a
//! database whose blobs do not decode can be looked at before exporting it.
//! The protobuf walk and the byte-pattern scan are shown side by side.

use std::fmt::Display;
use std::io::{self, Write};

use chrono::{DateTime, TimeZone, Utc};
use eyre::{Context, Result};

use crate::decoder::{Decoded, decode_quote, trace_sender};
use crate::exporter::TIMESTAMP_FORMAT;
use crate::importer::{RawRow, RowSource};
use crate::normalizer::NameLookup;

/// Hex dumps stop after this many bytes.
const HEX_PREVIEW: usize = 64;
const CONTENT_PREVIEW: usize = 30;
const RULE: &str = "------------------------------------------------------------";

/// Describe the first `count` rows of `talker` (or of the whole table).
/// Returns the number of rows described.
pub fn inspect_rows<L, Tz, W>(
    source: &RowSource,
    lookup: &L,
    talker: Option<&str>,
    count: usize,
    tz: &Tz,
    writer: &mut W,
) -> Result<usize>
where
    L: NameLookup + ?Sized,
    Tz: TimeZone,
    Tz::Offset: Display,
    W: Write,
{
    let total = source.count(talker)?;
    writeln!(writer, "Rows: {total}, showing up to {count}")
        .wrap_err("Failed to write inspection")?;

    let mut query = source.query(talker)?;
    let mut shown = 0;
    for row in query.rows()?.take(count) {
        let row = row.wrap_err("Failed to read message row")?;
        shown += 1;
        describe_row(writer, shown, &row, lookup, tz).wrap_err("Failed to write inspection")?;
    }
    writeln!(writer, "{RULE}").wrap_err("Failed to write inspection")?;

    Ok(shown)
}

fn describe_row<L, Tz, W>(w: &mut W, index: usize, row: &RawRow, lookup: &L, tz: &Tz) -> io::Result<()>
where
    L: NameLookup + ?Sized,
    Tz: TimeZone,
    Tz::Offset: Display,
    W: Write,
{
    writeln!(w, "{RULE}")?;
    let time = DateTime::<Utc>::from_timestamp(row.create_time, 0)
        .map(|ts| ts.with_timezone(tz).format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_else(|| format!("out of range ({})", row.create_time));
    writeln!(w, "#{index}  {time}")?;

    let kind = row.kind();
    let note = if kind.is_quote() { " (quoted reply)" } else { "" };
    writeln!(w, "talker:   {}", row.talker.as_deref().unwrap_or("-"))?;
    writeln!(w, "kind:     {kind:?}{note}")?;
    writeln!(w, "outgoing: {}", if row.is_sender { "yes" } else { "no" })?;
    writeln!(w, "content:  {}", preview(row.content.as_deref()))?;

    match row.bytes_extra.as_deref() {
        None => writeln!(w, "bytes_extra: none")?,
        Some(blob) => {
            writeln!(w, "bytes_extra: {} bytes", blob.len())?;
            writeln!(w, "  hex:      {}", hex_preview(blob))?;

            let trace = trace_sender(blob);
            let walked = match &trace.walked {
                Decoded::Decoded(Some(id)) => id.as_str(),
                Decoded::Decoded(None) => "no sender attribute",
                Decoded::Unrecognized => "not protobuf",
            };
            writeln!(w, "  protobuf: {walked}")?;
            writeln!(w, "  patterns: {}", trace.scanned.as_deref().unwrap_or("no match"))?;

            if let Some(id) = trace.walked.ok().flatten().or(trace.scanned) {
                let name = lookup.display_name(&id);
                writeln!(w, "  contact:  {}", name.as_deref().unwrap_or("not in contacts"))?;
            }
        }
    }

    match row.compress_content.as_deref() {
        None => writeln!(w, "compress_content: none")?,
        Some(blob) => {
            writeln!(w, "compress_content: {} bytes", blob.len())?;
            let quote = decode_quote(Some(blob));
            if quote.is_empty() {
                writeln!(w, "  nothing decoded")?;
            } else {
                writeln!(w, "  quoted sender: {}", quote.quoted_sender.as_deref().unwrap_or("-"))?;
                writeln!(w, "  quoted text:   {}", preview(quote.quoted_text.as_deref()))?;
                writeln!(w, "  own text:      {}", preview(quote.own_text.as_deref()))?;
            }
        }
    }

    Ok(())
}

fn preview(text: Option<&str>) -> String {
    let Some(text) = text else {
        return "-".to_owned();
    };
    let mut out: String = text.chars().take(CONTENT_PREVIEW).collect();
    if text.chars().nth(CONTENT_PREVIEW).is_some() {
        out.push_str("...");
    }
    out.replace('\n', "\\n")
}

fn hex_preview(blob: &[u8]) -> String {
    let mut out = hex::encode(&blob[..blob.len().min(HEX_PREVIEW)]);
    if blob.len() > HEX_PREVIEW {
        out.push_str("...");
    }
    out
}
