use std::fmt::Display;
use std::fs::File;
use std::io::{self, BufWriter, Write};

use chrono::{Local, TimeZone};
use eyre::{Context, Result, eyre};

use crate::decoder::{SenderIdentity, decode_quote, decode_sender};
use crate::exporter::{self, TranscriptFilter};
use crate::importer::{ContactBook, RawRow, RowSource};
use crate::inspect;
use crate::normalizer::{self, Message, NameLookup, NormalizeOptions};
use crate::utils::{ExportConfig, default_contacts_path};

/// The main entry point for the export logic.
/// Validates the configuration, then streams rows from the database into the output.
pub fn execute(config: ExportConfig) -> Result<()> {
    if let Some(count) = config.inspect {
        return run_inspect(&config, count);
    }

    let window = config.validate()?;
    ensure_database(&config)?;

    let source = RowSource::open(&config.db_path)?;
    let contacts = load_contacts(&config);
    let filter = TranscriptFilter {
        window,
        limit: config.effective_limit(),
    };

    let written = if config.writes_to_stdout() {
        let stdout = io::stdout();
        let mut writer = BufWriter::new(stdout.lock());
        let n = export_to_writer(&source, &contacts, &config, &filter, &Local, &mut writer)?;
        writer.flush().wrap_err("Failed to flush stdout")?;
        n
    } else {
        let file = File::create(&config.output)
            .wrap_err_with(|| format!("Failed to create: {}", config.output.display()))?;
        let mut writer = BufWriter::new(file);
        let n = export_to_writer(&source, &contacts, &config, &filter, &Local, &mut writer)?;
        writer
            .flush()
            .wrap_err_with(|| format!("Failed to write: {}", config.output.display()))?;
        n
    };

    if !config.quiet {
        if config.writes_to_stdout() {
            eprintln!("Done. {} messages exported.", written);
        } else {
            eprintln!(
                "Done. {} messages exported to {}.",
                written,
                config.output.display()
            );
        }
    }

    Ok(())
}

/// Print decoder diagnostics for the first `count` rows to stdout.
/// Conversation and date checks are skipped: any key can be inspected.
fn run_inspect(config: &ExportConfig, count: usize) -> Result<()> {
    ensure_database(config)?;
    let source = RowSource::open(&config.db_path)?;
    let contacts = load_contacts(config);

    let stdout = io::stdout();
    let mut writer = BufWriter::new(stdout.lock());
    let shown = inspect::inspect_rows(&source, &contacts, config.chat.as_deref(), count, &Local, &mut writer)?;
    writer.flush().wrap_err("Failed to flush stdout")?;

    if !config.quiet {
        eprintln!("Done. {} rows inspected.", shown);
    }
    Ok(())
}

fn ensure_database(config: &ExportConfig) -> Result<()> {
    if !config.db_path.exists() {
        return Err(eyre!(
            "Database not found at: {}\nUse --db to specify the path manually.",
            config.db_path.display()
        ));
    }
    Ok(())
}

fn load_contacts(config: &ExportConfig) -> ContactBook {
    let path = config
        .contacts_db
        .clone()
        .or_else(|| default_contacts_path(&config.db_path));

    let Some(path) = path.filter(|p| p.exists()) else {
        tracing::warn!("Contact database not found; senders will show as ids or fallback labels");
        return ContactBook::default();
    };

    match ContactBook::load(&path) {
        Ok(book) if book.is_empty() => {
            tracing::warn!("No contacts found in {}; senders will show as ids or fallback labels", path.display());
            book
        }
        Ok(book) => {
            tracing::info!(contacts = book.len(), path = %path.display(), "loaded contacts");
            book
        }
        Err(e) => {
            tracing::warn!("Could not read contacts from {}: {:#}", path.display(), e);
            ContactBook::default()
        }
    }
}

/// Decode and normalize one row.
pub fn process_row<L: NameLookup + ?Sized>(
    row: &RawRow,
    lookup: &L,
    opts: &NormalizeOptions,
) -> Option<Message> {
    // Outgoing rows are attributed by IsSender; private chats have a single other party.
    let sender = if opts.is_group && !row.is_sender {
        decode_sender(row.bytes_extra.as_deref())
    } else {
        SenderIdentity::default()
    };
    let quote = decode_quote(row.compress_content.as_deref());
    normalizer::normalize(row, &sender, quote, lookup, opts)
}

/// Run the row source → decoder → normalizer → renderer pipeline into `writer`.
///
/// Stops reading rows once `filter.limit` messages have been written.
/// Returns the number of messages written.
pub fn export_to_writer<L, Tz, W>(
    source: &RowSource,
    lookup: &L,
    config: &ExportConfig,
    filter: &TranscriptFilter,
    tz: &Tz,
    writer: &mut W,
) -> Result<usize>
where
    L: NameLookup + ?Sized,
    Tz: TimeZone,
    Tz::Offset: Display,
    W: Write,
{
    let opts = config.normalize_options();
    let mut query = source.query(config.chat.as_deref())?;

    let mut failure = None;
    let mut skipped = 0usize;
    let messages = query
        .rows()?
        .map_while(|row| match row {
            Ok(row) => Some(row),
            Err(e) => {
                failure = Some(e);
                None
            }
        })
        .filter_map(|row| {
            let message = process_row(&row, lookup, &opts);
            if message.is_none() {
                skipped += 1;
            }
            message
        });

    let written = exporter::write_transcript(writer, messages, filter, tz)
        .wrap_err("Failed to write transcript")?;

    if let Some(e) = failure {
        return Err(e).wrap_err("Failed to read message row");
    }

    tracing::debug!(written, skipped, "export finished");
    Ok(written)
}
