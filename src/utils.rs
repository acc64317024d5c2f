use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::importer::is_group_key;
use crate::normalizer::NormalizeOptions;

/// Configuration required to run the export process.
/// This decouples the logic from how the arguments were parsed (CLI/Config file).
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub db_path: PathBuf,
    /// `MicroMsg.db`; `None` exports with raw ids and fallback labels.
    pub contacts_db: Option<PathBuf>,
    /// `-` writes to stdout.
    pub output: PathBuf,
    pub limit: Option<usize>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub self_label: String,
    pub receiver_label: String,
    pub group: bool,
    pub group_name: String,
    /// Conversation key (`StrTalker`); `None` exports every row.
    pub chat: Option<String>,
    pub self_id: Option<String>,
    pub pseudonymize: bool,
    /// Describe the first N rows instead of exporting.
    pub inspect: Option<usize>,
    pub quiet: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("MSG.db"),
            contacts_db: None,
            output: PathBuf::from("chat_records.txt"),
            limit: None,
            from_date: None,
            to_date: None,
            self_label: "Me".to_owned(),
            receiver_label: "Unknown".to_owned(),
            group: false,
            group_name: "Group chat".to_owned(),
            chat: None,
            self_id: None,
            pseudonymize: false,
            inspect: None,
            quiet: false,
        }
    }
}

impl ExportConfig {
    /// Check everything that can be checked without touching the databases.
    pub fn validate(&self) -> Result<DateWindow, ConfigError> {
        match (self.group, self.chat.as_deref()) {
            (true, None) => return Err(ConfigError::MissingGroupKey),
            (true, Some(key)) if !is_group_key(key) => {
                return Err(ConfigError::PrivateKeyInGroupMode { key: key.to_owned() });
            }
            (false, Some(key)) if is_group_key(key) => {
                return Err(ConfigError::GroupKeyInPrivateMode { key: key.to_owned() });
            }
            _ => {}
        }

        DateWindow::parse(self.from_date.as_deref(), self.to_date.as_deref())
    }

    /// `--limit 0` means no limit.
    pub fn effective_limit(&self) -> Option<usize> {
        self.limit.filter(|&n| n > 0)
    }

    pub fn writes_to_stdout(&self) -> bool {
        self.output.as_os_str() == "-"
    }

    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            is_group: self.group,
            self_label: self.self_label.clone(),
            // In a group an unidentified member is best described by the group itself.
            fallback_label: if self.group {
                self.group_name.clone()
            } else {
                self.receiver_label.clone()
            },
            self_id: self.self_id.clone(),
            pseudonymize: self.pseudonymize,
        }
    }
}

/// The WeChat layout keeps `MicroMsg.db` two levels above `Multi/MSG.db`.
pub fn default_contacts_path(db_path: &Path) -> Option<PathBuf> {
    db_path
        .parent()
        .and_then(Path::parent)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join("MicroMsg.db"))
}

/// Inclusive whole-day bounds; a missing side is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateWindow {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateWindow {
    pub fn parse(from: Option<&str>, to: Option<&str>) -> Result<Self, ConfigError> {
        let window = Self {
            from: from.map(|v| parse_day("from", v)).transpose()?,
            to: to.map(|v| parse_day("to", v)).transpose()?,
        };
        if let (Some(from), Some(to)) = (window.from, window.to)
            && from > to
        {
            return Err(ConfigError::EmptyDateRange { from, to });
        }
        Ok(window)
    }

    /// Whether `ts` falls on an included calendar day in `tz`.
    pub fn contains<Tz: TimeZone>(&self, ts: &DateTime<Utc>, tz: &Tz) -> bool {
        let day = ts.with_timezone(tz).date_naive();
        self.from.is_none_or(|from| day >= from) && self.to.is_none_or(|to| day <= to)
    }
}

fn parse_day(field: &'static str, value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| ConfigError::InvalidDate {
        field,
        value: value.to_owned(),
    })
}
