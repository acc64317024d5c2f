//! Configuration errors, reported before any row is read.

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid {field} date {value:?}: expected YYYY-MM-DD")]
    InvalidDate { field: &'static str, value: String },

    #[error("Empty date range: --from-date {from} is after --to-date {to}")]
    EmptyDateRange { from: NaiveDate, to: NaiveDate },

    #[error("Group mode needs a conversation key.\nUse --chat <ID>@chatroom to choose the group.")]
    MissingGroupKey,

    #[error("Conversation {key:?} is a group chat; pass --group to export it")]
    GroupKeyInPrivateMode { key: String },

    #[error("Conversation {key:?} is not a group chat (group keys end with @chatroom)")]
    PrivateKeyInGroupMode { key: String },
}
