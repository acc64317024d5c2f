//! # wechat-transcript
//!
//! A CLI tool that turns WeChat desktop chat history into plain-text transcripts.
//!
//! ## What it does
//!
//! WeChat for Windows keeps messages in SQLite databases (`Msg/Multi/MSG*.db`) and
//! contacts in `Msg/MicroMsg.db`. Two message columns are opaque binary blobs:
//!
//! - `BytesExtra` is a protobuf record; in group chats it names the member who
//!   actually sent the message.
//! - `CompressContent` is an LZ4-compressed XML document; for quoted replies it
//!   holds the quoted author, the quoted text and the reply text.
//!
//! This tool reads the message table, decodes both blobs, resolves account ids to
//! contact names, drops media and system notices, and writes a transcript:
//!
//! ```text
//! Alice  (2024-10-01 09:15:02)
//! ┌─────────────────────────────
//! │ Bob: hello
//! └─────────────────────────────
//! ok!
//!
//! ```
//!
//! The databases are opened **read-only** and must already be decrypted.
//!
//! ## Usage
//!
//! ```sh
//! # A private chat
//! wechat-transcript --db Msg/Multi/MSG0.db --chat wxid_friend --output friend.txt
//!
//! # One group, October only
//! wechat-transcript --group --chat 12345678@chatroom --from-date 2024-10-01 --to-date 2024-10-31
//! ```
//!
//! Preferences can be persisted in `~/.config/wechat-transcript/config.toml`.
//!
//! ## Compatibility
//!
//! Both blob formats are undocumented and were worked out from samples. Unknown
//! fields are skipped and undecodable blobs degrade to "no sender" / "no quote"
//! instead of failing the export.
pub mod decoder;
pub mod error;
pub mod exporter;
pub mod importer;
pub mod inspect;
pub mod normalizer;
pub mod sequential;
pub mod utils;

pub use error::ConfigError;
pub use utils::ExportConfig;
