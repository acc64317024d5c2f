use clap::Parser;
use eyre::{Context, Result, eyre};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use wechat_transcript::{ExportConfig, sequential};

/// Export WeChat desktop chat history to a plain-text transcript.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the decrypted message database (MSG.db / MSG0.db).
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Path to the decrypted contact database (MicroMsg.db).
    /// Defaults to Msg/MicroMsg.db next to the message database's Multi/ directory.
    #[arg(long, value_name = "PATH")]
    contacts_db: Option<PathBuf>,

    /// Transcript file to write, or "-" for stdout.
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Path to a specific configuration file.
    /// Defaults to $XDG_CONFIG_HOME/wechat-transcript/config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Export at most this many messages (0 means no limit).
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// First day to include (YYYY-MM-DD, local time).
    #[arg(long, value_name = "DATE")]
    from_date: Option<String>,

    /// Last day to include (YYYY-MM-DD, local time).
    #[arg(long, value_name = "DATE")]
    to_date: Option<String>,

    /// Label for your own messages.
    #[arg(long, value_name = "NAME")]
    sender: Option<String>,

    /// Label for the other party when no contact name is found.
    #[arg(long, value_name = "NAME")]
    receiver: Option<String>,

    /// Export a group chat (requires --chat <ID>@chatroom).
    #[arg(long)]
    group: bool,

    /// Group label, used when a member cannot be identified.
    #[arg(long, value_name = "NAME")]
    group_name: Option<String>,

    /// Conversation key (wxid_… or …@chatroom). Exports every conversation if omitted.
    #[arg(long, value_name = "ID")]
    chat: Option<String>,

    /// Your own WeChat id, so your group messages get the --sender label.
    #[arg(long, value_name = "ID")]
    self_id: Option<String>,

    /// Give unknown group members stable made-up names instead of raw ids.
    #[arg(long)]
    pseudonymize: bool,

    /// Instead of exporting, show how the first N rows decode (default 20).
    #[arg(long, value_name = "N", num_args = 0..=1, default_missing_value = "20")]
    inspect: Option<usize>,

    /// More logging (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress the summary line.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    db_path: Option<PathBuf>,
    contacts_db: Option<PathBuf>,
    output: Option<PathBuf>,
    limit: Option<usize>,
    from_date: Option<String>,
    to_date: Option<String>,
    sender: Option<String>,
    receiver: Option<String>,
    group: Option<bool>,
    group_name: Option<String>,
    chat: Option<String>,
    self_id: Option<String>,
    pseudonymize: Option<bool>,
}

fn load_file_config(explicit_path: Option<&Path>) -> Result<FileConfig> {
    let path = if let Some(p) = explicit_path {
        if !p.exists() {
            return Err(eyre!("Config file not found: {}", p.display()));
        }
        Some(p.to_path_buf())
    } else {
        // Search: XDG/OS config dir, then nothing
        dirs::config_dir()
            .map(|d| d.join("wechat-transcript/config.toml"))
            .filter(|p| p.exists())
    };

    match path {
        None => Ok(FileConfig::default()),
        Some(p) => {
            let content = fs::read_to_string(&p)
                .wrap_err_with(|| format!("Failed to read config: {}", p.display()))?;
            toml::from_str(&content)
                .wrap_err_with(|| format!("Failed to parse config: {}", p.display()))
        }
    }
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "warn,wechat_transcript=debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // 1. Load config file (CLI path > default path)
    let file_cfg = load_file_config(cli.config.as_deref())?;
    let defaults = ExportConfig::default();

    // 2. Resolve every option (CLI > Config > Default)
    let config = ExportConfig {
        db_path: cli.db.or(file_cfg.db_path).unwrap_or(defaults.db_path),
        contacts_db: cli.contacts_db.or(file_cfg.contacts_db),
        output: cli.output.or(file_cfg.output).unwrap_or(defaults.output),
        limit: cli.limit.or(file_cfg.limit),
        from_date: cli.from_date.or(file_cfg.from_date),
        to_date: cli.to_date.or(file_cfg.to_date),
        self_label: cli.sender.or(file_cfg.sender).unwrap_or(defaults.self_label),
        receiver_label: cli
            .receiver
            .or(file_cfg.receiver)
            .unwrap_or(defaults.receiver_label),
        group: cli.group || file_cfg.group.unwrap_or(false),
        group_name: cli
            .group_name
            .or(file_cfg.group_name)
            .unwrap_or(defaults.group_name),
        chat: cli.chat.or(file_cfg.chat),
        self_id: cli.self_id.or(file_cfg.self_id),
        pseudonymize: cli.pseudonymize || file_cfg.pseudonymize.unwrap_or(false),
        inspect: cli.inspect,
        quiet: cli.quiet,
    };

    // 3. Run the business logic
    sequential::execute(config)
}
