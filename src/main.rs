use clap::Parser;
use eyre::{Context, Result, eyre};
use serde::Deserialize;
use signal_chat_export::exporter::ExportOptions;
use signal_chat_export::store::SqliteStore;
use signal_chat_export::utils::{self, DEFAULT_SELF_LABEL, ExportConfig};
use signal_chat_export::{export_conversation, parallel};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Export Signal Desktop conversations to JSON.
/// Reads a decrypted copy of the Signal Desktop database.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Output file (single conversation) or directory (--all).
    /// Defaults to stdout, or ./signal-chat-export with --all.
    #[arg(value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Path to the decrypted Signal database.
    /// Defaults to the Signal Desktop data directory.
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// ID of the conversation to export.
    #[arg(short, long, value_name = "ID", conflicts_with_all = ["all", "list"])]
    conversation: Option<String>,

    /// Export every conversation into the OUTPUT directory.
    #[arg(long, conflicts_with = "list")]
    all: bool,

    /// List conversations and their IDs.
    #[arg(long)]
    list: bool,

    /// Path to a specific configuration file.
    /// Defaults to $XDG_CONFIG_HOME/signal-chat-export/config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Format timestamps in UTC instead of local time.
    #[arg(long)]
    utc: bool,

    /// Label for your own messages when the database does not name you.
    #[arg(long, value_name = "LABEL")]
    self_label: Option<String>,

    /// Log every conversation written.
    #[arg(short, long)]
    verbose: bool,

    /// Only log warnings and errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    db_path: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    #[serde(default)]
    utc: bool,
    self_label: Option<String>,
}

fn default_db_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("Signal/sql/db.sqlite"))
}

fn load_file_config(explicit_path: Option<&Path>) -> Result<FileConfig> {
    let path = if let Some(p) = explicit_path {
        if !p.exists() {
            return Err(eyre!("Config file not found: {}", p.display()));
        }
        Some(p.to_path_buf())
    } else {
        dirs::config_dir()
            .map(|d| d.join("signal-chat-export/config.toml"))
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

fn init_tracing(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    // 1. Load config file (CLI path > default path)
    let file_cfg = load_file_config(cli.config.as_deref())?;

    // 2. Resolve db_path (CLI > Config > Auto-detect)
    let db_path = cli
        .db
        .or(file_cfg.db_path)
        .or_else(default_db_path)
        .ok_or_else(|| {
            eyre!("Could not determine database path.\nUse --db to specify manually, or set db_path in config.toml.")
        })?;

    if !db_path.exists() {
        return Err(eyre!(
            "Database not found at: {}\nUse --db to specify the path manually.",
            db_path.display()
        ));
    }

    // 3. Build the Export Config
    let config = ExportConfig {
        db_path,
        output: cli.output.or(file_cfg.output_dir),
        conversation: cli.conversation,
        all: cli.all,
        utc: cli.utc || file_cfg.utc,
        self_label: cli
            .self_label
            .or(file_cfg.self_label)
            .unwrap_or_else(|| DEFAULT_SELF_LABEL.to_string()),
    };

    if !cli.list && !config.all && config.conversation.is_none() {
        return Err(eyre!(
            "Nothing to do.\nUse --conversation ID, --all, or --list."
        ));
    }

    // 4. Run the Business Logic on a snapshot
    let snapshot = utils::backup_database(&config.db_path)?;

    if cli.list {
        return list_conversations(snapshot.path());
    }

    if config.all {
        let target_dir = config
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from("signal-chat-export"));
        let (_, failed) = parallel::execute(&config, snapshot.path(), &target_dir)?;
        if failed > 0 {
            return Err(eyre!("{failed} conversations failed to export"));
        }
        return Ok(());
    }

    export_one(&config, snapshot.path())
}

fn list_conversations(db_path: &Path) -> Result<()> {
    let store = SqliteStore::open(db_path).wrap_err("Failed to open database")?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for (id, rcp) in store.conversations()? {
        writeln!(out, "{id}\t{}", rcp.display_name())?;
    }
    Ok(())
}

fn export_one(config: &ExportConfig, db_path: &Path) -> Result<()> {
    let Some(id) = config.conversation.as_deref() else {
        return Err(eyre!("No conversation selected"));
    };
    let store = SqliteStore::open(db_path).wrap_err("Failed to open database")?;
    let options = ExportOptions {
        self_label: config.self_label.clone(),
        utc: config.utc,
    };

    let count = match &config.output {
        Some(path) => {
            let file = File::create(path)
                .wrap_err_with(|| format!("Failed to create: {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            export_conversation(&store, id, options, &mut writer)
                .wrap_err_with(|| format!("Failed to export {id}"))?
        }
        None => {
            let stdout = io::stdout();
            let mut writer = BufWriter::new(stdout.lock());
            export_conversation(&store, id, options, &mut writer)
                .wrap_err_with(|| format!("Failed to export {id}"))?
        }
    };

    info!("Exported {count} messages");
    Ok(())
}
