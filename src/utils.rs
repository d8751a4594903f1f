use chrono::{DateTime, Local, Utc};
use eyre::{Context, Result};
use rusqlite::{Connection, OpenFlags, backup::Backup};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::info;

/// Label used for outgoing messages when the store does not name its owner.
pub const DEFAULT_SELF_LABEL: &str = "You";

/// Configuration required to run the export process.
/// This decouples the logic from how the arguments were parsed (CLI/Config file).
#[derive(Clone, Debug)]
pub struct ExportConfig {
    pub db_path: PathBuf,
    /// A file (single conversation) or a directory (`all`). `None` means stdout.
    pub output: Option<PathBuf>,
    pub conversation: Option<String>,
    pub all: bool,
    pub utc: bool,
    pub self_label: String,
}

/// Render a millisecond timestamp as `YYYY-MM-DD HH:MM:SS`. Non-positive values
/// mean "absent" and render as an empty string.
pub fn format_time(msec: i64, utc: bool) -> String {
    if msec <= 0 {
        return String::new();
    }
    let Some(dt) = DateTime::<Utc>::from_timestamp_millis(msec) else {
        return String::new();
    };
    const FMT: &str = "%Y-%m-%d %H:%M:%S";
    if utc {
        dt.format(FMT).to_string()
    } else {
        dt.with_timezone(&Local).format(FMT).to_string()
    }
}

/// Copy the database into a temporary file so the export never holds locks on
/// the live store.
pub fn backup_database(db_path: &Path) -> Result<NamedTempFile> {
    info!("Snapshotting database {}", db_path.display());
    let src = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .wrap_err_with(|| format!("Failed to open source database: {}", db_path.display()))?;

    let tmp = NamedTempFile::new().wrap_err("Failed to create temporary file")?;
    let mut dst =
        Connection::open(tmp.path()).wrap_err("Failed to open snapshot database connection")?;

    {
        let backup = Backup::new(&src, &mut dst).wrap_err("Failed to initialize backup")?;
        backup
            .run_to_completion(1000, Duration::from_millis(5), None)
            .wrap_err("Backup did not complete successfully")?;
    }

    drop(src);
    Ok(tmp)
}

/// File name for a conversation export: an id prefix plus a slug of its name.
pub fn output_file_name(id: &str, name: &str) -> String {
    let raw_slug = slug::slugify(name);
    // Truncate slug to 60 chars (slug output is ASCII-only, so byte == char)
    let slug = raw_slug[..raw_slug.len().min(60)].trim_end_matches('-');
    let prefix = &id[..id.char_indices().nth(8).map_or(id.len(), |(i, _)| i)];
    if slug.is_empty() {
        format!("{prefix}.json")
    } else {
        format!("{prefix}_{slug}.json")
    }
}
