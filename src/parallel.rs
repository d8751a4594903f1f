use crate::exporter::ExportOptions;
use crate::export_conversation;
use crate::store::SqliteStore;
use crate::utils::{ExportConfig, output_file_name};
use crossbeam_channel::{SendTimeoutError, bounded};
use eyre::{Context, Result};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Export every conversation of the database at `db_path` into `target_dir`.
///
/// Each worker opens its own connection; a failing conversation is logged and
/// counted without stopping the others, and its partial file is removed.
/// Returns `(exported, failed)`, which always sum to the number of conversations.
pub fn execute(config: &ExportConfig, db_path: &Path, target_dir: &Path) -> Result<(usize, usize)> {
    fs::create_dir_all(target_dir).wrap_err("Failed to create target dir")?;

    let conversations: Vec<(String, String)> = {
        let store = SqliteStore::open(db_path).wrap_err("Failed to open database")?;
        store
            .conversations()
            .wrap_err("Failed to list conversations")?
            .into_iter()
            .map(|(id, rcp)| (id, rcp.display_name()))
            .collect()
    };

    let (exported, failed) = export_all(config, db_path, target_dir, &conversations);
    info!("Done. {exported} conversations exported. Errors: {failed}");
    Ok((exported, failed))
}

/// Run the worker pool over `(id, display name)` pairs.
fn export_all(
    config: &ExportConfig,
    db_path: &Path,
    target_dir: &Path,
    conversations: &[(String, String)],
) -> (usize, usize) {
    let (tx, rx) = bounded::<(String, String)>(64);
    let count_exported = AtomicUsize::new(0);
    let count_errors = AtomicUsize::new(0);
    let n_workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(8);

    std::thread::scope(|s| {
        for _ in 0..n_workers {
            let rx = rx.clone();
            let (count_exported, count_errors) = (&count_exported, &count_errors);
            let options = ExportOptions {
                self_label: config.self_label.clone(),
                utc: config.utc,
            };

            s.spawn(move || {
                let store = match SqliteStore::open(db_path) {
                    Ok(s) => s,
                    Err(e) => {
                        warn!("Worker DB open failed: {e}");
                        return;
                    }
                };

                while let Ok((id, name)) = rx.recv() {
                    let path = target_dir.join(output_file_name(&id, &name));
                    match export_to_file(&store, &id, &path, options.clone()) {
                        Ok(n) => {
                            count_exported.fetch_add(1, Ordering::Relaxed);
                            debug!("Wrote {} ({n} messages)", path.display());
                        }
                        Err(e) => {
                            count_errors.fetch_add(1, Ordering::Relaxed);
                            warn!("Error [{name}]: {e:#}");
                            let _ = fs::remove_file(&path);
                        }
                    }
                }
            });
        }

        drop(rx);

        'outer: for conv in conversations {
            let mut pending = conv.clone();
            loop {
                match tx.send_timeout(pending, Duration::from_millis(50)) {
                    Ok(()) => break,
                    Err(SendTimeoutError::Disconnected(_)) => break 'outer,
                    Err(SendTimeoutError::Timeout(r)) => {
                        pending = r;
                    }
                }
            }
        }

        drop(tx);
    });

    let exported = count_exported.load(Ordering::Relaxed);
    let errors = count_errors.load(Ordering::Relaxed);
    // Conversations never picked up (e.g. every worker failed to open the
    // database) count as failed too.
    let failed = conversations.len() - exported;
    if failed > errors {
        warn!("{} conversations were never exported", failed - errors);
    }
    (exported, failed)
}

fn export_to_file(
    store: &SqliteStore,
    conversation_id: &str,
    path: &Path,
    options: ExportOptions,
) -> Result<usize> {
    let file =
        File::create(path).wrap_err_with(|| format!("Failed to create: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let n = export_conversation(store, conversation_id, options, &mut writer)
        .wrap_err_with(|| format!("Failed to export {conversation_id}"))?;
    Ok(n)
}
