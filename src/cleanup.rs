use crate::registry::SessionRegistry;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;
use walkdir::WalkDir;

/// One-shot deferred cleanup after a successful file delivery: waits out the
/// grace period, then removes the session and its file ahead of the periodic
/// sweep. Tolerates both already being gone.
pub fn schedule_removal(registry: SessionRegistry, id: String, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Some(session) = registry.delete(&id) {
            let _ = tokio::fs::remove_file(&session.file_path).await;
            tracing::info!("Removed delivered session {}", id);
        }
    });
}

/// Periodic sweep loop: evicts sessions past the retention window and prunes
/// orphaned temp files the registry no longer knows about.
pub async fn run_cleanup_loop(
    registry: SessionRegistry,
    temp_dir: PathBuf,
    interval: Duration,
    retention: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    // interval fires immediately on the first tick
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let evicted = registry.sweep(retention);
        if !evicted.is_empty() {
            tracing::info!("Sweep evicted {} stale session(s)", evicted.len());
        }
        remove_orphans(&registry, &temp_dir, retention);
    }
}

/// Deletes `{uuid}.mp3` / `{uuid}.mp4` files older than the retention window
/// whose id is no longer in the registry. Only files following our naming
/// scheme are touched; the temp directory may be shared.
fn remove_orphans(registry: &SessionRegistry, temp_dir: &Path, retention: Duration) {
    let live: HashSet<String> = registry.live_ids().into_iter().collect();

    for entry in WalkDir::new(temp_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let is_session_ext = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("mp3") | Some("mp4")
        );
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
        if !is_session_ext || Uuid::parse_str(stem).is_err() || live.contains(stem) {
            continue;
        }

        let old_enough = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.elapsed().ok())
            .map_or(false, |age| age > retention);
        if old_enough && std::fs::remove_file(path).is_ok() {
            tracing::info!("Removed orphaned temp file {}", path.display());
        }
    }
}
