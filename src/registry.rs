use crate::models::DownloadSession;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared in-memory map of all live download sessions.
///
/// The registry is the sole owner of session records. It is touched by the
/// HTTP handlers (create/read), by each session's background task (mutate),
/// and by the cleanup scheduler (delete/sweep). Field updates to a given
/// session only ever come from its one owning task, so the coarse map lock
/// is all the synchronization needed; readers may observe a session
/// mid-update, which is fine because progress is advisory.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<String, DownloadSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new session. Ids are freshly generated UUIDs, so a
    /// collision is an invariant violation rather than a recoverable error.
    pub fn create(&self, session: DownloadSession) {
        let mut map = self.sessions.lock().unwrap();
        let previous = map.insert(session.id.clone(), session);
        assert!(previous.is_none(), "duplicate session id");
    }

    pub fn get(&self, id: &str) -> Option<DownloadSession> {
        self.sessions.lock().unwrap().get(id).cloned()
    }

    /// Applies an in-place update to the session, if it still exists.
    pub fn mutate<F>(&self, id: &str, f: F)
    where
        F: FnOnce(&mut DownloadSession),
    {
        let mut map = self.sessions.lock().unwrap();
        if let Some(session) = map.get_mut(id) {
            f(session);
        }
    }

    /// Removes the session. Idempotent.
    pub fn delete(&self, id: &str) -> Option<DownloadSession> {
        self.sessions.lock().unwrap().remove(id)
    }

    pub fn live_ids(&self) -> Vec<String> {
        self.sessions.lock().unwrap().keys().cloned().collect()
    }

    /// Evicts every session older than `max_age` regardless of status and
    /// best-effort deletes its temp file. Returns the evicted ids.
    pub fn sweep(&self, max_age: Duration) -> Vec<String> {
        let expired: Vec<(String, PathBuf)> = {
            let mut map = self.sessions.lock().unwrap();
            let stale: Vec<String> = map
                .iter()
                .filter(|(_, s)| s.created_at.elapsed() > max_age)
                .map(|(id, _)| id.clone())
                .collect();
            stale
                .into_iter()
                .filter_map(|id| map.remove(&id).map(|s| (id, s.file_path)))
                .collect()
        };

        // File removal happens outside the lock; the file may already be
        // gone (delivered and cleaned, or never produced).
        for (id, path) in &expired {
            if std::fs::remove_file(path).is_ok() {
                tracing::info!("Swept stale session {} and its file", id);
            } else {
                tracing::info!("Swept stale session {} (no file on disk)", id);
            }
        }
        expired.into_iter().map(|(id, _)| id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MediaFormat, SessionStatus};

    fn session(id: &str, dir: &std::path::Path) -> DownloadSession {
        DownloadSession::new(
            id.to_string(),
            MediaFormat::Video,
            format!("{id}.mp4"),
            dir.join(format!("{id}.mp4")),
        )
    }

    #[test]
    fn create_get_mutate_delete() {
        let registry = SessionRegistry::new();
        let dir = std::env::temp_dir();
        registry.create(session("a", &dir));

        assert_eq!(registry.get("a").unwrap().status, SessionStatus::Pending);
        registry.mutate("a", |s| {
            s.status = SessionStatus::Downloading;
            s.progress = 42.0;
        });
        let got = registry.get("a").unwrap();
        assert_eq!(got.status, SessionStatus::Downloading);
        assert_eq!(got.progress, 42.0);

        assert!(registry.delete("a").is_some());
        assert!(registry.delete("a").is_none());
        assert!(registry.get("a").is_none());
    }

    #[test]
    fn mutate_missing_id_is_a_noop() {
        let registry = SessionRegistry::new();
        registry.mutate("ghost", |s| s.progress = 99.0);
        assert!(registry.get("ghost").is_none());
    }

    #[test]
    fn sessions_are_isolated() {
        let registry = SessionRegistry::new();
        let dir = std::env::temp_dir();
        registry.create(session("a", &dir));
        registry.create(session("b", &dir));
        assert_ne!(
            registry.get("a").unwrap().file_path,
            registry.get("b").unwrap().file_path
        );

        registry.mutate("a", |s| s.status = SessionStatus::Error);
        assert_eq!(registry.get("b").unwrap().status, SessionStatus::Pending);
    }

    #[test]
    fn sweep_evicts_only_stale_entries() {
        let registry = SessionRegistry::new();
        let tmp = tempfile::tempdir().unwrap();
        let old = session("old", tmp.path());
        std::fs::write(&old.file_path, b"data").unwrap();
        let old_path = old.file_path.clone();
        registry.create(old);
        std::thread::sleep(Duration::from_millis(50));
        registry.create(session("fresh", tmp.path()));

        let evicted = registry.sweep(Duration::from_millis(25));
        assert_eq!(evicted, vec!["old".to_string()]);
        assert!(!old_path.exists());
        assert!(registry.get("old").is_none());
        assert!(registry.get("fresh").is_some());

        // A second sweep with nothing stale, and with the file already
        // gone, must not fail.
        assert!(registry.sweep(Duration::from_secs(600)).is_empty());
    }
}
