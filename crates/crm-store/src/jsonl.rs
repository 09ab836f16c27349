//! JSONL file-backed activity store (persists across restarts).

use crate::memory::select_activity;
use async_trait::async_trait;
use crm_types::{ActivityFilter, ActivityLogEntry, ActivityStore, StoreError};
use tokio::io::AsyncWriteExt;

/// Append-only activity log, one JSON entry per line.
pub struct JsonlActivityStore {
    path: std::path::PathBuf,
    append_lock: tokio::sync::Mutex<()>,
}

impl JsonlActivityStore {
    pub fn new(path: impl AsRef<std::path::Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            append_lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<Vec<ActivityLogEntry>, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Other(e.to_string())),
        };
        let mut out = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(entry) => out.push(entry),
                Err(e) => tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "skipping unreadable activity line"
                ),
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl ActivityStore for JsonlActivityStore {
    async fn append(&self, entry: ActivityLogEntry) -> Result<(), StoreError> {
        let _guard = self.append_lock.lock().await;
        let line = serde_json::to_string(&entry).map_err(|e| StoreError::Other(e.to_string()))?;
        let mut f = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| StoreError::Other(e.to_string()))?;
        f.write_all(format!("{}\n", line).as_bytes())
            .await
            .map_err(|e| StoreError::Other(e.to_string()))?;
        Ok(())
    }

    async fn find(
        &self,
        filter: &ActivityFilter,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<ActivityLogEntry>, StoreError> {
        Ok(select_activity(self.load().await?, filter, skip, limit))
    }

    async fn count(&self, filter: &ActivityFilter) -> Result<usize, StoreError> {
        Ok(self.load().await?.iter().filter(|e| filter.matches(e)).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use crm_types::{ActivityAction, ActivityModule, NewActivity};

    #[tokio::test]
    async fn entries_survive_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity.jsonl");
        let t0 = Utc::now();
        {
            let store = JsonlActivityStore::new(&path);
            for i in 0..3 {
                let e = NewActivity::new("u1", ActivityAction::Update, ActivityModule::Contact)
                    .record("c1", "Ann Lee")
                    .into_entry(format!("e{}", i), t0 + Duration::seconds(i));
                store.append(e).await.unwrap();
            }
        }
        let reopened = JsonlActivityStore::new(&path);
        let f = ActivityFilter {
            record_id: Some("c1".to_string()),
            ..Default::default()
        };
        assert_eq!(reopened.count(&f).await.unwrap(), 3);
        let newest = reopened.find(&f, 0, 1).await.unwrap();
        assert_eq!(newest[0].id, "e2");
        assert_eq!(newest[0].record_title.as_deref(), Some("Ann Lee"));
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlActivityStore::new(dir.path().join("none.jsonl"));
        assert_eq!(store.count(&ActivityFilter::default()).await.unwrap(), 0);
    }
}
