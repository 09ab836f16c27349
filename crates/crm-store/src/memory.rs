//! In-memory stores (process lifetime only): records, activity log, user directory.

use crm_types::{
    ActivityFilter, ActivityLogEntry, ActivityStore, Record, RecordFilter, RecordStore,
    StoreError, User, UserDirectory,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory implementation of RecordStore.
/// Records are kept in insertion order; reads sort newest-created first.
pub struct InMemoryRecordStore<R> {
    records: Arc<RwLock<Vec<R>>>,
}

impl<R: Record> InMemoryRecordStore<R> {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }

    fn newest_first<'a>(records: impl Iterator<Item = &'a R>) -> Vec<R> {
        // Reversed insertion order + stable sort keeps later inserts first on ties.
        let mut out: Vec<R> = records.cloned().collect();
        out.reverse();
        out.sort_by_key(|r| std::cmp::Reverse(r.created_at()));
        out
    }
}

impl<R: Record> Default for InMemoryRecordStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl<R: Record> RecordStore<R> for InMemoryRecordStore<R> {
    async fn find(
        &self,
        filter: &RecordFilter,
        skip: usize,
        limit: Option<usize>,
    ) -> Result<Vec<R>, StoreError> {
        filter.check::<R>()?;
        let guard = self.records.read().await;
        let matching = Self::newest_first(guard.iter().filter(|r| filter.matches(*r)));
        Ok(matching
            .into_iter()
            .skip(skip)
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn count(&self, filter: &RecordFilter) -> Result<usize, StoreError> {
        filter.check::<R>()?;
        let guard = self.records.read().await;
        Ok(guard.iter().filter(|r| filter.matches(*r)).count())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<R>, StoreError> {
        let guard = self.records.read().await;
        Ok(guard.iter().find(|r| r.id() == id).cloned())
    }

    async fn insert(&self, record: R) -> Result<R, StoreError> {
        let mut guard = self.records.write().await;
        if guard.iter().any(|r| r.id() == record.id()) {
            return Err(StoreError::Duplicate(record.id().to_string()));
        }
        guard.push(record.clone());
        Ok(record)
    }

    async fn update_by_id(&self, id: &str, record: R) -> Result<Option<R>, StoreError> {
        let mut guard = self.records.write().await;
        match guard.iter_mut().find(|r| r.id() == id) {
            Some(slot) => {
                *slot = record.clone();
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn delete_by_id(&self, id: &str) -> Result<bool, StoreError> {
        let mut guard = self.records.write().await;
        let before = guard.len();
        guard.retain(|r| r.id() != id);
        Ok(guard.len() != before)
    }
}

/// In-memory implementation of ActivityStore (process lifetime only).
pub struct InMemoryActivityStore {
    entries: RwLock<Vec<ActivityLogEntry>>,
}

impl InMemoryActivityStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryActivityStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Filters, orders newest first and pages a batch of activity entries.
pub(crate) fn select_activity(
    entries: Vec<ActivityLogEntry>,
    filter: &ActivityFilter,
    skip: usize,
    limit: usize,
) -> Vec<ActivityLogEntry> {
    let mut out: Vec<ActivityLogEntry> =
        entries.into_iter().filter(|e| filter.matches(e)).collect();
    out.reverse();
    out.sort_by_key(|e| std::cmp::Reverse(e.timestamp));
    out.into_iter().skip(skip).take(limit).collect()
}

#[async_trait::async_trait]
impl ActivityStore for InMemoryActivityStore {
    async fn append(&self, entry: ActivityLogEntry) -> Result<(), StoreError> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn find(
        &self,
        filter: &ActivityFilter,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<ActivityLogEntry>, StoreError> {
        let guard = self.entries.read().await;
        Ok(select_activity(guard.clone(), filter, skip, limit))
    }

    async fn count(&self, filter: &ActivityFilter) -> Result<usize, StoreError> {
        let guard = self.entries.read().await;
        Ok(guard.iter().filter(|e| filter.matches(e)).count())
    }
}

/// Fixed set of users, loaded once at startup.
pub struct InMemoryUserDirectory {
    users: HashMap<String, User>,
}

impl InMemoryUserDirectory {
    pub fn new(users: impl IntoIterator<Item = User>) -> Self {
        Self {
            users: users.into_iter().map(|u| (u.id.clone(), u)).collect(),
        }
    }

    /// Loads a JSON array of users.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            StoreError::Other(format!("read {}: {}", path.as_ref().display(), e))
        })?;
        let users: Vec<User> =
            serde_json::from_str(&content).map_err(|e| StoreError::Other(e.to_string()))?;
        Ok(Self::new(users))
    }
}

#[async_trait::async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let mut out: Vec<User> = self.users.values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use crm_types::{
        ActivityAction, ActivityModule, Lead, LeadInput, LeadStatus, NewActivity, Record, Stamp,
        UserRole,
    };

    fn lead(id: &str, first: &str, company: Option<&str>, at: chrono::DateTime<Utc>) -> Lead {
        Lead::from_input(
            LeadInput {
                first_name: Some(first.to_string()),
                last_name: Some("Smith".to_string()),
                email: Some(format!("{}@example.com", id)),
                phone: Some("555".to_string()),
                company: company.map(str::to_string),
                ..Default::default()
            },
            Stamp {
                id: id.to_string(),
                created_by: "u1".to_string(),
                now: at,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn find_sorts_newest_first_and_pages() {
        let store = InMemoryRecordStore::<Lead>::new();
        let t0 = Utc::now();
        for i in 0..5 {
            store
                .insert(lead(&format!("l{}", i), "Ann", None, t0 + Duration::seconds(i)))
                .await
                .unwrap();
        }
        let page = store.find(&RecordFilter::new(), 1, Some(2)).await.unwrap();
        let ids: Vec<&str> = page.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["l3", "l2"]);

        let past_end = store.find(&RecordFilter::new(), 10, Some(2)).await.unwrap();
        assert!(past_end.is_empty());
        assert_eq!(store.count(&RecordFilter::new()).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn search_is_case_insensitive_across_fields() {
        let store = InMemoryRecordStore::<Lead>::new();
        let now = Utc::now();
        store.insert(lead("a", "Ann", Some("Globex"), now)).await.unwrap();
        store.insert(lead("b", "Bob", Some("Initech"), now)).await.unwrap();

        let f = RecordFilter::new().search(Some("GLOB".to_string()));
        let found = store.find(&f, 0, None).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a");

        let f = RecordFilter::new().search(Some("b@example".to_string()));
        assert_eq!(store.count(&f).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn attribute_filter_and_whitelist() {
        let store = InMemoryRecordStore::<Lead>::new();
        let now = Utc::now();
        let mut qualified = lead("q", "Quinn", None, now);
        qualified.status = LeadStatus::Qualified;
        store.insert(qualified).await.unwrap();
        store.insert(lead("n", "Nora", None, now)).await.unwrap();

        let f = RecordFilter::new().with("status", "Qualified");
        let found = store.find(&f, 0, None).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "q");

        let bad = RecordFilter::new().with("stage", "Won");
        assert!(matches!(
            store.count(&bad).await,
            Err(StoreError::InvalidFilter(_))
        ));
    }

    #[tokio::test]
    async fn update_and_delete_report_missing_ids() {
        let store = InMemoryRecordStore::<Lead>::new();
        let l = lead("x", "Xena", None, Utc::now());
        store.insert(l.clone()).await.unwrap();
        assert!(matches!(
            store.insert(l.clone()).await,
            Err(StoreError::Duplicate(_))
        ));

        let mut changed = l.clone();
        changed.first_name = "Xavier".to_string();
        assert!(store.update_by_id("x", changed).await.unwrap().is_some());
        assert_eq!(
            store.find_by_id("x").await.unwrap().unwrap().title(),
            "Xavier Smith"
        );
        assert!(store.update_by_id("nope", l).await.unwrap().is_none());

        assert!(store.delete_by_id("x").await.unwrap());
        assert!(!store.delete_by_id("x").await.unwrap());
        assert!(store.find_by_id("x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn activity_entries_newest_first_with_filters() {
        let store = InMemoryActivityStore::new();
        let t0 = Utc::now();
        for (i, module) in [ActivityModule::Lead, ActivityModule::Deal, ActivityModule::Lead]
            .into_iter()
            .enumerate()
        {
            let entry = NewActivity::new("u1", ActivityAction::Create, module)
                .record(format!("r{}", i), "t")
                .into_entry(format!("e{}", i), t0 + Duration::seconds(i as i64));
            store.append(entry).await.unwrap();
        }
        let f = ActivityFilter {
            module: Some(ActivityModule::Lead),
            ..Default::default()
        };
        let found = store.find(&f, 0, 50).await.unwrap();
        let ids: Vec<&str> = found.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e2", "e0"]);
        assert_eq!(store.count(&ActivityFilter::default()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn user_directory_lists_by_name() {
        let dir = InMemoryUserDirectory::new(vec![
            User {
                id: "2".to_string(),
                name: "Zoe".to_string(),
                email: "zoe@example.com".to_string(),
                role: UserRole::Agent,
            },
            User {
                id: "1".to_string(),
                name: "Adam".to_string(),
                email: "adam@example.com".to_string(),
                role: UserRole::Admin,
            },
        ]);
        let names: Vec<String> = dir.list().await.unwrap().into_iter().map(|u| u.name).collect();
        assert_eq!(names, vec!["Adam", "Zoe"]);
        assert_eq!(dir.get("2").await.unwrap().unwrap().role, UserRole::Agent);
        assert!(dir.get("3").await.unwrap().is_none());
    }
}
