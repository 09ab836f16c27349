//! Persistence traits (record, activity, user directory) and the error types of each layer.

use crate::activity::{ActivityFilter, ActivityLogEntry};
use crate::record::{Record, User};
use crate::validate::ValidationError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Filter over one record kind: free-text search, exact attributes, creation window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    /// Case-insensitive substring over the kind's `SEARCH_FIELDS`.
    pub search: Option<String>,
    /// Exact matches; field names must be in the kind's `FILTER_FIELDS`.
    pub attributes: Vec<(&'static str, String)>,
    /// Inclusive lower bound on `createdAt`.
    pub created_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `createdAt`.
    pub created_to: Option<DateTime<Utc>>,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, text: Option<String>) -> Self {
        self.search = text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
        self
    }

    pub fn with(mut self, field: &'static str, value: impl Into<String>) -> Self {
        self.attributes.push((field, value.into()));
        self
    }

    pub fn created_between(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.created_from = from;
        self.created_to = to;
        self
    }

    /// Rejects attribute names the record kind does not expose.
    pub fn check<R: Record>(&self) -> Result<(), StoreError> {
        match self
            .attributes
            .iter()
            .find(|(f, _)| !R::FILTER_FIELDS.contains(f))
        {
            Some((f, _)) => Err(StoreError::InvalidFilter(format!(
                "{} cannot be filtered on {}",
                R::KIND,
                f
            ))),
            None => Ok(()),
        }
    }

    pub fn matches<R: Record>(&self, record: &R) -> bool {
        if let Some(ref needle) = self.search {
            let needle = needle.to_lowercase();
            if !record
                .search_values()
                .iter()
                .any(|v| v.to_lowercase().contains(&needle))
            {
                return false;
            }
        }
        if !self
            .attributes
            .iter()
            .all(|(f, v)| record.attribute(f) == Some(v.as_str()))
        {
            return false;
        }
        let created = record.created_at();
        self.created_from.map_or(true, |from| created >= from)
            && self.created_to.map_or(true, |to| created <= to)
    }
}

/// Document store for one record kind.
///
/// `find` returns newest-created first; records with equal `createdAt` come back
/// most-recently-inserted first.
#[async_trait]
pub trait RecordStore<R: Record>: Send + Sync {
    /// Matching records after skipping `skip`; `limit = None` returns all remaining.
    async fn find(
        &self,
        filter: &RecordFilter,
        skip: usize,
        limit: Option<usize>,
    ) -> Result<Vec<R>, StoreError>;

    async fn count(&self, filter: &RecordFilter) -> Result<usize, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<R>, StoreError>;

    async fn insert(&self, record: R) -> Result<R, StoreError>;

    /// Replaces the stored record; `Ok(None)` when no record has that id.
    async fn update_by_id(&self, id: &str, record: R) -> Result<Option<R>, StoreError>;

    /// `Ok(false)` when no record has that id.
    async fn delete_by_id(&self, id: &str) -> Result<bool, StoreError>;
}

/// Append-only activity log storage. Entries are never updated or removed.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn append(&self, entry: ActivityLogEntry) -> Result<(), StoreError>;

    /// Matching entries newest first.
    async fn find(
        &self,
        filter: &ActivityFilter,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<ActivityLogEntry>, StoreError>;

    async fn count(&self, filter: &ActivityFilter) -> Result<usize, StoreError>;
}

/// Read-only view of the users managed by the auth service.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<User>, StoreError>;

    async fn list(&self) -> Result<Vec<User>, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store error: {0}")]
    Other(String),
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("duplicate id: {0}")]
    Duplicate(String),
}

/// Failure to write an activity entry. Callers log and discard it.
#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
    #[error("activity log write failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Store(#[from] StoreError),
}

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ServiceError::Validation(ValidationError::new(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Lead, LeadInput, Stamp};
    use chrono::Duration;

    fn lead_at(at: DateTime<Utc>) -> Lead {
        Lead::from_input(
            LeadInput {
                first_name: Some("Émile".to_string()),
                last_name: Some("Zola".to_string()),
                email: Some("emile@zola.fr".to_string()),
                phone: Some("555".to_string()),
                ..Default::default()
            },
            Stamp {
                id: "l1".to_string(),
                created_by: "u1".to_string(),
                now: at,
            },
        )
        .unwrap()
    }

    #[test]
    fn created_window_includes_both_bounds() {
        let start: DateTime<Utc> = "2024-03-01T00:00:00Z".parse().unwrap();
        let end: DateTime<Utc> = "2024-03-31T23:59:59Z".parse().unwrap();
        let window = RecordFilter::new().created_between(Some(start), Some(end));
        let tick = Duration::microseconds(1);

        assert!(window.matches(&lead_at(start)));
        assert!(window.matches(&lead_at(end)));
        assert!(!window.matches(&lead_at(start - tick)));
        assert!(!window.matches(&lead_at(end + tick)));

        let open_end = RecordFilter::new().created_between(Some(start), None);
        assert!(open_end.matches(&lead_at(end + Duration::days(365))));
        assert!(!open_end.matches(&lead_at(start - tick)));
    }

    #[test]
    fn search_lowercases_unicode() {
        let lead = lead_at(Utc::now());
        assert!(RecordFilter::new().search(Some("ÉMILE".to_string())).matches(&lead));
        assert!(!RecordFilter::new().search(Some("emile z".to_string())).matches(&lead));
        assert!(RecordFilter::new().search(Some("   ".to_string())).matches(&lead));
    }
}
