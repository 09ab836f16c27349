//! Activity logger: append-only audit trail plus filtered, paginated queries.

use chrono::Utc;
use crm_types::{
    ActivityAction, ActivityError, ActivityFilter, ActivityLogEntry, ActivityModule, ActivityStore,
    ActivityView, NewActivity, Page, PageRequest, RequestOrigin, ServiceError, UserDirectory,
    UserSummary,
};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub struct ActivityLogger {
    store: Arc<dyn ActivityStore>,
    users: Arc<dyn UserDirectory>,
}

impl ActivityLogger {
    pub fn new(store: Arc<dyn ActivityStore>, users: Arc<dyn UserDirectory>) -> Self {
        Self { store, users }
    }

    /// Persists one entry with a server-assigned id and timestamp.
    ///
    /// Single write attempt, no retry. Callers recording the side effect of a committed
    /// mutation report an `Err` on the operational log and carry on.
    pub async fn record(&self, activity: NewActivity) -> Result<ActivityLogEntry, ActivityError> {
        let entry = activity.into_entry(Uuid::new_v4().to_string(), Utc::now());
        self.store.append(entry.clone()).await?;
        tracing::debug!(
            action = %entry.action,
            module = %entry.module,
            record_id = entry.record_id.as_deref().unwrap_or(""),
            "activity recorded"
        );
        Ok(entry)
    }

    /// LOGIN entry under the `Auth` module.
    ///
    /// Hook for the external auth service, which owns sessions: it calls this after a
    /// successful sign-in. Nothing in this workspace issues sessions itself.
    pub async fn record_login(
        &self,
        user_id: &str,
        origin: RequestOrigin,
    ) -> Result<ActivityLogEntry, ActivityError> {
        self.record(
            NewActivity::new(user_id, ActivityAction::Login, ActivityModule::Auth).origin(origin),
        )
        .await
    }

    /// LOGOUT entry under the `Auth` module; the sign-out counterpart of
    /// [`record_login`](Self::record_login), called by the same external auth service.
    pub async fn record_logout(
        &self,
        user_id: &str,
        origin: RequestOrigin,
    ) -> Result<ActivityLogEntry, ActivityError> {
        self.record(
            NewActivity::new(user_id, ActivityAction::Logout, ActivityModule::Auth).origin(origin),
        )
        .await
    }

    /// Entries matching `filter`, newest first, with each actor resolved.
    pub async fn query(
        &self,
        filter: &ActivityFilter,
        page: PageRequest,
    ) -> Result<Page<ActivityView>, ServiceError> {
        let total = self.store.count(filter).await?;
        let entries = self
            .store
            .find(filter, page.skip(), page.limit as usize)
            .await?;

        let mut actors: HashMap<String, Option<UserSummary>> = HashMap::new();
        let mut items = Vec::with_capacity(entries.len());
        for entry in entries {
            let user = match actors.get(&entry.user_id) {
                Some(u) => u.clone(),
                None => {
                    let u = self.users.get(&entry.user_id).await?.map(|u| u.summary());
                    actors.insert(entry.user_id.clone(), u.clone());
                    u
                }
            };
            items.push(ActivityView { entry, user });
        }
        Ok(Page {
            items,
            pagination: page.pagination(total),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{users, FailingActivityStore};
    use crm_store::InMemoryActivityStore;
    use crm_types::DEFAULT_ACTIVITY_LIMIT;

    #[tokio::test]
    async fn query_pages_newest_first_and_resolves_actor() {
        let logger = ActivityLogger::new(Arc::new(InMemoryActivityStore::new()), users());
        for i in 0..95 {
            logger
                .record(
                    NewActivity::new("admin", ActivityAction::Create, ActivityModule::Lead)
                        .record(format!("l{}", i), format!("Lead {}", i)),
                )
                .await
                .unwrap();
        }
        let page = PageRequest::new(Some(1), Some(20), DEFAULT_ACTIVITY_LIMIT).unwrap();
        let res = logger.query(&ActivityFilter::default(), page).await.unwrap();
        assert_eq!(res.pagination.total, 95);
        assert_eq!(res.pagination.pages, 5);
        assert_eq!(res.items.len(), 20);
        assert_eq!(res.items[0].entry.record_id.as_deref(), Some("l94"));
        assert_eq!(res.items[0].user.as_ref().unwrap().name, "Ada Admin");

        let beyond = PageRequest::new(Some(6), Some(20), DEFAULT_ACTIVITY_LIMIT).unwrap();
        let res = logger.query(&ActivityFilter::default(), beyond).await.unwrap();
        assert!(res.items.is_empty());
        assert_eq!(res.pagination.page, 6);
        assert_eq!(res.pagination.pages, 5);
    }

    #[tokio::test]
    async fn filters_by_action_and_unknown_actor_resolves_to_none() {
        let logger = ActivityLogger::new(Arc::new(InMemoryActivityStore::new()), users());
        logger
            .record_login("ghost", RequestOrigin::default())
            .await
            .unwrap();
        logger
            .record_logout("admin", RequestOrigin::default())
            .await
            .unwrap();
        let filter = ActivityFilter {
            action: Some(ActivityAction::Login),
            ..Default::default()
        };
        let page = PageRequest::new(None, None, DEFAULT_ACTIVITY_LIMIT).unwrap();
        let res = logger.query(&filter, page).await.unwrap();
        assert_eq!(res.items.len(), 1);
        assert_eq!(res.items[0].entry.module, ActivityModule::Auth);
        assert!(res.items[0].user.is_none());
    }

    #[tokio::test]
    async fn failed_write_surfaces_as_error() {
        let logger = ActivityLogger::new(Arc::new(FailingActivityStore), users());
        let res = logger
            .record(NewActivity::new("admin", ActivityAction::Delete, ActivityModule::Deal))
            .await;
        assert!(matches!(res, Err(ActivityError::Store(_))));
    }
}
