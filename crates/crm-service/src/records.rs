//! Generic CRUD service for leads, contacts and deals.
//!
//! Every committed mutation writes one activity entry. A failed log write never
//! fails the mutation: it is reported with `tracing::warn!` and dropped.

use crate::activity::ActivityLogger;
use crate::resolve::Resolver;
use chrono::Utc;
use crm_types::{
    ActivityAction, NewActivity, Page, PageRequest, Record, RecordFilter, RecordStore,
    RequestOrigin, Resolved, ResolvedRefs, ServiceError, Stamp,
};
use std::sync::Arc;
use uuid::Uuid;

/// Who is performing a mutation and where the request came from.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: String,
    pub origin: RequestOrigin,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, origin: RequestOrigin) -> Self {
        Self {
            user_id: user_id.into(),
            origin,
        }
    }
}

pub struct RecordService<R: Record> {
    store: Arc<dyn RecordStore<R>>,
    resolver: Arc<Resolver>,
    activity: Arc<ActivityLogger>,
}

impl<R: Record> RecordService<R> {
    pub fn new(
        store: Arc<dyn RecordStore<R>>,
        resolver: Arc<Resolver>,
        activity: Arc<ActivityLogger>,
    ) -> Self {
        Self {
            store,
            resolver,
            activity,
        }
    }

    fn not_found() -> ServiceError {
        ServiceError::NotFound(format!("{} not found", R::KIND))
    }

    pub async fn list(
        &self,
        filter: &RecordFilter,
        page: PageRequest,
    ) -> Result<Page<Resolved<R>>, ServiceError> {
        filter.check::<R>()?;
        let total = self.store.count(filter).await?;
        let records = self
            .store
            .find(filter, page.skip(), Some(page.limit as usize))
            .await?;
        Ok(Page {
            items: self.resolver.resolve_all(records).await?,
            pagination: page.pagination(total),
        })
    }

    pub async fn get(&self, id: &str) -> Result<Resolved<R>, ServiceError> {
        let record = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(Self::not_found)?;
        Ok(self.resolver.resolve(record).await?)
    }

    pub async fn create(
        &self,
        input: R::Input,
        actor: &Actor,
    ) -> Result<Resolved<R>, ServiceError> {
        let stamp = Stamp {
            id: Uuid::new_v4().to_string(),
            created_by: actor.user_id.clone(),
            now: Utc::now(),
        };
        let mut record = R::from_input(input, stamp)?;
        let owner = record.assigned_to_mut();
        if owner.is_none() {
            *owner = Some(actor.user_id.clone());
        }
        self.resolver.check_links(record.refs(), None).await?;

        let record = self.store.insert(record).await?;
        tracing::info!(
            kind = %R::KIND,
            id = record.id(),
            actor = %actor.user_id,
            "record created"
        );
        self.log(
            NewActivity::new(&actor.user_id, ActivityAction::Create, R::KIND.module())
                .record(record.id(), record.title())
                .origin(actor.origin.clone()),
        )
        .await;
        Ok(self.committed(record).await)
    }

    pub async fn update(
        &self,
        id: &str,
        input: R::Input,
        actor: &Actor,
    ) -> Result<Resolved<R>, ServiceError> {
        let before = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(Self::not_found)?;
        let mut after = before.clone();
        after.apply_input(input, Utc::now())?;
        self.resolver
            .check_links(after.refs(), Some(before.refs()))
            .await?;

        // The record may have been deleted since it was read.
        let after = self
            .store
            .update_by_id(id, after)
            .await?
            .ok_or_else(Self::not_found)?;
        tracing::info!(kind = %R::KIND, id, actor = %actor.user_id, "record updated");
        self.log(
            NewActivity::new(&actor.user_id, ActivityAction::Update, R::KIND.module())
                .record(after.id(), after.title())
                .changes(R::change_set(before, after.clone()))
                .origin(actor.origin.clone()),
        )
        .await;
        Ok(self.committed(after).await)
    }

    pub async fn delete(&self, id: &str, actor: &Actor) -> Result<(), ServiceError> {
        let record = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(Self::not_found)?;
        let title = record.title();
        if !self.store.delete_by_id(id).await? {
            return Err(Self::not_found());
        }
        tracing::info!(kind = %R::KIND, id, actor = %actor.user_id, "record deleted");
        self.log(
            NewActivity::new(&actor.user_id, ActivityAction::Delete, R::KIND.module())
                .record(id, title)
                .origin(actor.origin.clone()),
        )
        .await;
        Ok(())
    }

    /// Resolves a record that is already saved. A lookup failure here must not turn a
    /// committed mutation into an error, so the references are left empty instead.
    async fn committed(&self, record: R) -> Resolved<R> {
        let resolved = match self.resolver.refs(record.refs()).await {
            Ok(refs) => refs,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    kind = %R::KIND,
                    id = record.id(),
                    "reference lookup failed after commit; returning unresolved record"
                );
                ResolvedRefs::default()
            }
        };
        Resolved { record, resolved }
    }

    async fn log(&self, activity: NewActivity) {
        let (action, record_id) = (activity.action, activity.record_id.clone());
        if let Err(e) = self.activity.record(activity).await {
            tracing::warn!(
                error = %e,
                %action,
                kind = %R::KIND,
                record_id = record_id.as_deref().unwrap_or(""),
                "activity log write failed; mutation kept"
            );
        }
    }
}
