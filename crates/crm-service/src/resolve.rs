//! Read-time resolution of record references into display projections.

use crm_types::{
    Contact, ContactSummary, Lead, LeadSummary, Record, RecordRefs, RecordStore, Resolved,
    ResolvedRefs, ServiceError, StoreError, UserDirectory, UserSummary,
};
use std::sync::Arc;

/// Looks up the users, contacts and leads a record points at.
pub struct Resolver {
    users: Arc<dyn UserDirectory>,
    contacts: Arc<dyn RecordStore<Contact>>,
    leads: Arc<dyn RecordStore<Lead>>,
}

impl Resolver {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        contacts: Arc<dyn RecordStore<Contact>>,
        leads: Arc<dyn RecordStore<Lead>>,
    ) -> Self {
        Self {
            users,
            contacts,
            leads,
        }
    }

    pub async fn user(&self, id: Option<&str>) -> Result<Option<UserSummary>, StoreError> {
        match id {
            Some(id) => Ok(self.users.get(id).await?.map(|u| u.summary())),
            None => Ok(None),
        }
    }

    /// Dangling ids resolve to `None` rather than failing the read.
    pub async fn refs(&self, refs: RecordRefs<'_>) -> Result<ResolvedRefs, StoreError> {
        let contact = match refs.contact {
            Some(id) => self
                .contacts
                .find_by_id(id)
                .await?
                .map(|c| ContactSummary::from(&c)),
            None => None,
        };
        let lead = match refs.lead {
            Some(id) => self.leads.find_by_id(id).await?.map(|l| LeadSummary::from(&l)),
            None => None,
        };
        Ok(ResolvedRefs {
            assigned_to: self.user(refs.assigned_to).await?,
            created_by: self.user(refs.created_by).await?,
            contact,
            lead,
        })
    }

    pub async fn resolve<R: Record>(&self, record: R) -> Result<Resolved<R>, StoreError> {
        let resolved = self.refs(record.refs()).await?;
        Ok(Resolved { record, resolved })
    }

    pub async fn resolve_all<R: Record>(
        &self,
        records: Vec<R>,
    ) -> Result<Vec<Resolved<R>>, StoreError> {
        let mut out = Vec::with_capacity(records.len());
        for record in records {
            out.push(self.resolve(record).await?);
        }
        Ok(out)
    }

    /// Write-time reference check. Only references that differ from `previous` are
    /// checked, so an update that leaves a since-deleted contact alone still succeeds.
    pub async fn check_links(
        &self,
        refs: RecordRefs<'_>,
        previous: Option<RecordRefs<'_>>,
    ) -> Result<(), ServiceError> {
        let prev = previous.unwrap_or_default();
        if let Some(id) = refs.assigned_to.filter(|id| Some(*id) != prev.assigned_to) {
            if self.users.get(id).await?.is_none() {
                return Err(ServiceError::validation(format!(
                    "assignedTo {} is not a known user",
                    id
                )));
            }
        }
        if let Some(id) = refs.contact.filter(|id| Some(*id) != prev.contact) {
            if self.contacts.find_by_id(id).await?.is_none() {
                return Err(ServiceError::validation(format!("Contact {} does not exist", id)));
            }
        }
        if let Some(id) = refs.lead.filter(|id| Some(*id) != prev.lead) {
            if self.leads.find_by_id(id).await?.is_none() {
                return Err(ServiceError::validation(format!("Lead {} does not exist", id)));
            }
        }
        Ok(())
    }
}
