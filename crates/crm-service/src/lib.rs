//! CRM services: record CRUD with activity logging, reference resolution and reporting.
//!
//! [`Crm`] wires every service over one set of stores; the HTTP layer holds it in its state.

mod activity;
mod records;
mod reports;
mod resolve;

pub use activity::ActivityLogger;
pub use records::{Actor, RecordService};
pub use reports::{stage_buckets, win_rate, ReportService};
pub use resolve::Resolver;

use crm_store::{InMemoryActivityStore, InMemoryRecordStore};
use crm_types::{ActivityStore, Contact, Deal, Lead, RecordStore, UserDirectory};
use std::sync::Arc;

/// Backing stores for one CRM instance.
#[derive(Clone)]
pub struct CrmStores {
    pub users: Arc<dyn UserDirectory>,
    pub activity: Arc<dyn ActivityStore>,
    pub leads: Arc<dyn RecordStore<Lead>>,
    pub contacts: Arc<dyn RecordStore<Contact>>,
    pub deals: Arc<dyn RecordStore<Deal>>,
}

impl CrmStores {
    /// Volatile stores; state is lost on restart.
    pub fn in_memory(users: Arc<dyn UserDirectory>) -> Self {
        Self {
            users,
            activity: Arc::new(InMemoryActivityStore::new()),
            leads: Arc::new(InMemoryRecordStore::<Lead>::new()),
            contacts: Arc::new(InMemoryRecordStore::<Contact>::new()),
            deals: Arc::new(InMemoryRecordStore::<Deal>::new()),
        }
    }
}

pub struct Crm {
    pub users: Arc<dyn UserDirectory>,
    pub activity: Arc<ActivityLogger>,
    pub leads: RecordService<Lead>,
    pub contacts: RecordService<Contact>,
    pub deals: RecordService<Deal>,
    pub reports: ReportService,
}

impl Crm {
    pub fn new(stores: CrmStores) -> Self {
        let activity = Arc::new(ActivityLogger::new(stores.activity, stores.users.clone()));
        let resolver = Arc::new(Resolver::new(
            stores.users.clone(),
            stores.contacts.clone(),
            stores.leads.clone(),
        ));
        Self {
            leads: RecordService::new(stores.leads.clone(), resolver.clone(), activity.clone()),
            contacts: RecordService::new(
                stores.contacts.clone(),
                resolver.clone(),
                activity.clone(),
            ),
            deals: RecordService::new(stores.deals.clone(), resolver.clone(), activity.clone()),
            reports: ReportService::new(
                stores.users.clone(),
                stores.leads,
                stores.contacts,
                stores.deals,
                resolver,
            ),
            users: stores.users,
            activity,
        }
    }
}
