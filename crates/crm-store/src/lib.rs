//! Persistence for the CRM service: in-memory, JSONL and SQLite backends.

mod jsonl;
mod memory;

#[cfg(feature = "sqlite")]
mod sqlite;

pub use crm_types::{ActivityStore, RecordFilter, RecordStore, StoreError, UserDirectory};
pub use jsonl::JsonlActivityStore;
pub use memory::{InMemoryActivityStore, InMemoryRecordStore, InMemoryUserDirectory};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
