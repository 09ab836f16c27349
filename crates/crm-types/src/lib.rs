//! Core types and traits for the CRM service.
//!
//! Records, write payloads, activity entries, response DTOs and the persistence
//! traits implemented by `crm-store`.

mod activity;
mod dto;
mod record;
mod traits;
pub mod validate;

pub use activity::*;
pub use dto::*;
pub use record::*;
pub use traits::*;
pub use validate::ValidationError;
