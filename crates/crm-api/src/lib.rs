//! CRM REST API: router, handlers, request identity, configuration.

pub mod auth;
pub mod config;
pub mod error;
pub mod server;
