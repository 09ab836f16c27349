//! Activity (audit) log types: what happened, to which record, by whom.

use crate::record::{Contact, Deal, Lead};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActivityAction {
    Create,
    Update,
    Delete,
    Login,
    Logout,
}

impl ActivityAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityAction::Create => "CREATE",
            ActivityAction::Update => "UPDATE",
            ActivityAction::Delete => "DELETE",
            ActivityAction::Login => "LOGIN",
            ActivityAction::Logout => "LOGOUT",
        }
    }
}

impl std::fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit classification: the record kinds plus the cross-cutting `User` and `Auth`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityModule {
    Lead,
    Contact,
    Deal,
    User,
    Auth,
}

impl ActivityModule {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityModule::Lead => "Lead",
            ActivityModule::Contact => "Contact",
            ActivityModule::Deal => "Deal",
            ActivityModule::User => "User",
            ActivityModule::Auth => "Auth",
        }
    }
}

impl std::fmt::Display for ActivityModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Before/after snapshots attached to UPDATE entries, one variant per record kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "module")]
pub enum ChangeSet {
    Lead { before: Box<Lead>, after: Box<Lead> },
    Contact { before: Box<Contact>, after: Box<Contact> },
    Deal { before: Box<Deal>, after: Box<Deal> },
}

/// Client address and user agent of the request that caused an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOrigin {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// One immutable audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLogEntry {
    pub id: String,
    /// Acting user id.
    pub user_id: String,
    pub action: ActivityAction,
    pub module: ActivityModule,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<ChangeSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Entry as submitted to the logger; id and timestamp are assigned on write.
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub user_id: String,
    pub action: ActivityAction,
    pub module: ActivityModule,
    pub record_id: Option<String>,
    pub record_title: Option<String>,
    pub changes: Option<ChangeSet>,
    pub origin: RequestOrigin,
}

impl NewActivity {
    pub fn new(user_id: impl Into<String>, action: ActivityAction, module: ActivityModule) -> Self {
        Self {
            user_id: user_id.into(),
            action,
            module,
            record_id: None,
            record_title: None,
            changes: None,
            origin: RequestOrigin::default(),
        }
    }

    pub fn record(mut self, id: impl Into<String>, title: impl Into<String>) -> Self {
        self.record_id = Some(id.into());
        self.record_title = Some(title.into());
        self
    }

    pub fn changes(mut self, changes: ChangeSet) -> Self {
        self.changes = Some(changes);
        self
    }

    pub fn origin(mut self, origin: RequestOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn into_entry(self, id: String, timestamp: DateTime<Utc>) -> ActivityLogEntry {
        ActivityLogEntry {
            id,
            user_id: self.user_id,
            action: self.action,
            module: self.module,
            record_id: self.record_id,
            record_title: self.record_title,
            changes: self.changes,
            ip_address: self.origin.ip_address,
            user_agent: self.origin.user_agent,
            timestamp,
        }
    }
}

/// Exact-match filter over activity entries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityFilter {
    pub module: Option<ActivityModule>,
    pub action: Option<ActivityAction>,
    pub user_id: Option<String>,
    pub record_id: Option<String>,
}

impl ActivityFilter {
    pub fn matches(&self, e: &ActivityLogEntry) -> bool {
        self.module.map_or(true, |m| e.module == m)
            && self.action.map_or(true, |a| e.action == a)
            && self.user_id.as_ref().map_or(true, |u| &e.user_id == u)
            && self
                .record_id
                .as_ref()
                .map_or(true, |r| e.record_id.as_ref() == Some(r))
    }
}
