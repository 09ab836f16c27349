//! Response DTOs: pagination, the JSON envelope, resolved record views and report shapes.

use crate::activity::ActivityLogEntry;
use crate::record::{Contact, Lead, LeadStatus, UserSummary};
use crate::validate::ValidationError;
use serde::{Deserialize, Serialize};

/// Default page size for record lists.
pub const DEFAULT_LIST_LIMIT: u32 = 10;
/// Default page size for general and per-user activity queries.
pub const DEFAULT_ACTIVITY_LIMIT: u32 = 50;
/// Default page size for per-record activity history.
pub const DEFAULT_RECORD_ACTIVITY_LIMIT: u32 = 20;

/// 1-indexed page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(
        page: Option<u32>,
        limit: Option<u32>,
        default_limit: u32,
    ) -> Result<Self, ValidationError> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(default_limit);
        if page == 0 {
            return Err(ValidationError::new("page must be at least 1"));
        }
        if limit == 0 {
            return Err(ValidationError::new("limit must be at least 1"));
        }
        Ok(Self { page, limit })
    }

    pub fn skip(&self) -> usize {
        (self.page as usize - 1) * self.limit as usize
    }

    pub fn pagination(&self, total: usize) -> Pagination {
        Pagination {
            page: self.page,
            limit: self.limit,
            total,
            pages: total.div_ceil(self.limit as usize),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: usize,
    pub pages: usize,
}

/// One page of results plus its pagination block.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

/// JSON envelope: `{status, count?, pagination?, data?, message?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "success".to_string(),
            count: None,
            pagination: None,
            data: Some(data),
            message: None,
        }
    }

    pub fn page(data: T, count: usize, pagination: Pagination) -> Self {
        Self {
            count: Some(count),
            pagination: Some(pagination),
            ..Self::success(data)
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            count: None,
            pagination: None,
            data: None,
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: Some(message.into()),
            ..Self::message("")
        }
    }
}

/// Display projection of a contact referenced by a deal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactSummary {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

impl From<&Contact> for ContactSummary {
    fn from(c: &Contact) -> Self {
        Self {
            id: c.id.clone(),
            first_name: c.first_name.clone(),
            last_name: c.last_name.clone(),
            email: c.email.clone(),
            phone: c.phone.clone(),
            company: c.company.clone(),
        }
    }
}

/// Display projection of the lead a deal originated from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadSummary {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl From<&Lead> for LeadSummary {
    fn from(l: &Lead) -> Self {
        Self {
            id: l.id.clone(),
            first_name: l.first_name.clone(),
            last_name: l.last_name.clone(),
            email: l.email.clone(),
        }
    }
}

/// Resolved references of a record. Dangling ids resolve to `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<UserSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<ContactSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead: Option<LeadSummary>,
}

/// A record together with its resolved references under `resolved`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolved<R> {
    #[serde(flatten)]
    pub record: R,
    pub resolved: ResolvedRefs,
}

/// Activity entry with its actor resolved under `user`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityView {
    #[serde(flatten)]
    pub entry: ActivityLogEntry,
    #[serde(default)]
    pub user: Option<UserSummary>,
}

// ---------------------------------------------------------------------------
// Reports

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealsSummary {
    pub total_revenue: f64,
    pub won_deals_count: usize,
    pub lost_deals_count: usize,
    pub win_rate: f64,
}

/// Count, total and mean amount of the deals in one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageBucket {
    pub stage: crate::record::DealStage,
    pub count: usize,
    pub total_amount: f64,
    pub avg_amount: f64,
}

/// Per-assignee rollup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssigneePerformance {
    pub user_id: String,
    pub user_name: String,
    pub user_email: String,
    pub total_deals: usize,
    pub won_deals: usize,
    pub total_revenue: f64,
    pub win_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealsReport {
    pub summary: DealsSummary,
    pub deals_by_stage: Vec<StageBucket>,
    pub deals_by_user: Vec<AssigneePerformance>,
    pub won_deals: Vec<Resolved<crate::record::Deal>>,
    pub lost_deals: Vec<Resolved<crate::record::Deal>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardOverview {
    pub total_leads: usize,
    pub total_contacts: usize,
    pub total_deals: usize,
    pub total_revenue: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageCounts {
    pub new: usize,
    pub in_progress: usize,
    pub won: usize,
    pub lost: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCount {
    pub status: LeadStatus,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentActivities {
    pub recent_leads: Vec<Resolved<Lead>>,
    pub recent_deals: Vec<Resolved<crate::record::Deal>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub overview: DashboardOverview,
    pub deals_by_stage: StageCounts,
    pub leads_by_status: Vec<StatusCount>,
    pub recent_activities: RecentActivities,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_round_up() {
        let req = PageRequest::new(Some(6), Some(20), DEFAULT_LIST_LIMIT).unwrap();
        let p = req.pagination(95);
        assert_eq!(p.pages, 5);
        assert_eq!(req.skip(), 100);
        assert_eq!(PageRequest::new(None, None, 50).unwrap().pagination(0).pages, 0);
    }

    #[test]
    fn page_and_limit_must_be_positive() {
        assert!(PageRequest::new(Some(0), None, DEFAULT_LIST_LIMIT).is_err());
        assert!(PageRequest::new(None, Some(0), DEFAULT_LIST_LIMIT).is_err());
        let d = PageRequest::new(None, None, DEFAULT_RECORD_ACTIVITY_LIMIT).unwrap();
        assert_eq!((d.page, d.limit), (1, 20));
    }

    #[test]
    fn error_envelope_shape() {
        let v = serde_json::to_value(ApiResponse::error("Deal not found")).unwrap();
        assert_eq!(v, serde_json::json!({ "status": "error", "message": "Deal not found" }));
    }
}
