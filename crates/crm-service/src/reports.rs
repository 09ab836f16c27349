//! Read-only aggregations over deals, leads and contacts. Nothing here mutates or logs.

use crate::resolve::Resolver;
use chrono::{DateTime, Utc};
use crm_types::{
    AssigneePerformance, Contact, DashboardOverview, DashboardStats, Deal, DealStage,
    DealsReport, DealsSummary, Lead, LeadStatus, RecentActivities, RecordFilter, RecordStore,
    ServiceError, StageBucket, StageCounts, StatusCount, UserDirectory,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Number of leads and deals shown under `recentActivities`.
const RECENT_LIMIT: usize = 5;

/// `won / (won + lost) * 100` rounded to two decimals; 0 when nothing has closed.
pub fn win_rate(won: usize, lost: usize) -> f64 {
    let closed = won + lost;
    if closed == 0 {
        return 0.0;
    }
    round2(won as f64 / closed as f64 * 100.0)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Per-stage count, amount total and mean, in lifecycle order. Stages with no deals
/// are left out.
pub fn stage_buckets(deals: &[Deal]) -> Vec<StageBucket> {
    DealStage::ALL
        .iter()
        .filter_map(|&stage| {
            let (count, total) = deals
                .iter()
                .filter(|d| d.stage == stage)
                .fold((0usize, 0.0f64), |(n, sum), d| (n + 1, sum + d.amount));
            (count > 0).then(|| StageBucket {
                stage,
                count,
                total_amount: total,
                avg_amount: total / count as f64,
            })
        })
        .collect()
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Tally {
    total: usize,
    won: usize,
    revenue: f64,
}

/// Tallies per assignee; deals without an assignee are not counted.
fn tally_by_assignee(deals: &[Deal]) -> HashMap<&str, Tally> {
    let mut out: HashMap<&str, Tally> = HashMap::new();
    for deal in deals {
        let Some(owner) = deal.assigned_to.as_deref() else {
            continue;
        };
        let t = out.entry(owner).or_default();
        t.total += 1;
        if deal.stage == DealStage::Won {
            t.won += 1;
            t.revenue += deal.amount;
        }
    }
    out
}

pub struct ReportService {
    users: Arc<dyn UserDirectory>,
    leads: Arc<dyn RecordStore<Lead>>,
    contacts: Arc<dyn RecordStore<Contact>>,
    deals: Arc<dyn RecordStore<Deal>>,
    resolver: Arc<Resolver>,
}

impl ReportService {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        leads: Arc<dyn RecordStore<Lead>>,
        contacts: Arc<dyn RecordStore<Contact>>,
        deals: Arc<dyn RecordStore<Deal>>,
        resolver: Arc<Resolver>,
    ) -> Self {
        Self {
            users,
            leads,
            contacts,
            deals,
            resolver,
        }
    }

    /// Deals created within `[start, end]` (either bound optional).
    pub async fn deals_report(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<DealsReport, ServiceError> {
        let filter = RecordFilter::new().created_between(start, end);
        let deals = self.deals.find(&filter, 0, None).await?;

        let deals_by_stage = stage_buckets(&deals);
        let deals_by_user = self.assignee_performance(&deals).await?;

        let (won, rest): (Vec<Deal>, Vec<Deal>) =
            deals.into_iter().partition(|d| d.stage == DealStage::Won);
        let lost: Vec<Deal> = rest
            .into_iter()
            .filter(|d| d.stage == DealStage::Lost)
            .collect();

        let summary = DealsSummary {
            total_revenue: won.iter().map(|d| d.amount).sum(),
            won_deals_count: won.len(),
            lost_deals_count: lost.len(),
            win_rate: win_rate(won.len(), lost.len()),
        };
        tracing::debug!(
            won = summary.won_deals_count,
            lost = summary.lost_deals_count,
            "deals report computed"
        );

        Ok(DealsReport {
            summary,
            deals_by_stage,
            deals_by_user,
            won_deals: self.resolver.resolve_all(won).await?,
            lost_deals: self.resolver.resolve_all(lost).await?,
        })
    }

    /// Joins per-assignee tallies with the user directory; assignees that no longer
    /// resolve to a user are dropped. Sorted by won revenue, highest first.
    async fn assignee_performance(
        &self,
        deals: &[Deal],
    ) -> Result<Vec<AssigneePerformance>, ServiceError> {
        let mut rows = Vec::new();
        for (user_id, t) in tally_by_assignee(deals) {
            let Some(user) = self.users.get(user_id).await? else {
                continue;
            };
            rows.push(AssigneePerformance {
                user_id: user.id,
                user_name: user.name,
                user_email: user.email,
                total_deals: t.total,
                won_deals: t.won,
                total_revenue: t.revenue,
                win_rate: if t.total == 0 {
                    0.0
                } else {
                    t.won as f64 / t.total as f64 * 100.0
                },
            });
        }
        rows.sort_by(|a, b| {
            b.total_revenue
                .total_cmp(&a.total_revenue)
                .then_with(|| a.user_name.cmp(&b.user_name))
        });
        Ok(rows)
    }

    pub async fn dashboard_stats(&self) -> Result<DashboardStats, ServiceError> {
        let all = RecordFilter::new();
        let stage_count = move |stage: DealStage| {
            let filter = RecordFilter::new().with("stage", stage.as_str());
            async move { self.deals.count(&filter).await }
        };

        let won = self
            .deals
            .find(&RecordFilter::new().with("stage", DealStage::Won.as_str()), 0, None)
            .await?;
        let overview = DashboardOverview {
            total_leads: self.leads.count(&all).await?,
            total_contacts: self.contacts.count(&all).await?,
            total_deals: self.deals.count(&all).await?,
            total_revenue: won.iter().map(|d| d.amount).sum(),
        };
        let deals_by_stage = StageCounts {
            new: stage_count(DealStage::New).await?,
            in_progress: stage_count(DealStage::InProgress).await?,
            won: won.len(),
            lost: stage_count(DealStage::Lost).await?,
        };

        let mut leads_by_status = Vec::new();
        for status in LeadStatus::ALL {
            let filter = RecordFilter::new().with("status", status.as_str());
            let count = self.leads.count(&filter).await?;
            if count > 0 {
                leads_by_status.push(StatusCount { status, count });
            }
        }

        let recent_leads = self.leads.find(&all, 0, Some(RECENT_LIMIT)).await?;
        let recent_deals = self.deals.find(&all, 0, Some(RECENT_LIMIT)).await?;
        Ok(DashboardStats {
            overview,
            deals_by_stage,
            leads_by_status,
            recent_activities: RecentActivities {
                recent_leads: self.resolver.resolve_all(recent_leads).await?,
                recent_deals: self.resolver.resolve_all(recent_deals).await?,
            },
        })
    }
}
