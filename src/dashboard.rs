//! One full recomputation of every dashboard view for a date range

use serde::Serialize;
use tracing::info;

use crate::data::Tables;
use crate::filter::{filter_orders, DateRange};
use crate::insights::{
    self, CategoryRanking, LabelCount, MonthlyOrders, MonthlyPerformance, WeekdayOrders,
};
use crate::model::{score_customers, RfmOutcome};
use crate::summary::{summarize_customers, CustomerSummary};

/// Number of categories shown in the leaders and laggards charts
pub const CATEGORY_CHART_SIZE: usize = 10;

/// Everything the presentation layer needs for one date range
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardReport {
    pub range: DateRange,
    pub warnings: Vec<String>,
    pub filtered_orders: usize,
    pub categories: CategoryRanking,
    pub monthly_orders: Vec<MonthlyOrders>,
    pub weekday_orders: Vec<WeekdayOrders>,
    pub delivered_performance: Vec<MonthlyPerformance>,
    pub review_sentiment: Vec<LabelCount>,
    pub retention: Vec<LabelCount>,
    pub customer_summaries: Vec<CustomerSummary>,
    pub rfm: RfmOutcome,
}

/// Run the date filter, every insight view and the RFM pipeline
///
/// # Arguments
/// * `tables` - Loaded input tables (never mutated)
/// * `range` - Inclusive purchase-date range
///
/// # Returns
/// * `DashboardReport`; an inverted range is reported in `warnings` and
///   produces empty views rather than an error
pub fn build_report(tables: &Tables, range: &DateRange) -> crate::Result<DashboardReport> {
    let warnings: Vec<String> = range.warning().into_iter().collect();
    let orders = filter_orders(&tables.orders, range)?;

    let summary = summarize_customers(&orders, &tables.order_items, &tables.customers)?;
    let rfm = score_customers(&summary);

    let report = DashboardReport {
        range: *range,
        warnings,
        filtered_orders: orders.height(),
        categories: insights::category_sales(&orders, &tables.order_items, &tables.products)?,
        monthly_orders: insights::monthly_orders(&orders)?,
        weekday_orders: insights::weekday_orders(&orders)?,
        delivered_performance: insights::delivered_performance(&orders, &tables.order_items)?,
        review_sentiment: insights::review_sentiment(&orders, &tables.order_reviews)?,
        retention: insights::retention(&orders, &tables.customers)?,
        customer_summaries: summary.customers,
        rfm,
    };

    info!(
        start = %range.start,
        end = %range.end,
        orders = report.filtered_orders,
        customers = report.customer_summaries.len(),
        "dashboard recomputed"
    );
    Ok(report)
}
