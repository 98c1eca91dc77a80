//! Per-customer transaction summaries built from delivered orders

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use polars::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::data::{
    count_values, datetime_values, float_values, is_delivered, line_total, string_values,
    LINE_TOTAL, PURCHASED_AT,
};

/// Year of the snapshot used when no delivered order survives the filter
pub const SENTINEL_SNAPSHOT_YEAR: i32 = 1900;

/// Aggregated purchasing behaviour of one person (`customer_unique_id`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerSummary {
    pub customer_unique_id: String,
    pub last_purchase: NaiveDateTime,
    /// Distinct delivered orders
    pub frequency: usize,
    /// Sum of price + freight over every delivered order item
    pub monetary: f64,
}

/// Customer summaries together with the snapshot date used for recency
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionSummary {
    pub snapshot: NaiveDateTime,
    /// One row per identity, ordered by `customer_unique_id`
    pub customers: Vec<CustomerSummary>,
}

impl TransactionSummary {
    pub fn is_empty(&self) -> bool {
        self.customers.is_empty()
    }

    /// Whole days between a customer's last purchase and the snapshot
    pub fn recency_days(&self, customer: &CustomerSummary) -> i64 {
        (self.snapshot - customer.last_purchase).num_days()
    }
}

/// 1900-01-01 00:00:00
pub fn sentinel_snapshot() -> NaiveDateTime {
    NaiveDate::from_yo_opt(SENTINEL_SNAPSHOT_YEAR, 1)
        .unwrap_or(NaiveDate::MIN)
        .and_time(NaiveTime::MIN)
}

/// Delivered orders joined to their items (inner) and owners (left)
///
/// One row per order item; `customer_unique_id` is null when the order's
/// `customer_id` has no customer row.
pub fn delivered_item_rows(
    orders: &DataFrame,
    items: &DataFrame,
    customers: &DataFrame,
) -> LazyFrame {
    orders
        .clone()
        .lazy()
        .filter(is_delivered().and(col(PURCHASED_AT).is_not_null()))
        .inner_join(items.clone().lazy(), col("order_id"), col("order_id"))
        .left_join(customers.clone().lazy(), col("customer_id"), col("customer_id"))
        .with_columns([line_total()])
}

/// Join delivered orders with their items and owners, then aggregate per person
///
/// # Arguments
/// * `orders` - Orders already restricted to the selected date range
/// * `items` - Full order items table
/// * `customers` - Full customers table
///
/// # Returns
/// * `TransactionSummary` whose snapshot is one day after the latest joined
///   purchase (identity or not), or the sentinel when nothing joined
pub fn summarize_customers(
    orders: &DataFrame,
    items: &DataFrame,
    customers: &DataFrame,
) -> crate::Result<TransactionSummary> {
    let rows = delivered_item_rows(orders, items, customers);

    let latest = rows
        .clone()
        .select([col(PURCHASED_AT).max()])
        .collect()?;
    let latest = datetime_values(&latest, PURCHASED_AT)?
        .into_iter()
        .flatten()
        .next();

    let rfm_df = rows
        .filter(col("customer_unique_id").is_not_null())
        .group_by([col("customer_unique_id")])
        .agg([
            // Recency: last purchase, measured against the snapshot later
            col(PURCHASED_AT).max().alias("last_purchase"),
            // Frequency: number of unique delivered orders
            col("order_id").n_unique().alias("frequency"),
            // Monetary: total price + freight
            col(LINE_TOTAL).sum().alias("monetary"),
        ])
        .sort(["customer_unique_id"], SortMultipleOptions::default())
        .collect()?;

    let ids = string_values(&rfm_df, "customer_unique_id")?;
    let last_purchases = datetime_values(&rfm_df, "last_purchase")?;
    let frequencies = count_values(&rfm_df, "frequency")?;
    let monetary = float_values(&rfm_df, "monetary")?;

    let customers: Vec<CustomerSummary> = ids
        .into_iter()
        .zip(last_purchases)
        .zip(frequencies.into_iter().zip(monetary))
        .filter_map(|((id, last_purchase), (frequency, monetary))| {
            Some(CustomerSummary {
                customer_unique_id: id?,
                last_purchase: last_purchase?,
                frequency,
                monetary: monetary.unwrap_or(0.0),
            })
        })
        .collect();

    let snapshot = latest.map_or_else(sentinel_snapshot, |ts| ts + TimeDelta::days(1));
    debug!(customers = customers.len(), %snapshot, "customer summaries built");

    Ok(TransactionSummary { snapshot, customers })
}
