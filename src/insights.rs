//! Group-and-count views shown next to the RFM segmentation

use chrono::Weekday;
use polars::prelude::*;
use serde::Serialize;

use crate::data::{
    count_values, float_values, int_values, is_delivered, line_total, string_values, LINE_TOTAL,
    PURCHASED_AT,
};

pub const HIGH_RATING: &str = "High (3-5)";
pub const LOW_RATING: &str = "Low (1-2)";
pub const ONE_TIME: &str = "One-time";
pub const REPEAT: &str = "Repeat";

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorySales {
    pub category: String,
    pub total_sold: usize,
}

/// All categories sold in range, best sellers first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryRanking {
    pub categories: Vec<CategorySales>,
}

impl CategoryRanking {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn top(&self, n: usize) -> &[CategorySales] {
        &self.categories[..n.min(self.categories.len())]
    }

    /// The `n` weakest categories, weakest first
    pub fn bottom(&self, n: usize) -> Vec<CategorySales> {
        let skip = self.categories.len().saturating_sub(n);
        self.categories[skip..].iter().rev().cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyOrders {
    pub year_month: String,
    pub total_orders: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekdayOrders {
    pub day_of_week: String,
    pub total_orders: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyPerformance {
    pub year_month: String,
    pub total_orders: usize,
    pub total_revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelCount {
    pub label: String,
    pub count: usize,
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// `YYYY-MM` of the purchase timestamp
fn year_month() -> Expr {
    col(PURCHASED_AT).dt().strftime("%Y-%m").alias("year_month")
}

/// Largest count first; equal counts in `key` order
fn by_count_desc(count: &str, key: &str) -> (Vec<Expr>, SortMultipleOptions) {
    (
        vec![col(count), col(key)],
        SortMultipleOptions::default().with_order_descending_multi([true, false]),
    )
}

/// Items sold per product category for orders in range (any status)
pub fn category_sales(
    orders: &DataFrame,
    items: &DataFrame,
    products: &DataFrame,
) -> crate::Result<CategoryRanking> {
    let (sort_by, sort_options) = by_count_desc("total_sold", "product_category_name");
    let sales = items
        .clone()
        .lazy()
        .inner_join(
            orders.clone().lazy().select([col("order_id")]),
            col("order_id"),
            col("order_id"),
        )
        .left_join(products.clone().lazy(), col("product_id"), col("product_id"))
        .filter(col("product_category_name").is_not_null())
        .group_by([col("product_category_name")])
        .agg([col("order_id").count().alias("total_sold")])
        .sort_by_exprs(sort_by, sort_options)
        .collect()?;

    let categories = string_values(&sales, "product_category_name")?
        .into_iter()
        .zip(count_values(&sales, "total_sold")?)
        .filter_map(|(category, total_sold)| {
            Some(CategorySales {
                category: category?,
                total_sold,
            })
        })
        .collect();
    Ok(CategoryRanking { categories })
}

/// Orders per calendar month, oldest month first
pub fn monthly_orders(orders: &DataFrame) -> crate::Result<Vec<MonthlyOrders>> {
    let monthly = orders
        .clone()
        .lazy()
        .filter(col(PURCHASED_AT).is_not_null())
        .with_columns([year_month()])
        .group_by([col("year_month")])
        .agg([col("order_id").count().alias("total_orders")])
        .sort(["year_month"], SortMultipleOptions::default())
        .collect()?;

    Ok(string_values(&monthly, "year_month")?
        .into_iter()
        .zip(count_values(&monthly, "total_orders")?)
        .filter_map(|(year_month, total_orders)| {
            Some(MonthlyOrders {
                year_month: year_month?,
                total_orders,
            })
        })
        .collect())
}

/// Orders per weekday, always Monday through Sunday
pub fn weekday_orders(orders: &DataFrame) -> crate::Result<Vec<WeekdayOrders>> {
    // ISO weekday: Monday = 1
    let per_day = orders
        .clone()
        .lazy()
        .filter(col(PURCHASED_AT).is_not_null())
        .with_columns([col(PURCHASED_AT).dt().weekday().alias("weekday")])
        .group_by([col("weekday")])
        .agg([col("order_id").count().alias("total_orders")])
        .collect()?;

    let mut counts = [0usize; 7];
    for (day, total) in int_values(&per_day, "weekday")?
        .into_iter()
        .zip(count_values(&per_day, "total_orders")?)
    {
        if let Some(day @ 1..=7) = day {
            counts[(day - 1) as usize] = total;
        }
    }

    Ok(WEEKDAYS
        .iter()
        .zip(counts)
        .map(|(&day, total_orders)| WeekdayOrders {
            day_of_week: weekday_name(day).to_string(),
            total_orders,
        })
        .collect())
}

/// Distinct delivered orders and their item revenue per month
///
/// Delivered orders without items do not count.
pub fn delivered_performance(
    orders: &DataFrame,
    items: &DataFrame,
) -> crate::Result<Vec<MonthlyPerformance>> {
    let monthly = orders
        .clone()
        .lazy()
        .filter(is_delivered().and(col(PURCHASED_AT).is_not_null()))
        .inner_join(items.clone().lazy(), col("order_id"), col("order_id"))
        .with_columns([year_month(), line_total()])
        .group_by([col("year_month")])
        .agg([
            col("order_id").n_unique().alias("total_orders"),
            col(LINE_TOTAL).sum().alias("total_revenue"),
        ])
        .sort(["year_month"], SortMultipleOptions::default())
        .collect()?;

    let months = string_values(&monthly, "year_month")?;
    let order_counts = count_values(&monthly, "total_orders")?;
    let revenue = float_values(&monthly, "total_revenue")?;

    Ok(months
        .into_iter()
        .zip(order_counts.into_iter().zip(revenue))
        .filter_map(|(year_month, (total_orders, total_revenue))| {
            Some(MonthlyPerformance {
                year_month: year_month?,
                total_orders,
                total_revenue: total_revenue.unwrap_or(0.0),
            })
        })
        .collect())
}

/// High vs low review counts for delivered orders in range
///
/// A review without a score fails the `>= 3` test and counts as low.
pub fn review_sentiment(
    orders: &DataFrame,
    reviews: &DataFrame,
) -> crate::Result<Vec<LabelCount>> {
    let delivered = orders
        .clone()
        .lazy()
        .filter(is_delivered())
        .select([col("order_id")]);

    let labelled = reviews
        .clone()
        .lazy()
        .inner_join(delivered, col("order_id"), col("order_id"))
        .with_columns([when(col("review_score").gt_eq(lit(3i64)))
            .then(lit(HIGH_RATING))
            .otherwise(lit(LOW_RATING))
            .alias("label")]);
    count_labels(labelled)
}

/// One-time vs repeat buyers among delivered orders in range
///
/// Keys on `customer_unique_id`; orders with no matching customer are ignored.
pub fn retention(orders: &DataFrame, customers: &DataFrame) -> crate::Result<Vec<LabelCount>> {
    let labelled = orders
        .clone()
        .lazy()
        .filter(is_delivered())
        .left_join(customers.clone().lazy(), col("customer_id"), col("customer_id"))
        .filter(col("customer_unique_id").is_not_null())
        .group_by([col("customer_unique_id")])
        .agg([col("order_id").n_unique().alias("orders")])
        .with_columns([when(col("orders").eq(lit(1)))
            .then(lit(ONE_TIME))
            .otherwise(lit(REPEAT))
            .alias("label")]);
    count_labels(labelled)
}

/// Rows per `label`, largest count first; absent labels are not listed
fn count_labels(labelled: LazyFrame) -> crate::Result<Vec<LabelCount>> {
    let (sort_by, sort_options) = by_count_desc("count", "label");
    let counts = labelled
        .group_by([col("label")])
        .agg([col("label").count().alias("count")])
        .sort_by_exprs(sort_by, sort_options)
        .collect()?;

    Ok(string_values(&counts, "label")?
        .into_iter()
        .zip(count_values(&counts, "count")?)
        .filter_map(|(label, count)| Some(LabelCount { label: label?, count }))
        .collect())
}
