//! Data loading and table normalization using Polars

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use polars::prelude::*;
use tracing::{debug, info};

use crate::error::DashboardError;

pub const CUSTOMERS_FILE: &str = "customers_clean_df.csv";
pub const ORDER_ITEMS_FILE: &str = "order_items_clean_df.csv";
pub const ORDER_REVIEWS_FILE: &str = "order_reviews_clean_df.csv";
pub const ORDERS_FILE: &str = "orders_clean_df.csv";
pub const PRODUCTS_FILE: &str = "products_clean_df.csv";

/// Parsed `order_purchase_timestamp` (millisecond datetime, null if unparseable)
pub const PURCHASED_AT: &str = "purchased_at";
/// `price + freight_value` of one order item
pub const LINE_TOTAL: &str = "line_total";
/// The only `order_status` that counts as revenue
pub const DELIVERED_STATUS: &str = "delivered";

pub const PURCHASE_TIME_UNIT: TimeUnit = TimeUnit::Milliseconds;

const TIMESTAMP_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
];

const CUSTOMER_COLUMNS: [&str; 2] = ["customer_id", "customer_unique_id"];
const ORDER_ITEM_COLUMNS: [&str; 4] = ["order_id", "product_id", "price", "freight_value"];
const ORDER_REVIEW_COLUMNS: [&str; 2] = ["order_id", "review_score"];
const ORDER_COLUMNS: [&str; 4] = [
    "order_id",
    "customer_id",
    "order_status",
    "order_purchase_timestamp",
];
const PRODUCT_COLUMNS: [&str; 2] = ["product_id", "product_category_name"];

/// The five input tables, immutable after loading
///
/// Every frame carries only the columns the dashboard reads, with fixed types:
/// * `customers` - `customer_id`, `customer_unique_id` (one row per `customer_id`)
/// * `order_items` - `order_id`, `product_id`, `price: f64`, `freight_value: f64`
/// * `order_reviews` - `order_id`, `review_score: i64`
/// * `orders` - `order_id`, `customer_id`, `order_status`, `purchased_at: datetime`
/// * `products` - `product_id`, `product_category_name` (null when blank)
#[derive(Debug, Clone)]
pub struct Tables {
    pub customers: DataFrame,
    pub order_items: DataFrame,
    pub order_reviews: DataFrame,
    pub orders: DataFrame,
    pub products: DataFrame,
}

impl Tables {
    /// Load all five tables from a directory holding the cleaned CSV exports
    ///
    /// # Arguments
    /// * `data_dir` - Directory containing the `*_clean_df.csv` files
    ///
    /// # Returns
    /// * Normalized `Tables`, or `DashboardError::MissingColumn` if any
    ///   required column is absent
    pub fn load(data_dir: impl AsRef<Path>) -> crate::Result<Tables> {
        let dir = data_dir.as_ref();
        info!(dir = %dir.display(), "loading dashboard tables");

        Tables::from_frames(
            read_csv(&dir.join(CUSTOMERS_FILE))?,
            read_csv(&dir.join(ORDER_ITEMS_FILE))?,
            read_csv(&dir.join(ORDER_REVIEWS_FILE))?,
            read_csv(&dir.join(ORDERS_FILE))?,
            read_csv(&dir.join(PRODUCTS_FILE))?,
        )
    }

    /// Validate and normalize raw frames, in the column layout of the CSV exports
    pub fn from_frames(
        customers: DataFrame,
        order_items: DataFrame,
        order_reviews: DataFrame,
        orders: DataFrame,
        products: DataFrame,
    ) -> crate::Result<Tables> {
        let tables = Tables {
            customers: prepare_customers(customers)?,
            order_items: prepare_order_items(order_items)?,
            order_reviews: prepare_order_reviews(order_reviews)?,
            orders: prepare_orders(orders)?,
            products: prepare_products(products)?,
        };

        info!(
            customers = tables.customers.height(),
            order_items = tables.order_items.height(),
            order_reviews = tables.order_reviews.height(),
            orders = tables.orders.height(),
            products = tables.products.height(),
            "tables loaded"
        );
        Ok(tables)
    }

    /// Earliest and latest purchase dates, used as the default filter range
    pub fn purchase_span(&self) -> crate::Result<Option<(NaiveDate, NaiveDate)>> {
        let bounds = self
            .orders
            .clone()
            .lazy()
            .select([
                col(PURCHASED_AT).min().alias("first"),
                col(PURCHASED_AT).max().alias("last"),
            ])
            .collect()?;

        let first = datetime_values(&bounds, "first")?.into_iter().flatten().next();
        let last = datetime_values(&bounds, "last")?.into_iter().flatten().next();
        Ok(first.zip(last).map(|(first, last)| (first.date(), last.date())))
    }
}

/// Parse a purchase timestamp; date-only values mean midnight
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// Literal comparable with the `purchased_at` column
pub fn datetime_lit(ts: NaiveDateTime) -> Expr {
    lit(ts.and_utc().timestamp_millis()).cast(DataType::Datetime(PURCHASE_TIME_UNIT, None))
}

/// Predicate selecting delivered orders
pub fn is_delivered() -> Expr {
    col("order_status").eq(lit(DELIVERED_STATUS))
}

/// `price + freight_value`; null when either part is missing, so sums skip it
pub fn line_total() -> Expr {
    (col("price") + col("freight_value")).alias(LINE_TOTAL)
}

/// Keep one `customer_unique_id` per `customer_id`; the first mapping wins
pub fn prepare_customers(df: DataFrame) -> crate::Result<DataFrame> {
    require_columns(&df, "customers", &CUSTOMER_COLUMNS)?;
    let customers = df
        .lazy()
        .select([
            col("customer_id").cast(DataType::String),
            col("customer_unique_id").cast(DataType::String),
        ])
        .filter(
            col("customer_id")
                .is_not_null()
                .and(col("customer_unique_id").is_not_null()),
        )
        .group_by_stable([col("customer_id")])
        .agg([col("customer_unique_id").first()])
        .collect()?;
    debug!(table = "customers", rows = customers.height(), "table prepared");
    Ok(customers)
}

pub fn prepare_order_items(df: DataFrame) -> crate::Result<DataFrame> {
    require_columns(&df, "order_items", &ORDER_ITEM_COLUMNS)?;
    let items = df
        .lazy()
        .select([
            col("order_id").cast(DataType::String),
            col("product_id").cast(DataType::String),
            col("price").cast(DataType::Float64),
            col("freight_value").cast(DataType::Float64),
        ])
        .filter(col("order_id").is_not_null())
        .collect()?;
    debug!(table = "order_items", rows = items.height(), "table prepared");
    Ok(items)
}

pub fn prepare_order_reviews(df: DataFrame) -> crate::Result<DataFrame> {
    require_columns(&df, "order_reviews", &ORDER_REVIEW_COLUMNS)?;
    let reviews = df
        .lazy()
        .select([
            col("order_id").cast(DataType::String),
            col("review_score").cast(DataType::Int64),
        ])
        .filter(col("order_id").is_not_null())
        .collect()?;
    debug!(table = "order_reviews", rows = reviews.height(), "table prepared");
    Ok(reviews)
}

/// Parse purchase timestamps into `purchased_at` and drop rows without ids
pub fn prepare_orders(mut df: DataFrame) -> crate::Result<DataFrame> {
    require_columns(&df, "orders", &ORDER_COLUMNS)?;

    let raw = df
        .column("order_purchase_timestamp")?
        .as_materialized_series()
        .cast(&DataType::String)?;
    let millis: Vec<Option<i64>> = raw
        .str()?
        .into_iter()
        .map(|v| v.and_then(parse_timestamp).map(|ts| ts.and_utc().timestamp_millis()))
        .collect();
    let purchased_at = Series::new(PURCHASED_AT.into(), millis)
        .cast(&DataType::Datetime(PURCHASE_TIME_UNIT, None))?;
    df.with_column(purchased_at)?;

    let orders = df
        .lazy()
        .select([
            col("order_id").cast(DataType::String),
            col("customer_id").cast(DataType::String),
            col("order_status").cast(DataType::String),
            col(PURCHASED_AT),
        ])
        .filter(col("order_id").is_not_null().and(col("customer_id").is_not_null()))
        .collect()?;

    let unparsed = orders.column(PURCHASED_AT)?.null_count();
    if unparsed > 0 {
        debug!(unparsed, "orders with unparseable purchase timestamps");
    }
    debug!(table = "orders", rows = orders.height(), "table prepared");
    Ok(orders)
}

pub fn prepare_products(df: DataFrame) -> crate::Result<DataFrame> {
    require_columns(&df, "products", &PRODUCT_COLUMNS)?;
    let category = col("product_category_name").cast(DataType::String);
    let products = df
        .lazy()
        .select([
            col("product_id").cast(DataType::String),
            when(category.clone().eq(lit("")))
                .then(lit(NULL).cast(DataType::String))
                .otherwise(category)
                .alias("product_category_name"),
        ])
        .filter(col("product_id").is_not_null())
        .collect()?;
    debug!(table = "products", rows = products.height(), "table prepared");
    Ok(products)
}

/// Read a CSV file with a header row, inferring types from every row
fn read_csv(path: &Path) -> crate::Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .map_err(|e| anyhow::anyhow!("failed to open {}: {}", path.display(), e))?
        .finish()
        .map_err(|e| anyhow::anyhow!("failed to parse {}: {}", path.display(), e))?;
    Ok(df)
}

/// Fail with `MissingColumn` for the first required column the frame lacks
pub fn require_columns(
    df: &DataFrame,
    table: &'static str,
    required: &[&str],
) -> crate::Result<()> {
    let present: HashSet<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();

    if let Some(missing) = required.iter().find(|c| !present.contains(**c)) {
        return Err(DashboardError::MissingColumn {
            table,
            column: missing.to_string(),
        }
        .into());
    }
    Ok(())
}

pub fn string_values(df: &DataFrame, name: &str) -> crate::Result<Vec<Option<String>>> {
    let series = df
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::String)?;
    Ok(series.str()?.into_iter().map(|v| v.map(str::to_string)).collect())
}

pub fn float_values(df: &DataFrame, name: &str) -> crate::Result<Vec<Option<f64>>> {
    let series = df
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    Ok(series.f64()?.into_iter().collect())
}

pub fn int_values(df: &DataFrame, name: &str) -> crate::Result<Vec<Option<i64>>> {
    let series = df
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::Int64)?;
    Ok(series.i64()?.into_iter().collect())
}

/// Counts from `count`/`n_unique` aggregations; nulls read as zero
pub fn count_values(df: &DataFrame, name: &str) -> crate::Result<Vec<usize>> {
    let series = df
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::UInt64)?;
    Ok(series
        .u64()?
        .into_iter()
        .map(|v| v.map_or(0, |n| n as usize))
        .collect())
}

/// Millisecond datetimes back to `NaiveDateTime`
pub fn datetime_values(df: &DataFrame, name: &str) -> crate::Result<Vec<Option<NaiveDateTime>>> {
    Ok(int_values(df, name)?
        .into_iter()
        .map(|ms| ms.and_then(DateTime::from_timestamp_millis).map(|dt| dt.naive_utc()))
        .collect())
}

/// Raw-frame builders shared by the unit tests of every stage
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// `(order_id, customer_id, order_status, order_purchase_timestamp)`
    pub fn orders(rows: &[(&str, &str, &str, &str)]) -> DataFrame {
        let raw = df!(
            "order_id" => rows.iter().map(|r| r.0).collect::<Vec<_>>(),
            "customer_id" => rows.iter().map(|r| r.1).collect::<Vec<_>>(),
            "order_status" => rows.iter().map(|r| r.2).collect::<Vec<_>>(),
            "order_purchase_timestamp" => rows.iter().map(|r| r.3).collect::<Vec<_>>()
        )
        .unwrap();
        prepare_orders(raw).unwrap()
    }

    /// `(order_id, product_id, price, freight_value)`
    pub fn items(rows: &[(&str, &str, f64, f64)]) -> DataFrame {
        let raw = df!(
            "order_id" => rows.iter().map(|r| r.0).collect::<Vec<_>>(),
            "product_id" => rows.iter().map(|r| r.1).collect::<Vec<_>>(),
            "price" => rows.iter().map(|r| r.2).collect::<Vec<_>>(),
            "freight_value" => rows.iter().map(|r| r.3).collect::<Vec<_>>()
        )
        .unwrap();
        prepare_order_items(raw).unwrap()
    }

    /// `(customer_id, customer_unique_id)`
    pub fn customers(rows: &[(&str, &str)]) -> DataFrame {
        let raw = df!(
            "customer_id" => rows.iter().map(|r| r.0).collect::<Vec<_>>(),
            "customer_unique_id" => rows.iter().map(|r| r.1).collect::<Vec<_>>()
        )
        .unwrap();
        prepare_customers(raw).unwrap()
    }

    /// `(order_id, review_score)`
    pub fn reviews(rows: &[(&str, Option<i64>)]) -> DataFrame {
        let raw = df!(
            "order_id" => rows.iter().map(|r| r.0).collect::<Vec<_>>(),
            "review_score" => rows.iter().map(|r| r.1).collect::<Vec<_>>()
        )
        .unwrap();
        prepare_order_reviews(raw).unwrap()
    }

    /// `(product_id, product_category_name)`
    pub fn products(rows: &[(&str, &str)]) -> DataFrame {
        let raw = df!(
            "product_id" => rows.iter().map(|r| r.0).collect::<Vec<_>>(),
            "product_category_name" => rows.iter().map(|r| r.1).collect::<Vec<_>>()
        )
        .unwrap();
        prepare_products(raw).unwrap()
    }

    pub fn ids(df: &DataFrame, name: &str) -> Vec<String> {
        string_values(df, name).unwrap().into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn ts(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    fn write_fixture(orders_header: &str) -> TempDir {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CUSTOMERS_FILE),
            "customer_id,customer_unique_id,customer_city\n\
             c1,u1,sao paulo\n\
             c2,u1,sao paulo\n\
             c3,u2,rio\n",
        )
        .unwrap();
        fs::write(
            dir.path().join(ORDER_ITEMS_FILE),
            "order_id,order_item_id,product_id,price,freight_value\n\
             o1,1,p1,100.0,10.5\n\
             o1,2,p2,50,4.25\n\
             o2,1,p1,20.0,\n",
        )
        .unwrap();
        fs::write(
            dir.path().join(ORDER_REVIEWS_FILE),
            "review_id,order_id,review_score\nr1,o1,5\nr2,o2,1\n",
        )
        .unwrap();
        fs::write(
            dir.path().join(ORDERS_FILE),
            format!(
                "{orders_header}\n\
                 o1,c1,delivered,2017-10-02 10:56:33\n\
                 o2,c3,canceled,2018-01-15 08:00:00\n\
                 o3,c2,delivered,not a date\n"
            ),
        )
        .unwrap();
        fs::write(
            dir.path().join(PRODUCTS_FILE),
            "product_id,product_category_name\np1,perfumaria\np2,\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_load_tables() {
        let dir = write_fixture("order_id,customer_id,order_status,order_purchase_timestamp");
        let tables = Tables::load(dir.path()).unwrap();

        assert_eq!(tables.customers.height(), 3);
        assert_eq!(tables.order_items.height(), 3);
        assert_eq!(tables.order_reviews.height(), 2);
        assert_eq!(tables.orders.height(), 3);
        assert_eq!(tables.products.height(), 2);

        assert_eq!(
            string_values(&tables.orders, "order_status").unwrap(),
            vec![
                Some("delivered".to_string()),
                Some("canceled".to_string()),
                Some("delivered".to_string()),
            ]
        );
        assert_eq!(
            datetime_values(&tables.orders, PURCHASED_AT).unwrap(),
            vec![Some(ts(2017, 10, 2, 10, 56, 33)), Some(ts(2018, 1, 15, 8, 0, 0)), None]
        );

        // integer-looking prices are widened to floats
        assert_eq!(
            float_values(&tables.order_items, "price").unwrap(),
            vec![Some(100.0), Some(50.0), Some(20.0)]
        );
        assert_eq!(
            float_values(&tables.order_items, "freight_value").unwrap()[2],
            None
        );

        assert_eq!(
            string_values(&tables.products, "product_category_name").unwrap(),
            vec![Some("perfumaria".to_string()), None]
        );
        assert_eq!(
            int_values(&tables.order_reviews, "review_score").unwrap(),
            vec![Some(5), Some(1)]
        );
    }

    #[test]
    fn test_missing_column_is_fatal() {
        let dir = write_fixture("order_id,customer_id,order_status,purchase_ts");
        let err = Tables::load(dir.path()).unwrap_err();

        assert_eq!(
            err.downcast_ref::<DashboardError>(),
            Some(&DashboardError::MissingColumn {
                table: "orders",
                column: "order_purchase_timestamp".to_string(),
            })
        );
    }

    #[test]
    fn test_missing_file_errors() {
        let dir = tempdir().unwrap();
        assert!(Tables::load(dir.path()).is_err());
    }

    #[test]
    fn test_purchase_span() {
        let dir = write_fixture("order_id,customer_id,order_status,order_purchase_timestamp");
        let tables = Tables::load(dir.path()).unwrap();

        let (start, end) = tables.purchase_span().unwrap().unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2017, 10, 2).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2018, 1, 15).unwrap());
    }

    #[test]
    fn test_purchase_span_without_dates() {
        let tables = Tables {
            orders: fixtures::orders(&[("o1", "c1", "delivered", "")]),
            customers: fixtures::customers(&[]),
            order_items: fixtures::items(&[]),
            order_reviews: fixtures::reviews(&[]),
            products: fixtures::products(&[]),
        };
        assert_eq!(tables.purchase_span().unwrap(), None);
    }

    #[test]
    fn test_first_customer_mapping_wins() {
        let customers = fixtures::customers(&[("c1", "alice"), ("c1", "mallory"), ("c2", "bob")]);

        assert_eq!(fixtures::ids(&customers, "customer_id"), vec!["c1", "c2"]);
        assert_eq!(fixtures::ids(&customers, "customer_unique_id"), vec!["alice", "bob"]);
    }

    #[test]
    fn test_rows_without_ids_are_dropped_before_counting() {
        let raw = df!(
            "order_id" => [Some("o1"), None, Some("o3")],
            "customer_id" => [Some("c1"), Some("c2"), None],
            "order_status" => ["delivered", "delivered", "delivered"],
            "order_purchase_timestamp" => ["2018-01-01 00:00:00", "bad", "bad"]
        )
        .unwrap();
        let orders = prepare_orders(raw).unwrap();

        assert_eq!(orders.height(), 1);
        assert_eq!(orders.column(PURCHASED_AT).unwrap().null_count(), 0);
    }

    #[test]
    fn test_line_total_is_null_when_a_part_is_missing() {
        let raw = df!(
            "order_id" => ["o1", "o2"],
            "product_id" => ["p1", "p2"],
            "price" => [Some(10.0), Some(5.0)],
            "freight_value" => [Some(2.5), None]
        )
        .unwrap();
        let totals = prepare_order_items(raw)
            .unwrap()
            .lazy()
            .select([line_total()])
            .collect()
            .unwrap();

        assert_eq!(float_values(&totals, LINE_TOTAL).unwrap(), vec![Some(12.5), None]);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = ts(2017, 10, 2, 10, 56, 33);
        assert_eq!(parse_timestamp("2017-10-02 10:56:33"), Some(expected));
        assert_eq!(parse_timestamp("2017-10-02T10:56:33"), Some(expected));
        assert_eq!(parse_timestamp("2017-10-02"), Some(ts(2017, 10, 2, 0, 0, 0)));
        assert_eq!(parse_timestamp("02/10/2017"), None);
    }
}
