//! Inclusive calendar-date filtering of the orders table

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use polars::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::data::{datetime_lit, PURCHASED_AT};

/// How the inclusive end date is turned into a timestamp bound
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndBoundary {
    /// Keep everything purchased on the end date, up to 23:59:59.999
    #[default]
    EndOfDay,
    /// Keep only purchases at or before 00:00:00 on the end date
    Midnight,
}

/// Caller-supplied date range; both ends are inclusive calendar dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub end_boundary: EndBoundary,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            end_boundary: EndBoundary::default(),
        }
    }

    pub fn with_end_boundary(mut self, end_boundary: EndBoundary) -> Self {
        self.end_boundary = end_boundary;
        self
    }

    pub fn is_inverted(&self) -> bool {
        self.start > self.end
    }

    /// Validation message for an inverted range; the filter still runs
    pub fn warning(&self) -> Option<String> {
        self.is_inverted().then(|| {
            format!(
                "start date {} is after end date {}; the filtered result will be empty",
                self.start, self.end
            )
        })
    }

    /// Timestamp bounds: inclusive lower, and the upper bound with its inclusivity
    fn bounds(&self) -> (NaiveDateTime, Option<(NaiveDateTime, bool)>) {
        let lower = self.start.and_time(NaiveTime::MIN);
        let upper = match self.end_boundary {
            EndBoundary::Midnight => Some((self.end.and_time(NaiveTime::MIN), true)),
            EndBoundary::EndOfDay => self
                .end
                .succ_opt()
                .map(|next| (next.and_time(NaiveTime::MIN), false)),
        };
        (lower, upper)
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        let (lower, upper) = self.bounds();
        ts >= lower
            && match upper {
                Some((bound, true)) => ts <= bound,
                Some((bound, false)) => ts < bound,
                None => true,
            }
    }

    /// The same test as [`DateRange::contains`], over the `purchased_at` column
    ///
    /// Null timestamps never match.
    pub fn predicate(&self) -> Expr {
        let (lower, upper) = self.bounds();
        let after_start = col(PURCHASED_AT).gt_eq(datetime_lit(lower));
        match upper {
            Some((bound, true)) => after_start.and(col(PURCHASED_AT).lt_eq(datetime_lit(bound))),
            Some((bound, false)) => after_start.and(col(PURCHASED_AT).lt(datetime_lit(bound))),
            None => after_start,
        }
    }
}

/// Keep orders whose purchase timestamp falls inside `range`
///
/// Orders without a parseable timestamp never match. An inverted range is
/// logged as a warning and yields an empty frame.
pub fn filter_orders(orders: &DataFrame, range: &DateRange) -> crate::Result<DataFrame> {
    if let Some(message) = range.warning() {
        warn!("{}", message);
    }

    let kept = orders.clone().lazy().filter(range.predicate()).collect()?;

    debug!(
        start = %range.start,
        end = %range.end,
        kept = kept.height(),
        total = orders.height(),
        "orders filtered by purchase date"
    );
    Ok(kept)
}
