//! RFM scoring model: rank-first quintile scores and rule-based segments

use std::cmp::Ordering;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info};

use crate::summary::TransactionSummary;

/// Number of quantile bins per dimension
pub const QUINTILES: usize = 5;

/// Customer segment derived from the total RFM score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Segment {
    #[serde(rename = "Best Customers")]
    BestCustomers,
    #[serde(rename = "Loyal Customers")]
    LoyalCustomers,
    #[serde(rename = "Potential Loyalist")]
    PotentialLoyalist,
    #[serde(rename = "At Risk")]
    AtRisk,
    #[serde(rename = "Churned / Low Value")]
    ChurnedLowValue,
}

impl Segment {
    pub const ALL: [Segment; 5] = [
        Segment::BestCustomers,
        Segment::LoyalCustomers,
        Segment::PotentialLoyalist,
        Segment::AtRisk,
        Segment::ChurnedLowValue,
    ];

    /// Map a total score (3..=15) to its segment; first threshold met wins
    pub fn from_total(total: u8) -> Segment {
        if total >= 13 {
            Segment::BestCustomers
        } else if total >= 10 {
            Segment::LoyalCustomers
        } else if total >= 7 {
            Segment::PotentialLoyalist
        } else if total >= 5 {
            Segment::AtRisk
        } else {
            Segment::ChurnedLowValue
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Segment::BestCustomers => "Best Customers",
            Segment::LoyalCustomers => "Loyal Customers",
            Segment::PotentialLoyalist => "Potential Loyalist",
            Segment::AtRisk => "At Risk",
            Segment::ChurnedLowValue => "Churned / Low Value",
        }
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A customer summary with its R/F/M scores and segment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RfmRecord {
    pub customer_unique_id: String,
    pub last_purchase: NaiveDateTime,
    pub frequency: usize,
    pub monetary: f64,
    /// Days from the last purchase to the snapshot
    pub recency: i64,
    pub r_score: u8,
    pub f_score: u8,
    pub m_score: u8,
    pub segment: Segment,
}

impl RfmRecord {
    pub fn total_score(&self) -> u8 {
        self.r_score + self.f_score + self.m_score
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SegmentCount {
    pub segment: Segment,
    pub count: usize,
}

/// Scored customers plus the per-segment rollup shown on the dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RfmTable {
    pub snapshot: NaiveDateTime,
    pub records: Vec<RfmRecord>,
    pub segments: Vec<SegmentCount>,
}

/// Result of scoring; `NoData` when no customer had a delivered order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RfmOutcome {
    NoData,
    Scored(RfmTable),
}

impl RfmOutcome {
    pub fn table(&self) -> Option<&RfmTable> {
        match self {
            RfmOutcome::Scored(table) => Some(table),
            RfmOutcome::NoData => None,
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, RfmOutcome::NoData)
    }
}

/// 1-based ranks under `better_first`; equal values keep row order
///
/// Every row gets a distinct rank, so ties never straddle a bin edge.
pub fn rank_first<T, F>(values: &[T], better_first: F) -> Vec<usize>
where
    F: Fn(&T, &T) -> Ordering,
{
    let mut order: Vec<usize> = (0..values.len()).collect();
    // slice::sort_by is stable
    order.sort_by(|&a, &b| better_first(&values[a], &values[b]));

    let mut ranks = vec![0; values.len()];
    for (position, row) in order.into_iter().enumerate() {
        ranks[row] = position + 1;
    }
    ranks
}

/// Zero-based quintile bin of `rank` among `n` ranked rows
///
/// Bin edges sit at `1 + k(n-1)/5` and are right-closed, so bin sizes differ
/// by at most one. A lone row lands in bin 0; for `n < 5` some bins stay empty.
pub fn quintile_bin(rank: usize, n: usize) -> usize {
    if rank <= 1 || n <= 1 {
        return 0;
    }
    let span = n - 1;
    let scaled = QUINTILES * (rank - 1);
    (scaled.div_ceil(span) - 1).min(QUINTILES - 1)
}

/// Score in 1..=5 where the best bin scores 5
pub fn quintile_score(rank: usize, n: usize) -> u8 {
    (QUINTILES - quintile_bin(rank, n)) as u8
}

fn scores_by<T, F>(values: &[T], better_first: F) -> Vec<u8>
where
    F: Fn(&T, &T) -> Ordering,
{
    let n = values.len();
    rank_first(values, better_first)
        .into_iter()
        .map(|rank| quintile_score(rank, n))
        .collect()
}

/// Score every summarized customer and roll up segment counts
///
/// Recency ranks ascending (more recent is better); frequency and monetary
/// rank descending (larger is better).
pub fn score_customers(summary: &TransactionSummary) -> RfmOutcome {
    if summary.is_empty() {
        info!("no delivered orders in range; RFM skipped");
        return RfmOutcome::NoData;
    }

    let recency: Vec<i64> = summary
        .customers
        .iter()
        .map(|c| summary.recency_days(c))
        .collect();
    let frequency: Vec<usize> = summary.customers.iter().map(|c| c.frequency).collect();
    let monetary: Vec<f64> = summary.customers.iter().map(|c| c.monetary).collect();

    let r_scores = scores_by(&recency, |a, b| a.cmp(b));
    let f_scores = scores_by(&frequency, |a, b| b.cmp(a));
    let m_scores = scores_by(&monetary, |a, b| b.total_cmp(a));

    let records: Vec<RfmRecord> = summary
        .customers
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let (r_score, f_score, m_score) = (r_scores[i], f_scores[i], m_scores[i]);
            RfmRecord {
                customer_unique_id: c.customer_unique_id.clone(),
                last_purchase: c.last_purchase,
                frequency: c.frequency,
                monetary: c.monetary,
                recency: recency[i],
                r_score,
                f_score,
                m_score,
                segment: Segment::from_total(r_score + f_score + m_score),
            }
        })
        .collect();

    let segments = segment_counts(&records);
    debug!(customers = records.len(), segments = segments.len(), "RFM scores assigned");

    RfmOutcome::Scored(RfmTable {
        snapshot: summary.snapshot,
        records,
        segments,
    })
}

/// Count records per segment, largest first; ties follow segment order
pub fn segment_counts(records: &[RfmRecord]) -> Vec<SegmentCount> {
    let mut counts: Vec<SegmentCount> = Segment::ALL
        .iter()
        .map(|&segment| SegmentCount {
            segment,
            count: records.iter().filter(|r| r.segment == segment).count(),
        })
        .filter(|sc| sc.count > 0)
        .collect();
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}
