//! Chart rendering and console output for dashboard reports using Plotters

use std::path::{Path, PathBuf};

use plotters::prelude::*;
use tracing::{info, warn};

use crate::dashboard::{DashboardReport, CATEGORY_CHART_SIZE};
use crate::insights::LabelCount;
use crate::model::RfmOutcome;

/// Highlight colour for the leading bar, the rest are muted
const HIGHLIGHT: RGBColor = RGBColor(0x72, 0xBC, 0xD4);
const MUTED: RGBColor = RGBColor(0xD3, 0xD3, 0xD3);

/// A labelled value on a categorical x axis
pub type ChartPoint = (String, f64);

/// Upper bound of the value axis with 10% headroom; never zero
pub fn value_axis_max(points: &[ChartPoint]) -> f64 {
    let max = points.iter().map(|(_, v)| *v).fold(0.0, f64::max);
    if max > 0.0 {
        max * 1.1
    } else {
        1.0
    }
}

/// Draw a vertical bar chart, first bar highlighted
///
/// # Arguments
/// * `points` - Bars in display order
/// * `output_path` - Path to save the PNG chart
/// * `title` - Chart caption
/// * `axis` - (x description, y description)
pub fn draw_bar_chart(
    points: &[ChartPoint],
    output_path: &Path,
    title: &str,
    axis: (&str, &str),
) -> crate::Result<()> {
    if points.is_empty() {
        anyhow::bail!("cannot draw '{}' without data", title);
    }

    let root = BitMapBackend::new(output_path, (900, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 26))
        .margin(10)
        .x_label_area_size(60)
        .y_label_area_size(70)
        .build_cartesian_2d(
            (0u32..points.len() as u32).into_segmented(),
            0f64..value_axis_max(points),
        )?;

    let labels: Vec<&str> = points.iter().map(|(label, _)| label.as_str()).collect();
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc(axis.0)
        .y_desc(axis.1)
        .x_labels(points.len())
        .x_label_formatter(&|v| segment_label(&labels, v))
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for (i, (_, value)) in points.iter().enumerate() {
        let color = if i == 0 { HIGHLIGHT } else { MUTED };
        let x = i as u32;
        chart.draw_series(std::iter::once(Rectangle::new(
            [(SegmentValue::Exact(x), 0.0), (SegmentValue::Exact(x + 1), *value)],
            color.filled(),
        )))?;
    }

    root.present()?;
    info!(path = %output_path.display(), "bar chart saved");
    Ok(())
}

/// Draw a line chart with point markers over an ordered categorical axis
pub fn draw_line_chart(
    points: &[ChartPoint],
    output_path: &Path,
    title: &str,
    axis: (&str, &str),
) -> crate::Result<()> {
    if points.is_empty() {
        anyhow::bail!("cannot draw '{}' without data", title);
    }

    let root = BitMapBackend::new(output_path, (1000, 500)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 26))
        .margin(10)
        .x_label_area_size(60)
        .y_label_area_size(80)
        .build_cartesian_2d(
            (0u32..points.len() as u32).into_segmented(),
            0f64..value_axis_max(points),
        )?;

    let labels: Vec<&str> = points.iter().map(|(label, _)| label.as_str()).collect();
    chart
        .configure_mesh()
        .x_desc(axis.0)
        .y_desc(axis.1)
        .x_labels(points.len())
        .x_label_formatter(&|v| segment_label(&labels, v))
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    let coords: Vec<(SegmentValue<u32>, f64)> = points
        .iter()
        .enumerate()
        .map(|(i, (_, v))| (SegmentValue::CenterOf(i as u32), *v))
        .collect();

    chart.draw_series(LineSeries::new(coords.clone(), &HIGHLIGHT))?;
    chart.draw_series(
        coords
            .into_iter()
            .map(|c| Circle::new(c, 4, HIGHLIGHT.filled())),
    )?;

    root.present()?;
    info!(path = %output_path.display(), "line chart saved");
    Ok(())
}

/// Category name under the centre of its bar or point
fn segment_label(labels: &[&str], value: &SegmentValue<u32>) -> String {
    match value {
        SegmentValue::CenterOf(i) => labels
            .get(*i as usize)
            .map(|s| s.to_string())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChartKind {
    Bar,
    Line,
}

type AxisLabels = (&'static str, &'static str);

/// One chart of the report: where it goes, how it looks and what it shows
struct ChartSpec {
    file: &'static str,
    title: &'static str,
    axis: AxisLabels,
    kind: ChartKind,
    points: Vec<ChartPoint>,
}

impl ChartSpec {
    fn bar(
        file: &'static str,
        title: &'static str,
        axis: AxisLabels,
        points: Vec<ChartPoint>,
    ) -> Self {
        Self {
            file,
            title,
            axis,
            kind: ChartKind::Bar,
            points,
        }
    }

    fn line(
        file: &'static str,
        title: &'static str,
        axis: AxisLabels,
        points: Vec<ChartPoint>,
    ) -> Self {
        Self {
            file,
            title,
            axis,
            kind: ChartKind::Line,
            points,
        }
    }
}

fn label_points(counts: &[LabelCount]) -> Vec<ChartPoint> {
    counts.iter().map(|c| (c.label.clone(), c.count as f64)).collect()
}

fn report_charts(report: &DashboardReport) -> Vec<ChartSpec> {
    let top: Vec<ChartPoint> = report
        .categories
        .top(CATEGORY_CHART_SIZE)
        .iter()
        .map(|c| (c.category.clone(), c.total_sold as f64))
        .collect();
    let bottom: Vec<ChartPoint> = report
        .categories
        .bottom(CATEGORY_CHART_SIZE)
        .into_iter()
        .map(|c| (c.category, c.total_sold as f64))
        .collect();
    let monthly: Vec<ChartPoint> = report
        .monthly_orders
        .iter()
        .map(|m| (m.year_month.clone(), m.total_orders as f64))
        .collect();
    // weekdays are zero-filled, so only chart them when something sold
    let weekdays: Vec<ChartPoint> = if report.weekday_orders.iter().any(|w| w.total_orders > 0) {
        report
            .weekday_orders
            .iter()
            .map(|w| (w.day_of_week.clone(), w.total_orders as f64))
            .collect()
    } else {
        Vec::new()
    };
    let delivered_orders: Vec<ChartPoint> = report
        .delivered_performance
        .iter()
        .map(|m| (m.year_month.clone(), m.total_orders as f64))
        .collect();
    let delivered_revenue: Vec<ChartPoint> = report
        .delivered_performance
        .iter()
        .map(|m| (m.year_month.clone(), m.total_revenue))
        .collect();
    let segments: Vec<ChartPoint> = report
        .rfm
        .table()
        .map(|t| {
            t.segments
                .iter()
                .map(|s| (s.segment.label().to_string(), s.count as f64))
                .collect()
        })
        .unwrap_or_default();

    let sold = ("Product Category", "Total Items Sold");
    let orders_by_month = ("Year-Month", "Total Orders");
    vec![
        ChartSpec::bar(
            "top_categories.png",
            "The Most Sold Product Categories",
            sold,
            top,
        ),
        ChartSpec::bar(
            "bottom_categories.png",
            "The Least Sold Product Categories",
            sold,
            bottom,
        ),
        ChartSpec::line(
            "monthly_orders.png",
            "Monthly Orders Over Time",
            orders_by_month,
            monthly,
        ),
        ChartSpec::bar(
            "weekday_orders.png",
            "Orders Distribution by Day of Week",
            ("Day of Week", "Total Orders"),
            weekdays,
        ),
        ChartSpec::line(
            "delivered_orders.png",
            "Monthly Orders (Delivered Only)",
            orders_by_month,
            delivered_orders,
        ),
        ChartSpec::line(
            "delivered_revenue.png",
            "Monthly Revenue (Delivered Only)",
            ("Year-Month", "Total Revenue"),
            delivered_revenue,
        ),
        ChartSpec::bar(
            "review_sentiment.png",
            "High vs. Low Ratings",
            ("Rating Category", "Number of Orders"),
            label_points(&report.review_sentiment),
        ),
        ChartSpec::bar(
            "retention.png",
            "Retention vs. Churn",
            ("Customer Type", "Number of Customers"),
            label_points(&report.retention),
        ),
        ChartSpec::bar(
            "rfm_segments.png",
            "RFM Segments Distribution",
            ("Segment", "Number of Customers"),
            segments,
        ),
    ]
}

/// Render every non-empty chart of a report into `output_dir`
///
/// # Returns
/// * Paths of the charts written; empty views are skipped with a warning
pub fn render_report(report: &DashboardReport, output_dir: &Path) -> crate::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)?;

    let mut written = Vec::new();
    for chart in report_charts(report) {
        if chart.points.is_empty() {
            warn!(chart = chart.title, "no data in range; chart skipped");
            continue;
        }
        let path = output_dir.join(chart.file);
        match chart.kind {
            ChartKind::Bar => draw_bar_chart(&chart.points, &path, chart.title, chart.axis)?,
            ChartKind::Line => draw_line_chart(&chart.points, &path, chart.title, chart.axis)?,
        }
        written.push(path);
    }
    Ok(written)
}

/// Print the report tables to the console
pub fn print_report(report: &DashboardReport) {
    println!("\n=== Dashboard: {} to {} ===", report.range.start, report.range.end);
    for warning in &report.warnings {
        println!("warning: {}", warning);
    }
    println!("Orders in range: {}", report.filtered_orders);

    if report.categories.is_empty() {
        println!("\nNo sales in this date range.");
    } else {
        println!("\nTop categories:");
        for c in report.categories.top(CATEGORY_CHART_SIZE) {
            println!("  {:<40} {:>8}", c.category, c.total_sold);
        }
        println!("\nBottom categories:");
        for c in report.categories.bottom(CATEGORY_CHART_SIZE) {
            println!("  {:<40} {:>8}", c.category, c.total_sold);
        }
    }

    println!("\nMonthly orders:");
    for m in &report.monthly_orders {
        println!("  {} {:>8}", m.year_month, m.total_orders);
    }

    println!("\nOrders by day of week:");
    for w in &report.weekday_orders {
        println!("  {:<10} {:>8}", w.day_of_week, w.total_orders);
    }

    println!("\nDelivered orders and revenue:");
    println!("  Month   |   Orders |      Revenue");
    println!("  --------|----------|-------------");
    for m in &report.delivered_performance {
        println!("  {} | {:>8} | {:>12.2}", m.year_month, m.total_orders, m.total_revenue);
    }

    println!("\nReview ratings:");
    for c in &report.review_sentiment {
        println!("  {:<12} {:>8}", c.label, c.count);
    }

    println!("\nCustomer retention:");
    for c in &report.retention {
        println!("  {:<12} {:>8}", c.label, c.count);
    }

    match &report.rfm {
        RfmOutcome::NoData => {
            println!("\nRFM data is not available for this date range (no transactions).");
        }
        RfmOutcome::Scored(table) => {
            let total = table.records.len();
            println!("\n=== RFM Segments (snapshot {}) ===", table.snapshot);
            for s in &table.segments {
                let percentage = (s.count as f64 / total as f64) * 100.0;
                println!("  {:<20} {:>8} ({:.1}%)", s.segment.label(), s.count, percentage);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::DateRange;
    use crate::insights::{CategoryRanking, CategorySales};
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn empty_report() -> DashboardReport {
        let day = NaiveDate::from_ymd_opt(2018, 1, 1).unwrap();
        DashboardReport {
            range: DateRange::new(day, day),
            warnings: vec![],
            filtered_orders: 0,
            categories: CategoryRanking::default(),
            monthly_orders: vec![],
            weekday_orders: vec![],
            delivered_performance: vec![],
            review_sentiment: vec![],
            retention: vec![],
            customer_summaries: vec![],
            rfm: RfmOutcome::NoData,
        }
    }

    #[test]
    fn test_value_axis_max() {
        assert_eq!(value_axis_max(&[]), 1.0);
        assert_eq!(value_axis_max(&[("a".into(), 0.0)]), 1.0);
        let max = value_axis_max(&[("a".into(), 10.0), ("b".into(), 4.0)]);
        assert!((max - 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_report_renders_nothing() {
        let dir = tempdir().unwrap();
        let written = render_report(&empty_report(), dir.path()).unwrap();
        assert!(written.is_empty());
    }

    #[test]
    fn test_report_charts_follow_tables() {
        let mut report = empty_report();
        report.categories = CategoryRanking {
            categories: vec![
                CategorySales {
                    category: "cama_mesa_banho".into(),
                    total_sold: 9,
                },
                CategorySales {
                    category: "telefonia".into(),
                    total_sold: 2,
                },
            ],
        };
        report.retention = vec![LabelCount {
            label: "One-time".into(),
            count: 4,
        }];

        let charts = report_charts(&report);
        let non_empty: Vec<&str> = charts
            .iter()
            .filter(|c| !c.points.is_empty())
            .map(|c| c.file)
            .collect();
        assert_eq!(
            non_empty,
            vec!["top_categories.png", "bottom_categories.png", "retention.png"]
        );
        assert_eq!(charts[1].points[0], ("telefonia".to_string(), 2.0));
        assert_eq!(charts[2].kind, ChartKind::Line);
    }

    #[test]
    fn test_draw_rejects_empty_points() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.png");
        assert!(draw_bar_chart(&[], &path, "Empty", ("x", "y")).is_err());
        assert!(draw_line_chart(&[], &path, "Empty", ("x", "y")).is_err());
    }

    #[test]
    #[ignore = "needs a system font for text rendering"]
    fn test_draw_charts_to_png() {
        let dir = tempdir().unwrap();
        let points = vec![("2018-01".to_string(), 3.0), ("2018-02".to_string(), 5.0)];

        let bar = dir.path().join("bar.png");
        draw_bar_chart(&points, &bar, "Bars", ("Month", "Orders")).unwrap();
        assert!(bar.exists());

        let line = dir.path().join("line.png");
        draw_line_chart(&points, &line, "Line", ("Month", "Orders")).unwrap();
        assert!(line.exists());
    }
}
