use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chart::{ChartKind, ChartRenderer};
use crate::history::{HistoryRow, HistoryStore};
use crate::metrics::{summarize, PerformanceSummary, TestMetrics};

// ---------------------------------------------------------------------------
// JSON report
// ---------------------------------------------------------------------------

/// Aggregate totals across every record in a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReportTotals {
    pub total_tests: u64,
    pub total_requests: u64,
    pub total_errors: u64,
    pub total_duration: f64,
}

/// One per buffered record, in insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TestReportEntry {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub metrics: TestMetrics,
    pub summary: PerformanceSummary,
}

/// Machine-readable session report. The top-level totals are recomputable
/// from the `tests` array, and the two must always agree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct JsonReport {
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub summary: ReportTotals,
    pub tests: Vec<TestReportEntry>,
}

/// Build the JSON report for a session's buffered records.
pub fn json_report(run_id: Uuid, metrics: &[TestMetrics]) -> JsonReport {
    let summary = ReportTotals {
        total_tests: metrics.len() as u64,
        total_requests: metrics.iter().map(|m| m.total_requests).sum(),
        total_errors: metrics.iter().map(|m| m.error_count).sum(),
        total_duration: metrics.iter().map(|m| m.duration).sum(),
    };

    let tests = metrics
        .iter()
        .map(|m| TestReportEntry {
            name: m.test_name.clone(),
            timestamp: m.timestamp,
            metrics: m.clone(),
            summary: summarize(m),
        })
        .collect();

    JsonReport {
        run_id,
        timestamp: Utc::now(),
        summary,
        tests,
    }
}

// ---------------------------------------------------------------------------
// HTML report
// ---------------------------------------------------------------------------

/// Render a self-contained HTML report: executive summary, optional timing
/// breakdown, per-test charts, an optional 7-day historical trend, and a
/// detailed per-test table. Charts are inlined as base64 SVG, so the document
/// has no external references.
///
/// History enrichment is best-effort: a failing store query drops the trend
/// section and nothing else.
pub fn html_report(
    metrics: &[TestMetrics],
    renderer: &dyn ChartRenderer,
    history: Option<&HistoryStore>,
    deployment_url: &str,
) -> String {
    let generated = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();

    let total_requests: u64 = metrics.iter().map(|m| m.total_requests).sum();
    let total_errors: u64 = metrics.iter().map(|m| m.error_count).sum();
    let total_duration: f64 = metrics.iter().map(|m| m.duration).sum();
    // Saturating: the pub fields let a deserialized record carry more errors
    // than requests, and the overall rate must still clamp to 0.
    let overall_success_rate = if total_requests > 0 {
        total_requests.saturating_sub(total_errors) as f64 / total_requests as f64 * 100.0
    } else {
        0.0
    };

    let summaries: Vec<(&TestMetrics, PerformanceSummary)> =
        metrics.iter().map(|m| (m, summarize(m))).collect();

    // Per-test charts.
    let mut charts: Vec<(&str, Option<String>)> = Vec::new();
    if !metrics.is_empty() {
        let response_series: Vec<(String, f64)> = summaries
            .iter()
            .map(|(m, s)| (m.test_name.clone(), s.avg_response_time))
            .collect();
        charts.push((
            "response_times",
            renderer.render(
                &response_series,
                "Average Response Times by Test",
                "Test Name",
                "Response Time (seconds)",
                ChartKind::Bar,
            ),
        ));

        let throughput_series: Vec<(String, f64)> = summaries
            .iter()
            .map(|(m, s)| (m.test_name.clone(), s.throughput))
            .collect();
        charts.push((
            "throughput",
            renderer.render(
                &throughput_series,
                "Throughput by Test",
                "Test Name",
                "Requests/Second",
                ChartKind::Bar,
            ),
        ));
    }

    // Historical trend over the last 7 days, averaged per calendar date.
    let historical_chart = if metrics.is_empty() {
        None
    } else {
        history.and_then(|store| match store.query(None, 7) {
            Ok(rows) => {
                let trend = historical_trend_series(&rows);
                renderer.render(
                    &trend,
                    "Response Time Trend (Last 7 Days)",
                    "Date",
                    "Average Response Time (seconds)",
                    ChartKind::Line,
                )
            }
            Err(err) => {
                tracing::warn!("Historical query failed, omitting trend section: {err}");
                None
            }
        })
    };

    let deployment_line = if deployment_url.is_empty() {
        String::new()
    } else {
        format!(
            "<span>Deployment: {}</span>",
            html_escape(deployment_url)
        )
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>OCR API Performance Report</title>
<style>
  *, *::before, *::after {{ box-sizing: border-box; }}
  body {{
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
    margin: 0; padding: 2rem;
    background: #0f172a; color: #e2e8f0;
    line-height: 1.5;
  }}
  h1 {{ font-size: 1.75rem; font-weight: 700; color: #f1f5f9; margin: 0 0 0.25rem; }}
  h2 {{ font-size: 1.125rem; font-weight: 600; color: #94a3b8;
        text-transform: uppercase; letter-spacing: 0.05em;
        margin: 2rem 0 0.75rem; border-bottom: 1px solid #1e293b; padding-bottom: 0.5rem; }}
  .meta {{ color: #64748b; font-size: 0.875rem; margin-bottom: 2rem; }}
  .meta span {{ margin-right: 1.5rem; }}
  .stats-grid {{
    display: grid;
    grid-template-columns: repeat(auto-fill, minmax(180px, 1fr));
    gap: 1rem; margin-bottom: 2rem;
  }}
  .stat-card {{
    background: #1e293b; border: 1px solid #334155;
    border-radius: 0.5rem; padding: 1rem 1.25rem;
  }}
  .stat-card .label {{
    font-size: 0.75rem; text-transform: uppercase; letter-spacing: 0.05em;
    color: #64748b; margin-bottom: 0.25rem;
  }}
  .stat-card .value {{
    font-size: 1.5rem; font-weight: 700; color: #f1f5f9;
  }}
  .stat-card .unit {{ font-size: 0.875rem; color: #94a3b8; margin-left: 0.2rem; }}
  table {{
    width: 100%; border-collapse: collapse; font-size: 0.8125rem;
    background: #1e293b; border-radius: 0.5rem; overflow: hidden;
    margin-bottom: 2rem;
  }}
  thead {{ background: #0f172a; }}
  th {{
    padding: 0.625rem 0.875rem; text-align: left;
    font-weight: 600; color: #94a3b8;
    text-transform: uppercase; letter-spacing: 0.04em;
    font-size: 0.75rem;
  }}
  td {{ padding: 0.5rem 0.875rem; border-top: 1px solid #334155; color: #cbd5e1; }}
  tr:hover td {{ background: #243352; }}
  .status-success {{ color: #34d399; font-weight: 600; }}
  .status-warning {{ color: #fbbf24; font-weight: 600; }}
  .status-error   {{ color: #f87171; font-weight: 600; }}
  .chart-container {{ text-align: center; margin: 1.5rem 0; }}
  .chart-container img {{
    max-width: 100%; height: auto; border-radius: 0.5rem;
    background: white;
  }}
  .alert {{
    padding: 0.875rem 1rem; border-radius: 0.5rem; margin-bottom: 1rem;
    font-size: 0.875rem;
  }}
  .alert-info {{
    background: #0c4a6e; border: 1px solid #0284c7; color: #bae6fd;
  }}
  .alert-warning {{
    background: #451a03; border: 1px solid #d97706; color: #fde68a;
  }}
  footer {{
    margin-top: 3rem; padding-top: 1rem; border-top: 1px solid #1e293b;
    color: #475569; font-size: 0.8125rem;
  }}
</style>
</head>
<body>
<h1>OCR API Performance Report</h1>
<div class="meta">
  <span>Generated: {generated}</span>
  {deployment_line}
</div>

<h2>Executive Summary</h2>
<div class="stats-grid">
  <div class="stat-card">
    <div class="label">Total Requests</div>
    <div class="value">{total_requests}</div>
  </div>
  <div class="stat-card">
    <div class="label">Success Rate</div>
    <div class="value">{overall_success_rate:.1}<span class="unit">%</span></div>
  </div>
  <div class="stat-card">
    <div class="label">Tests Executed</div>
    <div class="value">{test_count}</div>
  </div>
  <div class="stat-card">
    <div class="label">Total Duration</div>
    <div class="value">{total_duration:.1}<span class="unit">s</span></div>
  </div>
</div>
{alerts}
{timing_breakdown}
<h2>Performance Charts</h2>
{charts_html}
{historical_section}
<h2>Detailed Test Results</h2>
<table>
  <thead>
    <tr>
      <th>Test Name</th>
      <th>Requests</th>
      <th>Success Rate</th>
      <th>Avg Response Time</th>
      <th>95th Percentile</th>
      <th>Creation Time</th>
      <th>Processing Time</th>
      <th>Real Throughput</th>
      <th>Status</th>
    </tr>
  </thead>
  <tbody>
{test_rows}
  </tbody>
</table>

<footer>Generated by the OCR API performance testing suite &bull; {generated}</footer>
</body>
</html>
"#,
        generated = generated,
        deployment_line = deployment_line,
        total_requests = total_requests,
        overall_success_rate = overall_success_rate,
        test_count = metrics.len(),
        total_duration = total_duration,
        alerts = alerts_html(overall_success_rate),
        timing_breakdown = timing_breakdown_html(metrics),
        charts_html = charts_html(&charts),
        historical_section = historical_section_html(historical_chart.as_deref()),
        test_rows = test_rows_html(&summaries),
    )
}

/// Advisory banners derived from the overall success rate. The two thresholds
/// are deliberately independent checks, not an if/else chain, so retuning one
/// never silently changes the other.
fn alerts_html(success_rate: f64) -> String {
    let mut alerts = String::new();

    if success_rate < 90.0 {
        alerts.push_str(
            "<div class=\"alert alert-warning\"><strong>Performance alert:</strong> \
             success rate below 90%. Investigate error causes and system load.</div>\n",
        );
    }

    if success_rate >= 95.0 {
        alerts.push_str(
            "<div class=\"alert alert-info\"><strong>Performing well:</strong> \
             success rate above 95% under the current load.</div>\n",
        );
    }

    alerts
}

/// Timing-breakdown block, shown only when at least one record carries real
/// per-task timing data. Values are aggregated across all records.
fn timing_breakdown_html(metrics: &[TestMetrics]) -> String {
    if !metrics.iter().any(TestMetrics::has_timing_breakdown) {
        return String::new();
    }

    let mut all_creation = Vec::new();
    let mut all_processing = Vec::new();
    let mut all_queue = Vec::new();
    for m in metrics {
        all_creation.extend_from_slice(&m.creation_times);
        all_processing.extend_from_slice(&m.processing_times);
        all_queue.extend_from_slice(&m.queue_wait_times);
    }

    let mut cards = String::new();
    if !all_creation.is_empty() {
        let avg = all_creation.iter().sum::<f64>() / all_creation.len() as f64;
        cards.push_str(&stat_card(&format!("{avg:.2}s"), "Avg Task Creation"));
    }
    if !all_processing.is_empty() {
        let avg = all_processing.iter().sum::<f64>() / all_processing.len() as f64;
        cards.push_str(&stat_card(&format!("{avg:.1}s"), "Avg OCR Processing"));
        cards.push_str(&stat_card(
            &format!("{:.2}", 1.0 / avg),
            "Real Throughput (req/s)",
        ));
    }
    if !all_queue.is_empty() {
        let avg = all_queue.iter().sum::<f64>() / all_queue.len() as f64;
        cards.push_str(&stat_card(&format!("{avg:.1}s"), "Avg Queue Wait"));
    }

    format!(
        "<h2>Timing Breakdown Analysis</h2>\n\
         <div class=\"alert alert-info\"><strong>Real performance metrics:</strong> \
         actual OCR processing phases, not just HTTP response times.</div>\n\
         <div class=\"stats-grid\">\n{cards}</div>\n"
    )
}

fn stat_card(value: &str, label: &str) -> String {
    format!(
        "<div class=\"stat-card\"><div class=\"value\">{value}</div>\
         <div class=\"label\">{label}</div></div>\n"
    )
}

fn charts_html(charts: &[(&str, Option<String>)]) -> String {
    let mut parts = String::new();
    for (name, chart) in charts {
        if let Some(encoded) = chart {
            parts.push_str(&format!(
                "<div class=\"chart-container\">\
                 <img src=\"data:image/svg+xml;base64,{encoded}\" alt=\"{name} chart\">\
                 </div>\n"
            ));
        }
    }
    if parts.is_empty() {
        parts.push_str(
            "<div class=\"alert alert-info\"><strong>Charts:</strong> \
             chart rendering is unavailable for this report.</div>\n",
        );
    }
    parts
}

fn historical_section_html(chart: Option<&str>) -> String {
    match chart {
        Some(encoded) => format!(
            "<h2>Historical Trends</h2>\n\
             <div class=\"chart-container\">\
             <img src=\"data:image/svg+xml;base64,{encoded}\" alt=\"historical trend chart\">\
             </div>\n"
        ),
        None => String::new(),
    }
}

fn test_rows_html(summaries: &[(&TestMetrics, PerformanceSummary)]) -> String {
    summaries
        .iter()
        .map(|(m, s)| {
            let status = if s.success_rate >= 95.0 {
                "<span class=\"status-success\">Excellent</span>"
            } else if s.success_rate >= 80.0 {
                "<span class=\"status-warning\">Good</span>"
            } else {
                "<span class=\"status-error\">Poor</span>"
            };
            format!(
                "<tr><td>{name}</td><td>{requests}</td><td>{success:.1}%</td>\
                 <td>{avg:.2}s</td><td>{p95:.2}s</td><td>{creation:.2}s</td>\
                 <td>{processing:.1}s</td><td>{real_tp:.2} req/s</td><td>{status}</td></tr>",
                name = html_escape(&m.test_name),
                requests = s.total_requests,
                success = s.success_rate,
                avg = s.avg_response_time,
                p95 = s.percentile_95_response_time,
                creation = s.avg_creation_time,
                processing = s.avg_processing_time,
                real_tp = s.real_throughput,
                status = status,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Group history rows by calendar date, average each date's stored
/// `avg_response_time`, sort ascending by date, and keep at most the last
/// seven points.
fn historical_trend_series(rows: &[HistoryRow]) -> Vec<(String, f64)> {
    let mut daily: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for row in rows {
        let date = row.timestamp.format("%Y-%m-%d").to_string();
        daily.entry(date).or_default().push(row.summary.avg_response_time);
    }

    let points: Vec<(String, f64)> = daily
        .into_iter()
        .map(|(date, values)| {
            let avg = values.iter().sum::<f64>() / values.len() as f64;
            (date, avg)
        })
        .collect();

    let start = points.len().saturating_sub(7);
    points[start..].to_vec()
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
