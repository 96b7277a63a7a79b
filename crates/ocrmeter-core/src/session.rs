use std::path::{Path, PathBuf};

use chrono::Utc;
use uuid::Uuid;

use crate::chart::{ChartRenderer, NullChartRenderer, SvgChartRenderer};
use crate::error::OcrmeterError;
use crate::history::HistoryStore;
use crate::metrics::TestMetrics;
use crate::report::{html_report, json_report};

// ---------------------------------------------------------------------------
// SessionReporter — buffers records, persists and reports at teardown
// ---------------------------------------------------------------------------

/// Lifecycle of a reporting session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Collecting,
    Finalizing,
    Done,
}

/// Locations of the report artifacts written by [`SessionReporter::finalize`].
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub html: PathBuf,
    pub json: PathBuf,
}

/// Accumulates [`TestMetrics`] over a test session, then persists them to the
/// history store and writes the JSON and HTML reports in one finalize step.
///
/// The reporter exclusively owns its buffer: records go in via [`record`] and
/// leave only through finalization. History persistence is best-effort — a
/// failing store is logged and skipped — while a report file that cannot be
/// written is a hard error.
///
/// [`record`]: SessionReporter::record
pub struct SessionReporter {
    run_id: Uuid,
    deployment_url: String,
    reports_dir: PathBuf,
    store: Option<HistoryStore>,
    renderer: Box<dyn ChartRenderer>,
    metrics: Vec<TestMetrics>,
    state: SessionState,
}

/// Builder for [`SessionReporter`].
pub struct SessionReporterBuilder {
    reports_dir: PathBuf,
    deployment_url: String,
    store: Option<HistoryStore>,
    renderer: Box<dyn ChartRenderer>,
}

impl SessionReporterBuilder {
    pub fn new(reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            reports_dir: reports_dir.into(),
            deployment_url: String::new(),
            store: None,
            renderer: Box::new(SvgChartRenderer::new()),
        }
    }

    pub fn deployment_url(mut self, url: impl Into<String>) -> Self {
        self.deployment_url = url.into();
        self
    }

    /// Attach a history store for persistence and trend enrichment. Without
    /// one, finalize only writes the report files.
    pub fn history_store(mut self, store: HistoryStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn renderer(mut self, renderer: Box<dyn ChartRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Disable chart output entirely.
    pub fn without_charts(mut self) -> Self {
        self.renderer = Box::new(NullChartRenderer);
        self
    }

    /// Create the reporter, creating the reports directory if absent.
    pub fn build(self) -> Result<SessionReporter, OcrmeterError> {
        std::fs::create_dir_all(&self.reports_dir)?;
        Ok(SessionReporter {
            run_id: Uuid::new_v4(),
            deployment_url: self.deployment_url,
            reports_dir: self.reports_dir,
            store: self.store,
            renderer: self.renderer,
            metrics: Vec::new(),
            state: SessionState::Collecting,
        })
    }
}

impl SessionReporter {
    pub fn builder(reports_dir: impl Into<PathBuf>) -> SessionReporterBuilder {
        SessionReporterBuilder::new(reports_dir)
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Records buffered so far, in insertion order.
    pub fn metrics(&self) -> &[TestMetrics] {
        &self.metrics
    }

    /// Buffer one scenario's metrics. Fails fast once the session has been
    /// finalized.
    pub fn record(&mut self, metrics: TestMetrics) -> Result<(), OcrmeterError> {
        if self.state != SessionState::Collecting {
            return Err(OcrmeterError::Session(
                "cannot record metrics after the session was finalized".to_string(),
            ));
        }
        self.metrics.push(metrics);
        Ok(())
    }

    /// Empty the buffer without persisting or reporting anything. Distinct
    /// from finalization; used to reset state mid-session.
    pub fn clear(&mut self) {
        self.metrics.clear();
    }

    /// Persist every buffered record to the history store (best-effort),
    /// render both reports, and write them as
    /// `<prefix>_<YYYYMMDD_HHMMSS>.{html,json}` in the reports directory.
    ///
    /// Only report file writes are fatal here; storage failures are logged
    /// and reporting continues without historical enrichment.
    pub fn finalize(&mut self, prefix: &str) -> Result<ReportPaths, OcrmeterError> {
        if self.state != SessionState::Collecting {
            return Err(OcrmeterError::Session(
                "session already finalized".to_string(),
            ));
        }
        self.state = SessionState::Finalizing;

        if let Some(store) = &self.store {
            for metrics in &self.metrics {
                if let Err(err) = store.append(metrics, &self.deployment_url) {
                    tracing::warn!(
                        "History append failed for '{}': {err}; continuing",
                        metrics.test_name
                    );
                }
            }
        }

        let html = html_report(
            &self.metrics,
            self.renderer.as_ref(),
            self.store.as_ref(),
            &self.deployment_url,
        );
        let report = json_report(self.run_id, &self.metrics);

        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let html_path = self.reports_dir.join(format!("{prefix}_{stamp}.html"));
        let json_path = self.reports_dir.join(format!("{prefix}_{stamp}.json"));

        write_report(&html_path, html.as_bytes())?;
        write_report(&json_path, serde_json::to_string_pretty(&report)?.as_bytes())?;

        self.state = SessionState::Done;
        tracing::info!(
            "Session reports written: {} / {}",
            html_path.display(),
            json_path.display()
        );

        Ok(ReportPaths {
            html: html_path,
            json: json_path,
        })
    }
}

fn write_report(path: &Path, contents: &[u8]) -> Result<(), OcrmeterError> {
    std::fs::write(path, contents)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
