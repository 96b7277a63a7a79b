use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use plotters::prelude::*;

// ---------------------------------------------------------------------------
// ChartRenderer — injected rendering strategy
// ---------------------------------------------------------------------------

/// Shape of a rendered chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Line,
    Bar,
}

/// Strategy for turning a labeled series into an embeddable image.
///
/// Rendering is a soft feature: implementations return `None` for an empty
/// series or on any internal failure, never an error. Callers treat a missing
/// chart as an omission. Labels are drawn in the order given; callers sort
/// upstream when chronological order matters.
pub trait ChartRenderer: Send + Sync {
    /// Render the series and return base64-encoded SVG, or `None` when the
    /// chart is unavailable.
    fn render(
        &self,
        series: &[(String, f64)],
        title: &str,
        x_label: &str,
        y_label: &str,
        kind: ChartKind,
    ) -> Option<String>;
}

/// Renderer used when chart output is disabled. Always reports the chart as
/// unavailable.
pub struct NullChartRenderer;

impl ChartRenderer for NullChartRenderer {
    fn render(
        &self,
        _series: &[(String, f64)],
        _title: &str,
        _x_label: &str,
        _y_label: &str,
        _kind: ChartKind,
    ) -> Option<String> {
        None
    }
}

// ---------------------------------------------------------------------------
// SvgChartRenderer — plotters SVG backend
// ---------------------------------------------------------------------------

/// Chart renderer backed by the plotters SVG backend. The output is a plain
/// SVG document, so reports stay self-contained without a raster encoder.
pub struct SvgChartRenderer {
    width: u32,
    height: u32,
}

impl SvgChartRenderer {
    pub fn new() -> Self {
        Self {
            width: 1000,
            height: 600,
        }
    }

    pub fn with_size(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn draw(
        &self,
        series: &[(String, f64)],
        title: &str,
        x_label: &str,
        y_label: &str,
        kind: ChartKind,
    ) -> Result<String, Box<dyn std::error::Error>> {
        let mut svg = String::new();
        {
            let root =
                SVGBackend::with_string(&mut svg, (self.width, self.height)).into_drawing_area();
            root.fill(&WHITE)?;

            let max_value = series.iter().map(|(_, v)| *v).fold(0.0_f64, f64::max);
            let y_max = if max_value > 0.0 { max_value * 1.1 } else { 1.0 };

            let mut chart = ChartBuilder::on(&root)
                .caption(title, ("sans-serif", 30))
                .margin(20)
                .x_label_area_size(60)
                .y_label_area_size(80)
                .build_cartesian_2d(0..series.len(), 0.0..y_max)?;

            chart
                .configure_mesh()
                .x_labels(series.len())
                .x_label_formatter(&|idx: &usize| {
                    series
                        .get(*idx)
                        .map(|(label, _)| label.clone())
                        .unwrap_or_default()
                })
                .x_desc(x_label)
                .y_desc(y_label)
                .draw()?;

            match kind {
                ChartKind::Bar => {
                    chart.draw_series(series.iter().enumerate().map(|(idx, (_, value))| {
                        Rectangle::new([(idx, 0.0), (idx + 1, *value)], BLUE.mix(0.8).filled())
                    }))?;
                }
                ChartKind::Line => {
                    chart.draw_series(LineSeries::new(
                        series.iter().enumerate().map(|(idx, (_, value))| (idx, *value)),
                        &BLUE,
                    ))?;
                    chart.draw_series(series.iter().enumerate().map(|(idx, (_, value))| {
                        Circle::new((idx, *value), 4, BLUE.filled())
                    }))?;
                }
            }

            root.present()?;
        }
        Ok(svg)
    }
}

impl Default for SvgChartRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ChartRenderer for SvgChartRenderer {
    fn render(
        &self,
        series: &[(String, f64)],
        title: &str,
        x_label: &str,
        y_label: &str,
        kind: ChartKind,
    ) -> Option<String> {
        if series.is_empty() {
            return None;
        }
        match self.draw(series, title, x_label, y_label, kind) {
            Ok(svg) => Some(STANDARD.encode(svg.as_bytes())),
            Err(err) => {
                tracing::warn!("Chart rendering failed for '{title}': {err}");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
