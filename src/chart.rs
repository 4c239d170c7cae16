//! PNG charts for the KPI results.
//!
//! Charts are drawn with `plotters` on a bitmap backend.  Text uses the regular face of the font
//! family resolved by [`crate::fonts`], registered once per process as `sans-serif`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use log::info;
use plotters::prelude::*;
use plotters::style::{register_font, FontStyle};
use thiserror::Error;

use crate::fonts;
use crate::kpi::{GroupValue, Kpi1, Kpi2, KpiReport, UNKNOWN_EDUCATION_LABEL};

pub const KPI1_CHART: &str = "kpi1_avg_spend_by_discount.png";
pub const KPI2_CHART: &str = "kpi2_conversion_rate_over_time.png";
pub const KPI3_CHART: &str = "kpi3_pct_by_education.png";
pub const KPI3_FILLED_CHART: &str = "kpi3_pct_by_education_filled.png";

const FONT_FAMILY: &str = "sans-serif";
const BAR_CHART_SIZE: (u32, u32) = (900, 600);
const WIDE_CHART_SIZE: (u32, u32) = (1200, 750);

/// Errors raised while drawing charts.
#[derive(Debug, Error)]
pub enum ChartError {
    #[error("failed to create figures directory {path}: {source}")]
    Io { path: String, source: io::Error },
    #[error("no font available for chart text")]
    Font(#[source] genpdf::error::Error),
    #[error("chart font could not be registered: {0}")]
    FontRegistration(String),
    #[error("failed to draw {path}: {message}")]
    Draw { path: String, message: String },
}

static CHART_FONT: OnceLock<Result<(), String>> = OnceLock::new();

/// Registers the chart font. Only the first call resolves and registers a font.
pub fn register_chart_font(fonts_dir: Option<&Path>) -> Result<(), ChartError> {
    if let Some(registered) = CHART_FONT.get() {
        return registered.clone().map_err(ChartError::FontRegistration);
    }

    let resolved = fonts::resolve_fonts(fonts_dir).map_err(ChartError::Font)?;
    let bytes = resolved.regular_bytes().map_err(ChartError::Font)?;

    CHART_FONT
        .get_or_init(|| {
            // plotters keeps registered fonts for the lifetime of the process.
            let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
            register_font(FONT_FAMILY, FontStyle::Normal, bytes)
                .map_err(|_| "invalid TTF data".to_string())
        })
        .clone()
        .map_err(ChartError::FontRegistration)
}

fn draw_error(path: &Path) -> impl Fn(String) -> ChartError + '_ {
    move |message| ChartError::Draw {
        path: path.display().to_string(),
        message,
    }
}

/// Labels and axis captions of a bar chart.
pub struct BarChart<'a> {
    pub title: &'a str,
    pub x_desc: &'a str,
    pub y_desc: &'a str,
}

/// Draws one bar per group. Groups with a null value are left out.
pub fn draw_bar_chart(path: &Path, chart: &BarChart<'_>, groups: &[GroupValue]) -> Result<(), ChartError> {
    let error = draw_error(path);
    let bars: Vec<(String, f64)> = groups
        .iter()
        .filter_map(|group| Some((group.label_or("NULL").to_string(), group.value?)))
        .collect();
    let y_max = bars
        .iter()
        .map(|(_, value)| *value)
        .fold(0.0_f64, f64::max)
        .max(1.0)
        * 1.15;

    let size = if bars.len() > 4 { WIDE_CHART_SIZE } else { BAR_CHART_SIZE };
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE).map_err(|e| error(e.to_string()))?;

    let mut plot = ChartBuilder::on(&root)
        .caption(chart.title, (FONT_FAMILY, 24))
        .margin(20)
        .x_label_area_size(70)
        .y_label_area_size(80)
        .build_cartesian_2d((0..bars.len().max(1)).into_segmented(), 0.0..y_max)
        .map_err(|e| error(e.to_string()))?;

    let label_of = |value: &SegmentValue<usize>| match value {
        SegmentValue::CenterOf(index) => bars
            .get(*index)
            .map(|(label, _)| label.clone())
            .unwrap_or_default(),
        _ => String::new(),
    };
    plot.configure_mesh()
        .disable_x_mesh()
        .y_max_light_lines(1)
        .x_labels(bars.len().max(1))
        .x_label_formatter(&label_of)
        .x_desc(chart.x_desc)
        .y_desc(chart.y_desc)
        .label_style((FONT_FAMILY, 16))
        .axis_desc_style((FONT_FAMILY, 18))
        .draw()
        .map_err(|e| error(e.to_string()))?;

    plot.draw_series(
        Histogram::vertical(&plot)
            .style(BLUE.mix(0.75).filled())
            .margin(24)
            .data(bars.iter().enumerate().map(|(index, (_, value))| (index, *value))),
    )
    .map_err(|e| error(e.to_string()))?;

    root.present().map_err(|e| error(e.to_string()))?;
    Ok(())
}

/// Draws KPI 1 by discount usage.
pub fn draw_kpi1(path: &Path, kpi: &Kpi1) -> Result<(), ChartError> {
    draw_bar_chart(
        path,
        &BarChart {
            title: "KPI 1: Povprečna poraba na transakcijo (po popust_uporabljen)",
            x_desc: "Popust uporabljen",
            y_desc: "Povprečna poraba",
        },
        &kpi.by_discount,
    )
}

/// Draws KPI 2 as one line per year over months 1 to 12.
pub fn draw_kpi2(path: &Path, kpi: &Kpi2) -> Result<(), ChartError> {
    let error = draw_error(path);
    let y_max = kpi
        .by_period
        .iter()
        .filter_map(|period| period.value)
        .fold(0.0_f64, f64::max)
        .max(1.0)
        * 1.15;

    let root = BitMapBackend::new(path, WIDE_CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(|e| error(e.to_string()))?;

    let mut plot = ChartBuilder::on(&root)
        .caption("KPI 2: Stopnja konverzije po letih in mesecih", (FONT_FAMILY, 24))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(80)
        .build_cartesian_2d(0.5_f64..12.5_f64, 0.0..y_max)
        .map_err(|e| error(e.to_string()))?;

    plot.configure_mesh()
        .x_labels(12)
        .x_label_formatter(&|month| format!("{month:.0}"))
        .x_desc("Mesec")
        .y_desc("Stopnja konverzije (%)")
        .label_style((FONT_FAMILY, 16))
        .axis_desc_style((FONT_FAMILY, 18))
        .draw()
        .map_err(|e| error(e.to_string()))?;

    for (index, year) in kpi.years().into_iter().enumerate() {
        let color = Palette99::pick(index).mix(0.9);
        let points: Vec<(f64, f64)> = kpi
            .by_period
            .iter()
            .filter(|period| period.year == Some(year))
            .filter_map(|period| Some((period.month? as f64, period.value?)))
            .collect();

        plot.draw_series(LineSeries::new(points.clone(), color.stroke_width(2)))
            .map_err(|e| error(e.to_string()))?
            .label(year.to_string())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
        plot.draw_series(
            points
                .into_iter()
                .map(|point| Circle::new(point, 4, color.filled())),
        )
        .map_err(|e| error(e.to_string()))?;
    }

    plot.configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .label_font((FONT_FAMILY, 16))
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(|e| error(e.to_string()))?;

    root.present().map_err(|e| error(e.to_string()))?;
    Ok(())
}

/// Draws KPI 3 shares per education level.
pub fn draw_kpi3(path: &Path, groups: &[GroupValue]) -> Result<(), ChartError> {
    draw_bar_chart(
        path,
        &BarChart {
            title: "KPI 3: Delež e-trgovinskih kupcev po izobrazbeni ravni",
            x_desc: "Izobrazbena raven",
            y_desc: "Delež kupcev (%)",
        },
        groups,
    )
}

/// Draws every KPI chart into `figures_dir`, overwriting earlier files.
///
/// Returns the written paths in drawing order.
pub fn render_all(
    report: &KpiReport,
    figures_dir: &Path,
    fonts_dir: Option<&Path>,
) -> Result<Vec<PathBuf>, ChartError> {
    fs::create_dir_all(figures_dir).map_err(|source| ChartError::Io {
        path: figures_dir.display().to_string(),
        source,
    })?;
    register_chart_font(fonts_dir)?;

    let kpi1_path = figures_dir.join(KPI1_CHART);
    draw_kpi1(&kpi1_path, &report.kpi1)?;

    let kpi2_path = figures_dir.join(KPI2_CHART);
    draw_kpi2(&kpi2_path, &report.kpi2)?;

    let kpi3_path = figures_dir.join(KPI3_CHART);
    draw_kpi3(&kpi3_path, &report.kpi3.without_unknown())?;

    let kpi3_filled_path = figures_dir.join(KPI3_FILLED_CHART);
    draw_kpi3(
        &kpi3_filled_path,
        &report.kpi3.with_unknown_label(UNKNOWN_EDUCATION_LABEL),
    )?;

    let written = vec![kpi1_path, kpi2_path, kpi3_path, kpi3_filled_path];
    for path in &written {
        info!("Saved chart {}", path.display());
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kpi::{Kpi3, PeriodValue};
    use image::GenericImageView;

    fn group(label: Option<&str>, value: Option<f64>) -> GroupValue {
        GroupValue {
            label: label.map(str::to_string),
            value,
        }
    }

    fn sample_report() -> KpiReport {
        KpiReport {
            kpi1: Kpi1 {
                overall: Some(30.0),
                by_discount: vec![group(Some("No"), Some(36.7)), group(Some("Yes"), Some(20.0))],
                by_customer_status: vec![group(Some("Nov"), Some(26.7))],
            },
            kpi2: Kpi2 {
                overall: Some(25.0),
                by_discount: vec![group(Some("Yes"), Some(22.2))],
                by_period: vec![
                    PeriodValue { year: Some(2023), month: Some(1), value: Some(25.0) },
                    PeriodValue { year: Some(2023), month: Some(2), value: None },
                    PeriodValue { year: Some(2024), month: Some(1), value: Some(20.0) },
                ],
            },
            kpi3: Kpi3 {
                total_customers: 3,
                by_education: vec![
                    group(Some("Srednja"), Some(33.3)),
                    group(Some("Visoka"), Some(33.3)),
                    group(None, Some(33.3)),
                ],
            },
        }
    }

    #[test]
    fn renders_every_chart() {
        if !fonts::fonts_available(None) {
            eprintln!("Skipping renders_every_chart: no font family found. Set KPI_REPORT_FONTS_DIR.");
            return;
        }

        let dir = tempfile::tempdir().expect("tempdir");
        let written = render_all(&sample_report(), dir.path(), None).expect("charts render");

        let names: Vec<_> = written
            .iter()
            .filter_map(|path| path.file_name()?.to_str())
            .collect();
        assert_eq!(names, [KPI1_CHART, KPI2_CHART, KPI3_CHART, KPI3_FILLED_CHART]);
        for path in &written {
            let image = image::open(path).expect("chart is a readable image");
            assert!(image.width() > 0 && image.height() > 0);
        }
    }

    #[test]
    fn empty_results_still_produce_a_chart() {
        if !fonts::fonts_available(None) {
            eprintln!("Skipping empty_results_still_produce_a_chart: no font family found.");
            return;
        }

        register_chart_font(None).expect("font registers");
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("empty.png");
        draw_kpi3(&path, &[]).expect("empty chart renders");
        assert!(path.is_file());
    }
}
