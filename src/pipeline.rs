//! The pipeline stages, in the order a full run executes them.
//!
//! Each stage opens what it needs from the configuration, so the command-line front end can run
//! them separately: extract and load, KPIs with charts, the report, or the store inspector.

use std::path::{Path, PathBuf};

use duckdb::Connection;
use log::info;

use crate::builder::RenderedPdf;
use crate::chart;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::extract::{extract_tables, TableSource};
use crate::frame::Frame;
use crate::inspect::{inspect_store, StoreSummary};
use crate::kpi::KpiReport;
use crate::load::{load_frames, open_store, table_row_count};
use crate::report;
use crate::view::{create_view, StarSchema};

/// Row counts of a completed load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadSummary {
    pub tables: Vec<(String, u64)>,
    pub view_rows: u64,
}

/// Everything a full run produced.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub load: LoadSummary,
    pub kpis: KpiReport,
    pub charts: Vec<PathBuf>,
    pub report: RenderedPdf,
}

/// Replaces the tables of `frames` in the store and recreates the reporting view.
pub fn load_store(
    connection: &mut Connection,
    frames: &[Frame],
    schema: &StarSchema,
) -> Result<LoadSummary, PipelineError> {
    load_frames(connection, frames)?;
    create_view(connection, schema)?;

    let mut tables = Vec::with_capacity(frames.len());
    for frame in frames {
        tables.push((
            frame.name().to_string(),
            table_row_count(connection, frame.name())?,
        ));
    }
    let view_rows = table_row_count(connection, &schema.view_name)?;
    info!("View `{}` holds {} rows", schema.view_name, view_rows);

    Ok(LoadSummary { tables, view_rows })
}

/// Reads every configured table from `source` into the store file and builds the view.
pub fn extract_and_load<S>(config: &PipelineConfig, source: &mut S) -> Result<LoadSummary, PipelineError>
where
    S: TableSource + ?Sized,
{
    let frames = extract_tables(source, &config.tables)?;
    let mut connection = open_store(&config.store_path)?;
    load_store(&mut connection, &frames, &config.schema)
}

/// Opens a store written by an earlier load.
pub fn open_existing_store(path: &Path) -> Result<Connection, PipelineError> {
    if !path.is_file() {
        return Err(PipelineError::StoreMissing {
            path: path.to_path_buf(),
        });
    }
    Ok(open_store(path)?)
}

/// Computes the KPIs from the store file.
pub fn compute_kpis(config: &PipelineConfig) -> Result<KpiReport, PipelineError> {
    let connection = open_existing_store(&config.store_path)?;
    Ok(KpiReport::compute(&connection, &config.kpi_columns)?)
}

/// Draws the KPI charts into the figures directory.
pub fn render_charts(config: &PipelineConfig, kpis: &KpiReport) -> Result<Vec<PathBuf>, PipelineError> {
    Ok(chart::render_all(
        kpis,
        &config.figures_dir,
        config.fonts_dir.as_deref(),
    )?)
}

/// Writes the PDF report from whatever figures exist.
pub fn build_report(config: &PipelineConfig) -> Result<RenderedPdf, PipelineError> {
    Ok(report::write_report(
        config.into(),
        &config.schema.view_name,
        config.fonts_dir.clone(),
    )?)
}

/// Summarises the store file for the console.
pub fn inspect(config: &PipelineConfig, limit: usize) -> Result<StoreSummary, PipelineError> {
    let connection = open_existing_store(&config.store_path)?;
    Ok(inspect_store(&connection, &config.schema.view_name, limit)?)
}

/// Runs every stage in order. The first failure aborts the run.
pub fn run_all<S>(config: &PipelineConfig, source: &mut S) -> Result<RunSummary, PipelineError>
where
    S: TableSource + ?Sized,
{
    let load = extract_and_load(config, source)?;
    let kpis = compute_kpis(config)?;
    let charts = render_charts(config, &kpis)?;
    let report = build_report(config)?;

    Ok(RunSummary {
        load,
        kpis,
        charts,
        report,
    })
}
