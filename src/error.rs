//! The error type returned by the pipeline stages.

use std::path::PathBuf;

use thiserror::Error;

use crate::builder::PdfBuildError;
use crate::chart::ChartError;
use crate::config::ConfigError;
use crate::extract::ExtractError;
use crate::fonts::{self, FONTS_DIR_ENV};
use crate::kpi::KpiError;
use crate::load::LoadError;
use crate::logging::LoggingInitError;

/// Any failure that aborts a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration")]
    Config(#[from] ConfigError),
    #[error("failed to initialise logging")]
    Logging(#[from] LoggingInitError),
    #[error("extraction failed")]
    Extract(#[from] ExtractError),
    #[error("loading the store failed")]
    Load(#[from] LoadError),
    #[error("no store found at {path}; run the `extract` command first")]
    StoreMissing { path: PathBuf },
    #[error("KPI computation failed")]
    Kpi(#[from] KpiError),
    #[error("chart rendering failed")]
    Chart(#[from] ChartError),
    #[error("report generation failed")]
    Report(#[from] PdfBuildError),
}

impl PipelineError {
    /// A suggestion for the user when the failure has a known remedy.
    pub fn hint(&self) -> Option<String> {
        let font_error = match self {
            Self::Report(PdfBuildError::FontLoad(err)) | Self::Chart(ChartError::Font(err)) => err,
            _ => return None,
        };
        fonts::fonts_missing(font_error).then(|| {
            format!("copy the Roboto TTF files into assets/fonts or set {FONTS_DIR_ENV}")
        })
    }
}
