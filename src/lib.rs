//! One-shot OLAP pipeline: MySQL tables into an embedded DuckDB star schema, three KPIs with
//! PNG charts, and a PDF report that embeds them.

pub mod builder;
pub mod chart;
pub mod config;
pub mod elements;
pub mod error;
pub mod extract;
pub mod fonts;
pub mod frame;
pub mod inspect;
pub mod kpi;
pub mod load;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod richtext;
pub mod view;

pub use config::{ConfigLoader, PipelineConfig};
pub use error::PipelineError;
