use std::error::Error;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use log::{debug, info};
use olap_report::extract::MySqlSource;
use olap_report::inspect::DEFAULT_SAMPLE_ROWS;
use olap_report::logging::init_logging;
use olap_report::{pipeline, ConfigLoader, PipelineConfig, PipelineError};

/// Loads the dwpikp tables into DuckDB, computes the KPIs and writes the charts and PDF report.
///
/// Settings are read from `.env` files and `KPI_REPORT_*` environment variables; the flags
/// below override the paths for a single run.
#[derive(Parser)]
#[command(author, version, about = "MySQL to DuckDB KPI report pipeline")]
struct Cli {
    #[command(flatten)]
    paths: PathOverrides,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct PathOverrides {
    /// DuckDB store file.
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Directory the charts are written to and the report reads figures from.
    #[arg(long, global = true)]
    figures_dir: Option<PathBuf>,

    /// Output path of the PDF report.
    #[arg(long, global = true)]
    report: Option<PathBuf>,

    /// Directory holding the TTF font family.
    #[arg(long, global = true)]
    fonts_dir: Option<PathBuf>,
}

impl PathOverrides {
    fn apply(self, config: &mut PipelineConfig) {
        if let Some(store) = self.store {
            config.store_path = store;
        }
        if let Some(figures_dir) = self.figures_dir {
            config.figures_dir = figures_dir;
        }
        if let Some(report) = self.report {
            config.report_path = report;
        }
        if self.fonts_dir.is_some() {
            config.fonts_dir = self.fonts_dir;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run every stage: extract, load, view, KPIs, charts and report.
    #[command(name = "run", aliases = ["all"])]
    Run,

    /// Extract the tables from MySQL, load them into the store and build the view.
    #[command(name = "extract", aliases = ["load"])]
    Extract,

    /// Compute the KPIs from an existing store and redraw the charts.
    #[command(name = "kpis")]
    Kpis,

    /// Write the PDF report from the figures directory.
    #[command(name = "report")]
    Report,

    /// List the store's tables and print the first rows of the view.
    #[command(name = "inspect")]
    Inspect {
        /// Number of view rows to print.
        #[arg(long, default_value_t = DEFAULT_SAMPLE_ROWS)]
        limit: usize,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        eprintln!("Error: {}", err);
        print_error_sources(&err);
        if let Some(hint) = err.hint() {
            eprintln!("  hint: {}", hint);
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), PipelineError> {
    let mut config = ConfigLoader::new().load()?;
    cli.paths.apply(&mut config);
    init_logging(&config.log_level)?;
    if let Ok(json) = config.redacted_json() {
        debug!("Configuration: {}", json);
    }

    match cli.command {
        Commands::Run => {
            let mut source = MySqlSource::connect(&config.source)?;
            let summary = pipeline::run_all(&config, &mut source);
            source.close()?;
            let summary = summary?;
            println!("{}", summary.kpis);
            info!(
                "Done: {} rows in view, {} charts, report at {} ({} pages)",
                summary.load.view_rows,
                summary.charts.len(),
                config.report_path.display(),
                summary.report.pages
            );
        }
        Commands::Extract => {
            let mut source = MySqlSource::connect(&config.source)?;
            let summary = pipeline::extract_and_load(&config, &mut source);
            source.close()?;
            let summary = summary?;
            for (table, rows) in &summary.tables {
                println!("{table}: {rows} rows");
            }
            println!("{}: {} rows", config.schema.view_name, summary.view_rows);
        }
        Commands::Kpis => {
            let kpis = pipeline::compute_kpis(&config)?;
            println!("{}", kpis);
            pipeline::render_charts(&config, &kpis)?;
        }
        Commands::Report => {
            pipeline::build_report(&config)?;
        }
        Commands::Inspect { limit } => {
            print!("{}", pipeline::inspect(&config, limit)?);
        }
    }

    Ok(())
}

fn print_error_sources(mut error: &(dyn Error + 'static)) {
    while let Some(source) = error.source() {
        eprintln!("  caused by: {}", source);
        error = source;
    }
}
