//! The project report: fixed text with the KPI charts and store screenshots embedded.
//!
//! Figures are looked up in the figures directory when the report is assembled.  A missing file
//! is replaced by an italic `[<file> not found]` line and a warning; everything else about the
//! layout is fixed.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::builder::{PdfBuildError, PdfBuilder, RenderedPdf};
use crate::chart::{KPI1_CHART, KPI2_CHART, KPI3_CHART};
use crate::config::PipelineConfig;
use crate::model::{
    Block, Cover, HorizontalAlignment, ImageBlock, ImageSource, RichParagraph, Section,
};
use crate::richtext::{parse_markup, Span};

pub const SCHEMA_FIGURE: &str = "duckdb_schema.png";
pub const SAMPLE_ROWS_FIGURE: &str = "sample_query_results.png";

const TITLE: &str = "DuckDB-Based OLAP Cube & KPI Visualization";
const SUBTITLE: &str = "Raziskovanje digitalnega nakupovalnega vedenja potrošnikov";
const BYLINE: &str = "Ekipa 6 (Emilija Mitrovic, Vanja Pajovic, Bogdan Kascelan)";

const SCREENSHOT_MAX_HEIGHT_MM: f64 = 80.0;
const CHART_MAX_HEIGHT_MM: f64 = 60.0;

/// An image placed in the report.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Figure {
    pub file: &'static str,
    pub caption: &'static str,
    pub max_height_mm: f64,
}

/// Figures in the order they appear.
pub const FIGURES: [Figure; 5] = [
    Figure {
        file: SCHEMA_FIGURE,
        caption: "Figure 1: Output of SHOW TABLES in DuckDB, listing all dimension and fact tables plus the reporting view.",
        max_height_mm: SCREENSHOT_MAX_HEIGHT_MM,
    },
    Figure {
        file: SAMPLE_ROWS_FIGURE,
        caption: "Figure 2: Sample rows from the joined reporting view, showing dimension attributes and fact measures.",
        max_height_mm: SCREENSHOT_MAX_HEIGHT_MM,
    },
    Figure {
        file: KPI1_CHART,
        caption: "Figure 3: KPI 1, average spend per transaction by discount usage.",
        max_height_mm: CHART_MAX_HEIGHT_MM,
    },
    Figure {
        file: KPI2_CHART,
        caption: "Figure 4: KPI 2, conversion rate over time (one line per year).",
        max_height_mm: CHART_MAX_HEIGHT_MM,
    },
    Figure {
        file: KPI3_CHART,
        caption: "Figure 5: KPI 3, customer share by education level.",
        max_height_mm: CHART_MAX_HEIGHT_MM,
    },
];

/// Locations the report reads figures from and names in its text.
#[derive(Clone, Copy, Debug)]
pub struct ReportPaths<'a> {
    pub figures_dir: &'a Path,
    pub store_path: &'a Path,
    pub report_path: &'a Path,
}

impl<'a> From<&'a PipelineConfig> for ReportPaths<'a> {
    fn from(config: &'a PipelineConfig) -> Self {
        Self {
            figures_dir: &config.figures_dir,
            store_path: &config.store_path,
            report_path: &config.report_path,
        }
    }
}

/// Content of the report before rendering.
#[derive(Clone, Debug)]
pub struct ReportOutline {
    pub cover: Cover,
    pub sections: Vec<Section>,
    /// Figures that were not found and got a placeholder instead.
    pub missing_figures: Vec<PathBuf>,
}

impl ReportOutline {
    /// Hands the outline to a [`PdfBuilder`].
    pub fn into_builder(self, fonts_dir: Option<PathBuf>) -> PdfBuilder {
        self.sections.into_iter().fold(
            PdfBuilder::new()
                .with_title(TITLE)
                .with_cover(self.cover)
                .with_fonts_dir(fonts_dir),
            PdfBuilder::add_section,
        )
    }
}

fn text(markup: &str) -> Result<Block, PdfBuildError> {
    Ok(Block::paragraph(parse_markup(markup)?))
}

fn texts<'a>(lines: impl IntoIterator<Item = &'a str>) -> Result<Vec<Block>, PdfBuildError> {
    lines.into_iter().map(text).collect()
}

fn italic(line: String) -> RichParagraph {
    RichParagraph::new(vec![Span::new(line).italic()])
}

/// Path text safe to place inside `*...*` markup.
fn path_markup(path: &Path) -> String {
    path.display()
        .to_string()
        .replace('\\', r"\\")
        .replace('*', r"\*")
}

fn figure_block(figures_dir: &Path, figure: &Figure, missing: &mut Vec<PathBuf>) -> Block {
    let path = figures_dir.join(figure.file);
    if path.is_file() {
        Block::image(
            ImageBlock::new(ImageSource::Path(path))
                .with_caption(
                    italic(figure.caption.to_string()).with_alignment(HorizontalAlignment::Center),
                )
                .with_alignment(HorizontalAlignment::Center)
                .with_max_size_mm(None::<f64>, figure.max_height_mm),
        )
    } else {
        warn!("Figure {} not found; inserting a placeholder", path.display());
        missing.push(path);
        Block::Paragraph(italic(format!("[{} not found]", figure.file)))
    }
}

/// Assembles the report, resolving figures in `paths.figures_dir`.
///
/// `view` is the name of the reporting view mentioned in the text.
pub fn build_report(paths: ReportPaths<'_>, view: &str) -> Result<ReportOutline, PdfBuildError> {
    let figures_dir = paths.figures_dir;
    let store = path_markup(paths.store_path);
    let figures = path_markup(paths.figures_dir);
    let report = path_markup(paths.report_path);
    let mut missing = Vec::new();
    let [schema, sample, kpi1, kpi2, kpi3] = FIGURES;

    let cover = Cover::new(TITLE)
        .with_subtitle(SUBTITLE.to_string())
        .with_byline(BYLINE.to_string());

    let overview = Section::new("1. Overview").with_blocks(texts([
        format!(
            "This project ingests eight dimension and fact tables from a MySQL schema (**dwpikp**) \
             into DuckDB, builds a star schema view named **{view}**, computes three key KPIs and \
             visualizes them as PNG charts."
        )
        .as_str(),
        "The workflow is:",
        "  1. Read the MySQL tables into memory.",
        format!("  2. Store them in a DuckDB database file (*{store}*).").as_str(),
        format!(
            "  3. Create the view *{view}* joining the fact table to every dimension, including \
             the customer id used by KPI 3."
        )
        .as_str(),
        "  4. Compute KPI 1, KPI 2 and KPI 3 with their research question breakdowns.",
        format!(
            "  5. Export the charts under *{figures}*: average spend by discount usage, \
             conversion rate over time and customer share by education level."
        )
        .as_str(),
        "  6. Embed those images, plus the schema and sample-row screenshots, into this report.",
    ])?);

    let schema_section =
        Section::new("2. DuckDB Schema").with_block(figure_block(figures_dir, &schema, &mut missing));

    let sample_section = Section::new(format!("3. Sample Rows from {view}"))
        .with_block(figure_block(figures_dir, &sample, &mut missing));

    let kpi_section = Section::builder("4. KPI Definitions & Results")
        .start_on_new_page(true)
        .push_block(Block::heading("4.1 KPI 1"))
        .extend_blocks(texts([
            "**KPI 1:** Povprečna poraba na transakcijo (average spend per transaction)",
            "  - Formula: Skupni prihodki / Število transakcij",
            "  - Research Q1: Kako popusti vplivajo na povprečno porabo?",
            "  - Research Q2: Ali obstaja razlika med novimi in vračajočimi se kupci?",
        ])?)
        .push_block(figure_block(figures_dir, &kpi1, &mut missing))
        .push_block(Block::heading("4.2 KPI 2"))
        .extend_blocks(texts([
            "**KPI 2:** Stopnja konverzije (conversion rate)",
            r"  - Formula: (Število nakupov / Število obiskov) \* 100",
            "  - Research Q1: Kako popusti vplivajo na stopnjo konverzije?",
            "  - Research Q2: Kakšen je trend stopnje konverzije po letih in mesecih?",
        ])?)
        .push_block(figure_block(figures_dir, &kpi2, &mut missing))
        .push_block(Block::heading("4.3 KPI 3"))
        .extend_blocks(texts([
            "**KPI 3:** Delež e-trgovinskih kupcev glede na izobrazbo (customer share by education level)",
            r"  - Formula: (Število kupcev v tej skupini / Skupno število kupcev) \* 100",
            "  - Research Q1: Kako se odstotek kupcev razlikuje po izobrazbenih ravneh?",
            "  - Customers without a recorded education level are left out of the chart.",
        ])?)
        .push_block(figure_block(figures_dir, &kpi3, &mut missing))
        .build();

    let reproducibility = Section::new("5. Reproducibility Instructions").with_blocks(texts([
        "  1. Copy *.env.example* to *.env* and set the MySQL connection (KPI_REPORT_MYSQL_HOST, \
         KPI_REPORT_MYSQL_USER, KPI_REPORT_MYSQL_PASSWORD, KPI_REPORT_MYSQL_DATABASE).",
        "  2. Place the Roboto TTF files under *assets/fonts* or set KPI_REPORT_FONTS_DIR.",
        "  3. Run the whole pipeline: *olap-report run*. This will:",
        format!("       - create or overwrite *{store}*,").as_str(),
        format!("       - build the *{view}* view,").as_str(),
        "       - print all KPI results to the console,",
        format!("       - save the KPI charts under *{figures}*,").as_str(),
        format!("       - write this report to *{report}*.").as_str(),
        "  4. (Optional) Inspect the DuckDB tables and sample rows: *olap-report inspect*.",
        "  5. Rebuild only the report after replacing screenshots: *olap-report report*.",
    ])?);

    let dependencies = Section::new("6. Dependencies & Versions").with_blocks(texts([
        "  - duckdb 1.1 (bundled) for the embedded store",
        "  - sqlx 0.8 with the MySQL driver, on a tokio runtime",
        "  - plotters 0.3 for the KPI charts",
        "  - genpdf 0.2 and printpdf 0.3 for this document",
        "  - clap 4, dotenvy, tracing and thiserror for the command line, configuration, logging \
         and errors",
    ])?);

    let sections = vec![
        overview,
        schema_section,
        sample_section,
        kpi_section,
        reproducibility,
        dependencies,
    ];
    info!(
        "Assembled report with {} sections ({} figures missing)",
        sections.len(),
        missing.len()
    );

    Ok(ReportOutline {
        cover,
        sections,
        missing_figures: missing,
    })
}

/// Assembles the report and writes it to `paths.report_path`.
pub fn write_report(
    paths: ReportPaths<'_>,
    view: &str,
    fonts_dir: Option<PathBuf>,
) -> Result<RenderedPdf, PdfBuildError> {
    build_report(paths, view)?
        .into_builder(fonts_dir)
        .write_to(paths.report_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths_in(figures_dir: &Path) -> ReportPaths<'_> {
        ReportPaths {
            figures_dir,
            store_path: Path::new("duckdb_database/dwpikp.duckdb"),
            report_path: Path::new("documentation/README.pdf"),
        }
    }

    fn section_text(section: &Section) -> String {
        section
            .blocks()
            .iter()
            .filter_map(|block| match block {
                Block::Paragraph(paragraph) => Some(paragraph.plain_text()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn placeholders(outline: &ReportOutline) -> Vec<String> {
        outline
            .sections
            .iter()
            .flat_map(Section::blocks)
            .filter_map(|block| match block {
                Block::Paragraph(paragraph) if paragraph.plain_text().ends_with("not found]") => {
                    Some(paragraph.plain_text())
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn every_missing_figure_gets_a_placeholder() {
        let dir = tempfile::tempdir().expect("tempdir");
        let outline = build_report(paths_in(dir.path()), "fact_with_dim").expect("report text parses");

        assert_eq!(outline.sections.len(), 6);
        assert_eq!(outline.missing_figures.len(), FIGURES.len());
        assert_eq!(
            placeholders(&outline),
            FIGURES
                .iter()
                .map(|figure| format!("[{} not found]", figure.file))
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn present_figures_are_embedded_with_captions() {
        let dir = tempfile::tempdir().expect("tempdir");
        image::RgbImage::new(4, 2)
            .save(dir.path().join(KPI1_CHART))
            .expect("write png");

        let outline = build_report(paths_in(dir.path()), "fact_with_dim").expect("report text parses");
        assert_eq!(outline.missing_figures.len(), FIGURES.len() - 1);

        let image = outline
            .sections
            .iter()
            .flat_map(Section::blocks)
            .find_map(|block| match block {
                Block::Image(image) => Some(image),
                _ => None,
            })
            .expect("image block present");
        assert_eq!(image.source(), &ImageSource::Path(dir.path().join(KPI1_CHART)));
        assert_eq!(image.max_size_mm(), (None, Some(CHART_MAX_HEIGHT_MM)));
        let caption = image.caption().expect("caption");
        assert!(caption.spans()[0].is_italic());
        assert!(caption.plain_text().starts_with("Figure 3"));
    }

    #[test]
    fn kpi_section_starts_on_a_new_page() {
        let dir = tempfile::tempdir().expect("tempdir");
        let outline = build_report(paths_in(dir.path()), "fact_with_dim").expect("report text parses");
        let kpis = &outline.sections[3];
        assert_eq!(kpis.title(), "4. KPI Definitions & Results");
        assert!(matches!(kpis.blocks().first(), Some(Block::PageBreak)));
    }

    #[test]
    fn text_names_the_configured_locations() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = ReportPaths {
            figures_dir: dir.path(),
            store_path: Path::new("out/sales*.duckdb"),
            report_path: Path::new("out/kpi-report.pdf"),
        };
        let outline = build_report(paths, "fact_with_dim").expect("report text parses");

        let overview = section_text(&outline.sections[0]);
        assert!(overview.contains("out/sales*.duckdb"));
        assert!(overview.contains(&dir.path().display().to_string()));

        let steps = section_text(&outline.sections[4]);
        assert!(steps.contains("out/sales*.duckdb"));
        assert!(steps.contains("out/kpi-report.pdf"));
        assert!(!steps.contains("documentation/README.pdf"));
        assert!(!steps.contains("documentation/screenshots"));
    }
}
