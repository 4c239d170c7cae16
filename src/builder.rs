//! Document construction: page setup and rendering of the content model with `genpdf`.

use std::cell::Cell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use genpdf::elements::{Break, PageBreak, Paragraph};
use genpdf::error::{Error, ErrorKind};
use genpdf::style::{Style, StyledString};
use genpdf::{self, Alignment, Element, Margins, Mm, PageDecorator, Position, Size};
use log::{debug, info};
use thiserror::Error;

use crate::elements::CaptionedImage;
use crate::fonts;
use crate::model::{Block, Cover, HorizontalAlignment, ImageBlock, ImageSource, RichParagraph, Section};
use crate::richtext::ParseError;

const TITLE_FONT_SIZE: u8 = 16;
const SECTION_FONT_SIZE: u8 = 12;
const HEADING_FONT_SIZE: u8 = 11;
const BODY_FONT_SIZE: u8 = 10;
const FOOTER_FONT_SIZE: u8 = 8;

type FooterFactory = dyn Fn(usize) -> Box<dyn Element>;

/// Builder for `genpdf::Document` instances with page setup applied.
#[derive(Default)]
pub struct DocumentBuilder {
    paper_size: Option<Size>,
    margins: Option<Margins>,
    footer: Option<FooterSpec>,
    fonts_dir: Option<PathBuf>,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the paper size used for newly created documents.
    pub fn with_paper_size(mut self, paper_size: impl Into<Size>) -> Self {
        self.paper_size = Some(paper_size.into());
        self
    }

    /// Sets the margins applied through the page decorator.
    pub fn with_margins(mut self, margins: impl Into<Margins>) -> Self {
        self.margins = Some(margins.into());
        self
    }

    /// Configures a footer callback with a fixed height that is invoked for every page.
    pub fn with_footer<F, E>(mut self, height: impl Into<Mm>, footer: F) -> Self
    where
        F: Fn(usize) -> E + 'static,
        E: Element + 'static,
    {
        self.footer = Some(FooterSpec::new(height, footer));
        self
    }

    /// Looks for fonts in `fonts_dir` before the default locations.
    pub fn with_fonts_dir(mut self, fonts_dir: Option<PathBuf>) -> Self {
        self.fonts_dir = fonts_dir;
        self
    }

    /// Builds a `genpdf::Document` with the resolved font family installed.
    pub fn build(self) -> Result<genpdf::Document, Error> {
        let resolved = fonts::resolve_fonts(self.fonts_dir.as_deref())?;
        let mut document = genpdf::Document::new(resolved.load_family()?);

        if let Some(paper_size) = self.paper_size {
            document.set_paper_size(paper_size);
        }
        document.set_font_size(BODY_FONT_SIZE);

        let decorator = ConfiguredPageDecorator::new(self.margins, self.footer);
        document.set_page_decorator(decorator);

        Ok(document)
    }
}

/// Definition of a footer rendered through the page decorator.
pub struct FooterSpec {
    height: Mm,
    factory: Box<FooterFactory>,
}

impl FooterSpec {
    pub fn new<F, E>(height: impl Into<Mm>, factory: F) -> Self
    where
        F: Fn(usize) -> E + 'static,
        E: Element + 'static,
    {
        Self {
            height: height.into(),
            factory: Box::new(move |page| Box::new(factory(page)) as Box<dyn Element>),
        }
    }
}

struct ConfiguredPageDecorator {
    page: usize,
    margins: Option<Margins>,
    footer: Option<FooterSpec>,
}

impl ConfiguredPageDecorator {
    fn new(margins: Option<Margins>, footer: Option<FooterSpec>) -> Self {
        Self {
            page: 0,
            margins,
            footer,
        }
    }
}

impl PageDecorator for ConfiguredPageDecorator {
    fn decorate_page<'a>(
        &mut self,
        context: &genpdf::Context,
        mut area: genpdf::render::Area<'a>,
        style: Style,
    ) -> Result<genpdf::render::Area<'a>, Error> {
        self.page += 1;

        if let Some(margins) = self.margins {
            area.add_margins(margins);
        }

        if let Some(footer) = &self.footer {
            let available = area.size().height;
            if footer.height > available {
                return Err(Error::new(
                    "Footer height exceeds available space",
                    ErrorKind::InvalidData,
                ));
            }

            let mut footer_area = area.clone();
            footer_area.add_offset(Position::new(0, available - footer.height));
            let mut element = (footer.factory)(self.page);
            let result = element.render(context, footer_area, style)?;
            if result.has_more {
                return Err(Error::new(
                    "Footer element does not fit into the reserved space",
                    ErrorKind::PageSizeExceeded,
                ));
            }

            area.set_height(available - footer.height);
        }

        Ok(area)
    }
}

/// Errors raised while rendering the report.
#[derive(Debug, Error)]
pub enum PdfBuildError {
    #[error("failed to load fonts for the report")]
    FontLoad(#[source] Error),
    #[error("failed to embed image {path}")]
    Image {
        path: String,
        #[source]
        source: Error,
    },
    #[error("failed to render the PDF document")]
    Render(#[source] Error),
    #[error("invalid report text")]
    Markup(#[from] ParseError),
    #[error("failed to write {path}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Rendered document bytes.
#[derive(Clone, Debug)]
pub struct RenderedPdf {
    pub bytes: Vec<u8>,
    pub pages: usize,
}

/// Renders a [`Cover`] and a list of [`Section`]s into an A4 PDF with numbered pages.
#[derive(Clone, Debug, Default)]
pub struct PdfBuilder {
    title: Option<String>,
    cover: Option<Cover>,
    sections: Vec<Section>,
    fonts_dir: Option<PathBuf>,
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the document title stored in the PDF metadata.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_cover(mut self, cover: Cover) -> Self {
        self.cover = Some(cover);
        self
    }

    pub fn add_section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    pub fn with_fonts_dir(mut self, fonts_dir: Option<PathBuf>) -> Self {
        self.fonts_dir = fonts_dir;
        self
    }

    /// Lays out the content and renders it into memory.
    pub fn render(self) -> Result<RenderedPdf, PdfBuildError> {
        let last_page = Rc::new(Cell::new(0));
        let footer_pages = Rc::clone(&last_page);
        let mut document = DocumentBuilder::new()
            .with_paper_size(genpdf::PaperSize::A4)
            .with_margins(Margins::trbl(20, 20, 12, 20))
            .with_footer(8, move |page| {
                footer_pages.set(page);
                page_footer(page)
            })
            .with_fonts_dir(self.fonts_dir.clone())
            .build()
            .map_err(PdfBuildError::FontLoad)?;

        let title = self
            .title
            .clone()
            .or_else(|| self.cover.as_ref().map(|cover| cover.title().to_string()))
            .unwrap_or_default();
        document.set_title(title);

        if let Some(cover) = &self.cover {
            push_cover(&mut document, cover);
        }
        for section in &self.sections {
            push_section(&mut document, section)?;
        }

        let mut bytes = Vec::new();
        document
            .render(&mut bytes)
            .map_err(PdfBuildError::Render)?;
        let pages = last_page.get();
        debug!("Rendered {} bytes across {} pages", bytes.len(), pages);

        Ok(RenderedPdf { bytes, pages })
    }

    /// Renders and writes the document to `path`, replacing any existing file.
    pub fn write_to(self, path: impl AsRef<Path>) -> Result<RenderedPdf, PdfBuildError> {
        let path = path.as_ref();
        let rendered = self.render()?;

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| PdfBuildError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        fs::write(path, &rendered.bytes).map_err(|source| PdfBuildError::Io {
            path: path.display().to_string(),
            source,
        })?;

        info!(
            "Wrote {} ({} pages, {} bytes)",
            path.display(),
            rendered.pages,
            rendered.bytes.len()
        );
        Ok(rendered)
    }
}

fn page_footer(page: usize) -> impl Element {
    Paragraph::new(StyledString::new(
        format!("Page {page}"),
        Style::new().with_font_size(FOOTER_FONT_SIZE),
    ))
    .aligned(Alignment::Center)
}

fn alignment(alignment: HorizontalAlignment) -> Alignment {
    match alignment {
        HorizontalAlignment::Left => Alignment::Left,
        HorizontalAlignment::Center => Alignment::Center,
        HorizontalAlignment::Right => Alignment::Right,
    }
}

fn styled_line(text: &str, style: Style) -> Paragraph {
    Paragraph::new(StyledString::new(text.to_string(), style))
}

fn rich_paragraph(paragraph: &RichParagraph) -> Paragraph {
    let mut element = Paragraph::default();
    for span in paragraph.spans() {
        element.push(span.to_styled_string());
    }
    element.aligned(alignment(paragraph.alignment()))
}

fn push_cover(document: &mut genpdf::Document, cover: &Cover) {
    document.push(styled_line(
        cover.title(),
        Style::new().bold().with_font_size(TITLE_FONT_SIZE),
    ));
    document.push(Break::new(0.5));
    for line in cover.subtitle().into_iter().chain(cover.byline()) {
        for text in line.lines() {
            document.push(styled_line(text, Style::new()));
        }
    }
    document.push(Break::new(1.0));
}

fn push_section(document: &mut genpdf::Document, section: &Section) -> Result<(), PdfBuildError> {
    let (leading_breaks, rest) = match section.blocks() {
        [Block::PageBreak, rest @ ..] => (true, rest),
        blocks => (false, blocks),
    };
    if leading_breaks {
        document.push(PageBreak::new());
    }

    document.push(
        styled_line(
            section.title(),
            Style::new().bold().with_font_size(SECTION_FONT_SIZE),
        )
        .padded(Margins::trbl(4, 0, 2, 0)),
    );
    for block in rest {
        push_block(document, block)?;
    }
    Ok(())
}

fn push_block(document: &mut genpdf::Document, block: &Block) -> Result<(), PdfBuildError> {
    match block {
        Block::Heading(text) => document.push(
            styled_line(text, Style::new().bold().with_font_size(HEADING_FONT_SIZE))
                .padded(Margins::trbl(3, 0, 1, 0)),
        ),
        Block::Paragraph(paragraph) => {
            document.push(rich_paragraph(paragraph).padded(Margins::trbl(0, 0, 2, 0)))
        }
        Block::Image(image) => document.push(captioned_image(image)?.padded(Margins::trbl(
            2, 0, 4, 0,
        ))),
        Block::PageBreak => document.push(PageBreak::new()),
    }
    Ok(())
}

fn captioned_image(block: &ImageBlock) -> Result<CaptionedImage, PdfBuildError> {
    let caption = block.caption().map(rich_paragraph);
    let ImageSource::Path(path) = block.source();
    let element =
        CaptionedImage::from_path(path, caption).map_err(|source| PdfBuildError::Image {
            path: path.display().to_string(),
            source,
        })?;
    let (max_width, max_height) = block.max_size_mm();
    Ok(element
        .with_alignment(alignment(block.alignment()))
        .with_max_size(max_width, max_height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_maps_one_to_one() {
        assert!(matches!(alignment(HorizontalAlignment::Center), Alignment::Center));
        assert!(matches!(alignment(HorizontalAlignment::Right), Alignment::Right));
    }
}
