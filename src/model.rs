//! Content model of the PDF report.
//!
//! The report is described as a [`Cover`] followed by [`Section`]s of [`Block`]s.  The model
//! does not reference `genpdf`, so it can be assembled and inspected without fonts; the
//! [`crate::builder::PdfBuilder`] turns it into elements when rendering.

use std::path::PathBuf;

use crate::richtext::Span;

/// Horizontal alignment of text and images, mapped onto [`genpdf::Alignment`] when rendered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HorizontalAlignment {
    #[default]
    Left,
    Center,
    Right,
}

/// A paragraph of styled spans.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RichParagraph {
    spans: Vec<Span>,
    alignment: HorizontalAlignment,
}

impl RichParagraph {
    /// Creates a left-aligned paragraph from the provided spans.
    pub fn new(spans: impl Into<Vec<Span>>) -> Self {
        Self {
            spans: spans.into(),
            ..Self::default()
        }
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn alignment(&self) -> HorizontalAlignment {
        self.alignment
    }

    /// Sets the alignment and returns the updated paragraph.
    pub fn with_alignment(mut self, alignment: HorizontalAlignment) -> Self {
        self.alignment = alignment;
        self
    }

    /// Concatenated text of all spans, without styling.
    pub fn plain_text(&self) -> String {
        self.spans.iter().map(Span::text).collect()
    }
}

/// Where an image's pixels come from.
#[derive(Clone, Debug, PartialEq)]
pub enum ImageSource {
    /// An image file on disk.
    Path(PathBuf),
}

/// An image scaled to fit a bounding box, with an optional caption underneath.
///
/// The box is given in millimetres; the image keeps its aspect ratio and is never enlarged
/// beyond its natural size at the default resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageBlock {
    source: ImageSource,
    caption: Option<RichParagraph>,
    alignment: HorizontalAlignment,
    max_width_mm: Option<f64>,
    max_height_mm: Option<f64>,
}

impl ImageBlock {
    pub fn new(source: ImageSource) -> Self {
        Self {
            source,
            caption: None,
            alignment: HorizontalAlignment::Left,
            max_width_mm: None,
            max_height_mm: None,
        }
    }

    pub fn source(&self) -> &ImageSource {
        &self.source
    }

    pub fn caption(&self) -> Option<&RichParagraph> {
        self.caption.as_ref()
    }

    pub fn alignment(&self) -> HorizontalAlignment {
        self.alignment
    }

    /// Returns the bounding box as `(max_width_mm, max_height_mm)`.
    pub fn max_size_mm(&self) -> (Option<f64>, Option<f64>) {
        (self.max_width_mm, self.max_height_mm)
    }

    /// Sets the caption and returns the updated image block.
    pub fn with_caption(mut self, caption: impl Into<Option<RichParagraph>>) -> Self {
        self.caption = caption.into();
        self
    }

    /// Sets the alignment and returns the updated image block.
    pub fn with_alignment(mut self, alignment: HorizontalAlignment) -> Self {
        self.alignment = alignment;
        self
    }

    /// Constrains the rendered size (in millimetres) and returns the updated block.
    pub fn with_max_size_mm(
        mut self,
        max_width_mm: impl Into<Option<f64>>,
        max_height_mm: impl Into<Option<f64>>,
    ) -> Self {
        self.max_width_mm = max_width_mm.into();
        self.max_height_mm = max_height_mm.into();
        self
    }
}

/// Individual content blocks that make up sections and the cover.
#[derive(Clone, Debug, PartialEq)]
pub enum Block {
    /// A sub-heading inside a section.
    Heading(String),
    Paragraph(RichParagraph),
    Image(ImageBlock),
    PageBreak,
}

impl Block {
    pub fn heading(text: impl Into<String>) -> Self {
        Self::Heading(text.into())
    }

    pub fn paragraph(spans: impl Into<Vec<Span>>) -> Self {
        Self::Paragraph(RichParagraph::new(spans))
    }

    pub fn image(block: ImageBlock) -> Self {
        Self::Image(block)
    }
}

/// Title block at the top of the first page.
#[derive(Clone, Debug, PartialEq)]
pub struct Cover {
    title: String,
    subtitle: Option<String>,
    byline: Option<String>,
}

impl Cover {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            subtitle: None,
            byline: None,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn subtitle(&self) -> Option<&str> {
        self.subtitle.as_deref()
    }

    /// Authors or team line printed under the subtitle.
    pub fn byline(&self) -> Option<&str> {
        self.byline.as_deref()
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<Option<String>>) -> Self {
        self.subtitle = subtitle.into();
        self
    }

    pub fn with_byline(mut self, byline: impl Into<Option<String>>) -> Self {
        self.byline = byline.into();
        self
    }
}

/// A numbered report section.
#[derive(Clone, Debug, PartialEq)]
pub struct Section {
    title: String,
    blocks: Vec<Block>,
}

impl Section {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            blocks: Vec::new(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Appends a block and returns the updated section.
    pub fn with_block(mut self, block: Block) -> Self {
        self.blocks.push(block);
        self
    }

    /// Extends the section with additional blocks and returns the updated instance.
    pub fn with_blocks<I>(mut self, blocks: I) -> Self
    where
        I: IntoIterator<Item = Block>,
    {
        self.blocks.extend(blocks);
        self
    }

    /// Creates a builder that can start the section on a fresh page.
    pub fn builder(title: impl Into<String>) -> SectionBuilder {
        SectionBuilder::new(title)
    }
}

/// Builder for [`Section`] values.
#[derive(Clone, Debug, Default)]
pub struct SectionBuilder {
    title: String,
    blocks: Vec<Block>,
    start_on_new_page: bool,
}

impl SectionBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Marks the section to start on a new page.
    pub fn start_on_new_page(mut self, start_on_new_page: bool) -> Self {
        self.start_on_new_page = start_on_new_page;
        self
    }

    pub fn push_block(mut self, block: Block) -> Self {
        self.blocks.push(block);
        self
    }

    pub fn extend_blocks<I>(mut self, blocks: I) -> Self
    where
        I: IntoIterator<Item = Block>,
    {
        self.blocks.extend(blocks);
        self
    }

    /// Builds the section, injecting a leading page break when requested.
    pub fn build(mut self) -> Section {
        if self.start_on_new_page && !matches!(self.blocks.first(), Some(Block::PageBreak)) {
            self.blocks.insert(0, Block::PageBreak);
        }

        Section {
            title: self.title,
            blocks: self.blocks,
        }
    }
}
