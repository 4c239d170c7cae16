//! Report elements built on top of `genpdf` primitives.

use std::path::Path;

use image::GenericImageView;

use genpdf::elements::{Image, Paragraph};
use genpdf::error::{Context as _, Error};
use genpdf::style::Style;
use genpdf::{render, Alignment, Element, Mm, Position, RenderResult, Scale, Size};

const DEFAULT_IMAGE_DPI: f64 = 300.0;
const MM_PER_INCH: f64 = 25.4;
const DEFAULT_CAPTION_SPACING_MM: f64 = 2.0;

fn mm_from_f64(value: f64) -> Mm {
    Mm::from(printpdf::Mm(value))
}

fn mm_to_f64(value: Mm) -> f64 {
    let mm: printpdf::Mm = value.into();
    mm.0
}

/// Natural size of `image` in millimetres at the given resolution.
fn natural_size_mm(image: &image::DynamicImage, dpi: f64) -> (f64, f64) {
    let (px_width, px_height) = image.dimensions();
    (
        MM_PER_INCH * f64::from(px_width) / dpi,
        MM_PER_INCH * f64::from(px_height) / dpi,
    )
}

/// Scale factor that fits `natural` into the optional bounds without enlarging it.
pub fn fit_scale(natural: (f64, f64), max_width: Option<f64>, max_height: Option<f64>) -> f64 {
    let (width, height) = natural;
    let mut scale: f64 = 1.0;
    if let Some(max_width) = max_width.filter(|_| width > f64::EPSILON) {
        scale = scale.min(max_width / width);
    }
    if let Some(max_height) = max_height.filter(|_| height > f64::EPSILON) {
        scale = scale.min(max_height / height);
    }
    scale.max(0.0)
}

/// Decodes the image file at `path`, guessing the format from its contents.
pub fn decode_image_from_path(path: impl AsRef<Path>) -> Result<image::DynamicImage, Error> {
    let path = path.as_ref();
    let reader = image::io::Reader::open(path)
        .with_context(|| format!("Failed to open image file {}", path.display()))?;
    reader
        .with_guessed_format()
        .context("Unable to determine image format")?
        .decode()
        .with_context(|| format!("Failed to decode image file {}", path.display()))
}

/// An image fitted into a bounding box with a caption stacked underneath.
///
/// Images with an alpha channel are flattened onto white before embedding.
pub struct CaptionedImage {
    image: Image,
    caption: Option<Paragraph>,
    alignment: Alignment,
    natural_size: (f64, f64),
    max_width: Option<f64>,
    max_height: Option<f64>,
    spacing: Mm,
}

impl CaptionedImage {
    /// Creates a captioned image from a decoded image.
    pub fn from_dynamic_image(
        image: image::DynamicImage,
        caption: Option<Paragraph>,
    ) -> Result<Self, Error> {
        let image = flatten_alpha(image);
        let natural_size = natural_size_mm(&image, DEFAULT_IMAGE_DPI);
        let image = Image::from_dynamic_image(image)?;
        let mut element = Self {
            image,
            caption,
            alignment: Alignment::Left,
            natural_size,
            max_width: None,
            max_height: None,
            spacing: mm_from_f64(DEFAULT_CAPTION_SPACING_MM),
        };
        element.apply_alignment();
        Ok(element)
    }

    /// Creates a captioned image from the file at `path`.
    pub fn from_path(path: impl AsRef<Path>, caption: Option<Paragraph>) -> Result<Self, Error> {
        Self::from_dynamic_image(decode_image_from_path(path)?, caption)
    }

    /// Sets the alignment of both the image and the caption and returns the updated element.
    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self.apply_alignment();
        self
    }

    /// Constrains the rendered size in millimetres, preserving the aspect ratio.
    pub fn with_max_size(mut self, max_width: Option<f64>, max_height: Option<f64>) -> Self {
        self.max_width = max_width;
        self.max_height = max_height;
        self
    }

    /// Rendered size of the image in millimetres after fitting.
    pub fn fitted_size_mm(&self) -> (f64, f64) {
        let scale = fit_scale(self.natural_size, self.max_width, self.max_height);
        (self.natural_size.0 * scale, self.natural_size.1 * scale)
    }

    fn apply_alignment(&mut self) {
        self.image.set_alignment(self.alignment);
        if let Some(caption) = &mut self.caption {
            caption.set_alignment(self.alignment);
        }
    }

    fn apply_scale(&mut self, available_width: f64) {
        let max_width = Some(match self.max_width {
            Some(max_width) => max_width.min(available_width),
            None => available_width,
        });
        let scale = fit_scale(self.natural_size, max_width, self.max_height);
        self.image.set_scale(Scale::new(scale, scale));
    }
}

fn blend_on_white(channel: u8, alpha: u8) -> u8 {
    let alpha = u32::from(alpha);
    ((u32::from(channel) * alpha + 255 * (255 - alpha)) / 255) as u8
}

fn flatten_alpha(image: image::DynamicImage) -> image::DynamicImage {
    match image {
        image::DynamicImage::ImageRgba8(rgba) => {
            let (width, height) = rgba.dimensions();
            let mut rgb = image::RgbImage::new(width, height);
            for (x, y, pixel) in rgba.enumerate_pixels() {
                let [r, g, b, a] = pixel.0;
                rgb.put_pixel(
                    x,
                    y,
                    image::Rgb([
                        blend_on_white(r, a),
                        blend_on_white(g, a),
                        blend_on_white(b, a),
                    ]),
                );
            }
            image::DynamicImage::ImageRgb8(rgb)
        }
        image::DynamicImage::ImageLumaA8(luma_alpha) => {
            let (width, height) = luma_alpha.dimensions();
            let mut luma = image::GrayImage::new(width, height);
            for (x, y, pixel) in luma_alpha.enumerate_pixels() {
                let [l, a] = pixel.0;
                luma.put_pixel(x, y, image::Luma([blend_on_white(l, a)]));
            }
            image::DynamicImage::ImageLuma8(luma)
        }
        other => other,
    }
}

impl Element for CaptionedImage {
    fn render(
        &mut self,
        context: &genpdf::Context,
        mut area: render::Area<'_>,
        style: Style,
    ) -> Result<RenderResult, Error> {
        self.apply_alignment();
        self.apply_scale(mm_to_f64(area.size().width));

        let mut result = RenderResult::default();
        let image_result = self.image.render(context, area.clone(), style)?;
        result.size = result.size.stack_vertical(image_result.size);
        result.has_more |= image_result.has_more;
        if image_result.has_more {
            return Ok(result);
        }

        let Some(caption) = &mut self.caption else {
            return Ok(result);
        };

        area.add_offset(Position::new(0, image_result.size.height + self.spacing));
        result.size = result.size.stack_vertical(Size::new(0, self.spacing));

        let caption_result = caption.render(context, area, style)?;
        result.size = result.size.stack_vertical(caption_result.size);
        result.has_more |= caption_result.has_more;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_scale_respects_the_tighter_bound() {
        let scale = fit_scale((200.0, 100.0), Some(170.0), Some(60.0));
        assert!((scale - 0.6).abs() < 1e-9);

        let scale = fit_scale((200.0, 50.0), Some(170.0), Some(80.0));
        assert!((scale - 0.85).abs() < 1e-9);
    }

    #[test]
    fn fit_scale_never_enlarges() {
        assert_eq!(fit_scale((10.0, 10.0), Some(170.0), Some(80.0)), 1.0);
        assert_eq!(fit_scale((10.0, 10.0), None, None), 1.0);
    }

    #[test]
    fn fitted_size_keeps_aspect_ratio() {
        let image = image::DynamicImage::ImageRgb8(image::RgbImage::new(1200, 600));
        let element = CaptionedImage::from_dynamic_image(image, None)
            .expect("image converts")
            .with_max_size(Some(170.0), Some(60.0));
        let (width, height) = element.fitted_size_mm();
        assert!((height - 50.8).abs() < 1e-6);
        assert!((width / height - 2.0).abs() < 1e-9);
    }

    #[test]
    fn transparent_pixels_flatten_to_white() {
        let mut rgba = image::RgbaImage::new(1, 1);
        rgba.put_pixel(0, 0, image::Rgba([0, 0, 0, 0]));
        let flattened = flatten_alpha(image::DynamicImage::ImageRgba8(rgba));
        let rgb = flattened.as_rgb8().expect("flattened to rgb");
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 255, 255]);
    }
}
