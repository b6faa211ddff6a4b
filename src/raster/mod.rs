//! Glyph rasterization shared by the canonicalizer and the reference index.
//!
//! Both sides of a comparison must be rendered identically or structural
//! similarity is meaningless. The single rule lives here: a glyph outline is
//! filled black on white, anti-aliased, with the outline's bounding-box
//! center pinned to the center of the face's em box
//! (`units_per_em` wide, `ascent - descent` tall), uniformly scaled to fit a
//! square raster.

pub mod path_data;

pub use path_data::{parse_path_data, PathDataError};

use image::imageops::FilterType;
use image::GrayImage;
use tiny_skia::{Color, FillRule, Paint, Path, Pixmap, Transform};

/// Vertical metrics of the face a glyph outline was expressed in.
///
/// The Stage-1 renderer reports these per font family; reference faces
/// report them from their `head`/`hhea` tables. Descent is negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontMetrics {
    /// Font units per em
    pub units_per_em: f32,
    /// Ascender in font units
    pub ascent: f32,
    /// Descender in font units (negative below the baseline)
    pub descent: f32,
}

impl FontMetrics {
    /// Create metrics.
    pub fn new(units_per_em: f32, ascent: f32, descent: f32) -> Self {
        Self {
            units_per_em,
            ascent,
            descent,
        }
    }

    /// Total em-box height.
    pub fn em_height(&self) -> f32 {
        self.ascent - self.descent
    }
}

impl Default for FontMetrics {
    fn default() -> Self {
        // The Stage-1 renderer's defaults when a font family omits metrics.
        Self::new(1000.0, 800.0, -200.0)
    }
}

/// A square grayscale raster of a rendered glyph. 0 is ink, 255 is paper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    img: GrayImage,
}

impl Raster {
    /// Wrap an existing grayscale image. Must be square.
    pub fn from_gray(img: GrayImage) -> Self {
        debug_assert_eq!(img.width(), img.height());
        Self { img }
    }

    /// Build a raster from raw luma bytes in row-major order.
    ///
    /// Returns `None` when the byte count does not match `size * size`.
    pub fn from_raw(size: u32, data: Vec<u8>) -> Option<Self> {
        GrayImage::from_raw(size, size, data).map(|img| Self { img })
    }

    /// Edge length in pixels.
    pub fn size(&self) -> u32 {
        self.img.width()
    }

    /// Raw luma bytes, row-major.
    pub fn data(&self) -> &[u8] {
        self.img.as_raw()
    }

    /// Luma value at a pixel.
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.img.get_pixel(x, y).0[0]
    }

    /// Resample to another square size with Lanczos3 (the resampling the
    /// upstream pipeline was tuned against).
    pub fn resized(&self, size: u32) -> Raster {
        if size == self.size() {
            return self.clone();
        }
        Raster {
            img: image::imageops::resize(&self.img, size, size, FilterType::Lanczos3),
        }
    }

    /// Fraction of pixels that are more ink than paper.
    pub fn ink_ratio(&self) -> f32 {
        let dark = self.data().iter().filter(|&&v| v < 128).count();
        dark as f32 / (self.size() * self.size()) as f32
    }

    /// Access the underlying image (for the unresolved-shape report).
    pub fn as_image(&self) -> &GrayImage {
        &self.img
    }
}

/// Renders glyph outlines to comparable rasters.
#[derive(Debug, Clone, Copy)]
pub struct GlyphRasterizer {
    size: u32,
}

impl GlyphRasterizer {
    /// Create a rasterizer producing `size`×`size` rasters.
    pub fn new(size: u32) -> Self {
        Self { size }
    }

    /// Raster edge length this rasterizer produces.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Render a parsed outline path centered in the em box.
    ///
    /// Returns `None` for outlines with no drawable area (zero-width or
    /// zero-height bounds) and for rasters that cannot be allocated; the
    /// caller treats those as the empty shape.
    pub fn render(&self, path: &Path, metrics: &FontMetrics) -> Option<Raster> {
        let bounds = path.bounds();
        if bounds.width() <= 0.0 || bounds.height() <= 0.0 {
            return None;
        }

        let em_w = metrics.units_per_em.max(1.0);
        let em_h = metrics.em_height().max(1.0);

        // Viewbox: em box centered on the glyph's bbox center.
        let cx = (bounds.left() + bounds.right()) / 2.0;
        let cy = (bounds.top() + bounds.bottom()) / 2.0;
        let vx = cx - em_w / 2.0;
        let vy = cy - em_h / 2.0;

        let out = self.size as f32;
        let scale = (out / em_w).min(out / em_h);
        let tx = (out - em_w * scale) / 2.0 - vx * scale;
        let ty = (out - em_h * scale) / 2.0 - vy * scale;
        let transform = Transform::from_row(scale, 0.0, 0.0, scale, tx, ty);

        let mut pixmap = Pixmap::new(self.size, self.size)?;
        pixmap.fill(Color::WHITE);

        let mut paint = Paint::default();
        paint.set_color_rgba8(0, 0, 0, 255);
        paint.anti_alias = true;

        pixmap.fill_path(path, &paint, FillRule::Winding, transform, None);

        let mut luma = Vec::with_capacity((self.size * self.size) as usize);
        for px in pixmap.pixels() {
            luma.push(px.red());
        }
        Raster::from_raw(self.size, luma)
    }

    /// Parse and render outline path data in one step.
    ///
    /// Parse failures are shape errors, not pipeline errors: they are
    /// logged at debug level and reported as `None`.
    pub fn render_path_data(&self, data: &str, metrics: &FontMetrics) -> Option<Raster> {
        match parse_path_data(data) {
            Ok(path) => self.render(&path, metrics),
            Err(err) => {
                log::debug!("outline rejected: {}", err);
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_outline() -> String {
        // A 400-unit square in a 1000-unit em.
        "M 300 300 L 700 300 L 700 700 L 300 700 Z".to_string()
    }

    #[test]
    fn test_render_square_has_ink() {
        let rasterizer = GlyphRasterizer::new(64);
        let raster = rasterizer
            .render_path_data(&square_outline(), &FontMetrics::default())
            .unwrap();
        assert_eq!(raster.size(), 64);
        assert!(raster.ink_ratio() > 0.05);
        assert!(raster.ink_ratio() < 0.5);
    }

    #[test]
    fn test_render_is_deterministic() {
        let rasterizer = GlyphRasterizer::new(64);
        let metrics = FontMetrics::default();
        let a = rasterizer.render_path_data(&square_outline(), &metrics).unwrap();
        let b = rasterizer.render_path_data(&square_outline(), &metrics).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_render_centers_glyph() {
        // An off-center outline must land centered in the raster.
        let rasterizer = GlyphRasterizer::new(64);
        let raster = rasterizer
            .render_path_data("M 0 0 L 100 0 L 100 100 L 0 100 Z", &FontMetrics::default())
            .unwrap();
        // Center pixel is ink, corners are paper.
        assert!(raster.get(32, 32) < 128);
        assert_eq!(raster.get(0, 0), 255);
        assert_eq!(raster.get(63, 63), 255);
    }

    #[test]
    fn test_degenerate_outline_renders_none() {
        let rasterizer = GlyphRasterizer::new(64);
        let metrics = FontMetrics::default();
        // Zero-area path: a bare moveto/lineto along one axis.
        assert!(rasterizer.render_path_data("M 0 0 L 100 0", &metrics).is_none());
        assert!(rasterizer.render_path_data("", &metrics).is_none());
    }

    #[test]
    fn test_resized_roundtrip_size() {
        let rasterizer = GlyphRasterizer::new(128);
        let raster = rasterizer
            .render_path_data(&square_outline(), &FontMetrics::default())
            .unwrap();
        assert_eq!(raster.resized(256).size(), 256);
        assert_eq!(raster.resized(128).size(), 128);
    }
}
