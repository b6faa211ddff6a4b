//! Reference glyph index: pre-rendered rasters of a known typeface.
//!
//! The index is built once at startup and is read-only afterwards. For
//! every configured (character, style) pair it renders the reference
//! outline at each resolution tier of the matcher's ladder: repeated
//! per-comparison rendering is the dominant cost of the search, so it is
//! paid once per run to make the progressive search affordable.
//!
//! Missing typeface files and styles with no renderable characters are
//! configuration errors at startup, never per-glyph failures.

use crate::config::{DecoderConfig, ReferenceFaceConfig};
use crate::error::{Error, Result};
use crate::raster::{FontMetrics, GlyphRasterizer, Raster};
use serde::{Deserialize, Serialize};
use std::fmt;
use tiny_skia::{Path, PathBuilder};
use ttf_parser::Face;

/// Font style of a reference face or a style hint.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum FontStyle {
    /// Regular weight, upright
    #[default]
    Regular,
    /// Bold weight, upright
    Bold,
    /// Regular weight, slanted
    Italic,
    /// Bold weight, slanted
    BoldItalic,
}

impl FontStyle {
    /// Derive a style from the Stage-1 renderer's numeric weight and
    /// italic flag (weight 700 and above is bold).
    pub fn from_hints(weight: u16, italic: bool) -> Self {
        match (weight >= 700, italic) {
            (false, false) => FontStyle::Regular,
            (true, false) => FontStyle::Bold,
            (false, true) => FontStyle::Italic,
            (true, true) => FontStyle::BoldItalic,
        }
    }

    /// The upright style this slanted style leans on, if any.
    fn upright_base(&self) -> Option<FontStyle> {
        match self {
            FontStyle::Italic => Some(FontStyle::Regular),
            FontStyle::BoldItalic => Some(FontStyle::Bold),
            _ => None,
        }
    }
}

impl fmt::Display for FontStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FontStyle::Regular => "regular",
            FontStyle::Bold => "bold",
            FontStyle::Italic => "italic",
            FontStyle::BoldItalic => "bold-italic",
        };
        f.write_str(name)
    }
}

/// Named glyphs that resolve to multi-character strings or characters the
/// cmap may not cover directly. Mirrors the typographic set book renderers
/// actually substitute.
const NAMED_GLYPHS: &[(&str, &str)] = &[
    ("f_f", "ff"),
    ("f_i", "fi"),
    ("f_l", "fl"),
    ("f_f_i", "ffi"),
    ("f_f_l", "ffl"),
    ("uniFB00", "ff"),
    ("uniFB01", "fi"),
    ("uniFB02", "fl"),
    ("uniFB03", "ffi"),
    ("uniFB04", "ffl"),
    ("endash", "\u{2013}"),
    ("emdash", "\u{2014}"),
    ("quotedblleft", "\u{201C}"),
    ("quotedblright", "\u{201D}"),
    ("quoteleft", "\u{2018}"),
    ("quoteright", "\u{2019}"),
    ("ellipsis", "\u{2026}"),
];

/// Slant applied when synthesizing an italic style from an upright face.
const SYNTHETIC_ITALIC_SKEW: f32 = 0.2126; // tan(12°)

/// One (character, style) pair of the reference typeface, rendered at
/// every resolution tier.
#[derive(Debug, Clone)]
pub struct ReferenceGlyph {
    /// Text this glyph decodes to (one char, or several for ligatures)
    pub text: String,
    /// Primary code point, used for deterministic tie-breaking
    pub codepoint: char,
    /// Style of the face this render came from
    pub style: FontStyle,
    /// True when the render came from an algorithmic style transform
    /// rather than a genuine face of that style
    pub synthetic: bool,
    /// Rasters, one per tier in ladder order
    rasters: Vec<Raster>,
}

impl ReferenceGlyph {
    /// Build a reference glyph from pre-rendered tier rasters.
    ///
    /// Returns `None` for empty text or an empty ladder. Used by callers
    /// that maintain their own render cache instead of a TTF face.
    pub fn new(text: &str, style: FontStyle, synthetic: bool, rasters: Vec<Raster>) -> Option<Self> {
        let codepoint = text.chars().next()?;
        if rasters.is_empty() {
            return None;
        }
        Some(Self {
            text: text.to_string(),
            codepoint,
            style,
            synthetic,
            rasters,
        })
    }

    /// Raster at a tier index of the ladder this index was built for.
    pub fn raster_at(&self, tier: usize) -> Option<&Raster> {
        self.rasters.get(tier)
    }
}

/// Collects a ttf-parser outline into a tiny-skia path, flipping Y
/// (TrueType is Y-up, rasters are Y-down) and optionally skewing for
/// synthetic italics.
struct OutlineCollector {
    builder: PathBuilder,
    skew: f32,
}

impl OutlineCollector {
    fn new(skew: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            skew,
        }
    }

    fn map(&self, x: f32, y: f32) -> (f32, f32) {
        (x + y * self.skew, -y)
    }

    fn finish(self) -> Option<Path> {
        self.builder.finish()
    }
}

impl ttf_parser::OutlineBuilder for OutlineCollector {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x, y) = self.map(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x2, y2) = self.map(x2, y2);
        let (x, y) = self.map(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

/// Read-only index of pre-rendered reference glyphs, grouped by style.
#[derive(Debug)]
pub struct ReferenceIndex {
    tier_sizes: Vec<u32>,
    /// (style, glyphs) in deterministic style order
    by_style: Vec<(FontStyle, Vec<ReferenceGlyph>)>,
}

impl ReferenceIndex {
    /// Build an index from already-rendered glyphs, grouped by style and
    /// sorted deterministically. All glyphs must carry one raster per
    /// entry of `tier_sizes`.
    pub fn from_prerendered(tier_sizes: Vec<u32>, glyphs: Vec<ReferenceGlyph>) -> Self {
        let mut by_style: Vec<(FontStyle, Vec<ReferenceGlyph>)> = Vec::new();
        for glyph in glyphs {
            match by_style.iter_mut().find(|(s, _)| *s == glyph.style) {
                Some((_, existing)) => existing.push(glyph),
                None => by_style.push((glyph.style, vec![glyph])),
            }
        }
        by_style.sort_by_key(|(s, _)| *s);
        for (_, glyphs) in &mut by_style {
            glyphs.sort_by_key(|g| g.codepoint);
        }
        Self {
            tier_sizes,
            by_style,
        }
    }

    /// Build the index from configuration. Fatal on unreadable or
    /// unparseable faces and on styles with zero renderable characters.
    pub fn build(config: &DecoderConfig) -> Result<ReferenceIndex> {
        config.validate()?;

        let tier_sizes: Vec<u32> = config.matcher.tiers.iter().map(|t| t.size).collect();
        let charset = config
            .charset
            .clone()
            .unwrap_or_else(DecoderConfig::default_charset);

        let mut by_style: Vec<(FontStyle, Vec<ReferenceGlyph>)> = Vec::new();
        for face_config in &config.reference_faces {
            let glyphs = Self::render_face(face_config, &charset, &tier_sizes, 0.0, false)?;
            if glyphs.is_empty() {
                return Err(Error::StyleNotCovered(face_config.style.to_string()));
            }
            match by_style.iter_mut().find(|(s, _)| *s == face_config.style) {
                Some((_, existing)) => existing.extend(glyphs),
                None => by_style.push((face_config.style, glyphs)),
            }
        }

        // Synthesize missing slanted styles from their upright bases so a
        // style hint of italic still has candidates to rank. Synthetic
        // renders are marked and the matcher penalizes their distance.
        for style in [FontStyle::Italic, FontStyle::BoldItalic] {
            if by_style.iter().any(|(s, _)| *s == style) {
                continue;
            }
            let Some(base) = style.upright_base() else {
                continue;
            };
            let Some(base_config) = config.reference_faces.iter().find(|f| f.style == base) else {
                continue;
            };
            let glyphs = Self::render_face(
                base_config,
                &charset,
                &tier_sizes,
                SYNTHETIC_ITALIC_SKEW,
                true,
            )?;
            if !glyphs.is_empty() {
                log::info!(
                    "synthesized {} from {} ({} glyphs)",
                    style,
                    base,
                    glyphs.len()
                );
                let glyphs = glyphs
                    .into_iter()
                    .map(|g| ReferenceGlyph { style, ..g })
                    .collect();
                by_style.push((style, glyphs));
            }
        }

        by_style.sort_by_key(|(s, _)| *s);
        for (_, glyphs) in &mut by_style {
            glyphs.sort_by_key(|g| g.codepoint);
        }

        Ok(ReferenceIndex {
            tier_sizes,
            by_style,
        })
    }

    fn render_face(
        face_config: &ReferenceFaceConfig,
        charset: &[char],
        tier_sizes: &[u32],
        skew: f32,
        synthetic: bool,
    ) -> Result<Vec<ReferenceGlyph>> {
        let path = &face_config.path;
        let data = std::fs::read(path).map_err(|e| Error::ReferenceFaceUnreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let face = Face::parse(&data, 0).map_err(|e| Error::ReferenceFaceInvalid {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let metrics = FontMetrics::new(
            face.units_per_em() as f32,
            face.ascender() as f32,
            face.descender() as f32,
        );

        let mut glyphs = Vec::new();

        for &ch in charset {
            let Some(glyph_id) = face.glyph_index(ch) else {
                continue;
            };
            if let Some(rasters) =
                Self::render_glyph_tiers(&face, glyph_id, &metrics, tier_sizes, skew)
            {
                glyphs.push(ReferenceGlyph {
                    text: ch.to_string(),
                    codepoint: ch,
                    style: face_config.style,
                    synthetic,
                    rasters,
                });
            }
        }

        for (name, text) in NAMED_GLYPHS {
            // Skip names whose text the charset already covered via cmap.
            if text.chars().count() == 1 {
                let ch = text.chars().next().unwrap();
                if glyphs.iter().any(|g| g.codepoint == ch) {
                    continue;
                }
            }
            let Some(glyph_id) = face.glyph_index_by_name(name) else {
                continue;
            };
            if let Some(rasters) =
                Self::render_glyph_tiers(&face, glyph_id, &metrics, tier_sizes, skew)
            {
                glyphs.push(ReferenceGlyph {
                    text: (*text).to_string(),
                    codepoint: text.chars().next().unwrap(),
                    style: face_config.style,
                    synthetic,
                    rasters,
                });
            }
        }

        Ok(glyphs)
    }

    /// Render one glyph at every tier. `None` when the glyph has no
    /// outline (e.g. space) or a raster failed; a missing tier render
    /// drops the whole candidate rather than leaving a ragged ladder.
    fn render_glyph_tiers(
        face: &Face,
        glyph_id: ttf_parser::GlyphId,
        metrics: &FontMetrics,
        tier_sizes: &[u32],
        skew: f32,
    ) -> Option<Vec<Raster>> {
        let mut collector = OutlineCollector::new(skew);
        face.outline_glyph(glyph_id, &mut collector)?;
        let path = collector.finish()?;

        let mut rasters = Vec::with_capacity(tier_sizes.len());
        for &size in tier_sizes {
            let raster = GlyphRasterizer::new(size).render(&path, metrics)?;
            rasters.push(raster);
        }
        Some(rasters)
    }

    /// Tier sizes the index was rendered for, ladder order.
    pub fn tier_sizes(&self) -> &[u32] {
        &self.tier_sizes
    }

    /// All indexed styles in deterministic order.
    pub fn styles(&self) -> impl Iterator<Item = FontStyle> + '_ {
        self.by_style.iter().map(|(s, _)| *s)
    }

    /// All candidate glyphs for one style. Empty when the style is not
    /// indexed; the matcher treats style as a ranked hint and falls back
    /// to [`ReferenceIndex::all_candidates`].
    pub fn candidates(&self, style: FontStyle) -> &[ReferenceGlyph] {
        self.by_style
            .iter()
            .find(|(s, _)| *s == style)
            .map(|(_, g)| g.as_slice())
            .unwrap_or(&[])
    }

    /// Candidate glyphs across every indexed style, deterministic order.
    pub fn all_candidates(&self) -> impl Iterator<Item = &ReferenceGlyph> {
        self.by_style.iter().flat_map(|(_, g)| g.iter())
    }

    /// Total number of indexed (character, style) renders.
    pub fn len(&self) -> usize {
        self.by_style.iter().map(|(_, g)| g.len()).sum()
    }

    /// True when nothing was indexed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
