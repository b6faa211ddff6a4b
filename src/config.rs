//! Unified configuration for the glyph decoding pipeline.
//!
//! All empirically tuned constants live here rather than being hard-coded:
//! the acceptance threshold, near-duplicate fold distance, the resolution
//! tier ladder and its per-tier retention widths are typeface- and
//! rendering-pipeline-dependent, so callers can override them per document.

use crate::error::{Error, Result};
use crate::reference::FontStyle;
use std::path::PathBuf;

/// One resolution tier of the coarse-to-fine comparison search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionTier {
    /// Raster edge length in pixels at this tier
    pub size: u32,
    /// How many best-scoring candidates survive into the next tier
    pub keep: usize,
}

impl ResolutionTier {
    /// Create a tier.
    pub fn new(size: u32, keep: usize) -> Self {
        Self { size, keep }
    }
}

/// A reference typeface source: one font file providing one style.
#[derive(Debug, Clone)]
pub struct ReferenceFaceConfig {
    /// Path to the TTF/OTF file
    pub path: PathBuf,
    /// Style this face provides
    pub style: FontStyle,
}

/// Shape canonicalization settings.
#[derive(Debug, Clone)]
pub struct CanonicalConfig {
    /// Edge length of the base raster used for perceptual hashing.
    ///
    /// Hashing is resolution-independent above ~64px; 128 matches the
    /// matcher's coarsest tier so the representative raster can be reused.
    pub base_resolution: u32,

    /// Maximum Hamming distance (bits, out of 512) at which two shape keys
    /// are folded into the same canonical shape.
    ///
    /// Re-renders of an identical underlying outline differ by anti-aliasing
    /// noise; exact hash equality under-merges.
    pub fold_distance: u32,
}

impl Default for CanonicalConfig {
    fn default() -> Self {
        Self {
            base_resolution: 128,
            fold_distance: 6,
        }
    }
}

/// Progressive matcher settings.
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Resolution tier ladder, ordered coarse to fine.
    pub tiers: Vec<ResolutionTier>,

    /// Accept the best candidate only if its distance is at or below this.
    /// Distance is (1 - SSIM) * 10; 0 is a pixel-perfect match.
    pub acceptance_threshold: f32,

    /// Two finest-tier scores within this delta are considered tied and go
    /// to the deterministic tie-break (style hint, then lowest code point).
    pub tie_epsilon: f32,

    /// A candidate scoring at or below this distance at any tier is
    /// accepted immediately without descending the rest of the ladder.
    pub early_accept: f32,

    /// Distance penalty added to candidates rendered from a synthesized
    /// style (e.g. algorithmic slant standing in for a missing italic face).
    pub synthetic_style_penalty: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            tiers: vec![
                ResolutionTier::new(128, 30),
                ResolutionTier::new(256, 10),
                ResolutionTier::new(512, 1),
            ],
            acceptance_threshold: 1.0,
            tie_epsilon: 1e-4,
            early_accept: 0.05,
            synthetic_style_penalty: 0.5,
        }
    }
}

/// Document assembler settings.
///
/// The page-relative percentages mirror how the upstream renderer lays out
/// pages: alignment can only be judged relative to the page width it was
/// rendered for.
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Vertical delta (page units) beyond which a run starts a new line.
    pub line_epsilon: f32,

    /// Horizontal gap, as a multiple of font size, beyond which a space is
    /// inserted between adjacent glyphs on the same line.
    pub word_gap_factor: f32,

    /// A vertical line advance this many times larger than the running
    /// line advance is a paragraph break rather than a line break.
    pub paragraph_gap_ratio: f32,

    /// Center tolerance as a fraction of page width.
    pub center_tolerance: f32,
    /// Edge tolerance for right-alignment detection.
    pub edge_tolerance: f32,
    /// Minimum margin on both sides for center detection.
    pub min_side_margin: f32,
    /// Minimum left margin for right-alignment detection.
    pub min_left_margin_right: f32,
    /// Minimum left offset counted as a paragraph indent.
    pub min_indent: f32,
    /// Maximum left offset counted as a paragraph indent.
    pub max_indent: f32,
    /// Minimum text width for indent detection.
    pub min_text_width: f32,

    /// Keep glyphs that precede the first chapter tag in a synthetic
    /// untitled front-matter chapter. When false they are still counted in
    /// the summary but omitted from the document.
    pub include_front_matter: bool,

    /// Maximum distance between a TOC position id and a run start position
    /// for the fuzzy chapter-anchor fallback.
    pub toc_fuzzy_distance: u32,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            line_epsilon: 5.0,
            word_gap_factor: 0.35,
            paragraph_gap_ratio: 1.6,
            center_tolerance: 0.05,
            edge_tolerance: 0.05,
            min_side_margin: 0.10,
            min_left_margin_right: 0.20,
            min_indent: 0.05,
            max_indent: 0.15,
            min_text_width: 0.30,
            include_front_matter: true,
            toc_fuzzy_distance: 10,
        }
    }
}

/// Top-level decoder configuration.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Reference typeface sources, one per style.
    pub reference_faces: Vec<ReferenceFaceConfig>,

    /// Characters to index from each reference face. `None` means the
    /// default book character set (ASCII plus common typographic marks).
    pub charset: Option<Vec<char>>,

    /// Shape canonicalization settings.
    pub canonical: CanonicalConfig,

    /// Progressive matcher settings.
    pub matcher: MatcherConfig,

    /// Document assembler settings.
    pub assembler: AssemblerConfig,

    /// Mapping store snapshot location. `None` keeps the store in memory
    /// only for this run.
    pub store_path: Option<PathBuf>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            reference_faces: Vec::new(),
            charset: None,
            canonical: CanonicalConfig::default(),
            matcher: MatcherConfig::default(),
            assembler: AssemblerConfig::default(),
            store_path: None,
        }
    }
}

impl DecoderConfig {
    /// Validate the configuration before a run starts.
    ///
    /// Configuration problems are fatal at startup; no partial run proceeds
    /// with an empty tier ladder or no reference faces.
    pub fn validate(&self) -> Result<()> {
        if self.reference_faces.is_empty() {
            return Err(Error::InvalidConfig(
                "no reference typeface configured".to_string(),
            ));
        }
        if self.matcher.tiers.is_empty() {
            return Err(Error::InvalidConfig("empty tier ladder".to_string()));
        }
        let mut prev = 0u32;
        for tier in &self.matcher.tiers {
            if tier.size == 0 || tier.keep == 0 {
                return Err(Error::InvalidConfig(format!(
                    "invalid tier: size={} keep={}",
                    tier.size, tier.keep
                )));
            }
            if tier.size <= prev {
                return Err(Error::InvalidConfig(
                    "tier ladder must be strictly coarse to fine".to_string(),
                ));
            }
            prev = tier.size;
        }
        if self.canonical.base_resolution == 0 {
            return Err(Error::InvalidConfig("base resolution is zero".to_string()));
        }
        Ok(())
    }

    /// The default character set indexed from each reference face:
    /// ASCII letters, digits, punctuation, space, and the typographic
    /// characters that commonly appear in books.
    pub fn default_charset() -> Vec<char> {
        let mut chars: Vec<char> = Vec::new();
        chars.extend('A'..='Z');
        chars.extend('a'..='z');
        chars.extend('0'..='9');
        chars.extend("!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~ ".chars());
        chars.extend([
            '\u{2022}', // bullet
            '\u{2023}', // triangular bullet
            '\u{2043}', // hyphen bullet
            '\u{00B7}', // middle dot
            '\u{25E6}', // white bullet
            '\u{2219}', // bullet operator
            '\u{00A0}', // non-breaking space
            '\u{00A9}', // copyright
            '\u{00AE}', // registered
            '\u{2122}', // trademark
            '\u{00AB}', // left guillemet
            '\u{00BB}', // right guillemet
            '\u{2018}', // left single quote
            '\u{2019}', // right single quote
            '\u{201A}', // single low-9 quote
            '\u{201B}', // single high-reversed-9 quote
            '\u{201C}', // left double quote
            '\u{201D}', // right double quote
            '\u{2013}', // en dash
            '\u{2014}', // em dash
            '\u{2026}', // ellipsis
            '\u{2032}', // prime
            '\u{2033}', // double prime
        ]);
        chars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_face() -> DecoderConfig {
        DecoderConfig {
            reference_faces: vec![ReferenceFaceConfig {
                path: PathBuf::from("fonts/Bookerly.ttf"),
                style: FontStyle::Regular,
            }],
            ..DecoderConfig::default()
        }
    }

    #[test]
    fn test_default_tiers_are_coarse_to_fine() {
        let config = MatcherConfig::default();
        assert_eq!(config.tiers.len(), 3);
        assert!(config.tiers.windows(2).all(|w| w[0].size < w[1].size));
        assert!(config.tiers.windows(2).all(|w| w[0].keep >= w[1].keep));
    }

    #[test]
    fn test_validate_requires_faces() {
        let config = DecoderConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_defaults_with_face() {
        assert!(config_with_face().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_tiers() {
        let mut config = config_with_face();
        config.matcher.tiers.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unordered_tiers() {
        let mut config = config_with_face();
        config.matcher.tiers = vec![ResolutionTier::new(256, 10), ResolutionTier::new(128, 30)];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_charset_contains_basics() {
        let charset = DecoderConfig::default_charset();
        assert!(charset.contains(&'A'));
        assert!(charset.contains(&'z'));
        assert!(charset.contains(&' '));
        assert!(charset.contains(&'\u{2014}'));
    }
}
