#![allow(dead_code)]
//! Integration tests for the progressive matcher over the public API.

use glyph_oxide::canonical::{hash_glyph, GlyphRef, ShapeRegistry};
use glyph_oxide::config::{MatcherConfig, ResolutionTier};
use glyph_oxide::matcher::ProgressiveMatcher;
use glyph_oxide::raster::{FontMetrics, GlyphRasterizer};
use glyph_oxide::reference::{FontStyle, ReferenceGlyph, ReferenceIndex};

const TRIANGLE: &str = "M 300 700 L 700 700 L 500 300 Z";
const SQUARE: &str = "M 300 300 L 700 300 L 700 700 L 300 700 Z";

const TIER_SIZES: [u32; 2] = [64, 128];

fn reference_glyph(text: &str, outline: &str) -> ReferenceGlyph {
    let rasters = TIER_SIZES
        .iter()
        .map(|&s| {
            GlyphRasterizer::new(s)
                .render_path_data(outline, &FontMetrics::default())
                .unwrap()
        })
        .collect();
    ReferenceGlyph::new(text, FontStyle::Regular, false, rasters).unwrap()
}

fn matcher_config() -> MatcherConfig {
    MatcherConfig {
        tiers: vec![ResolutionTier::new(64, 5), ResolutionTier::new(128, 1)],
        ..MatcherConfig::default()
    }
}

fn shape(outline: &str) -> glyph_oxide::canonical::CanonicalShape {
    let mut registry = ShapeRegistry::new(6);
    let key = registry.register(hash_glyph(
        &GlyphRasterizer::new(128),
        GlyphRef { batch: 0, glyph: 0 },
        outline,
        &FontMetrics::default(),
    ));
    registry.get(&key).unwrap().clone()
}

#[test]
fn test_reference_with_only_a_and_b_resolves_exact_a() {
    // A reference typeface with only "A" and "B": a shape whose raster
    // exactly matches the reference "A" resolves to "A" at the coarsest
    // tier with the best possible confidence.
    let index = ReferenceIndex::from_prerendered(
        TIER_SIZES.to_vec(),
        vec![
            reference_glyph("A", TRIANGLE),
            reference_glyph("B", SQUARE),
        ],
    );
    let matcher = ProgressiveMatcher::new(&index, matcher_config());

    let entry = matcher.match_shape(&shape(TRIANGLE), None);
    assert_eq!(entry.text.as_deref(), Some("A"));
    assert_eq!(entry.tier, 0);
    assert!(entry.confidence < 0.01, "confidence was {}", entry.confidence);
}

#[test]
fn test_equidistant_candidates_resolve_to_a_on_repeated_runs() {
    // "A" and "B" share an identical raster (a simulated perfect tie);
    // the lexicographic tie-break must pick "A" every time.
    let index = ReferenceIndex::from_prerendered(
        TIER_SIZES.to_vec(),
        vec![
            reference_glyph("B", SQUARE),
            reference_glyph("A", SQUARE),
        ],
    );
    let matcher = ProgressiveMatcher::new(&index, matcher_config());

    let square = shape(SQUARE);
    for _ in 0..5 {
        let entry = matcher.match_shape(&square, None);
        assert_eq!(entry.text.as_deref(), Some("A"));
    }
}

#[test]
fn test_degenerate_outline_yields_fixed_empty_key_unresolved() {
    let index = ReferenceIndex::from_prerendered(
        TIER_SIZES.to_vec(),
        vec![reference_glyph("A", TRIANGLE)],
    );
    let matcher = ProgressiveMatcher::new(&index, matcher_config());

    let empty = shape("");
    assert!(empty.key.is_empty());
    let entry = matcher.match_shape(&empty, None);
    assert!(!entry.is_resolved());
    assert_eq!(entry.key, glyph_oxide::ShapeKey::EMPTY);
}
