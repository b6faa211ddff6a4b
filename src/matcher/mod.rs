//! Progressive coarse-to-fine matching of canonical shapes.
//!
//! Comparing a shape against every reference render at full resolution is
//! the dominant cost of decoding. The matcher instead walks a resolution
//! tier ladder: at the coarsest tier it scores every candidate, keeps only
//! the top K, and re-compares just those survivors at each finer tier.
//! The coarse pass can in principle eliminate the true match when a
//! look-alike scores deceptively close, so the per-tier retention widths
//! are configuration, validated empirically per reference typeface rather
//! than assumed.
//!
//! Style hints rank candidates, they never filter them: a wrong bold/italic
//! guess from the upstream renderer must not cascade into a mismatch. The
//! hint only decides ties at the finest tier, followed by the
//! lexicographically smallest code point so repeated runs agree.

pub mod ssim;

pub use ssim::{ssim, ssim_distance};

use crate::canonical::{CanonicalShape, ShapeKey};
use crate::config::MatcherConfig;
use crate::raster::{GlyphRasterizer, Raster};
use crate::reference::{FontStyle, ReferenceGlyph, ReferenceIndex};
use crate::store::MappingEntry;
use crate::utils::safe_float_cmp;

/// One scored candidate during the tier descent.
struct ScoredCandidate<'a> {
    glyph: &'a ReferenceGlyph,
    distance: f32,
}

/// Matches canonical shapes against a reference index.
pub struct ProgressiveMatcher<'a> {
    index: &'a ReferenceIndex,
    config: MatcherConfig,
}

impl<'a> ProgressiveMatcher<'a> {
    /// Create a matcher over a built reference index.
    pub fn new(index: &'a ReferenceIndex, config: MatcherConfig) -> Self {
        Self { index, config }
    }

    /// Match one canonical shape and return its mapping entry.
    ///
    /// The empty-shape sentinel resolves to unresolved without any
    /// comparison. No error escapes a comparison: candidates whose
    /// reference raster is missing or unscorable at a tier are skipped
    /// and logged.
    pub fn match_shape(
        &self,
        shape: &CanonicalShape,
        style_hint: Option<FontStyle>,
    ) -> MappingEntry {
        if shape.key.is_empty() {
            return MappingEntry::unresolved(ShapeKey::EMPTY);
        }

        let mut survivors: Vec<ScoredCandidate<'a>> = self
            .index
            .all_candidates()
            .map(|glyph| ScoredCandidate {
                glyph,
                distance: f32::INFINITY,
            })
            .collect();
        if survivors.is_empty() {
            return self.unresolved_entry(shape.key, style_hint, f32::INFINITY);
        }

        let mut accepted_tier = self.config.tiers.len().saturating_sub(1);
        for (tier_idx, tier) in self.config.tiers.iter().enumerate() {
            let Some(shape_raster) = self.shape_raster(shape, tier.size) else {
                return self.unresolved_entry(shape.key, style_hint, f32::INFINITY);
            };

            survivors = self.score_tier(&shape_raster, survivors, tier_idx);
            if survivors.is_empty() {
                return self.unresolved_entry(shape.key, style_hint, f32::INFINITY);
            }

            survivors.sort_by(|a, b| safe_float_cmp(a.distance, b.distance));
            survivors.truncate(tier.keep);

            if survivors[0].distance <= self.config.early_accept {
                accepted_tier = tier_idx;
                break;
            }
            accepted_tier = tier_idx;
        }

        let best_distance = survivors[0].distance;
        let tied: Vec<&ScoredCandidate<'a>> = survivors
            .iter()
            .take_while(|c| c.distance <= best_distance + self.config.tie_epsilon)
            .collect();
        let winner = Self::break_tie(&tied, style_hint);

        log::debug!(
            "shape {} -> {:?} (distance {:.4}, tier {})",
            shape.key.short(),
            winner.glyph.text,
            winner.distance,
            accepted_tier
        );

        if winner.distance <= self.config.acceptance_threshold {
            MappingEntry {
                key: shape.key,
                text: Some(winner.glyph.text.clone()),
                style: winner.glyph.style,
                confidence: winner.distance,
                tier: accepted_tier,
                synthetic_style: winner.glyph.synthetic,
            }
        } else {
            self.unresolved_entry(shape.key, style_hint, winner.distance)
        }
    }

    /// Score every surviving candidate at one tier.
    fn score_tier(
        &self,
        shape_raster: &Raster,
        survivors: Vec<ScoredCandidate<'a>>,
        tier_idx: usize,
    ) -> Vec<ScoredCandidate<'a>> {
        let penalty = self.config.synthetic_style_penalty;
        survivors
            .into_iter()
            .filter_map(|candidate| {
                let Some(reference) = candidate.glyph.raster_at(tier_idx) else {
                    log::warn!(
                        "reference '{}' ({}) has no raster at tier {}, skipping",
                        candidate.glyph.text,
                        candidate.glyph.style,
                        tier_idx
                    );
                    return None;
                };
                let distance = ssim_distance(shape_raster, reference)?;
                let distance = if candidate.glyph.synthetic {
                    distance + penalty
                } else {
                    distance
                };
                Some(ScoredCandidate {
                    glyph: candidate.glyph,
                    distance,
                })
            })
            .collect()
    }

    /// The shape's raster at a tier size: re-rendered from the
    /// representative outline when available, else resampled from the
    /// base raster.
    fn shape_raster(&self, shape: &CanonicalShape, size: u32) -> Option<Raster> {
        if let Some(outline) = &shape.outline {
            if let Some(raster) =
                GlyphRasterizer::new(size).render_path_data(&outline.path_data, &outline.metrics)
            {
                return Some(raster);
            }
        }
        shape.raster.as_ref().map(|r| r.resized(size))
    }

    /// Deterministic tie-break: prefer the style hint, then the smallest
    /// code point, then the style ordering.
    fn break_tie<'b>(
        tied: &[&'b ScoredCandidate<'a>],
        style_hint: Option<FontStyle>,
    ) -> &'b ScoredCandidate<'a> {
        tied.iter()
            .min_by_key(|c| {
                let hint_miss = match style_hint {
                    Some(hint) => c.glyph.style != hint,
                    None => false,
                };
                (hint_miss, c.glyph.codepoint, c.glyph.style)
            })
            .copied()
            .expect("tie set is never empty")
    }

    fn unresolved_entry(
        &self,
        key: ShapeKey,
        style_hint: Option<FontStyle>,
        best_distance: f32,
    ) -> MappingEntry {
        MappingEntry {
            key,
            text: None,
            style: style_hint.unwrap_or_default(),
            confidence: best_distance,
            tier: self.config.tiers.len().saturating_sub(1),
            synthetic_style: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::{hash_glyph, GlyphRef};
    use crate::config::ResolutionTier;
    use crate::raster::FontMetrics;

    const SQUARE: &str = "M 300 300 L 700 300 L 700 700 L 300 700 Z";
    const TRIANGLE: &str = "M 300 700 L 700 700 L 500 300 Z";
    const DIAMOND: &str = "M 500 300 L 700 500 L 500 700 L 300 500 Z";

    fn tier_sizes() -> Vec<u32> {
        vec![64, 128]
    }

    fn tiers() -> Vec<ResolutionTier> {
        vec![ResolutionTier::new(64, 5), ResolutionTier::new(128, 1)]
    }

    fn render_tiers(outline: &str) -> Vec<Raster> {
        tier_sizes()
            .iter()
            .map(|&s| {
                GlyphRasterizer::new(s)
                    .render_path_data(outline, &FontMetrics::default())
                    .unwrap()
            })
            .collect()
    }

    fn reference_glyph(text: &str, style: FontStyle, outline: &str) -> ReferenceGlyph {
        ReferenceGlyph::new(text, style, false, render_tiers(outline)).unwrap()
    }

    fn shape_from(outline: &str) -> CanonicalShape {
        let hashed = hash_glyph(
            &GlyphRasterizer::new(128),
            GlyphRef { batch: 0, glyph: 0 },
            outline,
            &FontMetrics::default(),
        );
        CanonicalShape {
            id: 0,
            key: hashed.key,
            raster: hashed.raster,
            outline: hashed.outline,
            occurrences: vec![GlyphRef { batch: 0, glyph: 0 }],
        }
    }

    fn matcher_config() -> MatcherConfig {
        MatcherConfig {
            tiers: tiers(),
            ..MatcherConfig::default()
        }
    }

    #[test]
    fn test_exact_match_resolves_at_coarsest_tier() {
        let index = ReferenceIndex::from_prerendered(
            tier_sizes(),
            vec![
                reference_glyph("A", FontStyle::Regular, TRIANGLE),
                reference_glyph("B", FontStyle::Regular, SQUARE),
            ],
        );
        let matcher = ProgressiveMatcher::new(&index, matcher_config());

        let entry = matcher.match_shape(&shape_from(TRIANGLE), None);
        assert_eq!(entry.text.as_deref(), Some("A"));
        // A pixel-identical render scores the best possible distance and is
        // accepted without descending past the coarsest tier.
        assert!(entry.confidence < 0.05);
        assert_eq!(entry.tier, 0);
    }

    #[test]
    fn test_distinct_shapes_resolve_to_their_characters() {
        let index = ReferenceIndex::from_prerendered(
            tier_sizes(),
            vec![
                reference_glyph("A", FontStyle::Regular, TRIANGLE),
                reference_glyph("B", FontStyle::Regular, SQUARE),
                reference_glyph("C", FontStyle::Regular, DIAMOND),
            ],
        );
        let matcher = ProgressiveMatcher::new(&index, matcher_config());

        assert_eq!(
            matcher.match_shape(&shape_from(SQUARE), None).text.as_deref(),
            Some("B")
        );
        assert_eq!(
            matcher.match_shape(&shape_from(DIAMOND), None).text.as_deref(),
            Some("C")
        );
    }

    #[test]
    fn test_simulated_tie_breaks_lexicographically() {
        // Two candidates with identical rasters: the smaller code point
        // must win on every run.
        let index = ReferenceIndex::from_prerendered(
            tier_sizes(),
            vec![
                reference_glyph("B", FontStyle::Regular, SQUARE),
                reference_glyph("A", FontStyle::Regular, SQUARE),
            ],
        );
        let matcher = ProgressiveMatcher::new(&index, matcher_config());

        for _ in 0..3 {
            let entry = matcher.match_shape(&shape_from(SQUARE), None);
            assert_eq!(entry.text.as_deref(), Some("A"));
        }
    }

    #[test]
    fn test_style_hint_breaks_tie_before_codepoint() {
        // The same character in two styles with identical rasters: the
        // hinted style wins.
        let index = ReferenceIndex::from_prerendered(
            tier_sizes(),
            vec![
                reference_glyph("A", FontStyle::Regular, SQUARE),
                reference_glyph("A", FontStyle::Bold, SQUARE),
            ],
        );
        let matcher = ProgressiveMatcher::new(&index, matcher_config());

        let entry = matcher.match_shape(&shape_from(SQUARE), Some(FontStyle::Bold));
        assert_eq!(entry.style, FontStyle::Bold);

        let entry = matcher.match_shape(&shape_from(SQUARE), None);
        assert_eq!(entry.style, FontStyle::Regular);
    }

    #[test]
    fn test_wrong_style_hint_still_matches() {
        // Style is a ranked hint, not a filter: a bold hint with only
        // regular candidates must still resolve.
        let index = ReferenceIndex::from_prerendered(
            tier_sizes(),
            vec![reference_glyph("A", FontStyle::Regular, TRIANGLE)],
        );
        let matcher = ProgressiveMatcher::new(&index, matcher_config());

        let entry = matcher.match_shape(&shape_from(TRIANGLE), Some(FontStyle::Bold));
        assert_eq!(entry.text.as_deref(), Some("A"));
        assert_eq!(entry.style, FontStyle::Regular);
    }

    #[test]
    fn test_no_candidate_below_threshold_is_unresolved() {
        let index = ReferenceIndex::from_prerendered(
            tier_sizes(),
            vec![reference_glyph("B", FontStyle::Regular, SQUARE)],
        );
        let mut config = matcher_config();
        config.acceptance_threshold = 0.0001;
        config.early_accept = 0.0;
        let matcher = ProgressiveMatcher::new(&index, config);

        let entry = matcher.match_shape(&shape_from(TRIANGLE), None);
        assert!(!entry.is_resolved());
        // The best distance seen is still recorded for the summary.
        assert!(entry.confidence.is_finite());
    }

    #[test]
    fn test_empty_shape_is_unresolved_without_comparison() {
        let index = ReferenceIndex::from_prerendered(
            tier_sizes(),
            vec![reference_glyph("A", FontStyle::Regular, TRIANGLE)],
        );
        let matcher = ProgressiveMatcher::new(&index, matcher_config());

        let shape = CanonicalShape {
            id: 0,
            key: ShapeKey::EMPTY,
            raster: None,
            outline: None,
            occurrences: vec![],
        };
        let entry = matcher.match_shape(&shape, None);
        assert_eq!(entry.key, ShapeKey::EMPTY);
        assert!(!entry.is_resolved());
    }

    #[test]
    fn test_synthetic_candidates_are_penalized() {
        let genuine = reference_glyph("A", FontStyle::Regular, SQUARE);
        let synthetic =
            ReferenceGlyph::new("B", FontStyle::Italic, true, render_tiers(SQUARE)).unwrap();
        let index = ReferenceIndex::from_prerendered(tier_sizes(), vec![genuine, synthetic]);
        let matcher = ProgressiveMatcher::new(&index, matcher_config());

        // Identical rasters, but the synthetic render carries a penalty,
        // so the genuine candidate wins even with an italic hint.
        let entry = matcher.match_shape(&shape_from(SQUARE), Some(FontStyle::Italic));
        assert_eq!(entry.text.as_deref(), Some("A"));
        assert!(!entry.synthetic_style);
    }

    #[test]
    fn test_determinism_across_runs() {
        let index = ReferenceIndex::from_prerendered(
            tier_sizes(),
            vec![
                reference_glyph("A", FontStyle::Regular, TRIANGLE),
                reference_glyph("B", FontStyle::Regular, SQUARE),
                reference_glyph("C", FontStyle::Regular, DIAMOND),
            ],
        );
        let matcher = ProgressiveMatcher::new(&index, matcher_config());

        let shape = shape_from(DIAMOND);
        let first = matcher.match_shape(&shape, None);
        for _ in 0..3 {
            let again = matcher.match_shape(&shape, None);
            assert_eq!(again.text, first.text);
            assert_eq!(again.confidence, first.confidence);
            assert_eq!(again.tier, first.tier);
        }
    }
}
