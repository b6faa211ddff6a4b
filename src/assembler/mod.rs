//! Document assembly: from the ordered glyph sequence to chapters, lines
//! and styled runs.
//!
//! Assembly is single-threaded over the fully ordered instance sequence.
//! Output ordering is a global sequential property, so it depends only on
//! the input order, never on the order matching workers completed in.
//!
//! Totality is the assembler's contract: every input glyph instance lands
//! in exactly one position of exactly one chapter. Unresolved glyphs
//! become explicit placeholder runs carrying their shape key; instances
//! with missing layout metadata continue the current line and are flagged,
//! never dropped.

pub mod document;

pub use document::{
    Alignment, Chapter, Line, Paragraph, ReconstructedDocument, RunStyle, TextRun,
    UnresolvedShape,
};

use crate::canonical::{GlyphRef, ShapeKey, ShapeRegistry};
use crate::config::AssemblerConfig;
use crate::input::{ChapterAnchor, GlyphInstance};
use crate::store::MappingStore;
use indexmap::IndexMap;
use std::collections::HashMap;

/// Glyph characters treated as list bullets: a line break right after one
/// keeps the bullet on the same output line as its text.
const BULLETS: &[char] = &['\u{2022}', '\u{25E6}', '\u{25CF}'];

/// Counters the assembler reports alongside the document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblyStats {
    /// Every input instance, including skipped front matter
    pub total_instances: usize,
    /// Instances emitted as placeholders
    pub placeholder_instances: usize,
    /// Instances assembled with best-effort layout defaults
    pub flagged_layout_instances: usize,
    /// Instances before the first chapter anchor (only nonzero when the
    /// configuration drops front matter)
    pub skipped_front_matter: usize,
}

/// Assembles the reconstructed document from resolved glyphs.
pub struct DocumentAssembler<'a> {
    store: &'a MappingStore,
    config: AssemblerConfig,
}

struct ChapterState {
    tag: Option<u32>,
    chapter: Chapter,
    paragraph: Paragraph,
    line_runs: Vec<TextRun>,
    run: Option<TextRun>,
    line_left: f32,
    line_right: f32,
    prev_top: Option<f32>,
    prev_right: f32,
    last_advance: Option<f32>,
    last_char: Option<char>,
}

impl ChapterState {
    fn new(tag: Option<u32>, title: String) -> Self {
        Self {
            tag,
            chapter: Chapter {
                title,
                paragraphs: Vec::new(),
            },
            paragraph: Paragraph::default(),
            line_runs: Vec::new(),
            run: None,
            line_left: f32::INFINITY,
            line_right: f32::NEG_INFINITY,
            prev_top: None,
            prev_right: 0.0,
            last_advance: None,
            last_char: None,
        }
    }
}

impl<'a> DocumentAssembler<'a> {
    /// Create an assembler reading resolutions from `store`.
    pub fn new(store: &'a MappingStore, config: AssemblerConfig) -> Self {
        Self { store, config }
    }

    /// Assemble the document.
    ///
    /// `shape_map` maps each glyph reference to its canonical shape key
    /// (the canonicalizer's output); `registry` supplies representative
    /// rasters for the unresolved-shape report; `anchors` supply chapter
    /// titles; `page_width` drives the alignment thresholds.
    pub fn assemble(
        &self,
        instances: &[GlyphInstance],
        shape_map: &HashMap<GlyphRef, ShapeKey>,
        registry: &ShapeRegistry,
        anchors: &[ChapterAnchor],
        page_width: f32,
    ) -> (ReconstructedDocument, AssemblyStats) {
        let mut stats = AssemblyStats {
            total_instances: instances.len(),
            ..AssemblyStats::default()
        };
        let mut chapters: Vec<Chapter> = Vec::new();
        let mut unresolved: IndexMap<ShapeKey, usize> = IndexMap::new();
        let mut state: Option<ChapterState> = None;

        for instance in instances {
            if instance.chapter.is_none() && !self.config.include_front_matter {
                stats.skipped_front_matter += 1;
                continue;
            }

            // Chapter boundary: a new tag closes the running chapter.
            let needs_new_chapter = match &state {
                Some(s) => s.tag != instance.chapter,
                None => true,
            };
            if needs_new_chapter {
                if let Some(done) = state.take() {
                    chapters.push(Self::finish_chapter(done, &self.config, page_width));
                }
                let title = instance
                    .chapter
                    .and_then(|tag| anchors.get(tag as usize))
                    .map(|a| a.title.clone())
                    .unwrap_or_default();
                state = Some(ChapterState::new(instance.chapter, title));
            }
            let s = state.as_mut().expect("chapter state exists");

            if instance.missing_layout {
                stats.flagged_layout_instances += 1;
            } else {
                self.apply_breaks(s, instance, page_width);
            }

            // Resolve through the mapping store.
            let style = RunStyle {
                bold: instance.weight >= 700,
                italic: instance.italic,
                link: instance.has_link,
            };
            // A glyph id with no outline definition in its batch surfaces
            // the same way as an unresolved shape, under the empty key.
            let key = shape_map
                .get(&instance.glyph_ref)
                .copied()
                .unwrap_or(ShapeKey::EMPTY);
            let resolved_text = self.store.get(&key).and_then(|entry| entry.text);

            match resolved_text {
                Some(text) => {
                    self.push_text(s, &text, style);
                },
                None => {
                    stats.placeholder_instances += 1;
                    *unresolved.entry(key).or_insert(0) += 1;
                    Self::flush_run(s);
                    s.line_runs.push(TextRun::placeholder(key, style));
                    s.last_char = None;
                },
            }

            if !instance.missing_layout {
                s.prev_top = Some(instance.rect.top());
                s.prev_right = instance.rect.right();
            }
            s.line_left = s.line_left.min(instance.rect.left());
            s.line_right = s.line_right.max(instance.rect.right());
        }

        if let Some(done) = state.take() {
            chapters.push(Self::finish_chapter(done, &self.config, page_width));
        }

        let mut unresolved: Vec<UnresolvedShape> = unresolved
            .into_iter()
            .map(|(key, occurrence_count)| UnresolvedShape {
                key,
                occurrence_count,
                raster: registry.get(&key).and_then(|s| s.raster.clone()),
            })
            .collect();
        unresolved.sort_by(|a, b| {
            b.occurrence_count
                .cmp(&a.occurrence_count)
                .then(a.key.cmp(&b.key))
        });

        (
            ReconstructedDocument {
                chapters,
                unresolved,
            },
            stats,
        )
    }

    /// Detect line and paragraph breaks before placing an instance.
    fn apply_breaks(&self, s: &mut ChapterState, instance: &GlyphInstance, page_width: f32) {
        let Some(prev_top) = s.prev_top else {
            return;
        };
        let dy = (instance.rect.top() - prev_top).abs();
        if dy <= self.config.line_epsilon {
            // Same line: check for a word gap between runs.
            let gap = instance.rect.left() - s.prev_right;
            if gap > self.config.word_gap_factor * instance.font_size
                && !matches!(s.last_char, Some(' ') | None)
            {
                let style = s.run.as_ref().map(|r| r.style).unwrap_or_default();
                self.push_text(s, " ", style);
                if let Some(run) = &mut s.run {
                    // The space is synthesized, not glyph-derived.
                    run.glyph_count -= 1;
                }
            }
            return;
        }

        // A break directly after a bullet keeps the bullet with its text.
        if s.last_char.map(|c| BULLETS.contains(&c)).unwrap_or(false) {
            return;
        }

        let baseline = s.last_advance.unwrap_or(dy);
        let is_paragraph = dy > baseline * self.config.paragraph_gap_ratio;
        Self::flush_line(s, &self.config, page_width);
        if is_paragraph {
            Self::flush_paragraph(s);
        } else {
            s.last_advance = Some(dy);
        }
    }

    /// Append text to the current run, starting a new run on style change.
    fn push_text(&self, s: &mut ChapterState, text: &str, style: RunStyle) {
        let start_new = match &s.run {
            Some(run) => run.style != style,
            None => true,
        };
        if start_new {
            Self::flush_run(s);
            s.run = Some(TextRun {
                text: String::new(),
                style,
                placeholder_key: None,
                glyph_count: 0,
            });
        }
        let run = s.run.as_mut().expect("current run exists");
        run.text.push_str(text);
        run.glyph_count += 1;
        s.last_char = text.chars().last();
    }

    fn flush_run(s: &mut ChapterState) {
        if let Some(run) = s.run.take() {
            if !run.text.is_empty() {
                s.line_runs.push(run);
            }
        }
    }

    fn flush_line(s: &mut ChapterState, config: &AssemblerConfig, page_width: f32) {
        Self::flush_run(s);
        if s.line_runs.is_empty() {
            return;
        }
        let alignment = detect_alignment(config, s.line_left, s.line_right, page_width);
        s.paragraph.lines.push(Line {
            alignment,
            runs: std::mem::take(&mut s.line_runs),
        });
        s.line_left = f32::INFINITY;
        s.line_right = f32::NEG_INFINITY;
    }

    fn flush_paragraph(s: &mut ChapterState) {
        if !s.paragraph.lines.is_empty() {
            s.chapter.paragraphs.push(std::mem::take(&mut s.paragraph));
        }
    }

    fn finish_chapter(mut s: ChapterState, config: &AssemblerConfig, page_width: f32) -> Chapter {
        Self::flush_line(&mut s, config, page_width);
        Self::flush_paragraph(&mut s);
        s.chapter
    }
}

/// Classify a line's alignment from its horizontal extent.
///
/// Thresholds are fractions of the page width: centered text sits near the
/// page center with real margins on both sides; right-aligned text hugs
/// the right edge with a large left margin; a moderate left offset on a
/// substantial line is a paragraph indent.
fn detect_alignment(
    config: &AssemblerConfig,
    left: f32,
    right: f32,
    page_width: f32,
) -> Alignment {
    if page_width <= 0.0 || !left.is_finite() || !right.is_finite() {
        return Alignment::Left;
    }
    let center = (left + right) / 2.0;
    let page_center = page_width / 2.0;
    let text_width = right - left;

    if (center - page_center).abs() < config.center_tolerance * page_width
        && left > config.min_side_margin * page_width
        && (page_width - right) > config.min_side_margin * page_width
    {
        Alignment::Center
    } else if (page_width - right).abs() < config.edge_tolerance * page_width
        && left > config.min_left_margin_right * page_width
    {
        Alignment::Right
    } else if left > config.min_indent * page_width
        && left < config.max_indent * page_width
        && text_width > config.min_text_width * page_width
    {
        Alignment::Indent
    } else {
        Alignment::Left
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AssemblerConfig;

    fn config() -> AssemblerConfig {
        AssemblerConfig::default()
    }

    #[test]
    fn test_detect_alignment_center() {
        // A 200-wide line centered on a 1000-wide page.
        assert_eq!(
            detect_alignment(&config(), 400.0, 600.0, 1000.0),
            Alignment::Center
        );
    }

    #[test]
    fn test_detect_alignment_right() {
        assert_eq!(
            detect_alignment(&config(), 700.0, 990.0, 1000.0),
            Alignment::Right
        );
    }

    #[test]
    fn test_detect_alignment_indent() {
        // 8% left offset with a 60%-wide line.
        assert_eq!(
            detect_alignment(&config(), 80.0, 680.0, 1000.0),
            Alignment::Indent
        );
    }

    #[test]
    fn test_detect_alignment_default_left() {
        assert_eq!(
            detect_alignment(&config(), 10.0, 900.0, 1000.0),
            Alignment::Left
        );
        // Unknown page width never classifies.
        assert_eq!(
            detect_alignment(&config(), 400.0, 600.0, 0.0),
            Alignment::Left
        );
    }
}
