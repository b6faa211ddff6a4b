//! The reconstructed document model handed to the packaging collaborator.
//!
//! The model is deliberately flat: chapters of paragraphs of lines of
//! styled runs. Break markers are structure, not control characters, so a
//! packaging stage can map them onto whatever its container needs.

use crate::canonical::ShapeKey;
use crate::raster::Raster;
use serde::Serialize;

/// Horizontal alignment of a reconstructed line or paragraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Alignment {
    /// Flush left (the default)
    #[default]
    Left,
    /// Centered between page margins
    Center,
    /// Flush right
    Right,
    /// Left with a paragraph indent
    Indent,
}

/// Character-level styling of a text run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RunStyle {
    /// Bold weight
    pub bold: bool,
    /// Italic slant
    pub italic: bool,
    /// Hyperlink membership
    pub link: bool,
}

/// A maximal stretch of text sharing one style.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextRun {
    /// Decoded text. For placeholder runs, a visually distinct marker
    /// carrying the short shape key.
    pub text: String,
    /// Style of the run
    pub style: RunStyle,
    /// Set when this run stands in for an unresolved glyph; carries the
    /// full shape key so a reviewer or a later re-match can find it
    pub placeholder_key: Option<ShapeKey>,
    /// How many glyph instances this run covers (synthesized spaces add
    /// text but not instances)
    pub glyph_count: usize,
}

impl TextRun {
    /// A placeholder run for one unresolved glyph occurrence.
    pub fn placeholder(key: ShapeKey, style: RunStyle) -> Self {
        Self {
            text: format!("\u{27E6}{}\u{27E7}", key.short()),
            style,
            placeholder_key: Some(key),
            glyph_count: 1,
        }
    }
}

/// One reconstructed line.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Line {
    /// Alignment detected from the line's page position
    pub alignment: Alignment,
    /// Styled runs in reading order
    pub runs: Vec<TextRun>,
}

impl Line {
    /// Plain text of the line.
    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    /// Glyph instances covered by this line.
    pub fn glyph_count(&self) -> usize {
        self.runs.iter().map(|r| r.glyph_count).sum()
    }
}

/// One paragraph: lines separated by line breaks, ended by a paragraph
/// break.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Paragraph {
    /// Lines in reading order
    pub lines: Vec<Line>,
}

impl Paragraph {
    /// Paragraph alignment: the alignment of its first line.
    pub fn alignment(&self) -> Alignment {
        self.lines.first().map(|l| l.alignment).unwrap_or_default()
    }

    /// Plain text with lines joined by newlines.
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.text())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Glyph instances covered by this paragraph.
    pub fn glyph_count(&self) -> usize {
        self.lines.iter().map(|l| l.glyph_count()).sum()
    }
}

/// One chapter with its TOC title.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Chapter {
    /// Chapter title from the table of contents; empty for the synthetic
    /// front-matter chapter
    pub title: String,
    /// Paragraphs in reading order
    pub paragraphs: Vec<Paragraph>,
}

impl Chapter {
    /// Plain text with paragraphs separated by blank lines.
    pub fn text(&self) -> String {
        self.paragraphs
            .iter()
            .map(|p| p.text())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Glyph instances covered by this chapter.
    pub fn glyph_count(&self) -> usize {
        self.paragraphs.iter().map(|p| p.glyph_count()).sum()
    }
}

/// An unresolved shape surfaced for manual or automated follow-up.
#[derive(Debug, Clone, Serialize)]
pub struct UnresolvedShape {
    /// Canonical shape key
    pub key: ShapeKey,
    /// How many glyph instances rendered this shape
    pub occurrence_count: usize,
    /// Representative raster at the base resolution, when one rendered
    #[serde(skip)]
    pub raster: Option<Raster>,
}

/// The fully reconstructed document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconstructedDocument {
    /// Chapters in reading order
    pub chapters: Vec<Chapter>,
    /// Unresolved shapes, most frequent first
    pub unresolved: Vec<UnresolvedShape>,
}

impl ReconstructedDocument {
    /// Glyph instances covered by the whole document.
    pub fn glyph_count(&self) -> usize {
        self.chapters.iter().map(|c| c.glyph_count()).sum()
    }

    /// Plain text of the whole document, chapters separated by titles.
    pub fn text(&self) -> String {
        self.chapters
            .iter()
            .map(|c| {
                if c.title.is_empty() {
                    c.text()
                } else {
                    format!("{}\n\n{}", c.title, c.text())
                }
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_run_is_visually_distinct() {
        let run = TextRun::placeholder(ShapeKey::EMPTY, RunStyle::default());
        assert!(run.text.starts_with('\u{27E6}'));
        assert!(run.text.ends_with('\u{27E7}'));
        assert_eq!(run.placeholder_key, Some(ShapeKey::EMPTY));
        assert_eq!(run.glyph_count, 1);
    }

    #[test]
    fn test_paragraph_text_joins_lines() {
        let paragraph = Paragraph {
            lines: vec![
                Line {
                    alignment: Alignment::Left,
                    runs: vec![TextRun {
                        text: "Hello".into(),
                        style: RunStyle::default(),
                        placeholder_key: None,
                        glyph_count: 5,
                    }],
                },
                Line {
                    alignment: Alignment::Left,
                    runs: vec![TextRun {
                        text: "world".into(),
                        style: RunStyle::default(),
                        placeholder_key: None,
                        glyph_count: 5,
                    }],
                },
            ],
        };
        assert_eq!(paragraph.text(), "Hello\nworld");
        assert_eq!(paragraph.glyph_count(), 10);
        assert_eq!(paragraph.alignment(), Alignment::Left);
    }
}
