//! Parser for SVG-style path data strings.
//!
//! The Stage-1 renderer delivers glyph outlines as SVG path data
//! (`M 10 20 C ...`). This module tokenizes that grammar byte-wise and
//! builds a [`tiny_skia::Path`] from it. Arc commands never occur in font
//! outlines and are rejected rather than approximated.

use tiny_skia::{Path, PathBuilder};

/// Error types for path data parsing.
#[derive(Debug, thiserror::Error)]
pub enum PathDataError {
    /// A coordinate was expected but the data ended or held a non-number
    #[error("Malformed number at byte {0}")]
    MalformedNumber(usize),

    /// Path data began with something other than a moveto
    #[error("Path data must begin with a moveto command")]
    MissingMoveTo,

    /// Command letter outside the supported grammar
    #[error("Unsupported path command '{0}'")]
    UnsupportedCommand(char),

    /// The outline produced no drawable geometry
    #[error("Degenerate outline: no drawable geometry")]
    Degenerate,
}

/// Result type for path data parsing.
pub type PathDataResult<T> = Result<T, PathDataError>;

struct Tokenizer<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(data: &'a str) -> Self {
        Self {
            bytes: data.as_bytes(),
            pos: 0,
        }
    }

    fn skip_separators(&mut self) {
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b' ' | b'\t' | b'\r' | b'\n' | b',' => self.pos += 1,
                _ => break,
            }
        }
    }

    /// Peek the next command letter, if the next token is one.
    fn peek_command(&mut self) -> Option<char> {
        self.skip_separators();
        let b = *self.bytes.get(self.pos)?;
        if b.is_ascii_alphabetic() {
            Some(b as char)
        } else {
            None
        }
    }

    fn next_command(&mut self) -> Option<char> {
        let cmd = self.peek_command()?;
        self.pos += 1;
        Some(cmd)
    }

    fn at_end(&mut self) -> bool {
        self.skip_separators();
        self.pos >= self.bytes.len()
    }

    /// True when the next token is a number (implicit command repetition).
    fn number_follows(&mut self) -> bool {
        self.skip_separators();
        matches!(
            self.bytes.get(self.pos),
            Some(b'0'..=b'9') | Some(b'+') | Some(b'-') | Some(b'.')
        )
    }

    fn number(&mut self) -> PathDataResult<f32> {
        self.skip_separators();
        let start = self.pos;
        if matches!(self.bytes.get(self.pos), Some(b'+') | Some(b'-')) {
            self.pos += 1;
        }
        let mut saw_digit = false;
        while matches!(self.bytes.get(self.pos), Some(b'0'..=b'9')) {
            self.pos += 1;
            saw_digit = true;
        }
        if matches!(self.bytes.get(self.pos), Some(b'.')) {
            self.pos += 1;
            while matches!(self.bytes.get(self.pos), Some(b'0'..=b'9')) {
                self.pos += 1;
                saw_digit = true;
            }
        }
        if saw_digit && matches!(self.bytes.get(self.pos), Some(b'e') | Some(b'E')) {
            let mark = self.pos;
            self.pos += 1;
            if matches!(self.bytes.get(self.pos), Some(b'+') | Some(b'-')) {
                self.pos += 1;
            }
            let mut exp_digit = false;
            while matches!(self.bytes.get(self.pos), Some(b'0'..=b'9')) {
                self.pos += 1;
                exp_digit = true;
            }
            if !exp_digit {
                self.pos = mark;
            }
        }
        if !saw_digit {
            return Err(PathDataError::MalformedNumber(start));
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos])
            .map_err(|_| PathDataError::MalformedNumber(start))?;
        text.parse::<f32>()
            .map_err(|_| PathDataError::MalformedNumber(start))
    }

    fn pair(&mut self) -> PathDataResult<(f32, f32)> {
        Ok((self.number()?, self.number()?))
    }
}

/// Parse SVG-style path data into a filled outline path.
///
/// Supports the commands that occur in font outlines: `M L H V C S Q T Z`
/// in absolute and relative forms, with implicit command repetition per the
/// SVG grammar (coordinates after a completed `M` continue as `L`).
///
/// Returns [`PathDataError::Degenerate`] for empty data or data that builds
/// no drawable geometry; the caller maps that to the empty-shape sentinel.
pub fn parse_path_data(data: &str) -> PathDataResult<Path> {
    if data.trim().is_empty() {
        return Err(PathDataError::Degenerate);
    }

    let mut tok = Tokenizer::new(data);
    let mut builder = PathBuilder::new();

    // Current point, subpath start, and the previous control point needed
    // for the smooth (S/T) reflections.
    let mut cur = (0.0f32, 0.0f32);
    let mut subpath_start = (0.0f32, 0.0f32);
    let mut prev_cubic_ctrl: Option<(f32, f32)> = None;
    let mut prev_quad_ctrl: Option<(f32, f32)> = None;
    let mut open = false;

    let mut cmd = match tok.next_command() {
        Some(c @ ('M' | 'm')) => c,
        Some(_) | None => return Err(PathDataError::MissingMoveTo),
    };

    loop {
        let relative = cmd.is_ascii_lowercase();
        let rel = |v: (f32, f32), cur: (f32, f32)| {
            if relative {
                (cur.0 + v.0, cur.1 + v.1)
            } else {
                v
            }
        };

        match cmd.to_ascii_uppercase() {
            'M' => {
                let p = rel(tok.pair()?, cur);
                builder.move_to(p.0, p.1);
                cur = p;
                subpath_start = p;
                open = true;
                prev_cubic_ctrl = None;
                prev_quad_ctrl = None;
                // Implicit coordinates after a moveto continue as lineto.
                cmd = if relative { 'l' } else { 'L' };
                if tok.number_follows() {
                    continue;
                }
            },
            'L' => {
                let p = rel(tok.pair()?, cur);
                builder.line_to(p.0, p.1);
                cur = p;
                prev_cubic_ctrl = None;
                prev_quad_ctrl = None;
            },
            'H' => {
                let x = tok.number()?;
                let x = if relative { cur.0 + x } else { x };
                builder.line_to(x, cur.1);
                cur.0 = x;
                prev_cubic_ctrl = None;
                prev_quad_ctrl = None;
            },
            'V' => {
                let y = tok.number()?;
                let y = if relative { cur.1 + y } else { y };
                builder.line_to(cur.0, y);
                cur.1 = y;
                prev_cubic_ctrl = None;
                prev_quad_ctrl = None;
            },
            'C' => {
                let c1 = rel(tok.pair()?, cur);
                let c2 = rel(tok.pair()?, cur);
                let p = rel(tok.pair()?, cur);
                builder.cubic_to(c1.0, c1.1, c2.0, c2.1, p.0, p.1);
                cur = p;
                prev_cubic_ctrl = Some(c2);
                prev_quad_ctrl = None;
            },
            'S' => {
                let c1 = match prev_cubic_ctrl {
                    Some((cx, cy)) => (2.0 * cur.0 - cx, 2.0 * cur.1 - cy),
                    None => cur,
                };
                let c2 = rel(tok.pair()?, cur);
                let p = rel(tok.pair()?, cur);
                builder.cubic_to(c1.0, c1.1, c2.0, c2.1, p.0, p.1);
                cur = p;
                prev_cubic_ctrl = Some(c2);
                prev_quad_ctrl = None;
            },
            'Q' => {
                let c = rel(tok.pair()?, cur);
                let p = rel(tok.pair()?, cur);
                builder.quad_to(c.0, c.1, p.0, p.1);
                cur = p;
                prev_quad_ctrl = Some(c);
                prev_cubic_ctrl = None;
            },
            'T' => {
                let c = match prev_quad_ctrl {
                    Some((cx, cy)) => (2.0 * cur.0 - cx, 2.0 * cur.1 - cy),
                    None => cur,
                };
                let p = rel(tok.pair()?, cur);
                builder.quad_to(c.0, c.1, p.0, p.1);
                cur = p;
                prev_quad_ctrl = Some(c);
                prev_cubic_ctrl = None;
            },
            'Z' => {
                if open {
                    builder.close();
                    open = false;
                }
                cur = subpath_start;
                prev_cubic_ctrl = None;
                prev_quad_ctrl = None;
            },
            other => return Err(PathDataError::UnsupportedCommand(other)),
        }

        if tok.at_end() {
            break;
        }
        if tok.number_follows() {
            // Implicit repetition of the current command.
            continue;
        }
        cmd = match tok.next_command() {
            Some(c) => c,
            None => break,
        };
    }

    builder.finish().ok_or(PathDataError::Degenerate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_triangle() {
        let path = parse_path_data("M 0 0 L 10 0 L 5 10 Z").unwrap();
        let b = path.bounds();
        assert_eq!(b.width(), 10.0);
        assert_eq!(b.height(), 10.0);
    }

    #[test]
    fn test_relative_commands() {
        let path = parse_path_data("m 10 10 l 20 0 l 0 20 z").unwrap();
        let b = path.bounds();
        assert_eq!(b.left(), 10.0);
        assert_eq!(b.right(), 30.0);
        assert_eq!(b.bottom(), 30.0);
    }

    #[test]
    fn test_implicit_lineto_after_moveto() {
        // Per SVG grammar the pairs after the first M pair are linetos.
        let path = parse_path_data("M 0 0 10 0 10 10 Z").unwrap();
        assert_eq!(path.bounds().width(), 10.0);
    }

    #[test]
    fn test_horizontal_vertical() {
        let path = parse_path_data("M 0 0 H 40 V 20 H 0 Z").unwrap();
        let b = path.bounds();
        assert_eq!(b.width(), 40.0);
        assert_eq!(b.height(), 20.0);
    }

    #[test]
    fn test_cubic_and_quad() {
        let path = parse_path_data("M 0 0 C 0 10 10 10 10 0 Q 15 -5 20 0 Z").unwrap();
        assert!(path.bounds().width() >= 20.0);
    }

    #[test]
    fn test_comma_and_negative_numbers() {
        let path = parse_path_data("M10,-10L-10,10Z");
        assert!(path.is_ok());
    }

    #[test]
    fn test_empty_data_is_degenerate() {
        assert!(matches!(
            parse_path_data(""),
            Err(PathDataError::Degenerate)
        ));
        assert!(matches!(
            parse_path_data("   "),
            Err(PathDataError::Degenerate)
        ));
    }

    #[test]
    fn test_missing_moveto_rejected() {
        assert!(matches!(
            parse_path_data("L 10 10"),
            Err(PathDataError::MissingMoveTo)
        ));
    }

    #[test]
    fn test_arc_command_rejected() {
        assert!(matches!(
            parse_path_data("M 0 0 A 5 5 0 0 1 10 10"),
            Err(PathDataError::UnsupportedCommand('A'))
        ));
    }

    #[test]
    fn test_malformed_number_rejected() {
        assert!(matches!(
            parse_path_data("M 0 x"),
            Err(PathDataError::MalformedNumber(_))
        ));
    }
}
