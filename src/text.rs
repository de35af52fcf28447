use crate::error::Result;
use crate::font::{FontCatalog, FontHandle};
use crate::types::{Point, Transform};
use std::fmt::Write;

/// One positioned code of a run; `ch` is the text it stands for, if known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Glyph {
    pub code: u16,
    pub ch: Option<char>,
}

impl Glyph {
    pub fn new(code: u16, ch: Option<char>) -> Self {
        Self { code, ch }
    }
}

/// A shaped run of glyphs in a single font and size.
///
/// `kerning[i]` is the adjustment between glyph `i` and `i + 1`, in 1/1000
/// of the font size; positive values move the next glyph left.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub(crate) font: FontHandle,
    pub(crate) size: f64,
    pub(crate) glyphs: Vec<Glyph>,
    pub(crate) kerning: Vec<i32>,
    pub(crate) origin: Point,
    pub(crate) font_transform: Transform,
}

impl TextRun {
    pub fn new(font: FontHandle, size: f64, origin: Point, glyphs: Vec<Glyph>) -> Self {
        let kerning = vec![0; glyphs.len().saturating_sub(1)];
        Self {
            font,
            size,
            glyphs,
            kerning,
            origin,
            font_transform: Transform::IDENTITY,
        }
    }

    /// Encodes `text` with the catalog and applies its pair kerning.
    pub fn from_text(
        catalog: &FontCatalog,
        font: FontHandle,
        size: f64,
        origin: Point,
        text: &str,
    ) -> Result<Self> {
        let glyphs = catalog.encode(font, text)?;
        let kerning = glyphs
            .windows(2)
            .map(|pair| -catalog.kerning(font, pair[0].code, pair[1].code))
            .collect();
        Ok(Self {
            kerning,
            ..Self::new(font, size, origin, glyphs)
        })
    }

    pub fn with_kerning(mut self, mut kerning: Vec<i32>) -> Self {
        kerning.resize(self.glyphs.len().saturating_sub(1), 0);
        self.kerning = kerning;
        self
    }

    pub fn with_font_transform(mut self, transform: Transform) -> Self {
        self.font_transform = transform;
        self
    }

    pub fn font(&self) -> FontHandle {
        self.font
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn glyphs(&self) -> &[Glyph] {
        &self.glyphs
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    /// Text matrix placing the run in a y-down user space.
    pub(crate) fn text_matrix(&self) -> Transform {
        Transform::translate(self.origin.x, self.origin.y)
            .then(&self.font_transform)
            .then(&Transform::scale(1.0, -1.0))
    }
}

/// Operand of the `TJ` operator for `run`, brackets included.
pub(crate) fn tj_array(run: &TextRun, multibyte: bool) -> String {
    let (open, close) = if multibyte { ('<', '>') } else { ('(', ')') };
    let mut out = String::with_capacity(run.glyphs.len() * 4 + 4);
    out.push('[');
    out.push(open);
    for (index, glyph) in run.glyphs.iter().enumerate() {
        if index > 0 {
            let kern = run.kerning.get(index - 1).copied().unwrap_or(0);
            if kern != 0 {
                let _ = write!(out, "{close} {kern} {open}");
            }
        }
        if multibyte {
            let _ = write!(out, "{:04X}", glyph.code);
        } else {
            push_single_byte(&mut out, glyph.code);
        }
    }
    out.push(close);
    out.push(']');
    out
}

fn push_single_byte(out: &mut String, code: u16) {
    let byte = u8::try_from(code).unwrap_or(b'?');
    match byte {
        b'(' | b')' | b'\\' => {
            out.push('\\');
            out.push(byte as char);
        }
        0x20..=0x7e => out.push(byte as char),
        _ => {
            let _ = write!(out, "\\{:03o}", byte);
        }
    }
}
