use crate::types::{Color, FillRule, LineCap, LineJoin, Point, Rect, Stroke, Transform};
use fixed::types::I32F32;
use std::fmt::Write;

/// Fractional digits written for every number in a content stream.
pub(crate) const DECIMALS: u32 = 8;
const SCALE: i128 = 10i128.pow(DECIMALS);

/// Formats a number with [`DECIMALS`] fractional digits, trailing zeros trimmed.
pub(crate) fn fmt(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let fixed = I32F32::saturating_from_num(value);
    let bits = fixed.to_bits() as i128;
    let scaled = bits * SCALE;
    let half = 1i128 << 31;
    let units = if scaled >= 0 {
        (scaled + half) >> 32
    } else {
        -((-scaled + half) >> 32)
    };
    format_scaled(units as i64)
}

fn format_scaled(units: i64) -> String {
    if units == 0 {
        return "0".to_string();
    }
    let sign = if units < 0 { "-" } else { "" };
    let abs = units.unsigned_abs();
    let scale = SCALE as u64;
    let int_part = abs / scale;
    let frac_part = abs % scale;
    if frac_part == 0 {
        return format!("{}{}", sign, int_part);
    }
    let mut s = format!(
        "{}{}.{:0width$}",
        sign,
        int_part,
        frac_part,
        width = DECIMALS as usize
    );
    while s.ends_with('0') {
        s.pop();
    }
    s
}

pub(crate) fn fmt_matrix(t: &Transform) -> String {
    format!(
        "{} {} {} {} {} {}",
        fmt(t.a),
        fmt(t.b),
        fmt(t.c),
        fmt(t.d),
        fmt(t.e),
        fmt(t.f)
    )
}

/// Append-only operator buffer for one page or one pattern tile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentStream {
    buf: String,
}

impl ContentStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub(crate) fn into_string(self) -> String {
        self.buf
    }

    fn line(&mut self, operands: &[f64], op: &str) {
        for value in operands {
            self.buf.push_str(&fmt(*value));
            self.buf.push(' ');
        }
        self.buf.push_str(op);
        self.buf.push('\n');
    }

    pub(crate) fn raw(&mut self, text: &str) {
        self.buf.push_str(text);
    }

    pub(crate) fn save(&mut self) {
        self.buf.push_str("q\n");
    }

    pub(crate) fn restore(&mut self) {
        self.buf.push_str("Q\n");
    }

    pub(crate) fn concat(&mut self, t: &Transform) {
        self.line(&[t.a, t.b, t.c, t.d, t.e, t.f], "cm");
    }

    pub(crate) fn move_to(&mut self, p: Point) {
        self.line(&[p.x, p.y], "m");
    }

    pub(crate) fn line_to(&mut self, p: Point) {
        self.line(&[p.x, p.y], "l");
    }

    pub(crate) fn curve_to(&mut self, c1: Point, c2: Point, p: Point) {
        self.line(&[c1.x, c1.y, c2.x, c2.y, p.x, p.y], "c");
    }

    pub(crate) fn close_path(&mut self) {
        self.buf.push_str("h\n");
    }

    pub(crate) fn rect(&mut self, r: &Rect) {
        self.line(&[r.x, r.y, r.width, r.height], "re");
    }

    pub(crate) fn clip(&mut self, rule: FillRule) {
        match rule {
            FillRule::NonZero => self.buf.push_str("W n\n"),
            FillRule::EvenOdd => self.buf.push_str("W* n\n"),
        }
    }

    pub(crate) fn fill(&mut self, rule: FillRule) {
        match rule {
            FillRule::NonZero => self.buf.push_str("f\n"),
            FillRule::EvenOdd => self.buf.push_str("f*\n"),
        }
    }

    pub(crate) fn stroke(&mut self) {
        self.buf.push_str("S\n");
    }

    pub(crate) fn fill_stroke(&mut self, rule: FillRule) {
        match rule {
            FillRule::NonZero => self.buf.push_str("B\n"),
            FillRule::EvenOdd => self.buf.push_str("B*\n"),
        }
    }

    pub(crate) fn fill_color(&mut self, color: &Color) {
        self.color(color, "rg", "k");
    }

    pub(crate) fn stroke_color(&mut self, color: &Color) {
        self.color(color, "RG", "K");
    }

    fn color(&mut self, color: &Color, rgb_op: &str, cmyk_op: &str) {
        match *color {
            Color::Rgb { r, g, b, .. } => self.line(
                &[r as f64 / 255.0, g as f64 / 255.0, b as f64 / 255.0],
                rgb_op,
            ),
            Color::Cmyk { c, m, y, k, .. } => {
                self.line(&[c as f64, m as f64, y as f64, k as f64], cmyk_op)
            }
        }
    }

    pub(crate) fn fill_pattern(&mut self, name: &str) {
        let _ = writeln!(self.buf, "/Pattern cs /{} scn", name);
    }

    pub(crate) fn stroke_pattern(&mut self, name: &str) {
        let _ = writeln!(self.buf, "/Pattern CS /{} SCN", name);
    }

    pub(crate) fn ext_gstate(&mut self, name: &str) {
        let _ = writeln!(self.buf, "/{} gs", name);
    }

    pub(crate) fn xobject(&mut self, name: &str) {
        let _ = writeln!(self.buf, "/{} Do", name);
    }

    pub(crate) fn dash(&mut self, dash: &[f64], phase: f64) {
        let values = dash.iter().map(|v| fmt(*v)).collect::<Vec<_>>().join(" ");
        let _ = writeln!(self.buf, "[{}] {} d", values, fmt(phase));
    }

    pub(crate) fn line_cap(&mut self, cap: LineCap) {
        let code = match cap {
            LineCap::Butt => 0,
            LineCap::Round => 1,
            LineCap::Square => 2,
        };
        let _ = writeln!(self.buf, "{} J", code);
    }

    pub(crate) fn line_join(&mut self, join: LineJoin) {
        let code = match join {
            LineJoin::Miter => 0,
            LineJoin::Round => 1,
            LineJoin::Bevel => 2,
        };
        let _ = writeln!(self.buf, "{} j", code);
    }

    pub(crate) fn line_width(&mut self, width: f64) {
        self.line(&[width], "w");
    }

    pub(crate) fn miter_limit(&mut self, limit: f64) {
        self.line(&[limit], "M");
    }

    /// Writes the stroke attributes that differ from `previous` (all of them when `None`).
    pub(crate) fn stroke_style(&mut self, stroke: &Stroke, previous: Option<&Stroke>) {
        let dash_changed = previous
            .map(|p| p.dash != stroke.dash || p.dash_phase != stroke.dash_phase)
            .unwrap_or(true);
        if dash_changed {
            self.dash(&stroke.dash, stroke.dash_phase);
        }
        if previous.map(|p| p.cap != stroke.cap).unwrap_or(true) {
            self.line_cap(stroke.cap);
        }
        if previous.map(|p| p.join != stroke.join).unwrap_or(true) {
            self.line_join(stroke.join);
        }
        if previous.map(|p| p.width != stroke.width).unwrap_or(true) {
            self.line_width(stroke.width);
        }
        if previous
            .map(|p| p.miter_limit != stroke.miter_limit)
            .unwrap_or(true)
        {
            self.miter_limit(stroke.miter_limit);
        }
    }

    pub(crate) fn begin_text(&mut self) {
        self.buf.push_str("BT\n");
    }

    pub(crate) fn end_text(&mut self) {
        self.buf.push_str("ET\n");
    }

    pub(crate) fn font(&mut self, name: &str, size: f64) {
        let _ = writeln!(self.buf, "/{} {} Tf", name, fmt(size));
    }

    pub(crate) fn text_matrix(&mut self, t: &Transform) {
        self.line(&[t.a, t.b, t.c, t.d, t.e, t.f], "Tm");
    }
}

/// Counts whole-token occurrences of `op` in operator text.
#[cfg(test)]
pub(crate) fn count_op(content: &str, op: &str) -> usize {
    content
        .lines()
        .filter(|line| line.split_whitespace().any(|token| token == op))
        .count()
}
