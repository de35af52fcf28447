use crate::content::{fmt, fmt_matrix};
use crate::error::{PdfPaintError, Result};
use crate::image::hex;
use crate::paint::{CycleMethod, GradientStop, Paint};
use crate::path::{Path, Segment};
use crate::registry::content_key;
use crate::types::{LineCap, LineJoin, Point, Rect, Stroke, Transform};
use tiny_skia::{PathBuilder, Pixmap, Shader, SpreadMode, StrokeDash};

/// Upper bound on samples in one fallback image.
const MAX_SAMPLES: u64 = 4096 * 4096;

/// Whole-sample grid covering the painted area, in base space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SampleGrid {
    pub(crate) rect: Rect,
    pub(crate) cols: u32,
    pub(crate) rows: u32,
}

impl SampleGrid {
    /// Transform from base space to sample (pixel) space.
    fn to_pixels(&self) -> Transform {
        let sx = self.cols as f64 / self.rect.width;
        let sy = self.rows as f64 / self.rect.height;
        Transform::new(sx, 0.0, 0.0, sy, -self.rect.x * sx, -self.rect.y * sy)
    }

    /// Places the unit image square over `rect` in a y-down space.
    pub(crate) fn image_matrix(&self) -> Transform {
        Transform::new(
            self.rect.width,
            0.0,
            0.0,
            -self.rect.height,
            self.rect.x,
            self.rect.bottom(),
        )
    }
}

/// Snaps `bounds ∩ clip ∩ surface` outward to whole samples at `scale`
/// samples per base unit. `None` when nothing would be visible.
pub(crate) fn sample_grid(
    bounds: Rect,
    clip: Option<Rect>,
    surface: Rect,
    scale: f64,
) -> Option<SampleGrid> {
    let mut area = bounds.intersect(&surface)?;
    if let Some(clip) = clip {
        area = area.intersect(&clip)?;
    }
    let mut scale = scale;
    loop {
        let x0 = (area.x * scale).floor();
        let y0 = (area.y * scale).floor();
        let x1 = (area.right() * scale).ceil();
        let y1 = (area.bottom() * scale).ceil();
        let cols = (x1 - x0).max(1.0);
        let rows = (y1 - y0).max(1.0);
        if (cols as u64).saturating_mul(rows as u64) > MAX_SAMPLES {
            scale *= 0.5;
            continue;
        }
        return Some(SampleGrid {
            rect: Rect::from_extents(x0 / scale, y0 / scale, (x0 + cols) / scale, (y0 + rows) / scale),
            cols: cols as u32,
            rows: rows as u32,
        });
    }
}

/// Identity of a fallback image: same paint, placement and grid sample the same.
pub(crate) fn cache_key(paint: &Paint, user: &Transform, grid: &SampleGrid) -> String {
    let rect = format!(
        "{} {} {} {} {}x{}",
        fmt(grid.rect.x),
        fmt(grid.rect.y),
        fmt(grid.rect.width),
        fmt(grid.rect.height),
        grid.cols,
        grid.rows
    );
    let key = content_key(&[
        paint.fingerprint().as_bytes(),
        fmt_matrix(user).as_bytes(),
        rect.as_bytes(),
    ]);
    format!("raster:{}", hex(&key))
}

/// Straight RGBA samples of `paint` over `grid`. `user` maps user space to
/// base space.
pub(crate) fn sample_paint(paint: &Paint, user: &Transform, grid: &SampleGrid) -> Result<Vec<u8>> {
    let to_pixels = grid.to_pixels();
    match paint {
        Paint::Procedural(source) => {
            let inverse = to_pixels.then(user).invert().ok_or_else(|| {
                PdfPaintError::InvalidPaint("user transform is not invertible".to_string())
            })?;
            let mut out = Vec::with_capacity(grid.cols as usize * grid.rows as usize * 4);
            for row in 0..grid.rows {
                for col in 0..grid.cols {
                    let p = inverse.apply(Point::new(col as f64 + 0.5, row as f64 + 0.5));
                    out.extend_from_slice(&source.sample(p.x, p.y).to_rgba8());
                }
            }
            Ok(out)
        }
        _ => {
            let mut pixmap = Pixmap::new(grid.cols, grid.rows).ok_or_else(|| {
                PdfPaintError::InvalidConfiguration(format!(
                    "cannot allocate {}x{} raster",
                    grid.cols, grid.rows
                ))
            })?;
            let shader = build_shader(paint, &to_pixels.then(user)).unwrap_or_else(|| {
                let [r, g, b, a] = paint.representative_color().to_rgba8();
                Shader::SolidColor(tiny_skia::Color::from_rgba8(r, g, b, a))
            });
            let mut sk_paint = tiny_skia::Paint::default();
            sk_paint.shader = shader;
            sk_paint.anti_alias = false;
            if let Some(full) = tiny_skia::Rect::from_xywh(0.0, 0.0, grid.cols as f32, grid.rows as f32) {
                pixmap.fill_rect(full, &sk_paint, tiny_skia::Transform::identity(), None);
            }
            let mut out = Vec::with_capacity(pixmap.data().len());
            for px in pixmap.pixels() {
                let c = px.demultiply();
                out.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
            }
            Ok(out)
        }
    }
}

fn build_shader(paint: &Paint, to_pixels: &Transform) -> Option<Shader<'static>> {
    match paint {
        Paint::Linear(g) => tiny_skia::LinearGradient::new(
            skia_point(g.start),
            skia_point(g.end),
            skia_stops(&g.stops),
            spread_mode(g.cycle),
            to_pixels.then(&g.transform).to_skia(),
        ),
        Paint::Radial(g) => tiny_skia::RadialGradient::new(
            skia_point(g.focus),
            skia_point(g.center),
            g.radius as f32,
            skia_stops(&g.stops),
            spread_mode(g.cycle),
            to_pixels.then(&g.transform).to_skia(),
        ),
        Paint::Solid(color) => {
            let [r, g, b, a] = color.to_rgba8();
            Some(Shader::SolidColor(tiny_skia::Color::from_rgba8(r, g, b, a)))
        }
        Paint::Pattern(_) | Paint::Procedural(_) => None,
    }
}

fn skia_point(p: Point) -> tiny_skia::Point {
    tiny_skia::Point::from_xy(p.x as f32, p.y as f32)
}

fn skia_stops(stops: &[GradientStop]) -> Vec<tiny_skia::GradientStop> {
    stops
        .iter()
        .map(|stop| {
            let [r, g, b, a] = stop.color.to_rgba8();
            tiny_skia::GradientStop::new(
                stop.offset.clamp(0.0, 1.0) as f32,
                tiny_skia::Color::from_rgba8(r, g, b, a),
            )
        })
        .collect()
}

fn spread_mode(cycle: CycleMethod) -> SpreadMode {
    match cycle {
        CycleMethod::NoCycle => SpreadMode::Pad,
        CycleMethod::Reflect => SpreadMode::Reflect,
        CycleMethod::Repeat => SpreadMode::Repeat,
    }
}

/// Outline of `path` stroked with `stroke`, in the path's own space.
pub(crate) fn stroke_outline(path: &Path, stroke: &Stroke) -> Option<Path> {
    let sk_path = to_skia_path(path)?;
    let outline = sk_path.stroke(&skia_stroke(stroke), 1.0)?;
    let segments = outline
        .segments()
        .map(|seg| match seg {
            tiny_skia::PathSegment::MoveTo(p) => Segment::MoveTo(from_skia(p)),
            tiny_skia::PathSegment::LineTo(p) => Segment::LineTo(from_skia(p)),
            tiny_skia::PathSegment::QuadTo(c, p) => Segment::QuadTo(from_skia(c), from_skia(p)),
            tiny_skia::PathSegment::CubicTo(c1, c2, p) => {
                Segment::CubicTo(from_skia(c1), from_skia(c2), from_skia(p))
            }
            tiny_skia::PathSegment::Close => Segment::Close,
        })
        .collect();
    Some(Path::from_segments(segments, crate::types::FillRule::NonZero))
}

fn from_skia(p: tiny_skia::Point) -> Point {
    Point::new(p.x as f64, p.y as f64)
}

fn to_skia_path(path: &Path) -> Option<tiny_skia::Path> {
    let mut pb = PathBuilder::new();
    let mut has_current = false;
    for seg in path.segments() {
        match *seg {
            Segment::MoveTo(p) => {
                pb.move_to(p.x as f32, p.y as f32);
                has_current = true;
            }
            Segment::LineTo(p) if has_current => pb.line_to(p.x as f32, p.y as f32),
            Segment::CubicTo(c1, c2, p) if has_current => pb.cubic_to(
                c1.x as f32,
                c1.y as f32,
                c2.x as f32,
                c2.y as f32,
                p.x as f32,
                p.y as f32,
            ),
            Segment::QuadTo(c, p) if has_current => {
                pb.quad_to(c.x as f32, c.y as f32, p.x as f32, p.y as f32)
            }
            Segment::LineTo(p) | Segment::CubicTo(_, _, p) | Segment::QuadTo(_, p) => {
                pb.move_to(p.x as f32, p.y as f32);
                has_current = true;
            }
            Segment::Close => {
                if has_current {
                    pb.close();
                }
            }
        }
    }
    pb.finish()
}

fn skia_stroke(stroke: &Stroke) -> tiny_skia::Stroke {
    let mut out = tiny_skia::Stroke {
        width: stroke.width.max(0.0) as f32,
        miter_limit: stroke.miter_limit.max(0.0) as f32,
        ..tiny_skia::Stroke::default()
    };
    out.line_cap = match stroke.cap {
        LineCap::Butt => tiny_skia::LineCap::Butt,
        LineCap::Round => tiny_skia::LineCap::Round,
        LineCap::Square => tiny_skia::LineCap::Square,
    };
    out.line_join = match stroke.join {
        LineJoin::Miter => tiny_skia::LineJoin::Miter,
        LineJoin::Round => tiny_skia::LineJoin::Round,
        LineJoin::Bevel => tiny_skia::LineJoin::Bevel,
    };
    if !stroke.dash.is_empty() {
        let mut pattern: Vec<f32> = stroke.dash.iter().map(|v| v.abs() as f32).collect();
        if pattern.len() % 2 == 1 {
            let copy = pattern.clone();
            pattern.extend(copy);
        }
        out.dash = StrokeDash::new(pattern, stroke.dash_phase as f32);
    }
    out
}
