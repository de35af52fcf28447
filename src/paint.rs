use crate::error::{PdfPaintError, Result};
use crate::path::Path;
use crate::shading::{ShadingGeometry, ShadingSpec};
use crate::text::TextRun;
use crate::types::{Color, Point, Rect, Stroke, Transform};
use std::fmt;
use std::sync::Arc;

/// Focus points are kept at most this fraction of the radius from the center.
const FOCUS_LIMIT: f64 = 0.9999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CycleMethod {
    #[default]
    NoCycle,
    Reflect,
    Repeat,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStop {
    pub offset: f64,
    pub color: Color,
}

impl GradientStop {
    pub fn new(offset: f64, color: Color) -> Self {
        Self { offset, color }
    }
}

fn validate_stops(stops: &[GradientStop]) -> Result<()> {
    if stops.len() < 2 {
        return Err(PdfPaintError::InvalidPaint(format!(
            "gradient needs at least two stops, got {}",
            stops.len()
        )));
    }
    for stop in stops {
        if !stop.offset.is_finite() || !(0.0..=1.0).contains(&stop.offset) {
            return Err(PdfPaintError::InvalidPaint(format!(
                "stop offset {} outside 0..=1",
                stop.offset
            )));
        }
    }
    if stops.windows(2).any(|w| w[1].offset < w[0].offset) {
        return Err(PdfPaintError::InvalidPaint(
            "stop offsets must be non-decreasing".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearGradient {
    pub(crate) start: Point,
    pub(crate) end: Point,
    pub(crate) stops: Vec<GradientStop>,
    pub(crate) cycle: CycleMethod,
    pub(crate) transform: Transform,
}

impl LinearGradient {
    pub fn new(
        start: Point,
        end: Point,
        stops: Vec<GradientStop>,
        cycle: CycleMethod,
    ) -> Result<Self> {
        validate_stops(&stops)?;
        Ok(Self {
            start,
            end,
            stops,
            cycle,
            transform: Transform::IDENTITY,
        })
    }

    /// Two-color gradient between two points; `cyclic` repeats the ramp.
    pub fn two_color(start: Point, from: Color, end: Point, to: Color, cyclic: bool) -> Self {
        Self {
            start,
            end,
            stops: vec![GradientStop::new(0.0, from), GradientStop::new(1.0, to)],
            cycle: if cyclic {
                CycleMethod::Repeat
            } else {
                CycleMethod::NoCycle
            },
            transform: Transform::IDENTITY,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn stops(&self) -> &[GradientStop] {
        &self.stops
    }

    pub fn cycle(&self) -> CycleMethod {
        self.cycle
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RadialGradient {
    pub(crate) center: Point,
    pub(crate) radius: f64,
    pub(crate) focus: Point,
    pub(crate) stops: Vec<GradientStop>,
    pub(crate) cycle: CycleMethod,
    pub(crate) transform: Transform,
}

impl RadialGradient {
    pub fn new(
        center: Point,
        radius: f64,
        focus: Point,
        stops: Vec<GradientStop>,
        cycle: CycleMethod,
    ) -> Result<Self> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(PdfPaintError::InvalidPaint(format!(
                "radial gradient radius must be positive, got {radius}"
            )));
        }
        validate_stops(&stops)?;
        Ok(Self {
            center,
            radius,
            focus,
            stops,
            cycle,
            transform: Transform::IDENTITY,
        })
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn stops(&self) -> &[GradientStop] {
        &self.stops
    }
}

/// One drawing step inside a tiling pattern cell.
#[derive(Debug, Clone, PartialEq)]
pub enum TileOp {
    SetPaint(Paint),
    SetStroke(Stroke),
    Concat(Transform),
    Fill(Path),
    Stroke(Path),
    Text(TextRun),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TilingPattern {
    pub(crate) tile: Rect,
    pub(crate) transform: Transform,
    pub(crate) ops: Arc<[TileOp]>,
}

impl TilingPattern {
    pub fn new(tile: Rect, ops: Vec<TileOp>) -> Result<Self> {
        if tile.is_empty() || !tile.width.is_finite() || !tile.height.is_finite() {
            return Err(PdfPaintError::InvalidPaint(format!(
                "pattern tile must have a positive size, got {}x{}",
                tile.width, tile.height
            )));
        }
        Ok(Self {
            tile,
            transform: Transform::IDENTITY,
            ops: ops.into(),
        })
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn tile(&self) -> Rect {
        self.tile
    }
}

/// A paint PDF cannot express; it is sampled into an image.
pub trait PaintSource: fmt::Debug {
    /// Color at a point in user space.
    fn sample(&self, x: f64, y: f64) -> Color;

    /// Stable identity; equal keys must sample identically.
    fn cache_key(&self) -> u64;
}

#[derive(Debug, Clone)]
pub enum Paint {
    Solid(Color),
    Linear(LinearGradient),
    Radial(RadialGradient),
    Pattern(TilingPattern),
    Procedural(Arc<dyn PaintSource>),
}

impl PartialEq for Paint {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Paint::Solid(a), Paint::Solid(b)) => a == b,
            (Paint::Linear(a), Paint::Linear(b)) => a == b,
            (Paint::Radial(a), Paint::Radial(b)) => a == b,
            (Paint::Pattern(a), Paint::Pattern(b)) => a == b,
            (Paint::Procedural(a), Paint::Procedural(b)) => {
                Arc::ptr_eq(a, b) || a.cache_key() == b.cache_key()
            }
            _ => false,
        }
    }
}

impl From<Color> for Paint {
    fn from(color: Color) -> Self {
        Paint::Solid(color)
    }
}

impl From<LinearGradient> for Paint {
    fn from(gradient: LinearGradient) -> Self {
        Paint::Linear(gradient)
    }
}

impl From<RadialGradient> for Paint {
    fn from(gradient: RadialGradient) -> Self {
        Paint::Radial(gradient)
    }
}

impl From<TilingPattern> for Paint {
    fn from(pattern: TilingPattern) -> Self {
        Paint::Pattern(pattern)
    }
}

impl Default for Paint {
    fn default() -> Self {
        Paint::Solid(Color::BLACK)
    }
}

impl Paint {
    pub(crate) fn is_invisible(&self) -> bool {
        matches!(self, Paint::Solid(color) if color.alpha() == 0)
    }

    /// Solid color standing in for this paint where only a color can be used.
    pub(crate) fn representative_color(&self) -> Color {
        match self {
            Paint::Solid(color) => *color,
            Paint::Linear(g) => g.stops.first().map(|s| s.color).unwrap_or(Color::BLACK),
            Paint::Radial(g) => g.stops.first().map(|s| s.color).unwrap_or(Color::BLACK),
            Paint::Pattern(_) | Paint::Procedural(_) => Color::BLACK,
        }
    }

    /// Text identifying the paint for resource caching.
    pub(crate) fn fingerprint(&self) -> String {
        match self {
            Paint::Procedural(source) => format!("procedural:{:016x}", source.cache_key()),
            other => format!("{other:?}"),
        }
    }
}

/// How a paint will be realized in the content stream.
#[derive(Debug)]
pub(crate) enum Resolution<'p> {
    Solid(Color),
    Shading(ShadingSpec),
    Tiling(&'p TilingPattern),
    Unsupported,
}

/// Maps `paint` onto a native construct, or reports that it must be sampled.
///
/// `base_to_user` maps user space to the page's default space; shading
/// matrices are anchored there.
pub(crate) fn resolve<'p>(paint: &'p Paint, base_to_user: &Transform) -> Resolution<'p> {
    match paint {
        Paint::Solid(color) => Resolution::Solid(*color),
        Paint::Linear(g) => {
            if g.cycle != CycleMethod::NoCycle || !all_opaque(&g.stops) {
                return Resolution::Unsupported;
            }
            let geometry = ShadingGeometry::Axial {
                start: g.start,
                end: g.end,
            };
            Resolution::Shading(ShadingSpec::new(
                geometry,
                &g.stops,
                base_to_user.then(&g.transform),
            ))
        }
        Paint::Radial(g) => {
            if g.cycle != CycleMethod::NoCycle || !all_opaque(&g.stops) {
                return Resolution::Unsupported;
            }
            let geometry = ShadingGeometry::Radial {
                focus: clamp_focus(g.center, g.radius, g.focus),
                center: g.center,
                radius: g.radius,
            };
            Resolution::Shading(ShadingSpec::new(
                geometry,
                &g.stops,
                base_to_user.then(&g.transform),
            ))
        }
        Paint::Pattern(pattern) => Resolution::Tiling(pattern),
        Paint::Procedural(_) => Resolution::Unsupported,
    }
}

fn all_opaque(stops: &[GradientStop]) -> bool {
    stops.iter().all(|s| s.color.is_opaque())
}

/// Pulls a focus lying on or outside the circle back inside it.
pub(crate) fn clamp_focus(center: Point, radius: f64, focus: Point) -> Point {
    let dist = center.distance(focus);
    let limit = radius * FOCUS_LIMIT;
    if dist <= limit {
        return focus;
    }
    let scale = limit / dist;
    Point::new(
        center.x + (focus.x - center.x) * scale,
        center.y + (focus.y - center.y) * scale,
    )
}
