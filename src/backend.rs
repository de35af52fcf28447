use crate::error::Result;
use crate::font::FontHandle;
use crate::image::ImageData;
use crate::paint::TilingPattern;
use crate::path::Path;
use crate::shading::ShadingSpec;
use crate::text::TextRun;
use crate::types::{Color, ColorSpace, FillRule, Rect, Stroke, Transform};

/// Which of the two current paints an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaintRole {
    Fill,
    Stroke,
}

/// Painting operator ending a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintOp {
    Fill(FillRule),
    Stroke,
    FillStroke(FillRule),
}

/// Restrictions imposed by the output profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Conformance {
    pub forbid_mixed_color_spaces: bool,
    pub forbid_transparency: bool,
}

/// A finished tile surface: operators plus the inline resource dictionary.
#[derive(Debug, Clone, PartialEq)]
pub struct TileContent {
    pub content: String,
    pub resources: String,
}

/// Name of a registered image, whether it carries a soft mask and the
/// color-space family of its samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub name: String,
    pub has_alpha: bool,
    pub space: ColorSpace,
}

/// Operations a graphics-state tracker needs from an output surface.
///
/// Methods that only append operators cannot fail; anything that touches
/// shared resources or profile rules returns a `Result`.
pub trait PaintTarget {
    fn conformance(&self) -> Conformance;

    /// Transform from the current surface's user-independent base space to
    /// its default space.
    fn base_transform(&self) -> Transform;

    /// Bounds of the current surface in base space.
    fn surface_bounds(&self) -> Rect;

    /// Samples per base unit used by the raster fallback.
    fn raster_scale(&self) -> f64;

    fn save(&mut self);
    fn restore(&mut self);
    fn concat(&mut self, transform: &Transform);
    fn append_path(&mut self, path: &Path) -> usize;
    fn append_rect(&mut self, rect: &Rect);
    fn clip(&mut self, rule: FillRule);
    fn paint(&mut self, op: PaintOp);

    /// Records `space` as used by the current page.
    fn use_color_space(&mut self, space: ColorSpace) -> Result<()>;
    fn set_color(&mut self, role: PaintRole, color: &Color);
    fn select_pattern(&mut self, role: PaintRole, name: &str);
    fn set_alpha(&mut self, fill: u8, stroke: u8);
    fn set_stroke_style(&mut self, stroke: &Stroke, previous: Option<&Stroke>);

    /// Registers a shading pattern and returns its resource name.
    fn shading_pattern(&mut self, spec: &ShadingSpec) -> String;

    /// Starts a nested surface for a pattern tile covering `bounds`.
    fn begin_tile(&mut self, bounds: Rect);

    /// Ends the innermost tile surface.
    fn end_tile(&mut self) -> Result<TileContent>;

    fn tiling_pattern(
        &mut self,
        tile: TileContent,
        pattern: &TilingPattern,
        matrix: &Transform,
    ) -> String;

    /// Returns the image XObject registered under `key`, producing it on a miss.
    fn image(
        &mut self,
        key: &str,
        produce: &mut dyn FnMut() -> Result<ImageData>,
    ) -> Result<ImageRef>;
    fn draw_xobject(&mut self, name: &str);

    fn select_font(&mut self, font: FontHandle, size: f64) -> Result<()>;
    fn show_text(&mut self, run: &TextRun);
}
