mod backend;
mod content;
mod debug;
mod document;
mod error;
mod font;
mod graphics;
mod image;
mod metrics;
mod paint;
mod path;
mod raster;
mod registry;
mod shading;
mod target;
mod text;
mod types;

pub use backend::{Conformance, ImageRef, PaintOp, PaintRole, PaintTarget, TileContent};
pub use content::ContentStream;
pub use document::{Document, DocumentOptions, Page, PageSpec, PdfProfile};
pub use error::{PdfPaintError, Result};
pub use font::{FontCatalog, FontHandle};
pub use graphics::Graphics;
pub use crate::image::{ImageData, ImageSource};
pub use metrics::{DocumentMetrics, PageMetrics};
pub use paint::{
    CycleMethod, GradientStop, LinearGradient, Paint, PaintSource, RadialGradient, TileOp,
    TilingPattern,
};
pub use path::{Path, Segment};
pub use registry::ResourceCounts;
pub use shading::ShadingSpec;
pub use text::{Glyph, TextRun};
pub use types::{Color, ColorSpace, FillRule, LineCap, LineJoin, Point, Rect, Size, Stroke, Transform};
