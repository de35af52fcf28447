use crate::backend::{Conformance, ImageRef, PaintOp, PaintRole, PaintTarget, TileContent};
use crate::content::ContentStream;
use crate::error::{PdfPaintError, Result};
use crate::font::{FontCatalog, FontHandle};
use crate::image::ImageData;
use crate::paint::TilingPattern;
use crate::path::{Path, emit_path};
use crate::registry::{PdfWriter, ResourceKind, ResourceRegistry, UsedResources};
use crate::shading::ShadingSpec;
use crate::text::{TextRun, tj_array};
use crate::types::{Color, ColorSpace, FillRule, Rect, Stroke, Transform};
use std::collections::BTreeSet;
use std::io::Write;

/// One content stream being written: the page itself or a pattern tile.
#[derive(Debug)]
pub(crate) struct Surface {
    content: ContentStream,
    resources: UsedResources,
    base: Transform,
    bounds: Rect,
    font: Option<(FontHandle, f64)>,
}

impl Surface {
    fn new(base: Transform, bounds: Rect) -> Self {
        Self {
            content: ContentStream::new(),
            resources: UsedResources::default(),
            base,
            bounds,
            font: None,
        }
    }
}

/// Per-page output state shared by every draw call on the page.
#[derive(Debug)]
pub(crate) struct PageState {
    page: Surface,
    tiles: Vec<Surface>,
    color_spaces: BTreeSet<ColorSpace>,
    raster_scale: f64,
}

impl PageState {
    pub(crate) fn new(base: Transform, bounds: Rect, raster_scale: f64) -> Self {
        Self {
            page: Surface::new(base, bounds),
            tiles: Vec::new(),
            color_spaces: BTreeSet::new(),
            raster_scale,
        }
    }

    fn surface(&mut self) -> &mut Surface {
        match self.tiles.last_mut() {
            Some(tile) => tile,
            None => &mut self.page,
        }
    }

    fn surface_ref(&self) -> &Surface {
        self.tiles.last().unwrap_or(&self.page)
    }

    /// Operators written to the page so far.
    #[cfg(test)]
    pub(crate) fn content(&self) -> &ContentStream {
        &self.page.content
    }

    pub(crate) fn content_mut(&mut self) -> &mut ContentStream {
        &mut self.page.content
    }

    #[cfg(test)]
    pub(crate) fn color_spaces(&self) -> &BTreeSet<ColorSpace> {
        &self.color_spaces
    }

    pub(crate) fn resource_count(&self, kind: ResourceKind) -> usize {
        self.page.resources.count(kind)
    }

    /// Entries across all resource categories of the page.
    pub(crate) fn resource_refs(&self) -> usize {
        [
            ResourceKind::Font,
            ResourceKind::XObject,
            ResourceKind::Pattern,
            ResourceKind::ExtGState,
        ]
        .into_iter()
        .map(|kind| self.resource_count(kind))
        .sum()
    }

    /// Content stream text and inline resource dictionary of the page.
    pub(crate) fn into_parts(self) -> (String, String) {
        let resources = self.page.resources.to_dict();
        (self.page.content.into_string(), resources)
    }
}

/// The PDF implementation of [`PaintTarget`], borrowed for one draw call.
pub(crate) struct PdfTarget<'p, 'a, W: Write> {
    writer: &'p mut PdfWriter<'a, W>,
    registry: &'p mut ResourceRegistry,
    fonts: &'p FontCatalog,
    conformance: Conformance,
    page: &'p mut PageState,
}

impl<'p, 'a, W: Write> PdfTarget<'p, 'a, W> {
    pub(crate) fn new(
        writer: &'p mut PdfWriter<'a, W>,
        registry: &'p mut ResourceRegistry,
        fonts: &'p FontCatalog,
        conformance: Conformance,
        page: &'p mut PageState,
    ) -> Self {
        Self {
            writer,
            registry,
            fonts,
            conformance,
            page,
        }
    }

    fn out(&mut self) -> &mut ContentStream {
        &mut self.page.surface().content
    }

    fn use_resource(&mut self, kind: ResourceKind, name: &str, id: usize) {
        self.page.surface().resources.add(kind, name, id);
    }
}

impl<W: Write> PaintTarget for PdfTarget<'_, '_, W> {
    fn conformance(&self) -> Conformance {
        self.conformance
    }

    fn base_transform(&self) -> Transform {
        self.page.surface_ref().base
    }

    fn surface_bounds(&self) -> Rect {
        self.page.surface_ref().bounds
    }

    fn raster_scale(&self) -> f64 {
        self.page.raster_scale
    }

    fn save(&mut self) {
        self.out().save();
    }

    fn restore(&mut self) {
        self.out().restore();
    }

    fn concat(&mut self, transform: &Transform) {
        self.out().concat(transform);
    }

    fn append_path(&mut self, path: &Path) -> usize {
        emit_path(self.out(), path.segments().iter().copied())
    }

    fn append_rect(&mut self, rect: &Rect) {
        self.out().rect(rect);
    }

    fn clip(&mut self, rule: FillRule) {
        self.out().clip(rule);
    }

    fn paint(&mut self, op: PaintOp) {
        let out = self.out();
        match op {
            PaintOp::Fill(rule) => out.fill(rule),
            PaintOp::Stroke => out.stroke(),
            PaintOp::FillStroke(rule) => out.fill_stroke(rule),
        }
    }

    fn use_color_space(&mut self, space: ColorSpace) -> Result<()> {
        let spaces = &mut self.page.color_spaces;
        if self.conformance.forbid_mixed_color_spaces
            && !spaces.is_empty()
            && !spaces.contains(&space)
        {
            return Err(PdfPaintError::ConformanceViolation(format!(
                "{space:?} color on a page already using {:?}",
                spaces.iter().collect::<Vec<_>>()
            )));
        }
        spaces.insert(space);
        Ok(())
    }

    fn set_color(&mut self, role: PaintRole, color: &Color) {
        match role {
            PaintRole::Fill => self.out().fill_color(color),
            PaintRole::Stroke => self.out().stroke_color(color),
        }
    }

    fn select_pattern(&mut self, role: PaintRole, name: &str) {
        match role {
            PaintRole::Fill => self.out().fill_pattern(name),
            PaintRole::Stroke => self.out().stroke_pattern(name),
        }
    }

    fn set_alpha(&mut self, fill: u8, stroke: u8) {
        let (name, id) = self.registry.ext_gstate(self.writer, fill, stroke);
        self.use_resource(ResourceKind::ExtGState, &name, id);
        self.out().ext_gstate(&name);
    }

    fn set_stroke_style(&mut self, stroke: &Stroke, previous: Option<&Stroke>) {
        self.out().stroke_style(stroke, previous);
    }

    fn shading_pattern(&mut self, spec: &ShadingSpec) -> String {
        let (name, id) = self.registry.shading_pattern(self.writer, spec);
        self.use_resource(ResourceKind::Pattern, &name, id);
        name
    }

    fn begin_tile(&mut self, bounds: Rect) {
        self.page
            .tiles
            .push(Surface::new(Transform::IDENTITY, bounds));
    }

    fn end_tile(&mut self) -> Result<TileContent> {
        let tile = self.page.tiles.pop().ok_or_else(|| {
            PdfPaintError::InvalidConfiguration("no tile surface is open".to_string())
        })?;
        Ok(TileContent {
            resources: tile.resources.to_dict(),
            content: tile.content.into_string(),
        })
    }

    fn tiling_pattern(
        &mut self,
        tile: TileContent,
        pattern: &TilingPattern,
        matrix: &Transform,
    ) -> String {
        let (name, id) = self.registry.tiling_pattern(
            self.writer,
            &tile.content,
            &tile.resources,
            &pattern.tile,
            matrix,
        );
        self.use_resource(ResourceKind::Pattern, &name, id);
        name
    }

    fn image(
        &mut self,
        key: &str,
        produce: &mut dyn FnMut() -> Result<ImageData>,
    ) -> Result<ImageRef> {
        let entry = self.registry.image(self.writer, key, produce)?;
        self.use_resource(ResourceKind::XObject, &entry.name, entry.id);
        Ok(ImageRef {
            name: entry.name,
            has_alpha: entry.has_alpha,
            space: entry.space,
        })
    }

    fn draw_xobject(&mut self, name: &str) {
        self.out().xobject(name);
    }

    fn select_font(&mut self, font: FontHandle, size: f64) -> Result<()> {
        let (name, id) = self.registry.font(self.writer, self.fonts, font)?;
        self.use_resource(ResourceKind::Font, &name, id);
        let surface = self.page.surface();
        if surface.font != Some((font, size)) {
            log::debug!("selecting font {} at {}", name, size);
            surface.content.font(&name, size);
            surface.font = Some((font, size));
        }
        Ok(())
    }

    fn show_text(&mut self, run: &TextRun) {
        let multibyte = self.fonts.is_multibyte(run.font);
        self.registry.record_glyphs(run.font, &run.glyphs);
        let matrix = run.text_matrix();
        let out = self.out();
        out.begin_text();
        out.text_matrix(&matrix);
        out.raw(&tj_array(run, multibyte));
        out.raw(" TJ\n");
        out.end_text();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Point;

    struct Fixture {
        out: Vec<u8>,
        registry: ResourceRegistry,
        fonts: FontCatalog,
        page: PageState,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                out: Vec::new(),
                registry: ResourceRegistry::new(true),
                fonts: FontCatalog::new(),
                page: PageState::new(Transform::IDENTITY, Rect::new(0.0, 0.0, 100.0, 100.0), 1.0),
            }
        }
    }

    #[test]
    fn mixed_color_spaces_are_rejected_when_forbidden() {
        let mut fx = Fixture::new();
        let mut writer = PdfWriter::new(&mut fx.out).expect("writer");
        let conformance = Conformance {
            forbid_mixed_color_spaces: true,
            forbid_transparency: false,
        };
        let mut target = PdfTarget::new(
            &mut writer,
            &mut fx.registry,
            &fx.fonts,
            conformance,
            &mut fx.page,
        );
        target.use_color_space(ColorSpace::Rgb).expect("first space");
        target.use_color_space(ColorSpace::Rgb).expect("same space");
        let err = target.use_color_space(ColorSpace::Cmyk).expect_err("mixed");
        assert!(matches!(err, PdfPaintError::ConformanceViolation(_)));
        assert_eq!(fx.page.color_spaces().len(), 1);
    }

    #[test]
    fn font_is_selected_once_per_surface() {
        let mut fx = Fixture::new();
        let font = fx.fonts.base14("Helvetica").expect("font");
        let mut writer = PdfWriter::new(&mut fx.out).expect("writer");
        let mut target = PdfTarget::new(
            &mut writer,
            &mut fx.registry,
            &fx.fonts,
            Conformance::default(),
            &mut fx.page,
        );
        target.select_font(font, 12.0).expect("font");
        target.select_font(font, 12.0).expect("font");
        target.begin_tile(Rect::new(0.0, 0.0, 10.0, 10.0));
        target.select_font(font, 12.0).expect("font");
        let tile = target.end_tile().expect("tile");
        target.select_font(font, 14.0).expect("font");
        assert_eq!(tile.content, "/F1 12 Tf\n");
        assert!(tile.resources.contains("/Font << /F1"));
        assert_eq!(fx.page.content().as_str(), "/F1 12 Tf\n/F1 14 Tf\n");
    }

    #[test]
    fn show_text_wraps_run_in_text_object() {
        let mut fx = Fixture::new();
        let font = fx.fonts.base14("Courier").expect("font");
        let run = TextRun::from_text(&fx.fonts, font, 10.0, Point::new(5.0, 7.0), "a(b")
            .expect("run");
        let mut writer = PdfWriter::new(&mut fx.out).expect("writer");
        let mut target = PdfTarget::new(
            &mut writer,
            &mut fx.registry,
            &fx.fonts,
            Conformance::default(),
            &mut fx.page,
        );
        target.select_font(font, 10.0).expect("font");
        target.show_text(&run);
        assert!(
            fx.page
                .content()
                .as_str()
                .ends_with("BT\n1 0 0 -1 5 7 Tm\n[(a\\(b)] TJ\nET\n")
        );
    }

    #[test]
    fn end_tile_without_begin_is_an_error() {
        let mut fx = Fixture::new();
        let mut writer = PdfWriter::new(&mut fx.out).expect("writer");
        let mut target = PdfTarget::new(
            &mut writer,
            &mut fx.registry,
            &fx.fonts,
            Conformance::default(),
            &mut fx.page,
        );
        assert!(target.end_tile().is_err());
    }
}
