use crate::backend::{Conformance, PaintTarget};
use crate::content::fmt;
use crate::debug::DebugLogger;
use crate::error::{PdfPaintError, Result};
use crate::font::FontCatalog;
use crate::graphics::Graphics;
use crate::image::ImageSource;
use crate::metrics::{DocumentMetrics, PageMetrics};
use crate::paint::Paint;
use crate::path::Path;
use crate::registry::{
    PDF_CATALOG_ID, PDF_PAGE_NODE_MAX_KIDS, PDF_PAGES_ID, PdfWriter, ResourceRegistry,
    pdf_text_string, stream_object,
};
use crate::target::{PageState, PdfTarget};
use crate::text::TextRun;
use crate::types::{Color, Rect, Size, Stroke, Transform};
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

const PRODUCER: &str = "pdfpaint";

/// Output profile; each one implies a set of content restrictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PdfProfile {
    #[default]
    None,
    /// PDF/A-1b: no transparency, one process color space per page.
    PdfA1b,
    /// PDF/X-3: no transparency.
    PdfX3,
}

impl PdfProfile {
    pub fn conformance(self) -> Conformance {
        match self {
            PdfProfile::None => Conformance::default(),
            PdfProfile::PdfA1b => Conformance {
                forbid_mixed_color_spaces: true,
                forbid_transparency: true,
            },
            PdfProfile::PdfX3 => Conformance {
                forbid_mixed_color_spaces: false,
                forbid_transparency: true,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentOptions {
    pub profile: PdfProfile,
    /// Adds to whatever the profile forbids.
    pub forbid_mixed_color_spaces: bool,
    pub forbid_transparency: bool,
    /// Share identical images across pages instead of writing them again.
    pub reuse_xobjects: bool,
    /// Samples per device pixel for rasterized paints.
    pub raster_scale: f64,
    pub title: Option<String>,
    /// Path of a JSON-lines trace log.
    pub debug_log: Option<PathBuf>,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            profile: PdfProfile::None,
            forbid_mixed_color_spaces: false,
            forbid_transparency: false,
            reuse_xobjects: true,
            raster_scale: 1.0,
            title: None,
            debug_log: None,
        }
    }
}

impl DocumentOptions {
    pub fn conformance(&self) -> Conformance {
        let profile = self.profile.conformance();
        Conformance {
            forbid_mixed_color_spaces: profile.forbid_mixed_color_spaces
                || self.forbid_mixed_color_spaces,
            forbid_transparency: profile.forbid_transparency || self.forbid_transparency,
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.raster_scale.is_finite() || self.raster_scale <= 0.0 {
            return Err(PdfPaintError::InvalidConfiguration(format!(
                "raster scale must be positive, got {}",
                self.raster_scale
            )));
        }
        Ok(())
    }
}

/// Page size in points plus the device resolution drawing happens at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSpec {
    pub width: f64,
    pub height: f64,
    pub dpi: f64,
}

impl PageSpec {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            dpi: 72.0,
        }
    }

    pub fn from_size(size: Size) -> Self {
        Self::new(size.width, size.height)
    }

    pub fn with_dpi(mut self, dpi: f64) -> Self {
        self.dpi = dpi;
        self
    }

    fn validate(&self) -> Result<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.width) || !positive(self.height) {
            return Err(PdfPaintError::InvalidConfiguration(format!(
                "page size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if !positive(self.dpi) {
            return Err(PdfPaintError::InvalidConfiguration(format!(
                "dpi must be positive, got {}",
                self.dpi
            )));
        }
        Ok(())
    }

    /// Points per device unit.
    fn device_scale(&self) -> f64 {
        72.0 / self.dpi
    }
}

struct PdfPageNode {
    id: usize,
    kids: Vec<usize>,
}

/// A PDF being written to `W`. Pages are drawn one at a time through
/// [`Document::open_page`]; [`Document::finish`] completes the file.
pub struct Document<'a, W: Write> {
    writer: PdfWriter<'a, W>,
    registry: ResourceRegistry,
    fonts: FontCatalog,
    options: DocumentOptions,
    conformance: Conformance,
    page_nodes: Vec<PdfPageNode>,
    current_node: Option<PdfPageNode>,
    page_count: usize,
    metrics: DocumentMetrics,
    debug: Option<DebugLogger>,
}

impl<'a, W: Write> Document<'a, W> {
    /// Writes the file header to `sink`.
    pub fn new(sink: &'a mut W, options: DocumentOptions) -> Result<Self> {
        options.validate()?;
        let debug = match &options.debug_log {
            Some(path) => Some(DebugLogger::new(path)?),
            None => None,
        };
        let writer = PdfWriter::new(sink)?;
        Ok(Self {
            writer,
            registry: ResourceRegistry::new(options.reuse_xobjects),
            fonts: FontCatalog::new(),
            conformance: options.conformance(),
            options,
            page_nodes: Vec::new(),
            current_node: None,
            page_count: 0,
            metrics: DocumentMetrics::default(),
            debug,
        })
    }

    pub fn fonts(&self) -> &FontCatalog {
        &self.fonts
    }

    pub fn fonts_mut(&mut self) -> &mut FontCatalog {
        &mut self.fonts
    }

    pub fn options(&self) -> &DocumentOptions {
        &self.options
    }

    /// Pages closed so far.
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Starts a page. The document stays borrowed until the page is closed
    /// or dropped.
    pub fn open_page(&mut self, spec: PageSpec) -> Result<Page<'_, 'a, W>> {
        spec.validate()?;
        let s = spec.device_scale();
        let base = Transform::new(1.0, 0.0, 0.0, -1.0, 0.0, spec.height)
            .then(&Transform::scale(s, s));
        let bounds = Rect::new(0.0, 0.0, spec.width / s, spec.height / s);
        let mut state = PageState::new(base, bounds, self.options.raster_scale);
        let out = state.content_mut();
        out.save();
        out.concat(&Transform::new(1.0, 0.0, 0.0, -1.0, 0.0, spec.height));
        if (s - 1.0).abs() > f64::EPSILON {
            out.concat(&Transform::scale(s, s));
        }
        let number = self.page_count + 1;
        log::debug!(
            "opening page {} ({}x{} pt at {} dpi)",
            number,
            fmt(spec.width),
            fmt(spec.height),
            fmt(spec.dpi)
        );
        Ok(Page {
            doc: self,
            spec,
            state: Some(state),
            graphics: Graphics::for_page(Transform::scale(1.0 / s, 1.0 / s)),
            number,
            started: Instant::now(),
        })
    }

    fn ensure_page_node(&mut self) -> usize {
        let needs_new = self
            .current_node
            .as_ref()
            .map(|n| n.kids.len() >= PDF_PAGE_NODE_MAX_KIDS)
            .unwrap_or(true);
        if needs_new {
            if let Some(node) = self.current_node.take() {
                self.page_nodes.push(node);
            }
            let id = self.writer.alloc_ids(1);
            self.current_node = Some(PdfPageNode {
                id,
                kids: Vec::with_capacity(PDF_PAGE_NODE_MAX_KIDS),
            });
        }
        self.current_node
            .as_ref()
            .map(|n| n.id)
            .unwrap_or(PDF_PAGES_ID)
    }

    /// Writes fonts, the page tree, catalog, info dictionary and trailer.
    pub fn finish(mut self) -> Result<DocumentMetrics> {
        self.registry.write_fonts(&mut self.writer, &self.fonts)?;
        self.registry.flush(&mut self.writer)?;

        if let Some(node) = self.current_node.take() {
            self.page_nodes.push(node);
        }
        let page_nodes = std::mem::take(&mut self.page_nodes);
        for node in &page_nodes {
            self.writer.write_object(
                node.id,
                &format!(
                    "<< /Type /Pages /Parent {} 0 R /Count {} /Kids [{}] >>",
                    PDF_PAGES_ID,
                    node.kids.len(),
                    object_refs(&node.kids)
                ),
            )?;
        }
        let total_pages: usize = page_nodes.iter().map(|n| n.kids.len()).sum();
        let node_ids: Vec<usize> = page_nodes.iter().map(|n| n.id).collect();
        self.writer.write_object(
            PDF_PAGES_ID,
            &format!(
                "<< /Type /Pages /Count {} /Kids [{}] >>",
                total_pages,
                object_refs(&node_ids)
            ),
        )?;
        self.writer.write_object(
            PDF_CATALOG_ID,
            &format!("<< /Type /Catalog /Pages {} 0 R >>", PDF_PAGES_ID),
        )?;
        let info_id = self.writer.alloc_ids(1);
        self.writer
            .write_object(info_id, &info_object(self.options.title.as_deref()))?;
        let total_bytes = self.writer.finish(Some(info_id))?;

        let mut metrics = std::mem::take(&mut self.metrics);
        metrics.total_bytes = total_bytes;
        metrics.resources = self.registry.counts();
        if let Some(debug) = self.debug.as_mut() {
            debug.emit_summary("document", &metrics);
            debug.flush()?;
        }
        log::debug!(
            "finished document: {} pages, {} bytes",
            metrics.pages.len(),
            total_bytes
        );
        Ok(metrics)
    }
}

fn object_refs(ids: &[usize]) -> String {
    ids.iter()
        .map(|id| format!("{} 0 R", id))
        .collect::<Vec<_>>()
        .join(" ")
}

fn info_object(title: Option<&str>) -> String {
    let mut entries: Vec<String> = Vec::new();
    if let Some(title) = title {
        entries.push(format!("/Title {}", pdf_text_string(title)));
    }
    entries.push(format!("/Producer ({})", PRODUCER));
    format!("<< {} >>", entries.join(" "))
}

/// One open page. Drawing calls go through the page's graphics state;
/// [`Page::close`] writes the page. A page dropped without closing is
/// discarded.
pub struct Page<'d, 'a, W: Write> {
    doc: &'d mut Document<'a, W>,
    spec: PageSpec,
    state: Option<PageState>,
    graphics: Graphics,
    number: usize,
    started: Instant,
}

impl<W: Write> Page<'_, '_, W> {
    pub fn number(&self) -> usize {
        self.number
    }

    pub fn spec(&self) -> PageSpec {
        self.spec
    }

    pub fn fonts(&self) -> &FontCatalog {
        &self.doc.fonts
    }

    fn with_target<T>(
        &mut self,
        draw: impl FnOnce(&mut Graphics, &mut dyn PaintTarget) -> Result<T>,
    ) -> Result<T> {
        let Some(state) = self.state.as_mut() else {
            return Err(PdfPaintError::InvalidConfiguration(
                "page is already closed".to_string(),
            ));
        };
        let doc = &mut *self.doc;
        let mut target = PdfTarget::new(
            &mut doc.writer,
            &mut doc.registry,
            &doc.fonts,
            doc.conformance,
            state,
        );
        let result = draw(&mut self.graphics, &mut target);
        for event in self.graphics.take_raster_events() {
            if let Some(debug) = doc.debug.as_mut() {
                debug.log_fallback(self.number, event.paint, event.cols, event.rows);
            }
        }
        result
    }

    pub fn translate(&mut self, tx: f64, ty: f64) {
        self.graphics.translate(tx, ty);
    }

    pub fn scale(&mut self, sx: f64, sy: f64) {
        self.graphics.scale(sx, sy);
    }

    pub fn rotate(&mut self, radians: f64) {
        self.graphics.rotate(radians);
    }

    pub fn concat(&mut self, transform: &Transform) {
        self.graphics.concat(transform);
    }

    /// Replaces the user transform; identity is the page's default space.
    pub fn set_transform(&mut self, transform: Transform) {
        self.graphics.set_transform(transform);
    }

    pub fn transform(&self) -> Transform {
        self.graphics.transform()
    }

    pub fn clip(&mut self, path: &Path) {
        self.graphics.clip(path);
    }

    pub fn set_clip(&mut self, path: &Path) {
        self.graphics.set_clip(path);
    }

    pub fn reset_clip(&mut self) {
        self.graphics.reset_clip();
    }

    pub fn set_paint(&mut self, paint: impl Into<Paint>) {
        self.graphics.set_paint(paint);
    }

    pub fn set_color(&mut self, color: Color) {
        self.graphics.set_color(color);
    }

    pub fn set_stroke(&mut self, stroke: Stroke) {
        self.graphics.set_stroke(stroke);
    }

    pub fn fill(&mut self, path: &Path) -> Result<()> {
        self.with_target(|g, t| g.fill(t, path))
    }

    /// Strokes `path` with the current stroke and paint.
    pub fn draw(&mut self, path: &Path) -> Result<()> {
        self.with_target(|g, t| g.draw(t, path))
    }

    pub fn fill_and_stroke(&mut self, path: &Path) -> Result<()> {
        self.with_target(|g, t| g.fill_and_stroke(t, path))
    }

    pub fn draw_text(&mut self, run: &TextRun) -> Result<()> {
        self.with_target(|g, t| g.draw_text(t, run))
    }

    /// Draws `source` scaled into `dest` (user space).
    pub fn draw_image(&mut self, source: &ImageSource, dest: Rect) -> Result<()> {
        self.with_target(|g, t| g.draw_image(t, source, dest))
    }

    /// Fills the whole media box.
    pub fn set_background_color(&mut self, color: Color) -> Result<()> {
        self.with_target(|g, t| g.fill_background(t, color))
    }

    /// Balances the content stream and writes the page.
    pub fn close(mut self) -> Result<PageMetrics> {
        self.with_target(|g, t| {
            g.finish(t);
            Ok(())
        })?;
        let Some(state) = self.state.take() else {
            return Err(PdfPaintError::InvalidConfiguration(
                "page is already closed".to_string(),
            ));
        };
        let stats = self.graphics.stats();
        let resource_refs = state.resource_refs();
        let (content, resources) = state.into_parts();

        let doc = &mut *self.doc;
        let parent_id = doc.ensure_page_node();
        let content_id = doc.writer.alloc_ids(2);
        let page_id = content_id + 1;
        if let Some(node) = doc.current_node.as_mut() {
            node.kids.push(page_id);
        }
        doc.writer.write_object(content_id, &stream_object(&content))?;
        doc.writer.write_object(
            page_id,
            &format!(
                "<< /Type /Page /Parent {} 0 R /MediaBox [0 0 {} {}] /Resources {} /Contents {} 0 R >>",
                parent_id,
                fmt(self.spec.width),
                fmt(self.spec.height),
                resources,
                content_id
            ),
        )?;
        doc.registry.flush(&mut doc.writer)?;
        doc.page_count += 1;

        let metrics = PageMetrics {
            page_number: self.number,
            render_ms: self.started.elapsed().as_secs_f64() * 1000.0,
            draw_count: stats.draws,
            skipped_count: stats.skipped,
            raster_fallbacks: stats.rasterized,
            text_runs: stats.text_runs,
            images: stats.images,
            content_bytes: content.len(),
            resource_refs,
        };
        if let Some(debug) = doc.debug.as_mut() {
            debug.log_page(&metrics);
        }
        doc.metrics.push_page(metrics.clone());
        Ok(metrics)
    }
}

impl<W: Write> Drop for Page<'_, '_, W> {
    fn drop(&mut self) {
        if self.state.take().is_some() {
            log::warn!("page {} dropped without close; discarding it", self.number);
            if let Some(debug) = self.doc.debug.as_mut() {
                debug.log_discarded(self.number);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::count_op;
    use crate::paint::LinearGradient;
    use crate::types::Point;

    fn content_of(bytes: &[u8], page: usize) -> String {
        let doc = lopdf::Document::load_mem(bytes).expect("parse pdf");
        let pages = doc.get_pages();
        let id = pages.get(&(page as u32)).copied().expect("page id");
        let content = doc.get_page_content(id).expect("content");
        String::from_utf8(content).expect("utf8 content")
    }

    fn page_count(bytes: &[u8]) -> usize {
        lopdf::Document::load_mem(bytes)
            .expect("parse pdf")
            .get_pages()
            .len()
    }

    fn assert_balanced(content: &str) {
        let mut depth: i64 = 0;
        for line in content.lines() {
            match line {
                "q" => depth += 1,
                "Q" => {
                    depth -= 1;
                    assert!(depth >= 0, "restore without save");
                }
                _ => {}
            }
        }
        assert_eq!(depth, 0);
    }

    #[test]
    fn opaque_rect_fill_makes_single_page() {
        let mut out = Vec::new();
        let mut doc = Document::new(&mut out, DocumentOptions::default()).expect("doc");
        let mut page = doc.open_page(PageSpec::new(200.0, 200.0)).expect("page");
        page.set_color(Color::rgb(200, 30, 30));
        page.fill(&Path::rect(20.0, 20.0, 100.0, 50.0)).expect("fill");
        let metrics = page.close().expect("close");
        assert_eq!(metrics.draw_count, 1);
        let doc_metrics = doc.finish().expect("finish");
        assert_eq!(doc_metrics.resources.shadings, 0);
        assert_eq!(doc_metrics.resources.tilings, 0);

        assert_eq!(page_count(&out), 1);
        let content = content_of(&out, 1);
        assert_eq!(count_op(&content, "f"), 1);
        assert_eq!(count_op(&content, "scn"), 0);
        assert!(content.starts_with("q\n1 0 0 -1 0 200 cm\n"));
        assert_balanced(&content);
    }

    #[test]
    fn repeating_gradient_becomes_an_image() {
        let mut out = Vec::new();
        let mut doc = Document::new(&mut out, DocumentOptions::default()).expect("doc");
        let mut page = doc.open_page(PageSpec::new(200.0, 200.0)).expect("page");
        page.set_paint(LinearGradient::two_color(
            Point::new(0.0, 0.0),
            Color::rgb(255, 0, 0),
            Point::new(20.0, 0.0),
            Color::rgb(0, 0, 255),
            true,
        ));
        page.fill(&Path::rect(10.0, 10.0, 80.0, 40.0)).expect("fill");
        let metrics = page.close().expect("close");
        assert_eq!(metrics.raster_fallbacks, 1);
        let doc_metrics = doc.finish().expect("finish");
        assert_eq!(doc_metrics.resources.images, 1);
        assert_eq!(doc_metrics.resources.shadings, 0);

        let content = content_of(&out, 1);
        assert_eq!(count_op(&content, "Do"), 1);
        assert_balanced(&content);
    }

    #[test]
    fn repeated_font_selection_is_written_once() {
        let mut out = Vec::new();
        let mut doc = Document::new(&mut out, DocumentOptions::default()).expect("doc");
        let font = doc.fonts_mut().base14("Helvetica").expect("font");
        let mut page = doc.open_page(PageSpec::new(300.0, 200.0)).expect("page");
        for (i, text) in ["first", "second"].iter().enumerate() {
            let run = TextRun::from_text(
                page.fonts(),
                font,
                12.0,
                Point::new(20.0, 40.0 + 20.0 * i as f64),
                text,
            )
            .expect("run");
            page.draw_text(&run).expect("text");
        }
        page.close().expect("close");
        let metrics = doc.finish().expect("finish");
        assert_eq!(metrics.resources.fonts, 1);

        let content = content_of(&out, 1);
        assert_eq!(count_op(&content, "Tf"), 1);
        assert_eq!(count_op(&content, "TJ"), 2);
        assert_balanced(&content);
    }

    #[test]
    fn truetype_text_is_embedded_as_cid_font() {
        let mut out = Vec::new();
        let mut doc = Document::new(&mut out, DocumentOptions::default()).expect("doc");
        let font = doc
            .fonts_mut()
            .register_truetype(include_bytes!("testdata/demo.ttf").to_vec())
            .expect("font");
        let mut page = doc.open_page(PageSpec::new(200.0, 100.0)).expect("page");
        assert!(page.fonts().is_multibyte(font));
        let run = TextRun::from_text(page.fonts(), font, 12.0, Point::new(10.0, 50.0), "AA")
            .expect("run");
        page.draw_text(&run).expect("text");
        page.close().expect("close");
        let metrics = doc.finish().expect("finish");
        assert_eq!(metrics.resources.fonts, 1);

        let content = content_of(&out, 1);
        assert_eq!(count_op(&content, "Tf"), 1);
        assert!(content.contains("[<00010001>] TJ"));
        assert_balanced(&content);

        let pdf = String::from_utf8_lossy(&out);
        assert!(pdf.contains("/Subtype /Type0"));
        assert!(pdf.contains("/Encoding /Identity-H"));
        assert!(pdf.contains("/Subtype /CIDFontType2"));
        assert!(pdf.contains("/CIDToGIDMap /Identity"));
        assert!(pdf.contains("/W [1 [540]]"));
        assert!(pdf.contains("/FontFile2"));
        assert!(pdf.contains("<0001> <0041>"));

        let parsed = lopdf::Document::load_mem(&out).expect("parse pdf");
        let type0 = parsed
            .objects
            .values()
            .filter_map(|obj| obj.as_dict().ok())
            .find(|dict| {
                dict.get(b"Subtype")
                    .and_then(|v| v.as_name())
                    .is_ok_and(|name| name == b"Type0")
            })
            .expect("type0 font");
        assert!(type0.get(b"ToUnicode").and_then(|v| v.as_reference()).is_ok());
        assert!(type0.get(b"DescendantFonts").is_ok());
    }

    #[test]
    fn mixed_color_spaces_fail_without_writing() {
        let mut out = Vec::new();
        let options = DocumentOptions {
            forbid_mixed_color_spaces: true,
            ..DocumentOptions::default()
        };
        let mut doc = Document::new(&mut out, options).expect("doc");
        let mut page = doc.open_page(PageSpec::new(100.0, 100.0)).expect("page");
        page.set_color(Color::rgb(0, 0, 0));
        page.fill(&Path::rect(0.0, 0.0, 10.0, 10.0)).expect("rgb fill");
        let before = page.state.as_ref().map(|s| s.content().as_str().to_string());
        page.set_color(Color::cmyk(0.0, 1.0, 0.0, 0.0));
        let err = page
            .fill(&Path::rect(0.0, 0.0, 10.0, 10.0))
            .expect_err("mixed spaces");
        assert!(matches!(err, PdfPaintError::ConformanceViolation(_)));
        let after = page.state.as_ref().map(|s| s.content().as_str().to_string());
        assert_eq!(before, after);
        page.close().expect("close");
        doc.finish().expect("finish");
    }

    #[test]
    fn pdfa_rejects_translucent_fill() {
        let mut out = Vec::new();
        let options = DocumentOptions {
            profile: PdfProfile::PdfA1b,
            ..DocumentOptions::default()
        };
        let mut doc = Document::new(&mut out, options).expect("doc");
        let mut page = doc.open_page(PageSpec::new(100.0, 100.0)).expect("page");
        page.set_color(Color::rgba(0, 0, 0, 100));
        let err = page
            .fill(&Path::rect(0.0, 0.0, 10.0, 10.0))
            .expect_err("transparency");
        assert!(matches!(err, PdfPaintError::ConformanceViolation(_)));
    }

    #[test]
    fn high_dpi_page_scales_user_space_back_to_points() {
        let mut out = Vec::new();
        let mut doc = Document::new(&mut out, DocumentOptions::default()).expect("doc");
        let mut page = doc
            .open_page(PageSpec::new(72.0, 72.0).with_dpi(144.0))
            .expect("page");
        page.fill(&Path::rect(0.0, 0.0, 10.0, 10.0)).expect("fill");
        page.close().expect("close");
        doc.finish().expect("finish");

        let content = content_of(&out, 1);
        assert!(content.starts_with("q\n1 0 0 -1 0 72 cm\n0.5 0 0 0.5 0 0 cm\n"));
        assert!(content.contains("2 0 0 2 0 0 cm"));
        assert_balanced(&content);
    }

    #[test]
    fn background_and_image_are_drawn() {
        let mut out = Vec::new();
        let mut doc = Document::new(&mut out, DocumentOptions::default()).expect("doc");
        let mut page = doc.open_page(PageSpec::new(100.0, 100.0)).expect("page");
        page.set_background_color(Color::rgb(240, 240, 240))
            .expect("background");
        let image = ImageSource::Rgba {
            width: 2,
            height: 2,
            pixels: vec![255u8; 16].into(),
        };
        page.draw_image(&image, Rect::new(10.0, 10.0, 40.0, 20.0))
            .expect("image");
        page.draw_image(&image, Rect::new(50.0, 50.0, 40.0, 20.0))
            .expect("image again");
        let metrics = page.close().expect("close");
        assert_eq!(metrics.images, 2);
        let doc_metrics = doc.finish().expect("finish");
        assert_eq!(doc_metrics.resources.images, 1);

        let content = content_of(&out, 1);
        assert!(content.contains("0 0 100 100 re") || content.contains("0 0 m\n100 0 l"));
        assert!(content.contains("40 0 0 -20 10 30 cm"));
        assert_eq!(count_op(&content, "Do"), 2);
        assert_balanced(&content);
    }

    #[test]
    fn many_pages_split_the_page_tree() {
        let mut out = Vec::new();
        let mut doc = Document::new(&mut out, DocumentOptions::default()).expect("doc");
        for _ in 0..(PDF_PAGE_NODE_MAX_KIDS + 3) {
            let page = doc.open_page(PageSpec::new(50.0, 50.0)).expect("page");
            page.close().expect("close");
        }
        let metrics = doc.finish().expect("finish");
        assert_eq!(metrics.pages.len(), PDF_PAGE_NODE_MAX_KIDS + 3);
        assert_eq!(page_count(&out), PDF_PAGE_NODE_MAX_KIDS + 3);
    }

    #[test]
    fn dropped_page_is_discarded() {
        let mut out = Vec::new();
        let mut doc = Document::new(&mut out, DocumentOptions::default()).expect("doc");
        {
            let mut page = doc.open_page(PageSpec::new(50.0, 50.0)).expect("page");
            page.fill(&Path::rect(0.0, 0.0, 5.0, 5.0)).expect("fill");
        }
        let page = doc.open_page(PageSpec::new(50.0, 50.0)).expect("page");
        assert_eq!(page.number(), 1);
        page.close().expect("close");
        doc.finish().expect("finish");
        assert_eq!(page_count(&out), 1);
    }

    #[test]
    fn invalid_sizes_are_rejected() {
        let mut out = Vec::new();
        let bad = DocumentOptions {
            raster_scale: 0.0,
            ..DocumentOptions::default()
        };
        assert!(matches!(
            Document::new(&mut out, bad),
            Err(PdfPaintError::InvalidConfiguration(_))
        ));
        let mut out = Vec::new();
        let mut doc = Document::new(&mut out, DocumentOptions::default()).expect("doc");
        assert!(doc.open_page(PageSpec::new(0.0, 10.0)).is_err());
        assert!(doc.open_page(PageSpec::new(10.0, 10.0).with_dpi(-1.0)).is_err());
    }

    #[test]
    fn title_and_trace_log_are_written() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log_path = dir.path().join("trace.jsonl");
        let mut out = Vec::new();
        let options = DocumentOptions {
            title: Some("Report (draft)".to_string()),
            debug_log: Some(log_path.clone()),
            ..DocumentOptions::default()
        };
        let mut doc = Document::new(&mut out, options).expect("doc");
        let page = doc.open_page(PageSpec::new(50.0, 50.0)).expect("page");
        page.close().expect("close");
        doc.finish().expect("finish");

        let pdf = String::from_utf8_lossy(&out);
        assert!(pdf.contains("/Title (Report \\(draft\\))"));

        let mut out = Vec::new();
        let options = DocumentOptions {
            title: Some("Résumé".to_string()),
            ..DocumentOptions::default()
        };
        let mut doc = Document::new(&mut out, options).expect("doc");
        let page = doc.open_page(PageSpec::new(50.0, 50.0)).expect("page");
        page.close().expect("close");
        doc.finish().expect("finish");
        let parsed = lopdf::Document::load_mem(&out).expect("parse pdf");
        let info_id = parsed
            .trailer
            .get(b"Info")
            .and_then(|v| v.as_reference())
            .expect("info ref");
        let title = parsed
            .get_dictionary(info_id)
            .and_then(|d| d.get(b"Title"))
            .and_then(|v| v.as_str())
            .expect("title");
        assert_eq!(&title[..2], &[0xFE, 0xFF]);
        let units: Vec<u16> = title[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(String::from_utf16(&units).expect("utf16"), "Résumé");
        let trace = std::fs::read_to_string(&log_path).expect("trace");
        assert!(trace.lines().any(|l| l.contains("\"type\":\"page.close\"")));
        assert!(trace.lines().any(|l| l.contains("\"type\":\"debug.summary\"")));
    }
}
