use crate::backend::{PaintOp, PaintRole, PaintTarget};
use crate::error::{PdfPaintError, Result};
use crate::image::{ImageData, ImageSource};
use crate::paint::{Paint, Resolution, TileOp, TilingPattern, resolve};
use crate::path::Path;
use crate::raster::{self, SampleGrid};
use crate::text::TextRun;
use crate::types::{Color, ColorSpace, Rect, Stroke, Transform};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrawMode {
    Fill,
    Stroke,
    FillStroke,
}

/// Paint selection as last written to the content stream.
#[derive(Debug, Clone, PartialEq)]
enum Selected {
    Color(Color),
    Pattern(String),
}

/// State the content stream is known to be in at one save level.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct WrittenState {
    transform: Transform,
    clip: Vec<Path>,
    fill: Option<Selected>,
    stroke: Option<Selected>,
    alpha: (u8, u8),
    stroke_style: Option<Stroke>,
}

impl Default for WrittenState {
    fn default() -> Self {
        Self {
            transform: Transform::IDENTITY,
            clip: Vec::new(),
            fill: None,
            stroke: None,
            alpha: (255, 255),
            stroke_style: None,
        }
    }
}

/// State the caller asked for. Clip paths are kept in base space.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RequestedState {
    transform: Transform,
    clip: Vec<Path>,
    paint: Paint,
    stroke: Stroke,
}

/// Counters for one surface's draw calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct DrawStats {
    pub(crate) draws: usize,
    pub(crate) skipped: usize,
    pub(crate) rasterized: usize,
    pub(crate) text_runs: usize,
    pub(crate) images: usize,
}

/// One paint sampled into an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RasterEvent {
    pub(crate) paint: &'static str,
    pub(crate) cols: u32,
    pub(crate) rows: u32,
}

/// Graphics-state tracker: turns requested state into the minimal operators
/// on a [`PaintTarget`].
#[derive(Debug, Clone)]
pub struct Graphics {
    default_transform: Transform,
    user: Transform,
    requested: RequestedState,
    stack: Vec<WrittenState>,
    base_level: usize,
    stats: DrawStats,
    raster_events: Vec<RasterEvent>,
}

impl Graphics {
    /// Tracker for a page whose opening `q` is already written; user space
    /// starts at `default_transform` relative to the page base.
    pub fn for_page(default_transform: Transform) -> Self {
        Self::new(default_transform, 1)
    }

    pub fn for_tile() -> Self {
        Self::new(Transform::IDENTITY, 0)
    }

    fn new(default_transform: Transform, base_level: usize) -> Self {
        Self {
            default_transform,
            user: Transform::IDENTITY,
            requested: RequestedState {
                transform: default_transform,
                clip: Vec::new(),
                paint: Paint::default(),
                stroke: Stroke::default(),
            },
            stack: vec![WrittenState::default()],
            base_level,
            stats: DrawStats::default(),
            raster_events: Vec::new(),
        }
    }

    /// Outstanding `q` operators, including the surface's own.
    pub fn depth(&self) -> usize {
        self.base_level + self.stack.len() - 1
    }

    pub(crate) fn stats(&self) -> DrawStats {
        self.stats
    }

    pub(crate) fn take_raster_events(&mut self) -> Vec<RasterEvent> {
        std::mem::take(&mut self.raster_events)
    }

    /// Current user transform, relative to the default user space.
    pub fn transform(&self) -> Transform {
        self.user
    }

    pub fn paint(&self) -> &Paint {
        &self.requested.paint
    }

    pub fn stroke(&self) -> &Stroke {
        &self.requested.stroke
    }

    pub fn translate(&mut self, tx: f64, ty: f64) {
        self.concat(&Transform::translate(tx, ty));
    }

    pub fn scale(&mut self, sx: f64, sy: f64) {
        self.concat(&Transform::scale(sx, sy));
    }

    pub fn rotate(&mut self, radians: f64) {
        self.concat(&Transform::rotate(radians));
    }

    pub fn concat(&mut self, transform: &Transform) {
        self.set_transform(self.user.then(transform));
    }

    pub fn set_transform(&mut self, transform: Transform) {
        self.user = transform;
        self.requested.transform = self.default_transform.then(&transform);
    }

    /// Intersects the clip with `path` given in current user space.
    pub fn clip(&mut self, path: &Path) {
        let base = path.transformed(&self.requested.transform);
        self.requested.clip.push(base);
    }

    pub fn set_clip(&mut self, path: &Path) {
        self.requested.clip.clear();
        self.clip(path);
    }

    pub fn reset_clip(&mut self) {
        self.requested.clip.clear();
    }

    pub fn set_paint(&mut self, paint: impl Into<Paint>) {
        self.requested.paint = paint.into();
    }

    pub fn set_color(&mut self, color: Color) {
        self.requested.paint = Paint::Solid(color);
    }

    pub fn set_stroke(&mut self, stroke: Stroke) {
        self.requested.stroke = stroke;
    }

    fn written(&self) -> &WrittenState {
        &self.stack[self.stack.len() - 1]
    }

    fn written_mut(&mut self) -> &mut WrittenState {
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    fn push(&mut self, target: &mut dyn PaintTarget) {
        target.save();
        let top = self.written().clone();
        self.stack.push(top);
    }

    fn pop(&mut self, target: &mut dyn PaintTarget) {
        if self.stack.len() > 1 {
            target.restore();
            self.stack.pop();
        }
    }

    /// Writes `q`, clip and `cm` when the requested transform or clip
    /// differs from the written one. Returns whether a save was written.
    fn sync(&mut self, target: &mut dyn PaintTarget, force_save: bool) -> bool {
        let top = self.written();
        let same = top.transform == self.requested.transform && top.clip == self.requested.clip;
        if same && !force_save {
            return false;
        }
        self.push(target);
        if !same {
            let to_written = self.written().transform.invert();
            let new_clips: Vec<Path> = if self.requested.clip.starts_with(&self.written().clip) {
                self.requested.clip[self.written().clip.len()..].to_vec()
            } else {
                self.requested.clip.clone()
            };
            for clip in &new_clips {
                // Clip paths live in base space; express them in the written CTM.
                let local = match &to_written {
                    Some(inv) if !inv.is_identity() => clip.transformed(inv),
                    _ => clip.clone(),
                };
                if target.append_path(&local) == 0 {
                    // Nothing to clip to: the clip excludes everything.
                    target.append_rect(&Rect::new(0.0, 0.0, 0.0, 0.0));
                }
                target.clip(local.fill_rule());
            }
            let relative = match to_written {
                Some(inv) => inv.then(&self.requested.transform),
                None => self.requested.transform,
            };
            if !relative.is_identity() {
                target.concat(&relative);
            }
            let (clip, transform) = (self.requested.clip.clone(), self.requested.transform);
            let top = self.written_mut();
            top.clip = clip;
            top.transform = transform;
        }
        true
    }

    fn check_alpha(target: &dyn PaintTarget, alpha: u8) -> Result<()> {
        if alpha < 255 && target.conformance().forbid_transparency {
            return Err(PdfPaintError::ConformanceViolation(format!(
                "alpha {alpha} requires transparency"
            )));
        }
        Ok(())
    }

    fn select(&mut self, target: &mut dyn PaintTarget, role: PaintRole, selection: &Selected) {
        let current = match role {
            PaintRole::Fill => &self.written().fill,
            PaintRole::Stroke => &self.written().stroke,
        };
        if current.as_ref() == Some(selection) {
            return;
        }
        match selection {
            Selected::Color(color) => target.set_color(role, color),
            Selected::Pattern(name) => target.select_pattern(role, name),
        }
        let top = self.written_mut();
        match role {
            PaintRole::Fill => top.fill = Some(selection.clone()),
            PaintRole::Stroke => top.stroke = Some(selection.clone()),
        }
    }

    fn ensure_alpha(&mut self, target: &mut dyn PaintTarget, alpha: (u8, u8)) {
        if self.written().alpha != alpha {
            target.set_alpha(alpha.0, alpha.1);
            self.written_mut().alpha = alpha;
        }
    }

    fn ensure_stroke_style(&mut self, target: &mut dyn PaintTarget) {
        let previous = self.written().stroke_style.clone();
        if previous.as_ref() == Some(&self.requested.stroke) {
            return;
        }
        target.set_stroke_style(&self.requested.stroke, previous.as_ref());
        self.written_mut().stroke_style = Some(self.requested.stroke.clone());
    }

    /// Maps user space to the surface's default space.
    fn base_to_user(&self, target: &dyn PaintTarget) -> Transform {
        target.base_transform().then(&self.requested.transform)
    }

    /// Registers whatever the resolved paint needs and returns the selection,
    /// after the profile checks. Nothing is written to the content stream.
    fn prepare_paint(
        &mut self,
        target: &mut dyn PaintTarget,
        resolution: Resolution<'_>,
    ) -> Result<(Selected, u8)> {
        match resolution {
            Resolution::Solid(color) => {
                Self::check_alpha(target, color.alpha())?;
                target.use_color_space(color.space())?;
                Ok((Selected::Color(color.with_alpha(255)), color.alpha()))
            }
            Resolution::Shading(spec) => {
                target.use_color_space(ColorSpace::Rgb)?;
                Ok((Selected::Pattern(target.shading_pattern(&spec)), 255))
            }
            Resolution::Tiling(pattern) => {
                let base_to_user = self.base_to_user(target);
                let name = render_tile(target, pattern, &base_to_user)?;
                Ok((Selected::Pattern(name), 255))
            }
            Resolution::Unsupported => Err(PdfPaintError::InvalidPaint(
                "paint must be rasterized".to_string(),
            )),
        }
    }

    pub fn fill(&mut self, target: &mut dyn PaintTarget, path: &Path) -> Result<()> {
        self.draw_shape(target, path, DrawMode::Fill)
    }

    /// Strokes `path` with the current stroke.
    pub fn draw(&mut self, target: &mut dyn PaintTarget, path: &Path) -> Result<()> {
        self.draw_shape(target, path, DrawMode::Stroke)
    }

    pub fn fill_and_stroke(&mut self, target: &mut dyn PaintTarget, path: &Path) -> Result<()> {
        self.draw_shape(target, path, DrawMode::FillStroke)
    }

    fn draw_shape(&mut self, target: &mut dyn PaintTarget, path: &Path, mode: DrawMode) -> Result<()> {
        if !path.has_geometry() || self.requested.paint.is_invisible() {
            self.stats.skipped += 1;
            return Ok(());
        }
        let paint = self.requested.paint.clone();
        let base_to_user = self.base_to_user(target);
        let resolution = resolve(&paint, &base_to_user);
        if matches!(resolution, Resolution::Unsupported) {
            return match mode {
                DrawMode::FillStroke => {
                    self.draw_rasterized(target, path, DrawMode::Fill)?;
                    self.draw_rasterized(target, path, DrawMode::Stroke)
                }
                _ => self.draw_rasterized(target, path, mode),
            };
        }
        let (selection, alpha) = self.prepare_paint(target, resolution)?;

        let saved = self.sync(target, false);
        let written_alpha = self.written().alpha;
        let (desired_alpha, op) = match mode {
            DrawMode::Fill => {
                self.select(target, PaintRole::Fill, &selection);
                ((alpha, written_alpha.1), PaintOp::Fill(path.fill_rule()))
            }
            DrawMode::Stroke => {
                self.select(target, PaintRole::Stroke, &selection);
                ((written_alpha.0, alpha), PaintOp::Stroke)
            }
            DrawMode::FillStroke => {
                self.select(target, PaintRole::Fill, &selection);
                self.select(target, PaintRole::Stroke, &selection);
                ((alpha, alpha), PaintOp::FillStroke(path.fill_rule()))
            }
        };
        self.ensure_alpha(target, desired_alpha);
        if mode != DrawMode::Fill {
            self.ensure_stroke_style(target);
        }
        target.append_path(path);
        target.paint(op);
        if saved {
            self.pop(target);
        }
        self.stats.draws += 1;
        Ok(())
    }

    /// Bounds of the requested clip in base space; `Some(None)` means the
    /// clip excludes everything.
    fn clip_bounds(&self) -> Option<Option<Rect>> {
        let mut bounds: Option<Rect> = None;
        for clip in &self.requested.clip {
            let Some(b) = clip.bounds() else {
                return Some(None);
            };
            bounds = match bounds {
                None => Some(b),
                Some(prev) => match prev.intersect(&b) {
                    Some(r) => Some(r),
                    None => return Some(None),
                },
            };
        }
        bounds.map(Some)
    }

    fn draw_rasterized(
        &mut self,
        target: &mut dyn PaintTarget,
        path: &Path,
        mode: DrawMode,
    ) -> Result<()> {
        let user = self.requested.transform;
        let outline = match mode {
            DrawMode::Stroke => match raster::stroke_outline(path, &self.requested.stroke) {
                Some(outline) => outline,
                None => return Ok(()),
            },
            _ => path.clone(),
        };
        let Some(user_bounds) = outline.bounds() else {
            return Ok(());
        };
        let clip = match self.clip_bounds() {
            Some(None) => return Ok(()),
            Some(Some(rect)) => Some(rect),
            None => None,
        };
        let Some(grid) = raster::sample_grid(
            user.map_rect(&user_bounds),
            clip,
            target.surface_bounds(),
            target.raster_scale(),
        ) else {
            self.stats.skipped += 1;
            return Ok(());
        };
        let Some(to_base) = user.invert() else {
            return Ok(());
        };

        target.use_color_space(ColorSpace::Rgb)?;
        let paint = self.requested.paint.clone();
        let key = raster::cache_key(&paint, &user, &grid);
        log::debug!(
            "rasterizing {} paint over {}x{} samples",
            paint_kind(&paint),
            grid.cols,
            grid.rows
        );
        let image = target.image(&key, &mut || sample_image(&paint, &user, &grid))?;
        if image.has_alpha && target.conformance().forbid_transparency {
            return Err(PdfPaintError::ConformanceViolation(
                "rasterized paint needs a soft mask".to_string(),
            ));
        }

        let saved = self.sync(target, false);
        self.ensure_alpha(target, (255, 255));
        target.save();
        target.append_path(&outline);
        target.clip(outline.fill_rule());
        // The sample grid lives in surface base space.
        if !to_base.is_identity() {
            target.concat(&to_base);
        }
        target.concat(&grid.image_matrix());
        target.draw_xobject(&image.name);
        target.restore();
        if saved {
            self.pop(target);
        }
        self.stats.rasterized += 1;
        self.raster_events.push(RasterEvent {
            paint: paint_kind(&paint),
            cols: grid.cols,
            rows: grid.rows,
        });
        Ok(())
    }

    /// Shows a text run with the current paint.
    pub fn draw_text(&mut self, target: &mut dyn PaintTarget, run: &TextRun) -> Result<()> {
        if run.is_empty() || self.requested.paint.is_invisible() {
            self.stats.skipped += 1;
            return Ok(());
        }
        let paint = self.requested.paint.clone();
        let base_to_user = self.base_to_user(target);
        let resolution = match resolve(&paint, &base_to_user) {
            Resolution::Unsupported => Resolution::Solid(paint.representative_color()),
            other => other,
        };
        let (selection, alpha) = self.prepare_paint(target, resolution)?;

        target.select_font(run.font, run.size)?;
        self.sync(target, true);
        self.select(target, PaintRole::Fill, &selection);
        let stroke_alpha = self.written().alpha.1;
        self.ensure_alpha(target, (alpha, stroke_alpha));
        target.show_text(run);
        self.pop(target);
        self.stats.text_runs += 1;
        Ok(())
    }

    /// Draws `source` into `dest`, given in user space.
    pub fn draw_image(
        &mut self,
        target: &mut dyn PaintTarget,
        source: &ImageSource,
        dest: Rect,
    ) -> Result<()> {
        if dest.is_empty() {
            self.stats.skipped += 1;
            return Ok(());
        }
        let image = target.image(&source.cache_key(), &mut || source.decode())?;
        target.use_color_space(image.space)?;
        if image.has_alpha && target.conformance().forbid_transparency {
            return Err(PdfPaintError::ConformanceViolation(
                "image has a soft mask".to_string(),
            ));
        }
        self.sync(target, true);
        self.ensure_alpha(target, (255, 255));
        target.concat(&Transform::new(
            dest.width,
            0.0,
            0.0,
            -dest.height,
            dest.x,
            dest.bottom(),
        ));
        target.draw_xobject(&image.name);
        self.pop(target);
        self.stats.images += 1;
        Ok(())
    }

    /// Fills the whole surface with `color`, ignoring transform and clip.
    pub fn fill_background(&mut self, target: &mut dyn PaintTarget, color: Color) -> Result<()> {
        let saved = self.requested.clone();
        self.requested.transform = Transform::IDENTITY;
        self.requested.clip.clear();
        self.requested.paint = Paint::Solid(color);
        let bounds = target.surface_bounds();
        let result = self.fill(
            target,
            &Path::rect(bounds.x, bounds.y, bounds.width, bounds.height),
        );
        self.requested = saved;
        result
    }

    /// Applies one declarative tile operation.
    pub fn apply(&mut self, target: &mut dyn PaintTarget, op: &TileOp) -> Result<()> {
        match op {
            TileOp::SetPaint(paint) => {
                self.set_paint(paint.clone());
                Ok(())
            }
            TileOp::SetStroke(stroke) => {
                self.set_stroke(stroke.clone());
                Ok(())
            }
            TileOp::Concat(transform) => {
                self.concat(transform);
                Ok(())
            }
            TileOp::Fill(path) => self.fill(target, path),
            TileOp::Stroke(path) => self.draw(target, path),
            TileOp::Text(run) => self.draw_text(target, run),
        }
    }

    /// Restores every outstanding save, the surface's own included.
    pub fn finish(&mut self, target: &mut dyn PaintTarget) {
        while self.stack.len() > 1 {
            self.pop(target);
        }
        for _ in 0..self.base_level {
            target.restore();
        }
        self.base_level = 0;
    }
}

fn sample_image(paint: &Paint, user: &Transform, grid: &SampleGrid) -> Result<ImageData> {
    let rgba = raster::sample_paint(paint, user, grid)?;
    ImageData::from_rgba(grid.cols, grid.rows, &rgba)
}

fn paint_kind(paint: &Paint) -> &'static str {
    match paint {
        Paint::Solid(_) => "solid",
        Paint::Linear(_) => "linear gradient",
        Paint::Radial(_) => "radial gradient",
        Paint::Pattern(_) => "pattern",
        Paint::Procedural(_) => "procedural",
    }
}

/// Renders a tiling pattern's cell on a nested surface and registers it.
fn render_tile(
    target: &mut dyn PaintTarget,
    pattern: &TilingPattern,
    base_to_user: &Transform,
) -> Result<String> {
    target.begin_tile(pattern.tile);
    let mut graphics = Graphics::for_tile();
    let drawn = pattern
        .ops
        .iter()
        .try_for_each(|op| graphics.apply(target, op));
    if drawn.is_ok() {
        graphics.finish(target);
    }
    // Pop the surface even when a tile operation failed.
    let tile = target.end_tile();
    drawn?;
    let matrix = base_to_user.then(&pattern.transform);
    Ok(target.tiling_pattern(tile?, pattern, &matrix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Conformance;
    use crate::content::count_op;
    use crate::font::FontCatalog;
    use crate::paint::{CycleMethod, GradientStop, LinearGradient};
    use crate::registry::{PdfWriter, ResourceRegistry};
    use crate::target::{PageState, PdfTarget};
    use crate::types::{LineCap, Point};

    struct Fixture {
        out: Vec<u8>,
        registry: ResourceRegistry,
        fonts: FontCatalog,
        page: PageState,
        conformance: Conformance,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                out: Vec::new(),
                registry: ResourceRegistry::new(true),
                fonts: FontCatalog::new(),
                page: PageState::new(
                    Transform::new(1.0, 0.0, 0.0, -1.0, 0.0, 200.0),
                    Rect::new(0.0, 0.0, 200.0, 200.0),
                    1.0,
                ),
                conformance: Conformance::default(),
            }
        }

        /// Runs `f` against a target and returns the page operators.
        fn run(&mut self, g: &mut Graphics, f: impl FnOnce(&mut Graphics, &mut dyn PaintTarget) -> Result<()>) -> Result<String> {
            let mut writer = PdfWriter::new(&mut self.out)?;
            let mut target = PdfTarget::new(
                &mut writer,
                &mut self.registry,
                &self.fonts,
                self.conformance,
                &mut self.page,
            );
            f(g, &mut target)?;
            Ok(self.page.content().as_str().to_string())
        }
    }

    fn square() -> Path {
        Path::rect(10.0, 10.0, 50.0, 50.0)
    }

    fn assert_balanced(content: &str) {
        let mut depth: i64 = 0;
        for line in content.lines() {
            match line {
                "q" => depth += 1,
                "Q" => {
                    depth -= 1;
                    assert!(depth >= 0, "restore without save in\n{content}");
                }
                _ => {}
            }
        }
        assert_eq!(depth, 0, "unbalanced:\n{content}");
    }

    #[test]
    fn opaque_fill_writes_color_path_and_fill() {
        let mut fx = Fixture::new();
        let mut g = Graphics::for_tile();
        let content = fx
            .run(&mut g, |g, t| {
                g.set_color(Color::rgb(255, 0, 0));
                g.fill(t, &square())
            })
            .expect("draw");
        assert_eq!(content, "1 0 0 rg\n10 10 m\n60 10 l\n60 60 l\n10 60 l\nh\nf\n");
    }

    #[test]
    fn color_is_not_reselected() {
        let mut fx = Fixture::new();
        let mut g = Graphics::for_tile();
        let content = fx
            .run(&mut g, |g, t| {
                g.set_color(Color::rgb(0, 0, 255));
                g.fill(t, &square())?;
                g.fill(t, &square())
            })
            .expect("draw");
        assert_eq!(count_op(&content, "rg"), 1);
        assert_eq!(count_op(&content, "f"), 2);
    }

    #[test]
    fn transparent_and_empty_draws_are_skipped() {
        let mut fx = Fixture::new();
        let mut g = Graphics::for_tile();
        let content = fx
            .run(&mut g, |g, t| {
                g.set_color(Color::rgba(0, 0, 0, 0));
                g.fill(t, &square())?;
                g.set_color(Color::BLACK);
                g.fill(t, &Path::new())
            })
            .expect("draw");
        assert!(content.is_empty());
        assert_eq!(g.stats().skipped, 2);
    }

    #[test]
    fn paths_without_geometry_write_nothing() {
        let mut fx = Fixture::new();
        let mut g = Graphics::for_tile();
        let content = fx
            .run(&mut g, |g, t| {
                g.fill(t, &Path::new().close())?;
                g.draw(t, &Path::new().close().close())?;
                g.fill_and_stroke(t, &Path::new().close())
            })
            .expect("draw");
        assert!(content.is_empty(), "unexpected operators:\n{content}");
        assert_eq!(g.stats().skipped, 3);
        assert_eq!(g.stats().draws, 0);
    }

    #[test]
    fn clip_without_geometry_clips_everything() {
        let mut fx = Fixture::new();
        let mut g = Graphics::for_tile();
        let content = fx
            .run(&mut g, |g, t| {
                g.clip(&Path::new().close());
                g.fill(t, &square())
            })
            .expect("draw");
        assert!(content.starts_with("q\n0 0 0 0 re\nW n\n"));
        assert_balanced(&content);
    }

    #[test]
    fn implicit_move_to_starts_a_subpath() {
        let mut fx = Fixture::new();
        let mut g = Graphics::for_tile();
        let path = Path::new().line_to(5.0, 5.0).line_to(10.0, 0.0).close();
        let content = fx.run(&mut g, |g, t| g.fill(t, &path)).expect("draw");
        assert_eq!(content, "0 0 0 rg\n5 5 m\n10 0 l\nh\nf\n");
    }

    #[test]
    fn transform_and_clip_are_scoped_by_save() {
        let mut fx = Fixture::new();
        let mut g = Graphics::for_tile();
        let content = fx
            .run(&mut g, |g, t| {
                g.translate(5.0, 5.0);
                g.clip(&Path::rect(0.0, 0.0, 20.0, 20.0));
                g.fill(t, &square())?;
                g.reset_clip();
                g.set_transform(Transform::IDENTITY);
                g.fill(t, &square())
            })
            .expect("draw");
        assert!(content.starts_with("q\n5 5 m\n25 5 l\n25 25 l\n5 25 l\nh\nW n\n1 0 0 1 5 5 cm\n"));
        assert_eq!(count_op(&content, "q"), 1);
        assert_balanced(&content);
        assert_eq!(g.depth(), 0);
    }

    #[test]
    fn alpha_is_reset_after_translucent_draw() {
        let mut fx = Fixture::new();
        let mut g = Graphics::for_tile();
        let content = fx
            .run(&mut g, |g, t| {
                g.set_color(Color::rgba(0, 0, 0, 128));
                g.fill(t, &square())?;
                g.set_color(Color::BLACK);
                g.fill(t, &square())
            })
            .expect("draw");
        assert_eq!(count_op(&content, "gs"), 2);
        assert!(content.contains("/GS1 gs"));
        assert!(content.contains("/GS2 gs"));
    }

    #[test]
    fn stroke_attributes_are_diffed() {
        let mut fx = Fixture::new();
        let mut g = Graphics::for_tile();
        let content = fx
            .run(&mut g, |g, t| {
                g.set_stroke(Stroke::new(2.0));
                g.draw(t, &square())?;
                g.set_stroke(Stroke::new(2.0).with_cap(LineCap::Round));
                g.draw(t, &square())
            })
            .expect("draw");
        assert_eq!(count_op(&content, "w"), 1);
        assert_eq!(count_op(&content, "J"), 2);
        assert_eq!(count_op(&content, "S"), 2);
    }

    #[test]
    fn transparency_is_rejected_before_any_operator() {
        let mut fx = Fixture::new();
        fx.conformance.forbid_transparency = true;
        let mut g = Graphics::for_tile();
        let err = fx
            .run(&mut g, |g, t| {
                g.set_color(Color::rgba(0, 0, 0, 10));
                g.fill(t, &square())
            })
            .expect_err("transparency");
        assert!(matches!(err, PdfPaintError::ConformanceViolation(_)));
        assert!(fx.page.content().is_empty());
    }

    #[test]
    fn repeating_gradient_is_rasterized() {
        let mut fx = Fixture::new();
        let mut g = Graphics::for_tile();
        let gradient = LinearGradient::two_color(
            Point::new(0.0, 0.0),
            Color::BLACK,
            Point::new(10.0, 0.0),
            Color::WHITE,
            true,
        );
        let content = fx
            .run(&mut g, |g, t| {
                g.set_paint(Paint::Linear(gradient));
                g.fill(t, &square())
            })
            .expect("draw");
        assert_eq!(count_op(&content, "Do"), 1);
        assert_eq!(count_op(&content, "W"), 1);
        assert!(content.contains("50 0 0 -50 10 60 cm"));
        assert_balanced(&content);
        assert_eq!(fx.registry.counts().images, 1);
        assert_eq!(fx.registry.counts().shadings, 0);
        assert_eq!(g.stats().rasterized, 1);
        let events = g.take_raster_events();
        assert_eq!(events.len(), 1);
        assert_eq!((events[0].cols, events[0].rows), (50, 50));
    }

    #[test]
    fn native_gradient_selects_a_pattern() {
        let mut fx = Fixture::new();
        let mut g = Graphics::for_tile();
        let gradient = LinearGradient::new(
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            vec![
                GradientStop::new(0.0, Color::rgb(255, 0, 0)),
                GradientStop::new(1.0, Color::rgb(0, 0, 255)),
            ],
            CycleMethod::NoCycle,
        )
        .expect("gradient");
        let content = fx
            .run(&mut g, |g, t| {
                g.set_paint(Paint::Linear(gradient));
                g.fill(t, &square())
            })
            .expect("draw");
        assert!(content.starts_with("/Pattern cs /P1 scn\n"));
        assert_eq!(fx.registry.counts().shadings, 1);
    }

    #[test]
    fn tiling_pattern_renders_tile_once() {
        let mut fx = Fixture::new();
        let mut g = Graphics::for_tile();
        let pattern = TilingPattern::new(
            Rect::new(0.0, 0.0, 8.0, 8.0),
            vec![
                TileOp::SetPaint(Paint::Solid(Color::rgb(0, 128, 0))),
                TileOp::Fill(Path::rect(0.0, 0.0, 4.0, 4.0)),
            ],
        )
        .expect("pattern");
        let content = fx
            .run(&mut g, |g, t| {
                g.set_paint(Paint::Pattern(pattern));
                g.fill(t, &square())?;
                g.fill(t, &square())
            })
            .expect("draw");
        assert_eq!(count_op(&content, "scn"), 1);
        assert_eq!(fx.registry.counts().tilings, 1);
    }

    #[test]
    fn text_selects_font_outside_save() {
        let mut fx = Fixture::new();
        let font = fx.fonts.base14("Helvetica").expect("font");
        let run = TextRun::from_text(&fx.fonts, font, 12.0, Point::new(10.0, 20.0), "Hi")
            .expect("run");
        let mut g = Graphics::for_tile();
        let content = fx
            .run(&mut g, |g, t| {
                g.draw_text(t, &run)?;
                g.draw_text(t, &run)
            })
            .expect("draw");
        assert!(content.starts_with("/F1 12 Tf\nq\n"));
        assert_eq!(count_op(&content, "Tf"), 1);
        assert_eq!(count_op(&content, "BT"), 2);
        assert_balanced(&content);
    }

    #[test]
    fn page_tracker_closes_its_own_save() {
        let mut fx = Fixture::new();
        fx.page.content_mut().save();
        let mut g = Graphics::for_page(Transform::IDENTITY);
        assert_eq!(g.depth(), 1);
        let content = fx
            .run(&mut g, |g, t| {
                g.translate(1.0, 1.0);
                g.fill(t, &square())?;
                g.finish(t);
                Ok(())
            })
            .expect("draw");
        assert_balanced(&content);
        assert_eq!(g.depth(), 0);
    }
}
