use crate::content::ContentStream;
use crate::types::{FillRule, Point, Rect, Transform};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Segment {
    MoveTo(Point),
    LineTo(Point),
    CubicTo(Point, Point, Point),
    QuadTo(Point, Point),
    Close,
}

impl Segment {
    fn map(self, t: &Transform) -> Segment {
        match self {
            Segment::MoveTo(p) => Segment::MoveTo(t.apply(p)),
            Segment::LineTo(p) => Segment::LineTo(t.apply(p)),
            Segment::CubicTo(c1, c2, p) => Segment::CubicTo(t.apply(c1), t.apply(c2), t.apply(p)),
            Segment::QuadTo(c, p) => Segment::QuadTo(t.apply(c), t.apply(p)),
            Segment::Close => Segment::Close,
        }
    }
}

/// A shape outline plus the winding rule used to fill or clip it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Path {
    segments: Vec<Segment>,
    fill_rule: FillRule,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_segments(segments: Vec<Segment>, fill_rule: FillRule) -> Self {
        Self {
            segments,
            fill_rule,
        }
    }

    pub fn rect(x: f64, y: f64, width: f64, height: f64) -> Self {
        Path::new()
            .move_to(x, y)
            .line_to(x + width, y)
            .line_to(x + width, y + height)
            .line_to(x, y + height)
            .close()
    }

    pub fn move_to(mut self, x: f64, y: f64) -> Self {
        self.segments.push(Segment::MoveTo(Point::new(x, y)));
        self
    }

    pub fn line_to(mut self, x: f64, y: f64) -> Self {
        self.segments.push(Segment::LineTo(Point::new(x, y)));
        self
    }

    pub fn cubic_to(mut self, x1: f64, y1: f64, x2: f64, y2: f64, x: f64, y: f64) -> Self {
        self.segments.push(Segment::CubicTo(
            Point::new(x1, y1),
            Point::new(x2, y2),
            Point::new(x, y),
        ));
        self
    }

    pub fn quad_to(mut self, x1: f64, y1: f64, x: f64, y: f64) -> Self {
        self.segments
            .push(Segment::QuadTo(Point::new(x1, y1), Point::new(x, y)));
        self
    }

    pub fn close(mut self) -> Self {
        self.segments.push(Segment::Close);
        self
    }

    pub fn with_fill_rule(mut self, rule: FillRule) -> Self {
        self.fill_rule = rule;
        self
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn fill_rule(&self) -> FillRule {
        self.fill_rule
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether [`emit_path`] would write anything: a path holding only
    /// closes has no current point to paint.
    pub(crate) fn has_geometry(&self) -> bool {
        self.segments.iter().any(|s| !matches!(s, Segment::Close))
    }

    /// Control-point bounds; always contains the curve.
    pub fn bounds(&self) -> Option<Rect> {
        let mut points = self.segments.iter().flat_map(segment_points);
        let first = points.next()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Rect::from_extents(min_x, min_y, max_x, max_y))
    }

    pub fn transformed(&self, t: &Transform) -> Path {
        Path {
            segments: self.segments.iter().map(|s| s.map(t)).collect(),
            fill_rule: self.fill_rule,
        }
    }
}

fn segment_points(seg: &Segment) -> Vec<Point> {
    match *seg {
        Segment::MoveTo(p) | Segment::LineTo(p) => vec![p],
        Segment::CubicTo(c1, c2, p) => vec![c1, c2, p],
        Segment::QuadTo(c, p) => vec![c, p],
        Segment::Close => Vec::new(),
    }
}

/// Writes path-construction operators for `segments` into `out`.
///
/// Coordinates are written as given. A drawing segment that arrives with no
/// current point starts a new subpath at its end point (`m`), and a close with
/// no current point is dropped. Quadratic segments are written as the
/// equivalent cubic. Returns the number of operators written.
pub(crate) fn emit_path<I>(out: &mut ContentStream, segments: I) -> usize
where
    I: IntoIterator<Item = Segment>,
{
    let mut current: Option<Point> = None;
    let mut start: Option<Point> = None;
    let mut written = 0;
    for seg in segments {
        match seg {
            Segment::MoveTo(p) => {
                out.move_to(p);
                current = Some(p);
                start = Some(p);
            }
            Segment::LineTo(p) => {
                match current {
                    Some(_) => out.line_to(p),
                    None => {
                        out.move_to(p);
                        start = Some(p);
                    }
                }
                current = Some(p);
            }
            Segment::CubicTo(c1, c2, p) => {
                match current {
                    Some(_) => out.curve_to(c1, c2, p),
                    None => {
                        out.move_to(p);
                        start = Some(p);
                    }
                }
                current = Some(p);
            }
            Segment::QuadTo(c, p) => {
                match current {
                    Some(p0) => {
                        let (c1, c2) = elevate_quad(p0, c, p);
                        out.curve_to(c1, c2, p);
                    }
                    None => {
                        out.move_to(p);
                        start = Some(p);
                    }
                }
                current = Some(p);
            }
            Segment::Close => {
                if current.is_none() {
                    continue;
                }
                out.close_path();
                current = start;
            }
        }
        written += 1;
    }
    written
}

fn elevate_quad(p0: Point, c: Point, p: Point) -> (Point, Point) {
    let c1 = Point::new(
        p0.x + 2.0 / 3.0 * (c.x - p0.x),
        p0.y + 2.0 / 3.0 * (c.y - p0.y),
    );
    let c2 = Point::new(p.x + 2.0 / 3.0 * (c.x - p.x), p.y + 2.0 / 3.0 * (c.y - p.y));
    (c1, c2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emitted(path: &Path) -> String {
        let mut out = ContentStream::new();
        emit_path(&mut out, path.segments().iter().copied());
        out.as_str().to_string()
    }

    #[test]
    fn empty_path_emits_nothing() {
        let mut out = ContentStream::new();
        assert_eq!(emit_path(&mut out, std::iter::empty()), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn segments_map_one_to_one() {
        let path = Path::new()
            .move_to(0.0, 0.0)
            .line_to(10.0, 0.0)
            .cubic_to(10.0, 5.0, 5.0, 10.0, 0.0, 10.0)
            .close();
        assert_eq!(emitted(&path), "0 0 m\n10 0 l\n10 5 5 10 0 10 c\nh\n");
    }

    #[test]
    fn quad_is_written_as_equivalent_cubic() {
        let path = Path::new().move_to(0.0, 0.0).quad_to(3.0, 3.0, 6.0, 0.0);
        assert_eq!(emitted(&path), "0 0 m\n2 2 4 2 6 0 c\n");
    }

    #[test]
    fn missing_move_to_starts_subpath_at_segment_end() {
        let path = Path::new().line_to(5.0, 5.0).line_to(10.0, 0.0).close();
        assert_eq!(emitted(&path), "5 5 m\n10 0 l\nh\n");

        let path = Path::new().close().cubic_to(1.0, 1.0, 2.0, 2.0, 3.0, 3.0);
        assert_eq!(emitted(&path), "3 3 m\n");
    }

    #[test]
    fn close_returns_to_subpath_start_for_quads() {
        let path = Path::new()
            .move_to(0.0, 0.0)
            .line_to(6.0, 0.0)
            .close()
            .quad_to(3.0, 3.0, 6.0, 0.0);
        assert!(emitted(&path).ends_with("h\n2 2 4 2 6 0 c\n"));
    }

    #[test]
    fn bounds_cover_control_points() {
        let path = Path::new().move_to(1.0, 2.0).cubic_to(-4.0, 0.0, 8.0, 9.0, 3.0, 3.0);
        assert_eq!(path.bounds(), Some(Rect::from_extents(-4.0, 0.0, 8.0, 9.0)));
        assert_eq!(Path::new().bounds(), None);
    }
}
