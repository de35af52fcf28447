use crate::content::{fmt, fmt_matrix};
use crate::paint::GradientStop;
use crate::types::{Point, Rect, Transform};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ShadingGeometry {
    Axial {
        start: Point,
        end: Point,
    },
    /// Focus circle has radius zero; the outer circle is `center`/`radius`.
    Radial {
        focus: Point,
        center: Point,
        radius: f64,
    },
}

/// A gradient resolved into device-anchored shading form.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadingSpec {
    geometry: ShadingGeometry,
    stops: Vec<GradientStop>,
    matrix: Transform,
}

impl ShadingSpec {
    pub(crate) fn new(geometry: ShadingGeometry, stops: &[GradientStop], matrix: Transform) -> Self {
        let mut stops = stops.to_vec();
        // Repeated endpoint stops would give zero-width segments; keep the
        // last stop at 0 and the first stop at 1.
        while stops.len() > 2 && stops[0].offset <= 0.0 && stops[1].offset <= 0.0 {
            stops.remove(0);
        }
        while stops.len() > 2
            && stops[stops.len() - 1].offset >= 1.0
            && stops[stops.len() - 2].offset >= 1.0
        {
            stops.pop();
        }
        // The shading domain is always 0..1; pad with the end colors.
        if let Some(first) = stops.first().copied() {
            if first.offset > 0.0 {
                stops.insert(0, GradientStop::new(0.0, first.color));
            }
        }
        if let Some(last) = stops.last().copied() {
            if last.offset < 1.0 {
                stops.push(GradientStop::new(1.0, last.color));
            }
        }
        Self {
            geometry,
            stops,
            matrix,
        }
    }

    pub(crate) fn geometry(&self) -> &ShadingGeometry {
        &self.geometry
    }

    pub fn stops(&self) -> &[GradientStop] {
        &self.stops
    }

    pub fn matrix(&self) -> Transform {
        self.matrix
    }

    /// Interior stop offsets, written as the stitching function's `/Bounds`.
    pub fn bounds(&self) -> Vec<f64> {
        if self.stops.len() <= 2 {
            return Vec::new();
        }
        self.stops[1..self.stops.len() - 1]
            .iter()
            .map(|s| s.offset)
            .collect()
    }

    pub(crate) fn cache_text(&self) -> String {
        format!("{:?}", self)
    }
}

/// Objects for a shading pattern, in id order starting at `start_id`:
/// segment functions, optional stitching function, shading, pattern.
/// Returns the objects, the pattern object id and the next free id.
pub(crate) fn shading_pattern_objects(
    spec: &ShadingSpec,
    start_id: usize,
) -> (Vec<String>, usize, usize) {
    let (mut objects, fun_id, mut next_id) = gradient_function_objects(&spec.stops, start_id);

    let shading_id = next_id;
    next_id += 1;
    let shading = match spec.geometry {
        ShadingGeometry::Axial { start, end } => format!(
            "<< /ShadingType 2 /ColorSpace /DeviceRGB /Coords [{} {} {} {}] /Function {} 0 R /Extend [true true] >>",
            fmt(start.x),
            fmt(start.y),
            fmt(end.x),
            fmt(end.y),
            fun_id
        ),
        ShadingGeometry::Radial {
            focus,
            center,
            radius,
        } => format!(
            "<< /ShadingType 3 /ColorSpace /DeviceRGB /Coords [{} {} 0 {} {} {}] /Function {} 0 R /Extend [true true] >>",
            fmt(focus.x),
            fmt(focus.y),
            fmt(center.x),
            fmt(center.y),
            fmt(radius),
            fun_id
        ),
    };
    objects.push(shading);

    let pattern_id = next_id;
    next_id += 1;
    objects.push(format!(
        "<< /Type /Pattern /PatternType 2 /Shading {} 0 R /Matrix [{}] >>",
        shading_id,
        fmt_matrix(&spec.matrix)
    ));

    (objects, pattern_id, next_id)
}

fn gradient_function_objects(
    stops: &[GradientStop],
    start_id: usize,
) -> (Vec<String>, usize, usize) {
    // N stops: N-1 Type 2 functions, stitched by a Type 3 function when N > 2.
    let mut objects: Vec<String> = Vec::new();
    let mut next_id = start_id;

    let mut seg_fun_ids: Vec<usize> = Vec::new();
    for pair in stops.windows(2) {
        seg_fun_ids.push(next_id);
        next_id += 1;
        objects.push(format!(
            "<< /FunctionType 2 /Domain [0 1] /C0 [{}] /C1 [{}] /N 1 >>",
            components(&pair[0]),
            components(&pair[1]),
        ));
    }

    if seg_fun_ids.len() == 1 {
        return (objects, seg_fun_ids[0], next_id);
    }

    let stitch_id = next_id;
    next_id += 1;
    let bounds = stops[1..stops.len() - 1]
        .iter()
        .map(|s| fmt(s.offset))
        .collect::<Vec<_>>()
        .join(" ");
    let encode = vec!["0 1"; seg_fun_ids.len()].join(" ");
    let fun_refs = seg_fun_ids
        .iter()
        .map(|id| format!("{} 0 R", id))
        .collect::<Vec<_>>()
        .join(" ");
    objects.push(format!(
        "<< /FunctionType 3 /Domain [0 1] /Functions [{}] /Bounds [{}] /Encode [{}] >>",
        fun_refs, bounds, encode,
    ));

    (objects, stitch_id, next_id)
}

fn components(stop: &GradientStop) -> String {
    stop.color
        .rgb_components()
        .iter()
        .map(|v| fmt(*v))
        .collect::<Vec<_>>()
        .join(" ")
}

/// A tiling pattern object whose cell content is `content`.
pub(crate) fn tiling_pattern_object(
    content: &str,
    resources: &str,
    tile: &Rect,
    matrix: &Transform,
) -> String {
    format!(
        "<< /Type /Pattern /PatternType 1 /PaintType 1 /TilingType 1 /BBox [{} {} {} {}] /XStep {} /YStep {} /Resources {} /Matrix [{}] /Length {} >>\nstream\n{}\nendstream",
        fmt(tile.x),
        fmt(tile.y),
        fmt(tile.right()),
        fmt(tile.bottom()),
        fmt(tile.width),
        fmt(tile.height),
        resources,
        fmt_matrix(matrix),
        content.len(),
        content
    )
}
