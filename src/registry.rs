use crate::content::fmt;
use crate::error::{PdfPaintError, Result};
use crate::font::{self, FontCatalog, FontHandle};
use crate::image::{ImageData, image_object, image_smask_object};
use crate::shading::{ShadingSpec, shading_pattern_objects, tiling_pattern_object};
use crate::text::Glyph;
use crate::types::{ColorSpace, Rect, Transform};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::io::{self, Write};

pub(crate) const PDF_CATALOG_ID: usize = 1;
pub(crate) const PDF_PAGES_ID: usize = 2;
pub(crate) const PDF_PAGE_NODE_MAX_KIDS: usize = 256;

const PDF_HEADER: &[u8] = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n";

/// Sequential object writer with xref bookkeeping.
pub(crate) struct PdfWriter<'a, W: Write> {
    writer: &'a mut W,
    offset: usize,
    offsets: Vec<usize>, // index by object id; 0 is the free object.
    next_id: usize,
}

impl<'a, W: Write> PdfWriter<'a, W> {
    pub(crate) fn new(writer: &'a mut W) -> io::Result<Self> {
        let mut s = Self {
            writer,
            offset: 0,
            offsets: vec![0; PDF_PAGES_ID + 1],
            next_id: PDF_PAGES_ID + 1,
        };
        s.write_bytes(PDF_HEADER)?;
        Ok(s)
    }

    pub(crate) fn next_id(&self) -> usize {
        self.next_id
    }

    pub(crate) fn alloc_ids(&mut self, count: usize) -> usize {
        let start = self.next_id;
        self.next_id = self.next_id.saturating_add(count);
        if self.offsets.len() < self.next_id {
            self.offsets.resize(self.next_id, 0);
        }
        start
    }

    pub(crate) fn write_object(&mut self, obj_id: usize, body: &str) -> io::Result<()> {
        if let Some(slot) = self.offsets.get_mut(obj_id) {
            *slot = self.offset;
        }
        self.write_bytes(format!("{} 0 obj\n", obj_id).as_bytes())?;
        self.write_bytes(body.as_bytes())?;
        self.write_bytes(b"\nendobj\n")
    }

    fn write_bytes(&mut self, data: &[u8]) -> io::Result<()> {
        self.writer.write_all(data)?;
        self.offset += data.len();
        Ok(())
    }

    /// Writes the xref table and trailer, then flushes the sink.
    pub(crate) fn finish(&mut self, info_id: Option<usize>) -> io::Result<usize> {
        let total_objects = self.next_id.saturating_sub(1);
        let xref_start = self.offset;
        self.write_bytes(format!("xref\n0 {}\n", total_objects + 1).as_bytes())?;
        self.write_bytes(b"0000000000 65535 f \n")?;
        for id in 1..=total_objects {
            let obj_offset = self.offsets.get(id).copied().unwrap_or(0);
            self.write_bytes(format!("{:010} 00000 n \n", obj_offset).as_bytes())?;
        }
        let mut trailer = format!(
            "trailer\n<< /Size {} /Root {} 0 R",
            total_objects + 1,
            PDF_CATALOG_ID
        );
        if let Some(id) = info_id {
            trailer.push_str(&format!(" /Info {} 0 R", id));
        }
        trailer.push_str(&format!(" >>\nstartxref\n{}\n%%EOF", xref_start));
        self.write_bytes(trailer.as_bytes())?;
        self.writer.flush()?;
        Ok(self.offset)
    }
}

/// Resource names and object ids referenced by one content stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct UsedResources {
    fonts: BTreeMap<String, usize>,
    xobjects: BTreeMap<String, usize>,
    patterns: BTreeMap<String, usize>,
    gstates: BTreeMap<String, usize>,
}

impl UsedResources {
    pub(crate) fn add(&mut self, kind: ResourceKind, name: &str, id: usize) {
        let map = match kind {
            ResourceKind::Font => &mut self.fonts,
            ResourceKind::XObject => &mut self.xobjects,
            ResourceKind::Pattern => &mut self.patterns,
            ResourceKind::ExtGState => &mut self.gstates,
        };
        map.entry(name.to_string()).or_insert(id);
    }

    pub(crate) fn count(&self, kind: ResourceKind) -> usize {
        match kind {
            ResourceKind::Font => self.fonts.len(),
            ResourceKind::XObject => self.xobjects.len(),
            ResourceKind::Pattern => self.patterns.len(),
            ResourceKind::ExtGState => self.gstates.len(),
        }
    }

    /// Inline resource dictionary.
    pub(crate) fn to_dict(&self) -> String {
        let mut out = String::from("<<");
        for (key, map) in [
            ("Font", &self.fonts),
            ("XObject", &self.xobjects),
            ("Pattern", &self.patterns),
            ("ExtGState", &self.gstates),
        ] {
            if map.is_empty() {
                continue;
            }
            let entries = map
                .iter()
                .map(|(name, id)| format!("/{} {} 0 R", name, id))
                .collect::<Vec<_>>()
                .join(" ");
            out.push_str(&format!(" /{} << {} >>", key, entries));
        }
        out.push_str(" >>");
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResourceKind {
    Font,
    XObject,
    Pattern,
    ExtGState,
}

/// Running totals of distinct resources written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceCounts {
    pub fonts: usize,
    pub images: usize,
    pub image_bytes: usize,
    pub shadings: usize,
    pub tilings: usize,
    pub ext_gstates: usize,
}

/// A registered image XObject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ImageEntry {
    pub(crate) name: String,
    pub(crate) id: usize,
    pub(crate) has_alpha: bool,
    pub(crate) space: ColorSpace,
}

#[derive(Debug)]
struct FontEntry {
    name: String,
    start_id: usize,
    glyphs: BTreeMap<u16, String>,
}

/// Document-wide resource deduplication. Objects are queued as pending and
/// written by [`ResourceRegistry::flush`]; a flushed object is never rewritten.
#[derive(Debug)]
pub(crate) struct ResourceRegistry {
    reuse_xobjects: bool,
    pending: Vec<(usize, String)>,
    images: HashMap<String, ImageEntry>,
    image_content: HashMap<[u8; 32], ImageEntry>,
    next_image: usize,
    patterns: HashMap<[u8; 32], (String, usize)>,
    next_pattern: usize,
    gstates: HashMap<(u8, u8), (String, usize)>,
    next_gstate: usize,
    fonts: BTreeMap<FontHandle, FontEntry>,
    counts: ResourceCounts,
}

impl ResourceRegistry {
    pub(crate) fn new(reuse_xobjects: bool) -> Self {
        Self {
            reuse_xobjects,
            pending: Vec::new(),
            images: HashMap::new(),
            image_content: HashMap::new(),
            next_image: 1,
            patterns: HashMap::new(),
            next_pattern: 1,
            gstates: HashMap::new(),
            next_gstate: 1,
            fonts: BTreeMap::new(),
            counts: ResourceCounts::default(),
        }
    }

    pub(crate) fn counts(&self) -> ResourceCounts {
        self.counts
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn flush<W: Write>(&mut self, writer: &mut PdfWriter<'_, W>) -> io::Result<()> {
        for (id, body) in self.pending.drain(..) {
            writer.write_object(id, &body)?;
        }
        Ok(())
    }

    /// Image XObject for `key`; `produce` runs only on a miss.
    pub(crate) fn image<W: Write>(
        &mut self,
        writer: &mut PdfWriter<'_, W>,
        key: &str,
        produce: &mut dyn FnMut() -> Result<ImageData>,
    ) -> Result<ImageEntry> {
        if self.reuse_xobjects {
            if let Some(hit) = self.images.get(key) {
                return Ok(hit.clone());
            }
        }
        let image = produce()?;
        let hash = image.content_hash();
        if self.reuse_xobjects {
            if let Some(hit) = self.image_content.get(&hash).cloned() {
                self.images.insert(key.to_string(), hit.clone());
                return Ok(hit);
            }
        }

        let smask_id = image.alpha.as_ref().map(|_| writer.alloc_ids(1));
        let obj_id = writer.alloc_ids(1);
        let name = format!("Im{}", self.next_image);
        self.next_image += 1;

        if let (Some(alpha), Some(mask_id)) = (image.alpha.as_ref(), smask_id) {
            self.pending
                .push((mask_id, image_smask_object(&image, alpha)));
        }
        self.pending.push((obj_id, image_object(&image, smask_id)));
        self.counts.images += 1;
        self.counts.image_bytes += image.byte_len();

        let entry = ImageEntry {
            name,
            id: obj_id,
            has_alpha: image.alpha.is_some(),
            space: image.space(),
        };
        if self.reuse_xobjects {
            self.images.insert(key.to_string(), entry.clone());
            self.image_content.insert(hash, entry.clone());
        }
        self.flush(writer)?;
        Ok(entry)
    }

    pub(crate) fn shading_pattern<W: Write>(
        &mut self,
        writer: &mut PdfWriter<'_, W>,
        spec: &ShadingSpec,
    ) -> (String, usize) {
        let key = content_key(&[b"shading", spec.cache_text().as_bytes()]);
        if let Some(hit) = self.patterns.get(&key) {
            return hit.clone();
        }
        let start = writer.next_id();
        let (objects, pattern_id, next) = shading_pattern_objects(spec, start);
        writer.alloc_ids(next - start);
        for (offset, body) in objects.into_iter().enumerate() {
            self.pending.push((start + offset, body));
        }
        self.counts.shadings += 1;
        self.insert_pattern(key, pattern_id)
    }

    pub(crate) fn tiling_pattern<W: Write>(
        &mut self,
        writer: &mut PdfWriter<'_, W>,
        content: &str,
        resources: &str,
        tile: &Rect,
        matrix: &Transform,
    ) -> (String, usize) {
        let body = tiling_pattern_object(content, resources, tile, matrix);
        let key = content_key(&[b"tiling", body.as_bytes()]);
        if let Some(hit) = self.patterns.get(&key) {
            return hit.clone();
        }
        let id = writer.alloc_ids(1);
        self.pending.push((id, body));
        self.counts.tilings += 1;
        self.insert_pattern(key, id)
    }

    fn insert_pattern(&mut self, key: [u8; 32], id: usize) -> (String, usize) {
        let entry = (format!("P{}", self.next_pattern), id);
        self.next_pattern += 1;
        self.patterns.insert(key, entry.clone());
        entry
    }

    pub(crate) fn ext_gstate<W: Write>(
        &mut self,
        writer: &mut PdfWriter<'_, W>,
        fill: u8,
        stroke: u8,
    ) -> (String, usize) {
        if let Some(hit) = self.gstates.get(&(fill, stroke)) {
            return hit.clone();
        }
        let id = writer.alloc_ids(1);
        let name = format!("GS{}", self.next_gstate);
        self.next_gstate += 1;
        self.pending.push((
            id,
            format!(
                "<< /Type /ExtGState /ca {} /CA {} >>",
                fmt(fill as f64 / 255.0),
                fmt(stroke as f64 / 255.0)
            ),
        ));
        self.counts.ext_gstates += 1;
        let entry = (name, id);
        self.gstates.insert((fill, stroke), entry.clone());
        entry
    }

    /// Reserves ids for `font`; objects are written by [`Self::write_fonts`].
    pub(crate) fn font<W: Write>(
        &mut self,
        writer: &mut PdfWriter<'_, W>,
        catalog: &FontCatalog,
        handle: FontHandle,
    ) -> Result<(String, usize)> {
        let entry = catalog
            .get(handle)
            .ok_or_else(|| PdfPaintError::Font(format!("unknown font handle {}", handle.0)))?;
        if let Some(existing) = self.fonts.get(&handle) {
            return Ok((
                existing.name.clone(),
                font::font_object_id(entry, existing.start_id),
            ));
        }
        let start_id = writer.alloc_ids(font::object_count(entry));
        let name = format!("F{}", self.fonts.len() + 1);
        self.fonts.insert(
            handle,
            FontEntry {
                name: name.clone(),
                start_id,
                glyphs: BTreeMap::new(),
            },
        );
        self.counts.fonts += 1;
        Ok((name, font::font_object_id(entry, start_id)))
    }

    pub(crate) fn record_glyphs(&mut self, handle: FontHandle, glyphs: &[Glyph]) {
        if let Some(entry) = self.fonts.get_mut(&handle) {
            for glyph in glyphs {
                let text = entry.glyphs.entry(glyph.code).or_default();
                if text.is_empty() {
                    if let Some(ch) = glyph.ch {
                        text.push(ch);
                    }
                }
            }
        }
    }

    pub(crate) fn write_fonts<W: Write>(
        &mut self,
        writer: &mut PdfWriter<'_, W>,
        catalog: &FontCatalog,
    ) -> io::Result<()> {
        for (handle, entry) in &self.fonts {
            let Some(font) = catalog.get(*handle) else {
                continue;
            };
            let objects = font::font_objects(font, &entry.glyphs, entry.start_id);
            for (offset, body) in objects.iter().enumerate() {
                writer.write_object(entry.start_id + offset, body)?;
            }
        }
        Ok(())
    }
}

/// SHA-256 over length-prefixed parts.
pub(crate) fn content_key(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    hasher.finalize().into()
}

pub(crate) fn stream_object(content: &str) -> String {
    format!(
        "<< /Length {} >>\nstream\n{}\nendstream",
        content.len(),
        content
    )
}

pub(crate) fn ascii_hex_encode(data: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(data.len() * 2 + data.len() / 32);
    for (index, byte) in data.iter().enumerate() {
        let _ = write!(&mut out, "{:02X}", byte);
        if index % 32 == 31 {
            out.push('\n');
        }
    }
    out
}

pub(crate) fn flate_compress(data: &[u8]) -> io::Result<Vec<u8>> {
    use flate2::Compression;
    use flate2::write::ZlibEncoder;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// A PDF text string: a literal when `input` is ASCII, otherwise UTF-16BE
/// hex behind a byte-order mark.
pub(crate) fn pdf_text_string(input: &str) -> String {
    use std::fmt::Write;

    if input.is_ascii() {
        return format!("({})", escape_pdf_string(input));
    }
    let mut out = String::from("<FEFF");
    for unit in input.encode_utf16() {
        let _ = write!(&mut out, "{:04X}", unit);
    }
    out.push('>');
    out
}

fn escape_pdf_string(input: &str) -> String {
    let mut out = String::new();
    for ch in input.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paint::GradientStop;
    use crate::shading::ShadingGeometry;
    use crate::types::{Color, Point};

    #[test]
    fn text_strings_use_utf16_only_when_needed() {
        assert_eq!(pdf_text_string("Q3 (draft)\\x"), "(Q3 \\(draft\\)\\\\x)");
        assert_eq!(pdf_text_string("Café"), "<FEFF00430061006600E9>");
        assert_eq!(pdf_text_string("\u{1F600}"), "<FEFFD83DDE00>");
    }

    fn spec() -> ShadingSpec {
        ShadingSpec::new(
            ShadingGeometry::Axial {
                start: Point::new(0.0, 0.0),
                end: Point::new(10.0, 0.0),
            },
            &[
                GradientStop::new(0.0, Color::BLACK),
                GradientStop::new(1.0, Color::WHITE),
            ],
            Transform::IDENTITY,
        )
    }

    fn count_objects(bytes: &[u8]) -> usize {
        String::from_utf8_lossy(bytes).matches(" 0 obj\n").count()
    }

    #[test]
    fn writer_emits_header_xref_and_trailer() {
        let mut out = Vec::new();
        {
            let mut writer = PdfWriter::new(&mut out).expect("writer");
            writer
                .write_object(PDF_CATALOG_ID, "<< /Type /Catalog /Pages 2 0 R >>")
                .expect("catalog");
            writer
                .write_object(PDF_PAGES_ID, "<< /Type /Pages /Kids [] /Count 0 >>")
                .expect("pages");
            writer.finish(None).expect("finish");
        }
        let text = String::from_utf8_lossy(&out);
        assert!(text.starts_with("%PDF-1.4\n"));
        assert!(text.contains("xref\n0 3\n0000000000 65535 f \n"));
        assert!(text.contains("0000000015 00000 n \n"));
        assert!(text.ends_with("%%EOF"));
    }

    #[test]
    fn same_shading_twice_is_one_object_set() {
        let mut out = Vec::new();
        let mut writer = PdfWriter::new(&mut out).expect("writer");
        let mut registry = ResourceRegistry::new(true);
        let first = registry.shading_pattern(&mut writer, &spec());
        let second = registry.shading_pattern(&mut writer, &spec());
        assert_eq!(first, second);
        assert_eq!(registry.counts().shadings, 1);
        registry.flush(&mut writer).expect("flush");
        assert_eq!(registry.pending_len(), 0);
        drop(writer);
        // function, shading, pattern
        assert_eq!(count_objects(&out), 3);
    }

    #[test]
    fn ext_gstates_are_keyed_by_alpha_pair() {
        let mut out = Vec::new();
        let mut writer = PdfWriter::new(&mut out).expect("writer");
        let mut registry = ResourceRegistry::new(true);
        let a = registry.ext_gstate(&mut writer, 128, 255);
        let b = registry.ext_gstate(&mut writer, 128, 255);
        let c = registry.ext_gstate(&mut writer, 255, 128);
        assert_eq!(a, b);
        assert_ne!(a.0, c.0);
        registry.flush(&mut writer).expect("flush");
        drop(writer);
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("/ca 0.50196078 /CA 1"));
    }

    #[test]
    fn images_are_produced_once_per_key() {
        let mut out = Vec::new();
        let mut writer = PdfWriter::new(&mut out).expect("writer");
        let mut registry = ResourceRegistry::new(true);
        let mut calls = 0;
        let mut produce = || {
            calls += 1;
            ImageData::from_rgba(1, 1, &[1, 2, 3, 255])
        };
        let a = registry.image(&mut writer, "k", &mut produce).expect("image");
        let b = registry.image(&mut writer, "k", &mut produce).expect("image");
        assert_eq!(a, b);
        assert_eq!(calls, 1);
        // Flushed on registration.
        assert_eq!(registry.pending_len(), 0);
    }

    #[test]
    fn identical_pixels_under_different_keys_share_an_object() {
        let mut out = Vec::new();
        let mut writer = PdfWriter::new(&mut out).expect("writer");
        let mut registry = ResourceRegistry::new(true);
        let mut produce = || ImageData::from_rgba(1, 1, &[9, 9, 9, 255]);
        let a = registry.image(&mut writer, "a", &mut produce).expect("image");
        let b = registry.image(&mut writer, "b", &mut produce).expect("image");
        assert_eq!(a, b);
        assert_eq!(registry.counts().images, 1);
    }

    #[test]
    fn used_resources_render_inline_dictionary() {
        let mut used = UsedResources::default();
        assert_eq!(used.to_dict(), "<< >>");
        used.add(ResourceKind::Font, "F1", 7);
        used.add(ResourceKind::Pattern, "P2", 9);
        used.add(ResourceKind::Font, "F1", 7);
        assert_eq!(used.count(ResourceKind::Font), 1);
        assert_eq!(
            used.to_dict(),
            "<< /Font << /F1 7 0 R >> /Pattern << /P2 9 0 R >> >>"
        );
    }

    #[test]
    fn content_key_separates_parts() {
        assert_ne!(content_key(&[b"ab", b"c"]), content_key(&[b"a", b"bc"]));
    }
}
