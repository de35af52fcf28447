use crate::error::{PdfPaintError, Result};
use crate::registry::{ascii_hex_encode, stream_object};
use crate::text::Glyph;
use std::collections::{BTreeMap, HashMap};
use ttf_parser::GlyphId;

/// Index of a font registered in a [`FontCatalog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FontHandle(pub(crate) usize);

#[derive(Debug)]
pub(crate) enum FontProgram {
    /// One of the 14 standard fonts; WinAnsi single-byte codes.
    Base14,
    /// Embedded TrueType program; glyph ids as two-byte CIDs.
    TrueType { data: Vec<u8>, metrics: FontMetrics },
}

#[derive(Debug)]
pub(crate) struct CatalogFont {
    pub(crate) name: String,
    pub(crate) program: FontProgram,
    /// Pair adjustments in 1/1000 em, keyed by (left code, right code).
    pub(crate) kerning: HashMap<(u16, u16), i32>,
}

impl CatalogFont {
    pub(crate) fn is_multibyte(&self) -> bool {
        matches!(self.program, FontProgram::TrueType { .. })
    }
}

#[derive(Debug)]
pub(crate) struct FontMetrics {
    units_per_em: u16,
    ascent: i16,
    descent: i16,
    cap_height: i16,
    italic_angle: i16,
    bbox: (i16, i16, i16, i16),
    missing_width: u16,
    is_fixed_pitch: bool,
    symbolic: bool,
}

/// Fonts available to text runs; shared by every page of a document.
#[derive(Debug, Default)]
pub struct FontCatalog {
    fonts: Vec<CatalogFont>,
    lookup: HashMap<String, usize>,
}

impl FontCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or finds) a standard font such as `Helvetica`.
    pub fn base14(&mut self, name: &str) -> Result<FontHandle> {
        let key = normalize_name(name);
        if let Some(index) = self.lookup.get(&key) {
            return Ok(FontHandle(*index));
        }
        let Some(canonical) = base14_name(&key) else {
            return Err(PdfPaintError::Font(format!("{name} is not a standard font")));
        };
        Ok(self.push(CatalogFont {
            name: canonical.to_string(),
            program: FontProgram::Base14,
            kerning: HashMap::new(),
        }))
    }

    /// Registers a TrueType program for embedding as a CID-keyed font.
    pub fn register_truetype(&mut self, data: Vec<u8>) -> Result<FontHandle> {
        let (name, metrics, kerning) = {
            let face = ttf_parser::Face::parse(&data, 0)
                .map_err(|e| PdfPaintError::Font(format!("invalid font data: {e}")))?;
            if face.tables().cff.is_some() {
                return Err(PdfPaintError::Font(
                    "CFF-flavored OpenType fonts are not supported".to_string(),
                ));
            }
            (
                postscript_name(&face),
                FontMetrics::from_face(&face),
                build_kerning_pairs(&face),
            )
        };
        let key = normalize_name(&name);
        if let Some(index) = self.lookup.get(&key) {
            return Ok(FontHandle(*index));
        }
        Ok(self.push(CatalogFont {
            name,
            program: FontProgram::TrueType { data, metrics },
            kerning,
        }))
    }

    fn push(&mut self, font: CatalogFont) -> FontHandle {
        let index = self.fonts.len();
        self.lookup.insert(normalize_name(&font.name), index);
        self.fonts.push(font);
        FontHandle(index)
    }

    /// Replaces the pair-kerning table, keyed by glyph codes as emitted.
    pub fn set_kerning(&mut self, font: FontHandle, pairs: HashMap<(u16, u16), i32>) {
        if let Some(entry) = self.fonts.get_mut(font.0) {
            entry.kerning = pairs;
        }
    }

    pub fn resolve(&self, name: &str) -> Option<FontHandle> {
        self.lookup.get(&normalize_name(name)).map(|i| FontHandle(*i))
    }

    pub fn name(&self, font: FontHandle) -> Option<&str> {
        self.get(font).map(|f| f.name.as_str())
    }

    pub fn is_multibyte(&self, font: FontHandle) -> bool {
        self.get(font).map(|f| f.is_multibyte()).unwrap_or(false)
    }

    pub fn kerning(&self, font: FontHandle, left: u16, right: u16) -> i32 {
        self.get(font)
            .and_then(|f| f.kerning.get(&(left, right)).copied())
            .unwrap_or(0)
    }

    pub(crate) fn get(&self, font: FontHandle) -> Option<&CatalogFont> {
        self.fonts.get(font.0)
    }

    /// Maps text to the codes `font` is addressed with.
    pub fn encode(&self, font: FontHandle, text: &str) -> Result<Vec<Glyph>> {
        let entry = self
            .get(font)
            .ok_or_else(|| PdfPaintError::Font(format!("unknown font handle {}", font.0)))?;
        match &entry.program {
            FontProgram::Base14 => Ok(text
                .chars()
                .map(|ch| Glyph {
                    code: winansi_code(ch).unwrap_or(b'?') as u16,
                    ch: Some(ch),
                })
                .collect()),
            FontProgram::TrueType { data, .. } => {
                let face = ttf_parser::Face::parse(data, 0)
                    .map_err(|e| PdfPaintError::Font(format!("invalid font data: {e}")))?;
                Ok(text
                    .chars()
                    .map(|ch| Glyph {
                        code: face.glyph_index(ch).map(|g| g.0).unwrap_or(0),
                        ch: Some(ch),
                    })
                    .collect())
            }
        }
    }
}

impl FontMetrics {
    fn from_face(face: &ttf_parser::Face<'_>) -> Self {
        let units_per_em = face.units_per_em().max(1);
        let scale = 1000.0 / units_per_em as f32;
        let ascent = scale_i16(face.ascender(), scale);
        let cap_height = face
            .capital_height()
            .map(|value| scale_i16(value, scale))
            .unwrap_or(ascent);
        let bbox = face.global_bounding_box();
        let missing_width = face
            .glyph_index(' ')
            .and_then(|id| face.glyph_hor_advance(id))
            .map(|adv| (adv as f32 * scale).round() as u16)
            .unwrap_or(0);
        let symbolic = face
            .tables()
            .cmap
            .map(|cmap| !cmap.subtables.into_iter().any(|s| s.is_unicode()))
            .unwrap_or(true);
        Self {
            units_per_em,
            ascent,
            descent: scale_i16(face.descender(), scale),
            cap_height,
            italic_angle: face
                .italic_angle()
                .map(|value| value.round() as i16)
                .unwrap_or(0),
            bbox: (
                scale_i16(bbox.x_min, scale),
                scale_i16(bbox.y_min, scale),
                scale_i16(bbox.x_max, scale),
                scale_i16(bbox.y_max, scale),
            ),
            missing_width,
            is_fixed_pitch: face.is_monospaced(),
            symbolic,
        }
    }
}

fn build_kerning_pairs(face: &ttf_parser::Face<'_>) -> HashMap<(u16, u16), i32> {
    let mut out = HashMap::new();
    let Some(kern) = face.tables().kern else {
        return out;
    };
    let subtables: Vec<_> = kern
        .subtables
        .into_iter()
        .filter(|s| s.horizontal && !s.has_cross_stream && !s.has_state_machine)
        .collect();
    if subtables.is_empty() {
        return out;
    }

    // Pairs among the printable Latin-1 repertoire.
    let glyph_ids: Vec<u16> = (32u32..=255)
        .filter_map(char::from_u32)
        .filter_map(|ch| face.glyph_index(ch))
        .map(|g| g.0)
        .filter(|g| *g != 0)
        .collect();
    let scale = 1000.0 / face.units_per_em().max(1) as f32;
    for &left in &glyph_ids {
        for &right in &glyph_ids {
            let total: i32 = subtables
                .iter()
                .filter_map(|sub| sub.glyphs_kerning(GlyphId(left), GlyphId(right)))
                .map(|v| v as i32)
                .sum();
            let scaled = (total as f32 * scale).round() as i32;
            if scaled != 0 {
                out.insert((left, right), scaled);
            }
        }
    }
    out
}

fn postscript_name(face: &ttf_parser::Face<'_>) -> String {
    use ttf_parser::name::name_id;

    let mut family = None;
    let mut post = None;
    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::POST_SCRIPT_NAME if post.is_none() => post = Some(name),
            name_id::TYPOGRAPHIC_FAMILY | name_id::FAMILY if family.is_none() => {
                family = Some(name)
            }
            _ => {}
        }
    }
    post.or(family)
        .unwrap_or_else(|| "EmbeddedFont".to_string())
}

fn scale_i16(value: i16, scale: f32) -> i16 {
    let scaled = (value as f32 * scale).round() as i32;
    scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_ascii_lowercase()
}

fn base14_name(key: &str) -> Option<&'static str> {
    Some(match key {
        "courier" => "Courier",
        "courier-bold" => "Courier-Bold",
        "courier-oblique" => "Courier-Oblique",
        "courier-boldoblique" => "Courier-BoldOblique",
        "helvetica" => "Helvetica",
        "helvetica-bold" => "Helvetica-Bold",
        "helvetica-oblique" => "Helvetica-Oblique",
        "helvetica-boldoblique" => "Helvetica-BoldOblique",
        "times-roman" => "Times-Roman",
        "times-bold" => "Times-Bold",
        "times-italic" => "Times-Italic",
        "times-bolditalic" => "Times-BoldItalic",
        "symbol" => "Symbol",
        "zapfdingbats" => "ZapfDingbats",
        _ => return None,
    })
}

/// Windows-1252 code for `ch`, the encoding used by standard fonts.
pub(crate) fn winansi_code(ch: char) -> Option<u8> {
    let code = match ch {
        '\u{0000}'..='\u{007F}' => ch as u8,
        '\u{00A0}'..='\u{00FF}' => ch as u8,
        '\u{20AC}' => 0x80,
        '\u{201A}' => 0x82,
        '\u{0192}' => 0x83,
        '\u{201E}' => 0x84,
        '\u{2026}' => 0x85,
        '\u{2020}' => 0x86,
        '\u{2021}' => 0x87,
        '\u{02C6}' => 0x88,
        '\u{2030}' => 0x89,
        '\u{0160}' => 0x8A,
        '\u{2039}' => 0x8B,
        '\u{0152}' => 0x8C,
        '\u{017D}' => 0x8E,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201C}' => 0x93,
        '\u{201D}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{02DC}' => 0x98,
        '\u{2122}' => 0x99,
        '\u{0161}' => 0x9A,
        '\u{203A}' => 0x9B,
        '\u{0153}' => 0x9C,
        '\u{017E}' => 0x9E,
        '\u{0178}' => 0x9F,
        _ => return None,
    };
    Some(code)
}

/// Ids a font occupies once written; see [`font_objects`].
pub(crate) fn object_count(font: &CatalogFont) -> usize {
    match font.program {
        FontProgram::Base14 => 1,
        FontProgram::TrueType { .. } => 5,
    }
}

/// Id of the object pages reference for a font starting at `start_id`.
pub(crate) fn font_object_id(font: &CatalogFont, start_id: usize) -> usize {
    start_id + object_count(font) - 1
}

/// Objects for `font`, numbered from `start_id`; `glyphs` maps used glyph
/// ids to the text they stand for.
pub(crate) fn font_objects(
    font: &CatalogFont,
    glyphs: &BTreeMap<u16, String>,
    start_id: usize,
) -> Vec<String> {
    match &font.program {
        FontProgram::Base14 => vec![format!(
            "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
            sanitize_font_name(&font.name)
        )],
        FontProgram::TrueType { data, metrics } => {
            cid_font_objects(&font.name, data, metrics, glyphs, start_id)
        }
    }
}

fn cid_font_objects(
    name: &str,
    data: &[u8],
    metrics: &FontMetrics,
    glyphs: &BTreeMap<u16, String>,
    start_id: usize,
) -> Vec<String> {
    let font_file_id = start_id;
    let descriptor_id = start_id + 1;
    let cid_font_id = start_id + 2;
    let to_unicode_id = start_id + 3;
    let base = sanitize_font_name(name);

    let mut objects = Vec::with_capacity(5);
    objects.push(font_file_object(data));
    objects.push(font_descriptor_object(&base, metrics, font_file_id));

    let widths = match ttf_parser::Face::parse(data, 0) {
        Ok(face) => glyphs
            .keys()
            .map(|gid| {
                let adv = face
                    .glyph_hor_advance(GlyphId(*gid))
                    .map(|adv| {
                        ((adv as u32 * 1000 + metrics.units_per_em as u32 / 2)
                            / metrics.units_per_em as u32) as u16
                    })
                    .unwrap_or(metrics.missing_width);
                format!("{} [{}]", gid, adv)
            })
            .collect::<Vec<_>>(),
        Err(_) => Vec::new(),
    };
    let w_array = if widths.is_empty() {
        String::new()
    } else {
        format!(" /W [{}]", widths.join(" "))
    };
    objects.push(format!(
        "<< /Type /Font /Subtype /CIDFontType2 /BaseFont /{} /CIDSystemInfo << /Registry (Adobe) /Ordering (Identity) /Supplement 0 >> /FontDescriptor {} 0 R /DW {}{} /CIDToGIDMap /Identity >>",
        base, descriptor_id, metrics.missing_width, w_array
    ));
    objects.push(stream_object(&to_unicode_cmap(glyphs)));
    objects.push(format!(
        "<< /Type /Font /Subtype /Type0 /BaseFont /{} /Encoding /Identity-H /DescendantFonts [{} 0 R] /ToUnicode {} 0 R >>",
        base, cid_font_id, to_unicode_id
    ));
    objects
}

fn font_descriptor_object(base: &str, metrics: &FontMetrics, font_file_id: usize) -> String {
    let mut flags = if metrics.symbolic { 4 } else { 32 };
    if metrics.is_fixed_pitch {
        flags |= 1;
    }
    format!(
        "<< /Type /FontDescriptor /FontName /{} /Flags {} /FontBBox [{} {} {} {}] /ItalicAngle {} /Ascent {} /Descent {} /CapHeight {} /StemV 80 /MissingWidth {} /FontFile2 {} 0 R >>",
        base,
        flags,
        metrics.bbox.0,
        metrics.bbox.1,
        metrics.bbox.2,
        metrics.bbox.3,
        metrics.italic_angle,
        metrics.ascent,
        metrics.descent,
        metrics.cap_height,
        metrics.missing_width,
        font_file_id
    )
}

fn font_file_object(data: &[u8]) -> String {
    let mut stream_data = ascii_hex_encode(data);
    stream_data.push('>');
    format!(
        "<< /Length {} /Length1 {} /Filter /ASCIIHexDecode >>\nstream\n{}\nendstream",
        stream_data.len(),
        data.len(),
        stream_data
    )
}

pub(crate) fn to_unicode_cmap(glyph_map: &BTreeMap<u16, String>) -> String {
    let entries: Vec<(&u16, &String)> = glyph_map.iter().collect();

    let mut out = String::new();
    out.push_str("/CIDInit /ProcSet findresource begin\n");
    out.push_str("12 dict begin\n");
    out.push_str("begincmap\n");
    out.push_str("/CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n");
    out.push_str("/CMapName /Adobe-Identity-UCS def\n");
    out.push_str("/CMapType 2 def\n");
    out.push_str("1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n");

    for chunk in entries.chunks(100) {
        out.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for (gid, text) in chunk {
            let mut uni = String::new();
            for unit in text.encode_utf16() {
                uni.push_str(&format!("{:04X}", unit));
            }
            out.push_str(&format!("<{:04X}> <{}>\n", gid, uni));
        }
        out.push_str("endbfchar\n");
    }

    out.push_str("endcmap\n");
    out.push_str("CMapName currentdict /CMap defineresource pop\n");
    out.push_str("end\nend\n");
    out
}

fn sanitize_font_name(name: &str) -> String {
    let out: String = name
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '-')
        .collect();
    if out.is_empty() {
        "EmbeddedFont".to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base14_lookup_is_case_insensitive_and_deduplicated() {
        let mut catalog = FontCatalog::new();
        let a = catalog.base14("Helvetica").expect("font");
        let b = catalog.base14(" helvetica ").expect("font");
        assert_eq!(a, b);
        assert_eq!(catalog.name(a), Some("Helvetica"));
        assert_eq!(catalog.resolve("HELVETICA"), Some(a));
        assert!(!catalog.is_multibyte(a));
        assert!(catalog.base14("Comic Sans").is_err());
    }

    #[test]
    fn invalid_truetype_data_is_rejected() {
        let mut catalog = FontCatalog::new();
        let err = catalog
            .register_truetype(b"not a font".to_vec())
            .expect_err("invalid");
        assert!(matches!(err, PdfPaintError::Font(_)));
    }

    #[test]
    fn base14_encoding_uses_winansi() {
        let mut catalog = FontCatalog::new();
        let font = catalog.base14("Times-Roman").expect("font");
        let glyphs = catalog.encode(font, "A\u{20AC}\u{4E2D}").expect("encode");
        let codes: Vec<u16> = glyphs.iter().map(|g| g.code).collect();
        assert_eq!(codes, vec![0x41, 0x80, b'?' as u16]);
    }

    #[test]
    fn kerning_lookup_defaults_to_zero() {
        let mut catalog = FontCatalog::new();
        let font = catalog.base14("Helvetica").expect("font");
        catalog.set_kerning(font, HashMap::from([((b'A' as u16, b'V' as u16), -80)]));
        assert_eq!(catalog.kerning(font, b'A' as u16, b'V' as u16), -80);
        assert_eq!(catalog.kerning(font, b'V' as u16, b'A' as u16), 0);
    }

    #[test]
    fn to_unicode_cmap_handles_surrogates() {
        let mut map = BTreeMap::new();
        map.insert(3u16, "A".to_string());
        map.insert(7u16, "\u{1F600}".to_string());
        let cmap = to_unicode_cmap(&map);
        assert!(cmap.contains("2 beginbfchar"));
        assert!(cmap.contains("<0003> <0041>"));
        assert!(cmap.contains("<0007> <D83DDE00>"));
    }

    #[test]
    fn base14_font_is_one_object() {
        let mut catalog = FontCatalog::new();
        let font = catalog.base14("Courier").expect("font");
        let entry = catalog.get(font).expect("entry");
        assert_eq!(object_count(entry), 1);
        assert_eq!(font_object_id(entry, 9), 9);
        let objects = font_objects(entry, &BTreeMap::new(), 9);
        assert_eq!(
            objects[0],
            "<< /Type /Font /Subtype /Type1 /BaseFont /Courier /Encoding /WinAnsiEncoding >>"
        );
    }
}
