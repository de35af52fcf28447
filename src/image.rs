use crate::error::{PdfPaintError, Result};
use crate::registry::{ascii_hex_encode, flate_compress};
use crate::types::ColorSpace;
use base64::Engine;
use image::GenericImageView;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Image input accepted by [`crate::Page::draw_image`].
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Encoded PNG or JPEG bytes; `uri` identifies the image for reuse.
    Encoded { uri: Option<String>, data: Arc<[u8]> },
    /// A `data:` URI carrying base64 or raw bytes.
    DataUri(String),
    /// Straight (non-premultiplied) RGBA pixels, row-major.
    Rgba {
        width: u32,
        height: u32,
        pixels: Arc<[u8]>,
    },
}

impl ImageSource {
    pub fn encoded(data: impl Into<Arc<[u8]>>) -> Self {
        ImageSource::Encoded {
            uri: None,
            data: data.into(),
        }
    }

    pub fn with_uri(uri: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        ImageSource::Encoded {
            uri: Some(uri.into()),
            data: data.into(),
        }
    }

    /// Registry key: the caller's URI when present, otherwise a content hash.
    pub(crate) fn cache_key(&self) -> String {
        match self {
            ImageSource::Encoded { uri: Some(uri), .. } => format!("uri:{uri}"),
            ImageSource::Encoded { uri: None, data } => format!("sha256:{}", hex_digest(data)),
            ImageSource::DataUri(uri) => format!("sha256:{}", hex_digest(uri.as_bytes())),
            ImageSource::Rgba {
                width,
                height,
                pixels,
            } => {
                let mut hasher = Sha256::new();
                hasher.update(width.to_be_bytes());
                hasher.update(height.to_be_bytes());
                hasher.update(pixels);
                format!("sha256:{}", hex(&hasher.finalize()))
            }
        }
    }

    pub(crate) fn decode(&self) -> Result<ImageData> {
        match self {
            ImageSource::Encoded { data, .. } => decode_image_bytes(data, None),
            ImageSource::DataUri(uri) => {
                let (mime, data) = parse_data_uri(uri)
                    .ok_or_else(|| PdfPaintError::Image("malformed data URI".to_string()))?;
                decode_image_bytes(&data, Some(&mime))
            }
            ImageSource::Rgba {
                width,
                height,
                pixels,
            } => ImageData::from_rgba(*width, *height, pixels),
        }
    }
}

/// An image ready to be written as an XObject.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) color_space: &'static str,
    /// Decode array for samples stored inverted.
    pub(crate) decode: Option<&'static str>,
    pub(crate) filter: &'static str,
    pub(crate) data: Vec<u8>,
    pub(crate) alpha: Option<AlphaData>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AlphaData {
    pub(crate) data: Vec<u8>,
}

impl ImageData {
    /// Splits straight RGBA into Flate-compressed RGB and an optional mask.
    pub(crate) fn from_rgba(width: u32, height: u32, pixels: &[u8]) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || pixels.len() != expected {
            return Err(PdfPaintError::Image(format!(
                "RGBA buffer of {} bytes does not match {}x{}",
                pixels.len(),
                width,
                height
            )));
        }
        let mut rgb = Vec::with_capacity(expected / 4 * 3);
        let mut alpha = Vec::with_capacity(expected / 4);
        let mut has_alpha = false;
        for px in pixels.chunks_exact(4) {
            if px[3] != 255 {
                has_alpha = true;
            }
            rgb.extend_from_slice(&px[..3]);
            alpha.push(px[3]);
        }
        Ok(Self {
            width,
            height,
            color_space: "/DeviceRGB",
            decode: None,
            filter: "/FlateDecode",
            data: flate_compress(&rgb)?,
            alpha: if has_alpha {
                Some(AlphaData {
                    data: flate_compress(&alpha)?,
                })
            } else {
                None
            },
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn has_alpha(&self) -> bool {
        self.alpha.is_some()
    }

    /// Color-space family for conformance checks; gray counts as RGB.
    pub(crate) fn space(&self) -> ColorSpace {
        if self.color_space == "/DeviceCMYK" {
            ColorSpace::Cmyk
        } else {
            ColorSpace::Rgb
        }
    }

    pub(crate) fn content_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.width.to_be_bytes());
        hasher.update(self.height.to_be_bytes());
        hasher.update(self.color_space.as_bytes());
        hasher.update(self.filter.as_bytes());
        hasher.update(&self.data);
        if let Some(alpha) = &self.alpha {
            hasher.update(&alpha.data);
        }
        hasher.finalize().into()
    }

    pub(crate) fn byte_len(&self) -> usize {
        self.data.len() + self.alpha.as_ref().map(|a| a.data.len()).unwrap_or(0)
    }
}

pub(crate) fn decode_image_bytes(data: &[u8], mime: Option<&str>) -> Result<ImageData> {
    let format = match mime {
        Some(mime) if mime.contains("png") => Some(image::ImageFormat::Png),
        Some(mime) if mime.contains("jpeg") || mime.contains("jpg") => {
            Some(image::ImageFormat::Jpeg)
        }
        _ => image::guess_format(data).ok(),
    };

    let decoded = image::load_from_memory(data)
        .map_err(|e| PdfPaintError::Image(format!("cannot decode image: {e}")))?;
    let (width, height) = decoded.dimensions();

    if matches!(format, Some(image::ImageFormat::Jpeg)) {
        // The decoder converts CMYK to RGB; the pass-through stream keeps
        // the frame's own components.
        let frame = jpeg_frame_info(data);
        let color_space = match frame.map(|f| f.components) {
            Some(1) => "/DeviceGray",
            Some(3) => "/DeviceRGB",
            Some(4) => "/DeviceCMYK",
            Some(n) => {
                return Err(PdfPaintError::Image(format!(
                    "unsupported JPEG with {n} components"
                )));
            }
            None => match decoded.color() {
                image::ColorType::L8 | image::ColorType::La8 => "/DeviceGray",
                _ => "/DeviceRGB",
            },
        };
        let decode = frame
            .filter(|f| f.components == 4 && f.adobe)
            .map(|_| "[1 0 1 0 1 0 1 0]");
        return Ok(ImageData {
            width,
            height,
            color_space,
            decode,
            filter: "/DCTDecode",
            data: data.to_vec(),
            alpha: None,
        });
    }

    let rgba = decoded.to_rgba8();
    ImageData::from_rgba(width, height, rgba.as_raw())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct JpegFrame {
    components: u8,
    /// An Adobe APP14 segment precedes the frame; its CMYK is inverted.
    adobe: bool,
}

/// Reads the JPEG markers up to the first start-of-frame segment.
fn jpeg_frame_info(data: &[u8]) -> Option<JpegFrame> {
    if !data.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    let mut pos = 2;
    let mut adobe = false;
    loop {
        if *data.get(pos)? != 0xFF {
            return None;
        }
        let marker = *data.get(pos + 1)?;
        match marker {
            0xFF => {
                pos += 1;
                continue;
            }
            0x01 | 0xD0..=0xD7 => {
                pos += 2;
                continue;
            }
            0xD9 | 0xDA => return None,
            _ => {}
        }
        let len = u16::from_be_bytes([*data.get(pos + 2)?, *data.get(pos + 3)?]) as usize;
        if len < 2 {
            return None;
        }
        let body = data.get(pos + 4..pos + 2 + len)?;
        match marker {
            0xEE if body.starts_with(b"Adobe") => adobe = true,
            0xC4 | 0xC8 | 0xCC => {}
            // Precision, height, width, then the component count.
            0xC0..=0xCF => {
                return Some(JpegFrame {
                    components: *body.get(5)?,
                    adobe,
                });
            }
            _ => {}
        }
        pos += 2 + len;
    }
}

pub(crate) fn parse_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let rest = uri.strip_prefix("data:")?;
    let (header, data_part) = rest.split_once(',')?;
    let mime = header
        .split(';')
        .next()
        .filter(|m| !m.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = if header.contains("base64") {
        base64::engine::general_purpose::STANDARD
            .decode(data_part.trim())
            .ok()?
    } else {
        data_part.as_bytes().to_vec()
    };
    Some((mime, data))
}

pub(crate) fn image_object(image: &ImageData, smask_id: Option<usize>) -> String {
    let stream_data = encode_stream_data(&image.data);
    let filters = match image.filter {
        "/DCTDecode" => "[/ASCIIHexDecode /DCTDecode]",
        _ => "[/ASCIIHexDecode /FlateDecode]",
    };
    let smask = smask_id
        .map(|id| format!(" /SMask {} 0 R", id))
        .unwrap_or_default();
    let decode = image
        .decode
        .map(|d| format!(" /Decode {d}"))
        .unwrap_or_default();
    format!(
        "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace {}{} /BitsPerComponent 8 /Length {} /Filter {}{} >>\nstream\n{}\nendstream",
        image.width,
        image.height,
        image.color_space,
        decode,
        stream_data.len(),
        filters,
        smask,
        stream_data
    )
}

pub(crate) fn image_smask_object(image: &ImageData, alpha: &AlphaData) -> String {
    let stream_data = encode_stream_data(&alpha.data);
    format!(
        "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceGray /BitsPerComponent 8 /Length {} /Filter [/ASCIIHexDecode /FlateDecode] >>\nstream\n{}\nendstream",
        image.width,
        image.height,
        stream_data.len(),
        stream_data
    )
}

fn encode_stream_data(data: &[u8]) -> String {
    let mut hex = ascii_hex_encode(data);
    hex.push('>');
    hex
}

fn hex_digest(data: &[u8]) -> String {
    hex(&Sha256::digest(data))
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png)
            .expect("encode png");
        out.into_inner()
    }

    fn jpeg_header(components: u8, adobe: bool) -> Vec<u8> {
        let mut out = vec![0xFF, 0xD8];
        if adobe {
            out.extend_from_slice(&[0xFF, 0xEE, 0x00, 0x0E]);
            out.extend_from_slice(b"Adobe");
            out.extend_from_slice(&[0x00, 0x64, 0x00, 0x00, 0x00, 0x00, 0x02]);
        }
        let len = 8 + 3 * components as u16;
        out.extend_from_slice(&[0xFF, 0xC2]);
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&[8, 0x00, 0x02, 0x00, 0x03, components]);
        for id in 1..=components {
            out.extend_from_slice(&[id, 0x11, 0x00]);
        }
        out.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x08]);
        out
    }

    fn jpeg_bytes(img: image::DynamicImage) -> Vec<u8> {
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Jpeg)
            .expect("encode jpeg");
        out.into_inner()
    }

    #[test]
    fn jpeg_frame_reports_components_and_adobe_marker() {
        assert_eq!(
            jpeg_frame_info(&jpeg_header(4, true)),
            Some(JpegFrame {
                components: 4,
                adobe: true
            })
        );
        assert_eq!(
            jpeg_frame_info(&jpeg_header(3, false)),
            Some(JpegFrame {
                components: 3,
                adobe: false
            })
        );
        assert_eq!(jpeg_frame_info(&[0xFF, 0xD8, 0xFF, 0xDA, 0x00, 0x08]), None);
        assert_eq!(jpeg_frame_info(&png_bytes(1, 1, [0, 0, 0, 255])), None);
        assert_eq!(jpeg_frame_info(&jpeg_header(3, false)[..12]), None);
    }

    #[test]
    fn jpeg_passes_through_with_frame_color_space() {
        let rgb = image::RgbImage::from_pixel(4, 2, image::Rgb([200, 10, 10]));
        let data = decode_image_bytes(&jpeg_bytes(rgb.into()), None).expect("rgb jpeg");
        assert_eq!(data.filter, "/DCTDecode");
        assert_eq!(data.color_space, "/DeviceRGB");
        assert_eq!(data.decode, None);

        let gray = image::GrayImage::from_pixel(4, 2, image::Luma([90]));
        let data = decode_image_bytes(&jpeg_bytes(gray.into()), Some("image/jpeg"))
            .expect("gray jpeg");
        assert_eq!(data.color_space, "/DeviceGray");
        assert_eq!(data.space(), ColorSpace::Rgb);
    }

    #[test]
    fn inverted_cmyk_jpeg_object_carries_decode_array() {
        let image = ImageData {
            width: 2,
            height: 3,
            color_space: "/DeviceCMYK",
            decode: Some("[1 0 1 0 1 0 1 0]"),
            filter: "/DCTDecode",
            data: jpeg_header(4, true),
            alpha: None,
        };
        assert_eq!(image.space(), ColorSpace::Cmyk);
        let object = image_object(&image, None);
        assert!(object.contains("/ColorSpace /DeviceCMYK /Decode [1 0 1 0 1 0 1 0] "));
        assert!(object.contains("/Filter [/ASCIIHexDecode /DCTDecode]"));
    }

    #[test]
    fn opaque_png_has_no_mask() {
        let data = decode_image_bytes(&png_bytes(3, 2, [10, 20, 30, 255]), None).expect("decode");
        assert_eq!((data.width(), data.height()), (3, 2));
        assert_eq!(data.filter, "/FlateDecode");
        assert!(!data.has_alpha());
    }

    #[test]
    fn translucent_pixels_produce_a_mask() {
        let pixels = [255u8, 0, 0, 255, 0, 255, 0, 128];
        let data = ImageData::from_rgba(2, 1, &pixels).expect("rgba");
        assert!(data.has_alpha());
        let object = image_object(&data, Some(7));
        assert!(object.contains("/SMask 7 0 R"));
        assert!(object.contains("/Filter [/ASCIIHexDecode /FlateDecode]"));
        let alpha = data.alpha.as_ref().expect("alpha");
        assert!(image_smask_object(&data, alpha).contains("/ColorSpace /DeviceGray"));
    }

    #[test]
    fn mismatched_rgba_buffer_is_an_error() {
        let err = ImageData::from_rgba(2, 2, &[0u8; 4]).expect_err("too short");
        assert!(matches!(err, PdfPaintError::Image(_)));
    }

    #[test]
    fn data_uri_decodes_base64() {
        let png = png_bytes(1, 1, [0, 0, 0, 255]);
        let uri = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&png)
        );
        let (mime, bytes) = parse_data_uri(&uri).expect("uri");
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, png);
        assert!(ImageSource::DataUri(uri).decode().is_ok());
        assert!(parse_data_uri("http://example.com/a.png").is_none());
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        let err = ImageSource::encoded(vec![1u8, 2, 3]).decode().expect_err("garbage");
        assert!(matches!(err, PdfPaintError::Image(_)));
    }

    #[test]
    fn cache_key_prefers_uri() {
        let a = ImageSource::with_uri("logo.png", vec![1u8]);
        let b = ImageSource::with_uri("logo.png", vec![2u8]);
        assert_eq!(a.cache_key(), b.cache_key());
        let c = ImageSource::encoded(vec![1u8]);
        let d = ImageSource::encoded(vec![1u8]);
        assert_eq!(c.cache_key(), d.cache_key());
        assert_ne!(a.cache_key(), c.cache_key());
    }
}
