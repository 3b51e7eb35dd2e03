//! Drawable codecs: PNG raster and SVG fragment
//!
//! Rasters are RGBA8 with straight (non-premultiplied) alpha.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RasterImage {
    /// Fully transparent image.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut image = Self::new(width, height);
        for px in image.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
        image
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2], self.pixels[i + 3]]
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        self.pixels[i..i + 4].copy_from_slice(&rgba);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("PNG decode failed: {0}")]
    Decode(#[from] png::DecodingError),

    #[error("PNG encode failed: {0}")]
    Encode(#[from] png::EncodingError),

    #[error("Unsupported PNG layout: {0}")]
    Unsupported(String),

    #[error("Not an SVG document")]
    NotSvg,
}

pub fn decode_png(bytes: &[u8]) -> Result<RasterImage, CodecError> {
    let mut decoder = png::Decoder::new(Cursor::new(bytes));
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder.read_info()?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf)?;
    buf.truncate(info.buffer_size());

    if info.bit_depth != png::BitDepth::Eight {
        return Err(CodecError::Unsupported(format!("bit depth {:?}", info.bit_depth)));
    }

    let pixels = match info.color_type {
        png::ColorType::Rgba => buf,
        png::ColorType::Rgb => buf
            .chunks_exact(3)
            .flat_map(|c| [c[0], c[1], c[2], 255])
            .collect(),
        png::ColorType::GrayscaleAlpha => buf
            .chunks_exact(2)
            .flat_map(|c| [c[0], c[0], c[0], c[1]])
            .collect(),
        png::ColorType::Grayscale => buf.iter().flat_map(|&g| [g, g, g, 255]).collect(),
        png::ColorType::Indexed => {
            return Err(CodecError::Unsupported("indexed color after expansion".into()))
        }
    };

    Ok(RasterImage {
        width: info.width,
        height: info.height,
        pixels,
    })
}

pub fn encode_png(image: &RasterImage) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, image.width, image.height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&image.pixels)?;
        writer.finish()?;
    }
    Ok(out)
}

/// Inner markup of an SVG document plus the coordinate system it was
/// authored in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SvgFragment {
    pub view_box: Option<String>,
    pub body: String,
}

fn svg_root() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<svg\b([^>]*)>(.*)</svg\s*>").expect("valid svg regex"))
}

fn svg_attribute() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?:^|\s)([A-Za-z_:][-\w:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
            .expect("valid attribute regex")
    })
}

/// Value of the attribute called exactly `name`; `stroke-width` is not `width`.
fn svg_attr(attrs: &str, name: &str) -> Option<String> {
    svg_attribute()
        .captures_iter(attrs)
        .find(|c| &c[1] == name)
        .and_then(|c| {
            c.get(2)
                .or_else(|| c.get(3))
                .map(|m| m.as_str().trim().to_string())
        })
}

pub fn parse_svg(markup: &str) -> Result<SvgFragment, CodecError> {
    let caps = svg_root().captures(markup).ok_or(CodecError::NotSvg)?;
    let attrs = &caps[1];

    let view_box = svg_attr(attrs, "viewBox").or_else(|| {
        let width = svg_attr(attrs, "width")?;
        let height = svg_attr(attrs, "height")?;
        let width: f64 = width.trim_end_matches("px").parse().ok()?;
        let height: f64 = height.trim_end_matches("px").parse().ok()?;
        Some(format!("0 0 {} {}", width, height))
    });

    Ok(SvgFragment {
        view_box,
        body: caps[2].trim().to_string(),
    })
}
