//! Compositor - stacks the chosen elements into one image
//!
//! Layers are drawn in registry order, each stretched to the full canvas.
//! Later layers cover earlier ones; transparency comes only from the
//! element content itself.

use base64::Engine;
use std::fs;
use std::path::PathBuf;

use crate::codec::{self, RasterImage, SvgFragment};
use crate::config::Format;
use crate::error::{GenerationError, Result};
use crate::hashing::sha256_hex;

/// Loaded, drawable content of one element.
#[derive(Debug, Clone, PartialEq)]
pub enum Drawable {
    Raster(RasterImage),
    Vector(SvgFragment),
}

/// Resolves an element's raw entry to drawable content.
///
/// Loads of one item may run concurrently, hence `Sync`.
pub trait DrawableSource: Send + Sync {
    fn load(&self, layer: &str, file: &str) -> Result<Drawable>;
}

/// Reads `<root>/<layer>/<file>`; `.svg` files are vector, all else PNG.
pub struct FsDrawableSource {
    root: PathBuf,
}

impl FsDrawableSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl DrawableSource for FsDrawableSource {
    fn load(&self, layer: &str, file: &str) -> Result<Drawable> {
        let failure = |reason: String| GenerationError::AssetLoadFailure {
            layer: layer.to_string(),
            file: file.to_string(),
            reason,
        };

        let path = self.root.join(layer).join(file);
        let bytes = fs::read(&path).map_err(|e| failure(e.to_string()))?;

        if file.to_ascii_lowercase().ends_with(".svg") {
            let markup = String::from_utf8(bytes).map_err(|e| failure(e.to_string()))?;
            let fragment = codec::parse_svg(&markup).map_err(|e| failure(e.to_string()))?;
            Ok(Drawable::Vector(fragment))
        } else {
            let image = codec::decode_png(&bytes).map_err(|e| failure(e.to_string()))?;
            Ok(Drawable::Raster(image))
        }
    }
}

/// One layer's chosen element, ready to draw.
#[derive(Debug, Clone)]
pub struct LoadedLayer<'a> {
    pub layer: &'a str,
    pub file: &'a str,
    pub drawable: Drawable,
}

/// Finished output image. Ownership passes to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageArtifact {
    Raster(RasterImage),
    /// Complete SVG document, rasterized later by an external renderer.
    Vector(String),
}

impl ImageArtifact {
    /// SHA-256 over the raw pixels or the markup.
    pub fn content_hash(&self) -> String {
        match self {
            Self::Raster(image) => sha256_hex(&image.pixels),
            Self::Vector(markup) => sha256_hex(markup.as_bytes()),
        }
    }
}

pub trait Compositor {
    fn composite(&mut self, layers: &[LoadedLayer<'_>]) -> Result<ImageArtifact>;
}

/// Draws onto one reusable canvas, cleared before every item.
pub struct RasterCompositor {
    canvas: RasterImage,
}

impl RasterCompositor {
    pub fn new(format: Format) -> Self {
        Self {
            canvas: RasterImage::new(format.width, format.height),
        }
    }

    fn clear(&mut self) {
        self.canvas.pixels.fill(0);
    }

    fn draw(&mut self, src: &RasterImage) {
        let (dw, dh) = (self.canvas.width as u64, self.canvas.height as u64);
        let (sw, sh) = (src.width as u64, src.height as u64);
        if sw == 0 || sh == 0 {
            return;
        }
        for y in 0..dh {
            let sy = (y * sh / dh) as u32;
            for x in 0..dw {
                let sx = (x * sw / dw) as u32;
                let over = blend(src.pixel(sx, sy), self.canvas.pixel(x as u32, y as u32));
                self.canvas.put_pixel(x as u32, y as u32, over);
            }
        }
    }
}

/// Source-over with straight alpha.
fn blend(src: [u8; 4], dst: [u8; 4]) -> [u8; 4] {
    let sa = src[3] as f32 / 255.0;
    if sa >= 1.0 {
        return src;
    }
    if sa <= 0.0 {
        return dst;
    }
    let da = dst[3] as f32 / 255.0;
    let oa = sa + da * (1.0 - sa);
    let channel = |s: u8, d: u8| {
        let c = (s as f32 * sa + d as f32 * da * (1.0 - sa)) / oa;
        c.round().clamp(0.0, 255.0) as u8
    };
    [
        channel(src[0], dst[0]),
        channel(src[1], dst[1]),
        channel(src[2], dst[2]),
        (oa * 255.0).round() as u8,
    ]
}

impl Compositor for RasterCompositor {
    fn composite(&mut self, layers: &[LoadedLayer<'_>]) -> Result<ImageArtifact> {
        self.clear();
        for loaded in layers {
            match &loaded.drawable {
                Drawable::Raster(image) => self.draw(image),
                Drawable::Vector(_) => {
                    return Err(GenerationError::UnsupportedDrawable {
                        layer: loaded.layer.to_string(),
                        file: loaded.file.to_string(),
                        reason: "vector content needs the vector compositor".into(),
                    })
                }
            }
        }
        Ok(ImageArtifact::Raster(self.canvas.clone()))
    }
}

/// Assembles an SVG document with one named slot per layer.
pub struct VectorCompositor {
    format: Format,
    slots: Vec<String>,
}

impl VectorCompositor {
    pub fn new(format: Format, layer_names: &[&str]) -> Self {
        Self {
            format,
            slots: layer_names.iter().map(|n| n.to_string()).collect(),
        }
    }

    /// The empty template, one `<!--Layer-->` placeholder per slot.
    pub fn template(&self) -> String {
        let placeholders: Vec<String> = self.slots.iter().map(|s| placeholder(s)).collect();
        self.document(&placeholders.join("\n"))
    }

    fn document(&self, body: &str) -> String {
        let (w, h) = (self.format.width, self.format.height);
        format!(
            "<svg width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\" fill=\"none\" \
             xmlns=\"http://www.w3.org/2000/svg\">\n{body}\n</svg>\n"
        )
    }

    fn fragment(&self, loaded: &LoadedLayer<'_>) -> Result<String> {
        let (w, h) = (self.format.width, self.format.height);
        match &loaded.drawable {
            Drawable::Vector(svg) => {
                let view_box = svg
                    .view_box
                    .as_ref()
                    .map(|vb| format!(" viewBox=\"{}\"", vb))
                    .unwrap_or_default();
                Ok(format!(
                    "<svg x=\"0\" y=\"0\" width=\"{w}\" height=\"{h}\"{view_box} \
                     preserveAspectRatio=\"none\">{}</svg>",
                    svg.body
                ))
            }
            Drawable::Raster(image) => {
                let png = codec::encode_png(image).map_err(|e| GenerationError::UnsupportedDrawable {
                    layer: loaded.layer.to_string(),
                    file: loaded.file.to_string(),
                    reason: e.to_string(),
                })?;
                let data = base64::engine::general_purpose::STANDARD.encode(png);
                Ok(format!(
                    "<image x=\"0\" y=\"0\" width=\"{w}\" height=\"{h}\" \
                     preserveAspectRatio=\"none\" href=\"data:image/png;base64,{data}\"/>"
                ))
            }
        }
    }
}

fn placeholder(slot: &str) -> String {
    format!("<!--{}-->", slot)
}

impl Compositor for VectorCompositor {
    fn composite(&mut self, layers: &[LoadedLayer<'_>]) -> Result<ImageArtifact> {
        // Slots are filled by name; element markup is never rescanned for
        // placeholders.
        let mut filled: Vec<Option<String>> = vec![None; self.slots.len()];
        for loaded in layers {
            let slot = self.slots.iter().position(|s| s == loaded.layer).ok_or_else(|| {
                GenerationError::UnsupportedDrawable {
                    layer: loaded.layer.to_string(),
                    file: loaded.file.to_string(),
                    reason: "layer has no slot in the template".into(),
                }
            })?;
            filled[slot] = Some(self.fragment(loaded)?);
        }

        let body: Vec<String> = filled
            .into_iter()
            .zip(&self.slots)
            .map(|(content, slot)| content.unwrap_or_else(|| placeholder(slot)))
            .collect();
        Ok(ImageArtifact::Vector(self.document(&body.join("\n"))))
    }
}
