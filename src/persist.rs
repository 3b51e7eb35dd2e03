//! Persistence - where finished items go
//!
//! Layout of a build directory:
//! `<edition>.png`, `<edition>.json`, `<edition>.svg` (vector runs only)
//! and `manifest.json`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::codec;
use crate::compositor::ImageArtifact;
use crate::config::{Format, RasterizerSpec};
use crate::error::{GenerationError, Result};
use crate::metadata::{EditionManifest, ItemMetadata};

pub const MANIFEST_FILE: &str = "manifest.json";

pub trait Persistence {
    /// Called once before the first item.
    fn prepare(&mut self) -> Result<()>;

    fn persist(&mut self, edition: u32, artifact: ImageArtifact, metadata: &ItemMetadata)
        -> Result<()>;

    /// Called once after the last item.
    fn finalize(&mut self, manifest: &EditionManifest) -> Result<()>;
}

/// Turns an SVG file into a PNG file.
pub trait Rasterizer {
    fn rasterize(&self, svg: &Path, png: &Path, format: Format) -> std::io::Result<()>;
}

/// Runs an external renderer such as `rsvg-convert`.
pub struct CommandRasterizer {
    spec: RasterizerSpec,
}

impl CommandRasterizer {
    pub fn new(spec: RasterizerSpec) -> Self {
        Self { spec }
    }

    fn args(&self, svg: &Path, png: &Path, format: Format) -> Vec<String> {
        self.spec
            .args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &svg.to_string_lossy())
                    .replace("{output}", &png.to_string_lossy())
                    .replace("{width}", &format.width.to_string())
                    .replace("{height}", &format.height.to_string())
            })
            .collect()
    }
}

impl Rasterizer for CommandRasterizer {
    fn rasterize(&self, svg: &Path, png: &Path, format: Format) -> std::io::Result<()> {
        let output = Command::new(&self.spec.program)
            .args(self.args(svg, png, format))
            .output()?;
        if !output.status.success() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!(
                    "{} exited with {}: {}",
                    self.spec.program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }
        Ok(())
    }
}

/// Writes items into a build directory that it owns.
pub struct FsPersistence {
    dir: PathBuf,
    format: Format,
    rasterizer: Option<Box<dyn Rasterizer>>,
}

impl FsPersistence {
    pub fn new(dir: impl Into<PathBuf>, format: Format) -> Self {
        Self {
            dir: dir.into(),
            format,
            rasterizer: None,
        }
    }

    pub fn with_rasterizer(mut self, rasterizer: Box<dyn Rasterizer>) -> Self {
        self.rasterizer = Some(rasterizer);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write(&self, edition: u32, file: &str, data: &[u8]) -> Result<()> {
        fs::write(self.dir.join(file), data).map_err(|e| GenerationError::persistence(edition, e))
    }
}

impl Persistence for FsPersistence {
    fn prepare(&mut self) -> Result<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir).map_err(|e| GenerationError::persistence(0, e))?;
        }
        fs::create_dir_all(&self.dir).map_err(|e| GenerationError::persistence(0, e))
    }

    fn persist(
        &mut self,
        edition: u32,
        artifact: ImageArtifact,
        metadata: &ItemMetadata,
    ) -> Result<()> {
        let png_name = format!("{}.png", edition);
        match artifact {
            ImageArtifact::Raster(image) => {
                let png = codec::encode_png(&image)
                    .map_err(|e| GenerationError::persistence(edition, e))?;
                self.write(edition, &png_name, &png)?;
            }
            ImageArtifact::Vector(markup) => {
                let svg_name = format!("{}.svg", edition);
                self.write(edition, &svg_name, markup.as_bytes())?;
                let rasterizer = self.rasterizer.as_ref().ok_or_else(|| {
                    GenerationError::persistence(edition, "no rasterizer for vector artifact")
                })?;
                rasterizer
                    .rasterize(&self.dir.join(&svg_name), &self.dir.join(&png_name), self.format)
                    .map_err(|e| GenerationError::persistence(edition, e))?;
            }
        }

        let json = serde_json::to_string_pretty(metadata)?;
        self.write(edition, &format!("{}.json", edition), json.as_bytes())
    }

    fn finalize(&mut self, manifest: &EditionManifest) -> Result<()> {
        let json = serde_json::to_string_pretty(manifest)?;
        let last = manifest.items.last().map_or(0, |i| i.edition);
        self.write(last, MANIFEST_FILE, json.as_bytes())
    }
}

#[derive(Debug, Clone)]
pub struct PersistedItem {
    pub edition: u32,
    pub artifact: ImageArtifact,
    pub metadata: ItemMetadata,
}

/// Keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    pub prepared: bool,
    pub items: Vec<PersistedItem>,
    pub manifest: Option<EditionManifest>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for MemoryPersistence {
    fn prepare(&mut self) -> Result<()> {
        self.prepared = true;
        self.items.clear();
        self.manifest = None;
        Ok(())
    }

    fn persist(
        &mut self,
        edition: u32,
        artifact: ImageArtifact,
        metadata: &ItemMetadata,
    ) -> Result<()> {
        self.items.push(PersistedItem {
            edition,
            artifact,
            metadata: metadata.clone(),
        });
        Ok(())
    }

    fn finalize(&mut self, manifest: &EditionManifest) -> Result<()> {
        self.manifest = Some(manifest.clone());
        Ok(())
    }
}
