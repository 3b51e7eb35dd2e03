//! Element Catalog and Layer Registry
//!
//! Element file names carry their own metadata:
//! `<display name>[<delimiter><rarity marker>].<ext>`. The extension is
//! always the last four characters (`.png`, `.svg`).

use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::config::{EditionConfig, RarityConvention};
use crate::error::{GenerationError, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    /// 1-based position in the source listing.
    pub id: usize,
    pub display_name: String,
    /// Raw entry name, handed back to the drawable source.
    pub file_name: String,
    /// Acceptance probability in (0, 1].
    pub rarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layer {
    pub id: usize,
    pub name: String,
    pub elements: Vec<Element>,
}

/// Lists the raw entries available for a layer.
pub trait ElementSource {
    fn list(&self, layer: &str) -> std::io::Result<Vec<String>>;
}

/// Reads `<root>/<layer>/`, regular non-hidden files in name order.
pub struct DirElementSource {
    root: PathBuf,
}

impl DirElementSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ElementSource for DirElementSource {
    fn list(&self, layer: &str) -> std::io::Result<Vec<String>> {
        let mut names = vec![];
        for entry in fs::read_dir(self.root.join(layer))? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Fixed listings, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticElementSource {
    layers: HashMap<String, Vec<String>>,
}

impl StaticElementSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layer(mut self, layer: &str, files: &[&str]) -> Self {
        self.layers
            .insert(layer.to_string(), files.iter().map(|f| f.to_string()).collect());
        self
    }
}

impl ElementSource for StaticElementSource {
    fn list(&self, layer: &str) -> std::io::Result<Vec<String>> {
        self.layers.get(layer).cloned().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, format!("no layer '{}'", layer))
        })
    }
}

/// Decodes display names and rarity markers under one active convention.
#[derive(Debug, Clone)]
pub struct ElementDecoder {
    delimiter: String,
    convention: RarityConvention,
}

impl ElementDecoder {
    pub fn new(delimiter: impl Into<String>, convention: RarityConvention) -> Self {
        Self {
            delimiter: delimiter.into(),
            convention,
        }
    }

    pub fn from_config(config: &EditionConfig) -> Self {
        Self::new(config.rarity_delimiter.clone(), config.rarity.clone())
    }

    pub fn decode(&self, layer: &str, id: usize, file: &str) -> Result<Element> {
        let invalid_name = || GenerationError::InvalidElementName {
            layer: layer.to_string(),
            file: file.to_string(),
        };

        let stem = strip_extension(file).ok_or_else(invalid_name)?;
        let (display_name, marker) = match stem.split_once(self.delimiter.as_str()) {
            Some((name, _)) => {
                let marker = stem
                    .rsplit_once(self.delimiter.as_str())
                    .map(|(_, m)| m)
                    .unwrap_or_default();
                (name, Some(marker))
            }
            None => (stem, None),
        };
        if display_name.is_empty() {
            return Err(invalid_name());
        }

        let rarity = match marker {
            None => 1.0,
            Some(marker) => self.rarity_for(marker).ok_or_else(|| {
                GenerationError::InvalidRarityMarker {
                    layer: layer.to_string(),
                    file: file.to_string(),
                    marker: marker.to_string(),
                }
            })?,
        };

        Ok(Element {
            id,
            display_name: display_name.to_string(),
            file_name: file.to_string(),
            rarity,
        })
    }

    fn rarity_for(&self, marker: &str) -> Option<f64> {
        match &self.convention {
            RarityConvention::Percent => {
                let percent: u32 = marker.parse().ok()?;
                (1..=100).contains(&percent).then(|| percent as f64 / 100.0)
            }
            RarityConvention::Class { classes } => classes.get(marker).copied(),
        }
    }
}

fn strip_extension(file: &str) -> Option<&str> {
    let (cut, _) = file.char_indices().rev().nth(3)?;
    (cut > 0).then(|| &file[..cut])
}

/// Layers in configured stacking order, each bound to its catalog.
#[derive(Debug, Clone)]
pub struct LayerRegistry {
    layers: Vec<Layer>,
}

impl LayerRegistry {
    /// Builds every catalog up front. Any failing layer aborts the build.
    pub fn build(
        layer_names: &[&str],
        source: &dyn ElementSource,
        decoder: &ElementDecoder,
    ) -> Result<Self> {
        let mut layers = Vec::with_capacity(layer_names.len());
        for (index, name) in layer_names.iter().enumerate() {
            let files = source.list(name).map_err(|e| GenerationError::SourceUnavailable {
                layer: name.to_string(),
                source: e,
            })?;
            if files.is_empty() {
                return Err(GenerationError::EmptyLayer(name.to_string()));
            }

            let elements = files
                .iter()
                .enumerate()
                .map(|(i, file)| decoder.decode(name, i + 1, file))
                .collect::<Result<Vec<_>>>()?;

            tracing::debug!(layer = %name, elements = elements.len(), "catalog built");
            layers.push(Layer {
                id: index,
                name: name.to_string(),
                elements,
            });
        }
        Ok(Self { layers })
    }

    pub fn from_config(config: &EditionConfig, source: &dyn ElementSource) -> Result<Self> {
        Self::build(&config.layer_names(), source, &ElementDecoder::from_config(config))
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn get(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }

    /// Number of distinct DNA values, saturating at `u128::MAX`.
    pub fn combination_count(&self) -> u128 {
        self.layers
            .iter()
            .fold(1u128, |acc, l| acc.saturating_mul(l.elements.len() as u128))
    }
}
