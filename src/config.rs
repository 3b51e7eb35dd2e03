//! Edition Configuration - the run contract

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{GenerationError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditionConfig {
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "baseURI")]
    pub base_uri: String,
    pub layers_order: Vec<LayerSpec>,
    pub format: Format,
    pub edition_size: u32,
    #[serde(default = "default_tolerance", rename = "uniqueDNATolerance")]
    pub unique_dna_tolerance: u32,
    #[serde(default = "default_tolerance")]
    pub unique_name_tolerance: u32,
    #[serde(default = "default_delimiter")]
    pub rarity_delimiter: String,
    #[serde(default)]
    pub rarity: RarityConvention,
    pub adjectives: Vec<String>,
    #[serde(default)]
    pub name_layer: Option<usize>,
    #[serde(default)]
    pub compositor: CompositorKind,
    #[serde(default)]
    pub rasterizer: Option<RasterizerSpec>,
    #[serde(default = "default_layers_dir")]
    pub layers_dir: PathBuf,
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,
}

fn default_tolerance() -> u32 { 200 }
fn default_delimiter() -> String { "_".to_string() }
fn default_layers_dir() -> PathBuf { PathBuf::from("layers") }
fn default_build_dir() -> PathBuf { PathBuf::from("build") }

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LayerSpec {
    pub name: String,
}

impl From<&str> for LayerSpec {
    fn from(name: &str) -> Self {
        Self { name: name.to_string() }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Format {
    pub width: u32,
    pub height: u32,
}

/// How a rarity marker in an element's file name maps to a probability.
///
/// Exactly one convention is active per configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "convention", rename_all = "lowercase")]
pub enum RarityConvention {
    /// `Hat_20.png` is accepted 20% of the time it is drawn.
    Percent,
    /// `Hat_sr.png` uses the weight configured for class `sr`.
    Class { classes: BTreeMap<String, f64> },
}

impl Default for RarityConvention {
    fn default() -> Self {
        Self::Percent
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompositorKind {
    #[default]
    Raster,
    Vector,
}

/// External SVG to PNG renderer invocation.
///
/// `args` may contain `{input}`, `{output}`, `{width}` and `{height}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RasterizerSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl EditionConfig {
    /// Minimal configuration with defaults for every optional field.
    pub fn new(layers: &[&str], format: Format, edition_size: u32, adjectives: &[&str]) -> Self {
        Self {
            description: String::new(),
            base_uri: String::new(),
            layers_order: layers.iter().map(|l| LayerSpec::from(*l)).collect(),
            format,
            edition_size,
            unique_dna_tolerance: default_tolerance(),
            unique_name_tolerance: default_tolerance(),
            rarity_delimiter: default_delimiter(),
            rarity: RarityConvention::default(),
            adjectives: adjectives.iter().map(|a| a.to_string()).collect(),
            name_layer: None,
            compositor: CompositorKind::default(),
            rasterizer: None,
            layers_dir: default_layers_dir(),
            build_dir: default_build_dir(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            GenerationError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(GenerationError::InvalidConfig(msg.to_string()));

        if self.layers_order.is_empty() {
            return fail("layersOrder must name at least one layer");
        }
        let mut seen = HashSet::new();
        for layer in &self.layers_order {
            if layer.name.trim().is_empty() {
                return fail("layer names must not be empty");
            }
            if !seen.insert(layer.name.as_str()) {
                return Err(GenerationError::InvalidConfig(format!(
                    "duplicate layer '{}' in layersOrder",
                    layer.name
                )));
            }
        }
        if self.format.width == 0 || self.format.height == 0 {
            return fail("format.width and format.height must be positive");
        }
        if self.edition_size == 0 {
            return fail("editionSize must be positive");
        }
        if self.unique_dna_tolerance == 0 || self.unique_name_tolerance == 0 {
            return fail("uniqueness tolerances must be positive");
        }
        if self.rarity_delimiter.is_empty() {
            return fail("rarityDelimiter must not be empty");
        }
        if self.adjectives.is_empty() {
            return fail("adjectives must not be empty");
        }
        if let RarityConvention::Class { classes } = &self.rarity {
            for (tag, weight) in classes {
                if !(*weight > 0.0 && *weight <= 1.0) {
                    return Err(GenerationError::InvalidConfig(format!(
                        "rarity class '{}' weight {} is outside (0, 1]",
                        tag, weight
                    )));
                }
            }
        }
        if let Some(index) = self.name_layer {
            if index >= self.layers_order.len() {
                return Err(GenerationError::InvalidConfig(format!(
                    "nameLayer {} is out of range for {} layers",
                    index,
                    self.layers_order.len()
                )));
            }
        }
        if self.compositor == CompositorKind::Vector && self.rasterizer.is_none() {
            return fail("the vector compositor requires a rasterizer");
        }
        Ok(())
    }

    /// Layer whose element names the item.
    ///
    /// Defaults to the third layer, or the last one for shorter stacks.
    pub fn subject_layer(&self) -> usize {
        self.name_layer
            .unwrap_or_else(|| 2.min(self.layers_order.len().saturating_sub(1)))
    }

    pub fn layer_names(&self) -> Vec<&str> {
        self.layers_order.iter().map(|l| l.name.as_str()).collect()
    }
}
