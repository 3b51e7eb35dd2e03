//! Item metadata and the run manifest

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::CompositorKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub name: String,
    pub description: String,
    pub image: String,
    pub edition: u32,
    pub dna: String,
    pub attributes: ItemAttributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemAttributes {
    pub rarity: f64,
}

/// `<edition>.png`, under `base_uri` when one is configured.
pub fn image_uri(base_uri: &str, edition: u32) -> String {
    let file = format!("{}.png", edition);
    if base_uri.is_empty() {
        file
    } else {
        format!("{}/{}", base_uri.trim_end_matches('/'), file)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub edition: u32,
    pub name: String,
    pub dna: String,
    pub rarity: f64,
    pub image_hash: String,
    pub item_hash: String,
}

/// Everything needed to recognise and audit a finished edition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditionManifest {
    pub run_id: Uuid,
    pub engine_version: String,
    pub created_at: DateTime<Utc>,
    pub seed: Option<u64>,
    pub config_hash: String,
    pub compositor: CompositorKind,
    pub description: String,
    #[serde(rename = "baseURI")]
    pub base_uri: String,
    pub items: Vec<ManifestEntry>,
    /// Hash over every other field; empty while being computed.
    pub manifest_hash: String,
}
