//! ForgeEditions Core - Edition Compiler
//!
//! Builds a fixed-size edition of composite images from a stack of layers,
//! one element per layer, plus a metadata record per item.
//!
//! # Guarantees
//! 1. No two items of a run share a DNA
//! 2. No two items of a run share a name
//! 3. Rarity markers are honoured, never silently defaulted
//! 4. Later layers are drawn over earlier ones
//! 5. Same seed, same configuration, same edition
//! 6. Manifests enable audit

pub mod catalog;
pub mod codec;
pub mod compositor;
pub mod config;
pub mod edition;
pub mod error;
pub mod hashing;
pub mod metadata;
pub mod persist;
pub mod sampler;
pub mod synth;

pub use catalog::{DirElementSource, Element, ElementSource, Layer, LayerRegistry, StaticElementSource};
pub use compositor::{Compositor, Drawable, DrawableSource, ImageArtifact, RasterCompositor, VectorCompositor};
pub use config::{CompositorKind, EditionConfig, Format, RarityConvention};
pub use edition::{DriverState, EditionDriver, EditionReport, GeneratedItem};
pub use error::{GenerationError, RunAborted};
pub use hashing::{canonical_json, compute_manifest_hash};
pub use metadata::{EditionManifest, ItemMetadata};
pub use persist::{FsPersistence, MemoryPersistence, Persistence};
pub use sampler::{CombinationSampler, Dna};
pub use synth::NameSynthesizer;

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
