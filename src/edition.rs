//! Edition Driver - single entry point for a generation run
//!
//! `Idle -> Preparing -> Generating(1..=editionSize) -> Done`, or `Aborted`
//! on the first fatal error. Items are produced strictly one after another;
//! only the asset loads of a single item run in parallel, and they are all
//! joined before that item is composited.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::catalog::{DirElementSource, Element, Layer, LayerRegistry};
use crate::compositor::{
    Compositor, DrawableSource, FsDrawableSource, LoadedLayer, RasterCompositor, VectorCompositor,
};
use crate::config::{CompositorKind, EditionConfig};
use crate::error::{GenerationError, Result, RunAborted};
use crate::hashing::{compute_item_hash, compute_manifest_hash};
use crate::metadata::{image_uri, EditionManifest, ItemAttributes, ItemMetadata, ManifestEntry};
use crate::persist::{CommandRasterizer, FsPersistence, Persistence};
use crate::sampler::{Combination, CombinationSampler, Dna, DnaRegistry};
use crate::synth::{NameRegistry, NameSynthesizer};
use crate::ENGINE_VERSION;

/// Upper bound on the per-run result buffers reserved up front.
const MAX_RESERVED_ITEMS: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum DriverState {
    Idle,
    Preparing,
    Generating { edition: u32 },
    Done,
    #[serde(rename_all = "camelCase")]
    Aborted { last_completed: u32 },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedItem {
    pub edition: u32,
    pub dna: Dna,
    pub name: String,
    pub description: String,
    pub rarity_score: f64,
    /// Content hash of the image handed to persistence.
    pub image_hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EditionReport {
    pub items: Vec<GeneratedItem>,
    pub manifest: EditionManifest,
}

pub struct EditionDriver {
    config: EditionConfig,
    registry: LayerRegistry,
    drawables: Box<dyn DrawableSource>,
    compositor: Box<dyn Compositor>,
    rng: StdRng,
    seed: Option<u64>,
    state: DriverState,
}

impl EditionDriver {
    /// `registry` must have been built from the same `config`.
    pub fn new(
        config: EditionConfig,
        registry: LayerRegistry,
        drawables: Box<dyn DrawableSource>,
        compositor: Box<dyn Compositor>,
    ) -> Result<Self> {
        config.validate()?;
        let registered: Vec<&str> = registry.layers().iter().map(|l| l.name.as_str()).collect();
        if registered != config.layer_names() {
            return Err(GenerationError::InvalidConfig(format!(
                "registry layers {:?} do not match layersOrder {:?}",
                registered,
                config.layer_names()
            )));
        }

        Ok(Self {
            config,
            registry,
            drawables,
            compositor,
            rng: StdRng::from_entropy(),
            seed: None,
            state: DriverState::Idle,
        })
    }

    /// Driver reading layers from `layersDir` with the configured compositor.
    ///
    /// Fails with `SourceUnavailable` before anything is generated when a
    /// layer cannot be listed.
    pub fn from_config(config: EditionConfig) -> Result<Self> {
        config.validate()?;
        let registry =
            LayerRegistry::from_config(&config, &DirElementSource::new(&config.layers_dir))?;
        let drawables = Box::new(FsDrawableSource::new(&config.layers_dir));
        let compositor: Box<dyn Compositor> = match config.compositor {
            CompositorKind::Raster => Box::new(RasterCompositor::new(config.format)),
            CompositorKind::Vector => {
                Box::new(VectorCompositor::new(config.format, &config.layer_names()))
            }
        };
        Self::new(config, registry, drawables, compositor)
    }

    /// Fixes the random sequence: same seed and config, same edition.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self.seed = Some(seed);
        self
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn layers(&self) -> &[Layer] {
        self.registry.layers()
    }

    pub fn run(
        &mut self,
        persistence: &mut dyn Persistence,
    ) -> std::result::Result<EditionReport, RunAborted> {
        let mut last_completed = 0;
        match self.generate(persistence, &mut last_completed) {
            Ok(report) => {
                self.state = DriverState::Done;
                tracing::info!(items = report.items.len(), "edition complete");
                Ok(report)
            }
            Err(cause) => {
                self.state = DriverState::Aborted { last_completed };
                tracing::error!(last_completed, error = %cause, "edition aborted");
                Err(RunAborted {
                    last_completed,
                    cause,
                })
            }
        }
    }

    fn generate(
        &mut self,
        persistence: &mut dyn Persistence,
        last_completed: &mut u32,
    ) -> Result<EditionReport> {
        let Self {
            config,
            registry,
            drawables,
            compositor,
            rng,
            seed,
            state,
        } = self;

        let run_id = Uuid::new_v4();
        let cardinality = registry.combination_count();
        if u128::from(config.edition_size) > cardinality {
            tracing::warn!(
                edition_size = config.edition_size,
                cardinality = %cardinality,
                "edition size exceeds the number of distinct combinations"
            );
        }

        *state = DriverState::Preparing;
        tracing::info!(%run_id, edition_size = config.edition_size, "preparing output");
        persistence.prepare()?;

        let sampler = CombinationSampler::new(registry.layers(), config.unique_dna_tolerance);
        let synthesizer = NameSynthesizer::new(
            &config.adjectives,
            config.subject_layer(),
            config.unique_name_tolerance,
        );
        let mut dna_registry = DnaRegistry::new();
        let mut names = NameRegistry::new();

        // Never more distinct items than combinations, whatever editionSize says.
        let reachable = u128::from(config.edition_size).min(cardinality);
        let capacity = usize::try_from(reachable).unwrap_or(usize::MAX).min(MAX_RESERVED_ITEMS);
        let mut items = Vec::with_capacity(capacity);
        let mut entries = Vec::with_capacity(capacity);

        for edition in 1..=config.edition_size {
            *state = DriverState::Generating { edition };

            let combination = sampler.sample(rng, &mut dna_registry, edition)?;
            let attributes = synthesizer.synthesize(rng, &combination, &mut names, edition)?;

            let loaded = load_assets(&**drawables, &combination)?;
            let artifact = compositor.composite(&loaded)?;
            let image_hash = artifact.content_hash();

            let metadata = ItemMetadata {
                name: attributes.name.clone(),
                description: attributes.description.clone(),
                image: image_uri(&config.base_uri, edition),
                edition,
                dna: combination.dna.to_string(),
                attributes: ItemAttributes {
                    rarity: attributes.rarity_score,
                },
            };
            let item_hash = compute_item_hash(&metadata, &image_hash)?;

            persistence.persist(edition, artifact, &metadata)?;
            *last_completed = edition;
            tracing::info!(edition, dna = %combination.dna, name = %attributes.name, "item persisted");

            entries.push(ManifestEntry {
                edition,
                name: attributes.name.clone(),
                dna: combination.dna.to_string(),
                rarity: attributes.rarity_score,
                image_hash: image_hash.clone(),
                item_hash,
            });
            items.push(GeneratedItem {
                edition,
                dna: combination.dna,
                name: attributes.name,
                description: attributes.description,
                rarity_score: attributes.rarity_score,
                image_hash,
            });
        }

        let mut manifest = EditionManifest {
            run_id,
            engine_version: ENGINE_VERSION.to_string(),
            created_at: Utc::now(),
            seed: *seed,
            config_hash: compute_manifest_hash(&*config)?,
            compositor: config.compositor,
            description: config.description.clone(),
            base_uri: config.base_uri.clone(),
            items: entries,
            manifest_hash: String::new(), // Computed after
        };
        manifest.manifest_hash = compute_manifest_hash(&manifest)?;
        persistence.finalize(&manifest)?;

        Ok(EditionReport { items, manifest })
    }
}

/// Loads every chosen element of one item concurrently and joins them, in
/// layer order.
fn load_assets<'c>(
    drawables: &dyn DrawableSource,
    combination: &Combination<'c>,
) -> Result<Vec<LoadedLayer<'c>>> {
    combination
        .picks
        .par_iter()
        .map(|pick| -> Result<LoadedLayer<'c>> {
            let layer: &'c Layer = pick.layer;
            let element: &'c Element = pick.element;
            let file = element.file_name.as_str();
            let drawable = drawables.load(&layer.name, file)?;
            Ok(LoadedLayer {
                layer: &layer.name,
                file,
                drawable,
            })
        })
        .collect()
}

/// Filesystem persistence for `config.buildDir`, with the configured
/// rasterizer for vector runs.
pub fn fs_persistence(config: &EditionConfig) -> FsPersistence {
    let persistence = FsPersistence::new(&config.build_dir, config.format);
    match &config.rasterizer {
        Some(spec) => persistence.with_rasterizer(Box::new(CommandRasterizer::new(spec.clone()))),
        None => persistence,
    }
}
