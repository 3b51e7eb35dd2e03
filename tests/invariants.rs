//! Contract Invariant Tests
//!
//! These tests verify the non-negotiable guarantees of an edition run.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use forgeeditions_core::{
    catalog::ElementDecoder,
    codec::{self, RasterImage, SvgFragment},
    compositor::{Compositor, Drawable, DrawableSource, ImageArtifact, LoadedLayer, VectorCompositor},
    config::{CompositorKind, EditionConfig, Format, RasterizerSpec},
    edition::{fs_persistence, DriverState, EditionDriver},
    error::GenerationError,
    persist::{FsPersistence, MemoryPersistence, Persistence, Rasterizer, MANIFEST_FILE},
    sampler::draw_element,
    LayerRegistry, RasterCompositor, StaticElementSource,
};

const FORMAT: Format = Format { width: 4, height: 4 };
const ADJECTIVES: &[&str] = &[
    "happy", "sad", "brave", "shy", "loud", "calm", "odd", "wise", "bold", "sly", "kind", "wild",
    "fond", "keen", "glum", "zany",
];

/// Serves each element as a vector fragment naming its layer and file.
struct MarkerSource;

impl DrawableSource for MarkerSource {
    fn load(&self, layer: &str, file: &str) -> forgeeditions_core::error::Result<Drawable> {
        Ok(Drawable::Vector(SvgFragment {
            view_box: None,
            body: format!("<g id=\"{}/{}\"/>", layer, file),
        }))
    }
}

/// Records the draw order of every item.
struct RecordingCompositor {
    calls: Rc<RefCell<Vec<Vec<String>>>>,
}

impl Compositor for RecordingCompositor {
    fn composite(
        &mut self,
        layers: &[LoadedLayer<'_>],
    ) -> forgeeditions_core::error::Result<ImageArtifact> {
        let order: Vec<String> = layers.iter().map(|l| l.layer.to_string()).collect();
        self.calls.borrow_mut().push(order.clone());
        Ok(ImageArtifact::Vector(order.join(">")))
    }
}

fn config(layers: &[(&str, &[&str])], edition_size: u32) -> (EditionConfig, StaticElementSource) {
    let names: Vec<&str> = layers.iter().map(|(n, _)| *n).collect();
    let config = EditionConfig::new(&names, FORMAT, edition_size, ADJECTIVES);
    let source = layers
        .iter()
        .fold(StaticElementSource::new(), |s, (n, files)| s.with_layer(n, files));
    (config, source)
}

fn vector_driver(layers: &[(&str, &[&str])], edition_size: u32) -> EditionDriver {
    let (config, source) = config(layers, edition_size);
    let registry = LayerRegistry::from_config(&config, &source).unwrap();
    let compositor = VectorCompositor::new(FORMAT, &config.layer_names());
    EditionDriver::new(config, registry, Box::new(MarkerSource), Box::new(compositor)).unwrap()
}

const STACK: &[(&str, &[&str])] = &[
    ("Background", &["Blue.svg", "Red.svg", "Green_50.svg"]),
    ("Sweater", &["Hoodie.svg", "Vest_20.svg", "Knit.svg"]),
    ("Face", &["Smile.svg", "Frown.svg", "Wink.svg"]),
    ("Hat", &["Cap.svg", "Beanie.svg"]),
];

#[test]
fn invariant_dna_unique_across_edition() {
    let mut driver = vector_driver(STACK, 20).with_seed(1);
    let mut persistence = MemoryPersistence::new();
    let report = driver.run(&mut persistence).unwrap();

    let dnas: HashSet<_> = report.items.iter().map(|i| i.dna.clone()).collect();
    assert_eq!(dnas.len(), 20);
    assert_eq!(persistence.items.len(), 20);
}

#[test]
fn invariant_names_unique_across_edition() {
    let mut driver = vector_driver(STACK, 20).with_seed(2);
    let report = driver.run(&mut MemoryPersistence::new()).unwrap();

    let names: HashSet<_> = report.items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names.len(), 20);
    for item in &report.items {
        let (_, subject) = item.name.split_once('-').unwrap();
        assert!(["Smile", "Frown", "Wink"].contains(&subject), "{}", item.name);
    }
}

#[test]
fn invariant_rarity_score_is_product() {
    let mut driver = vector_driver(STACK, 20).with_seed(3);
    let report = driver.run(&mut MemoryPersistence::new()).unwrap();
    let layers = driver.layers();

    for item in &report.items {
        let expected: f64 = item
            .dna
            .as_str()
            .chars()
            .zip(layers)
            .map(|(digit, layer)| {
                let index = digit.to_digit(10).unwrap() as usize;
                layer.elements[index].rarity
            })
            .product();
        assert!((item.rarity_score - expected).abs() < 1e-12);
    }
}

#[test]
fn invariant_all_common_rarity_scores_one() {
    let layers: &[(&str, &[&str])] = &[("A", &["a.svg", "b.svg"]), ("B", &["c.svg", "d.svg"])];
    let mut driver = vector_driver(layers, 4).with_seed(4);
    let report = driver.run(&mut MemoryPersistence::new()).unwrap();
    assert!(report.items.iter().all(|i| i.rarity_score == 1.0));
}

#[test]
fn invariant_common_layer_draw_never_rejects() {
    let (config, source) = config(&[("A", &["a.png", "b.png", "c.png"])], 1);
    let registry = LayerRegistry::from_config(&config, &source).unwrap();
    let mut rng = <rand::rngs::StdRng as rand::SeedableRng>::seed_from_u64(5);
    for _ in 0..1_000 {
        let (_, draws) = draw_element(&mut rng, &registry.layers()[0].elements);
        assert_eq!(draws, 1);
    }
}

#[test]
fn invariant_same_seed_same_edition() {
    let run = |seed| {
        let mut driver = vector_driver(STACK, 15).with_seed(seed);
        let report = driver.run(&mut MemoryPersistence::new()).unwrap();
        report
            .items
            .into_iter()
            .map(|i| (i.dna.to_string(), i.name))
            .collect::<Vec<_>>()
    };
    assert_eq!(run(42), run(42));
    assert_ne!(run(42), run(43));
}

#[test]
fn invariant_two_layer_scenario() {
    let layers: &[(&str, &[&str])] = &[("A", &["elementA0.png", "elementA1.png"]), ("B", &["elementB0.png"])];
    let mut driver = vector_driver(layers, 2).with_seed(6);
    let report = driver.run(&mut MemoryPersistence::new()).unwrap();

    let dnas: HashSet<String> = report.items.iter().map(|i| i.dna.to_string()).collect();
    assert_eq!(dnas, HashSet::from(["00".to_string(), "10".to_string()]));
    assert_eq!(driver.state(), DriverState::Done);
}

#[test]
fn invariant_exhausted_space_fails() {
    let mut driver = vector_driver(&[("A", &["only.png"])], 2).with_seed(7);
    let mut persistence = MemoryPersistence::new();
    let aborted = driver.run(&mut persistence).unwrap_err();

    assert_eq!(aborted.last_completed, 1);
    match aborted.cause {
        GenerationError::CombinationSpaceExhausted { edition, attempts } => {
            assert_eq!(edition, 2);
            assert_eq!(attempts, 200);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(persistence.items.len(), 1);
}

#[test]
fn invariant_huge_edition_size_still_reports_exhaustion() {
    let mut driver = vector_driver(&[("A", &["only.png"])], u32::MAX).with_seed(7);
    let mut persistence = MemoryPersistence::new();
    let aborted = driver.run(&mut persistence).unwrap_err();

    assert_eq!(aborted.last_completed, 1);
    assert!(matches!(
        aborted.cause,
        GenerationError::CombinationSpaceExhausted { edition: 2, .. }
    ));
    assert_eq!(persistence.items.len(), 1);
}

#[test]
fn invariant_oversized_edition_never_duplicates() {
    let layers: &[(&str, &[&str])] = &[("A", &["a.svg", "b.svg"]), ("B", &["c.svg", "d.svg"])];
    let mut driver = vector_driver(layers, 5).with_seed(8);
    let mut persistence = MemoryPersistence::new();
    let aborted = driver.run(&mut persistence).unwrap_err();

    assert!(matches!(
        aborted.cause,
        GenerationError::CombinationSpaceExhausted { edition: 5, .. }
    ));
    let dnas: HashSet<_> = persistence.items.iter().map(|i| i.metadata.dna.clone()).collect();
    assert_eq!(dnas.len(), 4);
}

#[test]
fn invariant_layers_drawn_in_stack_order() {
    let (config, source) = config(&[("Background", &["Sky.svg"]), ("Hat", &["Cap.svg"])], 1);
    let registry = LayerRegistry::from_config(&config, &source).unwrap();
    let calls = Rc::new(RefCell::new(vec![]));
    let compositor = RecordingCompositor { calls: calls.clone() };
    let mut driver =
        EditionDriver::new(config, registry, Box::new(MarkerSource), Box::new(compositor)).unwrap();

    let mut persistence = MemoryPersistence::new();
    driver.run(&mut persistence).unwrap();

    assert_eq!(*calls.borrow(), vec![vec!["Background".to_string(), "Hat".to_string()]]);
    assert_eq!(
        persistence.items[0].artifact,
        ImageArtifact::Vector("Background>Hat".to_string())
    );
}

#[test]
fn invariant_rarity_marker_weights_sampling() {
    let layers: &[(&str, &[&str])] = &[("A", &["Common.svg", "Rare_10.svg"])];
    let (config, source) = config(layers, 1);
    let registry = LayerRegistry::from_config(&config, &source).unwrap();
    let elements = &registry.layers()[0].elements;
    assert_eq!(elements[1].rarity, 0.1);

    let mut rng = <rand::rngs::StdRng as rand::SeedableRng>::seed_from_u64(9);
    let rare = (0..10_000)
        .filter(|_| draw_element(&mut rng, elements).0 == 1)
        .count();
    // 1/11 of draws expected, far from the 1/2 an ignored marker would give.
    assert!(rare > 600 && rare < 1_300, "rare drawn {} times", rare);
}

#[test]
fn invariant_unknown_marker_rejected_at_catalog_build() {
    let (config, source) = config(&[("A", &["Crown_sr.png"])], 1);
    let err = LayerRegistry::from_config(&config, &source).unwrap_err();
    assert!(matches!(err, GenerationError::InvalidRarityMarker { .. }));

    let decoder = ElementDecoder::from_config(&config);
    assert!(decoder.decode("A", 1, "Crown_25.png").is_ok());
}

// --- Filesystem end-to-end ---

fn write_png(path: &Path, rgba: [u8; 4]) {
    let png = codec::encode_png(&RasterImage::filled(2, 2, rgba)).unwrap();
    fs::write(path, png).unwrap();
}

fn layer_dir(root: &Path, layer: &str, files: &[(&str, [u8; 4])]) {
    let dir = root.join(layer);
    fs::create_dir_all(&dir).unwrap();
    for (file, rgba) in files {
        write_png(&dir.join(file), *rgba);
    }
}

#[test]
fn invariant_filesystem_edition() {
    let root = tempfile::tempdir().unwrap();
    let layers = root.path().join("layers");
    layer_dir(&layers, "Background", &[("Red.png", [255, 0, 0, 255]), ("Green.png", [0, 255, 0, 255])]);
    layer_dir(&layers, "Hat", &[("Blue.png", [0, 0, 255, 255])]);

    let mut config = EditionConfig::new(&["Background", "Hat"], FORMAT, 2, ADJECTIVES);
    config.layers_dir = layers;
    config.build_dir = root.path().join("build");
    config.base_uri = "ipfs://edition".to_string();

    let mut persistence = fs_persistence(&config);
    let mut driver = EditionDriver::from_config(config).unwrap().with_seed(10);
    let report = driver.run(&mut persistence).unwrap();
    assert_eq!(report.items.len(), 2);

    let build = root.path().join("build");
    for edition in 1..=2 {
        let png = fs::read(build.join(format!("{}.png", edition))).unwrap();
        let image = codec::decode_png(&png).unwrap();
        assert_eq!((image.width, image.height), (4, 4));
        // The opaque hat covers every background.
        assert_eq!(image.pixel(0, 0), [0, 0, 255, 255]);

        let meta: serde_json::Value =
            serde_json::from_slice(&fs::read(build.join(format!("{}.json", edition))).unwrap())
                .unwrap();
        assert_eq!(meta["image"], format!("ipfs://edition/{}.png", edition));
        assert_eq!(meta["attributes"]["rarity"], 1.0);
        assert!(meta["name"].as_str().unwrap().ends_with("-Blue"));
    }

    let manifest: serde_json::Value =
        serde_json::from_slice(&fs::read(build.join(MANIFEST_FILE)).unwrap()).unwrap();
    assert_eq!(manifest["items"].as_array().unwrap().len(), 2);
    assert_eq!(manifest["seed"], 10);
}

#[test]
fn invariant_missing_layer_dir_is_source_unavailable() {
    let root = tempfile::tempdir().unwrap();
    let layers = root.path().join("layers");
    layer_dir(&layers, "Background", &[("Red.png", [255, 0, 0, 255])]);

    let mut config = EditionConfig::new(&["Background", "Hat"], FORMAT, 1, ADJECTIVES);
    config.layers_dir = layers;

    let err = EditionDriver::from_config(config).err().unwrap();
    assert!(matches!(err, GenerationError::SourceUnavailable { ref layer, .. } if layer == "Hat"));
}

#[test]
fn invariant_unreadable_asset_aborts_run() {
    let root = tempfile::tempdir().unwrap();
    let layers = root.path().join("layers");
    fs::create_dir_all(layers.join("Background")).unwrap();
    fs::write(layers.join("Background").join("Broken.png"), b"not a png").unwrap();

    let mut config = EditionConfig::new(&["Background"], FORMAT, 1, ADJECTIVES);
    config.layers_dir = layers;
    config.build_dir = root.path().join("build");

    let mut persistence = fs_persistence(&config);
    let mut driver = EditionDriver::from_config(config).unwrap();
    let aborted = driver.run(&mut persistence).unwrap_err();
    assert_eq!(aborted.last_completed, 0);
    assert!(matches!(aborted.cause, GenerationError::AssetLoadFailure { .. }));
}

struct CopyRasterizer;

impl Rasterizer for CopyRasterizer {
    fn rasterize(&self, svg: &Path, png: &Path, _format: Format) -> std::io::Result<()> {
        fs::copy(svg, png).map(|_| ())
    }
}

#[test]
fn invariant_vector_edition_keeps_markup() {
    let root = tempfile::tempdir().unwrap();
    let layers = root.path().join("layers");
    fs::create_dir_all(layers.join("Background")).unwrap();
    fs::write(
        layers.join("Background").join("Sky.svg"),
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 8 8"><rect id="sky"/></svg>"#,
    )
    .unwrap();
    layer_dir(&layers, "Hat", &[("Cap.png", [0, 0, 255, 255])]);

    let mut config = EditionConfig::new(&["Background", "Hat"], FORMAT, 1, ADJECTIVES);
    config.layers_dir = layers;
    config.build_dir = root.path().join("build");
    config.compositor = CompositorKind::Vector;
    config.rasterizer = Some(RasterizerSpec {
        program: "unused".into(),
        args: vec![],
    });

    let mut persistence =
        FsPersistence::new(&config.build_dir, FORMAT).with_rasterizer(Box::new(CopyRasterizer));
    let mut driver = EditionDriver::from_config(config).unwrap().with_seed(11);
    driver.run(&mut persistence).unwrap();

    let svg = fs::read_to_string(root.path().join("build").join("1.svg")).unwrap();
    let sky = svg.find("<rect id=\"sky\"/>").unwrap();
    let cap = svg.find("data:image/png;base64,").unwrap();
    assert!(sky < cap);
    assert!(root.path().join("build").join("1.png").exists());
}

#[test]
fn invariant_raster_compositor_rejects_vector_elements() {
    let (config, source) = config(&[("A", &["a.svg"])], 1);
    let registry = LayerRegistry::from_config(&config, &source).unwrap();
    let mut driver = EditionDriver::new(
        config,
        registry,
        Box::new(MarkerSource),
        Box::new(RasterCompositor::new(FORMAT)),
    )
    .unwrap();

    let mut persistence = MemoryPersistence::new();
    persistence.prepare().unwrap();
    let aborted = driver.run(&mut persistence).unwrap_err();
    assert!(matches!(aborted.cause, GenerationError::UnsupportedDrawable { .. }));
}
