//! Combination Sampler
//!
//! Draws one element per layer under rarity-weighted rejection sampling and
//! enforces edition-wide DNA uniqueness with a bounded retry loop.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::catalog::{Element, Layer};
use crate::error::{GenerationError, Result};

/// Per-layer element indices, serialized as a string key.
///
/// Each index is zero-padded to the decimal width of its layer's element
/// count, so stacks of layers with fewer than ten elements serialize as a
/// plain digit concatenation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dna(String);

impl Dna {
    pub fn encode(layers: &[Layer], indices: &[usize]) -> Self {
        let key = layers
            .iter()
            .zip(indices)
            .map(|(layer, index)| {
                let width = digit_width(layer.elements.len().saturating_sub(1));
                format!("{:0width$}", index, width = width)
            })
            .collect();
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Dna {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn digit_width(max_index: usize) -> usize {
    max_index.to_string().len()
}

/// One chosen element for one layer.
#[derive(Debug, Clone)]
pub struct Pick<'a> {
    pub layer: &'a Layer,
    pub index: usize,
    pub element: &'a Element,
}

#[derive(Debug, Clone)]
pub struct Combination<'a> {
    pub dna: Dna,
    pub picks: Vec<Pick<'a>>,
}

impl<'a> Combination<'a> {
    pub fn elements(&self) -> impl Iterator<Item = &'a Element> + '_ {
        self.picks.iter().map(|p| p.element)
    }
}

/// DNA values consumed during one run.
#[derive(Debug, Default)]
pub struct DnaRegistry {
    consumed: HashSet<Dna>,
}

impl DnaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, dna: &Dna) -> bool {
        self.consumed.contains(dna)
    }

    pub fn len(&self) -> usize {
        self.consumed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumed.is_empty()
    }

    fn insert(&mut self, dna: Dna) {
        self.consumed.insert(dna);
    }
}

pub struct CombinationSampler<'a> {
    layers: &'a [Layer],
    tolerance: u32,
}

impl<'a> CombinationSampler<'a> {
    /// `tolerance` is the number of full combinations tried per edition
    /// before giving up.
    pub fn new(layers: &'a [Layer], tolerance: u32) -> Self {
        Self { layers, tolerance }
    }

    /// Draws a combination not yet in `consumed` and records it there.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        consumed: &mut DnaRegistry,
        edition: u32,
    ) -> Result<Combination<'a>> {
        for attempt in 1..=self.tolerance {
            let picks: Vec<Pick<'a>> = self
                .layers
                .iter()
                .map(|layer| {
                    let (index, _) = draw_element(&mut *rng, &layer.elements);
                    Pick {
                        layer,
                        index,
                        element: &layer.elements[index],
                    }
                })
                .collect();

            let indices: Vec<usize> = picks.iter().map(|p| p.index).collect();
            let dna = Dna::encode(self.layers, &indices);

            if consumed.contains(&dna) {
                tracing::debug!(edition, attempt, dna = %dna, "duplicate DNA, redrawing");
                continue;
            }

            consumed.insert(dna.clone());
            return Ok(Combination { dna, picks });
        }

        Err(GenerationError::CombinationSpaceExhausted {
            edition,
            attempts: self.tolerance,
        })
    }
}

/// Rejection-samples one element: a uniform index is accepted with
/// probability equal to its rarity, otherwise the whole list is redrawn.
///
/// Returns the accepted index and the number of draws it took.
/// `elements` must be non-empty with rarities in (0, 1].
pub fn draw_element<R: Rng + ?Sized>(rng: &mut R, elements: &[Element]) -> (usize, u32) {
    let mut draws = 0;
    loop {
        draws += 1;
        let index = rng.gen_range(0..elements.len());
        if rng.gen::<f64>() < elements[index].rarity {
            return (index, draws);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn element(id: usize, rarity: f64) -> Element {
        Element {
            id,
            display_name: format!("e{}", id),
            file_name: format!("e{}.png", id),
            rarity,
        }
    }

    fn layer(id: usize, rarities: &[f64]) -> Layer {
        Layer {
            id,
            name: format!("L{}", id),
            elements: rarities
                .iter()
                .enumerate()
                .map(|(i, r)| element(i + 1, *r))
                .collect(),
        }
    }

    #[test]
    fn test_common_elements_accept_on_first_draw() {
        let mut rng = StdRng::seed_from_u64(7);
        let elements = layer(0, &[1.0, 1.0, 1.0]).elements;
        for _ in 0..500 {
            let (_, draws) = draw_element(&mut rng, &elements);
            assert_eq!(draws, 1);
        }
    }

    #[test]
    fn test_rarity_weights_selection() {
        let mut rng = StdRng::seed_from_u64(11);
        let elements = layer(0, &[1.0, 0.1]).elements;
        let mut counts = [0u32; 2];
        for _ in 0..20_000 {
            counts[draw_element(&mut rng, &elements).0] += 1;
        }
        // Expected ratio 10:1.
        let ratio = counts[0] as f64 / counts[1] as f64;
        assert!(ratio > 7.0 && ratio < 14.0, "ratio {}", ratio);
    }

    #[test]
    fn test_dna_encoding() {
        let small = vec![layer(0, &[1.0, 1.0]), layer(1, &[1.0])];
        assert_eq!(Dna::encode(&small, &[1, 0]).as_str(), "10");

        let wide = vec![layer(0, &[1.0; 12]), layer(1, &[1.0; 3])];
        assert_eq!(Dna::encode(&wide, &[1, 1]).as_str(), "011");
        assert_ne!(Dna::encode(&wide, &[1, 1]), Dna::encode(&wide, &[11, 0]));
    }

    #[test]
    fn test_sampler_never_repeats() {
        let layers = vec![layer(0, &[1.0, 1.0, 1.0]), layer(1, &[1.0, 1.0])];
        let sampler = CombinationSampler::new(&layers, 1_000);
        let mut rng = StdRng::seed_from_u64(3);
        let mut consumed = DnaRegistry::new();

        let mut seen = HashSet::new();
        for edition in 1..=6 {
            let combo = sampler.sample(&mut rng, &mut consumed, edition).unwrap();
            assert!(seen.insert(combo.dna.clone()));
            assert_eq!(combo.picks.len(), 2);
        }
        assert_eq!(consumed.len(), 6);

        let err = sampler.sample(&mut rng, &mut consumed, 7).unwrap_err();
        assert!(matches!(
            err,
            GenerationError::CombinationSpaceExhausted { edition: 7, attempts: 1_000 }
        ));
    }
}
