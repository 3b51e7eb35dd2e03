//! Name/Attribute Synthesizer

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;

use crate::catalog::Element;
use crate::error::{GenerationError, Result};
use crate::sampler::Combination;

pub const NAME_SEPARATOR: &str = "-";

#[derive(Debug, Clone, PartialEq)]
pub struct Attributes {
    pub name: String,
    pub description: String,
    pub rarity_score: f64,
}

/// Names handed out during one run.
#[derive(Debug, Default)]
pub struct NameRegistry {
    consumed: HashSet<String>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.consumed.contains(name)
    }

    pub fn len(&self) -> usize {
        self.consumed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumed.is_empty()
    }
}

pub struct NameSynthesizer<'a> {
    adjectives: &'a [String],
    subject_layer: usize,
    tolerance: u32,
}

impl<'a> NameSynthesizer<'a> {
    pub fn new(adjectives: &'a [String], subject_layer: usize, tolerance: u32) -> Self {
        Self {
            adjectives,
            subject_layer,
            tolerance,
        }
    }

    pub fn synthesize<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        combination: &Combination<'_>,
        names: &mut NameRegistry,
        edition: u32,
    ) -> Result<Attributes> {
        let subject = self.subject_name(combination)?;
        let name = self.unique_name(rng, subject, names, edition)?;

        Ok(Attributes {
            name,
            description: describe(combination, self.subject_layer),
            rarity_score: rarity_score(combination.elements()),
        })
    }

    fn subject_name<'c>(&self, combination: &'c Combination<'_>) -> Result<&'c str> {
        combination
            .picks
            .get(self.subject_layer)
            .map(|p| p.element.display_name.as_str())
            .ok_or_else(|| {
                GenerationError::InvalidConfig(format!(
                    "subject layer {} is out of range for {} layers",
                    self.subject_layer,
                    combination.picks.len()
                ))
            })
    }

    fn unique_name<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        subject: &str,
        names: &mut NameRegistry,
        edition: u32,
    ) -> Result<String> {
        for attempt in 1..=self.tolerance {
            let adjective = self
                .adjectives
                .choose(&mut *rng)
                .ok_or_else(|| GenerationError::InvalidConfig("adjectives must not be empty".into()))?;
            let name = format!("{}{}{}", adjective, NAME_SEPARATOR, subject);

            if names.consumed.insert(name.clone()) {
                return Ok(name);
            }
            tracing::debug!(edition, attempt, name = %name, "duplicate name, redrawing");
        }

        Err(GenerationError::NameSpaceExhausted {
            edition,
            attempts: self.tolerance,
        })
    }
}

/// Product of every selected element's rarity.
pub fn rarity_score<'e>(elements: impl IntoIterator<Item = &'e Element>) -> f64 {
    elements.into_iter().fold(1.0, |acc, e| acc * e.rarity)
}

/// Narrative sentence: the subject, then up to three other layers in
/// stacking order.
///
/// For the classic five-layer stack with the face as subject this reads
/// "Smile feeling Blue wearing a Hoodie and a Beanie".
pub fn describe(combination: &Combination<'_>, subject_layer: usize) -> String {
    let names: Vec<&str> = combination
        .picks
        .iter()
        .map(|p| p.element.display_name.as_str())
        .collect();
    let Some(subject) = names.get(subject_layer) else {
        return String::new();
    };
    let others: Vec<&str> = names
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != subject_layer)
        .map(|(_, n)| *n)
        .take(3)
        .collect();

    let mut sentence = subject.to_string();
    for (connector, name) in [" feeling ", " wearing a ", " and a "].iter().zip(&others) {
        sentence.push_str(connector);
        sentence.push_str(name);
    }
    sentence
}
