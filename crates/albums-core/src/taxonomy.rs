//! Album taxonomy.
//!
//! Maps classifier labels to album names through keyword vocabularies.
//! The builtin vocabulary is embedded at compile time from
//! `contrib/taxonomy.toml`.

use crate::types::{AlbumName, Prediction};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use thiserror::Error;

const BUILTIN_TAXONOMY: &str = include_str!("../../../contrib/taxonomy.toml");

/// Labels at or above this confidence that match no vocabulary get a
/// candidate standalone album name. The candidate is only logged.
pub const STANDALONE_ALBUM_CONFIDENCE: f32 = 0.8;

static BUILTIN: OnceLock<Taxonomy> = OnceLock::new();

#[derive(Error, Debug)]
pub enum TaxonomyError {
    #[error("invalid taxonomy TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Deserialize)]
struct TaxonomyFile {
    album: Vec<AlbumVocabulary>,
}

/// One album and the label terms that route into it.
#[derive(Debug, Clone, Deserialize)]
pub struct AlbumVocabulary {
    pub name: AlbumName,
    pub terms: Vec<String>,
}

impl AlbumVocabulary {
    /// Substring match of a case-folded label against every term.
    fn matches(&self, label_lower: &str) -> bool {
        self.terms.iter().any(|term| label_lower.contains(term.as_str()))
    }
}

/// Ordered list of album vocabularies.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    albums: Vec<AlbumVocabulary>,
}

impl Taxonomy {
    /// The compiled-in People / Vehicles / Animals / Nature vocabulary.
    pub fn builtin() -> &'static Taxonomy {
        BUILTIN.get_or_init(|| match Taxonomy::from_toml(BUILTIN_TAXONOMY) {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(error = %e, "bad builtin taxonomy; every image will land in Other");
                Taxonomy { albums: Vec::new() }
            }
        })
    }

    /// Parse a taxonomy from TOML (`[[album]]` tables with `name` and `terms`).
    ///
    /// Terms are lowercased so matching against case-folded labels works.
    pub fn from_toml(src: &str) -> Result<Self, TaxonomyError> {
        let file: TaxonomyFile = toml::from_str(src)?;
        let albums = file
            .album
            .into_iter()
            .map(|a| AlbumVocabulary {
                name: a.name,
                terms: a.terms.into_iter().map(|t| t.to_lowercase()).collect(),
            })
            .collect();
        Ok(Self { albums })
    }

    pub fn albums(&self) -> &[AlbumVocabulary] {
        &self.albums
    }

    /// Album names for a prediction list. Never empty: falls back to `Other`.
    pub fn assign(&self, predictions: &[Prediction]) -> BTreeSet<AlbumName> {
        let mut albums = BTreeSet::new();

        for prediction in predictions {
            let label_lower = prediction.label().to_lowercase();
            let mut matched = false;

            for vocabulary in &self.albums {
                if vocabulary.matches(&label_lower) {
                    albums.insert(vocabulary.name.clone());
                    matched = true;
                }
            }

            // Inert: the candidate never becomes an album. Turning this into
            // real per-label albums needs a product decision first.
            if !matched && prediction.confidence() >= STANDALONE_ALBUM_CONFIDENCE {
                let candidate = standalone_album_name(prediction.label());
                tracing::debug!(
                    label = prediction.label(),
                    candidate = %candidate,
                    "unmatched high-confidence label; standalone albums are disabled"
                );
            }
        }

        if albums.is_empty() {
            albums.insert(AlbumName::other());
        }
        albums
    }
}

/// Title-cased album name for a raw label (`sea_lion` → `Sea Lion`).
pub fn standalone_album_name(label: &str) -> String {
    label
        .replace('_', " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(set: &BTreeSet<AlbumName>) -> Vec<&str> {
        set.iter().map(AlbumName::as_str).collect()
    }

    fn assign(labels: &[(&str, f32)]) -> BTreeSet<AlbumName> {
        let predictions: Vec<Prediction> = labels.iter().map(|(l, c)| Prediction::new(*l, *c)).collect();
        Taxonomy::builtin().assign(&predictions)
    }

    #[test]
    fn test_builtin_has_four_albums_in_order() {
        let albums: Vec<&str> = Taxonomy::builtin().albums().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(albums, vec!["People", "Vehicles", "Animals", "Nature"]);
    }

    #[test]
    fn test_person_goes_to_people() {
        assert_eq!(names(&assign(&[("person", 0.95)])), vec!["People"]);
    }

    #[test]
    fn test_car_and_tree() {
        assert_eq!(names(&assign(&[("car", 0.5), ("tree", 0.35)])), vec!["Nature", "Vehicles"]);
    }

    #[test]
    fn test_case_folded_match() {
        assert_eq!(names(&assign(&[("Golden_Retriever", 0.7)])), vec!["Animals"]);
    }

    #[test]
    fn test_label_can_match_several_albums() {
        // "horse" → Animals, "car" inside "cart" → Vehicles
        let albums = assign(&[("horse_cart", 0.6)]);
        assert_eq!(names(&albums), vec!["Animals", "Vehicles"]);
    }

    #[test]
    fn test_unmatched_falls_back_to_other() {
        assert_eq!(names(&assign(&[("espresso", 0.4)])), vec!["Other"]);
    }

    #[test]
    fn test_fallback_prediction_maps_to_other() {
        assert_eq!(names(&assign(&[("other", 0.0)])), vec!["Other"]);
    }

    #[test]
    fn test_high_confidence_unmatched_is_inert() {
        assert_eq!(names(&assign(&[("espresso_maker", 0.99)])), vec!["Other"]);
    }

    #[test]
    fn test_empty_predictions_yield_other() {
        assert_eq!(names(&assign(&[])), vec!["Other"]);
    }

    #[test]
    fn test_custom_taxonomy() {
        let taxonomy = Taxonomy::from_toml(
            r#"
            [[album]]
            name = "Food"
            terms = ["Espresso", "pizza"]
            "#,
        )
        .unwrap();
        let albums = taxonomy.assign(&[Prediction::new("espresso", 0.5)]);
        assert_eq!(names(&albums), vec!["Food"]);
    }

    #[test]
    fn test_invalid_taxonomy() {
        assert!(Taxonomy::from_toml("album = 3").is_err());
    }

    #[test]
    fn test_standalone_album_name() {
        assert_eq!(standalone_album_name("sea_lion"), "Sea Lion");
        assert_eq!(standalone_album_name("ESPRESSO"), "Espresso");
    }
}
