use std::{fmt, sync::Arc};

use serde::{ser::SerializeMap, Serialize, Serializer};

use crate::{LipSyncConfig, SpectralEnvelope};

/// Closed, ordered set of viseme categories fixed for the life of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisemeSet {
    names: Vec<String>,
    silence: usize,
}

impl VisemeSet {
    /// Builds the category set of a validated configuration.
    pub fn from_config(config: &LipSyncConfig) -> Self {
        let names: Vec<String> = config
            .categories
            .iter()
            .map(|category| category.name.clone())
            .collect();
        let silence = names
            .iter()
            .position(|name| *name == config.silence_category)
            .unwrap_or(0);
        Self { names, silence }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|candidate| candidate == name)
    }

    /// Index of the category asserted on silence.
    pub fn silence_index(&self) -> usize {
        self.silence
    }
}

/// One weight in [0, 1] per category of a [`VisemeSet`].
#[derive(Clone, PartialEq)]
pub struct VisemeWeights {
    set: Arc<VisemeSet>,
    values: Vec<f32>,
}

impl VisemeWeights {
    /// All categories at zero.
    pub fn zeros(set: Arc<VisemeSet>) -> Self {
        let values = vec![0.0; set.len()];
        Self { set, values }
    }

    /// Only the silence category active.
    pub fn silence(set: Arc<VisemeSet>) -> Self {
        let mut weights = Self::zeros(set);
        let index = weights.set.silence_index();
        weights.values[index] = 1.0;
        weights
    }

    /// Builds weights from values in category order. Missing entries are
    /// zero, extra entries are dropped and everything is clamped to [0, 1].
    pub fn from_values(set: Arc<VisemeSet>, values: impl IntoIterator<Item = f32>) -> Self {
        let mut weights = Self::zeros(set);
        for (slot, value) in weights.values.iter_mut().zip(values) {
            *slot = clamp_unit(value);
        }
        weights
    }

    pub fn set(&self) -> &Arc<VisemeSet> {
        &self.set
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        self.set.index_of(name).map(|index| self.values[index])
    }

    pub fn silence_weight(&self) -> f32 {
        self.values[self.set.silence_index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> + '_ {
        self.set
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    /// Category with the largest weight; the first one wins on equality.
    pub fn dominant(&self) -> Option<(&str, f32)> {
        self.iter().fold(None, |best, (name, weight)| match best {
            Some((_, best_weight)) if best_weight >= weight => best,
            _ => Some((name, weight)),
        })
    }

    /// Moves every weight towards `target` by `alpha` in [0, 1].
    ///
    /// Both inputs are in [0, 1], so the convex combination is as well.
    pub fn blend_towards(&self, target: &VisemeWeights, alpha: f32) -> VisemeWeights {
        let alpha = clamp_unit(alpha);
        let values = self
            .values
            .iter()
            .zip(&target.values)
            .map(|(current, goal)| clamp_unit(current + alpha * (goal - current)))
            .collect();
        VisemeWeights {
            set: self.set.clone(),
            values,
        }
    }
}

impl fmt::Debug for VisemeWeights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl Serialize for VisemeWeights {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, weight) in self.iter() {
            map.serialize_entry(name, &weight)?;
        }
        map.end()
    }
}

/// Maps spectral envelopes to raw viseme activations.
///
/// A category's score is `1 - mean(|envelope - signature|)`. Categories
/// scoring within `tie_epsilon` of the best are kept and rescaled against the
/// best score, so the winner always reaches 1; the rest are dropped to zero.
/// Silence is decided by energy alone: it is asserted outright when the mean
/// envelope energy falls below `silence_floor` and scores zero otherwise.
#[derive(Debug, Clone)]
pub struct VisemeClassifier {
    set: Arc<VisemeSet>,
    signatures: Vec<Vec<f32>>,
    silence_floor: f32,
    tie_epsilon: f32,
}

impl VisemeClassifier {
    pub fn new(config: &LipSyncConfig, set: Arc<VisemeSet>) -> Self {
        Self {
            set,
            signatures: config
                .categories
                .iter()
                .map(|category| category.signature.clone())
                .collect(),
            silence_floor: config.silence_floor,
            tie_epsilon: config.tie_epsilon,
        }
    }

    pub fn classify(&self, envelope: &SpectralEnvelope) -> VisemeWeights {
        if envelope.energy() < self.silence_floor {
            return VisemeWeights::silence(self.set.clone());
        }

        let silence = self.set.silence_index();
        let scores: Vec<f32> = self
            .signatures
            .iter()
            .enumerate()
            .map(|(index, signature)| {
                if index == silence {
                    0.0
                } else {
                    similarity(envelope.bands(), signature)
                }
            })
            .collect();
        let best = scores.iter().copied().fold(0.0_f32, f32::max);
        if best <= f32::EPSILON {
            return VisemeWeights::silence(self.set.clone());
        }
        let cutoff = best - self.tie_epsilon;

        VisemeWeights::from_values(
            self.set.clone(),
            scores
                .into_iter()
                .map(|score| if score >= cutoff { score / best } else { 0.0 }),
        )
    }
}

fn similarity(envelope: &[f32], signature: &[f32]) -> f32 {
    if signature.is_empty() || envelope.len() != signature.len() {
        return 0.0;
    }
    let distance: f32 = envelope
        .iter()
        .zip(signature)
        .map(|(value, expected)| (value - expected).abs())
        .sum::<f32>()
        / signature.len() as f32;
    clamp_unit(1.0 - distance)
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{analysis::tests::two_band_config, VisemeSignature};

    fn classifier(config: &LipSyncConfig) -> VisemeClassifier {
        VisemeClassifier::new(config, Arc::new(VisemeSet::from_config(config)))
    }

    #[test]
    fn silence_floor_overrides_every_category() {
        let config = two_band_config();
        let weights = classifier(&config).classify(&SpectralEnvelope::from_bands(vec![0.01, 0.02]));

        assert_eq!(weights.get("silence"), Some(1.0));
        assert_eq!(weights.get("open"), Some(0.0));
    }

    #[test]
    fn loud_envelope_activates_open() {
        let config = two_band_config();
        let weights = classifier(&config).classify(&SpectralEnvelope::from_bands(vec![1.0, 1.0]));

        assert_eq!(weights.get("open"), Some(1.0));
        assert_eq!(weights.get("silence"), Some(0.0));
        assert_eq!(weights.dominant(), Some(("open", 1.0)));
    }

    #[test]
    fn energy_in_a_single_band_still_fully_opens() {
        let config = two_band_config();
        let classifier = classifier(&config);

        for bands in [vec![1.0, 0.0], vec![0.0, 1.0]] {
            let weights = classifier.classify(&SpectralEnvelope::from_bands(bands));
            assert_eq!(weights.get("open"), Some(1.0));
            assert_eq!(weights.get("silence"), Some(0.0));
        }
    }

    #[test]
    fn winner_is_rescaled_to_full_weight() {
        let mut config = two_band_config();
        config.categories = vec![
            VisemeSignature::new("silence", vec![0.0, 0.0]),
            VisemeSignature::new("low", vec![1.0, 0.0]),
            VisemeSignature::new("high", vec![0.0, 1.0]),
        ];
        config.tie_epsilon = 0.0;
        let weights = classifier(&config).classify(&SpectralEnvelope::from_bands(vec![0.6, 0.2]));

        assert_eq!(weights.get("low"), Some(1.0));
        assert_eq!(weights.get("high"), Some(0.0));
        assert_eq!(weights.get("silence"), Some(0.0));
    }

    #[test]
    fn near_ties_keep_every_contender() {
        let mut config = two_band_config();
        config.categories = vec![
            VisemeSignature::new("silence", vec![0.0, 0.0]),
            VisemeSignature::new("low", vec![0.8, 0.2]),
            VisemeSignature::new("mid", vec![0.7, 0.3]),
            VisemeSignature::new("high", vec![0.1, 0.9]),
        ];
        config.tie_epsilon = 0.15;
        let weights = classifier(&config).classify(&SpectralEnvelope::from_bands(vec![0.8, 0.2]));

        let low = weights.get("low").unwrap();
        let mid = weights.get("mid").unwrap();
        assert!((low - 1.0).abs() < 1e-6);
        assert!((mid - 0.9).abs() < 1e-6);
        assert_eq!(weights.get("high"), Some(0.0));
        assert_eq!(weights.get("silence"), Some(0.0));
    }

    #[test]
    fn weights_cover_the_configured_set() {
        let config = LipSyncConfig::default();
        let envelope = SpectralEnvelope::from_bands(vec![0.9, 0.6, 0.4, 0.3, 0.2]);
        let weights = classifier(&config).classify(&envelope);

        assert_eq!(weights.values().len(), config.categories.len());
        assert!(weights.values().iter().all(|w| (0.0..=1.0).contains(w)));
        assert!(weights.dominant().is_some());
    }

    #[test]
    fn blending_stays_within_unit_range() {
        let config = two_band_config();
        let set = Arc::new(VisemeSet::from_config(&config));
        let from = VisemeWeights::from_values(set.clone(), [1.0, 0.0]);
        let to = VisemeWeights::from_values(set, [0.0, 1.0]);

        let mid = from.blend_towards(&to, 0.25);
        assert_eq!(mid.values(), &[0.75, 0.25]);
        let clamped = from.blend_towards(&to, 4.0);
        assert_eq!(clamped.values(), &[0.0, 1.0]);
    }

    #[test]
    fn serialises_as_name_map() {
        let config = two_band_config();
        let set = Arc::new(VisemeSet::from_config(&config));
        let weights = VisemeWeights::from_values(set, [0.5, 0.25]);

        let json = serde_json::to_string(&weights).unwrap();
        assert_eq!(json, r#"{"silence":0.5,"open":0.25}"#);
    }
}
