use std::{collections::HashSet, ops::Range, path::Path};

use serde::{Deserialize, Serialize};

use crate::{LipSyncError, Result};

/// Slowest accepted no-data decay: silence is reached within 299 frames.
pub const MIN_DECAY_RATE: f32 = 0.01;

/// Band-energy signature associated with a single viseme category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisemeSignature {
    pub name: String,
    /// Expected normalised energy per band, one value in [0, 1] per band.
    pub signature: Vec<f32>,
}

impl VisemeSignature {
    pub fn new(name: impl Into<String>, signature: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            signature,
        }
    }
}

/// Complete configuration for a lip-sync engine.
///
/// Every field has a default so partially specified JSON documents are
/// accepted; [`LipSyncConfig::validate`] is the single gate that decides
/// whether a configuration may drive a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LipSyncConfig {
    /// Sample rate the engine expects its sources to produce.
    pub sample_rate: u32,
    /// Number of samples analysed per frame.
    pub window_size: usize,
    /// `N + 1` strictly increasing edges describing `N` frequency bands.
    pub band_edges_hz: Vec<f32>,
    /// Band level mapped to an envelope value of 0.
    pub min_db: f32,
    /// Band level mapped to an envelope value of 1.
    pub max_db: f32,
    pub categories: Vec<VisemeSignature>,
    /// Name of the category asserted when the input is silent.
    pub silence_category: String,
    /// Mean envelope energy below which the input counts as silence.
    pub silence_floor: f32,
    /// Categories scoring within this distance of the best are all retained.
    pub tie_epsilon: f32,
    pub half_life_ms: f32,
    /// Fraction of the remaining distance to silence covered per frame
    /// without audio.
    pub decay_rate: f32,
    /// Frames a previous window may be reused before reporting no data.
    pub max_stale_frames: u32,
}

impl Default for LipSyncConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            window_size: 1024,
            band_edges_hz: vec![80.0, 400.0, 1_000.0, 2_500.0, 5_000.0, 10_000.0],
            min_db: -70.0,
            max_db: -10.0,
            categories: default_categories(),
            silence_category: "viseme_sil".to_string(),
            silence_floor: 0.08,
            tie_epsilon: 0.05,
            half_life_ms: 40.0,
            decay_rate: 0.5,
            max_stale_frames: 3,
        }
    }
}

impl LipSyncConfig {
    /// Parses a JSON document, falling back to defaults for missing fields.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Number of frequency bands described by the band edges.
    pub fn band_count(&self) -> usize {
        self.band_edges_hz.len().saturating_sub(1)
    }

    /// Frequency resolution of one FFT bin.
    pub fn bin_hz(&self) -> f32 {
        self.sample_rate as f32 / self.window_size.max(1) as f32
    }

    /// Number of consecutive no-data frames needed for the silence weight to
    /// reach 0.95 from any starting point.
    pub fn frames_to_silence(&self) -> u32 {
        let rate = f64::from(self.decay_rate);
        if rate >= 1.0 {
            return 1;
        }
        let retained = (-rate).ln_1p();
        if !(retained < 0.0) {
            return u32::MAX;
        }
        let frames = (0.05_f64).ln() / retained;
        frames.ceil().clamp(1.0, f64::from(u32::MAX)) as u32
    }

    /// FFT bin range covered by each band. The last band includes its upper
    /// edge so a band ending at Nyquist keeps the Nyquist bin.
    pub fn band_bins(&self) -> Vec<Range<usize>> {
        let bin_hz = self.bin_hz();
        let bin_count = self.window_size / 2 + 1;
        let bands = self.band_count();

        self.band_edges_hz
            .windows(2)
            .enumerate()
            .map(|(index, edges)| {
                let start = ((edges[0] / bin_hz).ceil() as usize).min(bin_count);
                let end = if index + 1 == bands {
                    (edges[1] / bin_hz).floor() as usize + 1
                } else {
                    (edges[1] / bin_hz).ceil() as usize
                };
                start..end.min(bin_count)
            })
            .collect()
    }

    /// Checks the configuration, naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(LipSyncError::config("sample_rate must be positive"));
        }
        if self.window_size < 2 {
            return Err(LipSyncError::config(
                "window_size must contain at least two samples",
            ));
        }
        if self.band_edges_hz.len() < 2 {
            return Err(LipSyncError::config(
                "band_edges_hz must describe at least one band",
            ));
        }
        if self.band_edges_hz.iter().any(|edge| !edge.is_finite()) {
            return Err(LipSyncError::config("band_edges_hz must be finite"));
        }
        if self.band_edges_hz[0] < 0.0 {
            return Err(LipSyncError::config("band_edges_hz must not be negative"));
        }
        if self.band_edges_hz.windows(2).any(|pair| pair[1] <= pair[0]) {
            return Err(LipSyncError::config(
                "band_edges_hz must be strictly increasing",
            ));
        }

        let nyquist = self.sample_rate as f32 * 0.5;
        let top = self.band_edges_hz[self.band_edges_hz.len() - 1];
        if top > nyquist {
            return Err(LipSyncError::config(format!(
                "band edge {top} Hz exceeds the Nyquist frequency {nyquist} Hz"
            )));
        }
        if let Some(index) = self.band_bins().iter().position(|bins| bins.is_empty()) {
            return Err(LipSyncError::config(format!(
                "band {index} covers no FFT bins at window_size {}",
                self.window_size
            )));
        }

        if !(self.min_db.is_finite() && self.max_db.is_finite()) || self.min_db >= self.max_db {
            return Err(LipSyncError::config("min_db must be below max_db"));
        }

        self.validate_categories()?;

        if !self.silence_floor.is_finite() || self.silence_floor < 0.0 {
            return Err(LipSyncError::config("silence_floor must be non-negative"));
        }
        if !self.tie_epsilon.is_finite() || self.tie_epsilon < 0.0 {
            return Err(LipSyncError::config("tie_epsilon must be non-negative"));
        }
        if !self.half_life_ms.is_finite() || self.half_life_ms <= 0.0 {
            return Err(LipSyncError::config("half_life_ms must be positive"));
        }
        if !(MIN_DECAY_RATE..=1.0).contains(&self.decay_rate) {
            return Err(LipSyncError::config(format!(
                "decay_rate must be in [{MIN_DECAY_RATE}, 1]"
            )));
        }

        Ok(())
    }

    fn validate_categories(&self) -> Result<()> {
        if self.categories.is_empty() {
            return Err(LipSyncError::config("categories must not be empty"));
        }

        let bands = self.band_count();
        let mut seen = HashSet::new();
        for category in &self.categories {
            if category.name.is_empty() {
                return Err(LipSyncError::config("category names must not be empty"));
            }
            if !seen.insert(category.name.as_str()) {
                return Err(LipSyncError::config(format!(
                    "duplicate category `{}`",
                    category.name
                )));
            }
            if category.signature.len() != bands {
                return Err(LipSyncError::config(format!(
                    "category `{}` has {} signature values but {bands} bands are configured",
                    category.name,
                    category.signature.len()
                )));
            }
            if category
                .signature
                .iter()
                .any(|value| !(0.0..=1.0).contains(value))
            {
                return Err(LipSyncError::config(format!(
                    "category `{}` signature values must be in [0, 1]",
                    category.name
                )));
            }
        }

        if !seen.contains(self.silence_category.as_str()) {
            return Err(LipSyncError::config(format!(
                "silence_category `{}` is not one of the configured categories",
                self.silence_category
            )));
        }

        Ok(())
    }
}

/// Heuristic signatures over the five default speech bands
/// (80-400, 400-1k, 1k-2.5k, 2.5k-5k, 5k-10k Hz).
fn default_categories() -> Vec<VisemeSignature> {
    [
        ("viseme_sil", [0.0, 0.0, 0.0, 0.0, 0.0]),
        ("viseme_PP", [0.3, 0.1, 0.05, 0.05, 0.05]),
        ("viseme_FF", [0.1, 0.1, 0.2, 0.5, 0.7]),
        ("viseme_TH", [0.1, 0.15, 0.3, 0.5, 0.5]),
        ("viseme_DD", [0.4, 0.4, 0.4, 0.4, 0.3]),
        ("viseme_kk", [0.4, 0.5, 0.5, 0.4, 0.2]),
        ("viseme_CH", [0.1, 0.2, 0.5, 0.8, 0.7]),
        ("viseme_SS", [0.05, 0.1, 0.2, 0.6, 0.95]),
        ("viseme_nn", [0.6, 0.3, 0.2, 0.1, 0.05]),
        ("viseme_RR", [0.6, 0.6, 0.4, 0.2, 0.1]),
        ("viseme_aa", [0.8, 0.95, 0.7, 0.4, 0.2]),
        ("viseme_E", [0.7, 0.7, 0.85, 0.5, 0.2]),
        ("viseme_I", [0.6, 0.4, 0.9, 0.6, 0.3]),
        ("viseme_O", [0.85, 0.8, 0.4, 0.2, 0.1]),
        ("viseme_U", [0.8, 0.5, 0.2, 0.1, 0.05]),
    ]
    .into_iter()
    .map(|(name, signature)| VisemeSignature::new(name, signature.to_vec()))
    .collect()
}
