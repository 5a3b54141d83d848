use std::{f32::consts::PI, fmt, ops::Range, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::{LipSyncConfig, SampleWindow};

/// Band power treated as digital silence before converting to decibels.
const POWER_FLOOR: f32 = 1e-12;

/// Normalised energy per configured frequency band, each value in [0, 1].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SpectralEnvelope {
    bands: Vec<f32>,
}

impl SpectralEnvelope {
    /// Envelope with every band at zero energy.
    pub fn silent(band_count: usize) -> Self {
        Self {
            bands: vec![0.0; band_count],
        }
    }

    /// Builds an envelope from raw values, clamping each into [0, 1].
    pub fn from_bands(bands: Vec<f32>) -> Self {
        Self {
            bands: bands
                .into_iter()
                .map(|value| if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 })
                .collect(),
        }
    }

    pub fn bands(&self) -> &[f32] {
        &self.bands
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Mean band energy.
    pub fn energy(&self) -> f32 {
        if self.bands.is_empty() {
            return 0.0;
        }
        self.bands.iter().sum::<f32>() / self.bands.len() as f32
    }
}

/// Turns sample windows into [`SpectralEnvelope`]s.
///
/// Each window is Hann weighted, transformed with a real FFT and the
/// resulting power is summed over the configured bands. Band power is
/// converted to decibels and mapped linearly from the fixed
/// `[min_db, max_db]` reference range onto [0, 1], so envelopes are
/// comparable across playback volumes and digital silence maps to zero.
pub struct SpectralAnalyzer {
    window_size: usize,
    band_bins: Vec<Range<usize>>,
    min_db: f32,
    max_db: f32,
    taper: Vec<f32>,
    amplitude_scale: f32,
    power_scale: f32,
    fft: FftResources,
}

impl SpectralAnalyzer {
    /// Builds an analyzer for a configuration that has already been
    /// validated.
    pub fn new(config: &LipSyncConfig) -> Self {
        let window_size = config.window_size;
        let taper: Vec<f32> = (0..window_size)
            .map(|index| hann_value(index, window_size))
            .collect();
        let gain: f32 = taper.iter().sum();
        let squared_gain: f32 = taper.iter().map(|value| value * value).sum();
        let enbw = if gain > 0.0 {
            window_size as f32 * squared_gain / (gain * gain)
        } else {
            1.0
        };

        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(window_size);
        let fft = FftResources {
            scratch: plan.make_scratch_vec(),
            spectrum: plan.make_output_vec(),
            input: plan.make_input_vec(),
            plan,
        };

        Self {
            window_size,
            band_bins: config.band_bins(),
            min_db: config.min_db,
            max_db: config.max_db,
            taper,
            amplitude_scale: if gain > 0.0 { 2.0 / gain } else { 0.0 },
            power_scale: 1.0 / (2.0 * enbw.max(f32::EPSILON)),
            fft,
        }
    }

    pub fn band_count(&self) -> usize {
        self.band_bins.len()
    }

    /// Computes the spectral envelope of one window.
    pub fn analyze(&mut self, window: &SampleWindow) -> SpectralEnvelope {
        if window.len() != self.window_size {
            tracing::warn!(
                expected = self.window_size,
                actual = window.len(),
                "window size mismatch, treating frame as silent"
            );
            return SpectralEnvelope::silent(self.band_count());
        }

        for ((slot, sample), taper) in self
            .fft
            .input
            .iter_mut()
            .zip(&window.samples)
            .zip(&self.taper)
        {
            *slot = sample * taper;
        }

        let fft = &mut self.fft;
        if let Err(err) = fft
            .plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)
        {
            tracing::warn!(%err, "fft failed, treating frame as silent");
            return SpectralEnvelope::silent(self.band_count());
        }

        let spectrum = &self.fft.spectrum;
        let bands = self
            .band_bins
            .iter()
            .map(|bins| {
                let power: f32 = spectrum[bins.clone()]
                    .iter()
                    .map(|bin| {
                        let amplitude = bin.norm() * self.amplitude_scale;
                        amplitude * amplitude
                    })
                    .sum::<f32>()
                    * self.power_scale;
                self.normalise(power)
            })
            .collect();

        SpectralEnvelope { bands }
    }

    fn normalise(&self, power: f32) -> f32 {
        if !power.is_finite() || power <= POWER_FLOOR {
            return 0.0;
        }
        let level_db = 10.0 * power.log10();
        ((level_db - self.min_db) / (self.max_db - self.min_db)).clamp(0.0, 1.0)
    }
}

struct FftResources {
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for SpectralAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectralAnalyzer")
            .field("window_size", &self.window_size)
            .field("band_bins", &self.band_bins)
            .field("min_db", &self.min_db)
            .field("max_db", &self.max_db)
            .finish()
    }
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Instant;

    use super::*;
    use crate::VisemeSignature;

    pub(crate) fn two_band_config() -> LipSyncConfig {
        LipSyncConfig {
            sample_rate: 16_000,
            window_size: 512,
            band_edges_hz: vec![0.0, 2_000.0, 8_000.0],
            min_db: -60.0,
            max_db: -20.0,
            categories: vec![
                VisemeSignature::new("silence", vec![0.0, 0.0]),
                VisemeSignature::new("open", vec![1.0, 1.0]),
            ],
            silence_category: "silence".to_string(),
            silence_floor: 0.05,
            tie_epsilon: 0.05,
            half_life_ms: 30.0,
            decay_rate: 0.5,
            max_stale_frames: 2,
        }
    }

    pub(crate) fn window(samples: Vec<f32>, sample_rate: u32) -> SampleWindow {
        SampleWindow {
            samples,
            sample_rate,
            sequence: 1,
            captured_at: Instant::now(),
        }
    }

    pub(crate) fn sine(freq_hz: f32, amplitude: f32, len: usize, sample_rate: u32) -> Vec<f32> {
        (0..len)
            .map(|n| amplitude * (2.0 * PI * freq_hz * n as f32 / sample_rate as f32).sin())
            .collect()
    }

    /// Full-scale +/-1 sequence from a fixed-seed LCG.
    pub(crate) fn full_scale_noise(len: usize, seed: u32) -> Vec<f32> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                if state >> 31 == 0 {
                    1.0
                } else {
                    -1.0
                }
            })
            .collect()
    }

    #[test]
    fn silence_maps_to_zero_envelope() {
        let config = two_band_config();
        let mut analyzer = SpectralAnalyzer::new(&config);
        let envelope = analyzer.analyze(&window(vec![0.0; 512], 16_000));

        assert_eq!(envelope.len(), 2);
        assert!(envelope.energy() <= f32::EPSILON);
        assert!(envelope.bands().iter().all(|band| *band == 0.0));
    }

    #[test]
    fn low_tone_lands_in_low_band() {
        let config = two_band_config();
        let mut analyzer = SpectralAnalyzer::new(&config);
        let envelope = analyzer.analyze(&window(sine(500.0, 0.5, 512, 16_000), 16_000));

        let bands = envelope.bands();
        assert!(bands[0] > 0.9, "low band was {}", bands[0]);
        assert!(bands[1] < 0.2, "high band was {}", bands[1]);
    }

    #[test]
    fn quieter_input_yields_lower_energy() {
        let config = two_band_config();
        let mut analyzer = SpectralAnalyzer::new(&config);
        let loud = analyzer.analyze(&window(sine(500.0, 0.05, 512, 16_000), 16_000));
        let quiet = analyzer.analyze(&window(sine(500.0, 0.005, 512, 16_000), 16_000));

        assert!(quiet.bands()[0] < loud.bands()[0]);
        assert!(quiet.bands()[0] >= 0.0);
    }

    #[test]
    fn full_scale_noise_saturates_every_band() {
        let config = two_band_config();
        let mut analyzer = SpectralAnalyzer::new(&config);
        let envelope = analyzer.analyze(&window(full_scale_noise(512, 7), 16_000));

        for band in envelope.bands() {
            assert!(*band > 0.95, "band energy was {band}");
        }
    }

    #[test]
    fn mismatched_window_is_treated_as_silence() {
        let config = two_band_config();
        let mut analyzer = SpectralAnalyzer::new(&config);
        let envelope = analyzer.analyze(&window(vec![1.0; 100], 16_000));
        assert_eq!(envelope, SpectralEnvelope::silent(2));
    }
}
