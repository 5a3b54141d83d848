use std::{sync::Arc, time::Duration};

use crate::{LipSyncConfig, VisemeSet, VisemeWeights};

/// Most recent smoothed output. Only one vector is ever retained.
#[derive(Debug, Clone, Default)]
pub struct History {
    last: Option<VisemeWeights>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&VisemeWeights> {
        self.last.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_none()
    }

    pub fn clear(&mut self) {
        self.last = None;
    }

    fn record(&mut self, weights: &VisemeWeights) {
        self.last = Some(weights.clone());
    }
}

/// Frame-rate independent exponential smoothing of viseme weights.
#[derive(Debug, Clone)]
pub struct TemporalSmoother {
    half_life_seconds: f32,
    decay_rate: f32,
}

impl TemporalSmoother {
    pub fn new(config: &LipSyncConfig) -> Self {
        Self {
            half_life_seconds: config.half_life_ms / 1_000.0,
            decay_rate: config.decay_rate,
        }
    }

    /// Blend factor for a frame lasting `elapsed`: the gap to the target
    /// halves every half-life regardless of how the time is sliced.
    pub fn alpha(&self, elapsed: Duration) -> f32 {
        if self.half_life_seconds <= 0.0 {
            return 1.0;
        }
        let halvings = elapsed.as_secs_f32() / self.half_life_seconds;
        (1.0 - 0.5_f32.powf(halvings)).clamp(0.0, 1.0)
    }

    /// Smooths `raw` against the previous output and records the result.
    /// The first frame after a reset passes through unchanged.
    pub fn smooth(
        &self,
        raw: &VisemeWeights,
        history: &mut History,
        elapsed: Duration,
    ) -> VisemeWeights {
        let smoothed = match history.last() {
            Some(previous) if previous.set() == raw.set() => {
                previous.blend_towards(raw, self.alpha(elapsed))
            }
            _ => raw.clone(),
        };
        history.record(&smoothed);
        smoothed
    }

    /// Moves the previous output one step towards silence, used for frames
    /// without audio. Without history the output is plain silence.
    pub fn decay(&self, set: &Arc<VisemeSet>, history: &mut History) -> VisemeWeights {
        let silence = VisemeWeights::silence(set.clone());
        let decayed = match history.last() {
            Some(previous) if previous.set() == set => {
                previous.blend_towards(&silence, self.decay_rate)
            }
            _ => silence,
        };
        history.record(&decayed);
        decayed
    }
}
