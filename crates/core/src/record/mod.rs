use std::{path::Path, sync::Arc};

use serde::Serialize;

use crate::{frame_duration, LipSyncConfig, LipSyncSession, Result, StreamTap, VisemeWeights};

/// Smoothed weights for one frame of an offline track.
#[derive(Debug, Clone, Serialize)]
pub struct TrackFrame {
    /// End of the audio consumed by this frame, in seconds.
    pub time: f32,
    pub weights: VisemeWeights,
}

/// Viseme weights precomputed for a whole clip at a fixed frame rate, for
/// hosts that prefer to schedule mouth shapes alongside playback.
#[derive(Debug, Clone, Serialize)]
pub struct VisemeTrack {
    pub sample_rate: u32,
    pub fps: u32,
    pub categories: Vec<String>,
    pub frames: Vec<TrackFrame>,
}

impl VisemeTrack {
    /// Runs a session over decoded mono `samples` as if they were played back
    /// in real time, then appends the frames needed for the mouth to close.
    pub fn render(config: &LipSyncConfig, samples: &[f32], fps: u32) -> Result<Self> {
        let fps = fps.max(1);
        let mut session = LipSyncSession::new(config.clone())?;
        let hop = (config.sample_rate / fps).max(1) as usize;
        let tap = Arc::new(StreamTap::new(
            config.sample_rate,
            config.window_size.max(hop) * 2,
        ));
        tap.play()?;
        session.connect(&tap);

        let elapsed = frame_duration(fps);
        let sample_rate = config.sample_rate as f32;
        let mut frames = Vec::with_capacity(samples.len() / hop + 1);
        let mut consumed = 0usize;

        for chunk in samples.chunks(hop) {
            tap.push_samples(chunk)?;
            consumed += chunk.len();
            frames.push(TrackFrame {
                time: consumed as f32 / sample_rate,
                weights: session.advance(elapsed),
            });
        }

        tap.finish()?;
        let mut time = consumed as f32 / sample_rate;
        for _ in 0..config.frames_to_silence() {
            time += elapsed.as_secs_f32();
            frames.push(TrackFrame {
                time,
                weights: session.advance(elapsed),
            });
        }

        tracing::debug!(frames = frames.len(), fps, "rendered viseme track");

        Ok(Self {
            sample_rate: config.sample_rate,
            fps,
            categories: session.categories().names().to_vec(),
            frames,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame covering `seconds`, or the last one past the end.
    pub fn frame_at(&self, seconds: f32) -> Option<&TrackFrame> {
        let index = self.frames.partition_point(|frame| frame.time < seconds);
        self.frames.get(index).or_else(|| self.frames.last())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tests::{full_scale_noise, two_band_config};

    #[test]
    fn silent_clip_stays_closed() {
        let config = two_band_config();
        let track = VisemeTrack::render(&config, &vec![0.0; 16_000], 50).unwrap();

        assert_eq!(track.len(), 50 + config.frames_to_silence() as usize);
        assert!(track
            .frames
            .iter()
            .all(|frame| frame.weights.silence_weight() == 1.0));
    }

    #[test]
    fn speech_then_silence_opens_then_closes() {
        let config = two_band_config();
        let mut samples = full_scale_noise(8_000, 11);
        samples.extend(std::iter::repeat(0.0).take(8_000));
        let track = VisemeTrack::render(&config, &samples, 50).unwrap();

        let loud = track.frame_at(0.4).unwrap();
        assert!(loud.weights.get("open").unwrap() > 0.9);

        let last = track.frames.last().unwrap();
        assert!(last.weights.silence_weight() >= 0.95);
        assert_eq!(track.categories, vec!["silence", "open"]);
    }

    #[test]
    fn serialises_frames_with_named_weights() {
        let config = two_band_config();
        let track = VisemeTrack::render(&config, &[0.0; 640], 50).unwrap();
        let json = track.to_json().unwrap();

        assert!(json.contains("\"fps\": 50"));
        assert!(json.contains("\"silence\": 1.0"));
    }
}
