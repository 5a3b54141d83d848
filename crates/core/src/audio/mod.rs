use std::{
    sync::{Mutex, MutexGuard, TryLockError},
    time::Instant,
};

use ringbuf::{traits::*, HeapRb};

use crate::{LipSyncError, Result};

/// Outcome of a non-blocking read from an [`AudioSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    /// The buffer was filled with the newest samples. `position` counts every
    /// sample the source has produced so far, letting readers tell fresh data
    /// from a repeat of the previous read.
    Ready { position: u64 },
    /// The source is playing but could not be read without waiting.
    Busy,
    /// Paused, ended or not yet started.
    Inactive,
}

/// Readable audio stream owned by the host.
///
/// Implementations must never block: `read_latest` is called from the
/// animation loop once per frame.
pub trait AudioSource: Send + Sync {
    /// Sample rate of the produced stream.
    fn sample_rate(&self) -> u32;

    /// Copies the most recent `out.len()` samples into `out`, oldest first.
    /// When fewer samples exist the front of `out` is zero filled.
    fn read_latest(&self, out: &mut [f32]) -> SourceStatus;

    /// Whether the stream has finished for good. Sessions go idle once a
    /// source reports this.
    fn has_ended(&self) -> bool {
        false
    }
}

/// Playback state reported by a [`StreamTap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Paused,
    Playing,
    Ended,
}

/// Ring buffer the host audio callback writes decoded samples into.
///
/// Writers take the lock normally; readers only ever `try_lock`, so a reader
/// on the animation thread never waits for the audio thread.
pub struct StreamTap {
    sample_rate: u32,
    inner: Mutex<TapState>,
}

struct TapState {
    ring: HeapRb<f32>,
    written: u64,
    state: PlayState,
}

impl StreamTap {
    /// Creates a paused tap that retains the last `capacity` samples.
    pub fn new(sample_rate: u32, capacity: usize) -> Self {
        Self {
            sample_rate,
            inner: Mutex::new(TapState {
                ring: HeapRb::new(capacity.max(1)),
                written: 0,
                state: PlayState::Paused,
            }),
        }
    }

    /// Appends decoded samples, overwriting the oldest ones once full.
    pub fn push_samples(&self, samples: &[f32]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let mut tap = self.lock()?;
        // Only the tail can survive a push longer than the ring.
        let capacity = tap.ring.capacity().get();
        let tail = &samples[samples.len().saturating_sub(capacity)..];
        tap.ring.push_slice_overwrite(tail);
        tap.written += samples.len() as u64;
        Ok(())
    }

    pub fn play(&self) -> Result<()> {
        self.set_state(PlayState::Playing)
    }

    pub fn pause(&self) -> Result<()> {
        self.set_state(PlayState::Paused)
    }

    /// Marks the stream as finished. Further reads report it inactive.
    pub fn finish(&self) -> Result<()> {
        self.set_state(PlayState::Ended)
    }

    pub fn state(&self) -> Result<PlayState> {
        Ok(self.lock()?.state)
    }

    fn set_state(&self, state: PlayState) -> Result<()> {
        let mut tap = self.lock()?;
        if tap.state != PlayState::Ended {
            tap.state = state;
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, TapState>> {
        self.inner
            .lock()
            .map_err(|_| LipSyncError::msg("stream tap has been poisoned"))
    }
}

impl std::fmt::Debug for StreamTap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTap")
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

impl AudioSource for StreamTap {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn has_ended(&self) -> bool {
        match self.inner.try_lock() {
            Ok(tap) => tap.state == PlayState::Ended,
            Err(TryLockError::WouldBlock) => false,
            Err(TryLockError::Poisoned(_)) => true,
        }
    }

    fn read_latest(&self, out: &mut [f32]) -> SourceStatus {
        let tap = match self.inner.try_lock() {
            Ok(tap) => tap,
            Err(TryLockError::WouldBlock) => return SourceStatus::Busy,
            Err(TryLockError::Poisoned(_)) => return SourceStatus::Inactive,
        };

        if tap.state != PlayState::Playing {
            return SourceStatus::Inactive;
        }

        let occupied = tap.ring.occupied_len();
        let available = occupied.min(out.len());
        let padding = out.len() - available;
        out[..padding].fill(0.0);

        let newest = tap.ring.iter().skip(occupied - available);
        for (slot, sample) in out[padding..].iter_mut().zip(newest) {
            *slot = *sample;
        }

        SourceStatus::Ready {
            position: tap.written,
        }
    }
}

/// Fixed-length block of amplitude samples captured from a source.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    pub samples: Vec<f32>,
    /// Rate reported by the source the samples came from.
    pub sample_rate: u32,
    /// Increments for every fresh window captured by a sampler.
    pub sequence: u64,
    pub captured_at: Instant,
}

impl SampleWindow {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Result of sampling a source for one frame.
#[derive(Debug, Clone, Copy)]
pub enum Signal<'a> {
    /// A window containing samples not seen before.
    Fresh(&'a SampleWindow),
    /// The previous window, reused because the source produced nothing new.
    Stale(&'a SampleWindow),
    /// The source is not producing audio.
    NoData,
}

impl<'a> Signal<'a> {
    pub fn window(&self) -> Option<&'a SampleWindow> {
        match *self {
            Signal::Fresh(window) | Signal::Stale(window) => Some(window),
            Signal::NoData => None,
        }
    }
}

/// Pulls fixed-size windows from an [`AudioSource`] once per frame.
#[derive(Debug)]
pub struct SignalSampler {
    window_size: usize,
    max_stale_frames: u32,
    scratch: Vec<f32>,
    window: Option<SampleWindow>,
    last_position: Option<u64>,
    stale_frames: u32,
    sequence: u64,
}

impl SignalSampler {
    pub fn new(window_size: usize, max_stale_frames: u32) -> Self {
        Self {
            window_size,
            max_stale_frames,
            scratch: vec![0.0; window_size],
            window: None,
            last_position: None,
            stale_frames: 0,
            sequence: 0,
        }
    }

    /// Forgets the previous window so the next read starts from scratch.
    pub fn reset(&mut self) {
        self.window = None;
        self.last_position = None;
        self.stale_frames = 0;
    }

    /// Returns the most recent window of `source` without blocking.
    pub fn sample(&mut self, source: &dyn AudioSource) -> Signal<'_> {
        match source.read_latest(&mut self.scratch) {
            SourceStatus::Inactive => {
                self.stale_frames = 0;
                Signal::NoData
            }
            SourceStatus::Ready { position } if self.last_position != Some(position) => {
                self.last_position = Some(position);
                self.stale_frames = 0;
                self.sequence += 1;
                self.capture_scratch(source.sample_rate());
                match &self.window {
                    Some(window) => Signal::Fresh(window),
                    None => Signal::NoData,
                }
            }
            SourceStatus::Ready { .. } | SourceStatus::Busy => self.reuse_window(),
        }
    }

    fn reuse_window(&mut self) -> Signal<'_> {
        if self.stale_frames >= self.max_stale_frames {
            return Signal::NoData;
        }
        match &self.window {
            Some(window) => {
                self.stale_frames += 1;
                Signal::Stale(window)
            }
            None => Signal::NoData,
        }
    }

    fn capture_scratch(&mut self, sample_rate: u32) {
        let window = self.window.get_or_insert_with(|| SampleWindow {
            samples: vec![0.0; self.window_size],
            sample_rate,
            sequence: 0,
            captured_at: Instant::now(),
        });

        for (slot, &sample) in window.samples.iter_mut().zip(&self.scratch) {
            *slot = sanitize(sample);
        }
        window.sample_rate = sample_rate;
        window.sequence = self.sequence;
        window.captured_at = Instant::now();
    }
}

/// Maps non-finite samples to silence and clips to full scale.
fn sanitize(sample: f32) -> f32 {
    if sample.is_finite() {
        sample.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}
