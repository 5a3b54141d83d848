//! Core library for the viseme lip-sync engine.
//!
//! Audio flows through a fixed pipeline once per animation frame: the
//! [`SignalSampler`] pulls the newest window from an [`AudioSource`], the
//! [`SpectralAnalyzer`] reduces it to per-band energies, the
//! [`VisemeClassifier`] scores every configured mouth shape and the
//! [`TemporalSmoother`] filters the result over time. A [`LipSyncSession`]
//! owns one instance of each stage and the only mutable state.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod record;
pub mod session;
pub mod smoothing;
pub mod timeline;
pub mod viseme;

pub use analysis::{SpectralAnalyzer, SpectralEnvelope};
pub use audio::{
    AudioSource, PlayState, SampleWindow, Signal, SignalSampler, SourceStatus, StreamTap,
};
pub use config::{LipSyncConfig, VisemeSignature, MIN_DECAY_RATE};
pub use error::{LipSyncError, Result};
pub use record::{TrackFrame, VisemeTrack};
pub use session::{LipSyncSession, SessionState};
pub use smoothing::{History, TemporalSmoother};
pub use timeline::{frame_duration, FrameClock};
pub use viseme::{VisemeClassifier, VisemeSet, VisemeWeights};
