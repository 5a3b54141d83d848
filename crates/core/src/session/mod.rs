use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use crate::{
    AudioSource, FrameClock, History, LipSyncConfig, Result, Signal, SignalSampler,
    SpectralAnalyzer, TemporalSmoother, VisemeClassifier, VisemeSet, VisemeWeights,
};

/// Lifecycle state of a [`LipSyncSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No source attached. Ticks keep decaying towards silence.
    Idle,
    /// A source is attached and sampled on every tick.
    Connected,
}

/// Drives the sampler, analyzer, classifier and smoother against one audio
/// source at a time.
///
/// The session never owns its source: it keeps a weak reference and goes
/// idle as soon as the host drops the stream or reports it ended. All work
/// happens inside [`LipSyncSession::tick`], which never blocks.
pub struct LipSyncSession {
    config: LipSyncConfig,
    set: Arc<VisemeSet>,
    sampler: SignalSampler,
    analyzer: SpectralAnalyzer,
    classifier: VisemeClassifier,
    smoother: TemporalSmoother,
    history: History,
    clock: FrameClock,
    source: Option<Weak<dyn AudioSource>>,
    silent_frames: u32,
}

impl LipSyncSession {
    /// Builds an idle session, refusing configurations that cannot produce
    /// meaningful visemes.
    pub fn new(config: LipSyncConfig) -> Result<Self> {
        config.validate()?;

        let set = Arc::new(VisemeSet::from_config(&config));
        Ok(Self {
            sampler: SignalSampler::new(config.window_size, config.max_stale_frames),
            analyzer: SpectralAnalyzer::new(&config),
            classifier: VisemeClassifier::new(&config, set.clone()),
            smoother: TemporalSmoother::new(&config),
            history: History::new(),
            clock: FrameClock::new(),
            source: None,
            silent_frames: 0,
            set,
            config,
        })
    }

    pub fn config(&self) -> &LipSyncConfig {
        &self.config
    }

    pub fn categories(&self) -> &Arc<VisemeSet> {
        &self.set
    }

    pub fn state(&self) -> SessionState {
        if self.source.is_some() {
            SessionState::Connected
        } else {
            SessionState::Idle
        }
    }

    /// Most recent output, if any frame has been produced since the last
    /// reset.
    pub fn last_weights(&self) -> Option<&VisemeWeights> {
        self.history.last()
    }

    /// Consecutive frames produced without audio.
    pub fn silent_frames(&self) -> u32 {
        self.silent_frames
    }

    /// Attaches `source`, replacing any previous one. Smoothing restarts so
    /// nothing carries over from the previous source.
    pub fn connect<S: AudioSource + 'static>(&mut self, source: &Arc<S>) {
        let weak = Arc::downgrade(source);
        let weak: Weak<dyn AudioSource> = weak;
        self.attach(weak, source.sample_rate());
    }

    /// Same as [`LipSyncSession::connect`] for hosts that keep their sources
    /// behind `Arc<dyn AudioSource>`.
    pub fn connect_shared(&mut self, source: &Arc<dyn AudioSource>) {
        self.attach(Arc::downgrade(source), source.sample_rate());
    }

    /// Band boundaries are laid out for the configured rate, so a source at
    /// another rate is analysed as if it ran at the configured one.
    fn attach(&mut self, source: Weak<dyn AudioSource>, source_rate: u32) {
        if source_rate != self.config.sample_rate {
            tracing::warn!(
                source_rate,
                expected = self.config.sample_rate,
                "audio source sample rate differs from configuration"
            );
        }

        let replaced = self.source.is_some();
        self.reset();
        self.source = Some(source);
        tracing::debug!(replaced, "lip-sync session connected");
    }

    /// Detaches the current source and clears smoothing state. Calling it on
    /// an idle session does nothing.
    pub fn disconnect(&mut self) {
        if self.source.is_some() {
            tracing::debug!("lip-sync session disconnected");
        }
        self.source = None;
        self.reset();
    }

    /// Produces the weights for the current animation frame, measuring the
    /// elapsed time since the previous tick.
    pub fn tick(&mut self) -> VisemeWeights {
        let elapsed = self.clock.tick();
        self.advance(elapsed)
    }

    /// Produces the weights for a frame lasting `elapsed`. Hosts with their
    /// own frame timing, and offline rendering, call this instead of
    /// [`LipSyncSession::tick`].
    pub fn advance(&mut self, elapsed: Duration) -> VisemeWeights {
        let Some(source) = self.live_source() else {
            return self.decay();
        };

        let envelope = match self.sampler.sample(source.as_ref()) {
            Signal::Fresh(window) | Signal::Stale(window) => Some(self.analyzer.analyze(window)),
            Signal::NoData => None,
        };

        match envelope {
            Some(envelope) => {
                let raw = self.classifier.classify(&envelope);
                self.silent_frames = 0;
                let weights = self.smoother.smooth(&raw, &mut self.history, elapsed);
                tracing::trace!(
                    energy = envelope.energy(),
                    dominant = ?weights.dominant(),
                    "lip-sync frame"
                );
                weights
            }
            None => self.decay(),
        }
    }

    /// Upgrades the weak source reference, going idle when the host has
    /// dropped or finished the stream. History is kept so the output keeps
    /// decaying smoothly.
    fn live_source(&mut self) -> Option<Arc<dyn AudioSource>> {
        let source = self.source.as_ref()?.upgrade();
        match source {
            Some(source) if !source.has_ended() => Some(source),
            Some(_) => {
                tracing::debug!("audio source ended, session going idle");
                self.detach()
            }
            None => {
                tracing::debug!("audio source dropped, session going idle");
                self.detach()
            }
        }
    }

    fn detach(&mut self) -> Option<Arc<dyn AudioSource>> {
        self.source = None;
        self.sampler.reset();
        None
    }

    fn decay(&mut self) -> VisemeWeights {
        self.silent_frames = self.silent_frames.saturating_add(1);
        self.smoother.decay(&self.set, &mut self.history)
    }

    fn reset(&mut self) {
        self.sampler.reset();
        self.history.clear();
        self.clock.reset();
        self.silent_frames = 0;
    }
}

impl std::fmt::Debug for LipSyncSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LipSyncSession")
            .field("state", &self.state())
            .field("categories", &self.set.len())
            .field("silent_frames", &self.silent_frames)
            .field("last_weights", &self.history.last())
            .finish()
    }
}
