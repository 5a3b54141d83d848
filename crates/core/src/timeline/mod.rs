use std::time::{Duration, Instant};

/// Measures the time elapsed between consecutive animation frames.
#[derive(Debug, Default, Clone)]
pub struct FrameClock {
    last_tick: Option<Instant>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.last_tick = None;
    }

    /// Returns the time since the previous call. The first call after a
    /// reset reports zero.
    pub fn tick(&mut self) -> Duration {
        self.tick_at(Instant::now())
    }

    /// Like [`FrameClock::tick`] with an explicit timestamp. Timestamps older
    /// than the previous one report zero.
    pub fn tick_at(&mut self, now: Instant) -> Duration {
        let elapsed = self
            .last_tick
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or(Duration::ZERO);
        self.last_tick = Some(now);
        elapsed
    }
}

/// Converts a frame rate into the duration of a single frame.
pub fn frame_duration(fps: u32) -> Duration {
    Duration::from_nanos(1_000_000_000 / u64::from(fps.max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_is_zero() {
        let mut clock = FrameClock::new();
        assert_eq!(clock.tick(), Duration::ZERO);
    }

    #[test]
    fn measures_between_ticks() {
        let mut clock = FrameClock::new();
        let start = Instant::now();
        clock.tick_at(start);
        assert_eq!(
            clock.tick_at(start + Duration::from_millis(16)),
            Duration::from_millis(16)
        );
        assert_eq!(clock.tick_at(start), Duration::ZERO);

        clock.reset();
        assert_eq!(clock.tick_at(start + Duration::from_secs(1)), Duration::ZERO);
    }

    #[test]
    fn converts_frame_rates() {
        assert_eq!(frame_duration(50), Duration::from_millis(20));
        assert_eq!(frame_duration(0), Duration::from_secs(1));
    }
}
