//! Wall clock timing of a span.
use std::time::{Duration, Instant};

/// Measures the wall clock time between [`Timer::start`] and [`Timer::stop`].
///
/// While the timer is running the durations report the live value; after `stop`
/// they are fixed. Restarting the timer discards the previous measurement.
#[derive(Debug, Default, Clone, Copy)]
pub struct Timer {
    start: Option<Instant>,
    end: Option<Instant>,
}

impl Timer {
    /// Create a stopped timer reporting zero.
    pub fn new() -> Self {
        Timer::default()
    }

    /// Create a timer that is already running.
    pub fn started() -> Self {
        let mut timer = Timer::new();
        timer.start();
        timer
    }

    /// Start (or restart) the span.
    pub fn start(&mut self) -> &mut Self {
        self.end = None;
        self.start = Some(Instant::now());
        self
    }

    /// End the span.
    pub fn stop(&mut self) -> &mut Self {
        self.end = Some(Instant::now());
        self
    }

    /// Elapsed time of the span, live if the timer is still running.
    pub fn elapsed(&self) -> Duration {
        match (self.start, self.end) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::new(0, 0),
        }
    }

    /// Elapsed seconds.
    pub fn seconds(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }

    /// Elapsed whole milliseconds.
    pub fn milliseconds(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }

    /// Elapsed whole microseconds.
    pub fn microseconds(&self) -> u64 {
        self.elapsed().as_micros() as u64
    }
}
