//! Manual timing for transports that cannot be wrapped.

use std::time::Instant;

/// Stopwatch for a hand-instrumented call.
///
/// ```
/// use app_inspector::correlation::NetworkTimer;
///
/// let mut timer = NetworkTimer::new();
/// timer.start();
/// let elapsed_ms = timer.end();
/// assert!(elapsed_ms < 1_000);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkTimer {
    started: Option<Instant>,
}

impl NetworkTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A timer that is already running.
    pub fn started() -> Self {
        Self {
            started: Some(Instant::now()),
        }
    }

    /// Start, or restart, the timer.
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Elapsed milliseconds since `start`, or 0 if never started.
    pub fn end(&self) -> u64 {
        self.started
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_unstarted_timer() {
        assert_eq!(NetworkTimer::new().end(), 0);
    }

    #[test]
    fn test_elapsed() {
        let timer = NetworkTimer::started();
        std::thread::sleep(Duration::from_millis(10));
        assert!(timer.end() >= 10);
    }
}
