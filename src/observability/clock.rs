//! Wall-clock jump detection.

use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;

/// How often the monitor samples the wall clock.
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// Remembers the last wall-clock sample and flags backward movement.
#[derive(Debug, Default)]
pub struct ClockJumpDetector {
    last: Option<SystemTime>,
}

impl ClockJumpDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sample. Returns true when it is earlier than the previous one.
    pub fn observe(&mut self, now: SystemTime) -> bool {
        let jumped = matches!(self.last, Some(last) if now < last);
        self.last = Some(now);
        jumped
    }
}

/// Sample `now` every [`SAMPLE_INTERVAL`] and call `on_jump` whenever the
/// clock moved backwards. The task is detached and abandoned at exit.
pub fn start_clock_monitor<N, F>(now: N, on_jump: F) -> JoinHandle<()>
where
    N: Fn() -> SystemTime + Send + 'static,
    F: Fn() + Send + 'static,
{
    tokio::spawn(async move {
        let mut detector = ClockJumpDetector::new();
        let mut ticker = tokio::time::interval(SAMPLE_INTERVAL);
        loop {
            ticker.tick().await;
            if detector.observe(now()) {
                tracing::warn!("System time jumped backwards");
                on_jump();
            }
        }
    })
}
