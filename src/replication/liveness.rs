//! Upstream liveness from the cadence of state records.

use std::time::{Duration, Instant};

/// Multiple of the idle timeout after which the upstream counts as gone.
pub const STALE_FACTOR: u32 = 3;

/// Edge-triggered staleness detector.
///
/// No state record seen yet counts as stale, so the first check reports the
/// upstream as gone until state arrives.
#[derive(Debug, Clone)]
pub struct LivenessMonitor {
  threshold: Duration,
  last_state_update: Option<Instant>,
  stale: bool,
}

impl LivenessMonitor {
  pub fn new(idle_timeout: Duration) -> Self {
    Self {
      threshold: idle_timeout.saturating_mul(STALE_FACTOR),
      last_state_update: None,
      stale: false,
    }
  }

  pub fn threshold(&self) -> Duration {
    self.threshold
  }

  pub fn is_stale(&self) -> bool {
    self.stale
  }

  pub fn record_state_update(&mut self, now: Instant) {
    self.last_state_update = Some(now);
  }

  /// Returns `Some(alive)` when the upstream state flipped.
  pub fn check(&mut self, now: Instant) -> Option<bool> {
    let timed_out = match self.last_state_update {
      Some(last) => now.saturating_duration_since(last) > self.threshold,
      None => true,
    };

    if timed_out && !self.stale {
      self.stale = true;
      Some(false)
    } else if !timed_out && self.stale {
      self.stale = false;
      Some(true)
    } else {
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::LivenessMonitor;
  use std::time::{Duration, Instant};

  #[test]
  fn first_check_without_state_reports_gone_once() {
    let mut monitor = LivenessMonitor::new(Duration::from_secs(1));
    let now = Instant::now();
    assert_eq!(monitor.check(now), Some(false));
    assert_eq!(monitor.check(now + Duration::from_secs(1)), None);
    assert!(monitor.is_stale());
  }

  #[test]
  fn flips_only_on_edges() {
    let idle = Duration::from_millis(100);
    let mut monitor = LivenessMonitor::new(idle);
    let start = Instant::now();

    monitor.record_state_update(start);
    assert_eq!(monitor.check(start + idle), None);
    assert_eq!(monitor.check(start + monitor.threshold()), None);

    let late = start + monitor.threshold() + Duration::from_millis(1);
    assert_eq!(monitor.check(late), Some(false));
    assert_eq!(monitor.check(late + idle), None);

    monitor.record_state_update(late + idle);
    assert_eq!(monitor.check(late + idle), Some(true));
    assert_eq!(monitor.check(late + idle * 2), None);
  }
}
