//! Mock output pin that records every level change.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::time::Instant;

use crate::traits::OutputPin;

/// One recorded level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinTransition {
    pub high: bool,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct PinState {
    high: bool,
    transitions: Vec<PinTransition>,
}

/// Output pin for tests.
///
/// Clones share state, so a test can keep one clone while the other is moved
/// into the component under test. Timestamps come from `tokio::time`, which
/// makes pulse widths exact under a paused clock.
#[derive(Debug, Clone, Default)]
pub struct MockPin {
    state: Arc<Mutex<PinState>>,
}

impl MockPin {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PinState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self, high: bool) {
        let mut state = self.lock();
        if state.high != high {
            state.high = high;
            state.transitions.push(PinTransition {
                high,
                at: Instant::now(),
            });
        }
    }

    /// All level changes so far.
    pub fn transitions(&self) -> Vec<PinTransition> {
        self.lock().transitions.clone()
    }

    /// Number of low-to-high edges.
    pub fn rising_edges(&self) -> usize {
        self.lock().transitions.iter().filter(|t| t.high).count()
    }

    /// Width of each completed high pulse, in order.
    pub fn pulse_widths(&self) -> Vec<std::time::Duration> {
        let state = self.lock();
        state
            .transitions
            .windows(2)
            .filter(|pair| pair[0].high && !pair[1].high)
            .map(|pair| pair[1].at - pair[0].at)
            .collect()
    }

    /// Forget recorded transitions, keeping the current level.
    pub fn clear_history(&self) {
        self.lock().transitions.clear();
    }
}

impl OutputPin for MockPin {
    fn set_high(&mut self) {
        self.write(true);
    }

    fn set_low(&mut self) {
        self.write(false);
    }

    fn is_high(&self) -> bool {
        self.lock().high
    }
}
