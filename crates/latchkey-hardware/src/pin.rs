//! Output pin implementations for host builds.

use tracing::info;

use crate::traits::OutputPin;

/// Output pin that reports level changes through `tracing`.
///
/// Used by the emulator binary in place of GPIO. Repeated writes of the same
/// level are not logged.
#[derive(Debug)]
pub struct TracingPin {
    name: &'static str,
    high: bool,
}

impl TracingPin {
    pub fn new(name: &'static str) -> Self {
        Self { name, high: false }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn write(&mut self, high: bool) {
        if self.high != high {
            self.high = high;
            info!(pin = self.name, level = if high { "high" } else { "low" }, "Pin changed");
        }
    }
}

impl OutputPin for TracingPin {
    fn set_high(&mut self) {
        self.write(true);
    }

    fn set_low(&mut self) {
        self.write(false);
    }

    fn is_high(&self) -> bool {
        self.high
    }
}
