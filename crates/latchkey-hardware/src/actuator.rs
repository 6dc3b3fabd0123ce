//! Granted/denied feedback sequences.
//!
//! The actuator owns three outputs: the granted LED (drives the lock relay
//! on real hardware), the idle LED (lit while locked) and the buzzer.

use std::time::Duration;

use latchkey_core::constants::{
    DENY_PULSE_MS, UNLOCK_HOLD_MS, UNLOCK_LEAD_IN_MS, UNLOCK_PULSE_COUNT, UNLOCK_PULSE_MS,
};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::debug;

use crate::traits::OutputPin;

/// Timings of the feedback sequences, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorTiming {
    /// Granted LED on before the first chirp.
    pub unlock_lead_in_ms: u64,
    /// Length of each chirp and of the gap after it.
    pub unlock_pulse_ms: u64,
    pub unlock_pulse_count: u32,
    /// Granted LED stays on this long after the last chirp.
    pub unlock_hold_ms: u64,
    /// Buzzer on-time when access is denied.
    pub deny_pulse_ms: u64,
}

impl Default for ActuatorTiming {
    fn default() -> Self {
        Self {
            unlock_lead_in_ms: UNLOCK_LEAD_IN_MS,
            unlock_pulse_ms: UNLOCK_PULSE_MS,
            unlock_pulse_count: UNLOCK_PULSE_COUNT,
            unlock_hold_ms: UNLOCK_HOLD_MS,
            deny_pulse_ms: DENY_PULSE_MS,
        }
    }
}

impl ActuatorTiming {
    /// Total duration of the unlock sequence.
    pub fn unlock_duration(&self) -> Duration {
        let pulses = u64::from(self.unlock_pulse_count) * self.unlock_pulse_ms * 2;
        Duration::from_millis(self.unlock_lead_in_ms + pulses + self.unlock_hold_ms)
    }
}

/// Drives the three feedback outputs.
#[derive(Debug)]
pub struct Actuator<P: OutputPin> {
    granted: P,
    idle: P,
    buzzer: P,
    timing: ActuatorTiming,
}

impl<P: OutputPin> Actuator<P> {
    pub fn new(granted: P, idle: P, buzzer: P, timing: ActuatorTiming) -> Self {
        Self {
            granted,
            idle,
            buzzer,
            timing,
        }
    }

    pub fn timing(&self) -> &ActuatorTiming {
        &self.timing
    }

    /// Locked state: idle LED on, granted LED and buzzer off.
    pub fn set_default_states(&mut self) {
        self.granted.set_low();
        self.idle.set_high();
        self.buzzer.set_low();
    }

    /// Acknowledge a detected tag.
    pub fn acknowledge(&mut self) {
        self.buzzer.set_high();
    }

    /// Open the lock, chirp, then return to the locked state.
    pub async fn unlock_sequence(&mut self) {
        debug!("Running unlock sequence");
        let pulse = Duration::from_millis(self.timing.unlock_pulse_ms);

        self.buzzer.set_low();
        self.idle.set_low();
        self.granted.set_high();
        sleep(Duration::from_millis(self.timing.unlock_lead_in_ms)).await;

        for _ in 0..self.timing.unlock_pulse_count {
            self.buzzer.set_high();
            sleep(pulse).await;
            self.buzzer.set_low();
            sleep(pulse).await;
        }

        sleep(Duration::from_millis(self.timing.unlock_hold_ms)).await;
        self.granted.set_low();
        self.idle.set_high();
    }

    /// Long buzz.
    pub async fn deny_sequence(&mut self) {
        debug!("Running deny sequence");
        self.buzzer.set_high();
        sleep(Duration::from_millis(self.timing.deny_pulse_ms)).await;
        self.buzzer.set_low();
    }

    pub fn granted_pin(&self) -> &P {
        &self.granted
    }

    pub fn idle_pin(&self) -> &P {
        &self.idle
    }

    pub fn buzzer_pin(&self) -> &P {
        &self.buzzer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPin;

    fn actuator() -> (Actuator<MockPin>, MockPin, MockPin, MockPin) {
        let (granted, idle, buzzer) = (MockPin::new(), MockPin::new(), MockPin::new());
        let actuator = Actuator::new(
            granted.clone(),
            idle.clone(),
            buzzer.clone(),
            ActuatorTiming::default(),
        );
        (actuator, granted, idle, buzzer)
    }

    #[test]
    fn test_default_states() {
        let (mut actuator, granted, idle, buzzer) = actuator();
        actuator.set_default_states();
        assert!(!granted.is_high());
        assert!(idle.is_high());
        assert!(!buzzer.is_high());
    }

    #[test]
    fn test_unlock_duration() {
        assert_eq!(
            ActuatorTiming::default().unlock_duration(),
            Duration::from_millis(150 + 900 + 300)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlock_sequence_pulses() {
        let (mut actuator, granted, idle, buzzer) = actuator();
        actuator.set_default_states();
        actuator.acknowledge();
        buzzer.clear_history();

        let started = tokio::time::Instant::now();
        actuator.unlock_sequence().await;
        assert_eq!(started.elapsed(), Duration::from_millis(1350));

        assert_eq!(buzzer.rising_edges(), 3);
        assert_eq!(
            buzzer.pulse_widths(),
            vec![Duration::from_millis(150); 3]
        );
        assert_eq!(granted.pulse_widths(), vec![Duration::from_millis(1350)]);
        assert!(!granted.is_high());
        assert!(idle.is_high());
        assert!(!buzzer.is_high());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deny_sequence() {
        let (mut actuator, granted, _idle, buzzer) = actuator();
        actuator.set_default_states();

        actuator.deny_sequence().await;

        assert_eq!(buzzer.pulse_widths(), vec![Duration::from_millis(1000)]);
        assert_eq!(granted.rising_edges(), 0);
    }

    #[test]
    fn test_timing_partial_config() {
        let timing: ActuatorTiming = serde_json::from_str(r#"{"deny_pulse_ms": 500}"#).unwrap();
        assert_eq!(timing.deny_pulse_ms, 500);
        assert_eq!(timing.unlock_pulse_count, 3);
    }
}
