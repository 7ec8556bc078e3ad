//! Outputs driven by the controller: the downlink-controlled level output
//! and the transmit indicator.

use log::{debug, info};
use std::fmt;

/// Writes a physical output level (PWM duty or DAC code).
pub trait Actuator {
    fn write_level(&mut self, level: u8);
}

/// On/off indicator, typically an LED.
pub trait Indicator {
    fn set(&mut self, on: bool);
}

/// Valid output levels, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputRange {
    min: u8,
    max: u8,
}

impl OutputRange {
    /// The full 0..=255 range.
    pub const FULL: OutputRange = OutputRange { min: 0, max: 255 };

    /// Create a range; `None` if `min > max`.
    pub fn new(min: u8, max: u8) -> Option<Self> {
        (min <= max).then_some(Self { min, max })
    }

    pub fn min(&self) -> u8 {
        self.min
    }

    pub fn max(&self) -> u8 {
        self.max
    }

    /// Clamp `value` into the range.
    pub fn clamp(&self, value: u8) -> u8 {
        value.clamp(self.min, self.max)
    }
}

impl Default for OutputRange {
    fn default() -> Self {
        Self::FULL
    }
}

impl fmt::Display for OutputRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.min, self.max)
    }
}

/// Applies downlink bytes to an [`Actuator`], clamped to its valid range.
#[derive(Debug)]
pub struct DimmableOutput<A> {
    actuator: A,
    range: OutputRange,
    level: Option<u8>,
}

impl<A: Actuator> DimmableOutput<A> {
    pub fn new(actuator: A, range: OutputRange) -> Self {
        Self {
            actuator,
            range,
            level: None,
        }
    }

    /// Map `value` to a clamped level and write it. Returns the level written.
    pub fn apply(&mut self, value: u8) -> u8 {
        let level = self.range.clamp(value);
        self.actuator.write_level(level);
        self.level = Some(level);
        level
    }

    /// Last level written, if any.
    pub fn level(&self) -> Option<u8> {
        self.level
    }

    pub fn range(&self) -> OutputRange {
        self.range
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }
}

/// Output that only logs, for host runs.
#[derive(Debug, Default)]
pub struct LoggingOutput;

impl Actuator for LoggingOutput {
    fn write_level(&mut self, level: u8) {
        info!("Output level set to {}", level);
    }
}

/// Indicator that only logs, for host runs.
#[derive(Debug, Default)]
pub struct LoggingIndicator {
    on: bool,
}

impl LoggingIndicator {
    pub fn is_on(&self) -> bool {
        self.on
    }
}

impl Indicator for LoggingIndicator {
    fn set(&mut self, on: bool) {
        self.on = on;
        debug!("Indicator {}", if on { "on" } else { "off" });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Vec<u8>);

    impl Actuator for Recorder {
        fn write_level(&mut self, level: u8) {
            self.0.push(level);
        }
    }

    #[test]
    fn test_apply_within_range() {
        let mut output = DimmableOutput::new(Recorder::default(), OutputRange::FULL);
        assert_eq!(output.apply(200), 200);
        assert_eq!(output.level(), Some(200));
        assert_eq!(output.actuator().0, vec![200]);
    }

    #[test]
    fn test_apply_clamps() {
        let range = OutputRange::new(10, 180).unwrap();
        let mut output = DimmableOutput::new(Recorder::default(), range);
        assert_eq!(output.apply(255), 180);
        assert_eq!(output.apply(0), 10);
        assert_eq!(output.actuator().0, vec![180, 10]);
    }

    #[test]
    fn test_apply_idempotent() {
        let mut output = DimmableOutput::new(Recorder::default(), OutputRange::FULL);
        output.apply(42);
        let once = output.level();
        output.apply(42);
        assert_eq!(output.level(), once);
        assert_eq!(output.actuator().0, vec![42, 42]);
    }

    #[test]
    fn test_range_validation() {
        assert!(OutputRange::new(5, 4).is_none());
        assert_eq!(OutputRange::new(3, 3).unwrap().clamp(100), 3);
        assert_eq!(OutputRange::FULL.to_string(), "0..=255");
    }

    #[test]
    fn test_logging_indicator_tracks_state() {
        let mut led = LoggingIndicator::default();
        led.set(true);
        assert!(led.is_on());
        led.set(false);
        assert!(!led.is_on());
    }
}
