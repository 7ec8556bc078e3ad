//! Sensor sampling and payload framing.
//!
//! A reading is a single unsigned integer from an ADC of `adc_bits`
//! resolution, packed big-endian into an N-byte payload.

use std::fmt;

/// Smallest supported payload width in bytes.
pub const MIN_PAYLOAD_LEN: usize = 1;

/// Largest supported payload width in bytes.
pub const MAX_PAYLOAD_LEN: usize = 4;

/// Default payload width.
pub const DEFAULT_PAYLOAD_LEN: usize = 2;

/// Default ADC resolution.
pub const DEFAULT_ADC_BITS: u8 = 10;

/// A source of raw readings.
pub trait Sensor {
    /// Read one raw value.
    fn read(&mut self) -> u32;
}

impl<F> Sensor for F
where
    F: FnMut() -> u32,
{
    fn read(&mut self) -> u32 {
        self()
    }
}

/// Invalid sampler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SamplerError {
    /// Payload width outside `MIN_PAYLOAD_LEN..=MAX_PAYLOAD_LEN`.
    PayloadLength { len: usize },
    /// ADC resolution of zero, or wider than the payload can hold.
    AdcBits { bits: u8, payload_len: usize },
}

impl fmt::Display for SamplerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PayloadLength { len } => write!(
                f,
                "payload length {} outside {}..={}",
                len, MIN_PAYLOAD_LEN, MAX_PAYLOAD_LEN
            ),
            Self::AdcBits { bits, payload_len } => write!(
                f,
                "{}-bit readings do not fit a {}-byte payload",
                bits, payload_len
            ),
        }
    }
}

impl std::error::Error for SamplerError {}

/// Reads a sensor and frames the value into a fixed-size payload.
#[derive(Debug)]
pub struct SensorSampler<S> {
    sensor: S,
    adc_bits: u8,
    payload_len: usize,
}

impl<S: Sensor> SensorSampler<S> {
    /// Create a sampler producing `payload_len`-byte payloads from an
    /// `adc_bits`-bit sensor.
    pub fn new(sensor: S, adc_bits: u8, payload_len: usize) -> Result<Self, SamplerError> {
        if !(MIN_PAYLOAD_LEN..=MAX_PAYLOAD_LEN).contains(&payload_len) {
            return Err(SamplerError::PayloadLength { len: payload_len });
        }
        if adc_bits == 0 || adc_bits as usize > payload_len * 8 {
            return Err(SamplerError::AdcBits {
                bits: adc_bits,
                payload_len,
            });
        }
        Ok(Self {
            sensor,
            adc_bits,
            payload_len,
        })
    }

    /// Payload width in bytes.
    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// Largest value a reading can take.
    pub fn max_value(&self) -> u32 {
        if self.adc_bits >= 32 {
            u32::MAX
        } else {
            (1u32 << self.adc_bits) - 1
        }
    }

    /// Read the sensor and return the framed payload.
    pub fn sample(&mut self) -> Vec<u8> {
        let mut payload = vec![0u8; self.payload_len];
        self.sample_into(&mut payload);
        payload
    }

    /// Read the sensor into `buf`, resizing it to the payload width.
    ///
    /// Out-of-range readings are clamped to the ADC maximum.
    pub fn sample_into(&mut self, buf: &mut Vec<u8>) -> u32 {
        let value = self.sensor.read().min(self.max_value());
        let bytes = value.to_be_bytes();
        buf.clear();
        buf.extend_from_slice(&bytes[bytes.len() - self.payload_len..]);
        value
    }
}

/// Sensor that sweeps up and down through its range, for host runs.
#[derive(Debug, Clone)]
pub struct RampSensor {
    value: u32,
    step: u32,
    max: u32,
    rising: bool,
}

impl RampSensor {
    /// Sweep `0..=max` in increments of `step`.
    pub fn new(max: u32, step: u32) -> Self {
        Self {
            value: 0,
            step: step.max(1),
            max,
            rising: true,
        }
    }
}

impl Sensor for RampSensor {
    fn read(&mut self) -> u32 {
        let current = self.value;
        if self.rising {
            self.value = self.value.saturating_add(self.step).min(self.max);
            if self.value == self.max {
                self.rising = false;
            }
        } else {
            self.value = self.value.saturating_sub(self.step);
            if self.value == 0 {
                self.rising = true;
            }
        }
        current
    }
}
