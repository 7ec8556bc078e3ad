//! Node configuration file.
//!
//! Loaded from JSON. Every field has a default matching the classic ABP
//! sensor setup, except the session, which must be provisioned.
//!
//! # Example
//!
//! ```
//! use lora_uplink_node::config::NodeConfig;
//!
//! let config = NodeConfig::from_json(r#"{
//!     "tx_interval_secs": 30,
//!     "session": {
//!         "dev_addr": "2601183D",
//!         "nwk_skey": "EFFAE5CB14EE8A9EB546A422CC613EB7",
//!         "app_skey": "AA215475604FB2CE375826F759185A0A"
//!     }
//! }"#).unwrap();
//! assert_eq!(config.tx_interval_secs, 30);
//! assert_eq!(config.session_parameters().unwrap().dev_addr(), 0x2601_183D);
//! ```

use crate::actuator::OutputRange;
use crate::lora::{
    Channel, DataRate, SessionKey, SessionParameters, SubBand, DEFAULT_PORT, DEFAULT_TX_POWER_DBM,
    DUTY_CYCLE_WINDOW, EU868_CHANNELS_HZ, INDICATOR_BLINK, MAX_EIRP_DBM, NET_ID, TX_INTERVAL,
};
use crate::sensor::{DEFAULT_ADC_BITS, DEFAULT_PAYLOAD_LEN, MAX_PAYLOAD_LEN, MIN_PAYLOAD_LEN};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Highest application port; 224 and up are reserved.
pub const MAX_APP_PORT: u8 = 223;

/// Lowest transmit power accepted.
pub const MIN_TX_POWER_DBM: i8 = 2;

/// Default HTTP stats port for host runs.
pub const DEFAULT_STATS_PORT: u16 = 8080;

/// ABP session as written in the config file (hex strings).
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Device address, 8 hex digits.
    pub dev_addr: String,
    /// Network session key, 32 hex digits.
    pub nwk_skey: String,
    /// Application session key, 32 hex digits.
    pub app_skey: String,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("dev_addr", &self.dev_addr)
            .field("nwk_skey", &"<redacted>")
            .field("app_skey", &"<redacted>")
            .finish()
    }
}

/// Node configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    /// Seconds between TX_COMPLETE and the next uplink.
    pub tx_interval_secs: u64,
    /// Application port for sensor uplinks.
    pub port: u8,
    /// Send confirmed uplinks.
    pub confirmed: bool,
    /// Payload width in bytes.
    pub payload_len: usize,
    /// Sensor ADC resolution.
    pub adc_bits: u8,
    /// Uplink data rate.
    pub data_rate: DataRate,
    /// RX2 window data rate.
    pub rx2_data_rate: DataRate,
    /// Transmit power.
    pub tx_power_dbm: i8,
    /// Duty-cycle accounting window.
    pub duty_cycle_window_secs: u64,
    /// g1 duty-cycle ceiling (fraction).
    pub g1_duty_cycle: f64,
    /// g2 duty-cycle ceiling (fraction).
    pub g2_duty_cycle: f64,
    /// Enabled uplink channels.
    pub channels_hz: Vec<u32>,
    /// Indicator on-time after TX_COMPLETE.
    pub blink_ms: u64,
    /// Delay before the first uplink.
    pub startup_delay_ms: u64,
    /// Lowest output level.
    pub output_min: u8,
    /// Highest output level.
    pub output_max: u8,
    /// Port for the HTTP stats endpoint.
    pub stats_port: u16,
    /// ABP session.
    pub session: SessionConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            tx_interval_secs: TX_INTERVAL.as_secs(),
            port: DEFAULT_PORT,
            confirmed: false,
            payload_len: DEFAULT_PAYLOAD_LEN,
            adc_bits: DEFAULT_ADC_BITS,
            data_rate: DataRate::Sf7,
            rx2_data_rate: DataRate::Sf9,
            tx_power_dbm: DEFAULT_TX_POWER_DBM,
            duty_cycle_window_secs: DUTY_CYCLE_WINDOW.as_secs(),
            g1_duty_cycle: SubBand::G1.default_duty_cycle(),
            g2_duty_cycle: SubBand::G2.default_duty_cycle(),
            channels_hz: EU868_CHANNELS_HZ.to_vec(),
            blink_ms: INDICATOR_BLINK.as_millis() as u64,
            startup_delay_ms: 0,
            output_min: 0,
            output_max: u8::MAX,
            stats_port: DEFAULT_STATS_PORT,
            session: SessionConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Read and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&text)
    }

    /// Parse and validate a JSON config document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: NodeConfig =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tx_interval_secs == 0 {
            return Err(invalid("tx_interval_secs", "must be at least 1"));
        }
        if self.port == 0 || self.port > MAX_APP_PORT {
            return Err(invalid(
                "port",
                format!("{} outside 1..={}", self.port, MAX_APP_PORT),
            ));
        }
        if !(MIN_PAYLOAD_LEN..=MAX_PAYLOAD_LEN).contains(&self.payload_len) {
            return Err(invalid(
                "payload_len",
                format!(
                    "{} outside {}..={}",
                    self.payload_len, MIN_PAYLOAD_LEN, MAX_PAYLOAD_LEN
                ),
            ));
        }
        if self.adc_bits == 0 || self.adc_bits as usize > self.payload_len * 8 {
            return Err(invalid(
                "adc_bits",
                format!(
                    "{} bits do not fit {} payload bytes",
                    self.adc_bits, self.payload_len
                ),
            ));
        }
        if !(MIN_TX_POWER_DBM..=MAX_EIRP_DBM).contains(&self.tx_power_dbm) {
            return Err(invalid(
                "tx_power_dbm",
                format!(
                    "{} outside {}..={}",
                    self.tx_power_dbm, MIN_TX_POWER_DBM, MAX_EIRP_DBM
                ),
            ));
        }
        if self.duty_cycle_window_secs == 0 {
            return Err(invalid("duty_cycle_window_secs", "must be at least 1"));
        }
        for (field, value) in [
            ("g1_duty_cycle", self.g1_duty_cycle),
            ("g2_duty_cycle", self.g2_duty_cycle),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(invalid(field, format!("{} outside 0..=1", value)));
            }
        }
        self.channels()?;
        self.output_range()?;
        self.session_parameters()?;
        Ok(())
    }

    pub fn tx_interval(&self) -> Duration {
        Duration::from_secs(self.tx_interval_secs)
    }

    pub fn duty_cycle_window(&self) -> Duration {
        Duration::from_secs(self.duty_cycle_window_secs)
    }

    /// Duty-cycle ceilings indexed by sub-band.
    pub fn duty_cycles(&self) -> [f64; 2] {
        [self.g1_duty_cycle, self.g2_duty_cycle]
    }

    pub fn blink(&self) -> Duration {
        Duration::from_millis(self.blink_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    /// Uplink channels; every frequency must lie in a tracked sub-band.
    pub fn channels(&self) -> Result<Vec<Channel>, ConfigError> {
        if self.channels_hz.is_empty() {
            return Err(invalid("channels_hz", "at least one channel required"));
        }
        self.channels_hz
            .iter()
            .map(|&hz| {
                Channel::new(hz).ok_or_else(|| {
                    invalid(
                        "channels_hz",
                        format!("{} Hz is not in a duty-cycle sub-band", hz),
                    )
                })
            })
            .collect()
    }

    pub fn output_range(&self) -> Result<OutputRange, ConfigError> {
        OutputRange::new(self.output_min, self.output_max).ok_or_else(|| {
            invalid(
                "output_min",
                format!("{} above output_max {}", self.output_min, self.output_max),
            )
        })
    }

    /// Decode the session keys.
    pub fn session_parameters(&self) -> Result<SessionParameters, ConfigError> {
        let dev_addr = parse_dev_addr(&self.session.dev_addr)?;
        let nwk_skey = parse_key("session.nwk_skey", &self.session.nwk_skey)?;
        let app_skey = parse_key("session.app_skey", &self.session.app_skey)?;
        Ok(SessionParameters::new(
            NET_ID,
            dev_addr,
            nwk_skey,
            app_skey,
            self.data_rate,
            self.tx_power_dbm,
        ))
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Config file could not be read.
    Io { path: String, reason: String },
    /// Config file is not valid JSON for [`NodeConfig`].
    Parse(String),
    /// A field has an unusable value.
    InvalidValue { field: &'static str, reason: String },
    /// A session field is not valid hex of the right length.
    InvalidHex { field: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, reason } => write!(f, "cannot read {}: {}", path, reason),
            Self::Parse(msg) => write!(f, "invalid config: {}", msg),
            Self::InvalidValue { field, reason } => write!(f, "{}: {}", field, reason),
            Self::InvalidHex { field, reason } => write!(f, "{}: invalid hex ({})", field, reason),
        }
    }
}

impl std::error::Error for ConfigError {}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

fn parse_dev_addr(text: &str) -> Result<u32, ConfigError> {
    let mut bytes = [0u8; 4];
    decode_hex("session.dev_addr", text, &mut bytes)?;
    Ok(u32::from_be_bytes(bytes))
}

fn parse_key(field: &'static str, text: &str) -> Result<SessionKey, ConfigError> {
    let mut bytes = [0u8; 16];
    let result = decode_hex(field, text, &mut bytes).map(|()| SessionKey::new(bytes));
    bytes.zeroize();
    result
}

/// Decode exactly `out.len()` bytes of hex, with an optional `0x` prefix.
fn decode_hex(field: &'static str, text: &str, out: &mut [u8]) -> Result<(), ConfigError> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text)
        .as_bytes();
    if digits.len() != out.len() * 2 {
        return Err(ConfigError::InvalidHex {
            field,
            reason: format!("expected {} digits, got {}", out.len() * 2, digits.len()),
        });
    }
    for (byte, pair) in out.iter_mut().zip(digits.chunks_exact(2)) {
        let high = hex_digit(pair[0]);
        let low = hex_digit(pair[1]);
        match (high, low) {
            (Some(high), Some(low)) => *byte = high << 4 | low,
            _ => {
                return Err(ConfigError::InvalidHex {
                    field,
                    reason: "non-hex character".to_string(),
                })
            }
        }
    }
    Ok(())
}

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}
