//! EU868 radio plan: data rates, regulatory sub-bands and uplink channels.
//!
//! The default values reproduce the classic ABP sensor setup: SF7 uplinks
//! at 14 dBm, SF9 in the RX2 window, one uplink every 10 seconds, and the
//! two duty-cycle limited sub-bands g1 (1%) and g2 (0.1%).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Regular uplink interval, measured from the previous TX_COMPLETE.
pub const TX_INTERVAL: Duration = Duration::from_secs(10);

/// How long the indicator stays lit after a completed transmission.
pub const INDICATOR_BLINK: Duration = Duration::from_millis(200);

/// Window over which duty-cycle usage is accounted.
pub const DUTY_CYCLE_WINDOW: Duration = Duration::from_secs(3600);

/// LoRaWAN application port used for sensor uplinks.
pub const DEFAULT_PORT: u8 = 1;

/// Uplink transmit power in dBm.
pub const DEFAULT_TX_POWER_DBM: i8 = 14;

/// Highest EIRP allowed in EU868.
pub const MAX_EIRP_DBM: i8 = 16;

/// Network identifier passed along with the ABP session.
pub const NET_ID: u32 = 0x1;

/// Largest application payload a downlink can carry in EU868 (DR5-DR7).
pub const MAX_DOWNLINK_LEN: usize = 242;

/// MHDR (1) + FHDR without options (7) + FPort (1) + MIC (4).
pub const LORAWAN_OVERHEAD_BYTES: usize = 13;

/// EU868 data rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataRate {
    /// DR0: SF12 / 125 kHz
    #[serde(rename = "SF12")]
    Sf12,
    /// DR1: SF11 / 125 kHz
    #[serde(rename = "SF11")]
    Sf11,
    /// DR2: SF10 / 125 kHz
    #[serde(rename = "SF10")]
    Sf10,
    /// DR3: SF9 / 125 kHz
    #[serde(rename = "SF9")]
    Sf9,
    /// DR4: SF8 / 125 kHz
    #[serde(rename = "SF8")]
    Sf8,
    /// DR5: SF7 / 125 kHz
    #[serde(rename = "SF7")]
    Sf7,
    /// DR6: SF7 / 250 kHz
    #[serde(rename = "SF7BW250")]
    Sf7Bw250,
}

impl DataRate {
    /// All data rates, in DR index order.
    pub const ALL: [DataRate; 7] = [
        Self::Sf12,
        Self::Sf11,
        Self::Sf10,
        Self::Sf9,
        Self::Sf8,
        Self::Sf7,
        Self::Sf7Bw250,
    ];

    /// DR index as used on the air.
    pub fn index(self) -> u8 {
        match self {
            Self::Sf12 => 0,
            Self::Sf11 => 1,
            Self::Sf10 => 2,
            Self::Sf9 => 3,
            Self::Sf8 => 4,
            Self::Sf7 => 5,
            Self::Sf7Bw250 => 6,
        }
    }

    /// Look up a data rate by DR index.
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Spreading factor (7-12).
    pub fn spreading_factor(self) -> u8 {
        match self {
            Self::Sf12 => 12,
            Self::Sf11 => 11,
            Self::Sf10 => 10,
            Self::Sf9 => 9,
            Self::Sf8 => 8,
            Self::Sf7 | Self::Sf7Bw250 => 7,
        }
    }

    /// Channel bandwidth in Hz.
    pub fn bandwidth_hz(self) -> u32 {
        match self {
            Self::Sf7Bw250 => 250_000,
            _ => 125_000,
        }
    }
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DR{} (SF{}/{}kHz)",
            self.index(),
            self.spreading_factor(),
            self.bandwidth_hz() / 1000
        )
    }
}

/// Regulatory sub-band with its own duty-cycle limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubBand {
    /// 868.0 - 868.6 MHz, 1% duty cycle.
    G1,
    /// 868.7 - 869.2 MHz, 0.1% duty cycle.
    G2,
}

impl SubBand {
    /// Number of tracked sub-bands.
    pub const COUNT: usize = 2;

    /// All sub-bands, in index order.
    pub const ALL: [SubBand; Self::COUNT] = [Self::G1, Self::G2];

    /// Position in per-band tables.
    pub fn index(self) -> usize {
        match self {
            Self::G1 => 0,
            Self::G2 => 1,
        }
    }

    /// Regulatory duty-cycle ceiling as a fraction.
    pub fn default_duty_cycle(self) -> f64 {
        match self {
            Self::G1 => 0.01,
            Self::G2 => 0.001,
        }
    }

    /// Frequency range in Hz (inclusive).
    pub fn frequency_range(self) -> (u32, u32) {
        match self {
            Self::G1 => (868_000_000, 868_600_000),
            Self::G2 => (868_700_000, 869_200_000),
        }
    }

    /// Find the sub-band containing `frequency_hz`.
    pub fn for_frequency(frequency_hz: u32) -> Option<SubBand> {
        Self::ALL.into_iter().find(|band| {
            let (low, high) = band.frequency_range();
            (low..=high).contains(&frequency_hz)
        })
    }
}

impl fmt::Display for SubBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::G1 => write!(f, "g1"),
            Self::G2 => write!(f, "g2"),
        }
    }
}

/// Uplink channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    /// Centre frequency in Hz.
    pub frequency_hz: u32,
    /// Sub-band whose duty-cycle budget this channel draws from.
    pub band: SubBand,
}

impl Channel {
    /// Create a channel, deriving its sub-band from the frequency.
    ///
    /// Returns `None` for frequencies outside the duty-cycle tracked bands.
    pub fn new(frequency_hz: u32) -> Option<Self> {
        SubBand::for_frequency(frequency_hz).map(|band| Self { frequency_hz, band })
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}MHz/{}", self.frequency_hz as f64 / 1e6, self.band)
    }
}

/// Default uplink channel frequencies: three g1 join channels plus two g2 channels.
pub const EU868_CHANNELS_HZ: [u32; 5] = [
    868_100_000,
    868_300_000,
    868_500_000,
    868_850_000,
    869_050_000,
];
