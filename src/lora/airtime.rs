//! LoRa time-on-air calculation.
//!
//! Uses the formula from the Semtech SX1276/SX1262 datasheets. Uplink
//! estimates add the fixed LoRaWAN framing overhead to the application
//! payload, since that is what actually goes over the air.
//!
//! # Example
//!
//! ```
//! use lora_uplink_node::lora::{uplink_airtime, DataRate};
//!
//! let airtime = uplink_airtime(2, DataRate::Sf7);
//! assert_eq!(airtime.as_micros(), 46_336);
//! ```

use super::config::{DataRate, LORAWAN_OVERHEAD_BYTES};
use std::time::Duration;

/// LoRa modulation parameters for airtime calculation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoRaParams {
    /// Spreading factor (7-12)
    pub spreading_factor: u8,
    /// Bandwidth in Hz (typically 125000, 250000, or 500000)
    pub bandwidth_hz: u32,
    /// Coding rate denominator (5-8 for 4/5 to 4/8)
    pub coding_rate: u8,
    /// Preamble length in symbols (8 for LoRaWAN)
    pub preamble_symbols: u8,
    /// Whether explicit header mode is used
    pub explicit_header: bool,
    /// Whether CRC is enabled (always on for uplinks)
    pub crc_enabled: bool,
}

impl LoRaParams {
    /// Uplink modulation for a LoRaWAN data rate: CR 4/5, 8 symbol preamble,
    /// explicit header, CRC on.
    pub fn for_data_rate(data_rate: DataRate) -> Self {
        Self {
            spreading_factor: data_rate.spreading_factor(),
            bandwidth_hz: data_rate.bandwidth_hz(),
            coding_rate: 5,
            preamble_symbols: 8,
            explicit_header: true,
            crc_enabled: true,
        }
    }

    /// Low data rate optimization is mandated once a symbol lasts more than 16 ms.
    pub fn low_data_rate_optimize(&self) -> bool {
        self.symbol_duration_us() > 16_000
    }

    /// Symbol duration in microseconds: 2^SF / BW.
    pub fn symbol_duration_us(&self) -> u64 {
        if self.bandwidth_hz == 0 {
            return 0;
        }
        (1u64 << self.spreading_factor) * 1_000_000 / self.bandwidth_hz as u64
    }

    /// Number of payload symbols for a PHY payload of `phy_len` bytes.
    fn payload_symbols(&self, phy_len: usize) -> u64 {
        let sf = self.spreading_factor as i64;
        let de = self.low_data_rate_optimize() as i64;
        let ih = (!self.explicit_header) as i64;
        let crc = self.crc_enabled as i64;

        // ceil((8*PL - 4*SF + 28 + 16*CRC - 20*IH) / (4*(SF - 2*DE)))
        let numerator = 8 * phy_len as i64 - 4 * sf + 28 + 16 * crc - 20 * ih;
        let denominator = 4 * (sf - 2 * de);
        if denominator <= 0 {
            return 8;
        }
        let blocks = if numerator > 0 {
            (numerator + denominator - 1) / denominator
        } else {
            0
        };
        8 + blocks as u64 * self.coding_rate as u64
    }
}

impl Default for LoRaParams {
    fn default() -> Self {
        Self::for_data_rate(DataRate::Sf7)
    }
}

/// Airtime in microseconds of a PHY payload of `phy_len` bytes.
pub fn calculate_airtime_us(phy_len: usize, params: &LoRaParams) -> u64 {
    let t_sym_us = params.symbol_duration_us();
    if t_sym_us == 0 {
        return 0;
    }
    // Preamble lasts (n + 4.25) symbols; keep the quarter symbol exact.
    let preamble_us = (params.preamble_symbols as u64 * 4 + 17) * t_sym_us / 4;
    preamble_us + params.payload_symbols(phy_len) * t_sym_us
}

/// Airtime of an uplink carrying `payload_len` application bytes.
pub fn uplink_airtime(payload_len: usize, data_rate: DataRate) -> Duration {
    let params = LoRaParams::for_data_rate(data_rate);
    Duration::from_micros(calculate_airtime_us(
        payload_len + LORAWAN_OVERHEAD_BYTES,
        &params,
    ))
}
