//! MAC layer double that records every call.

use super::{MacLayer, UplinkRequest};
use crate::lora::{Channel, DataRate, SessionParameters};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacCall {
    Reset,
    ConfigureSession { dev_addr: u32 },
    LinkCheck(bool),
    Rx2DataRate(DataRate),
    DataRateAndPower(DataRate, i8),
    Uplink(RecordedUplink),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUplink {
    pub port: u8,
    pub payload: Vec<u8>,
    pub confirmed: bool,
    pub channel: Channel,
    pub data_rate: DataRate,
}

#[derive(Debug, Default)]
pub struct RecordingMac {
    pub calls: Vec<MacCall>,
}

impl RecordingMac {
    pub fn uplinks(&self) -> Vec<&RecordedUplink> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                MacCall::Uplink(uplink) => Some(uplink),
                _ => None,
            })
            .collect()
    }
}

impl MacLayer for RecordingMac {
    fn reset(&mut self) {
        self.calls.push(MacCall::Reset);
    }

    fn configure_session(&mut self, session: &SessionParameters) {
        self.calls.push(MacCall::ConfigureSession {
            dev_addr: session.dev_addr(),
        });
    }

    fn set_link_check_mode(&mut self, enabled: bool) {
        self.calls.push(MacCall::LinkCheck(enabled));
    }

    fn set_rx2_data_rate(&mut self, data_rate: DataRate) {
        self.calls.push(MacCall::Rx2DataRate(data_rate));
    }

    fn set_data_rate_and_power(&mut self, data_rate: DataRate, tx_power_dbm: i8) {
        self.calls
            .push(MacCall::DataRateAndPower(data_rate, tx_power_dbm));
    }

    fn submit_uplink(&mut self, request: &UplinkRequest<'_>) {
        self.calls.push(MacCall::Uplink(RecordedUplink {
            port: request.port,
            payload: request.payload.to_vec(),
            confirmed: request.confirmed,
            channel: request.channel,
            data_rate: request.data_rate,
        }));
    }
}
