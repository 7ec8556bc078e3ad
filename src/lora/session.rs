//! ABP session parameters.
//!
//! The node does not join: device address and session keys are provisioned
//! ahead of time and handed to the MAC layer once at startup. Keys are
//! zeroed when the session is dropped and never appear in logs.

use super::config::DataRate;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// AES-128 session key, wiped on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; 16]);

impl SessionKey {
    /// Wrap raw key bytes.
    pub fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes, for handing to the MAC layer.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

/// Session settings, fixed after startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParameters {
    net_id: u32,
    dev_addr: u32,
    nwk_skey: SessionKey,
    app_skey: SessionKey,
    data_rate: DataRate,
    tx_power_dbm: i8,
}

impl SessionParameters {
    /// Create session parameters.
    pub fn new(
        net_id: u32,
        dev_addr: u32,
        nwk_skey: SessionKey,
        app_skey: SessionKey,
        data_rate: DataRate,
        tx_power_dbm: i8,
    ) -> Self {
        Self {
            net_id,
            dev_addr,
            nwk_skey,
            app_skey,
            data_rate,
            tx_power_dbm,
        }
    }

    /// Network identifier.
    pub fn net_id(&self) -> u32 {
        self.net_id
    }

    /// Device address.
    pub fn dev_addr(&self) -> u32 {
        self.dev_addr
    }

    /// Network session key.
    pub fn nwk_skey(&self) -> &SessionKey {
        &self.nwk_skey
    }

    /// Application session key.
    pub fn app_skey(&self) -> &SessionKey {
        &self.app_skey
    }

    /// Uplink data rate.
    pub fn data_rate(&self) -> DataRate {
        self.data_rate
    }

    /// Uplink transmit power in dBm.
    pub fn tx_power_dbm(&self) -> i8 {
        self.tx_power_dbm
    }
}
