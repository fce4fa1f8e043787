//! Simulated 802.15.4 transceiver.

use ora_core::radio::{self, RadioAccess};
use ora_core::{OraError, Result};
use std::sync::Mutex;

/// Radio holding a channel and a transmit power level.
#[derive(Debug)]
pub struct SimRadio {
    channel: u8,
    dbm: Mutex<i32>,
}

impl SimRadio {
    /// Create a radio on `channel` transmitting at `dbm`.
    pub fn new(channel: u8, dbm: i32) -> Result<Self> {
        if !radio::is_valid_channel(channel) {
            return Err(OraError::Device(format!("invalid channel {channel}")));
        }
        if radio::ptx_index(channel, dbm).is_none() {
            return Err(OraError::Device(format!(
                "{dbm} dBm is not a power level of channel {channel}"
            )));
        }
        Ok(Self {
            channel,
            dbm: Mutex::new(dbm),
        })
    }

    /// Transmit power in milliwatts.
    pub fn output_mw(&self) -> f64 {
        let dbm = *self.dbm.lock().unwrap_or_else(|p| p.into_inner());
        10f64.powf(dbm as f64 / 10.0)
    }
}

impl RadioAccess for SimRadio {
    fn channel(&self) -> u8 {
        self.channel
    }

    fn output_power(&self) -> Result<i32> {
        Ok(*self.dbm.lock().unwrap_or_else(|p| p.into_inner()))
    }

    fn set_output_power(&self, dbm: i32) -> Result<()> {
        if radio::ptx_index(self.channel, dbm).is_none() {
            return Err(OraError::Device(format!(
                "{dbm} dBm is not a power level of channel {}",
                self.channel
            )));
        }
        *self.dbm.lock().unwrap_or_else(|p| p.into_inner()) = dbm;
        tracing::trace!(dbm, "Simulated radio power set");
        Ok(())
    }
}
