//! Transmit power tables and the radio accessor trait.
//!
//! The communication range (CR) is an index into the ordered list of
//! transmit power levels the transceiver supports on the active channel.
//! IEEE 802.15.4 channel 26 is capped at -3 dBm; channels 11-25 use the
//! full range up to 0 dBm.

use crate::error::{OraError, Result};

/// Supported transmit power levels in dBm, ascending.
pub const PTX_TABLE: [i32; 22] = [
    -32, -31, -30, -25, -22, -19, -17, -15, -13, -12, -11, -10, -9, -8, -7, -6, -5, -4, -3, -2,
    -1, 0,
];

pub const MIN_PTX: i32 = -32;
pub const MAX_PTX: i32 = 0;

/// Highest transmit power allowed on channel 26.
pub const CHANNEL_26_MAX_PTX: i32 = -3;

pub const MIN_CHANNEL: u8 = 11;
pub const MAX_CHANNEL: u8 = 26;
pub const DEFAULT_CHANNEL: u8 = 26;

/// Whether `channel` is a 2.4 GHz 802.15.4 channel.
pub fn is_valid_channel(channel: u8) -> bool {
    (MIN_CHANNEL..=MAX_CHANNEL).contains(&channel)
}

/// Power levels usable on `channel`.
pub fn ptx_table(channel: u8) -> &'static [i32] {
    if channel == 26 {
        // -3 dBm sits at index 18
        &PTX_TABLE[..19]
    } else {
        &PTX_TABLE
    }
}

pub fn min_ptx_index(_channel: u8) -> usize {
    0
}

pub fn max_ptx_index(channel: u8) -> usize {
    ptx_table(channel).len() - 1
}

/// Index of an exact power level on `channel`.
pub fn ptx_index(channel: u8, dbm: i32) -> Option<usize> {
    ptx_table(channel).binary_search(&dbm).ok()
}

/// Power level at `index` on `channel`.
pub fn ptx_at_index(channel: u8, index: usize) -> Option<i32> {
    ptx_table(channel).get(index).copied()
}

/// Access to the node's transceiver.
pub trait RadioAccess: Send + Sync {
    /// Active channel.
    fn channel(&self) -> u8;

    /// Current transmit power in dBm.
    fn output_power(&self) -> Result<i32>;

    /// Set the transmit power in dBm.
    fn set_output_power(&self, dbm: i32) -> Result<()>;

    /// Current communication-range index.
    fn cr_index(&self) -> Result<usize> {
        let dbm = self.output_power()?;
        ptx_index(self.channel(), dbm).ok_or_else(|| {
            OraError::Device(format!(
                "output power {} dBm is not a level of channel {}",
                dbm,
                self.channel()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedRadio(Mutex<i32>);

    impl RadioAccess for FixedRadio {
        fn channel(&self) -> u8 {
            26
        }
        fn output_power(&self) -> Result<i32> {
            Ok(*self.0.lock().unwrap())
        }
        fn set_output_power(&self, dbm: i32) -> Result<()> {
            *self.0.lock().unwrap() = dbm;
            Ok(())
        }
    }

    #[test]
    fn test_channel_tables() {
        assert_eq!(ptx_table(11).len(), 22);
        assert_eq!(ptx_table(26).len(), 19);
        assert_eq!(ptx_at_index(26, max_ptx_index(26)), Some(CHANNEL_26_MAX_PTX));
        assert_eq!(ptx_at_index(20, max_ptx_index(20)), Some(MAX_PTX));
        assert_eq!(ptx_at_index(20, 0), Some(MIN_PTX));
        assert_eq!(ptx_at_index(26, 19), None);
    }

    #[test]
    fn test_ptx_index() {
        assert_eq!(ptx_index(26, -32), Some(0));
        assert_eq!(ptx_index(26, -25), Some(3));
        assert_eq!(ptx_index(26, -3), Some(18));
        assert_eq!(ptx_index(26, 0), None);
        assert_eq!(ptx_index(15, 0), Some(21));
        assert_eq!(ptx_index(15, -28), None);
    }

    #[test]
    fn test_cr_index_from_radio() {
        let radio = FixedRadio(Mutex::new(-15));
        assert_eq!(radio.cr_index().unwrap(), 7);
        radio.set_output_power(-16).unwrap();
        assert!(matches!(radio.cr_index(), Err(OraError::Device(_))));
    }

    #[test]
    fn test_valid_channels() {
        assert!(is_valid_channel(11));
        assert!(is_valid_channel(26));
        assert!(!is_valid_channel(10));
        assert!(!is_valid_channel(27));
    }
}
