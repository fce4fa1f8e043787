//! Well-known resource names.

use crate::urn::Urn;

/// Battery level observation (double).
pub const BL_OBSERVATION: &str = "urn:demanes:cmsdemo:observation:BLObservation";
/// Node degree observation (int).
pub const ND_OBSERVATION: &str = "urn:demanes:cmsdemo:observation:NDObservation";
/// Cause of the last trigger (urn).
pub const TRIGGER_REASON: &str = "urn:demanes:cmsdemo:observation:TriggerReason";
/// Error value of the last trigger (double).
pub const TRIGGER_REASON_VALUE: &str = "urn:demanes:cmsdemo:observation:TriggerReasonValue";
/// Transmit power update action.
pub const PT_ACTION: &str = "urn:demanes:cmsdemo:action:updatePowerTransmission";

/// Battery level event: runs the secondary then the primary loop.
pub const BL_EVENT: &str = "urn:demanes:events:battLevelEvent";
/// Node degree event: runs the primary loop.
pub const ND_EVENT: &str = "urn:demanes:events:nodeDegreeEvent";

/// Bundle key carrying the transmit-power index delta.
pub const DELTA_CR_KEY: &str = "delta_cr";

pub fn bl_observation() -> Urn {
    Urn::from_static(BL_OBSERVATION)
}

pub fn nd_observation() -> Urn {
    Urn::from_static(ND_OBSERVATION)
}

pub fn trigger_reason() -> Urn {
    Urn::from_static(TRIGGER_REASON)
}

pub fn trigger_reason_value() -> Urn {
    Urn::from_static(TRIGGER_REASON_VALUE)
}

pub fn pt_action() -> Urn {
    Urn::from_static(PT_ACTION)
}

pub fn bl_event() -> Urn {
    Urn::from_static(BL_EVENT)
}

pub fn nd_event() -> Urn {
    Urn::from_static(ND_EVENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literals_are_valid() {
        for s in [
            BL_OBSERVATION,
            ND_OBSERVATION,
            TRIGGER_REASON,
            TRIGGER_REASON_VALUE,
            PT_ACTION,
            BL_EVENT,
            ND_EVENT,
        ] {
            assert!(Urn::new(s).is_ok(), "{s}");
        }
        assert_ne!(bl_event(), nd_event());
    }
}
