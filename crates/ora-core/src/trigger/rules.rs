//! Trigger rules.
//!
//! Pure evaluation of one sampling instant against the controller history.
//! All threading lives in [`monitor`](super::monitor); this module only
//! decides whether a tick fires and with which cause.
//!
//! Rules, in order:
//!
//! 1. Saturation: inside the deadband, at the power ceiling, with a moved
//!    reference or a worsening error, `e_ND` is forced to
//!    `-(alpha_KSI_ND * DELTA_CR_MIN + DELTA_CR_MIN)`.
//! 2. Stability: converged patterns suppress firing; otherwise a large
//!    node-degree error or too few neighbours fire a node-degree event.
//! 3. Critical battery: `|e_BL| <= 1/kE` fires a battery event.
//! 4. Reference change: a new `NDRef` fires a battery event.
//!
//! Later rules overwrite the cause and error of earlier ones.

use crate::error::ConfigError;
use crate::properties::{keys, ReconfigurationProperties};
use crate::resources;
use crate::urn::Urn;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ticks before `dCR(k-1)` is valid.
pub const WARMUP_TICKS: u32 = 3;

/// Controller constants read once when the policy is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleParams {
    pub nd_min: i64,
    pub cr_max: i64,
    pub delta_nd_min: i64,
    pub k_e: f64,
    pub delta_cr_min: i64,
    pub e_cr: f64,
    pub alpha_ksi_nd: f64,
}

impl RuleParams {
    pub fn from_properties(props: &ReconfigurationProperties) -> Result<Self, ConfigError> {
        Ok(Self {
            nd_min: props.parse(keys::ND_MIN)?,
            cr_max: props.parse(keys::CR_MAX)?,
            delta_nd_min: props.parse(keys::DELTA_ND_MIN)?,
            k_e: props.parse(keys::KE)?,
            delta_cr_min: props.parse(keys::DELTA_CR_MIN)?,
            e_cr: props.parse(keys::E_CR)?,
            alpha_ksi_nd: props.parse_or(keys::ALPHA_KSI_ND, 0.0)?,
        })
    }

    /// Error value rule 1 substitutes at the power ceiling.
    pub fn saturation_error(&self) -> f64 {
        let dcr_min = self.delta_cr_min as f64;
        -(self.alpha_ksi_nd * dcr_min + dcr_min)
    }
}

/// Measurements and live settings of one sampling instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub node_degree: i64,
    pub battery_level: f64,
    /// Node-degree reference for this instant (`ND_R`)
    pub nd_r: i64,
    pub ksi_nd: f64,
    /// Externally configured reference (`NDRef`)
    pub nd_ref: i64,
    /// Transmit-power index
    pub cr_index: i64,
}

/// Why a tick fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerCause {
    NodeDegree,
    BatteryLevel,
}

impl TriggerCause {
    pub fn urn(self) -> Urn {
        match self {
            TriggerCause::NodeDegree => resources::nd_event(),
            TriggerCause::BatteryLevel => resources::bl_event(),
        }
    }

    pub fn from_urn(urn: &Urn) -> Option<Self> {
        if *urn == resources::nd_event() {
            Some(TriggerCause::NodeDegree)
        } else if *urn == resources::bl_event() {
            Some(TriggerCause::BatteryLevel)
        } else {
            None
        }
    }
}

impl fmt::Display for TriggerCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerCause::NodeDegree => write!(f, "node-degree"),
            TriggerCause::BatteryLevel => write!(f, "battery-level"),
        }
    }
}

/// Result of evaluating one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleOutcome {
    /// Cause and error of the firing rule, `None` when the tick does not fire
    pub fire: Option<(TriggerCause, f64)>,
    /// `e_ND` after rule 1
    pub e_nd: f64,
    pub e_bl: f64,
    /// Filtered transmit-power index `(CR(k) + CR(k-1)) / 2`
    pub cr_filtered: i64,
    /// Rule 1 replaced the error
    pub saturated: bool,
    /// Rule 2 suppressed firing
    pub suppressed: bool,
}

impl RuleOutcome {
    pub fn fired(&self) -> bool {
        self.fire.is_some()
    }
}

/// History carried between sampling instants.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlState {
    cr_prev: Option<i64>,
    cr_prev2: Option<i64>,
    dcr_prev: Option<i64>,
    e_prev: f64,
    nd_r_prev: i64,
    nd_ref_prev: i64,
    warmup: u32,
    ready: bool,
    ticks: u64,
}

impl ControlState {
    pub fn new(nd_ref: i64) -> Self {
        Self {
            cr_prev: None,
            cr_prev2: None,
            dcr_prev: None,
            e_prev: 0.0,
            nd_r_prev: 0,
            nd_ref_prev: nd_ref,
            warmup: WARMUP_TICKS,
            ready: false,
            ticks: 0,
        }
    }

    /// Forget the transmit-power history and restart the warm-up.
    ///
    /// The next sample re-seeds the previous error and reference.
    pub fn reset_history(&mut self) {
        self.cr_prev = None;
        self.cr_prev2 = None;
        self.dcr_prev = None;
        self.warmup = WARMUP_TICKS;
        self.ready = false;
    }

    /// `dCR(k-1)` is available.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn previous_error(&self) -> f64 {
        self.e_prev
    }

    pub fn previous_cr_delta(&self) -> Option<i64> {
        self.dcr_prev
    }

    /// Samples evaluated so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn evaluate(&mut self, sample: &Sample, params: &RuleParams) -> RuleOutcome {
        self.ticks += 1;
        let ksi = sample.ksi_nd;
        let mut e_nd = (sample.nd_r - sample.node_degree) as f64;
        let e_bl = params.e_cr - sample.battery_level;
        let cr_k = sample.cr_index;

        let cr_prev = match self.cr_prev {
            Some(cr) => cr,
            None => {
                self.cr_prev2 = None;
                self.e_prev = e_nd;
                self.nd_r_prev = sample.nd_r;
                cr_k
            }
        };

        if self.warmup > 0 {
            self.warmup -= 1;
            if self.warmup == 0 {
                self.ready = true;
                tracing::debug!("Transmit-power history ready");
            }
        }
        if self.ready {
            if let Some(cr_prev2) = self.cr_prev2 {
                self.dcr_prev = Some(cr_prev - cr_prev2);
            }
        }

        // integer mean, truncated toward zero
        let cr_filtered = (cr_k + cr_prev) / 2;
        self.cr_prev2 = Some(cr_prev);
        self.cr_prev = Some(cr_k);

        let mut saturated = false;
        if e_nd.abs() <= ksi
            && cr_filtered >= params.cr_max
            && (self.nd_r_prev != sample.nd_r || e_nd < self.e_prev)
        {
            let before = e_nd;
            e_nd = params.saturation_error();
            saturated = true;
            tracing::debug!(before, e_nd, cr_filtered, "Saturation rule adjusted node-degree error");
        }

        let dcr_min = params.delta_cr_min;
        let e_prev = self.e_prev;
        let converged = (e_prev * e_nd > 0.0 && self.dcr_prev == Some(0))
            || (e_nd < -ksi && e_prev > ksi && self.dcr_prev == Some(dcr_min))
            || (e_nd > ksi && e_prev < -ksi && self.dcr_prev == Some(-dcr_min));

        let mut fire = None;
        if converged {
            tracing::debug!(e_nd, e_prev, dcr_prev = ?self.dcr_prev, "Stability rule suppressed firing");
        } else if e_nd.abs() > ksi || sample.node_degree < params.nd_min {
            fire = Some((TriggerCause::NodeDegree, e_nd));
        }

        self.e_prev = e_nd;
        self.nd_r_prev = sample.nd_r;

        if e_bl.abs() <= 1.0 / params.k_e {
            fire = Some((TriggerCause::BatteryLevel, e_bl));
        }

        if sample.nd_ref != self.nd_ref_prev {
            tracing::debug!(old = self.nd_ref_prev, new = sample.nd_ref, "Node-degree reference changed");
            fire = Some((TriggerCause::BatteryLevel, e_bl));
        }
        self.nd_ref_prev = sample.nd_ref;

        RuleOutcome {
            fire,
            e_nd,
            e_bl,
            cr_filtered,
            saturated,
            suppressed: converged,
        }
    }
}
