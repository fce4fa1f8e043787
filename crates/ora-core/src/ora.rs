//! # Observe-Reason-Act
//!
//! The contracts tying the control loop together:
//!
//! ```text
//!  Observer ──owns──> Observation ─┐                  ┌─> Action <──owns── Actuator
//!                                  ▼                  │
//!                     ObservationProvider       ActionProvider
//!                              (the mediator implements both)
//!                                  ▲                  ▲
//!                                  └──── Reasoner ────┘
//!                                           ▲ trigger()
//!                                     TriggerPolicy
//! ```
//!
//! All traits are object safe; components are shared as `Arc<dyn Trait>`.

use crate::bundle::{Bundle, Value};
use crate::error::Result;
use crate::urn::Urn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};

/// A named, readable quantity.
pub trait Observation: Send + Sync {
    fn id(&self) -> &Urn;

    /// Read the current value.
    fn value(&self) -> Result<Value>;
}

/// A named side effect.
pub trait Action: Send + Sync {
    fn id(&self) -> &Urn;

    fn invoke(&self, args: &Bundle) -> Result<()>;
}

/// A component publishing observations.
pub trait Observer: Send + Sync {
    fn observations(&self) -> Vec<Arc<dyn Observation>>;
}

/// A component publishing actions.
pub trait Actuator: Send + Sync {
    fn actions(&self) -> Vec<Arc<dyn Action>>;
}

/// Resolves observation URNs to values.
pub trait ObservationProvider: Send + Sync {
    fn observation_ids(&self) -> Vec<Urn>;

    fn value(&self, id: &Urn) -> Result<Value>;
}

/// Resolves action URNs to invocations.
pub trait ActionProvider: Send + Sync {
    fn action_ids(&self) -> Vec<Urn>;

    fn invoke(&self, id: &Urn, args: &Bundle) -> Result<()>;
}

/// Something a trigger policy can fire.
pub trait Triggerable: Send + Sync {
    fn trigger(&self) -> Result<()>;
}

/// Computes and applies a reconfiguration when triggered.
///
/// Providers are held weakly: the mediator owns the reasoner.
pub trait Reasoner: Triggerable {
    fn set_action_provider(&self, provider: Weak<dyn ActionProvider>);

    fn set_observation_provider(&self, provider: Weak<dyn ObservationProvider>);

    /// Fire with an explicit cause and error value.
    fn trigger_with(&self, cause: Option<&Urn>, value: Option<Value>) -> Result<()>;

    /// View this reasoner as a plain triggerable.
    fn as_triggerable(self: Arc<Self>) -> Arc<dyn Triggerable>;
}

/// Lifecycle states of a trigger policy.
///
/// ```text
/// CREATED ──start──> STARTED ──suspend──> SUSPENDED
///    ▲                  │   <──resume────
///    └──── DIED <──stop─┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyState {
    Created,
    Started,
    Suspended,
    Died,
}

impl fmt::Display for PolicyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyState::Created => write!(f, "created"),
            PolicyState::Started => write!(f, "started"),
            PolicyState::Suspended => write!(f, "suspended"),
            PolicyState::Died => write!(f, "died"),
        }
    }
}

/// Decides when the reasoner fires.
pub trait TriggerPolicy: Send + Sync {
    /// Start sampling. No-op unless `Created`.
    fn start(&self) -> Result<()>;

    /// `Started -> Died`; the sampling loop then recycles to `Created`.
    fn stop(&self);

    /// `Started -> Suspended`.
    fn suspend(&self);

    /// `Suspended -> Started`.
    fn resume(&self);

    fn state(&self) -> PolicyState;

    fn register_triggerable(&self, triggerable: Arc<dyn Triggerable>);

    fn unregister_triggerable(&self, triggerable: &Arc<dyn Triggerable>);
}

/// Components with controller-side memory that a reset clears.
pub trait Resettable: Send + Sync {
    fn reset(&self);
}

/// Identity comparison for shared trait objects (vtables ignored).
pub(crate) fn same_object<T: ?Sized, U: ?Sized>(a: &Arc<T>, b: &Arc<U>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl Triggerable for Noop {
        fn trigger(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_same_object_through_coercion() {
        let concrete = Arc::new(Noop);
        let as_dyn: Arc<dyn Triggerable> = concrete.clone();
        let other: Arc<dyn Triggerable> = Arc::new(Noop);
        assert!(same_object(&concrete, &as_dyn));
        assert!(!same_object(&as_dyn, &other));
    }

    #[test]
    fn test_policy_state_display() {
        assert_eq!(PolicyState::Suspended.to_string(), "suspended");
        assert_eq!(
            serde_json::to_string(&PolicyState::Died).unwrap(),
            "\"died\""
        );
    }
}
