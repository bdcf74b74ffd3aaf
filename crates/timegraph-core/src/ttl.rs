//! Lifecycle stamping for historical entities.

use crate::error::{Result, TimegraphError};
use crate::time::{Timestamp, Validity};
use serde::{Deserialize, Serialize};

/// How long a retired entity is retained before the downstream store may drop
/// it. Expressed in the same ticks as the timestamps it is added to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetentionPolicy {
    retention_window: i64,
}

impl RetentionPolicy {
    pub fn new(retention_window: i64) -> Result<Self> {
        if retention_window <= 0 {
            return Err(TimegraphError::Config(format!(
                "retention window must be positive, got {retention_window}"
            )));
        }
        Ok(Self { retention_window })
    }

    pub fn retention_window(&self) -> i64 {
        self.retention_window
    }
}

/// Anything with a validity window and an optional TTL marker.
pub trait Lifecycle {
    fn validity(&self) -> Validity;
    fn ttl_expire_at(&self) -> Option<Timestamp>;
    fn set_lifecycle(&mut self, validity: Validity, ttl_expire_at: Option<Timestamp>);
}

#[derive(Debug, Clone, Copy)]
pub struct TtlPolicyEngine {
    policy: RetentionPolicy,
}

impl TtlPolicyEngine {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// `None` while the entity is current, `retired_at + retention` afterwards.
    pub fn ttl_for(entity: &impl Lifecycle, policy: &RetentionPolicy) -> Option<Timestamp> {
        Self::ttl_for_window(&entity.validity(), policy)
    }

    pub fn ttl_for_window(validity: &Validity, policy: &RetentionPolicy) -> Option<Timestamp> {
        if validity.is_current() {
            None
        } else {
            Some(validity.expired_at + policy.retention_window)
        }
    }

    /// Close `entity`'s window at `at` and stamp the matching TTL marker.
    pub fn retire(&self, entity: &mut impl Lifecycle, at: Timestamp) {
        let validity = entity.validity().closed_at(at);
        let ttl = Self::ttl_for_window(&validity, &self.policy);
        entity.set_lifecycle(validity, ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Entity {
        validity: Validity,
        ttl: Option<Timestamp>,
    }

    impl Lifecycle for Entity {
        fn validity(&self) -> Validity {
            self.validity
        }
        fn ttl_expire_at(&self) -> Option<Timestamp> {
            self.ttl
        }
        fn set_lifecycle(&mut self, validity: Validity, ttl_expire_at: Option<Timestamp>) {
            self.validity = validity;
            self.ttl = ttl_expire_at;
        }
    }

    #[test]
    fn test_current_entities_carry_no_ttl() {
        let policy = RetentionPolicy::new(3600).unwrap();
        let entity = Entity {
            validity: Validity::open(Timestamp::new(10)),
            ttl: None,
        };
        assert_eq!(TtlPolicyEngine::ttl_for(&entity, &policy), None);
    }

    #[test]
    fn test_retire_stamps_ttl_in_policy_units() {
        for window in [1, 60, 86_400_000] {
            let engine = TtlPolicyEngine::new(RetentionPolicy::new(window).unwrap());
            let mut entity = Entity {
                validity: Validity::open(Timestamp::new(10)),
                ttl: None,
            };
            engine.retire(&mut entity, Timestamp::new(50));
            assert_eq!(entity.validity.expired_at, Timestamp::new(50));
            assert_eq!(entity.ttl_expire_at(), Some(Timestamp::new(50 + window)));
        }
    }

    #[test]
    fn test_non_positive_window_rejected() {
        assert!(RetentionPolicy::new(0).is_err());
        assert!(RetentionPolicy::new(-5).is_err());
    }
}
