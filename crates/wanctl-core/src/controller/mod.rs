//! Controller (§4.7): applies the decision engine's desired primary via one
//! of two interchangeable back-ends.
//!
//! The decision engine MUST NOT branch on which back-end is active (§9),
//! so both live behind one [`ControllerBackend`] trait — the same
//! discipline the teacher applies to its `LinkSender` trait, where a
//! scheduler drives arbitrary transports through one narrow interface.

pub mod mwan;
pub mod route_metric;

use crate::error::ControllerError;
use crate::model::{Plan, PlanStatus};
use crate::registry::Member;
use chrono::Utc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// One of the two apply back-ends. Implementations own their own retry and
/// verification policy; the orchestrator only enforces cooldown and
/// idempotence.
pub trait ControllerBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this back-end's external dependency (mwan3 binary, UCI
    /// store, ...) is present on this system (§7 fallback rule).
    fn is_available(&self) -> bool;

    /// Reprogram the router so `primary` carries default traffic. Must
    /// block until applied and, where the contract requires it, verified.
    fn apply(&self, members: &[Member], primary: &str) -> Result<(), ControllerError>;

    /// Best-effort read of the currently active primary, used to seed the
    /// decision engine at startup (§4.7 `get_current_primary`).
    fn get_current_primary(&self, members: &[Member]) -> Result<Option<String>, ControllerError>;
}

/// Owns the cooldown timestamp and serializes every apply behind a mutex
/// (§5 "controller serializes all apply operations behind its own mutex
/// and a cooldown timestamp").
pub struct Controller {
    backend: Box<dyn ControllerBackend>,
    cooldown: Duration,
    last_apply: Mutex<Option<Instant>>,
    plan: Mutex<Option<Plan>>,
}

/// Returned when `set_primary` is refused because the cooldown window has
/// not elapsed (§7 "cooldown refusal... non-fatal").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CooldownRemaining(pub Duration);

impl Controller {
    pub fn new(backend: Box<dyn ControllerBackend>, cooldown: Duration) -> Self {
        Controller {
            backend,
            cooldown,
            last_apply: Mutex::new(None),
            plan: Mutex::new(None),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    fn cooldown_remaining(&self) -> Option<Duration> {
        let guard = self.last_apply.lock().expect("controller mutex poisoned");
        guard.and_then(|last| {
            let elapsed = last.elapsed();
            if elapsed < self.cooldown {
                Some(self.cooldown - elapsed)
            } else {
                None
            }
        })
    }

    pub fn current_plan(&self) -> Option<Plan> {
        self.plan.lock().expect("controller mutex poisoned").clone()
    }

    /// Apply `primary` if it differs from the currently-applied plan,
    /// honoring cooldown unless `force` is set (§6 `set_primary(member,
    /// force=false)`).
    pub fn set_primary(
        &self,
        members: &[Member],
        primary: &str,
        force: bool,
    ) -> Result<(), Result<CooldownRemaining, ControllerError>> {
        {
            let plan = self.plan.lock().expect("controller mutex poisoned");
            if let Some(existing) = plan.as_ref() {
                if existing.desired_primary == primary && existing.status != PlanStatus::Failed {
                    return Ok(());
                }
            }
        }

        if !force {
            if let Some(remaining) = self.cooldown_remaining() {
                return Err(Ok(CooldownRemaining(remaining)));
            }
        }

        {
            let mut plan = self.plan.lock().expect("controller mutex poisoned");
            *plan = Some(Plan {
                desired_primary: primary.to_string(),
                applied_at: None,
                verified_at: None,
                status: PlanStatus::Pending,
            });
        }

        match self.backend.apply(members, primary) {
            Ok(()) => {
                let now = Utc::now();
                *self.last_apply.lock().expect("controller mutex poisoned") = Some(Instant::now());
                let mut plan = self.plan.lock().expect("controller mutex poisoned");
                *plan = Some(Plan {
                    desired_primary: primary.to_string(),
                    applied_at: Some(now),
                    verified_at: Some(now),
                    status: PlanStatus::Verified,
                });
                Ok(())
            }
            Err(err) => {
                let mut plan = self.plan.lock().expect("controller mutex poisoned");
                if let Some(p) = plan.as_mut() {
                    p.status = PlanStatus::Failed;
                }
                Err(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct CountingBackend {
        applies: Arc<AtomicU32>,
        fail: bool,
    }

    impl ControllerBackend for CountingBackend {
        fn name(&self) -> &'static str {
            "counting"
        }
        fn is_available(&self) -> bool {
            true
        }
        fn apply(&self, _members: &[Member], _primary: &str) -> Result<(), ControllerError> {
            self.applies.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ControllerError::ApplyFailed {
                    backend: "counting".to_string(),
                    message: "forced failure".to_string(),
                })
            } else {
                Ok(())
            }
        }
        fn get_current_primary(&self, _members: &[Member]) -> Result<Option<String>, ControllerError> {
            Ok(None)
        }
    }

    #[test]
    fn repeated_set_primary_is_idempotent() {
        let calls = Arc::new(AtomicU32::new(0));
        let backend = CountingBackend {
            applies: calls.clone(),
            fail: false,
        };
        let controller = Controller::new(Box::new(backend), Duration::from_secs(30));
        controller.set_primary(&[], "wan", false).unwrap();
        controller.set_primary(&[], "wan", false).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cooldown_blocks_apply_within_window() {
        let backend = CountingBackend {
            applies: Arc::new(AtomicU32::new(0)),
            fail: false,
        };
        let controller = Controller::new(Box::new(backend), Duration::from_secs(30));
        controller.set_primary(&[], "wan", false).unwrap();
        let err = controller.set_primary(&[], "lte", false).unwrap_err();
        assert!(matches!(err, Ok(CooldownRemaining(_))));
    }

    #[test]
    fn force_bypasses_cooldown() {
        let backend = CountingBackend {
            applies: Arc::new(AtomicU32::new(0)),
            fail: false,
        };
        let controller = Controller::new(Box::new(backend), Duration::from_secs(30));
        controller.set_primary(&[], "wan", false).unwrap();
        controller.set_primary(&[], "lte", true).unwrap();
    }

    #[test]
    fn failed_apply_does_not_update_desired_primary_silently() {
        let backend = CountingBackend {
            applies: Arc::new(AtomicU32::new(0)),
            fail: true,
        };
        let controller = Controller::new(Box::new(backend), Duration::from_secs(30));
        let err = controller.set_primary(&[], "wan", false).unwrap_err();
        assert!(matches!(err, Err(ControllerError::ApplyFailed { .. })));
        let plan = controller.current_plan().unwrap();
        assert_eq!(plan.status, PlanStatus::Failed);
    }
}
