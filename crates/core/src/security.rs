//! Scoped security context used for job enumeration.
//!
//! Webhook deliveries are unauthenticated, so the caller is the anonymous
//! principal and would only see public jobs. Matching must consider every
//! job, so enumeration runs with an [`ElevatedContext`]: a guard that
//! switches the context to [`Principal::System`] and restores the previous
//! principal when dropped, on every exit path.
//!
//! The guard doubles as a capability token: [`crate::jobs::JobSource`]
//! requires a `&ElevatedContext` to list all jobs, so full-visibility
//! enumeration cannot happen outside an elevated scope.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use tracing::trace;

/// Who the current unit of work runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Anonymous,
    User(String),
    /// Sees everything.
    System,
}

impl Principal {
    /// Whether this principal may see a job restricted to `allowed` names.
    /// An empty list means the job is public.
    pub fn can_see(&self, allowed: &[String]) -> bool {
        match self {
            Self::System => true,
            _ if allowed.is_empty() => true,
            Self::User(name) => allowed.iter().any(|a| a == name),
            Self::Anonymous => false,
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "anonymous"),
            Self::User(name) => write!(f, "user:{}", name),
            Self::System => write!(f, "system"),
        }
    }
}

/// The security context of one unit of work (one webhook delivery).
///
/// Created fresh per request; never shared between requests.
#[derive(Debug)]
pub struct SecurityContext {
    principal: Mutex<Principal>,
}

impl SecurityContext {
    pub fn new(principal: Principal) -> Self {
        Self {
            principal: Mutex::new(principal),
        }
    }

    /// The principal currently in effect.
    pub fn principal(&self) -> Principal {
        self.lock().clone()
    }

    /// Switch to [`Principal::System`] until the returned guard is dropped.
    pub fn elevate(&self) -> ElevatedContext<'_> {
        let previous = std::mem::replace(&mut *self.lock(), Principal::System);
        trace!(previous = %previous, "security context elevated");
        ElevatedContext {
            context: self,
            previous: Some(previous),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Principal> {
        self.principal
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Guard holding a [`SecurityContext`] at [`Principal::System`].
#[derive(Debug)]
pub struct ElevatedContext<'a> {
    context: &'a SecurityContext,
    previous: Option<Principal>,
}

impl ElevatedContext<'_> {
    /// The principal that will be restored when the guard is dropped.
    pub fn previous(&self) -> Option<&Principal> {
        self.previous.as_ref()
    }
}

impl Drop for ElevatedContext<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            trace!(restored = %previous, "security context restored");
            *self.context.lock() = previous;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elevate_and_restore() {
        let ctx = SecurityContext::new(Principal::Anonymous);
        {
            let guard = ctx.elevate();
            assert_eq!(ctx.principal(), Principal::System);
            assert_eq!(guard.previous(), Some(&Principal::Anonymous));
        }
        assert_eq!(ctx.principal(), Principal::Anonymous);
    }

    #[test]
    fn test_nested_elevation_restores_in_order() {
        let ctx = SecurityContext::new(Principal::User("alice".into()));
        {
            let _outer = ctx.elevate();
            {
                let _inner = ctx.elevate();
                assert_eq!(ctx.principal(), Principal::System);
            }
            assert_eq!(ctx.principal(), Principal::System);
        }
        assert_eq!(ctx.principal(), Principal::User("alice".into()));
    }

    #[test]
    fn test_restored_on_early_return() {
        fn enumerate(ctx: &SecurityContext) -> Result<(), String> {
            let _guard = ctx.elevate();
            Err("enumeration failed".into())
        }

        let ctx = SecurityContext::new(Principal::Anonymous);
        assert!(enumerate(&ctx).is_err());
        assert_eq!(ctx.principal(), Principal::Anonymous);
    }

    #[test]
    fn test_restored_on_panic() {
        let ctx = SecurityContext::new(Principal::Anonymous);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = ctx.elevate();
            panic!("dispatch blew up");
        }));
        assert!(result.is_err());
        assert_eq!(ctx.principal(), Principal::Anonymous);
    }

    #[test]
    fn test_visibility() {
        let restricted = vec!["alice".to_string()];
        assert!(Principal::Anonymous.can_see(&[]));
        assert!(!Principal::Anonymous.can_see(&restricted));
        assert!(Principal::User("alice".into()).can_see(&restricted));
        assert!(!Principal::User("bob".into()).can_see(&restricted));
        assert!(Principal::System.can_see(&restricted));
    }
}
