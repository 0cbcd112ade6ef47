//! Who is calling.

use dog_core::{CallContext, Principal};

/// Produces the current principal from the call context.
///
/// `None` means an anonymous or system call; tenancy hooks then do nothing.
pub trait IdentityResolver: Send + Sync {
    fn current_principal(&self, call: &CallContext) -> Option<Principal>;
}

/// Reads the principal the transport put in the [`CallContext`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextIdentity;

impl IdentityResolver for ContextIdentity {
    fn current_principal(&self, call: &CallContext) -> Option<Principal> {
        call.principal().cloned()
    }
}

/// Every call runs as the same principal. Handy for jobs and tests.
#[derive(Debug, Clone)]
pub struct FixedIdentity(pub Option<Principal>);

impl IdentityResolver for FixedIdentity {
    fn current_principal(&self, _call: &CallContext) -> Option<Principal> {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_identity_reads_the_call() {
        assert_eq!(
            ContextIdentity.current_principal(&CallContext::for_login("alice")),
            Some(Principal::new("alice"))
        );
        assert_eq!(ContextIdentity.current_principal(&CallContext::anonymous()), None);
    }

    #[test]
    fn fixed_identity_ignores_the_call() {
        let identity = FixedIdentity(Some(Principal::new("system")));
        assert_eq!(
            identity.current_principal(&CallContext::for_login("alice")),
            Some(Principal::new("system"))
        );
    }
}
