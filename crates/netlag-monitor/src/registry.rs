//! Active-set registry — which peers currently have a monitor.
//!
//! Every claim carries a token. A [`Claim`] releases itself on drop, but
//! only if it is still the live owner: once reconciliation has removed an
//! address, a newer task may claim it again and the stale task's release
//! must leave that new claim alone.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Concurrency-safe set of monitored peer addresses.
///
/// Cheap to clone; clones share the same set.
#[derive(Clone, Default)]
pub struct ActiveSet {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    /// address → token of the owning claim.
    claims: DashMap<String, u64>,
    next_token: AtomicU64,
}

impl ActiveSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim `address`.
    ///
    /// Returns `None` if another task already owns it.
    pub fn claim_if_absent(&self, address: &str) -> Option<Claim> {
        match self.inner.claims.entry(address.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
                slot.insert(token);
                Some(Claim {
                    address: address.to_string(),
                    token,
                    registry: self.clone(),
                })
            }
        }
    }

    /// Remove `address` regardless of who owns it. Idempotent.
    ///
    /// Returns whether an entry was removed.
    pub fn release(&self, address: &str) -> bool {
        self.inner.claims.remove(address).is_some()
    }

    /// Addresses present right now. May be stale as soon as it returns.
    pub fn snapshot(&self) -> HashSet<String> {
        self.inner.claims.iter().map(|e| e.key().clone()).collect()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.inner.claims.contains_key(address)
    }

    /// Whether `claim` still owns its address.
    pub fn holds(&self, claim: &Claim) -> bool {
        self.inner
            .claims
            .get(&claim.address)
            .is_some_and(|token| *token == claim.token)
    }

    pub fn len(&self) -> usize {
        self.inner.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.claims.is_empty()
    }

    fn release_claim(&self, address: &str, token: u64) {
        self.inner.claims.remove_if(address, |_, owner| *owner == token);
    }
}

impl fmt::Debug for ActiveSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.snapshot()).finish()
    }
}

/// Exclusive ownership of monitoring one address. Released on drop.
pub struct Claim {
    address: String,
    token: u64,
    registry: ActiveSet,
}

impl Claim {
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Whether this claim was revoked by reconciliation.
    pub fn is_held(&self) -> bool {
        self.registry.holds(self)
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.registry.release_claim(&self.address, self.token);
    }
}

impl fmt::Debug for Claim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claim")
            .field("address", &self.address)
            .field("token", &self.token)
            .finish()
    }
}
