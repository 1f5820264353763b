//! Guard against two executions remediating the same resource at once

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

/// Owning execution and number of live guards for one target
#[derive(Debug, Clone, Copy)]
struct Claim {
    execution_id: Uuid,
    holders: usize,
}

/// Registry of resources currently being remediated
///
/// Clones share the same registry. Branches of one execution may hold the
/// same target concurrently; another execution is refused until every guard
/// of the owner has been dropped.
#[derive(Debug, Clone, Default)]
pub struct RemediationClaims {
    claims: Arc<DashMap<String, Claim>>,
}

impl RemediationClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a target for an execution
    ///
    /// Returns the id of the owning execution when the target is taken.
    pub fn try_claim(&self, target: &str, execution_id: Uuid) -> Result<ClaimGuard, Uuid> {
        match self.claims.entry(target.to_string()) {
            Entry::Occupied(mut occupied) => {
                let claim = occupied.get_mut();
                if claim.execution_id != execution_id {
                    return Err(claim.execution_id);
                }
                claim.holders += 1;
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Claim {
                    execution_id,
                    holders: 1,
                });
            }
        }

        Ok(ClaimGuard {
            claims: self.claims.clone(),
            target: target.to_string(),
            execution_id,
        })
    }

    /// Execution currently remediating a target
    pub fn holder(&self, target: &str) -> Option<Uuid> {
        self.claims.get(target).map(|c| c.execution_id)
    }

    pub fn active_count(&self) -> usize {
        self.claims.len()
    }
}

/// Releases its claim when dropped, including when a branch is aborted
#[derive(Debug)]
pub struct ClaimGuard {
    claims: Arc<DashMap<String, Claim>>,
    target: String,
    execution_id: Uuid,
}

impl ClaimGuard {
    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        if let Entry::Occupied(mut occupied) = self.claims.entry(self.target.clone()) {
            let claim = occupied.get_mut();
            if claim.execution_id != self.execution_id {
                return;
            }
            claim.holders = claim.holders.saturating_sub(1);
            if claim.holders == 0 {
                occupied.remove();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_execution_is_refused() {
        let claims = RemediationClaims::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        let guard = claims.try_claim("api-handler", first).unwrap();
        assert_eq!(claims.try_claim("api-handler", second).unwrap_err(), first);
        assert_eq!(claims.holder("api-handler"), Some(first));

        drop(guard);
        assert!(claims.holder("api-handler").is_none());
        assert!(claims.try_claim("api-handler", second).is_ok());
    }

    #[test]
    fn test_same_execution_shares_target() {
        let claims = RemediationClaims::new();
        let exec = Uuid::new_v4();

        let a = claims.try_claim("api-handler", exec).unwrap();
        let b = claims.try_claim("api-handler", exec).unwrap();
        drop(a);
        assert_eq!(claims.holder("api-handler"), Some(exec));
        drop(b);
        assert_eq!(claims.active_count(), 0);
    }
}
