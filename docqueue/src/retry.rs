//! Read-modify-write loop for writes that must win a version race.
//!
//! Used for idempotent bootstrap writes such as the index definition
//! document. The hot claim path never retries; see [`crate::jobs::claim`].

use crate::store::{Document, DocumentStore, Revision, StoreError, StoreResult};
use std::num::NonZeroU32;
use tracing::{debug, warn};

/// How long [`force_put`] keeps retrying.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of write attempts. `None` retries until the write lands.
    pub max_attempts: Option<NonZeroU32>,
}

impl RetryPolicy {
    /// Retry until success.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self { max_attempts: None }
    }

    /// Give up after `attempts` writes.
    #[must_use]
    pub const fn with_max_attempts(attempts: NonZeroU32) -> Self {
        Self {
            max_attempts: Some(attempts),
        }
    }

    fn allows(&self, attempts: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempts < max.get())
    }
}

/// Write `doc` regardless of the revision currently stored.
///
/// On a version conflict the current revision is read back and copied onto
/// `doc` before trying again. The body of `doc` always wins.
///
/// # Errors
///
/// Returns [`StoreError::RetryExhausted`] when the policy's attempt ceiling is
/// reached, or the first non-conflict error reported by the store.
pub async fn force_put(
    store: &dyn DocumentStore,
    mut doc: Document,
    policy: RetryPolicy,
) -> StoreResult<Revision> {
    let mut attempts = 0_u32;
    loop {
        attempts += 1;
        match store.put(doc.clone()).await {
            Ok(rev) => {
                debug!(id = %doc.id, attempts, "forced write landed");
                return Ok(rev);
            }
            Err(StoreError::Conflict(id)) => {
                if !policy.allows(attempts) {
                    warn!(id = %id, attempts, "giving up on conflicting write");
                    return Err(StoreError::RetryExhausted { id, attempts });
                }
                doc.rev = match store.get(&id).await {
                    Ok(current) => current.rev,
                    Err(StoreError::NotFound(_)) => None,
                    Err(e) => return Err(e),
                };
                debug!(id = %id, attempts, rev = ?doc.rev, "write conflicted, retrying");
            }
            Err(e) => return Err(e),
        }
    }
}
