//! Convergence applier.
//!
//! Makes the target's labels match the combined mapping: upsert every combined
//! key, reclaim every key that is neither combined nor protected, and leave
//! protected keys exactly as they were. Writes only when something changed.

use nslabel_core::{Labels, ProtectedKeySet, Target, TargetKey};
use tracing::{debug, info};

use crate::error::Result;
use crate::store::Guarded;
use crate::types::ApplyOutcome;

/// Compute the labels the target must carry after convergence.
pub fn converge(current: &Labels, combined: &Labels, protected: &ProtectedKeySet) -> Labels {
    let upserted = combined
        .iter()
        .filter(|(key, _)| !protected.is_protected(key))
        .map(|(key, value)| (key.clone(), value.clone()));

    let retained = current
        .iter()
        .filter(|(key, _)| protected.is_protected(key) || combined.contains_key(*key))
        .map(|(key, value)| (key.clone(), value.clone()));

    // Upserts come last so they override retained values.
    retained.chain(upserted).collect()
}

/// Applies a combined mapping to a target through the store.
pub struct ConvergenceApplier<'a> {
    store: Guarded<'a>,
    protected: &'a ProtectedKeySet,
}

impl<'a> ConvergenceApplier<'a> {
    pub const fn new(store: Guarded<'a>, protected: &'a ProtectedKeySet) -> Self {
        Self { store, protected }
    }

    /// Fetch `target`, converge its labels onto `combined`, and update it if
    /// they changed.
    ///
    /// # Errors
    ///
    /// Returns the store's fetch or update error unchanged, including
    /// `NotFound` when the target is gone.
    pub async fn apply(&self, target: &TargetKey, combined: &Labels) -> Result<ApplyOutcome> {
        let mut current: Target = self.store.get_target(target).await?;
        let before = current.labels_or_empty();
        let after = converge(&before, combined, self.protected);

        if after == before {
            debug!(target = %target, "Target labels already converged");
            return Ok(ApplyOutcome::default());
        }

        let upserted = after
            .iter()
            .filter(|(key, value)| before.get(*key) != Some(*value))
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();
        let removed = before
            .keys()
            .filter(|key| !after.contains_key(*key))
            .cloned()
            .collect::<Vec<_>>();

        current.labels = Some(after);
        self.store.update_target(&current).await?;

        info!(
            target = %target,
            upserted = ?upserted,
            removed = ?removed,
            "Updated target labels"
        );

        Ok(ApplyOutcome {
            upserted,
            removed,
            updated: true,
        })
    }
}
