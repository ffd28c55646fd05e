//! Label combiner.
//!
//! Sources are ordered by creation time, oldest first, with ties broken by
//! `(namespace, name)`. Labels are folded in that order so the newest source
//! wins a key collision. Protected keys are never emitted.

use itertools::Itertools;
use nslabel_core::{Labels, ProtectedKeySet, Source};
use tracing::{debug, info};

use crate::types::{Combined, SkippedKey};

/// Combine the labels of `sources` into one mapping.
///
/// The result does not depend on the order of `sources`.
pub fn combine<'a, I>(sources: I, protected: &ProtectedKeySet) -> Combined
where
    I: IntoIterator<Item = &'a Source>,
{
    let ordered = sources
        .into_iter()
        .sorted_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.identity().cmp(&b.identity()))
        });

    let mut labels = Labels::new();
    let mut skipped = Vec::new();

    for source in ordered {
        for (key, value) in &source.labels {
            if protected.is_protected(key) {
                info!(source = %source, key = %key, "Skipping protected label");
                skipped.push(SkippedKey {
                    source: source.to_string(),
                    key: key.clone(),
                });
                continue;
            }
            if let Some(previous) = labels.insert(key.clone(), value.clone()) {
                if previous != *value {
                    debug!(source = %source, key = %key, "Newer source overrides label");
                }
            }
        }
    }

    Combined { labels, skipped }
}
