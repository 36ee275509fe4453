//! Merge rule for server-confirmed variations and local placeholders.

use std::collections::HashSet;

use crate::variation::DesignVariation;

/// Deduplicating union of `server` and `placeholders`, newest first.
///
/// Records are keyed by id and the first occurrence wins, server rows before
/// placeholders. Equal timestamps are ordered by id (descending) so repeated
/// calls with the same inputs always produce the same list.
pub fn merge_variations(
    server: &[DesignVariation],
    placeholders: &[DesignVariation],
) -> Vec<DesignVariation> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(server.len() + placeholders.len());

    let mut merged: Vec<DesignVariation> = server
        .iter()
        .chain(placeholders.iter())
        .filter(|v| seen.insert(v.id.as_str()))
        .cloned()
        .collect();

    merged.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    merged
}
