//! Variation Store: server-confirmed rows plus optimistic placeholders.

use std::collections::HashMap;

use atelier_core::merge::merge_variations;
use atelier_core::types::RecordId;
use atelier_core::variation::{can_transition, DesignVariation};

#[derive(Debug, Default, Clone)]
pub struct VariationStore {
    server: Vec<DesignVariation>,
    placeholders: Vec<DesignVariation>,
}

impl VariationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add placeholders for a job that is about to be submitted.
    pub fn push_placeholders(&mut self, placeholders: impl IntoIterator<Item = DesignVariation>) {
        self.placeholders.extend(placeholders);
    }

    /// Remove the given placeholders. Returns how many were removed.
    pub fn rollback(&mut self, ids: &[RecordId]) -> usize {
        let before = self.placeholders.len();
        self.placeholders.retain(|p| !ids.contains(&p.id));
        before - self.placeholders.len()
    }

    /// Adopt a full refetch. All placeholders are dropped: the refetch is
    /// what supersedes them.
    ///
    /// Rows that break the status lattice or the ready/image invariant are
    /// logged and kept; the server is authoritative.
    pub fn replace_server(&mut self, records: Vec<DesignVariation>) {
        let previous: HashMap<&str, &DesignVariation> =
            self.server.iter().map(|v| (v.id.as_str(), v)).collect();

        for record in &records {
            if let Some(old) = previous.get(record.id.as_str()) {
                if !can_transition(old.status, record.status) {
                    tracing::warn!(
                        variation_id = %record.id,
                        from = old.status.as_str(),
                        to = record.status.as_str(),
                        "Variation moved backwards",
                    );
                }
            }
            if !record.has_consistent_image() {
                tracing::warn!(
                    variation_id = %record.id,
                    status = record.status.as_str(),
                    has_image = record.image_url.is_some(),
                    "Variation image does not match its status",
                );
            }
        }

        self.server = records;
        self.placeholders.clear();
    }

    /// Newest first, see [`merge_variations`].
    pub fn list(&self) -> Vec<DesignVariation> {
        merge_variations(&self.server, &self.placeholders)
    }

    pub fn find(&self, id: &str) -> Option<&DesignVariation> {
        self.server
            .iter()
            .chain(self.placeholders.iter())
            .find(|v| v.id == id)
    }

    pub fn placeholder_count(&self) -> usize {
        self.placeholders.len()
    }

    pub fn server_records(&self) -> &[DesignVariation] {
        &self.server
    }
}
