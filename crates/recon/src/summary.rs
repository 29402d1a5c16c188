use crate::model::{ReconSummary, Reconciliation};

/// Count each classification of a pass.
pub fn compute_summary(result: &Reconciliation, previous: usize, current: usize) -> ReconSummary {
    ReconSummary {
        previous,
        current,
        added: result.newly_added.len(),
        removed: result.newly_removed_urls.len(),
        reactivated: result.reactivated_urls.len(),
        updated: result.updated_urls.len(),
        unchanged: result.unchanged_urls.len(),
        duplicates: result.duplicate_urls.len(),
    }
}

impl std::fmt::Display for ReconSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} new, {} removed, {} back, {} updated, {} unchanged",
            self.added, self.removed, self.reactivated, self.updated, self.unchanged
        )
    }
}
