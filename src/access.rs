//! Per-file access entitlement.
//!
//! Second of the two fail-closed boundaries: applied after the collection
//! scope filter, against the caller's entitlement set computed upstream.

use std::collections::HashSet;

use crate::index::SearchHit;

/// Keep only hits whose `file_id` is in the allowed set.
///
/// `None` means the caller is trusted (administrative path) and no
/// restriction applies. An empty set yields an empty result, not an error.
pub fn restrict_to_allowed(
    hits: Vec<SearchHit>,
    allowed_file_ids: Option<&HashSet<String>>,
) -> Vec<SearchHit> {
    match allowed_file_ids {
        None => hits,
        Some(allowed) => hits
            .into_iter()
            .filter(|hit| allowed.contains(&hit.payload.file_id))
            .collect(),
    }
}
