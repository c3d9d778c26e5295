//! Enumeration of the artifacts a run fetches

use std::collections::BTreeSet;

use chrono::Datelike;

use crate::types::{ArtifactId, SyncMode};

/// First year the feed publishes an annual snapshot for
pub const EPOCH_YEAR: i32 = 2002;

/// Artifact ids for `mode`, sorted by their textual id.
///
/// Incremental runs only need the delta. Full runs need the delta plus one
/// snapshot per year from [`EPOCH_YEAR`] through `current_year`.
pub fn build_catalog(mode: SyncMode, current_year: i32) -> BTreeSet<ArtifactId> {
    let mut catalog = BTreeSet::from([ArtifactId::Modified]);

    if mode == SyncMode::Full {
        catalog.extend((EPOCH_YEAR..=current_year).filter_map(|year| ArtifactId::year(year).ok()));
    }

    catalog
}

/// Current calendar year from the UTC clock
pub fn current_year() -> i32 {
    chrono::Utc::now().year()
}
