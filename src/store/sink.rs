use std::collections::BTreeMap;

use futures::future::join_all;
use tracing::info;

use crate::error::Result;
use crate::models::{Community, Deal};
use crate::store::DealStore;

/// Replace everything stored for `scope` with `deals`.
///
/// The clear over the whole scope finishes before the first insert is issued.
/// Inserts are grouped per community and run concurrently. Not transactional
/// across the two steps: a failed insert leaves the scope partially empty.
pub async fn replace(store: &dyn DealStore, scope: &[Community], deals: &[Deal]) -> Result<u64> {
    let deleted = store.clear(scope).await?;
    info!("🧹 Cleared {} stored deals for {}", deleted, scope_label(scope));

    let mut groups: BTreeMap<Community, Vec<Deal>> = BTreeMap::new();
    for deal in deals {
        groups.entry(deal.community).or_default().push(deal.clone());
    }

    let results = join_all(groups.values().map(|group| store.insert_many(group))).await;

    let mut inserted = 0;
    for result in results {
        inserted += result?;
    }
    info!("💾 Inserted {} deals", inserted);
    Ok(inserted)
}

fn scope_label(scope: &[Community]) -> String {
    scope
        .iter()
        .map(Community::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
