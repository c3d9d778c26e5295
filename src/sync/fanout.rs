//! Worker-per-artifact fan-out with exact fan-in

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;

use futures::{StreamExt, TryStreamExt, stream};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, IntegrityError, Result};
use crate::types::ArtifactId;

/// Run `worker` once per id, at most `concurrency` at a time.
///
/// Completes when every worker has reported. The first failure, or
/// cancellation of `cancel`, drops the remaining in-flight workers and is
/// returned. On success the result holds exactly one value per requested id.
pub(crate) async fn fan_out<T, F, Fut>(
    ids: &BTreeSet<ArtifactId>,
    concurrency: usize,
    cancel: &CancellationToken,
    worker: F,
) -> Result<BTreeMap<ArtifactId, T>>
where
    F: Fn(ArtifactId) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let collect = stream::iter(ids.iter().copied())
        .map(|id| {
            let work = worker(id);
            async move { work.await.map(|value| (id, value)) }
        })
        .buffer_unordered(concurrency.max(1))
        .try_collect::<Vec<_>>();

    let reported = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        reported = collect => reported?,
    };

    let mut results = BTreeMap::new();
    for (id, value) in reported {
        if results.insert(id, value).is_some() {
            return Err(Error::Other(format!("artifact {id} reported more than once")));
        }
    }

    if let Some(missing) = ids.iter().find(|id| !results.contains_key(*id)) {
        return Err(IntegrityError::MissingArtifact {
            artifact: *missing,
        }
        .into());
    }

    Ok(results)
}
