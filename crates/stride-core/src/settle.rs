//! All-settled fan-out/fan-in.
//!
//! Every future is issued together and every outcome is collected, in input
//! order, regardless of how many fail.

use std::fmt::Display;
use std::future::Future;

use futures::future::join_all;

/// Await all futures and return each outcome in input order.
pub async fn settle_all<I, F, T, E>(futures: I) -> Vec<Result<T, E>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    join_all(futures).await
}

/// Await all futures, substituting the paired default for each failure.
///
/// Failures are logged at `warn` and never abort the remaining items.
pub async fn settle_or_default<I, F, T, E>(pairs: I) -> Vec<T>
where
    I: IntoIterator<Item = (F, T)>,
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    let (futures, defaults): (Vec<F>, Vec<T>) = pairs.into_iter().unzip();
    settle_all(futures)
        .await
        .into_iter()
        .zip(defaults)
        .enumerate()
        .map(|(idx, (outcome, default))| match outcome {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("settled item {idx} failed, using default: {e:#}");
                default
            }
        })
        .collect()
}
