//! Fail-open helper for non-critical work
//!
//! Activity logging and other bookkeeping must never abort a phase. Wrap
//! such operations with [`fail_open`]; failures are logged and swallowed.
//!
//! Never use this for agent invocation, verification or state persistence.

use std::future::Future;
use tracing::warn;

use crate::Result;

/// Run an operation whose failure should only be logged
///
/// ```no_run
/// use stratum_core::fail_open::fail_open;
/// use stratum_core::Result;
///
/// async fn append_log() -> Result<()> {
///     Ok(())
/// }
///
/// async fn example() {
///     let written = fail_open("activity_log", || append_log()).await;
///     assert!(written.is_some());
/// }
/// ```
pub async fn fail_open<F, Fut, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match f().await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}
