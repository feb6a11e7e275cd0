//! HTTP client construction for workers.

use std::time::Duration;

use crate::error::Error;

/// Default per-request deadline when an action sets no timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the per-worker client: an own cookie jar for browser-like session
/// state, up to 10 redirects with cookies collected along the chain, a pool
/// tuned for long-lived idle connections, and transparent gzip so scenarios
/// never need to pin `Accept-Encoding`.
pub fn build(insecure_tls: bool) -> Result<reqwest::Client, Error> {
    let mut builder = reqwest::Client::builder()
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::limited(10))
        .timeout(DEFAULT_TIMEOUT)
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(30))
        .gzip(true);

    if insecure_tls {
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder.build().map_err(Error::Client)
}
