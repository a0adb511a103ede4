//! HTTP liveness check.
//!
//! Besides the websocket port, the desktop server answers plain HTTP `GET /`
//! on a second port. A successful response tells the client that the server
//! runs on that host, before it commits to a persistent connection.

use crate::{
    error::{Error, Result},
    target::endpoint_url,
};

/// Checks that the media server answers on `host:port`.
///
/// # Errors
///
/// Returns:
/// * `Unavailable` when nothing answers
/// * `FailedPrecondition` when the response is not a success
/// * `DeadlineExceeded` when the client's timeout elapses
pub async fn probe(http: &reqwest::Client, host: &str, port: u16) -> Result<()> {
    let url = endpoint_url("http", host.trim(), port)?;
    debug!("probing {url}");

    let response = http.get(url.clone()).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::failed_precondition(format!(
            "{url} answered with {status}"
        )));
    }

    info!("media server found at {url}");
    Ok(())
}
