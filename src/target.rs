//! Remote server endpoints.

use std::fmt;

use url::Url;

use crate::error::{Error, Result};

/// Host and port of the server's websocket endpoint.
///
/// A target is immutable: every call to `start` supplies a fresh one, and the
/// same value is reused for all retries that follow.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ConnectionTarget {
    host: String,
    port: String,
}

impl ConnectionTarget {
    /// Creates a target after checking that it forms a valid websocket URL.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when the host is empty, the port is not a
    /// number in `1..=65535`, or the pair does not form a valid URL.
    pub fn new(host: impl Into<String>, port: impl Into<String>) -> Result<Self> {
        let host = host.into().trim().to_owned();
        let port = port.into().trim().to_owned();

        if host.is_empty() {
            return Err(Error::invalid_argument("host is empty"));
        }

        match port.parse::<u16>() {
            Ok(0) | Err(_) => {
                return Err(Error::invalid_argument(format!("invalid port \"{port}\"")));
            }
            Ok(_) => {}
        }

        let target = Self { host, port };
        target.url()?;
        Ok(target)
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Returns the websocket URL, as in `ws://192.168.1.10:5992`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when the host cannot be part of a URL.
    pub fn url(&self) -> Result<Url> {
        let port = self
            .port
            .parse()
            .map_err(|_| Error::invalid_argument(format!("invalid port \"{}\"", self.port)))?;
        endpoint_url("ws", &self.host, port)
    }
}

/// Builds `{scheme}://{host}:{port}/`, rejecting hosts that would change the
/// meaning of the URL, such as `10.0.0.5/x` or `user@10.0.0.5`.
pub(crate) fn endpoint_url(scheme: &str, host: &str, port: u16) -> Result<Url> {
    let url = Url::parse(&format!("{scheme}://{host}:{port}/"))?;

    let exact = url.host_str().is_some()
        && url.port_or_known_default() == Some(port)
        && url.path() == "/"
        && url.username().is_empty()
        && url.password().is_none()
        && url.query().is_none()
        && url.fragment().is_none();
    if !exact {
        return Err(Error::invalid_argument(format!(
            "invalid host \"{host}\": not a plain host name or address"
        )));
    }

    Ok(url)
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
