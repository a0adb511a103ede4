//! Client configuration.
//!
//! The server listens on two ports: a plain HTTP port that only answers
//! liveness checks, and the websocket port that carries commands and track
//! updates. Both have fixed defaults that match the desktop server.

use std::time::Duration;

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Config {
    pub app_name: String,
    pub app_version: String,

    /// Port of the HTTP liveness endpoint.
    pub http_port: u16,

    /// Port of the persistent websocket connection.
    pub websocket_port: u16,

    /// Fixed delay between a connection loss and the next attempt.
    pub retry_interval: Duration,

    /// Bound on how long a single connection attempt may take to open.
    ///
    /// `None` lets an attempt hang until the transport gives up by itself.
    pub connect_timeout: Option<Duration>,

    /// Bound on the HTTP liveness check.
    pub probe_timeout: Duration,

    pub user_agent: String,
}

impl Config {
    pub const DEFAULT_HTTP_PORT: u16 = 5991;
    pub const DEFAULT_WEBSOCKET_PORT: u16 = 5992;
    pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(5_000);
    pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

    #[must_use]
    pub fn new() -> Self {
        let app_name = env!("CARGO_PKG_NAME").to_owned();
        let app_version = env!("CARGO_PKG_VERSION").to_owned();

        let os_name = match std::env::consts::OS {
            "macos" => "osx",
            other => other,
        };
        let user_agent = format!("{app_name}/{app_version} (Rust; {os_name})");
        trace!("user agent: {user_agent}");

        Self {
            app_name,
            app_version,

            http_port: Self::DEFAULT_HTTP_PORT,
            websocket_port: Self::DEFAULT_WEBSOCKET_PORT,

            retry_interval: Self::DEFAULT_RETRY_INTERVAL,
            connect_timeout: None,
            probe_timeout: Self::DEFAULT_PROBE_TIMEOUT,

            user_agent,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
