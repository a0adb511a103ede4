//! Remote control client for a desktop media server.
//!
//! [`Client`] is the single entry point: it starts and stops the connection,
//! sends playback commands and republishes the server's state to observers.
//! The connection heals itself: whenever it drops, the client reconnects to
//! the same target after a fixed interval until [`Client::stop`] is called.
//!
//! # Example
//!
//! ```rust,no_run
//! use desklink::{config::Config, protocol::Command, remote::Client, state::StateValue};
//!
//! # async fn example() -> desklink::error::Result<()> {
//! let client = Client::new(Config::default())?;
//! let _subscription = client.subscribe(|_, value| match value {
//!     StateValue::Connection(status) => println!("{status}"),
//!     StateValue::Track(track) => println!("{track}"),
//! });
//!
//! client.connect("192.168.1.10").await?;
//! client.send_command(Command::Play).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::{
    config::Config,
    controller::{Controller, Request},
    error::{Error, Result},
    probe,
    protocol::Command,
    state::{ConnectionStatus, StateKey, StateValue, TrackInfo},
    store::{StateStore, Subscription},
    target::ConnectionTarget,
    transport::{Connector, WebSocketConnector},
};

pub struct Client {
    config: Config,
    store: Arc<StateStore>,
    requests: mpsc::UnboundedSender<Request>,
    http: reqwest::Client,
}

impl Client {
    /// Creates a client that connects over websockets.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client for liveness checks cannot be built.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_connector(config, WebSocketConnector)
    }

    /// Creates a client that opens its connections through `connector`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client for liveness checks cannot be built.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    pub fn with_connector<C>(config: Config, connector: C) -> Result<Self>
    where
        C: Connector,
    {
        // The server lives on the local network: never go through a proxy.
        let http = reqwest::Client::builder()
            .no_proxy()
            .timeout(config.probe_timeout)
            .user_agent(&config.user_agent)
            .build()?;

        let store = Arc::new(StateStore::new());
        let requests = Controller::spawn(Arc::new(connector), Arc::clone(&store), &config);

        Ok(Self {
            config,
            store,
            requests,
            http,
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Checks that the server runs on `host`, then starts connecting to its
    /// websocket port.
    ///
    /// # Errors
    ///
    /// Returns an error, without starting, if the liveness check fails or
    /// `host` is invalid.
    pub async fn connect(&self, host: &str) -> Result<()> {
        probe::probe(&self.http, host, self.config.http_port).await?;

        let target = ConnectionTarget::new(host, self.config.websocket_port.to_string())?;
        self.start(target);
        Ok(())
    }

    /// Starts connecting to `target` without waiting for the outcome.
    ///
    /// Any pending reconnect is cancelled. Starting while already connecting
    /// or connected to the same target does nothing; a different target
    /// replaces the current connection.
    pub fn start(&self, target: ConnectionTarget) {
        self.request(Request::Start(target));
    }

    /// Closes the connection and cancels any pending reconnect.
    ///
    /// When this returns, the published connection status is
    /// [`ConnectionStatus::Disconnected`].
    pub async fn stop(&self) {
        let (done, stopped) = oneshot::channel();
        self.request(Request::Stop(done));
        if stopped.await.is_err() {
            error!("connection controller is gone");
        }
    }

    /// Sends a playback command if connected.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` when not connected. The command is dropped, not
    /// queued.
    pub async fn send_command(&self, command: Command) -> Result<()> {
        let (result, sent) = oneshot::channel();
        self.request(Request::Send(command, result));
        sent.await
            .map_err(|_| Error::cancelled("connection controller is gone"))?
    }

    /// Pauses when the last known track is playing, plays otherwise.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` when not connected.
    pub async fn toggle(&self) -> Result<()> {
        let playing = self.track().is_some_and(|track| track.playing);
        self.send_command(Command::toggle(playing)).await
    }

    /// Registers `observer` for every state update.
    ///
    /// Observers are called synchronously from the connection task, in
    /// registration order, and must return quickly. They should not panic:
    /// a panic is caught and logged, and the update still reaches the other
    /// observers.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(StateKey, &StateValue) + Send + Sync + 'static,
    {
        self.store.subscribe(observer)
    }

    #[must_use]
    pub fn get(&self, key: StateKey) -> Option<StateValue> {
        self.store.get(key)
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        match self.get(StateKey::Connection) {
            Some(StateValue::Connection(status)) => status,
            _ => ConnectionStatus::Disconnected,
        }
    }

    #[must_use]
    pub fn track(&self) -> Option<TrackInfo> {
        match self.get(StateKey::Track) {
            Some(StateValue::Track(track)) => Some(track),
            _ => None,
        }
    }

    fn request(&self, request: Request) {
        if let Err(e) = self.requests.send(request) {
            error!("connection controller is gone, dropping {:?}", e.0);
        }
    }
}
