//! Transport handles over full-duplex text connections.
//!
//! A [`Connector`] opens connections; the default [`WebSocketConnector`] uses
//! `tokio-tungstenite`. Other connectors can be injected into the client, for
//! example to run against an in-memory peer.
//!
//! A [`TransportHandle`] owns exactly one connection attempt. It drives the
//! connection on its own task and reports what happens as
//! [`TransportEvent`]s tagged with the handle's id:
//!
//! ```text
//! Opened, Frame*, [Failed], Closed     after a successful open
//! [Failed], Closed                     when the attempt fails
//! ```
//!
//! `Closed` is always the last event of a handle.

use std::{fmt, pin::Pin, sync::Arc, time::Duration};

use futures_util::{future, future::BoxFuture, FutureExt, Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WebsocketMessage;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Error, Result},
    target::ConnectionTarget,
};

/// Outbound half of a connection.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = Error> + Send>>;

/// Inbound half of a connection. The stream ends when the connection closes.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// An open connection, as returned by a [`Connector`].
pub struct Connection {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Opens connections to a target.
pub trait Connector: Send + Sync + 'static {
    /// Starts a connection attempt.
    ///
    /// The returned future resolves once the connection is open and ready for
    /// sending, or fails. It must not borrow from `self` or `target`.
    fn connect(&self, target: &ConnectionTarget) -> BoxFuture<'static, Result<Connection>>;
}

/// Connects over plain websockets.
#[derive(Copy, Clone, Debug, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn connect(&self, target: &ConnectionTarget) -> BoxFuture<'static, Result<Connection>> {
        let url = target.url();

        async move {
            let url = url?;
            let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
            let (ws_tx, ws_rx) = ws_stream.split();

            let sink = ws_tx.with(|text: String| {
                future::ready(Ok::<_, Error>(WebsocketMessage::text(text)))
            });

            // Pings are answered by tungstenite itself.
            let stream = ws_rx.filter_map(|message| {
                future::ready(match message {
                    Ok(WebsocketMessage::Text(text)) => Some(Ok(text.as_str().to_owned())),
                    Ok(WebsocketMessage::Close(frame)) => {
                        debug!("connection closed by server: {frame:?}");
                        None
                    }
                    Ok(WebsocketMessage::Binary(payload)) => {
                        warn!("ignoring binary frame of {} bytes", payload.len());
                        None
                    }
                    Ok(_) => None,
                    Err(e) => Some(Err(e.into())),
                })
            });

            Ok::<_, Error>(Connection {
                sink: Box::pin(sink),
                stream: Box::pin(stream),
            })
        }
        .boxed()
    }
}

#[derive(Debug)]
pub enum TransportEventKind {
    Opened,
    Frame(String),
    Failed(Error),
    Closed,
}

#[derive(Debug)]
pub struct TransportEvent {
    pub id: u64,
    pub kind: TransportEventKind,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ReadyState {
    Connecting,
    Open,
    Closed,
}

/// Handle to a single connection attempt and, if it opens, its connection.
///
/// The owner learns about the connection through the events channel and
/// must call [`mark_open`](Self::mark_open) when it sees
/// [`TransportEventKind::Opened`]. Dropping the handle closes it.
pub struct TransportHandle {
    id: u64,
    target: ConnectionTarget,
    state: ReadyState,
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

impl TransportHandle {
    /// Time allowed for the closing handshake before the connection is dropped.
    const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

    /// Starts connecting to `target` without waiting for the outcome.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    pub fn open(
        id: u64,
        target: ConnectionTarget,
        connector: &Arc<dyn Connector>,
        connect_timeout: Option<Duration>,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let attempt = connector.connect(&target);
        tokio::spawn(drive(
            id,
            attempt,
            connect_timeout,
            outbound_rx,
            cancel.clone(),
            events,
        ));

        Self {
            id,
            target,
            state: ReadyState::Connecting,
            outbound,
            cancel,
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        self.state
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == ReadyState::Open && !self.outbound.is_closed()
    }

    pub fn mark_open(&mut self) {
        if self.state == ReadyState::Connecting {
            self.state = ReadyState::Open;
        }
    }

    /// Queues a text frame for sending.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the handle is not open.
    pub fn send(&self, text: String) -> Result<()> {
        if self.state != ReadyState::Open {
            return Err(Error::unavailable(format!(
                "connection to {} is not open",
                self.target
            )));
        }

        self.outbound
            .send(text)
            .map_err(|_| Error::unavailable(format!("connection to {} is gone", self.target)))
    }

    /// Closes the connection. Closing a closed handle does nothing.
    pub fn close(&mut self) {
        if self.state != ReadyState::Closed {
            debug!("closing connection {} to {}", self.id, self.target);
            self.state = ReadyState::Closed;
            self.cancel.cancel();
        }
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportHandle")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

async fn drive(
    id: u64,
    attempt: BoxFuture<'static, Result<Connection>>,
    connect_timeout: Option<Duration>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    // The owner may be gone already, in which case nobody is listening.
    let report = |kind| {
        let _ = events.send(TransportEvent { id, kind });
    };

    let attempt = async {
        match connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, attempt)
                .await
                .unwrap_or_else(|_| {
                    Err(Error::deadline_exceeded(format!(
                        "connection did not open within {:.1}s",
                        timeout.as_secs_f32()
                    )))
                }),
            None => attempt.await,
        }
    };

    let connection = tokio::select! {
        () = cancel.cancelled() => {
            report(TransportEventKind::Closed);
            return;
        }
        result = attempt => result,
    };

    match connection {
        Ok(Connection {
            mut sink,
            mut stream,
        }) => {
            report(TransportEventKind::Opened);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        match tokio::time::timeout(TransportHandle::CLOSE_TIMEOUT, sink.close()).await {
                            Ok(Err(e)) => debug!("error closing connection {id}: {e}"),
                            Err(_) => debug!("connection {id} did not close in time"),
                            Ok(Ok(())) => {}
                        }
                        break;
                    }

                    Some(text) = outbound.recv() => {
                        trace!("sending frame: {text}");
                        if let Err(e) = sink.send(text).await {
                            report(TransportEventKind::Failed(e));
                            break;
                        }
                    }

                    frame = stream.next() => match frame {
                        Some(Ok(text)) => report(TransportEventKind::Frame(text)),
                        Some(Err(e)) => {
                            report(TransportEventKind::Failed(e));
                            break;
                        }
                        None => break,
                    },
                }
            }
        }
        Err(e) => report(TransportEventKind::Failed(e)),
    }

    report(TransportEventKind::Closed);
}
