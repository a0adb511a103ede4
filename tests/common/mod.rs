//! Shared fixtures: an in-memory media server peer and an observer recorder.

#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use futures_util::{future::BoxFuture, sink, stream, FutureExt};
use tokio::sync::{mpsc, oneshot};

use desklink::{
    config::Config,
    error::{Error, Result},
    remote::Client,
    state::{ConnectionStatus, StateKey, StateValue, TrackInfo},
    target::ConnectionTarget,
    transport::{Connection, Connector},
};

/// Counts connections that are open on the client side.
struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn new(live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(live))
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct MockConnector {
    peers: mpsc::UnboundedSender<MockPeer>,
    live: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockPeer>, Arc<AtomicUsize>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let live = Arc::new(AtomicUsize::new(0));
        let connector = Self {
            peers,
            live: Arc::clone(&live),
        };
        (connector, rx, live)
    }
}

impl Connector for MockConnector {
    fn connect(&self, target: &ConnectionTarget) -> BoxFuture<'static, Result<Connection>> {
        let (accept, accepted) = oneshot::channel();
        let (to_client, client_rx) = mpsc::unbounded_channel();
        let (client_tx, from_client) = mpsc::unbounded_channel();

        let _ = self.peers.send(MockPeer {
            target: target.clone(),
            accept: Some(accept),
            to_client: Some(to_client),
            from_client,
        });

        let live = Arc::clone(&self.live);
        async move {
            accepted
                .await
                .map_err(|_| Error::unavailable("peer went away"))??;

            let guard = LiveGuard::new(&live);
            let sink = sink::unfold((client_tx, guard), |(tx, guard), text: String| async move {
                tx.send(text).map_err(|_| Error::aborted("peer hung up"))?;
                Ok::<_, Error>((tx, guard))
            });
            let stream = stream::unfold(client_rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            });

            Ok::<_, Error>(Connection {
                sink: Box::pin(sink),
                stream: Box::pin(stream),
            })
        }
        .boxed()
    }
}

/// Server side of one connection attempt.
pub struct MockPeer {
    pub target: ConnectionTarget,
    accept: Option<oneshot::Sender<Result<()>>>,
    to_client: Option<mpsc::UnboundedSender<Result<String>>>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl MockPeer {
    pub fn accept(&mut self) {
        if let Some(accept) = self.accept.take() {
            let _ = accept.send(Ok(()));
        }
    }

    pub fn refuse(&mut self) {
        if let Some(accept) = self.accept.take() {
            let _ = accept.send(Err(Error::unavailable("connection refused")));
        }
    }

    pub fn push(&self, frame: &str) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(Ok(frame.to_owned()));
        }
    }

    /// Closes the connection from the server side.
    pub fn close(&mut self) {
        self.to_client = None;
    }

    pub fn try_recv(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }
}

pub struct Fixture {
    pub client: Client,
    pub peers: mpsc::UnboundedReceiver<MockPeer>,
    pub live: Arc<AtomicUsize>,
    pub updates: mpsc::UnboundedReceiver<(StateKey, StateValue)>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let (connector, peers, live) = MockConnector::new();
        let client = Client::with_connector(config, connector).unwrap();

        let (updates_tx, updates) = mpsc::unbounded_channel();
        let _subscription = client.subscribe(move |key, value| {
            let _ = updates_tx.send((key, value.clone()));
        });

        Self {
            client,
            peers,
            live,
            updates,
        }
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Starts and completes a connection, consuming its status updates.
    pub async fn connected(&mut self) -> MockPeer {
        self.client.start(target());
        let mut peer = self.peers.recv().await.unwrap();
        peer.accept();
        self.expect_status(ConnectionStatus::Connecting).await;
        self.expect_status(ConnectionStatus::Connected).await;
        peer
    }

    pub async fn expect_status(&mut self, status: ConnectionStatus) {
        let update = self.updates.recv().await.unwrap();
        assert_eq!(
            update,
            (StateKey::Connection, StateValue::Connection(status)),
            "expected {status}"
        );
    }

    pub async fn expect_track(&mut self) -> TrackInfo {
        match self.updates.recv().await.unwrap() {
            (StateKey::Track, StateValue::Track(track)) => track,
            other => panic!("expected track update, got {other:?}"),
        }
    }

    pub fn no_attempt(&mut self) -> bool {
        self.peers.try_recv().is_err()
    }
}

pub fn target() -> ConnectionTarget {
    ConnectionTarget::new("192.168.1.10", "5992").unwrap()
}

/// Lets the client's tasks run until they are idle.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

pub const RETRY: Duration = Duration::from_millis(5_000);
