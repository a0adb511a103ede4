//! Reconnect state machine.
//!
//! The controller owns the connection: at most one [`TransportHandle`] or one
//! pending retry, never both. It runs as a single task that handles requests
//! from the client, events from the live handle and the retry timer one at a
//! time, so no transition can interleave with another.
//!
//! ```text
//! Idle ──start──▶ Connecting ──opened──▶ Connected
//!                    ▲   │                   │
//!                    │   └──────closed───────┤
//!                 retry                      ▼
//!                    └────────────────── Disconnected
//! ```
//!
//! `stop` returns to `Idle` from any state. A `start` to the target that is
//! already connecting or connected is a no-op.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, oneshot},
    time::Instant,
};

use crate::{
    config::Config,
    dispatch,
    error::Result,
    protocol::{Command, Inbound},
    state::{ConnectionStatus, StateKey, StateValue, TrackInfo},
    store::StateStore,
    target::ConnectionTarget,
    transport::{Connector, TransportEvent, TransportEventKind, TransportHandle},
};

/// Requests from the client to the controller task.
#[derive(Debug)]
pub enum Request {
    Start(ConnectionTarget),
    Stop(oneshot::Sender<()>),
    Send(Command, oneshot::Sender<Result<()>>),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Debug)]
struct Retry {
    deadline: Instant,
    target: ConnectionTarget,
}

pub struct Controller {
    connector: Arc<dyn Connector>,
    store: Arc<StateStore>,

    retry_interval: Duration,
    connect_timeout: Option<Duration>,

    phase: Phase,
    handle: Option<TransportHandle>,
    retry: Option<Retry>,

    next_id: u64,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
}

impl Controller {
    /// Spawns the controller task and returns the channel to send it requests.
    ///
    /// The task ends, closing any connection, when all senders are dropped.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    pub fn spawn(
        connector: Arc<dyn Connector>,
        store: Arc<StateStore>,
        config: &Config,
    ) -> mpsc::UnboundedSender<Request> {
        let (requests_tx, requests) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();

        let controller = Self {
            connector,
            store,
            retry_interval: config.retry_interval,
            connect_timeout: config.connect_timeout,
            phase: Phase::Idle,
            handle: None,
            retry: None,
            next_id: 0,
            events_tx,
        };

        tokio::spawn(controller.run(requests, events));
        requests_tx
    }

    async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<Request>,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        let retry_timer = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(retry_timer);

        loop {
            // Re-armed on every turn, so a retry cancelled by the previous
            // turn can never fire.
            let deadline = self.retry.as_ref().map(|retry| retry.deadline);
            if let Some(deadline) = deadline {
                retry_timer.as_mut().reset(deadline);
            }

            tokio::select! {
                biased;

                request = requests.recv() => match request {
                    Some(request) => self.handle_request(request),
                    None => break,
                },

                Some(event) = events.recv() => self.handle_event(event),

                () = &mut retry_timer, if deadline.is_some() => self.handle_retry(),
            }
        }

        debug!("client dropped, shutting down connection");
        self.stop();
    }

    fn handle_request(&mut self, request: Request) {
        match request {
            Request::Start(target) => self.start(target),
            Request::Stop(done) => {
                self.stop();
                let _ = done.send(());
            }
            Request::Send(command, result) => {
                let sent = dispatch::dispatch(self.status(), self.handle.as_ref(), command);
                if let Err(ref e) = sent {
                    error!("{e}");
                }
                let _ = result.send(sent);
            }
        }
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        match self.phase {
            Phase::Idle | Phase::Disconnected => ConnectionStatus::Disconnected,
            Phase::Connecting => ConnectionStatus::Connecting,
            Phase::Connected => ConnectionStatus::Connected,
        }
    }

    fn start(&mut self, target: ConnectionTarget) {
        if let Some(handle) = &self.handle {
            if handle.target() == &target {
                debug!("already {} to {target}", self.status());
                return;
            }
        }

        self.cancel_retry();
        self.close_handle();
        self.open(target);
    }

    fn stop(&mut self) {
        self.cancel_retry();
        self.close_handle();

        let was_live = matches!(self.phase, Phase::Connecting | Phase::Connected);
        if self.phase != Phase::Idle {
            info!("stopped");
        }
        self.phase = Phase::Idle;

        if was_live {
            self.publish(ConnectionStatus::Disconnected);
        }
    }

    fn open(&mut self, target: ConnectionTarget) {
        debug_assert!(self.retry.is_none() && self.handle.is_none());

        let id = self.next_id;
        self.next_id += 1;

        info!("connecting to ws://{target}");
        self.handle = Some(TransportHandle::open(
            id,
            target,
            &self.connector,
            self.connect_timeout,
            self.events_tx.clone(),
        ));
        self.phase = Phase::Connecting;
        self.publish(ConnectionStatus::Connecting);
    }

    fn handle_event(&mut self, event: TransportEvent) {
        let Some(handle) = self.handle.as_mut().filter(|handle| handle.id() == event.id) else {
            trace!("ignoring {:?} from stale connection {}", event.kind, event.id);
            return;
        };

        match event.kind {
            TransportEventKind::Opened => {
                handle.mark_open();
                info!("connected to {}", handle.target());
                self.phase = Phase::Connected;
                self.publish(ConnectionStatus::Connected);
            }
            TransportEventKind::Frame(text) => self.handle_frame(&text),
            TransportEventKind::Failed(e) => warn!("connection to {}: {e}", handle.target()),
            TransportEventKind::Closed => {
                if let Some(handle) = self.handle.take() {
                    self.disconnected(handle.target().clone());
                }
            }
        }
    }

    fn handle_frame(&self, text: &str) {
        match Inbound::parse(text) {
            Ok(inbound) => {
                let previous = match self.store.get(StateKey::Track) {
                    Some(StateValue::Track(track)) => Some(track),
                    _ => None,
                };
                let track: TrackInfo = inbound.apply(previous);
                self.store.update(track);
            }
            Err(e) => error!("protocol error: {e}"),
        }
    }

    fn disconnected(&mut self, target: ConnectionTarget) {
        self.phase = Phase::Disconnected;
        self.publish(ConnectionStatus::Disconnected);

        info!(
            "disconnected from {target}; reconnecting in {:.1}s",
            self.retry_interval.as_secs_f32()
        );
        self.retry = Some(Retry {
            deadline: Instant::now() + self.retry_interval,
            target,
        });
    }

    fn handle_retry(&mut self) {
        if let Some(Retry { target, .. }) = self.retry.take() {
            info!("attempting to reconnect to {target}");
            self.open(target);
        }
    }

    fn cancel_retry(&mut self) {
        if let Some(retry) = self.retry.take() {
            debug!("cancelled reconnect to {}", retry.target);
        }
    }

    fn close_handle(&mut self) {
        // Events still in flight from this handle are ignored by id.
        if let Some(mut handle) = self.handle.take() {
            handle.close();
        }
    }

    fn publish(&self, status: ConnectionStatus) {
        self.store.update(status);
    }
}
