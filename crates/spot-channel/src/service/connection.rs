//! Connection manager: the single shared connection and its lifecycle.
//!
//! This is the only component that opens or closes the underlying transport.
//! State transitions are decided by [`LinkMachine`]; this module applies them
//! (spawning connect attempts and reconnect timers) and publishes the
//! resulting [`LinkState`] on a watch channel.

use crate::adapters::pending::PendingRequests;
use crate::domain::backoff::{CloseKind, LinkMachine, LinkState};
use crate::domain::config::ChannelConfig;
use crate::domain::error::{ChannelError, ChannelResult};
use crate::ports::transport::{CloseFrame, Connector, Frame, TransportHandle};
use crate::service::correlator::route_message;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

/// Result of one connect attempt, shared by every caller waiting on it.
type ConnectAttempt = Shared<BoxFuture<'static, ChannelResult<Arc<Connection>>>>;

/// One physical connection. Superseded connections are discarded, never
/// reused.
///
/// Closing drops the outbound sender, so the transport sees the channel end
/// even when there is no room left for a close frame.
#[derive(Debug)]
pub struct Connection {
    generation: u64,
    outbound: Mutex<Option<mpsc::Sender<Frame>>>,
    closed: watch::Sender<bool>,
}

impl Connection {
    fn new(generation: u64, outbound: mpsc::Sender<Frame>) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            generation,
            outbound: Mutex::new(Some(outbound)),
            closed,
        }
    }

    /// Monotonic number of this connection within its manager.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_open(&self) -> bool {
        if *self.closed.borrow() {
            return false;
        }
        self.outbound
            .lock()
            .as_ref()
            .is_some_and(|outbound| !outbound.is_closed())
    }

    /// Enqueue a text frame without waiting. Fails if the connection is closed
    /// or the writer has fallen behind.
    pub fn send_text(&self, text: String) -> ChannelResult<()> {
        let guard = self.outbound.lock();
        let Some(outbound) = guard.as_ref() else {
            return Err(ChannelError::SendFailed("connection closed".into()));
        };
        outbound.try_send(Frame::Text(text)).map_err(|e| match e {
            TrySendError::Full(_) => ChannelError::SendFailed("outbound buffer full".into()),
            TrySendError::Closed(_) => ChannelError::SendFailed("connection closed".into()),
        })
    }

    fn close(&self, frame: CloseFrame) {
        self.closed.send_replace(true);
        if let Some(outbound) = self.outbound.lock().take() {
            // A full buffer loses the frame; dropping the sender still ends the writer.
            if outbound.try_send(Frame::Close(Some(frame))).is_err() {
                debug!(generation = self.generation, "No room for close frame");
            }
        }
    }

    fn mark_closed(&self) {
        self.closed.send_replace(true);
        self.outbound.lock().take();
    }
}

struct InFlight {
    generation: u64,
    attempt: ConnectAttempt,
    abort: AbortHandle,
}

struct ManagerState {
    machine: LinkMachine,
    current: Option<Arc<Connection>>,
    in_flight: Option<InFlight>,
    backoff_task: Option<JoinHandle<()>>,
    next_generation: u64,
}

/// Owns the shared connection.
pub struct ConnectionManager {
    url: String,
    connect_timeout: Duration,
    connector: Arc<dyn Connector>,
    pending: Arc<PendingRequests>,
    unsolicited: broadcast::Sender<serde_json::Value>,
    state: Mutex<ManagerState>,
    link_tx: watch::Sender<LinkState>,
}

impl ConnectionManager {
    pub fn new(
        config: &ChannelConfig,
        connector: Arc<dyn Connector>,
        pending: Arc<PendingRequests>,
        unsolicited: broadcast::Sender<serde_json::Value>,
    ) -> Self {
        let machine = LinkMachine::new(config.reconnect);
        let (link_tx, _) = watch::channel(machine.state());

        Self {
            url: config.url.clone(),
            connect_timeout: config.timeouts.connect,
            connector,
            pending,
            unsolicited,
            state: Mutex::new(ManagerState {
                machine,
                current: None,
                in_flight: None,
                backoff_task: None,
                next_generation: 1,
            }),
            link_tx,
        }
    }

    /// Get a ready connection, opening one if needed.
    ///
    /// Concurrent callers share a single in-flight attempt. An attempt that is
    /// not open within the connect timeout fails with
    /// [`ChannelError::ConnectionTimeout`].
    pub async fn acquire(self: &Arc<Self>) -> ChannelResult<Arc<Connection>> {
        let attempt = {
            let mut state = self.state.lock();
            if state.machine.is_shut_down() {
                return Err(ChannelError::ShutDown);
            }
            if let Some(connection) = state.current.as_ref().filter(|c| c.is_open()) {
                return Ok(Arc::clone(connection));
            }
            match state.in_flight.as_ref() {
                Some(in_flight) => in_flight.attempt.clone(),
                None => self.begin_attempt(&mut state, false),
            }
        };
        attempt.await
    }

    /// Close the connection with a normal close frame, cancel any scheduled
    /// reconnect and refuse further acquisitions until [`restart`](Self::restart).
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.machine.shutdown();

        if let Some(task) = state.backoff_task.take() {
            task.abort();
        }
        if let Some(in_flight) = state.in_flight.take() {
            in_flight.abort.abort();
        }
        if let Some(connection) = state.current.take() {
            connection.close(CloseFrame::normal("client shutdown"));
            info!(generation = connection.generation(), "Connection closed by shutdown");
        }

        self.publish(&state);
    }

    /// Accept acquisitions again after a shutdown.
    pub fn restart(&self) {
        let mut state = self.state.lock();
        state.machine.restart();
        self.publish(&state);
    }

    pub fn link_state(&self) -> LinkState {
        *self.link_tx.borrow()
    }

    /// Follow link state changes.
    pub fn watch_link(&self) -> watch::Receiver<LinkState> {
        self.link_tx.subscribe()
    }

    /// Reconnects scheduled since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.state.lock().machine.reconnect_attempts()
    }

    /// The open connection, if any. Never starts an attempt.
    pub fn current(&self) -> Option<Arc<Connection>> {
        self.state
            .lock()
            .current
            .as_ref()
            .filter(|c| c.is_open())
            .cloned()
    }

    fn publish(&self, state: &ManagerState) {
        self.link_tx.send_replace(state.machine.state());
    }

    fn begin_attempt(self: &Arc<Self>, state: &mut ManagerState, reconnect: bool) -> ConnectAttempt {
        // An on-demand attempt supersedes a reconnect still waiting out its delay.
        if let Some(task) = state.backoff_task.take() {
            if !reconnect {
                task.abort();
            }
        }

        state.machine.begin_connect(reconnect);
        let generation = state.next_generation;
        state.next_generation += 1;

        let manager = Arc::clone(self);
        let task = tokio::spawn(async move { manager.run_attempt(generation).await });
        let abort = task.abort_handle();

        let attempt = async move {
            match task.await {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => Err(ChannelError::ShutDown),
                Err(e) => Err(ChannelError::Connection(format!("connect task failed: {}", e))),
            }
        }
        .boxed()
        .shared();

        state.in_flight = Some(InFlight {
            generation,
            attempt: attempt.clone(),
            abort,
        });
        self.publish(state);

        debug!(generation, reconnect, url = %self.url, "Started connect attempt");
        attempt
    }

    async fn run_attempt(self: Arc<Self>, generation: u64) -> ChannelResult<Arc<Connection>> {
        let result =
            match tokio::time::timeout(self.connect_timeout, self.connector.connect(&self.url)).await {
                Ok(result) => result,
                Err(_) => Err(ChannelError::ConnectionTimeout(self.connect_timeout)),
            };

        let mut state = self.state.lock();
        let is_current_attempt = state
            .in_flight
            .as_ref()
            .is_some_and(|in_flight| in_flight.generation == generation);

        if !is_current_attempt {
            if let Ok(handle) = result {
                let _ = handle
                    .outbound
                    .try_send(Frame::Close(Some(CloseFrame::normal("superseded"))));
            }
            return Err(if state.machine.is_shut_down() {
                ChannelError::ShutDown
            } else {
                ChannelError::Connection("connect attempt superseded".into())
            });
        }
        state.in_flight = None;

        match result {
            Ok(TransportHandle { outbound, inbound }) => {
                let connection = Arc::new(Connection::new(generation, outbound));
                state.current = Some(Arc::clone(&connection));
                state.machine.connected();
                self.publish(&state);

                tokio::spawn(read_loop(
                    Arc::downgrade(&self),
                    Arc::clone(&connection),
                    inbound,
                ));

                info!(generation, url = %self.url, "Connection open");
                Ok(connection)
            }
            Err(error) => {
                let was_reconnect = matches!(
                    state.machine.state(),
                    LinkState::Connecting { reconnect: true }
                );
                match state.machine.connect_failed() {
                    Some(delay) => {
                        warn!(generation, error = %error, "Reconnect attempt failed");
                        self.schedule_reconnect(&mut state, delay);
                    }
                    None if was_reconnect => {
                        warn!(
                            generation,
                            error = %error,
                            "Reconnect attempts exhausted, waiting for next query"
                        );
                    }
                    None => {
                        warn!(generation, error = %error, "Connect attempt failed");
                    }
                }
                self.publish(&state);
                Err(error)
            }
        }
    }

    fn on_closed(self: &Arc<Self>, connection: &Connection, close: Option<CloseFrame>) {
        let mut state = self.state.lock();
        let is_current = state
            .current
            .as_ref()
            .is_some_and(|c| c.generation() == connection.generation());
        if !is_current {
            debug!(
                generation = connection.generation(),
                "Ignoring close of superseded connection"
            );
            return;
        }
        state.current = None;

        let code = close.as_ref().map(|frame| frame.code);
        match state.machine.closed(CloseKind::from_code(code)) {
            Some(delay) => {
                warn!(
                    generation = connection.generation(),
                    code = ?code,
                    "Connection closed unexpectedly"
                );
                self.schedule_reconnect(&mut state, delay);
            }
            None => {
                info!(
                    generation = connection.generation(),
                    code = ?code,
                    "Connection closed"
                );
            }
        }
        self.publish(&state);
    }

    fn schedule_reconnect(self: &Arc<Self>, state: &mut ManagerState, delay: Duration) {
        info!(
            attempt = state.machine.reconnect_attempts(),
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect"
        );

        let manager = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(manager) = manager.upgrade() {
                manager.reconnect_now();
            }
        });
        if let Some(previous) = state.backoff_task.replace(task) {
            previous.abort();
        }
    }

    fn reconnect_now(self: &Arc<Self>) {
        let mut state = self.state.lock();
        state.backoff_task = None;

        let busy = state.in_flight.is_some() || state.current.as_ref().is_some_and(|c| c.is_open());
        if state.machine.is_shut_down() || busy {
            return;
        }
        // The spawned attempt runs whether or not anyone awaits it.
        let _ = self.begin_attempt(&mut state, true);
    }

    fn route(&self, text: &str) {
        route_message(&self.pending, &self.unsolicited, text);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(task) = state.backoff_task.take() {
            task.abort();
        }
        if let Some(connection) = state.current.take() {
            connection.close(CloseFrame::normal("client dropped"));
        }
    }
}

/// Feed inbound frames to the demultiplexer until the connection ends or is
/// closed locally, then report the close to the manager.
async fn read_loop(
    manager: Weak<ConnectionManager>,
    connection: Arc<Connection>,
    mut inbound: mpsc::Receiver<Frame>,
) {
    let mut closed = connection.closed.subscribe();
    let close = loop {
        tokio::select! {
            frame = inbound.recv() => match frame {
                Some(Frame::Text(text)) => match manager.upgrade() {
                    Some(owner) => owner.route(&text),
                    None => break None,
                },
                Some(Frame::Close(frame)) => break frame,
                None => break None,
            },
            _ = closed_locally(&mut closed) => break None,
        }
    };

    connection.mark_closed();
    if let Some(owner) = manager.upgrade() {
        owner.on_closed(&connection, close);
    }
}

async fn closed_locally(closed: &mut watch::Receiver<bool>) {
    while !*closed.borrow_and_update() {
        if closed.changed().await.is_err() {
            return;
        }
    }
}
