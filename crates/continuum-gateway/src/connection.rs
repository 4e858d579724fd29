//! Gateway connection state machine.
//!
//! One task owns the connection and drives it from `Connecting` through
//! the `Hello`/`Identify` handshake to `Connected`, where dispatch events
//! go to the [`DispatchRouter`]. Any transport close or error tears the
//! session down and the loop starts again from `Connecting`.

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use continuum_core::{Clock, DurableKv, ScopedKv, StorageError};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;

use crate::{
    config::GatewayConfig,
    dispatch::{DispatchRouter, SessionHandler},
    heartbeat::HeartbeatScheduler,
    protocol::{GatewayFrame, Hello, OpCode},
    sequence::SequenceTracker,
    transport::{Connector, Transport, TransportError},
};

/// Key prefix for the sequence tracker.
pub const STATE_PREFIX: &str = "state_";
/// Key prefix for the heartbeat schedule.
pub const HEARTBEAT_PREFIX: &str = "heartbeat_";

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    AwaitingHello,
    Identified,
    Connected,
    Closing,
}

/// Gateway error.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// How a transport session ended.
enum SessionEnd {
    Closed(String),
    Shutdown,
}

enum Wake {
    Shutdown,
    HeartbeatDue,
    Frame(Option<Result<String, TransportError>>),
}

async fn sleep_or_pending(wait: Option<Duration>) {
    match wait {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

async fn send_frame(
    transport: &mut Box<dyn Transport>,
    frame: &GatewayFrame,
) -> Result<(), TransportError> {
    let text = serde_json::to_string(frame).map_err(|e| TransportError::Send(e.to_string()))?;
    transport.send(text).await
}

/// Persistent connection to the gateway.
pub struct GatewayConnection<C, H> {
    config: GatewayConfig,
    connector: C,
    router: DispatchRouter<H>,
    sequence: SequenceTracker,
    heartbeat: HeartbeatScheduler,
    heartbeat_acked: bool,
    state_tx: watch::Sender<ConnectionState>,
}

impl<C, H> GatewayConnection<C, H>
where
    C: Connector,
    H: SessionHandler,
{
    /// Create a connection, restoring persisted state from `kv`.
    ///
    /// The last sequence number carries over to the next session. A
    /// restored heartbeat schedule belongs to the socket that armed it, so
    /// it is not used to send heartbeats: every new transport waits for its
    /// own `Hello`, which re-arms the schedule.
    ///
    /// # Errors
    /// Returns error if the persisted state cannot be read.
    pub async fn new(
        config: GatewayConfig,
        connector: C,
        handler: H,
        kv: Arc<dyn DurableKv>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, GatewayError> {
        let sequence = SequenceTracker::load(ScopedKv::new(Arc::clone(&kv), STATE_PREFIX)).await?;
        let heartbeat = HeartbeatScheduler::load(ScopedKv::new(kv, HEARTBEAT_PREFIX), clock).await?;
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        if let Some(seq) = sequence.last() {
            tracing::info!(seq, "restored last gateway sequence");
        }
        if let Some(interval) = heartbeat.interval_ms() {
            tracing::debug!(interval, "stale heartbeat schedule will be replaced by the next Hello");
        }

        Ok(Self {
            config,
            connector,
            router: DispatchRouter::new(handler),
            sequence,
            heartbeat,
            heartbeat_acked: false,
            state_tx,
        })
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Watch state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Last observed dispatch sequence number.
    #[must_use]
    pub const fn last_sequence(&self) -> Option<u64> {
        self.sequence.last()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::debug!(?previous, ?state, "gateway state changed");
        }
    }

    /// Run until `shutdown` resolves, reconnecting after every close.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);
        let mut attempt: u32 = 0;

        loop {
            self.set_state(ConnectionState::Connecting);

            let connected = tokio::select! {
                () = &mut shutdown => None,
                result = self.connector.connect() => Some(result),
            };

            let end = match connected {
                None => SessionEnd::Shutdown,
                Some(Ok(transport)) => self.drive(transport, shutdown.as_mut(), &mut attempt).await,
                Some(Err(e)) => SessionEnd::Closed(e.to_string()),
            };

            self.teardown().await;

            let reason = match end {
                SessionEnd::Shutdown => {
                    tracing::info!("gateway connection shut down");
                    return;
                }
                SessionEnd::Closed(reason) => reason,
            };

            attempt = attempt.saturating_add(1);
            let delay = self.config.reconnect.delay_for(attempt);
            tracing::warn!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                %reason,
                "gateway disconnected; reconnecting"
            );

            if !delay.is_zero() {
                tokio::select! {
                    () = &mut shutdown => {
                        tracing::info!("gateway connection shut down");
                        return;
                    }
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    async fn teardown(&mut self) {
        self.heartbeat_acked = false;
        if let Err(e) = self.heartbeat.disarm().await {
            tracing::error!(error = %e, "failed to clear heartbeat schedule");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Heartbeat deadline, only while connected.
    fn heartbeat_wait(&self) -> Option<Duration> {
        if self.state() == ConnectionState::Connected {
            self.heartbeat.time_until_due()
        } else {
            None
        }
    }

    async fn drive<F>(
        &mut self,
        mut transport: Box<dyn Transport>,
        mut shutdown: Pin<&mut F>,
        attempt: &mut u32,
    ) -> SessionEnd
    where
        F: Future<Output = ()> + Send,
    {
        self.set_state(ConnectionState::AwaitingHello);

        loop {
            let wait = self.heartbeat_wait();
            let wake = tokio::select! {
                () = &mut shutdown => Wake::Shutdown,
                () = sleep_or_pending(wait) => Wake::HeartbeatDue,
                frame = transport.recv() => Wake::Frame(frame),
            };

            match wake {
                Wake::Shutdown => {
                    self.set_state(ConnectionState::Closing);
                    transport.close().await;
                    return SessionEnd::Shutdown;
                }
                Wake::HeartbeatDue => {
                    if self.config.require_heartbeat_ack && !self.heartbeat_acked {
                        transport.close().await;
                        return SessionEnd::Closed("heartbeat not acknowledged".into());
                    }
                    if let Err(e) = self.send_heartbeat(&mut transport).await {
                        return SessionEnd::Closed(e.to_string());
                    }
                }
                Wake::Frame(None) => return SessionEnd::Closed("transport closed".into()),
                Wake::Frame(Some(Err(e))) => return SessionEnd::Closed(e.to_string()),
                Wake::Frame(Some(Ok(text))) => {
                    if let Some(end) = self.handle_frame(&mut transport, &text, attempt).await {
                        transport.close().await;
                        return end;
                    }
                }
            }
        }
    }

    async fn send_heartbeat(
        &mut self,
        transport: &mut Box<dyn Transport>,
    ) -> Result<(), TransportError> {
        send_frame(transport, &GatewayFrame::heartbeat(self.sequence.last())).await?;
        self.heartbeat_acked = false;
        tracing::trace!(seq = ?self.sequence.last(), "heartbeat sent");
        if let Err(e) = self.heartbeat.record_sent().await {
            tracing::error!(error = %e, "failed to persist heartbeat schedule");
        }
        Ok(())
    }

    /// Process one inbound frame. Returns `Some` when the session must end.
    async fn handle_frame(
        &mut self,
        transport: &mut Box<dyn Transport>,
        text: &str,
        attempt: &mut u32,
    ) -> Option<SessionEnd> {
        let frame: GatewayFrame = match serde_json::from_str(text) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(error = %e, "dropping unparseable gateway frame");
                return None;
            }
        };

        match frame.opcode() {
            Some(OpCode::Hello) => {
                let result = self.on_hello(transport, frame).await;
                if self.state() == ConnectionState::Connected {
                    *attempt = 0;
                }
                result.err()
            }
            Some(OpCode::Dispatch) => {
                self.on_dispatch(frame).await;
                None
            }
            Some(OpCode::HeartbeatAck) => {
                self.heartbeat_acked = true;
                tracing::trace!("heartbeat acknowledged");
                None
            }
            Some(OpCode::Heartbeat) => {
                tracing::debug!("server requested a heartbeat");
                let frame = GatewayFrame::heartbeat(self.sequence.last());
                send_frame(transport, &frame)
                    .await
                    .err()
                    .map(|e| SessionEnd::Closed(e.to_string()))
            }
            Some(OpCode::Reconnect) => {
                tracing::info!("server requested reconnect");
                Some(SessionEnd::Closed("server requested reconnect".into()))
            }
            Some(OpCode::InvalidSession) => {
                tracing::warn!("server invalidated the session");
                Some(SessionEnd::Closed("invalid session".into()))
            }
            Some(OpCode::Identify) | None => {
                tracing::warn!(op = frame.op, "dropping frame with unexpected opcode");
                None
            }
        }
    }

    async fn on_hello(
        &mut self,
        transport: &mut Box<dyn Transport>,
        frame: GatewayFrame,
    ) -> Result<(), SessionEnd> {
        if self.state() != ConnectionState::AwaitingHello {
            tracing::warn!(state = ?self.state(), "dropping unexpected Hello");
            return Ok(());
        }

        let hello: Hello = match serde_json::from_value(frame.d) {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed Hello");
                return Ok(());
            }
        };
        if hello.heartbeat_interval == 0 {
            tracing::warn!("dropping Hello with a zero heartbeat interval");
            return Ok(());
        }

        self.set_state(ConnectionState::Identified);
        if let Err(e) = self.heartbeat.arm(hello.heartbeat_interval).await {
            tracing::error!(error = %e, "failed to persist heartbeat schedule");
        }

        let identify = GatewayFrame::identify(
            &self.config.token,
            self.config.intents,
            &self.config.properties,
        );
        send_frame(transport, &identify)
            .await
            .map_err(|e| SessionEnd::Closed(e.to_string()))?;

        self.set_state(ConnectionState::Connected);
        tracing::info!(
            heartbeat_interval_ms = hello.heartbeat_interval,
            "gateway identified"
        );

        self.send_heartbeat(transport)
            .await
            .map_err(|e| SessionEnd::Closed(e.to_string()))
    }

    async fn on_dispatch(&mut self, frame: GatewayFrame) {
        if self.state() != ConnectionState::Connected {
            tracing::warn!(state = ?self.state(), "dropping dispatch before identify");
            return;
        }

        if let Err(e) = self.sequence.observe(frame.s).await {
            tracing::error!(error = %e, "failed to persist gateway sequence");
        }

        match frame.t {
            Some(event_type) => {
                self.router.route(&event_type, &frame.d);
            }
            None => tracing::warn!("dropping dispatch without event type"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use async_trait::async_trait;
    use continuum_store::MemoryKv;
    use serde_json::{Value, json};
    use tokio::{
        sync::{mpsc, oneshot},
        task::JoinHandle,
        time::Instant,
    };

    use super::*;
    use crate::{config::ReconnectPolicy, dispatch::DirectMessage};

    struct MockTransport {
        inbound: mpsc::UnboundedReceiver<String>,
        outbound: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, text: String) -> Result<(), TransportError> {
            self.outbound.send(text).map_err(|_| TransportError::Closed)
        }

        async fn recv(&mut self) -> Option<Result<String, TransportError>> {
            self.inbound.recv().await.map(Ok)
        }

        async fn close(&mut self) {}
    }

    /// Server side of one mock session. Dropping it closes the transport.
    struct ServerEnd {
        to_client: mpsc::UnboundedSender<String>,
        from_client: mpsc::UnboundedReceiver<String>,
    }

    impl ServerEnd {
        fn send(&self, frame: &Value) {
            self.send_raw(&frame.to_string());
        }

        fn send_raw(&self, text: &str) {
            self.to_client.send(text.to_string()).unwrap();
        }

        fn hello(&self, interval_ms: u64) {
            self.send(&json!({"op": 10, "d": {"heartbeat_interval": interval_ms}}));
        }

        async fn next_frame(&mut self) -> Value {
            let text = self.from_client.recv().await.unwrap();
            serde_json::from_str(&text).unwrap()
        }

        /// Consume identify + first heartbeat.
        async fn complete_handshake(&mut self, interval_ms: u64) {
            self.hello(interval_ms);
            assert_eq!(self.next_frame().await["op"], 2);
            assert_eq!(self.next_frame().await["op"], 1);
        }

        fn drain(&mut self) -> Vec<Value> {
            let mut frames = Vec::new();
            while let Ok(text) = self.from_client.try_recv() {
                frames.push(serde_json::from_str(&text).unwrap());
            }
            frames
        }
    }

    fn session() -> (MockTransport, ServerEnd) {
        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        (
            MockTransport { inbound, outbound },
            ServerEnd {
                to_client,
                from_client,
            },
        )
    }

    #[derive(Default)]
    struct MockConnector {
        queue: Mutex<VecDeque<Result<MockTransport, TransportError>>>,
        attempts: AtomicUsize,
    }

    impl MockConnector {
        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let next = self.queue.lock().unwrap().pop_front();
            match next {
                Some(Ok(transport)) => Ok(Box::new(transport)),
                Some(Err(e)) => Err(e),
                // Nothing scripted: behave like an endpoint that never answers.
                None => std::future::pending().await,
            }
        }
    }

    /// Wall clock driven by tokio time, so paused tests stay consistent.
    struct TokioClock {
        origin: Instant,
    }

    impl Clock for TokioClock {
        fn now_ms(&self) -> u64 {
            1_700_000_000_000 + u64::try_from(self.origin.elapsed().as_millis()).unwrap()
        }
    }

    type TestConnection =
        GatewayConnection<Arc<MockConnector>, mpsc::UnboundedSender<DirectMessage>>;

    struct Harness {
        kv: Arc<dyn DurableKv>,
        connector: Arc<MockConnector>,
        messages: mpsc::UnboundedReceiver<DirectMessage>,
        states: watch::Receiver<ConnectionState>,
        stop: oneshot::Sender<()>,
        task: JoinHandle<TestConnection>,
    }

    impl Harness {
        async fn start(config: GatewayConfig, script: Vec<Result<MockTransport, TransportError>>) -> Self {
            Self::start_with(Arc::new(MemoryKv::new()), config, script).await
        }

        async fn start_with(
            kv: Arc<dyn DurableKv>,
            config: GatewayConfig,
            script: Vec<Result<MockTransport, TransportError>>,
        ) -> Self {
            let connector = Arc::new(MockConnector {
                queue: Mutex::new(script.into()),
                attempts: AtomicUsize::new(0),
            });
            let (tx, messages) = mpsc::unbounded_channel();
            let clock = Arc::new(TokioClock {
                origin: Instant::now(),
            });

            let mut conn = GatewayConnection::new(config, Arc::clone(&connector), tx, Arc::clone(&kv), clock)
                .await
                .unwrap();
            let states = conn.subscribe();
            let (stop, stopped) = oneshot::channel::<()>();
            let task = tokio::spawn(async move {
                conn.run(async move {
                    let _ = stopped.await;
                })
                .await;
                conn
            });

            Self {
                kv,
                connector,
                messages,
                states,
                stop,
                task,
            }
        }

        async fn wait_for(&mut self, state: ConnectionState) {
            self.states.wait_for(|s| *s == state).await.unwrap();
        }

        async fn shutdown(self) -> TestConnection {
            let _ = self.stop.send(());
            self.task.await.unwrap()
        }
    }

    fn config() -> GatewayConfig {
        GatewayConfig::new("test-token").with_reconnect(ReconnectPolicy::immediate())
    }

    fn dm_frame(seq: Option<u64>, content: &str) -> Value {
        json!({
            "op": 0,
            "t": "MESSAGE_CREATE",
            "s": seq,
            "d": {
                "id": "m1",
                "channel_id": "c1",
                "author": {"id": "u1"},
                "content": content,
            },
        })
    }

    #[tokio::test]
    async fn test_hello_triggers_identify_then_heartbeat() {
        let (transport, mut server) = session();
        let mut h = Harness::start(config(), vec![Ok(transport)]).await;

        server.hello(45_000);
        let identify = server.next_frame().await;
        assert_eq!(identify["op"], 2);
        assert_eq!(identify["d"]["token"], "test-token");
        assert_eq!(identify["d"]["intents"], 36864);

        let heartbeat = server.next_frame().await;
        assert_eq!(heartbeat, json!({"op": 1, "d": 0}));

        h.wait_for(ConnectionState::Connected).await;
        assert_eq!(h.kv.get("heartbeat_interval_ms").await.unwrap(), Some(json!(45_000)));

        let conn = h.shutdown().await;
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_sequence_tracks_highest_non_null_value() {
        let (transport, mut server) = session();
        let mut h = Harness::start(config(), vec![Ok(transport)]).await;
        server.complete_handshake(45_000).await;

        server.send(&json!({"op": 0, "t": "READY", "s": 1, "d": {}}));
        server.send(&json!({"op": 0, "t": "TYPING_START", "s": null, "d": {}}));
        server.send(&json!({"op": 0, "t": "CHANNEL_UPDATE", "s": 4, "d": {}}));
        server.send(&json!({"op": 0, "t": "CHANNEL_UPDATE", "s": 2, "d": {}}));
        server.send(&dm_frame(None, "hello there"));

        let message = h.messages.recv().await.unwrap();
        assert_eq!(message.content, "hello there");
        assert_eq!(h.kv.get("state_seq").await.unwrap(), Some(json!(4)));

        let conn = h.shutdown().await;
        assert_eq!(conn.last_sequence(), Some(4));
    }

    #[tokio::test]
    async fn test_heartbeats_carry_last_sequence() {
        let (transport, mut server) = session();
        let _h = Harness::start(config(), vec![Ok(transport)]).await;
        server.complete_handshake(45_000).await;

        server.send(&dm_frame(Some(12), "hi"));
        server.send(&json!({"op": 1, "d": null}));

        assert_eq!(server.next_frame().await, json!({"op": 1, "d": 12}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_sent_once_per_interval() {
        let (transport, mut server) = session();
        let _h = Harness::start(config(), vec![Ok(transport)]).await;
        server.complete_handshake(1_000).await;

        tokio::time::sleep(Duration::from_millis(3_500)).await;

        let beats = server
            .drain()
            .into_iter()
            .filter(|frame| frame["op"] == 1)
            .count();
        assert!((3..=4).contains(&beats), "expected ~3 heartbeats, got {beats}");
    }

    #[tokio::test]
    async fn test_reconnect_converges_after_failures() {
        let (t1, mut server1) = session();
        let (t2, mut server2) = session();
        let script = vec![
            Err(TransportError::Connect("refused".into())),
            Err(TransportError::Connect("refused".into())),
            Ok(t1),
            Err(TransportError::Discovery("HTTP 503".into())),
            Ok(t2),
        ];
        let mut h = Harness::start(config(), script).await;

        server1.complete_handshake(45_000).await;
        drop(server1);

        server2.complete_handshake(45_000).await;
        h.wait_for(ConnectionState::Connected).await;
        assert_eq!(h.connector.attempts(), 5);

        // The new session still routes messages.
        server2.send(&dm_frame(Some(3), "after reconnect"));
        assert_eq!(h.messages.recv().await.unwrap().content, "after reconnect");
    }

    #[tokio::test]
    async fn test_sequence_survives_reconnect() {
        let (t1, mut server1) = session();
        let (t2, mut server2) = session();
        let h = Harness::start(config(), vec![Ok(t1), Ok(t2)]).await;

        server1.complete_handshake(45_000).await;
        server1.send(&dm_frame(Some(8), "first"));
        server1.send(&json!({"op": 7, "d": null}));

        server2.hello(45_000);
        assert_eq!(server2.next_frame().await["op"], 2);
        assert_eq!(server2.next_frame().await, json!({"op": 1, "d": 8}));

        let conn = h.shutdown().await;
        assert_eq!(conn.last_sequence(), Some(8));
    }

    #[tokio::test]
    async fn test_protocol_violations_are_dropped() {
        let (transport, mut server) = session();
        let mut h = Harness::start(config(), vec![Ok(transport)]).await;

        // Dispatch before the handshake is ignored.
        server.send(&dm_frame(Some(1), "too early"));
        server.complete_handshake(45_000).await;

        server.send_raw("{not json");
        server.send(&json!({"op": 42, "d": null}));
        server.hello(10);
        server.send(&dm_frame(Some(2), "on time"));

        assert_eq!(h.messages.recv().await.unwrap().content, "on time");
        assert!(h.messages.try_recv().is_err());
        assert_eq!(h.connector.attempts(), 1);
        assert_eq!(*h.states.borrow(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unacknowledged_heartbeat_forces_reconnect() {
        let mut cfg = config();
        cfg.require_heartbeat_ack = true;
        let (t1, mut server1) = session();
        let (t2, mut server2) = session();
        let h = Harness::start(cfg, vec![Ok(t1), Ok(t2)]).await;

        server1.complete_handshake(1_000).await;
        // No ack; the next due heartbeat tears the session down.
        server2.complete_handshake(1_000).await;
        assert_eq!(h.connector.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acknowledged_heartbeats_keep_session() {
        let mut cfg = config();
        cfg.require_heartbeat_ack = true;
        let (transport, mut server) = session();
        let h = Harness::start(cfg, vec![Ok(transport)]).await;

        server.complete_handshake(1_000).await;
        server.send(&json!({"op": 11}));
        for _ in 0..3 {
            assert_eq!(server.next_frame().await["op"], 1);
            server.send(&json!({"op": 11}));
        }
        assert_eq!(h.connector.attempts(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_while_connecting() {
        let mut h = Harness::start(config(), Vec::new()).await;
        h.wait_for(ConnectionState::Connecting).await;

        let conn = h.shutdown().await;
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_heartbeat_interval_is_rejected() {
        let (transport, mut server) = session();
        let mut h = Harness::start(config(), vec![Ok(transport)]).await;

        server.hello(0);
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
        assert!(server.drain().is_empty());
        assert_eq!(*h.states.borrow(), ConnectionState::AwaitingHello);

        // A well-formed Hello on the same socket still completes the handshake.
        server.complete_handshake(1_000).await;
        h.wait_for(ConnectionState::Connected).await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(server.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restored_schedule_waits_for_hello() {
        let kv: Arc<dyn DurableKv> = Arc::new(MemoryKv::new());
        kv.put("heartbeat_interval_ms", json!(1_000)).await.unwrap();
        kv.put("heartbeat_due_at_ms", json!(0)).await.unwrap();

        let (transport, mut server) = session();
        let mut h = Harness::start_with(Arc::clone(&kv), config(), vec![Ok(transport)]).await;
        h.wait_for(ConnectionState::AwaitingHello).await;

        // The overdue schedule from the previous socket sends nothing.
        tokio::time::sleep(Duration::from_millis(5_000)).await;
        assert!(server.drain().is_empty());

        server.complete_handshake(45_000).await;
        assert_eq!(kv.get("heartbeat_interval_ms").await.unwrap(), Some(json!(45_000)));
    }
}
