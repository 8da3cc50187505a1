//! Single outbound connection with fixed-delay reconnect.
//!
//! ## State machine
//!
//! ```text
//! Disconnected --connect()--> Connecting --handshake ok--> Open
//! Connecting/Open --transport failure--> Disconnected (+ one reconnect after the delay)
//! Connecting/Open --stop()--> Closing --> Disconnected (no reconnect)
//! ```
//!
//! Every transition happens while holding the `inner` mutex, which is the
//! only serialization point for the socket handle and the state. Callbacks
//! from spawned tasks (handshake, read monitor, reconnect timer) carry the
//! generation they were started for and are ignored once it is stale.
//!
//! The lock is never held across an unbounded wait: a write gives up after
//! the reconnect delay or as soon as `stop()` is called, and a handshake gives
//! up after `handshake_timeout`.

mod state;

use std::sync::Arc;

use tokio::{
    sync::{Mutex, Notify, broadcast, watch},
    task::JoinHandle,
};

use crate::{
    error::{SendError, TransportError},
    transport::{SocketReader, SocketWriter, Transport},
};

pub use state::{
    ConnectionConfig, ConnectionEvent, ConnectionState, DEFAULT_CLOSE_REASON,
    DEFAULT_CLOSE_TIMEOUT, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_RECONNECT_DELAY, SendResult,
};

const EVENT_CAPACITY: usize = 64;

/// Owner of the one live socket.
///
/// Cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

struct Shared {
    transport: Arc<dyn Transport>,
    config: ConnectionConfig,
    inner: Mutex<Inner>,
    /// Fired by `stop()` before it takes the lock, so a stalled write gives it up.
    interrupt: Notify,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: broadcast::Sender<ConnectionEvent>,
}

#[derive(Default)]
struct Inner {
    state: ConnectionState,
    writer: Option<Box<dyn SocketWriter>>,
    /// Bumped whenever the current socket or handshake is abandoned.
    generation: u64,
    attempts: u64,
    /// Set by `stop()`, cleared by `connect()`.
    stopped: bool,
    handshake: Option<JoinHandle<()>>,
    monitor: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn Transport>, config: ConnectionConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                transport,
                config,
                inner: Mutex::new(Inner::default()),
                interrupt: Notify::new(),
                state_tx,
                events_tx,
            }),
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    /// Watch state changes. Only the latest state is retained.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Lifecycle event stream.
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.events_tx.subscribe()
    }

    /// Start connecting unless already Connecting or Open.
    ///
    /// The handshake runs in the background; this returns once it is started.
    pub async fn connect(&self) {
        let mut inner = self.shared.inner.lock().await;
        inner.stopped = false;
        self.shared.begin_connect(&mut inner);
    }

    /// Send one text frame.
    ///
    /// Nothing is buffered: without an open socket the payload is dropped and
    /// `NotConnected` is returned. A rejected write, or one that does not
    /// finish within the reconnect delay, tears the socket down and schedules
    /// a reconnect. A write still pending when `stop()` is called is abandoned.
    pub async fn send(&self, payload: String) -> SendResult {
        let shared = &self.shared;
        let mut inner = shared.inner.lock().await;
        let interrupted = shared.interrupt.notified();
        if inner.state != ConnectionState::Open {
            return SendResult::Failed(SendError::NotConnected);
        }
        let Some(writer) = inner.writer.as_mut() else {
            return SendResult::Failed(SendError::NotConnected);
        };

        let write_timeout = shared.config.write_timeout();
        let outcome = tokio::select! {
            written = tokio::time::timeout(write_timeout, writer.send_text(payload)) => {
                written.unwrap_or_else(|_| {
                    Err(TransportError::Io(format!(
                        "write timed out after {:?}",
                        write_timeout
                    )))
                })
            }
            _ = interrupted => {
                tracing::debug!("Write abandoned: connection is stopping");
                return SendResult::Failed(SendError::Transport(TransportError::Io(
                    "write abandoned by stop".to_string(),
                )));
            }
        };

        match outcome {
            Ok(()) => SendResult::Delivered,
            Err(error) => {
                shared.handle_failure(&mut inner, error.clone());
                SendResult::Failed(SendError::Transport(error))
            }
        }
    }

    /// Close the connection and cancel any pending reconnect.
    ///
    /// Safe to call in any state. Once this returns no reconnect will fire
    /// until `connect()` is called again.
    pub async fn stop(&self) {
        let shared = &self.shared;
        shared.interrupt.notify_waiters();
        let mut inner = shared.inner.lock().await;
        inner.stopped = true;

        for task in [
            inner.reconnect.take(),
            inner.handshake.take(),
            inner.monitor.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }
        inner.generation += 1;

        if inner.state == ConnectionState::Disconnected && inner.writer.is_none() {
            return;
        }

        shared.transition(&mut inner, ConnectionState::Closing);
        if let Some(mut writer) = inner.writer.take() {
            shared.close_writer(writer.as_mut()).await;
        }
        shared.transition(&mut inner, ConnectionState::Disconnected);
        shared.emit(ConnectionEvent::Closed);
    }
}

impl Shared {
    fn transition(&self, inner: &mut Inner, next: ConnectionState) {
        if inner.state != next {
            tracing::info!("Connection {} -> {}", inner.state, next);
        }
        inner.state = next;
        self.state_tx.send_replace(next);
    }

    fn emit(&self, event: ConnectionEvent) {
        // No subscribers is fine.
        let _ = self.events_tx.send(event);
    }

    async fn close_writer(&self, writer: &mut dyn SocketWriter) {
        let close_timeout = self.config.effective_close_timeout();
        let close = writer.close(&self.config.close_reason);
        match tokio::time::timeout(close_timeout, close).await {
            Ok(Ok(())) => tracing::debug!("Socket closed ({})", self.config.close_reason),
            Ok(Err(e)) => tracing::debug!("Socket close reported an error: {}", e),
            Err(_) => tracing::warn!("Socket close did not finish within {:?}", close_timeout),
        }
    }

    fn begin_connect(self: &Arc<Self>, inner: &mut Inner) {
        if matches!(
            inner.state,
            ConnectionState::Connecting | ConnectionState::Open
        ) {
            tracing::debug!("connect() ignored: connection is {}", inner.state);
            return;
        }

        // Every path back to Disconnected has already dropped the old socket.
        debug_assert!(inner.writer.is_none() && inner.monitor.is_none());

        inner.generation += 1;
        inner.attempts += 1;
        let generation = inner.generation;
        let attempt = inner.attempts;

        self.transition(inner, ConnectionState::Connecting);
        self.emit(ConnectionEvent::Connecting { attempt });

        let shared = Arc::clone(self);
        inner.handshake = Some(tokio::spawn(async move {
            shared.complete_handshake(generation).await;
        }));
    }

    async fn complete_handshake(self: Arc<Self>, generation: u64) {
        let handshake_timeout = self.config.handshake_timeout;
        let result = tokio::time::timeout(handshake_timeout, self.transport.open())
            .await
            .unwrap_or_else(|_| {
                Err(TransportError::Handshake(format!(
                    "timed out after {:?}",
                    handshake_timeout
                )))
            });

        let mut inner = self.inner.lock().await;
        if inner.generation != generation || inner.state != ConnectionState::Connecting {
            if let Ok(mut socket) = result {
                tracing::debug!("Discarding socket from a superseded handshake");
                self.close_writer(socket.writer.as_mut()).await;
            }
            return;
        }
        inner.handshake = None;

        match result {
            Ok(socket) => {
                inner.writer = Some(socket.writer);
                self.transition(&mut inner, ConnectionState::Open);
                self.emit(ConnectionEvent::Opened);

                let shared = Arc::clone(&self);
                inner.monitor = Some(tokio::spawn(async move {
                    shared.monitor(generation, socket.reader).await;
                }));
            }
            Err(error) => self.handle_failure(&mut inner, error),
        }
    }

    async fn monitor(self: Arc<Self>, generation: u64, mut reader: Box<dyn SocketReader>) {
        let error = reader.closed().await;

        let mut inner = self.inner.lock().await;
        if inner.generation != generation || inner.state != ConnectionState::Open {
            return;
        }
        inner.monitor = None;
        self.handle_failure(&mut inner, error);
    }

    fn handle_failure(self: &Arc<Self>, inner: &mut Inner, error: TransportError) {
        tracing::warn!("Connection failed: {}", error);

        inner.writer = None;
        if let Some(monitor) = inner.monitor.take() {
            monitor.abort();
        }
        inner.generation += 1;
        self.transition(inner, ConnectionState::Disconnected);
        self.emit(ConnectionEvent::Failed(error));

        if inner.stopped {
            return;
        }
        if inner.reconnect.is_some() {
            tracing::debug!("Reconnect already scheduled");
            return;
        }
        self.schedule_reconnect(inner);
    }

    fn schedule_reconnect(self: &Arc<Self>, inner: &mut Inner) {
        let delay = self.config.reconnect_delay;
        tracing::info!("Reconnecting in {:?}", delay);
        self.emit(ConnectionEvent::ReconnectScheduled { delay });

        let shared = Arc::clone(self);
        inner.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let mut inner = shared.inner.lock().await;
            inner.reconnect = None;
            if inner.stopped {
                return;
            }
            shared.begin_connect(&mut inner);
        }));
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::*;
    use crate::transport::fake::{FakeTransport, OpenOutcome};

    const DELAY: Duration = Duration::from_secs(3);

    fn create_manager() -> (ConnectionManager, FakeTransport) {
        let transport = FakeTransport::new();
        let manager = ConnectionManager::new(
            Arc::new(transport.clone()),
            ConnectionConfig::default().with_reconnect_delay(DELAY),
        );
        (manager, transport)
    }

    async fn wait_for_event(
        events: &mut broadcast::Receiver<ConnectionEvent>,
        expected: impl Fn(&ConnectionEvent) -> bool,
    ) -> ConnectionEvent {
        loop {
            let event = events.recv().await.expect("event stream closed");
            if expected(&event) {
                return event;
            }
        }
    }

    async fn wait_until_open(manager: &ConnectionManager) {
        let mut state = manager.subscribe_state();
        state
            .wait_for(|s| *s == ConnectionState::Open)
            .await
            .expect("state channel closed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_opens_socket() {
        // テスト項目: connect() でソケットが確立され Open になる
        // given (前提条件):
        let (manager, transport) = create_manager();
        let mut events = manager.events();

        // when (操作):
        manager.connect().await;
        wait_until_open(&manager).await;

        // then (期待する結果):
        assert_eq!(manager.state(), ConnectionState::Open);
        assert_eq!(transport.open_count(), 1);
        assert_eq!(transport.live_sockets(), 1);
        assert_eq!(
            events.recv().await.unwrap(),
            ConnectionEvent::Connecting { attempt: 1 }
        );
        assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Opened);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_noop_while_connecting_or_open() {
        // テスト項目: Connecting / Open 中の connect() は何もしない
        // given (前提条件):
        let (manager, transport) = create_manager();
        transport.set_handshake_delay(Duration::from_millis(500));

        // when (操作):
        manager.connect().await;
        manager.connect().await; // Connecting
        wait_until_open(&manager).await;
        manager.connect().await; // Open
        tokio::time::sleep(DELAY * 2).await;

        // then (期待する結果):
        assert_eq!(transport.open_count(), 1);
        assert_eq!(transport.max_live_sockets(), 1);
        assert_eq!(manager.state(), ConnectionState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_without_connection_fails_immediately() {
        // テスト項目: 未接続時の send() は NotConnected を返し、何も送らない
        // given (前提条件):
        let (manager, transport) = create_manager();

        // when (操作):
        let result = manager.send("payload".to_string()).await;

        // then (期待する結果):
        assert_eq!(result, SendResult::Failed(SendError::NotConnected));
        assert!(transport.sent().is_empty());
        assert_eq!(transport.open_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_while_open_delivers() {
        // テスト項目: Open 中の send() はソケットに書き込み Delivered を返す
        // given (前提条件):
        let (manager, transport) = create_manager();
        manager.connect().await;
        wait_until_open(&manager).await;

        // when (操作):
        let first = manager.send("one".to_string()).await;
        let second = manager.send("two".to_string()).await;

        // then (期待する結果):
        assert!(first.is_delivered());
        assert!(second.is_delivered());
        assert_eq!(transport.sent(), vec!["one".to_string(), "two".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_reports_and_schedules_reconnect() {
        // テスト項目: 書き込み失敗で Failed を返し、Disconnected になり再接続が予約される
        // given (前提条件):
        let (manager, transport) = create_manager();
        manager.connect().await;
        wait_until_open(&manager).await;
        transport.fail_writes_on_latest();
        let mut events = manager.events();

        // when (操作):
        let result = manager.send("lost".to_string()).await;

        // then (期待する結果):
        assert!(matches!(
            result,
            SendResult::Failed(SendError::Transport(TransportError::Io(_)))
        ));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(matches!(
            events.recv().await.unwrap(),
            ConnectionEvent::Failed(_)
        ));
        assert_eq!(
            events.recv().await.unwrap(),
            ConnectionEvent::ReconnectScheduled { delay: DELAY }
        );
        assert_eq!(transport.live_sockets(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_write_times_out_and_reconnects() {
        // テスト項目: 相手が受信しない書き込みは再接続遅延で打ち切られ、切断・再接続になる
        // given (前提条件):
        let (manager, transport) = create_manager();
        manager.connect().await;
        wait_until_open(&manager).await;
        transport.stall_writes_on_latest();
        let mut events = manager.events();
        let started = Instant::now();

        // when (操作):
        let result = manager.send("stuck".to_string()).await;

        // then (期待する結果):
        assert!(matches!(
            result,
            SendResult::Failed(SendError::Transport(TransportError::Io(_)))
        ));
        assert!(started.elapsed() >= DELAY);
        assert!(started.elapsed() < DELAY * 2);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(matches!(
            events.recv().await.unwrap(),
            ConnectionEvent::Failed(_)
        ));
        assert_eq!(
            events.recv().await.unwrap(),
            ConnectionEvent::ReconnectScheduled { delay: DELAY }
        );
        wait_for_event(&mut events, |e| *e == ConnectionEvent::Opened).await;
        assert_eq!(transport.open_count(), 2);
        assert_eq!(transport.max_live_sockets(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_stalled_write_returns_within_delay() {
        // テスト項目: 書き込みが止まったままでも stop() は再接続遅延以内に終わり Disconnected になる
        // given (前提条件):
        let (manager, transport) = create_manager();
        manager.connect().await;
        wait_until_open(&manager).await;
        transport.stall_writes_on_latest();
        let sender = tokio::spawn({
            let manager = manager.clone();
            async move { manager.send("stuck".to_string()).await }
        });
        while transport.stalled_writes() == 0 {
            tokio::task::yield_now().await;
        }

        // when (操作):
        let stopped = tokio::time::timeout(DELAY, manager.stop()).await;
        tokio::time::sleep(DELAY * 3).await;

        // then (期待する結果):
        assert!(stopped.is_ok());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!sender.await.unwrap().is_delivered());
        assert_eq!(transport.stalled_writes(), 0);
        assert_eq!(transport.live_sockets(), 0);
        assert_eq!(transport.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_timeout_enters_reconnect_loop() {
        // テスト項目: 応答しない相手へのハンドシェイクはタイムアウトし、固定遅延の再接続に入る
        // given (前提条件):
        let transport = FakeTransport::new();
        transport.set_handshake_delay(Duration::from_secs(600));
        let manager = ConnectionManager::new(
            Arc::new(transport.clone()),
            ConnectionConfig::default()
                .with_reconnect_delay(DELAY)
                .with_handshake_timeout(Duration::from_secs(5)),
        );
        let mut events = manager.events();
        let started = Instant::now();

        // when (操作):
        manager.connect().await;
        let failed = wait_for_event(&mut events, |e| {
            matches!(e, ConnectionEvent::Failed(_))
        })
        .await;

        // then (期待する結果):
        assert!(matches!(
            failed,
            ConnectionEvent::Failed(TransportError::Handshake(_))
        ));
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(600));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(
            events.recv().await.unwrap(),
            ConnectionEvent::ReconnectScheduled { delay: DELAY }
        );
        assert_eq!(transport.socket_count(), 0);
        manager.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_failure_schedules_single_reconnect_after_delay() {
        // テスト項目: 1 回の切断で再接続は 1 回だけ、固定遅延より前には行われない
        // given (前提条件):
        let (manager, transport) = create_manager();
        manager.connect().await;
        wait_until_open(&manager).await;
        let mut events = manager.events();

        // when (操作):
        let failed_at = Instant::now();
        transport.kill_latest(TransportError::RemoteClosed("1001 going away".to_string()));
        wait_for_event(&mut events, |e| *e == ConnectionEvent::Opened).await;
        tokio::time::sleep(DELAY * 5).await;

        // then (期待する結果):
        let opens = transport.open_calls();
        assert_eq!(opens.len(), 2);
        assert!(opens[1].duration_since(failed_at) >= DELAY);
        assert_eq!(manager.state(), ConnectionState::Open);
        assert_eq!(transport.max_live_sockets(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_five_failures_schedule_five_reconnects() {
        // テスト項目: 5 回連続でハンドシェイクに失敗すると、再接続は 5 回、各々固定遅延後に重ならず行われる
        // given (前提条件):
        let (manager, transport) = create_manager();
        transport.script((0..5).map(|i| OpenOutcome::Reject(format!("refused #{i}"))));
        let mut events = manager.events();

        // when (操作):
        manager.connect().await;
        let mut scheduled = 0;
        loop {
            match events.recv().await.unwrap() {
                ConnectionEvent::ReconnectScheduled { delay } => {
                    assert_eq!(delay, DELAY);
                    scheduled += 1;
                }
                ConnectionEvent::Opened => break,
                _ => {}
            }
        }

        // then (期待する結果):
        assert_eq!(scheduled, 5);
        let opens = transport.open_calls();
        assert_eq!(opens.len(), 6);
        for pair in opens.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= DELAY);
        }
        assert_eq!(transport.max_live_sockets(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_when_open_closes_normally() {
        // テスト項目: Open 中の stop() で正常クローズされ、再接続しない
        // given (前提条件):
        let (manager, transport) = create_manager();
        manager.connect().await;
        wait_until_open(&manager).await;

        // when (操作):
        manager.stop().await;
        tokio::time::sleep(DELAY * 3).await;

        // then (期待する結果):
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(
            transport.close_reason(0).as_deref(),
            Some(DEFAULT_CLOSE_REASON)
        );
        assert_eq!(transport.live_sockets(), 0);
        assert_eq!(transport.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_reconnect() {
        // テスト項目: 再接続待ち中の stop() で予約済みの再接続が発火しない
        // given (前提条件):
        let (manager, transport) = create_manager();
        manager.connect().await;
        wait_until_open(&manager).await;
        let mut events = manager.events();
        transport.kill_latest(TransportError::Io("connection reset".to_string()));
        wait_for_event(&mut events, |e| {
            matches!(e, ConnectionEvent::ReconnectScheduled { .. })
        })
        .await;

        // when (操作):
        manager.stop().await;
        tokio::time::sleep(DELAY * 3).await;

        // then (期待する結果):
        assert_eq!(transport.open_count(), 1);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_handshake_completes_leaves_nothing_open() {
        // テスト項目: ハンドシェイク完了前に stop() するとソケットは残らず、再接続もしない
        // given (前提条件):
        let (manager, transport) = create_manager();
        transport.set_handshake_delay(Duration::from_secs(1));

        // when (操作):
        manager.connect().await;
        tokio::task::yield_now().await;
        manager.stop().await;
        tokio::time::sleep(DELAY * 3).await;

        // then (期待する結果):
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(transport.live_sockets(), 0);
        assert_eq!(transport.socket_count(), 0);
        assert!(transport.open_count() <= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        // テスト項目: 未接続・停止済みの状態で stop() を呼んでも問題ない
        // given (前提条件):
        let (manager, _transport) = create_manager();
        let mut events = manager.events();

        // when (操作):
        manager.stop().await;
        manager.stop().await;

        // then (期待する結果):
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_after_stop_reconnects() {
        // テスト項目: stop() 後に connect() すると再び接続できる
        // given (前提条件):
        let (manager, transport) = create_manager();
        manager.connect().await;
        wait_until_open(&manager).await;
        manager.stop().await;

        // when (操作):
        manager.connect().await;
        wait_until_open(&manager).await;

        // then (期待する結果):
        assert_eq!(transport.open_count(), 2);
        assert_eq!(transport.live_sockets(), 1);
        assert_eq!(transport.max_live_sockets(), 1);
    }
}
