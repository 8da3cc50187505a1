//! Scripted in-memory transport for tests.
//!
//! Records every handshake, every frame written, how sockets were closed,
//! and how many sockets were alive at the same time.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tokio::{sync::oneshot, time::Instant};

use crate::error::TransportError;

use super::{Socket, SocketReader, SocketWriter, Transport};

/// Outcome of the next `open()` call.
#[derive(Debug, Clone)]
pub(crate) enum OpenOutcome {
    Accept,
    Reject(String),
}

#[derive(Default)]
struct FakeState {
    script: VecDeque<OpenOutcome>,
    handshake_delay: Duration,
    open_calls: Vec<Instant>,
    live: usize,
    max_live: usize,
    sockets: Vec<SocketRecord>,
}

struct SocketRecord {
    kill: Option<oneshot::Sender<TransportError>>,
    sent: Vec<String>,
    fail_writes: bool,
    stall_writes: bool,
    stalled: usize,
    close_reason: Option<String>,
}

#[derive(Clone, Default)]
pub(crate) struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue outcomes for upcoming handshakes. Unscripted handshakes succeed.
    pub(crate) fn script(&self, outcomes: impl IntoIterator<Item = OpenOutcome>) {
        self.state.lock().unwrap().script.extend(outcomes);
    }

    pub(crate) fn set_handshake_delay(&self, delay: Duration) {
        self.state.lock().unwrap().handshake_delay = delay;
    }

    pub(crate) fn open_calls(&self) -> Vec<Instant> {
        self.state.lock().unwrap().open_calls.clone()
    }

    pub(crate) fn open_count(&self) -> usize {
        self.state.lock().unwrap().open_calls.len()
    }

    pub(crate) fn socket_count(&self) -> usize {
        self.state.lock().unwrap().sockets.len()
    }

    pub(crate) fn live_sockets(&self) -> usize {
        self.state.lock().unwrap().live
    }

    pub(crate) fn max_live_sockets(&self) -> usize {
        self.state.lock().unwrap().max_live
    }

    /// Frames written on every socket, in order.
    pub(crate) fn sent(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.sockets.iter().flat_map(|s| s.sent.clone()).collect()
    }

    pub(crate) fn close_reason(&self, index: usize) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.sockets.get(index).and_then(|s| s.close_reason.clone())
    }

    /// Make the read half of the newest socket fail with `error`.
    pub(crate) fn kill_latest(&self, error: TransportError) {
        let mut state = self.state.lock().unwrap();
        if let Some(kill) = state.sockets.last_mut().and_then(|s| s.kill.take()) {
            let _ = kill.send(error);
        }
    }

    /// Make every later write on the newest socket hang forever, like a peer
    /// that stopped reading.
    pub(crate) fn stall_writes_on_latest(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some(socket) = state.sockets.last_mut() {
            socket.stall_writes = true;
        }
    }

    /// Writes currently hanging on stalled sockets, across all sockets.
    pub(crate) fn stalled_writes(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.sockets.iter().map(|s| s.stalled).sum()
    }

    /// Make every later write on the newest socket fail.
    pub(crate) fn fail_writes_on_latest(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some(socket) = state.sockets.last_mut() {
            socket.fail_writes = true;
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(&self) -> Result<Socket, TransportError> {
        let (outcome, delay) = {
            let mut state = self.state.lock().unwrap();
            state.open_calls.push(Instant::now());
            let outcome = state.script.pop_front().unwrap_or(OpenOutcome::Accept);
            (outcome, state.handshake_delay)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match outcome {
            OpenOutcome::Reject(reason) => Err(TransportError::Handshake(reason)),
            OpenOutcome::Accept => {
                let (kill_tx, kill_rx) = oneshot::channel();
                let index = {
                    let mut state = self.state.lock().unwrap();
                    state.sockets.push(SocketRecord {
                        kill: Some(kill_tx),
                        sent: Vec::new(),
                        fail_writes: false,
                        stall_writes: false,
                        stalled: 0,
                        close_reason: None,
                    });
                    state.live += 1;
                    state.max_live = state.max_live.max(state.live);
                    state.sockets.len() - 1
                };
                Ok(Socket {
                    writer: Box::new(FakeWriter {
                        state: Arc::clone(&self.state),
                        index,
                        released: false,
                    }),
                    reader: Box::new(FakeReader { kill: Some(kill_rx) }),
                })
            }
        }
    }
}

struct FakeWriter {
    state: Arc<Mutex<FakeState>>,
    index: usize,
    released: bool,
}

impl FakeWriter {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.state.lock().unwrap().live -= 1;
        }
    }
}

#[async_trait]
impl SocketWriter for FakeWriter {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        let stalled = {
            let mut state = self.state.lock().unwrap();
            let socket = &mut state.sockets[self.index];
            if self.released || socket.fail_writes {
                return Err(TransportError::Io("broken pipe".to_string()));
            }
            if socket.stall_writes {
                socket.stalled += 1;
                true
            } else {
                socket.sent.push(text);
                false
            }
        };

        if stalled {
            let _stall = StallRecord {
                state: Arc::clone(&self.state),
                index: self.index,
            };
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn close(&mut self, reason: &str) -> Result<(), TransportError> {
        self.state.lock().unwrap().sockets[self.index].close_reason = Some(reason.to_string());
        self.release();
        Ok(())
    }
}

/// Un-counts a stalled write when its future is dropped.
struct StallRecord {
    state: Arc<Mutex<FakeState>>,
    index: usize,
}

impl Drop for StallRecord {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.sockets[self.index].stalled -= 1;
        }
    }
}

impl Drop for FakeWriter {
    fn drop(&mut self) {
        self.release();
    }
}

struct FakeReader {
    kill: Option<oneshot::Receiver<TransportError>>,
}

#[async_trait]
impl SocketReader for FakeReader {
    async fn closed(&mut self) -> TransportError {
        if let Some(kill) = self.kill.take()
            && let Ok(error) = kill.await
        {
            return error;
        }
        std::future::pending().await
    }
}
