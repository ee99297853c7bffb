// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Direct TCP connection to one peer.
//!
//! A [`ChannelTransport`] multiplexes concurrent requests over a single
//! socket. Commands travel as length-prefixed frames (see
//! [`command`](crate::command)); responses are matched to waiting callers by
//! correlation id.
//!
//! ```text
//!  callers ──▶ writer queue ──▶ writer task ──▶ socket
//!                                                  │
//!  pending[id] ◀── responses ◀── reader task ◀─────┘
//!  incoming    ◀── requests  ◀──┘
//! ```
//!
//! Requests initiated by the peer are delivered on the receiver returned by
//! [`ChannelTransport::take_incoming`] and answered with
//! [`Transport::acknowledge`].
//!
//! When the socket fails or the peer closes it, the transport moves to
//! [`TransportState::Closed`] and every pending call fails with a
//! connection error. A closed transport is never reopened; a
//! [`FailoverTransport`](crate::FailoverTransport) replaces it instead.

use crate::command::{Command, FRAME_BODY_HEADER, MAX_FRAME_BODY};
use crate::error::{Result, TransportError};
use crate::transport::{
    complete, validate_async, BoxCallback, BoxFuture, ConnectionFactory, SharedTransport, Transport,
    TransportAttribute, TransportState,
};
use arc_swap::ArcSwap;
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A frame queued for the writer task.
struct WriteRequest {
    frame: Bytes,
    done: Option<oneshot::Sender<io::Result<()>>>,
}

/// State shared with the I/O tasks.
struct Shared {
    address: SocketAddr,
    state: AtomicU8,
    pending: DashMap<u64, oneshot::Sender<Command>>,
}

impl Shared {
    fn state(&self) -> TransportState {
        TransportState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Mark closed and fail every pending call. Returns false if already closed.
    fn close(&self) -> bool {
        let previous = self
            .state
            .swap(TransportState::Closed.as_u8(), Ordering::AcqRel);
        // Dropping the senders wakes the waiting callers.
        self.pending.clear();
        previous != TransportState::Closed.as_u8()
    }
}

/// One TCP connection to one remote address.
pub struct ChannelTransport {
    shared: Arc<Shared>,
    writer: mpsc::UnboundedSender<WriteRequest>,
    incoming: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
    attr: ArcSwap<TransportAttribute>,
    tasks: Vec<JoinHandle<()>>,
    runtime: Handle,
}

impl ChannelTransport {
    /// Connect to `address`. A zero `connect_timeout` waits indefinitely.
    pub async fn connect(address: SocketAddr, connect_timeout: Duration) -> Result<Self> {
        let connect = TcpStream::connect(address);
        let connected = if connect_timeout.is_zero() {
            connect.await
        } else {
            match tokio::time::timeout(connect_timeout, connect).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(TransportError::connection(
                        address,
                        format!("connect timed out after {}ms", connect_timeout.as_millis()),
                    ))
                }
            }
        };
        let stream = connected.map_err(|e| TransportError::connection(address, e.to_string()))?;

        let transport = Self::from_stream(stream)?;
        info!(address = %address, "Opened channel");
        Ok(transport)
    }

    /// Wrap an already-connected stream (e.g. one accepted by a listener).
    ///
    /// Fails outside a Tokio runtime.
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        let address = stream.peer_addr().map_err(|e| {
            TransportError::connection(SocketAddr::from(([0, 0, 0, 0], 0)), e.to_string())
        })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(address = %address, error = %e, "Failed to set TCP_NODELAY");
        }
        let runtime = Handle::try_current()
            .map_err(|e| TransportError::connection(address, e.to_string()))?;

        let shared = Arc::new(Shared {
            address,
            state: AtomicU8::new(TransportState::Connected.as_u8()),
            pending: DashMap::new(),
        });
        let (read_half, write_half) = stream.into_split();
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();

        let tasks = vec![
            runtime.spawn(read_loop(Arc::clone(&shared), read_half, incoming_tx)),
            runtime.spawn(write_loop(Arc::clone(&shared), write_half, writer_rx)),
        ];

        Ok(Self {
            shared,
            writer: writer_tx,
            incoming: Mutex::new(Some(incoming_rx)),
            attr: ArcSwap::from_pointee(TransportAttribute::new()),
            tasks,
            runtime,
        })
    }

    /// Receiver for requests initiated by the peer. Returns `None` after the
    /// first call.
    pub fn take_incoming(&self) -> Option<mpsc::UnboundedReceiver<Command>> {
        match self.incoming.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    /// Number of requests awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.shared.pending.len()
    }

    fn ensure_open(&self) -> Result<()> {
        match self.shared.state() {
            TransportState::Closed => Err(TransportError::Closed {
                address: self.shared.address,
            }),
            _ => Ok(()),
        }
    }

    fn enqueue(&self, command: &Command, done: Option<oneshot::Sender<io::Result<()>>>) -> Result<()> {
        self.ensure_open()?;
        let mut frame = BytesMut::new();
        command.encode_frame(&mut frame).ok_or_else(|| {
            TransportError::invalid(format!(
                "{} exceeds the {} byte frame limit",
                command, MAX_FRAME_BODY
            ))
        })?;
        self.writer
            .send(WriteRequest {
                frame: frame.freeze(),
                done,
            })
            .map_err(|_| TransportError::connection(self.shared.address, "writer stopped"))
    }

    /// Register `command` as pending and queue it for writing.
    fn dispatch(&self, command: &Command) -> Result<(PendingSlot, oneshot::Receiver<Command>)> {
        if !command.is_request() {
            return Err(TransportError::invalid(format!("{} is not a request", command)));
        }
        let (tx, rx) = oneshot::channel();
        self.shared.pending.insert(command.id(), tx);
        let slot = PendingSlot {
            shared: Arc::clone(&self.shared),
            id: command.id(),
        };
        self.enqueue(command, None)?;
        Ok((slot, rx))
    }
}

/// Releases a pending entry when its waiter goes away, whether it completed,
/// timed out or was dropped mid-flight.
struct PendingSlot {
    shared: Arc<Shared>,
    id: u64,
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.shared.pending.remove(&self.id);
    }
}

/// Wait for the response held by `slot`, honoring a per-attempt timeout.
async fn await_response(
    slot: PendingSlot,
    rx: oneshot::Receiver<Command>,
    timeout: Duration,
) -> Result<Command> {
    let address = slot.shared.address;
    let closed = || TransportError::connection(address, "connection closed");
    if timeout.is_zero() {
        return rx.await.map_err(|_| closed());
    }
    match tokio::time::timeout(timeout, rx).await {
        Ok(result) => result.map_err(|_| closed()),
        Err(_) => Err(TransportError::RequestTimeout { address, timeout }),
    }
}

async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> io::Result<Option<Command>> {
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    if !(FRAME_BODY_HEADER..=MAX_FRAME_BODY).contains(&len) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame body of {} bytes out of range", len),
        ));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Command::decode_body(Bytes::from(body))
        .map(Some)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "malformed frame"))
}

async fn read_loop(
    shared: Arc<Shared>,
    read_half: OwnedReadHalf,
    incoming: mpsc::UnboundedSender<Command>,
) {
    let mut reader = BufReader::new(read_half);
    let reason = loop {
        match read_frame(&mut reader).await {
            Ok(Some(command)) if command.is_response() => {
                match shared.pending.remove(&command.id()) {
                    Some((_, waiter)) => {
                        let _ = waiter.send(command);
                    }
                    None => debug!(
                        address = %shared.address,
                        id = command.id(),
                        "Dropping response with no waiting request"
                    ),
                }
            }
            Ok(Some(command)) => {
                if incoming.send(command).is_err() {
                    debug!(address = %shared.address, "Dropping request, no incoming receiver");
                }
            }
            Ok(None) => break "closed by peer".to_string(),
            Err(e) => break e.to_string(),
        }
    };
    if shared.close() {
        info!(address = %shared.address, reason = %reason, "Channel closed");
    }
}

async fn write_loop(
    shared: Arc<Shared>,
    mut write_half: OwnedWriteHalf,
    mut queue: mpsc::UnboundedReceiver<WriteRequest>,
) {
    while let Some(request) = queue.recv().await {
        let result = write_half.write_all(&request.frame).await;
        let failure = result.as_ref().err().map(|e| e.to_string());
        if let Some(done) = request.done {
            let _ = done.send(result);
        }
        if let Some(reason) = failure {
            if shared.close() {
                warn!(address = %shared.address, error = %reason, "Channel write failed");
            }
            break;
        }
    }
    let _ = write_half.shutdown().await;
}

// =============================================================================
// Transport implementation
// =============================================================================

impl Transport for ChannelTransport {
    fn sync(&self, command: Command, timeout: Duration) -> BoxFuture<'_, Command> {
        let dispatched = self.dispatch(&command);
        Box::pin(async move {
            let (slot, rx) = dispatched?;
            await_response(slot, rx, timeout).await
        })
    }

    fn async_send(
        &self,
        command: Command,
        timeout: Duration,
        callback: Option<BoxCallback>,
    ) -> Result<()> {
        let callback = validate_async(&command, callback)?;
        let dispatched = match self.dispatch(&command) {
            Err(e @ TransportError::RequestInvalid(_)) => return Err(e),
            other => other,
        };
        self.runtime.spawn(async move {
            let result = match dispatched {
                Ok((slot, rx)) => await_response(slot, rx, timeout).await,
                Err(e) => Err(e),
            };
            complete(callback, command, result);
        });
        Ok(())
    }

    /// Enqueue only; `timeout` does not apply since nothing is awaited.
    fn oneway(&self, command: Command, _timeout: Duration) -> Result<()> {
        self.enqueue(&command, None)
    }

    fn acknowledge(
        &self,
        request: &Command,
        response: Command,
        callback: Option<BoxCallback>,
    ) -> Result<()> {
        if !request.is_answered_by(&response) {
            return Err(TransportError::invalid(format!(
                "{} does not answer {}",
                response, request
            )));
        }
        let Some(callback) = callback else {
            return self.enqueue(&response, None);
        };

        let (done_tx, done_rx) = oneshot::channel();
        self.enqueue(&response, Some(done_tx))?;
        let request = request.clone();
        let address = self.shared.address;
        self.runtime.spawn(async move {
            match done_rx.await {
                Ok(Ok(())) => callback.on_success(request, response),
                Ok(Err(e)) => callback.on_exception(request, TransportError::connection(address, e.to_string())),
                Err(_) => callback.on_exception(
                    request,
                    TransportError::connection(address, "connection closed before write"),
                ),
            }
        });
        Ok(())
    }

    fn remote_address(&self) -> SocketAddr {
        self.shared.address
    }

    fn attr(&self) -> TransportAttribute {
        TransportAttribute::clone(&self.attr.load())
    }

    fn set_attr(&self, attribute: TransportAttribute) {
        self.attr.store(Arc::new(attribute));
    }

    fn state(&self) -> TransportState {
        self.shared.state()
    }

    /// Idempotent.
    fn stop(&self) -> Result<()> {
        if self.shared.close() {
            info!(address = %self.shared.address, "Stopped channel");
        }
        for task in &self.tasks {
            task.abort();
        }
        Ok(())
    }
}

impl Drop for ChannelTransport {
    fn drop(&mut self) {
        self.shared.close();
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl std::fmt::Debug for ChannelTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelTransport")
            .field("address", &self.shared.address)
            .field("state", &self.shared.state())
            .field("pending", &self.shared.pending.len())
            .finish()
    }
}

/// Opens [`ChannelTransport`]s over TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnectionFactory;

impl ConnectionFactory for TcpConnectionFactory {
    fn create_transport(
        &self,
        address: SocketAddr,
        connect_timeout: Duration,
    ) -> BoxFuture<'_, SharedTransport> {
        Box::pin(async move {
            let transport = ChannelTransport::connect(address, connect_timeout).await?;
            Ok(Arc::new(transport) as SharedTransport)
        })
    }
}
