// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Transport traits.
//!
//! Defines the capability set shared by the direct connection
//! ([`ChannelTransport`](crate::ChannelTransport)) and the resilience decorator
//! ([`FailoverTransport`](crate::FailoverTransport)), plus the
//! [`ConnectionFactory`] seam used to obtain replacement connections.
//!
//! # Example
//!
//! ```rust,no_run
//! use journal_rpc::transport::{BoxFuture, ConnectionFactory, SharedTransport};
//! use journal_rpc::ChannelTransport;
//! use std::net::SocketAddr;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! struct Dialer;
//!
//! impl ConnectionFactory for Dialer {
//!     fn create_transport(
//!         &self,
//!         address: SocketAddr,
//!         connect_timeout: Duration,
//!     ) -> BoxFuture<'_, SharedTransport> {
//!         Box::pin(async move {
//!             let transport = ChannelTransport::connect(address, connect_timeout).await?;
//!             Ok(Arc::new(transport) as SharedTransport)
//!         })
//!     }
//! }
//! ```

use crate::command::Command;
use crate::error::{Result, TransportError};
use dashmap::DashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;

/// Timeout sentinel: wait indefinitely for each attempt.
pub const NO_TIMEOUT: Duration = Duration::ZERO;

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// A live connection shared between its owner and in-flight calls.
pub type SharedTransport = Arc<dyn Transport>;

/// Connection state reported by a [`Transport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Connecting,
    Connected,
    Closed,
}

impl TransportState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::Connecting => 0,
            Self::Connected => 1,
            Self::Closed => 2,
        }
    }

    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Connecting,
            1 => Self::Connected,
            _ => Self::Closed,
        }
    }
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Out-of-band metadata attached to a connection (peer id, session, ...).
///
/// Cloning is cheap; clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct TransportAttribute {
    entries: Arc<DashMap<String, String>>,
}

impl TransportAttribute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.entries.remove(key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Completion handler for [`Transport::async_send`].
///
/// Both methods consume the callback, so it runs at most once; transports
/// guarantee it runs exactly once, off the caller's task.
pub trait CommandCallback: Send + 'static {
    fn on_success(self: Box<Self>, request: Command, response: Command);

    fn on_exception(self: Box<Self>, request: Command, error: TransportError);
}

impl<F> CommandCallback for F
where
    F: FnOnce(Command, Result<Command>) + Send + 'static,
{
    fn on_success(self: Box<Self>, request: Command, response: Command) {
        (*self)(request, Ok(response))
    }

    fn on_exception(self: Box<Self>, request: Command, error: TransportError) {
        (*self)(request, Err(error))
    }
}

/// Boxed completion handler.
pub type BoxCallback = Box<dyn CommandCallback>;

/// Deliver a result to a callback.
pub fn complete(callback: BoxCallback, request: Command, result: Result<Command>) {
    match result {
        Ok(response) => callback.on_success(request, response),
        Err(e) => callback.on_exception(request, e),
    }
}

/// Future returned by [`Transport::async_future`].
pub struct ResponseFuture {
    rx: oneshot::Receiver<Result<Command>>,
    address: SocketAddr,
}

impl ResponseFuture {
    /// Build a future together with the callback that resolves it.
    pub fn pair(address: SocketAddr) -> (Self, BoxCallback) {
        let (tx, rx) = oneshot::channel();
        let callback = move |_request: Command, result: Result<Command>| {
            let _ = tx.send(result);
        };
        (Self { rx, address }, Box::new(callback))
    }

    /// A future that is already resolved with `error`.
    pub fn failed(address: SocketAddr, error: TransportError) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(error));
        Self { rx, address }
    }
}

impl Future for ResponseFuture {
    type Output = Result<Command>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let address = self.address;
        Pin::new(&mut self.rx).poll(cx).map(|r| {
            r.unwrap_or_else(|_| {
                Err(TransportError::connection(
                    address,
                    "request dropped before completion",
                ))
            })
        })
    }
}

/// One live connection to one remote address.
///
/// Timeouts are per attempt; [`NO_TIMEOUT`] waits indefinitely.
pub trait Transport: Send + Sync + 'static {
    /// Send `command` and wait for the correlated response.
    fn sync(&self, command: Command, timeout: Duration) -> BoxFuture<'_, Command>;

    /// Send `command` without waiting; `callback` receives the outcome
    /// exactly once, asynchronously.
    ///
    /// A missing callback or a command that is not a request is rejected
    /// with [`TransportError::RequestInvalid`] before anything is sent.
    fn async_send(
        &self,
        command: Command,
        timeout: Duration,
        callback: Option<BoxCallback>,
    ) -> Result<()>;

    /// Send `command` and return a future resolving to the response.
    fn async_future(&self, command: Command, timeout: Duration) -> ResponseFuture {
        let address = self.remote_address();
        let (future, callback) = ResponseFuture::pair(address);
        match self.async_send(command, timeout, Some(callback)) {
            Ok(()) => future,
            Err(e) => ResponseFuture::failed(address, e),
        }
    }

    /// Send `command` expecting no response.
    fn oneway(&self, command: Command, timeout: Duration) -> Result<()>;

    /// Send `response` to a request previously received from the peer.
    ///
    /// With a callback, the write outcome is reported through it.
    fn acknowledge(
        &self,
        request: &Command,
        response: Command,
        callback: Option<BoxCallback>,
    ) -> Result<()>;

    fn remote_address(&self) -> SocketAddr;

    fn attr(&self) -> TransportAttribute;

    fn set_attr(&self, attribute: TransportAttribute);

    fn state(&self) -> TransportState;

    /// Whether the underlying connection is usable right now.
    fn is_active(&self) -> bool {
        self.state() == TransportState::Connected
    }

    /// Close the connection; pending calls fail.
    fn stop(&self) -> Result<()>;
}

/// Produces new live connections.
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Connect to `address`, failing with a connection-class error if it is
    /// unreachable or the handshake does not finish within `connect_timeout`.
    fn create_transport(
        &self,
        address: SocketAddr,
        connect_timeout: Duration,
    ) -> BoxFuture<'_, SharedTransport>;
}

/// Validate the arguments of an async call, returning the callback.
///
/// Shared by [`Transport::async_send`] implementations.
pub fn validate_async(command: &Command, callback: Option<BoxCallback>) -> Result<BoxCallback> {
    let callback = callback.ok_or_else(|| TransportError::invalid("callback must not be empty"))?;
    if !command.is_request() {
        return Err(TransportError::invalid(format!(
            "{} is not a request",
            command
        )));
    }
    Ok(callback)
}
