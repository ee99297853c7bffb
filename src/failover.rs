// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Failover decorator around a live [`Transport`].
//!
//! [`FailoverTransport`] presents the same contract as the connection it wraps
//! (the "delegate") while hiding transient connectivity faults: `sync` calls
//! are retried according to a [`RetryPolicy`], and a broken delegate is
//! replaced by a fresh connection from a [`ConnectionFactory`].
//!
//! # Reconnect Lifecycle
//!
//! ```text
//!            active              inactive, delay elapsed
//!   Live ──▶ Checking ──────────────────────────▶ Reconnecting
//!    ▲          │ inactive, too soon                  │      │
//!    │          ▼                                     │      │ factory fault
//!    │        Failed ◀────────────────────────────────┼──────┘
//!    │                                                │ new delegate swapped in
//!    └────────────────────────────────────────────────┘
//! ```
//!
//! Reconnection is a critical section: concurrent callers that observe the
//! same dead delegate produce at most one replacement. Readers never take the
//! lock; the delegate is published through an [`ArcSwap`].
//!
//! # Blocking Time
//!
//! `sync` timeouts are per attempt. A call can block for roughly
//! `(max_retries + 1) × timeout` plus reconnect time; with
//! [`NO_TIMEOUT`](crate::transport::NO_TIMEOUT) each attempt waits indefinitely.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> journal_rpc::Result<()> {
//! use journal_rpc::config::TransportConfig;
//! use journal_rpc::{Command, FailoverTransport, TcpConnectionFactory, Transport, TransportEventBus};
//! use std::sync::Arc;
//!
//! let config = TransportConfig::default();
//! let events = Arc::new(TransportEventBus::new(config.event_bus_capacity));
//! let transport = FailoverTransport::connect(
//!     "10.0.0.2:7000".parse().unwrap(),
//!     &config,
//!     Arc::new(TcpConnectionFactory),
//!     events,
//! )
//! .await?;
//!
//! let response = transport.sync(Command::request("append"), config.request_timeout_duration()).await?;
//! # Ok(())
//! # }
//! ```

use crate::command::Command;
use crate::config::TransportConfig;
use crate::error::{Result, TransportError};
use crate::event::{TransportEvent, TransportEventBus};
use crate::metrics;
use crate::resilience::RetryPolicy;
use crate::transport::{
    complete, validate_async, BoxCallback, BoxFuture, ConnectionFactory, SharedTransport,
    Transport, TransportAttribute, TransportState,
};
use arc_swap::ArcSwap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Sentinel for "no reconnect attempted yet".
const NEVER: u64 = u64::MAX;

/// Where the failover transport is in its reconnect lifecycle.
///
/// See module docs for the transition diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectState {
    /// Delegate believed healthy.
    Live,
    /// Liveness being evaluated.
    Checking,
    /// A replacement connection is being established.
    Reconnecting,
    /// Last attempt failed or was refused; eligible again after the retry delay.
    Failed,
}

impl ReconnectState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Checking => "checking",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Live => 0,
            Self::Checking => 1,
            Self::Reconnecting => 2,
            Self::Failed => 3,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Live,
            1 => Self::Checking,
            2 => Self::Reconnecting,
            _ => Self::Failed,
        }
    }
}

/// A [`Transport`] that reconnects and retries on behalf of its callers.
///
/// Cloning is cheap; clones share the delegate and the reconnect state.
#[derive(Clone)]
pub struct FailoverTransport {
    inner: Arc<Inner>,
}

struct Inner {
    /// Current delegate. Double `Arc` because `ArcSwap` needs a sized pointee.
    delegate: ArcSwap<SharedTransport>,
    address: SocketAddr,
    address_label: String,
    connection_timeout: Duration,
    factory: Arc<dyn ConnectionFactory>,
    policy: Arc<dyn RetryPolicy>,
    events: Arc<TransportEventBus>,
    /// Serializes create-and-swap.
    reconnect_lock: tokio::sync::Mutex<()>,
    /// Micros since `epoch` of the last reconnect attempt, or [`NEVER`].
    last_reconnect: AtomicU64,
    /// Consecutive failed reconnects; keys the policy's delay sequence.
    reconnect_failures: AtomicUsize,
    /// Completed create attempts, successful or not.
    reconnect_attempts: AtomicU64,
    state: AtomicU8,
    epoch: Instant,
}

impl FailoverTransport {
    /// Wrap `delegate`, reconnecting to `address` through `factory` when it breaks.
    pub fn new(
        delegate: SharedTransport,
        address: SocketAddr,
        connection_timeout: Duration,
        factory: Arc<dyn ConnectionFactory>,
        policy: Arc<dyn RetryPolicy>,
        events: Arc<TransportEventBus>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                delegate: ArcSwap::from_pointee(delegate),
                address,
                address_label: address.to_string(),
                connection_timeout,
                factory,
                policy,
                events,
                reconnect_lock: tokio::sync::Mutex::new(()),
                last_reconnect: AtomicU64::new(NEVER),
                reconnect_failures: AtomicUsize::new(0),
                reconnect_attempts: AtomicU64::new(0),
                state: AtomicU8::new(ReconnectState::Live.as_u8()),
                epoch: Instant::now(),
            }),
        }
    }

    /// Wrap `delegate` using the timeouts and retry policy from `config`.
    pub fn from_config(
        delegate: SharedTransport,
        config: &TransportConfig,
        factory: Arc<dyn ConnectionFactory>,
        events: Arc<TransportEventBus>,
    ) -> Self {
        let address = delegate.remote_address();
        Self::new(
            delegate,
            address,
            config.connection_timeout_duration(),
            factory,
            config.retry.build(),
            events,
        )
    }

    /// Open the first connection through `factory`, then wrap it.
    pub async fn connect(
        address: SocketAddr,
        config: &TransportConfig,
        factory: Arc<dyn ConnectionFactory>,
        events: Arc<TransportEventBus>,
    ) -> Result<Self> {
        let delegate = factory
            .create_transport(address, config.connection_timeout_duration())
            .await?;
        info!(address = %address, "Connected transport");
        Ok(Self::new(
            delegate,
            address,
            config.connection_timeout_duration(),
            factory,
            config.retry.build(),
            events,
        ))
    }

    /// Snapshot of the current delegate.
    pub fn delegate(&self) -> SharedTransport {
        self.inner.delegate()
    }

    /// Fixed target address used for reconnects.
    pub fn address(&self) -> SocketAddr {
        self.inner.address
    }

    pub fn retry_policy(&self) -> &Arc<dyn RetryPolicy> {
        &self.inner.policy
    }

    pub fn events(&self) -> &Arc<TransportEventBus> {
        &self.inner.events
    }

    pub fn reconnect_state(&self) -> ReconnectState {
        ReconnectState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// Consecutive failed reconnects since the last success.
    pub fn reconnect_failures(&self) -> usize {
        self.inner.reconnect_failures.load(Ordering::Acquire)
    }

    /// Time since the last reconnect attempt, if one was made.
    pub fn since_last_reconnect(&self) -> Option<Duration> {
        let last = self.inner.last_reconnect.load(Ordering::Acquire);
        if last == NEVER {
            return None;
        }
        Some(Duration::from_micros(
            self.inner.elapsed_micros().saturating_sub(last),
        ))
    }

    /// Pre-flight liveness check: `true` if the delegate is active or was
    /// replaced by one that is.
    pub async fn check_liveness(&self) -> bool {
        let delegate = self.inner.delegate();
        if delegate.is_active() {
            self.inner.set_state(ReconnectState::Live);
            return true;
        }
        self.inner.try_reconnect(&delegate).await
    }

    /// Replace `failed` with a new connection, unless another caller already
    /// did or the retry delay has not elapsed.
    ///
    /// Returns whether the current delegate is usable for another attempt.
    pub async fn try_reconnect(&self, failed: &SharedTransport) -> bool {
        self.inner.try_reconnect(failed).await
    }

    async fn sync_with_retry(&self, command: Command, timeout: Duration) -> Result<Command> {
        let inner = &self.inner;
        let max_retries = inner.policy.max_retries();
        let started = Instant::now();
        let mut last_error = None;

        for attempt in 0..=max_retries {
            // One consistent delegate per attempt.
            let delegate = inner.delegate();
            match delegate.sync(command.clone(), timeout).await {
                Ok(response) => {
                    if attempt > 0 {
                        warn!(
                            address = %inner.address,
                            attempt,
                            command = %command,
                            timeout_ms = timeout.as_millis() as u64,
                            "Request succeeded after retry"
                        );
                    }
                    metrics::record_request(&inner.address_label, "sync", "success");
                    metrics::record_sync_latency(&inner.address_label, attempt + 1, started.elapsed());
                    return Ok(response);
                }
                Err(e) if e.is_timeout() => {
                    debug!(address = %inner.address, attempt, error = %e, "Request attempt timed out");
                    if attempt < max_retries {
                        metrics::record_retry(&inner.address_label, e.kind());
                    }
                    last_error = Some(e);
                }
                Err(e) if e.is_connection_failure() => {
                    debug!(address = %inner.address, attempt, error = %e, "Request attempt failed");
                    if !inner.try_reconnect(&delegate).await {
                        metrics::record_request(&inner.address_label, "sync", e.kind());
                        return Err(e);
                    }
                    if attempt < max_retries {
                        metrics::record_retry(&inner.address_label, e.kind());
                    }
                    last_error = Some(e);
                }
                Err(e) => {
                    metrics::record_request(&inner.address_label, "sync", e.kind());
                    return Err(e);
                }
            }
        }

        let error = last_error.unwrap_or(TransportError::RequestError {
            address: inner.address,
        });
        warn!(
            address = %inner.address,
            attempts = max_retries + 1,
            command = %command,
            error = %error,
            "Request failed after max retries"
        );
        metrics::record_request(&inner.address_label, "sync", error.kind());
        metrics::record_sync_latency(&inner.address_label, max_retries + 1, started.elapsed());
        Err(error)
    }
}

impl Inner {
    fn delegate(&self) -> SharedTransport {
        let guard = self.delegate.load();
        Arc::clone(&**guard)
    }

    fn set_state(&self, state: ReconnectState) {
        let previous = self.state.swap(state.as_u8(), Ordering::AcqRel);
        if previous != state.as_u8() {
            metrics::set_reconnect_state(&self.address_label, state.as_str());
        }
    }

    fn elapsed_micros(&self) -> u64 {
        self.epoch.elapsed().as_micros().min(u128::from(NEVER - 1)) as u64
    }

    /// Whether enough time has passed since the last reconnect attempt.
    fn reconnect_due(&self) -> bool {
        let last = self.last_reconnect.load(Ordering::Acquire);
        if last == NEVER {
            return true;
        }
        let failures = self.reconnect_failures.load(Ordering::Acquire);
        let delay = self.policy.retry_delay(failures);
        if delay.is_zero() {
            return true;
        }
        let elapsed = self.elapsed_micros().saturating_sub(last);
        u128::from(elapsed) > delay.as_micros()
    }

    fn refuse_rate_limited(&self) -> bool {
        debug!(address = %self.address, "Reconnect refused, retry delay not elapsed");
        metrics::record_reconnect_rate_limited(&self.address_label);
        self.set_state(ReconnectState::Failed);
        false
    }

    async fn try_reconnect(&self, failed: &SharedTransport) -> bool {
        let observed_attempts = self.reconnect_attempts.load(Ordering::Acquire);
        if !same_transport(&self.delegate(), failed) {
            return true;
        }
        self.set_state(ReconnectState::Checking);
        if !self.reconnect_due() {
            return self.refuse_rate_limited();
        }

        let _guard = self.reconnect_lock.lock().await;

        // Another caller may have reconnected while we waited.
        if !same_transport(&self.delegate(), failed) {
            self.set_state(ReconnectState::Live);
            return true;
        }
        // Or tried and failed: share that outcome instead of dialing again.
        if self.reconnect_attempts.load(Ordering::Acquire) != observed_attempts {
            debug!(address = %self.address, "Reconnect already attempted by another caller");
            self.set_state(ReconnectState::Failed);
            return false;
        }
        if !self.reconnect_due() {
            return self.refuse_rate_limited();
        }
        self.reconnect(failed).await
    }

    /// Create-and-swap. Caller holds `reconnect_lock`.
    async fn reconnect(&self, failed: &SharedTransport) -> bool {
        self.set_state(ReconnectState::Reconnecting);
        let started = Instant::now();
        let created = self.create_transport().await;
        self.last_reconnect
            .store(self.elapsed_micros(), Ordering::Release);
        self.reconnect_attempts.fetch_add(1, Ordering::AcqRel);

        match created {
            Ok(transport) => {
                transport.set_attr(failed.attr());
                let previous = self.delegate.swap(Arc::new(Arc::clone(&transport)));
                let previous = Arc::clone(&*previous);
                self.stop_in_background(previous);

                self.reconnect_failures.store(0, Ordering::Release);
                metrics::set_reconnect_failures(&self.address_label, 0);
                metrics::record_reconnect(&self.address_label, true, started.elapsed());
                info!(
                    address = %self.address,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Reconnected transport"
                );

                self.events.publish(TransportEvent::reconnect(transport));
                self.set_state(ReconnectState::Live);
                true
            }
            Err(e) => {
                let failures = self.reconnect_failures.fetch_add(1, Ordering::AcqRel) + 1;
                metrics::set_reconnect_failures(&self.address_label, failures);
                metrics::record_reconnect(&self.address_label, false, started.elapsed());
                debug!(
                    address = %self.address,
                    failures,
                    next_delay_ms = self.policy.retry_delay(failures).as_millis() as u64,
                    error = %e,
                    "Reconnect failed"
                );
                self.set_state(ReconnectState::Failed);
                false
            }
        }
    }

    async fn create_transport(&self) -> Result<SharedTransport> {
        let create = self
            .factory
            .create_transport(self.address, self.connection_timeout);
        if self.connection_timeout.is_zero() {
            return create.await;
        }
        match tokio::time::timeout(self.connection_timeout, create).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::connection(
                self.address,
                format!(
                    "connect timed out after {}ms",
                    self.connection_timeout.as_millis()
                ),
            )),
        }
    }

    fn stop_in_background(&self, stale: SharedTransport) {
        let address = self.address;
        let label = self.address_label.clone();
        tokio::spawn(async move {
            if let Err(e) = stale.stop() {
                warn!(address = %address, error = %e, "Failed to stop stale transport");
                metrics::record_stop_failure(&label);
            }
        });
    }
}

/// Identity comparison that ignores vtable pointers.
fn same_transport(a: &SharedTransport, b: &SharedTransport) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Forward an async call, routing a synchronous dispatch error to `callback`.
fn forward_async(delegate: &SharedTransport, command: Command, timeout: Duration, callback: BoxCallback) {
    let slot = Arc::new(Mutex::new(Some(callback)));
    let bridge_slot = Arc::clone(&slot);
    let bridge = move |request: Command, result: Result<Command>| {
        if let Some(callback) = take_callback(&bridge_slot) {
            complete(callback, request, result);
        }
    };
    if let Err(e) = delegate.async_send(command.clone(), timeout, Some(Box::new(bridge))) {
        if let Some(callback) = take_callback(&slot) {
            callback.on_exception(command, e);
        }
    }
}

fn take_callback(slot: &Mutex<Option<BoxCallback>>) -> Option<BoxCallback> {
    match slot.lock() {
        Ok(mut guard) => guard.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    }
}

// =============================================================================
// Transport implementation
// =============================================================================

impl Transport for FailoverTransport {
    fn sync(&self, command: Command, timeout: Duration) -> BoxFuture<'_, Command> {
        Box::pin(self.sync_with_retry(command, timeout))
    }

    /// Never retried. Only argument validation fails with `Err`; every other
    /// fault reaches `callback`. If the delegate is inactive and a reconnect is
    /// not due, `callback` fails synchronously with
    /// [`TransportError::RequestError`].
    fn async_send(
        &self,
        command: Command,
        timeout: Duration,
        callback: Option<BoxCallback>,
    ) -> Result<()> {
        let callback = validate_async(&command, callback)?;
        let inner = &self.inner;
        let delegate = inner.delegate();

        if delegate.is_active() {
            inner.set_state(ReconnectState::Live);
            metrics::record_request(&inner.address_label, "async", "dispatched");
            forward_async(&delegate, command, timeout, callback);
            return Ok(());
        }

        let stale = TransportError::RequestError {
            address: delegate.remote_address(),
        };
        inner.set_state(ReconnectState::Checking);
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) if inner.reconnect_due() => handle,
            Ok(_) => {
                inner.refuse_rate_limited();
                metrics::record_request(&inner.address_label, "async", stale.kind());
                callback.on_exception(command, stale);
                return Ok(());
            }
            Err(_) => {
                inner.set_state(ReconnectState::Failed);
                metrics::record_request(&inner.address_label, "async", stale.kind());
                callback.on_exception(command, stale);
                return Ok(());
            }
        };

        let inner = Arc::clone(&self.inner);
        handle.spawn(async move {
            if inner.try_reconnect(&delegate).await {
                metrics::record_request(&inner.address_label, "async", "dispatched");
                forward_async(&inner.delegate(), command, timeout, callback);
            } else {
                metrics::record_request(&inner.address_label, "async", stale.kind());
                callback.on_exception(command, stale);
            }
        });
        Ok(())
    }

    fn oneway(&self, command: Command, timeout: Duration) -> Result<()> {
        let result = self.inner.delegate().oneway(command, timeout);
        if let Err(ref e) = result {
            metrics::record_request(&self.inner.address_label, "oneway", e.kind());
        }
        result
    }

    fn acknowledge(
        &self,
        request: &Command,
        response: Command,
        callback: Option<BoxCallback>,
    ) -> Result<()> {
        self.inner.delegate().acknowledge(request, response, callback)
    }

    fn remote_address(&self) -> SocketAddr {
        self.inner.delegate().remote_address()
    }

    fn attr(&self) -> TransportAttribute {
        self.inner.delegate().attr()
    }

    fn set_attr(&self, attribute: TransportAttribute) {
        self.inner.delegate().set_attr(attribute)
    }

    fn state(&self) -> TransportState {
        self.inner.delegate().state()
    }

    fn stop(&self) -> Result<()> {
        self.inner.delegate().stop()
    }
}

impl std::fmt::Debug for FailoverTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverTransport")
            .field("address", &self.inner.address)
            .field("state", &self.reconnect_state())
            .field("reconnect_failures", &self.reconnect_failures())
            .field("policy", &self.inner.policy)
            .finish()
    }
}
