//! Mock Transport and ConnectionFactory for testing.
//!
//! `MockTransport` records every call and answers `sync`/`async_send` from a
//! script of outcomes, falling back to a default outcome once the script is
//! exhausted. `MockConnectionFactory` records every `create_transport` call and
//! hands out `MockTransport`s (or faults) according to its own plan.
//!
//! # Example
//! ```rust,ignore
//! let delegate = MockTransport::new(addr(7000));
//! delegate.push(Outcome::Fail(connection_error(addr(7000))));
//!
//! let factory = MockConnectionFactory::live();
//! // Use in tests...
//!
//! assert_eq!(delegate.sync_calls(), 1);
//! assert_eq!(factory.create_calls(), 1);
//! ```

use journal_rpc::transport::{
    validate_async, BoxCallback, BoxFuture, ConnectionFactory, SharedTransport, Transport,
    TransportAttribute, TransportState,
};
use journal_rpc::{Command, Result, TransportError};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a mock delegate does with one request.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Answer with a response echoing the request payload.
    Respond,
    /// Fail the attempt.
    Fail(TransportError),
}

pub fn connection_error(address: SocketAddr, message: &str) -> TransportError {
    TransportError::connection(address, message)
}

pub fn timeout_error(address: SocketAddr) -> TransportError {
    TransportError::RequestTimeout {
        address,
        timeout: Duration::from_millis(100),
    }
}

/// Mock implementation of Transport that records all calls.
pub struct MockTransport {
    address: SocketAddr,
    script: Mutex<VecDeque<Outcome>>,
    default: Mutex<Outcome>,
    /// Artificial latency for each `sync`.
    latency: Mutex<Duration>,
    active: AtomicBool,
    stopped: AtomicBool,
    stop_fails: AtomicBool,
    /// Fault returned synchronously by `async_send` after validation.
    dispatch_error: Mutex<Option<TransportError>>,
    sync_calls: AtomicUsize,
    async_calls: AtomicUsize,
    oneway_calls: AtomicUsize,
    ack_calls: AtomicUsize,
    attr: Mutex<TransportAttribute>,
}

impl MockTransport {
    /// A live delegate that answers everything.
    pub fn new(address: SocketAddr) -> Arc<Self> {
        Self::with_default(address, Outcome::Respond)
    }

    /// A delegate that fails every attempt with `error` but still reports active.
    pub fn failing(address: SocketAddr, error: TransportError) -> Arc<Self> {
        Self::with_default(address, Outcome::Fail(error))
    }

    fn with_default(address: SocketAddr, default: Outcome) -> Arc<Self> {
        Arc::new(Self {
            address,
            script: Mutex::new(VecDeque::new()),
            default: Mutex::new(default),
            latency: Mutex::new(Duration::ZERO),
            active: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            stop_fails: AtomicBool::new(false),
            dispatch_error: Mutex::new(None),
            sync_calls: AtomicUsize::new(0),
            async_calls: AtomicUsize::new(0),
            oneway_calls: AtomicUsize::new(0),
            ack_calls: AtomicUsize::new(0),
            attr: Mutex::new(TransportAttribute::new()),
        })
    }

    /// Queue an outcome for the next request.
    pub fn push(&self, outcome: Outcome) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn set_default(&self, outcome: Outcome) {
        *self.default.lock().unwrap() = outcome;
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    /// Make `async_send` reject dispatch with `error` while still reporting active.
    pub fn fail_dispatch(&self, error: TransportError) {
        *self.dispatch_error.lock().unwrap() = Some(error);
    }

    pub fn fail_stop(&self) {
        self.stop_fails.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn sync_calls(&self) -> usize {
        self.sync_calls.load(Ordering::SeqCst)
    }

    pub fn async_calls(&self) -> usize {
        self.async_calls.load(Ordering::SeqCst)
    }

    pub fn oneway_calls(&self) -> usize {
        self.oneway_calls.load(Ordering::SeqCst)
    }

    pub fn ack_calls(&self) -> usize {
        self.ack_calls.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> Outcome {
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| self.default.lock().unwrap().clone())
    }

    fn answer(outcome: Outcome, command: &Command) -> Result<Command> {
        match outcome {
            Outcome::Respond => Ok(Command::response_to(command, command.payload().clone())),
            Outcome::Fail(e) => Err(e),
        }
    }
}

impl Transport for MockTransport {
    fn sync(&self, command: Command, _timeout: Duration) -> BoxFuture<'_, Command> {
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self.next_outcome();
        let latency = *self.latency.lock().unwrap();
        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            Self::answer(outcome, &command)
        })
    }

    fn async_send(
        &self,
        command: Command,
        _timeout: Duration,
        callback: Option<BoxCallback>,
    ) -> Result<()> {
        let callback = validate_async(&command, callback)?;
        self.async_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.dispatch_error.lock().unwrap().clone() {
            return Err(error);
        }
        let result = Self::answer(self.next_outcome(), &command);
        tokio::spawn(async move {
            match result {
                Ok(response) => callback.on_success(command, response),
                Err(e) => callback.on_exception(command, e),
            }
        });
        Ok(())
    }

    fn oneway(&self, _command: Command, _timeout: Duration) -> Result<()> {
        self.oneway_calls.fetch_add(1, Ordering::SeqCst);
        if self.active.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::Closed {
                address: self.address,
            })
        }
    }

    fn acknowledge(
        &self,
        _request: &Command,
        _response: Command,
        _callback: Option<BoxCallback>,
    ) -> Result<()> {
        self.ack_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remote_address(&self) -> SocketAddr {
        self.address
    }

    fn attr(&self) -> TransportAttribute {
        self.attr.lock().unwrap().clone()
    }

    fn set_attr(&self, attribute: TransportAttribute) {
        *self.attr.lock().unwrap() = attribute;
    }

    fn state(&self) -> TransportState {
        if self.active.load(Ordering::SeqCst) {
            TransportState::Connected
        } else {
            TransportState::Closed
        }
    }

    fn stop(&self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        self.active.store(false, Ordering::SeqCst);
        if self.stop_fails.load(Ordering::SeqCst) {
            return Err(connection_error(self.address, "stop failed"));
        }
        Ok(())
    }
}

/// What the mock factory does with one `create_transport` call.
#[derive(Debug, Clone)]
pub enum Creation {
    /// Hand out a live transport that answers everything.
    Live,
    /// Hand out a transport that fails every attempt with a connection error
    /// whose message names the creation ordinal (`"dead #1"`, `"dead #2"`, ...).
    Dead,
    /// Fail the creation itself.
    Fail,
}

/// Mock implementation of ConnectionFactory that records all calls.
pub struct MockConnectionFactory {
    plan: Mutex<VecDeque<Creation>>,
    default: Creation,
    latency: Mutex<Duration>,
    create_calls: AtomicUsize,
    created: Mutex<Vec<Arc<MockTransport>>>,
}

impl MockConnectionFactory {
    pub fn new(default: Creation) -> Arc<Self> {
        Arc::new(Self {
            plan: Mutex::new(VecDeque::new()),
            default,
            latency: Mutex::new(Duration::ZERO),
            create_calls: AtomicUsize::new(0),
            created: Mutex::new(Vec::new()),
        })
    }

    pub fn live() -> Arc<Self> {
        Self::new(Creation::Live)
    }

    pub fn failing() -> Arc<Self> {
        Self::new(Creation::Fail)
    }

    pub fn dead() -> Arc<Self> {
        Self::new(Creation::Dead)
    }

    /// Queue a behaviour for the next creation.
    pub fn then(&self, creation: Creation) {
        self.plan.lock().unwrap().push_back(creation);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Transports handed out so far, in creation order.
    pub fn created(&self) -> Vec<Arc<MockTransport>> {
        self.created.lock().unwrap().clone()
    }
}

impl ConnectionFactory for MockConnectionFactory {
    fn create_transport(
        &self,
        address: SocketAddr,
        _connect_timeout: Duration,
    ) -> BoxFuture<'_, SharedTransport> {
        let ordinal = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let creation = self
            .plan
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default.clone());
        let latency = *self.latency.lock().unwrap();

        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            let transport = match creation {
                Creation::Live => MockTransport::new(address),
                Creation::Dead => MockTransport::failing(
                    address,
                    connection_error(address, &format!("dead #{}", ordinal)),
                ),
                Creation::Fail => {
                    return Err(connection_error(address, "connection refused"));
                }
            };
            self.created.lock().unwrap().push(Arc::clone(&transport));
            Ok(transport as SharedTransport)
        })
    }
}

/// Whether two handles point at the same transport.
pub fn same_transport(a: &SharedTransport, b: &Arc<MockTransport>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}
