//! # Journal RPC
//!
//! Fault-tolerant command transport and journal-entry codec for a replicated
//! log.
//!
//! ## Architecture
//!
//! Callers issue [`Command`]s through a [`FailoverTransport`], which forwards
//! them to the currently active connection (the delegate) and transparently
//! replaces that connection when it breaks:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                              journal-rpc                                 │
//! │                                                                          │
//! │  caller ──► FailoverTransport ──► delegate: ChannelTransport ──► peer    │
//! │                  │     │                                                 │
//! │                  │     └──► RetryPolicy (budget + reconnect spacing)     │
//! │                  ▼                                                       │
//! │          ConnectionFactory ──► new delegate ──► TransportEventBus        │
//! │                                                  (Reconnect events)      │
//! │                                                                          │
//! │  JournalEntryCodec: magic | term | length | payload (bit-exact)          │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Call Modes
//!
//! | Mode | Blocks | Retries | Reconnects |
//! |------|--------|---------|------------|
//! | `sync` | until response | up to `max_retries` | on connection faults |
//! | `async_send` | no | never | liveness guard only |
//! | `oneway` | no | never | never |
//! | `acknowledge` | no | never | never |
//!
//! ## Usage
//!
//! ```rust,no_run
//! use journal_rpc::config::TransportConfig;
//! use journal_rpc::{Command, FailoverTransport, TcpConnectionFactory, Transport, TransportEventBus};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> journal_rpc::Result<()> {
//!     let config = TransportConfig::default();
//!     let events = Arc::new(TransportEventBus::new(config.event_bus_capacity));
//!     let mut reconnects = events.subscribe();
//!
//!     let transport = FailoverTransport::connect(
//!         "10.0.0.2:7000".parse().unwrap(),
//!         &config,
//!         Arc::new(TcpConnectionFactory),
//!         events,
//!     )
//!     .await?;
//!
//!     tokio::spawn(async move {
//!         while let Ok(event) = reconnects.recv().await {
//!             println!("{} -> {}", event.event_type, event.transport.remote_address());
//!         }
//!     });
//!
//!     let response = transport
//!         .sync(Command::request("append"), config.request_timeout_duration())
//!         .await?;
//!     println!("{}", response);
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod failover;
pub mod journal;
pub mod metrics;
pub mod resilience;
pub mod transport;

// Re-exports for convenience
pub use channel::{ChannelTransport, TcpConnectionFactory};
pub use command::{Command, Direction};
pub use config::{RetryPolicyConfig, TransportConfig};
pub use error::{JournalError, JournalResult, Result, TransportError};
pub use event::{TransportEvent, TransportEventBus, TransportEventType};
pub use failover::{FailoverTransport, ReconnectState};
pub use journal::{JournalEntry, JournalEntryCodec, ScanOutcome};
pub use resilience::{ExponentialRetryPolicy, FixedRetryPolicy, IncreasingRetryPolicy, RetryPolicy};
pub use transport::{
    BoxCallback, CommandCallback, ConnectionFactory, ResponseFuture, SharedTransport, Transport,
    TransportAttribute, TransportState, NO_TIMEOUT,
};
