//! Shared test utilities for integration and chaos tests.
//!
//! This module provides:
//! - Scriptable mock Transport and ConnectionFactory for recording calls
//! - A TCP echo peer built on ChannelTransport
//! - Small helpers for addresses, errors, and polling

#![allow(dead_code)]

pub mod echo_server;
pub mod mock_transport;

pub use echo_server::*;
pub use mock_transport::*;

use std::net::SocketAddr;
use std::time::Duration;

/// Loopback address with the given port.
pub fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
