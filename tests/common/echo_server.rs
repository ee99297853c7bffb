// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! TCP echo peer for integration tests.
//!
//! Accepts any number of connections. Each connection is wrapped in a
//! `ChannelTransport`; every request it receives is answered with a response
//! carrying the same payload. Connections can be dropped on demand to
//! simulate a peer restart while the listener keeps accepting.

use journal_rpc::{ChannelTransport, Command, Transport};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub struct EchoServer {
    pub address: SocketAddr,
    accepted: Arc<AtomicUsize>,
    received: Arc<AtomicUsize>,
    connections: Arc<Mutex<Vec<Arc<ChannelTransport>>>>,
    task: JoinHandle<()>,
}

impl EchoServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(AtomicUsize::new(0));
        let connections = Arc::new(Mutex::new(Vec::new()));

        let task = tokio::spawn({
            let accepted = Arc::clone(&accepted);
            let received = Arc::clone(&received);
            let connections = Arc::clone(&connections);
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    accepted.fetch_add(1, Ordering::SeqCst);
                    let channel = Arc::new(ChannelTransport::from_stream(stream).unwrap());
                    connections.lock().unwrap().push(Arc::clone(&channel));
                    tokio::spawn(serve(channel, Arc::clone(&received)));
                }
            }
        });

        Self {
            address,
            accepted,
            received,
            connections,
            task,
        }
    }

    /// Connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Requests received so far, across all connections.
    pub fn received(&self) -> usize {
        self.received.load(Ordering::SeqCst)
    }

    /// Close every open connection; the listener keeps accepting.
    pub fn drop_connections(&self) {
        for channel in self.connections.lock().unwrap().drain(..) {
            channel.stop().unwrap();
        }
    }

    /// Server-side handle of the most recently accepted connection.
    pub fn last_connection(&self) -> Option<Arc<ChannelTransport>> {
        self.connections.lock().unwrap().last().cloned()
    }
}

impl Drop for EchoServer {
    fn drop(&mut self) {
        self.task.abort();
        self.drop_connections();
    }
}

async fn serve(channel: Arc<ChannelTransport>, received: Arc<AtomicUsize>) {
    let Some(mut incoming) = channel.take_incoming() else {
        return;
    };
    while let Some(request) = incoming.recv().await {
        received.fetch_add(1, Ordering::SeqCst);
        let response = Command::response_to(&request, request.payload().clone());
        if channel.acknowledge(&request, response, None).is_err() {
            break;
        }
    }
}
