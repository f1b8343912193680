//! Connection registry with best-effort binary fan-out
//!
//! Every connected client owns a bounded outbound buffer; broadcasts never
//! block on a slow or closing connection. The registry also exposes the
//! explicit per-connection interceptor hook the protocol adapter uses for
//! click interception (inbound frames it does not claim pass through to
//! normal handling untouched).

use bytes::Bytes;
use dashmap::DashMap;
use metrics::{counter, gauge};
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Outbound buffer depth per connection; overflow drops the packet for
/// that connection only (the next state change re-sends current state).
pub const OUTBOUND_BUFFER: usize = 64;

/// Hook inspecting inbound binary frames on a connection's task.
///
/// Implementations must not block: they decode and enqueue, nothing more.
/// Returning `false` passes the frame through to regular message handling.
pub trait PacketInterceptor: Send + Sync {
    fn intercept(&self, connection_id: Uuid, frame: &[u8]) -> bool;
}

/// State for a single connected client
pub struct Connection {
    pub id: Uuid,
    sender: mpsc::Sender<Bytes>,
    interceptor: OnceLock<Arc<dyn PacketInterceptor>>,
}

impl Connection {
    /// Install the inbound interceptor. Idempotent for the lifetime of the
    /// connection: later installs on the same connection are ignored.
    pub fn install_interceptor(&self, interceptor: Arc<dyn PacketInterceptor>) {
        if self.interceptor.set(interceptor).is_err() {
            debug!("interceptor already installed for connection {}", self.id);
        }
    }

    /// Run the interceptor over one inbound frame; `true` means consumed.
    pub fn intercept(&self, frame: &[u8]) -> bool {
        match self.interceptor.get() {
            Some(interceptor) => interceptor.intercept(self.id, frame),
            None => false,
        }
    }

    /// Queue one packet for this connection without blocking.
    pub fn send(&self, packet: Bytes) -> bool {
        match self.sender.try_send(packet) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                counter!("gridcast_send_dropped_total", "reason" => "buffer_full").increment(1);
                warn!("outbound buffer full for connection {}, dropping packet", self.id);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // Connection is tearing down; the ws task removes it
                false
            }
        }
    }
}

/// Registry of currently connected clients
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<Uuid, Arc<Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection and hand back its shared state.
    pub fn register(&self, id: Uuid, sender: mpsc::Sender<Bytes>) -> Arc<Connection> {
        let connection = Arc::new(Connection {
            id,
            sender,
            interceptor: OnceLock::new(),
        });
        self.connections.insert(id, connection.clone());
        gauge!("gridcast_connections_active").set(self.connections.len() as f64);
        connection
    }

    pub fn remove(&self, id: Uuid) {
        self.connections.remove(&id);
        gauge!("gridcast_connections_active").set(self.connections.len() as f64);
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<Connection>> {
        self.connections.get(&id).map(|c| c.value().clone())
    }

    /// Send one packet to every connected client, best effort.
    pub fn broadcast(&self, packet: Bytes) {
        counter!("gridcast_packets_broadcast_total").increment(1);
        for entry in self.connections.iter() {
            entry.value().send(packet.clone());
        }
    }

    /// Send one packet to a single client, best effort.
    pub fn send(&self, id: Uuid, packet: Bytes) -> bool {
        match self.connections.get(&id) {
            Some(connection) => connection.send(packet),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ConsumeAll;

    impl PacketInterceptor for ConsumeAll {
        fn intercept(&self, _connection_id: Uuid, _frame: &[u8]) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_connections() {
        let registry = ConnectionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        registry.register(Uuid::new_v4(), tx_a);
        registry.register(Uuid::new_v4(), tx_b);

        registry.broadcast(Bytes::from_static(b"\x01\x02"));

        assert_eq!(rx_a.recv().await.unwrap().as_ref(), b"\x01\x02");
        assert_eq!(rx_b.recv().await.unwrap().as_ref(), b"\x01\x02");
    }

    #[tokio::test]
    async fn test_full_buffer_does_not_block_others() {
        let registry = ConnectionRegistry::new();
        let (tx_slow, _rx_slow) = mpsc::channel(1);
        let (tx_ok, mut rx_ok) = mpsc::channel(4);
        registry.register(Uuid::new_v4(), tx_slow);
        registry.register(Uuid::new_v4(), tx_ok);

        // Two broadcasts: the slow connection's single-slot buffer overflows
        registry.broadcast(Bytes::from_static(b"a"));
        registry.broadcast(Bytes::from_static(b"b"));

        assert_eq!(rx_ok.recv().await.unwrap().as_ref(), b"a");
        assert_eq!(rx_ok.recv().await.unwrap().as_ref(), b"b");
    }

    #[tokio::test]
    async fn test_interceptor_installation_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::channel(4);
        let connection = registry.register(Uuid::new_v4(), tx);

        assert!(!connection.intercept(b"frame"));
        connection.install_interceptor(Arc::new(ConsumeAll));
        connection.install_interceptor(Arc::new(ConsumeAll)); // no-op
        assert!(connection.intercept(b"frame"));
    }

    #[tokio::test]
    async fn test_remove_stops_delivery() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::channel(4);
        let id = Uuid::new_v4();
        registry.register(id, tx);
        registry.remove(id);

        registry.broadcast(Bytes::from_static(b"x"));
        assert!(rx.try_recv().is_err());
        assert!(registry.is_empty());
    }
}
