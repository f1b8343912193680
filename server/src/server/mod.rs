//! Connection handling: registry, websocket transport and host ingress
//!
//! Wire packets travel to clients as binary websocket frames; inbound
//! binary frames run through the adapter's interceptor before anything
//! else. The HTTP routes are the bridge from the host game-server's event
//! system into the visualization worker.

pub mod registry;
pub mod routes;
pub mod websocket;

pub use registry::{Connection, ConnectionRegistry, PacketInterceptor};
pub use routes::visual_routes;
pub use websocket::{AppState, ws_handler};
