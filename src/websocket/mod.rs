//! Realtime channel
//!
//! Live connections, room subscriptions and message fan-out. The
//! [`Gateway`] holds the protocol logic; [`session`] adapts it to
//! actix WebSocket actors.

mod events;
mod gateway;
mod pool;
pub mod session;

pub use events::{ClientEvent, ServerEvent};
pub use gateway::{ConnectionContext, Gateway};
pub use pool::ConnectionPool;
pub use session::{websocket_route, ChatSession};
