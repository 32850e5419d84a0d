//! Chat rooms and their persisted message history.

pub mod handlers;
mod registry;

pub use registry::RoomRegistry;
