//! Persistence for the chat server
//!
//! Users, sessions and chat rooms each live in one whole-collection
//! document. Backends implement [`DocumentStore`]; services talk to them
//! through [`DbOperations`].

pub mod models;
pub mod operations;
pub mod store;

pub use models::{ChatMessage, ChatRoom, PublicUser, Session, User};
pub use operations::DbOperations;
pub use store::{Collection, DocumentStore, JsonFileStore, MemoryStore};
