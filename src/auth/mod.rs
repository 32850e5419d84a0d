//! Authentication module for the chat server
//!
//! Registration, login, session tokens and the bearer-token
//! request extractor.

pub mod handlers;
mod middleware;
mod service;

pub use middleware::{bearer_token, MaybeUser};
pub use service::{AuthService, LoginOutcome};
