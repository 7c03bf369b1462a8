//! OAuth module
//!
//! Handles the authorization-code handshake with the upstream music service
//! and keeps stored credentials usable afterwards:
//! - CSRF state issuing and single-use consumption
//! - credential persistence behind the `CredentialStore` trait
//! - access-token freshness with single-flight refresh per user

mod credentials;
mod flow;
mod state_store;
mod token_manager;

pub use credentials::{CredentialStore, MemoryCredentialStore, OAuthCredential};
pub use flow::{AuthorizationFlow, FlowError};
pub use state_store::{OAuthStateStore, StateError};
pub use token_manager::{TokenError, TokenManager};
