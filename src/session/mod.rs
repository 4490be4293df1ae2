//! Authenticated access to the dispatch API from the client side.
//!
//! A [`Session`] owns the current credential pair, attaches the access
//! credential to every request and transparently refreshes it once when the
//! backend answers `401`. Concurrent callers that hit the same expiry share a
//! single refresh.

pub mod client;
pub mod credentials;
pub mod error;
pub mod manager;
pub mod transport;

pub use client::ApiClient;
pub use credentials::{CredentialStore, Credentials, FileStore, MemoryStore};
pub use error::SessionError;
pub use manager::Session;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, Transport};
