//! Core authentication primitives for AuthKit.
//!
//! This crate implements the authentication session and token lifecycle:
//! the passwordless identifier-verification flow as an explicit state
//! machine ([`PasswordlessFlowController`]), versioned token persistence
//! with backward-compatible reads ([`storage::TokenStore`]), the single
//! authoritative session ([`SessionManager`]) and in-process lifecycle
//! notifications ([`EventBus`]).
//!
//! Transport, UI and platform glue live outside this crate: the network is
//! an injected [`NetworkClient`] (a reqwest-backed [`HttpNetworkClient`] is
//! provided), persistence is an injected [`authkit_store::KvBackend`], and
//! legacy credential decryption is an injected [`storage::LegacyDecrypt`].

mod error;
pub use error::*;

mod token;
pub use token::*;

mod identifier;
pub use identifier::*;

mod events;
pub use events::*;

mod network;
pub use network::*;

mod http;
pub use http::*;

mod session;
pub use session::*;

mod flow;
pub use flow::*;

pub mod storage;
