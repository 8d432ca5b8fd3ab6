//! # pointsync haystack adapter
//!
//! Everything that talks to the remote tag store:
//!
//! - [`transport`] — the minimal blocking HTTP contract the rest of the
//!   crate depends on, plus the `reqwest` implementation
//! - [`headers`] — the authentication-header field grammar
//! - [`auth`] — the four-phase SCRAM handshake producing a bearer token
//! - [`client`] — authenticated commit/read operations
//! - [`resolver`] — the site → equipment → point resolution pipeline
//! - [`writer`] — history-write submission for resolved points
//!
//! The pipeline is synchronous and strictly sequential: each stage needs
//! identifiers the previous one produced, and retry policy belongs to the
//! caller.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod client;
pub mod headers;
pub mod resolver;
pub mod transport;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::{AuthError, HandshakePhase, ScramHandshake};
pub use client::{HaystackClient, HaystackClientConfig};
pub use resolver::{HierarchyResolver, ResolvedBatch, Stage, StageOutcome, SyncError};
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport, TransportError};
pub use writer::{TimeseriesWriter, WriteError};
