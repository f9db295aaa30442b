//! Library surface for `warden-gateway`'s binary: split out so the HTTP
//! router and pipeline can be driven directly by integration tests (see
//! `tests/`) via `tower::ServiceExt::oneshot`, without spawning a real
//! listener.

pub mod auth;
pub mod http;
pub mod orchestrator;
pub mod state;
