//! On-demand JIT configuration endpoint.
//!
//! Guarded sequentially: the identity-aware proxy assertion is verified
//! first, then the request is checked against the configured allowlist, and
//! only then is a JIT configuration minted and returned. Every failure is
//! side-effect free.

mod allowlist;
mod handler;
mod iap;

pub use allowlist::Allowlist;
pub use handler::JitConfigHandler;
pub use iap::{IapError, IapVerifier, TokenInfoVerifier};
