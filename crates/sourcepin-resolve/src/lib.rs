//! Resolvers that turn mutable source references into immutable identifiers.
//!
//! This crate provides the HTTP checksum resolver (provider API, HEAD header
//! probes, full-body fallback), the cache-header volatility check, the git
//! commit resolver, the registry digest client with optional mirror
//! preference, and the cancellation context every resolver observes.

pub mod cache;
pub mod config;
pub mod context;
pub mod git;
pub mod http;
pub mod image;
mod interrupt;
pub mod mirror;
pub mod probe;
pub mod process;
pub mod progress;
pub mod provider;
pub mod registry;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod vary;

pub use config::ResolverConfig;
pub use context::{CancelToken, ResolveContext};
pub use git::GitResolver;
pub use http::{ChecksumResult, HttpResolver};
pub use image::{ImageResolver, PinnedImage};
pub use mirror::Mirror;
pub use process::ProcessError;
pub use progress::{DownloadObserver, NoProgress};
pub use registry::{CommandRegistry, DigestResolver, RegistryError};

/// `User-Agent` sent on every outbound request.
pub const USER_AGENT: &str = concat!("sourcepin/", env!("CARGO_PKG_VERSION"));

use thiserror::Error;

/// Outcome of a failed resolution, classified once at the resolver boundary.
///
/// `Auth` and `Volatile` only skip the offending reference; `Fatal` aborts the
/// whole run.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("authentication required for {url} (HTTP {status})")]
    Auth { url: String, status: u16 },
    #[error("volatile content at {url} ({reason})")]
    Volatile { url: String, reason: String },
    #[error(transparent)]
    Fatal(#[from] FatalError),
}

impl ResolveError {
    pub fn is_skippable(&self) -> bool {
        matches!(self, Self::Auth { .. } | Self::Volatile { .. })
    }
}

#[derive(Debug, Error)]
pub enum FatalError {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("HTTP error for {url}: {message}")]
    Http { url: String, message: String },
    #[error("{method} request failed for {url}: HTTP {status}")]
    Status {
        url: String,
        method: &'static str,
        status: u16,
    },
    #[error("content length mismatch for {url}: server declared {declared} bytes but sent {actual}")]
    ContentLengthMismatch {
        url: String,
        declared: u64,
        actual: u64,
    },
    #[error("failed to read response body from {url}: {message}")]
    Body { url: String, message: String },
    #[error("git ls-remote failed for {remote}: {message}")]
    Git { remote: String, message: String },
    #[error("no commit found for ref {reference} at {remote}")]
    NoCommit { remote: String, reference: String },
    #[error("invalid commit hash '{hash}' from {remote}")]
    InvalidCommit { remote: String, hash: String },
    #[error("failed to resolve digest for {reference}: {source}")]
    Registry {
        reference: String,
        #[source]
        source: RegistryError,
    },
    #[error("invalid digest '{digest}' for {reference}")]
    InvalidDigest { reference: String, digest: String },
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("cancelled")]
    Cancelled,
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl FatalError {
    /// True for errors caused by cancellation rather than by the reference itself.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Process(ProcessError::Cancelled { .. })
        )
    }
}
