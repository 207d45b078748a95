use crate::context::ResolveContext;
use crate::process::{run_with_timeout, ProcessError};
use std::process::Command;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("image not found: {0}")]
    NotFound(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("registry error: {0}")]
    Other(String),
    #[error(transparent)]
    Process(#[from] ProcessError),
}

impl RegistryError {
    /// Errors that make a mirror unusable for this image without saying
    /// anything about the original registry.
    pub fn is_not_found_or_unauthorized(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Unauthorized(_))
    }

    /// Classify a registry tool's stderr by the registry error codes and HTTP
    /// status phrases it quotes. Digits alone are not enough: digests and
    /// hostnames contain them too.
    pub fn from_stderr(stderr: &str) -> Self {
        let message = stderr.trim().to_owned();
        let lower = message.to_ascii_lowercase();
        const NOT_FOUND: [&str; 6] = [
            "manifest_unknown",
            "manifest unknown",
            "name_unknown",
            "name unknown",
            "status code 404",
            "404 not found",
        ];
        const UNAUTHORIZED: [&str; 7] = [
            "unauthorized",
            "denied",
            "authentication required",
            "status code 401",
            "status code 403",
            "401 unauthorized",
            "403 forbidden",
        ];
        if UNAUTHORIZED.iter().any(|m| lower.contains(m)) {
            Self::Unauthorized(message)
        } else if NOT_FOUND.iter().any(|m| lower.contains(m)) {
            Self::NotFound(message)
        } else {
            Self::Other(message)
        }
    }
}

/// Looks up the manifest digest an image reference currently points at.
pub trait DigestResolver: Send + Sync {
    /// `reference` is fully qualified and tagged, e.g. `docker.io/library/alpine:3.18`.
    fn digest(&self, reference: &str, ctx: &ResolveContext) -> Result<String, RegistryError>;
}

/// [`DigestResolver`] backed by an external registry tool invoked as
/// `<program> digest <reference>` (crane's interface), printing the digest on
/// stdout.
pub struct CommandRegistry {
    program: String,
    timeout: Duration,
}

impl CommandRegistry {
    pub fn new(program: &str, timeout: Duration) -> Self {
        Self {
            program: program.to_owned(),
            timeout,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl DigestResolver for CommandRegistry {
    fn digest(&self, reference: &str, ctx: &ResolveContext) -> Result<String, RegistryError> {
        tracing::debug!("{} digest {reference}", self.program);
        let mut command = Command::new(&self.program);
        command.arg("digest").arg(reference);

        let output = run_with_timeout(command, ctx, ctx.budget(self.timeout))?;
        if !output.status.success() {
            return Err(RegistryError::from_stderr(&String::from_utf8_lossy(
                &output.stderr,
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match stdout.lines().map(str::trim).find(|l| !l.is_empty()) {
            Some(digest) => Ok(digest.to_owned()),
            None => Err(RegistryError::Other(format!(
                "{} printed no digest for {reference}",
                self.program
            ))),
        }
    }
}
