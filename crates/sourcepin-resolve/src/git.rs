use crate::config::ResolverConfig;
use crate::context::ResolveContext;
use crate::process::{run_with_timeout, ProcessError};
use crate::FatalError;
use sourcepin_schema::{CommitHash, GitReference};
use std::process::Command;
use std::time::Instant;

/// Resolves git references to commit hashes with `git ls-remote`, without
/// cloning.
pub struct GitResolver {
    config: ResolverConfig,
}

impl GitResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// Resolve the ref named by `reference`. Annotated tags resolve to the
    /// commit they point at, not the tag object.
    pub fn resolve(
        &self,
        reference: &GitReference,
        ctx: &ResolveContext,
    ) -> Result<CommitHash, FatalError> {
        ctx.check()?;

        // The run deadline, when there is one, replaces the default.
        let timeout = match ctx.deadline() {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => self.config.git_timeout(),
        };

        let mut command = Command::new(&self.config.git_program);
        command
            .arg("ls-remote")
            .arg("--")
            .arg(reference.remote())
            .arg(reference.reference())
            .arg(reference.peeled_reference())
            .env("GIT_TERMINAL_PROMPT", "0");
        tracing::debug!(
            "git ls-remote {} {}",
            reference.remote(),
            reference.reference()
        );

        let output = run_with_timeout(command, ctx, timeout).map_err(|e| match e {
            ProcessError::Cancelled { .. } => FatalError::Cancelled,
            other => FatalError::Git {
                remote: reference.remote().to_owned(),
                message: other.to_string(),
            },
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FatalError::Git {
                remote: reference.remote().to_owned(),
                message: stderr.trim().to_owned(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let hash = select_commit(&stdout).ok_or_else(|| FatalError::NoCommit {
            remote: reference.remote().to_owned(),
            reference: reference.reference().to_owned(),
        })?;
        CommitHash::parse(hash).ok_or_else(|| FatalError::InvalidCommit {
            remote: reference.remote().to_owned(),
            hash: hash.to_owned(),
        })
    }
}

/// Pick the hash from `ls-remote` output: a peeled `^{}` line wins, else the
/// first well-formed line.
fn select_commit(output: &str) -> Option<&str> {
    let mut first = None;
    for line in output.lines() {
        let mut fields = line.split_whitespace();
        let (Some(hash), Some(name)) = (fields.next(), fields.next()) else {
            continue;
        };
        if name.ends_with("^{}") {
            return Some(hash);
        }
        first.get_or_insert(hash);
    }
    first
}
