use crate::collector::{Task, TaskCollector};
use crate::lifecycle::{validate_transition, RunState};
use crate::results::{ResolutionResult, ResultAggregator};
use crate::CoreError;
use sourcepin_resolve::{
    CancelToken, DigestResolver, DownloadObserver, GitResolver, HttpResolver, ImageResolver,
    Mirror, ResolveContext, ResolveError, ResolverConfig,
};
use sourcepin_schema::{ExtractedManifest, Policy, Source, SourceKind};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Central orchestration engine for a pinning run.
///
/// Collects tasks from the extracted manifests, resolves each one on its own
/// worker thread, and assembles the results into a source policy. The first
/// fatal error cancels every other worker; authentication and volatility
/// failures only skip the reference they belong to.
pub struct Engine {
    http: HttpResolver,
    git: GitResolver,
    images: ImageResolver,
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Overall deadline for the run, applied to every task.
    pub timeout: Option<Duration>,
    /// Shared with whoever may want to stop the run early, e.g. a signal
    /// handler. The engine only reads it; a fatal task error stops the other
    /// workers without cancelling this token.
    pub cancel: CancelToken,
}

/// How a task ended, as reported to a [`RunObserver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Resolved,
    Skipped,
    Failed,
    Cancelled,
}

/// Per-task progress side channel. Every method defaults to a no-op.
///
/// Called from worker threads, so implementations must be `Sync`.
pub trait RunObserver: Sync {
    fn task_started(&self, _task: &Task) {}

    /// An HTTP task fell back to downloading; `declared` is the server's
    /// `Content-Length`.
    fn download_started(&self, _task: &Task, _declared: Option<u64>) {}

    fn bytes_received(&self, _task: &Task, _n: u64) {}

    fn task_finished(&self, _task: &Task, _outcome: TaskOutcome) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl RunObserver for Silent {}

/// A reference left out of the policy, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedReference {
    pub kind: SourceKind,
    pub reference: String,
    pub reason: String,
}

/// Result of a completed run.
#[derive(Debug)]
pub struct RunReport {
    pub policy: Policy,
    pub skipped: Vec<SkippedReference>,
}

/// State shared by the workers of one run.
struct Shared<'a> {
    ctx: ResolveContext,
    observer: &'a dyn RunObserver,
    results: ResultAggregator,
    skipped: Mutex<Vec<(usize, SkippedReference)>>,
    failure: Mutex<Option<CoreError>>,
}

/// Forwards one HTTP task's download progress to the run observer.
struct TaskProgress<'a> {
    task: &'a Task,
    observer: &'a dyn RunObserver,
}

impl DownloadObserver for TaskProgress<'_> {
    fn on_start(&self, declared: Option<u64>) {
        self.observer.download_started(self.task, declared);
    }

    fn on_bytes(&self, n: u64) {
        self.observer.bytes_received(self.task, n);
    }
}

impl Engine {
    pub fn new(config: ResolverConfig, registry: Arc<dyn DigestResolver>) -> Self {
        Self {
            http: HttpResolver::new(config.clone()),
            git: GitResolver::new(config),
            images: ImageResolver::new(registry),
        }
    }

    /// Docker Hub official images are looked up on these mirrors first, in order.
    #[must_use]
    pub fn with_mirrors(mut self, mirrors: Vec<Mirror>) -> Self {
        self.images = self.images.with_mirrors(mirrors);
        self
    }

    /// Resolve every reference in `manifests` and build the policy.
    ///
    /// Returns the first fatal error if any task failed, or
    /// [`CoreError::Cancelled`] if the run was cancelled from outside.
    pub fn pin(
        &self,
        manifests: &[ExtractedManifest],
        options: &RunOptions,
        observer: &dyn RunObserver,
    ) -> Result<RunReport, CoreError> {
        let mut state = RunState::Collecting;

        let mut collector = TaskCollector::new();
        for manifest in manifests {
            if let Err(e) = collector.collect(manifest) {
                transition(&mut state, RunState::Aborted)?;
                return Err(e.into());
            }
        }
        let tasks = collector.into_tasks();
        info!(
            "resolving {} references from {} manifests",
            tasks.len(),
            manifests.len()
        );

        // Workers cancel each other through a child token, leaving the
        // caller's token to the caller.
        let mut ctx = ResolveContext::new(options.cancel.child());
        if let Some(timeout) = options.timeout {
            ctx = ctx.with_timeout(timeout);
        }
        let shared = Shared {
            ctx,
            observer,
            results: ResultAggregator::new(),
            skipped: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
        };

        transition(&mut state, RunState::Dispatched)?;
        std::thread::scope(|scope| {
            for task in &tasks {
                let shared = &shared;
                scope.spawn(move || self.run_task(task, shared));
            }
        });

        let failure = shared
            .failure
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(err) = failure {
            transition(&mut state, RunState::Aborted)?;
            return Err(err);
        }
        if options.cancel.is_cancelled() {
            transition(&mut state, RunState::Aborted)?;
            return Err(CoreError::Cancelled);
        }

        let mut skipped = shared
            .skipped
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        skipped.sort_by_key(|(index, _)| *index);
        let skipped: Vec<SkippedReference> = skipped.into_iter().map(|(_, s)| s).collect();

        let policy = shared.results.into_policy();
        policy.validate()?;
        transition(&mut state, RunState::Completed)?;
        info!(
            "pinned {} references, skipped {}",
            policy.rules.len(),
            skipped.len()
        );
        Ok(RunReport { policy, skipped })
    }

    fn run_task(&self, task: &Task, shared: &Shared<'_>) {
        if shared.ctx.is_cancelled() {
            debug!("not starting {}: run cancelled", task.reference);
            return;
        }
        shared.observer.task_started(task);

        let outcome = match self.resolve(task, shared) {
            Ok(result) => {
                shared.results.record(task.index, result);
                TaskOutcome::Resolved
            }
            Err(ResolveError::Fatal(e)) if e.is_cancellation() => {
                debug!("{} cancelled", task.reference);
                TaskOutcome::Cancelled
            }
            Err(ResolveError::Fatal(e)) => {
                debug!("{} failed: {e}", task.reference);
                {
                    let mut failure = shared
                        .failure
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner);
                    if failure.is_none() {
                        *failure = Some(CoreError::Resolve {
                            kind: task.reference.kind(),
                            reference: task.reference.original().to_owned(),
                            source: e,
                        });
                    }
                }
                // Recorded first so the error, not the cancellation, is reported.
                shared.ctx.cancel_token().cancel();
                TaskOutcome::Failed
            }
            Err(e) => {
                warn!("skipping {}: {e}", task.reference);
                shared
                    .skipped
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push((
                        task.index,
                        SkippedReference {
                            kind: task.reference.kind(),
                            reference: task.reference.original().to_owned(),
                            reason: e.to_string(),
                        },
                    ));
                TaskOutcome::Skipped
            }
        };
        shared.observer.task_finished(task, outcome);
    }

    fn resolve(&self, task: &Task, shared: &Shared<'_>) -> Result<ResolutionResult, ResolveError> {
        let ctx = &shared.ctx;
        match &task.reference.source {
            Source::Image(image) => Ok(ResolutionResult::Pin(self.images.resolve(image, ctx)?)),
            Source::Http(http) => {
                let progress = TaskProgress {
                    task,
                    observer: shared.observer,
                };
                let result = self.http.resolve(&http.url, ctx, &progress)?;
                Ok(ResolutionResult::Checksum {
                    url: http.url.clone(),
                    result,
                })
            }
            Source::Git(git) => {
                let commit = self.git.resolve(git, ctx)?;
                Ok(ResolutionResult::Commit {
                    url: git.original().to_owned(),
                    commit,
                })
            }
        }
    }
}

fn transition(state: &mut RunState, to: RunState) -> Result<(), CoreError> {
    validate_transition(*state, to)?;
    debug!("run {} -> {to}", *state);
    *state = to;
    Ok(())
}
