use sourcepin_resolve::{ChecksumResult, PinnedImage};
use sourcepin_schema::{CommitHash, Policy};
use std::sync::{Mutex, PoisonError};

/// What a successful task produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionResult {
    Pin(PinnedImage),
    Checksum { url: String, result: ChecksumResult },
    Commit { url: String, commit: CommitHash },
}

#[derive(Debug, Default)]
struct Buckets {
    images: Vec<(usize, PinnedImage)>,
    http: Vec<(usize, String, ChecksumResult)>,
    git: Vec<(usize, String, CommitHash)>,
}

/// Collects results from concurrent workers. Arrival order is irrelevant;
/// rules are emitted by order index when the policy is built.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    buckets: Mutex<Buckets>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, index: usize, result: ResolutionResult) {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        match result {
            ResolutionResult::Pin(pinned) => buckets.images.push((index, pinned)),
            ResolutionResult::Checksum { url, result } => buckets.http.push((index, url, result)),
            ResolutionResult::Commit { url, commit } => buckets.git.push((index, url, commit)),
        }
    }

    pub fn len(&self) -> usize {
        let buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        buckets.images.len() + buckets.http.len() + buckets.git.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Image rules, then HTTP rules, then git rules, each in order index order.
    pub fn into_policy(self) -> Policy {
        let mut buckets = self
            .buckets
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        buckets.images.sort_by_key(|(index, _)| *index);
        buckets.http.sort_by_key(|(index, _, _)| *index);
        buckets.git.sort_by_key(|(index, _, _)| *index);

        let mut policy = Policy::new();
        for (_, pinned) in &buckets.images {
            policy.add_pin_rule(&pinned.original, &pinned.pinned);
        }
        for (_, url, result) in &buckets.http {
            policy.add_http_checksum_rule(url, &result.checksum, &result.headers);
        }
        for (_, url, commit) in &buckets.git {
            policy.add_git_checksum_rule(url, commit);
        }
        policy
    }
}
