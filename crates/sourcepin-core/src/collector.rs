use sourcepin_schema::{
    ExtractedManifest, GitReference, HttpReference, ImageReference, ReferenceRecord, SchemaError,
    Source, SourceReference,
};
use std::collections::HashSet;
use tracing::debug;

/// One reference to resolve. `index` is its position in the emitted policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub index: usize,
    pub reference: SourceReference,
}

/// Walks extracted manifests and produces deduplicated tasks per source kind.
///
/// A literal is kept the first time it is seen for its kind, in any manifest;
/// later occurrences are dropped. Order indices are handed out across all
/// three kinds as references are first observed, so the policy can be emitted
/// in manifest order after the concurrent run. Image references that already
/// carry a digest are marked seen but produce no task.
#[derive(Debug, Default)]
pub struct TaskCollector {
    seen_images: HashSet<String>,
    seen_http: HashSet<String>,
    seen_git: HashSet<String>,
    images: Vec<Task>,
    http: Vec<Task>,
    git: Vec<Task>,
    next_index: usize,
}

impl TaskCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one manifest's references: images first, then HTTP, then git.
    pub fn collect(&mut self, manifest: &ExtractedManifest) -> Result<(), SchemaError> {
        for record in &manifest.images {
            if self.seen_images.contains(&record.original) {
                continue;
            }
            let image = ImageReference::parse(&record.original)?;
            self.seen_images.insert(record.original.clone());
            if image.is_digested() {
                debug!(
                    "{}: {} is already pinned",
                    manifest.display_name(),
                    record.original
                );
                continue;
            }
            let task = self.task(record, Source::Image(image));
            self.images.push(task);
        }

        for record in &manifest.http {
            if self.seen_http.insert(record.original.clone()) {
                let source = Source::Http(HttpReference {
                    url: record.original.clone(),
                });
                let task = self.task(record, source);
                self.http.push(task);
            }
        }

        for record in &manifest.git {
            if self.seen_git.insert(record.original.clone()) {
                let source = Source::Git(GitReference::parse(&record.original)?);
                let task = self.task(record, source);
                self.git.push(task);
            }
        }

        Ok(())
    }

    fn task(&mut self, record: &ReferenceRecord, source: Source) -> Task {
        let index = self.next_index;
        self.next_index += 1;
        Task {
            index,
            reference: SourceReference {
                line: record.line,
                source,
            },
        }
    }

    pub fn images(&self) -> &[Task] {
        &self.images
    }

    pub fn http(&self) -> &[Task] {
        &self.http
    }

    pub fn git(&self) -> &[Task] {
        &self.git
    }

    pub fn len(&self) -> usize {
        self.images.len() + self.http.len() + self.git.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All tasks, images then HTTP then git.
    pub fn into_tasks(self) -> Vec<Task> {
        let mut tasks = self.images;
        tasks.extend(self.http);
        tasks.extend(self.git);
        tasks
    }
}
