//! Terminal progress for a pinning run: a spinner per task, turned into a
//! byte bar when an HTTP task has to download.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use sourcepin_core::{RunObserver, Task, TaskOutcome};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

const SPINNER_TEMPLATE: &str = "{spinner:.cyan} {msg}";
const BYTES_TEMPLATE: &str =
    "{spinner:.cyan} {msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})";
const UNSIZED_TEMPLATE: &str = "{spinner:.cyan} {msg} {bytes} ({bytes_per_sec})";

#[derive(Default)]
pub struct ProgressReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<usize, ProgressBar>>,
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .expect("valid template")
        .progress_chars("=> ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"])
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn bar(&self, task: &Task) -> Option<ProgressBar> {
        self.bars
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&task.index)
            .cloned()
    }

    /// Remove any bars still on screen so later output starts on a clean line.
    pub fn clear(&self) {
        let _ = self.multi.clear();
    }
}

impl RunObserver for ProgressReporter {
    fn task_started(&self, task: &Task) {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(style(SPINNER_TEMPLATE));
        pb.set_message(task.reference.to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
        self.bars
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task.index, pb);
    }

    fn download_started(&self, task: &Task, declared: Option<u64>) {
        let Some(pb) = self.bar(task) else { return };
        match declared {
            Some(len) => {
                pb.set_length(len);
                pb.set_style(style(BYTES_TEMPLATE));
            }
            None => pb.set_style(style(UNSIZED_TEMPLATE)),
        }
    }

    fn bytes_received(&self, task: &Task, n: u64) {
        if let Some(pb) = self.bar(task) {
            pb.inc(n);
        }
    }

    fn task_finished(&self, task: &Task, outcome: TaskOutcome) {
        let Some(pb) = self.bar(task) else { return };
        let mark = match outcome {
            TaskOutcome::Resolved => console::style("✓").green(),
            TaskOutcome::Skipped => console::style("-").yellow(),
            TaskOutcome::Failed => console::style("✗").red(),
            TaskOutcome::Cancelled => {
                pb.finish_and_clear();
                return;
            }
        };
        pb.set_style(style("{msg}"));
        pb.finish_with_message(format!("{mark} {}", task.reference));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sourcepin_schema::{HttpReference, Source, SourceReference};

    fn task() -> Task {
        Task {
            index: 0,
            reference: SourceReference {
                line: 3,
                source: Source::Http(HttpReference {
                    url: "https://example.com/a.tgz".to_owned(),
                }),
            },
        }
    }

    #[test]
    fn templates_are_valid() {
        for template in [SPINNER_TEMPLATE, BYTES_TEMPLATE, UNSIZED_TEMPLATE] {
            assert!(ProgressStyle::with_template(template).is_ok(), "{template}");
        }
    }

    #[test]
    fn download_turns_spinner_into_bar() {
        let reporter = ProgressReporter::new();
        let task = task();
        reporter.task_started(&task);
        reporter.download_started(&task, Some(10));
        reporter.bytes_received(&task, 4);
        let pb = reporter.bar(&task).unwrap();
        assert_eq!(pb.length(), Some(10));
        assert_eq!(pb.position(), 4);
        reporter.task_finished(&task, TaskOutcome::Resolved);
        assert!(pb.is_finished());
    }

    #[test]
    fn events_for_unknown_tasks_are_ignored() {
        let reporter = ProgressReporter::new();
        let task = task();
        reporter.download_started(&task, None);
        reporter.bytes_received(&task, 1);
        reporter.task_finished(&task, TaskOutcome::Failed);
        assert!(reporter.bar(&task).is_none());
    }
}
