use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tracing::{debug, info};

/// Receives scan lifecycle events. Calls are fire-and-forget.
pub trait ProgressTracker: Send + Sync {
    fn update_total_repositories(&self, total: u64);
    fn start_repository(&self, full_name: &str);
    fn complete_repository(&self, pr_count: usize);
    fn add_error(&self);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressTracker for NoProgress {
    fn update_total_repositories(&self, _total: u64) {}
    fn start_repository(&self, _full_name: &str) {}
    fn complete_repository(&self, _pr_count: usize) {}
    fn add_error(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressSnapshot {
    pub total_repositories: u64,
    pub started: usize,
    pub completed: usize,
    pub errors: usize,
    pub pull_requests: usize,
}

/// Counts events and reports them through `tracing`.
#[derive(Debug, Default)]
pub struct LogProgress {
    total: AtomicU64,
    started: AtomicUsize,
    completed: AtomicUsize,
    errors: AtomicUsize,
    pull_requests: AtomicUsize,
}

impl LogProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total_repositories: self.total.load(Ordering::Relaxed),
            started: self.started.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            pull_requests: self.pull_requests.load(Ordering::Relaxed),
        }
    }
}

impl ProgressTracker for LogProgress {
    fn update_total_repositories(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        info!(repositories = total, "Organization repository count");
    }

    fn start_repository(&self, full_name: &str) {
        let started = self.started.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(repository = %full_name, started, "Scanning repository");
    }

    fn complete_repository(&self, pr_count: usize) {
        let completed = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        let found = self.pull_requests.fetch_add(pr_count, Ordering::Relaxed) + pr_count;
        let total = self.total.load(Ordering::Relaxed);
        info!(completed, total, pull_requests = found, "Repository scanned");
    }

    fn add_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_progress_counts() {
        let progress = LogProgress::new();
        progress.update_total_repositories(3);
        progress.start_repository("acme/a");
        progress.complete_repository(2);
        progress.start_repository("acme/b");
        progress.add_error();

        assert_eq!(
            progress.snapshot(),
            ProgressSnapshot {
                total_repositories: 3,
                started: 2,
                completed: 1,
                errors: 1,
                pull_requests: 2,
            }
        );
    }
}
