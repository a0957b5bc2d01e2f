//! End-to-end runs: scan an organization or load a single pull request,
//! then fix what was found.

use std::sync::Arc;

use anyhow::Result;
use futures::{StreamExt, stream};
use tracing::{error, info, warn};

use crate::{
    blocking::{BlockingReason, classify},
    fixer::{FixOptions, FixReport, FixTarget, PrFixer},
    github::{GitHubApi, redact_secrets},
    progress::ProgressTracker,
    scanner::{PrScanner, ScanConfig, ScannedPullRequest},
    types::RepositoryRef,
};

pub const DEFAULT_WORKERS: usize = 4;
pub const MAX_WORKERS: usize = 32;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub fix: FixOptions,
    pub include_drafts: bool,
    /// Scan and fix concurrency.
    pub workers: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            fix: FixOptions::default(),
            include_drafts: false,
            workers: DEFAULT_WORKERS,
        }
    }
}

impl RunOptions {
    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig::for_workers(self.workers, self.include_drafts)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockedPullRequest {
    pub scanned: ScannedPullRequest,
    pub reasons: Vec<BlockingReason>,
}

impl BlockedPullRequest {
    pub fn repository(&self) -> &RepositoryRef {
        &self.scanned.repository
    }

    pub fn number(&self) -> Option<u64> {
        self.scanned.pull_request.number()
    }

    pub fn title(&self) -> &str {
        self.scanned.pull_request.title()
    }

    pub fn url(&self) -> Option<&str> {
        self.scanned.pull_request.url()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub blocked: Vec<BlockedPullRequest>,
    pub reports: Vec<FixReport>,
    pub errors: usize,
    pub dry_run: bool,
}

impl RunSummary {
    fn new(dry_run: bool) -> Self {
        Self {
            blocked: Vec::new(),
            reports: Vec::new(),
            errors: 0,
            dry_run,
        }
    }

    /// Pull requests that were fixed (or would be, in a dry run).
    pub fn fixed(&self) -> usize {
        self.reports.iter().filter(|report| report.is_fixed()).count()
    }
}

/// Scans `organization`, keeps the blocked pull requests and fixes them.
pub async fn run_organization(
    api: Arc<dyn GitHubApi>,
    organization: &str,
    options: &RunOptions,
    progress: Arc<dyn ProgressTracker>,
) -> Result<RunSummary> {
    let scanner = PrScanner::with_progress(api.clone(), progress, options.scan_config());
    let mut summary = RunSummary::new(options.fix.dry_run);

    let mut scan = scanner.scan_organization(organization).await;
    while let Some(scanned) = scan.next().await {
        let result = classify(&scanned.pull_request);
        if result.is_blocked() {
            summary.blocked.push(BlockedPullRequest {
                scanned,
                reasons: result.reasons,
            });
        }
    }
    scan.finish().await?;
    info!(organization = %organization, blocked = summary.blocked.len(), "Scan complete");

    let fixer = PrFixer::new(api);
    let targets: Vec<FixTarget> = summary
        .blocked
        .iter()
        .filter_map(|blocked| {
            let target = FixTarget::from_scanned(&blocked.scanned);
            if target.is_none() {
                warn!(repository = %blocked.repository(), "Blocked pull request has no number");
            }
            target
        })
        .collect();

    let results: Vec<(FixTarget, Result<FixReport>)> = stream::iter(targets)
        .map(|target| {
            let fixer = &fixer;
            let fix = &options.fix;
            async move {
                let result = fixer.fix(&target, fix).await;
                (target, result)
            }
        })
        .buffer_unordered(options.workers.max(1))
        .collect()
        .await;

    for (target, result) in results {
        match result {
            Ok(report) => summary.reports.push(report),
            Err(err) => {
                error!(pull_request = %target, error = %redact_secrets(&format!("{err:#}")), "Failed to fix pull request");
                summary.errors += 1;
            }
        }
    }

    Ok(summary)
}

/// Fixes a single pull request whether or not it is blocked.
pub async fn run_pull_request(
    api: Arc<dyn GitHubApi>,
    repository: RepositoryRef,
    number: u64,
    options: &RunOptions,
) -> Result<RunSummary> {
    let fixer = PrFixer::new(api);
    let target = fixer.load_target(repository, number).await?;
    let report = fixer.fix(&target, &options.fix).await?;

    let mut summary = RunSummary::new(options.fix.dry_run);
    summary.reports.push(report);
    Ok(summary)
}
