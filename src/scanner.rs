//! Organization-wide discovery of open pull requests.
//!
//! Repositories are discovered page by page and handed to bounded
//! per-repository tasks as soon as they are seen. Each task drains the
//! repository's open pull requests onto a shared channel, which the caller
//! consumes as a [`Stream`] in completion order.

use std::{
    pin::Pin,
    sync::Arc,
    task::{Context as TaskContext, Poll},
};

use anyhow::{Context, Result};
use futures::{
    Stream, StreamExt,
    stream::{self, BoxStream},
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::{
    sync::{Semaphore, mpsc},
    task::{JoinHandle, JoinSet},
};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, warn};

use crate::{
    github::{GitHubApi, redact_secrets},
    graphql::{
        ORG_REPOS_ONLY, ORG_REPOS_WITH_OPEN_PRS, REPO_OPEN_PRS_PAGE, org_repos_count_variables,
        org_repos_with_open_prs_variables, repo_open_prs_variables,
    },
    progress::{NoProgress, ProgressTracker},
    types::{
        OrganizationData, PageInfo, PullRequestConnection, PullRequestNode, RepositoryConnection,
        RepositoryData, RepositoryNode, RepositoryRef,
    },
};

pub const DEFAULT_MAX_REPO_TASKS: usize = 8;
pub const DEFAULT_MAX_PAGE_TASKS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConfig {
    /// Repositories processed at the same time.
    pub max_repo_tasks: usize,
    /// Continuation page requests in flight across all repositories.
    pub max_page_tasks: usize,
    pub include_drafts: bool,
}

impl ScanConfig {
    pub fn new(max_repo_tasks: usize, max_page_tasks: usize, include_drafts: bool) -> Self {
        Self {
            max_repo_tasks: max_repo_tasks.clamp(1, Semaphore::MAX_PERMITS),
            max_page_tasks: max_page_tasks.clamp(1, Semaphore::MAX_PERMITS),
            include_drafts,
        }
    }

    /// Ceilings derived from a worker count: `workers` repositories and
    /// twice as many page requests.
    pub fn for_workers(workers: usize, include_drafts: bool) -> Self {
        Self::new(workers, workers.saturating_mul(2), include_drafts)
    }

    pub fn includes(&self, pr: &PullRequestNode) -> bool {
        self.include_drafts || !pr.is_draft()
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REPO_TASKS, DEFAULT_MAX_PAGE_TASKS, false)
    }
}

/// A pull request yielded by an organization scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedPullRequest {
    pub repository: RepositoryRef,
    pub pull_request: PullRequestNode,
}

impl ScannedPullRequest {
    pub fn owner(&self) -> &str {
        &self.repository.owner
    }

    pub fn repo_name(&self) -> &str {
        &self.repository.name
    }
}

enum Cursor {
    Start,
    After(String),
    Exhausted,
}

impl Cursor {
    fn following(page_info: &PageInfo) -> Self {
        match page_info.next_cursor() {
            Some(cursor) => Cursor::After(cursor.to_string()),
            None => Cursor::Exhausted,
        }
    }
}

fn decode<T: DeserializeOwned>(what: &str, data: Value) -> Option<T> {
    match serde_json::from_value(data) {
        Ok(decoded) => Some(decoded),
        Err(err) => {
            debug!(error = %err, "Treating malformed {} response as empty", what);
            None
        }
    }
}

/// Scans GitHub organizations for open pull requests.
///
/// Cloning is cheap and clones share the same concurrency ceilings.
#[derive(Clone)]
pub struct PrScanner {
    api: Arc<dyn GitHubApi>,
    progress: Arc<dyn ProgressTracker>,
    config: ScanConfig,
    repo_slots: Arc<Semaphore>,
    page_slots: Arc<Semaphore>,
}

impl PrScanner {
    pub fn new(api: Arc<dyn GitHubApi>, config: ScanConfig) -> Self {
        Self::with_progress(api, Arc::new(NoProgress), config)
    }

    pub fn with_progress(
        api: Arc<dyn GitHubApi>,
        progress: Arc<dyn ProgressTracker>,
        config: ScanConfig,
    ) -> Self {
        let config = ScanConfig::new(
            config.max_repo_tasks,
            config.max_page_tasks,
            config.include_drafts,
        );
        Self {
            api,
            progress,
            repo_slots: Arc::new(Semaphore::new(config.max_repo_tasks)),
            page_slots: Arc::new(Semaphore::new(config.max_page_tasks)),
            config,
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Starts scanning `organization` and returns the stream of candidate
    /// pull requests (drafts filtered per [`ScanConfig::include_drafts`]).
    ///
    /// The repository count is fetched and reported before scanning starts.
    /// Results arrive in completion order.
    pub async fn scan_organization(&self, organization: &str) -> OrgScan {
        info!(organization = %organization, "Starting organization scan");

        let total = self.count_org_repositories(organization).await;
        self.progress.update_total_repositories(total);
        debug!(organization = %organization, total, "Counted repositories");

        let (tx, rx) = mpsc::unbounded_channel();
        let producer = tokio::spawn(self.clone().produce(organization.to_string(), tx));

        OrgScan {
            results: UnboundedReceiverStream::new(rx),
            producer: Some(producer),
        }
    }

    /// Total repositories in the organization; 0 when it cannot be counted.
    pub async fn count_org_repositories(&self, organization: &str) -> u64 {
        let data = match self
            .api
            .graphql(ORG_REPOS_ONLY, org_repos_count_variables(organization))
            .await
        {
            Ok(data) => data,
            Err(err) => {
                error!(organization = %organization, error = %redact_secrets(&format!("{err:#}")), "Error counting repositories");
                return 0;
            }
        };

        match decode::<OrganizationData>("repository count", data)
            .and_then(OrganizationData::into_repositories)
        {
            Some(repositories) => repositories.total_count,
            None => {
                warn!(organization = %organization, "No data returned for organization");
                0
            }
        }
    }

    async fn produce(self, organization: String, tx: mpsc::UnboundedSender<ScannedPullRequest>) {
        let mut tasks = JoinSet::new();
        let mut repositories = self.org_repositories_with_open_prs(&organization);

        while let Some(repository) = repositories.next().await {
            tasks.spawn(self.clone().process_repository(repository, tx.clone()));
        }
        // The output stream ends once the last task drops its sender.
        drop(tx);

        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                warn!(organization = %organization, error = %err, "Repository task did not complete");
            }
        }
        debug!(organization = %organization, "Organization scan finished");
    }

    async fn process_repository(
        self,
        repository: RepositoryNode,
        tx: mpsc::UnboundedSender<ScannedPullRequest>,
    ) {
        let Ok(_slot) = self.repo_slots.clone().acquire_owned().await else {
            return;
        };

        let repo = repository.repository();
        let full_name = repo.full_name();
        self.progress.start_repository(&full_name);

        match self.drain_repository(&repo, &tx).await {
            Ok(count) => {
                self.progress.complete_repository(count);
                debug!(repository = %full_name, pull_requests = count, "Repository scanned");
            }
            Err(err) => {
                error!(repository = %full_name, error = %redact_secrets(&format!("{err:#}")), "Error scanning repository");
                self.progress.add_error();
            }
        }
    }

    async fn drain_repository(
        &self,
        repo: &RepositoryRef,
        tx: &mpsc::UnboundedSender<ScannedPullRequest>,
    ) -> Result<usize> {
        let mut count = 0;
        let mut enqueue = |pr: PullRequestNode| {
            if self.config.includes(&pr) {
                // A closed channel means the consumer has gone away; the
                // repository is still drained so progress stays accurate.
                let _ = tx.send(ScannedPullRequest {
                    repository: repo.clone(),
                    pull_request: pr,
                });
                count += 1;
            }
        };

        let Some(first_page) = self
            .fetch_pull_request_page(repo, None)
            .await
            .with_context(|| format!("Failed to fetch pull requests for {repo}"))?
        else {
            return Ok(0);
        };

        let next = first_page.page_info.next_cursor().map(str::to_string);
        first_page.nodes.into_iter().for_each(&mut enqueue);

        if let Some(cursor) = next {
            let mut remaining = self.repository_pull_requests(repo, cursor);
            while let Some(pr) = remaining.next().await {
                enqueue(pr);
            }
        }

        Ok(count)
    }

    /// Repositories of `organization` that currently have open pull
    /// requests. Ends quietly when the organization is missing or a page
    /// request fails.
    pub fn org_repositories_with_open_prs(
        &self,
        organization: &str,
    ) -> BoxStream<'static, RepositoryNode> {
        let scanner = self.clone();
        let organization = organization.to_string();

        stream::unfold(Cursor::Start, move |cursor| {
            let scanner = scanner.clone();
            let organization = organization.clone();
            async move {
                let after = match cursor {
                    Cursor::Start => None,
                    Cursor::After(cursor) => Some(cursor),
                    Cursor::Exhausted => return None,
                };

                match scanner
                    .fetch_org_repositories_page(&organization, after.as_deref())
                    .await
                {
                    Ok(Some(page)) => {
                        let next = Cursor::following(&page.page_info);
                        let repositories: Vec<RepositoryNode> = page
                            .nodes
                            .into_iter()
                            .filter(RepositoryNode::has_open_pull_requests)
                            .collect();
                        Some((repositories, next))
                    }
                    Ok(None) => None,
                    Err(err) => {
                        error!(organization = %organization, error = %redact_secrets(&format!("{err:#}")), "Error iterating repositories");
                        None
                    }
                }
            }
        })
        .flat_map(stream::iter)
        .boxed()
    }

    /// Open pull requests of one repository, starting after `after_cursor`.
    ///
    /// Every page request holds a page slot for its duration. Ends quietly
    /// when the repository disappears or a request fails.
    pub fn repository_pull_requests(
        &self,
        repo: &RepositoryRef,
        after_cursor: String,
    ) -> BoxStream<'static, PullRequestNode> {
        let scanner = self.clone();
        let repo = repo.clone();

        stream::unfold(Cursor::After(after_cursor), move |cursor| {
            let scanner = scanner.clone();
            let repo = repo.clone();
            async move {
                let Cursor::After(after) = cursor else {
                    return None;
                };

                let page = {
                    let _slot = scanner.page_slots.clone().acquire_owned().await.ok()?;
                    scanner.fetch_pull_request_page(&repo, Some(&after)).await
                };

                match page {
                    Ok(Some(page)) => {
                        let next = Cursor::following(&page.page_info);
                        Some((page.nodes, next))
                    }
                    Ok(None) => None,
                    Err(err) => {
                        error!(repository = %repo, error = %redact_secrets(&format!("{err:#}")), "Error fetching pull request page");
                        None
                    }
                }
            }
        })
        .flat_map(stream::iter)
        .boxed()
    }

    async fn fetch_org_repositories_page(
        &self,
        organization: &str,
        cursor: Option<&str>,
    ) -> Result<Option<RepositoryConnection>> {
        let data = self
            .api
            .graphql(
                ORG_REPOS_WITH_OPEN_PRS,
                org_repos_with_open_prs_variables(organization, cursor),
            )
            .await?;
        Ok(decode::<OrganizationData>("repository page", data)
            .and_then(OrganizationData::into_repositories))
    }

    /// One page of `repo`'s open pull requests, or `None` when the response
    /// does not describe that repository.
    async fn fetch_pull_request_page(
        &self,
        repo: &RepositoryRef,
        cursor: Option<&str>,
    ) -> Result<Option<PullRequestConnection>> {
        let data = self
            .api
            .graphql(
                REPO_OPEN_PRS_PAGE,
                repo_open_prs_variables(&repo.owner, &repo.name, cursor),
            )
            .await?;

        let repository = decode::<RepositoryData>("pull request page", data)
            .and_then(|data| data.repository)
            .filter(|node| node.name.eq_ignore_ascii_case(&repo.name));

        if repository.is_none() {
            debug!(repository = %repo, "Repository not present in response");
        }
        Ok(repository.map(|node| node.pull_requests))
    }
}

/// Stream of pull requests produced by [`PrScanner::scan_organization`].
///
/// Dropping the stream early does not cancel the scan: the background
/// producer still runs to completion. Call [`OrgScan::finish`] to wait for it.
pub struct OrgScan {
    results: UnboundedReceiverStream<ScannedPullRequest>,
    producer: Option<JoinHandle<()>>,
}

impl OrgScan {
    /// Stops accepting results and waits for the producer and every
    /// repository task to finish.
    pub async fn finish(mut self) -> Result<()> {
        self.results.close();
        match self.producer.take() {
            Some(producer) => producer.await.context("Scan producer task failed"),
            None => Ok(()),
        }
    }

    /// Drains the whole scan into a vector.
    pub async fn collect_all(mut self) -> Result<Vec<ScannedPullRequest>> {
        let mut found = Vec::new();
        while let Some(pr) = self.next().await {
            found.push(pr);
        }
        self.finish().await?;
        Ok(found)
    }
}

impl Drop for OrgScan {
    fn drop(&mut self) {
        if let Some(producer) = &self.producer
            && !producer.is_finished()
        {
            debug!("Organization scan dropped before finishing; producer continues detached");
        }
    }
}

impl Stream for OrgScan {
    type Item = ScannedPullRequest;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.results).poll_next(cx)
    }
}
