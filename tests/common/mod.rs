#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Mutex,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::{Result, bail};
use async_trait::async_trait;
use pull_request_fixer::{
    GitHubApi, ProgressTracker, RepoFile, RepositoryRef, RestMethod,
    graphql::{ORG_REPOS_ONLY, ORG_REPOS_WITH_OPEN_PRS, REPO_OPEN_PRS_PAGE},
};
use serde_json::{Value, json};

pub fn pr(number: u64, mergeable: &str, draft: bool) -> Value {
    json!({
        "number": number,
        "title": format!("PR {number}"),
        "body": "",
        "url": format!("https://github.com/acme/repo/pull/{number}"),
        "isDraft": draft,
        "mergeable": mergeable,
        "mergeStateStatus": "CLEAN",
        "headRefName": format!("branch-{number}"),
        "commits": {"nodes": []}
    })
}

pub fn prs(count: u64) -> Vec<Value> {
    (1..=count).map(|n| pr(n, "MERGEABLE", false)).collect()
}

#[derive(Debug, Clone, Default)]
pub struct MockRepo {
    pub name: String,
    pub prs: Vec<Value>,
    /// First pull request page fails.
    pub fail_first_page: bool,
    /// Continuation page starting at this offset fails.
    pub fail_page_at: Option<usize>,
    /// Pull request pages come back with `repository: null`.
    pub vanish: bool,
    /// Pull request pages report a different repository name.
    pub renamed_to: Option<String>,
}

impl MockRepo {
    pub fn new(name: &str, prs: Vec<Value>) -> Self {
        Self {
            name: name.to_string(),
            prs,
            ..Self::default()
        }
    }
}

fn offset(cursor: Option<&str>, prefix: char) -> usize {
    cursor
        .and_then(|c| c.strip_prefix(prefix))
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

/// In-memory GitHub serving one organization plus canned REST routes.
pub struct MockGitHub {
    pub org: String,
    pub repos: Vec<MockRepo>,
    pub repos_per_page: usize,
    pub prs_per_page: usize,
    pub count_fails: bool,
    pub org_missing: bool,
    pub fail_repo_listing_at: Option<usize>,
    pub delay: Duration,

    routes: Mutex<HashMap<String, Option<Value>>>,
    failing_patch_fields: Mutex<HashSet<String>>,
    files: Mutex<HashMap<String, String>>,

    pub pr_page_requests: Mutex<Vec<(String, Option<String>)>>,
    continuation_in_flight: AtomicUsize,
    pub max_continuation_in_flight: AtomicUsize,
    pub rest_calls: Mutex<Vec<(RestMethod, String, Option<Value>)>>,
    pub updates: Mutex<Vec<(String, String, String, String)>>,
    /// Ordered log of `list r<offset>` requests and `page <repo>` responses.
    pub events: Mutex<Vec<String>>,
}

impl MockGitHub {
    pub fn new(org: &str, repos: Vec<MockRepo>) -> Self {
        Self {
            org: org.to_string(),
            repos,
            repos_per_page: 2,
            prs_per_page: 2,
            count_fails: false,
            org_missing: false,
            fail_repo_listing_at: None,
            delay: Duration::ZERO,
            routes: Mutex::new(HashMap::new()),
            failing_patch_fields: Mutex::new(HashSet::new()),
            files: Mutex::new(HashMap::new()),
            pr_page_requests: Mutex::new(Vec::new()),
            continuation_in_flight: AtomicUsize::new(0),
            max_continuation_in_flight: AtomicUsize::new(0),
            rest_calls: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn route(&self, method: RestMethod, path: &str, response: Value) {
        self.routes
            .lock()
            .unwrap()
            .insert(format!("{method} {path}"), Some(response));
    }

    pub fn fail_route(&self, method: RestMethod, path: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(format!("{method} {path}"), None);
    }

    pub fn fail_patch_of(&self, field: &str) {
        self.failing_patch_fields
            .lock()
            .unwrap()
            .insert(field.to_string());
    }

    pub fn add_file(&self, path: &str, content: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_string());
    }

    pub fn calls(&self, method: RestMethod) -> Vec<(String, Option<Value>)> {
        self.rest_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _, _)| *m == method)
            .map(|(_, path, body)| (path.clone(), body.clone()))
            .collect()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn page_requests_for(&self, repo: &str) -> Vec<Option<String>> {
        self.pr_page_requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == repo)
            .map(|(_, cursor)| cursor.clone())
            .collect()
    }

    fn repository_count(&self) -> Result<Value> {
        if self.count_fails {
            bail!("count query failed");
        }
        if self.org_missing {
            return Ok(json!({"organization": null}));
        }
        Ok(json!({
            "organization": {
                "repositories": {
                    "totalCount": self.repos.len(),
                    "nodes": [],
                    "pageInfo": {"hasNextPage": false, "endCursor": null}
                }
            }
        }))
    }

    fn repository_listing(&self, variables: &Value) -> Result<Value> {
        if self.org_missing {
            return Ok(json!({"organization": null}));
        }
        let start = offset(variables["repoCursor"].as_str(), 'r');
        self.events.lock().unwrap().push(format!("list r{start}"));
        if self.fail_repo_listing_at == Some(start) {
            bail!("repository listing failed at {start}");
        }
        let end = (start + self.repos_per_page).min(self.repos.len());
        let nodes: Vec<Value> = self.repos[start..end]
            .iter()
            .map(|repo| {
                json!({
                    "name": repo.name,
                    "nameWithOwner": format!("{}/{}", self.org, repo.name),
                    "isArchived": false,
                    "pullRequests": {
                        "totalCount": repo.prs.len(),
                        "nodes": repo.prs.iter().take(1).collect::<Vec<_>>(),
                        "pageInfo": {"hasNextPage": repo.prs.len() > 1, "endCursor": "x"}
                    }
                })
            })
            .collect();
        Ok(json!({
            "organization": {
                "repositories": {
                    "nodes": nodes,
                    "pageInfo": {
                        "hasNextPage": end < self.repos.len(),
                        "endCursor": format!("r{end}")
                    }
                }
            }
        }))
    }

    async fn pull_request_page(&self, variables: &Value) -> Result<Value> {
        let name = variables["name"].as_str().unwrap_or_default().to_string();
        let cursor = variables["prsCursor"].as_str().map(str::to_string);
        self.pr_page_requests
            .lock()
            .unwrap()
            .push((name.clone(), cursor.clone()));

        let continuation = cursor.is_some();
        if continuation {
            let now = self.continuation_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_continuation_in_flight
                .fetch_max(now, Ordering::SeqCst);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = self.pull_request_page_data(&name, cursor.as_deref());
        self.events.lock().unwrap().push(format!("page {name}"));
        if continuation {
            self.continuation_in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        result
    }

    fn pull_request_page_data(&self, name: &str, cursor: Option<&str>) -> Result<Value> {
        let Some(repo) = self.repos.iter().find(|repo| repo.name == name) else {
            return Ok(json!({"repository": null}));
        };
        let start = offset(cursor, 'p');
        if cursor.is_none() && repo.fail_first_page {
            bail!("first page of {name} failed");
        }
        if cursor.is_some() && repo.fail_page_at == Some(start) {
            bail!("page {start} of {name} failed");
        }
        if repo.vanish {
            return Ok(json!({"repository": null}));
        }

        let end = (start + self.prs_per_page).min(repo.prs.len());
        let reported_name = repo.renamed_to.clone().unwrap_or_else(|| repo.name.clone());
        Ok(json!({
            "repository": {
                "name": reported_name,
                "nameWithOwner": format!("{}/{}", self.org, reported_name),
                "isArchived": false,
                "pullRequests": {
                    "totalCount": repo.prs.len(),
                    "nodes": repo.prs[start..end],
                    "pageInfo": {
                        "hasNextPage": end < repo.prs.len(),
                        "endCursor": format!("p{end}")
                    }
                }
            }
        }))
    }
}

#[async_trait]
impl GitHubApi for MockGitHub {
    async fn graphql(&self, query: &str, variables: Value) -> Result<Value> {
        if query == ORG_REPOS_ONLY {
            self.repository_count()
        } else if query == ORG_REPOS_WITH_OPEN_PRS {
            self.repository_listing(&variables)
        } else if query == REPO_OPEN_PRS_PAGE {
            self.pull_request_page(&variables).await
        } else {
            bail!("unexpected query")
        }
    }

    async fn rest(&self, method: RestMethod, path: &str, body: Option<Value>) -> Result<Value> {
        self.rest_calls
            .lock()
            .unwrap()
            .push((method, path.to_string(), body.clone()));

        if method == RestMethod::Patch {
            let failing = self.failing_patch_fields.lock().unwrap();
            if let Some(Value::Object(fields)) = &body {
                if fields.keys().any(|field| failing.contains(field)) {
                    bail!("PATCH {path} rejected");
                }
            }
        }

        match self.routes.lock().unwrap().get(&format!("{method} {path}")) {
            Some(Some(response)) => Ok(response.clone()),
            Some(None) => bail!("{method} {path} failed"),
            None => bail!("no route for {method} {path}"),
        }
    }

    async fn get_file(
        &self,
        _repo: &RepositoryRef,
        path: &str,
        _git_ref: &str,
    ) -> Result<RepoFile> {
        match self.files.lock().unwrap().get(path) {
            Some(content) => Ok(RepoFile {
                path: path.to_string(),
                sha: format!("sha-{path}"),
                content: content.clone(),
            }),
            None => bail!("404 {path}"),
        }
    }

    async fn update_file(
        &self,
        _repo: &RepositoryRef,
        file: &RepoFile,
        new_content: &str,
        message: &str,
        branch: &str,
    ) -> Result<()> {
        self.updates.lock().unwrap().push((
            file.path.clone(),
            new_content.to_string(),
            message.to_string(),
            branch.to_string(),
        ));
        Ok(())
    }
}

/// Records progress events and the peak number of repositories in flight.
#[derive(Default)]
pub struct RecordingProgress {
    pub total: AtomicU64,
    pub started: Mutex<Vec<String>>,
    pub completed: Mutex<Vec<usize>>,
    pub errors: AtomicUsize,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl RecordingProgress {
    pub fn completed_counts(&self) -> Vec<usize> {
        let mut counts = self.completed.lock().unwrap().clone();
        counts.sort_unstable();
        counts
    }
}

impl ProgressTracker for RecordingProgress {
    fn update_total_repositories(&self, total: u64) {
        self.total.store(total, Ordering::SeqCst);
    }

    fn start_repository(&self, full_name: &str) {
        self.started.lock().unwrap().push(full_name.to_string());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
    }

    fn complete_repository(&self, pr_count: usize) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.completed.lock().unwrap().push(pr_count);
    }

    fn add_error(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
}
