//! Aligns pull request titles and descriptions with their first commit.

use std::{fmt, sync::Arc};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::{
    commit::CommitMessage,
    files::{FileChange, FileFixer},
    github::{GitHubApi, RestMethod, redact_secrets},
    scanner::ScannedPullRequest,
    transform::FileRule,
    types::{CheckConclusion, RepositoryRef},
};

/// The pull request being fixed and the metadata it currently carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixTarget {
    pub repository: RepositoryRef,
    pub number: u64,
    pub title: String,
    pub body: String,
    pub head_ref: Option<String>,
}

impl FixTarget {
    /// `None` when the scanned node carries no number.
    pub fn from_scanned(scanned: &ScannedPullRequest) -> Option<Self> {
        let pr = &scanned.pull_request;
        Some(Self {
            repository: scanned.repository.clone(),
            number: pr.number()?,
            title: pr.title().to_string(),
            body: pr.body().to_string(),
            head_ref: pr.head_ref().map(str::to_string),
        })
    }

    /// Builds a target from a REST `GET /repos/{o}/{r}/pulls/{n}` payload.
    pub fn from_rest(repository: RepositoryRef, pull: &Value) -> Result<Self> {
        let Some(number) = pull.get("number").and_then(Value::as_u64) else {
            bail!("Pull request payload for {repository} has no number");
        };
        let text = |field: &str| {
            pull.get(field)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Ok(Self {
            number,
            title: text("title"),
            body: text("body"),
            head_ref: pull
                .pointer("/head/ref")
                .and_then(Value::as_str)
                .map(str::to_string),
            repository,
        })
    }

    fn api_path(&self, suffix: &str) -> String {
        format!(
            "/repos/{}/{}/{}",
            self.repository.owner, self.repository.name, suffix
        )
    }
}

impl fmt::Display for FixTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.repository, self.number)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FixOptions {
    pub fix_title: bool,
    pub fix_body: bool,
    pub dry_run: bool,
    pub file_rule: Option<FileRule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrField {
    Title,
    Body,
}

impl PrField {
    fn api_name(self) -> &'static str {
        match self {
            PrField::Title => "title",
            PrField::Body => "body",
        }
    }
}

impl fmt::Display for PrField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: PrField,
    pub old: String,
    pub new: String,
    /// False for dry runs and for updates GitHub rejected.
    pub applied: bool,
}

/// Outcome of fixing one pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixReport {
    pub target: FixTarget,
    pub fields: Vec<FieldChange>,
    pub files: Vec<FileChange>,
    pub rerun_checks: usize,
    pub commented: bool,
    pub dry_run: bool,
}

impl FixReport {
    fn new(target: FixTarget, dry_run: bool) -> Self {
        Self {
            target,
            fields: Vec::new(),
            files: Vec::new(),
            rerun_checks: 0,
            commented: false,
            dry_run,
        }
    }

    pub fn applied_fields(&self) -> impl Iterator<Item = PrField> + '_ {
        self.fields
            .iter()
            .filter(|change| change.applied)
            .map(|change| change.field)
    }

    pub fn applied_files(&self) -> usize {
        self.files.iter().filter(|file| file.applied).count()
    }

    pub fn has_applied_changes(&self) -> bool {
        self.applied_fields().next().is_some() || self.applied_files() > 0
    }

    /// Whether anything was changed, or in a dry run would have been.
    pub fn is_fixed(&self) -> bool {
        if self.dry_run {
            !self.fields.is_empty() || !self.files.is_empty()
        } else {
            self.has_applied_changes()
        }
    }
}

#[derive(Debug, Deserialize)]
struct CheckRuns {
    #[serde(default)]
    check_runs: Vec<CheckRun>,
}

#[derive(Debug, Deserialize)]
struct CheckRun {
    id: u64,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    conclusion: Option<String>,
}

impl CheckRun {
    fn is_rerunnable(&self) -> bool {
        self.status.as_deref() == Some("completed")
            && self
                .conclusion
                .as_deref()
                .is_some_and(|conclusion| CheckConclusion::from_graphql(conclusion).is_failing())
    }
}

#[derive(Clone)]
pub struct PrFixer {
    api: Arc<dyn GitHubApi>,
    files: FileFixer,
}

impl PrFixer {
    pub fn new(api: Arc<dyn GitHubApi>) -> Self {
        Self {
            files: FileFixer::new(api.clone()),
            api,
        }
    }

    /// Fetches a pull request through REST and wraps it as a fix target.
    pub async fn load_target(&self, repository: RepositoryRef, number: u64) -> Result<FixTarget> {
        let path = format!(
            "/repos/{}/{}/pulls/{}",
            repository.owner, repository.name, number
        );
        let pull = self
            .api
            .rest(RestMethod::Get, &path, None)
            .await
            .with_context(|| format!("Failed to fetch {repository}#{number}"))?;
        FixTarget::from_rest(repository, &pull)
    }

    /// Message of the pull request's first commit, `None` when it has none.
    pub async fn first_commit_message(
        &self,
        repository: &RepositoryRef,
        number: u64,
    ) -> Result<Option<CommitMessage>> {
        let path = format!(
            "/repos/{}/{}/pulls/{}/commits",
            repository.owner, repository.name, number
        );
        let commits = self
            .api
            .rest(RestMethod::Get, &path, None)
            .await
            .with_context(|| format!("Failed to list commits of {repository}#{number}"))?;

        Ok(commits
            .pointer("/0/commit/message")
            .and_then(Value::as_str)
            .map(CommitMessage::parse))
    }

    /// Updates title and body from the first commit, then re-runs failed
    /// checks and leaves a comment when something changed.
    pub async fn fix_metadata(&self, target: &FixTarget, options: &FixOptions) -> Result<FixReport> {
        let mut report = FixReport::new(target.clone(), options.dry_run);
        report.fields = self.apply_metadata(target, options).await?;
        self.follow_up(&mut report).await;
        Ok(report)
    }

    /// Metadata fixes plus the file rule from `options`, if any.
    pub async fn fix(&self, target: &FixTarget, options: &FixOptions) -> Result<FixReport> {
        let mut report = FixReport::new(target.clone(), options.dry_run);
        if options.fix_title || options.fix_body {
            report.fields = self.apply_metadata(target, options).await?;
        }
        if let Some(rule) = &options.file_rule {
            report.files = self.files.fix_files(target, rule, options.dry_run).await?;
        }
        self.follow_up(&mut report).await;
        Ok(report)
    }

    fn plan_metadata(
        target: &FixTarget,
        commit: &CommitMessage,
        options: &FixOptions,
    ) -> Vec<FieldChange> {
        let mut planned = Vec::new();
        if options.fix_title && !commit.subject.is_empty() && commit.subject != target.title {
            planned.push(FieldChange {
                field: PrField::Title,
                old: target.title.clone(),
                new: commit.subject.clone(),
                applied: false,
            });
        }
        if options.fix_body && !commit.body.is_empty() && commit.body != target.body.trim() {
            planned.push(FieldChange {
                field: PrField::Body,
                old: target.body.clone(),
                new: commit.body.clone(),
                applied: false,
            });
        }
        planned
    }

    async fn apply_metadata(
        &self,
        target: &FixTarget,
        options: &FixOptions,
    ) -> Result<Vec<FieldChange>> {
        let Some(commit) = self
            .first_commit_message(&target.repository, target.number)
            .await?
        else {
            warn!(pull_request = %target, "Could not retrieve first commit");
            return Ok(Vec::new());
        };

        let mut changes = Self::plan_metadata(target, &commit, options);
        if changes.is_empty() {
            debug!(pull_request = %target, "Metadata already matches first commit");
        }
        if options.dry_run {
            for change in &changes {
                info!(pull_request = %target, field = %change.field, "Would update");
            }
            return Ok(changes);
        }

        let path = target.api_path(&format!("pulls/{}", target.number));
        for change in &mut changes {
            let body = json!({ change.field.api_name(): change.new });
            match self.api.rest(RestMethod::Patch, &path, Some(body)).await {
                Ok(_) => {
                    change.applied = true;
                    info!(pull_request = %target, field = %change.field, "Updated");
                }
                Err(err) => {
                    warn!(pull_request = %target, field = %change.field, error = %redact_secrets(&format!("{err:#}")), "Update failed");
                }
            }
        }
        Ok(changes)
    }

    async fn follow_up(&self, report: &mut FixReport) {
        if report.dry_run || !report.has_applied_changes() {
            return;
        }
        report.rerun_checks = self.rerun_failed_checks(&report.target).await;
        report.commented = self.post_summary_comment(report).await;
    }

    /// Re-requests completed check runs with a failing conclusion on the
    /// head commit. Returns how many were re-requested.
    pub async fn rerun_failed_checks(&self, target: &FixTarget) -> usize {
        match self.try_rerun_failed_checks(target).await {
            Ok(count) => count,
            Err(err) => {
                debug!(pull_request = %target, error = %redact_secrets(&format!("{err:#}")), "Could not re-run checks");
                0
            }
        }
    }

    async fn try_rerun_failed_checks(&self, target: &FixTarget) -> Result<usize> {
        let pull = self
            .api
            .rest(
                RestMethod::Get,
                &target.api_path(&format!("pulls/{}", target.number)),
                None,
            )
            .await?;
        let Some(sha) = pull.pointer("/head/sha").and_then(Value::as_str) else {
            return Ok(0);
        };

        let runs: CheckRuns = serde_json::from_value(
            self.api
                .rest(
                    RestMethod::Get,
                    &target.api_path(&format!("commits/{sha}/check-runs")),
                    None,
                )
                .await?,
        )?;

        let mut rerun = 0;
        for run in runs.check_runs.iter().filter(|run| run.is_rerunnable()) {
            let path = target.api_path(&format!("check-runs/{}/rerequest", run.id));
            match self.api.rest(RestMethod::Post, &path, None).await {
                Ok(_) => rerun += 1,
                Err(err) => debug!(check_run = run.id, error = %redact_secrets(&format!("{err:#}")), "Re-run rejected"),
            }
        }
        if rerun > 0 {
            info!(pull_request = %target, checks = rerun, "Re-ran failed checks");
        }
        Ok(rerun)
    }

    async fn post_summary_comment(&self, report: &FixReport) -> bool {
        let path = report
            .target
            .api_path(&format!("issues/{}/comments", report.target.number));
        let body = json!({ "body": summary_comment(report) });
        match self.api.rest(RestMethod::Post, &path, Some(body)).await {
            Ok(_) => true,
            Err(err) => {
                debug!(pull_request = %report.target, error = %redact_secrets(&format!("{err:#}")), "Could not post comment");
                false
            }
        }
    }
}

const PROJECT_URL: &str = "https://github.com/lfit/pull-request-fixer";

/// Markdown comment describing the applied fixes.
pub fn summary_comment(report: &FixReport) -> String {
    let mut lines = vec![
        "## Pull Request Fixer".to_string(),
        String::new(),
        "Automatically fixed this pull request:".to_string(),
    ];
    for field in report.applied_fields() {
        lines.push(match field {
            PrField::Title => "- **Pull request title** updated to match first commit".to_string(),
            PrField::Body => "- **Pull request body** updated to match commit message".to_string(),
        });
    }
    let files = report.applied_files();
    if files > 0 {
        let plural = if files == 1 { "" } else { "s" };
        lines.push(format!("- **{files} file{plural}** updated"));
    }
    if report.rerun_checks > 0 {
        lines.push(String::new());
        lines.push(format!("Re-requested {} failed check run(s).", report.rerun_checks));
    }
    lines.extend([
        String::new(),
        "---".to_string(),
        format!("*This fix was automatically applied by [pull-request-fixer]({PROJECT_URL})*"),
    ]);
    lines.join("\n")
}
