//! Rewrites files touched by a pull request through the contents API.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{
    fixer::FixTarget,
    github::{GitHubApi, RestMethod, redact_secrets},
    transform::FileRule,
};

#[derive(Debug, Deserialize)]
struct PullRequestFile {
    filename: String,
    #[serde(default)]
    status: String,
}

/// A file whose content was (or in dry-run mode, would be) rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    pub applied: bool,
}

#[derive(Clone)]
pub struct FileFixer {
    api: Arc<dyn GitHubApi>,
}

impl FileFixer {
    pub fn new(api: Arc<dyn GitHubApi>) -> Self {
        Self { api }
    }

    async fn changed_files(&self, target: &FixTarget) -> Result<Vec<PullRequestFile>> {
        let repo = &target.repository;
        let path = format!(
            "/repos/{}/{}/pulls/{}/files?per_page=100",
            repo.owner, repo.name, target.number
        );
        let files = self
            .api
            .rest(RestMethod::Get, &path, None)
            .await
            .with_context(|| format!("Failed to list files of {target}"))?;
        serde_json::from_value(files).with_context(|| format!("Unexpected file list for {target}"))
    }

    /// Applies `rule` to every matching file of the pull request's head
    /// branch. Files that fail to load or save are logged and skipped.
    pub async fn fix_files(
        &self,
        target: &FixTarget,
        rule: &FileRule,
        dry_run: bool,
    ) -> Result<Vec<FileChange>> {
        let branch = target
            .head_ref
            .as_deref()
            .with_context(|| format!("{target} has no head branch"))?;

        let candidates: Vec<String> = self
            .changed_files(target)
            .await?
            .into_iter()
            .filter(|file| file.status != "removed" && rule.matches(&file.filename))
            .map(|file| file.filename)
            .collect();
        debug!(pull_request = %target, files = candidates.len(), "Matched files");

        let mut changes = Vec::new();
        for path in candidates {
            match self.fix_file(target, branch, &path, rule, dry_run).await {
                Ok(Some(change)) => changes.push(change),
                Ok(None) => debug!(path = %path, "File already up to date"),
                Err(err) => {
                    warn!(pull_request = %target, path = %path, error = %redact_secrets(&format!("{err:#}")), "Skipping file");
                }
            }
        }
        Ok(changes)
    }

    async fn fix_file(
        &self,
        target: &FixTarget,
        branch: &str,
        path: &str,
        rule: &FileRule,
        dry_run: bool,
    ) -> Result<Option<FileChange>> {
        let file = self.api.get_file(&target.repository, path, branch).await?;
        let Some(updated) = rule.rule.apply(&file.content) else {
            return Ok(None);
        };

        if dry_run {
            info!(pull_request = %target, path = %path, "Would fix file");
            return Ok(Some(FileChange {
                path: path.to_string(),
                applied: false,
            }));
        }

        let message = format!("Fix {} in PR #{}", path, target.number);
        self.api
            .update_file(&target.repository, &file, &updated, &message, branch)
            .await?;
        info!(pull_request = %target, path = %path, "Fixed file");

        Ok(Some(FileChange {
            path: path.to_string(),
            applied: true,
        }))
    }
}
