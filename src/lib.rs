//! pull-request-fixer: find blocked pull requests across a GitHub
//! organization and bring their metadata and files back in line.
//!
//! The organization scan discovers repositories with open pull requests,
//! walks each repository's pull request pages under bounded concurrency and
//! streams the results back as they arrive. Blocked pull requests can then
//! have their title and body reset from the first commit and selected files
//! rewritten through the contents API.

pub mod blocking;
pub mod cli;
pub mod commit;
pub mod files;
pub mod fixer;
pub mod github;
pub mod graphql;
pub mod progress;
pub mod scanner;
pub mod transform;
pub mod types;
pub mod workflow;

pub use blocking::{BlockingReason, BlockingResult, classify, failing_checks};
pub use cli::{LogLevel, RunSpec, Target, Verbosity, parse_args};
pub use commit::CommitMessage;
pub use files::{FileChange, FileFixer};
pub use fixer::{FieldChange, FixOptions, FixReport, FixTarget, PrField, PrFixer};
pub use github::{GitHub, GitHubApi, RepoFile, RestMethod, redact_secrets, setup_github_client};
pub use progress::{LogProgress, NoProgress, ProgressSnapshot, ProgressTracker};
pub use scanner::{OrgScan, PrScanner, ScanConfig, ScannedPullRequest};
pub use transform::{FileRule, LineRule};
pub use types::{PullRequestNode, RepositoryRef};
pub use workflow::{BlockedPullRequest, RunOptions, RunSummary, run_organization, run_pull_request};
