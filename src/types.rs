use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Placeholder used for both halves of a repository name that cannot be
/// split into owner and name.
pub const UNKNOWN_REPOSITORY_PART: &str = "unknown";

// GitHub returns `null` for connections and lists it could not resolve
// (permissions, pagination state), so absent and null both mean "empty".
pub fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

// `nodes` lists can contain `null` entries for items the token cannot see.
fn present_nodes<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let nodes = Option::<Vec<Option<T>>>::deserialize(deserializer)?;
    Ok(nodes.unwrap_or_default().into_iter().flatten().collect())
}

/// Owner and name of a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryRef {
    pub owner: String,
    pub name: String,
}

impl RepositoryRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(UNKNOWN_REPOSITORY_PART, UNKNOWN_REPOSITORY_PART)
    }

    /// Splits an `owner/name` full name at the first `/`.
    ///
    /// Never fails: anything without two non-empty halves becomes
    /// `unknown/unknown`.
    pub fn parse(full_name: &str) -> Self {
        match full_name.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() => Self::new(owner, name),
            _ => Self::unknown(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.owner == UNKNOWN_REPOSITORY_PART && self.name == UNKNOWN_REPOSITORY_PART
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Conclusion of a `CheckRun` as reported by GraphQL (`FAILURE`,
/// `TIMED_OUT`, ...). Matching is case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckConclusion {
    Success,
    Failure,
    Cancelled,
    TimedOut,
    ActionRequired,
    Neutral,
    Skipped,
    Stale,
    StartupFailure,
    Unknown,
}

impl CheckConclusion {
    pub fn from_graphql(value: &str) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "SUCCESS" => CheckConclusion::Success,
            "FAILURE" => CheckConclusion::Failure,
            "CANCELLED" => CheckConclusion::Cancelled,
            "TIMED_OUT" => CheckConclusion::TimedOut,
            "ACTION_REQUIRED" => CheckConclusion::ActionRequired,
            "NEUTRAL" => CheckConclusion::Neutral,
            "SKIPPED" => CheckConclusion::Skipped,
            "STALE" => CheckConclusion::Stale,
            "STARTUP_FAILURE" => CheckConclusion::StartupFailure,
            _ => CheckConclusion::Unknown,
        }
    }

    pub fn is_failing(&self) -> bool {
        matches!(
            self,
            CheckConclusion::Failure
                | CheckConclusion::Cancelled
                | CheckConclusion::TimedOut
                | CheckConclusion::ActionRequired
        )
    }
}

/// State of a legacy commit `StatusContext`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusState {
    Success,
    Failure,
    Error,
    Pending,
    Expected,
    Unknown,
}

impl StatusState {
    pub fn from_graphql(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "success" => StatusState::Success,
            "failure" => StatusState::Failure,
            "error" => StatusState::Error,
            "pending" => StatusState::Pending,
            "expected" => StatusState::Expected,
            _ => StatusState::Unknown,
        }
    }

    pub fn is_failing(&self) -> bool {
        matches!(self, StatusState::Failure | StatusState::Error)
    }
}

/// One entry of a commit's status-check rollup.
///
/// GraphQL distinguishes the two shapes with `__typename`; anything else
/// (including entries that fail to decode) lands in `Other` and is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "__typename")]
pub enum CheckContext {
    CheckRun {
        name: Option<String>,
        conclusion: Option<String>,
    },
    StatusContext {
        context: Option<String>,
        state: Option<String>,
    },
    #[serde(other)]
    Other,
}

impl CheckContext {
    pub fn from_value(value: &Value) -> Self {
        CheckContext::deserialize(value).unwrap_or(CheckContext::Other)
    }

    /// Returns the check's display identifier when it is failing.
    pub fn failing_identifier(&self) -> Option<&str> {
        match self {
            CheckContext::CheckRun {
                name: Some(name),
                conclusion: Some(conclusion),
            } if CheckConclusion::from_graphql(conclusion).is_failing() => Some(name),
            CheckContext::StatusContext {
                context: Some(context),
                state: Some(state),
            } if StatusState::from_graphql(state).is_failing() => Some(context),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mergeable {
    Mergeable,
    Conflicting,
    Unknown,
}

impl Mergeable {
    pub fn from_graphql(value: &str) -> Self {
        match value {
            "MERGEABLE" => Mergeable::Mergeable,
            "CONFLICTING" => Mergeable::Conflicting,
            _ => Mergeable::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStateStatus {
    Behind,
    Blocked,
    Clean,
    Dirty,
    Draft,
    HasHooks,
    Unstable,
    Unknown,
}

impl MergeStateStatus {
    pub fn from_graphql(value: &str) -> Self {
        match value {
            "BEHIND" => MergeStateStatus::Behind,
            "BLOCKED" => MergeStateStatus::Blocked,
            "CLEAN" => MergeStateStatus::Clean,
            "DIRTY" => MergeStateStatus::Dirty,
            "DRAFT" => MergeStateStatus::Draft,
            "HAS_HOOKS" => MergeStateStatus::HasHooks,
            "UNSTABLE" => MergeStateStatus::Unstable,
            _ => MergeStateStatus::Unknown,
        }
    }
}

/// A pull request exactly as GraphQL returned it.
///
/// The node is kept opaque so callers see every field the query asked for;
/// the accessors below are total and fall back to empty defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PullRequestNode(Value);

impl PullRequestNode {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn number(&self) -> Option<u64> {
        self.0.get("number").and_then(Value::as_u64)
    }

    pub fn title(&self) -> &str {
        self.str_field("title").unwrap_or_default()
    }

    pub fn body(&self) -> &str {
        self.str_field("body").unwrap_or_default()
    }

    pub fn url(&self) -> Option<&str> {
        self.str_field("url")
    }

    pub fn head_ref(&self) -> Option<&str> {
        self.str_field("headRefName")
    }

    pub fn is_draft(&self) -> bool {
        self.0
            .get("isDraft")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn mergeable(&self) -> Mergeable {
        self.str_field("mergeable")
            .map_or(Mergeable::Unknown, Mergeable::from_graphql)
    }

    pub fn merge_state_status(&self) -> MergeStateStatus {
        self.str_field("mergeStateStatus")
            .map_or(MergeStateStatus::Unknown, MergeStateStatus::from_graphql)
    }

    /// Entries of the first commit's status-check rollup, in response order.
    pub fn check_contexts(&self) -> Vec<CheckContext> {
        self.0
            .pointer("/commits/nodes/0/commit/statusCheckRollup/contexts/nodes")
            .and_then(Value::as_array)
            .map(|nodes| nodes.iter().map(CheckContext::from_value).collect())
            .unwrap_or_default()
    }
}

impl From<Value> for PullRequestNode {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(default, deserialize_with = "null_as_default")]
    pub has_next_page: bool,
    #[serde(default)]
    pub end_cursor: Option<String>,
}

impl PageInfo {
    /// Cursor for the following page, if there is one to fetch.
    ///
    /// A page that claims more data without a cursor ends pagination;
    /// re-requesting without a cursor would restart from the first page.
    pub fn next_cursor(&self) -> Option<&str> {
        self.end_cursor
            .as_deref()
            .filter(|_| self.has_next_page)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestConnection {
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_count: u64,
    #[serde(default, deserialize_with = "present_nodes")]
    pub nodes: Vec<PullRequestNode>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub page_info: PageInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryNode {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name_with_owner: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_archived: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub pull_requests: PullRequestConnection,
}

impl RepositoryNode {
    pub fn has_open_pull_requests(&self) -> bool {
        self.pull_requests.total_count > 0
    }

    pub fn repository(&self) -> RepositoryRef {
        RepositoryRef::parse(&self.name_with_owner)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryConnection {
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_count: u64,
    #[serde(default, deserialize_with = "present_nodes")]
    pub nodes: Vec<RepositoryNode>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub page_info: PageInfo,
}

#[derive(Debug, Default, Deserialize)]
pub struct Organization {
    #[serde(default)]
    pub repositories: Option<RepositoryConnection>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrganizationData {
    #[serde(default)]
    pub organization: Option<Organization>,
}

impl OrganizationData {
    pub fn into_repositories(self) -> Option<RepositoryConnection> {
        self.organization.and_then(|org| org.repositories)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RepositoryData {
    #[serde(default)]
    pub repository: Option<RepositoryNode>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQLError {
    #[serde(default)]
    pub message: String,
}

/// Raw GraphQL response envelope, before `data` is unwrapped.
#[derive(Debug, Deserialize)]
pub struct GraphQLResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub errors: Vec<GraphQLError>,
}

impl GraphQLResponse {
    pub fn into_data(self) -> anyhow::Result<Value> {
        if !self.errors.is_empty() {
            let messages: Vec<&str> = self.errors.iter().map(|e| e.message.as_str()).collect();
            anyhow::bail!("GraphQL errors: {}", messages.join("; "));
        }
        Ok(self
            .data
            .filter(|data| !data.is_null())
            .unwrap_or_else(|| Value::Object(Default::default())))
    }
}
