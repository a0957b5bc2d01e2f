//! GraphQL documents and variable builders used by the organization scan.

use serde_json::{Value, json};

/// Repositories requested per page while discovering an organization.
pub const ORG_REPOS_PAGE_SIZE: u32 = 50;
/// Pull requests requested per page for a single repository.
pub const DEFAULT_PRS_PAGE_SIZE: u32 = 30;
/// Status-check rollup entries fetched per pull request.
pub const DEFAULT_CONTEXTS_PAGE_SIZE: u32 = 20;

macro_rules! pull_request_fields {
    () => {
        r#"
                number
                title
                body
                url
                isDraft
                mergeable
                mergeStateStatus
                headRefName
                baseRefName
                author {
                    login
                }
                commits(first: 1) {
                    nodes {
                        commit {
                            statusCheckRollup {
                                contexts(first: $contextsPageSize) {
                                    nodes {
                                        __typename
                                        ... on CheckRun {
                                            name
                                            conclusion
                                        }
                                        ... on StatusContext {
                                            context
                                            state
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
        "#
    };
}

/// Counts an organization's repositories.
pub const ORG_REPOS_ONLY: &str = r#"
    query($org: String!, $reposCursor: String) {
        organization(login: $org) {
            repositories(first: 100, after: $reposCursor) {
                totalCount
                nodes {
                    nameWithOwner
                    isArchived
                }
                pageInfo {
                    hasNextPage
                    endCursor
                }
            }
        }
    }
"#;

/// Lists an organization's repositories together with their open pull
/// requests.
pub const ORG_REPOS_WITH_OPEN_PRS: &str = concat!(
    r#"
    query($orgName: String!, $reposPerPage: Int!, $prsPerPage: Int!, $repoCursor: String, $contextsPageSize: Int!) {
        organization(login: $orgName) {
            repositories(first: $reposPerPage, after: $repoCursor, orderBy: {field: NAME, direction: ASC}) {
                nodes {
                    name
                    nameWithOwner
                    isArchived
                    pullRequests(states: OPEN, first: $prsPerPage) {
                        totalCount
                        nodes {
    "#,
    pull_request_fields!(),
    r#"
                        }
                        pageInfo {
                            hasNextPage
                            endCursor
                        }
                    }
                }
                pageInfo {
                    hasNextPage
                    endCursor
                }
            }
        }
    }
    "#
);

/// One page of a single repository's open pull requests.
pub const REPO_OPEN_PRS_PAGE: &str = concat!(
    r#"
    query($owner: String!, $name: String!, $prsPageSize: Int!, $prsCursor: String, $contextsPageSize: Int!) {
        repository(owner: $owner, name: $name) {
            name
            nameWithOwner
            isArchived
            pullRequests(states: OPEN, first: $prsPageSize, after: $prsCursor) {
                totalCount
                nodes {
    "#,
    pull_request_fields!(),
    r#"
                }
                pageInfo {
                    hasNextPage
                    endCursor
                }
            }
        }
    }
    "#
);

pub fn org_repos_count_variables(org: &str) -> Value {
    json!({
        "org": org,
        "reposCursor": Value::Null,
    })
}

/// Discovery only needs to know whether open pull requests exist, so one
/// pull request per repository is enough.
pub fn org_repos_with_open_prs_variables(org: &str, repo_cursor: Option<&str>) -> Value {
    let mut variables = json!({
        "orgName": org,
        "reposPerPage": ORG_REPOS_PAGE_SIZE,
        "prsPerPage": 1,
        "contextsPageSize": DEFAULT_CONTEXTS_PAGE_SIZE,
    });
    if let Some(cursor) = repo_cursor {
        variables["repoCursor"] = Value::String(cursor.to_string());
    }
    variables
}

pub fn repo_open_prs_variables(owner: &str, name: &str, pr_cursor: Option<&str>) -> Value {
    json!({
        "owner": owner,
        "name": name,
        "prsPageSize": DEFAULT_PRS_PAGE_SIZE,
        "prsCursor": pr_cursor,
        "contextsPageSize": DEFAULT_CONTEXTS_PAGE_SIZE,
    })
}
