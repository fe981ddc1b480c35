//! Subset of the GitHub webhook payloads the relay renders.
//!
//! Every field is optional or defaulted: GitHub adds fields freely and some
//! events omit objects (e.g. `sender` on some installation hooks), so a
//! missing value must never fail the whole message.

use serde::Deserialize;

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Repository {
    pub name: Option<String>,
    pub full_name: Option<String>,
    pub html_url: Option<String>,
    pub stargazers_count: Option<u64>,
    pub forks_count: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct User {
    pub login: Option<String>,
    pub html_url: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CommitAuthor {
    pub name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Commit {
    pub id: Option<String>,
    pub message: Option<String>,
    pub url: Option<String>,
    pub author: Option<CommitAuthor>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Pusher {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
    pub compare: Option<String>,
    pub created: bool,
    pub deleted: bool,
    pub forced: bool,
    pub commits: Vec<Commit>,
    pub pusher: Option<Pusher>,
    pub repository: Option<Repository>,
    pub sender: Option<User>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Issue {
    pub number: Option<u64>,
    pub title: Option<String>,
    pub html_url: Option<String>,
    /// Present when the "issue" is really a pull request (issue_comment events).
    pub pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct IssuesEvent {
    pub action: Option<String>,
    pub issue: Option<Issue>,
    pub repository: Option<Repository>,
    pub sender: Option<User>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Comment {
    pub body: Option<String>,
    pub html_url: Option<String>,
    pub commit_id: Option<String>,
    pub user: Option<User>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct IssueCommentEvent {
    pub action: Option<String>,
    pub issue: Option<Issue>,
    pub comment: Option<Comment>,
    pub repository: Option<Repository>,
    pub sender: Option<User>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct BranchRef {
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
    pub label: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct PullRequest {
    pub number: Option<u64>,
    pub title: Option<String>,
    pub html_url: Option<String>,
    pub merged: Option<bool>,
    pub head: Option<BranchRef>,
    pub base: Option<BranchRef>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct PullRequestEvent {
    pub action: Option<String>,
    pub number: Option<u64>,
    pub pull_request: Option<PullRequest>,
    pub repository: Option<Repository>,
    pub sender: Option<User>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Review {
    pub state: Option<String>,
    pub body: Option<String>,
    pub user: Option<User>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct PullRequestReviewEvent {
    pub action: Option<String>,
    pub review: Option<Review>,
    pub pull_request: Option<PullRequest>,
    pub repository: Option<Repository>,
    pub sender: Option<User>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Release {
    pub tag_name: Option<String>,
    pub name: Option<String>,
    pub html_url: Option<String>,
    pub draft: bool,
    pub prerelease: bool,
    pub author: Option<User>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ReleaseEvent {
    pub action: Option<String>,
    pub release: Option<Release>,
    pub repository: Option<Repository>,
    pub sender: Option<User>,
}

/// Payload shared by `create` and `delete`.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct RefEvent {
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
    pub ref_type: Option<String>,
    pub repository: Option<Repository>,
    pub sender: Option<User>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ForkEvent {
    pub forkee: Option<Repository>,
    pub repository: Option<Repository>,
    pub sender: Option<User>,
}

/// Payload shared by `watch` and `star`.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct StarEvent {
    pub action: Option<String>,
    pub repository: Option<Repository>,
    pub sender: Option<User>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct WikiPage {
    pub page_name: Option<String>,
    pub title: Option<String>,
    pub action: Option<String>,
    pub html_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct GollumEvent {
    pub pages: Vec<WikiPage>,
    pub repository: Option<Repository>,
    pub sender: Option<User>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct CommitCommentEvent {
    pub comment: Option<Comment>,
    pub repository: Option<Repository>,
    pub sender: Option<User>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct PingEvent {
    pub zen: Option<String>,
    pub repository: Option<Repository>,
}
