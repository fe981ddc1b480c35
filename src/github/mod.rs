pub mod format;
pub mod payload;

use std::fmt;

/// GitHub events the relay knows how to render.
/// Anything else is acknowledged and dropped by the webhook receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Ping,
    Push,
    Issues,
    IssueComment,
    PullRequest,
    PullRequestReview,
    Release,
    Create,
    Delete,
    Fork,
    Watch,
    Star,
    Gollum,
    CommitComment,
}

impl EventKind {
    /// Parse the value of the `X-GitHub-Event` header.
    pub fn from_header(value: &str) -> Option<Self> {
        let kind = match value.trim() {
            "ping" => EventKind::Ping,
            "push" => EventKind::Push,
            "issues" => EventKind::Issues,
            "issue_comment" => EventKind::IssueComment,
            "pull_request" => EventKind::PullRequest,
            "pull_request_review" => EventKind::PullRequestReview,
            "release" => EventKind::Release,
            "create" => EventKind::Create,
            "delete" => EventKind::Delete,
            "fork" => EventKind::Fork,
            "watch" => EventKind::Watch,
            "star" => EventKind::Star,
            "gollum" => EventKind::Gollum,
            "commit_comment" => EventKind::CommitComment,
            _ => return None,
        };
        Some(kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Ping => "ping",
            EventKind::Push => "push",
            EventKind::Issues => "issues",
            EventKind::IssueComment => "issue_comment",
            EventKind::PullRequest => "pull_request",
            EventKind::PullRequestReview => "pull_request_review",
            EventKind::Release => "release",
            EventKind::Create => "create",
            EventKind::Delete => "delete",
            EventKind::Fork => "fork",
            EventKind::Watch => "watch",
            EventKind::Star => "star",
            EventKind::Gollum => "gollum",
            EventKind::CommitComment => "commit_comment",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_headers() {
        assert_eq!(EventKind::from_header("push"), Some(EventKind::Push));
        assert_eq!(
            EventKind::from_header("pull_request"),
            Some(EventKind::PullRequest)
        );
        assert_eq!(EventKind::from_header(" release "), Some(EventKind::Release));
    }

    #[test]
    fn test_unknown_headers() {
        assert_eq!(EventKind::from_header("check_suite"), None);
        assert_eq!(EventKind::from_header(""), None);
        assert_eq!(EventKind::from_header("PUSH"), None);
    }

    #[test]
    fn test_display_matches_header() {
        for name in ["ping", "push", "issues", "gollum", "commit_comment"] {
            let kind = EventKind::from_header(name).unwrap();
            assert_eq!(kind.to_string(), name);
        }
    }
}
