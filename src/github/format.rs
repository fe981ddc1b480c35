//! Render GitHub webhook payloads as Telegram HTML messages.
//!
//! Rendering never fails: missing fields fall back to placeholders, and a
//! payload that does not deserialize into the expected shape degrades to a
//! one-line notice naming the event.

use serde::de::DeserializeOwned;
use serde_json::Value;
use teloxide::utils::html::escape;
use tracing::debug;

use crate::github::payload::{
    Commit, CommitCommentEvent, ForkEvent, GollumEvent, IssueCommentEvent, IssuesEvent,
    PingEvent, PullRequest, PullRequestEvent, PullRequestReviewEvent, PushEvent, RefEvent,
    ReleaseEvent, Repository, StarEvent, User,
};
use crate::github::EventKind;

/// Commits listed individually in a push message.
const MAX_LISTED_COMMITS: usize = 10;
/// Characters of a comment or review body quoted in the message.
const MAX_QUOTE_CHARS: usize = 280;
/// Characters of a commit subject shown in a push message.
const MAX_COMMIT_LINE_CHARS: usize = 120;

/// Render `payload` for the given event, labelled with `project`.
pub fn render(kind: EventKind, payload: Value, project: &str) -> String {
    let repo_name = payload
        .pointer("/repository/full_name")
        .and_then(Value::as_str)
        .map(String::from);

    let body = match kind {
        EventKind::Ping => decode(payload).map(|e: PingEvent| ping(&e)),
        EventKind::Push => decode(payload).map(|e: PushEvent| push(&e)),
        EventKind::Issues => decode(payload).map(|e: IssuesEvent| issues(&e)),
        EventKind::IssueComment => decode(payload).map(|e: IssueCommentEvent| issue_comment(&e)),
        EventKind::PullRequest => decode(payload).map(|e: PullRequestEvent| pull_request(&e)),
        EventKind::PullRequestReview => {
            decode(payload).map(|e: PullRequestReviewEvent| pull_request_review(&e))
        }
        EventKind::Release => decode(payload).map(|e: ReleaseEvent| release(&e)),
        EventKind::Create => decode(payload).map(|e: RefEvent| create(&e)),
        EventKind::Delete => decode(payload).map(|e: RefEvent| delete(&e)),
        EventKind::Fork => decode(payload).map(|e: ForkEvent| fork(&e)),
        EventKind::Watch | EventKind::Star => decode(payload).map(|e: StarEvent| star(&e)),
        EventKind::Gollum => decode(payload).map(|e: GollumEvent| gollum(&e)),
        EventKind::CommitComment => {
            decode(payload).map(|e: CommitCommentEvent| commit_comment(&e))
        }
    };

    let body = body.unwrap_or_else(|e| {
        debug!(event = %kind, error = %e, "Payload shape not recognized, sending generic notice");
        generic(kind, repo_name.as_deref())
    });

    format!("<b>[{}]</b> {}", escape(project), body)
}

fn decode<T: DeserializeOwned>(payload: Value) -> Result<T, serde_json::Error> {
    serde_json::from_value(payload)
}

fn generic(kind: EventKind, repo: Option<&str>) -> String {
    match repo {
        Some(repo) => format!(
            "📣 Received <code>{}</code> event for <b>{}</b>.",
            kind,
            escape(repo)
        ),
        None => format!("📣 Received <code>{}</code> event.", kind),
    }
}

// ── Small HTML helpers ─────────────────────────────────────────────────────────

fn link(url: Option<&str>, text: &str) -> String {
    match url {
        Some(url) if !url.is_empty() => {
            let href = escape(url).replace('"', "%22");
            format!("<a href=\"{}\">{}</a>", href, escape(text))
        }
        _ => escape(text),
    }
}

fn repo_link(repo: Option<&Repository>) -> String {
    let name = repo
        .and_then(|r| r.full_name.as_deref().or(r.name.as_deref()))
        .unwrap_or("unknown repository");
    link(repo.and_then(|r| r.html_url.as_deref()), name)
}

fn user_link(user: Option<&User>) -> String {
    let login = user
        .and_then(|u| u.login.as_deref())
        .unwrap_or("Someone");
    link(user.and_then(|u| u.html_url.as_deref()), login)
}

/// `#12 Title` linked to the issue or pull request.
fn numbered(number: Option<u64>, title: Option<&str>, url: Option<&str>) -> String {
    let title = title.unwrap_or("(untitled)");
    let text = match number {
        Some(n) => format!("#{} {}", n, title),
        None => title.to_string(),
    };
    link(url, &text)
}

fn short_ref(git_ref: &str) -> &str {
    git_ref
        .strip_prefix("refs/heads/")
        .or_else(|| git_ref.strip_prefix("refs/tags/"))
        .unwrap_or(git_ref)
}

fn short_sha(sha: &str) -> &str {
    match sha.char_indices().nth(7) {
        Some((idx, _)) => &sha[..idx],
        None => sha,
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("").trim()
}

/// Keep at most `max` chars of `text`, marking the cut with an ellipsis.
fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

/// Quote a free-text body, truncated on a char boundary.
fn quote(body: Option<&str>) -> String {
    let body = body.map(str::trim).unwrap_or("");
    if body.is_empty() {
        return String::new();
    }
    format!("\n<i>{}</i>", escape(&truncate_chars(body, MAX_QUOTE_CHARS)))
}

fn action_or<'a>(action: Option<&'a str>, default: &'a str) -> &'a str {
    action.unwrap_or(default)
}

// ── Per-event renderers ────────────────────────────────────────────────────────

fn ping(e: &PingEvent) -> String {
    let mut out = format!("🏓 Webhook connected to {}.", repo_link(e.repository.as_ref()));
    if let Some(zen) = e.zen.as_deref() {
        out.push_str(&format!("\n<i>{}</i>", escape(zen)));
    }
    out
}

fn push(e: &PushEvent) -> String {
    let repo = repo_link(e.repository.as_ref());
    let branch = escape(short_ref(e.git_ref.as_deref().unwrap_or("unknown ref")));
    let who = e
        .pusher
        .as_ref()
        .and_then(|p| p.name.as_deref())
        .map(escape)
        .unwrap_or_else(|| user_link(e.sender.as_ref()));

    if e.deleted {
        return format!("🗑 {} deleted <code>{}</code> in {}.", who, branch, repo);
    }

    if e.commits.is_empty() {
        let verb = if e.created { "created" } else { "pushed to" };
        return format!("📌 {} {} <code>{}</code> in {}.", who, verb, branch, repo);
    }

    let count = e.commits.len();
    let noun = if count == 1 { "commit" } else { "commits" };
    let summary = link(e.compare.as_deref(), &format!("{} new {}", count, noun));
    let forced = if e.forced { " (force-pushed)" } else { "" };

    let mut out = format!(
        "🔨 {} pushed {} to {}:<code>{}</code>{}\n",
        who, summary, repo, branch, forced
    );
    for commit in e.commits.iter().take(MAX_LISTED_COMMITS) {
        out.push_str(&format!("\n• {}", commit_line(commit)));
    }
    if count > MAX_LISTED_COMMITS {
        out.push_str(&format!("\n…and {} more", count - MAX_LISTED_COMMITS));
    }
    out
}

fn commit_line(commit: &Commit) -> String {
    let sha = link(
        commit.url.as_deref(),
        short_sha(commit.id.as_deref().unwrap_or("???????")),
    );
    let message = escape(&truncate_chars(
        first_line(commit.message.as_deref().unwrap_or("")),
        MAX_COMMIT_LINE_CHARS,
    ));
    let author = commit
        .author
        .as_ref()
        .and_then(|a| a.username.as_deref().or(a.name.as_deref()));
    match author {
        Some(author) => format!("{}: {} ({})", sha, message, escape(author)),
        None => format!("{}: {}", sha, message),
    }
}

fn issues(e: &IssuesEvent) -> String {
    let issue = e.issue.clone().unwrap_or_default();
    format!(
        "🐛 {} {} issue {} in {}.",
        user_link(e.sender.as_ref()),
        escape(action_or(e.action.as_deref(), "updated")),
        numbered(issue.number, issue.title.as_deref(), issue.html_url.as_deref()),
        repo_link(e.repository.as_ref()),
    )
}

fn issue_comment(e: &IssueCommentEvent) -> String {
    let issue = e.issue.clone().unwrap_or_default();
    let comment = e.comment.clone().unwrap_or_default();
    let target = if issue.pull_request.is_some() {
        "pull request"
    } else {
        "issue"
    };
    let verb = match action_or(e.action.as_deref(), "created") {
        "created" => "commented on".to_string(),
        other => format!("{} a comment on", escape(other)),
    };
    let mut out = format!(
        "💬 {} {} {} {} in {}",
        user_link(comment.user.as_ref().or(e.sender.as_ref())),
        verb,
        target,
        numbered(issue.number, issue.title.as_deref(), issue.html_url.as_deref()),
        repo_link(e.repository.as_ref()),
    );
    if let Some(url) = comment.html_url.as_deref() {
        out.push_str(&format!(" ({})", link(Some(url), "view")));
    }
    out.push(':');
    out.push_str(&quote(comment.body.as_deref()));
    out
}

fn pr_text(pr: &PullRequest, number: Option<u64>) -> String {
    numbered(
        pr.number.or(number),
        pr.title.as_deref(),
        pr.html_url.as_deref(),
    )
}

fn pull_request(e: &PullRequestEvent) -> String {
    let pr = e.pull_request.clone().unwrap_or_default();
    let action = match action_or(e.action.as_deref(), "updated") {
        "closed" if pr.merged == Some(true) => "merged",
        other => other,
    };
    let mut out = format!(
        "🔀 {} {} pull request {} in {}.",
        user_link(e.sender.as_ref()),
        escape(action),
        pr_text(&pr, e.number),
        repo_link(e.repository.as_ref()),
    );
    if action == "opened" {
        let head = pr.head.as_ref().and_then(|h| h.label.as_deref().or(h.git_ref.as_deref()));
        let base = pr.base.as_ref().and_then(|b| b.git_ref.as_deref());
        if let (Some(head), Some(base)) = (head, base) {
            out.push_str(&format!(
                "\n<code>{}</code> → <code>{}</code>",
                escape(head),
                escape(base)
            ));
        }
    }
    out
}

fn pull_request_review(e: &PullRequestReviewEvent) -> String {
    let pr = e.pull_request.clone().unwrap_or_default();
    let review = e.review.clone().unwrap_or_default();
    let verb = match review.state.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("approved") => "approved".to_string(),
        Some("changes_requested") => "requested changes on".to_string(),
        Some("commented") => "reviewed".to_string(),
        _ => format!(
            "{} a review on",
            escape(action_or(e.action.as_deref(), "submitted"))
        ),
    };
    let mut out = format!(
        "👀 {} {} pull request {} in {}.",
        user_link(review.user.as_ref().or(e.sender.as_ref())),
        verb,
        pr_text(&pr, None),
        repo_link(e.repository.as_ref()),
    );
    out.push_str(&quote(review.body.as_deref()));
    out
}

fn release(e: &ReleaseEvent) -> String {
    let release = e.release.clone().unwrap_or_default();
    let title = release
        .name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .or(release.tag_name.as_deref())
        .unwrap_or("(untitled)");
    let mut out = format!(
        "🚀 {} {} release {} in {}",
        user_link(release.author.as_ref().or(e.sender.as_ref())),
        escape(action_or(e.action.as_deref(), "published")),
        link(release.html_url.as_deref(), title),
        repo_link(e.repository.as_ref()),
    );
    if let Some(tag) = release.tag_name.as_deref() {
        if tag != title {
            out.push_str(&format!(" (<code>{}</code>)", escape(tag)));
        }
    }
    if release.prerelease {
        out.push_str(" [pre-release]");
    }
    if release.draft {
        out.push_str(" [draft]");
    }
    out.push('.');
    out
}

fn ref_description(e: &RefEvent) -> String {
    format!(
        "{} <code>{}</code>",
        escape(e.ref_type.as_deref().unwrap_or("ref")),
        escape(short_ref(e.git_ref.as_deref().unwrap_or("unknown"))),
    )
}

fn create(e: &RefEvent) -> String {
    format!(
        "🌱 {} created {} in {}.",
        user_link(e.sender.as_ref()),
        ref_description(e),
        repo_link(e.repository.as_ref()),
    )
}

fn delete(e: &RefEvent) -> String {
    format!(
        "🗑 {} deleted {} in {}.",
        user_link(e.sender.as_ref()),
        ref_description(e),
        repo_link(e.repository.as_ref()),
    )
}

fn fork(e: &ForkEvent) -> String {
    let mut out = format!(
        "🍴 {} forked {} to {}.",
        user_link(e.sender.as_ref()),
        repo_link(e.repository.as_ref()),
        repo_link(e.forkee.as_ref()),
    );
    if let Some(forks) = e.repository.as_ref().and_then(|r| r.forks_count) {
        out.push_str(&format!(" Total forks: {}.", forks));
    }
    out
}

fn star(e: &StarEvent) -> String {
    let removed = e.action.as_deref() == Some("deleted");
    let (icon, verb) = if removed {
        ("💔", "unstarred")
    } else {
        ("⭐", "starred")
    };
    let mut out = format!(
        "{} {} {} {}.",
        icon,
        user_link(e.sender.as_ref()),
        verb,
        repo_link(e.repository.as_ref()),
    );
    if let Some(stars) = e.repository.as_ref().and_then(|r| r.stargazers_count) {
        out.push_str(&format!(" Total stars: {}.", stars));
    }
    out
}

fn gollum(e: &GollumEvent) -> String {
    let mut out = format!(
        "📝 {} updated the wiki of {}:",
        user_link(e.sender.as_ref()),
        repo_link(e.repository.as_ref()),
    );
    if e.pages.is_empty() {
        out.push_str("\n• (no pages listed)");
    }
    for page in &e.pages {
        let title = page
            .title
            .as_deref()
            .or(page.page_name.as_deref())
            .unwrap_or("(untitled)");
        out.push_str(&format!(
            "\n• {} {}",
            escape(page.action.as_deref().unwrap_or("edited")),
            link(page.html_url.as_deref(), title),
        ));
    }
    out
}

fn commit_comment(e: &CommitCommentEvent) -> String {
    let comment = e.comment.clone().unwrap_or_default();
    let sha = link(
        comment.html_url.as_deref(),
        short_sha(comment.commit_id.as_deref().unwrap_or("unknown")),
    );
    let mut out = format!(
        "💬 {} commented on commit {} in {}:",
        user_link(comment.user.as_ref().or(e.sender.as_ref())),
        sha,
        repo_link(e.repository.as_ref()),
    );
    out.push_str(&quote(comment.body.as_deref()));
    out
}
