//! Bitbucket Cloud API response records.
//!
//! Every response shape the client touches gets a named type here; nothing
//! is deserialized through ad hoc `serde_json::Value` digging. Only the
//! fields the exporter reads are declared.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// One page of a Bitbucket list endpoint: `{values: [...], next: <url>}`.
/// An absent or empty `next` ends pagination.
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    pub values: Vec<T>,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NamedBranch {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub display_name: Option<String>,
    pub nickname: Option<String>,
    pub username: Option<String>,
    pub account_id: Option<String>,
}

impl Account {
    /// Best available login for archive purposes.
    pub fn login(&self) -> String {
        self.nickname
            .clone()
            .or_else(|| self.username.clone())
            .or_else(|| self.account_id.clone())
            .or_else(|| self.display_name.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

#[derive(Debug, Deserialize)]
pub struct RepositoryResponse {
    pub name: String,
    pub description: Option<String>,
    pub created_on: DateTime<Utc>,
    pub is_private: bool,
    pub mainbranch: Option<NamedBranch>,
}

#[derive(Debug, Deserialize)]
pub struct CommitStub {
    pub hash: String,
}

#[derive(Debug, Deserialize)]
pub struct RepoStub {
    pub full_name: Option<String>,
}

/// Source or destination endpoint of a pull request.
#[derive(Debug, Deserialize)]
pub struct PrEndpoint {
    pub branch: Option<NamedBranch>,
    pub commit: Option<CommitStub>,
    pub repository: Option<RepoStub>,
}

#[derive(Debug, Deserialize)]
pub struct PullRequestResponse {
    pub id: u64,
    pub title: String,
    pub description: Option<String>,
    pub state: String,
    #[serde(default)]
    pub draft: bool,
    pub author: Option<Account>,
    pub created_on: DateTime<Utc>,
    pub source: PrEndpoint,
    pub destination: PrEndpoint,
    pub merge_commit: Option<CommitStub>,
}

/// `/commit/{sha}` response; used for short-SHA resolution.
#[derive(Debug, Deserialize)]
pub struct CommitResponse {
    pub hash: String,
}

#[derive(Debug, Deserialize)]
pub struct CommentContent {
    pub raw: Option<String>,
}

/// Inline anchor of a review comment. `to` is the line in the new file,
/// `from` the line in the old one; file-level comments carry neither.
#[derive(Debug, Deserialize)]
pub struct InlineAnchor {
    pub path: String,
    pub to: Option<u64>,
    pub from: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ParentRef {
    pub id: u64,
}

#[derive(Debug, Deserialize)]
pub struct CommentResponse {
    pub id: u64,
    pub content: CommentContent,
    pub user: Option<Account>,
    pub created_on: DateTime<Utc>,
    pub updated_on: Option<DateTime<Utc>>,
    pub inline: Option<InlineAnchor>,
    pub parent: Option<ParentRef>,
    #[serde(default)]
    pub deleted: bool,
}

impl CommentResponse {
    /// Line anchor for thread grouping; inline comments without a line
    /// are treated as file-level and demoted to plain comments.
    pub fn position(&self) -> Option<u64> {
        self.inline.as_ref().and_then(|i| i.to.or(i.from))
    }
}

/// Workspace member list wraps each account in `{user: {...}}`.
#[derive(Debug, Deserialize)]
pub struct MemberResponse {
    pub user: Account,
}
