//! Archive-side data model.
//!
//! These records are what the migration importer reads: one JSON document
//! per collection, snake_case fields, written as complete documents. The
//! Bitbucket API shapes live in [`crate::api::types`] and are mapped into
//! these records during export.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Archive schema version written to `schema.json`.
pub const SCHEMA_VERSION: &str = "1.2.0";

/// The exported repository record. Written once as a placeholder, then
/// patched in place after the git mirror settles `default_branch` and
/// `git_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    /// Source workspace (tenant/namespace) the repository lives under.
    pub workspace: String,
    /// Repository slug.
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub private: bool,
    pub default_branch: String,
    /// Virtual locator into the archive, e.g.
    /// `tarball://root/repositories/<workspace>/<slug>.git`.
    pub git_url: String,
}

impl Repository {
    /// The archive-internal locator for this repository's git mirror.
    pub fn tarball_url(workspace: &str, slug: &str) -> String {
        format!("tarball://root/repositories/{}/{}.git", workspace, slug)
    }
}

/// A user referenced anywhere in the export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub login: String,
    pub name: Option<String>,
}

impl User {
    /// The placeholder user substituted when the member list cannot be
    /// fetched: one synthetic account representing the whole workspace.
    pub fn synthetic(workspace: &str) -> Self {
        Self {
            login: workspace.to_string(),
            name: Some(workspace.to_string()),
        }
    }
}

/// The owning organization (the source workspace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub login: String,
    pub name: String,
}

/// One side (source or destination) of a pull request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchRef {
    pub branch: String,
    /// Full 40-hex commit SHA where resolution succeeded; the original
    /// short form where it did not (flagged later by the validator).
    pub sha: String,
    /// `workspace/slug` of the repository this side points into.
    pub repository: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: u64,
    pub title: String,
    pub body: String,
    pub state: String,
    pub source: BranchRef,
    pub destination: BranchRef,
    pub author: String,
    pub created_at: DateTime<Utc>,
    /// Derived from the source system's draft flag.
    pub work_in_progress: bool,
    pub merge_commit_sha: Option<String>,
}

/// A general (non-inline) pull request comment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueComment {
    pub id: u64,
    pub pull_request: u64,
    pub body: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An inline review comment, attached to a thread and a review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewComment {
    pub id: u64,
    pub pull_request: u64,
    pub review: u64,
    pub thread: u64,
    pub body: String,
    pub author: String,
    pub path: String,
    pub position: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub in_reply_to: Option<u64>,
    pub original_commit: Option<String>,
}

/// A conversation anchored to one (path, position) within a pull request.
///
/// Invariant: `created_at` equals the earliest `created_at` among member
/// comments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewThread {
    pub id: u64,
    pub pull_request: u64,
    pub path: String,
    pub position: u64,
    pub original_commit: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Member comment ids, oldest first.
    pub comments: Vec<u64>,
}

/// A review groups every comment resolving to the same root comment.
///
/// Invariants: `submitted_at` equals the earliest member `created_at`;
/// `state` is the root (non-reply) comment's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: u64,
    pub pull_request: u64,
    pub author: String,
    pub state: String,
    pub submitted_at: DateTime<Utc>,
    /// Member comment ids, oldest first.
    pub comments: Vec<u64>,
}

/// A pull request comment as fetched, before thread reconstruction.
///
/// Inline comments carry `path` (and usually `position`); comments with no
/// position are demoted to plain [`IssueComment`]s during reconstruction.
#[derive(Debug, Clone)]
pub struct FetchedComment {
    pub id: u64,
    pub pull_request: u64,
    pub body: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub path: Option<String>,
    pub position: Option<u64>,
    /// Explicit source-side thread id, when the API provides one.
    pub thread_id: Option<u64>,
    /// Parent comment id; present on replies.
    pub in_reply_to: Option<u64>,
    pub original_commit: Option<String>,
    /// Encoded review state on root comments. The source model rarely
    /// carries one; `"commented"` is assumed when absent.
    pub review_state: Option<String>,
}
