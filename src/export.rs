//! Export orchestration.
//!
//! Sequences the whole pipeline: fetch metadata, write the JSON artifacts,
//! materialize the git mirror, patch the repository record with the real
//! outcome, then run the sanitization pass. Essential-path failures (auth,
//! repository existence) abort the run; best-effort paths degrade with a
//! warning. Every completed run yields at least the schema file, a
//! repository record, and a (possibly empty) git mirror.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::git::Materializer;
use crate::models::{
    FetchedComment, IssueComment, Organization, Repository, SCHEMA_VERSION, User,
};
use crate::{Result, threads, validate};

pub const SCHEMA_FILE: &str = "schema.json";
pub const REPOSITORIES_FILE: &str = "repositories_000001.json";
pub const USERS_FILE: &str = "users_000001.json";
pub const ORGANIZATIONS_FILE: &str = "organizations_000001.json";
pub const PULL_REQUESTS_FILE: &str = "pull_requests_000001.json";
pub const ISSUE_COMMENTS_FILE: &str = "issue_comments_000001.json";
pub const REVIEW_COMMENTS_FILE: &str = "pull_request_review_comments_000001.json";
pub const REVIEW_THREADS_FILE: &str = "pull_request_review_threads_000001.json";
pub const REVIEWS_FILE: &str = "pull_request_reviews_000001.json";

/// Directory the git mirrors land under, relative to the export root.
pub const REPOSITORIES_DIR: &str = "repositories";

#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    /// Export only open pull requests.
    pub open_only: bool,
    /// Inclusive creation-date floor for pull requests.
    pub from_date: Option<DateTime<Utc>>,
    /// Clone from this URL instead of the canonical credentialed one
    /// (tests, air-gapped mirrors).
    pub clone_url: Option<String>,
}

/// What one finished run produced.
#[derive(Debug)]
pub struct ExportSummary {
    pub pull_requests: usize,
    pub issue_comments: usize,
    pub review_comments: usize,
    pub threads: usize,
    pub reviews: usize,
    pub default_branch: String,
    pub fell_back: bool,
}

pub struct Exporter {
    client: ApiClient,
    out_dir: PathBuf,
    options: ExportOptions,
}

impl Exporter {
    pub fn new(client: ApiClient, out_dir: &Path, options: ExportOptions) -> Self {
        Self {
            client,
            out_dir: out_dir.to_path_buf(),
            options,
        }
    }

    pub fn run(&self) -> Result<ExportSummary> {
        let workspace = self.client.workspace().to_string();
        let slug = self.client.slug().to_string();
        fs::create_dir_all(&self.out_dir)?;

        // Repository metadata is the essential path: a failure here ends
        // the run before anything is written.
        let repo = self.client.get_repository()?;
        let declared_branch = repo
            .mainbranch
            .map(|b| b.name)
            .unwrap_or_else(|| "main".to_string());

        write_json(&self.out_dir, SCHEMA_FILE, &json!({ "version": SCHEMA_VERSION }))?;

        let record = Repository {
            workspace: workspace.clone(),
            name: slug.clone(),
            description: repo.description.unwrap_or_default(),
            created_at: repo.created_on,
            private: repo.is_private,
            default_branch: declared_branch.clone(),
            git_url: Repository::tarball_url(&workspace, &slug),
        };
        write_json(&self.out_dir, REPOSITORIES_FILE, &vec![record])?;

        let users = match self.client.get_users() {
            Ok(users) => users,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("member list unavailable ({}); substituting workspace user", e);
                vec![User::synthetic(&workspace)]
            }
        };
        write_json(&self.out_dir, USERS_FILE, &users)?;

        let orgs = vec![Organization {
            login: workspace.clone(),
            name: workspace.clone(),
        }];
        write_json(&self.out_dir, ORGANIZATIONS_FILE, &orgs)?;

        let pull_requests = match self
            .client
            .get_pull_requests(self.options.open_only, self.options.from_date)
        {
            Ok(prs) => prs,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("pull request list unavailable ({}); exporting none", e);
                Vec::new()
            }
        };

        let mut inline: Vec<FetchedComment> = Vec::new();
        let mut issue_comments: Vec<IssueComment> = Vec::new();
        for pr in &pull_requests {
            match self.client.get_pull_request_comments(pr.id) {
                Ok((pr_inline, pr_general)) => {
                    inline.extend(pr_inline);
                    issue_comments.extend(pr_general);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("comments for PR #{} unavailable ({}); skipping", pr.id, e),
            }
        }

        let reconstruction = threads::reconstruct(inline);
        issue_comments.extend(reconstruction.demoted);
        issue_comments.sort_by_key(|c| c.id);

        write_json(&self.out_dir, PULL_REQUESTS_FILE, &pull_requests)?;
        write_json(&self.out_dir, ISSUE_COMMENTS_FILE, &issue_comments)?;
        write_json(&self.out_dir, REVIEW_COMMENTS_FILE, &reconstruction.review_comments)?;
        write_json(&self.out_dir, REVIEW_THREADS_FILE, &reconstruction.threads)?;
        write_json(&self.out_dir, REVIEWS_FILE, &reconstruction.reviews)?;

        let clone_url = self
            .options
            .clone_url
            .clone()
            .unwrap_or_else(|| self.client.auth().clone_url(&workspace, &slug));
        let dest = self
            .out_dir
            .join(REPOSITORIES_DIR)
            .join(&workspace)
            .join(format!("{}.git", slug));
        let outcome =
            Materializer::new(&workspace, &slug, &declared_branch, &clone_url).materialize(&dest)?;

        // The placeholder record predates the mirror; correct it with the
        // branch the mirror actually settled on.
        patch_repository_record(
            &self.out_dir,
            &outcome.default_branch,
            &Repository::tarball_url(&workspace, &slug),
        )?;

        validate::run(&self.out_dir)?;

        let summary = ExportSummary {
            pull_requests: pull_requests.len(),
            issue_comments: issue_comments.len(),
            review_comments: reconstruction.review_comments.len(),
            threads: reconstruction.threads.len(),
            reviews: reconstruction.reviews.len(),
            default_branch: outcome.default_branch,
            fell_back: outcome.fell_back,
        };
        info!(
            "exported {}/{}: {} PRs, {} threads, {} reviews (default branch {:?})",
            workspace,
            slug,
            summary.pull_requests,
            summary.threads,
            summary.reviews,
            summary.default_branch
        );
        Ok(summary)
    }
}

/// Write one collection as a complete JSON document. Never streamed, so a
/// file on disk is always wholly valid.
pub fn write_json<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    fs::write(dir.join(name), body)?;
    Ok(())
}

/// Patch the already-written repository record in place with the true
/// default branch and git URL.
pub fn patch_repository_record(dir: &Path, default_branch: &str, git_url: &str) -> Result<()> {
    let path = dir.join(REPOSITORIES_FILE);
    let mut repos: Vec<Repository> = serde_json::from_str(&fs::read_to_string(&path)?)?;
    for repo in &mut repos {
        repo.default_branch = default_branch.to_string();
        repo.git_url = git_url.to_string();
    }
    write_json(dir, REPOSITORIES_FILE, &repos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_record() -> Repository {
        Repository {
            workspace: "acme".to_string(),
            name: "widgets".to_string(),
            description: "tools".to_string(),
            created_at: "2023-01-01T00:00:00Z".parse().unwrap(),
            private: true,
            default_branch: "declared".to_string(),
            git_url: Repository::tarball_url("acme", "widgets"),
        }
    }

    #[test]
    fn test_write_json_is_a_complete_document() {
        let dir = TempDir::new().unwrap();
        write_json(dir.path(), REPOSITORIES_FILE, &vec![sample_record()]).unwrap();

        let text = fs::read_to_string(dir.path().join(REPOSITORIES_FILE)).unwrap();
        let parsed: Vec<Repository> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name, "widgets");
    }

    #[test]
    fn test_patch_repository_record_updates_branch_and_url() {
        let dir = TempDir::new().unwrap();
        write_json(dir.path(), REPOSITORIES_FILE, &vec![sample_record()]).unwrap();

        patch_repository_record(dir.path(), "main", "tarball://root/repositories/acme/widgets.git")
            .unwrap();

        let patched: Vec<Repository> = serde_json::from_str(
            &fs::read_to_string(dir.path().join(REPOSITORIES_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(patched[0].default_branch, "main");
        assert_eq!(
            patched[0].git_url,
            "tarball://root/repositories/acme/widgets.git"
        );
    }
}
