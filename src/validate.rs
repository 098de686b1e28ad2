//! Post-write sanitization pass.
//!
//! Runs after every artifact is on disk: collapses whitespace in free-text
//! fields, flags commit SHAs that survived fetch-time resolution in short
//! form, and re-checks written HEAD files against the branch-name
//! predicate. Findings are logged; nothing here aborts the export or
//! corrupts a previously written file.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::api::FULL_SHA_LEN;
use crate::export::{PULL_REQUESTS_FILE, REPOSITORIES_DIR, REPOSITORIES_FILE};
use crate::git::is_valid_branch_name;
use crate::models::{PullRequest, Repository};
use crate::Result;

/// Run the full pass over one export directory.
pub fn run(dir: &Path) -> Result<()> {
    let changed = sanitize_descriptions(dir)?;
    if changed > 0 {
        warn!("sanitized whitespace in {} description(s)", changed);
    }
    for sha in find_short_shas(dir)? {
        warn!("short commit SHA survived resolution: {}", sha);
    }
    for head in find_invalid_heads(dir)? {
        warn!("HEAD file references an invalid branch name: {}", head.display());
    }
    Ok(())
}

/// Collapse every whitespace run (spaces, tabs, CR/LF) to one space and
/// trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Rewrite the repository records with sanitized descriptions. Returns how
/// many records changed.
pub fn sanitize_descriptions(dir: &Path) -> Result<usize> {
    let path = dir.join(REPOSITORIES_FILE);
    if !path.exists() {
        return Ok(0);
    }
    let mut repos: Vec<Repository> = serde_json::from_str(&fs::read_to_string(&path)?)?;
    let mut changed = 0;
    for repo in &mut repos {
        let clean = collapse_whitespace(&repo.description);
        if clean != repo.description {
            repo.description = clean;
            changed += 1;
        }
    }
    if changed > 0 {
        fs::write(&path, serde_json::to_string_pretty(&repos)?)?;
    }
    Ok(changed)
}

/// Second line of defense after fetch-time resolution: any SHA in the
/// written pull requests that is still shorter than 40 hex characters.
pub fn find_short_shas(dir: &Path) -> Result<Vec<String>> {
    let path = dir.join(PULL_REQUESTS_FILE);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let prs: Vec<PullRequest> = serde_json::from_str(&fs::read_to_string(&path)?)?;
    let mut short = Vec::new();
    for pr in &prs {
        for sha in [Some(&pr.source.sha), Some(&pr.destination.sha), pr.merge_commit_sha.as_ref()]
            .into_iter()
            .flatten()
        {
            if !sha.is_empty() && sha.len() < FULL_SHA_LEN {
                short.push(sha.clone());
            }
        }
    }
    Ok(short)
}

/// HEAD files under `repositories/` whose symbolic ref fails the
/// branch-name predicate.
pub fn find_invalid_heads(dir: &Path) -> Result<Vec<PathBuf>> {
    let root = dir.join(REPOSITORIES_DIR);
    let mut offenders = Vec::new();
    if !root.exists() {
        return Ok(offenders);
    }
    for workspace in read_dirs(&root)? {
        for repo in read_dirs(&workspace)? {
            let head = repo.join("HEAD");
            if !head.exists() {
                continue;
            }
            let content = fs::read_to_string(&head)?;
            let branch = content
                .trim()
                .strip_prefix("ref: refs/heads/")
                .unwrap_or("");
            if !is_valid_branch_name(branch) {
                offenders.push(head);
            }
        }
    }
    Ok(offenders)
}

fn read_dirs(path: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}
