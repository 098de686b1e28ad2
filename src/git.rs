//! Repository materialization.
//!
//! Mirror-clones the source repository into the archive layout, reconciles
//! the default branch, and rewrites HEAD. Cloning always goes through a
//! temporary directory followed by an atomic rename, so a crash mid-clone
//! never corrupts a previous good export. Any unrecoverable mirror failure
//! degrades to an empty bare repository; only a failure building that
//! fallback is fatal.

use std::fs;
use std::path::Path;
use std::process::Command;

use chrono::Utc;
use tracing::{info, warn};

use crate::{Error, Result};

/// git's well-known empty-tree object; the synthetic default branch of a
/// fallback repository points at it.
pub const EMPTY_TREE_SHA: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

/// Branch names tried, in order, when neither the declared branch nor the
/// most recently committed one can be found.
const BRANCH_CANDIDATES: [&str; 5] = ["main", "master", "develop", "default", "trunk"];

/// Default branch reported for fallback (empty) repositories.
const FALLBACK_BRANCH: &str = "main";

/// Characters git forbids anywhere in a ref name.
const FORBIDDEN_CHARS: [char; 6] = ['~', '^', ':', '?', '*', '['];

/// Result of materializing one repository.
#[derive(Debug)]
pub struct MaterializeOutcome {
    /// Branch HEAD ends up pointing at.
    pub default_branch: String,
    /// Whether the empty-repository fallback was taken.
    pub fell_back: bool,
}

/// Mirrors one repository into a bare directory on disk.
pub struct Materializer {
    workspace: String,
    slug: String,
    declared_branch: String,
    clone_url: String,
    canonical_url: String,
}

impl Materializer {
    pub fn new(workspace: &str, slug: &str, declared_branch: &str, clone_url: &str) -> Self {
        Self {
            workspace: workspace.to_string(),
            slug: slug.to_string(),
            declared_branch: declared_branch.to_string(),
            clone_url: clone_url.to_string(),
            canonical_url: canonical_clone_url(workspace, slug),
        }
    }

    /// Materialize the repository at `dest`, falling back to an empty bare
    /// repository when the mirror cannot be produced.
    pub fn materialize(&self, dest: &Path) -> Result<MaterializeOutcome> {
        let outcome = match self.mirror(dest) {
            Ok(branch) => {
                info!(
                    "mirrored {}/{} with default branch {:?}",
                    self.workspace, self.slug, branch
                );
                MaterializeOutcome {
                    default_branch: branch,
                    fell_back: false,
                }
            }
            Err(e) => {
                warn!(
                    "mirror of {}/{} failed ({}); creating empty repository",
                    self.workspace, self.slug, e
                );
                self.empty_fallback(dest)?;
                MaterializeOutcome {
                    default_branch: FALLBACK_BRANCH.to_string(),
                    fell_back: true,
                }
            }
        };
        self.write_sidecars(dest)?;
        Ok(outcome)
    }

    /// Mirror-clone into a temp directory, reconcile the default branch,
    /// rewrite HEAD, and atomically move the result into `dest`. Returns
    /// the resolved branch name. On error, `dest` is left untouched.
    pub fn mirror(&self, dest: &Path) -> Result<String> {
        let parent = dest.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        let staging = tempfile::Builder::new()
            .prefix(".clone-")
            .tempdir_in(parent)?;
        let repo = staging.path().join("mirror.git");

        run_git(
            None,
            &[
                "clone",
                "--mirror",
                &self.clone_url,
                repo.to_string_lossy().as_ref(),
            ],
        )?;

        // Strip credentials from the recorded remote; losing this is not
        // worth failing the export over.
        if let Err(e) = run_git(
            Some(&repo),
            &["remote", "set-url", "origin", &self.canonical_url],
        ) {
            warn!("could not rewrite origin URL: {}", e);
        }

        let branch = self.resolve_branch(&repo);
        checked_branch_name(&branch)?;

        // Grab the tip before touching HEAD; rev-parse resolves through the
        // old HEAD.
        let head_sha = run_git(Some(&repo), &["rev-parse", "HEAD"]).ok();

        fs::write(repo.join("HEAD"), format!("ref: refs/heads/{}\n", branch))?;

        let ref_file = repo.join("refs").join("heads").join(&branch);
        if !ref_file.exists() {
            // Mirror clones pack their refs; synthesize the loose file so
            // the importer always finds one.
            if let Some(sha) = head_sha {
                if let Some(dir) = ref_file.parent() {
                    fs::create_dir_all(dir)?;
                }
                fs::write(&ref_file, format!("{}\n", sha))?;
            }
        }

        if dest.exists() {
            fs::remove_dir_all(dest)?;
        }
        fs::rename(&repo, dest)?;
        Ok(branch)
    }

    /// Resolve the branch HEAD should point at: the declared branch when it
    /// exists, else the most recently committed branch, else the first
    /// existing candidate, else the declared name anyway (accepted risk).
    fn resolve_branch(&self, repo: &Path) -> String {
        if self.branch_exists(repo, &self.declared_branch) {
            return self.declared_branch.clone();
        }

        if let Ok(out) = run_git(
            Some(repo),
            &[
                "for-each-ref",
                "--count=1",
                "--sort=-committerdate",
                "--format=%(refname:short)",
                "refs/heads",
            ],
        ) {
            if let Some(newest) = out.lines().next().filter(|l| !l.is_empty()) {
                warn!(
                    "declared branch {:?} missing; using most recent {:?}",
                    self.declared_branch, newest
                );
                return newest.to_string();
            }
        }

        for candidate in BRANCH_CANDIDATES {
            if self.branch_exists(repo, candidate) {
                warn!(
                    "declared branch {:?} missing; using candidate {:?}",
                    self.declared_branch, candidate
                );
                return candidate.to_string();
            }
        }

        warn!(
            "no branch found; keeping declared name {:?}",
            self.declared_branch
        );
        self.declared_branch.clone()
    }

    fn branch_exists(&self, repo: &Path, branch: &str) -> bool {
        if branch.is_empty() {
            return false;
        }
        run_git(
            Some(repo),
            &[
                "show-ref",
                "--verify",
                "--quiet",
                &format!("refs/heads/{}", branch),
            ],
        )
        .is_ok()
    }

    /// Build an empty bare repository at `dest`: `git init --bare`, or a
    /// hand-built skeleton when even that fails. HEAD points at a synthetic
    /// main whose ref holds the empty-tree hash.
    fn empty_fallback(&self, dest: &Path) -> Result<()> {
        if dest.exists() {
            fs::remove_dir_all(dest)?;
        }
        fs::create_dir_all(dest)?;

        if let Err(e) = run_git(None, &["init", "--bare", dest.to_string_lossy().as_ref()]) {
            warn!("git init --bare failed ({}); building skeleton by hand", e);
            build_bare_skeleton(dest)?;
        }

        fs::write(
            dest.join("HEAD"),
            format!("ref: refs/heads/{}\n", FALLBACK_BRANCH),
        )?;
        let heads = dest.join("refs").join("heads");
        fs::create_dir_all(&heads)?;
        fs::write(heads.join(FALLBACK_BRANCH), format!("{}\n", EMPTY_TREE_SHA))?;
        Ok(())
    }

    /// `info/nwo` and `info/last-sync` sidecars the importer reads.
    fn write_sidecars(&self, dest: &Path) -> Result<()> {
        let info = dest.join("info");
        fs::create_dir_all(&info)?;
        fs::write(
            info.join("nwo"),
            format!("{}/{}\n", self.workspace, self.slug),
        )?;
        fs::write(info.join("last-sync"), format!("{}\n", Utc::now().to_rfc3339()))?;
        Ok(())
    }
}

/// Credential-free canonical clone URL.
pub fn canonical_clone_url(workspace: &str, slug: &str) -> String {
    format!("https://bitbucket.org/{}/{}.git", workspace, slug)
}

/// Whether a name is exactly a full commit hash, which would make
/// `refs/heads/<name>` ambiguous.
pub fn looks_like_commit_sha(name: &str) -> bool {
    name.len() == 40 && name.chars().all(|c| c.is_ascii_hexdigit())
}

/// Branch names that are safe to write into HEAD and ref files.
pub fn is_valid_branch_name(name: &str) -> bool {
    if name.is_empty() || looks_like_commit_sha(name) {
        return false;
    }
    if name.contains(' ') || name.chars().any(|c| FORBIDDEN_CHARS.contains(&c)) {
        return false;
    }
    if name.contains("@{") || name.contains("..") || name.contains("//") {
        return false;
    }
    if name.starts_with('.') || name.ends_with('.') || name.starts_with('/') || name.ends_with('/')
    {
        return false;
    }
    if name.ends_with(".lock") {
        return false;
    }
    true
}

/// Validate a resolved branch name before any ref is written.
fn checked_branch_name(name: &str) -> Result<()> {
    if looks_like_commit_sha(name) {
        return Err(Error::Clone(format!(
            "ambiguous reference: branch name {:?} is indistinguishable from a commit hash",
            name
        )));
    }
    if !is_valid_branch_name(name) {
        return Err(Error::InvalidBranchName(name.to_string()));
    }
    Ok(())
}

/// Hand-built bare repository skeleton, for when `git init --bare` itself
/// is unavailable.
fn build_bare_skeleton(dest: &Path) -> Result<()> {
    for dir in [
        "objects/info",
        "objects/pack",
        "refs/heads",
        "refs/tags",
        "hooks",
        "info",
    ] {
        fs::create_dir_all(dest.join(dir))?;
    }
    Ok(())
}

fn run_git(dir: Option<&Path>, args: &[&str]) -> Result<String> {
    let mut cmd = Command::new("git");
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    let output = cmd
        .args(args)
        .output()
        .map_err(|e| Error::Clone(format!("failed to run git: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Clone(format!(
            "git {} failed: {}",
            args.first().unwrap_or(&""),
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
