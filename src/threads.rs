//! Review thread and review reconstruction.
//!
//! The source API exposes pull request comments as one flat list; the
//! archive wants a three-level review → thread → comment model. This module
//! is the pure transformation between the two: no IO, deterministic output
//! for a given input set.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use crate::models::{FetchedComment, IssueComment, Review, ReviewComment, ReviewThread};

/// Review state assumed for root comments that carry none.
const DEFAULT_REVIEW_STATE: &str = "commented";

/// Output of one reconstruction pass over a pull request's comments.
#[derive(Debug, Default)]
pub struct Reconstruction {
    pub threads: Vec<ReviewThread>,
    pub reviews: Vec<Review>,
    pub review_comments: Vec<ReviewComment>,
    /// Comments with no line position, demoted to plain PR comments.
    pub demoted: Vec<IssueComment>,
}

/// Conversation grouping key: an explicit source thread id when the API
/// provides one, else the (pull request, path, position) anchor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum ThreadKey {
    Explicit(u64),
    Derived(u64, String, u64),
}

/// Rebuild threads and reviews from flat review comments.
///
/// Comments at the same (path, position) merge into one conversation; a
/// reply joins its parent's review rather than opening a new one. Orphaned
/// replies (parent absent from the fetched set) are promoted to their own
/// thread/review root; that is a deliberate degrade, never an error.
pub fn reconstruct(comments: Vec<FetchedComment>) -> Reconstruction {
    let mut positioned = Vec::new();
    let mut demoted = Vec::new();
    for comment in comments {
        match (&comment.path, comment.position) {
            (Some(_), Some(_)) => positioned.push(comment),
            _ => demoted.push(IssueComment {
                id: comment.id,
                pull_request: comment.pull_request,
                body: comment.body,
                author: comment.author,
                created_at: comment.created_at,
                updated_at: comment.updated_at,
            }),
        }
    }

    let by_id: HashMap<u64, usize> = positioned
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id, i))
        .collect();

    // Group into conversations. BTreeMap keeps iteration (and thus output
    // ordering) deterministic.
    let mut groups: BTreeMap<ThreadKey, Vec<usize>> = BTreeMap::new();
    for (i, comment) in positioned.iter().enumerate() {
        let key = match comment.thread_id {
            Some(id) => ThreadKey::Explicit(id),
            None => ThreadKey::Derived(
                comment.pull_request,
                comment.path.clone().unwrap_or_default(),
                comment.position.unwrap_or_default(),
            ),
        };
        groups.entry(key).or_default().push(i);
    }

    let mut threads = Vec::new();
    let mut review_comments = Vec::new();
    // review root id -> member indices, oldest first
    let mut review_members: BTreeMap<u64, Vec<usize>> = BTreeMap::new();

    for (_, mut members) in groups {
        members.sort_by_key(|&i| (positioned[i].created_at, positioned[i].id));
        let root = &positioned[members[0]];
        threads.push(ReviewThread {
            id: root.id,
            pull_request: root.pull_request,
            path: root.path.clone().unwrap_or_default(),
            position: root.position.unwrap_or_default(),
            original_commit: root.original_commit.clone(),
            created_at: root.created_at,
            comments: members.iter().map(|&i| positioned[i].id).collect(),
        });

        for &i in &members {
            let comment = &positioned[i];
            let (review_id, parent_located) = resolve_review_root(&positioned, &by_id, i);
            review_members.entry(review_id).or_default().push(i);
            review_comments.push(ReviewComment {
                id: comment.id,
                pull_request: comment.pull_request,
                review: review_id,
                thread: root.id,
                body: comment.body.clone(),
                author: comment.author.clone(),
                path: comment.path.clone().unwrap_or_default(),
                position: comment.position.unwrap_or_default(),
                created_at: comment.created_at,
                updated_at: comment.updated_at,
                in_reply_to: if parent_located { comment.in_reply_to } else { None },
                original_commit: comment.original_commit.clone(),
            });
        }
    }

    let mut reviews = Vec::new();
    for (review_id, mut members) in review_members {
        members.sort_by_key(|&i| (positioned[i].created_at, positioned[i].id));
        let root_index = by_id[&review_id];
        let root = &positioned[root_index];
        let submitted_at = members
            .iter()
            .map(|&i| positioned[i].created_at)
            .min()
            .unwrap_or(root.created_at);
        reviews.push(Review {
            id: review_id,
            pull_request: root.pull_request,
            author: root.author.clone(),
            state: root
                .review_state
                .clone()
                .unwrap_or_else(|| DEFAULT_REVIEW_STATE.to_string()),
            submitted_at,
            comments: members.iter().map(|&i| positioned[i].id).collect(),
        });
    }

    threads.sort_by_key(|t| t.id);
    reviews.sort_by_key(|r| r.id);
    review_comments.sort_by_key(|c| c.id);
    demoted.sort_by_key(|c| c.id);

    Reconstruction {
        threads,
        reviews,
        review_comments,
        demoted,
    }
}

/// Walk the reply chain to the comment that anchors the review.
///
/// Returns the root comment id plus whether this comment's direct parent
/// was located (orphans lose their `in_reply_to` because they get promoted
/// to roots).
fn resolve_review_root(
    positioned: &[FetchedComment],
    by_id: &HashMap<u64, usize>,
    index: usize,
) -> (u64, bool) {
    let comment = &positioned[index];
    let Some(parent_id) = comment.in_reply_to else {
        return (comment.id, false);
    };
    if !by_id.contains_key(&parent_id) {
        debug!(
            "comment {} replies to missing comment {}; promoting to root",
            comment.id, parent_id
        );
        return (comment.id, false);
    }

    let mut current = parent_id;
    let mut seen = HashSet::new();
    seen.insert(comment.id);
    while let Some(&i) = by_id.get(&current) {
        if !seen.insert(current) {
            break; // defective reply cycle; stop at the repeat
        }
        match positioned[i].in_reply_to {
            Some(next) if by_id.contains_key(&next) => current = next,
            _ => break,
        }
    }
    (current, true)
}
