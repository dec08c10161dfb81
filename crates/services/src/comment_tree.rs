//! Assembles a post's flat, creation-ordered comment rows into a reply forest.

use std::collections::HashMap;

use domains::{Comment, CommentId};
use tracing::debug;

/// Builds the reply forest for one post.
///
/// `records` should be in ascending creation order. Top-level comments come
/// back in input order and every `replies` list keeps it too.
///
/// A reply attaches to its parent wherever the parent sits in `records`.
/// Replies whose parent is absent, that point at themselves, or that only
/// lead back into a cycle are dropped together with their own replies; they
/// are neither promoted to the top level nor reported as errors.
// TODO: surface dropped orphans to callers once moderation tooling can act on them.
pub fn build_comment_tree(records: Vec<Comment>) -> Vec<Comment> {
    let position: HashMap<CommentId, usize> = records
        .iter()
        .enumerate()
        .map(|(idx, record)| (record.id, idx))
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); records.len()];
    let mut roots = Vec::new();
    for (idx, record) in records.iter().enumerate() {
        match record.parent_id {
            None => roots.push(idx),
            Some(parent_id) if parent_id == record.id => {}
            Some(parent_id) => {
                if let Some(&parent) = position.get(&parent_id) {
                    children[parent].push(idx);
                }
            }
        }
    }

    // Post-order walk from the roots: a node is finished only after all of its
    // replies, so each one claims finished subtrees. Anything not reachable
    // from a root is left in its slot and dropped below.
    let mut slots: Vec<Option<Comment>> = records.into_iter().map(Some).collect();
    let mut stack: Vec<(usize, bool)> = roots.iter().rev().map(|&idx| (idx, false)).collect();
    while let Some((idx, expanded)) = stack.pop() {
        if !expanded {
            stack.push((idx, true));
            stack.extend(children[idx].iter().map(|&child| (child, false)));
            continue;
        }
        let replies: Vec<Comment> = children[idx]
            .iter()
            .filter_map(|&child| slots[child].take())
            .collect();
        if let Some(node) = slots[idx].as_mut() {
            node.replies = replies;
        }
    }

    let forest: Vec<Comment> = roots.into_iter().filter_map(|idx| slots[idx].take()).collect();

    for orphan in slots.iter().flatten() {
        debug!(
            comment_id = orphan.id,
            parent_id = ?orphan.parent_id,
            post_slug = %orphan.post_slug,
            "dropping orphaned reply"
        );
    }

    forest
}
