//! Nested-set invariant checks for a single forest.
//!
//! A forest of `n` rows is valid when its bounds are exactly `1..=2n`, every
//! node strictly contains its descendants and is disjoint from everything
//! else, `right - left == 2 * subtree_size - 1`, and the stored `parent` /
//! `depth` columns agree with the bounds.

use std::collections::HashSet;

use crate::errors::{DomainError, DomainResult};
use crate::models::TreeNode;

/// Depth stored on a forest root.
pub const ROOT_DEPTH: u32 = 1;

/// Validates one forest. `nodes` may be in any order but must all belong to
/// the same thread.
pub fn check_forest(nodes: &[TreeNode]) -> DomainResult<()> {
    if nodes.is_empty() {
        return Ok(());
    }

    let thread = nodes[0].thread_id;
    let mut sorted: Vec<&TreeNode> = nodes.iter().collect();
    sorted.sort_by_key(|n| n.left);

    let mut seen = HashSet::with_capacity(nodes.len() * 2);
    for node in &sorted {
        if node.thread_id != thread {
            return Err(violation(format!(
                "node for post {} belongs to thread {}, expected {thread}",
                node.post_id, node.thread_id
            )));
        }
        if node.right <= node.left || (node.right - node.left) % 2 == 0 {
            return Err(violation(format!(
                "post {} has bounds [{}, {}]",
                node.post_id, node.left, node.right
            )));
        }
        if !seen.insert(node.left) || !seen.insert(node.right) {
            return Err(violation(format!(
                "post {} reuses a bound in [{}, {}]",
                node.post_id, node.left, node.right
            )));
        }
    }

    let expected_max = 2 * nodes.len() as i64;
    if seen.iter().any(|b| *b < 1 || *b > expected_max) {
        return Err(violation(format!(
            "bounds of thread {thread} are not contiguous in 1..={expected_max}"
        )));
    }

    let root = sorted[0];
    if root.left != 1 || root.parent.is_some() || root.depth != ROOT_DEPTH {
        return Err(violation(format!(
            "thread {thread} root is post {} with left={} parent={:?} depth={}",
            root.post_id, root.left, root.parent, root.depth
        )));
    }

    let mut open: Vec<&TreeNode> = Vec::new();
    for (idx, node) in sorted.iter().enumerate() {
        while open.last().is_some_and(|top| top.right < node.left) {
            open.pop();
        }

        match open.last() {
            None if idx > 0 => {
                return Err(violation(format!(
                    "post {} lies outside the root of thread {thread}",
                    node.post_id
                )));
            }
            None => {}
            Some(enclosing) => {
                if node.right > enclosing.right {
                    return Err(violation(format!(
                        "post {} overlaps post {}",
                        node.post_id, enclosing.post_id
                    )));
                }
                if node.parent != Some(enclosing.post_id) {
                    return Err(violation(format!(
                        "post {} is nested in post {} but names parent {:?}",
                        node.post_id, enclosing.post_id, node.parent
                    )));
                }
                if node.depth != enclosing.depth + 1 {
                    return Err(violation(format!(
                        "post {} has depth {} under parent depth {}",
                        node.post_id, node.depth, enclosing.depth
                    )));
                }
            }
        }

        let descendants = sorted[idx + 1..]
            .iter()
            .take_while(|n| n.left < node.right)
            .count() as i64;
        if node.right - node.left != 2 * (descendants + 1) - 1 {
            return Err(violation(format!(
                "post {} spans [{}, {}] but has {descendants} descendants",
                node.post_id, node.left, node.right
            )));
        }

        open.push(node);
    }

    Ok(())
}

fn violation(message: String) -> DomainError {
    DomainError::InvariantViolation(message)
}
