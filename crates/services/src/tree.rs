//! # Post-Tree Engine
//!
//! Insert, delete and query operations on a thread's nested-set forest.
//! The engine holds no state between calls: it borrows one open store
//! transaction, and the caller commits it once the whole sequence (and the
//! counter updates that go with it) succeeded.

use chrono::{DateTime, Utc};
use domains::errors::{DomainError, DomainResult};
use domains::models::{DeletedSubtree, NewTreeNode, PostId, ThreadId, TreeNode};
use domains::nested_set::check_forest;
use domains::ports::ForestStore;
use tracing::{debug, error};

/// Slots a single new leaf needs.
const LEAF_WIDTH: i64 = 2;

pub struct PostTree<'t, S: ?Sized> {
    store: &'t mut S,
    verify: bool,
}

impl<'t, S> PostTree<'t, S>
where
    S: ForestStore + ?Sized,
{
    pub fn new(store: &'t mut S) -> Self {
        Self { store, verify: true }
    }

    /// Re-validate the whole forest after every mutation (on by default).
    pub fn verify_invariants(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Creates the forest of a new thread with `post` as its root.
    pub async fn insert_root(
        &mut self,
        thread: ThreadId,
        post: PostId,
        at: DateTime<Utc>,
    ) -> DomainResult<TreeNode> {
        let root = self.store.create_forest(thread, post, at).await?;
        self.verify(thread).await?;
        Ok(root)
    }

    /// Inserts `post` as the first (leftmost) child of `parent`.
    pub async fn insert_child(
        &mut self,
        post: PostId,
        parent: PostId,
        thread: ThreadId,
        at: DateTime<Utc>,
    ) -> DomainResult<TreeNode> {
        let parent_node = self
            .store
            .read_node_in(thread, parent)
            .await?
            .ok_or(DomainError::ParentNotFound { parent, thread })?;

        let left = parent_node.left + 1;
        let right = parent_node.left + 2;

        let shifted = self
            .store
            .spread_gap(thread, parent_node.left, LEAF_WIDTH)
            .await?;
        debug!(%thread, after = parent_node.left, shifted, "spread forest");

        let depth = self.depth(parent, Some(thread)).await? + 1;

        let node = self
            .store
            .insert_node(NewTreeNode {
                thread_id: thread,
                post_id: post,
                parent: Some(parent),
                left,
                right,
                depth,
                created_at: at,
            })
            .await?;
        self.verify(thread).await?;
        Ok(node)
    }

    /// Removes `node` and everything below it, then closes the gap.
    ///
    /// Bounds are re-read from the store first; the caller's copy may be stale.
    pub async fn delete_subtree(&mut self, node: &TreeNode) -> DomainResult<DeletedSubtree> {
        let thread = node.thread_id;
        let current = self
            .store
            .find_node(thread, node.post_id, node.parent)
            .await?
            .ok_or_else(|| DomainError::not_found("TreeNode", node.post_id))?;

        if current.right <= current.left {
            return Err(corrupt(format!(
                "post {} has bounds [{}, {}]",
                current.post_id, current.left, current.right
            )));
        }

        let doomed: Vec<PostId> = self
            .store
            .read_nodes_in_range(thread, current.left, current.right)
            .await?
            .into_iter()
            .map(|n| n.post_id)
            .collect();
        if doomed.len() as i64 != current.subtree_size() {
            return Err(corrupt(format!(
                "post {} spans {} slots but {} rows fall inside",
                current.post_id,
                current.width(),
                doomed.len()
            )));
        }

        let removed = self
            .store
            .delete_range(thread, current.left, current.right)
            .await?;
        if removed != doomed.len() as u64 {
            return Err(DomainError::ConcurrentModification(format!(
                "expected to delete {} rows from thread {thread}, deleted {removed}",
                doomed.len()
            )));
        }

        // Also runs for a root delete; the forest is empty then and nothing moves.
        let width = current.width();
        let shifted = self.store.close_gap(thread, current.left, width).await?;
        debug!(%thread, from = current.left, width, shifted, "closed forest gap");

        self.verify(thread).await?;
        Ok(DeletedSubtree {
            thread_id: thread,
            doomed,
            was_root: current.is_root(),
        })
    }

    /// Stored depth of `post`. Without a thread the answer is 0.
    pub async fn depth(&mut self, post: PostId, thread: Option<ThreadId>) -> DomainResult<u32> {
        let Some(thread) = thread else {
            return Ok(0);
        };
        self.store
            .read_node_in(thread, post)
            .await?
            .map(|n| n.depth)
            .ok_or_else(|| DomainError::not_found("TreeNode", post))
    }

    /// Deepest level in the forest, `None` for an empty forest.
    pub async fn max_depth(&mut self, thread: ThreadId) -> DomainResult<Option<u32>> {
        self.store.max_depth(thread).await
    }

    /// `node` and all of its descendants, ascending by `left`.
    pub async fn subtree(&mut self, node: &TreeNode) -> DomainResult<Vec<TreeNode>> {
        let current = self
            .store
            .read_node_in(node.thread_id, node.post_id)
            .await?
            .ok_or_else(|| DomainError::not_found("TreeNode", node.post_id))?;
        self.store
            .read_nodes_in_range(current.thread_id, current.left, current.right)
            .await
    }

    /// Direct replies to `post`, ordered by `left` descending.
    pub async fn children(&mut self, post: PostId, thread: ThreadId) -> DomainResult<Vec<TreeNode>> {
        self.store.read_children(thread, post).await
    }

    async fn verify(&mut self, thread: ThreadId) -> DomainResult<()> {
        if !self.verify {
            return Ok(());
        }
        let nodes = self
            .store
            .read_nodes_in_range(thread, i64::MIN, i64::MAX)
            .await?;
        check_forest(&nodes).map_err(|e| {
            error!(%thread, error = %e, "nested-set invariant broken, aborting mutation");
            e
        })
    }
}

fn corrupt(message: String) -> DomainError {
    error!(%message, "nested-set invariant broken, aborting mutation");
    DomainError::InvariantViolation(message)
}
