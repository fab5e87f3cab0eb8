//! In-process `ForumStore` backed by ordered maps.
//!
//! A transaction holds the store's mutex for its whole lifetime and keeps a
//! snapshot of the state it started from; dropping it uncommitted puts the
//! snapshot back. Faults can be armed to fail a single store call, which is
//! how the atomicity of multi-step tree mutations is exercised in tests.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::errors::{DomainError, DomainResult};
use domains::models::{
    CounterDelta, Forum, ForumId, LastPost, NewForum, NewPost, NewThread, NewTreeNode, Post,
    PostEdit, PostId, Thread, ThreadId, TreeNode,
};
use domains::ports::{AggregateStore, ForestStore, ForumStore, ForumTx};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Store call that an armed fault makes fail once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FaultPoint {
    InsertNode = 1,
    DeleteRange = 2,
    CloseGap = 3,
    InsertPost = 4,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    forums: BTreeMap<ForumId, Forum>,
    threads: BTreeMap<ThreadId, Thread>,
    posts: BTreeMap<PostId, Post>,
    nodes: BTreeMap<(ThreadId, PostId), TreeNode>,
    last_forum_id: i64,
    last_thread_id: i64,
    last_post_id: i64,
    last_node_id: i64,
}

#[derive(Clone, Default)]
pub struct InMemoryForumStore {
    state: Arc<Mutex<MemoryState>>,
    fault: Arc<AtomicU8>,
}

impl InMemoryForumStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next call to `point` fail with `Internal`.
    pub fn arm_fault(&self, point: FaultPoint) {
        self.fault.store(point as u8, Ordering::SeqCst);
    }

    /// All rows of one forest, ascending by `left`.
    pub async fn forest(&self, thread: ThreadId) -> Vec<TreeNode> {
        let state = self.state.lock().await;
        let mut nodes: Vec<TreeNode> = state
            .nodes
            .range(forest_keys(thread))
            .map(|(_, n)| n.clone())
            .collect();
        nodes.sort_by_key(|n| n.left);
        nodes
    }

    pub async fn post_count(&self) -> usize {
        self.state.lock().await.posts.len()
    }
}

#[async_trait]
impl ForumStore for InMemoryForumStore {
    async fn begin(&self) -> DomainResult<Box<dyn ForumTx>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let snapshot = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            snapshot: Some(snapshot),
            fault: Arc::clone(&self.fault),
        }))
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    snapshot: Option<MemoryState>,
    fault: Arc<AtomicU8>,
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            tracing::debug!("rolling back in-memory transaction");
            *self.guard = snapshot;
        }
    }
}

impl MemoryTx {
    fn trip(&self, point: FaultPoint) -> DomainResult<()> {
        let armed = point as u8;
        if self
            .fault
            .compare_exchange(armed, 0, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            return Err(DomainError::Internal(format!("injected fault at {point:?}")));
        }
        Ok(())
    }

    fn forum_mut(&mut self, id: ForumId) -> DomainResult<&mut Forum> {
        self.guard
            .forums
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Forum", id))
    }

    fn thread_mut(&mut self, id: ThreadId) -> DomainResult<&mut Thread> {
        self.guard
            .threads
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Thread", id))
    }

    fn latest_where(&self, keep: impl Fn(&Post) -> bool) -> Option<LastPost> {
        self.guard
            .posts
            .values()
            .filter(|p| keep(p))
            .max_by_key(|p| (p.created_at, p.id))
            .map(|p| LastPost::new(p.forum_id, p.thread_id, p.id))
    }
}

fn forest_keys(thread: ThreadId) -> RangeInclusive<(ThreadId, PostId)> {
    (thread, PostId(i64::MIN))..=(thread, PostId(i64::MAX))
}

#[async_trait]
impl ForestStore for MemoryTx {
    async fn create_forest(
        &mut self,
        thread: ThreadId,
        root: PostId,
        at: DateTime<Utc>,
    ) -> DomainResult<TreeNode> {
        if self.guard.nodes.range(forest_keys(thread)).any(|(_, n)| n.is_root()) {
            return Err(DomainError::AlreadyExists(format!("forest root for thread {thread}")));
        }
        self.insert_node(NewTreeNode {
            thread_id: thread,
            post_id: root,
            parent: None,
            left: 1,
            right: 2,
            depth: 1,
            created_at: at,
        })
        .await
    }

    async fn insert_node(&mut self, node: NewTreeNode) -> DomainResult<TreeNode> {
        self.trip(FaultPoint::InsertNode)?;
        let key = (node.thread_id, node.post_id);
        if self.guard.nodes.contains_key(&key) {
            return Err(DomainError::AlreadyExists(format!(
                "tree node for post {} in thread {}",
                node.post_id, node.thread_id
            )));
        }
        self.guard.last_node_id += 1;
        let row = TreeNode {
            id: self.guard.last_node_id,
            thread_id: node.thread_id,
            post_id: node.post_id,
            parent: node.parent,
            left: node.left,
            right: node.right,
            depth: node.depth,
            created_at: node.created_at,
        };
        self.guard.nodes.insert(key, row.clone());
        Ok(row)
    }

    async fn read_node(&mut self, post: PostId) -> DomainResult<TreeNode> {
        self.guard
            .nodes
            .values()
            .find(|n| n.post_id == post)
            .cloned()
            .ok_or_else(|| DomainError::not_found("TreeNode", post))
    }

    async fn read_node_in(
        &mut self,
        thread: ThreadId,
        post: PostId,
    ) -> DomainResult<Option<TreeNode>> {
        Ok(self.guard.nodes.get(&(thread, post)).cloned())
    }

    async fn find_node(
        &mut self,
        thread: ThreadId,
        post: PostId,
        parent: Option<PostId>,
    ) -> DomainResult<Option<TreeNode>> {
        Ok(self
            .guard
            .nodes
            .get(&(thread, post))
            .filter(|n| n.parent == parent)
            .cloned())
    }

    async fn read_nodes_in_range(
        &mut self,
        thread: ThreadId,
        left_bound: i64,
        right_bound: i64,
    ) -> DomainResult<Vec<TreeNode>> {
        let mut nodes: Vec<TreeNode> = self
            .guard
            .nodes
            .range(forest_keys(thread))
            .map(|(_, n)| n)
            .filter(|n| (left_bound..=right_bound).contains(&n.left))
            .cloned()
            .collect();
        nodes.sort_by_key(|n| n.left);
        Ok(nodes)
    }

    async fn read_children(
        &mut self,
        thread: ThreadId,
        parent: PostId,
    ) -> DomainResult<Vec<TreeNode>> {
        let mut nodes: Vec<TreeNode> = self
            .guard
            .nodes
            .range(forest_keys(thread))
            .map(|(_, n)| n)
            .filter(|n| n.parent == Some(parent))
            .cloned()
            .collect();
        nodes.sort_by_key(|n| std::cmp::Reverse(n.left));
        Ok(nodes)
    }

    async fn root_of(&mut self, thread: ThreadId) -> DomainResult<Option<TreeNode>> {
        Ok(self
            .guard
            .nodes
            .range(forest_keys(thread))
            .map(|(_, n)| n)
            .find(|n| n.is_root())
            .cloned())
    }

    async fn max_depth(&mut self, thread: ThreadId) -> DomainResult<Option<u32>> {
        Ok(self.guard.nodes.range(forest_keys(thread)).map(|(_, n)| n.depth).max())
    }

    async fn spread_gap(
        &mut self,
        thread: ThreadId,
        after_left: i64,
        width: i64,
    ) -> DomainResult<u64> {
        let mut touched = 0;
        for (_, node) in self.guard.nodes.range_mut(forest_keys(thread)) {
            let before = (node.left, node.right);
            if node.left > after_left {
                node.left += width;
            }
            if node.right > after_left {
                node.right += width;
            }
            if before != (node.left, node.right) {
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn close_gap(
        &mut self,
        thread: ThreadId,
        from_left: i64,
        width: i64,
    ) -> DomainResult<u64> {
        self.trip(FaultPoint::CloseGap)?;
        let mut touched = 0;
        for (_, node) in self.guard.nodes.range_mut(forest_keys(thread)) {
            let before = (node.left, node.right);
            if node.left > from_left {
                node.left -= width;
            }
            if node.right > from_left {
                node.right -= width;
            }
            if before != (node.left, node.right) {
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn delete_range(
        &mut self,
        thread: ThreadId,
        left_bound: i64,
        right_bound: i64,
    ) -> DomainResult<u64> {
        self.trip(FaultPoint::DeleteRange)?;
        let before = self.guard.nodes.len();
        self.guard.nodes.retain(|(t, _), n| {
            *t != thread || !(left_bound..=right_bound).contains(&n.left)
        });
        Ok((before - self.guard.nodes.len()) as u64)
    }
}

#[async_trait]
impl AggregateStore for MemoryTx {
    async fn insert_forum(&mut self, forum: NewForum) -> DomainResult<Forum> {
        self.guard.last_forum_id += 1;
        let row = Forum {
            id: ForumId(self.guard.last_forum_id),
            title: forum.title,
            description: forum.description,
            post_count: 0,
            thread_count: 0,
            visits: 0,
            last_post: None,
            created_at: forum.created_at,
        };
        self.guard.forums.insert(row.id, row.clone());
        Ok(row)
    }

    async fn read_forum(&mut self, id: ForumId) -> DomainResult<Forum> {
        self.forum_mut(id).map(|f| f.clone())
    }

    async fn apply_forum_delta(&mut self, id: ForumId, delta: CounterDelta) -> DomainResult<()> {
        let forum = self.forum_mut(id)?;
        forum.post_count += delta.posts;
        forum.thread_count += delta.threads;
        forum.visits += delta.visits;
        Ok(())
    }

    async fn set_forum_last_post(
        &mut self,
        id: ForumId,
        last: Option<LastPost>,
    ) -> DomainResult<()> {
        self.forum_mut(id)?.last_post = last;
        Ok(())
    }

    async fn set_forum_thread_count(&mut self, id: ForumId, count: i64) -> DomainResult<()> {
        self.forum_mut(id)?.thread_count = count;
        Ok(())
    }

    async fn insert_thread(&mut self, thread: NewThread) -> DomainResult<Thread> {
        if !self.guard.forums.contains_key(&thread.forum_id) {
            return Err(DomainError::not_found("Forum", thread.forum_id));
        }
        self.guard.last_thread_id += 1;
        let row = Thread {
            id: ThreadId(self.guard.last_thread_id),
            forum_id: thread.forum_id,
            subject: thread.subject,
            author: thread.author,
            created_at: thread.created_at,
            is_sticky: thread.is_sticky,
            post_count: 0,
            visits: 0,
            last_post: None,
        };
        self.guard.threads.insert(row.id, row.clone());
        Ok(row)
    }

    async fn read_thread(&mut self, id: ThreadId) -> DomainResult<Thread> {
        self.thread_mut(id).map(|t| t.clone())
    }

    async fn delete_thread(&mut self, id: ThreadId) -> DomainResult<()> {
        self.guard
            .threads
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| DomainError::not_found("Thread", id))
    }

    async fn apply_thread_delta(&mut self, id: ThreadId, delta: CounterDelta) -> DomainResult<()> {
        let thread = self.thread_mut(id)?;
        thread.post_count += delta.posts;
        thread.visits += delta.visits;
        Ok(())
    }

    async fn set_thread_last_post(
        &mut self,
        id: ThreadId,
        last: Option<LastPost>,
    ) -> DomainResult<()> {
        self.thread_mut(id)?.last_post = last;
        Ok(())
    }

    async fn relocate_thread(&mut self, id: ThreadId, forum: ForumId) -> DomainResult<u64> {
        if !self.guard.forums.contains_key(&forum) {
            return Err(DomainError::not_found("Forum", forum));
        }
        self.thread_mut(id)?.forum_id = forum;
        let mut moved = 0;
        for post in self.guard.posts.values_mut().filter(|p| p.thread_id == id) {
            post.forum_id = forum;
            moved += 1;
        }
        Ok(moved)
    }

    async fn update_thread_subject(&mut self, id: ThreadId, subject: &str) -> DomainResult<()> {
        self.thread_mut(id)?.subject = subject.to_string();
        Ok(())
    }

    async fn insert_post(&mut self, post: NewPost) -> DomainResult<Post> {
        self.trip(FaultPoint::InsertPost)?;
        if !self.guard.threads.contains_key(&post.thread_id) {
            return Err(DomainError::not_found("Thread", post.thread_id));
        }
        self.guard.last_post_id += 1;
        let row = Post {
            id: PostId(self.guard.last_post_id),
            thread_id: post.thread_id,
            forum_id: post.forum_id,
            author: post.author,
            subject: post.subject,
            body: post.body,
            created_at: post.created_at,
            updated_at: None,
            status: post.status,
            censored: false,
            censorship_comment: None,
            notify: post.notify,
        };
        self.guard.posts.insert(row.id, row.clone());
        Ok(row)
    }

    async fn read_post(&mut self, id: PostId) -> DomainResult<Post> {
        self.guard
            .posts
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("Post", id))
    }

    async fn delete_posts(&mut self, ids: &[PostId]) -> DomainResult<u64> {
        let mut removed = 0;
        for id in ids {
            if self.guard.posts.remove(id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn delete_thread_posts(&mut self, thread: ThreadId) -> DomainResult<u64> {
        let before = self.guard.posts.len();
        self.guard.posts.retain(|_, p| p.thread_id != thread);
        Ok((before - self.guard.posts.len()) as u64)
    }

    async fn update_post(&mut self, id: PostId, edit: PostEdit) -> DomainResult<()> {
        let post = self
            .guard
            .posts
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Post", id))?;
        post.subject = edit.subject;
        post.body = edit.body;
        post.notify = edit.notify;
        post.updated_at = Some(edit.at);
        Ok(())
    }

    async fn set_censorship(
        &mut self,
        id: PostId,
        censored: bool,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let post = self
            .guard
            .posts
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Post", id))?;
        post.censored = censored;
        post.censorship_comment = comment;
        post.updated_at = Some(at);
        Ok(())
    }

    async fn latest_post_in_thread(&mut self, thread: ThreadId) -> DomainResult<Option<LastPost>> {
        Ok(self.latest_where(|p| p.thread_id == thread))
    }

    async fn latest_post_in_forum(&mut self, forum: ForumId) -> DomainResult<Option<LastPost>> {
        Ok(self.latest_where(|p| p.forum_id == forum))
    }
}

#[async_trait]
impl ForumTx for MemoryTx {
    async fn commit(self: Box<Self>) -> DomainResult<()> {
        let mut tx = self;
        tx.snapshot = None;
        Ok(())
    }
}
