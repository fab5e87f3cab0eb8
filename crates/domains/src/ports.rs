//! # Ports
//!
//! Storage adapters implement `ForumStore` / `ForumTx`; everything else here is
//! an external collaborator the core calls but never implements.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::DomainResult;
use crate::models::{
    CounterDelta, Forum, ForumId, LastPost, NewForum, NewPost, NewThread, NewTreeNode, Post,
    PostEdit, PostId, Thread, ThreadId, TreeNode, UserId, UserProfile,
};

/// Persistence of nested-set rows, keyed by `(thread, post)`.
///
/// Bounds are only ever shifted through `spread_gap` / `close_gap`; callers
/// must run a whole insert or delete sequence inside one `ForumTx`.
#[async_trait]
pub trait ForestStore: Send {
    /// Inserts the root row `left=1, right=2, depth=1`.
    /// Fails with `AlreadyExists` when the thread already has a root.
    async fn create_forest(
        &mut self,
        thread: ThreadId,
        root: PostId,
        at: DateTime<Utc>,
    ) -> DomainResult<TreeNode>;

    /// Inserts a fully positioned row. The caller has already made room.
    async fn insert_node(&mut self, node: NewTreeNode) -> DomainResult<TreeNode>;

    /// Cross-thread lookup by post id.
    async fn read_node(&mut self, post: PostId) -> DomainResult<TreeNode>;

    async fn read_node_in(&mut self, thread: ThreadId, post: PostId)
        -> DomainResult<Option<TreeNode>>;

    /// Lookup by `(thread, post, parent)`, the authoritative key used before deletes.
    async fn find_node(
        &mut self,
        thread: ThreadId,
        post: PostId,
        parent: Option<PostId>,
    ) -> DomainResult<Option<TreeNode>>;

    /// Rows with `left` in `[left_bound, right_bound]`, ascending by `left`.
    async fn read_nodes_in_range(
        &mut self,
        thread: ThreadId,
        left_bound: i64,
        right_bound: i64,
    ) -> DomainResult<Vec<TreeNode>>;

    /// Rows whose parent is `parent`, ordered by `left` descending.
    async fn read_children(&mut self, thread: ThreadId, parent: PostId)
        -> DomainResult<Vec<TreeNode>>;

    async fn root_of(&mut self, thread: ThreadId) -> DomainResult<Option<TreeNode>>;

    /// `MAX(depth)` over the forest, `None` when it has no rows.
    async fn max_depth(&mut self, thread: ThreadId) -> DomainResult<Option<u32>>;

    /// Adds `width` to every bound greater than `after_left`. Returns rows touched.
    async fn spread_gap(&mut self, thread: ThreadId, after_left: i64, width: i64)
        -> DomainResult<u64>;

    /// Subtracts `width` from every bound greater than `from_left`. Returns rows touched.
    async fn close_gap(&mut self, thread: ThreadId, from_left: i64, width: i64)
        -> DomainResult<u64>;

    /// Removes every row with `left` in `[left_bound, right_bound]`.
    async fn delete_range(
        &mut self,
        thread: ThreadId,
        left_bound: i64,
        right_bound: i64,
    ) -> DomainResult<u64>;
}

/// Forum, thread and post records plus their aggregate counters.
#[async_trait]
pub trait AggregateStore: Send {
    async fn insert_forum(&mut self, forum: NewForum) -> DomainResult<Forum>;
    async fn read_forum(&mut self, id: ForumId) -> DomainResult<Forum>;
    async fn apply_forum_delta(&mut self, id: ForumId, delta: CounterDelta) -> DomainResult<()>;
    async fn set_forum_last_post(&mut self, id: ForumId, last: Option<LastPost>)
        -> DomainResult<()>;
    async fn set_forum_thread_count(&mut self, id: ForumId, count: i64) -> DomainResult<()>;

    async fn insert_thread(&mut self, thread: NewThread) -> DomainResult<Thread>;
    async fn read_thread(&mut self, id: ThreadId) -> DomainResult<Thread>;
    async fn delete_thread(&mut self, id: ThreadId) -> DomainResult<()>;
    async fn apply_thread_delta(&mut self, id: ThreadId, delta: CounterDelta) -> DomainResult<()>;
    async fn set_thread_last_post(&mut self, id: ThreadId, last: Option<LastPost>)
        -> DomainResult<()>;
    /// Re-homes the thread and all of its posts. Returns the number of posts moved.
    async fn relocate_thread(&mut self, id: ThreadId, forum: ForumId) -> DomainResult<u64>;
    async fn update_thread_subject(&mut self, id: ThreadId, subject: &str) -> DomainResult<()>;

    async fn insert_post(&mut self, post: NewPost) -> DomainResult<Post>;
    async fn read_post(&mut self, id: PostId) -> DomainResult<Post>;
    async fn delete_posts(&mut self, ids: &[PostId]) -> DomainResult<u64>;
    async fn delete_thread_posts(&mut self, thread: ThreadId) -> DomainResult<u64>;
    /// Replaces subject, body and notify flag, and stamps `updated_at`.
    async fn update_post(&mut self, id: PostId, edit: PostEdit) -> DomainResult<()>;
    async fn set_censorship(
        &mut self,
        id: PostId,
        censored: bool,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> DomainResult<()>;

    /// Most recent post of the thread by `created_at`, then id.
    async fn latest_post_in_thread(&mut self, thread: ThreadId) -> DomainResult<Option<LastPost>>;
    /// Most recent post of the forum by `created_at`, then id.
    async fn latest_post_in_forum(&mut self, forum: ForumId) -> DomainResult<Option<LastPost>>;
}

/// One unit of work. Dropping it without `commit` discards every write.
#[async_trait]
pub trait ForumTx: ForestStore + AggregateStore {
    async fn commit(self: Box<Self>) -> DomainResult<()>;
}

/// Entry point of a storage adapter.
#[async_trait]
pub trait ForumStore: Send + Sync {
    async fn begin(&self) -> DomainResult<Box<dyn ForumTx>>;
}

/// User account lookups.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// `None` when no account exists for the id.
    async fn lookup_user(&self, id: UserId) -> DomainResult<Option<UserProfile>>;
}

/// Cleanup of files attached to posts.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn delete_attachments_for_post(&self, post: PostId) -> DomainResult<()>;
}

/// Mail / notification delivery.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, recipient: UserId, subject: &str, body: &str) -> DomainResult<()>;
}

/// Read permission checks used to filter notification recipients.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AccessControl: Send + Sync {
    async fn can_read(&self, user: UserId, forum: ForumId) -> DomainResult<bool>;
}
