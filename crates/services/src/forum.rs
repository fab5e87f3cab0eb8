//! # Forum Service
//!
//! Orchestrates one forum mutation per store transaction: records, tree
//! and counters are written together and committed once. Work that talks
//! to external collaborators (notifications, attachment cleanup) runs only
//! after a successful commit and never fails the mutation itself.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use domains::errors::{DomainError, DomainResult};
use domains::models::{
    Author, Forum, ForumId, NewForum, NewPost, NewThread, NodeView, Post, PostEdit, PostId,
    PostStatus, SubtreeOrder, Thread, ThreadId, TreeNode, UserId, UserProfile, VisitTarget,
};
use domains::ports::{
    AccessControl, AttachmentStore, ForestStore, ForumStore, ForumTx, NotificationDispatcher,
    UserDirectory,
};
use tracing::{debug, info, instrument, warn};

use crate::counters::{Counters, MovedTotals};
use crate::materialize::{mark_last_child, materialize, render_outline};
use crate::retry::RetryPolicy;
use crate::tree::PostTree;

/// External systems the forum calls into but does not own.
#[derive(Clone)]
pub struct Collaborators {
    pub users: Arc<dyn UserDirectory>,
    pub attachments: Arc<dyn AttachmentStore>,
    pub notifier: Arc<dyn NotificationDispatcher>,
    pub access: Arc<dyn AccessControl>,
}

#[derive(Debug, Clone)]
pub struct ForumOptions {
    /// Display name for authors that cannot be resolved.
    pub unknown_author_label: String,
    /// Repeat visits inside this window are not counted.
    pub visit_window: TimeDelta,
    pub verify_invariants: bool,
    pub retry: RetryPolicy,
}

impl Default for ForumOptions {
    fn default() -> Self {
        Self {
            unknown_author_label: "Unknown".to_string(),
            visit_window: TimeDelta::seconds(3600),
            verify_invariants: true,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewThreadRequest {
    pub forum_id: ForumId,
    pub subject: String,
    pub body: String,
    pub author: Author,
    pub notify: bool,
    pub is_sticky: bool,
    pub status: PostStatus,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ReplyRequest {
    pub thread_id: ThreadId,
    pub parent: PostId,
    pub subject: String,
    pub body: String,
    pub author: Author,
    pub notify: bool,
    pub status: PostStatus,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedThread {
    pub thread: Thread,
    pub opening: Post,
    pub root: TreeNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedReply {
    pub post: Post,
    pub node: TreeNode,
    /// Parent author that was sent a notification, if any.
    pub notified: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionOutcome {
    /// Every removed post, ascending by tree position.
    pub doomed: Vec<PostId>,
    /// Set when the thread's opening post was deleted and the thread went with it.
    pub deleted_thread: Option<ThreadId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveSummary {
    pub threads: Vec<ThreadId>,
    pub totals: MovedTotals,
}

pub struct ForumService {
    store: Arc<dyn ForumStore>,
    collaborators: Collaborators,
    options: ForumOptions,
}

impl ForumService {
    pub fn new(store: Arc<dyn ForumStore>, collaborators: Collaborators, options: ForumOptions) -> Self {
        Self { store, collaborators, options }
    }

    pub fn options(&self) -> &ForumOptions {
        &self.options
    }

    fn tree<'t, S>(&self, tx: &'t mut S) -> PostTree<'t, S>
    where
        S: ForestStore + ?Sized,
    {
        PostTree::new(tx).verify_invariants(self.options.verify_invariants)
    }

    // ── writes ──────────────────────────────────────────────────────────

    #[instrument(skip(self, description))]
    pub async fn create_forum(&self, title: &str, description: &str) -> DomainResult<Forum> {
        if title.trim().is_empty() {
            return Err(DomainError::Validation("forum title must not be empty".into()));
        }
        let mut tx = self.store.begin().await?;
        let forum = tx
            .insert_forum(NewForum {
                title: title.to_string(),
                description: description.to_string(),
                created_at: Utc::now(),
            })
            .await?;
        tx.commit().await?;
        info!(forum = %forum.id, "forum created");
        Ok(forum)
    }

    /// Opens a thread: record, opening post, forest root and counters.
    #[instrument(skip(self, req), fields(forum = %req.forum_id))]
    pub async fn create_thread(&self, req: NewThreadRequest) -> DomainResult<CreatedThread> {
        if req.subject.trim().is_empty() {
            return Err(DomainError::Validation("thread subject must not be empty".into()));
        }
        let req = &req;
        let created = self
            .options
            .retry
            .run("create_thread", move || self.try_create_thread(req))
            .await?;
        info!(thread = %created.thread.id, post = %created.opening.id, "thread created");
        Ok(created)
    }

    async fn try_create_thread(&self, req: &NewThreadRequest) -> DomainResult<CreatedThread> {
        let mut tx = self.store.begin().await?;
        tx.read_forum(req.forum_id).await?;

        let thread = tx
            .insert_thread(NewThread {
                forum_id: req.forum_id,
                subject: req.subject.clone(),
                author: req.author.clone(),
                created_at: req.at,
                is_sticky: req.is_sticky,
            })
            .await?;
        let opening = tx
            .insert_post(NewPost {
                thread_id: thread.id,
                forum_id: req.forum_id,
                author: req.author.clone(),
                subject: req.subject.clone(),
                body: req.body.clone(),
                created_at: req.at,
                status: req.status,
                notify: req.notify,
            })
            .await?;

        let root = self.tree(&mut *tx).insert_root(thread.id, opening.id, req.at).await?;
        Counters::new(&mut *tx).thread_inserted(&opening).await?;

        let thread = tx.read_thread(thread.id).await?;
        tx.commit().await?;
        Ok(CreatedThread { thread, opening, root })
    }

    /// Adds a reply below `req.parent`, then tells the parent's author if
    /// they asked for it.
    #[instrument(skip(self, req), fields(thread = %req.thread_id, parent = %req.parent))]
    pub async fn reply(&self, req: ReplyRequest) -> DomainResult<CreatedReply> {
        let req = &req;
        let (post, node, parent) = self
            .options
            .retry
            .run("reply", move || self.try_reply(req))
            .await?;
        debug!(post = %post.id, left = node.left, depth = node.depth, "reply stored");

        let notified = self.notify_parent_author(&parent, &post).await;
        Ok(CreatedReply { post, node, notified })
    }

    async fn try_reply(&self, req: &ReplyRequest) -> DomainResult<(Post, TreeNode, Post)> {
        let mut tx = self.store.begin().await?;
        let thread = tx.read_thread(req.thread_id).await?;

        let post = tx
            .insert_post(NewPost {
                thread_id: thread.id,
                forum_id: thread.forum_id,
                author: req.author.clone(),
                subject: req.subject.clone(),
                body: req.body.clone(),
                created_at: req.at,
                status: req.status,
                notify: req.notify,
            })
            .await?;
        let node = self
            .tree(&mut *tx)
            .insert_child(post.id, req.parent, thread.id, req.at)
            .await?;
        Counters::new(&mut *tx).post_inserted(&post).await?;

        let parent = tx.read_post(req.parent).await?;
        tx.commit().await?;
        Ok((post, node, parent))
    }

    async fn notify_parent_author(&self, parent: &Post, reply: &Post) -> Option<UserId> {
        let recipient = parent.author.user_id?;
        if !parent.notify || reply.author.user_id == Some(recipient) {
            return None;
        }

        match self.collaborators.access.can_read(recipient, reply.forum_id).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(%recipient, forum = %reply.forum_id, "recipient cannot read forum, skipping");
                return None;
            }
            Err(e) => {
                warn!(%recipient, error = %e, "access check failed, skipping notification");
                return None;
            }
        }

        match self
            .collaborators
            .notifier
            .notify(recipient, &reply.subject, &reply.body)
            .await
        {
            Ok(()) => Some(recipient),
            Err(e) => {
                warn!(%recipient, post = %reply.id, error = %e, "reply notification failed");
                None
            }
        }
    }

    /// Deletes a post together with all replies below it. Deleting a
    /// thread's opening post deletes the thread.
    #[instrument(skip(self))]
    pub async fn delete_post(&self, post: PostId) -> DomainResult<DeletionOutcome> {
        let outcome = self
            .options
            .retry
            .run("delete_post", move || self.try_delete_post(post))
            .await?;
        info!(
            doomed = outcome.doomed.len(),
            thread_deleted = outcome.deleted_thread.is_some(),
            "subtree deleted"
        );

        for id in &outcome.doomed {
            if let Err(e) = self.collaborators.attachments.delete_attachments_for_post(*id).await {
                warn!(post = %id, error = %e, "attachment cleanup failed");
            }
        }
        Ok(outcome)
    }

    async fn try_delete_post(&self, id: PostId) -> DomainResult<DeletionOutcome> {
        let mut tx = self.store.begin().await?;
        let post = tx.read_post(id).await?;
        let node = tx
            .read_node_in(post.thread_id, id)
            .await?
            .ok_or_else(|| DomainError::not_found("TreeNode", id))?;

        let deleted = self.tree(&mut *tx).delete_subtree(&node).await?;

        if deleted.was_root {
            tx.delete_thread_posts(deleted.thread_id).await?;
            tx.delete_thread(deleted.thread_id).await?;
        } else {
            let removed = tx.delete_posts(&deleted.doomed).await?;
            if removed != deleted.doomed.len() as u64 {
                return Err(DomainError::ConcurrentModification(format!(
                    "expected to delete {} posts, deleted {removed}",
                    deleted.doomed.len()
                )));
            }
        }
        Counters::new(&mut *tx).subtree_deleted(post.forum_id, &deleted).await?;

        tx.commit().await?;
        Ok(DeletionOutcome {
            deleted_thread: deleted.was_root.then_some(deleted.thread_id),
            doomed: deleted.doomed,
        })
    }

    /// Moves `threads` from `source` to `dest`, carrying their counts along.
    #[instrument(skip(self, threads), fields(count = threads.len()))]
    pub async fn move_threads(
        &self,
        source: ForumId,
        dest: ForumId,
        threads: &[ThreadId],
    ) -> DomainResult<MoveSummary> {
        if source == dest {
            return Err(DomainError::Validation(format!(
                "source and destination forum are both {source}"
            )));
        }
        let unique: BTreeSet<ThreadId> = threads.iter().copied().collect();
        let threads: Vec<ThreadId> = unique.into_iter().collect();
        let threads = &threads;
        let summary = self
            .options
            .retry
            .run("move_threads", move || self.try_move_threads(source, dest, threads))
            .await?;
        info!(
            %source,
            %dest,
            threads = summary.totals.threads,
            posts = summary.totals.posts,
            "threads moved"
        );
        Ok(summary)
    }

    async fn try_move_threads(
        &self,
        source: ForumId,
        dest: ForumId,
        threads: &[ThreadId],
    ) -> DomainResult<MoveSummary> {
        let mut tx = self.store.begin().await?;
        tx.read_forum(source).await?;
        tx.read_forum(dest).await?;

        let mut totals = MovedTotals::default();
        for &id in threads {
            let thread = tx.read_thread(id).await?;
            if thread.forum_id != source {
                return Err(DomainError::Validation(format!(
                    "thread {id} belongs to forum {}, not {source}",
                    thread.forum_id
                )));
            }
            let moved = tx.relocate_thread(id, dest).await?;
            if moved as i64 != thread.post_count {
                warn!(thread = %id, moved, counted = thread.post_count, "thread post count drifted");
            }
            tx.set_thread_last_post(id, thread.last_post.map(|last| last.in_forum(dest)))
                .await?;

            totals.threads += 1;
            totals.posts += moved as i64;
            totals.visits += thread.visits;
        }
        Counters::new(&mut *tx).threads_moved(source, dest, totals).await?;

        tx.commit().await?;
        Ok(MoveSummary {
            threads: threads.to_vec(),
            totals,
        })
    }

    /// Rewrites a post's subject, body and notify flag. Editing the opening
    /// post renames the thread as well.
    #[instrument(skip(self, edit))]
    pub async fn edit_post(&self, post: PostId, edit: PostEdit) -> DomainResult<Post> {
        if edit.subject.trim().is_empty() {
            return Err(DomainError::Validation("post subject must not be empty".into()));
        }
        let edit = &edit;
        let (post, renamed) = self
            .options
            .retry
            .run("edit_post", move || self.try_edit_post(post, edit))
            .await?;
        info!(post = %post.id, thread_renamed = renamed, "post edited");
        Ok(post)
    }

    async fn try_edit_post(&self, id: PostId, edit: &PostEdit) -> DomainResult<(Post, bool)> {
        let mut tx = self.store.begin().await?;
        let current = tx.read_post(id).await?;
        tx.update_post(id, edit.clone()).await?;

        let is_opening = tx
            .root_of(current.thread_id)
            .await?
            .is_some_and(|root| root.post_id == id);
        if is_opening {
            tx.update_thread_subject(current.thread_id, &edit.subject).await?;
        }

        let post = tx.read_post(id).await?;
        tx.commit().await?;
        Ok((post, is_opening))
    }

    /// Forces the stored thread count of `forum`. Returns whether it had drifted.
    #[instrument(skip(self))]
    pub async fn recount_threads(&self, forum: ForumId, observed: i64) -> DomainResult<bool> {
        if observed < 0 {
            return Err(DomainError::Validation(format!(
                "thread count cannot be negative: {observed}"
            )));
        }
        self.options
            .retry
            .run("recount_threads", move || async move {
                let mut tx = self.store.begin().await?;
                let drifted = Counters::new(&mut *tx).recount_threads(forum, observed).await?;
                tx.commit().await?;
                Ok(drifted)
            })
            .await
    }

    /// Counts a visit unless `last_visit` falls inside the visit window.
    pub async fn record_visit(
        &self,
        target: VisitTarget,
        last_visit: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> DomainResult<bool> {
        let window = self.options.visit_window;
        self.options
            .retry
            .run("record_visit", move || async move {
                let mut tx = self.store.begin().await?;
                let counted = Counters::new(&mut *tx)
                    .visit(target, last_visit, now, window)
                    .await?;
                if counted {
                    tx.commit().await?;
                }
                Ok(counted)
            })
            .await
    }

    /// Sets or lifts the censorship flag of a post.
    #[instrument(skip(self, comment))]
    pub async fn censor_post(
        &self,
        post: PostId,
        censored: bool,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> DomainResult<Post> {
        let comment = &comment;
        self.options
            .retry
            .run("censor_post", move || async move {
                let mut tx = self.store.begin().await?;
                tx.set_censorship(post, censored, comment.clone(), at).await?;
                let post = tx.read_post(post).await?;
                tx.commit().await?;
                Ok(post)
            })
            .await
    }

    // ── reads ───────────────────────────────────────────────────────────

    pub async fn forum(&self, id: ForumId) -> DomainResult<Forum> {
        self.store.begin().await?.read_forum(id).await
    }

    pub async fn thread(&self, id: ThreadId) -> DomainResult<Thread> {
        self.store.begin().await?.read_thread(id).await
    }

    /// The opening post of `thread`, `None` once the forest is gone.
    pub async fn thread_root(&self, thread: ThreadId) -> DomainResult<Option<NodeView>> {
        let mut tx = self.store.begin().await?;
        let Some(root) = tx.root_of(thread).await? else {
            return Ok(None);
        };
        let post = tx.read_post(root.post_id).await?;
        drop(tx);
        Ok(self.hydrate(vec![(root, post)]).await.pop())
    }

    pub async fn depth(&self, post: PostId, thread: Option<ThreadId>) -> DomainResult<u32> {
        let mut tx = self.store.begin().await?;
        self.tree(&mut *tx).depth(post, thread).await
    }

    pub async fn max_depth(&self, thread: ThreadId) -> DomainResult<Option<u32>> {
        let mut tx = self.store.begin().await?;
        self.tree(&mut *tx).max_depth(thread).await
    }

    /// `post` and every reply below it, ordered by creation time. Equal
    /// timestamps keep tree order.
    pub async fn list_subtree(&self, post: PostId, order: SubtreeOrder) -> DomainResult<Vec<NodeView>> {
        let mut tx = self.store.begin().await?;
        let node = tx.read_node(post).await?;
        let mut nodes = self.tree(&mut *tx).subtree(&node).await?;
        nodes.sort_by(|a, b| {
            let by_time = match order {
                SubtreeOrder::CreatedAsc => a.created_at.cmp(&b.created_at),
                SubtreeOrder::CreatedDesc => b.created_at.cmp(&a.created_at),
            };
            by_time.then(a.left.cmp(&b.left))
        });

        let rows = self.load_posts(&mut *tx, nodes).await?;
        drop(tx);
        Ok(self.hydrate(rows).await)
    }

    /// Direct replies to `post`, the final one flagged as last child.
    pub async fn list_children(&self, post: PostId, thread: ThreadId) -> DomainResult<Vec<NodeView>> {
        let mut tx = self.store.begin().await?;
        let nodes = self.tree(&mut *tx).children(post, thread).await?;
        let rows = self.load_posts(&mut *tx, nodes).await?;
        drop(tx);

        let mut views = self.hydrate(rows).await;
        mark_last_child(&mut views);
        Ok(views)
    }

    /// Depth-indented outline of a whole thread in tree order.
    pub async fn thread_outline(&self, thread: ThreadId) -> DomainResult<String> {
        let mut tx = self.store.begin().await?;
        let nodes = tx.read_nodes_in_range(thread, i64::MIN, i64::MAX).await?;
        let rows = self.load_posts(&mut *tx, nodes).await?;
        drop(tx);
        Ok(render_outline(&self.hydrate(rows).await))
    }

    async fn load_posts(
        &self,
        tx: &mut dyn ForumTx,
        nodes: Vec<TreeNode>,
    ) -> DomainResult<Vec<(TreeNode, Post)>> {
        let mut rows = Vec::with_capacity(nodes.len());
        for node in nodes {
            let post = tx.read_post(node.post_id).await?;
            rows.push((node, post));
        }
        Ok(rows)
    }

    /// Resolves authors outside any transaction, one lookup per user.
    async fn hydrate(&self, rows: Vec<(TreeNode, Post)>) -> Vec<NodeView> {
        let mut profiles: HashMap<UserId, Option<UserProfile>> = HashMap::new();
        for (_, post) in &rows {
            let Some(user) = post.author.user_id else { continue };
            if profiles.contains_key(&user) {
                continue;
            }
            let profile = match self.collaborators.users.lookup_user(user).await {
                Ok(profile) => profile,
                Err(e) => {
                    warn!(%user, error = %e, "user lookup failed, using stored author name");
                    None
                }
            };
            profiles.insert(user, profile);
        }

        rows.iter()
            .map(|(node, post)| {
                let profile = post
                    .author
                    .user_id
                    .and_then(|user| profiles.get(&user))
                    .and_then(Option::as_ref);
                materialize(node, post, profile, &self.options.unknown_author_label)
            })
            .collect()
    }
}
