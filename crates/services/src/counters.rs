//! # Aggregate Counter Maintainer
//!
//! Keeps the denormalized post/thread/visit counters and last-post pointers
//! of threads and forums in step with tree mutations. Counts are maintained
//! incrementally; only last-post pointers are recomputed from the post rows.

use chrono::{DateTime, TimeDelta, Utc};
use domains::errors::DomainResult;
use domains::models::{CounterDelta, DeletedSubtree, ForumId, LastPost, Post, VisitTarget};
use domains::ports::AggregateStore;
use tracing::{debug, warn};

/// Totals carried from one forum to another by a thread move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MovedTotals {
    pub posts: i64,
    pub threads: i64,
    pub visits: i64,
}

impl From<MovedTotals> for CounterDelta {
    fn from(totals: MovedTotals) -> Self {
        Self {
            posts: totals.posts,
            threads: totals.threads,
            visits: totals.visits,
        }
    }
}

pub struct Counters<'t, S: ?Sized> {
    store: &'t mut S,
}

impl<'t, S> Counters<'t, S>
where
    S: AggregateStore + ?Sized,
{
    pub fn new(store: &'t mut S) -> Self {
        Self { store }
    }

    /// A reply was added: bump thread and forum, point both at the new post.
    pub async fn post_inserted(&mut self, post: &Post) -> DomainResult<()> {
        let last = LastPost::new(post.forum_id, post.thread_id, post.id);
        self.store
            .apply_thread_delta(post.thread_id, CounterDelta::posts(1))
            .await?;
        self.store
            .set_thread_last_post(post.thread_id, Some(last))
            .await?;
        self.store
            .apply_forum_delta(post.forum_id, CounterDelta::posts(1))
            .await?;
        self.store.set_forum_last_post(post.forum_id, Some(last)).await
    }

    /// A thread was opened with `opening` as its first post.
    pub async fn thread_inserted(&mut self, opening: &Post) -> DomainResult<()> {
        self.store
            .apply_forum_delta(
                opening.forum_id,
                CounterDelta {
                    threads: 1,
                    ..CounterDelta::default()
                },
            )
            .await?;
        self.post_inserted(opening).await
    }

    /// A subtree is gone. Must run after the doomed post rows were removed,
    /// since the last-post pointers are looked up from what remains.
    pub async fn subtree_deleted(
        &mut self,
        forum: ForumId,
        deleted: &DeletedSubtree,
    ) -> DomainResult<()> {
        let dead = deleted.doomed.len() as i64;

        if deleted.was_root {
            self.store
                .apply_forum_delta(
                    forum,
                    CounterDelta {
                        posts: -dead,
                        threads: -1,
                        visits: 0,
                    },
                )
                .await?;
        } else {
            let thread = deleted.thread_id;
            self.store
                .apply_thread_delta(thread, CounterDelta::posts(-dead))
                .await?;
            let last = self.store.latest_post_in_thread(thread).await?;
            self.store.set_thread_last_post(thread, last).await?;
            self.store
                .apply_forum_delta(forum, CounterDelta::posts(-dead))
                .await?;
        }

        let last = self.store.latest_post_in_forum(forum).await?;
        self.store.set_forum_last_post(forum, last).await
    }

    /// Threads were re-homed from `source` to `dest`.
    pub async fn threads_moved(
        &mut self,
        source: ForumId,
        dest: ForumId,
        totals: MovedTotals,
    ) -> DomainResult<()> {
        let delta = CounterDelta::from(totals);

        self.store.apply_forum_delta(source, delta.negate()).await?;
        let last = self.store.latest_post_in_forum(source).await?;
        self.store.set_forum_last_post(source, last).await?;

        self.store.apply_forum_delta(dest, delta).await?;
        let last = self.store.latest_post_in_forum(dest).await?;
        self.store.set_forum_last_post(dest, last).await
    }

    /// Forces the stored thread count to `observed`. Returns whether it had drifted.
    pub async fn recount_threads(&mut self, forum: ForumId, observed: i64) -> DomainResult<bool> {
        let stored = self.store.read_forum(forum).await?.thread_count;
        let drifted = stored != observed;
        if drifted {
            warn!(%forum, stored, observed, "forum thread count drifted, repairing");
        }
        self.store.set_forum_thread_count(forum, observed).await?;
        Ok(drifted)
    }

    /// Counts a visit unless the same visitor was here within `window`.
    pub async fn visit(
        &mut self,
        target: VisitTarget,
        last_visit: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        window: TimeDelta,
    ) -> DomainResult<bool> {
        if !visit_counts(last_visit, now, window) {
            debug!(?target, "visit throttled");
            return Ok(false);
        }
        let bump = CounterDelta {
            visits: 1,
            ..CounterDelta::default()
        };
        match target {
            VisitTarget::Forum(id) => self.store.apply_forum_delta(id, bump).await?,
            VisitTarget::Thread(id) => self.store.apply_thread_delta(id, bump).await?,
        }
        Ok(true)
    }
}

/// A visit counts when there was none before or the previous one is older than `window`.
pub fn visit_counts(last_visit: Option<DateTime<Utc>>, now: DateTime<Utc>, window: TimeDelta) -> bool {
    match last_visit {
        None => true,
        Some(previous) => previous < now - window,
    }
}
