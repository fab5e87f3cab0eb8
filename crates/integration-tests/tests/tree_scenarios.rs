//! Tree shape after inserts and deletes, on both store backends.

mod common;

use common::{new_thread, reply, Harness};
use domains::errors::DomainError;
use domains::models::{Author, PostId, SubtreeOrder, ThreadId};

async fn reply_and_delete_follow_gap_math(h: Harness) -> anyhow::Result<()> {
    let forum = h.service.create_forum("General", "").await?;
    let created = h
        .service
        .create_thread(new_thread(forum.id, "Root", Author::alias("a"), 0))
        .await?;
    let thread = created.thread.id;
    assert_eq!(created.opening.id, PostId(1));
    assert_eq!(h.bounds(thread).await, vec![(1, 1, 2)]);

    let two = h
        .service
        .reply(reply(thread, PostId(1), "Two", Author::alias("b"), 1))
        .await?;
    assert_eq!((two.node.left, two.node.right), (2, 3));
    assert_eq!(h.bounds(thread).await, vec![(1, 1, 4), (2, 2, 3)]);

    let three = h
        .service
        .reply(reply(thread, PostId(1), "Three", Author::alias("c"), 2))
        .await?;
    assert_eq!((three.node.left, three.node.right), (2, 3));
    assert_eq!(h.bounds(thread).await, vec![(1, 1, 6), (3, 2, 3), (2, 4, 5)]);

    let outcome = h.service.delete_post(two.post.id).await?;
    assert_eq!(outcome.doomed, vec![PostId(2)]);
    assert_eq!(outcome.deleted_thread, None);
    assert_eq!(h.bounds(thread).await, vec![(1, 1, 4), (3, 2, 3)]);
    assert_eq!(*h.attachments.cleaned.lock().unwrap(), vec![PostId(2)]);
    Ok(())
}

#[tokio::test]
async fn gap_math_on_memory_store() -> anyhow::Result<()> {
    reply_and_delete_follow_gap_math(Harness::memory()).await
}

#[tokio::test]
async fn gap_math_on_sqlite_store() -> anyhow::Result<()> {
    reply_and_delete_follow_gap_math(Harness::sqlite().await).await
}

async fn root_delete_takes_every_reply(h: Harness) -> anyhow::Result<()> {
    const REPLIES: u32 = 6;
    let forum = h.service.create_forum("General", "").await?;
    let created = h
        .service
        .create_thread(new_thread(forum.id, "Root", Author::alias("a"), 0))
        .await?;
    let thread = created.thread.id;

    let mut parent = created.opening.id;
    for minute in 1..=REPLIES {
        // Alternate between replying to the root and nesting below the last reply.
        let target = if minute % 2 == 0 { parent } else { created.opening.id };
        let r = h
            .service
            .reply(reply(thread, target, "Re", Author::alias("b"), minute))
            .await?;
        parent = r.post.id;
    }
    assert_eq!(h.forest(thread).await.len(), REPLIES as usize + 1);

    let outcome = h.service.delete_post(created.opening.id).await?;
    assert_eq!(outcome.doomed.len(), REPLIES as usize + 1);
    assert_eq!(outcome.doomed[0], created.opening.id);
    assert_eq!(outcome.deleted_thread, Some(thread));

    assert!(h.forest(thread).await.is_empty());
    assert_eq!(h.service.max_depth(thread).await?, None);
    assert!(matches!(
        h.service.thread(thread).await,
        Err(DomainError::NotFound("Thread", _))
    ));
    Ok(())
}

#[tokio::test]
async fn root_delete_on_memory_store() -> anyhow::Result<()> {
    root_delete_takes_every_reply(Harness::memory()).await
}

#[tokio::test]
async fn root_delete_on_sqlite_store() -> anyhow::Result<()> {
    root_delete_takes_every_reply(Harness::sqlite().await).await
}

#[tokio::test]
async fn forests_do_not_shift_each_other() -> anyhow::Result<()> {
    let h = Harness::sqlite().await;
    let forum = h.service.create_forum("General", "").await?;
    let a = h
        .service
        .create_thread(new_thread(forum.id, "A", Author::alias("a"), 0))
        .await?;
    let b = h
        .service
        .create_thread(new_thread(forum.id, "B", Author::alias("b"), 1))
        .await?;

    for minute in 2..5 {
        h.service
            .reply(reply(a.thread.id, a.opening.id, "Re A", Author::alias("c"), minute))
            .await?;
    }

    assert_eq!(h.bounds(b.thread.id).await, vec![(b.opening.id.0, 1, 2)]);
    assert_eq!(h.forest(a.thread.id).await[0].right, 8);
    Ok(())
}

#[tokio::test]
async fn depth_counts_from_one() -> anyhow::Result<()> {
    let h = Harness::memory();
    let forum = h.service.create_forum("General", "").await?;
    let created = h
        .service
        .create_thread(new_thread(forum.id, "Root", Author::alias("a"), 0))
        .await?;
    let thread = created.thread.id;

    let mut parent = created.opening.id;
    for minute in 1..=3 {
        parent = h
            .service
            .reply(reply(thread, parent, "Deeper", Author::alias("b"), minute))
            .await?
            .post
            .id;
    }

    assert_eq!(h.service.depth(created.opening.id, Some(thread)).await?, 1);
    assert_eq!(h.service.depth(parent, Some(thread)).await?, 4);
    assert_eq!(h.service.depth(parent, None).await?, 0);
    assert_eq!(h.service.max_depth(thread).await?, Some(4));
    assert_eq!(h.service.max_depth(ThreadId(404)).await?, None);
    Ok(())
}

#[tokio::test]
async fn children_listing_flags_only_the_last_entry() -> anyhow::Result<()> {
    let h = Harness::sqlite().await;
    let forum = h.service.create_forum("General", "").await?;
    let created = h
        .service
        .create_thread(new_thread(forum.id, "Root", Author::alias("a"), 0))
        .await?;
    let thread = created.thread.id;
    for minute in 1..=3 {
        h.service
            .reply(reply(thread, created.opening.id, "Re", Author::alias("b"), minute))
            .await?;
    }

    let children = h.service.list_children(created.opening.id, thread).await?;
    let ids: Vec<i64> = children.iter().map(|c| c.post_id.0).collect();
    assert_eq!(ids, vec![2, 3, 4]);
    let flags: Vec<bool> = children.iter().map(|c| c.is_last_child).collect();
    assert_eq!(flags, vec![false, false, true]);

    let newest_first = h
        .service
        .list_subtree(created.opening.id, SubtreeOrder::CreatedDesc)
        .await?;
    assert_eq!(newest_first.first().map(|v| v.post_id), Some(PostId(4)));
    Ok(())
}
