//! Many writers on one file-backed SQLite database, all aiming at the same
//! thread's forest.

mod common;

use std::sync::Arc;

use common::{new_thread, reply, Directory, Harness};
use domains::models::Author;
use domains::nested_set::check_forest;
use services::ForumOptions;
use storage_adapters::SqliteForumStore;
use tempfile::TempDir;
use tokio::task::JoinSet;

async fn file_harness(dir: &TempDir) -> anyhow::Result<Arc<Harness>> {
    let url = format!("sqlite://{}", dir.path().join("forum.db").display());
    let store = SqliteForumStore::connect(&url, 8).await?;
    Ok(Arc::new(Harness::new(
        Arc::new(store),
        Directory::default(),
        ForumOptions::default(),
    )))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_replies_under_one_root_all_land() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let h = file_harness(&dir).await?;
    let forum = h.service.create_forum("Busy", "").await?;
    let created = h
        .service
        .create_thread(new_thread(forum.id, "Root", Author::alias("op"), 0))
        .await?;
    let (thread, root) = (created.thread.id, created.opening.id);

    let mut writers = JoinSet::new();
    for n in 0..32u32 {
        let h = Arc::clone(&h);
        writers.spawn(async move {
            let subject = format!("Reply {n}");
            h.service
                .reply(reply(thread, root, &subject, Author::alias(format!("w{n}")), n + 1))
                .await
        });
    }
    let mut stored = 0;
    while let Some(joined) = writers.join_next().await {
        joined??;
        stored += 1;
    }
    assert_eq!(stored, 32);

    let forest = h.forest(thread).await;
    check_forest(&forest)?;
    assert_eq!(forest.len(), 33);
    assert_eq!(h.service.thread(thread).await?.post_count, 33);
    assert_eq!(h.service.forum(forum.id).await?.post_count, 33);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deletes_and_replies_keep_the_forest_whole() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let h = file_harness(&dir).await?;
    let forum = h.service.create_forum("Busy", "").await?;
    let created = h
        .service
        .create_thread(new_thread(forum.id, "Root", Author::alias("op"), 0))
        .await?;
    let (thread, root) = (created.thread.id, created.opening.id);

    let mut doomed = Vec::new();
    for n in 0..8u32 {
        let branch = h
            .service
            .reply(reply(thread, root, "Branch", Author::alias("b"), n + 1))
            .await?;
        h.service
            .reply(reply(thread, branch.post.id, "Leaf", Author::alias("l"), n + 1))
            .await?;
        doomed.push(branch.post.id);
    }

    let mut writers = JoinSet::new();
    for (n, branch) in doomed.into_iter().enumerate() {
        let hd = Arc::clone(&h);
        writers.spawn(async move { hd.service.delete_post(branch).await.map(|_| ()) });
        let hr = Arc::clone(&h);
        writers.spawn(async move {
            hr.service
                .reply(reply(thread, root, "Late", Author::alias("z"), 20 + n as u32))
                .await
                .map(|_| ())
        });
    }
    while let Some(joined) = writers.join_next().await {
        joined??;
    }

    let forest = h.forest(thread).await;
    check_forest(&forest)?;
    assert_eq!(forest.len(), 9);
    assert_eq!(h.service.thread(thread).await?.post_count, 9);
    assert_eq!(h.service.forum(forum.id).await?.post_count, 9);
    Ok(())
}
