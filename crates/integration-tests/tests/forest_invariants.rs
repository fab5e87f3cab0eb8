//! Random insert/delete sequences never break the nested-set layout.

mod common;

use std::collections::BTreeMap;

use common::{new_thread, reply, Harness};
use domains::models::{Author, PostId, ThreadId};
use domains::nested_set::check_forest;
use fake::faker::lorem::en::Sentence;
use fake::faker::name::en::Name;
use fake::Fake;

fn pick<T: Copy>(items: &[T]) -> T {
    items[(0..items.len()).fake::<usize>()]
}

async fn random_walk(h: Harness, steps: u32) -> anyhow::Result<()> {
    let forum = h.service.create_forum("Stress", "").await?;
    let mut live: BTreeMap<ThreadId, Vec<PostId>> = BTreeMap::new();

    for step in 0..steps {
        let subject: String = Sentence(1..4).fake();
        let author = Author::alias(Name().fake::<String>());
        let roll: u8 = (0..10).fake();

        if live.is_empty() || roll == 0 {
            let created = h
                .service
                .create_thread(new_thread(forum.id, &subject, author, step))
                .await?;
            live.insert(created.thread.id, vec![created.opening.id]);
        } else if roll < 8 {
            let thread = pick(&live.keys().copied().collect::<Vec<_>>());
            let parent = pick(&live[&thread]);
            let created = h
                .service
                .reply(reply(thread, parent, &subject, author, step))
                .await?;
            live.entry(thread).or_default().push(created.post.id);
        } else {
            let thread = pick(&live.keys().copied().collect::<Vec<_>>());
            let victim = pick(&live[&thread]);
            let outcome = h.service.delete_post(victim).await?;
            if outcome.deleted_thread.is_some() {
                live.remove(&thread);
            } else if let Some(posts) = live.get_mut(&thread) {
                posts.retain(|p| !outcome.doomed.contains(p));
            }
        }

        for (thread, posts) in &live {
            let forest = h.forest(*thread).await;
            check_forest(&forest)
                .map_err(|e| anyhow::anyhow!("step {step}, thread {thread}: {e}"))?;
            assert_eq!(forest.len(), posts.len(), "step {step}, thread {thread}");
            assert_eq!(h.service.thread(*thread).await?.post_count, posts.len() as i64);
        }
    }

    let total: usize = live.values().map(Vec::len).sum();
    let f = h.service.forum(forum.id).await?;
    assert_eq!(f.post_count, total as i64);
    assert_eq!(f.thread_count, live.len() as i64);
    Ok(())
}

#[tokio::test]
async fn random_walk_on_memory_store() -> anyhow::Result<()> {
    random_walk(Harness::memory(), 300).await
}

#[tokio::test]
async fn random_walk_on_sqlite_store() -> anyhow::Result<()> {
    random_walk(Harness::sqlite().await, 120).await
}
