//! Settings → SQLite store → service, end to end.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::{new_thread, reply, Directory, Harness};
use config::Environment;
use configs::Settings;
use domains::models::{Author, UserId};
use secrecy::ExposeSecret;
use storage_adapters::SqliteForumStore;

fn settings(vars: &[(&str, &str)]) -> anyhow::Result<Settings> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Ok(Settings::load_from(Environment::with_prefix("FORUM").source(Some(map)))?)
}

async fn harness(settings: &Settings, users: Directory) -> anyhow::Result<Harness> {
    let store = SqliteForumStore::connect(
        settings.database.url.expose_secret(),
        settings.database.max_connections,
    )
    .await?;
    Ok(Harness::new(Arc::new(store), users, settings.forum.to_options()))
}

#[tokio::test]
async fn configured_service_renders_a_thread_outline() -> anyhow::Result<()> {
    let settings = settings(&[
        ("FORUM__DATABASE__URL", "sqlite::memory:"),
        ("FORUM__FORUM__UNKNOWN_AUTHOR_LABEL", "Anonymous"),
        ("FORUM__LOG__FILTER", "services=debug"),
    ])?;
    let _ = configs::telemetry::init(&settings.log);

    let users = Directory::default().with(1, "ada", "Ada Lovelace");
    let h = harness(&settings, users).await?;

    let forum = h.service.create_forum("General", "Everything else").await?;
    let mut opening = new_thread(forum.id, "Welcome", Author::user(UserId(1)), 0);
    opening.notify = true;
    let created = h.service.create_thread(opening).await?;
    let thread = created.thread.id;

    let question = h
        .service
        .reply(reply(thread, created.opening.id, "First question", Author::alias("guest"), 1))
        .await?;
    h.service
        .reply(reply(thread, question.post.id, "Answer", Author::imported("old_admin"), 2))
        .await?;
    h.service
        .reply(reply(thread, created.opening.id, "Second question", Author::default(), 3))
        .await?;

    let outline = h.service.thread_outline(thread).await?;
    insta::assert_snapshot!(outline, @r"
    Welcome (Ada Lovelace)
      Second question (Anonymous)
      First question (guest)
        Answer (old_admin)
    ");

    let sent = h.outbox.sent.lock().unwrap().clone();
    assert_eq!(
        sent,
        vec![
            (UserId(1), "First question".to_string()),
            (UserId(1), "Second question".to_string()),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn invariant_checks_can_be_switched_off() -> anyhow::Result<()> {
    let settings = settings(&[
        ("FORUM__DATABASE__URL", "sqlite::memory:"),
        ("FORUM__FORUM__VERIFY_INVARIANTS", "false"),
        ("FORUM__FORUM__VISIT_WINDOW_SECS", "0"),
    ])?;
    assert!(!settings.forum.verify_invariants);

    let h = harness(&settings, Directory::default()).await?;
    assert!(!h.service.options().verify_invariants);

    let forum = h.service.create_forum("General", "").await?;
    let created = h
        .service
        .create_thread(new_thread(forum.id, "Root", Author::alias("a"), 0))
        .await?;
    h.service
        .reply(reply(created.thread.id, created.opening.id, "Re", Author::alias("b"), 1))
        .await?;
    assert_eq!(h.bounds(created.thread.id).await, vec![(1, 1, 4), (2, 2, 3)]);
    Ok(())
}
