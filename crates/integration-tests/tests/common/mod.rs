//! Shared fixtures: in-process collaborators and store/service builders.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use domains::errors::DomainResult;
use domains::models::{
    Author, ForumId, PostId, PostStatus, ThreadId, TreeNode, UserId, UserProfile,
};
use domains::ports::{
    AccessControl, AttachmentStore, ForumStore, NotificationDispatcher, UserDirectory,
};
use services::{Collaborators, ForumOptions, ForumService, NewThreadRequest, ReplyRequest};
use storage_adapters::{InMemoryForumStore, SqliteForumStore};

#[derive(Default)]
pub struct Directory(pub HashMap<UserId, UserProfile>);

impl Directory {
    pub fn with(mut self, id: i64, login: &str, full_name: &str) -> Self {
        self.0.insert(
            UserId(id),
            UserProfile {
                id: UserId(id),
                login: login.into(),
                full_name: full_name.into(),
            },
        );
        self
    }
}

#[async_trait]
impl UserDirectory for Directory {
    async fn lookup_user(&self, id: UserId) -> DomainResult<Option<UserProfile>> {
        Ok(self.0.get(&id).cloned())
    }
}

#[derive(Default)]
pub struct Attachments {
    pub cleaned: Mutex<Vec<PostId>>,
}

#[async_trait]
impl AttachmentStore for Attachments {
    async fn delete_attachments_for_post(&self, post: PostId) -> DomainResult<()> {
        self.cleaned.lock().unwrap().push(post);
        Ok(())
    }
}

#[derive(Default)]
pub struct Outbox {
    pub sent: Mutex<Vec<(UserId, String)>>,
}

#[async_trait]
impl NotificationDispatcher for Outbox {
    async fn notify(&self, recipient: UserId, subject: &str, _body: &str) -> DomainResult<()> {
        self.sent.lock().unwrap().push((recipient, subject.to_string()));
        Ok(())
    }
}

pub struct OpenAccess;

#[async_trait]
impl AccessControl for OpenAccess {
    async fn can_read(&self, _user: UserId, _forum: ForumId) -> DomainResult<bool> {
        Ok(true)
    }
}

pub struct Harness {
    pub store: Arc<dyn ForumStore>,
    pub service: ForumService,
    pub attachments: Arc<Attachments>,
    pub outbox: Arc<Outbox>,
}

impl Harness {
    pub fn new(store: Arc<dyn ForumStore>, users: Directory, options: ForumOptions) -> Self {
        let attachments = Arc::new(Attachments::default());
        let outbox = Arc::new(Outbox::default());
        let collaborators = Collaborators {
            users: Arc::new(users),
            attachments: attachments.clone(),
            notifier: outbox.clone(),
            access: Arc::new(OpenAccess),
        };
        let service = ForumService::new(store.clone(), collaborators, options);
        Self {
            store,
            service,
            attachments,
            outbox,
        }
    }

    pub fn memory() -> Self {
        Self::new(
            Arc::new(InMemoryForumStore::new()),
            Directory::default(),
            ForumOptions::default(),
        )
    }

    pub async fn sqlite() -> Self {
        let store = SqliteForumStore::connect("sqlite::memory:", 1)
            .await
            .expect("in-memory sqlite");
        Self::new(Arc::new(store), Directory::default(), ForumOptions::default())
    }

    /// Every row of the thread's forest, ascending by `left`.
    pub async fn forest(&self, thread: ThreadId) -> Vec<TreeNode> {
        let mut tx = self.store.begin().await.unwrap();
        tx.read_nodes_in_range(thread, i64::MIN, i64::MAX).await.unwrap()
    }

    /// `(post, left, right)` of every row, ascending by `left`.
    pub async fn bounds(&self, thread: ThreadId) -> Vec<(i64, i64, i64)> {
        self.forest(thread)
            .await
            .iter()
            .map(|n| (n.post_id.0, n.left, n.right))
            .collect()
    }
}

pub fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + chrono::TimeDelta::minutes(minute as i64)
}

pub fn new_thread(forum: ForumId, subject: &str, author: Author, minute: u32) -> NewThreadRequest {
    NewThreadRequest {
        forum_id: forum,
        subject: subject.into(),
        body: format!("{subject} body"),
        author,
        notify: false,
        is_sticky: false,
        status: PostStatus::Active,
        at: at(minute),
    }
}

pub fn reply(thread: ThreadId, parent: PostId, subject: &str, author: Author, minute: u32) -> ReplyRequest {
    ReplyRequest {
        thread_id: thread,
        parent,
        subject: subject.into(),
        body: format!("{subject} body"),
        author,
        notify: false,
        status: PostStatus::Active,
        at: at(minute),
    }
}
