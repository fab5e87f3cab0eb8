//! # Domain Models
//!
//! These structs represent the core entities of the forum: forums, threads,
//! posts and the nested-set tree rows that order a thread's replies.
//! Identifiers are plain integers so they line up with the legacy
//! `frm_*` tables this layout was derived from.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }
    };
}

id_type!(
    /// Primary key of a forum (the aggregate root holding threads).
    ForumId
);
id_type!(
    /// Primary key of a thread; also the id of its reply forest.
    ThreadId
);
id_type!(PostId);
id_type!(UserId);

/// Pointer to the most recent post of a thread or forum.
///
/// Persisted as three foreign keys. The legacy `forum#thread#post` string form
/// is still available through `Display` / `FromStr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastPost {
    pub forum_id: ForumId,
    pub thread_id: ThreadId,
    pub post_id: PostId,
}

impl LastPost {
    pub fn new(forum_id: ForumId, thread_id: ThreadId, post_id: PostId) -> Self {
        Self { forum_id, thread_id, post_id }
    }

    /// Parses the legacy pointer. The empty string is the legacy "no last post"
    /// sentinel and maps to `None`.
    pub fn parse_legacy(raw: &str) -> Result<Option<Self>, DomainError> {
        if raw.trim().is_empty() {
            return Ok(None);
        }
        raw.parse().map(Some)
    }

    /// Re-targets the pointer to another forum, used when threads are moved.
    pub fn in_forum(self, forum_id: ForumId) -> Self {
        Self { forum_id, ..self }
    }
}

impl fmt::Display for LastPost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}#{}", self.forum_id, self.thread_id, self.post_id)
    }
}

impl FromStr for LastPost {
    type Err = DomainError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = raw.trim().split('#').collect();
        let [forum, thread, post] = parts.as_slice() else {
            return Err(DomainError::Validation(format!(
                "last post pointer must have three parts: {raw:?}"
            )));
        };
        let parse = |part: &str| {
            part.parse::<i64>().map_err(|_| {
                DomainError::Validation(format!("non-numeric last post component {part:?}"))
            })
        };
        Ok(Self {
            forum_id: ForumId(parse(forum)?),
            thread_id: ThreadId(parse(thread)?),
            post_id: PostId(parse(post)?),
        })
    }
}

/// A forum with its denormalized aggregate counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forum {
    pub id: ForumId,
    pub title: String,
    pub description: String,
    pub post_count: i64,
    pub thread_count: i64,
    pub visits: i64,
    pub last_post: Option<LastPost>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewForum {
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Who wrote a post or opened a thread.
///
/// Registered users carry a `user_id`; anonymous and imported posts only have
/// the free-text fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub user_id: Option<UserId>,
    pub alias: Option<String>,
    pub import_name: Option<String>,
}

impl Author {
    pub fn user(id: UserId) -> Self {
        Self { user_id: Some(id), ..Self::default() }
    }

    pub fn alias(alias: impl Into<String>) -> Self {
        Self { alias: Some(alias.into()), ..Self::default() }
    }

    pub fn imported(name: impl Into<String>) -> Self {
        Self { import_name: Some(name.into()), ..Self::default() }
    }
}

/// A discussion thread. Its id doubles as the id of the reply forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub forum_id: ForumId,
    pub subject: String,
    pub author: Author,
    pub created_at: DateTime<Utc>,
    pub is_sticky: bool,
    pub post_count: i64,
    pub visits: i64,
    pub last_post: Option<LastPost>,
}

#[derive(Debug, Clone)]
pub struct NewThread {
    pub forum_id: ForumId,
    pub subject: String,
    pub author: Author,
    pub created_at: DateTime<Utc>,
    pub is_sticky: bool,
}

/// Moderation state of a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    /// Waiting for a moderator to activate it.
    Pending,
    #[default]
    Active,
}

impl PostStatus {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Pending => 0,
            Self::Active => 1,
        }
    }

    pub fn from_i64(raw: i64) -> Self {
        if raw == 0 {
            Self::Pending
        } else {
            Self::Active
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub thread_id: ThreadId,
    pub forum_id: ForumId,
    pub author: Author,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub status: PostStatus,
    pub censored: bool,
    pub censorship_comment: Option<String>,
    /// The author wants to hear about direct replies.
    pub notify: bool,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub thread_id: ThreadId,
    pub forum_id: ForumId,
    pub author: Author,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub status: PostStatus,
    pub notify: bool,
}

/// New editable content of an existing post; `at` becomes its `updated_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct PostEdit {
    pub subject: String,
    pub body: String,
    pub notify: bool,
    pub at: DateTime<Utc>,
}

/// One nested-set row: the position of a post inside its thread's forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: i64,
    pub thread_id: ThreadId,
    pub post_id: PostId,
    /// `None` for the forest root (persisted as `0`).
    pub parent: Option<PostId>,
    pub left: i64,
    pub right: i64,
    /// Root depth is 1, its direct replies are at depth 2.
    pub depth: u32,
    pub created_at: DateTime<Utc>,
}

impl TreeNode {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Number of slots this node's subtree occupies: `right - left + 1`.
    pub fn width(&self) -> i64 {
        self.right - self.left + 1
    }

    /// Number of nodes in the subtree, this node included.
    pub fn subtree_size(&self) -> i64 {
        self.width() / 2
    }
}

/// Values for a tree row that has not been persisted yet.
#[derive(Debug, Clone)]
pub struct NewTreeNode {
    pub thread_id: ThreadId,
    pub post_id: PostId,
    pub parent: Option<PostId>,
    pub left: i64,
    pub right: i64,
    pub depth: u32,
    pub created_at: DateTime<Utc>,
}

/// Result of removing a node together with everything below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedSubtree {
    pub thread_id: ThreadId,
    /// Post ids that were in the removed range, ascending by `left`.
    pub doomed: Vec<PostId>,
    /// The removed node was the forest root, i.e. the whole thread is gone.
    pub was_root: bool,
}

/// Ordering for subtree listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubtreeOrder {
    /// Chronological, used by the flat threaded view.
    CreatedAsc,
    /// Newest replies first, the display default.
    #[default]
    CreatedDesc,
}

/// Increment (or decrement, when negative) applied to aggregate counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterDelta {
    pub posts: i64,
    pub threads: i64,
    pub visits: i64,
}

impl CounterDelta {
    pub fn posts(posts: i64) -> Self {
        Self { posts, ..Self::default() }
    }

    pub fn negate(self) -> Self {
        Self { posts: -self.posts, threads: -self.threads, visits: -self.visits }
    }
}

/// Registered account data from the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub login: String,
    pub full_name: String,
}

/// Display-ready node: tree position joined with post content and author.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeView {
    pub node_id: i64,
    pub post_id: PostId,
    pub thread_id: ThreadId,
    pub parent: Option<PostId>,
    pub left: i64,
    pub right: i64,
    pub depth: u32,
    pub node_created_at: DateTime<Utc>,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub status: PostStatus,
    pub censored: bool,
    pub censorship_comment: Option<String>,
    pub author: Author,
    pub display_name: String,
    pub login: Option<String>,
    /// Set on the final entry of a children listing; layout code draws
    /// the closing branch from it.
    pub is_last_child: bool,
}

/// Target of a visit counter bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisitTarget {
    Forum(ForumId),
    Thread(ThreadId),
}
