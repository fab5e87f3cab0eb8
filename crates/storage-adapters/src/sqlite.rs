//! # SQLite ForumStore
//!
//! Maps the relational `forums` / `threads` / `posts` / `post_tree` tables to
//! the domain models. Every `ForumTx` wraps one SQLite transaction, so a tree
//! spread and the insert that fills the gap either both land or neither does.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::errors::{DomainError, DomainResult};
use domains::models::{
    Author, CounterDelta, Forum, ForumId, LastPost, NewForum, NewPost, NewThread, NewTreeNode,
    Post, PostEdit, PostId, PostStatus, Thread, ThreadId, TreeNode, UserId,
};
use domains::ports::{AggregateStore, ForestStore, ForumStore, ForumTx};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};

const NODE_COLUMNS: &str =
    "SELECT id, thread_id, post_id, parent_post_id, lft, rgt, depth, created_at FROM post_tree";

const FORUM_COLUMNS: &str = "SELECT id, title, description, num_posts, num_threads, visits, \
     last_forum_id, last_thread_id, last_post_id, created_at FROM forums";

const THREAD_COLUMNS: &str = "SELECT id, forum_id, subject, author_user_id, author_alias, \
     import_name, created_at, is_sticky, num_posts, visits, last_forum_id, last_thread_id, \
     last_post_id FROM threads";

const POST_COLUMNS: &str = "SELECT id, thread_id, forum_id, author_user_id, author_alias, \
     import_name, subject, body, created_at, updated_at, status, censored, censorship_comment, \
     notify FROM posts";

/// SQLite result codes that mean another connection holds the write lock.
const SQLITE_BUSY: i64 = 5;
const SQLITE_LOCKED: i64 = 6;

pub struct SqliteForumStore {
    pool: SqlitePool,
}

impl SqliteForumStore {
    /// Opens (creating if needed) the database and applies migrations.
    ///
    /// In-memory URLs are pinned to a single long-lived connection, since every
    /// SQLite connection to `:memory:` sees its own private database.
    pub async fn connect(url: &str, max_connections: u32) -> DomainResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(map_sqlx)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let mut pool_options = SqlitePoolOptions::new();
        pool_options = if in_memory {
            pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options.max_connections(max_connections.max(1))
        };

        let pool = pool_options.connect_with(options).await.map_err(map_sqlx)?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| DomainError::Internal(format!("migration failed: {e}")))?;

        tracing::info!(in_memory, "sqlite forum store ready");
        Ok(Self { pool })
    }

}

#[async_trait]
impl ForumStore for SqliteForumStore {
    /// Takes the write lock up front so competing writers queue on the busy
    /// timeout instead of failing to upgrade a shared lock mid-transaction.
    async fn begin(&self) -> DomainResult<Box<dyn ForumTx>> {
        let tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(map_sqlx)?;
        Ok(Box::new(SqliteForumTx { tx }))
    }
}

pub struct SqliteForumTx {
    tx: Transaction<'static, Sqlite>,
}

/// Translates driver errors into the domain taxonomy.
fn map_sqlx(err: sqlx::Error) -> DomainError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            DomainError::AlreadyExists(db.message().to_string())
        }
        sqlx::Error::Database(db) => {
            let primary = db
                .code()
                .and_then(|c| c.parse::<i64>().ok())
                .map(|c| c & 0xff);
            match primary {
                Some(SQLITE_BUSY) | Some(SQLITE_LOCKED) => {
                    DomainError::ConcurrentModification(db.message().to_string())
                }
                _ => DomainError::Internal(err.to_string()),
            }
        }
        _ => DomainError::Internal(err.to_string()),
    }
}

fn last_post_from_row(row: &SqliteRow) -> Result<Option<LastPost>, sqlx::Error> {
    let forum: Option<i64> = row.try_get("last_forum_id")?;
    let thread: Option<i64> = row.try_get("last_thread_id")?;
    let post: Option<i64> = row.try_get("last_post_id")?;
    Ok(match (forum, thread, post) {
        (Some(f), Some(t), Some(p)) => Some(LastPost::new(ForumId(f), ThreadId(t), PostId(p))),
        _ => None,
    })
}

fn author_from_row(row: &SqliteRow) -> Result<Author, sqlx::Error> {
    Ok(Author {
        user_id: row.try_get::<Option<i64>, _>("author_user_id")?.map(UserId),
        alias: row.try_get("author_alias")?,
        import_name: row.try_get("import_name")?,
    })
}

fn node_from_row(row: &SqliteRow) -> Result<TreeNode, sqlx::Error> {
    let parent: i64 = row.try_get("parent_post_id")?;
    Ok(TreeNode {
        id: row.try_get("id")?,
        thread_id: ThreadId(row.try_get("thread_id")?),
        post_id: PostId(row.try_get("post_id")?),
        parent: (parent != 0).then_some(PostId(parent)),
        left: row.try_get("lft")?,
        right: row.try_get("rgt")?,
        depth: row.try_get("depth")?,
        created_at: row.try_get("created_at")?,
    })
}

fn forum_from_row(row: &SqliteRow) -> Result<Forum, sqlx::Error> {
    Ok(Forum {
        id: ForumId(row.try_get("id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        post_count: row.try_get("num_posts")?,
        thread_count: row.try_get("num_threads")?,
        visits: row.try_get("visits")?,
        last_post: last_post_from_row(row)?,
        created_at: row.try_get("created_at")?,
    })
}

fn thread_from_row(row: &SqliteRow) -> Result<Thread, sqlx::Error> {
    Ok(Thread {
        id: ThreadId(row.try_get("id")?),
        forum_id: ForumId(row.try_get("forum_id")?),
        subject: row.try_get("subject")?,
        author: author_from_row(row)?,
        created_at: row.try_get("created_at")?,
        is_sticky: row.try_get("is_sticky")?,
        post_count: row.try_get("num_posts")?,
        visits: row.try_get("visits")?,
        last_post: last_post_from_row(row)?,
    })
}

fn post_from_row(row: &SqliteRow) -> Result<Post, sqlx::Error> {
    Ok(Post {
        id: PostId(row.try_get("id")?),
        thread_id: ThreadId(row.try_get("thread_id")?),
        forum_id: ForumId(row.try_get("forum_id")?),
        author: author_from_row(row)?,
        subject: row.try_get("subject")?,
        body: row.try_get("body")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        status: PostStatus::from_i64(row.try_get("status")?),
        censored: row.try_get("censored")?,
        censorship_comment: row.try_get("censorship_comment")?,
        notify: row.try_get("notify")?,
    })
}

fn last_post_triple(last: Option<LastPost>) -> (Option<i64>, Option<i64>, Option<i64>) {
    match last {
        Some(l) => (Some(l.forum_id.0), Some(l.thread_id.0), Some(l.post_id.0)),
        None => (None, None, None),
    }
}

impl SqliteForumTx {
    async fn fetch_nodes(&mut self, sql: &str, binds: &[i64]) -> DomainResult<Vec<TreeNode>> {
        let mut query = sqlx::query(sql);
        for value in binds {
            query = query.bind(*value);
        }
        let rows = query.fetch_all(&mut *self.tx).await.map_err(map_sqlx)?;
        rows.iter()
            .map(node_from_row)
            .collect::<Result<_, _>>()
            .map_err(map_sqlx)
    }

    async fn latest_post(&mut self, column: &str, key: i64) -> DomainResult<Option<LastPost>> {
        let sql = format!(
            "SELECT forum_id, thread_id, id FROM posts WHERE {column} = ? \
             ORDER BY created_at DESC, id DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        row.map(|r| -> Result<LastPost, sqlx::Error> {
            Ok(LastPost::new(
                ForumId(r.try_get("forum_id")?),
                ThreadId(r.try_get("thread_id")?),
                PostId(r.try_get("id")?),
            ))
        })
        .transpose()
        .map_err(map_sqlx)
    }
}

/// Fails with `NotFound` when an UPDATE/DELETE matched no row.
fn expect_row(affected: u64, entity: &'static str, id: impl ToString) -> DomainResult<()> {
    if affected == 0 {
        Err(DomainError::not_found(entity, id))
    } else {
        Ok(())
    }
}

#[async_trait]
impl ForestStore for SqliteForumTx {
    async fn create_forest(
        &mut self,
        thread: ThreadId,
        root: PostId,
        at: DateTime<Utc>,
    ) -> DomainResult<TreeNode> {
        if self.root_of(thread).await?.is_some() {
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
        let result = sqlx::query(
            "INSERT INTO post_tree (thread_id, post_id, parent_post_id, lft, rgt, depth, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(node.thread_id.0)
        .bind(node.post_id.0)
        .bind(node.parent.map_or(0, |p| p.0))
        .bind(node.left)
        .bind(node.right)
        .bind(node.depth)
        .bind(node.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;

        Ok(TreeNode {
            id: result.last_insert_rowid(),
            thread_id: node.thread_id,
            post_id: node.post_id,
            parent: node.parent,
            left: node.left,
            right: node.right,
            depth: node.depth,
            created_at: node.created_at,
        })
    }

    async fn read_node(&mut self, post: PostId) -> DomainResult<TreeNode> {
        let sql = format!("{NODE_COLUMNS} WHERE post_id = ? LIMIT 1");
        self.fetch_nodes(&sql, &[post.0])
            .await?
            .pop()
            .ok_or_else(|| DomainError::not_found("TreeNode", post))
    }

    async fn read_node_in(
        &mut self,
        thread: ThreadId,
        post: PostId,
    ) -> DomainResult<Option<TreeNode>> {
        let sql = format!("{NODE_COLUMNS} WHERE thread_id = ? AND post_id = ?");
        Ok(self.fetch_nodes(&sql, &[thread.0, post.0]).await?.pop())
    }

    async fn find_node(
        &mut self,
        thread: ThreadId,
        post: PostId,
        parent: Option<PostId>,
    ) -> DomainResult<Option<TreeNode>> {
        let sql =
            format!("{NODE_COLUMNS} WHERE thread_id = ? AND post_id = ? AND parent_post_id = ?");
        let parent = parent.map_or(0, |p| p.0);
        Ok(self.fetch_nodes(&sql, &[thread.0, post.0, parent]).await?.pop())
    }

    async fn read_nodes_in_range(
        &mut self,
        thread: ThreadId,
        left_bound: i64,
        right_bound: i64,
    ) -> DomainResult<Vec<TreeNode>> {
        let sql = format!(
            "{NODE_COLUMNS} WHERE thread_id = ? AND lft BETWEEN ? AND ? ORDER BY lft ASC"
        );
        self.fetch_nodes(&sql, &[thread.0, left_bound, right_bound]).await
    }

    async fn read_children(
        &mut self,
        thread: ThreadId,
        parent: PostId,
    ) -> DomainResult<Vec<TreeNode>> {
        let sql =
            format!("{NODE_COLUMNS} WHERE thread_id = ? AND parent_post_id = ? ORDER BY lft DESC");
        self.fetch_nodes(&sql, &[thread.0, parent.0]).await
    }

    async fn root_of(&mut self, thread: ThreadId) -> DomainResult<Option<TreeNode>> {
        let sql = format!("{NODE_COLUMNS} WHERE thread_id = ? AND parent_post_id = 0");
        Ok(self.fetch_nodes(&sql, &[thread.0]).await?.pop())
    }

    async fn max_depth(&mut self, thread: ThreadId) -> DomainResult<Option<u32>> {
        let row = sqlx::query("SELECT MAX(depth) AS max_depth FROM post_tree WHERE thread_id = ?")
            .bind(thread.0)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        let max: Option<i64> = row.try_get("max_depth").map_err(map_sqlx)?;
        max.map(|d| {
            u32::try_from(d).map_err(|_| {
                DomainError::InvariantViolation(format!("thread {thread} stores depth {d}"))
            })
        })
        .transpose()
    }

    async fn spread_gap(
        &mut self,
        thread: ThreadId,
        after_left: i64,
        width: i64,
    ) -> DomainResult<u64> {
        let result = sqlx::query(
            "UPDATE post_tree \
             SET lft = CASE WHEN lft > ? THEN lft + ? ELSE lft END, \
                 rgt = CASE WHEN rgt > ? THEN rgt + ? ELSE rgt END \
             WHERE thread_id = ? AND rgt > ?",
        )
        .bind(after_left)
        .bind(width)
        .bind(after_left)
        .bind(width)
        .bind(thread.0)
        .bind(after_left)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }

    async fn close_gap(
        &mut self,
        thread: ThreadId,
        from_left: i64,
        width: i64,
    ) -> DomainResult<u64> {
        let result = sqlx::query(
            "UPDATE post_tree \
             SET lft = CASE WHEN lft > ? THEN lft - ? ELSE lft END, \
                 rgt = CASE WHEN rgt > ? THEN rgt - ? ELSE rgt END \
             WHERE thread_id = ? AND rgt > ?",
        )
        .bind(from_left)
        .bind(width)
        .bind(from_left)
        .bind(width)
        .bind(thread.0)
        .bind(from_left)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }

    async fn delete_range(
        &mut self,
        thread: ThreadId,
        left_bound: i64,
        right_bound: i64,
    ) -> DomainResult<u64> {
        let result =
            sqlx::query("DELETE FROM post_tree WHERE thread_id = ? AND lft BETWEEN ? AND ?")
                .bind(thread.0)
                .bind(left_bound)
                .bind(right_bound)
                .execute(&mut *self.tx)
                .await
                .map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl AggregateStore for SqliteForumTx {
    async fn insert_forum(&mut self, forum: NewForum) -> DomainResult<Forum> {
        let result =
            sqlx::query("INSERT INTO forums (title, description, created_at) VALUES (?, ?, ?)")
                .bind(&forum.title)
                .bind(&forum.description)
                .bind(forum.created_at)
                .execute(&mut *self.tx)
                .await
                .map_err(map_sqlx)?;
        Ok(Forum {
            id: ForumId(result.last_insert_rowid()),
            title: forum.title,
            description: forum.description,
            post_count: 0,
            thread_count: 0,
            visits: 0,
            last_post: None,
            created_at: forum.created_at,
        })
    }

    async fn read_forum(&mut self, id: ForumId) -> DomainResult<Forum> {
        let sql = format!("{FORUM_COLUMNS} WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.0)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?
            .ok_or_else(|| DomainError::not_found("Forum", id))?;
        forum_from_row(&row).map_err(map_sqlx)
    }

    async fn apply_forum_delta(&mut self, id: ForumId, delta: CounterDelta) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE forums SET num_posts = num_posts + ?, num_threads = num_threads + ?, \
             visits = visits + ? WHERE id = ?",
        )
        .bind(delta.posts)
        .bind(delta.threads)
        .bind(delta.visits)
        .bind(id.0)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        expect_row(result.rows_affected(), "Forum", id)
    }

    async fn set_forum_last_post(
        &mut self,
        id: ForumId,
        last: Option<LastPost>,
    ) -> DomainResult<()> {
        let (f, t, p) = last_post_triple(last);
        let result = sqlx::query(
            "UPDATE forums SET last_forum_id = ?, last_thread_id = ?, last_post_id = ? WHERE id = ?",
        )
        .bind(f)
        .bind(t)
        .bind(p)
        .bind(id.0)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        expect_row(result.rows_affected(), "Forum", id)
    }

    async fn set_forum_thread_count(&mut self, id: ForumId, count: i64) -> DomainResult<()> {
        let result = sqlx::query("UPDATE forums SET num_threads = ? WHERE id = ?")
            .bind(count)
            .bind(id.0)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        expect_row(result.rows_affected(), "Forum", id)
    }

    async fn insert_thread(&mut self, thread: NewThread) -> DomainResult<Thread> {
        let result = sqlx::query(
            "INSERT INTO threads (forum_id, subject, author_user_id, author_alias, import_name, \
             created_at, is_sticky) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(thread.forum_id.0)
        .bind(&thread.subject)
        .bind(thread.author.user_id.map(|u| u.0))
        .bind(&thread.author.alias)
        .bind(&thread.author.import_name)
        .bind(thread.created_at)
        .bind(thread.is_sticky)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(Thread {
            id: ThreadId(result.last_insert_rowid()),
            forum_id: thread.forum_id,
            subject: thread.subject,
            author: thread.author,
            created_at: thread.created_at,
            is_sticky: thread.is_sticky,
            post_count: 0,
            visits: 0,
            last_post: None,
        })
    }

    async fn read_thread(&mut self, id: ThreadId) -> DomainResult<Thread> {
        let sql = format!("{THREAD_COLUMNS} WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.0)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?
            .ok_or_else(|| DomainError::not_found("Thread", id))?;
        thread_from_row(&row).map_err(map_sqlx)
    }

    async fn delete_thread(&mut self, id: ThreadId) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM threads WHERE id = ?")
            .bind(id.0)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        expect_row(result.rows_affected(), "Thread", id)
    }

    async fn apply_thread_delta(&mut self, id: ThreadId, delta: CounterDelta) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE threads SET num_posts = num_posts + ?, visits = visits + ? WHERE id = ?",
        )
        .bind(delta.posts)
        .bind(delta.visits)
        .bind(id.0)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        expect_row(result.rows_affected(), "Thread", id)
    }

    async fn set_thread_last_post(
        &mut self,
        id: ThreadId,
        last: Option<LastPost>,
    ) -> DomainResult<()> {
        let (f, t, p) = last_post_triple(last);
        let result = sqlx::query(
            "UPDATE threads SET last_forum_id = ?, last_thread_id = ?, last_post_id = ? WHERE id = ?",
        )
        .bind(f)
        .bind(t)
        .bind(p)
        .bind(id.0)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        expect_row(result.rows_affected(), "Thread", id)
    }

    async fn relocate_thread(&mut self, id: ThreadId, forum: ForumId) -> DomainResult<u64> {
        let result = sqlx::query("UPDATE threads SET forum_id = ? WHERE id = ?")
            .bind(forum.0)
            .bind(id.0)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        expect_row(result.rows_affected(), "Thread", id)?;

        let moved = sqlx::query("UPDATE posts SET forum_id = ? WHERE thread_id = ?")
            .bind(forum.0)
            .bind(id.0)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        Ok(moved.rows_affected())
    }

    async fn update_thread_subject(&mut self, id: ThreadId, subject: &str) -> DomainResult<()> {
        let result = sqlx::query("UPDATE threads SET subject = ? WHERE id = ?")
            .bind(subject)
            .bind(id.0)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        expect_row(result.rows_affected(), "Thread", id)
    }

    async fn insert_post(&mut self, post: NewPost) -> DomainResult<Post> {
        let result = sqlx::query(
            "INSERT INTO posts (thread_id, forum_id, author_user_id, author_alias, import_name, \
             subject, body, created_at, status, notify) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(post.thread_id.0)
        .bind(post.forum_id.0)
        .bind(post.author.user_id.map(|u| u.0))
        .bind(&post.author.alias)
        .bind(&post.author.import_name)
        .bind(&post.subject)
        .bind(&post.body)
        .bind(post.created_at)
        .bind(post.status.as_i64())
        .bind(post.notify)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(Post {
            id: PostId(result.last_insert_rowid()),
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
        })
    }

    async fn read_post(&mut self, id: PostId) -> DomainResult<Post> {
        let sql = format!("{POST_COLUMNS} WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.0)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?
            .ok_or_else(|| DomainError::not_found("Post", id))?;
        post_from_row(&row).map_err(map_sqlx)
    }

    async fn delete_posts(&mut self, ids: &[PostId]) -> DomainResult<u64> {
        let mut removed = 0;
        for id in ids {
            removed += sqlx::query("DELETE FROM posts WHERE id = ?")
                .bind(id.0)
                .execute(&mut *self.tx)
                .await
                .map_err(map_sqlx)?
                .rows_affected();
        }
        Ok(removed)
    }

    async fn delete_thread_posts(&mut self, thread: ThreadId) -> DomainResult<u64> {
        let result = sqlx::query("DELETE FROM posts WHERE thread_id = ?")
            .bind(thread.0)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }

    async fn update_post(&mut self, id: PostId, edit: PostEdit) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE posts SET subject = ?, body = ?, notify = ?, updated_at = ? WHERE id = ?",
        )
        .bind(edit.subject)
        .bind(edit.body)
        .bind(edit.notify)
        .bind(edit.at)
        .bind(id.0)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        expect_row(result.rows_affected(), "Post", id)
    }

    async fn set_censorship(
        &mut self,
        id: PostId,
        censored: bool,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE posts SET censored = ?, censorship_comment = ?, updated_at = ? WHERE id = ?",
        )
        .bind(censored)
        .bind(comment)
        .bind(at)
        .bind(id.0)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        expect_row(result.rows_affected(), "Post", id)
    }

    async fn latest_post_in_thread(&mut self, thread: ThreadId) -> DomainResult<Option<LastPost>> {
        self.latest_post("thread_id", thread.0).await
    }

    async fn latest_post_in_forum(&mut self, forum: ForumId) -> DomainResult<Option<LastPost>> {
        self.latest_post("forum_id", forum.0).await
    }
}

#[async_trait]
impl ForumTx for SqliteForumTx {
    async fn commit(self: Box<Self>) -> DomainResult<()> {
        self.tx.commit().await.map_err(map_sqlx)
    }
}
