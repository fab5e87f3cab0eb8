//! # Node Materializer
//!
//! Pure projection of tree position + post content + author into a
//! display-ready `NodeView`.

use domains::models::{Author, NodeView, Post, TreeNode, UserProfile};

pub fn materialize(
    node: &TreeNode,
    post: &Post,
    profile: Option<&UserProfile>,
    unknown_label: &str,
) -> NodeView {
    debug_assert_eq!(node.post_id, post.id, "tree node joined with the wrong post");

    NodeView {
        node_id: node.id,
        post_id: node.post_id,
        thread_id: node.thread_id,
        parent: node.parent,
        left: node.left,
        right: node.right,
        depth: node.depth,
        node_created_at: node.created_at,
        subject: post.subject.clone(),
        body: post.body.clone(),
        created_at: post.created_at,
        updated_at: post.updated_at,
        status: post.status,
        censored: post.censored,
        censorship_comment: post.censorship_comment.clone(),
        author: post.author.clone(),
        display_name: display_name(&post.author, profile, unknown_label),
        login: profile.map(|p| p.login.clone()),
        is_last_child: false,
    }
}

/// Registered full name, else the stored import name or alias, else `unknown_label`.
pub fn display_name(author: &Author, profile: Option<&UserProfile>, unknown_label: &str) -> String {
    profile
        .map(|p| p.full_name.trim())
        .filter(|name| !name.is_empty())
        .or_else(|| non_blank(author.import_name.as_deref()))
        .or_else(|| non_blank(author.alias.as_deref()))
        .unwrap_or(unknown_label)
        .to_string()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Flags the final entry of a children listing.
pub fn mark_last_child(views: &mut [NodeView]) {
    if let Some(last) = views.last_mut() {
        last.is_last_child = true;
    }
}

/// One line per node, indented two spaces per level below the root.
pub fn render_outline(views: &[NodeView]) -> String {
    views
        .iter()
        .map(|v| {
            let indent = "  ".repeat(v.depth.saturating_sub(1) as usize);
            format!("{indent}{} ({})", v.subject, v.display_name)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domains::models::{ForumId, PostId, PostStatus, ThreadId, UserId};

    fn post(author: Author) -> Post {
        Post {
            id: PostId(2),
            thread_id: ThreadId(1),
            forum_id: ForumId(1),
            author,
            subject: "Re: hello".into(),
            body: "body".into(),
            created_at: Utc::now(),
            updated_at: None,
            status: PostStatus::Active,
            censored: false,
            censorship_comment: None,
            notify: false,
        }
    }

    fn node() -> TreeNode {
        TreeNode {
            id: 7,
            thread_id: ThreadId(1),
            post_id: PostId(2),
            parent: Some(PostId(1)),
            left: 2,
            right: 3,
            depth: 2,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn registered_user_wins() {
        let profile = UserProfile {
            id: UserId(4),
            login: "ada".into(),
            full_name: "Ada Lovelace".into(),
        };
        let view = materialize(&node(), &post(Author::user(UserId(4))), Some(&profile), "Unknown");
        assert_eq!(view.display_name, "Ada Lovelace");
        assert_eq!(view.login.as_deref(), Some("ada"));
        assert_eq!((view.left, view.right, view.depth), (2, 3, 2));
        assert!(!view.is_last_child);
    }

    #[test]
    fn falls_back_to_import_name_alias_then_placeholder() {
        let imported = Author {
            user_id: Some(UserId(9)),
            alias: Some("guest".into()),
            import_name: Some("old_board_user".into()),
        };
        assert_eq!(display_name(&imported, None, "Unknown"), "old_board_user");
        assert_eq!(display_name(&Author::alias("guest"), None, "Unknown"), "guest");
        assert_eq!(display_name(&Author::default(), None, "Unknown"), "Unknown");
    }

    #[test]
    fn only_the_final_child_is_marked() {
        let mut views = vec![
            materialize(&node(), &post(Author::default()), None, "?"),
            materialize(&node(), &post(Author::default()), None, "?"),
        ];
        mark_last_child(&mut views);
        assert_eq!(
            views.iter().map(|v| v.is_last_child).collect::<Vec<_>>(),
            vec![false, true]
        );
        mark_last_child(&mut []);
    }
}
