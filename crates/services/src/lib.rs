//! # services
//!
//! The forum core: the nested-set post-tree engine, the aggregate counter
//! maintainer, the node materializer and the `ForumService` that runs them
//! together inside one store transaction per mutation.

pub mod counters;
pub mod forum;
pub mod materialize;
pub mod retry;
pub mod tree;

pub use counters::{Counters, MovedTotals};
pub use forum::{
    Collaborators, CreatedReply, CreatedThread, DeletionOutcome, ForumOptions, ForumService,
    MoveSummary, NewThreadRequest, ReplyRequest,
};
pub use materialize::{display_name, mark_last_child, materialize, render_outline};
pub use retry::RetryPolicy;
pub use tree::PostTree;
