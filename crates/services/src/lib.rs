//! # services
//!
//! Use-case layer of the comment service: the per-identity sliding-window
//! limiter, the reply-tree assembler and the [`CommentService`] that ties them
//! to a [`domains::CommentRepository`].

pub mod clock;
pub mod comment_tree;
pub mod comments;
pub mod rate_limit;

pub use clock::{Clock, SystemClock};
pub use comment_tree::build_comment_tree;
pub use comments::{CommentService, DEFAULT_MAX_CONTENT_CHARS};
pub use rate_limit::{RateLimitPolicy, RateLimitPolicyError, SlidingWindowLimiter, SweepReport};

#[cfg(any(test, feature = "testing"))]
pub use clock::ManualClock;
