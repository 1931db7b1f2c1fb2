//! Hierarchical tracing scopes and combinable metrics for Chatweave.
//!
//! Every chat turn runs inside a [`Scope`]: a node in a tree that records the
//! arguments the turn was started with, the result it produced, and any
//! metrics (token usage first of all). When a nested scope exits, its metrics
//! are combined into its parent, so the root always holds the totals for the
//! whole conversation.

pub mod metrics;
pub mod scope;

pub use metrics::{CombinableMetric, MetricSet, TokenUsage};
pub use scope::{Scope, ScopeReport};
