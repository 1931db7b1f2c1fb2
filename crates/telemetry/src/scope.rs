//! The scope tree.
//!
//! A [`Scope`] is an RAII handle to one node. Creating a nested scope adds a
//! child node; dropping (or [`Scope::exit`]-ing) it stamps the end time and
//! folds the child's combined metrics into the parent. Handles are not
//! `Clone`, so every node is closed exactly once.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::metrics::{CombinableMetric, MetricSet};

#[derive(Debug)]
struct ScopeNode {
    id: String,
    label: String,
    parent: Option<usize>,
    children: Vec<usize>,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    arguments: Option<serde_json::Value>,
    result: Option<serde_json::Value>,
    /// Metrics recorded directly in this scope.
    metrics: MetricSet,
    /// Combined metrics of children that already exited.
    nested: MetricSet,
}

impl ScopeNode {
    fn new(label: String, parent: Option<usize>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            label,
            parent,
            children: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
            arguments: None,
            result: None,
            metrics: MetricSet::new(),
            nested: MetricSet::new(),
        }
    }

    fn combined(&self) -> MetricSet {
        let mut combined = self.metrics.clone();
        combined.merge(&self.nested);
        combined
    }
}

#[derive(Debug, Default)]
struct ScopeTree {
    nodes: Vec<ScopeNode>,
}

impl ScopeTree {
    fn report(&self, index: usize) -> ScopeReport {
        let node = &self.nodes[index];
        ScopeReport {
            id: node.id.clone(),
            label: node.label.clone(),
            started_at: node.started_at,
            duration_ms: node.ended_at.map(|end| {
                end.signed_duration_since(node.started_at)
                    .num_milliseconds()
                    .max(0) as u64
            }),
            arguments: node.arguments.clone(),
            result: node.result.clone(),
            metrics: node.combined().summaries(),
            children: node
                .children
                .iter()
                .map(|&child| self.report(child))
                .collect(),
        }
    }
}

/// Handle to an open scope.
#[derive(Debug)]
pub struct Scope {
    tree: Arc<Mutex<ScopeTree>>,
    node: usize,
}

impl Scope {
    /// Start a fresh scope tree.
    pub fn root(label: impl Into<String>) -> Self {
        let tree = ScopeTree {
            nodes: vec![ScopeNode::new(label.into(), None)],
        };
        Self {
            tree: Arc::new(Mutex::new(tree)),
            node: 0,
        }
    }

    /// Open a child scope. It stays open until the returned handle drops.
    pub fn nested(&self, label: impl Into<String>) -> Scope {
        let label = label.into();
        let mut tree = self.lock();
        let index = tree.nodes.len();
        tree.nodes.push(ScopeNode::new(label.clone(), Some(self.node)));
        tree.nodes[self.node].children.push(index);
        drop(tree);

        debug!(scope = %label, "Entered scope");
        Scope {
            tree: Arc::clone(&self.tree),
            node: index,
        }
    }

    pub fn label(&self) -> String {
        self.lock().nodes[self.node].label.clone()
    }

    /// Record a metric in this scope.
    pub fn record<M: CombinableMetric>(&self, metric: M) {
        self.lock().nodes[self.node].metrics.record(metric);
    }

    /// Attach the arguments this scope was started with.
    pub fn record_arguments(&self, arguments: serde_json::Value) {
        self.lock().nodes[self.node].arguments = Some(arguments);
    }

    /// Attach the result this scope produced.
    pub fn record_result(&self, result: serde_json::Value) {
        self.lock().nodes[self.node].result = Some(result);
    }

    /// This scope's metric of type `M`, including exited children.
    pub fn metric<M: CombinableMetric>(&self) -> Option<M> {
        self.metrics().get::<M>().cloned()
    }

    /// Own metrics combined with those of every exited child.
    pub fn metrics(&self) -> MetricSet {
        self.lock().nodes[self.node].combined()
    }

    /// Snapshot of this scope and everything below it.
    pub fn report(&self) -> ScopeReport {
        self.lock().report(self.node)
    }

    /// Close the scope now instead of at end of lexical lifetime.
    pub fn exit(self) {}

    fn lock(&self) -> MutexGuard<'_, ScopeTree> {
        // a panic while holding the lock leaves the tree itself consistent
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close(&self) {
        let mut tree = self.lock();
        let node = &mut tree.nodes[self.node];
        if node.ended_at.is_some() {
            return;
        }
        let ended_at = Utc::now();
        node.ended_at = Some(ended_at);
        let duration_ms = ended_at
            .signed_duration_since(node.started_at)
            .num_milliseconds()
            .max(0);
        let label = node.label.clone();
        let parent = node.parent;
        let combined = node.combined();

        if let Some(parent) = parent {
            let parent = &mut tree.nodes[parent];
            if parent.ended_at.is_some() {
                warn!(scope = %label, parent = %parent.label, "Scope exited after its parent");
            }
            parent.nested.merge(&combined);
        }

        debug!(scope = %label, duration_ms, "Exited scope");
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.close();
    }
}

/// Serializable snapshot of a scope subtree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeReport {
    pub id: String,
    pub label: String,
    pub started_at: DateTime<Utc>,
    /// None while the scope is still open.
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Summaries of the combined metrics.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ScopeReport>,
}

impl ScopeReport {
    /// Render as an indented tree, one scope per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        out.push_str(&"  ".repeat(depth));
        out.push_str(&self.label);
        if let Some(ms) = self.duration_ms {
            out.push_str(&format!(" ({ms} ms)"));
        }
        for metric in &self.metrics {
            out.push_str(" | ");
            out.push_str(metric);
        }
        out.push('\n');
        for child in &self.children {
            child.render_into(out, depth + 1);
        }
    }
}
