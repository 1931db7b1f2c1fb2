//! Combinable metrics and the type-keyed set that holds them.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use chatweave_core::provider::Usage;
use serde::{Deserialize, Serialize};

/// A metric that can be folded together with another value of the same type.
///
/// Recording the same metric type twice in one scope, or merging a child
/// scope into its parent, both go through [`CombinableMetric::combined`].
pub trait CombinableMetric: Clone + fmt::Debug + Send + Sync + 'static {
    fn combined(&self, other: &Self) -> Self;

    /// One-line human summary for reports.
    fn summary(&self) -> Option<String> {
        None
    }
}

/// Object-safe view of a [`CombinableMetric`].
trait AnyMetric: fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn combine_with(&mut self, other: &dyn AnyMetric);
    fn clone_box(&self) -> Box<dyn AnyMetric>;
    fn summary(&self) -> Option<String>;
}

impl<M: CombinableMetric> AnyMetric for M {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn combine_with(&mut self, other: &dyn AnyMetric) {
        if let Some(other) = other.as_any().downcast_ref::<M>() {
            *self = self.combined(other);
        }
    }

    fn clone_box(&self) -> Box<dyn AnyMetric> {
        Box::new(self.clone())
    }

    fn summary(&self) -> Option<String> {
        CombinableMetric::summary(self)
    }
}

/// At most one value per metric type.
#[derive(Debug, Default)]
pub struct MetricSet {
    metrics: HashMap<TypeId, Box<dyn AnyMetric>>,
}

impl MetricSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `metric`, combining with any value of the same type already held.
    pub fn record<M: CombinableMetric>(&mut self, metric: M) {
        match self.metrics.get_mut(&TypeId::of::<M>()) {
            Some(existing) => existing.combine_with(&metric),
            None => {
                self.metrics.insert(TypeId::of::<M>(), Box::new(metric));
            }
        }
    }

    /// Fold every metric of `other` into this set.
    pub fn merge(&mut self, other: &MetricSet) {
        for (type_id, metric) in &other.metrics {
            match self.metrics.get_mut(type_id) {
                Some(existing) => existing.combine_with(metric.as_ref()),
                None => {
                    self.metrics.insert(*type_id, metric.clone_box());
                }
            }
        }
    }

    pub fn get<M: CombinableMetric>(&self) -> Option<&M> {
        self.metrics
            .get(&TypeId::of::<M>())
            .and_then(|m| m.as_any().downcast_ref::<M>())
    }

    pub fn contains<M: CombinableMetric>(&self) -> bool {
        self.metrics.contains_key(&TypeId::of::<M>())
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Summaries of every metric that provides one, sorted for stable output.
    pub fn summaries(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.metrics.values().filter_map(|m| m.summary()).collect();
        lines.sort();
        lines
    }
}

impl Clone for MetricSet {
    fn clone(&self) -> Self {
        Self {
            metrics: self
                .metrics
                .iter()
                .map(|(type_id, metric)| (*type_id, metric.clone_box()))
                .collect(),
        }
    }
}

/// Tokens consumed by completion calls. Combines by summing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

impl CombinableMetric for TokenUsage {
    fn combined(&self, other: &Self) -> Self {
        Self {
            input_tokens: self.input_tokens + other.input_tokens,
            output_tokens: self.output_tokens + other.output_tokens,
        }
    }

    fn summary(&self) -> Option<String> {
        Some(format!(
            "token usage: {} input, {} output",
            self.input_tokens, self.output_tokens
        ))
    }
}

impl From<Usage> for TokenUsage {
    fn from(usage: Usage) -> Self {
        Self::new(
            u64::from(usage.prompt_tokens),
            u64::from(usage.completion_tokens),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Combines multiplicatively, to prove the set defers to each type's rule.
    #[derive(Debug, Clone, PartialEq)]
    struct Product(f64);

    impl CombinableMetric for Product {
        fn combined(&self, other: &Self) -> Self {
            Product(self.0 * other.0)
        }
    }

    #[test]
    fn token_usage_sums() {
        let total = TokenUsage::new(10, 5).combined(&TokenUsage::new(20, 15));
        assert_eq!(total, TokenUsage::new(30, 20));
        assert_eq!(total.total(), 50);
    }

    #[test]
    fn record_same_type_combines() {
        let mut set = MetricSet::new();
        set.record(TokenUsage::new(1, 2));
        set.record(TokenUsage::new(3, 4));
        set.record(Product(2.0));
        set.record(Product(3.5));

        assert_eq!(set.len(), 2);
        assert_eq!(set.get::<TokenUsage>(), Some(&TokenUsage::new(4, 6)));
        assert_eq!(set.get::<Product>(), Some(&Product(7.0)));
    }

    #[test]
    fn merge_keeps_disjoint_types() {
        let mut parent = MetricSet::new();
        parent.record(Product(5.0));

        let mut child = MetricSet::new();
        child.record(TokenUsage::new(7, 8));
        child.record(Product(7.0));

        parent.merge(&child);
        assert_eq!(parent.get::<Product>(), Some(&Product(35.0)));
        assert_eq!(parent.get::<TokenUsage>(), Some(&TokenUsage::new(7, 8)));
        // the source set is untouched
        assert_eq!(child.get::<Product>(), Some(&Product(7.0)));
    }

    #[test]
    fn summaries_skip_silent_metrics() {
        let mut set = MetricSet::new();
        set.record(Product(1.0));
        set.record(TokenUsage::new(44, 55));
        assert_eq!(set.summaries(), vec!["token usage: 44 input, 55 output"]);
    }

    #[test]
    fn usage_converts_to_token_usage() {
        let usage = Usage::new(12, 3);
        assert_eq!(TokenUsage::from(usage), TokenUsage::new(12, 3));
    }
}
