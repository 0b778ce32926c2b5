//! Compiled query plans
//!
//! A plan is the resolved form of a [`PathSpec`](crate::PathSpec): transform
//! names are callables, regexes and selectors are compiled, and comparison
//! operators are known. Plans are immutable and shared freely between threads.

use std::cmp::Ordering;

use regex::Regex;

use crate::node::Node;
use crate::path::CustomPredicate;
use crate::transforms::Transform;

#[derive(Debug, Clone, Default)]
pub struct Plan {
    steps: Vec<Step>,
}

impl Plan {
    pub(crate) fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Debug, Clone)]
pub enum Step {
    Key(String),
    Index(i64),
    Slice {
        start: Option<i64>,
        end: Option<i64>,
        step: i64,
    },
    Wildcard,
    Filter(Predicate),
    Alternatives(Vec<Plan>),
    First(Vec<Plan>),
    Transform(Transform),
    Template(Vec<(String, Plan)>),
    Require(String),
    Combinator(Combinator),
}

impl Step {
    /// Steps that turn a single value into a list
    pub fn fans_out(&self) -> bool {
        matches!(
            self,
            Step::Wildcard | Step::Slice { .. } | Step::Alternatives(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    Any,
    All,
    /// Drop empty items
    Compact,
}

#[derive(Debug, Clone)]
pub enum Predicate {
    Exists(Plan),
    Compare { path: Plan, comparison: Comparison },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Custom(CustomPredicate),
}

#[derive(Debug, Clone)]
pub enum Comparison {
    Eq(Node),
    Ne(Node),
    Lt(Node),
    Le(Node),
    Gt(Node),
    Ge(Node),
    Contains(Node),
    Matches(Regex),
    In(Vec<Node>),
}

impl Comparison {
    /// `left` is the sub-path result; `None` means it was absent.
    /// Absence only equals a null literal.
    pub fn test(&self, left: Option<&Node>) -> bool {
        let Some(left) = left else {
            return match self {
                Comparison::Eq(right) => right.is_null(),
                Comparison::Ne(right) => !right.is_null(),
                Comparison::In(values) => values.iter().any(Node::is_null),
                _ => false,
            };
        };

        match self {
            Comparison::Eq(right) => values_equal(left, right),
            Comparison::Ne(right) => !values_equal(left, right),
            Comparison::Lt(right) => values_cmp(left, right) == Some(Ordering::Less),
            Comparison::Le(right) => matches!(
                values_cmp(left, right),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Comparison::Gt(right) => values_cmp(left, right) == Some(Ordering::Greater),
            Comparison::Ge(right) => matches!(
                values_cmp(left, right),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Comparison::Contains(needle) => contains(left, needle),
            Comparison::Matches(re) => match left {
                Node::String(s) => re.is_match(s),
                _ => false,
            },
            Comparison::In(values) => values.iter().any(|v| values_equal(left, v)),
        }
    }
}

/// Equality with numeric coercion between integers and floats
fn values_equal(a: &Node, b: &Node) -> bool {
    match (a, b) {
        (Node::Number(n1), Node::Number(n2)) => match (exact_int(n1), exact_int(n2)) {
            (Some(i1), Some(i2)) => i1 == i2,
            _ => n1
                .as_f64()
                .zip(n2.as_f64())
                .is_some_and(|(a, b)| (a - b).abs() < f64::EPSILON),
        },
        _ => a == b,
    }
}

fn values_cmp(a: &Node, b: &Node) -> Option<Ordering> {
    match (a, b) {
        (Node::Number(n1), Node::Number(n2)) => match (exact_int(n1), exact_int(n2)) {
            (Some(i1), Some(i2)) => Some(i1.cmp(&i2)),
            _ => n1.as_f64()?.partial_cmp(&n2.as_f64()?),
        },
        (Node::String(s1), Node::String(s2)) => Some(s1.cmp(s2)),
        (Node::Bool(b1), Node::Bool(b2)) => Some(b1.cmp(b2)),
        _ => None,
    }
}

/// Integers compare exactly; going through f64 would merge ids above 2^53
fn exact_int(n: &serde_json::Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

/// Substring, sequence member or mapping key
fn contains(haystack: &Node, needle: &Node) -> bool {
    match (haystack, needle) {
        (Node::String(s), Node::String(n)) => s.contains(n.as_str()),
        (Node::Sequence(items), n) => items.iter().any(|item| values_equal(item, n)),
        (Node::Mapping(map), Node::String(key)) => map.contains_key(key),
        (Node::Markup(markup), Node::String(n)) => markup.text().contains(n.as_str()),
        _ => false,
    }
}
