//! Declarative path descriptions
//!
//! A [`PathSpec`] is plain data: it can be built in code, written with the
//! [`path!`](crate::path!) macro, or deserialized from JSON. It does nothing
//! until compiled into a [`Plan`](crate::Plan).
//!
//! JSON form:
//!
//! ```json
//! ["items", "wildcard", {"where": {"compare": {"path": ["id"], "op": "==", "value": "2"}}}, "id", "any"]
//! ```
//!
//! Bare strings are keys and bare integers are indices. A key that collides
//! with a step word is written `{"key": "any"}`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::node::Node;
use crate::transforms::CustomTransform;

/// Words that mean a step when written as a bare string
const STEP_WORDS: &[&str] = &["wildcard", "any", "all", "filter"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathSpec {
    pub steps: Vec<StepSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepSpec {
    /// Fan out over every child
    Wildcard,
    /// First item of the working set
    Any,
    /// The whole working set as one list, or nothing if any item is empty
    All,
    /// Drop empty items
    #[serde(rename = "filter")]
    Compact,
    Slice(SliceSpec),
    /// Keep items satisfying the condition
    Where(ConditionSpec),
    /// Every alternative's results, collected
    Alternatives(Vec<PathSpec>),
    /// The first alternative that yields anything
    First(Vec<PathSpec>),
    Transform(TransformRef),
    /// Build a mapping per item from named sub-paths
    Template(IndexMap<String, PathSpec>),
    /// Fail with a missing-field error when nothing is left
    Require(String),
    #[serde(skip)]
    Map(CustomTransform),
    #[serde(untagged)]
    Index(i64),
    #[serde(untagged)]
    Key(#[serde(with = "key_repr")] String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<i64>,
}

/// A transform by name, optionally with arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransformRef {
    Name(String),
    WithArgs {
        name: String,
        #[serde(flatten)]
        args: BTreeMap<String, Value>,
    },
}

impl TransformRef {
    pub fn named(name: impl Into<String>) -> Self {
        TransformRef::Name(name.into())
    }

    pub fn arg(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let (name, mut args) = self.into_parts();
        args.insert(key.into(), value.into());
        TransformRef::WithArgs { name, args }
    }

    pub fn name(&self) -> &str {
        match self {
            TransformRef::Name(name) | TransformRef::WithArgs { name, .. } => name,
        }
    }

    pub fn into_parts(self) -> (String, BTreeMap<String, Value>) {
        match self {
            TransformRef::Name(name) => (name, BTreeMap::new()),
            TransformRef::WithArgs { name, args } => (name, args),
        }
    }
}

impl From<&str> for TransformRef {
    fn from(name: &str) -> Self {
        TransformRef::named(name)
    }
}

type PredicateFn = dyn Fn(&Node) -> bool + Send + Sync;

/// Caller supplied predicate closure
#[derive(Clone)]
pub struct CustomPredicate(Arc<PredicateFn>);

impl CustomPredicate {
    pub fn new(f: impl Fn(&Node) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, node: &Node) -> bool {
        (self.0)(node)
    }
}

impl fmt::Debug for CustomPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomPredicate(..)")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionSpec {
    /// The sub-path yields something truthy
    Exists(PathSpec),
    Compare {
        path: PathSpec,
        op: String,
        value: Value,
    },
    And(Vec<ConditionSpec>),
    Or(Vec<ConditionSpec>),
    Not(Box<ConditionSpec>),
    #[serde(skip)]
    Custom(CustomPredicate),
}

impl ConditionSpec {
    pub fn exists(path: impl Into<PathSpec>) -> Self {
        ConditionSpec::Exists(path.into())
    }

    pub fn compare(path: impl Into<PathSpec>, op: &str, value: impl Into<Value>) -> Self {
        ConditionSpec::Compare {
            path: path.into(),
            op: op.to_string(),
            value: value.into(),
        }
    }

    pub fn eq(path: impl Into<PathSpec>, value: impl Into<Value>) -> Self {
        Self::compare(path, "==", value)
    }

    pub fn custom(f: impl Fn(&Node) -> bool + Send + Sync + 'static) -> Self {
        ConditionSpec::Custom(CustomPredicate::new(f))
    }

    pub fn and(self, other: ConditionSpec) -> Self {
        match self {
            ConditionSpec::And(mut all) => {
                all.push(other);
                ConditionSpec::And(all)
            }
            first => ConditionSpec::And(vec![first, other]),
        }
    }

    pub fn or(self, other: ConditionSpec) -> Self {
        match self {
            ConditionSpec::Or(mut any) => {
                any.push(other);
                ConditionSpec::Or(any)
            }
            first => ConditionSpec::Or(vec![first, other]),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        ConditionSpec::Not(Box::new(self))
    }
}

impl PathSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_steps(steps: Vec<StepSpec>) -> Self {
        Self { steps }
    }

    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Canonical text used as the plan cache key. Paths holding closures
    /// cannot be serialized and have none.
    pub fn fingerprint(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }

    pub fn step(mut self, step: impl Into<StepSpec>) -> Self {
        self.steps.push(step.into());
        self
    }

    pub fn key(self, key: impl Into<String>) -> Self {
        self.step(StepSpec::Key(key.into()))
    }

    pub fn index(self, index: i64) -> Self {
        self.step(StepSpec::Index(index))
    }

    pub fn slice(self, start: Option<i64>, end: Option<i64>, step: Option<i64>) -> Self {
        self.step(StepSpec::Slice(SliceSpec { start, end, step }))
    }

    pub fn wildcard(self) -> Self {
        self.step(StepSpec::Wildcard)
    }

    pub fn filter(self, condition: ConditionSpec) -> Self {
        self.step(StepSpec::Where(condition))
    }

    pub fn alternatives(self, paths: impl IntoIterator<Item = PathSpec>) -> Self {
        self.step(StepSpec::Alternatives(paths.into_iter().collect()))
    }

    pub fn first_of(self, paths: impl IntoIterator<Item = PathSpec>) -> Self {
        self.step(StepSpec::First(paths.into_iter().collect()))
    }

    pub fn transform(self, transform: impl Into<TransformRef>) -> Self {
        self.step(StepSpec::Transform(transform.into()))
    }

    /// Inline closure transform; such paths are compiled but never cached
    pub fn map(self, f: impl Fn(&Node) -> Option<Node> + Send + Sync + 'static) -> Self {
        self.step(StepSpec::Map(CustomTransform::new(f)))
    }

    pub fn template<K: Into<String>>(self, fields: impl IntoIterator<Item = (K, PathSpec)>) -> Self {
        self.step(StepSpec::Template(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn require(self, label: impl Into<String>) -> Self {
        self.step(StepSpec::Require(label.into()))
    }

    pub fn any(self) -> Self {
        self.step(StepSpec::Any)
    }

    pub fn all(self) -> Self {
        self.step(StepSpec::All)
    }

    /// The `filter` combinator: drop empty items
    pub fn compact(self) -> Self {
        self.step(StepSpec::Compact)
    }
}

impl From<Vec<StepSpec>> for PathSpec {
    fn from(steps: Vec<StepSpec>) -> Self {
        Self { steps }
    }
}

impl From<&str> for PathSpec {
    fn from(key: &str) -> Self {
        PathSpec::new().key(key)
    }
}

impl From<&str> for StepSpec {
    fn from(key: &str) -> Self {
        StepSpec::Key(key.to_string())
    }
}

impl From<String> for StepSpec {
    fn from(key: String) -> Self {
        StepSpec::Key(key)
    }
}

impl From<i64> for StepSpec {
    fn from(index: i64) -> Self {
        StepSpec::Index(index)
    }
}

impl From<i32> for StepSpec {
    fn from(index: i32) -> Self {
        StepSpec::Index(index.into())
    }
}

impl From<ConditionSpec> for StepSpec {
    fn from(condition: ConditionSpec) -> Self {
        StepSpec::Where(condition)
    }
}

impl From<TransformRef> for StepSpec {
    fn from(transform: TransformRef) -> Self {
        StepSpec::Transform(transform)
    }
}

/// Build a [`PathSpec`] from keys, indices and steps.
///
/// ```
/// use node_query::{path, StepSpec};
///
/// let p = path!["items", StepSpec::Wildcard, "id", StepSpec::Any];
/// assert_eq!(p.steps.len(), 4);
/// ```
#[macro_export]
macro_rules! path {
    () => {
        $crate::PathSpec::new()
    };
    ($($step:expr),+ $(,)?) => {
        $crate::PathSpec::from_steps(vec![$($crate::StepSpec::from($step)),+])
    };
}

/// Keys are bare strings unless they collide with a step word
mod key_repr {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::STEP_WORDS;

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Bare(String),
        Literal { key: String },
    }

    pub fn serialize<S: Serializer>(key: &str, serializer: S) -> Result<S::Ok, S::Error> {
        if STEP_WORDS.contains(&key) {
            Repr::Literal {
                key: key.to_string(),
            }
            .serialize(serializer)
        } else {
            serializer.serialize_str(key)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Ok(match Repr::deserialize(deserializer)? {
            Repr::Bare(key) | Repr::Literal { key } => key,
        })
    }
}
