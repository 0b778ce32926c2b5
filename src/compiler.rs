//! Path compilation
//!
//! Resolves transform names, validates their arguments, compiles regexes,
//! CSS selectors and base URLs, and turns condition descriptions into
//! predicates. Every malformed path is rejected here; evaluation never sees
//! an unresolved name.

use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;
use scraper::Selector;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::cache::PlanCache;
use crate::error::CompileError;
use crate::markup::{AttrValue, ElementQuery};
use crate::node::{Node, NodeKind};
use crate::path::{ConditionSpec, PathSpec, StepSpec, TransformRef};
use crate::plan::{Combinator, Comparison, Plan, Predicate, Step};
use crate::transforms::{Group, Scale, Transform};

/// Compile a path without caching
pub fn compile(spec: &PathSpec) -> Result<Plan, CompileError> {
    let steps = spec
        .steps
        .iter()
        .map(compile_step)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Plan::new(steps))
}

/// Compiles paths, reusing plans for paths it has seen before
#[derive(Debug, Default)]
pub struct QueryCompiler {
    cache: PlanCache,
}

impl QueryCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(cache: PlanCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &PlanCache {
        &self.cache
    }

    pub fn compile(&self, spec: &PathSpec) -> Result<Arc<Plan>, CompileError> {
        let Some(fingerprint) = spec.fingerprint() else {
            debug!(steps = spec.steps.len(), "compiling path with closures, not cached");
            return compile(spec).map(Arc::new);
        };

        if let Some(plan) = self.cache.get(&fingerprint) {
            debug!(path = %fingerprint, "plan cache hit");
            return Ok(plan);
        }

        debug!(path = %fingerprint, "plan cache miss, compiling");
        let plan = compile(spec)?;
        Ok(self.cache.insert(fingerprint, plan))
    }

    /// Parse a JSON path description and compile it
    pub fn compile_json(&self, json: &str) -> crate::Result<Arc<Plan>> {
        let spec = PathSpec::from_json(json)?;
        Ok(self.compile(&spec)?)
    }
}

fn compile_step(step: &StepSpec) -> Result<Step, CompileError> {
    let compiled = match step {
        StepSpec::Key(key) => Step::Key(key.clone()),
        StepSpec::Index(index) => Step::Index(*index),
        StepSpec::Slice(slice) => {
            let step = slice.step.unwrap_or(1);
            if step == 0 {
                return Err(CompileError::ZeroSliceStep);
            }
            Step::Slice {
                start: slice.start,
                end: slice.end,
                step,
            }
        }
        StepSpec::Wildcard => Step::Wildcard,
        StepSpec::Where(condition) => Step::Filter(compile_condition(condition)?),
        StepSpec::Alternatives(paths) => Step::Alternatives(compile_all(paths)?),
        StepSpec::First(paths) => Step::First(compile_all(paths)?),
        StepSpec::Transform(transform) => Step::Transform(resolve_transform(transform)?),
        StepSpec::Map(custom) => Step::Transform(Transform::Custom(custom.clone())),
        StepSpec::Template(fields) => Step::Template(
            fields
                .iter()
                .map(|(name, path)| Ok((name.clone(), compile(path)?)))
                .collect::<Result<Vec<_>, CompileError>>()?,
        ),
        StepSpec::Require(label) => Step::Require(label.clone()),
        StepSpec::Any => Step::Combinator(Combinator::Any),
        StepSpec::All => Step::Combinator(Combinator::All),
        StepSpec::Compact => Step::Combinator(Combinator::Compact),
    };
    Ok(compiled)
}

fn compile_all(paths: &[PathSpec]) -> Result<Vec<Plan>, CompileError> {
    paths.iter().map(compile).collect()
}

fn compile_condition(condition: &ConditionSpec) -> Result<Predicate, CompileError> {
    let predicate = match condition {
        ConditionSpec::Exists(path) => Predicate::Exists(compile(path)?),
        ConditionSpec::Compare { path, op, value } => Predicate::Compare {
            path: compile(path)?,
            comparison: comparison(op, value)?,
        },
        ConditionSpec::And(parts) => Predicate::And(
            parts
                .iter()
                .map(compile_condition)
                .collect::<Result<_, _>>()?,
        ),
        ConditionSpec::Or(parts) => Predicate::Or(
            parts
                .iter()
                .map(compile_condition)
                .collect::<Result<_, _>>()?,
        ),
        ConditionSpec::Not(inner) => Predicate::Not(Box::new(compile_condition(inner)?)),
        ConditionSpec::Custom(custom) => Predicate::Custom(custom.clone()),
    };
    Ok(predicate)
}

fn comparison(op: &str, value: &Value) -> Result<Comparison, CompileError> {
    let node = Node::from(value);
    let comparison = match op {
        "==" | "eq" => Comparison::Eq(node),
        "!=" | "ne" => Comparison::Ne(node),
        "<" | "lt" => Comparison::Lt(node),
        "<=" | "le" => Comparison::Le(node),
        ">" | "gt" => Comparison::Gt(node),
        ">=" | "ge" => Comparison::Ge(node),
        "contains" => Comparison::Contains(node),
        "matches" => {
            let pattern = value.as_str().ok_or_else(|| CompileError::InvalidArgument {
                transform: "matches".into(),
                arg: "value".into(),
                reason: "expected a regex string".into(),
            })?;
            Comparison::Matches(compile_regex(pattern)?)
        }
        "in" => match node {
            Node::Sequence(items) => Comparison::In(items),
            single => Comparison::In(vec![single]),
        },
        other => return Err(CompileError::UnknownComparison(other.to_string())),
    };
    Ok(comparison)
}

fn compile_regex(pattern: &str) -> Result<Regex, CompileError> {
    Regex::new(pattern).map_err(|source| CompileError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

fn resolve_transform(spec: &TransformRef) -> Result<Transform, CompileError> {
    let (name, args) = spec.clone().into_parts();
    let mut args = Args::new(&name, args);

    let transform = match name.as_str() {
        "str" => Transform::Kind(NodeKind::String),
        "bool" => Transform::Kind(NodeKind::Bool),
        "number" => Transform::Kind(NodeKind::Number),
        "mapping" => Transform::Kind(NodeKind::Mapping),
        "sequence" => Transform::Kind(NodeKind::Sequence),
        "markup" => Transform::Kind(NodeKind::Markup),
        "to_int" => Transform::ToInt(args.scale()?),
        "to_float" => Transform::ToFloat(args.scale()?),
        "to_str" => Transform::ToStr,
        "parse_count" => Transform::ParseCount,
        "parse_duration" => Transform::ParseDuration,
        "clean_html" | "text" => Transform::CleanHtml,
        "strip" => Transform::Strip,
        "trim_str" => Transform::TrimStr {
            start: args.string("start")?,
            end: args.string("end")?,
        },
        "lowercase" => Transform::Lowercase,
        "uppercase" => Transform::Uppercase,
        "search" => {
            let pattern = args.required_string("pattern")?;
            Transform::Search {
                pattern: compile_regex(&pattern)?,
                group: args.group("group")?,
            }
        }
        "parse_iso8601" => Transform::Iso8601 {
            delimiter: args.char("delimiter")?.unwrap_or('T'),
            tz_offset: args.int("tz_offset")?.unwrap_or(0),
        },
        "unified_timestamp" => Transform::UnifiedTimestamp {
            tz_offset: args.int("tz_offset")?.unwrap_or(0),
        },
        "unified_strdate" => Transform::UnifiedStrdate,
        "url" => Transform::Url {
            base: args
                .string("base")?
                .map(|base| parse_base(&base))
                .transpose()?,
        },
        "urljoin" => Transform::Url {
            base: Some(parse_base(&args.required_string("base")?)?),
        },
        "find_element" => Transform::FindElement(args.element_query()?),
        "find_elements" => Transform::FindElements(args.element_query()?),
        "select" => Transform::Select(args.selector()?),
        "select_all" => Transform::SelectAll(args.selector()?),
        "attributes" => Transform::Attributes,
        "join" => Transform::Join {
            delim: args.string("delim")?.unwrap_or_else(|| ", ".to_string()),
        },
        "parse_json" => Transform::ParseJson,
        other => return Err(CompileError::UnknownTransform(other.to_string())),
    };

    args.finish()?;
    Ok(transform)
}

fn parse_base(base: &str) -> Result<Url, CompileError> {
    Url::parse(base).map_err(|source| CompileError::InvalidBaseUrl {
        url: base.to_string(),
        source,
    })
}

/// Transform arguments, consumed as they are read. Anything left over when
/// resolution finishes is an unexpected argument.
struct Args<'a> {
    transform: &'a str,
    values: BTreeMap<String, Value>,
}

impl<'a> Args<'a> {
    fn new(transform: &'a str, values: BTreeMap<String, Value>) -> Self {
        Self { transform, values }
    }

    fn invalid(&self, arg: &str, reason: &str) -> CompileError {
        CompileError::InvalidArgument {
            transform: self.transform.to_string(),
            arg: arg.to_string(),
            reason: reason.to_string(),
        }
    }

    fn missing(&self, arg: &str) -> CompileError {
        CompileError::MissingArgument {
            transform: self.transform.to_string(),
            arg: arg.to_string(),
        }
    }

    fn take(&mut self, arg: &str) -> Option<Value> {
        self.values.remove(arg).filter(|v| !v.is_null())
    }

    fn string(&mut self, arg: &str) -> Result<Option<String>, CompileError> {
        match self.take(arg) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(_) => Err(self.invalid(arg, "expected a string")),
        }
    }

    fn required_string(&mut self, arg: &str) -> Result<String, CompileError> {
        self.string(arg)?.ok_or_else(|| self.missing(arg))
    }

    fn char(&mut self, arg: &str) -> Result<Option<char>, CompileError> {
        let Some(s) = self.string(arg)? else {
            return Ok(None);
        };
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(Some(c)),
            _ => Err(self.invalid(arg, "expected a single character")),
        }
    }

    fn int(&mut self, arg: &str) -> Result<Option<i64>, CompileError> {
        match self.take(arg) {
            None => Ok(None),
            Some(v) => v
                .as_i64()
                .map(Some)
                .ok_or_else(|| self.invalid(arg, "expected an integer")),
        }
    }

    fn bool(&mut self, arg: &str) -> Result<Option<bool>, CompileError> {
        match self.take(arg) {
            None => Ok(None),
            Some(v) => v
                .as_bool()
                .map(Some)
                .ok_or_else(|| self.invalid(arg, "expected a boolean")),
        }
    }

    fn factor(&mut self, arg: &str) -> Result<f64, CompileError> {
        match self.take(arg) {
            None => Ok(1.0),
            Some(v) => v
                .as_f64()
                .filter(|f| f.is_finite() && *f != 0.0)
                .ok_or_else(|| self.invalid(arg, "expected a non-zero number")),
        }
    }

    fn scale(&mut self) -> Result<Scale, CompileError> {
        Ok(Scale {
            scale: self.factor("scale")?,
            invscale: self.factor("invscale")?,
        })
    }

    fn group(&mut self, arg: &str) -> Result<Option<Group>, CompileError> {
        match self.take(arg) {
            None => Ok(None),
            Some(Value::String(name)) => Ok(Some(Group::Name(name))),
            Some(v) => v
                .as_u64()
                .and_then(|i| usize::try_from(i).ok())
                .map(|i| Some(Group::Index(i)))
                .ok_or_else(|| self.invalid(arg, "expected a group index or name")),
        }
    }

    fn element_query(&mut self) -> Result<ElementQuery, CompileError> {
        let mut query = ElementQuery {
            tag: self.string("tag")?,
            class: self.string("cls")?,
            id: self.string("id")?,
            attr: self.string("attr")?,
            value: None,
        };
        let value = self.string("value")?;
        let regex = self.bool("regex")?.unwrap_or(false);

        if let Some(value) = value {
            if query.attr.is_none() {
                return Err(self.missing("attr"));
            }
            query.value = Some(if regex {
                AttrValue::Pattern(compile_regex(&value)?)
            } else {
                AttrValue::Exact(value)
            });
        }

        if query.tag.is_none() && query.class.is_none() && query.id.is_none() && query.attr.is_none()
        {
            return Err(self.invalid("tag", "one of tag, cls, id or attr is needed"));
        }
        Ok(query)
    }

    fn selector(&mut self) -> Result<Selector, CompileError> {
        let css = self.required_string("css")?;
        Selector::parse(&css).map_err(|_| CompileError::InvalidSelector(css.clone()))
    }

    fn finish(self) -> Result<(), CompileError> {
        match self.values.into_keys().next() {
            Some(arg) => Err(CompileError::UnexpectedArgument {
                transform: self.transform.to_string(),
                arg,
            }),
            None => Ok(()),
        }
    }
}
