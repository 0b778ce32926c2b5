//! Plan evaluation
//!
//! Evaluation threads a working set through the steps. The set starts as the
//! root alone; steps map, widen or narrow it. Anything absent along the way
//! (missing keys, wrong types, null values, transforms returning `None`) is
//! pruned. Only `require` turns an empty set into an error.
//!
//! Items borrow from the root wherever possible; values produced by
//! transforms or markup lookups are owned.

use std::borrow::Cow;

use serde::de::DeserializeOwned;
use tracing::trace;

use crate::error::ExtractError;
use crate::node::{Mapping, Node};
use crate::plan::{Combinator, Plan, Predicate, Step};

/// Values in flight between steps
#[derive(Debug, Clone)]
struct WorkingSet<'a> {
    items: Vec<Cow<'a, Node>>,
    /// Set once a step has fanned out; the result is then a list
    branching: bool,
    /// Some branch came up absent and was pruned. Only `all` looks at this.
    gaps: bool,
}

impl<'a> WorkingSet<'a> {
    fn root(node: Cow<'a, Node>) -> Self {
        let gaps = node.is_null();
        let items = if gaps { Vec::new() } else { vec![node] };
        Self {
            items,
            branching: false,
            gaps,
        }
    }

    fn into_owned(self) -> WorkingSet<'static> {
        WorkingSet {
            items: self
                .items
                .into_iter()
                .map(|item| Cow::Owned(item.into_owned()))
                .collect(),
            branching: self.branching,
            gaps: self.gaps,
        }
    }

    /// A list when branching, otherwise the single value
    fn finish(self) -> Option<Node> {
        if self.branching {
            Some(Node::Sequence(
                self.items.into_iter().map(Cow::into_owned).collect(),
            ))
        } else {
            self.items.into_iter().next().map(Cow::into_owned)
        }
    }
}

impl Plan {
    /// Run the plan against `root`.
    ///
    /// Returns `Ok(None)` when nothing was found on a non-branching path and
    /// `Ok(Some(Node::Sequence(..)))` (possibly empty) on a branching one.
    pub fn evaluate(&self, root: &Node) -> Result<Option<Node>, ExtractError> {
        Ok(run(self, Cow::Borrowed(root))?.finish())
    }

    /// Every value reached, as a flat list, whether or not the path branches
    pub fn evaluate_all(&self, root: &Node) -> Result<Vec<Node>, ExtractError> {
        let set = run(self, Cow::Borrowed(root))?;
        Ok(set.items.into_iter().map(Cow::into_owned).collect())
    }

    /// Evaluate and deserialize. A result of the wrong shape is absence.
    pub fn evaluate_as<T: DeserializeOwned>(&self, root: &Node) -> Result<Option<T>, ExtractError> {
        Ok(self
            .evaluate(root)?
            .and_then(|node| serde_json::from_value(node.to_json()).ok()))
    }
}

fn run<'a>(plan: &Plan, root: Cow<'a, Node>) -> Result<WorkingSet<'a>, ExtractError> {
    let mut set = WorkingSet::root(root);
    for step in plan.steps() {
        set = apply(step, set)?;
    }
    Ok(set)
}

/// Run a sub-plan against one item of the enclosing set
fn nested<'a>(plan: &Plan, item: &Cow<'a, Node>) -> Result<WorkingSet<'a>, ExtractError> {
    match item {
        Cow::Borrowed(node) => run(plan, Cow::Borrowed(*node)),
        Cow::Owned(node) => run(plan, Cow::Borrowed(node)).map(WorkingSet::into_owned),
    }
}

fn apply<'a>(step: &Step, mut set: WorkingSet<'a>) -> Result<WorkingSet<'a>, ExtractError> {
    match step {
        Step::Key(_) | Step::Index(_) | Step::Slice { .. } | Step::Wildcard => {
            let mut children = Vec::with_capacity(set.items.len());
            for item in set.items {
                let selected = descend(step, item);
                // A fan-out over nothing is an empty branch, not an absent one
                set.gaps |= selected.is_empty() && !step.fans_out();
                for child in selected {
                    if child.is_null() {
                        set.gaps = true;
                    } else {
                        children.push(child);
                    }
                }
            }
            set.items = children;
            set.branching |= step.fans_out();
        }
        Step::Filter(predicate) => {
            let mut kept = Vec::with_capacity(set.items.len());
            for item in set.items {
                if test(predicate, &item)? {
                    kept.push(item);
                }
            }
            set.items = kept;
        }
        Step::Transform(transform) => {
            let mut produced = Vec::with_capacity(set.items.len());
            for item in &set.items {
                match transform.apply(item) {
                    Some(value) if !value.is_null() => produced.push(Cow::Owned(value)),
                    _ => set.gaps = true,
                }
            }
            set.items = produced;
        }
        Step::Alternatives(plans) => {
            let mut collected = Vec::new();
            for item in &set.items {
                for plan in plans {
                    collected.extend(nested(plan, item)?.items);
                }
            }
            set.items = collected;
            set.branching = true;
        }
        Step::First(plans) => {
            let mut chosen = Vec::with_capacity(set.items.len());
            for item in &set.items {
                let mut winner = None;
                for plan in plans {
                    let sub = nested(plan, item)?;
                    if !sub.items.is_empty() {
                        winner = collapse(sub);
                        break;
                    }
                }
                match winner {
                    Some(value) => chosen.push(value),
                    None => set.gaps = true,
                }
            }
            set.items = chosen;
        }
        Step::Template(fields) => {
            let mut records = Vec::with_capacity(set.items.len());
            for item in &set.items {
                let mut record = Mapping::new();
                for (name, plan) in fields {
                    let sub = nested(plan, item)?;
                    if sub.items.is_empty() {
                        continue;
                    }
                    if let Some(value) = sub.finish() {
                        record.insert(name.clone(), value);
                    }
                }
                records.push(Cow::Owned(Node::Mapping(record)));
            }
            set.items = records;
        }
        Step::Require(label) => {
            if set.items.is_empty() {
                trace!(field = %label, "required value missing");
                return Err(ExtractError::missing(label.as_str()));
            }
        }
        Step::Combinator(combinator) => combine(*combinator, &mut set),
    }
    Ok(set)
}

/// The children a traversal step selects from one item
fn descend<'a>(step: &Step, item: Cow<'a, Node>) -> Vec<Cow<'a, Node>> {
    match item {
        Cow::Borrowed(node) => select(step, node),
        Cow::Owned(node) => select(step, &node)
            .into_iter()
            .map(|child| Cow::Owned(child.into_owned()))
            .collect(),
    }
}

fn select<'n>(step: &Step, node: &'n Node) -> Vec<Cow<'n, Node>> {
    match step {
        Step::Key(key) => node.child(key).into_iter().collect(),
        Step::Index(index) => node.at(*index).into_iter().collect(),
        Step::Slice { start, end, step } => node.slice(*start, *end, *step),
        Step::Wildcard => node.children(),
        _ => Vec::new(),
    }
}

/// One value standing for a whole sub-result
fn collapse(set: WorkingSet<'_>) -> Option<Cow<'_, Node>> {
    if set.branching {
        Some(Cow::Owned(Node::Sequence(
            set.items.into_iter().map(Cow::into_owned).collect(),
        )))
    } else {
        set.items.into_iter().next()
    }
}

fn combine(combinator: Combinator, set: &mut WorkingSet<'_>) {
    match combinator {
        Combinator::Any => {
            set.items.truncate(1);
            set.branching = false;
        }
        Combinator::All => {
            let items = std::mem::take(&mut set.items);
            if !set.gaps && !items.iter().any(|item| item.is_empty()) {
                let all = items.into_iter().map(Cow::into_owned).collect();
                set.items.push(Cow::Owned(Node::Sequence(all)));
            }
            set.branching = false;
        }
        Combinator::Compact => set.items.retain(|item| !item.is_empty()),
    }
    set.gaps = false;
}

fn test(predicate: &Predicate, node: &Node) -> Result<bool, ExtractError> {
    let passed = match predicate {
        Predicate::Exists(plan) => run(plan, Cow::Borrowed(node))?
            .finish()
            .is_some_and(|found| found.is_truthy()),
        Predicate::Compare { path, comparison } => {
            let found = run(path, Cow::Borrowed(node))?.finish();
            comparison.test(found.as_ref())
        }
        Predicate::And(parts) => {
            for part in parts {
                if !test(part, node)? {
                    return Ok(false);
                }
            }
            true
        }
        Predicate::Or(parts) => {
            for part in parts {
                if test(part, node)? {
                    return Ok(true);
                }
            }
            false
        }
        Predicate::Not(inner) => !test(inner, node)?,
        Predicate::Custom(custom) => custom.call(node),
    };
    Ok(passed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::markup::Markup;
    use crate::path::{ConditionSpec, PathSpec, TransformRef};
    use crate::{path, StepSpec};
    use serde_json::json;

    fn eval(root: serde_json::Value, spec: PathSpec) -> Result<Option<Node>, ExtractError> {
        eval_node(&Node::from(root), spec)
    }

    fn eval_node(root: &Node, spec: PathSpec) -> Result<Option<Node>, ExtractError> {
        compile(&spec).unwrap().evaluate(root)
    }

    #[test]
    fn test_wildcard_transform_filter() {
        let spec = PathSpec::new()
            .key("a")
            .key("b")
            .wildcard()
            .map(|n| n.as_i64().map(|v| Node::from(v * 2)))
            .compact();
        let result = eval(json!({"a": {"b": [1, 2, 3]}}), spec).unwrap();
        assert_eq!(result, Some(Node::from(json!([2, 4, 6]))));
    }

    #[test]
    fn test_key_into_null_is_absent() {
        assert_eq!(eval(json!({"a": null}), path!["a", "b"]), Ok(None));
        assert_eq!(eval(json!({"a": null}), path!["a"]), Ok(None));
        assert_eq!(eval(json!({"a": "text"}), path!["a", "b"]), Ok(None));
        assert_eq!(eval(json!(null), path!["a"]), Ok(None));
    }

    #[test]
    fn test_filter_then_any() {
        let spec = PathSpec::new()
            .key("items")
            .wildcard()
            .filter(ConditionSpec::eq("id", "2"))
            .key("id")
            .any();
        let root = json!({"items": [{"id": "1"}, {"id": "2"}]});
        assert_eq!(eval(root, spec), Ok(Some(Node::from("2"))));
    }

    #[test]
    fn test_filter_on_large_ids() {
        let spec = PathSpec::new()
            .key("items")
            .wildcard()
            .filter(ConditionSpec::eq("id", json!(9007199254740992_i64)))
            .key("id");
        let root = json!({"items": [{"id": 9007199254740993_i64}, {"id": 9007199254740992_i64}]});
        assert_eq!(eval(root, spec), Ok(Some(Node::from(json!([9007199254740992_i64])))));
    }

    #[test]
    fn test_require_absent() {
        let spec = PathSpec::new().key("title").require("title");
        let err = eval(json!({"name": "x"}), spec).unwrap_err();
        assert_eq!(err, ExtractError::missing("title"));
        assert_eq!(err.field(), "title");

        let spec = PathSpec::new().key("title").require("title");
        assert_eq!(eval(json!({"title": "x"}), spec), Ok(Some(Node::from("x"))));
    }

    #[test]
    fn test_branching_without_matches_is_empty_list() {
        let result = eval(json!({"a": []}), path!["a", StepSpec::Wildcard, "x"]).unwrap();
        assert_eq!(result, Some(Node::Sequence(vec![])));

        let result = eval(json!({"a": [{"x": 1}, {}]}), path!["a", StepSpec::Wildcard, "x"]);
        assert_eq!(result, Ok(Some(Node::from(json!([1])))));
    }

    #[test]
    fn test_negative_index_and_slice() {
        let root = json!({"formats": [{"h": 360}, {"h": 720}, {"h": 1080}]});
        assert_eq!(
            eval(root.clone(), path!["formats", -1, "h"]),
            Ok(Some(Node::from(1080)))
        );
        let spec = PathSpec::new().key("formats").slice(Some(1), None, None).key("h");
        assert_eq!(eval(root, spec), Ok(Some(Node::from(json!([720, 1080])))));
    }

    #[test]
    fn test_wildcard_over_mapping_values() {
        let root = json!({"subs": {"en": {"url": "e"}, "de": {"url": "d"}}});
        assert_eq!(
            eval(root, path!["subs", StepSpec::Wildcard, "url"]),
            Ok(Some(Node::from(json!(["e", "d"]))))
        );
    }

    #[test]
    fn test_nested_wildcards_concatenate_in_order() {
        let root = json!({"seasons": [{"eps": [1, 2]}, {"eps": []}, {"eps": [3]}]});
        let spec = path!["seasons", StepSpec::Wildcard, "eps", StepSpec::Wildcard];
        assert_eq!(eval(root, spec), Ok(Some(Node::from(json!([1, 2, 3])))));
    }

    #[test]
    fn test_alternatives_collect_all() {
        let root = json!({"a": 1, "c": [2, 3]});
        let spec = PathSpec::new().alternatives([path!["a"], path!["b"], path!["c", StepSpec::Wildcard]]);
        assert_eq!(eval(root, spec), Ok(Some(Node::from(json!([1, 2, 3])))));
    }

    #[test]
    fn test_alternatives_then_any() {
        let root = json!({"title": "", "name": "fallback"});
        let spec = PathSpec::new()
            .alternatives([path!["missing"], path!["title"], path!["name"]])
            .compact()
            .any();
        assert_eq!(eval(root, spec), Ok(Some(Node::from("fallback"))));
    }

    #[test]
    fn test_first_alternative_wins() {
        let root = json!({"b": "second", "c": "third"});
        let spec = PathSpec::new().first_of([path!["a"], path!["b"], path!["c"]]);
        assert_eq!(eval(root.clone(), spec), Ok(Some(Node::from("second"))));

        let spec = PathSpec::new().first_of([path!["a"], path!["z"]]);
        assert_eq!(eval(root, spec), Ok(None));
    }

    #[test]
    fn test_first_keeps_fanned_out_list() {
        let root = json!({"list": [{"u": 1}, {"u": 2}], "single": 9});
        let spec = PathSpec::new().first_of([path!["list", StepSpec::Wildcard, "u"], path!["single"]]);
        assert_eq!(eval(root, spec), Ok(Some(Node::from(json!([1, 2])))));
    }

    #[test]
    fn test_all_requires_every_item() {
        let spec = path!["xs", StepSpec::Wildcard, StepSpec::All];
        assert_eq!(
            eval(json!({"xs": ["a", "b"]}), spec.clone()),
            Ok(Some(Node::from(json!(["a", "b"]))))
        );
        assert_eq!(eval(json!({"xs": ["a", ""]}), spec.clone()), Ok(None));
        assert_eq!(eval(json!({"xs": ["a", null]}), spec.clone()), Ok(None));
        assert_eq!(
            eval(json!({"xs": []}), spec),
            Ok(Some(Node::Sequence(vec![])))
        );
    }

    #[test]
    fn test_all_fails_when_a_branch_lacks_the_rest_of_the_path() {
        let spec = PathSpec::new()
            .key("items")
            .wildcard()
            .filter(ConditionSpec::exists("keep"))
            .key("v")
            .all();
        let root = json!({"items": [{"keep": true, "v": "a"}, {"keep": true}]});
        assert_eq!(eval(root, spec.clone()), Ok(None));

        // Items dropped by the condition do not count
        let root = json!({"items": [{"keep": true, "v": "a"}, {"keep": false}]});
        assert_eq!(eval(root, spec), Ok(Some(Node::from(json!(["a"])))));

        let spec = path!["xs", StepSpec::Wildcard]
            .transform("to_int")
            .all();
        assert_eq!(eval(json!({"xs": ["1", "x"]}), spec.clone()), Ok(None));
        assert_eq!(eval(json!({"xs": ["1", "2"]}), spec), Ok(Some(Node::from(json!([1, 2])))));
    }

    #[test]
    fn test_pruned_branches_do_not_leak_past_other_combinators() {
        let root = json!({"items": [{"v": "a"}, {}]});
        let compacted = path!["items", StepSpec::Wildcard, "v", StepSpec::Compact, StepSpec::All];
        assert_eq!(eval(root.clone(), compacted), Ok(Some(Node::from(json!(["a"])))));

        let plain = path!["items", StepSpec::Wildcard, "v"];
        assert_eq!(eval(root, plain), Ok(Some(Node::from(json!(["a"])))));
    }

    #[test]
    fn test_compact_keeps_false_and_zero() {
        let spec = path!["xs", StepSpec::Wildcard, StepSpec::Compact];
        let root = json!({"xs": [0, "", false, [], {}, "x"]});
        assert_eq!(eval(root, spec), Ok(Some(Node::from(json!([0, false, "x"])))));
    }

    #[test]
    fn test_template() {
        let root = json!({"items": [
            {"id": "1", "title": "One", "tags": ["a"]},
            {"id": "2", "tags": []}
        ]});
        let spec = PathSpec::new().key("items").wildcard().template([
            ("id", path!["id"]),
            ("title", path!["title"]),
            ("tags", path!["tags", StepSpec::Wildcard]),
        ]);
        assert_eq!(
            eval(root, spec),
            Ok(Some(Node::from(json!([
                {"id": "1", "title": "One", "tags": ["a"]},
                {"id": "2"}
            ]))))
        );
    }

    #[test]
    fn test_require_inside_template_propagates() {
        let spec = PathSpec::new().template([("title", PathSpec::new().key("title").require("title"))]);
        assert_eq!(
            eval(json!({}), spec),
            Err(ExtractError::missing("title"))
        );
    }

    #[test]
    fn test_named_transforms_in_path() {
        let root = json!({"views": "1,234 views", "ts": "2023-01-02T10:00:00Z"});
        let views = PathSpec::new().key("views").transform("to_int");
        assert_eq!(eval(root.clone(), views), Ok(Some(Node::from(1234))));

        let ts = PathSpec::new().key("ts").transform("parse_iso8601");
        assert_eq!(eval(root.clone(), ts), Ok(Some(Node::from(1_672_653_600))));

        let failed = PathSpec::new().key("ts").transform("to_int").transform("str");
        assert_eq!(eval(root, failed), Ok(None));
    }

    #[test]
    fn test_transform_args() {
        let root = json!({"ms": 90500});
        let spec = PathSpec::new()
            .key("ms")
            .transform(TransformRef::named("to_int").arg("scale", 1000));
        assert_eq!(eval(root, spec), Ok(Some(Node::from(90))));
    }

    #[test]
    fn test_conditions() {
        let root = json!({"formats": [
            {"ext": "mp4", "height": 720, "url": "a"},
            {"ext": "webm", "height": 1080, "url": "b"},
            {"ext": "mp4", "height": 1080},
        ]});
        let spec = PathSpec::new()
            .key("formats")
            .wildcard()
            .filter(
                ConditionSpec::eq("ext", "mp4")
                    .and(ConditionSpec::compare("height", ">=", 720))
                    .and(ConditionSpec::exists("url")),
            )
            .key("url");
        assert_eq!(eval(root.clone(), spec), Ok(Some(Node::from(json!(["a"])))));

        let spec = PathSpec::new()
            .key("formats")
            .wildcard()
            .filter(ConditionSpec::exists("url").not())
            .key("height");
        assert_eq!(eval(root, spec), Ok(Some(Node::from(json!([1080])))));
    }

    #[test]
    fn test_custom_condition() {
        let spec = PathSpec::new()
            .wildcard()
            .filter(ConditionSpec::custom(|n| n.as_i64().is_some_and(|v| v % 2 == 0)));
        assert_eq!(
            eval(json!([1, 2, 3, 4]), spec),
            Ok(Some(Node::from(json!([2, 4]))))
        );
    }

    #[test]
    fn test_filter_on_single_value_does_not_fan_out() {
        let spec = PathSpec::new().filter(ConditionSpec::exists("id")).key("id");
        assert_eq!(eval(json!({"id": 5}), spec.clone()), Ok(Some(Node::from(5))));
        assert_eq!(eval(json!({"name": 5}), spec), Ok(None));
    }

    #[test]
    fn test_markup_paths() {
        let page = Node::Markup(Markup::parse(
            r#"<html><body>
                <ul class="eps">
                    <li><a href="/ep/1" title="One">1</a></li>
                    <li><a href="/ep/2">2</a></li>
                </ul>
            </body></html>"#,
        ));
        let spec = PathSpec::new()
            .transform(TransformRef::named("find_elements").arg("tag", "a"))
            .wildcard()
            .key("href")
            .transform(TransformRef::named("url").arg("base", "https://example.com/show"));
        let plan = compile(&spec).unwrap();
        assert_eq!(
            plan.evaluate(&page),
            Ok(Some(Node::from(json!([
                "https://example.com/ep/1",
                "https://example.com/ep/2"
            ]))))
        );

        let titles = compile(
            &PathSpec::new()
                .transform(TransformRef::named("select_all").arg("css", "ul.eps a"))
                .wildcard()
                .key("title"),
        )
        .unwrap();
        assert_eq!(titles.evaluate(&page), Ok(Some(Node::from(json!(["One"])))));
    }

    #[test]
    fn test_table_rows_from_markup() {
        let page = Node::Markup(Markup::parse(
            r#"<html><body><table>
                <tr data-id="7"><td>Seven</td></tr>
                <tr data-id="8"><td>Eight</td></tr>
            </table></body></html>"#,
        ));
        let ids = PathSpec::new()
            .transform(TransformRef::named("find_elements").arg("tag", "tr"))
            .wildcard()
            .key("data-id");
        assert_eq!(eval_node(&page, ids), Ok(Some(Node::from(json!(["7", "8"])))));

        let cells = PathSpec::new()
            .transform(TransformRef::named("find_elements").arg("tag", "tr"))
            .wildcard()
            .index(0)
            .transform("text");
        assert_eq!(
            eval_node(&page, cells),
            Ok(Some(Node::from(json!(["Seven", "Eight"]))))
        );
    }

    #[test]
    fn test_evaluate_as() {
        let plan = compile(&path!["ids", StepSpec::Wildcard]).unwrap();
        let root = Node::from(json!({"ids": [3, 1, 2]}));
        assert_eq!(plan.evaluate_as::<Vec<i64>>(&root), Ok(Some(vec![3, 1, 2])));
        assert_eq!(plan.evaluate_as::<String>(&root), Ok(None));
    }

    #[test]
    fn test_evaluate_all_flattens_single_value() {
        let plan = compile(&path!["a"]).unwrap();
        assert_eq!(plan.evaluate_all(&Node::from(json!({"a": 1}))), Ok(vec![Node::from(1)]));
        assert_eq!(plan.evaluate_all(&Node::from(json!({}))), Ok(vec![]));
    }

    #[test]
    fn test_input_is_not_mutated_and_results_repeat() {
        let root = Node::from(json!({"a": {"b": [1, 2, 3]}}));
        let before = root.clone();
        let plan = compile(&path!["a", "b", StepSpec::Wildcard].step(StepSpec::Any)).unwrap();
        let first = plan.evaluate(&root);
        assert_eq!(first, plan.evaluate(&root));
        assert_eq!(root, before);
    }

    #[test]
    fn test_steps_after_owned_values() {
        // transform results are owned; later key steps work on them
        let spec = PathSpec::new()
            .key("raw")
            .transform("parse_json")
            .key("n")
            .map(|n| n.as_i64().map(|v| Node::from(v * 2)));
        assert_eq!(eval(json!({"raw": r#"{"n": 21}"#}), spec), Ok(Some(Node::from(42))));
    }

    #[test]
    fn test_plan_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Plan>();
        assert_send_sync::<crate::QueryCompiler>();
    }
}
