//! Structured data queries over JSON and HTML
//!
//! Describe where a value lives as a path, compile it once, and evaluate it
//! against many documents:
//! - keys, indices, slices and wildcards over nested data
//! - conditions, alternatives and record templates
//! - a catalog of tolerant transforms (numbers, dates, URLs, text, markup)
//! - `any` / `all` / `filter` combinators
//! - page-level extraction of JSON-LD, microdata, meta tags and Next.js data
//!
//! Missing data is never an error. Only `require` steps and required record
//! fields raise [`ExtractError::MissingField`].
//!
//! ```
//! use node_query::{compile, ConditionSpec, Node, PathSpec};
//! use serde_json::json;
//!
//! let root = Node::from(json!({"items": [{"id": "1"}, {"id": "2"}]}));
//! let spec = PathSpec::new()
//!     .key("items")
//!     .wildcard()
//!     .filter(ConditionSpec::eq("id", "2"))
//!     .key("id")
//!     .any();
//! let plan = compile(&spec).unwrap();
//! assert_eq!(plan.evaluate(&root).unwrap(), Some(Node::from("2")));
//! ```

pub mod cache;
pub mod compiler;
pub mod error;
mod evaluator;
pub mod extractors;
pub mod markup;
pub mod node;
pub mod path;
pub mod plan;
pub mod transforms;

pub use cache::PlanCache;
pub use compiler::{compile, QueryCompiler};
pub use error::{CompileError, Error, ExtractError, Result};
pub use extractors::{page_node, ExtractionRequest, ExtractionResult, FieldSpec, RecordPlan};
pub use markup::{clean_text, ElementQuery, Markup};
pub use node::{Mapping, Node, NodeKind};
pub use path::{ConditionSpec, PathSpec, SliceSpec, StepSpec, TransformRef};
pub use plan::Plan;

/// Compile `spec` and evaluate it against `root` in one call
pub fn query(root: &Node, spec: &PathSpec) -> Result<Option<Node>> {
    let plan = compile(spec)?;
    Ok(plan.evaluate(root)?)
}
