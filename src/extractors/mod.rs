//! Page-level extraction
//!
//! Each module turns one embedded data format into nodes. [`page_node`]
//! gathers them all into a single queryable root, and [`ExtractionRequest`]
//! describes a record of named fields to pull out of it.

mod jsonld_extractor;
mod microdata_extractor;
mod nextjs_extractor;
mod opengraph_extractor;

pub use jsonld_extractor::*;
pub use microdata_extractor::*;
pub use nextjs_extractor::*;
pub use opengraph_extractor::*;

use std::sync::Arc;

use scraper::Html;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::compiler::QueryCompiler;
use crate::error::{CompileError, ExtractError};
use crate::markup::Markup;
use crate::node::{Mapping, Node};
use crate::path::PathSpec;
use crate::plan::Plan;

/// A webpage as one mapping:
///
/// | key | value |
/// |---|---|
/// | `html` | the whole document as markup |
/// | `jsonld` | JSON-LD objects by type, each a sequence |
/// | `microdata` | microdata items by type, each a sequence |
/// | `og`, `twitter`, `meta` | meta tag groups |
/// | `nextjs` | `__NEXT_DATA__` payload, when present |
pub fn page_node(html: &str) -> Node {
    let document = Html::parse_document(html);
    let tags = extract_meta_tags(&document);

    let mut page = Mapping::new();
    page.insert("html".to_string(), Node::Markup(Markup::document(html)));
    page.insert("jsonld".to_string(), Node::Mapping(extract_jsonld(&document)));
    page.insert(
        "microdata".to_string(),
        Node::Mapping(extract_microdata(&document)),
    );
    page.insert("og".to_string(), Node::Mapping(tags.og));
    page.insert("twitter".to_string(), Node::Mapping(tags.twitter));
    page.insert("meta".to_string(), Node::Mapping(tags.meta));
    if let Some(next_data) = extract_nextjs(&document) {
        page.insert("nextjs".to_string(), next_data);
    }
    Node::Mapping(page)
}

/// Named fields to extract from one root
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub fields: Vec<FieldSpec>,
}

/// Single output field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Output name
    pub alias: String,
    pub path: PathSpec,
    /// Fallback paths, tried in order when `path` finds nothing
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<PathSpec>,
    /// Absence fails the whole record with the alias as the field label
    #[serde(default)]
    pub required: bool,
}

impl FieldSpec {
    pub fn new(alias: impl Into<String>, path: impl Into<PathSpec>) -> Self {
        Self {
            alias: alias.into(),
            path: path.into(),
            alternatives: Vec::new(),
            required: false,
        }
    }

    pub fn or(mut self, path: impl Into<PathSpec>) -> Self {
        self.alternatives.push(path.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

impl ExtractionRequest {
    pub fn new(fields: impl IntoIterator<Item = FieldSpec>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Compile every field path; the compiler's cache is shared across requests
    pub fn compile(&self, compiler: &QueryCompiler) -> Result<RecordPlan, CompileError> {
        let fields = self
            .fields
            .iter()
            .map(|field| {
                let plans = std::iter::once(&field.path)
                    .chain(&field.alternatives)
                    .map(|path| compiler.compile(path))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(FieldPlan {
                    alias: field.alias.clone(),
                    plans,
                    required: field.required,
                })
            })
            .collect::<Result<Vec<_>, CompileError>>()?;
        Ok(RecordPlan { fields })
    }
}

#[derive(Debug, Clone)]
struct FieldPlan {
    alias: String,
    plans: Vec<Arc<Plan>>,
    required: bool,
}

/// A compiled [`ExtractionRequest`]
#[derive(Debug, Clone)]
pub struct RecordPlan {
    fields: Vec<FieldPlan>,
}

impl RecordPlan {
    /// Extract every field from `root`. Absent optional fields are left out.
    pub fn extract(&self, root: &Node) -> Result<ExtractionResult, ExtractError> {
        let mut values = Mapping::new();

        for field in &self.fields {
            let mut found = None;
            for plan in &field.plans {
                // Empty results fall through to the next alternative
                if let Some(value) = plan.evaluate(root)?.filter(|v| !v.is_empty()) {
                    found = Some(value);
                    break;
                }
            }

            match found {
                Some(value) => {
                    values.insert(field.alias.clone(), value);
                }
                None if field.required => {
                    trace!(field = %field.alias, "required field missing");
                    return Err(ExtractError::missing(field.alias.as_str()));
                }
                None => {}
            }
        }

        Ok(ExtractionResult { values })
    }

    /// Build the [`page_node`] of `html` and extract from it
    pub fn extract_html(&self, html: &str) -> Result<ExtractionResult, ExtractError> {
        self.extract(&page_node(html))
    }
}

/// Extracted values by alias, in request order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExtractionResult {
    pub values: Mapping,
}

impl ExtractionResult {
    pub fn get(&self, alias: &str) -> Option<&Node> {
        self.values.get(alias)
    }

    pub fn to_json(&self) -> serde_json::Value {
        Node::Mapping(self.values.clone()).to_json()
    }
}
