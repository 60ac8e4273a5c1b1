//! RAVENS schema templates.
//!
//! A schema template declares, independently of any concrete data, the nested
//! JSON shape each domain type occupies in a RAVENS document:
//!
//! ```text
//! properties
//! ├── PowerSystemModel        (container: fixed key, no identity)
//! │   └── EnergyConsumer      (object keyed by `IdentifiedObject.name`)
//! │       └── Terminals       (array of Terminal, ordered by sequenceNumber)
//! └── ...
//! ```
//!
//! This crate parses that template into a closed [`Segment`] tree and builds
//! the [`PathIndex`]: for every domain type, the chain of segments leading from
//! the template root to the type's occurrence(s). The codec consumes the index
//! read-only for a whole decode/encode run.

pub mod path;
pub mod segment;

use serde_json::Value;
use std::path::Path as FsPath;
use thiserror::Error;

pub use path::{Path, PathEntry, PathIndex, PathSegment, ReferenceTarget, SegmentKind};
pub use segment::{markers, ArraySegment, ObjectSegment, ReferenceSegment, Segment};

/// Configuration errors: the template is structurally inconsistent.
///
/// These are fatal and raised before any data is touched.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to read template: {0}")]
    Io(#[from] std::io::Error),
    #[error("template is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("template root has no `properties` map")]
    MissingRootProperties,
    #[error("template entry '{key}' is not a JSON object")]
    NotAnObject { key: String },
    #[error("unrecognized $objectType for '{key}': {object_type:?}")]
    UnknownObjectType {
        key: String,
        object_type: Option<String>,
    },
    #[error("missing 'items' from object '{key}' of type array")]
    MissingItems { key: String },
    #[error("array '{key}' nests another array; nested arrays have no path semantics")]
    NestedArray { key: String },
    #[error("reference '{key}' has no $referencePath")]
    MissingReferencePath { key: String },
    #[error("reference '{predicate}' is declared at the template root and has no parent type")]
    ReferenceAtRoot { predicate: String },
    #[error("'{key}' mixes reference and object alternatives in oneOf")]
    MixedOneOf { key: String },
    #[error("'{key}' under '{parent}' is declared both as a reference and as an embedded object")]
    ReferenceObjectConflict { parent: String, key: String },
}

/// A parsed schema template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Template {
    pub segments: Vec<Segment>,
}

impl Template {
    /// Parse a template from an already-loaded JSON value.
    pub fn from_value(value: &Value) -> Result<Self, TemplateError> {
        let properties = value
            .get(markers::PROPERTIES)
            .and_then(Value::as_object)
            .ok_or(TemplateError::MissingRootProperties)?;

        Ok(Self {
            segments: segment::parse_properties(properties)?,
        })
    }

    pub fn from_json_str(text: &str) -> Result<Self, TemplateError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }

    pub fn from_path(path: &FsPath) -> Result<Self, TemplateError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Build the per-type path index for this template.
    pub fn path_index(&self) -> Result<PathIndex, TemplateError> {
        PathIndex::build(self)
    }
}
