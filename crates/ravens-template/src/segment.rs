//! Template segments.
//!
//! The JSON template is loosely typed: whether an entry is a container, an
//! object, an array or a reference is spread over `type`, `$objectType`,
//! `items` and `oneOf`. Parsing settles that once into the closed [`Segment`]
//! enum so every later stage matches exhaustively instead of inspecting maps.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::TemplateError;

/// Marker keys recognized in template JSON.
pub mod markers {
    pub const PROPERTIES: &str = "properties";
    pub const TYPE: &str = "type";
    pub const ITEMS: &str = "items";
    pub const ONE_OF: &str = "oneOf";
    pub const OBJECT_TYPE: &str = "$objectType";
    pub const OBJECT_ID: &str = "$objectId";
    pub const PRIMARY_OBJECT_HASH: &str = "$primaryObjectHash";
    pub const ARRAY_POSITION: &str = "$arrayPosition";
    pub const REFERENCE_PATH: &str = "$referencePath";
}

// ============================================================================
// Segment tree
// ============================================================================

/// One level of the template's declared nesting shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Segment {
    /// Fixed-key grouping with no identity of its own.
    Container { key: String, children: Vec<Segment> },
    Object(ObjectSegment),
    Array(ArraySegment),
    /// Alternatives sharing one property key; the node's declared type picks
    /// the variant. Variants are always `Object` or `Array` segments.
    OneOf { key: String, variants: Vec<Segment> },
    /// A predicate holding a named pointer; contributes no nesting level.
    Reference(ReferenceSegment),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSegment {
    pub key: String,
    pub type_name: String,
    /// Predicate whose value keys this object inside a keyed map.
    pub position_key: Option<String>,
    pub children: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArraySegment {
    pub key: String,
    pub type_name: String,
    /// Ordering predicate; `None` means append in discovery order.
    pub array_position: Option<String>,
    pub children: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSegment {
    pub predicate: String,
    /// Candidate target types, in declaration order.
    pub targets: Vec<String>,
}

impl Segment {
    /// The property key this segment occupies in its parent.
    pub fn key(&self) -> &str {
        match self {
            Segment::Container { key, .. } | Segment::OneOf { key, .. } => key,
            Segment::Object(obj) => &obj.key,
            Segment::Array(arr) => &arr.key,
            Segment::Reference(reference) => &reference.predicate,
        }
    }
}

// ============================================================================
// Parsing
// ============================================================================

pub(crate) fn parse_properties(properties: &Map<String, Value>) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    for (key, decl) in properties {
        if let Some(segment) = parse_property(key, decl)? {
            segments.push(segment);
        }
    }
    Ok(segments)
}

fn as_decl<'a>(key: &str, decl: &'a Value) -> Result<&'a Map<String, Value>, TemplateError> {
    decl.as_object().ok_or_else(|| TemplateError::NotAnObject {
        key: key.to_string(),
    })
}

fn str_field<'a>(decl: &'a Map<String, Value>, marker: &str) -> Option<&'a str> {
    decl.get(marker).and_then(Value::as_str)
}

fn is_reference(decl: &Map<String, Value>) -> bool {
    matches!(
        str_field(decl, markers::OBJECT_TYPE),
        Some("reference" | "oneOfReference")
    )
}

fn children(decl: &Map<String, Value>) -> Result<Vec<Segment>, TemplateError> {
    match decl.get(markers::PROPERTIES).and_then(Value::as_object) {
        Some(properties) => parse_properties(properties),
        None => Ok(Vec::new()),
    }
}

fn one_of<'a>(key: &str, decl: &'a Map<String, Value>) -> Result<Option<Vec<&'a Map<String, Value>>>, TemplateError> {
    let Some(alternatives) = decl.get(markers::ONE_OF) else {
        return Ok(None);
    };
    let alternatives = alternatives
        .as_array()
        .ok_or_else(|| TemplateError::NotAnObject {
            key: format!("{key}.{}", markers::ONE_OF),
        })?;
    alternatives
        .iter()
        .map(|alt| as_decl(key, alt))
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// Parse one property declaration. Primitive JSON properties carry no
/// structure and yield `None`.
fn parse_property(key: &str, decl: &Value) -> Result<Option<Segment>, TemplateError> {
    let decl = as_decl(key, decl)?;

    if is_reference(decl) {
        return parse_reference(key, decl).map(Some);
    }

    match str_field(decl, markers::TYPE) {
        Some("array") => parse_array(key, decl),
        Some("object") => match str_field(decl, markers::OBJECT_TYPE) {
            Some("container") => Ok(Some(Segment::Container {
                key: key.to_string(),
                children: children(decl)?,
            })),
            Some("object") => parse_object(key, decl).map(Some),
            other => Err(TemplateError::UnknownObjectType {
                key: key.to_string(),
                object_type: other.map(str::to_string),
            }),
        },
        _ => Ok(None),
    }
}

fn object_segment(key: &str, decl: &Map<String, Value>) -> Result<ObjectSegment, TemplateError> {
    Ok(ObjectSegment {
        key: key.to_string(),
        type_name: str_field(decl, markers::OBJECT_ID).unwrap_or(key).to_string(),
        position_key: str_field(decl, markers::PRIMARY_OBJECT_HASH).map(str::to_string),
        children: children(decl)?,
    })
}

fn parse_object(key: &str, decl: &Map<String, Value>) -> Result<Segment, TemplateError> {
    let Some(alternatives) = one_of(key, decl)? else {
        return object_segment(key, decl).map(Segment::Object);
    };

    let references = alternatives.iter().filter(|alt| is_reference(alt)).count();
    if references == alternatives.len() && references > 0 {
        return parse_reference(key, decl);
    }
    if references > 0 {
        return Err(TemplateError::MixedOneOf {
            key: key.to_string(),
        });
    }

    let variants = alternatives
        .into_iter()
        .map(|alt| object_segment(key, alt).map(Segment::Object))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Segment::OneOf {
        key: key.to_string(),
        variants,
    })
}

fn parse_array(key: &str, decl: &Map<String, Value>) -> Result<Option<Segment>, TemplateError> {
    let items = decl
        .get(markers::ITEMS)
        .ok_or_else(|| TemplateError::MissingItems {
            key: key.to_string(),
        })
        .and_then(|items| as_decl(key, items))?;

    if is_reference(items) {
        // A multi-valued pointer: still one predicate, repeated.
        return parse_reference(key, items).map(Some);
    }

    match str_field(items, markers::TYPE) {
        Some("object") => {}
        Some("array") => {
            return Err(TemplateError::NestedArray {
                key: key.to_string(),
            })
        }
        _ => return Ok(None),
    }

    // Accepted on the item declaration or on the array itself.
    let array_position = str_field(items, markers::ARRAY_POSITION)
        .or_else(|| str_field(decl, markers::ARRAY_POSITION))
        .map(str::to_string);

    let Some(alternatives) = one_of(key, items)? else {
        return Ok(Some(Segment::Array(ArraySegment {
            key: key.to_string(),
            type_name: str_field(items, markers::OBJECT_ID).unwrap_or(key).to_string(),
            array_position,
            children: children(items)?,
        })));
    };

    if alternatives.iter().any(|alt| is_reference(alt)) {
        return Err(TemplateError::MixedOneOf {
            key: key.to_string(),
        });
    }

    let variants = alternatives
        .into_iter()
        .map(|alt| {
            Ok(Segment::Array(ArraySegment {
                key: key.to_string(),
                type_name: str_field(alt, markers::OBJECT_ID).unwrap_or(key).to_string(),
                array_position: array_position.clone(),
                children: children(alt)?,
            }))
        })
        .collect::<Result<Vec<_>, TemplateError>>()?;

    Ok(Some(Segment::OneOf {
        key: key.to_string(),
        variants,
    }))
}

fn reference_target(key: &str, decl: &Map<String, Value>) -> Result<String, TemplateError> {
    str_field(decl, markers::REFERENCE_PATH)
        .and_then(|path| path.rsplit('/').next())
        .filter(|target| !target.is_empty())
        .map(str::to_string)
        .ok_or_else(|| TemplateError::MissingReferencePath {
            key: key.to_string(),
        })
}

fn parse_reference(key: &str, decl: &Map<String, Value>) -> Result<Segment, TemplateError> {
    let targets = match one_of(key, decl)? {
        Some(alternatives) => alternatives
            .into_iter()
            .map(|alt| reference_target(key, alt))
            .collect::<Result<Vec<_>, _>>()?,
        None => vec![reference_target(key, decl)?],
    };

    Ok(Segment::Reference(ReferenceSegment {
        predicate: key.to_string(),
        targets,
    }))
}
