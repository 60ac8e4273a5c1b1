//! Tree Assembler.
//!
//! Inserts one node's data at a resolved path, creating intermediate maps and
//! arrays on demand. Intermediate levels never replace what is already there;
//! at the terminal object, keys already present win over the new data.

use serde_json::{Map, Value};

use crate::resolve::{PathStore, ResolvedPath, Step};
use crate::CodecError;

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn conflict(trail: &[String], expected: &'static str, found: &'static str) -> CodecError {
    CodecError::ShapeConflict {
        path: trail.join("/"),
        expected,
        found,
    }
}

/// Insert `data` into `document` at `path`.
///
/// Append steps take the next array slot and record its 1-based ordinal in
/// `store`; an append whose ordinal was already recorded reuses that slot.
pub fn insert(
    document: &mut Value,
    path: &ResolvedPath,
    data: &Map<String, Value>,
    store: &mut PathStore,
) -> Result<(), CodecError> {
    let mut cursor = document;
    let mut trail: Vec<String> = Vec::new();

    for resolved in &path.steps {
        let step = match (&resolved.step, store.step(&resolved.origin)) {
            (Step::Append, Some(Step::Index(n))) => Step::Index(*n),
            (step, _) => step.clone(),
        };
        let found = kind(cursor);

        cursor = match (cursor, step) {
            (Value::Object(map), Step::Key { key, shape }) => {
                trail.push(key.clone());
                let child = map.entry(key).or_insert_with(|| shape.empty());
                if !shape.matches(child) {
                    return Err(conflict(&trail, shape.name(), kind(child)));
                }
                child
            }
            (Value::Array(_), Step::Index(0)) => {
                return Err(CodecError::InvalidDocument {
                    path: trail.join("/"),
                    reason: "array positions are 1-based".to_string(),
                })
            }
            (Value::Array(items), Step::Index(n)) => {
                trail.push(format!("[{n}]"));
                while items.len() < n {
                    items.push(Value::Object(Map::new()));
                }
                let child = &mut items[n - 1];
                if !child.is_object() {
                    return Err(conflict(&trail, "object", kind(child)));
                }
                child
            }
            (Value::Array(items), Step::Append) => {
                items.push(Value::Object(Map::new()));
                let ordinal = items.len();
                store.assign(&resolved.origin, ordinal);
                trail.push(format!("[{ordinal}]"));
                &mut items[ordinal - 1]
            }
            (_, Step::Key { .. }) => return Err(conflict(&trail, "object", found)),
            (_, Step::Index(_) | Step::Append) => return Err(conflict(&trail, "array", found)),
        };
    }

    let found = kind(cursor);
    let Value::Object(existing) = cursor else {
        return Err(conflict(&trail, "object", found));
    };
    merge(existing, data);
    Ok(())
}

/// `data` keys first, then keys only `existing` has; on overlap the existing
/// value is kept.
fn merge(existing: &mut Map<String, Value>, data: &Map<String, Value>) {
    let mut old = std::mem::take(existing);
    for (key, value) in data {
        let value = old.remove(key).unwrap_or_else(|| value.clone());
        existing.insert(key.clone(), value);
    }
    for (key, value) in old {
        existing.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::{Origin, ResolvedStep, Shape};
    use ravens_graph::NodeId;
    use serde_json::json;

    fn path(steps: Vec<Step>) -> ResolvedPath {
        ResolvedPath {
            steps: steps
                .into_iter()
                .enumerate()
                .map(|(item, step)| ResolvedStep {
                    step,
                    origin: Origin {
                        owner: NodeId::iri("urn:uuid:test"),
                        chain: 0,
                        item,
                    },
                })
                .collect(),
        }
    }

    fn data(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn creates_intermediate_levels() {
        let mut doc = json!({});
        let mut store = PathStore::default();
        let p = path(vec![
            Step::key("Assets", Shape::Object),
            Step::key("Widget", Shape::Object),
            Step::key("W1", Shape::Object),
        ]);
        insert(&mut doc, &p, &data(json!({"rating": 5})), &mut store).expect("insert");
        assert_eq!(doc, json!({"Assets": {"Widget": {"W1": {"rating": 5}}}}));
    }

    #[test]
    fn index_pads_with_empty_elements() {
        let mut doc = json!({});
        let mut store = PathStore::default();
        let p = path(vec![Step::key("parts", Shape::Array), Step::Index(3)]);
        insert(&mut doc, &p, &data(json!({"n": 3})), &mut store).expect("insert");
        assert_eq!(doc, json!({"parts": [{}, {}, {"n": 3}]}));

        let p = path(vec![Step::key("parts", Shape::Array), Step::Index(1)]);
        insert(&mut doc, &p, &data(json!({"n": 1})), &mut store).expect("insert");
        assert_eq!(doc, json!({"parts": [{"n": 1}, {}, {"n": 3}]}));
    }

    #[test]
    fn appends_take_consecutive_slots() {
        let mut doc = json!({});
        let mut store = PathStore::default();
        for n in 1..=3 {
            let p = path(vec![Step::key("parts", Shape::Array), Step::Append]);
            insert(&mut doc, &p, &data(json!({"n": n})), &mut store).expect("insert");
        }
        assert_eq!(doc, json!({"parts": [{"n": 1}, {"n": 2}, {"n": 3}]}));
    }

    #[test]
    fn existing_keys_win_and_siblings_survive() {
        let mut doc = json!({"W1": {"parts": [{"n": 1}], "rating": 1}});
        let mut store = PathStore::default();
        let p = path(vec![Step::key("W1", Shape::Object)]);
        insert(&mut doc, &p, &data(json!({"type": "Widget", "rating": 9})), &mut store)
            .expect("insert");
        assert_eq!(
            doc,
            json!({"W1": {"type": "Widget", "rating": 1, "parts": [{"n": 1}]}})
        );
        let keys: Vec<&String> = doc["W1"].as_object().expect("object").keys().collect();
        assert_eq!(keys, vec!["type", "rating", "parts"]);
    }

    #[test]
    fn shape_mismatch_is_fatal() {
        let mut doc = json!({"parts": {"not": "an array"}});
        let mut store = PathStore::default();
        let p = path(vec![Step::key("parts", Shape::Array), Step::Append]);
        let err = insert(&mut doc, &p, &Map::new(), &mut store).unwrap_err();
        assert!(matches!(
            err,
            CodecError::ShapeConflict { expected: "array", found: "object", .. }
        ));
    }
}
