//! Encode: document -> graph.
//!
//! Every object carrying the type key becomes a node. Nesting becomes edges
//! from the enclosing node under the property key; scalars become literals.
//! Reference tokens are left as literals during the walk and replaced by
//! edges in one pass over the finished graph.

use ravens_graph::{Graph, NodeId, Triple, RDF_TYPE_IRI};
use ravens_template::PathIndex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

use crate::reference::resolve_references;
use crate::value::{json_to_literal, lexical};
use crate::{CodecConfig, CodecError};

/// Cache key for nodes with an explicit identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NodeKey {
    type_name: String,
    id: String,
}

pub struct Encoder<'a> {
    config: &'a CodecConfig,
    index: Option<&'a PathIndex>,
}

impl<'a> Encoder<'a> {
    pub fn new(config: &'a CodecConfig) -> Self {
        Self { config, index: None }
    }

    /// Use the template's position keys when looking up reference names.
    pub fn with_index(mut self, index: &'a PathIndex) -> Self {
        self.index = Some(index);
        self
    }

    pub fn encode(&self, document: &Value) -> Result<Graph, CodecError> {
        let Value::Object(root) = document else {
            return Err(CodecError::InvalidDocument {
                path: String::new(),
                reason: "document root must be an object".to_string(),
            });
        };

        let mut run = EncodeRun {
            config: self.config,
            graph: Graph::new(),
            cache: HashMap::new(),
            types: HashMap::new(),
        };
        let mut trail = Vec::new();
        for (key, value) in root {
            trail.push(key.clone());
            run.walk(value, &mut trail)?;
            trail.pop();
        }

        let mut graph = run.graph;
        let references = resolve_references(&mut graph, self.index, self.config)?;
        tracing::debug!(
            nodes = run.types.len(),
            triples = graph.len(),
            references,
            "encode finished"
        );
        Ok(graph)
    }
}

struct EncodeRun<'a> {
    config: &'a CodecConfig,
    graph: Graph,
    cache: HashMap<NodeKey, NodeId>,
    /// Type each emitted identity was first used with.
    types: HashMap<NodeId, String>,
}

fn invalid(trail: &[String], reason: impl Into<String>) -> CodecError {
    CodecError::InvalidDocument {
        path: trail.join("/"),
        reason: reason.into(),
    }
}

impl EncodeRun<'_> {
    fn is_typed(&self, map: &Map<String, Value>) -> bool {
        map.contains_key(&self.config.type_key)
    }

    /// Structural levels above any node.
    fn walk(&mut self, value: &Value, trail: &mut Vec<String>) -> Result<(), CodecError> {
        match value {
            Value::Object(map) if self.is_typed(map) => {
                self.emit_node(map, trail)?;
            }
            Value::Object(map) => {
                for (key, child) in map {
                    trail.push(key.clone());
                    self.walk(child, trail)?;
                    trail.pop();
                }
            }
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    trail.push(format!("[{}]", i + 1));
                    self.walk(item, trail)?;
                    trail.pop();
                }
            }
            Value::Null => {}
            Value::Bool(_) | Value::Number(_) | Value::String(_) => {
                return Err(invalid(trail.as_slice(), "scalar value outside a typed object"));
            }
        }
        Ok(())
    }

    fn identity(&mut self, type_name: &str, map: &Map<String, Value>, trail: &[String]) -> Result<NodeId, CodecError> {
        let Some(id) = map.get(&self.config.id_predicate).and_then(lexical) else {
            return Ok(NodeId::iri(format!("{}{}", self.config.id_prefix, Uuid::new_v4())));
        };

        let key = NodeKey {
            type_name: type_name.to_string(),
            id,
        };
        if let Some(node) = self.cache.get(&key) {
            return Ok(node.clone());
        }

        let node = if key.id.contains(':') {
            NodeId::iri(key.id.clone())
        } else {
            NodeId::iri(format!("{}{}", self.config.id_prefix, key.id))
        };
        if let Some(first) = self.types.get(&node) {
            if first != type_name {
                return Err(CodecError::IdentityConflict {
                    id: node.to_string(),
                    first: first.clone(),
                    second: format!("{type_name} at {}", trail.join("/")),
                });
            }
        }
        self.cache.insert(key, node.clone());
        Ok(node)
    }

    fn emit_node(&mut self, map: &Map<String, Value>, trail: &mut Vec<String>) -> Result<NodeId, CodecError> {
        let type_name = map
            .get(&self.config.type_key)
            .and_then(Value::as_str)
            .ok_or_else(|| invalid(trail.as_slice(), format!("{} must be a string", self.config.type_key)))?;

        let node = self.identity(type_name, map, trail.as_slice())?;
        self.types
            .entry(node.clone())
            .or_insert_with(|| type_name.to_string());
        self.graph.insert(Triple::link(
            node.clone(),
            RDF_TYPE_IRI,
            NodeId::iri(self.config.iri(type_name)),
        ));

        for (key, value) in map {
            if *key == self.config.type_key {
                continue;
            }
            trail.push(key.clone());
            self.emit_property(&node, key, value, trail)?;
            trail.pop();
        }
        Ok(node)
    }

    fn emit_literal(&mut self, subject: &NodeId, key: &str, value: &Value) {
        if let Some(literal) = json_to_literal(value) {
            self.graph.insert(Triple::new(
                subject.clone(),
                self.config.iri(key),
                ravens_graph::Object::Literal(literal),
            ));
        }
    }

    fn emit_property(&mut self, subject: &NodeId, key: &str, value: &Value, trail: &mut Vec<String>) -> Result<(), CodecError> {
        match value {
            Value::Object(map) => self.emit_nested(subject, key, map, trail)?,
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    trail.push(format!("[{}]", i + 1));
                    match item {
                        Value::Object(map) => self.emit_nested(subject, key, map, trail)?,
                        Value::Array(_) => return Err(invalid(trail.as_slice(), "nested arrays are not supported")),
                        scalar => self.emit_literal(subject, key, scalar),
                    }
                    trail.pop();
                }
            }
            scalar => self.emit_literal(subject, key, scalar),
        }
        Ok(())
    }

    /// An object below a node: a typed child linked under `key`, or an
    /// untyped grouping whose contents stay attached to `subject`.
    fn emit_nested(&mut self, subject: &NodeId, key: &str, map: &Map<String, Value>, trail: &mut Vec<String>) -> Result<(), CodecError> {
        if self.is_typed(map) {
            let child = self.emit_node(map, trail)?;
            self.graph
                .insert(Triple::link(subject.clone(), self.config.iri(key), child));
            return Ok(());
        }

        for (inner_key, value) in map {
            trail.push(inner_key.clone());
            match value {
                Value::Object(inner) => self.emit_nested(subject, key, inner, trail)?,
                Value::Array(items) => {
                    for (i, item) in items.iter().enumerate() {
                        trail.push(format!("[{}]", i + 1));
                        match item {
                            Value::Object(inner) => self.emit_nested(subject, key, inner, trail)?,
                            Value::Array(_) => return Err(invalid(trail.as_slice(), "nested arrays are not supported")),
                            scalar => self.emit_literal(subject, inner_key, scalar),
                        }
                        trail.pop();
                    }
                }
                scalar => self.emit_literal(subject, inner_key, scalar),
            }
            trail.pop();
        }
        Ok(())
    }
}
