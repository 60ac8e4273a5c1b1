//! Decode: graph -> document.
//!
//! Two passes over the typed subjects, in graph order:
//!
//! 1. compute every node's chains into a [`PathStore`] (all nodes first, so
//!    ancestors that appear later in the graph can still be spliced);
//! 2. build each node's data, expand its chains and insert it.

use ravens_graph::{Graph, NodeId, Object, RDF_TYPE_IRI};
use ravens_template::PathIndex;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::assemble::insert;
use crate::reference::ReferenceRenderer;
use crate::resolve::{PathResolver, PathStore};
use crate::value::literal_to_json;
use crate::{CodecConfig, CodecError, DecodeWarning};

/// Lifecycle of a node within one decode run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Unvisited,
    PathResolving,
    Inserted,
    SkippedNoPath,
    Warned,
}

/// Result of a decode run: the document plus a report of what was left out.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub document: Value,
    pub warnings: Vec<DecodeWarning>,
    pub states: BTreeMap<NodeId, NodeState>,
}

impl Decoded {
    pub fn state(&self, node: &NodeId) -> NodeState {
        self.states.get(node).copied().unwrap_or(NodeState::Unvisited)
    }

    pub fn count(&self, state: NodeState) -> usize {
        self.states.values().filter(|s| **s == state).count()
    }

    /// One document per top-level key, each wrapped as `{key: value}`.
    pub fn split_roots(&self) -> Vec<(String, Value)> {
        let Some(map) = self.document.as_object() else {
            return Vec::new();
        };
        map.iter()
            .map(|(key, value)| {
                let mut root = Map::new();
                root.insert(key.clone(), value.clone());
                (key.clone(), Value::Object(root))
            })
            .collect()
    }

    pub fn root(&self, key: &str) -> Option<&Value> {
        self.document.get(key)
    }
}

struct Report {
    warnings: Vec<DecodeWarning>,
    states: BTreeMap<NodeId, NodeState>,
}

impl Report {
    fn warn(&mut self, warning: DecodeWarning) {
        tracing::warn!(%warning, "decode");
        self.warnings.push(warning);
    }

    fn set(&mut self, node: &NodeId, state: NodeState) {
        self.states.insert(node.clone(), state);
    }

    fn state(&self, node: &NodeId) -> NodeState {
        self.states.get(node).copied().unwrap_or(NodeState::Unvisited)
    }
}

fn push_value(values: &mut Vec<(String, Vec<Value>)>, key: &str, value: Value) {
    match values.iter_mut().find(|(k, _)| k == key) {
        Some((_, slot)) => slot.push(value),
        None => values.push((key.to_string(), vec![value])),
    }
}

pub struct Decoder<'a> {
    index: &'a PathIndex,
    config: &'a CodecConfig,
    prune: Vec<Regex>,
}

impl<'a> Decoder<'a> {
    pub fn new(index: &'a PathIndex, config: &'a CodecConfig) -> Result<Self, CodecError> {
        Ok(Self {
            index,
            config,
            prune: config.prune_set()?,
        })
    }

    pub fn decode(&self, graph: &Graph) -> Result<Decoded, CodecError> {
        let resolver = PathResolver::new(graph, self.index, self.config);
        let mut report = Report {
            warnings: Vec::new(),
            states: BTreeMap::new(),
        };

        let subjects: Vec<(NodeId, String)> = graph
            .typed_subjects()
            .into_iter()
            .map(|(node, ty)| (node.clone(), self.config.local(ty).to_string()))
            .collect();
        for (node, _) in &subjects {
            report.set(node, NodeState::Unvisited);
        }

        let mut store = PathStore::default();
        for (node, type_name) in &subjects {
            debug_assert_eq!(report.state(node), NodeState::Unvisited);
            report.set(node, NodeState::PathResolving);
            match resolver.find_chains(node, type_name) {
                Ok(path) => store.insert(node.clone(), path),
                Err(warning) => {
                    let state = match warning {
                        DecodeWarning::NoTemplatePath { .. } => NodeState::SkippedNoPath,
                        _ => NodeState::Warned,
                    };
                    report.warn(warning);
                    report.set(node, state);
                }
            }
        }

        let mut document = Value::Object(Map::new());
        for (node, type_name) in &subjects {
            if report.state(node) != NodeState::PathResolving {
                continue;
            }
            let data = self.node_data(graph, node, type_name, &mut report)?;
            match store.resolve(node) {
                Ok(resolved) => {
                    for path in resolved.paths() {
                        insert(&mut document, path, &data, &mut store)?;
                    }
                    report.set(node, NodeState::Inserted);
                }
                Err(warning) => {
                    report.warn(warning);
                    report.set(node, NodeState::Warned);
                }
            }
        }

        let decoded = Decoded {
            document,
            warnings: report.warnings,
            states: report.states,
        };
        tracing::debug!(
            nodes = subjects.len(),
            inserted = decoded.count(NodeState::Inserted),
            skipped = decoded.count(NodeState::SkippedNoPath),
            warned = decoded.count(NodeState::Warned),
            "decode finished"
        );
        Ok(decoded)
    }

    /// Node data: the type key, then each predicate in graph order.
    fn node_data(
        &self,
        graph: &Graph,
        node: &NodeId,
        type_name: &str,
        report: &mut Report,
    ) -> Result<Map<String, Value>, CodecError> {
        let renderer = ReferenceRenderer {
            graph,
            index: self.index,
            config: self.config,
        };
        let mut values: Vec<(String, Vec<Value>)> = Vec::new();
        let mut referenced: Vec<&NodeId> = Vec::new();

        for triple in graph.outgoing(node) {
            if triple.predicate == RDF_TYPE_IRI {
                continue;
            }
            let predicate = self.config.local(&triple.predicate);
            let value = match &triple.object {
                Object::Literal(literal) => literal_to_json(literal),
                Object::Node(target) if self.index.is_reference(predicate) => {
                    match renderer.render(node, type_name, predicate, target)? {
                        Ok(token) => {
                            referenced.push(target);
                            Value::String(token.to_string())
                        }
                        Err(warning) => {
                            report.warn(warning);
                            continue;
                        }
                    }
                }
                // Structural edge; the tree nesting already expresses it.
                Object::Node(target) if graph.declared_type(target).is_some() => continue,
                Object::Node(NodeId::Iri(iri)) if self.config.in_namespace(iri) => {
                    Value::String(self.config.local(iri).to_string())
                }
                Object::Node(_) => continue,
            };
            push_value(&mut values, predicate, value);
        }

        // Declared references the node only holds through an unlabeled edge.
        for (predicate, target_type) in self.index.references_of_parent(type_name) {
            if values.iter().any(|(k, _)| k == predicate) {
                continue;
            }
            let target = graph
                .outgoing(node)
                .filter_map(|t| t.object.as_node())
                .find(|target| {
                    !referenced.contains(target)
                        && graph
                            .declared_type(target)
                            .is_some_and(|ty| self.config.local(ty) == target_type)
                });
            let Some(target) = target else {
                continue;
            };
            match renderer.render(node, type_name, predicate, target)? {
                Ok(token) => {
                    referenced.push(target);
                    push_value(&mut values, predicate, Value::String(token.to_string()));
                }
                Err(warning) => report.warn(warning),
            }
        }

        let mut data = Map::new();
        data.insert(
            self.config.type_key.clone(),
            Value::String(type_name.to_string()),
        );
        for (key, mut slot) in values {
            if key == self.config.type_key || self.prune.iter().any(|re| re.is_match(&key)) {
                continue;
            }
            let value = if slot.len() == 1 {
                slot.remove(0)
            } else {
                Value::Array(slot)
            };
            data.insert(key, value);
        }
        Ok(data)
    }
}
