//! RAVENS graph model.
//!
//! A small in-memory triple store sized for distribution models (thousands to
//! low tens of thousands of nodes):
//!
//! - triples keep insertion order, so every traversal is deterministic;
//! - set semantics: inserting an existing triple is a no-op;
//! - subject and object adjacency indexes answer "edges out of" and
//!   "edges into" a node without scanning;
//! - `rdf:type` declares each subject's domain type.
//!
//! RDF parsing/serialization lives in [`rdf`].

pub mod rdf;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub const RDF_TYPE_IRI: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

/// Local part of an IRI: whatever follows the last `#` or `/`.
pub fn local_name(iri: &str) -> &str {
    iri.rsplit(['#', '/']).next().unwrap_or(iri)
}

// ============================================================================
// Terms
// ============================================================================

/// Identity of a graph node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeId {
    Iri(String),
    Blank(String),
}

impl NodeId {
    pub fn iri(iri: impl Into<String>) -> Self {
        NodeId::Iri(iri.into())
    }

    pub fn blank(label: impl Into<String>) -> Self {
        NodeId::Blank(label.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            NodeId::Iri(s) | NodeId::Blank(s) => s,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Iri(iri) => write!(f, "<{iri}>"),
            NodeId::Blank(label) => write!(f, "_:{label}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Literal {
    pub lexical: String,
    pub datatype: Option<String>,
    pub language: Option<String>,
}

impl Literal {
    pub fn plain(lexical: impl Into<String>) -> Self {
        Self {
            lexical: lexical.into(),
            datatype: None,
            language: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Object {
    Node(NodeId),
    Literal(Literal),
}

impl Object {
    pub fn as_node(&self) -> Option<&NodeId> {
        match self {
            Object::Node(node) => Some(node),
            Object::Literal(_) => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Object::Literal(literal) => Some(literal),
            Object::Node(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Triple {
    pub subject: NodeId,
    pub predicate: String,
    pub object: Object,
}

impl Triple {
    pub fn new(subject: NodeId, predicate: impl Into<String>, object: Object) -> Self {
        Self {
            subject,
            predicate: predicate.into(),
            object,
        }
    }

    pub fn literal(subject: NodeId, predicate: impl Into<String>, lexical: impl Into<String>) -> Self {
        Self::new(subject, predicate, Object::Literal(Literal::plain(lexical)))
    }

    pub fn link(subject: NodeId, predicate: impl Into<String>, target: NodeId) -> Self {
        Self::new(subject, predicate, Object::Node(target))
    }
}

// ============================================================================
// Graph
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Graph {
    /// Insertion-ordered storage; removed triples leave a `None` slot.
    slots: Vec<Option<Triple>>,
    slot_of: HashMap<Triple, usize>,
    by_subject: HashMap<NodeId, Vec<usize>>,
    by_object: HashMap<NodeId, Vec<usize>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slot_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slot_of.is_empty()
    }

    pub fn contains(&self, triple: &Triple) -> bool {
        self.slot_of.contains_key(triple)
    }

    /// Insert a triple; returns `false` when it was already present.
    pub fn insert(&mut self, triple: Triple) -> bool {
        if self.slot_of.contains_key(&triple) {
            return false;
        }
        let slot = self.slots.len();
        self.by_subject
            .entry(triple.subject.clone())
            .or_default()
            .push(slot);
        if let Object::Node(target) = &triple.object {
            self.by_object.entry(target.clone()).or_default().push(slot);
        }
        self.slot_of.insert(triple.clone(), slot);
        self.slots.push(Some(triple));
        true
    }

    pub fn remove(&mut self, triple: &Triple) -> bool {
        let Some(slot) = self.slot_of.remove(triple) else {
            return false;
        };
        self.slots[slot] = None;
        if let Some(slots) = self.by_subject.get_mut(&triple.subject) {
            slots.retain(|s| *s != slot);
        }
        if let Object::Node(target) = &triple.object {
            if let Some(slots) = self.by_object.get_mut(target) {
                slots.retain(|s| *s != slot);
            }
        }
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &Triple> {
        self.slots.iter().flatten()
    }

    fn resolve<'a>(&'a self, slots: Option<&'a Vec<usize>>) -> impl Iterator<Item = &'a Triple> + 'a {
        slots
            .into_iter()
            .flatten()
            .filter_map(move |slot| self.slots[*slot].as_ref())
    }

    /// Triples whose subject is `node`, in insertion order.
    pub fn outgoing<'a>(&'a self, node: &NodeId) -> impl Iterator<Item = &'a Triple> + 'a {
        self.resolve(self.by_subject.get(node))
    }

    /// Triples whose object is `node`, in insertion order.
    pub fn incoming<'a>(&'a self, node: &NodeId) -> impl Iterator<Item = &'a Triple> + 'a {
        self.resolve(self.by_object.get(node))
    }

    pub fn values<'a>(&'a self, node: &NodeId, predicate: &'a str) -> impl Iterator<Item = &'a Object> + 'a {
        self.outgoing(node)
            .filter(move |t| t.predicate == predicate)
            .map(|t| &t.object)
    }

    /// First value of `predicate` on `node`.
    pub fn value<'a>(&'a self, node: &NodeId, predicate: &'a str) -> Option<&'a Object> {
        self.values(node, predicate).next()
    }

    /// IRI of the node's first `rdf:type`.
    pub fn declared_type(&self, node: &NodeId) -> Option<&str> {
        self.values(node, RDF_TYPE_IRI)
            .find_map(Object::as_node)
            .map(NodeId::as_str)
    }

    /// Every subject with an `rdf:type`, in order of its first type triple.
    pub fn typed_subjects(&self) -> Vec<(&NodeId, &str)> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for triple in self.iter() {
            if triple.predicate != RDF_TYPE_IRI {
                continue;
            }
            if let Object::Node(ty) = &triple.object {
                if seen.insert(&triple.subject) {
                    out.push((&triple.subject, ty.as_str()));
                }
            }
        }
        out
    }

    /// Nodes linked to `node` by any non-type edge: targets of outgoing edges
    /// first, then sources of incoming edges. May contain repeats.
    pub fn neighbors<'a>(&'a self, node: &NodeId) -> impl Iterator<Item = &'a NodeId> + 'a {
        let out = self
            .outgoing(node)
            .filter(|t| t.predicate != RDF_TYPE_IRI)
            .filter_map(|t| t.object.as_node());
        let into = self
            .incoming(node)
            .filter(|t| t.predicate != RDF_TYPE_IRI)
            .map(|t| &t.subject);
        out.chain(into)
    }

    /// Subjects carrying the literal `lexical` under `predicate`.
    pub fn subjects_with_literal<'a>(&'a self, predicate: &'a str, lexical: &'a str) -> impl Iterator<Item = &'a NodeId> + 'a {
        self.iter()
            .filter(move |t| {
                t.predicate == predicate
                    && matches!(&t.object, Object::Literal(l) if l.lexical == lexical)
            })
            .map(|t| &t.subject)
    }
}

impl Extend<Triple> for Graph {
    fn extend<I: IntoIterator<Item = Triple>>(&mut self, iter: I) {
        for triple in iter {
            self.insert(triple);
        }
    }
}

impl FromIterator<Triple> for Graph {
    fn from_iter<I: IntoIterator<Item = Triple>>(iter: I) -> Self {
        let mut graph = Graph::new();
        graph.extend(iter);
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(s: &str) -> NodeId {
        NodeId::iri(format!("urn:uuid:{s}"))
    }

    fn ty(s: &str) -> Object {
        Object::Node(NodeId::iri(format!("http://example.org/cim#{s}")))
    }

    #[test]
    fn insert_is_idempotent_and_remove_unlinks() {
        let mut graph = Graph::new();
        let t = Triple::link(n("a"), "p", n("b"));
        assert!(graph.insert(t.clone()));
        assert!(!graph.insert(t.clone()));
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.incoming(&n("b")).count(), 1);

        assert!(graph.remove(&t));
        assert!(!graph.remove(&t));
        assert!(graph.is_empty());
        assert_eq!(graph.incoming(&n("b")).count(), 0);
        assert_eq!(graph.outgoing(&n("a")).count(), 0);
    }

    #[test]
    fn typed_subjects_follow_first_type_triple() {
        let graph: Graph = vec![
            Triple::new(n("b"), RDF_TYPE_IRI, ty("Part")),
            Triple::new(n("a"), RDF_TYPE_IRI, ty("Widget")),
            Triple::new(n("b"), RDF_TYPE_IRI, ty("Other")),
        ]
        .into_iter()
        .collect();

        let subjects: Vec<(String, &str)> = graph
            .typed_subjects()
            .into_iter()
            .map(|(s, t)| (s.as_str().to_string(), local_name(t)))
            .collect();
        assert_eq!(
            subjects,
            vec![
                ("urn:uuid:b".to_string(), "Part"),
                ("urn:uuid:a".to_string(), "Widget")
            ]
        );
        assert_eq!(graph.declared_type(&n("b")).map(local_name), Some("Part"));
    }

    #[test]
    fn neighbors_cover_both_directions_without_types() {
        let graph: Graph = vec![
            Triple::new(n("a"), RDF_TYPE_IRI, ty("Widget")),
            Triple::link(n("a"), "has", n("b")),
            Triple::link(n("c"), "uses", n("a")),
            Triple::literal(n("a"), "name", "A"),
        ]
        .into_iter()
        .collect();

        let neighbors: Vec<&str> = graph.neighbors(&n("a")).map(NodeId::as_str).collect();
        assert_eq!(neighbors, vec!["urn:uuid:b", "urn:uuid:c"]);
    }

    #[test]
    fn literal_lookup_by_predicate() {
        let graph: Graph = vec![
            Triple::literal(n("a"), "name", "F1"),
            Triple::literal(n("b"), "name", "F2"),
            Triple::literal(n("c"), "label", "F1"),
        ]
        .into_iter()
        .collect();

        let hits: Vec<&NodeId> = graph.subjects_with_literal("name", "F1").collect();
        assert_eq!(hits, vec![&n("a")]);
        assert!(matches!(
            graph.value(&n("b"), "name"),
            Some(Object::Literal(l)) if l.lexical == "F2"
        ));
    }

    #[test]
    fn local_name_splits_on_hash_and_slash() {
        assert_eq!(local_name("http://iec.ch/TC57/CIM100#ACLineSegment"), "ACLineSegment");
        assert_eq!(local_name("http://example.org/a/b"), "b");
        assert_eq!(local_name("urn:uuid:1234"), "urn:uuid:1234");
    }
}
