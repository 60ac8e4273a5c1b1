//! Graph Path Resolver.
//!
//! Realizes a type's abstract template [`Path`] for one concrete node. The
//! walk goes leaf to root; at each ancestor level that a graph node stands
//! for (keyed objects and arrays), the node's neighborhood is searched for
//! nodes of that type. The first level with matches ends the walk: each match
//! becomes a splice point ([`ChainItem::Ancestor`]) for the ancestor's own
//! path, and several matches fork parallel chains. Levels with no match are
//! satisfied by the node itself.
//!
//! Chains are stored per node in a [`PathStore`] and expanded into concrete
//! [`ResolvedPath`]s only when the node is inserted, so append ordinals
//! assigned by earlier insertions are already visible.

use ravens_graph::{Graph, NodeId, Object};
use ravens_template::{Path, PathEntry, PathIndex, PathSegment, SegmentKind};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

use crate::{CodecConfig, DecodeWarning};

/// Largest explicit array position accepted from the graph; larger values
/// would make the assembler pad the array with that many empty elements.
pub const MAX_ARRAY_POSITION: usize = 1 << 20;

// ============================================================================
// Steps and chains
// ============================================================================

/// What a key creates when it is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Object,
    Array,
}

impl Shape {
    pub fn empty(self) -> Value {
        match self {
            Shape::Object => Value::Object(Map::new()),
            Shape::Array => Value::Array(Vec::new()),
        }
    }

    pub fn matches(self, value: &Value) -> bool {
        match self {
            Shape::Object => value.is_object(),
            Shape::Array => value.is_array(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Shape::Object => "object",
            Shape::Array => "array",
        }
    }
}

/// One concrete position in the document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Step {
    /// Map key; the value under it is created with `shape` when absent.
    Key { key: String, shape: Shape },
    /// 1-based array element.
    Index(usize),
    /// New array element; its ordinal is assigned on insertion.
    Append,
}

impl Step {
    pub fn key(key: impl Into<String>, shape: Shape) -> Self {
        Step::Key {
            key: key.into(),
            shape,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Key { key, .. } => f.write_str(key),
            Step::Index(n) => write!(f, "[{n}]"),
            Step::Append => f.write_str("[+]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChainItem {
    Step(Step),
    /// Splice in the full path of this ancestor node.
    Ancestor(NodeId),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Chain {
    pub items: Vec<ChainItem>,
}

/// A node's stored chains: one, or several after an ancestor fork.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodePath {
    Single(Chain),
    Multi(Vec<Chain>),
}

impl NodePath {
    fn from_chains(mut chains: Vec<Chain>) -> Self {
        if chains.len() == 1 {
            NodePath::Single(chains.remove(0))
        } else {
            NodePath::Multi(chains)
        }
    }

    pub fn chains(&self) -> &[Chain] {
        match self {
            NodePath::Single(chain) => std::slice::from_ref(chain),
            NodePath::Multi(chains) => chains,
        }
    }

    fn chains_mut(&mut self) -> &mut [Chain] {
        match self {
            NodePath::Single(chain) => std::slice::from_mut(chain),
            NodePath::Multi(chains) => chains,
        }
    }
}

/// Where a resolved step came from, so an append ordinal can be written back.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    pub owner: NodeId,
    pub chain: usize,
    pub item: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStep {
    pub step: Step,
    pub origin: Origin,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPath {
    pub steps: Vec<ResolvedStep>,
}

impl fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, resolved) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{}", resolved.step)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Single(ResolvedPath),
    Multi(Vec<ResolvedPath>),
}

impl Resolved {
    pub fn paths(&self) -> &[ResolvedPath] {
        match self {
            Resolved::Single(path) => std::slice::from_ref(path),
            Resolved::Multi(paths) => paths,
        }
    }
}

// ============================================================================
// Path store
// ============================================================================

/// Per-run chains of every resolvable node.
#[derive(Debug, Clone, Default)]
pub struct PathStore {
    paths: HashMap<NodeId, NodePath>,
}

impl PathStore {
    pub fn insert(&mut self, node: NodeId, path: NodePath) {
        self.paths.insert(node, path);
    }

    pub fn get(&self, node: &NodeId) -> Option<&NodePath> {
        self.paths.get(node)
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.paths.contains_key(node)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Current step at `origin`; reflects ordinals already written back.
    pub fn step(&self, origin: &Origin) -> Option<&Step> {
        match self.paths.get(&origin.owner)?.chains().get(origin.chain)?.items.get(origin.item)? {
            ChainItem::Step(step) => Some(step),
            ChainItem::Ancestor(_) => None,
        }
    }

    /// Record the ordinal an append at `origin` received.
    pub fn assign(&mut self, origin: &Origin, ordinal: usize) {
        let item = self
            .paths
            .get_mut(&origin.owner)
            .and_then(|path| path.chains_mut().get_mut(origin.chain))
            .and_then(|chain| chain.items.get_mut(origin.item));
        if let Some(ChainItem::Step(step @ Step::Append)) = item {
            *step = Step::Index(ordinal);
        }
    }

    /// Expand a node's chains into concrete paths by splicing in ancestor
    /// paths. A node without chains resolves to nothing.
    pub fn resolve(&self, node: &NodeId) -> Result<Resolved, DecodeWarning> {
        if !self.contains(node) {
            return Ok(Resolved::Multi(Vec::new()));
        }
        let mut paths = self.expand(node, &mut Vec::new())?;
        Ok(if paths.len() == 1 {
            Resolved::Single(paths.remove(0))
        } else {
            Resolved::Multi(paths)
        })
    }

    fn expand(&self, node: &NodeId, visiting: &mut Vec<NodeId>) -> Result<Vec<ResolvedPath>, DecodeWarning> {
        let Some(node_path) = self.paths.get(node) else {
            return Ok(Vec::new());
        };
        visiting.push(node.clone());

        let mut out = Vec::new();
        for (chain_ix, chain) in node_path.chains().iter().enumerate() {
            let mut partials: Vec<Vec<ResolvedStep>> = vec![Vec::new()];
            for (item_ix, item) in chain.items.iter().enumerate() {
                match item {
                    ChainItem::Step(step) => {
                        let origin = Origin {
                            owner: node.clone(),
                            chain: chain_ix,
                            item: item_ix,
                        };
                        for partial in &mut partials {
                            partial.push(ResolvedStep {
                                step: step.clone(),
                                origin: origin.clone(),
                            });
                        }
                    }
                    ChainItem::Ancestor(ancestor) => {
                        if visiting.contains(ancestor) {
                            return Err(DecodeWarning::AncestorCycle {
                                node: node.to_string(),
                            });
                        }
                        if !self.contains(ancestor) {
                            return Err(DecodeWarning::MissingAncestorPath {
                                node: node.to_string(),
                                ancestor: ancestor.to_string(),
                            });
                        }
                        let prefixes = self.expand(ancestor, visiting)?;
                        partials = partials
                            .into_iter()
                            .flat_map(|partial| {
                                prefixes.iter().map(move |prefix| {
                                    let mut steps = partial.clone();
                                    steps.extend(prefix.steps.iter().cloned());
                                    steps
                                })
                            })
                            .collect();
                    }
                }
            }
            out.extend(partials.into_iter().map(|steps| ResolvedPath { steps }));
        }

        visiting.pop();
        Ok(out)
    }
}

// ============================================================================
// Resolver
// ============================================================================

pub struct PathResolver<'a> {
    graph: &'a Graph,
    index: &'a PathIndex,
    config: &'a CodecConfig,
}

impl<'a> PathResolver<'a> {
    pub fn new(graph: &'a Graph, index: &'a PathIndex, config: &'a CodecConfig) -> Self {
        Self {
            graph,
            index,
            config,
        }
    }

    /// Local name of the node's declared type.
    pub fn node_type(&self, node: &NodeId) -> Option<&'a str> {
        let graph: &'a Graph = self.graph;
        graph.declared_type(node).map(|iri| self.config.local(iri))
    }

    /// Position value of `predicate` on `node`: a literal's lexical form, or
    /// the local name of an IRI.
    fn position_value(&self, node: &NodeId, predicate: &str) -> Option<String> {
        match self.graph.value(node, &self.config.iri(predicate))? {
            Object::Literal(literal) => Some(literal.lexical.clone()),
            Object::Node(target) => Some(self.config.local(target.as_str()).to_string()),
        }
    }

    fn neighbors_of_type(&self, node: &NodeId, type_name: &str) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = Vec::new();
        for neighbor in self.graph.neighbors(node) {
            if neighbor == node || out.contains(neighbor) {
                continue;
            }
            if self.node_type(neighbor) == Some(type_name) {
                out.push(neighbor.clone());
            }
        }
        out
    }

    /// Compute the chains placing `node` (of `type_name`) in the document.
    pub fn find_chains(&self, node: &NodeId, type_name: &str) -> Result<NodePath, DecodeWarning> {
        let entry = self
            .index
            .entry(type_name)
            .ok_or_else(|| DecodeWarning::NoTemplatePath {
                node: node.to_string(),
                type_name: type_name.to_string(),
            })?;

        let mut chains: Vec<Chain> = Vec::new();
        match entry {
            PathEntry::Single { path } => chains = self.chains_along(node, type_name, path)?,
            PathEntry::ByAncestor { paths } => {
                let mut connected: Vec<(&str, &Path)> = Vec::new();
                for neighbor in self.graph.neighbors(node) {
                    let Some(neighbor_type) = self.node_type(neighbor) else {
                        continue;
                    };
                    if connected.iter().any(|(seen, _)| *seen == neighbor_type) {
                        continue;
                    }
                    if let Some(path) = entry.for_ancestor(neighbor_type) {
                        connected.push((neighbor_type, path));
                    }
                }
                if connected.is_empty() {
                    return Err(DecodeWarning::NoConnectingAncestor {
                        node: node.to_string(),
                        type_name: type_name.to_string(),
                        ancestors: paths.iter().map(|(ancestor, _)| ancestor.clone()).collect(),
                    });
                }
                for (_, path) in connected {
                    for chain in self.chains_along(node, type_name, path)? {
                        if !chains.contains(&chain) {
                            chains.push(chain);
                        }
                    }
                }
            }
        }

        Ok(NodePath::from_chains(chains))
    }

    fn chains_along(&self, node: &NodeId, type_name: &str, path: &Path) -> Result<Vec<Chain>, DecodeWarning> {
        let segments = path.segments();
        // Built leaf-first, reversed at the end.
        let mut tail: Vec<ChainItem> = Vec::new();

        for (depth, segment) in segments.iter().enumerate().rev() {
            let is_leaf = depth + 1 == segments.len();
            if !is_leaf && segment.is_graph_realized() {
                if let Some(ancestor_type) = segment.type_name().filter(|t| *t != type_name) {
                    let matches = self.neighbors_of_type(node, ancestor_type);
                    if !matches.is_empty() {
                        return Ok(matches
                            .into_iter()
                            .map(|ancestor| {
                                let mut items = vec![ChainItem::Ancestor(ancestor)];
                                items.extend(tail.iter().rev().cloned());
                                Chain { items }
                            })
                            .collect());
                    }
                }
            }
            for step in self.own_steps(node, type_name, segment)?.into_iter().rev() {
                tail.push(ChainItem::Step(step));
            }
        }

        tail.reverse();
        Ok(vec![Chain { items: tail }])
    }

    /// Steps for a level the node satisfies itself.
    fn own_steps(&self, node: &NodeId, type_name: &str, segment: &PathSegment) -> Result<Vec<Step>, DecodeWarning> {
        let key = segment.key.as_str();
        match &segment.kind {
            SegmentKind::Container
            | SegmentKind::Object {
                position_key: None, ..
            } => Ok(vec![Step::key(key, Shape::Object)]),
            SegmentKind::Object {
                position_key: Some(predicate),
                ..
            } => {
                let value = self.position_value(node, predicate).ok_or_else(|| {
                    DecodeWarning::MissingPosition {
                        node: node.to_string(),
                        type_name: type_name.to_string(),
                        predicate: predicate.clone(),
                    }
                })?;
                Ok(vec![Step::key(key, Shape::Object), Step::key(value, Shape::Object)])
            }
            SegmentKind::Array { array_position, .. } => {
                let position = match array_position {
                    None => Step::Append,
                    Some(predicate) => match self.position_value(node, predicate) {
                        None => Step::Append,
                        Some(value) => match value.parse::<usize>() {
                            Ok(n) if (1..=MAX_ARRAY_POSITION).contains(&n) => Step::Index(n),
                            _ => {
                                return Err(DecodeWarning::InvalidPosition {
                                    node: node.to_string(),
                                    predicate: predicate.clone(),
                                    value,
                                })
                            }
                        },
                    },
                };
                Ok(vec![Step::key(key, Shape::Array), position])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ravens_graph::{Triple, RDF_TYPE_IRI};
    use ravens_template::Template;
    use serde_json::json;

    fn index() -> PathIndex {
        Template::from_value(&json!({
            "properties": {
                "Assets": {
                    "type": "object",
                    "$objectType": "container",
                    "properties": {
                        "Widget": {
                            "type": "object",
                            "$objectType": "object",
                            "$primaryObjectHash": "IdentifiedObject.name",
                            "properties": {
                                "parts": {
                                    "type": "array",
                                    "items": {"type": "object", "$objectId": "Part"}
                                },
                                "terminals": {
                                    "type": "array",
                                    "$arrayPosition": "Terminal.sequenceNumber",
                                    "items": {"type": "object", "$objectId": "Terminal"}
                                }
                            }
                        }
                    }
                }
            }
        }))
        .expect("template")
        .path_index()
        .expect("index")
    }

    struct Fixture {
        graph: Graph,
        config: CodecConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                graph: Graph::new(),
                config: CodecConfig::default(),
            }
        }

        fn node(&mut self, id: &str, ty: &str) -> NodeId {
            let node = NodeId::iri(format!("urn:uuid:{id}"));
            self.graph.insert(Triple::link(
                node.clone(),
                RDF_TYPE_IRI,
                NodeId::iri(self.config.iri(ty)),
            ));
            node
        }

        fn literal(&mut self, node: &NodeId, predicate: &str, value: &str) {
            self.graph
                .insert(Triple::literal(node.clone(), self.config.iri(predicate), value));
        }

        fn link(&mut self, from: &NodeId, predicate: &str, to: &NodeId) {
            self.graph
                .insert(Triple::link(from.clone(), self.config.iri(predicate), to.clone()));
        }
    }

    fn keys(path: &ResolvedPath) -> String {
        path.to_string()
    }

    #[test]
    fn keyed_object_resolves_to_its_name() {
        let index = index();
        let mut fx = Fixture::new();
        let w = fx.node("w", "Widget");
        fx.literal(&w, "IdentifiedObject.name", "W1");

        let resolver = PathResolver::new(&fx.graph, &index, &fx.config);
        let mut store = PathStore::default();
        store.insert(w.clone(), resolver.find_chains(&w, "Widget").expect("chains"));

        let Resolved::Single(path) = store.resolve(&w).expect("resolve") else {
            panic!("expected a single path");
        };
        assert_eq!(keys(&path), "Assets/Widget/W1");
    }

    #[test]
    fn missing_position_key_is_a_warning() {
        let index = index();
        let mut fx = Fixture::new();
        let w = fx.node("w", "Widget");

        let resolver = PathResolver::new(&fx.graph, &index, &fx.config);
        let err = resolver.find_chains(&w, "Widget").unwrap_err();
        assert!(matches!(err, DecodeWarning::MissingPosition { predicate, .. } if predicate == "IdentifiedObject.name"));
    }

    #[test]
    fn array_item_splices_ancestor_path() {
        let index = index();
        let mut fx = Fixture::new();
        let w = fx.node("w", "Widget");
        fx.literal(&w, "IdentifiedObject.name", "W1");
        let p = fx.node("p", "Part");
        fx.link(&p, "Part.Widget", &w);
        let t = fx.node("t", "Terminal");
        fx.literal(&t, "Terminal.sequenceNumber", "2");
        fx.link(&w, "Widget.Terminals", &t);

        let resolver = PathResolver::new(&fx.graph, &index, &fx.config);
        let mut store = PathStore::default();
        for (node, ty) in [(&w, "Widget"), (&p, "Part"), (&t, "Terminal")] {
            store.insert(node.clone(), resolver.find_chains(node, ty).expect("chains"));
        }

        let part = store.resolve(&p).expect("part");
        assert_eq!(keys(&part.paths()[0]), "Assets/Widget/W1/parts/[+]");
        let terminal = store.resolve(&t).expect("terminal");
        assert_eq!(keys(&terminal.paths()[0]), "Assets/Widget/W1/terminals/[2]");
    }

    #[test]
    fn several_ancestors_fork_chains() {
        let index = index();
        let mut fx = Fixture::new();
        let w1 = fx.node("w1", "Widget");
        fx.literal(&w1, "IdentifiedObject.name", "W1");
        let w2 = fx.node("w2", "Widget");
        fx.literal(&w2, "IdentifiedObject.name", "W2");
        let p = fx.node("p", "Part");
        fx.link(&w1, "Widget.Parts", &p);
        fx.link(&p, "Part.Widget", &w2);
        fx.link(&p, "Part.Widget", &w1);

        let resolver = PathResolver::new(&fx.graph, &index, &fx.config);
        let chains = resolver.find_chains(&p, "Part").expect("chains");
        let NodePath::Multi(chains) = chains else {
            panic!("expected a fork");
        };
        let ancestors: Vec<&ChainItem> = chains.iter().map(|c| &c.items[0]).collect();
        assert_eq!(
            ancestors,
            vec![&ChainItem::Ancestor(w2.clone()), &ChainItem::Ancestor(w1.clone())]
        );
    }

    #[test]
    fn append_ordinal_is_written_back() {
        let index = index();
        let mut fx = Fixture::new();
        let w = fx.node("w", "Widget");
        fx.literal(&w, "IdentifiedObject.name", "W1");
        let p = fx.node("p", "Part");
        fx.link(&p, "Part.Widget", &w);

        let resolver = PathResolver::new(&fx.graph, &index, &fx.config);
        let mut store = PathStore::default();
        store.insert(w.clone(), resolver.find_chains(&w, "Widget").expect("chains"));
        store.insert(p.clone(), resolver.find_chains(&p, "Part").expect("chains"));

        let resolved = store.resolve(&p).expect("resolve");
        let append = resolved.paths()[0]
            .steps
            .iter()
            .find(|s| s.step == Step::Append)
            .expect("append step")
            .origin
            .clone();
        store.assign(&append, 3);
        assert_eq!(store.step(&append), Some(&Step::Index(3)));
        // Only appends are rewritten.
        store.assign(&append, 5);
        assert_eq!(store.step(&append), Some(&Step::Index(3)));
    }

    #[test]
    fn invalid_array_position_is_a_warning() {
        let index = index();
        let mut fx = Fixture::new();
        let t = fx.node("t", "Terminal");
        fx.literal(&t, "Terminal.sequenceNumber", "first");

        let resolver = PathResolver::new(&fx.graph, &index, &fx.config);
        assert!(matches!(
            resolver.find_chains(&t, "Terminal"),
            Err(DecodeWarning::InvalidPosition { value, .. }) if value == "first"
        ));
    }

    #[test]
    fn oversized_array_position_is_a_warning() {
        let index = index();
        let mut fx = Fixture::new();
        let t = fx.node("t", "Terminal");
        fx.literal(&t, "Terminal.sequenceNumber", "4000000000");

        let resolver = PathResolver::new(&fx.graph, &index, &fx.config);
        assert!(matches!(
            resolver.find_chains(&t, "Terminal"),
            Err(DecodeWarning::InvalidPosition { value, .. }) if value == "4000000000"
        ));

        let limit = MAX_ARRAY_POSITION.to_string();
        fx.graph.remove(&Triple::literal(
            t.clone(),
            fx.config.iri("Terminal.sequenceNumber"),
            "4000000000",
        ));
        fx.literal(&t, "Terminal.sequenceNumber", &limit);
        let resolver = PathResolver::new(&fx.graph, &index, &fx.config);
        assert!(resolver.find_chains(&t, "Terminal").is_ok());
    }

    #[test]
    fn cycles_and_missing_ancestors_are_reported() {
        let a = NodeId::iri("urn:uuid:a");
        let b = NodeId::iri("urn:uuid:b");
        let c = NodeId::iri("urn:uuid:c");
        let mut store = PathStore::default();
        store.insert(
            a.clone(),
            NodePath::Single(Chain {
                items: vec![ChainItem::Ancestor(b.clone())],
            }),
        );
        store.insert(
            b.clone(),
            NodePath::Single(Chain {
                items: vec![ChainItem::Ancestor(a.clone())],
            }),
        );
        store.insert(
            c.clone(),
            NodePath::Single(Chain {
                items: vec![ChainItem::Ancestor(NodeId::iri("urn:uuid:gone"))],
            }),
        );

        assert!(matches!(store.resolve(&a), Err(DecodeWarning::AncestorCycle { .. })));
        assert!(matches!(
            store.resolve(&c),
            Err(DecodeWarning::MissingAncestorPath { ancestor, .. }) if ancestor == "<urn:uuid:gone>"
        ));
    }
}
