//! Reference Encoder/Decoder.
//!
//! In a document, a pointer to another node is written as a token
//! `Type::'Name'`. Decode renders reference edges into tokens; encode turns
//! tokens back into edges once the whole graph exists.

use ravens_graph::{Graph, NodeId, Object, Triple};
use ravens_template::PathIndex;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use crate::{CodecConfig, CodecError, DecodeWarning};

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\w+)::'(.+)'$").expect("static token pattern"))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferenceToken {
    pub type_name: String,
    pub name: String,
}

impl ReferenceToken {
    pub fn new(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            name: name.into(),
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        let captures = token_pattern().captures(text)?;
        Some(Self::new(&captures[1], &captures[2]))
    }
}

impl fmt::Display for ReferenceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::'{}'", self.type_name, self.name)
    }
}

/// Predicate holding the name of a node of `type_name`.
fn name_predicate<'a>(index: Option<&'a PathIndex>, config: &'a CodecConfig, type_name: &str) -> &'a str {
    index
        .and_then(|index| index.name_key(type_name))
        .unwrap_or(config.name_predicate.as_str())
}

fn node_type<'g>(graph: &'g Graph, config: &CodecConfig, node: &NodeId) -> Option<&'g str> {
    graph.declared_type(node).map(|iri| config.local(iri))
}

// ============================================================================
// Decode: edge -> token
// ============================================================================

pub(crate) struct ReferenceRenderer<'a> {
    pub graph: &'a Graph,
    pub index: &'a PathIndex,
    pub config: &'a CodecConfig,
}

impl ReferenceRenderer<'_> {
    /// Template type a reference edge points at, narrowed by the declaring
    /// parent type and then by the target's own type.
    fn target_type(
        &self,
        node: &NodeId,
        parent: &str,
        predicate: &str,
        target: &NodeId,
    ) -> Result<String, CodecError> {
        let declared = self.index.references(predicate).into_iter().flatten();
        let all: BTreeSet<&str> = declared.clone().map(|t| t.target.as_str()).collect();
        if let [only] = all.iter().collect::<Vec<_>>().as_slice() {
            return Ok(only.to_string());
        }

        let mut candidates: BTreeSet<&str> = declared
            .filter(|t| t.parent == parent)
            .map(|t| t.target.as_str())
            .collect();
        if candidates.is_empty() {
            candidates = all;
        }
        if candidates.len() > 1 {
            if let Some(actual) = node_type(self.graph, self.config, target) {
                if candidates.contains(actual) {
                    candidates = BTreeSet::from([actual]);
                }
            }
        }

        match candidates.iter().collect::<Vec<_>>().as_slice() {
            [only] => Ok(only.to_string()),
            _ => Err(CodecError::AmbiguousReference {
                node: node.to_string(),
                predicate: predicate.to_string(),
                candidates: candidates.into_iter().map(str::to_string).collect(),
            }),
        }
    }

    /// Render the edge `node -predicate-> target` as a token. A target with no
    /// name yields a warning and no token.
    pub fn render(
        &self,
        node: &NodeId,
        parent: &str,
        predicate: &str,
        target: &NodeId,
    ) -> Result<Result<ReferenceToken, DecodeWarning>, CodecError> {
        let type_name = self.target_type(node, parent, predicate, target)?;
        let name_key = self.config.iri(name_predicate(Some(self.index), self.config, &type_name));
        let name = self
            .graph
            .value(target, &name_key)
            .and_then(Object::as_literal)
            .map(|literal| literal.lexical.clone());

        Ok(match name {
            Some(name) => Ok(ReferenceToken::new(type_name, name)),
            None => Err(DecodeWarning::UnnamedReferenceTarget {
                node: node.to_string(),
                predicate: predicate.to_string(),
                target: target.to_string(),
            }),
        })
    }
}

// ============================================================================
// Encode: token -> edge
// ============================================================================

/// Replace every `Type::'Name'` literal in `graph` with an edge to the node
/// of that type and name.
///
/// All replacements are computed before the graph is touched, so on error
/// the graph is unchanged. Returns the number of references resolved.
pub fn resolve_references(
    graph: &mut Graph,
    index: Option<&PathIndex>,
    config: &CodecConfig,
) -> Result<usize, CodecError> {
    let mut replacements: Vec<(Triple, Triple)> = Vec::new();

    for triple in graph.iter() {
        let Object::Literal(literal) = &triple.object else {
            continue;
        };
        let Some(token) = ReferenceToken::parse(&literal.lexical) else {
            continue;
        };

        let name_key = config.iri(name_predicate(index, config, &token.type_name));
        let mut candidates: Vec<&NodeId> = Vec::new();
        for subject in graph.subjects_with_literal(&name_key, &token.name) {
            if !candidates.contains(&subject) {
                candidates.push(subject);
            }
        }

        // Only nodes of the token's type, or a type the template allows
        // for this predicate, can be the target.
        let predicate = config.local(&triple.predicate);
        let parent = node_type(graph, config, &triple.subject).unwrap_or("");
        let expected = index
            .map(|index| index.expected_targets(predicate, parent))
            .unwrap_or_default();
        candidates.retain(|candidate| {
            node_type(graph, config, candidate)
                .is_some_and(|ty| ty == token.type_name || expected.contains(&ty))
        });

        let target = match candidates.as_slice() {
            [target] => (*target).clone(),
            [] => {
                return Err(CodecError::UnresolvableReference {
                    token: token.to_string(),
                    name: token.name.clone(),
                })
            }
            many => {
                return Err(CodecError::AmbiguousTarget {
                    token: token.to_string(),
                    candidates: many.iter().map(|n| n.to_string()).collect(),
                })
            }
        };

        let edge = Triple::link(triple.subject.clone(), triple.predicate.clone(), target);
        replacements.push((triple.clone(), edge));
    }

    let count = replacements.len();
    for (literal, edge) in replacements {
        graph.remove(&literal);
        graph.insert(edge);
    }
    tracing::debug!(count, "resolved reference tokens");
    Ok(count)
}
