use ravens_template::TemplateError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Fatal codec failures. A run that returns one of these produces no output.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid prune pattern '{pattern}': {source}")]
    PrunePattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("shape conflict at '{path}': expected {expected}, found {found}")]
    ShapeConflict {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("reference '{predicate}' on {node} may point at any of {candidates:?}; cannot disambiguate")]
    AmbiguousReference {
        node: String,
        predicate: String,
        candidates: Vec<String>,
    },
    #[error("unresolvable reference {token}: no node is named '{name}'")]
    UnresolvableReference { token: String, name: String },
    #[error("reference {token} matches {} nodes: {candidates:?}", candidates.len())]
    AmbiguousTarget {
        token: String,
        candidates: Vec<String>,
    },
    #[error("identity {id} is used for both {first} and {second}")]
    IdentityConflict {
        id: String,
        first: String,
        second: String,
    },
    #[error("invalid document at '{path}': {reason}")]
    InvalidDocument { path: String, reason: String },
}

/// Recoverable decode conditions: the affected node is left out and the run
/// continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecodeWarning {
    /// The node's type is not reachable in the template.
    NoTemplatePath { node: String, type_name: String },
    /// None of the node's neighbors has a type the template nests it under.
    NoConnectingAncestor {
        node: String,
        type_name: String,
        ancestors: Vec<String>,
    },
    /// A keyed object lacks the predicate that keys it.
    MissingPosition {
        node: String,
        type_name: String,
        predicate: String,
    },
    /// An array position is not a positive integer.
    InvalidPosition {
        node: String,
        predicate: String,
        value: String,
    },
    /// An ancestor the node hangs under was itself dropped.
    MissingAncestorPath { node: String, ancestor: String },
    AncestorCycle { node: String },
    /// A reference target has no name to render.
    UnnamedReferenceTarget {
        node: String,
        predicate: String,
        target: String,
    },
}

impl fmt::Display for DecodeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeWarning::NoTemplatePath { node, type_name } => {
                write!(f, "{node}: type {type_name} has no template path")
            }
            DecodeWarning::NoConnectingAncestor {
                node,
                type_name,
                ancestors,
            } => write!(
                f,
                "{node}: {type_name} is not connected to any of {}",
                ancestors.join(", ")
            ),
            DecodeWarning::MissingPosition {
                node,
                type_name,
                predicate,
            } => write!(f, "{node}: {type_name} has no value for position key {predicate}"),
            DecodeWarning::InvalidPosition {
                node,
                predicate,
                value,
            } => write!(f, "{node}: {predicate} = '{value}' is not a valid array position"),
            DecodeWarning::MissingAncestorPath { node, ancestor } => {
                write!(f, "{node}: ancestor {ancestor} has no path")
            }
            DecodeWarning::AncestorCycle { node } => {
                write!(f, "{node}: ancestor chain loops back on itself")
            }
            DecodeWarning::UnnamedReferenceTarget {
                node,
                predicate,
                target,
            } => write!(f, "{node}: {predicate} points at {target}, which has no name"),
        }
    }
}
