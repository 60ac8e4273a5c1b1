//! Codec configuration.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::CodecError;

pub const DEFAULT_NAMESPACE: &str = "http://iec.ch/TC57/CIM100#";

/// Names and IRIs the codec needs beyond the template itself.
///
/// Every field has a default, so a partial JSON file only overrides what it
/// mentions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Namespace of predicate and type IRIs.
    pub namespace: String,
    /// Document key carrying a node's domain type.
    pub type_key: String,
    /// Predicate naming a node, used when the template gives no position key.
    pub name_predicate: String,
    /// Predicate carrying an explicit node identifier.
    pub id_predicate: String,
    /// Prefix turning a bare identifier into an IRI.
    pub id_prefix: String,
    /// Drop bookkeeping predicates from decoded node data.
    pub prune_unnecessary: bool,
    /// Full-match patterns for the predicates dropped by `prune_unnecessary`.
    pub prune_patterns: Vec<String>,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            type_key: "Ravens.CimObjectType".to_string(),
            name_predicate: "IdentifiedObject.name".to_string(),
            id_predicate: "IdentifiedObject.mRID".to_string(),
            id_prefix: "urn:uuid:".to_string(),
            prune_unnecessary: false,
            prune_patterns: vec![
                "IdentifiedObject.name".to_string(),
                "IdentifiedObject.mRID".to_string(),
                r"(.+)\.sequenceNumber".to_string(),
            ],
        }
    }
}

impl CodecConfig {
    pub fn from_path(path: &Path) -> Result<Self, CodecError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Full IRI for a local predicate or type name.
    pub fn iri(&self, local: &str) -> String {
        format!("{}{local}", self.namespace)
    }

    /// Local name of an IRI: the part after the namespace, or after the last
    /// `#`/`/` for foreign IRIs.
    pub fn local<'a>(&self, iri: &'a str) -> &'a str {
        iri.strip_prefix(self.namespace.as_str())
            .unwrap_or_else(|| ravens_graph::local_name(iri))
    }

    pub fn in_namespace(&self, iri: &str) -> bool {
        iri.starts_with(self.namespace.as_str())
    }

    /// Compiled prune patterns; empty unless pruning is enabled.
    pub fn prune_set(&self) -> Result<Vec<Regex>, CodecError> {
        if !self.prune_unnecessary {
            return Ok(Vec::new());
        }
        self.prune_patterns
            .iter()
            .map(|pattern| {
                Regex::new(&format!("^(?:{pattern})$")).map_err(|source| CodecError::PrunePattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect()
    }
}
