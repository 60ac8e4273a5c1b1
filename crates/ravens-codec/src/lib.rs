//! RAVENS graph <-> tree codec.
//!
//! - **Decode** places every typed graph node at the document location its
//!   template path describes, resolving ancestor levels through the node's
//!   edges ([`resolve`]) and assembling the nested document ([`assemble`]).
//! - **Encode** flattens a typed document back into triples, assigning
//!   identities and turning `Type::'Name'` tokens into edges ([`reference`]).
//!
//! Both directions read the template only through a [`PathIndex`] built once
//! per run.

pub mod assemble;
pub mod config;
pub mod decode;
pub mod encode;
pub mod error;
pub mod reference;
pub mod resolve;
pub mod value;

use ravens_graph::Graph;
use ravens_template::PathIndex;
use serde_json::Value;

pub use config::CodecConfig;
pub use decode::{Decoded, Decoder, NodeState};
pub use encode::Encoder;
pub use error::{CodecError, DecodeWarning};
pub use reference::ReferenceToken;

/// Decode `graph` into a document shaped by `index`.
pub fn decode(graph: &Graph, index: &PathIndex, config: &CodecConfig) -> Result<Decoded, CodecError> {
    Decoder::new(index, config)?.decode(graph)
}

/// Encode a typed document into a graph. With an index, reference names are
/// looked up through the template's position keys.
pub fn encode(document: &Value, index: Option<&PathIndex>, config: &CodecConfig) -> Result<Graph, CodecError> {
    let encoder = Encoder::new(config);
    match index {
        Some(index) => encoder.with_index(index).encode(document),
        None => encoder.encode(document),
    }
}
