//! RDF boundary: load a [`Graph`] from common serializations and write it
//! back out as N-Triples.
//!
//! Parsing goes through **Sophia**:
//! - N-Triples (`.nt`)
//! - Turtle (`.ttl`)
//! - RDF/XML (`.rdf`, `.owl`, `.xml`)
//!
//! Output is always N-Triples, one triple per line in graph insertion order.

use crate::{Graph, Literal, NodeId, Object, Triple};
use anyhow::{anyhow, Result};
use sophia::api::source::TripleSource;
use sophia::api::term::{Term, TermKind};
use sophia::api::triple::Triple as _;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdfFormat {
    NTriples,
    Turtle,
    RdfXml,
}

impl RdfFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();
        match ext.as_str() {
            "nt" | "ntriples" => Ok(RdfFormat::NTriples),
            "ttl" | "turtle" => Ok(RdfFormat::Turtle),
            "rdf" | "owl" | "xml" => Ok(RdfFormat::RdfXml),
            other => Err(anyhow!("unsupported RDF format: .{other}")),
        }
    }

    fn label(self) -> &'static str {
        match self {
            RdfFormat::NTriples => "N-Triples",
            RdfFormat::Turtle => "Turtle",
            RdfFormat::RdfXml => "RDF/XML",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
struct GraphSinkError {
    message: String,
}

impl GraphSinkError {
    fn unexpected<T: Term>(position: &str, term: T) -> Self {
        Self {
            message: format!("unsupported {position} term of kind {:?}", term.kind()),
        }
    }
}

// ============================================================================
// Reading
// ============================================================================

pub fn read_graph_file(path: &Path) -> Result<Graph> {
    let format = RdfFormat::from_path(path)?;
    let bytes = std::fs::read(path)?;
    read_graph(&bytes, format)
}

pub fn read_graph(bytes: &[u8], format: RdfFormat) -> Result<Graph> {
    let reader = std::io::BufReader::new(std::io::Cursor::new(bytes));
    match format {
        RdfFormat::NTriples => collect(sophia::turtle::parser::nt::parse_bufread(reader), format),
        RdfFormat::Turtle => {
            collect(sophia::turtle::parser::turtle::parse_bufread(reader), format)
        }
        RdfFormat::RdfXml => collect(sophia::xml::parser::parse_bufread(reader), format),
    }
}

fn collect<S: TripleSource>(mut source: S, format: RdfFormat) -> Result<Graph> {
    let mut graph = Graph::new();
    source
        .try_for_each_triple(|t| -> std::result::Result<(), GraphSinkError> {
            let subject = node_of(t.s()).ok_or_else(|| GraphSinkError::unexpected("subject", t.s()))?;
            let Some(NodeId::Iri(predicate)) = node_of(t.p()) else {
                return Ok(());
            };
            let object = object_of(t.o()).ok_or_else(|| GraphSinkError::unexpected("object", t.o()))?;
            graph.insert(Triple::new(subject, predicate, object));
            Ok(())
        })
        .map_err(|e| anyhow!("failed to parse {}: {e}", format.label()))?;
    Ok(graph)
}

fn node_of<T: Term>(term: T) -> Option<NodeId> {
    match term.kind() {
        TermKind::Iri => term.iri().map(|iri| NodeId::iri(iri.as_str())),
        TermKind::BlankNode => term.bnode_id().map(|id| NodeId::blank(id.as_str())),
        _ => None,
    }
}

fn object_of<T: Term>(term: T) -> Option<Object> {
    if term.kind() != TermKind::Literal {
        return node_of(term).map(Object::Node);
    }
    let mut literal = Literal::plain(term.lexical_form()?.to_string());
    match term.language_tag() {
        Some(tag) => literal.language = Some(tag.as_str().to_string()),
        // Plain literals surface as xsd:string in RDF 1.1.
        None => {
            literal.datatype = term
                .datatype()
                .map(|dt| dt.as_str().to_string())
                .filter(|dt| dt != XSD_STRING);
        }
    }
    Some(Object::Literal(literal))
}

const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

// ============================================================================
// Writing
// ============================================================================

fn escape_rdf_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

fn format_object(object: &Object) -> String {
    match object {
        Object::Node(node) => node.to_string(),
        Object::Literal(literal) => {
            let lexical = escape_rdf_string(&literal.lexical);
            match (&literal.language, &literal.datatype) {
                (Some(lang), _) => format!("\"{lexical}\"@{lang}"),
                (None, Some(dt)) => format!("\"{lexical}\"^^<{dt}>"),
                (None, None) => format!("\"{lexical}\""),
            }
        }
    }
}

pub fn write_ntriples<W: Write>(graph: &Graph, mut out: W) -> std::io::Result<()> {
    for triple in graph.iter() {
        writeln!(
            out,
            "{} <{}> {} .",
            triple.subject,
            triple.predicate,
            format_object(&triple.object)
        )?;
    }
    out.flush()
}

pub fn to_ntriples_string(graph: &Graph) -> String {
    let mut buf = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = write_ntriples(graph, &mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

pub fn write_graph_file(graph: &Graph, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_ntriples(graph, std::io::BufWriter::new(file))?;
    Ok(())
}
