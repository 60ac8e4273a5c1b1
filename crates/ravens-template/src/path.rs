//! Template Path Index.
//!
//! Walks the template once, in document order, and records for every domain
//! type the chain of segments from the root down to the type's occurrence.
//! Types occurring at several places get one chain per distinguishing
//! ancestor type instead of a single ambiguous chain.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use crate::segment::{ArraySegment, ObjectSegment, Segment};
use crate::{Template, TemplateError};

// ============================================================================
// Paths
// ============================================================================

/// One flattened level of a [`Path`]: the property key plus what lives there.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PathSegment {
    pub key: String,
    pub kind: SegmentKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SegmentKind {
    Container,
    Object {
        type_name: String,
        position_key: Option<String>,
    },
    Array {
        type_name: String,
        array_position: Option<String>,
    },
}

impl PathSegment {
    pub fn type_name(&self) -> Option<&str> {
        match &self.kind {
            SegmentKind::Container => None,
            SegmentKind::Object { type_name, .. } | SegmentKind::Array { type_name, .. } => {
                Some(type_name)
            }
        }
    }

    /// Identity used as a reference parent: the type name, or the key of a
    /// container.
    pub fn id(&self) -> &str {
        self.type_name().unwrap_or(&self.key)
    }

    /// Whether this level is realized by a node in the graph (and therefore
    /// worth searching for), as opposed to a purely structural key.
    pub fn is_graph_realized(&self) -> bool {
        match &self.kind {
            SegmentKind::Container => false,
            SegmentKind::Object { position_key, .. } => position_key.is_some(),
            SegmentKind::Array { .. } => true,
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SegmentKind::Container => write!(f, "{}", self.key),
            SegmentKind::Object {
                type_name,
                position_key,
            } => {
                write!(f, "{}:{type_name}", self.key)?;
                if let Some(position_key) = position_key {
                    write!(f, "{{{position_key}}}")?;
                }
                Ok(())
            }
            SegmentKind::Array {
                type_name,
                array_position,
            } => write!(
                f,
                "{}:{type_name}[{}]",
                self.key,
                array_position.as_deref().unwrap_or("")
            ),
        }
    }
}

/// Ordered chain of segments from the template root to one type occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Path {
    segments: Vec<PathSegment>,
}

impl Path {
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn leaf(&self) -> Option<&PathSegment> {
        self.segments.last()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(" / ")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

/// Index entry for one domain type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PathEntry {
    Single { path: Path },
    /// One path per distinguishing ancestor type, in template order.
    ByAncestor { paths: Vec<(String, Path)> },
}

impl PathEntry {
    pub fn paths(&self) -> Box<dyn Iterator<Item = &Path> + '_> {
        match self {
            PathEntry::Single { path } => Box::new(std::iter::once(path)),
            PathEntry::ByAncestor { paths } => Box::new(paths.iter().map(|(_, path)| path)),
        }
    }

    pub fn for_ancestor(&self, ancestor: &str) -> Option<&Path> {
        match self {
            PathEntry::Single { .. } => None,
            PathEntry::ByAncestor { paths } => paths
                .iter()
                .find(|(name, _)| name == ancestor)
                .map(|(_, path)| path),
        }
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self, PathEntry::ByAncestor { .. })
    }
}

/// A declared reference: `parent` (the enclosing type, or container key)
/// holds a pointer to a node of type `target`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ReferenceTarget {
    pub parent: String,
    pub target: String,
}

// ============================================================================
// Index
// ============================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct PathIndex {
    entries: BTreeMap<String, PathEntry>,
    references: BTreeMap<String, BTreeSet<ReferenceTarget>>,
}

impl PathIndex {
    pub fn build(template: &Template) -> Result<Self, TemplateError> {
        let mut walker = Walker::default();
        walker.walk(&template.segments, &mut Vec::new())?;
        walker.finish()
    }

    pub fn entry(&self, type_name: &str) -> Option<&PathEntry> {
        self.entries.get(type_name)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &PathEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn contains_type(&self, type_name: &str) -> bool {
        self.entries.contains_key(type_name)
    }

    /// Predicate supplying the name of a node of `type_name`: the position key
    /// of the first keyed-object occurrence of the type.
    pub fn name_key(&self, type_name: &str) -> Option<&str> {
        self.entries.get(type_name)?.paths().find_map(|path| {
            match &path.leaf()?.kind {
                SegmentKind::Object {
                    position_key: Some(key),
                    ..
                } => Some(key.as_str()),
                _ => None,
            }
        })
    }

    pub fn references(&self, predicate: &str) -> Option<&BTreeSet<ReferenceTarget>> {
        self.references.get(predicate)
    }

    pub fn is_reference(&self, predicate: &str) -> bool {
        self.references.contains_key(predicate)
    }

    /// All `(predicate, target type)` references declared for `parent`.
    pub fn references_of_parent<'a>(
        &'a self,
        parent: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.references.iter().flat_map(move |(predicate, targets)| {
            targets
                .iter()
                .filter(move |t| t.parent == parent)
                .map(move |t| (predicate.as_str(), t.target.as_str()))
        })
    }

    /// Target types a `predicate` may point at when declared under `parent`.
    pub fn expected_targets(&self, predicate: &str, parent: &str) -> Vec<&str> {
        self.references
            .get(predicate)
            .into_iter()
            .flatten()
            .filter(|t| t.parent == parent)
            .map(|t| t.target.as_str())
            .collect()
    }
}

#[derive(Default)]
struct Walker {
    occurrences: Vec<(String, Path)>,
    references: BTreeMap<String, BTreeSet<ReferenceTarget>>,
    embedded: HashSet<(String, String)>,
    referenced: Vec<(String, String)>,
}

impl Walker {
    fn walk(&mut self, segments: &[Segment], current: &mut Vec<PathSegment>) -> Result<(), TemplateError> {
        for segment in segments {
            match segment {
                Segment::Container { key, children } => {
                    current.push(PathSegment {
                        key: key.clone(),
                        kind: SegmentKind::Container,
                    });
                    self.walk(children, current)?;
                    current.pop();
                }
                Segment::Object(object) => self.visit_object(object, current)?,
                Segment::Array(array) => self.visit_array(array, current)?,
                Segment::OneOf { variants, .. } => self.walk(variants, current)?,
                Segment::Reference(reference) => {
                    let parent = current
                        .last()
                        .ok_or_else(|| TemplateError::ReferenceAtRoot {
                            predicate: reference.predicate.clone(),
                        })?
                        .id()
                        .to_string();
                    let targets = self.references.entry(reference.predicate.clone()).or_default();
                    for target in &reference.targets {
                        targets.insert(ReferenceTarget {
                            parent: parent.clone(),
                            target: target.clone(),
                        });
                    }
                    self.referenced.push((parent, reference.predicate.clone()));
                }
            }
        }
        Ok(())
    }

    fn record(&mut self, type_name: &str, key: &str, kind: SegmentKind, current: &mut Vec<PathSegment>) {
        let parent = current.last().map(|s| s.id().to_string()).unwrap_or_default();
        self.embedded.insert((parent, key.to_string()));
        current.push(PathSegment {
            key: key.to_string(),
            kind,
        });
        self.occurrences
            .push((type_name.to_string(), Path::new(current.clone())));
    }

    fn visit_object(&mut self, object: &ObjectSegment, current: &mut Vec<PathSegment>) -> Result<(), TemplateError> {
        let kind = SegmentKind::Object {
            type_name: object.type_name.clone(),
            position_key: object.position_key.clone(),
        };
        self.record(&object.type_name, &object.key, kind, current);
        self.walk(&object.children, current)?;
        current.pop();
        Ok(())
    }

    fn visit_array(&mut self, array: &ArraySegment, current: &mut Vec<PathSegment>) -> Result<(), TemplateError> {
        let kind = SegmentKind::Array {
            type_name: array.type_name.clone(),
            array_position: array.array_position.clone(),
        };
        self.record(&array.type_name, &array.key, kind, current);
        self.walk(&array.children, current)?;
        current.pop();
        Ok(())
    }

    fn finish(self) -> Result<PathIndex, TemplateError> {
        if let Some((parent, key)) = self
            .referenced
            .iter()
            .find(|pair| self.embedded.contains(*pair))
        {
            return Err(TemplateError::ReferenceObjectConflict {
                parent: parent.clone(),
                key: key.clone(),
            });
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for (type_name, _) in &self.occurrences {
            *counts.entry(type_name.as_str()).or_default() += 1;
        }

        let mut entries = BTreeMap::new();
        for (type_name, path) in &self.occurrences {
            if entries.contains_key(type_name) {
                continue;
            }
            if counts[type_name.as_str()] == 1 {
                entries.insert(type_name.clone(), PathEntry::Single { path: path.clone() });
                continue;
            }

            let mut paths: Vec<(String, Path)> = Vec::new();
            for (_, occurrence) in self.occurrences.iter().filter(|(t, _)| t == type_name) {
                let ancestor = occurrence
                    .segments()
                    .iter()
                    .rev()
                    .filter_map(PathSegment::type_name)
                    .find(|a| *a != type_name && !paths.iter().any(|(seen, _)| seen == a));
                match ancestor {
                    Some(ancestor) => paths.push((ancestor.to_string(), occurrence.clone())),
                    None => tracing::warn!(
                        type_name = %type_name,
                        path = %occurrence,
                        "template occurrence has no distinguishing ancestor; ignoring it"
                    ),
                }
            }
            entries.insert(type_name.clone(), PathEntry::ByAncestor { paths });
        }

        for targets in self.references.values() {
            for target in targets {
                if !entries.contains_key(&target.target) {
                    tracing::warn!(
                        target = %target.target,
                        parent = %target.parent,
                        "reference target type has no template path"
                    );
                }
            }
        }

        Ok(PathIndex {
            entries,
            references: self.references,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn index(value: serde_json::Value) -> PathIndex {
        Template::from_value(&value)
            .expect("template")
            .path_index()
            .expect("index")
    }

    fn sample() -> PathIndex {
        index(json!({
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
                                "Widget.Feeder": {
                                    "type": "string",
                                    "$objectType": "reference",
                                    "$referencePath": "#/$defs/Feeder"
                                }
                            }
                        },
                        "Panel": {
                            "type": "object",
                            "$objectType": "object",
                            "$primaryObjectHash": "IdentifiedObject.name",
                            "properties": {
                                "motors": {
                                    "type": "array",
                                    "items": {"type": "object", "$objectId": "Motor"}
                                }
                            }
                        },
                        "Cabinet": {
                            "type": "object",
                            "$objectType": "object",
                            "$primaryObjectHash": "IdentifiedObject.name",
                            "properties": {
                                "motors": {
                                    "type": "array",
                                    "items": {"type": "object", "$objectId": "Motor"}
                                }
                            }
                        }
                    }
                },
                "Feeders": {
                    "type": "object",
                    "$objectType": "container",
                    "properties": {
                        "Feeder": {
                            "type": "object",
                            "$objectType": "object",
                            "$primaryObjectHash": "IdentifiedObject.name"
                        }
                    }
                }
            }
        }))
    }

    #[test]
    fn single_occurrence_records_full_chain() {
        let index = sample();
        let Some(PathEntry::Single { path }) = index.entry("Part") else {
            panic!("Part should have a single path");
        };
        let keys: Vec<&str> = path.segments().iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["Assets", "Widget", "parts"]);
        assert!(matches!(
            &path.leaf().expect("leaf").kind,
            SegmentKind::Array { type_name, array_position: None } if type_name == "Part"
        ));
    }

    #[test]
    fn repeated_type_is_indexed_by_ancestor() {
        let index = sample();
        let entry = index.entry("Motor").expect("Motor entry");
        assert!(entry.is_ambiguous());
        let panel = entry.for_ancestor("Panel").expect("panel path");
        let cabinet = entry.for_ancestor("Cabinet").expect("cabinet path");
        assert_eq!(panel.segments()[1].key, "Panel");
        assert_eq!(cabinet.segments()[1].key, "Cabinet");
    }

    #[test]
    fn references_are_registered_with_parent() {
        let index = sample();
        let targets = index.references("Widget.Feeder").expect("reference");
        assert_eq!(
            targets.iter().collect::<Vec<_>>(),
            vec![&ReferenceTarget {
                parent: "Widget".to_string(),
                target: "Feeder".to_string()
            }]
        );
        assert_eq!(index.expected_targets("Widget.Feeder", "Widget"), vec!["Feeder"]);
        assert!(index.expected_targets("Widget.Feeder", "Panel").is_empty());
        assert_eq!(
            index.references_of_parent("Widget").collect::<Vec<_>>(),
            vec![("Widget.Feeder", "Feeder")]
        );
    }

    #[test]
    fn name_key_comes_from_keyed_object_leaf() {
        let index = sample();
        assert_eq!(index.name_key("Feeder"), Some("IdentifiedObject.name"));
        assert_eq!(index.name_key("Part"), None);
        assert_eq!(index.name_key("Unknown"), None);
    }

    #[test]
    fn display_is_readable() {
        let index = sample();
        let Some(PathEntry::Single { path }) = index.entry("Widget") else {
            panic!("Widget path");
        };
        assert_eq!(
            path.to_string(),
            "Assets / Widget:Widget{IdentifiedObject.name}"
        );
    }

    #[test]
    fn reference_and_object_under_same_parent_is_rejected() {
        let err = Template::from_value(&json!({
            "properties": {
                "Left": {
                    "type": "object",
                    "$objectType": "object",
                    "$objectId": "Holder",
                    "properties": {
                        "thing": {"type": "object", "$objectType": "object", "$objectId": "Thing"}
                    }
                },
                "Right": {
                    "type": "object",
                    "$objectType": "object",
                    "$objectId": "Holder",
                    "properties": {
                        "thing": {
                            "type": "string",
                            "$objectType": "reference",
                            "$referencePath": "#/$defs/Thing"
                        }
                    }
                }
            }
        }))
        .expect("template")
        .path_index()
        .unwrap_err();

        assert!(matches!(
            err,
            TemplateError::ReferenceObjectConflict { parent, key } if parent == "Holder" && key == "thing"
        ));
    }

    #[test]
    fn reference_at_root_is_rejected() {
        let err = Template::from_value(&json!({
            "properties": {
                "Loose": {
                    "type": "string",
                    "$objectType": "reference",
                    "$referencePath": "#/$defs/Thing"
                }
            }
        }))
        .expect("template")
        .path_index()
        .unwrap_err();
        assert!(matches!(err, TemplateError::ReferenceAtRoot { .. }));
    }

    #[test]
    fn first_occurrence_under_an_ancestor_wins() {
        let index = index(json!({
            "properties": {
                "Holder": {
                    "type": "object",
                    "$objectType": "object",
                    "properties": {
                        "first": {
                            "type": "object",
                            "$objectType": "container",
                            "properties": {
                                "Leaf": {"type": "object", "$objectType": "object"}
                            }
                        },
                        "second": {
                            "type": "object",
                            "$objectType": "container",
                            "properties": {
                                "Leaf": {"type": "object", "$objectType": "object"}
                            }
                        }
                    }
                }
            }
        }));

        let entry = index.entry("Leaf").expect("leaf");
        let paths: Vec<&Path> = entry.paths().collect();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].segments()[1].key, "first");
    }
}
