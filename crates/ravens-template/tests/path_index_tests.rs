use proptest::prelude::*;
use ravens_template::{PathEntry, SegmentKind, Template};
use serde_json::{json, Map, Value};
use std::io::Write;

/// `owners` containers, each holding a keyed owner type with an append array
/// of `Shared` items.
fn template(owners: usize) -> Value {
    let mut properties = Map::new();
    for i in 0..owners {
        let owner = format!("Owner{i}");
        properties.insert(
            format!("Group{i}"),
            json!({
                "type": "object",
                "$objectType": "container",
                "properties": {
                    owner: {
                        "type": "object",
                        "$objectType": "object",
                        "$primaryObjectHash": "IdentifiedObject.name",
                        "properties": {
                            "shared": {
                                "type": "array",
                                "items": {"type": "object", "$objectId": "Shared"}
                            }
                        }
                    }
                }
            }),
        );
    }
    json!({ "properties": properties })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn repeated_type_gets_one_path_per_owner(owners in 1..6usize) {
        let index = Template::from_value(&template(owners))
            .expect("template")
            .path_index()
            .expect("index");

        for i in 0..owners {
            let owner = format!("Owner{i}");
            let Some(PathEntry::Single { path }) = index.entry(&owner) else {
                panic!("{owner} should have a single path");
            };
            prop_assert_eq!(path.len(), 2);
            prop_assert_eq!(index.name_key(&owner), Some("IdentifiedObject.name"));
        }

        match index.entry("Shared").expect("Shared indexed") {
            PathEntry::Single { path } => {
                prop_assert_eq!(owners, 1);
                prop_assert_eq!(path.to_string(), "Group0 / Owner0:Owner0{IdentifiedObject.name} / shared:Shared[]");
            }
            PathEntry::ByAncestor { paths } => {
                let ancestors: Vec<String> = paths.iter().map(|(a, _)| a.clone()).collect();
                let expected: Vec<String> = (0..owners).map(|i| format!("Owner{i}")).collect();
                prop_assert_eq!(ancestors, expected);
                for (_, path) in paths {
                    let leaf = path.leaf().expect("leaf");
                    prop_assert!(
                        matches!(&leaf.kind, SegmentKind::Array { array_position: None, .. }),
                        "leaf should be an append array"
                    );
                }
            }
        }
    }
}

#[test]
fn template_loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    write!(file, "{}", template(2)).expect("write");

    let index = Template::from_path(file.path())
        .expect("template")
        .path_index()
        .expect("index");
    assert!(index.contains_type("Owner1"));
    assert!(index.entry("Shared").expect("Shared").is_ambiguous());
}

#[test]
fn malformed_template_file_is_an_error() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    write!(file, "{{\"properties\": ").expect("write");
    assert!(Template::from_path(file.path()).is_err());
}
