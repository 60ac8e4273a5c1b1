//! Literal <-> JSON scalar conversion.
//!
//! Decoding only promotes a literal to a JSON number or boolean when the
//! promotion is lossless: re-encoding the JSON value must give back the same
//! lexical form (boolean spellings aside). Everything else stays a string.

use ravens_graph::Literal;
use serde_json::{Number, Value};

const XSD: &str = "http://www.w3.org/2001/XMLSchema#";

fn xsd_local(datatype: &str) -> Option<&str> {
    datatype.strip_prefix(XSD)
}

fn parse_bool(lexical: &str) -> Option<bool> {
    match lexical {
        "true" | "True" => Some(true),
        "false" | "False" => Some(false),
        _ => None,
    }
}

fn parse_integer(lexical: &str) -> Option<Value> {
    let n: i64 = lexical.parse().ok()?;
    (n.to_string() == lexical).then(|| Value::from(n))
}

fn parse_float(lexical: &str) -> Option<Value> {
    let f: f64 = lexical.parse().ok()?;
    let number = Number::from_f64(f)?;
    (number.to_string() == lexical).then_some(Value::Number(number))
}

pub fn literal_to_json(literal: &Literal) -> Value {
    let lexical = literal.lexical.as_str();
    if literal.language.is_some() {
        return Value::String(literal.lexical.clone());
    }

    let promoted = match literal.datatype.as_deref().and_then(xsd_local) {
        Some("boolean") => parse_bool(lexical).map(Value::Bool),
        Some("integer" | "int" | "long" | "short" | "nonNegativeInteger" | "positiveInteger") => {
            parse_integer(lexical)
        }
        Some("double" | "float" | "decimal") => {
            parse_integer(lexical).or_else(|| parse_float(lexical))
        }
        Some(_) => None,
        None if literal.datatype.is_some() => None,
        None => parse_bool(lexical)
            .map(Value::Bool)
            .or_else(|| parse_integer(lexical))
            .or_else(|| parse_float(lexical)),
    };
    promoted.unwrap_or_else(|| Value::String(literal.lexical.clone()))
}

/// Lexical form of a JSON scalar; `None` for null and containers.
pub fn json_to_literal(value: &Value) -> Option<Literal> {
    match value {
        Value::String(s) => Some(Literal::plain(s.clone())),
        Value::Number(n) => Some(Literal::plain(n.to_string())),
        Value::Bool(b) => Some(Literal::plain(b.to_string())),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Lexical form of a scalar used as a map key or array position.
pub fn lexical(value: &Value) -> Option<String> {
    json_to_literal(value).map(|literal| literal.lexical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn typed(lexical: &str, datatype: &str) -> Literal {
        Literal {
            lexical: lexical.to_string(),
            datatype: Some(format!("{XSD}{datatype}")),
            language: None,
        }
    }

    #[test]
    fn plain_literals_promote_only_when_lossless() {
        assert_eq!(literal_to_json(&Literal::plain("12")), json!(12));
        assert_eq!(literal_to_json(&Literal::plain("12.5")), json!(12.5));
        assert_eq!(literal_to_json(&Literal::plain("True")), json!(true));
        assert_eq!(literal_to_json(&Literal::plain("false")), json!(false));
        assert_eq!(literal_to_json(&Literal::plain("007")), json!("007"));
        assert_eq!(literal_to_json(&Literal::plain("1e3")), json!("1e3"));
        assert_eq!(literal_to_json(&Literal::plain("+5")), json!("+5"));
        assert_eq!(literal_to_json(&Literal::plain("ABC")), json!("ABC"));
    }

    #[test]
    fn datatypes_steer_promotion() {
        assert_eq!(literal_to_json(&typed("1", "boolean")), json!("1"));
        assert_eq!(literal_to_json(&typed("true", "boolean")), json!(true));
        assert_eq!(literal_to_json(&typed("42", "integer")), json!(42));
        assert_eq!(literal_to_json(&typed("42", "string")), json!("42"));
        assert_eq!(literal_to_json(&typed("0.5", "double")), json!(0.5));

        let mut tagged = Literal::plain("5");
        tagged.language = Some("en".to_string());
        assert_eq!(literal_to_json(&tagged), json!("5"));
    }

    #[test]
    fn scalars_encode_to_plain_literals() {
        assert_eq!(json_to_literal(&json!(3)), Some(Literal::plain("3")));
        assert_eq!(json_to_literal(&json!(2.25)), Some(Literal::plain("2.25")));
        assert_eq!(json_to_literal(&json!(true)), Some(Literal::plain("true")));
        assert_eq!(json_to_literal(&json!(null)), None);
        assert_eq!(json_to_literal(&json!({"a": 1})), None);
    }
}
