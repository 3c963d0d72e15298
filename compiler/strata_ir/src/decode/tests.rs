use super::*;
use pretty_assertions::assert_eq;
use serde_json::json;

fn decode(json: Json) -> Expr {
    decode_expr(&json).unwrap()
}

#[test]
fn test_scalars_decode_to_literals() {
    assert!(matches!(decode(json!(1)).kind, ExprKind::Literal(Value::Integer(1))));
    assert!(matches!(decode(json!(null)).kind, ExprKind::Literal(Value::Undef)));
    match decode(json!("abc")).kind {
        ExprKind::Literal(Value::String(s)) => assert_eq!(s, "abc"),
        other => panic!("expected literal, got {other:?}"),
    }
}

#[test]
fn test_ids_are_unique_within_one_decode() {
    let expr = decode(json!({"^": ["+", 1, {"^": ["*", 2, 3]}]}));
    let ExprKind::Binary { left, right, .. } = &expr.kind else {
        panic!("expected binary");
    };
    let ExprKind::Binary {
        left: l2,
        right: r2,
        ..
    } = &right.kind
    else {
        panic!("expected nested binary");
    };
    let mut ids = vec![expr.id(), left.id(), right.id(), l2.id(), r2.id()];
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 5);
}

#[test]
fn test_minus_is_unary_with_one_argument() {
    match decode(json!({"^": ["-", 5]})).kind {
        ExprKind::Unary { op, .. } => assert_eq!(op, UnaryOp::Neg),
        other => panic!("expected unary, got {other:?}"),
    }
    match decode(json!({"^": ["-", 5, 2]})).kind {
        ExprKind::Binary { op, .. } => assert_eq!(op, BinaryOp::Sub),
        other => panic!("expected binary, got {other:?}"),
    }
}

#[test]
fn test_hash_map_literal_keys() {
    match decode(json!({"#": ["a", 1, "b", 2]})).kind {
        ExprKind::Hash(entries) => {
            assert_eq!(entries.len(), 2);
            assert!(matches!(
                &entries[0].0.kind,
                ExprKind::Literal(Value::String(k)) if k == "a"
            ));
        }
        other => panic!("expected hash, got {other:?}"),
    }
}

#[test]
fn test_hash_with_entries() {
    let expr = decode(json!({"^": ["hash", {"^": ["=>", "k", "v"]}]}));
    assert!(matches!(expr.kind, ExprKind::Hash(ref e) if e.len() == 1));
}

#[test]
fn test_call_with_functor() {
    let expr = decode(json!({"^": ["call", {"#": [
        "functor", {"^": ["qn", "notice"]},
        "args", ["hi"]
    ]}]}));
    match expr.kind {
        ExprKind::Call { name, args } => {
            assert_eq!(name, "notice");
            assert_eq!(args.len(), 1);
        }
        other => panic!("expected call, got {other:?}"),
    }
}

#[test]
fn test_unless_is_negated_if() {
    let expr = decode(json!({"^": ["unless", {"#": ["test", true, "then", [1]]}]}));
    match expr.kind {
        ExprKind::If {
            negated,
            then_branch,
            else_branch,
            ..
        } => {
            assert!(negated);
            assert_eq!(then_branch.len(), 1);
            assert!(else_branch.is_empty());
        }
        other => panic!("expected if, got {other:?}"),
    }
}

#[test]
fn test_case_and_selector() {
    let case = decode(json!({"^": ["case", {"^": ["$", "x"]}, [
        {"#": ["when", ["a", {"^": ["default"]}], "then", [1]]}
    ]]}));
    match case.kind {
        ExprKind::Case { options, .. } => {
            assert_eq!(options.len(), 1);
            assert_eq!(options[0].values.len(), 2);
        }
        other => panic!("expected case, got {other:?}"),
    }

    let selector = decode(json!({"^": ["?", {"^": ["$", "x"]}, [
        {"^": ["=>", "a", 1]},
        {"^": ["=>", {"^": ["default"]}, 2]}
    ]]}));
    assert!(matches!(selector.kind, ExprKind::Selector { ref entries, .. } if entries.len() == 2));
}

#[test]
fn test_resource_declaration() {
    let expr = decode(json!({"^": ["resource", {"#": [
        "type", "file",
        "bodies", [{"#": [
            "title", "/tmp/x",
            "ops", [{"^": ["=>", "ensure", "present"]}]
        ]}]
    ]}]}));
    match expr.kind {
        ExprKind::Resource(decl) => {
            assert_eq!(decl.bodies.len(), 1);
            assert_eq!(decl.bodies[0].operations[0].name, "ensure");
        }
        other => panic!("expected resource, got {other:?}"),
    }
}

#[test]
fn test_unknown_tag_is_unsupported() {
    match decode(json!({"^": ["lambda", 1, 2]})).kind {
        ExprKind::Unsupported { tag, args } => {
            assert_eq!(tag, "lambda");
            assert_eq!(args.len(), 2);
        }
        other => panic!("expected unsupported, got {other:?}"),
    }
}

#[test]
fn test_malformed_known_tag_is_parse_error() {
    let err = decode_expr(&json!({"^": ["=", 1]})).unwrap_err();
    assert!(matches!(err, ParseError::Malformed { ref tag, .. } if tag == "="));

    let err = decode_expr(&json!({"^": ["$"]})).unwrap_err();
    assert!(matches!(err, ParseError::Malformed { .. }));

    let err = decode_expr(&json!({"^": [7]})).unwrap_err();
    assert!(matches!(err, ParseError::Shape { .. }));
}

#[test]
fn test_artifact_with_single_class() {
    let text = json!({"^": ["class", {"#": [
        "name", "apache",
        "params", {"#": [
            "port", {"#": ["type", {"^": ["qr", "Integer"]}, "value", 80]},
            "docroot", {"#": []}
        ]},
        "body", [{"^": ["=", {"^": ["$", "x"]}, 1]}]
    ]}]})
    .to_string();

    let artifact = decode_artifact(&text).unwrap();
    let class = artifact.find(DefinitionKind::Class, "Apache").unwrap();
    assert_eq!(class.name, "apache");
    assert_eq!(class.params.len(), 2);
    assert!(class.param("port").unwrap().default.is_some());
    assert!(class.param("docroot").unwrap().default.is_none());
    assert_eq!(class.body.len(), 1);
    assert!(artifact.find(DefinitionKind::Function, "apache").is_none());
}

#[test]
fn test_artifact_block_collects_definitions() {
    let text = json!({"^": ["block",
        {"^": ["define", {"#": ["name", "apache::vhost"]}]},
        {"^": ["function", {"#": ["name", "apache::port", "body", [80]]}]},
        {"^": ["class", {"#": ["name", "apache::mod", "parent", "apache"]}]}
    ]})
    .to_string();

    let artifact = decode_artifact(&text).unwrap();
    assert_eq!(artifact.definitions().len(), 3);
    let class = artifact.find(DefinitionKind::Class, "::apache::mod").unwrap();
    assert_eq!(class.parent.as_deref(), Some("apache"));
    assert!(artifact.find(DefinitionKind::DefinedType, "apache::vhost").is_some());
}

#[test]
fn test_artifact_errors() {
    assert!(matches!(decode_artifact("{not json"), Err(ParseError::Json(_))));

    let nameless = json!({"^": ["class", {"#": ["body", []]}]}).to_string();
    assert_eq!(
        decode_artifact(&nameless).unwrap_err(),
        ParseError::MissingName {
            kind: DefinitionKind::Class
        }
    );
}
