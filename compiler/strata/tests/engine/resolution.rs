use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use strata_eval::{HieraSourceKind, Resolver};
use strata_ir::{DefinitionKind, EvalError, Value};

use crate::common::{
    assign, class, class_inherits, define, node, param, resource, var, CountingLoader, Fixture,
};

#[test]
fn test_class_body_assignment() {
    let fixture = Fixture::new();
    let loader = Arc::new(
        CountingLoader::new().with("test", &class("test", vec![], vec![assign("a", json!("hello"))])),
    );
    let ctx = fixture.context(loader);

    let test = ctx.resolve_class("test").unwrap();
    assert_eq!(test.value("a"), Some(Value::string("hello")));
    assert_eq!(test.kind(), DefinitionKind::Class);
}

#[test]
fn test_parameter_default_from_inherited_params_class() {
    let fixture = Fixture::new();
    let loader = Arc::new(
        CountingLoader::new()
            .with(
                "test::params",
                &class("test::params", vec![], vec![assign("v", json!(5))]),
            )
            .with(
                "test",
                &class_inherits(
                    "test",
                    "test::params",
                    vec![("x", param(None, Some(var("test::params::v"))))],
                    vec![],
                ),
            ),
    );
    let ctx = fixture.context(loader);

    let test = ctx.resolve_class("test").unwrap();
    assert_eq!(test.value("x"), Some(Value::Integer(5)));
    assert_eq!(test.parent(), Some("test::params"));
    assert_eq!(ctx.resolved_classes(), vec!["test", "test::params"]);
}

#[test]
fn test_resolving_twice_returns_the_cached_instance() {
    let fixture = Fixture::new();
    let loader = Arc::new(CountingLoader::new().with("test", &class("test", vec![], vec![])));
    let ctx = fixture.context(Arc::clone(&loader));

    let first = ctx.resolve_class("test").unwrap();
    let second = ctx.resolve_class("::Test").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(loader.loads(), 1);
}

#[test]
fn test_malformed_artifact_is_not_cached() {
    let fixture = Fixture::new();
    let loader = Arc::new(CountingLoader::new());
    loader.set_text("test", r#"{"^": ["class", 42]}"#);
    let ctx = fixture.context(Arc::clone(&loader));

    let err = ctx.resolve_class("test").unwrap_err();
    let EvalError::Compilation(compilation) = &err else {
        panic!("expected a compilation error, got {err:?}");
    };
    assert!(matches!(compilation.root_cause(), EvalError::Parse(_)));
    assert!(ctx.resolved_classes().is_empty());

    loader.set("test", &class("test", vec![], vec![assign("a", json!(1))]));
    let test = ctx.resolve_class("test").unwrap();
    assert_eq!(test.value("a"), Some(Value::Integer(1)));
    assert_eq!(loader.loads(), 2);
}

#[test]
fn test_missing_class_is_not_found() {
    let fixture = Fixture::new();
    let ctx = fixture.context(Arc::new(CountingLoader::new()));

    let err = ctx.resolve_class("nope").unwrap_err();
    let EvalError::Compilation(compilation) = &err else {
        panic!("expected a compilation error, got {err:?}");
    };
    assert!(matches!(
        compilation.root_cause(),
        EvalError::NotFound { kind: DefinitionKind::Class, name } if name == "nope"
    ));
}

#[test]
fn test_failing_parent_fails_child_but_not_siblings() {
    let fixture = Fixture::new();
    let loader = Arc::new(
        CountingLoader::new()
            .with("broken", &class_inherits("broken", "missing", vec![], vec![]))
            .with("fine", &class("fine", vec![], vec![assign("ok", json!(true))])),
    );
    let ctx = fixture.context(loader);

    assert!(ctx.resolve_class("broken").is_err());
    assert_eq!(
        ctx.resolve_class("fine").unwrap().value("ok"),
        Some(Value::Bool(true))
    );
}

#[test]
fn test_unknown_function_resolves_to_none() {
    let fixture = Fixture::new();
    let ctx = fixture.context(Arc::new(CountingLoader::new()));
    assert!(ctx.resolve_function("mymod::nothing").unwrap().is_none());
}

#[test]
fn test_hierarchy_overrides_class_parameter() {
    let fixture = Fixture::new();
    fixture.write_common_data("ntp::port: 4460\n");
    let loader = Arc::new(CountingLoader::new().with(
        "ntp",
        &class(
            "ntp",
            vec![
                ("port", param(Some("Integer"), Some(json!(123)))),
                ("server", param(Some("String"), Some(json!("pool")))),
            ],
            vec![],
        ),
    ));
    let ctx = fixture.context(loader);

    let ntp = ctx.resolve_class("ntp").unwrap();
    assert_eq!(ntp.value("port"), Some(Value::Integer(4460)));
    assert_eq!(ntp.override_level("port"), Some(1));
    assert_eq!(ntp.value("server"), Some(Value::string("pool")));
    assert_eq!(ntp.override_level("server"), None);
    assert_eq!(ctx.hiera_source(HieraSourceKind::Property, "ntp::port"), Some(1));
}

#[test]
fn test_defined_type_titles_take_their_own_overrides() {
    let fixture = Fixture::new();
    fixture.write_node_data(
        "resources:\n  web::vhost:\n    shop:\n      port: 8080\n",
    );
    let vhost = define(
        "web::vhost",
        vec![("port", param(Some("Integer"), Some(json!(80))))],
        vec![assign(
            "url",
            node(
                "concat",
                vec![
                    node("str", vec![var("title")]),
                    json!(":"),
                    node("str", vec![var("port")]),
                ],
            ),
        )],
    );
    let ctx = fixture.context(Arc::new(CountingLoader::new().with("web::vhost", &vhost)));

    let shop = ctx.resolve_resource("web::vhost", "shop").unwrap();
    assert_eq!(shop.value("port"), Some(Value::Integer(8080)));
    assert_eq!(shop.override_level("port"), Some(0));
    assert_eq!(shop.value("url"), Some(Value::string("shop:8080")));
    assert_eq!(shop.title(), Some("shop"));

    let blog = ctx.resolve_resource("web::vhost", "blog").unwrap();
    assert_eq!(blog.value("port"), Some(Value::Integer(80)));
    assert_eq!(blog.override_level("port"), None);
    assert!(!Arc::ptr_eq(&shop, &blog));
    assert!(Arc::ptr_eq(
        &shop,
        &ctx.resolve_resource("Web::Vhost", "shop").unwrap()
    ));
}

#[test]
fn test_dump_class_marks_public_and_reports_provenance() {
    let fixture = Fixture::new();
    fixture.write_node_data("classes: [app]\napp::port: 9000\n");
    let app = class(
        "app",
        vec![
            ("port", param(Some("Integer"), Some(json!(80)))),
            ("owner", param(Some("String"), None)),
        ],
        vec![resource("file", "/etc/app.conf", vec![("ensure", json!("present"))])],
    );
    let ctx = fixture.context(Arc::new(CountingLoader::new().with("app", &app)));
    assert_eq!(ctx.included_classes(), vec![("app".to_string(), 0)]);

    let dump = ctx.dump_class("app").unwrap();
    assert!(dump.public);
    assert!(ctx.resolve_class("app").unwrap().is_public());
    assert_eq!(dump.included_at, Some(0));

    let port = dump.property("port").unwrap();
    assert_eq!(port.value, Some(json!(9000)));
    assert_eq!(port.overridden_at, Some(0));
    assert_eq!(port.type_.as_deref(), Some("Integer"));

    let json = serde_json::to_value(&dump).unwrap();
    assert_eq!(json["name"], json!("app"));
    assert_eq!(json["kind"], json!("class"));
    assert_eq!(json["resources"][0]["type"], json!("file"));
    assert_eq!(json["resources"][0]["title"], json!("/etc/app.conf"));
    let owner = json["properties"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["name"] == json!("owner"))
        .unwrap();
    assert_eq!(owner["hints"], json!([{ "hint": "missing_value" }]));
}

#[test]
fn test_dump_shows_default_next_to_overridden_value() {
    let fixture = Fixture::new();
    fixture.write_common_data("test::x: 9\n");
    let ctx = fixture.context(Arc::new(
        CountingLoader::new().with("test", &class("test", vec![("x", param(None, Some(json!(5))))], vec![])),
    ));

    let dump = ctx.dump_class("test").unwrap();
    let x = dump.property("x").unwrap();
    assert_eq!(x.value, Some(json!(9)));
    assert_eq!(x.overridden_at, Some(1));
    assert_eq!(x.default, Some(json!(5)));

    let json = serde_json::to_value(&dump).unwrap();
    assert_eq!(json["properties"][0]["default"], json!(5));
    assert_eq!(json["properties"][0]["value"], json!(9));
}

#[test]
fn test_dump_resource_has_title() {
    let fixture = Fixture::new();
    let ctx = fixture.context(Arc::new(
        CountingLoader::new().with("site::user", &define("site::user", vec![], vec![])),
    ));
    let dump = ctx.dump_resource("site::user", "alice").unwrap();
    assert_eq!(dump.title.as_deref(), Some("alice"));
    assert!(dump.public);
}
