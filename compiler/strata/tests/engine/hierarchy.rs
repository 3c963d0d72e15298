use std::sync::Arc;

use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use serde_json::json;
use strata::EngineError;
use strata_eval::{GlobalLookup, HieraSourceKind, Resolver};
use strata_hiera::DataSource;
use strata_ir::Value;

use crate::common::{class, param, CountingLoader, Fixture};

fn read(path: &std::path::Path) -> DataSource {
    DataSource::open(path).unwrap().unwrap()
}

#[test]
fn test_higher_level_wins() {
    let fixture = Fixture::new();
    fixture.write_node_data("test::x: 1\n");
    fixture.write_common_data("test::x: 2\ntest::y: 3\n");
    let ctx = fixture.context(Arc::new(CountingLoader::new()));

    assert_eq!(ctx.get_global("test::x"), Some((Value::Integer(1), Some(0))));
    assert_eq!(ctx.get_global("::test::y"), Some((Value::Integer(3), Some(1))));
    assert_eq!(ctx.has_global("test::x"), GlobalLookup::Level(0));
    assert_eq!(ctx.get_global("test::z"), None);
    assert_eq!(ctx.has_global("test::z"), GlobalLookup::Missing);
}

#[test]
fn test_facts_are_globals_without_a_level() {
    let fixture = Fixture::new();
    let mut facts = IndexMap::new();
    facts.insert("os".to_string(), Value::string("linux"));
    let ctx = fixture.context_with_facts(Arc::new(CountingLoader::new()), facts);

    assert_eq!(ctx.get_global("os"), Some((Value::string("linux"), None)));
    assert_eq!(ctx.has_global("os"), GlobalLookup::ExistsUnknownLevel);
    let Some(Value::Hash(trusted)) = ctx.get_global_variable("trusted") else {
        panic!("trusted is not a hash");
    };
    assert_eq!(trusted.get("hostname"), Some(&Value::string("web01")));
    assert_eq!(trusted.get("domain"), Some(&Value::string("example.com")));
}

#[test]
fn test_assign_class_writes_only_the_target_level() {
    let fixture = Fixture::new();
    let ctx = fixture.context(Arc::new(CountingLoader::new()));

    ctx.assign_class("foo", 1).unwrap();
    ctx.assign_class("Foo", 1).unwrap();

    assert!(!fixture.node_file().exists());
    assert_eq!(
        read(&fixture.common_file()).get("classes"),
        Some(&Value::Array(vec![Value::string("foo")]))
    );
    assert_eq!(ctx.included_classes(), vec![("foo".to_string(), 1)]);
    assert_eq!(ctx.hiera_source(HieraSourceKind::Class, "foo"), Some(1));
}

#[test]
fn test_included_classes_keep_highest_priority_level() {
    let fixture = Fixture::new();
    fixture.write_node_data("classes: [web, base]\n");
    fixture.write_common_data("classes: [base, ntp]\n");
    let ctx = fixture.context(Arc::new(CountingLoader::new()));

    assert_eq!(
        ctx.included_classes(),
        vec![
            ("web".to_string(), 0),
            ("base".to_string(), 0),
            ("ntp".to_string(), 1),
        ]
    );
}

#[test]
fn test_remove_class() {
    let fixture = Fixture::new();
    fixture.write_common_data("classes: [base, ntp]\nntp::port: 1\n");
    let ctx = fixture.context(Arc::new(CountingLoader::new()));

    assert!(ctx.remove_class("ntp", 1).unwrap());
    assert!(!ctx.remove_class("ntp", 1).unwrap());
    assert_eq!(
        read(&fixture.common_file()).get("classes"),
        Some(&Value::Array(vec![Value::string("base")]))
    );

    assert!(ctx.remove_class("base", 1).unwrap());
    let common = read(&fixture.common_file());
    assert!(!common.contains("classes"));
    assert!(common.contains("ntp::port"));
}

#[test]
fn test_class_list_must_be_a_list() {
    let fixture = Fixture::new();
    fixture.write_common_data("classes:\n  base: true\n");
    let ctx = fixture.context(Arc::new(CountingLoader::new()));

    let err = ctx.assign_class("ntp", 1).unwrap_err();
    assert!(matches!(err, EngineError::ClassList { level: 1, .. }));
}

#[test]
fn test_assign_to_missing_level_fails() {
    let fixture = Fixture::new();
    let ctx = fixture.context(Arc::new(CountingLoader::new()));
    assert!(matches!(
        ctx.assign_class("ntp", 5).unwrap_err(),
        EngineError::Hiera(_)
    ));
}

#[test]
fn test_custom_class_list_key() {
    let fixture = Fixture::new();
    fixture.write_common_data("roles: [db]\nclasses: [ignored]\n");
    let ctx = fixture
        .context(Arc::new(CountingLoader::new()))
        .with_class_list_key("roles");
    assert_eq!(ctx.included_classes(), vec![("db".to_string(), 1)]);
}

#[test]
fn test_set_property_invalidates_the_class() {
    let fixture = Fixture::new();
    let loader = Arc::new(CountingLoader::new().with(
        "ntp",
        &class("ntp", vec![("port", param(Some("Integer"), Some(json!(123))))], vec![]),
    ));
    let ctx = fixture.context(Arc::clone(&loader));

    let before = ctx.resolve_class("ntp").unwrap();
    assert_eq!(before.value("port"), Some(Value::Integer(123)));

    ctx.set_property("ntp", "port", Value::Integer(9), 0).unwrap();
    assert_eq!(
        read(&fixture.node_file()).get("ntp::port"),
        Some(&Value::Integer(9))
    );

    let after = ctx.resolve_class("ntp").unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(after.value("port"), Some(Value::Integer(9)));
    assert_eq!(after.override_level("port"), Some(0));
    assert_eq!(loader.loads(), 2);

    assert_eq!(
        ctx.remove_property("ntp", "port", 0).unwrap(),
        Some(Value::Integer(9))
    );
    assert_eq!(
        ctx.resolve_class("ntp").unwrap().value("port"),
        Some(Value::Integer(123))
    );
}

#[test]
fn test_data_file_fact_overrides_reach_paths() {
    let fixture = Fixture::new();
    fixture.write_node_data("# role = \"db\"\nlocal: true\n");
    fixture.write_data("roles/db.yaml", "role_key: from-role\n");

    let mut hierarchy = fixture.hierarchy();
    hierarchy
        .entries
        .push(strata_hiera::HierarchyEntry::new("Role", "roles/%{role}.yaml"));
    let ctx = strata::NodeContext::new(
        crate::common::CERTNAME,
        IndexMap::new(),
        Arc::new(hierarchy),
        Arc::new(CountingLoader::new()),
    )
    .unwrap();

    assert_eq!(ctx.facts().get("role"), Some(&Value::string("db")));
    assert_eq!(
        ctx.get_global("role_key"),
        Some((Value::string("from-role"), Some(2)))
    );
}

#[test]
fn test_identity_facts_without_any_real_facts() {
    let fixture = Fixture::new();
    fixture.write_data("hosts/web01.yaml", "ntp::server: from-host\n");
    fixture.write_data(&format!("certs/{}.yaml", crate::common::CERTNAME), "ntp::port: 4460\n");

    let mut hierarchy = fixture.hierarchy();
    hierarchy
        .entries
        .push(strata_hiera::HierarchyEntry::new("Host", "hosts/%{hostname}.yaml"));
    hierarchy
        .entries
        .push(strata_hiera::HierarchyEntry::new("Cert", "certs/%{::certname}.yaml"));
    let ctx = strata::NodeContext::new(
        crate::common::CERTNAME,
        IndexMap::new(),
        Arc::new(hierarchy),
        Arc::new(CountingLoader::new()),
    )
    .unwrap();

    assert_eq!(
        ctx.get_global("ntp::server"),
        Some((Value::string("from-host"), Some(2)))
    );
    assert_eq!(ctx.get_global("ntp::port"), Some((Value::Integer(4460), Some(3))));
    assert_eq!(ctx.get_global("hostname"), Some((Value::string("web01"), None)));
    assert_eq!(
        ctx.get_global_variable("::certname"),
        Some(Value::string(crate::common::CERTNAME))
    );
    assert_eq!(ctx.get_global_variable("domain"), Some(Value::string("example.com")));
    assert_eq!(ctx.has_global("::hostname"), GlobalLookup::ExistsUnknownLevel);
    assert!(ctx.facts().is_empty());
}

#[test]
fn test_real_hostname_fact_wins_over_identity() {
    let fixture = Fixture::new();
    let mut facts = IndexMap::new();
    facts.insert("hostname".to_string(), Value::string("renamed"));
    let ctx = fixture.context_with_facts(Arc::new(CountingLoader::new()), facts);

    assert_eq!(ctx.get_global_variable("hostname"), Some(Value::string("renamed")));
    let Some(Value::Hash(trusted)) = ctx.get_global_variable("trusted") else {
        panic!("trusted is not a hash");
    };
    assert_eq!(trusted.get("hostname"), Some(&Value::string("web01")));
}

#[test]
fn test_two_nodes_writing_the_shared_level_keep_both_updates() {
    let fixture = Fixture::new();
    let hierarchy = Arc::new(fixture.hierarchy());
    let web = fixture.context(Arc::new(CountingLoader::new()));
    let db = strata::NodeContext::new(
        "db01.example.com",
        IndexMap::new(),
        Arc::clone(&hierarchy),
        Arc::new(CountingLoader::new()),
    )
    .unwrap();

    web.set_property("ntp", "servers", Value::string("x"), 1).unwrap();
    db.set_property("ssh", "port", Value::Integer(22), 1).unwrap();

    let common = read(&fixture.common_file());
    assert_eq!(common.get("ntp::servers"), Some(&Value::string("x")));
    assert_eq!(common.get("ssh::port"), Some(&Value::Integer(22)));
    assert_eq!(db.get_global("ntp::servers"), Some((Value::string("x"), Some(1))));
}
