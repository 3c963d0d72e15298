use std::sync::Arc;

use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use serde_json::json;
use strata::{EngineError, Environment, EnvironmentConfig, MemoryFacts, Workspace};
use strata_eval::Resolver;
use strata_ir::Value;

use crate::common::{assign, class, CountingLoader, Fixture, CERTNAME};

fn config(fixture: &Fixture) -> EnvironmentConfig {
    EnvironmentConfig::new("production", fixture.root())
}

#[test]
fn test_node_contexts_are_reused() {
    let fixture = Fixture::new();
    let env = Environment::open(config(&fixture)).unwrap();

    let first = env.node(CERTNAME).unwrap();
    let second = env.node(CERTNAME).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(env.node_names(), vec![CERTNAME]);

    assert!(env.close_node(CERTNAME));
    assert!(!env.close_node(CERTNAME));
    assert!(!Arc::ptr_eq(&first, &env.node(CERTNAME).unwrap()));
}

#[test]
fn test_missing_hierarchy_document_uses_default_levels() {
    let fixture = Fixture::new();
    fixture.write_node_data("who: node\n");
    fixture.write_common_data("who: common\nonly::common: 1\n");
    let env = Environment::open(config(&fixture)).unwrap();
    let node = env.node(CERTNAME).unwrap();

    assert_eq!(node.get_global("who"), Some((Value::string("node"), Some(0))));
    assert_eq!(node.get_global("only::common"), Some((Value::Integer(1), Some(1))));
}

#[test]
fn test_hierarchy_document_is_read() {
    let fixture = Fixture::new();
    std::fs::write(
        fixture.root().join("hiera.yaml"),
        "version: 5\ndefaults:\n  datadir: hieradata\nhierarchy:\n  - name: Common\n    path: common.yaml\n",
    )
    .unwrap();
    std::fs::create_dir_all(fixture.root().join("hieradata")).unwrap();
    std::fs::write(fixture.root().join("hieradata/common.yaml"), "k: v\n").unwrap();

    let env = Environment::open(config(&fixture)).unwrap();
    assert_eq!(env.hierarchy().entries.len(), 1);
    assert_eq!(
        env.node(CERTNAME).unwrap().get_global("k"),
        Some((Value::string("v"), Some(0)))
    );
}

#[test]
fn test_facts_come_from_the_provider() {
    let fixture = Fixture::new();
    let mut facts = IndexMap::new();
    facts.insert("os".to_string(), Value::string("debian"));
    let env = Environment::open(config(&fixture))
        .unwrap()
        .with_fact_provider(Arc::new(MemoryFacts::new().with_node(CERTNAME, facts)));

    let node = env.node(CERTNAME).unwrap();
    assert_eq!(node.get_global("os"), Some((Value::string("debian"), None)));
    assert!(env.node("other.example.com").unwrap().facts().is_empty());
}

#[test]
fn test_facts_file_is_read() {
    let fixture = Fixture::new();
    std::fs::create_dir_all(fixture.root().join("facts")).unwrap();
    std::fs::write(
        fixture.root().join("facts").join(format!("{CERTNAME}.json")),
        r#"{"name": "web01", "values": {"kernel": "Linux", "cpus": 4}}"#,
    )
    .unwrap();
    let env = Environment::open(config(&fixture)).unwrap();
    let node = env.node(CERTNAME).unwrap();

    assert_eq!(node.get_global("kernel"), Some((Value::string("Linux"), None)));
    assert_eq!(node.get_global("cpus"), Some((Value::Integer(4), None)));
}

#[test]
fn test_bad_facts_file_is_a_warning() {
    let fixture = Fixture::new();
    std::fs::create_dir_all(fixture.root().join("facts")).unwrap();
    std::fs::write(fixture.root().join("facts/broken.example.com.json"), "{oops").unwrap();

    let workspace = Workspace::new();
    let env = workspace.open_environment(config(&fixture)).unwrap();

    let broken = env.node("broken.example.com").unwrap();
    assert!(broken.facts().is_empty());
    assert!(env.node(CERTNAME).is_ok());

    let warnings = workspace.warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].title, "Malformed facts");
    assert!(warnings[0].message.starts_with("broken.example.com: "));
    assert!(workspace.warnings().is_empty());
}

#[test]
fn test_invalid_hierarchy_fails_open_with_warning() {
    let fixture = Fixture::new();
    std::fs::write(fixture.root().join("hiera.yaml"), "version: 4\n").unwrap();

    let workspace = Workspace::new();
    let err = workspace.open_environment(config(&fixture)).unwrap_err();
    assert_eq!(err.title, "Invalid hierarchy");
    assert_eq!(workspace.warnings(), vec![err]);
    assert!(workspace.environment_names().is_empty());
}

#[test]
fn test_workspace_lifecycle() {
    let fixture = Fixture::new();
    let workspace = Workspace::new();
    workspace.open_environment(config(&fixture)).unwrap();
    workspace
        .open_environment(EnvironmentConfig::new("staging", fixture.root()))
        .unwrap();
    assert_eq!(workspace.environment_names(), vec!["production", "staging"]);

    let production = workspace.environment("production").unwrap();
    production.warn(strata::WorkspaceError::new("Note", "kept after close"));
    assert!(workspace.close_environment("production"));
    assert!(!workspace.close_environment("production"));
    assert!(workspace.environment("production").is_none());
    assert_eq!(
        workspace.warnings(),
        vec![strata::WorkspaceError::new("Note", "kept after close")]
    );
}

#[test]
fn test_build_without_compiler_is_an_error() {
    let fixture = Fixture::new();
    let env = Environment::open(config(&fixture)).unwrap();
    let err = env.build(&|_| {}).unwrap_err();
    let EngineError::Workspace(err) = err else {
        panic!("expected a workspace error, got {err:?}");
    };
    assert_eq!(err.title, "No compiler");
}

#[test]
fn test_precompiled_artifacts_are_loaded_from_the_cache() {
    let fixture = Fixture::new();
    let artifact = fixture
        .root()
        .join(".strata/artifacts/test/manifests/init.json");
    std::fs::create_dir_all(artifact.parent().unwrap()).unwrap();
    std::fs::write(
        &artifact,
        class("test", vec![], vec![assign("a", json!("hello"))]).to_string(),
    )
    .unwrap();

    let env = Environment::open(config(&fixture)).unwrap();
    let node = env.node(CERTNAME).unwrap();
    assert_eq!(
        node.resolve_class("test").unwrap().value("a"),
        Some(Value::string("hello"))
    );
    assert!(node.resolve_class("absent").is_err());
}

#[test]
fn test_custom_loader_and_class_list_key() {
    let fixture = Fixture::new();
    fixture.write_common_data("roles: [app]\n");
    let loader = Arc::new(CountingLoader::new().with("app", &class("app", vec![], vec![])));
    let env = Environment::open(config(&fixture).with_class_list_key("roles"))
        .unwrap()
        .with_loader(loader.clone());
    let node = env.node(CERTNAME).unwrap();

    assert_eq!(node.included_classes(), vec![("app".to_string(), 1)]);
    node.resolve_class("app").unwrap();
    assert_eq!(loader.loads(), 1);
}

#[test]
fn test_reload_hierarchy_recompiles_open_nodes() {
    let fixture = Fixture::new();
    std::fs::create_dir_all(fixture.root().join("alt")).unwrap();
    std::fs::write(fixture.root().join("alt/common.yaml"), "where: alt\n").unwrap();
    fixture.write_common_data("where: data\n");

    let env = Environment::open(config(&fixture)).unwrap();
    let node = env.node(CERTNAME).unwrap();
    assert_eq!(node.get_global("where"), Some((Value::string("data"), Some(1))));

    std::fs::write(
        fixture.root().join("hiera.yaml"),
        "version: 5\ndefaults:\n  datadir: alt\nhierarchy:\n  - name: Common\n    path: common.yaml\n",
    )
    .unwrap();
    env.reload_hierarchy().unwrap();
    assert_eq!(node.get_global("where"), Some((Value::string("alt"), Some(0))));
}
