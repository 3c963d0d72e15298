use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use strata_eval::Resolver;
use strata_ir::Value;

use crate::common::{assign, class, class_inherits, CountingLoader, Fixture};

fn family() -> CountingLoader {
    CountingLoader::new()
        .with("base", &class("base", vec![], vec![assign("v", json!(1))]))
        .with("child", &class_inherits("child", "base", vec![], vec![]))
        .with("other", &class("other", vec![], vec![]))
}

#[test]
fn test_invalidating_child_evicts_parent() {
    let fixture = Fixture::new();
    let loader = Arc::new(family());
    let ctx = fixture.context(Arc::clone(&loader));

    let child = ctx.resolve_class("child").unwrap();
    ctx.resolve_class("other").unwrap();
    assert_eq!(loader.loads(), 3);

    ctx.invalidate_class("child");
    assert_eq!(ctx.resolved_classes(), vec!["other"]);

    let again = ctx.resolve_class("child").unwrap();
    assert!(!Arc::ptr_eq(&child, &again));
    assert_eq!(loader.loads(), 5);
}

#[test]
fn test_invalidating_parent_keeps_child() {
    let fixture = Fixture::new();
    let ctx = fixture.context(Arc::new(family()));

    ctx.resolve_class("child").unwrap();
    ctx.invalidate_class("base");
    assert_eq!(ctx.resolved_classes(), vec!["child"]);
}

#[test]
fn test_invalidate_unknown_class_is_a_no_op() {
    let fixture = Fixture::new();
    let ctx = fixture.context(Arc::new(family()));
    ctx.resolve_class("other").unwrap();
    ctx.invalidate_class("never-loaded");
    assert_eq!(ctx.resolved_classes(), vec!["other"]);
}

#[test]
fn test_invalidate_resource() {
    let fixture = Fixture::new();
    let loader = Arc::new(
        CountingLoader::new().with("site::user", &crate::common::define("site::user", vec![], vec![])),
    );
    let ctx = fixture.context(Arc::clone(&loader));

    let alice = ctx.resolve_resource("site::user", "alice").unwrap();
    ctx.invalidate_resource("site::user", "alice");
    let again = ctx.resolve_resource("site::user", "alice").unwrap();
    assert!(!Arc::ptr_eq(&alice, &again));
    assert_eq!(loader.loads(), 2);
}

#[test]
fn test_invalidate_all_sees_new_data() {
    let fixture = Fixture::new();
    let loader = Arc::new(family());
    let ctx = fixture.context(Arc::clone(&loader));
    ctx.resolve_class("child").unwrap();
    assert_eq!(ctx.get_global("late::key"), None);

    fixture.write_common_data("late::key: here\n");
    assert_eq!(ctx.get_global("late::key"), None);

    ctx.invalidate_all().unwrap();
    assert!(ctx.resolved_classes().is_empty());
    assert_eq!(
        ctx.get_global("late::key"),
        Some((Value::string("here"), Some(1)))
    );
}

#[test]
fn test_set_facts_recompiles_paths() {
    let fixture = Fixture::new();
    fixture.write_data("os/debian.yaml", "pkg::manager: apt\n");
    let mut hierarchy = fixture.hierarchy();
    hierarchy
        .entries
        .push(strata_hiera::HierarchyEntry::new("OS", "os/%{os}.yaml"));
    let ctx = strata::NodeContext::new(
        crate::common::CERTNAME,
        indexmap::IndexMap::new(),
        Arc::new(hierarchy),
        Arc::new(CountingLoader::new()),
    )
    .unwrap();
    assert_eq!(ctx.get_global("pkg::manager"), None);

    let mut facts = indexmap::IndexMap::new();
    facts.insert("os".to_string(), Value::string("debian"));
    ctx.set_facts(facts).unwrap();
    assert_eq!(
        ctx.get_global("pkg::manager"),
        Some((Value::string("apt"), Some(2)))
    );
}
