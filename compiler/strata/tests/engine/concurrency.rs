use std::sync::{Arc, Barrier};
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use strata_eval::Resolver;
use strata_ir::Value;

use crate::common::{assign, class, class_inherits, CountingLoader, Fixture};

#[test]
fn test_concurrent_resolution_shares_one_load() {
    let fixture = Fixture::new();
    let loader = Arc::new(
        CountingLoader::new()
            .with_delay(Duration::from_millis(100))
            .with("test", &class("test", vec![], vec![assign("a", json!(1))])),
    );
    let ctx = fixture.context(Arc::clone(&loader));
    let barrier = Barrier::new(2);

    let (first, second) = std::thread::scope(|s| {
        let a = s.spawn(|| {
            barrier.wait();
            ctx.resolve_class("test").unwrap()
        });
        let b = s.spawn(|| {
            barrier.wait();
            ctx.resolve_class("test").unwrap()
        });
        (a.join().unwrap(), b.join().unwrap())
    });

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.value("a"), Some(Value::Integer(1)));
    assert_eq!(loader.loads(), 1);
}

#[test]
fn test_concurrent_children_share_parent() {
    let fixture = Fixture::new();
    let loader = Arc::new(
        CountingLoader::new()
            .with_delay(Duration::from_millis(20))
            .with("base", &class("base", vec![], vec![]))
            .with("a", &class_inherits("a", "base", vec![], vec![]))
            .with("b", &class_inherits("b", "base", vec![], vec![]))
            .with("c", &class_inherits("c", "base", vec![], vec![])),
    );
    let ctx = fixture.context(Arc::clone(&loader));

    std::thread::scope(|s| {
        for name in ["a", "b", "c"] {
            let ctx = &ctx;
            s.spawn(move || ctx.resolve_class(name).unwrap());
        }
    });

    assert_eq!(ctx.resolved_classes(), vec!["a", "b", "base", "c"]);
    assert_eq!(loader.loads(), 4);
}

#[test]
fn test_reentrant_resolution_sees_the_in_progress_instance() {
    let fixture = Fixture::new();
    let ctx = fixture.context(Arc::new(
        CountingLoader::new().with("loop", &class_inherits("loop", "loop", vec![], vec![])),
    ));
    let instance = ctx.resolve_class("loop").unwrap();
    assert_eq!(instance.parent(), Some("loop"));
}
