use crate::{
    config::{EngineConfig, MissingFilterPolicy},
    error::{ErrorClass, InternalError},
    evaluate::{Deadline, EvaluateError, Evaluator, evaluate},
    plan::{Node, Operator, Path, Plan, Segment, SegmentKind, Side},
    registry::{FilterRegistry, RegistryError, ResolverError, resolver_fn},
    test_support::{
        CountingResolver, FlakyResolver, LocalMetrics, RecordingTrace, SlowResolver,
        StaticResolver, set,
    },
};
use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

fn inline_config() -> EngineConfig {
    EngineConfig {
        workers: 1,
        ..EngineConfig::default()
    }
}

fn path(segments: Vec<Segment>) -> Path {
    Path::from_segments(segments)
}

fn component_registry() -> FilterRegistry {
    FilterRegistry::new()
        .with(
            "id",
            "Filter by component id.",
            StaticResolver::empty()
                .answer("cc-utils", set(&["cc-utils:1.0"]))
                .answer("gardener", set(&["gardener:10.4.1"])),
        )
        .unwrap()
        .with(
            "package",
            "Filter by package.",
            StaticResolver::empty()
                .answer("openssh", set(&["cc-utils:1.0", "gardener:10.4.1"]))
                .answer("golang-runtime", set(&["gardener:10.4.1", "etcd:3.5"])),
        )
        .unwrap()
}

#[test]
fn leaf_root_is_stored_under_its_filter_name() {
    let registry = component_registry();
    let plan = Plan::new(Node::leaf("id", "cc-utils"));

    let store = evaluate(&plan, &registry).unwrap();

    assert_eq!(store.len(), 1);
    assert_eq!(
        store.rows_at(&path(vec![Segment::filter("id")])),
        Some(&set(&["cc-utils:1.0"]))
    );
}

#[test]
fn unfiltered_plan_yields_empty_store() {
    let registry = component_registry();
    let config = inline_config();
    let metrics = LocalMetrics::default();

    let store = Evaluator::new(&registry, &config)
        .with_metrics(&metrics)
        .evaluate(&Plan::unfiltered())
        .unwrap();

    assert!(store.is_empty());
    assert_eq!(metrics.snapshot().ops.plans_unfiltered, 1);
}

#[test]
fn same_filter_leaves_keep_separate_results() {
    let registry = component_registry();
    let plan = Plan::new(Node::or(vec![
        Node::leaf("package", "openssh"),
        Node::leaf("package", "golang-runtime"),
    ]));

    let store = evaluate(&plan, &registry).unwrap();
    let or = Segment::op(Operator::Or);
    let second = Segment::with_ordinal(SegmentKind::Filter("package".to_string()), 1);

    assert_eq!(store.len(), 2);
    assert_eq!(
        store.rows_at(&path(vec![or.clone(), Segment::filter("package")])),
        Some(&set(&["cc-utils:1.0", "gardener:10.4.1"]))
    );
    assert_eq!(
        store.rows_at(&path(vec![or, second])),
        Some(&set(&["gardener:10.4.1", "etcd:3.5"]))
    );
}

#[test]
fn not_operands_are_stored_under_their_sides() {
    let registry = component_registry();
    let plan = Plan::new(Node::not(
        Node::leaf("package", "openssh"),
        Node::leaf("id", "cc-utils"),
    ));

    let store = evaluate(&plan, &registry).unwrap();
    let not = Segment::op(Operator::Not);

    assert_eq!(
        store.rows_at(&path(vec![
            not.clone(),
            Segment::operand(Side::A),
            Segment::filter("package"),
        ])),
        Some(&set(&["cc-utils:1.0", "gardener:10.4.1"]))
    );
    assert_eq!(
        store.rows_at(&path(vec![
            not,
            Segment::operand(Side::B),
            Segment::filter("id"),
        ])),
        Some(&set(&["cc-utils:1.0"]))
    );
}

#[test]
fn skip_policy_leaves_unknown_filters_out() {
    let registry = component_registry();
    let config = inline_config();
    let metrics = LocalMetrics::default();
    let trace = RecordingTrace::default();
    let plan = Plan::new(Node::and(vec![
        Node::leaf("package", "openssh"),
        Node::leaf("malware", "anything flagged"),
    ]));

    let store = Evaluator::new(&registry, &config)
        .with_metrics(&metrics)
        .with_trace(Some(&trace))
        .evaluate(&plan)
        .unwrap();

    assert_eq!(store.len(), 1);
    assert_eq!(metrics.snapshot().ops.leaves_skipped, 1);
    assert_eq!(
        trace.events(),
        vec![
            "start leaves=2 depth=0",
            "skipped AND/malware",
            "resolved AND/package rows=2 attempts=1",
        ]
    );
}

#[test]
fn reject_policy_fails_before_any_resolver_runs() {
    let counter = Arc::new(CountingResolver::new(set(&["A:1"])));
    let mut registry = FilterRegistry::new();
    registry
        .register_shared(
            crate::registry::FilterDescriptor::new("id", "by id"),
            counter.clone(),
        )
        .unwrap();
    let config = EngineConfig {
        missing_filter: MissingFilterPolicy::Reject,
        ..inline_config()
    };
    let plan = Plan::new(Node::or(vec![
        Node::leaf("id", "A"),
        Node::leaf("malware", "flagged"),
    ]));

    let err = Evaluator::new(&registry, &config)
        .evaluate(&plan)
        .unwrap_err();

    assert!(matches!(
        &err,
        EvaluateError::Registry(RegistryError::UnknownFilter(name)) if name == "malware"
    ));
    assert_eq!(InternalError::from(err).class, ErrorClass::Configuration);
    assert_eq!(counter.calls(), 0);
}

#[test]
fn transient_failures_are_retried_up_to_the_limit() {
    let flaky = Arc::new(FlakyResolver::new(2, set(&["A:1"])));
    let mut registry = FilterRegistry::new();
    registry
        .register_shared(
            crate::registry::FilterDescriptor::new("id", "by id"),
            flaky.clone(),
        )
        .unwrap();
    let config = EngineConfig {
        resolver_retries: 2,
        ..inline_config()
    };
    let metrics = LocalMetrics::default();
    let trace = RecordingTrace::default();

    let store = Evaluator::new(&registry, &config)
        .with_metrics(&metrics)
        .with_trace(Some(&trace))
        .evaluate(&Plan::new(Node::leaf("id", "A")))
        .unwrap();

    assert_eq!(store.len(), 1);
    assert_eq!(flaky.calls(), 3);
    assert_eq!(metrics.snapshot().ops.resolver_retries, 2);
    assert_eq!(trace.events()[1], "resolved id rows=1 attempts=3");
}

#[test]
fn retries_exhausted_reports_attempts() {
    let registry = FilterRegistry::new()
        .with("id", "by id", FlakyResolver::new(5, set(&["A:1"])))
        .unwrap();
    let config = EngineConfig {
        resolver_retries: 1,
        ..inline_config()
    };

    let err = Evaluator::new(&registry, &config)
        .evaluate(&Plan::new(Node::leaf("id", "A")))
        .unwrap_err();

    match err {
        EvaluateError::Resolver {
            filter,
            path,
            attempts,
            source,
        } => {
            assert_eq!(filter, "id");
            assert_eq!(path, "id");
            assert_eq!(attempts, 2);
            assert!(source.is_transient());
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn permanent_failure_is_not_retried() {
    let registry = FilterRegistry::new()
        .with(
            "license",
            "by license",
            resolver_fn(|_, _| Err(ResolverError::not_applicable("no license index"))),
        )
        .unwrap();
    let config = EngineConfig {
        resolver_retries: 3,
        ..inline_config()
    };
    let metrics = LocalMetrics::default();

    let err = Evaluator::new(&registry, &config)
        .with_metrics(&metrics)
        .evaluate(&Plan::new(Node::leaf("license", "MIT")))
        .unwrap_err();

    assert!(matches!(err, EvaluateError::Resolver { attempts: 1, .. }));
    assert_eq!(InternalError::from(err).class, ErrorClass::Resolver);
    assert_eq!(metrics.snapshot().ops.resolver_failures, 1);
    assert_eq!(metrics.snapshot().ops.resolver_retries, 0);
}

#[test]
fn deadline_fails_the_whole_evaluation() {
    let registry = FilterRegistry::new()
        .with("slow", "slow lookup", SlowResolver(Duration::from_millis(50)))
        .unwrap();
    let config = inline_config();
    let metrics = LocalMetrics::default();
    let trace = RecordingTrace::default();

    let err = Evaluator::new(&registry, &config)
        .with_metrics(&metrics)
        .with_trace(Some(&trace))
        .with_deadline(Deadline::new(Some(Duration::from_millis(10))))
        .evaluate(&Plan::new(Node::and(vec![
            Node::leaf("slow", "a"),
            Node::leaf("slow", "b"),
        ])))
        .unwrap_err();

    assert!(matches!(err, EvaluateError::Timeout { limit_ms: 10, .. }));
    assert_eq!(InternalError::from(err).class, ErrorClass::Timeout);
    assert_eq!(metrics.snapshot().ops.timeouts, 1);
    assert_eq!(trace.events().last().map(String::as_str), Some("error evaluate:timeout"));
}

#[test]
fn deadline_waits_for_the_running_resolver_and_skips_the_rest() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let registry = FilterRegistry::new()
        .with(
            "slow",
            "slow lookup",
            resolver_fn(move |_, _| {
                std::thread::sleep(Duration::from_millis(50));
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(set(&["A:1"]))
            }),
        )
        .unwrap();
    let config = inline_config();

    let err = Evaluator::new(&registry, &config)
        .with_deadline(Deadline::new(Some(Duration::from_millis(10))))
        .evaluate(&Plan::new(Node::and(vec![
            Node::leaf("slow", "a"),
            Node::leaf("slow", "b"),
        ])))
        .unwrap_err();

    match err {
        EvaluateError::Timeout {
            elapsed_ms,
            limit_ms,
        } => {
            assert_eq!(limit_ms, 10);
            assert!(elapsed_ms >= 50, "elapsed {elapsed_ms}ms");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn pool_and_inline_produce_identical_stores() {
    let registry = component_registry();
    let plan = Plan::new(Node::or(vec![
        Node::not(
            Node::leaf("id", "cc-utils"),
            Node::or(vec![
                Node::leaf("package", "openssh"),
                Node::leaf("package", "golang-runtime"),
            ]),
        ),
        Node::leaf("id", "gardener"),
        Node::and(vec![
            Node::leaf("package", "openssh"),
            Node::leaf("id", "gardener"),
        ]),
    ]));

    let inline = inline_config();
    let pooled = EngineConfig {
        workers: 4,
        ..EngineConfig::default()
    };
    let pool = pooled.build_pool().unwrap();

    let a = Evaluator::new(&registry, &inline).evaluate(&plan).unwrap();
    let b = Evaluator::new(&registry, &pooled)
        .with_pool(pool.as_ref())
        .evaluate(&plan)
        .unwrap();

    assert_eq!(a, b);
    assert_eq!(a.len(), 6);
}

#[test]
fn resolver_sees_its_path_and_the_whole_plan() {
    let registry = FilterRegistry::new()
        .with(
            "id",
            "by id",
            resolver_fn(|instruction, ctx| {
                assert_eq!(ctx.plan().leaf_count(), 2);
                let expected = if instruction == "A" { "AND/id" } else { "AND/id#1" };
                assert_eq!(ctx.path().to_string(), expected);
                Ok(set(&[instruction]))
            }),
        )
        .unwrap();
    let plan = Plan::new(Node::and(vec![Node::leaf("id", "A"), Node::leaf("id", "B")]));

    let store = evaluate(&plan, &registry).unwrap();

    assert_eq!(store.len(), 2);
}

#[test]
fn very_deep_plan_evaluates_without_native_recursion() {
    let registry = FilterRegistry::new()
        .with("id", "by id", StaticResolver::always(set(&["A:1"])))
        .unwrap();

    let mut node = Node::leaf("id", "A");
    for depth in 0..5000 {
        node = if depth % 2 == 0 {
            Node::and(vec![node])
        } else {
            Node::or(vec![node])
        };
    }
    let plan = Plan::new(node);

    let store = evaluate(&plan, &registry).unwrap();
    let entries = store.entries();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0.len(), 5001);
}
