use crate::plan::{
    Node, Operator, Path, PathTrail, Plan, PlanError, Segment, SegmentKind, Side, sibling_segments,
};

const COMPONENT_PLAN: &str = r#"{
  "filter": {
    "logical_operator": "OR",
    "filter": [
      {
        "logical_operator": "NOT",
        "filterA": {
          "filter_name": "id",
          "instruction": "The component should be called 'github.com/gardener/cc-utils' and have version 1.2424.0"
        },
        "filterB": {
          "logical_operator": "OR",
          "filter": [
            { "filter_name": "package", "instruction": "Components which depend on the package openssh" },
            { "filter_name": "package", "instruction": "Components which depend on the package golang-runtime" }
          ]
        }
      },
      {
        "filter_name": "id",
        "instruction": "The component should be called 'github.com/gardener/gardener' and have version 10.4.1"
      }
    ]
  }
}"#;

#[test]
fn parses_nested_plan_document() {
    let plan = Plan::from_json(COMPONENT_PLAN).unwrap();

    let Some(Node::Or(children)) = plan.root() else {
        panic!("root should be OR");
    };
    assert_eq!(children.len(), 2);
    assert!(matches!(children[0], Node::Not { .. }));
    assert!(matches!(&children[1], Node::Leaf(leaf) if leaf.filter_name == "id"));

    assert_eq!(plan.leaf_count(), 4);
    assert_eq!(
        plan.filter_names().into_iter().collect::<Vec<_>>(),
        vec!["id", "package"]
    );
}

#[test]
fn null_and_missing_filter_are_unfiltered() {
    assert!(Plan::from_json(r#"{"filter": null}"#).unwrap().is_unfiltered());
    assert!(Plan::from_json("{}").unwrap().is_unfiltered());
}

#[test]
fn leaf_root_is_accepted() {
    let plan = Plan::from_json(r#"{"filter": {"filter_name": "id", "instruction": "A"}}"#).unwrap();

    assert_eq!(plan.root(), Some(&Node::leaf("id", "A")));
}

#[test]
fn question_key_is_accepted_for_leaf_text() {
    let plan =
        Plan::from_json(r#"{"filter": {"filter_name": "license", "question": "MIT only"}}"#)
            .unwrap();

    assert_eq!(plan.root(), Some(&Node::leaf("license", "MIT only")));
}

#[test]
fn xor_operator_is_unsupported() {
    let err = Plan::from_json(
        r#"{"filter": {"logical_operator": "XOR", "filter": [{"filter_name": "id", "instruction": "A"}]}}"#,
    )
    .unwrap_err();

    match err {
        PlanError::UnsupportedOperator { path, tag } => {
            assert_eq!(path, "$.filter");
            assert_eq!(tag, "XOR");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn wrapper_form_is_reported_as_unsupported() {
    let err = Plan::from_json(r#"{"filter": {"AND": []}}"#).unwrap_err();

    assert!(matches!(err, PlanError::UnsupportedOperator { tag, .. } if tag == "AND"));
}

#[test]
fn not_requires_both_operands() {
    let err = Plan::from_json(
        r#"{"filter": {"logical_operator": "NOT", "filterA": {"filter_name": "id", "instruction": "A"}}}"#,
    )
    .unwrap_err();

    match err {
        PlanError::MalformedNode { path, reason } => {
            assert_eq!(path, "$.filter");
            assert!(reason.contains("filterB"), "reason: {reason}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn malformed_child_reports_its_location() {
    let err = Plan::from_json(
        r#"{"filter": {"logical_operator": "AND", "filter": [{"filter_name": "id", "instruction": "A"}, 7]}}"#,
    )
    .unwrap_err();

    assert!(matches!(err, PlanError::MalformedNode { path, .. } if path == "$.filter.filter[1]"));
}

#[test]
fn invalid_json_is_a_plan_error() {
    assert!(matches!(
        Plan::from_json("{\"filter\": "),
        Err(PlanError::Json(_))
    ));
}

#[test]
fn serialized_plan_parses_back_to_same_tree() {
    let plan = Plan::from_json(COMPONENT_PLAN).unwrap();
    let json = plan.to_json().unwrap();

    assert_eq!(Plan::from_json(&json).unwrap(), plan);
    assert_eq!(serde_json::from_str::<Plan>(&json).unwrap(), plan);
}

#[test]
fn fingerprint_is_stable_and_structure_sensitive() {
    let plan = Plan::from_json(COMPONENT_PLAN).unwrap();
    let again = Plan::from_json(COMPONENT_PLAN).unwrap();
    assert_eq!(plan.fingerprint(), again.fingerprint());

    let and = Plan::new(Node::and(vec![Node::leaf("id", "A"), Node::leaf("id", "B")]));
    let or = Plan::new(Node::or(vec![Node::leaf("id", "A"), Node::leaf("id", "B")]));
    assert_ne!(and.fingerprint(), or.fingerprint());
    assert_ne!(Plan::unfiltered().fingerprint(), and.fingerprint());
    assert_eq!(plan.fingerprint().short().len(), 8);
}

#[test]
fn sibling_segments_number_repeated_labels() {
    let children = vec![
        Node::leaf("package", "openssh"),
        Node::leaf("id", "A"),
        Node::leaf("package", "golang-runtime"),
        Node::and(vec![]),
        Node::and(vec![]),
    ];

    let rendered: Vec<String> = sibling_segments(&children)
        .iter()
        .map(ToString::to_string)
        .collect();

    assert_eq!(rendered, vec!["package", "id", "package#1", "AND", "AND#1"]);
}

#[test]
fn path_renders_segments_with_separators() {
    let leaf = Node::leaf("id", "A");
    let path = Path::root()
        .child(Segment::op(Operator::Or))
        .child(Segment::op(Operator::Not))
        .operand(Side::A, &leaf);

    assert_eq!(path.to_string(), "OR/NOT/A/id");
    assert_eq!(Path::root().to_string(), "/");
    assert_eq!(
        path.last().map(Segment::kind),
        Some(&SegmentKind::Filter("id".to_string()))
    );
}

#[test]
fn path_trail_builds_paths_from_parent_links() {
    let mut trail = PathTrail::new();
    let or = trail.push(None, Segment::op(Operator::Or));
    let not = trail.push(Some(or), Segment::op(Operator::Not));
    let side_a = trail.push(Some(not), Segment::operand(Side::A));
    let side_b = trail.push(Some(not), Segment::operand(Side::B));
    let leaf = trail.push(Some(side_b), Segment::filter("package"));

    assert_eq!(trail.path(&Path::root(), leaf).to_string(), "OR/NOT/B/package");
    assert_eq!(trail.path(&Path::root(), side_a).to_string(), "OR/NOT/A");

    let base = Path::root().child(Segment::op(Operator::And));
    assert_eq!(trail.path(&base, not).to_string(), "AND/OR/NOT");
}

#[test]
fn check_filters_walks_very_deep_plans() {
    let mut node = Node::leaf("malware", "flagged");
    for _ in 0..5000 {
        node = Node::not(Node::leaf("id", "A"), node);
    }
    let plan = Plan::new(node);

    let err = plan.check_filters(|name| name == "id").unwrap_err();
    match err {
        PlanError::UnknownFilter { name, path } => {
            assert_eq!(name, "malware");
            assert_eq!(path, format!("{}malware", "NOT/B/".repeat(5000)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn check_filters_reports_first_unknown_leaf() {
    let plan = Plan::from_json(COMPONENT_PLAN).unwrap();

    assert!(plan.check_filters(|name| name == "id" || name == "package").is_ok());

    let err = plan.check_filters(|name| name == "id").unwrap_err();
    match err {
        PlanError::UnknownFilter { name, path } => {
            assert_eq!(name, "package");
            assert_eq!(path, "OR/NOT/B/OR/package");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
