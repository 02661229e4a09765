
use crate::{
    config::MissingOperandPolicy,
    evaluate::{ResultStore, evaluate},
    merge::{MergeError, merge, merge_with},
    plan::{Node, Operator, Path, Plan, Segment, Side},
    registry::FilterRegistry,
    test_support::{StaticResolver, set},
};

fn registry() -> FilterRegistry {
    FilterRegistry::new()
        .with(
            "id",
            "Filter by component id.",
            StaticResolver::empty()
                .answer("A:1.0", set(&["A:1.0"]))
                .answer("B:2.0", set(&["B:2.0"]))
                .answer("A or B", set(&["A:1.0", "B:2.0"])),
        )
        .unwrap()
        .with(
            "package",
            "Filter by package.",
            StaticResolver::empty()
                .answer("has openssh", set(&["A:1.0", "C:3.0"]))
                .answer("has golang", set(&["B:2.0", "C:3.0"])),
        )
        .unwrap()
        .with(
            "AND",
            "A filter unluckily named like an operator.",
            StaticResolver::always(set(&["Z:9.9"])),
        )
        .unwrap()
}

fn run(node: Node) -> crate::identity::IdentitySet {
    let store = evaluate(&Plan::new(node), &registry()).unwrap();

    merge(&store).unwrap()
}

#[test]
fn single_leaf_merges_to_its_rows() {
    assert_eq!(run(Node::leaf("id", "A:1.0")), set(&["A:1.0"]));
}

#[test]
fn and_intersects_children() {
    let node = Node::and(vec![
        Node::leaf("id", "A or B"),
        Node::leaf("package", "has openssh"),
    ]);

    assert_eq!(run(node), set(&["A:1.0"]));
}

#[test]
fn or_unions_children() {
    let node = Node::or(vec![Node::leaf("id", "A:1.0"), Node::leaf("id", "B:2.0")]);

    assert_eq!(run(node), set(&["A:1.0", "B:2.0"]));
}

#[test]
fn not_subtracts_b_from_a() {
    let node = Node::not(Node::leaf("id", "A or B"), Node::leaf("id", "B:2.0"));

    assert_eq!(run(node), set(&["A:1.0"]));
}

#[test]
fn operators_nested_inside_or_keep_their_meaning() {
    // (openssh AND golang) OR A  ->  {C} ∪ {A}
    let node = Node::or(vec![
        Node::and(vec![
            Node::leaf("package", "has openssh"),
            Node::leaf("package", "has golang"),
        ]),
        Node::leaf("id", "A:1.0"),
    ]);

    assert_eq!(run(node), set(&["A:1.0", "C:3.0"]));
}

#[test]
fn sibling_operators_of_the_same_kind_do_not_collide() {
    let node = Node::or(vec![
        Node::not(Node::leaf("id", "A or B"), Node::leaf("id", "A:1.0")),
        Node::not(Node::leaf("package", "has golang"), Node::leaf("id", "B:2.0")),
    ]);

    assert_eq!(run(node), set(&["B:2.0", "C:3.0"]));
}

#[test]
fn filter_named_like_an_operator_is_still_a_filter() {
    let node = Node::or(vec![Node::leaf("AND", "anything"), Node::leaf("id", "A:1.0")]);

    assert_eq!(run(node), set(&["A:1.0", "Z:9.9"]));
}

#[test]
fn empty_store_merges_to_empty_set() {
    assert!(merge(&ResultStore::new()).unwrap().is_empty());
}

#[test]
fn skipped_not_operand_follows_policy() {
    let not = Segment::op(Operator::Not);
    let mut store = ResultStore::new();
    store
        .insert(
            &Path::from_segments(vec![
                not.clone(),
                Segment::operand(Side::A),
                Segment::filter("id"),
            ]),
            set(&["A:1.0", "B:2.0"]),
        )
        .unwrap();

    assert_eq!(
        merge_with(&store, MissingOperandPolicy::Empty).unwrap(),
        set(&["A:1.0", "B:2.0"])
    );

    let err = merge_with(&store, MissingOperandPolicy::Reject).unwrap_err();
    let MergeError::MissingOperand { path, side } = err;
    assert_eq!(path, "NOT");
    assert_eq!(side, Side::B);
}

#[test]
fn unknown_filter_inside_and_is_left_out_of_the_intersection() {
    let node = Node::and(vec![
        Node::leaf("package", "has openssh"),
        Node::leaf("malware", "flagged"),
    ]);

    assert_eq!(run(node), set(&["A:1.0", "C:3.0"]));
}

#[test]
fn very_deep_plan_merges_without_native_recursion() {
    // Alternate AND(node, openssh) and NOT(node, B) around an A-or-B leaf.
    let mut node = Node::leaf("id", "A or B");
    for depth in 0..3000 {
        node = if depth % 2 == 0 {
            Node::and(vec![node, Node::leaf("package", "has openssh")])
        } else {
            Node::not(node, Node::leaf("id", "B:2.0"))
        };
    }

    assert_eq!(run(node), set(&["A:1.0"]));
}

#[test]
fn missing_operand_deep_in_the_store_names_its_not() {
    let mut node = Node::not(Node::leaf("id", "A or B"), Node::leaf("malware", "flagged"));
    for _ in 0..3000 {
        node = Node::and(vec![node]);
    }
    let store = evaluate(&Plan::new(node), &registry()).unwrap();

    assert_eq!(
        merge_with(&store, MissingOperandPolicy::Empty).unwrap(),
        set(&["A:1.0", "B:2.0"])
    );

    let MergeError::MissingOperand { path, side } =
        merge_with(&store, MissingOperandPolicy::Reject).unwrap_err();
    assert_eq!(path, format!("{}NOT", "AND/".repeat(3000)));
    assert_eq!(side, Side::B);
}
