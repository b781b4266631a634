//! Linearizer behavior: ordering, implicit closure, self-references, cycles.

use gantry::{linearize, GantryError, Pipeline, Step};

fn names(steps: &[Step]) -> Vec<String> {
    steps.iter().map(Step::to_string).collect()
}

#[tokio::test]
async fn output_is_a_permutation_respecting_hard_edges() {
    let fetch = Step::command("fetch").with_label("fetch");
    let build = Step::command("build").with_label("build").depends_on(&fetch);
    let unit = Step::command("unit").with_label("unit").depends_on(&build);
    let lint = Step::command("lint").with_label("lint").depends_on(&fetch);
    let package = Step::command("package")
        .with_label("package")
        .depends_on(&unit)
        .depends_on(&lint);

    let pipeline = Pipeline::new("ci")
        .add(package)
        .unwrap()
        .add(unit)
        .unwrap()
        .add(lint)
        .unwrap()
        .add(build)
        .unwrap()
        .add(fetch)
        .unwrap();

    let sorted = linearize(&pipeline).await.unwrap();
    let order = names(&sorted);

    let mut expected: Vec<String> = order.clone();
    expected.sort();
    let mut all = vec!["build", "fetch", "lint", "package", "unit"];
    all.sort_unstable();
    assert_eq!(expected, all);

    let position = |name: &str| order.iter().position(|n| n == name).unwrap();
    assert!(position("fetch") < position("build"));
    assert!(position("build") < position("unit"));
    assert!(position("fetch") < position("lint"));
    assert!(position("unit") < position("package"));
    assert!(position("lint") < position("package"));
}

#[tokio::test]
async fn independent_steps_keep_insertion_order() {
    let pipeline = Pipeline::new("ci")
        .add(Step::command("a"))
        .unwrap()
        .add(Step::command("b"))
        .unwrap()
        .add(Step::command("c"))
        .unwrap();
    let sorted = linearize(&pipeline).await.unwrap();
    assert_eq!(names(&sorted), ["<a>", "<b>", "<c>"]);
}

#[tokio::test]
async fn dependencies_not_added_explicitly_are_appended() {
    let hidden_a = Step::command("hidden-a");
    let hidden_b = Step::command("hidden-b");
    let consumer = Step::command("consumer")
        .depends_on(&hidden_a)
        .depends_on(&hidden_b);

    let pipeline = Pipeline::new("ci").add(consumer).unwrap();
    let sorted = linearize(&pipeline).await.unwrap();
    assert_eq!(names(&sorted), ["<hidden-a>", "<hidden-b>", "<consumer>"]);
}

#[tokio::test]
async fn transitive_dependencies_are_closed_over() {
    let deepest = Step::command("deepest");
    let middle = Step::command("middle").depends_on(&deepest);
    let top = Step::command("top").depends_on(&middle);

    let pipeline = Pipeline::new("ci").add(top).unwrap();
    let sorted = linearize(&pipeline).await.unwrap();
    assert_eq!(names(&sorted), ["<deepest>", "<middle>", "<top>"]);
}

#[tokio::test]
async fn self_dependency_terminates_and_keeps_position() {
    let a = Step::command("a");
    let b = Step::command("b");
    let c = Step::command("c");
    let c = c.clone().depends_on(&c);

    let pipeline = Pipeline::new("ci")
        .add(a)
        .unwrap()
        .add(b)
        .unwrap()
        .add(c)
        .unwrap();
    let sorted = linearize(&pipeline).await.unwrap();
    assert_eq!(names(&sorted), ["<a>", "<b>", "<c>"]);
}

#[tokio::test]
async fn hard_cycle_is_a_fatal_error() {
    let a = Step::command("a").with_label("a");
    let b = Step::command("b").with_label("b").depends_on(&a);
    let a = a.depends_on(&b);

    let pipeline = Pipeline::new("ci").add(a).unwrap().add(b).unwrap();
    let err = linearize(&pipeline).await.unwrap_err();
    match err {
        GantryError::CircularDependency { cycle } => {
            assert!(cycle.contains("a -> b") || cycle.contains("b -> a"), "got: {cycle}");
        }
        other => panic!("expected a circular dependency error, got: {other}"),
    }
}

#[tokio::test]
async fn duplicate_step_addition_is_rejected() {
    let step = Step::command("once");
    let err = Pipeline::new("ci")
        .add(step.clone())
        .unwrap()
        .add(step)
        .unwrap_err();
    assert!(matches!(err, GantryError::DuplicateStep { .. }));
}

#[tokio::test]
async fn diamond_dependency_is_emitted_once() {
    let shared = Step::command("shared");
    let left = Step::command("left").depends_on(&shared);
    let right = Step::command("right").depends_on(&shared);
    let join = Step::command("join").depends_on(&left).depends_on(&right);

    let pipeline = Pipeline::new("ci").add(join).unwrap();
    let sorted = linearize(&pipeline).await.unwrap();
    assert_eq!(names(&sorted), ["<shared>", "<left>", "<right>", "<join>"]);
}
