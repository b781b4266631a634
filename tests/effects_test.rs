//! Effect-dependency pruning and resurrection.

use gantry::{linearize, Conditional, Pipeline, Step};

fn names(steps: &[Step]) -> Vec<String> {
    steps.iter().map(Step::to_string).collect()
}

#[tokio::test]
async fn effect_only_step_is_pruned_with_its_rejected_ancestor() {
    let rejected = Conditional::new(Step::command("ancestor"), || false);
    let effect = Step::command("effect").is_effect_of(&rejected).unwrap();

    let pipeline = Pipeline::new("ci")
        .add(Step::command("plain"))
        .unwrap()
        .add(rejected)
        .unwrap()
        .add(effect)
        .unwrap();

    let sorted = linearize(&pipeline).await.unwrap();
    assert_eq!(names(&sorted), ["<plain>"]);
}

#[tokio::test]
async fn effect_step_joins_an_accepted_ancestor() {
    let accepted = Conditional::new(Step::command("ancestor"), || true);
    let effect = Step::command("effect").is_effect_of(&accepted).unwrap();

    let pipeline = Pipeline::new("ci")
        .add(accepted)
        .unwrap()
        .add(effect)
        .unwrap();

    let sorted = linearize(&pipeline).await.unwrap();
    assert_eq!(names(&sorted), ["<ancestor>", "<effect>"]);
}

#[tokio::test]
async fn pruning_is_transitive() {
    let rejected = Conditional::new(Step::command("ancestor"), || false);
    let first = Step::command("first").is_effect_of(&rejected).unwrap();
    let second = Step::command("second").is_effect_of(&first).unwrap();

    let pipeline = Pipeline::new("ci")
        .add(rejected)
        .unwrap()
        .add(first)
        .unwrap()
        .add(second)
        .unwrap();

    let sorted = linearize(&pipeline).await.unwrap();
    assert!(sorted.is_empty());
}

#[tokio::test]
async fn hard_dependency_resurrects_a_pruned_step() {
    let rejected = Conditional::new(Step::command("ancestor"), || false);
    let pruned = Step::command("pruned").is_effect_of(&rejected).unwrap();
    let rescuer = Step::command("rescuer").depends_on(&pruned);

    let pipeline = Pipeline::new("ci")
        .add(rejected)
        .unwrap()
        .add(pruned)
        .unwrap()
        .add(rescuer)
        .unwrap();

    let sorted = linearize(&pipeline).await.unwrap();
    assert_eq!(names(&sorted), ["<pruned>", "<rescuer>"]);
}

#[tokio::test]
async fn resurrection_unlocks_steps_gated_on_the_resurrected_one() {
    let rejected = Conditional::new(Step::command("ancestor"), || false);
    let pruned = Step::command("pruned").is_effect_of(&rejected).unwrap();
    let downstream = Step::command("downstream").is_effect_of(&pruned).unwrap();
    let rescuer = Step::command("rescuer").depends_on(&pruned);

    let pipeline = Pipeline::new("ci")
        .add(rejected)
        .unwrap()
        .add(pruned)
        .unwrap()
        .add(downstream)
        .unwrap()
        .add(rescuer)
        .unwrap();

    let sorted = linearize(&pipeline).await.unwrap();
    let order = names(&sorted);
    assert!(order.contains(&"<pruned>".to_string()));
    assert!(order.contains(&"<downstream>".to_string()));
    assert!(order.contains(&"<rescuer>".to_string()));
    assert!(!order.contains(&"<ancestor>".to_string()));
}

#[tokio::test]
async fn resurrected_step_drags_in_its_hard_dependencies() {
    let rejected = Conditional::new(Step::command("ancestor"), || false);
    let tool = Step::command("tool");
    let pruned = Step::command("pruned")
        .depends_on(&tool)
        .is_effect_of(&rejected)
        .unwrap();
    let rescuer = Step::command("rescuer").depends_on(&pruned);

    let pipeline = Pipeline::new("ci")
        .add(rejected)
        .unwrap()
        .add(pruned)
        .unwrap()
        .add(rescuer)
        .unwrap();

    let sorted = linearize(&pipeline).await.unwrap();
    assert_eq!(names(&sorted), ["<tool>", "<pruned>", "<rescuer>"]);
}

#[tokio::test]
async fn any_present_ancestor_keeps_an_effect_step() {
    let rejected = Conditional::new(Step::command("off"), || false);
    let present = Step::command("present");
    let effect = Step::command("effect")
        .is_effect_of(&rejected)
        .unwrap()
        .is_effect_of(&present)
        .unwrap();

    let pipeline = Pipeline::new("ci")
        .add(rejected)
        .unwrap()
        .add(present)
        .unwrap()
        .add(effect)
        .unwrap();

    let sorted = linearize(&pipeline).await.unwrap();
    assert_eq!(names(&sorted), ["<present>", "<effect>"]);
}

#[tokio::test]
async fn two_chains_sharing_an_accepted_ancestor_both_survive() {
    let shared = Conditional::new(Step::command("shared"), || true);
    let left = Step::command("left").is_effect_of(&shared).unwrap();
    let right = Step::command("right").is_effect_of(&shared).unwrap();
    let left_child = Step::command("left-child").is_effect_of(&left).unwrap();

    let pipeline = Pipeline::new("ci")
        .add(shared)
        .unwrap()
        .add(left)
        .unwrap()
        .add(right)
        .unwrap()
        .add(left_child)
        .unwrap();

    let sorted = linearize(&pipeline).await.unwrap();
    assert_eq!(
        names(&sorted),
        ["<shared>", "<left>", "<right>", "<left-child>"]
    );
}

#[tokio::test]
async fn effect_ancestor_orders_before_its_dependent() {
    let ancestor = Step::command("ancestor");
    let effect = Step::command("effect").is_effect_of(&ancestor).unwrap();

    let pipeline = Pipeline::new("ci")
        .add(effect)
        .unwrap()
        .add(ancestor)
        .unwrap();

    let sorted = linearize(&pipeline).await.unwrap();
    assert_eq!(names(&sorted), ["<ancestor>", "<effect>"]);
}

#[tokio::test]
async fn last_call_wins_turns_an_effect_into_a_hard_dependency() {
    let rejected = Conditional::new(Step::command("ancestor"), || false);
    let step = Step::command("step")
        .is_effect_of(&rejected)
        .unwrap()
        .depends_on(&rejected);

    let pipeline = Pipeline::new("ci").add(step).unwrap();
    let sorted = linearize(&pipeline).await.unwrap();
    assert_eq!(names(&sorted), ["<ancestor>", "<step>"]);
}
