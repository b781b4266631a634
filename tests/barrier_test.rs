//! Barrier placement over full pipelines, observed through the plan listing.

use gantry::{Conditional, Pipeline, Step};

async fn plan(pipeline: &Pipeline) -> Vec<String> {
    pipeline
        .to_list()
        .await
        .unwrap()
        .iter()
        .map(ToString::to_string)
        .collect()
}

#[tokio::test]
async fn structural_listing_prefixes_every_item() {
    let a = Step::command("a");
    let b = Step::command("b").depends_on(&a);
    let pipeline = Pipeline::new("ci").add(a).unwrap().add(b).unwrap();
    assert_eq!(
        pipeline.to_structural().await.unwrap(),
        "* <a>\n* [wait]\n* <b>"
    );
}

#[tokio::test]
async fn dependency_behind_an_existing_barrier_adds_no_new_one() {
    let a = Step::command("a");
    let b = Step::command("b").depends_on(&a);
    let c = Step::command("c").depends_on(&a);
    let pipeline = Pipeline::new("ci")
        .add(a)
        .unwrap()
        .add(b)
        .unwrap()
        .add(c)
        .unwrap();
    assert_eq!(plan(&pipeline).await, ["<a>", "[wait]", "<b>", "<c>"]);
}

#[tokio::test]
async fn chain_gets_one_barrier_per_level() {
    let fetch = Step::command("fetch");
    let build = Step::command("build").depends_on(&fetch);
    let test = Step::command("test").depends_on(&build);
    let pipeline = Pipeline::new("ci")
        .add(fetch)
        .unwrap()
        .add(build)
        .unwrap()
        .add(test)
        .unwrap();
    assert_eq!(
        plan(&pipeline).await,
        ["<fetch>", "[wait]", "<build>", "[wait]", "<test>"]
    );
}

#[tokio::test]
async fn surviving_effect_edge_also_forces_a_barrier() {
    let ancestor = Step::command("ancestor");
    let effect = Step::command("effect").is_effect_of(&ancestor).unwrap();
    let pipeline = Pipeline::new("ci")
        .add(ancestor)
        .unwrap()
        .add(effect)
        .unwrap();
    assert_eq!(plan(&pipeline).await, ["<ancestor>", "[wait]", "<effect>"]);
}

#[tokio::test]
async fn pruned_conditional_leaves_no_barrier_behind() {
    let rejected = Conditional::new(Step::command("off"), || false);
    let effect = Step::command("effect").is_effect_of(&rejected).unwrap();
    let pipeline = Pipeline::new("ci")
        .add(Step::command("plain"))
        .unwrap()
        .add(rejected)
        .unwrap()
        .add(effect)
        .unwrap();
    assert_eq!(plan(&pipeline).await, ["<plain>"]);
}

#[tokio::test]
async fn run_of_always_steps_shares_a_relaxed_barrier() {
    let build = Step::command("build");
    let annotate = Step::command("annotate").depends_on(&build).always_execute();
    let cleanup = Step::command("cleanup").depends_on(&build).always_execute();
    let deploy = Step::command("deploy");
    let pipeline = Pipeline::new("ci")
        .add(build)
        .unwrap()
        .add(annotate)
        .unwrap()
        .add(cleanup)
        .unwrap()
        .add(deploy)
        .unwrap();
    assert_eq!(
        plan(&pipeline).await,
        [
            "<build>",
            "[wait; continue-on-failure]",
            "<annotate>",
            "<cleanup>",
            "[wait]",
            "<deploy>"
        ]
    );
}

#[tokio::test]
async fn forced_conditional_participates_in_barrier_placement() {
    let forced = Conditional::new(Step::command("forced"), || false);
    let dependent = Step::command("dependent").depends_on(&forced);
    let pipeline = Pipeline::new("ci").add(dependent).unwrap();
    assert_eq!(plan(&pipeline).await, ["<forced>", "[wait]", "<dependent>"]);
}

#[tokio::test]
async fn accepted_conditional_orders_like_a_plain_step() {
    let guarded = Conditional::new(Step::command("guarded"), || true);
    let after = Step::command("after").depends_on(&guarded);
    let pipeline = Pipeline::new("ci")
        .add(guarded)
        .unwrap()
        .add(after)
        .unwrap();
    assert_eq!(plan(&pipeline).await, ["<guarded>", "[wait]", "<after>"]);
}
