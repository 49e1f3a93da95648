//! Merge invariants observed through the full dispatch path: quality
//! precedence, idempotent re-runs and placeholder replacement.

use pretty_assertions::assert_eq;
use storefront_core::{
    App, AppScope, AppState, BundleKind, Job, JobAction, Quality, Quirks,
};
use storefront_test_utils::fixtures::{app_id, available_app};
use storefront_test_utils::{MockBackend, TestDispatcherBuilder};

#[tokio::test]
async fn quality_ranks_decide_merged_attributes_regardless_of_arrival() {
    // run the same two-backend job several times; concurrent arrival
    // order varies, the merged attribute set must not
    for _ in 0..5 {
        let mut low = App::new(app_id("org.example.App"));
        low.set_description(Quality::Lowest, "d1");
        low.set_name(Quality::Normal, "from-low");

        let mut high = App::new(app_id("org.example.App"));
        high.set_description(Quality::Highest, "d2");
        high.set_rating(Quality::Normal, 80);

        let a = MockBackend::named("derived")
            .with_action(JobAction::GetInstalled)
            .returning_app(low)
            .build();
        let b = MockBackend::named("authoritative")
            .with_action(JobAction::GetInstalled)
            .returning_app(high)
            .build();

        let harness = TestDispatcherBuilder::new()
            .with_backend(a)
            .with_backend(b)
            .build()
            .await;

        let job = Job::builder(JobAction::GetInstalled).build().unwrap();
        let outcome = harness.dispatcher.submit(job).await.unwrap();

        assert_eq!(outcome.list.len(), 1);
        let merged = outcome.list.get(&app_id("org.example.App")).unwrap();
        assert_eq!(merged.description(), Some("d2"));
        assert_eq!(merged.name(), Some("from-low"));
        assert_eq!(merged.rating(), Some(80));
    }
}

#[tokio::test]
async fn resubmitting_a_job_yields_the_same_list() {
    let backend = MockBackend::named("packages")
        .with_action(JobAction::GetInstalled)
        .returning(vec![
            available_app("org.example.A", "A"),
            available_app("org.example.B", "B"),
        ])
        .build();

    let harness = TestDispatcherBuilder::new()
        .with_backend(backend)
        .build()
        .await;

    let first = harness
        .dispatcher
        .submit(Job::builder(JobAction::GetInstalled).build().unwrap())
        .await
        .unwrap();
    let second = harness
        .dispatcher
        .submit(Job::builder(JobAction::GetInstalled).build().unwrap())
        .await
        .unwrap();

    assert_eq!(first.list.len(), second.list.len());
    let first_keys: Vec<String> = first.list.iter().map(|a| a.unique_key()).collect();
    let second_keys: Vec<String> = second.list.iter().map(|a| a.unique_key()).collect();
    assert_eq!(first_keys, second_keys);
}

#[tokio::test]
async fn placeholder_is_replaced_by_authoritative_entity() {
    let mut pending = App::placeholder(app_id("org.example.App"));
    pending.set_state(AppState::QueuedForInstall);

    let placeholder_source = MockBackend::named("queue")
        .with_action(JobAction::GetInstalled)
        .returning_app(pending)
        .build();
    let authoritative = MockBackend::named("appstream")
        .with_action(JobAction::GetInstalled)
        .returning_app(available_app("org.example.App", "Example App"))
        .build();

    let harness = TestDispatcherBuilder::new()
        .with_backend(placeholder_source)
        .with_backend(authoritative)
        .build()
        .await;

    let job = Job::builder(JobAction::GetInstalled).build().unwrap();
    let outcome = harness.dispatcher.submit(job).await.unwrap();

    assert_eq!(outcome.list.len(), 1);
    let merged = outcome.list.get(&app_id("org.example.App")).unwrap();
    assert!(!merged.has_quirk(Quirks::PLACEHOLDER));
    assert_eq!(merged.name(), Some("Example App"));
    // the pending install state is more informative and survives
    assert_eq!(merged.state(), AppState::QueuedForInstall);
}

#[tokio::test]
async fn entities_with_different_identity_do_not_merge() {
    let system = App::new(app_id("org.example.App"));
    let user_scoped = App::new(storefront_core::AppId::new(
        AppScope::User,
        BundleKind::Desktop,
        "",
        "org.example.App",
        "stable",
    ));

    let a = MockBackend::named("system")
        .with_action(JobAction::GetInstalled)
        .returning_app(system)
        .build();
    let b = MockBackend::named("user")
        .with_action(JobAction::GetInstalled)
        .returning_app(user_scoped)
        .build();

    let harness = TestDispatcherBuilder::new()
        .with_backend(a)
        .with_backend(b)
        .build()
        .await;

    let job = Job::builder(JobAction::GetInstalled).build().unwrap();
    let outcome = harness.dispatcher.submit(job).await.unwrap();
    assert_eq!(outcome.list.len(), 2);
}
