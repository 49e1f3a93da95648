//! Refinement through the dispatcher: idempotent flag satisfaction,
//! dependency-ordered cascades and graceful enrichment degradation.

use storefront_core::{
    AppList, CoreError, Job, JobAction, JobStatus, Quality, RefineFlags, Severity,
};
use storefront_test_utils::fixtures::{app, app_id, available_app};
use storefront_test_utils::{MockBackend, TestDispatcherBuilder};

#[tokio::test]
async fn refine_satisfies_requested_flags() {
    let ratings = MockBackend::named("ratings")
        .with_refine_flags(RefineFlags::REQUIRE_RATING)
        .refining_with(|app, flags| {
            if flags.contains(RefineFlags::REQUIRE_RATING) {
                app.set_rating(Quality::Normal, 85);
            }
            Ok(())
        })
        .build();

    let harness = TestDispatcherBuilder::new()
        .with_backend(ratings.clone())
        .build()
        .await;

    let mut targets = AppList::new();
    targets.merge(app("org.example.App"));
    let job = Job::builder(JobAction::Refine)
        .target_list(targets)
        .refine_flags(RefineFlags::REQUIRE_RATING)
        .build()
        .unwrap();

    let outcome = harness.dispatcher.submit(job).await.unwrap();
    assert_eq!(outcome.status, JobStatus::Succeeded);
    assert_eq!(
        outcome.list.get(&app_id("org.example.App")).unwrap().rating(),
        Some(85)
    );
    assert_eq!(ratings.refine_count(), 1);
}

#[tokio::test]
async fn refine_of_satisfied_flag_performs_zero_backend_calls() {
    let ratings = MockBackend::named("ratings")
        .with_refine_flags(RefineFlags::REQUIRE_RATING | RefineFlags::REQUIRE_REVIEW_RATINGS)
        .refining_with(|app, _| {
            app.set_rating(Quality::Normal, 85);
            Ok(())
        })
        .build();

    let harness = TestDispatcherBuilder::new()
        .with_backend(ratings.clone())
        .build()
        .await;

    // the entity already has both attributes; refinement must return
    // immediately with the existing values
    let mut rated = app("org.example.App");
    rated.set_rating(Quality::Highest, 92);
    rated.set_review_ratings([0, 1, 2, 3, 4, 90]);
    let mut targets = AppList::new();
    targets.merge(rated);

    let job = Job::builder(JobAction::Refine)
        .target_list(targets)
        .refine_flags(RefineFlags::REQUIRE_RATING | RefineFlags::REQUIRE_REVIEW_RATINGS)
        .build()
        .unwrap();

    let outcome = harness.dispatcher.submit(job).await.unwrap();
    assert_eq!(ratings.refine_count(), 0, "satisfied flags must do no work");
    assert_eq!(
        outcome.list.get(&app_id("org.example.App")).unwrap().rating(),
        Some(92)
    );
}

#[tokio::test]
async fn fanout_refinement_runs_after_primary_results() {
    let packages = MockBackend::named("packages")
        .with_action(JobAction::GetInstalled)
        .returning_app(available_app("org.example.App", "Example"))
        .build();
    let icons = MockBackend::named("icons")
        .with_refine_flags(RefineFlags::REQUIRE_ICON)
        .refining_with(|app, _| {
            app.set_icon(Quality::Normal, "org.example.App.png");
            Ok(())
        })
        .build();

    let harness = TestDispatcherBuilder::new()
        .with_backend(packages)
        .with_backend(icons)
        .build()
        .await;

    let job = Job::builder(JobAction::GetInstalled)
        .refine_flags(RefineFlags::REQUIRE_ICON)
        .build()
        .unwrap();

    let outcome = harness.dispatcher.submit(job).await.unwrap();
    let refined = outcome.list.get(&app_id("org.example.App")).unwrap();
    assert_eq!(refined.icon(), Some("org.example.App.png"));
}

#[tokio::test]
async fn ratings_backend_depends_on_metadata_backend() {
    // appstream records the reviewable id; ratings needs it and runs
    // after appstream even though it registers first
    let ratings = MockBackend::named("ratings")
        .with_refine_flags(RefineFlags::REQUIRE_RATING)
        .run_after("appstream")
        .refining_with(|app, _| {
            if app.provided_ids().is_empty() {
                return Err(CoreError::Failed("no reviewable ids yet".to_string()));
            }
            app.set_rating(Quality::Normal, 77);
            Ok(())
        })
        .build();
    let appstream = MockBackend::named("appstream")
        .with_refine_flags(RefineFlags::REQUIRE_RATING)
        .refining_with(|app, _| {
            app.add_provided_id("org.example.App.desktop");
            Ok(())
        })
        .build();

    let harness = TestDispatcherBuilder::new()
        .with_backend(ratings)
        .with_backend(appstream)
        .build()
        .await;

    let mut targets = AppList::new();
    targets.merge(app("org.example.App"));
    let job = Job::builder(JobAction::Refine)
        .target_list(targets)
        .refine_flags(RefineFlags::REQUIRE_RATING)
        .build()
        .unwrap();

    let outcome = harness.dispatcher.submit(job).await.unwrap();
    assert!(outcome.events.is_empty());
    assert_eq!(
        outcome.list.get(&app_id("org.example.App")).unwrap().rating(),
        Some(77)
    );
}

#[tokio::test]
async fn enrichment_failure_degrades_gracefully() {
    let packages = MockBackend::named("packages")
        .with_action(JobAction::GetInstalled)
        .returning_app(available_app("org.example.App", "Example"))
        .build();
    let ratings = MockBackend::named("ratings")
        .with_refine_flags(RefineFlags::REQUIRE_RATING)
        .refine_failing_with(CoreError::NoNetwork("ratings server down".to_string()))
        .build();

    let harness = TestDispatcherBuilder::new()
        .with_backend(packages)
        .with_backend(ratings)
        .build()
        .await;

    let job = Job::builder(JobAction::GetInstalled)
        .refine_flags(RefineFlags::REQUIRE_RATING)
        .build()
        .unwrap();

    let outcome = harness.dispatcher.submit(job).await.unwrap();
    // the app is shown without a rating rather than blocking the view
    assert_eq!(outcome.status, JobStatus::Succeeded);
    let shown = outcome.list.get(&app_id("org.example.App")).unwrap();
    assert_eq!(shown.rating(), None);
    assert_eq!(shown.name(), Some("Example"));

    assert_eq!(outcome.events.len(), 1);
    assert_eq!(outcome.events[0].severity, Severity::Warning);
    assert_eq!(
        outcome.events[0].app.as_ref().unwrap(),
        &app_id("org.example.App")
    );
}

#[tokio::test]
async fn malformed_cache_aborts_refinement() {
    let packages = MockBackend::named("packages")
        .with_action(JobAction::GetInstalled)
        .returning_app(available_app("org.example.App", "Example"))
        .build();
    let broken = MockBackend::named("ratings")
        .with_refine_flags(RefineFlags::REQUIRE_RATING)
        .refine_failing_with(CoreError::InvalidFormat(
            "persisted ratings cache is corrupt".to_string(),
        ))
        .build();

    let harness = TestDispatcherBuilder::new()
        .with_backend(packages)
        .with_backend(broken)
        .build()
        .await;

    let job = Job::builder(JobAction::GetInstalled)
        .refine_flags(RefineFlags::REQUIRE_RATING)
        .build()
        .unwrap();

    let err = harness.dispatcher.submit(job).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidFormat(_)));
}
