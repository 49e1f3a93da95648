//! End-to-end dispatcher behavior: concurrent fan-out, failure
//! isolation, cancellation, exclusive actions and refresh.

use std::sync::Arc;
use std::time::Duration;
use storefront_core::{
    App, AppState, CoreError, Job, JobAction, JobStatus, Quality, Severity,
};
use storefront_test_utils::fixtures::{app_id, available_app, installed_app, review};
use storefront_test_utils::{MockBackend, TestDispatcherBuilder};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn fanout_merges_partial_results_from_all_backends() {
    let mut from_packages = App::new(app_id("org.example.App"));
    from_packages.set_description(Quality::Lowest, "d1");

    let mut from_appstream = App::new(app_id("org.example.App"));
    from_appstream.set_description(Quality::Highest, "d2");
    from_appstream.set_rating(Quality::Normal, 80);

    let packages = MockBackend::named("packages")
        .with_action(JobAction::GetInstalled)
        .returning_app(from_packages)
        .build();
    let appstream = MockBackend::named("appstream")
        .with_action(JobAction::GetInstalled)
        .returning_app(from_appstream)
        .build();

    let harness = TestDispatcherBuilder::new()
        .with_backend(packages)
        .with_backend(appstream)
        .build()
        .await;

    let job = Job::builder(JobAction::GetInstalled).build().unwrap();
    let outcome = harness.dispatcher.submit(job).await.unwrap();

    assert_eq!(outcome.status, JobStatus::Succeeded);
    assert_eq!(outcome.list.len(), 1, "same identity must merge to one entry");
    let app = outcome.list.get(&app_id("org.example.App")).unwrap();
    assert_eq!(app.description(), Some("d2"));
    assert_eq!(app.rating(), Some(80));
    assert!(outcome.events.is_empty());
}

#[tokio::test]
async fn failing_backend_does_not_discard_other_results() {
    let healthy = MockBackend::named("packages")
        .with_action(JobAction::GetInstalled)
        .returning_app(available_app("org.example.Editor", "Editor"))
        .build();
    let broken = MockBackend::named("firmware")
        .with_action(JobAction::GetInstalled)
        .failing_with(CoreError::NoNetwork("metadata server unreachable".to_string()))
        .build();

    let harness = TestDispatcherBuilder::new()
        .with_backend(healthy)
        .with_backend(broken)
        .build()
        .await;

    let job = Job::builder(JobAction::GetInstalled).build().unwrap();
    let outcome = harness.dispatcher.submit(job).await.unwrap();

    assert_eq!(outcome.status, JobStatus::Succeeded);
    assert_eq!(outcome.list.len(), 1);
    assert!(outcome.list.contains(&app_id("org.example.Editor")));

    assert_eq!(outcome.events.len(), 1);
    let event = &outcome.events[0];
    assert_eq!(event.backend, "firmware");
    assert_eq!(event.severity, Severity::Warning);
    assert!(matches!(event.error, CoreError::NoNetwork(_)));
}

#[tokio::test]
async fn disabled_backend_is_skipped_without_error() {
    let enabled = MockBackend::named("packages")
        .with_action(JobAction::GetInstalled)
        .returning_app(available_app("org.example.Editor", "Editor"))
        .build();
    let disabled = MockBackend::named("firmware")
        .with_action(JobAction::GetInstalled)
        .returning_app(available_app("org.example.Firmware", "Firmware"))
        .build();

    let harness = TestDispatcherBuilder::new()
        .with_backend(enabled)
        .with_backend(disabled.clone())
        .build()
        .await;
    harness.settings.set_backend_enabled("firmware", false);

    let job = Job::builder(JobAction::GetInstalled).build().unwrap();
    let outcome = harness.dispatcher.submit(job).await.unwrap();

    assert_eq!(outcome.list.len(), 1);
    assert!(outcome.events.is_empty());
    assert_eq!(disabled.execute_count(), 0);
}

#[tokio::test]
async fn cancellation_keeps_partial_result_and_skips_pending_backends() {
    let fast = MockBackend::named("fast")
        .with_action(JobAction::GetInstalled)
        .returning_app(available_app("org.example.Fast", "Fast"))
        .build();
    let slow = MockBackend::named("slow")
        .with_action(JobAction::GetInstalled)
        .returning_app(available_app("org.example.Slow", "Slow"))
        .with_delay(Duration::from_millis(400))
        .build();

    let harness = TestDispatcherBuilder::new()
        .with_backend(fast)
        .with_backend(slow.clone())
        .build()
        .await;

    let dispatcher = Arc::new(harness.dispatcher);
    let token = CancellationToken::new();
    let job = Job::builder(JobAction::GetInstalled).build().unwrap();

    let submitted = {
        let dispatcher = Arc::clone(&dispatcher);
        let token = token.clone();
        tokio::spawn(async move { dispatcher.submit_with_token(job, token).await })
    };

    // let the fast backend finish, then cancel while the slow one is
    // still sleeping
    tokio::time::sleep(Duration::from_millis(100)).await;
    token.cancel();

    let outcome = submitted.await.unwrap().unwrap();
    assert_eq!(outcome.status, JobStatus::Cancelled);
    assert!(outcome.list.contains(&app_id("org.example.Fast")));
    assert!(!outcome.list.contains(&app_id("org.example.Slow")));
    // cancellation is a status, never a user-facing failure event
    assert!(outcome.events.is_empty());
}

#[tokio::test]
async fn install_routes_to_management_owner_and_notifies_pending() {
    let owner = MockBackend::named("flatpak")
        .with_action(JobAction::Install)
        .build();
    let bystander = MockBackend::named("packages")
        .with_action(JobAction::Install)
        .build();

    let harness = TestDispatcherBuilder::new()
        .with_backend(bystander.clone())
        .with_backend(owner.clone())
        .build()
        .await;
    let mut pending = harness.dispatcher.subscribe_pending();

    let mut target = available_app("org.example.App", "Example");
    target.set_managed_by("flatpak");
    let job = Job::builder(JobAction::Install)
        .target_app(target)
        .build()
        .unwrap();

    let outcome = harness.dispatcher.submit(job).await.unwrap();
    assert_eq!(outcome.status, JobStatus::Succeeded);
    assert_eq!(owner.execute_count(), 1);
    assert_eq!(bystander.execute_count(), 0);

    let installed = outcome.list.get(&app_id("org.example.App")).unwrap();
    assert_eq!(installed.state(), AppState::Installed);

    let mut states = Vec::new();
    while let Ok(snapshot) = pending.try_recv() {
        states.push(snapshot.iter().next().unwrap().state());
    }
    assert_eq!(
        states,
        vec![
            AppState::QueuedForInstall,
            AppState::Installing,
            AppState::Installed,
        ]
    );
}

#[tokio::test]
async fn remove_failure_fails_job_and_recovers_state() {
    let backend = MockBackend::named("packages")
        .with_action(JobAction::Remove)
        .failing_with(CoreError::AuthFailed("polkit denied".to_string()))
        .build();

    let harness = TestDispatcherBuilder::new()
        .with_backend(backend)
        .build()
        .await;
    let mut pending = harness.dispatcher.subscribe_pending();

    let job = Job::builder(JobAction::Remove)
        .target_app(installed_app("org.example.App", "packages"))
        .build()
        .unwrap();

    let err = harness.dispatcher.submit(job).await.unwrap_err();
    assert!(matches!(err, CoreError::AuthFailed(_)));

    // removing, then back to installed after the failure
    let mut states = Vec::new();
    while let Ok(snapshot) = pending.try_recv() {
        states.push(snapshot.iter().next().unwrap().state());
    }
    assert_eq!(states, vec![AppState::Removing, AppState::Installed]);
}

#[tokio::test]
async fn submit_review_attaches_review_to_entity() {
    let backend = MockBackend::named("ratings")
        .with_action(JobAction::SubmitReview)
        .build();

    let harness = TestDispatcherBuilder::new()
        .with_backend(backend)
        .build()
        .await;

    let job = Job::builder(JobAction::SubmitReview)
        .target_app(installed_app("org.example.App", "ratings"))
        .review(review("r1", 100))
        .build()
        .unwrap();

    let outcome = harness.dispatcher.submit(job).await.unwrap();
    let app = outcome.list.get(&app_id("org.example.App")).unwrap();
    assert_eq!(app.reviews().len(), 1);
    assert_eq!(app.reviews()[0].id, "r1");
}

#[tokio::test]
async fn refresh_failure_is_warning_not_job_failure() {
    let stale = MockBackend::named("ratings")
        .with_action(JobAction::Refresh)
        .refresh_failing_with(CoreError::NoNetwork("ratings server down".to_string()))
        .build();
    let healthy = MockBackend::named("firmware")
        .with_action(JobAction::Refresh)
        .build();

    let harness = TestDispatcherBuilder::new()
        .with_backend(stale.clone())
        .with_backend(healthy.clone())
        .build()
        .await;

    let job = Job::builder(JobAction::Refresh)
        .cache_age(Duration::from_secs(60 * 60 * 24))
        .build()
        .unwrap();
    let outcome = harness.dispatcher.submit(job).await.unwrap();

    assert_eq!(outcome.status, JobStatus::Succeeded);
    assert_eq!(stale.refresh_count(), 1);
    assert_eq!(healthy.refresh_count(), 1);
    assert_eq!(outcome.events.len(), 1);
    assert_eq!(outcome.events[0].severity, Severity::Warning);
}

#[tokio::test]
async fn file_to_app_stops_at_first_match() {
    let miss = MockBackend::named("firmware")
        .with_action(JobAction::FileToApp)
        .build();
    let hit = MockBackend::named("packages")
        .with_action(JobAction::FileToApp)
        .returning_app(available_app("org.example.FromFile", "From File"))
        .build();
    let never = MockBackend::named("late")
        .with_action(JobAction::FileToApp)
        .run_after("packages")
        .returning_app(available_app("org.example.Never", "Never"))
        .build();

    let harness = TestDispatcherBuilder::new()
        .with_backend(miss.clone())
        .with_backend(hit.clone())
        .with_backend(never.clone())
        .build()
        .await;

    let job = Job::builder(JobAction::FileToApp)
        .file("/tmp/example.pkg")
        .build()
        .unwrap();
    let outcome = harness.dispatcher.submit(job).await.unwrap();

    assert_eq!(outcome.list.len(), 1);
    assert!(outcome.list.contains(&app_id("org.example.FromFile")));
    assert_eq!(never.execute_count(), 0);
}
