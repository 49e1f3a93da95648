//! The result cache observed through the full dispatch path: a backend
//! memoizes an expensive snapshot in its namespace, and concurrent jobs
//! trigger at most one production.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use storefront_core::{
    AppList, Backend, BackendBase, BackendCapabilities, BackendContext, CacheValue, CoreError,
    Job, JobAction, RATINGS_TTL,
};
use storefront_test_utils::fixtures::available_app;
use storefront_test_utils::TestDispatcherBuilder;

/// A backend that produces its update list from an expensive snapshot,
/// memoized in its cache namespace.
struct SnapshotBackend {
    productions: Arc<AtomicUsize>,
}

impl BackendBase for SnapshotBackend {
    fn name(&self) -> &str {
        "ratings"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::new().with_action(JobAction::GetUpdates)
    }
}

#[async_trait]
impl Backend for SnapshotBackend {
    async fn execute(&self, _job: &Job, ctx: &BackendContext) -> Result<AppList, CoreError> {
        let productions = Arc::clone(&self.productions);
        let value = ctx
            .cache()
            .get_or_produce("updates-snapshot", RATINGS_TTL, || async move {
                productions.fetch_add(1, Ordering::SeqCst);
                // simulate the expensive download
                tokio::time::sleep(Duration::from_millis(40)).await;
                let mut list = AppList::new();
                list.merge(available_app("org.example.App", "Example"));
                Ok(CacheValue::List(list))
            })
            .await?;
        Ok(value.into_list())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_jobs_share_one_cache_production() {
    let productions = Arc::new(AtomicUsize::new(0));
    let backend = Arc::new(SnapshotBackend {
        productions: Arc::clone(&productions),
    });

    let harness = TestDispatcherBuilder::new()
        .with_backend(backend)
        .build()
        .await;
    let dispatcher = Arc::new(harness.dispatcher);

    let mut submissions = Vec::new();
    for _ in 0..4 {
        let dispatcher = Arc::clone(&dispatcher);
        submissions.push(tokio::spawn(async move {
            let job = Job::builder(JobAction::GetUpdates).build().unwrap();
            dispatcher.submit(job).await
        }));
    }

    for submission in submissions {
        let outcome = submission.await.unwrap().unwrap();
        assert_eq!(outcome.list.len(), 1);
    }
    assert_eq!(
        productions.load(Ordering::SeqCst),
        1,
        "concurrent lookups for one key must share one production"
    );
}

#[tokio::test]
async fn invalidated_namespace_reproduces_on_next_job() {
    let productions = Arc::new(AtomicUsize::new(0));
    let backend = Arc::new(SnapshotBackend {
        productions: Arc::clone(&productions),
    });

    let harness = TestDispatcherBuilder::new()
        .with_backend(backend)
        .build()
        .await;

    let first = Job::builder(JobAction::GetUpdates).build().unwrap();
    harness.dispatcher.submit(first).await.unwrap();
    assert_eq!(productions.load(Ordering::SeqCst), 1);

    // a second job hits the memoized snapshot
    let second = Job::builder(JobAction::GetUpdates).build().unwrap();
    harness.dispatcher.submit(second).await.unwrap();
    assert_eq!(productions.load(Ordering::SeqCst), 1);

    // an explicit invalidation (e.g. settings change) forces production
    harness.cache.invalidate_namespace("ratings");
    let third = Job::builder(JobAction::GetUpdates).build().unwrap();
    harness.dispatcher.submit(third).await.unwrap();
    assert_eq!(productions.load(Ordering::SeqCst), 2);
}
