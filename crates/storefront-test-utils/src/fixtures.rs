//! Entity fixtures shared by integration tests.

use chrono::Utc;
use storefront_core::{App, AppId, AppScope, AppState, BundleKind, Quality, Review};

/// A system/desktop identity for `id` on the `stable` branch
pub fn app_id(id: &str) -> AppId {
    AppId::new(AppScope::System, BundleKind::Desktop, "", id, "stable")
}

/// A bare entity for `id`
pub fn app(id: &str) -> App {
    App::new(app_id(id))
}

/// An entity with a normal-quality name, in state `Available`
pub fn available_app(id: &str, name: &str) -> App {
    let mut app = app(id);
    app.set_name(Quality::Normal, name);
    app.set_state(AppState::Available);
    app
}

/// An entity in state `Installed`, managed by `backend`
pub fn installed_app(id: &str, backend: &str) -> App {
    let mut app = app(id);
    app.set_state(AppState::Installed);
    app.set_managed_by(backend);
    app
}

/// A review fixture
pub fn review(id: &str, rating: i32) -> Review {
    Review {
        id: id.to_string(),
        summary: "Does what it says".to_string(),
        text: "Installed it, used it, no complaints.".to_string(),
        rating,
        reviewer: "tester".to_string(),
        date: Utc::now(),
    }
}
