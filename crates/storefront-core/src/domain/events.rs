use crate::domain::app::AppId;
use crate::domain::job::JobAction;
use crate::error::CoreError;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use tracing::{error, info, warn};

/// How serious a failure event is for the enclosing job
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Worth surfacing, does not affect the result
    Informational,
    /// A backend or enrichment failed; the result is still usable
    Warning,
    /// The job cannot produce its primary result
    Fatal,
}

/// A structured record of one backend failure during a job.
///
/// Warning and informational events are accumulated and returned beside
/// a still-successful result; fatal events abort the enclosing job.
#[derive(Debug, Clone)]
pub struct FailureEvent {
    /// The action the job was performing
    pub action: JobAction,
    /// Name of the failing backend
    pub backend: String,
    /// The entity being processed, when the failure was per-entity
    pub app: Option<AppId>,
    /// The classified error
    pub error: CoreError,
    /// Severity for the enclosing job
    pub severity: Severity,
    /// When the failure was recorded
    pub timestamp: DateTime<Utc>,
}

impl FailureEvent {
    /// A per-backend failure during the primary fan-out for an action.
    ///
    /// Fan-out failures are isolated per backend and never discard other
    /// backends' results, so they are warnings.
    pub fn fanout(action: JobAction, backend: impl Into<String>, error: CoreError) -> Self {
        Self {
            action,
            backend: backend.into(),
            app: None,
            error,
            severity: Severity::Warning,
            timestamp: Utc::now(),
        }
    }

    /// A failure enriching one entity during refinement.
    ///
    /// Network-unavailable conditions for optional enrichments are always
    /// warnings, never fatal; the job still returns the primary result.
    pub fn enrichment(
        action: JobAction,
        backend: impl Into<String>,
        app: AppId,
        error: CoreError,
    ) -> Self {
        Self {
            action,
            backend: backend.into(),
            app: Some(app),
            error,
            severity: Severity::Warning,
            timestamp: Utc::now(),
        }
    }

    /// A failure that aborts the enclosing job
    pub fn fatal(
        action: JobAction,
        backend: impl Into<String>,
        app: Option<AppId>,
        error: CoreError,
    ) -> Self {
        Self {
            action,
            backend: backend.into(),
            app,
            error,
            severity: Severity::Fatal,
            timestamp: Utc::now(),
        }
    }
}

/// Collects non-fatal per-backend failures for one job.
///
/// Backend invocations run concurrently, so the reporter is shared and
/// internally locked; critical sections are append-only and short.
#[derive(Debug, Default)]
pub struct FailureReporter {
    events: Mutex<Vec<FailureEvent>>,
}

impl FailureReporter {
    /// Create an empty reporter
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event, logging it at the matching level
    pub fn report(&self, event: FailureEvent) {
        match event.severity {
            Severity::Informational => info!(
                action = %event.action,
                backend = %event.backend,
                error = %event.error,
                "backend reported"
            ),
            Severity::Warning => warn!(
                action = %event.action,
                backend = %event.backend,
                error = %event.error,
                "backend failed, continuing"
            ),
            Severity::Fatal => error!(
                action = %event.action,
                backend = %event.backend,
                error = %event.error,
                "backend failed fatally"
            ),
        }
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }

    /// Number of events recorded so far
    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Whether no events were recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain the accumulated events
    pub fn take(&self) -> Vec<FailureEvent> {
        std::mem::take(
            &mut *self
                .events
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }
}
