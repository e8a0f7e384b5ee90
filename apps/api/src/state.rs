use std::sync::Arc;

use crate::analysis::templates::TemplateRepository;
use crate::batch::BatchJobStore;
use crate::config::Config;
use crate::documents::DocumentStore;
use crate::ingestion::coordinator::IngestionCoordinator;
use crate::ingestion::store::{MetricsSink, ProfileStore, SessionStore};

/// Every storage seam, behind a trait object so tests can swap in doubles.
#[derive(Clone)]
pub struct Stores {
    pub profiles: Arc<dyn ProfileStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub metrics: Arc<dyn MetricsSink>,
    pub templates: Arc<dyn TemplateRepository>,
    pub batch_jobs: Arc<dyn BatchJobStore>,
    pub documents: Arc<dyn DocumentStore>,
}

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub stores: Stores,
    pub coordinator: Arc<IngestionCoordinator>,
}
