mod domain;
mod inbound;
mod outbound;
mod usecase;

use std::sync::Arc;

use app_core::config::Config;
use app_core::oauth::FederatedProviders;
use app_core::storage::BlobStore;
pub use inbound::router::create_router;
pub use inbound::state::PortalState;
pub use outbound::identity::{IdentityService, LocalIdentity};
pub use outbound::records::{MemoryRecordStore, RecordStore};
use tower_cookies::Key;

use crate::usecase::gate::GateService;
use crate::usecase::onboarding::OnboardingService;

pub struct Dependency {
    pub config: Arc<Config>,
    pub identity: Arc<dyn IdentityService>,
    pub records: Arc<dyn RecordStore>,
    pub blob: Arc<dyn BlobStore>,
    pub providers: FederatedProviders,
    pub cookie_key: Key,
}

pub fn new(dep: Dependency) -> PortalState {
    let gate_svc = Arc::new(GateService::new(
        dep.config.clone(),
        dep.identity.clone(),
        dep.records.clone(),
        dep.providers,
    ));
    let onboarding_svc = Arc::new(OnboardingService::new(dep.records, dep.blob));

    PortalState::new(dep.cookie_key, dep.config, dep.identity, gate_svc, onboarding_svc)
}
